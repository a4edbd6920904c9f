pub mod rrf;

use crate::error::SyncError;
use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Local};
use std::time::Duration;

pub use rrf::RrfFileManager;

/// 条目类型，目录排在文件之前
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum EntryKind {
    Directory,
    File,
}

/// 远程文件或目录（列表时刻的只读快照）
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    pub kind: EntryKind,
    pub name: String,
    pub size: u64,
    pub modified_at: DateTime<Local>,
}

impl Entry {
    pub fn file(name: impl Into<String>, size: u64, modified_at: DateTime<Local>) -> Self {
        Self {
            kind: EntryKind::File,
            name: name.into(),
            size,
            modified_at,
        }
    }

    pub fn directory(name: impl Into<String>, modified_at: DateTime<Local>) -> Self {
        Self {
            kind: EntryKind::Directory,
            name: name.into(),
            size: 0,
            modified_at,
        }
    }

    pub fn is_dir(&self) -> bool {
        self.kind == EntryKind::Directory
    }
}

/// 单个远程目录的列表
#[derive(Debug, Clone)]
pub struct Listing {
    pub dir: String,
    pub entries: Vec<Entry>,
}

impl Listing {
    /// 创建列表并按“目录优先、名称升序”稳定排序
    pub fn new(dir: impl Into<String>, mut entries: Vec<Entry>) -> Self {
        sort_entries(&mut entries);
        Self {
            dir: dir.into(),
            entries,
        }
    }

    pub fn files(&self) -> impl Iterator<Item = &Entry> {
        self.entries.iter().filter(|e| !e.is_dir())
    }

    pub fn directories(&self) -> impl Iterator<Item = &Entry> {
        self.entries.iter().filter(|e| e.is_dir())
    }
}

/// 目录在前，同类型按名称排序（稳定排序）
pub fn sort_entries(entries: &mut [Entry]) {
    entries.sort_by(|a, b| a.kind.cmp(&b.kind).then_with(|| a.name.cmp(&b.name)));
}

/// 远程文件管理器接口
#[async_trait]
pub trait FileManager: Send + Sync {
    /// 检查控制器是否可达并完成认证
    async fn connect(&self, password: &str) -> Result<(), SyncError>;

    /// 获取目录的完整列表（已合并分页并排序）
    async fn list_dir(&self, path: &str) -> Result<Listing, SyncError>;

    /// 下载文件，同时返回下载耗时
    async fn fetch_file(&self, path: &str) -> Result<(Bytes, Duration), SyncError>;

    /// 名称（用于日志）
    fn name(&self) -> &str;
}
