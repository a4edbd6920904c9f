//! 目录归属标记
//!
//! 每个由本工具写入的本地目录都包含一个空的标记文件，
//! 清理孤立条目时只删除带有标记的目录。

use crate::error::SyncError;
use std::ffi::OsStr;
use std::path::Path;
use tokio::fs;

/// 标记文件名（与已有备份目录兼容，不可更改）
pub const DIR_MARKER: &str = ".duetbackup";

/// 创建（或截断）目录中的标记文件
pub async fn write_marker(dir: &Path) -> Result<(), SyncError> {
    let marker = dir.join(DIR_MARKER);
    fs::File::create(&marker)
        .await
        .map_err(|e| SyncError::io("create marker", &marker, e))?;
    Ok(())
}

/// `parent/name` 是目录且包含标记文件时返回 true，任何错误都视为 false
pub async fn is_managed(parent: &Path, name: &OsStr) -> bool {
    let dir = parent.join(name);
    match fs::symlink_metadata(&dir).await {
        Ok(meta) if meta.is_dir() => {}
        _ => return false,
    }
    fs::symlink_metadata(dir.join(DIR_MARKER)).await.is_ok()
}
