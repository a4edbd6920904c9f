use crate::core::exclude::Excludes;
use crate::core::marker::{self, DIR_MARKER};
use crate::error::SyncError;
use crate::remote::{Entry, FileManager, Listing};
use filetime::FileTime;
use std::collections::HashSet;
use std::ffi::OsString;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::fs;
use tracing::{debug, info};

/// 下载时临时文件的后缀，写完后重命名为目标文件
pub const TEMP_SUFFIX: &str = ".rrfbackup-tmp";

/// 同步报告
#[derive(Debug, Clone, Default)]
pub struct SyncReport {
    pub dirs_visited: u32,
    pub files_added: u32,
    pub files_updated: u32,
    pub files_up_to_date: u32,
    pub paths_excluded: u32,
    pub entries_removed: u32,
    pub bytes_downloaded: u64,
    pub duration: Duration,
}

impl SyncReport {
    pub fn files_downloaded(&self) -> u32 {
        self.files_added + self.files_updated
    }
}

/// 同步引擎
///
/// 严格顺序执行：获取列表、下载文件、清理孤立条目，然后逐个递归子目录。
/// 一个子树（包括它自己的清理）完成后才会开始下一个兄弟目录。
pub struct SyncEngine {
    remote: Arc<dyn FileManager>,
}

impl SyncEngine {
    pub fn new(remote: Arc<dyn FileManager>) -> Self {
        Self { remote }
    }

    /// 将远程目录同步到本地目录
    ///
    /// `remove_local` 为 true 时删除远程已不存在的本地文件，以及带有归属标记的本地目录。
    /// 第一个错误会中止整个同步；已写入的文件保留在磁盘上。
    pub async fn sync_folder(
        &self,
        remote_dir: &str,
        local_dir: &Path,
        excls: &Excludes,
        remove_local: bool,
    ) -> Result<SyncReport, SyncError> {
        let start = Instant::now();
        let mut report = SyncReport::default();

        info!("开始同步: {} -> {}", self.remote.name(), local_dir.display());
        self.sync_dir(remote_dir, local_dir, excls, remove_local, &mut report)
            .await?;

        report.duration = start.elapsed();
        Ok(report)
    }

    async fn sync_dir(
        &self,
        remote_dir: &str,
        local_dir: &Path,
        excls: &Excludes,
        remove_local: bool,
        report: &mut SyncReport,
    ) -> Result<(), SyncError> {
        // 整个目录被排除时，不请求列表也不创建本地目录
        if excls.contains(remote_dir) {
            info!("排除目录: {}", remote_dir);
            report.paths_excluded += 1;
            return Ok(());
        }

        info!("获取文件列表: {}", remote_dir);
        let listing = self.remote.list_dir(remote_dir).await?;
        report.dirs_visited += 1;

        let local_dir = ensure_local_dir(local_dir).await?;

        info!("下载新增/变更的文件: {} -> {}", remote_dir, local_dir.display());
        self.update_local_files(&listing, remote_dir, &local_dir, excls, report)
            .await?;

        if remove_local {
            info!("清理已删除的文件: {}", local_dir.display());
            remove_deleted_files(&listing, &local_dir, report).await?;
        }

        for dir in listing.directories() {
            let child_remote = format!("{}/{}", remote_dir, dir.name);
            let child_local = local_dir.join(&dir.name);
            Box::pin(self.sync_dir(&child_remote, &child_local, excls, remove_local, report))
                .await?;
        }

        Ok(())
    }

    async fn update_local_files(
        &self,
        listing: &Listing,
        remote_dir: &str,
        local_dir: &Path,
        excls: &Excludes,
        report: &mut SyncReport,
    ) -> Result<(), SyncError> {
        for entry in listing.files() {
            let remote_file = format!("{}/{}", remote_dir, entry.name);

            if excls.contains(&remote_file) {
                debug!("  排除:     {}", remote_file);
                report.paths_excluded += 1;
                continue;
            }

            let local_file = local_dir.join(&entry.name);
            let remote_mtime = remote_file_time(entry);
            let local_mtime = local_mtime(&local_file).await?;

            if !needs_download(local_mtime, remote_mtime) {
                debug!("  已是最新: {}", remote_file);
                report.files_up_to_date += 1;
                continue;
            }

            let (body, elapsed) = self.remote.fetch_file(&remote_file).await?;
            write_file(&local_file, &body, remote_mtime).await?;

            let kibs = kib_per_sec(body.len() as u64, elapsed);
            if local_mtime.is_some() {
                debug!("  更新:     {} ({:.1} KiB/s)", remote_file, kibs);
                report.files_updated += 1;
            } else {
                debug!("  新增:     {} ({:.1} KiB/s)", remote_file, kibs);
                report.files_added += 1;
            }
            report.bytes_downloaded += body.len() as u64;
        }

        Ok(())
    }
}

/// 本地不存在，或本地修改时间严格早于远程时需要下载（时间相同视为最新）
pub fn needs_download(local: Option<FileTime>, remote: FileTime) -> bool {
    local.map_or(true, |l| l < remote)
}

fn remote_file_time(entry: &Entry) -> FileTime {
    FileTime::from_unix_time(
        entry.modified_at.timestamp(),
        entry.modified_at.timestamp_subsec_nanos(),
    )
}

async fn local_mtime(path: &Path) -> Result<Option<FileTime>, SyncError> {
    match fs::metadata(path).await {
        Ok(meta) => Ok(Some(FileTime::from_last_modification_time(&meta))),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(SyncError::io("stat", path, e)),
    }
}

/// 确保本地目录存在（包括所有父目录），并写入归属标记
async fn ensure_local_dir(dir: &Path) -> Result<PathBuf, SyncError> {
    let path = std::path::absolute(dir).map_err(|e| SyncError::io("resolve", dir, e))?;

    match fs::metadata(&path).await {
        Ok(_) => {}
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            debug!("  创建目录: {}", path.display());
            fs::create_dir_all(&path)
                .await
                .map_err(|e| SyncError::io("create directory", &path, e))?;
        }
        Err(e) => return Err(SyncError::io("stat", &path, e)),
    }

    marker::write_marker(&path).await?;
    Ok(path)
}

fn temp_path(dest: &Path) -> PathBuf {
    let mut name = dest.file_name().map(OsString::from).unwrap_or_default();
    name.push(TEMP_SUFFIX);
    dest.with_file_name(name)
}

/// 先写临时文件并设置时间，再原子重命名，失败时不会留下截断的目标文件
async fn write_file(dest: &Path, data: &[u8], mtime: FileTime) -> Result<(), SyncError> {
    let temp = temp_path(dest);

    let result = write_and_rename(&temp, dest, data, mtime).await;
    if result.is_err() {
        let _ = fs::remove_file(&temp).await;
    }
    result
}

async fn write_and_rename(
    temp: &Path,
    dest: &Path,
    data: &[u8],
    mtime: FileTime,
) -> Result<(), SyncError> {
    fs::write(temp, data)
        .await
        .map_err(|e| SyncError::io("write", temp, e))?;
    filetime::set_file_times(temp, mtime, mtime)
        .map_err(|e| SyncError::io("set times on", temp, e))?;
    fs::rename(temp, dest)
        .await
        .map_err(|e| SyncError::io("rename", temp, e))
}

/// 删除远程已不存在的本地条目
///
/// 普通文件直接删除；目录只有带归属标记时才递归删除，其余（用户目录、符号链接等）保留。
async fn remove_deleted_files(
    listing: &Listing,
    local_dir: &Path,
    report: &mut SyncReport,
) -> Result<(), SyncError> {
    let existing: HashSet<&str> = listing.entries.iter().map(|e| e.name.as_str()).collect();

    let mut children = fs::read_dir(local_dir)
        .await
        .map_err(|e| SyncError::io("read directory", local_dir, e))?;

    while let Some(child) = children
        .next_entry()
        .await
        .map_err(|e| SyncError::io("read directory", local_dir, e))?
    {
        let name = child.file_name();
        if name == DIR_MARKER || name.to_str().is_some_and(|n| existing.contains(n)) {
            continue;
        }

        let path = child.path();
        let file_type = child
            .file_type()
            .await
            .map_err(|e| SyncError::io("stat", &path, e))?;

        if file_type.is_dir() {
            if !marker::is_managed(local_dir, &name).await {
                debug!("  保留未托管目录: {}", path.display());
                continue;
            }
            fs::remove_dir_all(&path)
                .await
                .map_err(|e| SyncError::io("remove directory", &path, e))?;
        } else if file_type.is_file() {
            fs::remove_file(&path)
                .await
                .map_err(|e| SyncError::io("remove file", &path, e))?;
        } else {
            debug!("  保留: {}", path.display());
            continue;
        }

        debug!("  删除:     {}", path.display());
        report.entries_removed += 1;
    }

    Ok(())
}

fn kib_per_sec(bytes: u64, elapsed: Duration) -> f64 {
    let secs = elapsed.as_secs_f64().max(f64::EPSILON);
    bytes as f64 / secs / 1024.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_needs_download_boundary() {
        let remote = FileTime::from_unix_time(1_700_000_000, 0);

        assert!(needs_download(None, remote));
        assert!(needs_download(
            Some(FileTime::from_unix_time(1_699_999_999, 0)),
            remote
        ));
        assert!(!needs_download(Some(remote), remote));
        assert!(!needs_download(
            Some(FileTime::from_unix_time(1_700_000_001, 0)),
            remote
        ));
    }

    #[test]
    fn test_temp_path() {
        let temp = temp_path(Path::new("/out/sys/config.g"));
        assert_eq!(temp, PathBuf::from("/out/sys/config.g.rrfbackup-tmp"));
    }

    #[tokio::test]
    async fn test_write_file_sets_mtime() {
        let tmp = tempfile::tempdir().unwrap();
        let dest = tmp.path().join("config.g");
        std::fs::write(&dest, b"old contents that are longer").unwrap();

        let mtime = FileTime::from_unix_time(1_600_000_000, 0);
        write_file(&dest, b"G28", mtime).await.unwrap();

        assert_eq!(std::fs::read(&dest).unwrap(), b"G28");
        let meta = std::fs::metadata(&dest).unwrap();
        assert_eq!(FileTime::from_last_modification_time(&meta), mtime);
        assert!(!temp_path(&dest).exists());
    }

    #[tokio::test]
    async fn test_write_file_failure_leaves_no_temp() {
        let tmp = tempfile::tempdir().unwrap();
        // 目标是一个非空目录，重命名会失败
        let dest = tmp.path().join("taken");
        std::fs::create_dir(&dest).unwrap();
        std::fs::write(dest.join("inner"), b"x").unwrap();

        let mtime = FileTime::from_unix_time(1_600_000_000, 0);
        assert!(write_file(&dest, b"data", mtime).await.is_err());
        assert!(!temp_path(&dest).exists());
        assert!(dest.join("inner").exists());
    }

    #[test]
    fn test_kib_per_sec() {
        let rate = kib_per_sec(2048, Duration::from_secs(2));
        assert!((rate - 1.0).abs() < f64::EPSILON);
        assert!(kib_per_sec(1024, Duration::ZERO).is_finite());
    }
}
