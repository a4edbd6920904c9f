//! 错误类型

use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// 同步过程中的错误（远程请求与本地文件系统）
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("request to {url} failed: {source}")]
    Http {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("request to {url} returned HTTP {status}")]
    Status {
        url: String,
        status: reqwest::StatusCode,
    },

    #[error("controller rejected {action} (err {code})")]
    Rejected { action: String, code: i64 },

    #[error("malformed response from {url}: {reason}")]
    Malformed { url: String, reason: String },

    #[error("failed to {op} {}: {source}", path.display())]
    Io {
        op: &'static str,
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl SyncError {
    pub fn io(op: &'static str, path: &Path, source: io::Error) -> Self {
        SyncError::Io {
            op,
            path: path.to_path_buf(),
            source,
        }
    }
}

/// 配置错误，在任何网络请求之前报告
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("--domain is mandatory")]
    MissingDomain,

    #[error("--out-dir is mandatory")]
    MissingOutDir,

    #[error("invalid port {0}")]
    InvalidPort(u64),

    #[error("exclude prefix must not be empty")]
    EmptyExclude,

    #[error("cannot read config file {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("cannot parse config file {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}
