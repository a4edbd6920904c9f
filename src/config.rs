//! 应用配置模块

use crate::core::exclude::{clean_path, Excludes};
use crate::error::ConfigError;
use crate::logging::LogConfig;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

/// 默认备份的远程目录
pub const SYS_DIR: &str = "0:/sys";

/// 备份配置，可以来自 JSON 配置文件，命令行参数会覆盖其中的值
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupConfig {
    #[serde(default)]
    pub domain: Option<String>,
    #[serde(default = "default_port")]
    pub port: u64,
    #[serde(default = "default_password")]
    pub password: String,
    #[serde(default = "default_dir_to_backup")]
    pub dir_to_backup: String,
    #[serde(default)]
    pub out_dir: Option<PathBuf>,
    #[serde(default)]
    pub excludes: Vec<String>,
    /// 删除远程已不存在的本地文件
    #[serde(default)]
    pub remove_local: bool,
    #[serde(default)]
    pub verbose: bool,
    #[serde(default)]
    pub log: LogConfig,
}

fn default_port() -> u64 {
    80
}

fn default_password() -> String {
    "reprap".to_string()
}

fn default_dir_to_backup() -> String {
    SYS_DIR.to_string()
}

impl Default for BackupConfig {
    fn default() -> Self {
        Self {
            domain: None,
            port: default_port(),
            password: default_password(),
            dir_to_backup: default_dir_to_backup(),
            out_dir: None,
            excludes: Vec::new(),
            remove_local: false,
            verbose: false,
            log: LogConfig::default(),
        }
    }
}

/// 校验后的配置
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub domain: String,
    pub port: u16,
    pub password: String,
    /// 规范化后的远程目录
    pub remote_dir: String,
    /// 绝对路径形式的输出目录
    pub out_dir: PathBuf,
    pub excludes: Excludes,
    pub remove_local: bool,
    pub verbose: bool,
    pub log: LogConfig,
}

impl BackupConfig {
    /// 从 JSON 配置文件加载
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// 校验必填项和取值范围
    pub fn resolve(self) -> Result<ResolvedConfig, ConfigError> {
        let domain = self
            .domain
            .filter(|d| !d.is_empty())
            .ok_or(ConfigError::MissingDomain)?;
        let out_dir = self
            .out_dir
            .filter(|p| !p.as_os_str().is_empty())
            .ok_or(ConfigError::MissingOutDir)?;
        let port = u16::try_from(self.port).map_err(|_| ConfigError::InvalidPort(self.port))?;

        if self.excludes.iter().any(|e| clean_path(e).is_empty()) {
            return Err(ConfigError::EmptyExclude);
        }

        // 无法解析为绝对路径时退回用户输入
        let out_dir = std::path::absolute(&out_dir).unwrap_or(out_dir);

        Ok(ResolvedConfig {
            domain,
            port,
            password: self.password,
            remote_dir: clean_path(&self.dir_to_backup),
            out_dir,
            excludes: self.excludes.iter().collect(),
            remove_local: self.remove_local,
            verbose: self.verbose,
            log: self.log,
        })
    }
}
