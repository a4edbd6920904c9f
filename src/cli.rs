//! 命令行参数

use crate::config::BackupConfig;
use crate::error::ConfigError;
use clap::Parser;
use std::path::PathBuf;

/// rrfbackup - 将 RepRapFirmware 控制器的 SD 卡目录备份到本地
#[derive(Parser, Debug)]
#[command(
    name = "rrfbackup",
    version,
    about = "Back up the SD card of a RepRapFirmware controller into a local directory"
)]
pub struct Cli {
    /// Domain or IP of the controller
    #[arg(long)]
    pub domain: Option<String>,

    /// HTTP port of the controller [default: 80]
    #[arg(long)]
    pub port: Option<u64>,

    /// Connection password [default: reprap]
    #[arg(long)]
    pub password: Option<String>,

    /// Directory on the controller to create a backup of [default: 0:/sys]
    #[arg(long = "dir-to-backup", value_name = "DIR")]
    pub dir_to_backup: Option<String>,

    /// Output directory of the backup
    #[arg(long = "out-dir", value_name = "DIR")]
    pub out_dir: Option<PathBuf>,

    /// Exclude remote paths starting with this string (repeatable)
    #[arg(long = "exclude", value_name = "PREFIX")]
    pub excludes: Vec<String>,

    /// Remove local files that have been deleted on the controller
    #[arg(long)]
    pub remove_local: bool,

    /// Output more details
    #[arg(short, long)]
    pub verbose: bool,

    /// Also write logs into this directory
    #[arg(long, value_name = "DIR")]
    pub log_dir: Option<PathBuf>,

    /// JSON config file; command line flags take precedence
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,
}

impl Cli {
    /// 合并配置文件和命令行参数
    pub fn into_config(self) -> Result<BackupConfig, ConfigError> {
        let mut config = match &self.config {
            Some(path) => BackupConfig::load(path)?,
            None => BackupConfig::default(),
        };

        if self.domain.is_some() {
            config.domain = self.domain;
        }
        if let Some(port) = self.port {
            config.port = port;
        }
        if let Some(password) = self.password {
            config.password = password;
        }
        if let Some(dir) = self.dir_to_backup {
            config.dir_to_backup = dir;
        }
        if self.out_dir.is_some() {
            config.out_dir = self.out_dir;
        }
        if self.log_dir.is_some() {
            config.log.dir = self.log_dir;
        }
        config.excludes.extend(self.excludes);
        config.remove_local |= self.remove_local;
        config.verbose |= self.verbose;

        Ok(config)
    }
}
