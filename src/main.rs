use clap::Parser;
use rrfbackup_lib::cli::Cli;
use rrfbackup_lib::{logging, FileManager, ResolvedConfig, RrfFileManager, SyncEngine};
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// 配置错误的退出码（运行时错误为 1）
const EXIT_CONFIG: u8 = 2;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match cli.into_config().and_then(|c| c.resolve()) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("配置错误: {}", e);
            return ExitCode::from(EXIT_CONFIG);
        }
    };

    logging::init(&config.log, config.verbose);

    match run(config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("备份失败: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(config: ResolvedConfig) -> anyhow::Result<()> {
    let rfm = Arc::new(RrfFileManager::new(&config.domain, config.port)?);

    debug!("尝试连接控制器: {}", rfm.name());
    if let Err(e) = rfm.connect(&config.password).await {
        // 控制器关机等情况属于正常，干净退出
        warn!("控制器当前不可用: {}", e);
        return Ok(());
    }

    if !config.excludes.is_empty() {
        debug!("排除前缀: {}", config.excludes);
    }

    let engine = SyncEngine::new(rfm);
    let report = engine
        .sync_folder(
            &config.remote_dir,
            &config.out_dir,
            &config.excludes,
            config.remove_local,
        )
        .await?;

    info!(
        "备份完成: {} 个目录, 新增 {}, 更新 {}, 最新 {}, 排除 {}, 删除 {}, {} 字节, 耗时 {:.1}s",
        report.dirs_visited,
        report.files_added,
        report.files_updated,
        report.files_up_to_date,
        report.paths_excluded,
        report.entries_removed,
        report.bytes_downloaded,
        report.duration.as_secs_f64()
    );

    Ok(())
}
