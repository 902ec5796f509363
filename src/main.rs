use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Arg, Command};
use tokio::signal;
use tracing::{error, info, warn};

use job_scheduler::app::{AppMode, Application};
use job_scheduler::shutdown::ShutdownManager;
use scheduler_core::{logging::init_logging, AppConfig};

/// 收到关闭信号后等待组件退出的最长时间
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

#[tokio::main]
async fn main() -> Result<()> {
    let matches = Command::new("job-scheduler")
        .version(env!("CARGO_PKG_VERSION"))
        .about("分布式任务调度平台")
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("配置文件路径，未指定时使用默认配置与环境变量"),
        )
        .arg(
            Arg::new("mode")
                .short('m')
                .long("mode")
                .value_name("MODE")
                .help("运行模式")
                .value_parser(["admin", "executor", "all"])
                .default_value("all"),
        )
        .arg(
            Arg::new("log-level")
                .short('l')
                .long("log-level")
                .value_name("LEVEL")
                .help("日志级别，未指定时使用配置文件中的值")
                .value_parser(["trace", "debug", "info", "warn", "error"]),
        )
        .arg(
            Arg::new("log-format")
                .long("log-format")
                .value_name("FORMAT")
                .help("日志格式，未指定时使用配置文件中的值")
                .value_parser(["json", "pretty"]),
        )
        .get_matches();

    let config_path = matches.get_one::<String>("config").map(String::as_str);
    let mode_str = matches
        .get_one::<String>("mode")
        .map(String::as_str)
        .unwrap_or("all");

    let config = AppConfig::load(config_path).context("加载配置失败")?;

    let log_level = matches
        .get_one::<String>("log-level")
        .unwrap_or(&config.observability.log_level);
    let log_format = matches
        .get_one::<String>("log-format")
        .unwrap_or(&config.observability.log_format);
    init_logging(log_level, log_format)?;

    info!("启动分布式任务调度平台");
    info!("配置文件: {}", config_path.unwrap_or("<默认>"));
    info!("运行模式: {mode_str}");

    let mode = AppMode::parse(mode_str, &config)?;
    let app = Application::new(config, mode);
    let shutdown = ShutdownManager::new();

    let signal_shutdown = shutdown.clone();
    tokio::spawn(async move {
        wait_for_signal().await;
        signal_shutdown.shutdown().await;
    });

    let mut run = Box::pin(app.run(&shutdown));
    tokio::select! {
        result = &mut run => {
            if let Err(e) = &result {
                error!("应用程序运行失败: {e:#}");
            }
            return result;
        }
        _ = wait_until_shutdown(&shutdown) => {}
    }

    match tokio::time::timeout(SHUTDOWN_TIMEOUT, run).await {
        Ok(Ok(())) => info!("应用程序已优雅关闭"),
        Ok(Err(e)) => error!("关闭过程中出现错误: {e:#}"),
        Err(_) => warn!("等待组件退出超时，强制退出"),
    }
    Ok(())
}

async fn wait_until_shutdown(shutdown: &ShutdownManager) {
    let mut rx = shutdown.subscribe().await;
    let _ = rx.recv().await;
}

async fn wait_for_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("监听Ctrl+C信号失败: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!("监听SIGTERM信号失败: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("收到Ctrl+C信号，开始关闭"),
        _ = terminate => info!("收到SIGTERM信号，开始关闭"),
    }
}
