use std::fs::File;

use anyhow::{Context, Result, anyhow};
use clap::Parser;
use daemonize::Daemonize;
use log::{LevelFilter, info};
use syslog::{BasicLogger, Facility, Formatter3164};
use tokio::signal::unix::{SignalKind, signal};

use tt_rgbd::{cli::Cli, config::Config, daemon::Daemon};

fn init_syslog() -> Result<()> {
    syslog::unix(Formatter3164 {
        facility: Facility::LOG_DAEMON,
        hostname: None,
        process: "tt_rgbd".into(),
        pid: std::process::id(),
    })
    .map_err(|e| anyhow!("{e}"))
    .and_then(|logger| {
        log::set_boxed_logger(Box::new(BasicLogger::new(logger)))
            .map(|_| log::set_max_level(LevelFilter::Info))
            .map_err(|e| anyhow!("{e}"))
    })
}

fn init_stderr_log() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
}

fn into_daemon() -> Result<()> {
    File::create("/var/tmp/tt_rgbd.log")
        .and_then(|out| Ok((out.try_clone()?, out)))
        .map_err(|e| anyhow!("{e}"))
        .and_then(|(stderr, stdout)| {
            Daemonize::new()
                .stdout(stdout)
                .stderr(stderr)
                .start()
                .map_err(|e| anyhow!("{e}"))
        })
}

async fn wait_for_shutdown() -> Result<()> {
    let mut terminate = signal(SignalKind::terminate()).context("Failed to install SIGTERM handler")?;
    tokio::select! {
        result = tokio::signal::ctrl_c() => result.context("Failed to listen for SIGINT")?,
        _ = terminate.recv() => {}
    }
    Ok(())
}

async fn serve(config: Config) -> Result<()> {
    #[cfg(feature = "tokio-console")]
    console_subscriber::init();

    let mut daemon = Daemon::builder().with_config(config).build().await?;
    daemon.run().await?;
    info!("tt_rgbd started with {} devices", daemon.device_count());

    wait_for_shutdown().await?;
    info!("Shutdown requested");
    daemon.stop().await?;
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    if cli.daemonize {
        // fork before the runtime spawns its threads
        into_daemon()?;
        init_syslog()?;
    } else {
        init_stderr_log();
    }

    let config = Config::load(cli.config)?;

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to start tokio runtime")?
        .block_on(serve(config))
}
