use std::{path::PathBuf, sync::Arc};

use anyhow::Context;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use gitrun_core::{Executor, GitError, Task};
use gitrun_exec::TokioSpawner;
use gitrun_model::ExecConfig;
use gitrun_observe::{Journal, LoggerConfig, LoggerFormat, logger_init};
use gitrun_prometheus::PrometheusMetrics;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 1) Logger
    let format: LoggerFormat = std::env::var("GITRUN_LOG_FORMAT")
        .unwrap_or_else(|_| "text".to_string())
        .parse()?;
    let cfg = LoggerConfig {
        format,
        ..Default::default()
    };
    logger_init(&cfg)?;
    info!("logger initialized");

    // 2) Repository
    let repo = match std::env::args_os().nth(1) {
        Some(dir) => PathBuf::from(dir),
        None => std::env::current_dir().context("current directory")?,
    };
    info!(repo = %repo.display(), "using repository");

    // 3) Ctrl-C aborts whatever is queued or running
    let abort = CancellationToken::new();
    let on_signal = abort.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupted; aborting");
            on_signal.cancel();
        }
    });

    // 4) Executor
    let metrics = Arc::new(PrometheusMetrics::new()?);
    let mut config = ExecConfig::default().with_base_dir(&repo);
    config.config.push("core.quotepath=off".to_string());
    config.env.set("GIT_TERMINAL_PROMPT", "0");

    let executor = Executor::builder(config)
        .with_spawner(TokioSpawner::new())
        .with_abort(abort)
        .with_subscriber(Arc::new(Journal::new()))
        .with_subscriber(metrics.clone())
        .build()?;
    info!("executor ready");

    // 5) Two chains of read-only commands
    let info_chain = executor.chain();
    let history_chain = executor.chain();

    let toplevel = info_chain.push(Task::parse_text(
        ["rev-parse", "--show-toplevel"],
        |stdout, _| Ok(stdout.trim().to_string()),
    ));
    let branch = info_chain.push(Task::parse_text(
        ["rev-parse", "--abbrev-ref", "HEAD"],
        |stdout, _| Ok(stdout.trim().to_string()),
    ));
    let status = info_chain.push(Task::parse_text(
        ["status", "--porcelain"],
        |stdout, _| Ok(stdout.lines().count()),
    ));
    let log = history_chain.push(Task::parse_text(
        ["log", "-n", "5", "--oneline"],
        |stdout, _| Ok(stdout.lines().map(str::to_owned).collect::<Vec<_>>()),
    ));
    let tags = history_chain.push(
        Task::parse_text(["describe", "--tags", "--abbrev=0"], |stdout, _| {
            Ok(Some(stdout.trim().to_string()))
        })
        .with_on_error(|_, err| match err {
            GitError::Process { .. } => Ok(Vec::new()),
            other => Err(other),
        }),
    );

    let (toplevel, branch, status, log, tags) = tokio::join!(toplevel, branch, status, log, tags);

    println!("repository: {}", toplevel?);
    println!("branch:     {}", branch?);
    println!("changes:    {}", status?);
    match tags? {
        Some(tag) if !tag.is_empty() => println!("last tag:   {tag}"),
        _ => println!("last tag:   (none)"),
    }
    println!("recent commits:");
    for line in log? {
        println!("  {line}");
    }

    // 6) Metrics
    println!();
    print!("{}", metrics.encode_text()?);

    Ok(())
}
