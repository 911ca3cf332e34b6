//! Application startup
//!
//! Parses arguments, initialises logging, mounts the pipeline, feeds it from
//! the input and tears it down again. Returns the process exit code.

use super::cli::args::Args;
use super::handler::LoggingHandler;
use super::input::{feed, FeedSummary};
use crate::core::error_handling::log_error_with_context;
use crate::core::logging::init_logging;
use crate::core::shutdown::ShutdownCoordinator;
use crate::pipeline::api::{Pipeline, PipelineState};
use clap::Parser;
use std::sync::atomic::Ordering;
use tokio::io::BufReader;

/// Configuration or startup failure
const EXIT_STARTUP: i32 = 1;
/// The pipeline halted on an internal fault
const EXIT_HALTED: i32 = 2;

pub async fn startup() -> i32 {
    let args = Args::parse();
    let use_color = args.use_color();
    colored::control::set_override(use_color);

    if let Err(e) = init_logging(
        args.log_level.as_deref(),
        args.log_format.as_deref(),
        args.log_file().as_deref(),
        use_color,
    ) {
        eprintln!("Error: failed to initialise logging: {}", e);
        return EXIT_STARTUP;
    }
    log::debug!(
        "msgflow {} ({}, built {})",
        env!("CARGO_PKG_VERSION"),
        crate::GIT_HASH,
        crate::BUILD_TIME
    );

    let config = match args.pipeline_config().await {
        Ok(config) => config,
        Err(e) => {
            log_error_with_context(&e, "Loading pipeline configuration");
            return EXIT_STARTUP;
        }
    };
    let settle_budget = config.worst_case_latency();

    let shutdown = ShutdownCoordinator::new();
    shutdown.install_signal_handlers();

    let handler = LoggingHandler::new(args.echo);
    let handled = handler.handled();
    let pipeline = match Pipeline::start(config, handler).await {
        Ok(pipeline) => pipeline,
        Err(e) => {
            log_error_with_context(&e, "Starting pipeline");
            return EXIT_STARTUP;
        }
    };

    let summary = match read_input(&args, &pipeline, &shutdown).await {
        Ok(summary) => summary,
        Err(e) => {
            log::error!("Cannot read input: {}", e);
            pipeline.destroy().await;
            return EXIT_STARTUP;
        }
    };
    log::info!(
        "Input finished: {} line(s), {} submitted, {} malformed",
        summary.lines,
        summary.submitted,
        summary.malformed
    );

    if !shutdown.is_shutdown_requested() {
        tokio::select! {
            _ = drain(&pipeline, settle_budget) => {}
            _ = shutdown.requested() => log::info!("Abandoning pending work"),
        }
    }

    let final_state = pipeline.state();
    pipeline.destroy().await;

    let stats = pipeline.stats();
    log::info!(
        "Handled {} group(s): {} succeeded, {} discarded after retries, {} abandoned",
        handled.load(Ordering::Relaxed),
        stats.succeeded,
        stats.exhausted,
        stats.abandoned
    );

    match final_state {
        PipelineState::Halted { reason } => {
            log::error!("Pipeline halted: {}", reason);
            EXIT_HALTED
        }
        _ => 0,
    }
}

async fn read_input(
    args: &Args,
    pipeline: &Pipeline,
    shutdown: &ShutdownCoordinator,
) -> std::io::Result<FeedSummary> {
    let submitter = match pipeline.submitter() {
        Ok(submitter) => submitter,
        Err(e) => {
            log::warn!("Pipeline not accepting input: {}", e);
            return Ok(FeedSummary {
                closed: true,
                ..FeedSummary::default()
            });
        }
    };
    let stop = shutdown.token();

    match args.input_path() {
        Some(path) => {
            let file = tokio::fs::File::open(path).await.map_err(|e| {
                std::io::Error::new(e.kind(), format!("{}: {}", path.display(), e))
            })?;
            feed(BufReader::new(file), &submitter, &stop).await
        }
        None => feed(BufReader::new(tokio::io::stdin()), &submitter, &stop).await,
    }
}

/// Wait for outstanding groups while they keep settling
async fn drain(pipeline: &Pipeline, budget: std::time::Duration) {
    let mut pending = pipeline.stats().pending();
    while pending > 0 {
        if pipeline.wait_idle(budget).await {
            return;
        }
        if pipeline.state().is_terminal() {
            return;
        }
        let now = pipeline.stats().pending();
        if now >= pending {
            log::warn!("{} group(s) made no progress; stopping", now);
            return;
        }
        pending = now;
    }
}
