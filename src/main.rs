//! threadmind — console entry point.
//!
//! Startup sequence:
//!   1. Load .env (if present)
//!   2. Parse CLI flags, load config
//!   3. Init logger once (CLI `-v` flags > config/env)
//!   4. Build the completion provider and memory client
//!   5. Start the runtime: ensure user + thread, run the console
//!   6. Drain background persistence, then shut the runtime down with a grace period

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use threadmind::agent::TurnOrchestrator;
use threadmind::config::{self, Config};
use threadmind::console::{self, ConsoleSession};
use threadmind::error::AppError;
use threadmind::llm::providers;
use threadmind::logger;
use threadmind::runtime;
use threadmind::memory::zep::ZepClient;
use threadmind::memory::MemoryAdapter;
use threadmind::tasks::TaskRegistry;

fn main() {
    if let Err(e) = run() {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}

struct CliArgs {
    log_level: Option<&'static str>,
    config_path: Option<String>,
}

fn run() -> Result<(), AppError> {
    // .env is optional.
    let _ = dotenvy::dotenv();

    let args = parse_cli_args();
    let config = config::load(args.config_path.as_deref())?;

    let effective_log_level = args.log_level.unwrap_or(config.log_level.as_str());
    logger::init(effective_log_level, args.log_level.is_some(), config.log_file.as_deref())?;

    let thread_id = config.thread_id();
    info!(
        user_id = %config.agent.user_id,
        %thread_id,
        provider = %config.llm.provider,
        model = %config.model(),
        short_history_max = config.agent.short_history_max,
        "config loaded"
    );

    let llm = providers::build(&config.llm, config.llm_api_key.clone())?;
    // Built outside the runtime: the blocking HTTP client must not be
    // created or dropped on an async worker.
    let memory = build_memory(&config)?;
    let tasks = TaskRegistry::new();

    let orchestrator = Arc::new(
        TurnOrchestrator::new(memory, llm, Arc::clone(&tasks), config.model())
            .with_template_id(config.memory.template_id.clone()),
    );

    let rt = runtime::build()?;

    let future = async {
        let shutdown = CancellationToken::new();
        let ctrlc_token = shutdown.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("ctrl-c received, shutting down");
                ctrlc_token.cancel();
            }
        });

        orchestrator
            .ensure_user_and_thread(&thread_id, &config.agent.user_id)
            .await;

        let session = ConsoleSession::new(
            Arc::clone(&orchestrator),
            config.agent.user_id.clone(),
            thread_id.clone(),
            config.agent.short_history_max,
        );
        let result = console::run(session, shutdown).await;

        if !tasks.is_idle() {
            info!(pending = tasks.live_count(), "waiting for background writes");
        }
        tasks.drain().await;
        let (succeeded, failed) = tasks.totals();
        info!(succeeded, failed, "background writes finished");
        result
    };
    // A stdin read may still be parked on the blocking pool after Ctrl-C.
    let result = runtime::run_to_completion(rt, future, runtime::SHUTDOWN_GRACE);

    drop(orchestrator);
    result
}

/// Memory client when enabled and keyed; otherwise a disabled adapter.
fn build_memory(config: &Config) -> Result<MemoryAdapter, AppError> {
    if !config.memory.enabled {
        info!("memory disabled by config");
        return Ok(MemoryAdapter::disabled());
    }
    let Some(key) = config.memory_api_key.as_deref() else {
        warn!("ZEP_API_KEY not set, memory features disabled");
        return Ok(MemoryAdapter::disabled());
    };
    let client = ZepClient::new(&config.memory.api_base_url, key, config.memory.timeout_seconds)?;
    info!(api_base_url = %config.memory.api_base_url, "memory client ready");
    Ok(MemoryAdapter::new(Arc::new(client)))
}

fn parse_cli_args() -> CliArgs {
    let mut verbosity = 0u8;
    let mut config_path = None;

    let mut iter = std::env::args().skip(1);
    while let Some(arg) = iter.next() {
        if arg == "--" {
            break;
        }

        match arg.as_str() {
            "-h" | "--help" => {
                println!("Usage: threadmind [OPTIONS]");
                println!();
                println!("Options:");
                println!("  -h, --help                 Print help");
                println!("  -f, --config <PATH>        Path to configuration file (default: config/default.toml)");
                println!("  -v, -vv, -vvv, -vvvv       Set logging verbosity (warn, info, debug, trace)");
                std::process::exit(0);
            }
            "-f" | "--config" => {
                if let Some(path) = iter.next() {
                    config_path = Some(path);
                } else {
                    eprintln!("error: -f/--config requires a path argument");
                    std::process::exit(1);
                }
            }
            "--verbose" => verbosity = verbosity.saturating_add(1),
            a if a.starts_with('-') && a.len() > 1 && a.chars().skip(1).all(|c| c == 'v') => {
                verbosity = verbosity.saturating_add((a.len() - 1) as u8);
            }
            _ => {}
        }
    }

    let log_level = match verbosity {
        0 => None,
        1 => Some("warn"),
        2 => Some("info"),
        3 => Some("debug"),
        _ => Some("trace"),
    };

    CliArgs { log_level, config_path }
}
