use anyhow::Result;
use clap::Parser;
use rmcp::{transport::stdio, ServiceExt};
use sysinfo::{ProcessesToUpdate, System};

use appmcp_agent::server::AutomationServer;
use appmcp_agent::utils::init_logging;

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "appmcp agent - desktop GUI automation via the Model Context Protocol"
)]
struct Args {
    /// Default log level when APPMCP_LOG is unset
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Seconds between registry sweeps
    #[arg(long, default_value = "60")]
    sweep_interval_secs: u64,

    /// Kill other appmcp-agent processes before starting
    #[arg(long)]
    replace: bool,
}

/// A controller restart can leave an older agent attached to the same client
/// configuration; with --replace we take its place.
fn kill_previous_instances() {
    let current_pid = std::process::id();
    let mut system = System::new();
    system.refresh_processes(ProcessesToUpdate::All, true);

    for (pid, process) in system.processes() {
        let name = process.name().to_string_lossy().to_lowercase();
        if name.contains("appmcp-agent") && pid.as_u32() != current_pid {
            eprintln!("Found existing agent with PID {}, killing it", pid.as_u32());
            if !process.kill() {
                eprintln!(
                    "Failed to kill agent with PID {} (may require elevated permissions)",
                    pid.as_u32()
                );
            }
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    if args.replace {
        kill_previous_instances();
    }

    // Never write to stdout during a panic; it corrupts the JSON-RPC stream.
    std::panic::set_hook(Box::new(|panic_info| {
        if let Some(s) = panic_info.payload().downcast_ref::<&str>() {
            eprintln!("appmcp-agent panic: {s}");
        } else {
            eprintln!("appmcp-agent panic occurred");
        }
        if let Some(location) = panic_info.location() {
            eprintln!("panic location: {}:{}", location.file(), location.line());
        }
    }));

    let _log_guard = init_logging(&args.log_level)?;

    tracing::info!("appmcp-agent v{}", env!("CARGO_PKG_VERSION"));
    if let Ok(exe) = std::env::current_exe() {
        tracing::info!("binary path: {}", exe.display());
        if let Ok(metadata) = std::fs::metadata(&exe) {
            if let Ok(modified) = metadata.modified() {
                let modified: chrono::DateTime<chrono::Utc> = modified.into();
                tracing::info!("binary built: {} UTC", modified.format("%Y-%m-%d %H:%M:%S"));
            }
        }
    }

    tracing::info!("initializing automation server (stdio transport)");
    let server = match AutomationServer::new() {
        Ok(s) => s,
        Err(e) => {
            tracing::error!("failed to initialize automation server: {e}");
            eprintln!("Fatal: failed to initialize automation server: {e}");
            std::process::exit(1);
        }
    };
    server.report_permissions();
    let health = server.health();
    tracing::info!(
        status = ?health.status,
        applications = health.application_count,
        check_ms = health.check_duration_ms,
        "automation health"
    );
    let sweeper =
        server.spawn_sweeper(std::time::Duration::from_secs(args.sweep_interval_secs.max(1)));

    let service = server.serve(stdio()).await.inspect_err(|e| {
        tracing::error!("serving error: {e:?}");
        eprintln!("Fatal: stdio communication error: {e}");
        std::process::exit(1);
    })?;

    service.waiting().await?;
    sweeper.abort();
    Ok(())
}
