use anyhow::Result;
use clap::{Parser, Subcommand};

use packetpulse::config::{parse_duration, EngineConfig};
use packetpulse::engine::{ProbeMethod, RunConfig};
use packetpulse::{policy, report};

#[derive(Parser)]
#[command(
    name = "packetpulse",
    about = "Self-bounded network probe loops for private and lab targets",
    version,
    long_about = None
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a bounded probe against a permitted-range target
    Run {
        /// Target as host:port (private/loopback/reserved ranges only)
        #[arg(long)]
        target: String,

        /// Probe method: udp or tcp
        #[arg(long, default_value = "udp")]
        method: String,

        /// Run duration (e.g. 10s, 500ms, 2m)
        #[arg(long, default_value = "10s")]
        duration: String,

        /// Number of concurrent workers
        #[arg(long, default_value = "4")]
        width: u32,

        /// Progress reporting interval
        #[arg(long, default_value = "5s")]
        interval: String,

        /// Stop after this many attempts (0 = unlimited)
        #[arg(long, default_value = "0")]
        max_attempts: u64,

        /// Print the final report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Classify a target and check it against the permitted-range policy
    Check {
        /// Target as host:port
        #[arg(long)]
        target: String,
    },

    /// Show the effective engine limits and probe settings
    Limits {
        /// JSON output for machine parsing
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = EngineConfig::load_or_default();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(config.logging.level.clone())),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            target,
            method,
            duration,
            width,
            interval,
            max_attempts,
            json,
        } => {
            let method: ProbeMethod = method.parse()?;
            let mut run_config = RunConfig::new(target, method, parse_duration(&duration)?, width);
            run_config.max_attempts = max_attempts;
            run_config.report_interval = Some(parse_duration(&interval)?);

            let handle = packetpulse::start(run_config, &config).await?;

            // Ctrl-C requests a cooperative stop; the run drains and the
            // final report is still printed.
            let stopper = handle.stopper();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    tracing::info!("interrupt received, stopping run");
                    stopper.stop();
                }
            });

            let mut progress = handle.subscribe();
            let progress_printer = tokio::spawn(async move {
                while progress.changed().await.is_ok() {
                    let snap = progress.borrow().clone();
                    println!(
                        "[{:>7.1}s] {} attempts, {} ok, {} failed ({:.1}/s)",
                        snap.elapsed_sec,
                        report::format_number(snap.attempts),
                        report::format_number(snap.successes),
                        report::format_number(snap.failures),
                        snap.rate,
                    );
                }
            });

            let final_report = handle.await_completion().await;
            let _ = progress_printer.await;

            if json {
                println!("{}", serde_json::to_string_pretty(&final_report)?);
            } else {
                println!("{}", report::format_summary(&final_report));
            }

            if final_report.end_state == packetpulse::EndState::Failed {
                anyhow::bail!(
                    "run failed: {}",
                    final_report.error.as_deref().unwrap_or("unknown error")
                );
            }
        }

        Commands::Check { target } => match policy::resolve_target(&target).await {
            Ok(addr) => {
                let class = policy::classify_ip(&addr.ip());
                println!("{:<22} | {:<14} | Permitted", "Address", "Class");
                println!("{:-<22}-|-{:-<14}-|-{:-<9}", "", "", "");
                println!("{:<22} | {:<14} | yes", addr, class);
            }
            Err(e) => {
                println!("rejected: {e}");
                std::process::exit(1);
            }
        },

        Commands::Limits { json } => {
            if json {
                println!("{}", serde_json::to_string_pretty(&config)?);
            } else {
                println!("{:<22} | Value", "Setting");
                println!("{:-<22}-|-{:-<12}", "", "");
                println!("{:<22} | {}s", "max duration", config.limits.max_duration_sec);
                println!("{:<22} | {}", "max width", config.limits.max_width);
                println!(
                    "{:<22} | {}",
                    "max packet rate",
                    if config.limits.max_packet_rate == 0 {
                        "unlimited".to_string()
                    } else {
                        format!("{}/s per worker", config.limits.max_packet_rate)
                    }
                );
                println!(
                    "{:<22} | {}",
                    "max attempts",
                    if config.limits.max_attempts == 0 {
                        "unlimited".to_string()
                    } else {
                        report::format_number(config.limits.max_attempts)
                    }
                );
                println!("{:<22} | {} bytes", "payload size", config.probe.payload_size);
                println!("{:<22} | {}ms", "iteration timeout", config.probe.iter_timeout_ms);
                println!(
                    "{:<22} | {}s",
                    "report interval", config.probe.report_interval_sec
                );
            }
        }
    }

    Ok(())
}
