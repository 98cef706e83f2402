//! Telemetry Agent - demo host
//!
//! Stands in for an interactive application: every stdin line
//! `<kind> <payload>` is tracked as an event. Lifecycle commands:
//! `:suspend`, `:resume`, `:view`, `:flush`, `:status`.
//! Ctrl-C or end of input terminates the service.

use anyhow::Context;
use tokio::io::{AsyncBufReadExt, BufReader};

use telemetry_agent::{constants, TelemetryConfig, TelemetryService};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    log::info!("Starting Telemetry Agent v{}...", constants::APP_VERSION);

    let config = TelemetryConfig::from_env();
    let service = TelemetryService::launch(config).context("Failed to start telemetry service")?;

    log::info!("   Server: {}", service.config().server_url);
    log::info!("   Cooldown: {}s", service.config().cooldown_secs);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        tokio::select! {
            line = lines.next_line() => {
                match line.context("Failed to read stdin")? {
                    Some(line) => handle_line(&service, line.trim()).await,
                    None => break,
                }
            }
            _ = tokio::signal::ctrl_c() => {
                log::info!("Interrupted");
                break;
            }
        }
    }

    let cached = service.on_terminate().context("Failed to cache pending events")?;
    log::info!("Telemetry Agent stopped ({} events cached)", cached);
    Ok(())
}

async fn handle_line(service: &TelemetryService, line: &str) {
    match line {
        "" => {}
        ":suspend" => {
            if let Err(e) = service.on_suspend() {
                log::error!("Suspend failed: {}", e);
            }
        }
        ":resume" => {
            if let Err(e) = service.on_resume() {
                log::error!("Resume failed: {}", e);
            }
        }
        ":view" => {
            if let Err(e) = service.on_view_change() {
                log::error!("View change failed: {}", e);
            }
        }
        ":flush" => {
            let outcome = service.flush().await;
            log::info!("Flush: {:?}", outcome);
        }
        ":status" => match serde_json::to_string_pretty(&service.status()) {
            Ok(json) => println!("{}", json),
            Err(e) => log::error!("Failed to serialize status: {}", e),
        },
        _ => {
            let (kind, payload) = line.split_once(' ').unwrap_or((line, ""));
            service.track_event(kind, payload.trim());
        }
    }
}
