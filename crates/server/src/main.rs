use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{error, info};

use benchops_infra::OpsConfig;
use benchops_observability::logging::{self, LogFormat};
use benchops_server::{OpsService, submit_line};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = OpsConfig::from_env();
    logging::init(
        config
            .as_ref()
            .map_or(LogFormat::default(), |c| c.log_format),
    );
    let config = config?;

    let service = Arc::new(OpsService::start(config).await?);
    let monitor = service.spawn_slo_monitor();

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("interrupt received");
                break;
            }
            line = lines.next_line() => match line {
                Ok(Some(line)) if line.trim().is_empty() => continue,
                Ok(Some(line)) => match submit_line(&service, &line).await {
                    Ok(job) => println!("{}", serde_json::to_string(&job)?),
                    Err(err) => println!("{}", serde_json::json!({ "error": err.to_string() })),
                },
                Ok(None) => {
                    info!("input closed, waiting for queued jobs");
                    tokio::select! {
                        _ = service.wait_until_idle() => {}
                        _ = tokio::signal::ctrl_c() => info!("interrupt received"),
                    }
                    break;
                }
                Err(err) => {
                    error!(error = %err, "failed to read submissions");
                    break;
                }
            },
        }
    }

    service.shutdown();
    if let Err(err) = monitor.await {
        error!(error = %err, "slo monitor task failed");
    }
    let tasks = service.supervisor_stats();
    info!(
        spawned = tasks.spawned,
        faulted = tasks.faulted,
        in_flight = tasks.in_flight(),
        "ops service stopped"
    );
    print!("{}", service.metrics_text());
    Ok(())
}
