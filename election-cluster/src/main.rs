use clap::Parser;
use tracing_subscriber::EnvFilter;

use election_cluster::shutdown::install_shutdown_handler;
use election_cluster::{Cluster, ClusterConfig, RunReport, TransportKind};
use election_transport::NetworkOptions;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = ClusterConfig::parse();
    config.validate()?;

    tracing::info!(
        nodes = config.nodes,
        transport = ?config.transport,
        base_port = config.base_port,
        heartbeat_ms = config.heartbeat_interval_ms,
        timeout_min_ms = config.election_timeout_min_ms,
        timeout_max_ms = config.election_timeout_max_ms,
        duration_secs = config.duration_secs,
        "Starting cluster"
    );

    let interrupt = install_shutdown_handler();
    let statuses = match config.transport {
        TransportKind::Udp => {
            Cluster::bind(&config)
                .await?
                .run(config.run_duration(), interrupt)
                .await
        }
        TransportKind::Memory => {
            Cluster::in_memory(&config, NetworkOptions::lossy(config.loss))?
                .run(config.run_duration(), interrupt)
                .await
        }
    };

    let report = RunReport::from_statuses(statuses);
    match report.leader {
        Some(leader) => tracing::info!(leader, term = report.term, "Run finished"),
        None => tracing::warn!(term = report.term, "Run finished without a leader"),
    }
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
