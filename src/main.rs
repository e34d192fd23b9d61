use anyhow::Result;
use std::sync::Arc;
use tracing::{info, warn};

use flux_detector::config::Config;
use flux_detector::detector::{FailureDetector, MemberList, UdpTransport};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter("flux_detector=debug,info")
        .init();

    info!("Starting Flux failure detector");

    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "config.toml".to_string());
    info!("Loading config from {}", config_path);

    let config = Config::from_file(&config_path)?;
    let detector_config = config.detector_config()?;
    let local = config.local_member();
    info!("Loaded config with {} members", config.members.len());

    let transport = UdpTransport::bind(config.node.bind_addr).await?;
    let member_list = Arc::new(MemberList::with_members(local.id.clone(), config.peers()));

    let mut detector = FailureDetector::new(
        detector_config,
        local.clone(),
        transport.clone(),
        member_list,
    );
    let mut suspects = detector.on_suspect();

    // suspicion consumer
    tokio::spawn(async move {
        while let Some(member) = suspects.recv().await {
            warn!("Member {} is SUSPECT", member);
        }
    });

    let handle = detector.start();
    info!("Failure detector running on {} as {}", transport.local_addr(), local.id);

    tokio::signal::ctrl_c().await?;
    info!("Shutting down");
    handle.stop().await?;

    Ok(())
}
