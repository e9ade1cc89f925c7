//! retrytopic-topology: retry chain inspection and provisioning
//!
//! Loads the retry topic configurations and prints the destination chain of
//! every explicitly listed topic. With `--create` (and the `kafka` feature)
//! the destination topics are created on the configured cluster.
//!
//! ```text
//! orders
//!   orders [MAIN] delay=0ms attempts=1
//!   orders-retry-0 [RETRY] delay=1000ms attempts=1
//!   orders-retry-1 [RETRY] delay=2000ms attempts=1
//!   orders-dlt [DLT] delay=0ms attempts=1
//! ```
//!
//! ## Configuration
//! - `--config <path>`: YAML file (see `retrytopic::config::Config`)
//! - RETRYTOPIC_LOG: log filter (default: info)

use std::sync::Arc;

use tracing::{error, info, warn};

use retrytopic::bus::InMemoryBroker;
use retrytopic::config::Config;
use retrytopic::retrytopic::RetryTopicConfigurer;
use retrytopic::utils::bootstrap::{init_tracing, parse_config_path};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();

    let create = std::env::args().skip(1).any(|arg| arg == "--create");

    let config_path = parse_config_path();
    let config = Config::load(config_path.as_deref()).map_err(|e| {
        error!("Failed to load configuration: {}", e);
        e
    })?;

    if config.retry_topics.is_empty() {
        warn!("No retry topic configurations found");
        return Ok(());
    }

    // Chains are built against an in-memory broker; nothing is provisioned.
    let broker = Arc::new(InMemoryBroker::new());
    let mut planner =
        RetryTopicConfigurer::from_config(&config, broker.clone(), broker.clone(), broker)?;

    let configurations = planner.configurations().to_vec();
    for configuration in &configurations {
        if configuration.topics.is_empty() {
            info!("Skipping configuration without explicit topics");
            continue;
        }
        let topics: Vec<&str> = configuration.topics.iter().map(String::as_str).collect();
        let context = planner.build_topology(configuration, &topics)?;
        for chain in context.chains() {
            println!("{}", chain.source_topic());
            for destination in chain.destinations() {
                println!("  {}", destination);
            }
        }
    }
    planner.shutdown();

    if create {
        provision(&config).await?;
    }

    Ok(())
}

#[cfg(feature = "kafka")]
async fn provision(config: &Config) -> Result<(), Box<dyn std::error::Error>> {
    use retrytopic::bus::KafkaBroker;

    let broker = Arc::new(KafkaBroker::new(config.kafka.clone())?);
    let mut configurer =
        RetryTopicConfigurer::from_config(config, broker.clone(), broker.clone(), broker)?;

    let configurations = configurer.configurations().to_vec();
    for configuration in configurations.iter().filter(|c| !c.topics.is_empty()) {
        let topics: Vec<&str> = configuration.topics.iter().map(String::as_str).collect();
        let destinations = configurer.declare_topology(configuration, &topics).await?;
        info!(
            topics = ?topics,
            destinations = destinations.len(),
            "Declared retry topology"
        );
    }
    configurer.shutdown();
    Ok(())
}

#[cfg(not(feature = "kafka"))]
async fn provision(_config: &Config) -> Result<(), Box<dyn std::error::Error>> {
    Err("--create requires the 'kafka' feature".into())
}
