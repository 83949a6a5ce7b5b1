//! `speak-node`: run a peer-to-peer node until Ctrl-C.
//!
//! ```text
//! speak-node                    # defaults plus SPEAK_* environment overrides
//! speak-node node.toml          # file, then SPEAK_* environment overrides
//! speak-node --example-config   # print a default configuration and exit
//! ```

use std::sync::Arc;

use speak_protocol::config::NodeConfig;
use speak_protocol::error::Result;
use speak_protocol::store::FixedHeights;
use speak_protocol::transport::node::Node;
use speak_protocol::utils::{logging, metrics};
use tracing::{error, info};

fn load_config() -> Result<Option<NodeConfig>> {
    match std::env::args().nth(1).as_deref() {
        Some("--example-config") => {
            println!("{}", NodeConfig::example_config());
            Ok(None)
        }
        Some(path) => {
            let mut config = NodeConfig::from_file(path)?;
            config.apply_env(|key| std::env::var(key).ok())?;
            Ok(Some(config))
        }
        None => NodeConfig::from_env().map(Some),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let Some(config) = load_config()? else {
        return Ok(());
    };

    logging::init_logging(&config.logging);
    metrics::init_metrics();
    info!(
        app = %config.logging.app_name,
        listen = %config.server.listen_address,
        bootstrap = config.peers.bootstrap.len(),
        "Starting node"
    );

    let node = Node::new(config, Arc::new(FixedHeights::default()))?;
    if let Err(e) = node.run().await {
        error!(error = %e, "Node stopped with error");
        return Err(e);
    }

    metrics::global_metrics().log_metrics();
    info!("Node stopped");
    Ok(())
}
