//! Publish a node and log whatever peers send to the `echo` process.
//!
//! ENODE_NAME (default `echo@localhost`), ENODE_COOKIE (default `cookie`),
//! ENODE_PORT (default 5858) and ENODE_CONFIG (optional TOML file) tune it.

use enode::{Atom, Envelope, Node, NodeConfig, SpawnConfig};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = match std::env::var("ENODE_CONFIG") {
        Ok(path) => NodeConfig::load(path)?,
        Err(_) => NodeConfig::default(),
    };
    enode::logging::init(&config);

    let name = std::env::var("ENODE_NAME").unwrap_or_else(|_| "echo@localhost".into());
    let cookie = std::env::var("ENODE_COOKIE").unwrap_or_else(|_| "cookie".into());
    let port = match std::env::var("ENODE_PORT") {
        Ok(port) => port.parse()?,
        Err(_) => 5858,
    };

    let node = Node::with_config(&name, &cookie, config)?;
    node.publish(port).await?;

    let pid = node.spawn_fn(SpawnConfig::default(), |mut ctx| async move {
        while let Some(envelope) = ctx.mailbox.recv().await {
            match envelope {
                Envelope::From { sender, payload } => {
                    tracing::info!(from = ?sender, message = ?payload, "echo")
                }
                other => tracing::info!(message = ?other, "echo"),
            }
        }
    });
    node.register(Atom::new("echo"), pid);
    tracing::info!(node = %node.name(), creation = node.creation(), "ready");

    tokio::signal::ctrl_c().await?;
    node.shutdown().await;
    Ok(())
}
