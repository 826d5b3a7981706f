// src/kernel.rs
//! Well-known processes every published node runs.
//!
//! Peers address these by name. Outbound replies are not supported, so
//! both simply drain their mailboxes.

use crate::atom::Atom;
use crate::config::SpawnConfig;
use crate::mailbox::Envelope;
use crate::node::Node;
use crate::pid::Pid;
use crate::process::{Behaviour, ProcessContext};
use async_trait::async_trait;
use tracing::trace;

pub const NET_KERNEL: &str = "net_kernel";
pub const GLOBAL_NAME_SERVER: &str = "global_name_server";

/// Receives `net_kernel` requests such as `is_auth` pings.
pub struct NetKernel;

/// Receives global name registration traffic.
pub struct GlobalNameServer;

#[async_trait]
impl Behaviour for NetKernel {
    async fn run(self, ctx: ProcessContext) {
        drain(NET_KERNEL, ctx).await
    }
}

#[async_trait]
impl Behaviour for GlobalNameServer {
    async fn run(self, ctx: ProcessContext) {
        drain(GLOBAL_NAME_SERVER, ctx).await
    }
}

async fn drain(name: &'static str, mut ctx: ProcessContext) {
    while let Some(envelope) = ctx.mailbox.recv().await {
        match envelope {
            Envelope::From { sender, payload } => {
                trace!(process = name, from = ?sender, message = ?payload, "ignored");
            }
            Envelope::Direct(payload) => trace!(process = name, message = ?payload, "ignored"),
            Envelope::Control(signal) => trace!(process = name, signal = ?signal, "control"),
        }
    }
}

/// Spawn and register the well-known processes.
pub(crate) fn start(node: &Node) -> [Pid; 2] {
    let net_kernel = node.spawn(NetKernel, SpawnConfig::default());
    node.register(Atom::new(NET_KERNEL), net_kernel.clone());

    let global = node.spawn(GlobalNameServer, SpawnConfig::default());
    node.register(Atom::new(GLOBAL_NAME_SERVER), global.clone());

    [net_kernel, global]
}
