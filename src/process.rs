// src/process.rs
//! Process behaviours and the context a spawned loop runs with.

use crate::mailbox::Mailbox;
use crate::node::Node;
use crate::pid::Pid;
use async_trait::async_trait;
use std::future::Future;

/// The loop a spawned process runs.
///
/// Arguments for the process are whatever state the implementing value
/// carries. The loop ends when `run` returns; the process is then removed
/// from the node.
#[async_trait]
pub trait Behaviour: Send + 'static {
    async fn run(self, ctx: ProcessContext);
}

/// Everything a running process gets handed.
pub struct ProcessContext {
    pub pid: Pid,
    pub mailbox: Mailbox,
    pub node: Node,
}

/// Adapts a closure into a [`Behaviour`].
pub struct FnBehaviour<F>(pub F);

#[async_trait]
impl<F, Fut> Behaviour for FnBehaviour<F>
where
    F: FnOnce(ProcessContext) -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    async fn run(self, ctx: ProcessContext) {
        (self.0)(ctx).await
    }
}

/// Removes a process from its node when the loop task ends, whether it
/// returned, panicked or was aborted.
pub(crate) struct ExitGuard {
    pub(crate) node: Node,
    pub(crate) pid: Pid,
}

impl Drop for ExitGuard {
    fn drop(&mut self) {
        tracing::trace!(pid = %self.pid, "process loop finished");
        self.node.forget(&self.pid);
    }
}
