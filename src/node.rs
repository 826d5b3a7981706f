// src/node.rs
//! The node runtime: process table, name registry, EPMD registration and
//! the inbound listener, tied together behind a cheaply clonable handle.

use crate::atom::Atom;
use crate::config::{NodeConfig, SpawnConfig};
use crate::discovery;
use crate::dist::{default_codec_factory, CodecFactory, DistCodec};
use crate::epmd::NodeInfo;
use crate::error::{NodeError, SendError, StartupError};
use crate::kernel;
use crate::mailbox::{self, MailboxSender, QueueError};
use crate::network;
use crate::pid::Pid;
use crate::process::{Behaviour, ExitGuard, FnBehaviour, ProcessContext};
use crate::process_table::ProcessTable;
use crate::registry::NameRegistry;
use crate::term::Term;
use once_cell::sync::OnceCell;
use parking_lot::{Mutex, RwLock};
use std::fmt;
use std::future::Future;
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, trace};

/// Handle to a node. Clones share the same node.
#[derive(Clone)]
pub struct Node {
    inner: Arc<NodeInner>,
}

struct NodeInner {
    /// `name@domain` as an atom, stamped into every local pid.
    name: Atom,
    cookie: String,
    info: RwLock<NodeInfo>,
    /// Set once, by a successful EPMD registration.
    creation: OnceCell<u32>,
    config: NodeConfig,
    processes: ProcessTable,
    registry: NameRegistry,
    codec: CodecFactory,
    registered: Arc<AtomicBool>,
    shutdown: watch::Sender<bool>,
    state: Mutex<PublishState>,
}

enum PublishState {
    Idle,
    Publishing,
    Published {
        local_addr: SocketAddr,
        tasks: Vec<JoinHandle<()>>,
    },
    ShutDown,
}

/// Resolves once `rx` reports shutdown, or its sender is gone.
pub(crate) async fn shutdown_signalled(rx: &mut watch::Receiver<bool>) {
    let _ = rx.wait_for(|stop| *stop).await;
}

fn queue_error(pid: &Pid, e: QueueError) -> SendError {
    match e {
        QueueError::Full => SendError::Full(pid.clone()),
        QueueError::Closed => SendError::Closed(pid.clone()),
    }
}

impl Node {
    /// Create a node named `name@domain` with default settings.
    pub fn new(name: &str, cookie: &str) -> Result<Self, NodeError> {
        Self::with_config(name, cookie, NodeConfig::default())
    }

    pub fn with_config(name: &str, cookie: &str, config: NodeConfig) -> Result<Self, NodeError> {
        Self::with_codec(name, cookie, config, default_codec_factory())
    }

    /// Create a node whose peer connections are decoded by codecs from
    /// `codec`.
    pub fn with_codec(
        name: &str,
        cookie: &str,
        config: NodeConfig,
        codec: CodecFactory,
    ) -> Result<Self, NodeError> {
        let (short, domain) = match name.split_once('@') {
            Some((short, domain)) if !short.is_empty() && !domain.is_empty() && !domain.contains('@') => {
                (short, domain)
            }
            _ => return Err(NodeError::InvalidName(name.to_string())),
        };
        debug!(name, "creating node");

        let info = NodeInfo {
            full_name: name.to_string(),
            name: short.to_string(),
            domain: domain.to_string(),
            port: 0,
            node_type: config.node_type,
            protocol: config.protocol,
            high_version: config.high_version,
            low_version: config.low_version,
            creation: 0,
        };
        let (shutdown, _) = watch::channel(false);

        Ok(Self {
            inner: Arc::new(NodeInner {
                name: Atom::new(name),
                cookie: cookie.to_string(),
                info: RwLock::new(info),
                creation: OnceCell::new(),
                config,
                processes: ProcessTable::new(),
                registry: NameRegistry::new(),
                codec,
                registered: Arc::new(AtomicBool::new(false)),
                shutdown,
                state: Mutex::new(PublishState::Idle),
            }),
        })
    }

    // --- Identity ---

    /// Full `name@domain` atom.
    pub fn name(&self) -> &Atom {
        &self.inner.name
    }

    pub fn cookie(&self) -> &str {
        &self.inner.cookie
    }

    pub fn config(&self) -> &NodeConfig {
        &self.inner.config
    }

    /// Creation stamp from EPMD, 0 until the node is published.
    pub fn creation(&self) -> u32 {
        self.inner.creation.get().copied().unwrap_or(0)
    }

    /// Snapshot of the registration info.
    pub fn descriptor(&self) -> NodeInfo {
        self.inner.info.read().clone()
    }

    /// Address of the peer listener once published.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        match &*self.inner.state.lock() {
            PublishState::Published { local_addr, .. } => Some(*local_addr),
            _ => None,
        }
    }

    pub fn is_published(&self) -> bool {
        matches!(*self.inner.state.lock(), PublishState::Published { .. })
    }

    /// `true` while EPMD holds this node's registration.
    pub fn is_registered(&self) -> bool {
        self.inner.registered.load(Ordering::Acquire)
    }

    // --- Processes ---

    /// Start `behaviour` as a new process and return its pid. The loop is
    /// not guaranteed to have started when this returns.
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn<B: Behaviour>(&self, behaviour: B, config: SpawnConfig) -> Pid {
        let (mailbox_size, control_size) = config.resolve(&self.inner.config);
        let (tx, mailbox) = mailbox::channel(mailbox_size, control_size);
        let pid = self
            .inner
            .processes
            .insert_new(&self.inner.name, self.creation(), tx);
        trace!(%pid, mailbox_size, control_size, "spawn");

        let ctx = ProcessContext {
            pid: pid.clone(),
            mailbox,
            node: self.clone(),
        };
        let guard = ExitGuard {
            node: self.clone(),
            pid: pid.clone(),
        };
        tokio::spawn(async move {
            let _guard = guard;
            behaviour.run(ctx).await;
        });
        pid
    }

    /// Start a closure as a new process.
    pub fn spawn_fn<F, Fut>(&self, config: SpawnConfig, f: F) -> Pid
    where
        F: FnOnce(ProcessContext) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.spawn(FnBehaviour(f), config)
    }

    /// Remove `pid` and every name bound to it, and tell its loop to stop.
    /// Returns `false` if there was no such process.
    pub fn exit(&self, pid: &Pid) -> bool {
        self.inner.registry.unregister_pid(pid);
        match self.inner.processes.remove(pid) {
            Some(mailbox) => {
                debug!(%pid, "exit");
                mailbox.stop();
                true
            }
            None => false,
        }
    }

    /// Table cleanup once a loop has ended.
    pub(crate) fn forget(&self, pid: &Pid) {
        self.inner.registry.unregister_pid(pid);
        self.inner.processes.remove(pid);
    }

    pub fn is_alive(&self, pid: &Pid) -> bool {
        self.inner.processes.contains(pid)
    }

    pub fn process_count(&self) -> usize {
        self.inner.processes.len()
    }

    // --- Registry ---

    /// Bind `name` to `pid`, replacing any previous binding.
    pub fn register(&self, name: Atom, pid: Pid) {
        trace!(%name, %pid, "register");
        self.inner.registry.register(name, pid);
    }

    pub fn unregister(&self, name: &Atom) -> Option<Pid> {
        self.inner.registry.unregister(name)
    }

    pub fn whereis(&self, name: &Atom) -> Option<Pid> {
        self.inner.registry.whereis(name)
    }

    /// Currently registered names, in no particular order.
    pub fn registered(&self) -> Vec<Atom> {
        self.inner.registry.registered()
    }

    // --- Sending ---

    fn mailbox(&self, pid: &Pid) -> Result<MailboxSender, SendError> {
        self.inner
            .processes
            .lookup(pid)
            .ok_or_else(|| SendError::NotFound(pid.clone()))
    }

    /// Put `payload` on the direct queue of `to`, waiting while it is full.
    pub async fn send(&self, to: &Pid, payload: Term) -> Result<(), SendError> {
        trace!(%to, ?payload, "send");
        self.mailbox(to)?
            .send_direct(payload)
            .await
            .map_err(|e| queue_error(to, e))
    }

    /// Put `(from, payload)` on the attributed queue of `to`, waiting while
    /// it is full.
    pub async fn send_from(&self, from: Term, to: &Pid, payload: Term) -> Result<(), SendError> {
        trace!(?from, %to, ?payload, "send_from");
        self.mailbox(to)?
            .send_from(from, payload)
            .await
            .map_err(|e| queue_error(to, e))
    }

    /// Put `signal` on the control queue of `to`.
    pub async fn send_control(&self, to: &Pid, signal: Term) -> Result<(), SendError> {
        trace!(%to, ?signal, "send_control");
        self.mailbox(to)?
            .send_control(signal)
            .await
            .map_err(|e| queue_error(to, e))
    }

    /// Like [`Node::send`] but fails with [`SendError::Full`] instead of
    /// waiting.
    pub fn try_send(&self, to: &Pid, payload: Term) -> Result<(), SendError> {
        self.mailbox(to)?
            .try_send_direct(payload)
            .map_err(|e| queue_error(to, e))
    }

    pub fn try_send_from(&self, from: Term, to: &Pid, payload: Term) -> Result<(), SendError> {
        self.mailbox(to)?
            .try_send_from(from, payload)
            .map_err(|e| queue_error(to, e))
    }

    // --- Lifecycle ---

    pub(crate) fn codec_for_connection(&self) -> Box<dyn DistCodec> {
        (self.inner.codec)(&self.descriptor(), &self.inner.cookie)
    }

    /// Bind the peer listener on `port` (0 picks a free port), register
    /// with EPMD, then start accepting connections and the well-known
    /// processes.
    ///
    /// On any error nothing is left listening.
    pub async fn publish(&self, port: u16) -> Result<(), StartupError> {
        {
            let mut state = self.inner.state.lock();
            match *state {
                PublishState::Idle => *state = PublishState::Publishing,
                PublishState::ShutDown => return Err(StartupError::ShutDown),
                _ => return Err(StartupError::AlreadyPublished),
            }
        }
        info!(port, "publishing node");

        let result = self.bring_up(port).await;
        if result.is_err() {
            let mut state = self.inner.state.lock();
            if matches!(*state, PublishState::Publishing) {
                *state = PublishState::Idle;
            }
        }
        result
    }

    async fn bring_up(&self, port: u16) -> Result<(), StartupError> {
        let listener = TcpListener::bind((Ipv4Addr::UNSPECIFIED, port))
            .await
            .map_err(StartupError::Bind)?;
        let local_addr = listener.local_addr().map_err(StartupError::Bind)?;
        let info = {
            let mut info = self.inner.info.write();
            info.port = local_addr.port();
            info.clone()
        };

        let registration = discovery::register(self.inner.config.epmd_addr, &info).await?;

        let mut state = self.inner.state.lock();
        if !matches!(*state, PublishState::Publishing) {
            // shut down while talking to EPMD; listener and registration
            // are dropped here
            return Err(StartupError::ShutDown);
        }

        if self.inner.creation.set(registration.creation).is_ok() {
            self.inner.info.write().creation = registration.creation;
        }
        self.inner.registered.store(true, Ordering::Release);

        let keeper = tokio::spawn(discovery::hold(
            registration,
            self.inner.registered.clone(),
            self.inner.shutdown.subscribe(),
        ));
        let acceptor = tokio::spawn(network::accept_loop(
            self.clone(),
            listener,
            self.inner.shutdown.subscribe(),
        ));
        let [net_kernel, global] = kernel::start(self);
        debug!(%net_kernel, %global, "well-known processes started");

        info!(%local_addr, creation = self.creation(), "node published");
        *state = PublishState::Published {
            local_addr,
            tasks: vec![acceptor, keeper],
        };
        Ok(())
    }

    /// Stop accepting, close every peer connection and the EPMD
    /// registration, stop every process and clear both tables.
    ///
    /// Sends to any previously spawned pid fail with
    /// [`SendError::NotFound`] afterwards.
    pub async fn shutdown(&self) {
        let previous = std::mem::replace(&mut *self.inner.state.lock(), PublishState::ShutDown);
        self.inner.shutdown.send_replace(true);

        if let PublishState::Published { tasks, .. } = previous {
            for task in tasks {
                let _ = task.await;
            }
        }

        let stopped = self.inner.processes.drain();
        for (pid, mailbox) in &stopped {
            trace!(%pid, "stopping");
            mailbox.stop();
        }
        self.inner.registry.clear();
        self.inner.registered.store(false, Ordering::Release);
        info!(processes = stopped.len(), "node shut down");
    }
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Node")
            .field("name", &self.inner.name)
            .field("creation", &self.creation())
            .field("processes", &self.inner.processes.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mailbox::Envelope;
    use std::collections::HashSet;
    use std::time::Duration;
    use tokio::sync::oneshot;

    #[test]
    fn name_must_have_a_domain() {
        assert!(Node::new("plain", "c").is_err());
        assert!(Node::new("@host", "c").is_err());
        assert!(Node::new("name@", "c").is_err());
        assert!(Node::new("a@b@c", "c").is_err());

        let node = Node::new("gonode@localhost", "c").unwrap();
        let info = node.descriptor();
        assert_eq!(info.name, "gonode");
        assert_eq!(info.domain, "localhost");
        assert_eq!(info.node_type, 77);
        assert_eq!(node.creation(), 0);
        assert!(!node.is_published());
    }

    #[tokio::test]
    async fn spawn_hands_over_pid_and_mailbox() {
        let node = Node::new("p@localhost", "c").unwrap();
        let (tx, rx) = oneshot::channel();
        let pid = node.spawn_fn(SpawnConfig::default(), move |mut ctx| async move {
            let first = ctx.mailbox.recv_direct().await;
            let _ = tx.send((ctx.pid.clone(), first));
        });
        assert_eq!(pid.node, Atom::new("p@localhost"));
        node.send(&pid, Term::from(7)).await.unwrap();
        let (seen, first) = rx.await.unwrap();
        assert_eq!(seen, pid);
        assert_eq!(first, Some(Term::from(7)));
    }

    #[tokio::test]
    async fn direct_sends_arrive_in_order() {
        let node = Node::new("p@localhost", "c").unwrap();
        let (tx, rx) = oneshot::channel();
        let pid = node.spawn_fn(SpawnConfig::default().with_mailbox_size(4), move |mut ctx| async move {
            let mut got = Vec::new();
            while got.len() < 50 {
                match ctx.mailbox.recv_direct().await {
                    Some(t) => got.push(t),
                    None => break,
                }
            }
            let _ = tx.send(got);
        });
        for i in 0..50 {
            node.send(&pid, Term::from(i)).await.unwrap();
        }
        let got = rx.await.unwrap();
        assert_eq!(got, (0..50).map(Term::from).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn send_to_unknown_pid_fails() {
        let node = Node::new("p@localhost", "c").unwrap();
        let ghost = Pid::new(node.name().clone(), 42, 0, 0);
        assert_eq!(
            node.send(&ghost, Term::from(1)).await,
            Err(SendError::NotFound(ghost.clone()))
        );
        assert_eq!(
            node.try_send_from(Term::from(0), &ghost, Term::from(1)),
            Err(SendError::NotFound(ghost))
        );
    }

    #[tokio::test]
    async fn try_send_reports_full() {
        let node = Node::new("p@localhost", "c").unwrap();
        let (release_tx, release_rx) = oneshot::channel::<()>();
        let pid = node.spawn_fn(SpawnConfig::default().with_mailbox_size(1), move |ctx| async move {
            let _ctx = ctx;
            let _ = release_rx.await;
        });
        node.try_send(&pid, Term::from(1)).unwrap();
        assert_eq!(node.try_send(&pid, Term::from(2)), Err(SendError::Full(pid.clone())));
        let _ = release_tx.send(());
    }

    #[tokio::test]
    async fn concurrent_spawns_get_distinct_pids() {
        let node = Node::new("p@localhost", "c").unwrap();
        let handles: Vec<_> = (0..64)
            .map(|_| {
                let node = node.clone();
                tokio::spawn(async move {
                    node.spawn_fn(SpawnConfig::default(), |mut ctx| async move {
                        ctx.mailbox.stopped().await;
                    })
                })
            })
            .collect();
        let mut pids = HashSet::new();
        for h in handles {
            assert!(pids.insert(h.await.unwrap()));
        }
        assert_eq!(pids.len(), 64);
        assert_eq!(node.process_count(), 64);
    }

    #[tokio::test]
    async fn exit_removes_process_and_names() {
        let node = Node::new("p@localhost", "c").unwrap();
        let (tx, rx) = oneshot::channel();
        let pid = node.spawn_fn(SpawnConfig::default(), move |mut ctx| async move {
            let _ = tx.send(ctx.mailbox.recv().await);
        });
        node.register(Atom::new("worker"), pid.clone());

        assert!(node.exit(&pid));
        assert!(!node.is_alive(&pid));
        assert_eq!(node.whereis(&Atom::new("worker")), None);
        assert_eq!(rx.await.unwrap(), None);
        assert!(!node.exit(&pid));
    }

    #[tokio::test]
    async fn finished_loop_cleans_up() {
        let node = Node::new("p@localhost", "c").unwrap();
        let pid = node.spawn_fn(SpawnConfig::default(), |_ctx| async {});
        node.register(Atom::new("short_lived"), pid.clone());
        for _ in 0..100 {
            if !node.is_alive(&pid) {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert!(!node.is_alive(&pid));
        assert!(node.registered().is_empty());
    }

    #[tokio::test]
    async fn control_queue_is_separate() {
        let node = Node::new("p@localhost", "c").unwrap();
        let (tx, rx) = oneshot::channel();
        let pid = node.spawn_fn(SpawnConfig::default(), move |mut ctx| async move {
            let _ = tx.send(ctx.mailbox.recv().await);
        });
        node.send_control(&pid, Term::from(1)).await.unwrap();
        assert_eq!(rx.await.unwrap(), Some(Envelope::Control(Term::from(1))));
    }

    #[tokio::test]
    async fn shutdown_without_publish_clears_tables() {
        let node = Node::new("p@localhost", "c").unwrap();
        let pid = node.spawn_fn(SpawnConfig::default(), |mut ctx| async move {
            ctx.mailbox.stopped().await;
        });
        node.register(Atom::new("x"), pid.clone());
        node.shutdown().await;
        assert_eq!(node.process_count(), 0);
        assert!(node.registered().is_empty());
        assert_eq!(
            node.send(&pid, Term::from(1)).await,
            Err(SendError::NotFound(pid))
        );
        assert!(matches!(node.publish(0).await, Err(StartupError::ShutDown)));
    }
}
