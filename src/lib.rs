// src/lib.rs
//! enode: a minimal Erlang distribution peer.
//!
//! A [`Node`] spawns processes with bounded mailboxes, keeps a local name
//! registry, registers itself with EPMD and routes `REG_SEND` messages from
//! peer connections into the mailboxes of local processes.
//!
//! ```no_run
//! use enode::{Atom, Node, SpawnConfig};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let node = Node::new("demo@localhost", "secret")?;
//! let pid = node.spawn_fn(SpawnConfig::default(), |mut ctx| async move {
//!     while let Some((from, msg)) = ctx.mailbox.recv_from().await {
//!         println!("{:?} sent {:?}", from, msg);
//!     }
//! });
//! node.register(Atom::new("demo"), pid);
//! node.publish(5858).await?;
//! # Ok(())
//! # }
//! ```

pub mod atom;
pub mod config;
pub mod dispatch;
pub mod dist;
pub mod epmd;
pub mod error;
pub mod etf;
pub mod kernel;
pub mod logging;
pub mod mailbox;
pub mod node;
pub mod pid;
pub mod process;
pub mod process_table;
pub mod registry;
pub mod term;

mod discovery;
mod network;

pub use atom::Atom;
pub use config::{NodeConfig, SpawnConfig};
pub use error::{DistError, NodeError, RouteError, SendError, StartupError};
pub use mailbox::{Envelope, Mailbox};
pub use node::Node;
pub use pid::Pid;
pub use process::{Behaviour, ProcessContext};
pub use term::Term;
