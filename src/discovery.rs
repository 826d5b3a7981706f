// src/discovery.rs
//! EPMD registration: announce this node and obtain its creation stamp.

use crate::epmd::{self, Alive2Response, EpmdError, NodeInfo};
use crate::error::StartupError;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::io::AsyncReadExt;
use tokio::net::TcpStream;
use tokio::sync::watch;
use tracing::{debug, info, trace, warn};

/// An accepted registration. The daemon keeps the name registered only
/// while `stream` stays open.
pub(crate) struct Registration {
    pub(crate) creation: u32,
    stream: TcpStream,
}

fn startup_error(e: EpmdError) -> StartupError {
    match e {
        EpmdError::Io(io) => StartupError::EpmdUnreachable(io),
        other => StartupError::EpmdProtocol(other),
    }
}

/// Connect to the daemon at `addr` and register `info`.
pub(crate) async fn register(addr: SocketAddr, info: &NodeInfo) -> Result<Registration, StartupError> {
    let mut stream = TcpStream::connect(addr)
        .await
        .map_err(StartupError::EpmdUnreachable)?;
    debug!(%addr, name = %info.name, port = info.port, "registering with EPMD");

    let request = epmd::compose_alive2_req(info);
    trace!(bytes = ?&request[..], "to EPMD");
    epmd::write_frame(&mut stream, &request)
        .await
        .map_err(startup_error)?;

    let reply = epmd::read_alive2_resp(&mut stream)
        .await
        .map_err(startup_error)?;
    trace!(bytes = ?&reply[..], "from EPMD");

    match epmd::parse_alive2_resp(&reply).map_err(startup_error)? {
        Alive2Response::Registered { creation } => {
            info!(name = %info.name, creation, "registered with EPMD");
            Ok(Registration { creation, stream })
        }
        Alive2Response::Rejected { code } => {
            debug!(name = %info.name, code, "EPMD rejected registration");
            Err(StartupError::DuplicateName(info.name.clone()))
        }
    }
}

/// Keep the registration connection open until shutdown. If the daemon
/// drops it first, `registered` is cleared.
pub(crate) async fn hold(
    registration: Registration,
    registered: Arc<AtomicBool>,
    mut shutdown: watch::Receiver<bool>,
) {
    let Registration { mut stream, .. } = registration;
    let mut buf = [0u8; 64];
    loop {
        tokio::select! {
            _ = crate::node::shutdown_signalled(&mut shutdown) => {
                debug!("closing EPMD registration");
                break;
            }
            read = stream.read(&mut buf) => match read {
                Ok(0) => {
                    warn!("EPMD closed the registration connection");
                    registered.store(false, Ordering::Release);
                    break;
                }
                Ok(n) => trace!(bytes = ?&buf[..n], "unexpected data from EPMD"),
                Err(e) => {
                    warn!(error = %e, "EPMD registration connection failed");
                    registered.store(false, Ordering::Release);
                    break;
                }
            }
        }
    }
}
