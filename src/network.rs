// src/network.rs
//! Inbound peer connections: accept loop and per-connection read loop.

use crate::dispatch;
use crate::error::DistError;
use crate::node::{shutdown_signalled, Node};
use std::net::SocketAddr;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::{debug, info, trace, warn};

/// Accept peers until shutdown. Each connection gets its own task; on
/// shutdown every connection task is cancelled and the listener closed.
pub(crate) async fn accept_loop(
    node: Node,
    listener: TcpListener,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut connections = JoinSet::new();
    loop {
        tokio::select! {
            _ = shutdown_signalled(&mut shutdown) => break,
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    debug!(%peer, "accepted peer connection");
                    connections.spawn(serve_connection(node.clone(), stream, peer));
                }
                Err(e) => warn!(error = %e, "accept failed"),
            },
            Some(_) = connections.join_next(), if !connections.is_empty() => {}
        }
    }
    info!(open = connections.len(), "stopping listener");
    connections.shutdown().await;
}

/// Read frames until the peer goes away or a frame cannot be decoded.
/// Routing failures drop the offending message and keep the connection.
pub(crate) async fn serve_connection(node: Node, mut stream: TcpStream, peer: SocketAddr) {
    let mut codec = node.codec_for_connection();
    loop {
        let terms = match codec.read_message(&mut stream).await {
            Ok(terms) => terms,
            Err(DistError::Closed) => {
                debug!(%peer, "peer closed connection");
                break;
            }
            Err(e) => {
                warn!(%peer, error = %e, "closing connection");
                break;
            }
        };
        trace!(%peer, terms = ?terms, "frame");
        if let Err(e) = dispatch::route(&node, terms).await {
            warn!(%peer, error = %e, "dropping message");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::atom::Atom;
    use crate::dist::{encode_frame, PASS_THROUGH};
    use crate::etf;
    use crate::term::Term;
    use crate::SpawnConfig;
    use std::time::Duration;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::sync::mpsc;

    fn reg_send(to: &str) -> Term {
        Term::tuple([
            Term::from(dispatch::REG_SEND),
            Term::Atom(Atom::new("peer")),
            Term::Atom(Atom::new("")),
            Term::Atom(Atom::new(to)),
        ])
    }

    /// Node with a `sink` process forwarding attributed messages, serving
    /// peers on a loopback listener.
    async fn serving_node() -> (Node, SocketAddr, mpsc::UnboundedReceiver<(Term, Term)>, watch::Sender<bool>) {
        let node = Node::new("n@localhost", "cookie").unwrap();
        let (tx, rx) = mpsc::unbounded_channel();
        let pid = node.spawn_fn(SpawnConfig::default(), move |mut ctx| async move {
            while let Some((from, msg)) = ctx.mailbox.recv_from().await {
                let _ = tx.send((from, msg));
            }
        });
        node.register(Atom::new("sink"), pid);

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (stop_tx, stop_rx) = watch::channel(false);
        tokio::spawn(accept_loop(node.clone(), listener, stop_rx));
        (node, addr, rx, stop_tx)
    }

    async fn assert_closed(peer: &mut TcpStream) {
        let mut buf = [0u8; 1];
        let read = tokio::time::timeout(Duration::from_secs(5), peer.read(&mut buf))
            .await
            .unwrap();
        assert!(matches!(read, Ok(0) | Err(_)));
    }

    #[tokio::test]
    async fn bad_message_does_not_close_connection() {
        let (_node, addr, mut rx, _stop) = serving_node().await;

        let mut peer = TcpStream::connect(addr).await.unwrap();
        // unknown name, then a good one on the same connection
        peer.write_all(&encode_frame(&[reg_send("ghost"), Term::from(1)]).unwrap())
            .await
            .unwrap();
        peer.write_all(&encode_frame(&[reg_send("sink"), Term::from(2)]).unwrap())
            .await
            .unwrap();

        let (from, msg) = rx.recv().await.unwrap();
        assert_eq!(from, Term::Atom(Atom::new("peer")));
        assert_eq!(msg, Term::from(2));
    }

    #[tokio::test]
    async fn undecodable_frame_closes_only_its_connection() {
        let (node, addr, mut rx, _stop) = serving_node().await;

        let mut healthy = TcpStream::connect(addr).await.unwrap();
        let mut bad_tag = TcpStream::connect(addr).await.unwrap();
        let mut too_deep = TcpStream::connect(addr).await.unwrap();

        bad_tag.write_all(&[0, 0, 0, 2, 113, 0]).await.unwrap();

        let mut nested = vec![PASS_THROUGH, etf::VERSION];
        for _ in 0..100_000 {
            nested.extend_from_slice(&[104, 1]);
        }
        nested.push(106);
        too_deep.write_u32(nested.len() as u32).await.unwrap();
        too_deep.write_all(&nested).await.unwrap();

        assert_closed(&mut bad_tag).await;
        assert_closed(&mut too_deep).await;

        healthy
            .write_all(&encode_frame(&[reg_send("sink"), Term::from(3)]).unwrap())
            .await
            .unwrap();
        let (_, msg) = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(msg, Term::from(3));

        // the node still accepts new peers
        let mut late = TcpStream::connect(addr).await.unwrap();
        late.write_all(&encode_frame(&[reg_send("sink"), Term::from(4)]).unwrap())
            .await
            .unwrap();
        assert_eq!(rx.recv().await.map(|(_, msg)| msg), Some(Term::from(4)));
        assert!(node.whereis(&Atom::new("sink")).is_some());
    }
}
