// src/dist.rs
//! Distribution frame decoding for established peer connections.
//!
//! A [`DistCodec`] turns the byte stream of one connection into a sequence
//! of term lists. One codec is built per accepted connection.

use crate::epmd::NodeInfo;
use crate::error::DistError;
use crate::etf::{self, EtfError};
use crate::term::Term;
use async_trait::async_trait;
use bytes::{Buf, BufMut, Bytes, BytesMut};
use std::io::ErrorKind;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite};

/// Leading byte of every non-tick frame.
pub const PASS_THROUGH: u8 = 112;

/// Largest frame accepted from a peer.
pub const MAX_FRAME_LEN: usize = 64 * 1024 * 1024;

/// Byte stream a codec reads from (and may write to while authenticating).
pub trait Transport: AsyncRead + AsyncWrite + Unpin + Send {}

impl<T: AsyncRead + AsyncWrite + Unpin + Send> Transport for T {}

#[async_trait]
pub trait DistCodec: Send {
    /// Read the next frame. An empty list is a keepalive tick.
    async fn read_message(&mut self, io: &mut dyn Transport) -> Result<Vec<Term>, DistError>;
}

/// Builds the codec for one connection from the local node's registration
/// info and cookie.
pub type CodecFactory = Arc<dyn Fn(&NodeInfo, &str) -> Box<dyn DistCodec> + Send + Sync>;

/// The factory used when none is configured.
pub fn default_codec_factory() -> CodecFactory {
    fn build(_: &NodeInfo, _: &str) -> Box<dyn DistCodec> {
        Box::new(PassThroughCodec::new())
    }
    Arc::new(build)
}

/// Reads post-handshake frames: a 4-byte big-endian length, then
/// [`PASS_THROUGH`] and one or more version-tagged terms.
///
/// Authentication is not performed; the stream is expected to be trusted
/// already.
#[derive(Debug, Default)]
pub struct PassThroughCodec {
    frames: u64,
}

impl PassThroughCodec {
    pub fn new() -> Self {
        Self::default()
    }

    /// Frames decoded so far, ticks included.
    pub fn frames(&self) -> u64 {
        self.frames
    }
}

#[async_trait]
impl DistCodec for PassThroughCodec {
    async fn read_message(&mut self, io: &mut dyn Transport) -> Result<Vec<Term>, DistError> {
        let len = match io.read_u32().await {
            Ok(len) => len as usize,
            Err(e) if e.kind() == ErrorKind::UnexpectedEof => return Err(DistError::Closed),
            Err(e) => return Err(e.into()),
        };
        self.frames += 1;
        if len == 0 {
            return Ok(Vec::new());
        }
        if len > MAX_FRAME_LEN {
            return Err(DistError::Oversized(len));
        }
        let mut raw = vec![0u8; len];
        io.read_exact(&mut raw).await?;
        decode_frame(Bytes::from(raw))
    }
}

/// Decode the body of a non-tick frame.
pub fn decode_frame(mut frame: Bytes) -> Result<Vec<Term>, DistError> {
    match frame.first() {
        Some(&PASS_THROUGH) => {}
        Some(&other) => return Err(DistError::BadFrame(other)),
        None => return Ok(Vec::new()),
    }
    frame.advance(1);
    let mut terms = Vec::with_capacity(2);
    while !frame.is_empty() {
        terms.push(etf::decode(&mut frame)?);
    }
    Ok(terms)
}

/// Encode `terms` as one length-prefixed pass-through frame.
pub fn encode_frame(terms: &[Term]) -> Result<Bytes, EtfError> {
    let mut body = BytesMut::new();
    body.put_u8(PASS_THROUGH);
    for term in terms {
        etf::encode(term, &mut body)?;
    }
    let mut out = BytesMut::with_capacity(4 + body.len());
    out.put_u32(body.len() as u32);
    out.put(body);
    Ok(out.freeze())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::atom::Atom;
    use tokio::io::AsyncWriteExt;

    #[tokio::test]
    async fn reads_ticks_and_frames() {
        let (mut peer, mut local) = tokio::io::duplex(1024);
        let control = Term::tuple([Term::from(6), Term::Atom(Atom::new("x"))]);
        let payload = Term::Atom(Atom::new("hello"));

        peer.write_all(&[0, 0, 0, 0]).await.unwrap();
        peer.write_all(&encode_frame(&[control.clone(), payload.clone()]).unwrap())
            .await
            .unwrap();
        drop(peer);

        let mut codec = PassThroughCodec::new();
        assert!(codec.read_message(&mut local).await.unwrap().is_empty());
        assert_eq!(codec.read_message(&mut local).await.unwrap(), vec![control, payload]);
        assert!(matches!(codec.read_message(&mut local).await, Err(DistError::Closed)));
        assert_eq!(codec.frames(), 2);
    }

    #[tokio::test]
    async fn rejects_frames_without_pass_through() {
        let (mut peer, mut local) = tokio::io::duplex(64);
        peer.write_all(&[0, 0, 0, 2, 113, 0]).await.unwrap();
        let mut codec = PassThroughCodec::new();
        assert!(matches!(
            codec.read_message(&mut local).await,
            Err(DistError::BadFrame(113))
        ));
    }

    #[tokio::test]
    async fn rejects_oversized_frames() {
        let (mut peer, mut local) = tokio::io::duplex(64);
        peer.write_all(&u32::MAX.to_be_bytes()).await.unwrap();
        let mut codec = PassThroughCodec::new();
        assert!(matches!(
            codec.read_message(&mut local).await,
            Err(DistError::Oversized(_))
        ));
    }

    #[test]
    fn truncated_term_is_an_error() {
        let frame = Bytes::from_static(&[PASS_THROUGH, etf::VERSION, 104, 2]);
        assert!(matches!(decode_frame(frame), Err(DistError::Term(EtfError::Truncated))));
    }

    #[tokio::test]
    async fn deeply_nested_frame_is_an_error() {
        let mut body = BytesMut::new();
        body.put_slice(&[PASS_THROUGH, etf::VERSION]);
        for _ in 0..200_000 {
            body.put_slice(&[104, 1]);
        }
        body.put_u8(106);

        assert!(matches!(
            decode_frame(body.clone().freeze()),
            Err(DistError::Term(EtfError::TooDeep))
        ));

        let (mut peer, mut local) = tokio::io::duplex(64 * 1024);
        let writer = tokio::spawn(async move {
            peer.write_u32(body.len() as u32).await.unwrap();
            peer.write_all(&body).await.unwrap();
            peer
        });
        let mut codec = PassThroughCodec::new();
        assert!(matches!(
            codec.read_message(&mut local).await,
            Err(DistError::Term(EtfError::TooDeep))
        ));
        drop(writer.await.unwrap());
    }
}
