// src/epmd.rs
//! Port mapper daemon wire format.
//!
//! Requests are framed as a 2-byte big-endian length followed by the
//! payload. Responses carry no length prefix; their size follows from the
//! leading tag byte.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Well-known daemon port.
pub const EPMD_PORT: u16 = 4369;

pub const ALIVE2_X_RESP: u8 = 118;
pub const ALIVE2_REQ: u8 = 120;
pub const ALIVE2_RESP: u8 = 121;

/// Node type advertised for a normal (visible) node.
pub const NODE_TYPE_NORMAL: u8 = 77;
/// Node type advertised for a hidden node.
pub const NODE_TYPE_HIDDEN: u8 = 72;

#[derive(Debug, Error)]
pub enum EpmdError {
    #[error("daemon frame truncated")]
    Truncated,
    #[error("unexpected daemon message tag {0}")]
    UnexpectedTag(u8),
    #[error("request payload of {0} bytes does not fit a frame")]
    Oversized(usize),
    #[error("node name is not valid utf-8")]
    InvalidName,
    #[error("daemon i/o: {0}")]
    Io(#[from] std::io::Error),
}

/// Everything the daemon needs to know about a node, plus the creation
/// stamp it hands back.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NodeInfo {
    /// `name@domain`.
    pub full_name: String,
    /// The part before `@`; this is what gets registered.
    pub name: String,
    pub domain: String,
    pub port: u16,
    pub node_type: u8,
    pub protocol: u8,
    pub high_version: u16,
    pub low_version: u16,
    /// 0 until the daemon has accepted the registration.
    pub creation: u32,
}

/// Outcome of an ALIVE2 registration.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Alive2Response {
    Registered { creation: u32 },
    /// Non-zero result code, in practice "name already in use".
    Rejected { code: u8 },
}

/// Build the ALIVE2_REQ payload (without the length prefix).
pub fn compose_alive2_req(info: &NodeInfo) -> Bytes {
    let name = info.name.as_bytes();
    let mut buf = BytesMut::with_capacity(13 + name.len());
    buf.put_u8(ALIVE2_REQ);
    buf.put_u16(info.port);
    buf.put_u8(info.node_type);
    buf.put_u8(info.protocol);
    buf.put_u16(info.high_version);
    buf.put_u16(info.low_version);
    buf.put_u16(name.len() as u16);
    buf.put_slice(name);
    // no extra data
    buf.put_u16(0);
    buf.freeze()
}

/// Registration fields decoded back out of an ALIVE2_REQ payload.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Alive2Request {
    pub port: u16,
    pub node_type: u8,
    pub protocol: u8,
    pub high_version: u16,
    pub low_version: u16,
    pub name: String,
    pub extra: Bytes,
}

/// Decode an ALIVE2_REQ payload. This is the daemon side of
/// [`compose_alive2_req`].
pub fn parse_alive2_req(payload: &[u8]) -> Result<Alive2Request, EpmdError> {
    let mut buf = payload;
    if buf.remaining() < 11 {
        return Err(EpmdError::Truncated);
    }
    let tag = buf.get_u8();
    if tag != ALIVE2_REQ {
        return Err(EpmdError::UnexpectedTag(tag));
    }
    let port = buf.get_u16();
    let node_type = buf.get_u8();
    let protocol = buf.get_u8();
    let high_version = buf.get_u16();
    let low_version = buf.get_u16();
    let name_len = buf.get_u16() as usize;
    if buf.remaining() < name_len + 2 {
        return Err(EpmdError::Truncated);
    }
    let name = std::str::from_utf8(&buf[..name_len])
        .map_err(|_| EpmdError::InvalidName)?
        .to_string();
    buf.advance(name_len);
    let extra_len = buf.get_u16() as usize;
    if buf.remaining() < extra_len {
        return Err(EpmdError::Truncated);
    }
    let extra = Bytes::copy_from_slice(&buf[..extra_len]);
    Ok(Alive2Request { port, node_type, protocol, high_version, low_version, name, extra })
}

/// Decode a complete ALIVE2_RESP or ALIVE2_X_RESP message.
pub fn parse_alive2_resp(reply: &[u8]) -> Result<Alive2Response, EpmdError> {
    let mut buf = reply;
    if !buf.has_remaining() {
        return Err(EpmdError::Truncated);
    }
    let tag = buf.get_u8();
    let body_len = response_body_len(tag)?;
    if buf.remaining() < body_len {
        return Err(EpmdError::Truncated);
    }
    let code = buf.get_u8();
    let creation = match tag {
        ALIVE2_RESP => buf.get_u16() as u32,
        _ => buf.get_u32(),
    };
    if code == 0 {
        Ok(Alive2Response::Registered { creation })
    } else {
        Ok(Alive2Response::Rejected { code })
    }
}

fn response_body_len(tag: u8) -> Result<usize, EpmdError> {
    match tag {
        ALIVE2_RESP => Ok(3),
        ALIVE2_X_RESP => Ok(5),
        other => Err(EpmdError::UnexpectedTag(other)),
    }
}

/// Write `payload` behind a 2-byte big-endian length.
pub async fn write_frame<W>(w: &mut W, payload: &[u8]) -> Result<(), EpmdError>
where
    W: AsyncWrite + Unpin,
{
    let len = u16::try_from(payload.len()).map_err(|_| EpmdError::Oversized(payload.len()))?;
    let mut buf = BytesMut::with_capacity(2 + payload.len());
    buf.put_u16(len);
    buf.put_slice(payload);
    w.write_all(&buf).await?;
    w.flush().await?;
    Ok(())
}

/// Read one length-prefixed request frame (daemon side; used by tests and
/// tooling that stand in for the daemon).
pub async fn read_frame<R>(r: &mut R) -> Result<Bytes, EpmdError>
where
    R: AsyncRead + Unpin,
{
    let len = r.read_u16().await? as usize;
    let mut payload = vec![0u8; len];
    r.read_exact(&mut payload).await?;
    Ok(Bytes::from(payload))
}

/// Read one ALIVE2 response message, tag byte included.
pub async fn read_alive2_resp<R>(r: &mut R) -> Result<Bytes, EpmdError>
where
    R: AsyncRead + Unpin,
{
    let tag = r.read_u8().await?;
    let body_len = response_body_len(tag)?;
    let mut reply = vec![0u8; 1 + body_len];
    reply[0] = tag;
    r.read_exact(&mut reply[1..]).await?;
    Ok(Bytes::from(reply))
}
