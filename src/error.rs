// src/error.rs
//! Error types, one per failure domain.
//!
//! Only [`NodeError`] and [`StartupError`] reach the caller of the public
//! API. Routing and connection errors are logged where they happen.

use crate::atom::Atom;
use crate::epmd::EpmdError;
use crate::etf::EtfError;
use crate::pid::Pid;
use std::io;
use thiserror::Error;

/// Node construction failed.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum NodeError {
    #[error("invalid node name '{0}', expected name@domain")]
    InvalidName(String),
}

/// Bringing the node online failed. Fatal to startup, never retried.
#[derive(Debug, Error)]
pub enum StartupError {
    #[error("cannot bind listening socket: {0}")]
    Bind(#[source] io::Error),
    #[error("node is already published")]
    AlreadyPublished,
    #[error("node has been shut down")]
    ShutDown,
    #[error("cannot connect to EPMD: {0}")]
    EpmdUnreachable(#[source] io::Error),
    #[error("duplicate name '{0}'")]
    DuplicateName(String),
    #[error("EPMD registration failed: {0}")]
    EpmdProtocol(#[source] EpmdError),
}

/// A local delivery did not happen.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SendError {
    #[error("no such process {0}")]
    NotFound(Pid),
    #[error("process {0} is no longer receiving")]
    Closed(Pid),
    #[error("mailbox of {0} is full")]
    Full(Pid),
}

/// An established peer connection could not produce the next frame.
#[derive(Debug, Error)]
pub enum DistError {
    #[error("connection closed by peer")]
    Closed,
    #[error("connection i/o: {0}")]
    Io(#[from] io::Error),
    #[error("frame does not start with the pass-through tag (got {0})")]
    BadFrame(u8),
    #[error("frame of {0} bytes exceeds the limit")]
    Oversized(usize),
    #[error("bad term in frame: {0}")]
    Term(#[from] EtfError),
}

/// An inbound message could not be routed. The message is dropped.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum RouteError {
    #[error("control message is not a non-empty tuple")]
    NotATuple,
    #[error("control message has no integer opcode")]
    MissingOpcode,
    #[error("unsupported opcode {0}")]
    UnsupportedOpcode(i64),
    #[error("REG_SEND needs a 4-tuple control message and exactly one payload")]
    MalformedRegSend,
    #[error("destination is neither a pid nor an atom")]
    BadDestination,
    #[error("no process registered as '{0}'")]
    NameNotRegistered(Atom),
    #[error(transparent)]
    Send(#[from] SendError),
}
