// src/etf.rs
//! External term format: the binary encoding peers use for terms.
//!
//! Only the subset of tags this node routes on is supported. Every encoded
//! term starts with the version byte [`VERSION`].

use crate::atom::Atom;
use crate::pid::Pid;
use crate::term::Term;
use bytes::{Buf, BufMut, Bytes, BytesMut};
use thiserror::Error;

pub const VERSION: u8 = 131;

/// Deepest tuple/list nesting a decoded term may have.
pub const MAX_DEPTH: usize = 512;

const NEW_FLOAT_EXT: u8 = 70;
const NEW_PID_EXT: u8 = 88;
const SMALL_INTEGER_EXT: u8 = 97;
const INTEGER_EXT: u8 = 98;
const ATOM_EXT: u8 = 100;
const PID_EXT: u8 = 103;
const SMALL_TUPLE_EXT: u8 = 104;
const LARGE_TUPLE_EXT: u8 = 105;
const NIL_EXT: u8 = 106;
const STRING_EXT: u8 = 107;
const LIST_EXT: u8 = 108;
const BINARY_EXT: u8 = 109;
const SMALL_ATOM_EXT: u8 = 115;
const ATOM_UTF8_EXT: u8 = 118;
const SMALL_ATOM_UTF8_EXT: u8 = 119;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum EtfError {
    #[error("unexpected end of input")]
    Truncated,
    #[error("bad version byte {0}, expected 131")]
    BadVersion(u8),
    #[error("unsupported term tag {0}")]
    UnsupportedTag(u8),
    #[error("improper lists are not supported")]
    ImproperList,
    #[error("atom is not valid utf-8")]
    InvalidAtom,
    #[error("pid node must be an atom")]
    BadPidNode,
    #[error("integer {0} does not fit a 32-bit integer term")]
    IntegerOutOfRange(i64),
    #[error("atom of {0} bytes is too long")]
    AtomTooLong(usize),
    #[error("term nested too deeply")]
    TooDeep,
}

/// Decode one version-tagged term from the front of `buf`, advancing it.
pub fn decode(buf: &mut Bytes) -> Result<Term, EtfError> {
    need(buf, 1)?;
    match buf.get_u8() {
        VERSION => decode_term(buf, 0),
        other => Err(EtfError::BadVersion(other)),
    }
}

fn need(buf: &Bytes, n: usize) -> Result<(), EtfError> {
    if buf.remaining() < n {
        Err(EtfError::Truncated)
    } else {
        Ok(())
    }
}

fn decode_term(buf: &mut Bytes, depth: usize) -> Result<Term, EtfError> {
    if depth > MAX_DEPTH {
        return Err(EtfError::TooDeep);
    }
    need(buf, 1)?;
    let tag = buf.get_u8();
    match tag {
        SMALL_INTEGER_EXT => {
            need(buf, 1)?;
            Ok(Term::Integer(buf.get_u8() as i64))
        }
        INTEGER_EXT => {
            need(buf, 4)?;
            Ok(Term::Integer(buf.get_i32() as i64))
        }
        NEW_FLOAT_EXT => {
            need(buf, 8)?;
            Ok(Term::Float(buf.get_f64()))
        }
        ATOM_EXT | SMALL_ATOM_EXT | ATOM_UTF8_EXT | SMALL_ATOM_UTF8_EXT => {
            decode_atom_body(tag, buf).map(Term::Atom)
        }
        PID_EXT | NEW_PID_EXT => {
            let node = match decode_term(buf, depth + 1)? {
                Term::Atom(a) => a,
                _ => return Err(EtfError::BadPidNode),
            };
            need(buf, 8)?;
            let id = buf.get_u32();
            let serial = buf.get_u32();
            let creation = if tag == PID_EXT {
                need(buf, 1)?;
                buf.get_u8() as u32
            } else {
                need(buf, 4)?;
                buf.get_u32()
            };
            Ok(Term::Pid(Pid::new(node, id, serial, creation)))
        }
        SMALL_TUPLE_EXT => {
            need(buf, 1)?;
            let arity = buf.get_u8() as usize;
            decode_seq(buf, arity, depth).map(Term::Tuple)
        }
        LARGE_TUPLE_EXT => {
            need(buf, 4)?;
            let arity = buf.get_u32() as usize;
            decode_seq(buf, arity, depth).map(Term::Tuple)
        }
        NIL_EXT => Ok(Term::nil()),
        STRING_EXT => {
            need(buf, 2)?;
            let len = buf.get_u16() as usize;
            need(buf, len)?;
            let chars = buf.split_to(len);
            Ok(Term::List(
                chars.iter().map(|&c| Term::Integer(c as i64)).collect(),
            ))
        }
        LIST_EXT => {
            need(buf, 4)?;
            let len = buf.get_u32() as usize;
            let elements = decode_seq(buf, len, depth)?;
            match decode_term(buf, depth + 1)? {
                tail if tail.is_nil() => Ok(Term::List(elements)),
                _ => Err(EtfError::ImproperList),
            }
        }
        BINARY_EXT => {
            need(buf, 4)?;
            let len = buf.get_u32() as usize;
            need(buf, len)?;
            Ok(Term::Binary(buf.split_to(len)))
        }
        other => Err(EtfError::UnsupportedTag(other)),
    }
}

fn decode_atom_body(tag: u8, buf: &mut Bytes) -> Result<Atom, EtfError> {
    let len = match tag {
        SMALL_ATOM_EXT | SMALL_ATOM_UTF8_EXT => {
            need(buf, 1)?;
            buf.get_u8() as usize
        }
        _ => {
            need(buf, 2)?;
            buf.get_u16() as usize
        }
    };
    need(buf, len)?;
    let raw = buf.split_to(len);
    match tag {
        // latin-1: every byte is its own code point
        ATOM_EXT | SMALL_ATOM_EXT => {
            let s: String = raw.iter().map(|&b| b as char).collect();
            Ok(Atom::new(&s))
        }
        _ => std::str::from_utf8(&raw)
            .map(Atom::new)
            .map_err(|_| EtfError::InvalidAtom),
    }
}

fn decode_seq(buf: &mut Bytes, count: usize, depth: usize) -> Result<Vec<Term>, EtfError> {
    // every element takes at least one byte; cap the preallocation by that
    let mut out = Vec::with_capacity(count.min(buf.remaining()));
    for _ in 0..count {
        out.push(decode_term(buf, depth + 1)?);
    }
    Ok(out)
}

/// Encode `term` with a leading version byte.
pub fn encode(term: &Term, out: &mut BytesMut) -> Result<(), EtfError> {
    out.put_u8(VERSION);
    encode_term(term, out)
}

/// Convenience wrapper around [`encode`].
pub fn to_bytes(term: &Term) -> Result<Bytes, EtfError> {
    let mut out = BytesMut::new();
    encode(term, &mut out)?;
    Ok(out.freeze())
}

fn encode_term(term: &Term, out: &mut BytesMut) -> Result<(), EtfError> {
    match term {
        Term::Atom(a) => encode_atom(a, out)?,
        Term::Integer(i) => match *i {
            0..=255 => {
                out.put_u8(SMALL_INTEGER_EXT);
                out.put_u8(*i as u8);
            }
            i if i >= i32::MIN as i64 && i <= i32::MAX as i64 => {
                out.put_u8(INTEGER_EXT);
                out.put_i32(i as i32);
            }
            i => return Err(EtfError::IntegerOutOfRange(i)),
        },
        Term::Float(x) => {
            out.put_u8(NEW_FLOAT_EXT);
            out.put_f64(*x);
        }
        Term::Pid(p) => {
            out.put_u8(NEW_PID_EXT);
            encode_atom(&p.node, out)?;
            out.put_u32(p.id);
            out.put_u32(p.serial);
            out.put_u32(p.creation);
        }
        Term::Tuple(elements) => {
            if elements.len() <= u8::MAX as usize {
                out.put_u8(SMALL_TUPLE_EXT);
                out.put_u8(elements.len() as u8);
            } else {
                out.put_u8(LARGE_TUPLE_EXT);
                out.put_u32(elements.len() as u32);
            }
            for e in elements {
                encode_term(e, out)?;
            }
        }
        Term::List(elements) if elements.is_empty() => out.put_u8(NIL_EXT),
        Term::List(elements) => {
            out.put_u8(LIST_EXT);
            out.put_u32(elements.len() as u32);
            for e in elements {
                encode_term(e, out)?;
            }
            out.put_u8(NIL_EXT);
        }
        Term::Binary(b) => {
            out.put_u8(BINARY_EXT);
            out.put_u32(b.len() as u32);
            out.put_slice(b);
        }
    }
    Ok(())
}

fn encode_atom(atom: &Atom, out: &mut BytesMut) -> Result<(), EtfError> {
    let raw = atom.as_str().as_bytes();
    if raw.len() <= u8::MAX as usize {
        out.put_u8(SMALL_ATOM_UTF8_EXT);
        out.put_u8(raw.len() as u8);
    } else if raw.len() <= u16::MAX as usize {
        out.put_u8(ATOM_UTF8_EXT);
        out.put_u16(raw.len() as u16);
    } else {
        return Err(EtfError::AtomTooLong(raw.len()));
    }
    out.put_slice(raw);
    Ok(())
}
