// src/term.rs
//! Structured values exchanged between nodes.

use crate::atom::Atom;
use crate::pid::Pid;
use bytes::Bytes;
use std::fmt;

/// Any wire-representable value this node understands.
///
/// Tuples use 1-based positional access through [`Term::element`], matching
/// `erlang:element/2`.
#[derive(Clone, PartialEq)]
pub enum Term {
    Atom(Atom),
    Integer(i64),
    Float(f64),
    Pid(Pid),
    Tuple(Vec<Term>),
    /// A proper list. The empty list is `nil`.
    List(Vec<Term>),
    Binary(Bytes),
}

impl Term {
    /// Build a tuple from its elements.
    pub fn tuple<I: IntoIterator<Item = Term>>(elements: I) -> Self {
        Term::Tuple(elements.into_iter().collect())
    }

    pub fn nil() -> Self {
        Term::List(Vec::new())
    }

    /// 1-based positional access into a tuple. `None` for non-tuples and
    /// out-of-range indices.
    pub fn element(&self, index: usize) -> Option<&Term> {
        match self {
            Term::Tuple(elements) if index >= 1 => elements.get(index - 1),
            _ => None,
        }
    }

    /// Number of elements for tuples, `None` otherwise.
    pub fn arity(&self) -> Option<usize> {
        self.as_tuple().map(<[Term]>::len)
    }

    pub fn as_atom(&self) -> Option<&Atom> {
        match self {
            Term::Atom(a) => Some(a),
            _ => None,
        }
    }

    pub fn as_pid(&self) -> Option<&Pid> {
        match self {
            Term::Pid(p) => Some(p),
            _ => None,
        }
    }

    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Term::Integer(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_tuple(&self) -> Option<&[Term]> {
        match self {
            Term::Tuple(elements) => Some(elements),
            _ => None,
        }
    }

    pub fn as_binary(&self) -> Option<&Bytes> {
        match self {
            Term::Binary(b) => Some(b),
            _ => None,
        }
    }

    pub fn is_nil(&self) -> bool {
        matches!(self, Term::List(l) if l.is_empty())
    }
}

impl fmt::Debug for Term {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Term::Atom(a) => fmt::Debug::fmt(a, f),
            Term::Integer(i) => write!(f, "{}", i),
            Term::Float(x) => write!(f, "{:?}", x),
            Term::Pid(p) => fmt::Debug::fmt(p, f),
            Term::Tuple(elements) => {
                f.write_str("{")?;
                write_seq(f, elements)?;
                f.write_str("}")
            }
            Term::List(elements) => {
                f.write_str("[")?;
                write_seq(f, elements)?;
                f.write_str("]")
            }
            Term::Binary(b) => write!(f, "<<{} bytes>>", b.len()),
        }
    }
}

fn write_seq(f: &mut fmt::Formatter<'_>, elements: &[Term]) -> fmt::Result {
    for (i, e) in elements.iter().enumerate() {
        if i > 0 {
            f.write_str(",")?;
        }
        fmt::Debug::fmt(e, f)?;
    }
    Ok(())
}

impl From<Atom> for Term {
    fn from(a: Atom) -> Self {
        Term::Atom(a)
    }
}

impl From<Pid> for Term {
    fn from(p: Pid) -> Self {
        Term::Pid(p)
    }
}

impl From<i64> for Term {
    fn from(i: i64) -> Self {
        Term::Integer(i)
    }
}

impl From<i32> for Term {
    fn from(i: i32) -> Self {
        Term::Integer(i as i64)
    }
}

impl From<f64> for Term {
    fn from(x: f64) -> Self {
        Term::Float(x)
    }
}

impl From<Bytes> for Term {
    fn from(b: Bytes) -> Self {
        Term::Binary(b)
    }
}

impl From<&'static [u8]> for Term {
    fn from(b: &'static [u8]) -> Self {
        Term::Binary(Bytes::from_static(b))
    }
}

impl From<Vec<Term>> for Term {
    fn from(elements: Vec<Term>) -> Self {
        Term::List(elements)
    }
}
