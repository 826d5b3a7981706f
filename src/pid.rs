// src/pid.rs
//! Process identifiers.

use crate::atom::Atom;
use std::fmt;

/// Structural identifier of a process: origin node, numeric id, serial and
/// the creation stamp of the node run that allocated it.
///
/// Two pids are equal only when all four fields are equal, so a pid minted
/// before a node restart never matches one minted after it.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Pid {
    pub node: Atom,
    pub id: u32,
    pub serial: u32,
    pub creation: u32,
}

impl Pid {
    pub fn new(node: Atom, id: u32, serial: u32, creation: u32) -> Self {
        Self { node, id, serial, creation }
    }
}

impl fmt::Debug for Pid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<{}.{}.{}.{}>", self.node, self.id, self.serial, self.creation)
    }
}

impl fmt::Display for Pid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<{}.{}.{}>", self.node, self.id, self.serial)
    }
}
