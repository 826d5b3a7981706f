// src/registry.rs
//! Name Registry
//! Lets processes be addressed by atom instead of raw pid.

use crate::atom::Atom;
use crate::pid::Pid;
use dashmap::DashMap;

pub struct NameRegistry {
    /// Mapping of registered names to pids.
    names: DashMap<Atom, Pid>,
}

impl NameRegistry {
    /// Create a new, empty name registry.
    pub fn new() -> Self {
        Self {
            names: DashMap::new(),
        }
    }

    /// Bind `name` to `pid`. An existing binding is overwritten.
    pub fn register(&self, name: Atom, pid: Pid) {
        self.names.insert(name, pid);
    }

    /// Retrieve the pid bound to `name`.
    pub fn whereis(&self, name: &Atom) -> Option<Pid> {
        self.names.get(name).map(|p| p.value().clone())
    }

    /// Remove a name binding, returning the pid it pointed to.
    pub fn unregister(&self, name: &Atom) -> Option<Pid> {
        self.names.remove(name).map(|(_, pid)| pid)
    }

    /// Drop every binding that points at `pid`.
    pub fn unregister_pid(&self, pid: &Pid) {
        self.names.retain(|_, bound| *bound != *pid);
    }

    /// Snapshot of the currently bound names, in no particular order.
    pub fn registered(&self) -> Vec<Atom> {
        self.names.iter().map(|e| e.key().clone()).collect()
    }

    pub fn clear(&self) {
        self.names.clear();
    }
}

impl Default for NameRegistry {
    fn default() -> Self {
        Self::new()
    }
}
