// src/process_table.rs
//! Identity allocation and the pid -> mailbox table.

use crate::atom::Atom;
use crate::mailbox::MailboxSender;
use crate::pid::Pid;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU32, Ordering};

/// Every live process on this node, keyed by pid.
///
/// Ids come from a counter that only moves forward, so concurrent
/// allocations never collide and never depend on what is in the table.
pub struct ProcessTable {
    entries: DashMap<Pid, MailboxSender>,
    next_id: AtomicU32,
}

impl ProcessTable {
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
            next_id: AtomicU32::new(0),
        }
    }

    /// Mint a fresh pid for `node`. Serial is always 0.
    pub fn allocate(&self, node: &Atom, creation: u32) -> Pid {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        Pid::new(node.clone(), id, 0, creation)
    }

    pub fn insert(&self, pid: Pid, mailbox: MailboxSender) {
        self.entries.insert(pid, mailbox);
    }

    /// Allocate a pid and file `mailbox` under it.
    pub fn insert_new(&self, node: &Atom, creation: u32, mailbox: MailboxSender) -> Pid {
        let pid = self.allocate(node, creation);
        self.insert(pid.clone(), mailbox);
        pid
    }

    /// A clone of the sending half for `pid`. Callers await on the clone so
    /// no table lock is held across a blocking enqueue.
    pub fn lookup(&self, pid: &Pid) -> Option<MailboxSender> {
        self.entries.get(pid).map(|e| e.value().clone())
    }

    pub fn remove(&self, pid: &Pid) -> Option<MailboxSender> {
        self.entries.remove(pid).map(|(_, mailbox)| mailbox)
    }

    pub fn contains(&self, pid: &Pid) -> bool {
        self.entries.contains_key(pid)
    }

    pub fn pids(&self) -> Vec<Pid> {
        self.entries.iter().map(|e| e.key().clone()).collect()
    }

    /// Remove every entry, handing back the senders.
    pub fn drain(&self) -> Vec<(Pid, MailboxSender)> {
        let pids = self.pids();
        pids.into_iter()
            .filter_map(|pid| self.entries.remove(&pid))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for ProcessTable {
    fn default() -> Self {
        Self::new()
    }
}
