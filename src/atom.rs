// src/atom.rs
//! Interned symbolic names.
//! Used both as node name components and as registrable process aliases.

use dashmap::DashMap;
use once_cell::sync::Lazy;
use std::fmt;
use std::sync::Arc;

/// Process-wide intern table. Entries live for the lifetime of the process.
static ATOM_TABLE: Lazy<DashMap<Arc<str>, ()>> = Lazy::new(DashMap::new);

/// An interned, immutable string.
///
/// Cloning is a reference count bump; equality and hashing are structural
/// over the string contents.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Atom(Arc<str>);

impl Atom {
    /// Intern `name`, returning the shared handle.
    pub fn new(name: &str) -> Self {
        if let Some(entry) = ATOM_TABLE.get(name) {
            return Self(entry.key().clone());
        }
        let key = ATOM_TABLE
            .entry(Arc::from(name))
            .or_insert(())
            .key()
            .clone();
        Self(key)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for Atom {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "'{}'", self.0)
    }
}

impl fmt::Display for Atom {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Atom {
    fn from(name: &str) -> Self {
        Atom::new(name)
    }
}

impl From<String> for Atom {
    fn from(name: String) -> Self {
        Atom::new(&name)
    }
}

impl AsRef<str> for Atom {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interned_atoms_share_storage() {
        let a = Atom::new("net_kernel");
        let b = Atom::from("net_kernel".to_string());
        assert_eq!(a, b);
        assert!(Arc::ptr_eq(&a.0, &b.0));
        assert_eq!(a.as_str(), "net_kernel");
    }

    #[test]
    fn display_and_debug() {
        let a = Atom::new("foo@bar");
        assert_eq!(a.to_string(), "foo@bar");
        assert_eq!(format!("{:?}", a), "'foo@bar'");
    }
}
