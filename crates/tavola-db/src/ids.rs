//! # Identifier Service
//!
//! Every row id the engine writes comes from an [`IdGenerator`] injected
//! into [`crate::Database`]. Production uses random UUID v4 strings; tests
//! can swap in a deterministic sequence.

use std::fmt::Debug;
use std::sync::atomic::{AtomicU64, Ordering};

use uuid::Uuid;

/// Source of opaque unique identifiers.
pub trait IdGenerator: Send + Sync + Debug {
    fn next_id(&self) -> String;
}

/// Random UUID v4 ids. The default.
#[derive(Debug, Default, Clone, Copy)]
pub struct UuidV4Generator;

impl IdGenerator for UuidV4Generator {
    fn next_id(&self) -> String {
        Uuid::new_v4().to_string()
    }
}

/// Predictable `{prefix}-{n}` ids, starting at 1.
#[derive(Debug)]
pub struct SequentialIdGenerator {
    prefix: String,
    next: AtomicU64,
}

impl SequentialIdGenerator {
    pub fn new(prefix: impl Into<String>) -> Self {
        SequentialIdGenerator {
            prefix: prefix.into(),
            next: AtomicU64::new(1),
        }
    }
}

impl IdGenerator for SequentialIdGenerator {
    fn next_id(&self) -> String {
        let n = self.next.fetch_add(1, Ordering::Relaxed);
        format!("{}-{}", self.prefix, n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uuid_ids_are_unique() {
        let ids = UuidV4Generator;
        let a = ids.next_id();
        let b = ids.next_id();
        assert_ne!(a, b);
        assert!(Uuid::parse_str(&a).is_ok());
    }

    #[test]
    fn test_sequential_ids() {
        let ids = SequentialIdGenerator::new("t");
        assert_eq!(ids.next_id(), "t-1");
        assert_eq!(ids.next_id(), "t-2");
    }
}
