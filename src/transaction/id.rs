//! Transaction identifier type.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Global counter for transaction ID generation.
static COUNTER: AtomicU64 = AtomicU64::new(1);

/// Unique identifier for a rule transaction.
///
/// Displayed as `txn-XXXXXXXX`; used to name the background thread and to
/// correlate log records of one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TransactionId(u64);

impl TransactionId {
    /// Create a new unique transaction ID.
    pub fn new() -> Self {
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for TransactionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "txn-{:08x}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_uniqueness() {
        let ids: HashSet<_> = (0..1_000).map(|_| TransactionId::new()).collect();
        assert_eq!(ids.len(), 1_000);
    }

    #[test]
    fn test_display_format() {
        let id = TransactionId(0x2a);
        assert_eq!(id.to_string(), "txn-0000002a");
    }
}
