use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Identifier linking an outbound request to its eventual reply.
///
/// Carried in-band as the `corrID` field of both protocol envelopes. Ids are
/// only meaningful to the [`IdAllocator`] that issued them; reply channels are
/// private per client instance, so two clients never see each other's ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CorrelationId(u64);

impl CorrelationId {
    /// Raw numeric value.
    pub fn get(self) -> u64 {
        // ---
        self.0
    }
}

impl From<u64> for CorrelationId {
    fn from(value: u64) -> Self {
        // ---
        Self(value)
    }
}

impl fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // ---
        write!(f, "{}", self.0)
    }
}

/// Issues strictly increasing correlation ids, starting at 1.
///
/// Safe to share between tasks; `next()` never hands out the same value twice
/// for the lifetime of the allocator.
#[derive(Debug, Default)]
pub struct IdAllocator {
    last: AtomicU64,
}

impl IdAllocator {
    pub fn new() -> Self {
        // ---
        Self::default()
    }

    /// Allocate the next unused id.
    pub fn next(&self) -> CorrelationId {
        // ---
        CorrelationId(self.last.fetch_add(1, Ordering::Relaxed) + 1)
    }
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;
    use std::collections::HashSet;
    use std::sync::Arc;

    #[test]
    fn test_ids_are_unique_and_increasing() {
        // ---
        let ids = IdAllocator::new();
        let first = ids.next();
        let second = ids.next();

        assert_eq!(first.get(), 1);
        assert!(second > first);
    }

    #[test]
    fn test_unique_across_threads() {
        // ---
        let ids = Arc::new(IdAllocator::new());

        let workers: Vec<_> = (0..8)
            .map(|_| {
                let ids = ids.clone();
                std::thread::spawn(move || (0..1000).map(|_| ids.next()).collect::<Vec<_>>())
            })
            .collect();

        let mut seen = HashSet::new();
        for worker in workers {
            for id in worker.join().unwrap() {
                assert!(seen.insert(id), "duplicate id {id}");
            }
        }
        assert_eq!(seen.len(), 8000);
    }

    #[test]
    fn test_wire_format_is_plain_number() {
        // ---
        let id = CorrelationId::from(42);
        assert_eq!(serde_json::to_string(&id).unwrap(), "42");
    }
}
