//! # Lookup Gate
//!
//! Barcode scanners outrun catalog queries: a cashier can fire three
//! scans before the first lookup returns. Each lookup takes a generation
//! token when it starts; only the result still carrying the current
//! generation may touch the screen.
//!
//! ```text
//! scan #1 ──begin()=1──► query ............ result (token 1)  DROPPED
//! scan #2 ──begin()=2──► query ...... result (token 2)        DROPPED
//! scan #3 ──begin()=3──► query .. result (token 3)            APPLIED
//! ```

use std::sync::atomic::{AtomicU64, Ordering};

/// Generation counter gating async lookup results.
///
/// Cheap to share: one per terminal, used by both barcode scans and
/// product/customer search.
#[derive(Debug, Default)]
pub struct LookupGate {
    generation: AtomicU64,
}

impl LookupGate {
    /// Creates a gate at generation zero.
    pub fn new() -> Self {
        LookupGate::default()
    }

    /// Starts a new lookup, superseding all earlier ones. Returns the
    /// token the caller must present with its result.
    pub fn begin(&self) -> u64 {
        self.generation.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// The generation currently allowed to apply results.
    pub fn current(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    /// Whether a result carrying `token` is still the latest lookup.
    pub fn accepts(&self, token: u64) -> bool {
        token == self.current()
    }

    /// Invalidates every in-flight lookup without starting a new one
    /// (cart cleared, session completed).
    pub fn invalidate(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_latest_lookup_wins() {
        let gate = LookupGate::new();

        let first = gate.begin();
        let second = gate.begin();
        let third = gate.begin();

        // Results arrive out of order; only the newest applies.
        assert!(!gate.accepts(first));
        assert!(!gate.accepts(second));
        assert!(gate.accepts(third));
    }

    #[test]
    fn test_invalidate_drops_in_flight() {
        let gate = LookupGate::new();
        let token = gate.begin();
        assert!(gate.accepts(token));

        gate.invalidate();
        assert!(!gate.accepts(token));
    }

    #[tokio::test]
    async fn test_slow_lookup_superseded_by_fast_one() {
        use std::sync::Arc;
        use std::time::Duration;

        let gate = Arc::new(LookupGate::new());

        let slow_token = gate.begin();
        let slow = {
            let gate = Arc::clone(&gate);
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(50)).await;
                gate.accepts(slow_token)
            })
        };

        tokio::time::sleep(Duration::from_millis(10)).await;
        let fast_token = gate.begin();

        assert!(!slow.await.unwrap());
        assert!(gate.accepts(fast_token));
    }
}
