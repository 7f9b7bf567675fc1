//! Single-flight guard for triggered operations.
//!
//! One permit per console instance: a trigger that arrives while another
//! operation is in flight is dropped silently, no queueing, no error. The
//! permit releases on `Drop`, so a failed or panicking operation can never
//! leave the console permanently busy.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// The guard itself. Cheap to clone via the shared flag.
#[derive(Debug, Default)]
pub struct SingleFlight {
    busy: Arc<AtomicBool>,
}

/// Held for the duration of one operation; releases the guard when dropped.
#[derive(Debug)]
pub struct FlightPermit {
    busy: Arc<AtomicBool>,
}

impl SingleFlight {
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquire the permit, or `None` if an operation is already in flight.
    pub fn try_begin(&self) -> Option<FlightPermit> {
        self.busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| FlightPermit {
                busy: Arc::clone(&self.busy),
            })
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }
}

impl Drop for FlightPermit {
    fn drop(&mut self) {
        self.busy.store(false, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_trigger_is_dropped_while_first_is_in_flight() {
        let guard = SingleFlight::new();
        let permit = guard.try_begin().expect("first acquire");
        assert!(guard.is_busy());
        assert!(guard.try_begin().is_none());
        drop(permit);
        assert!(!guard.is_busy());
        assert!(guard.try_begin().is_some());
    }

    #[test]
    fn permit_releases_even_when_the_operation_panics() {
        let guard = SingleFlight::new();
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _permit = guard.try_begin().expect("acquire");
            panic!("operation blew up");
        }));
        assert!(result.is_err());
        assert!(!guard.is_busy());
    }

    #[tokio::test]
    async fn permit_spans_suspension_points() {
        let guard = SingleFlight::new();
        let permit = guard.try_begin().expect("acquire");
        tokio::task::yield_now().await;
        assert!(guard.try_begin().is_none());
        drop(permit);
        assert!(guard.try_begin().is_some());
    }
}
