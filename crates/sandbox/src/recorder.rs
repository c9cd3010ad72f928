//! Assertion recorder.
//!
//! Backs `test(...)`. Synchronous tests are recorded immediately; tests whose
//! body returns a promise reserve their slot so results keep declaration
//! order even when they settle out of order.

use scriptbox_core::{AssertionResult, Error, Result};

#[derive(Debug, Clone)]
enum Slot {
    Pending(String),
    Settled(AssertionResult),
}

/// Accumulates test outcomes for one run.
#[derive(Debug, Clone, Default)]
pub struct AssertionRecorder {
    slots: Vec<Slot>,
}

impl AssertionRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a settled result.
    pub fn record(&mut self, result: AssertionResult) {
        self.slots.push(Slot::Settled(result));
    }

    /// Reserve a slot for a test that has not settled yet.
    pub fn reserve(&mut self, description: impl Into<String>) -> usize {
        self.slots.push(Slot::Pending(description.into()));
        self.slots.len() - 1
    }

    /// Settle a reserved slot.
    pub fn settle(&mut self, slot: usize, passed: bool, error: Option<String>) -> Result<()> {
        let entry = self
            .slots
            .get_mut(slot)
            .ok_or_else(|| Error::internal(format!("no reserved test slot {}", slot)))?;
        let description = match entry {
            Slot::Pending(description) => std::mem::take(description),
            Slot::Settled(_) => {
                return Err(Error::internal(format!("test slot {} already settled", slot)))
            }
        };
        *entry = Slot::Settled(AssertionResult {
            description,
            passed,
            error: if passed { None } else { error },
        });
        Ok(())
    }

    /// Settled results in declaration order.
    pub fn results(&self) -> Vec<AssertionResult> {
        self.slots
            .iter()
            .filter_map(|slot| match slot {
                Slot::Settled(result) => Some(result.clone()),
                Slot::Pending(_) => None,
            })
            .collect()
    }

    /// Number of tests that have not settled.
    pub fn pending(&self) -> usize {
        self.slots
            .iter()
            .filter(|slot| matches!(slot, Slot::Pending(_)))
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_declaration_order_survives_late_settlement() {
        let mut recorder = AssertionRecorder::new();
        let slow = recorder.reserve("slow");
        recorder.record(AssertionResult::pass("fast"));

        assert_eq!(recorder.pending(), 1);
        assert_eq!(recorder.results().len(), 1);

        recorder.settle(slow, false, Some("boom".into())).unwrap();
        let results = recorder.results();
        assert_eq!(results[0], AssertionResult::fail("slow", "boom"));
        assert_eq!(results[1], AssertionResult::pass("fast"));
    }

    #[test]
    fn test_settle_twice_is_an_error() {
        let mut recorder = AssertionRecorder::new();
        let slot = recorder.reserve("once");
        recorder.settle(slot, true, Some("ignored".into())).unwrap();
        assert_eq!(recorder.results()[0].error, None);
        assert!(recorder.settle(slot, true, None).is_err());
        assert!(recorder.settle(99, true, None).is_err());
    }

    #[test]
    fn test_duplicates_are_kept() {
        let mut recorder = AssertionRecorder::new();
        recorder.record(AssertionResult::pass("same"));
        recorder.record(AssertionResult::pass("same"));
        assert_eq!(recorder.results().len(), 2);
    }
}
