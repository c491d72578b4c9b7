//! [`StackSelector`] – which stack output drives the robot.
//!
//! The index is shared: the supervisor writes it, the loop reads it once per
//! tick.  A write between two reads takes effect for the whole next tick.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use wbc_types::WbcError;

#[derive(Debug, Clone)]
pub struct StackSelector {
    inputs: usize,
    index: Arc<AtomicUsize>,
    switches: Arc<AtomicU64>,
}

impl StackSelector {
    /// Selector over `inputs` stacks, initially on input 0.
    pub fn new(inputs: usize) -> Self {
        Self {
            inputs,
            index: Arc::new(AtomicUsize::new(0)),
            switches: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn inputs(&self) -> usize {
        self.inputs
    }

    /// Select input `index`.  Returns whether the selection changed.
    pub fn select(&self, index: usize) -> Result<bool, WbcError> {
        if index >= self.inputs {
            return Err(WbcError::InvalidParameter {
                name: "selection".to_string(),
                details: format!("{index} out of {} inputs", self.inputs),
            });
        }
        let previous = self.index.swap(index, Ordering::AcqRel);
        if previous != index {
            self.switches.fetch_add(1, Ordering::Relaxed);
        }
        Ok(previous != index)
    }

    pub fn current(&self) -> usize {
        self.index.load(Ordering::Acquire)
    }

    /// Number of effective selection changes so far.
    pub fn switch_count(&self) -> u64 {
        self.switches.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_effective_changes_only() {
        let sel = StackSelector::new(3);
        assert_eq!(sel.current(), 0);
        assert!(sel.select(2).unwrap());
        assert!(!sel.select(2).unwrap());
        assert_eq!(sel.switch_count(), 1);

        let shared = sel.clone();
        shared.select(1).unwrap();
        assert_eq!(sel.current(), 1);
    }

    #[test]
    fn out_of_range_is_rejected() {
        let sel = StackSelector::new(2);
        assert!(sel.select(2).is_err());
        assert_eq!(sel.current(), 0);
    }
}
