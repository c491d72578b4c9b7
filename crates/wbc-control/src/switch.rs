//! One-bit sticky latch driven by a per-axis comparator pair.
//!
//! The latch turns ON as soon as any axis reaches `threshold_up` and turns
//! OFF only once every axis has fallen below `threshold_down`.  Values are
//! compared signed: a force pulling away from contact never counts as above
//! the threshold.  Keeping `threshold_down < threshold_up` is the caller's
//! responsibility.

use serde::{Deserialize, Serialize};
use tracing::info;
use wbc_types::WbcError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Latch {
    #[default]
    Off,
    On,
}

impl Latch {
    pub fn is_on(self) -> bool {
        self == Latch::On
    }
}

/// Latch change produced by one comparator update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Unchanged,
    TurnedOn,
    TurnedOff,
}

#[derive(Debug, Clone)]
pub struct HysteresisSwitch {
    axes: usize,
    threshold_up: f64,
    threshold_down: f64,
    latch: Latch,
    above_up: bool,
    below_down: bool,
}

impl HysteresisSwitch {
    /// Comparator pair over `axes` measurement components, latch OFF.
    pub fn new(axes: usize, threshold_up: f64, threshold_down: f64) -> Self {
        Self {
            axes,
            threshold_up,
            threshold_down,
            latch: Latch::Off,
            above_up: false,
            below_down: true,
        }
    }

    pub fn latch(&self) -> Latch {
        self.latch
    }

    pub fn axes(&self) -> usize {
        self.axes
    }

    /// Last comparison: (any axis ≥ up, all axes < down).
    pub fn last_comparison(&self) -> (bool, bool) {
        (self.above_up, self.below_down)
    }

    /// Force the latch OFF without touching the comparators.
    pub fn reset(&mut self) {
        self.latch = Latch::Off;
    }

    /// Feed one measurement.  A sample of the wrong arity is rejected and
    /// leaves the latch untouched.
    pub fn update(&mut self, measured: &[f64]) -> Result<Transition, WbcError> {
        if measured.len() != self.axes {
            return Err(WbcError::dimension(
                "hysteresis comparator input",
                self.axes,
                measured.len(),
            ));
        }
        self.above_up = measured.iter().any(|&f| f >= self.threshold_up);
        self.below_down = measured.iter().all(|&f| f < self.threshold_down);

        let transition = match self.latch {
            Latch::Off if self.above_up => {
                self.latch = Latch::On;
                Transition::TurnedOn
            }
            Latch::On if self.below_down => {
                self.latch = Latch::Off;
                Transition::TurnedOff
            }
            _ => Transition::Unchanged,
        };
        if transition != Transition::Unchanged {
            info!(latch = ?self.latch, measured = ?measured, "latch switched");
        }
        Ok(transition)
    }
}
