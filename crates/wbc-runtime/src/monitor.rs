//! [`ControlNormMonitor`] – edge detector on the command norm.
//!
//! Reports the norm of the command vector only when the comparison
//! `norm < threshold` flips, so a resting robot produces one event rather
//! than one per tick.

pub struct ControlNormMonitor {
    threshold: f64,
    below: Option<bool>,
}

impl ControlNormMonitor {
    pub fn new(threshold: f64) -> Self {
        Self {
            threshold,
            below: None,
        }
    }

    /// Feed one command.  Returns its norm when the comparison changed, the
    /// first call included.
    pub fn update(&mut self, command: &[f64]) -> Option<f64> {
        let norm = command.iter().map(|c| c * c).sum::<f64>().sqrt();
        let below = norm < self.threshold;
        if self.below.replace(below) == Some(below) {
            None
        } else {
            Some(norm)
        }
    }

    /// Last comparison, `None` before the first command.
    pub fn is_below(&self) -> Option<bool> {
        self.below
    }
}
