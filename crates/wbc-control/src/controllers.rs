//! Discrete-time control laws producing velocity commands.
//!
//! Both controllers are vector-valued with independent axes and integrate
//! with a fixed period.  They are hardware-agnostic: the caller supplies the
//! measurement every tick and receives the command to apply.
//!
//! # Example
//!
//! ```rust
//! use wbc_control::controllers::SecondOrderClosedLoop;
//!
//! let mut ctrl = SecondOrderClosedLoop::new(10.0, 1.0, 1e-3).unwrap();
//! ctrl.set_reference(vec![1.0]);
//! ctrl.reset(&[0.0]);
//!
//! let velocity = ctrl.step(&[0.0]).unwrap();
//! assert!(velocity[0] > 0.0); // drives the position toward the reference
//! ```

use wbc_types::WbcError;

/// Time at which the decay envelope of a unit-step error reaches 5 %.
///
/// `−ln(0.05)/ω` for a critically damped loop (`ζ = 1`), where the envelope
/// is `e^{−ωt}`, otherwise `−ln(0.05·√(1−ζ²))/(ζω)` for the envelope
/// `e^{−ζωt}/√(1−ζ²)`, only defined for `0 < ζ < 1`.  Below critical damping
/// the step error stays under 5 % from then on.  At `ζ = 1` the error is
/// `(1 + ωt)·e^{−ωt}` and is still about 20 % at that time.
pub fn settling_time(omega: f64, zeta: f64) -> f64 {
    if zeta == 1.0 {
        -(0.05f64).ln() / omega
    } else {
        -(0.05 * (1.0 - zeta * zeta).sqrt()).ln() / (zeta * omega)
    }
}

fn positive(name: &str, value: f64) -> Result<f64, WbcError> {
    if value.is_finite() && value > 0.0 {
        Ok(value)
    } else {
        Err(WbcError::InvalidParameter {
            name: name.to_string(),
            details: format!("must be positive, got {value}"),
        })
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Position
// ────────────────────────────────────────────────────────────────────────────

/// Second-order position tracking law `ẍ = ω²(r − x) − 2ζωẋ`.
///
/// The output is the velocity `ẋ`.  With feedback enabled the position term
/// uses the measurement; without it the loop integrates its own position.
#[derive(Debug, Clone)]
pub struct SecondOrderClosedLoop {
    omega: f64,
    zeta: f64,
    period: f64,
    feedback: bool,
    reference: Vec<f64>,
    position: Vec<f64>,
    velocity: Vec<f64>,
}

impl SecondOrderClosedLoop {
    /// Create a loop with corner frequency `omega`, damping `zeta` and
    /// integration period `period` (seconds).  Feedback is enabled.
    /// Overdamped loops (`zeta > 1`) are rejected.
    pub fn new(omega: f64, zeta: f64, period: f64) -> Result<Self, WbcError> {
        let zeta = positive("zeta", zeta)?;
        if zeta > 1.0 {
            return Err(WbcError::InvalidParameter {
                name: "zeta".to_string(),
                details: format!("overdamped loop not supported, got {zeta}"),
            });
        }
        Ok(Self {
            omega: positive("omega", omega)?,
            zeta,
            period: positive("period", period)?,
            feedback: true,
            reference: Vec::new(),
            position: Vec::new(),
            velocity: Vec::new(),
        })
    }

    pub fn with_feedback(mut self, feedback: bool) -> Self {
        self.feedback = feedback;
        self
    }

    /// Change the tracked reference.  The state is resized to match.
    pub fn set_reference(&mut self, reference: Vec<f64>) {
        self.position.resize(reference.len(), 0.0);
        self.velocity.resize(reference.len(), 0.0);
        self.reference = reference;
    }

    pub fn reference(&self) -> &[f64] {
        &self.reference
    }

    /// Restart from `position` at rest.
    pub fn reset(&mut self, position: &[f64]) {
        self.position = position.to_vec();
        self.velocity = vec![0.0; position.len()];
    }

    /// [`settling_time`] with the current gains.
    pub fn settling_time(&self) -> f64 {
        settling_time(self.omega, self.zeta)
    }

    /// Advance one period and return the velocity command.
    ///
    /// `measurement` is ignored when feedback is disabled but must still have
    /// the reference arity.
    pub fn step(&mut self, measurement: &[f64]) -> Result<Vec<f64>, WbcError> {
        let n = self.reference.len();
        if measurement.len() != n || self.position.len() != n {
            return Err(WbcError::dimension(
                "position controller measurement",
                n,
                measurement.len(),
            ));
        }
        let w2 = self.omega * self.omega;
        let damping = 2.0 * self.zeta * self.omega;
        for i in 0..n {
            let pos = if self.feedback {
                measurement[i]
            } else {
                self.position[i]
            };
            let acc = w2 * (self.reference[i] - pos) - damping * self.velocity[i];
            self.velocity[i] += acc * self.period;
            self.position[i] += self.velocity[i] * self.period;
        }
        Ok(self.velocity.clone())
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Force
// ────────────────────────────────────────────────────────────────────────────

/// First-order law `τẏ + y = α(r − m)`, or `α·r` without feedback.
///
/// The output `y` is a velocity; with feedback the measured force converges
/// to a constant reference without steady-state error once the plant closes
/// the loop.
#[derive(Debug, Clone)]
pub struct FirstOrderController {
    alpha: f64,
    tau: f64,
    period: f64,
    feedback: bool,
    reference: Vec<f64>,
    output: Vec<f64>,
}

impl FirstOrderController {
    pub fn new(alpha: f64, tau: f64, period: f64) -> Result<Self, WbcError> {
        Ok(Self {
            alpha: positive("alpha", alpha)?,
            tau: positive("tau", tau)?,
            period: positive("period", period)?,
            feedback: true,
            reference: Vec::new(),
            output: Vec::new(),
        })
    }

    pub fn with_feedback(mut self, feedback: bool) -> Self {
        self.feedback = feedback;
        self
    }

    pub fn set_reference(&mut self, reference: Vec<f64>) {
        self.output.resize(reference.len(), 0.0);
        self.reference = reference;
    }

    pub fn reference(&self) -> &[f64] {
        &self.reference
    }

    pub fn reset(&mut self) {
        self.output.iter_mut().for_each(|y| *y = 0.0);
    }

    /// Advance one period and return the velocity command.
    pub fn step(&mut self, measurement: &[f64]) -> Result<Vec<f64>, WbcError> {
        let n = self.reference.len();
        if measurement.len() != n {
            return Err(WbcError::dimension(
                "force controller measurement",
                n,
                measurement.len(),
            ));
        }
        let rate = self.period / self.tau;
        for i in 0..n {
            let error = if self.feedback {
                self.reference[i] - measurement[i]
            } else {
                self.reference[i]
            };
            self.output[i] += rate * (self.alpha * error - self.output[i]);
        }
        Ok(self.output.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn step_response(omega: f64, zeta: f64, ticks: usize) -> Vec<f64> {
        let mut ctrl = SecondOrderClosedLoop::new(omega, zeta, 1e-3)
            .unwrap()
            .with_feedback(false);
        ctrl.set_reference(vec![1.0]);
        ctrl.reset(&[0.0]);
        let mut out = Vec::with_capacity(ticks);
        for _ in 0..ticks {
            ctrl.step(&[0.0]).unwrap();
            out.push(ctrl.position[0]);
        }
        out
    }

    #[test]
    fn critically_damped_settling_time() {
        let expected = 0.2996;
        let t = settling_time(10.0, 1.0);
        assert!((t - expected).abs() / expected < 0.01);
    }

    #[test]
    fn underdamped_settling_time_uses_damped_formula() {
        let t = settling_time(10.0, 0.5);
        let expected = -(0.05 * (0.75f64).sqrt()).ln() / 5.0;
        assert!((t - expected).abs() < 1e-12);
    }

    #[test]
    fn critically_damped_error_follows_envelope() {
        let (omega, zeta) = (10.0, 1.0);
        let ts = settling_time(omega, zeta);
        assert!(((-zeta * omega * ts).exp() - 0.05).abs() < 1e-12);

        let response = step_response(omega, zeta, 1000);
        let at_ts = (ts / 1e-3).round() as usize - 1;
        let error = 1.0 - response[at_ts];
        let bound = (1.0 + omega * ts) * (-omega * ts).exp();
        assert!(error <= bound, "error {error} above {bound}");
        assert!(bound - error < 5e-3, "error {error} far below {bound}");
        assert!(response.iter().all(|&x| x <= 1.0));
        assert!(response[at_ts..].windows(2).all(|w| w[1] >= w[0]));
    }

    #[test]
    fn underdamped_error_stays_within_five_percent_after_settling() {
        let (omega, zeta) = (10.0, 0.5);
        let ts = settling_time(omega, zeta);
        let envelope = (-zeta * omega * ts).exp() / (1.0f64 - zeta * zeta).sqrt();
        assert!((envelope - 0.05).abs() < 1e-12);

        let response = step_response(omega, zeta, 2000);
        let at_ts = (ts / 1e-3).round() as usize - 1;
        assert!(response[at_ts..].iter().all(|&x| (1.0 - x).abs() <= 0.05));
        // Overshoots before settling.
        assert!(response.iter().any(|&x| x > 1.0));
    }

    #[test]
    fn position_feedback_uses_measurement() {
        let mut ctrl = SecondOrderClosedLoop::new(10.0, 1.0, 1e-3).unwrap();
        ctrl.set_reference(vec![1.0, 1.0]);
        ctrl.reset(&[0.0, 0.0]);
        let v = ctrl.step(&[1.0, 0.0]).unwrap();
        assert_eq!(v[0], 0.0);
        assert!((v[1] - 0.1).abs() < 1e-12);
    }

    #[test]
    fn position_arity_mismatch_is_rejected() {
        let mut ctrl = SecondOrderClosedLoop::new(10.0, 1.0, 1e-3).unwrap();
        ctrl.set_reference(vec![1.0]);
        assert!(matches!(
            ctrl.step(&[0.0, 0.0]),
            Err(WbcError::DimensionMismatch { expected: 1, actual: 2, .. })
        ));
    }

    #[test]
    fn invalid_gains_are_rejected() {
        assert!(SecondOrderClosedLoop::new(0.0, 1.0, 1e-3).is_err());
        assert!(SecondOrderClosedLoop::new(10.0, 1.0, -1e-3).is_err());
        assert!(SecondOrderClosedLoop::new(10.0, 1.5, 1e-3).is_err());
        assert!(FirstOrderController::new(1.0, f64::NAN, 1e-3).is_err());
    }

    #[test]
    fn force_controller_first_step() {
        let mut ctrl = FirstOrderController::new(2.0, 0.5, 0.01).unwrap();
        ctrl.set_reference(vec![3.0]);
        // y = 0 + 0.01/0.5 * (2 * (3 - 1) - 0) = 0.08
        let y = ctrl.step(&[1.0]).unwrap();
        assert!((y[0] - 0.08).abs() < 1e-12);
    }

    #[test]
    fn force_controller_without_feedback_converges_to_alpha_r() {
        let mut ctrl = FirstOrderController::new(2.0, 0.1, 1e-3)
            .unwrap()
            .with_feedback(false);
        ctrl.set_reference(vec![1.5]);
        let mut y = vec![0.0];
        for _ in 0..5000 {
            y = ctrl.step(&[100.0]).unwrap();
        }
        assert!((y[0] - 3.0).abs() < 1e-6);
        ctrl.reset();
        assert_eq!(ctrl.output, vec![0.0]);
    }
}
