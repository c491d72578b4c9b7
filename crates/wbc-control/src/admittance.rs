//! Hybrid position/force control for one actuated joint group.
//!
//! [`AdmittanceSwitch`] tracks the estimated closed position with a
//! second-order law until the measured force reaches `threshold_up` on any
//! axis, then tracks `desired_force` with a first-order law.  Both laws are
//! stepped every tick so the selected output is always live and the switch
//! between them never leaves a gap in the command.
//!
//! # Example
//!
//! ```rust
//! use wbc_control::admittance::{AdmittanceConfig, AdmittanceSwitch, ControlMode};
//!
//! let config = AdmittanceConfig::new("gripper", vec![0.0], vec![1.0], vec![5.0]);
//! let mut switch = AdmittanceSwitch::new(config).unwrap();
//!
//! let command = switch.step(&[0.0], &[0.0]).unwrap();
//! assert_eq!(switch.mode(), ControlMode::Position);
//! assert!(command[0] > 0.0); // closing
//! ```

use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use wbc_types::{TelemetryPayload, WbcError};

use crate::controllers::{FirstOrderController, SecondOrderClosedLoop};
use crate::switch::{HysteresisSwitch, Transition};

/// Magnitude substituted for a malformed measured-force sample.
pub const PLACEHOLDER_FORCE: f64 = 1e-4;

/// Conservative measured force of `arity` axes, used when the upstream
/// sample is malformed.  Sits below any sensible `threshold_down`.
pub fn placeholder_force(arity: usize) -> Vec<f64> {
    vec![PLACEHOLDER_FORCE; arity]
}

// ────────────────────────────────────────────────────────────────────────────
// Configuration
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdmittanceConfig {
    pub name: String,
    /// Joint positions with the gripper fully open.
    pub theta_open: Vec<f64>,
    /// Expected joint positions at contact.  Used as the position reference.
    pub estimated_theta_closed: Vec<f64>,
    pub desired_force: Vec<f64>,
    /// Control period in seconds.
    pub period: f64,
    pub threshold_up: f64,
    pub threshold_down: f64,
    pub omega: f64,
    pub zeta: f64,
    pub alpha: f64,
    pub tau: f64,
    /// Force per unit of motor current.
    pub torque_constant: f64,
}

impl AdmittanceConfig {
    /// Configuration with default gains, thresholds and a 1 ms period.
    pub fn new(
        name: impl Into<String>,
        theta_open: Vec<f64>,
        estimated_theta_closed: Vec<f64>,
        desired_force: Vec<f64>,
    ) -> Self {
        Self {
            name: name.into(),
            theta_open,
            estimated_theta_closed,
            desired_force,
            period: 1e-3,
            threshold_up: 1.0,
            threshold_down: 0.1,
            omega: 10.0,
            zeta: 1.0,
            alpha: 1.0,
            tau: 1.0,
            torque_constant: 1.0,
        }
    }

    pub fn axes(&self) -> usize {
        self.desired_force.len()
    }

    /// Direction of the closing stroke on each axis.
    pub fn stroke(&self) -> Vec<f64> {
        self.estimated_theta_closed
            .iter()
            .zip(&self.theta_open)
            .map(|(closed, open)| closed - open)
            .collect()
    }

    /// Check arities and that the desired force pushes toward contact on
    /// every axis.
    pub fn validate(&self) -> Result<(), WbcError> {
        let n = self.desired_force.len();
        if n == 0 {
            return Err(WbcError::InvalidParameter {
                name: "desired_force".to_string(),
                details: "must have at least one axis".to_string(),
            });
        }
        if self.theta_open.len() != n {
            return Err(WbcError::dimension("theta_open", n, self.theta_open.len()));
        }
        if self.estimated_theta_closed.len() != n {
            return Err(WbcError::dimension(
                "estimated_theta_closed",
                n,
                self.estimated_theta_closed.len(),
            ));
        }
        for (axis, (&desired, stroke)) in self.desired_force.iter().zip(self.stroke()).enumerate() {
            if desired * stroke <= 0.0 {
                return Err(WbcError::IncompatibleForceDirection {
                    axis,
                    desired,
                    stroke,
                });
            }
        }
        Ok(())
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Switch
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ControlMode {
    Position,
    Force,
}

/// Values of one admittance tick, exposed for telemetry.
#[derive(Debug, Clone, PartialEq)]
pub struct AdmittanceTrace {
    pub force_mode: bool,
    pub command: Vec<f64>,
    pub reference_force: Vec<f64>,
    pub measured_force: Vec<f64>,
}

impl AdmittanceTrace {
    pub fn to_payload(&self, name: &str) -> TelemetryPayload {
        TelemetryPayload::Admittance {
            name: name.to_string(),
            force_mode: self.force_mode,
            command: self.command.clone(),
            reference_force: self.reference_force.clone(),
            measured_force: self.measured_force.clone(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AdmittanceSwitch {
    config: AdmittanceConfig,
    position: SecondOrderClosedLoop,
    force: FirstOrderController,
    switch: HysteresisSwitch,
    gripper_open: bool,
    trace: Option<AdmittanceTrace>,
}

impl AdmittanceSwitch {
    /// Validate `config` and build both control laws.
    pub fn new(config: AdmittanceConfig) -> Result<Self, WbcError> {
        config.validate()?;

        let mut position = SecondOrderClosedLoop::new(config.omega, config.zeta, config.period)?;
        position.set_reference(config.estimated_theta_closed.clone());
        position.reset(&config.theta_open);

        let mut force = FirstOrderController::new(config.alpha, config.tau, config.period)?;
        force.set_reference(config.desired_force.clone());

        let switch = HysteresisSwitch::new(config.axes(), config.threshold_up, config.threshold_down);
        debug!(
            name = %config.name,
            settling_time = position.settling_time(),
            "admittance switch created"
        );
        Ok(Self {
            config,
            position,
            force,
            switch,
            gripper_open: true,
            trace: None,
        })
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn config(&self) -> &AdmittanceConfig {
        &self.config
    }

    pub fn mode(&self) -> ControlMode {
        if self.switch.latch().is_on() {
            ControlMode::Force
        } else {
            ControlMode::Position
        }
    }

    /// One control tick.
    ///
    /// The latch is updated first with `measured_force`; a force sample of
    /// the wrong arity fails here and nothing is stepped.  Substitute
    /// [`placeholder_force`] upstream to keep the loop running.
    pub fn step(&mut self, measured_position: &[f64], measured_force: &[f64]) -> Result<Vec<f64>, WbcError> {
        let n = self.config.axes();
        if measured_position.len() != n {
            return Err(WbcError::dimension(
                "admittance measured position",
                n,
                measured_position.len(),
            ));
        }
        if self.switch.update(measured_force)? != Transition::Unchanged {
            info!(name = %self.config.name, mode = ?self.mode(), "admittance mode changed");
        }

        let position_command = self.position.step(measured_position)?;
        let force_command = self.force.step(measured_force)?;
        let command = match self.mode() {
            ControlMode::Position => position_command,
            ControlMode::Force => force_command,
        };

        self.trace = Some(AdmittanceTrace {
            force_mode: self.mode() == ControlMode::Force,
            command: command.clone(),
            reference_force: self.config.desired_force.clone(),
            measured_force: measured_force.to_vec(),
        });
        Ok(command)
    }

    /// Back to position control, restarting both laws from `position`.
    pub fn reset_to_position_control(&mut self, position: &[f64]) {
        self.switch.reset();
        self.position.reset(position);
        self.force.reset();
        self.trace = None;
    }

    /// Manual override flag.  Recorded only; it does not gate the latch.
    pub fn set_gripper_open(&mut self) {
        self.gripper_open = true;
    }

    /// Manual override flag.  Recorded only; it does not gate the latch.
    pub fn set_gripper_closed(&mut self) {
        self.gripper_open = false;
    }

    pub fn is_gripper_open(&self) -> bool {
        self.gripper_open
    }

    /// Values of the last successful tick.
    pub fn trace(&self) -> Option<&AdmittanceTrace> {
        self.trace.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::ContactSimulation;

    fn gripper_config() -> AdmittanceConfig {
        let theta_contact: f64 = 1.0;
        AdmittanceConfig::new(
            "gripper",
            vec![0.0],
            vec![theta_contact + 10f64.to_radians()],
            vec![5.0],
        )
    }

    #[test]
    fn opposite_sign_is_rejected_before_building() {
        let config = AdmittanceConfig::new("g", vec![0.0, 0.0], vec![-1.0, 1.0], vec![5.0, 5.0]);
        assert_eq!(
            AdmittanceSwitch::new(config).unwrap_err(),
            WbcError::IncompatibleForceDirection {
                axis: 0,
                desired: 5.0,
                stroke: -1.0
            }
        );
    }

    #[test]
    fn zero_stroke_is_rejected() {
        let config = AdmittanceConfig::new("g", vec![1.0], vec![1.0], vec![5.0]);
        assert!(matches!(
            AdmittanceSwitch::new(config),
            Err(WbcError::IncompatibleForceDirection { axis: 0, .. })
        ));
    }

    #[test]
    fn arity_mismatch_in_config_is_rejected() {
        let config = AdmittanceConfig::new("g", vec![0.0], vec![1.0, 1.0], vec![5.0]);
        assert!(matches!(
            config.validate(),
            Err(WbcError::DimensionMismatch { .. })
        ));
    }

    #[test]
    fn closing_direction_negative_is_accepted() {
        let config = AdmittanceConfig::new("g", vec![0.0], vec![-1.0], vec![-5.0]);
        assert!(AdmittanceSwitch::new(config).is_ok());
    }

    #[test]
    fn malformed_force_leaves_mode_and_trace_untouched() {
        let mut switch = AdmittanceSwitch::new(gripper_config()).unwrap();
        switch.step(&[0.0], &[0.0]).unwrap();
        let before = switch.trace().cloned();
        assert!(switch.step(&[0.0], &[]).is_err());
        assert_eq!(switch.mode(), ControlMode::Position);
        assert_eq!(switch.trace().cloned(), before);

        // The placeholder never reaches the up threshold.
        switch.step(&[0.0], &placeholder_force(1)).unwrap();
        assert_eq!(switch.mode(), ControlMode::Position);
    }

    #[test]
    fn gripper_flag_is_inert() {
        let mut switch = AdmittanceSwitch::new(gripper_config()).unwrap();
        switch.set_gripper_closed();
        assert!(!switch.is_gripper_open());
        switch.step(&[0.0], &[3.0]).unwrap();
        assert_eq!(switch.mode(), ControlMode::Force);
        switch.set_gripper_open();
        switch.step(&[0.0], &[3.0]).unwrap();
        assert_eq!(switch.mode(), ControlMode::Force);
    }

    #[test]
    fn closes_on_contact_and_regulates_force() {
        let config = gripper_config();
        let mut switch = AdmittanceSwitch::new(config.clone()).unwrap();
        let mut sim = ContactSimulation::new(config.theta_open[0], 1.0, 1.0, config.period);

        let mut torque = 0.0;
        let mut switched_at = None;
        let mut min_after_switch = f64::INFINITY;
        let mut torque_at_1_5s = 0.0;
        for tick in 0..4000 {
            let command = switch.step(&[sim.position()], &[torque]).unwrap();
            torque = sim.step(command[0]);

            if switch.mode() == ControlMode::Force {
                match switched_at {
                    None => switched_at = Some(tick),
                    Some(_) => min_after_switch = min_after_switch.min(torque),
                }
            } else {
                assert!(switched_at.is_none(), "switched back to position at {tick}");
            }
            if tick == 1499 {
                torque_at_1_5s = torque;
            }
        }

        assert_eq!(switched_at, Some(339));
        assert!(min_after_switch > config.threshold_down);
        assert!((torque_at_1_5s - 5.0).abs() < 0.05);
        assert!((torque - 5.0).abs() < 1e-6);

        let trace = switch.trace().unwrap();
        assert!(trace.force_mode);
        assert_eq!(trace.reference_force, vec![5.0]);
    }

    #[test]
    fn reset_returns_to_position_mode() {
        let mut switch = AdmittanceSwitch::new(gripper_config()).unwrap();
        switch.step(&[0.0], &[3.0]).unwrap();
        assert_eq!(switch.mode(), ControlMode::Force);
        switch.reset_to_position_control(&[0.2]);
        assert_eq!(switch.mode(), ControlMode::Position);
        assert!(switch.trace().is_none());
    }

    #[test]
    fn trace_converts_to_telemetry() {
        let mut switch = AdmittanceSwitch::new(gripper_config()).unwrap();
        switch.step(&[0.0], &[0.0]).unwrap();
        match switch.trace().unwrap().to_payload(switch.name()) {
            TelemetryPayload::Admittance { name, force_mode, .. } => {
                assert_eq!(name, "gripper");
                assert!(!force_mode);
            }
            other => panic!("unexpected payload {other:?}"),
        }
    }
}
