//! One prioritized control objective.

use wbc_control::AdmittanceConfig;
use wbc_frames::Transform3D;
use wbc_types::{JointIndex, TaskId};

/// Convergence gain of a task.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Gain {
    Constant(f64),
    /// `(g0 − g∞)·exp(−b·‖e‖) + g∞` with `b = −ln(percentage)/error_reference`:
    /// the gain equals `g0` at zero error and has dropped `percentage` of the
    /// way toward `g∞` when the error norm reaches `error_reference`.
    Adaptive {
        at_zero: f64,
        at_infinity: f64,
        error_reference: f64,
        percentage: f64,
    },
}

impl Gain {
    pub fn adaptive(at_zero: f64, at_infinity: f64, error_reference: f64, percentage: f64) -> Self {
        Gain::Adaptive {
            at_zero,
            at_infinity,
            error_reference,
            percentage,
        }
    }

    /// Gain for an error of norm `error_norm`.
    pub fn value(&self, error_norm: f64) -> f64 {
        match *self {
            Gain::Constant(g) => g,
            Gain::Adaptive {
                at_zero,
                at_infinity,
                error_reference,
                percentage,
            } => {
                let b = -percentage.ln() / error_reference;
                (at_zero - at_infinity) * (-b * error_norm).exp() + at_infinity
            }
        }
    }
}

/// The control law evaluated for a task.
#[derive(Debug, Clone, PartialEq)]
pub enum ControlLaw {
    /// Whole-configuration posture tracking.
    Posture { dimension: usize },
    /// Posture restricted to one joint, driven to `target`.
    JointPosture {
        joint: String,
        index: JointIndex,
        target: Vec<f64>,
    },
    /// 6D pose of a joint frame.
    Frame6d { joint: String },
    /// 6D pose of `joint` relative to `other_joint`, with operational-point
    /// modifiers applied on both sides.
    Frame6dRelative {
        joint: String,
        other_joint: String,
        op_modif: Transform3D,
        op_modif_base: Transform3D,
    },
    CenterOfMass,
    /// Hybrid position/force control of a joint group.  Evaluated by the
    /// supervisor rather than the solver.
    Admittance {
        config: AdmittanceConfig,
        joints: Vec<String>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Task {
    id: TaskId,
    pub law: ControlLaw,
    pub gain: Gain,
    /// Feed the reference velocity forward.
    pub with_derivative: bool,
}

impl Task {
    pub fn new(id: impl Into<String>, law: ControlLaw, gain: Gain) -> Self {
        Self {
            id: TaskId::new(id),
            law,
            gain,
            with_derivative: false,
        }
    }

    pub fn with_derivative(mut self, with_derivative: bool) -> Self {
        self.with_derivative = with_derivative;
        self
    }

    pub fn id(&self) -> &TaskId {
        &self.id
    }

    pub fn is_admittance(&self) -> bool {
        matches!(self.law, ControlLaw::Admittance { .. })
    }
}
