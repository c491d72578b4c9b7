//! `wbc-types` – shared vocabulary of the whole-body control workspace.
//!
//! Every other crate speaks in these types: the value kinds carried by
//! reference channels, the handles naming graph-engine inputs and tasks, the
//! telemetry samples published by the control loop, and the single
//! [`WbcError`] taxonomy.  The collaborator traits implemented by the
//! external graph engine and robot model live in [`engine`].

pub mod engine;

pub use engine::{GraphEngine, RobotModel};

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Control tick counter.  One tick is one period of the real-time loop.
pub type Tick = u64;

/// Kind of value carried by a reference channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueType {
    /// A single floating point value.
    Scalar,
    /// A vector of arbitrary size (joint configuration, 6D velocity, …).
    Vector,
    /// A 4×4 homogeneous transform.
    MatrixHomo,
    /// A 3-vector (center-of-mass position or velocity).
    Vector3,
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValueType::Scalar => write!(f, "scalar"),
            ValueType::Vector => write!(f, "vector"),
            ValueType::MatrixHomo => write!(f, "matrix_homo"),
            ValueType::Vector3 => write!(f, "vector3"),
        }
    }
}

/// A value written into a graph-engine input signal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SignalValue {
    Scalar(f64),
    Vector(Vec<f64>),
    MatrixHomo([[f64; 4]; 4]),
    Vector3([f64; 3]),
}

impl SignalValue {
    /// The [`ValueType`] of this value.
    pub fn value_type(&self) -> ValueType {
        match self {
            SignalValue::Scalar(_) => ValueType::Scalar,
            SignalValue::Vector(_) => ValueType::Vector,
            SignalValue::MatrixHomo(_) => ValueType::MatrixHomo,
            SignalValue::Vector3(_) => ValueType::Vector3,
        }
    }

    /// Borrow the payload of a [`SignalValue::Vector`].
    pub fn as_vector(&self) -> Option<&[f64]> {
        match self {
            SignalValue::Vector(v) => Some(v),
            _ => None,
        }
    }
}

/// Identifies one input port of a graph-engine entity, e.g. the desired
/// position of a posture feature.
///
/// Reference bindings fan their upstream channel out to a list of these.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SignalRef {
    pub entity: String,
    pub port: String,
}

impl SignalRef {
    pub fn new(entity: impl Into<String>, port: impl Into<String>) -> Self {
        Self {
            entity: entity.into(),
            port: port.into(),
        }
    }
}

impl fmt::Display for SignalRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.entity, self.port)
    }
}

/// Immutable identifier of a task, as pushed into a solver stack.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TaskId(String);

impl TaskId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Location of a joint inside the robot configuration and velocity vectors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JointIndex {
    /// Offset in the configuration vector.
    pub idx_q: usize,
    /// Offset in the velocity vector.
    pub idx_v: usize,
    /// Configuration-space size.
    pub nq: usize,
    /// Degrees of freedom.
    pub nv: usize,
}

/// Telemetry sample published by the control loop for external logging.
///
/// Telemetry is decoupled from control: nothing in the loop reads it back.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetrySample {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub tick: Tick,
    /// e.g. `"wbc-runtime::control_loop"`
    pub source: String,
    pub payload: TelemetryPayload,
}

impl TelemetrySample {
    pub fn new(tick: Tick, source: impl Into<String>, payload: TelemetryPayload) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            tick,
            source: source.into(),
            payload,
        }
    }
}

/// Variants of data exposed on the telemetry channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TelemetryPayload {
    /// Per-tick trace of one admittance switch.
    Admittance {
        name: String,
        force_mode: bool,
        command: Vec<f64>,
        reference_force: Vec<f64>,
        measured_force: Vec<f64>,
    },
    /// Downsampled robot state next to the posture reference last delivered.
    State {
        state: Vec<f64>,
        reference_state: Vec<f64>,
    },
    /// Norm of the command vector, published when it crosses the threshold.
    ControlNorm(f64),
    /// The active stack changed.
    StackSwitched { from: Option<String>, to: String },
}

/// Error type spanning setup-time configuration errors, lookup errors, and
/// malformed runtime inputs.
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum WbcError {
    #[error("Binding conflict on '{name}': {details}")]
    BindingConflict { name: String, details: String },

    #[error("Invalid pose: {0}")]
    InvalidPose(String),

    #[error("Description error: {0}")]
    Description(String),

    #[error(
        "Incompatible force direction on axis {axis}: desired force {desired} does not push along the closing stroke {stroke}"
    )]
    IncompatibleForceDirection { axis: usize, desired: f64, stroke: f64 },

    #[error("Unknown transition '{0}'")]
    UnknownTransition(String),

    #[error("Unknown binding handler '{0}'")]
    UnknownHandler(String),

    #[error("Unknown joint '{0}'")]
    UnknownJoint(String),

    #[error("Unknown frame '{0}'")]
    UnknownFrame(String),

    #[error("Dimension mismatch for {context}: expected {expected}, got {actual}")]
    DimensionMismatch {
        context: String,
        expected: usize,
        actual: usize,
    },

    #[error("Invalid parameter {name}: {details}")]
    InvalidParameter { name: String, details: String },

    #[error("Graph engine error: {0}")]
    Engine(String),

    #[error("Channel error: {0}")]
    Channel(String),
}

impl WbcError {
    /// Convenience constructor for [`WbcError::DimensionMismatch`].
    pub fn dimension(context: impl Into<String>, expected: usize, actual: usize) -> Self {
        WbcError::DimensionMismatch {
            context: context.into(),
            expected,
            actual,
        }
    }
}
