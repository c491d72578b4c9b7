//! Collaborator interfaces: the graph engine that evaluates control laws
//! every tick, and the robot model that answers joint queries.
//!
//! The core never evaluates a control-law graph itself.  It declares the
//! evaluation order (tasks in stack priority order, then the solver) and asks
//! the engine to carry it out.

use crate::{JointIndex, SignalRef, SignalValue, TaskId, Tick, WbcError};

/// The signal-graph runtime driving the robot device.
///
/// Implementations are expected to be cheap to call from the real-time loop:
/// none of these methods may block.
pub trait GraphEngine: Send {
    /// Current control time of the device.
    fn time(&self) -> Tick;

    /// Live measured configuration of the robot.
    fn configuration(&self) -> Vec<f64>;

    /// Live motor currents, laid out like the velocity vector.
    fn currents(&self) -> Vec<f64>;

    /// Write `value` into the input port `signal`.
    fn set_signal(&mut self, signal: &SignalRef, value: SignalValue) -> Result<(), WbcError>;

    /// Recompute every signal feeding `task` at time `t`.
    fn recompute_task(&mut self, task: &TaskId, t: Tick) -> Result<(), WbcError>;

    /// Solve the prioritized stack `stack` made of `tasks` (highest priority
    /// first) and return the joint-velocity command.
    fn solve(&mut self, stack: &str, tasks: &[TaskId], t: Tick) -> Result<Vec<f64>, WbcError>;

    /// Send the selected command to the device.
    fn apply_control(&mut self, command: &[f64]) -> Result<(), WbcError>;
}

/// Robot kinematic model queries.
pub trait RobotModel {
    /// Index information for `name`, or `None` when the model has no such
    /// joint.
    fn joint(&self, name: &str) -> Option<JointIndex>;

    /// Size of the velocity vector.
    fn nv(&self) -> usize;

    /// Names of every joint in the model.
    fn joint_names(&self) -> Vec<String>;

    fn has_joint(&self, name: &str) -> bool {
        self.joint(name).is_some()
    }
}
