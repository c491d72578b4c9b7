//! Operational frames: grippers and handles located on the planner's
//! kinematic tree and re-expressed in a joint the controller can drive.
//!
//! The planner knows every joint of the combined robot + objects model; the
//! controller's [`RobotModel`] only knows the actuated robot joints.  A
//! gripper attached to a fixed link therefore has to be walked up the
//! planner's tree until a controllable parent joint is found, left-composing
//! each joint's placement in its parent frame on the way.

use std::collections::{HashMap, HashSet};

use tracing::debug;
use wbc_types::{RobotModel, WbcError};

use crate::transform::Transform3D;

/// Planner-side kinematic queries.
pub trait KinematicTree {
    /// Parent joint of gripper `gripper` and its pose in that joint.
    fn gripper_position_in_joint(&self, gripper: &str) -> Option<(String, Transform3D)>;

    /// Parent joint of handle `handle` and its pose in that joint.
    fn handle_position_in_joint(&self, handle: &str) -> Option<(String, Transform3D)>;

    /// Pose of `joint` in the frame of its parent joint.
    fn joint_position_in_parent_frame(&self, joint: &str) -> Option<Transform3D>;

    /// Name of the parent of `joint`, `None` at the root.
    fn parent_joint_name(&self, joint: &str) -> Option<String>;
}

/// Split a planner joint name `robot/joint` into its robot and joint parts.
///
/// A name without a separator has an empty robot part.
pub fn split_joint_name(name: &str) -> (&str, &str) {
    match name.split_once('/') {
        Some((robot, joint)) => (robot, joint),
        None => ("", name),
    }
}

/// A gripper or handle frame, located both in the planner tree and in the
/// controller model.
#[derive(Debug, Clone, PartialEq)]
pub struct OpFrame {
    pub name: String,
    /// Planner joint the frame is attached to (`robot/joint`).
    pub planner_joint: String,
    /// Pose of the frame in `planner_joint`.
    pub planner_pose: Transform3D,
    /// Robot part of the controllable joint name.
    pub robot_name: String,
    /// Closest controllable joint, as named in the robot model.
    pub sot_joint: String,
    /// Pose of the frame in `sot_joint`.
    pub sot_pose: Transform3D,
}

impl OpFrame {
    /// Locate gripper `name` and resolve it against `model`.
    pub fn gripper(
        tree: &dyn KinematicTree,
        model: &dyn RobotModel,
        name: &str,
    ) -> Result<Self, WbcError> {
        let (joint, pose) = tree
            .gripper_position_in_joint(name)
            .ok_or_else(|| WbcError::UnknownFrame(format!("gripper {name}")))?;
        Self::resolve(tree, model, name, joint, pose)
    }

    /// Locate handle `name` and resolve it against `model`.
    pub fn handle(
        tree: &dyn KinematicTree,
        model: &dyn RobotModel,
        name: &str,
    ) -> Result<Self, WbcError> {
        let (joint, pose) = tree
            .handle_position_in_joint(name)
            .ok_or_else(|| WbcError::UnknownFrame(format!("handle {name}")))?;
        Self::resolve(tree, model, name, joint, pose)
    }

    /// Walk parent joints from `planner_joint` until one exists in `model`.
    pub fn resolve(
        tree: &dyn KinematicTree,
        model: &dyn RobotModel,
        name: &str,
        planner_joint: String,
        planner_pose: Transform3D,
    ) -> Result<Self, WbcError> {
        let mut current = planner_joint.clone();
        let mut pose = planner_pose;
        let mut visited = HashSet::new();
        loop {
            if !visited.insert(current.clone()) {
                return Err(WbcError::UnknownJoint(format!(
                    "cyclic parent chain at {current} while resolving {name}"
                )));
            }
            let (robot, joint) = split_joint_name(&current);
            if model.has_joint(joint) {
                debug!(frame = name, joint, "operational frame resolved");
                return Ok(Self {
                    name: name.to_string(),
                    planner_joint,
                    planner_pose,
                    robot_name: robot.to_string(),
                    sot_joint: joint.to_string(),
                    sot_pose: pose,
                });
            }
            let placement = tree
                .joint_position_in_parent_frame(&current)
                .ok_or_else(|| WbcError::UnknownJoint(current.clone()))?;
            pose = placement.compose(pose);
            current = tree
                .parent_joint_name(&current)
                .ok_or_else(|| WbcError::UnknownJoint(format!("no controllable ancestor of {name}")))?;
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// In-memory tree
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
struct JointNode {
    parent: Option<String>,
    placement: Transform3D,
}

/// A [`KinematicTree`] held in memory.
#[derive(Debug, Clone, Default)]
pub struct StaticKinematicTree {
    joints: HashMap<String, JointNode>,
    grippers: HashMap<String, (String, Transform3D)>,
    handles: HashMap<String, (String, Transform3D)>,
}

impl StaticKinematicTree {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `joint` with pose `placement` in `parent` (`None` for the root).
    pub fn add_joint(&mut self, joint: &str, parent: Option<&str>, placement: Transform3D) {
        self.joints.insert(
            joint.to_string(),
            JointNode {
                parent: parent.map(str::to_string),
                placement,
            },
        );
    }

    pub fn add_gripper(&mut self, gripper: &str, joint: &str, pose: Transform3D) {
        self.grippers
            .insert(gripper.to_string(), (joint.to_string(), pose));
    }

    pub fn add_handle(&mut self, handle: &str, joint: &str, pose: Transform3D) {
        self.handles
            .insert(handle.to_string(), (joint.to_string(), pose));
    }
}

impl KinematicTree for StaticKinematicTree {
    fn gripper_position_in_joint(&self, gripper: &str) -> Option<(String, Transform3D)> {
        self.grippers.get(gripper).cloned()
    }

    fn handle_position_in_joint(&self, handle: &str) -> Option<(String, Transform3D)> {
        self.handles.get(handle).cloned()
    }

    fn joint_position_in_parent_frame(&self, joint: &str) -> Option<Transform3D> {
        self.joints.get(joint).map(|node| node.placement)
    }

    fn parent_joint_name(&self, joint: &str) -> Option<String> {
        self.joints.get(joint).and_then(|node| node.parent.clone())
    }
}
