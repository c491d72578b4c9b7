//! Task factories.  Each returns a [`Manifold`] holding one task and the
//! bindings feeding its desired feature.
//!
//! Graph-engine names follow one scheme: the task of objective `n` is
//! `task___n` and its desired feature entity is `feature_des___n`.

use tracing::debug;
use wbc_control::AdmittanceConfig;
use wbc_frames::OpFrame;
use wbc_frames::op_frame::split_joint_name;
use wbc_types::{RobotModel, SignalRef, ValueType, WbcError};

use crate::binding::{ReferenceBinding, SourceHandler, velocity_name};
use crate::manifold::Manifold;
use crate::task::{ControlLaw, Gain, Task};

/// Separator used inside graph-engine names.
pub const SEP: &str = "___";

pub const POSTURE_GAIN: f64 = 10.0;
pub const COM_GAIN: f64 = 5.0;
pub const FOOT_GAIN: f64 = 1.0;

pub fn grasp_gain() -> Gain {
    Gain::adaptive(100.0, 0.9, 0.01, 0.9)
}

pub fn ee_posture_gain() -> Gain {
    Gain::adaptive(4.9, 0.9, 0.01, 0.9)
}

fn task_name(name: &str) -> String {
    format!("task{SEP}{name}")
}

fn feature_des(name: &str) -> String {
    format!("feature_des{SEP}{name}")
}

// ────────────────────────────────────────────────────────────────────────────
// Posture
// ────────────────────────────────────────────────────────────────────────────

/// Whole-body posture regularizer tracking `{base}/position` and
/// `{base}/velocity`.
pub fn posture(name: &str, dimension: usize) -> Result<Manifold, WbcError> {
    let entity = feature_des(name);
    let task = Task::new(
        task_name(name),
        ControlLaw::Posture { dimension },
        Gain::Constant(POSTURE_GAIN),
    )
    .with_derivative(true);

    let position = ReferenceBinding::new(
        ValueType::Vector,
        false,
        SourceHandler::DirectTopic {
            topic: "position".into(),
        },
    )
    .with_consumer(SignalRef::new(&entity, "errorIN"));
    let velocity = ReferenceBinding::new(
        ValueType::Vector,
        true,
        SourceHandler::DirectTopic {
            topic: "velocity".into(),
        },
    )
    .with_consumer(SignalRef::new(&entity, "errordotIN"));

    Manifold::new()
        .with_task(task)
        .with_binding(name, position)?
        .with_binding(velocity_name(name), velocity)
}

/// Posture without external references, holding whatever position is
/// written into [`posture_position_ref`].
pub fn posture_keep(name: &str, dimension: usize) -> Manifold {
    Manifold::new().with_task(Task::new(
        task_name(name),
        ControlLaw::Posture { dimension },
        Gain::Constant(POSTURE_GAIN),
    ))
}

/// Input receiving the desired configuration of posture `name`.
pub fn posture_position_ref(name: &str) -> SignalRef {
    SignalRef::new(feature_des(name), "errorIN")
}

// ────────────────────────────────────────────────────────────────────────────
// Grasp
// ────────────────────────────────────────────────────────────────────────────

/// A gripper holding a handle.
#[derive(Debug, Clone, PartialEq)]
pub struct Grasp {
    pub gripper: OpFrame,
    pub handle: OpFrame,
}

impl Grasp {
    pub fn new(gripper: OpFrame, handle: OpFrame) -> Self {
        Self { gripper, handle }
    }

    /// Whether this grasp is expressed relative to `other`: both handles
    /// belong to the same object joint.
    pub fn is_relative_to(&self, other: Option<&Grasp>) -> bool {
        other.is_some_and(|o| o.handle.planner_joint == self.handle.planner_joint)
    }

    fn name(&self) -> String {
        format!("{SEP}{}{SEP}{}", self.gripper.name, self.handle.name)
    }

    /// Build the grasp task.  When `other` holds the same object the task is
    /// relative to the other gripper and needs no planner reference.
    pub fn manifold(&self, other: Option<&Grasp>) -> Result<Manifold, WbcError> {
        match other {
            Some(other) if self.is_relative_to(Some(other)) => Ok(self.relative_manifold(other)),
            _ => self.absolute_manifold(),
        }
    }

    fn relative_manifold(&self, other: &Grasp) -> Manifold {
        let name = format!("{}(rel_to_{})", self.name(), other.gripper.name);
        let law = ControlLaw::Frame6dRelative {
            joint: self.gripper.sot_joint.clone(),
            other_joint: other.gripper.sot_joint.clone(),
            op_modif: self.gripper.sot_pose.compose(self.handle.sot_pose.inverse()),
            op_modif_base: other.handle.sot_pose.compose(other.gripper.sot_pose.inverse()),
        };
        debug!(grasp = %name, "relative grasp");
        Manifold::new().with_task(Task::new(task_name(&name), law, grasp_gain()).with_derivative(true))
    }

    fn absolute_manifold(&self) -> Result<Manifold, WbcError> {
        let name = self.name();
        let entity = feature_des(&name);
        let joint = self.gripper.planner_joint.clone();
        let handler = SourceHandler::JointRelative {
            joint: joint.clone(),
        };
        let task = Task::new(
            task_name(&name),
            ControlLaw::Frame6d {
                joint: self.gripper.sot_joint.clone(),
            },
            grasp_gain(),
        )
        .with_derivative(true);

        Manifold::new()
            .with_task(task)
            .with_binding(
                &joint,
                ReferenceBinding::new(ValueType::MatrixHomo, false, handler.clone())
                    .with_consumer(SignalRef::new(&entity, "position")),
            )?
            .with_binding(
                velocity_name(&joint),
                ReferenceBinding::new(ValueType::Vector, true, handler)
                    .with_consumer(SignalRef::new(&entity, "velocity")),
            )
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Foot, CoM
// ────────────────────────────────────────────────────────────────────────────

/// 6D task holding planner joint `foot` (`robot/joint`) on its reference.
pub fn foot(foot: &str) -> Result<Manifold, WbcError> {
    let (_, joint) = split_joint_name(foot);
    let entity = feature_des(foot);
    let handler = SourceHandler::JointRelative {
        joint: foot.to_string(),
    };
    let task = Task::new(
        task_name(foot),
        ControlLaw::Frame6d {
            joint: joint.to_string(),
        },
        Gain::Constant(FOOT_GAIN),
    );
    Manifold::new()
        .with_task(task)
        .with_binding(
            foot,
            ReferenceBinding::new(ValueType::MatrixHomo, false, handler.clone())
                .with_consumer(SignalRef::new(&entity, "position")),
        )?
        .with_binding(
            velocity_name(foot),
            ReferenceBinding::new(ValueType::Vector, true, handler)
                .with_consumer(SignalRef::new(&entity, "velocity")),
        )
}

/// Center-of-mass task.  An empty `name` reads the anonymous CoM channel.
pub fn com(name: &str) -> Result<Manifold, WbcError> {
    let entity = feature_des(name);
    let handler = SourceHandler::CenterOfMass {
        com: (!name.is_empty()).then(|| name.to_string()),
    };
    Manifold::new()
        .with_task(Task::new(
            task_name(name),
            ControlLaw::CenterOfMass,
            Gain::Constant(COM_GAIN),
        ))
        .with_binding(
            name,
            ReferenceBinding::new(ValueType::Vector3, false, handler.clone())
                .with_consumer(SignalRef::new(&entity, "errorIN")),
        )?
        .with_binding(
            velocity_name(name),
            ReferenceBinding::new(ValueType::Vector3, true, handler)
                .with_consumer(SignalRef::new(&entity, "errordotIN")),
        )
}

// ────────────────────────────────────────────────────────────────────────────
// End-effector posture, admittance
// ────────────────────────────────────────────────────────────────────────────

/// Drive the joint carrying `gripper` to `position`.
pub fn ee_posture(model: &dyn RobotModel, gripper: &OpFrame, position: &[f64]) -> Result<Manifold, WbcError> {
    let index = model
        .joint(&gripper.sot_joint)
        .ok_or_else(|| WbcError::UnknownJoint(gripper.sot_joint.clone()))?;
    if index.nq != position.len() {
        return Err(WbcError::dimension(
            format!("end-effector posture of {}", gripper.sot_joint),
            index.nq,
            position.len(),
        ));
    }
    let name = format!("eeposture{SEP}{}{SEP}{position:?}", gripper.name);
    let law = ControlLaw::JointPosture {
        joint: gripper.sot_joint.clone(),
        index,
        target: position.to_vec(),
    };
    Ok(Manifold::new().with_task(Task::new(task_name(&name), law, ee_posture_gain())))
}

/// Hybrid position/force closing of the joints of one gripper.
pub fn gripper_admittance(config: AdmittanceConfig, joints: Vec<String>) -> Result<Manifold, WbcError> {
    config.validate()?;
    if joints.len() != config.axes() {
        return Err(WbcError::dimension(
            format!("joints of admittance {}", config.name),
            config.axes(),
            joints.len(),
        ));
    }
    let name = format!("admittance{SEP}{}", config.name);
    Ok(Manifold::new().with_task(Task::new(
        task_name(&name),
        ControlLaw::Admittance { config, joints },
        Gain::Constant(1.0),
    )))
}
