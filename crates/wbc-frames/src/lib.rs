//! `wbc-frames` – spatial layer of the whole-body controller.
//!
//! # Modules
//!
//! - [`transform`] – rigid transforms and the [`TfEngine`][transform::TfEngine]
//!   frame graph used to publish relative frame poses.
//! - [`model`] – [`JointTable`][model::JointTable], an in-memory robot model.
//! - [`op_frame`] – [`OpFrame`][op_frame::OpFrame]: grippers and handles
//!   re-expressed in the closest controllable joint.
//! - [`description`] – parser for robot description documents (grippers,
//!   handles, contact surfaces).

pub mod description;
pub mod model;
pub mod op_frame;
pub mod transform;

pub use description::{Contact, Gripper, Handle, RobotDescription, load_description, parse_description_str};
pub use model::JointTable;
pub use op_frame::{KinematicTree, OpFrame, StaticKinematicTree};
pub use transform::{Quaternion, TfEngine, Transform3D, Vec3};
