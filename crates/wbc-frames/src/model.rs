//! [`JointTable`] – in-memory [`RobotModel`].
//!
//! Joints are appended in order; each one gets the next free slots in the
//! configuration and velocity vectors.  Used by the CLI simulation and by
//! tests standing in for a full kinematic model.

use wbc_types::{JointIndex, RobotModel};

#[derive(Debug, Clone, Default)]
pub struct JointTable {
    joints: Vec<(String, JointIndex)>,
    nq: usize,
    nv: usize,
}

impl JointTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a joint with `nq` configuration and `nv` velocity entries.
    pub fn with_joint(mut self, name: impl Into<String>, nq: usize, nv: usize) -> Self {
        let index = JointIndex {
            idx_q: self.nq,
            idx_v: self.nv,
            nq,
            nv,
        };
        self.nq += nq;
        self.nv += nv;
        self.joints.push((name.into(), index));
        self
    }

    /// Append a one-dof revolute joint.
    pub fn with_revolute(self, name: impl Into<String>) -> Self {
        self.with_joint(name, 1, 1)
    }

    pub fn nq(&self) -> usize {
        self.nq
    }
}

impl RobotModel for JointTable {
    fn joint(&self, name: &str) -> Option<JointIndex> {
        self.joints
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, index)| *index)
    }

    fn nv(&self) -> usize {
        self.nv
    }

    fn joint_names(&self) -> Vec<String> {
        self.joints.iter().map(|(n, _)| n.clone()).collect()
    }
}
