//! [`JointSelection`] – a joint group carved out of the full robot vectors.
//!
//! An admittance switch only sees the joints it actuates: its measured
//! position comes from the configuration vector, its measured force from the
//! motor currents, and its command is added to the matching entries of the
//! stack's velocity command.

use std::ops::Range;

use wbc_types::{RobotModel, WbcError};

#[derive(Debug, Clone, PartialEq)]
pub struct JointSelection {
    joints: Vec<String>,
    q_ranges: Vec<Range<usize>>,
    v_ranges: Vec<Range<usize>>,
    torque_constant: f64,
}

impl JointSelection {
    /// Look `joints` up in `model`.
    pub fn from_model(
        model: &dyn RobotModel,
        joints: &[String],
        torque_constant: f64,
    ) -> Result<Self, WbcError> {
        let mut q_ranges = Vec::with_capacity(joints.len());
        let mut v_ranges = Vec::with_capacity(joints.len());
        for name in joints {
            let index = model
                .joint(name)
                .ok_or_else(|| WbcError::UnknownJoint(name.clone()))?;
            q_ranges.push(index.idx_q..index.idx_q + index.nq);
            v_ranges.push(index.idx_v..index.idx_v + index.nv);
        }
        Ok(Self {
            joints: joints.to_vec(),
            q_ranges,
            v_ranges,
            torque_constant,
        })
    }

    pub fn joints(&self) -> &[String] {
        &self.joints
    }

    /// Number of velocity entries covered.
    pub fn width(&self) -> usize {
        self.v_ranges.iter().map(|r| r.len()).sum()
    }

    fn gather(ranges: &[Range<usize>], full: &[f64], context: &str) -> Result<Vec<f64>, WbcError> {
        let mut out = Vec::new();
        for r in ranges {
            let slice = full
                .get(r.clone())
                .ok_or_else(|| WbcError::dimension(context, r.end, full.len()))?;
            out.extend_from_slice(slice);
        }
        Ok(out)
    }

    /// Positions of the group out of the robot configuration.
    pub fn select_position(&self, configuration: &[f64]) -> Result<Vec<f64>, WbcError> {
        Self::gather(&self.q_ranges, configuration, "robot configuration")
    }

    /// Measured force of the group: motor current times the torque constant.
    pub fn measured_force(&self, currents: &[f64]) -> Result<Vec<f64>, WbcError> {
        let mut force = Self::gather(&self.v_ranges, currents, "motor currents")?;
        force.iter_mut().for_each(|f| *f *= self.torque_constant);
        Ok(force)
    }

    /// Add the group's `output` to the matching entries of `command`.
    pub fn add_output_to(&self, output: &[f64], command: &mut [f64]) -> Result<(), WbcError> {
        if output.len() != self.width() {
            return Err(WbcError::dimension("joint selection output", self.width(), output.len()));
        }
        let len = command.len();
        let mut values = output.iter();
        for r in &self.v_ranges {
            let target = command
                .get_mut(r.clone())
                .ok_or_else(|| WbcError::dimension("velocity command", r.end, len))?;
            for (slot, value) in target.iter_mut().zip(values.by_ref()) {
                *slot += value;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wbc_types::JointIndex;

    struct TwoJointModel;

    impl RobotModel for TwoJointModel {
        fn joint(&self, name: &str) -> Option<JointIndex> {
            match name {
                "root" => Some(JointIndex { idx_q: 0, idx_v: 0, nq: 7, nv: 6 }),
                "finger" => Some(JointIndex { idx_q: 8, idx_v: 7, nq: 1, nv: 1 }),
                _ => None,
            }
        }

        fn nv(&self) -> usize {
            8
        }

        fn joint_names(&self) -> Vec<String> {
            vec!["root".into(), "finger".into()]
        }
    }

    #[test]
    fn selects_and_scatters_the_group() {
        let sel = JointSelection::from_model(&TwoJointModel, &["finger".to_string()], 2.0).unwrap();
        let q: Vec<f64> = (0..9).map(f64::from).collect();
        let currents = vec![0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 1.5];

        assert_eq!(sel.width(), 1);
        assert_eq!(sel.select_position(&q).unwrap(), vec![8.0]);
        assert_eq!(sel.measured_force(&currents).unwrap(), vec![3.0]);

        let mut command = vec![0.1; 8];
        sel.add_output_to(&[0.4], &mut command).unwrap();
        assert!((command[7] - 0.5).abs() < 1e-12);
        assert_eq!(command[6], 0.1);
    }

    #[test]
    fn unknown_joint_is_an_error() {
        assert_eq!(
            JointSelection::from_model(&TwoJointModel, &["thumb".to_string()], 1.0).unwrap_err(),
            WbcError::UnknownJoint("thumb".to_string())
        );
    }

    #[test]
    fn short_vectors_are_rejected() {
        let sel = JointSelection::from_model(&TwoJointModel, &["finger".to_string()], 1.0).unwrap();
        assert!(sel.select_position(&[0.0; 3]).is_err());
        assert!(sel.add_output_to(&[1.0, 2.0], &mut [0.0; 8]).is_err());
        assert!(sel.add_output_to(&[1.0], &mut [0.0; 3]).is_err());
    }
}
