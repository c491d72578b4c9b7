//! Robot description document: grippers, handles and contact surfaces.
//!
//! The document is TOML.  Each element carries a `position` giving its pose
//! in the parent link, written either as seven floats `x y z w qx qy qz` or
//! as a table holding `xyz` plus at most one rotation among `xyzw`, `wxyz`
//! and `rpy`:
//!
//! ```toml
//! [[gripper]]
//! name = "l_gripper"
//! link = "arm_left_7_link"
//! position = [0.0, 0.0, -0.1, 1.0, 0.0, 0.0, 0.0]
//! joints = ["gripper_left_joint"]
//! torque_constant = 1.2
//!
//! [[handle]]
//! name = "handle"
//! link = "box_link"
//! position = { xyz = [0.0, 0.0, 0.05], rpy = [0.0, 1.5708, 0.0] }
//! mask = [true, true, true, true, true, false]
//! ```

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use serde::Deserialize;
use tracing::debug;
use wbc_types::WbcError;

use crate::transform::{Quaternion, Transform3D, Vec3};

// ────────────────────────────────────────────────────────────────────────────
// Parsed elements
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub struct Gripper {
    pub robot: Option<String>,
    pub name: String,
    pub clearance: f64,
    pub link: String,
    pub position: Transform3D,
    /// Actuated joints closing the gripper.
    pub joints: Vec<String>,
    pub torque_constant: Option<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Handle {
    pub robot: Option<String>,
    pub name: String,
    pub clearance: f64,
    pub link: String,
    pub position: Transform3D,
    /// Constrained axes: translation x y z, rotation x y z.
    pub mask: [bool; 6],
}

#[derive(Debug, Clone, PartialEq)]
pub struct Contact {
    pub robot: Option<String>,
    pub name: String,
    pub link: String,
    pub points: Vec<Vec3>,
    /// Each shape is a list of indices into `points`.
    pub shapes: Vec<Vec<usize>>,
}

/// Every element of a description document, keyed by (optionally
/// prefixed) name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RobotDescription {
    pub grippers: BTreeMap<String, Gripper>,
    pub handles: BTreeMap<String, Handle>,
    pub contacts: BTreeMap<String, Contact>,
}

// ────────────────────────────────────────────────────────────────────────────
// Raw document
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct RawDocument {
    #[serde(default)]
    gripper: Vec<RawGripper>,
    #[serde(default)]
    handle: Vec<RawHandle>,
    #[serde(default)]
    contact: Vec<RawContact>,
}

#[derive(Debug, Deserialize)]
struct RawGripper {
    name: String,
    link: String,
    position: RawPose,
    #[serde(default)]
    joints: Vec<String>,
    #[serde(default)]
    clearance: f64,
    torque_constant: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct RawHandle {
    name: String,
    link: String,
    position: RawPose,
    #[serde(default)]
    clearance: f64,
    mask: Option<Vec<bool>>,
}

#[derive(Debug, Deserialize)]
struct RawContact {
    name: String,
    link: String,
    points: Vec<f64>,
    shapes: Vec<usize>,
}

/// Pose as written in the document, before validation.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum RawPose {
    /// `x y z w qx qy qz`
    Flat(Vec<f64>),
    Attributes(PoseAttributes),
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PoseAttributes {
    pub xyz: Option<[f64; 3]>,
    pub xyzw: Option<[f64; 4]>,
    pub wxyz: Option<[f64; 4]>,
    pub rpy: Option<[f64; 3]>,
}

// ────────────────────────────────────────────────────────────────────────────
// Parsing
// ────────────────────────────────────────────────────────────────────────────

/// Convert a raw pose into a transform.
///
/// # Errors
///
/// [`WbcError::InvalidPose`] when a flat pose does not hold exactly seven
/// floats or when more than one rotation form is given.
pub fn parse_pose(raw: &RawPose) -> Result<Transform3D, WbcError> {
    match raw {
        RawPose::Flat(values) => {
            let [x, y, z, w, qx, qy, qz]: [f64; 7] = values.as_slice().try_into().map_err(|_| {
                WbcError::InvalidPose(format!(
                    "flat pose needs 7 floats (xyz + wxyz), got {}",
                    values.len()
                ))
            })?;
            Ok(Transform3D::new(
                Vec3::new(x, y, z),
                Quaternion::new(w, qx, qy, qz),
            ))
        }
        RawPose::Attributes(attrs) => {
            let forms = [attrs.xyzw.is_some(), attrs.wxyz.is_some(), attrs.rpy.is_some()]
                .iter()
                .filter(|present| **present)
                .count();
            if forms > 1 {
                return Err(WbcError::InvalidPose(
                    "position must have only one of rpy, wxyz, xyzw".to_string(),
                ));
            }
            let [x, y, z] = attrs.xyz.unwrap_or([0.0; 3]);
            let rotation = if let Some([qx, qy, qz, w]) = attrs.xyzw {
                Quaternion::new(w, qx, qy, qz)
            } else if let Some([w, qx, qy, qz]) = attrs.wxyz {
                Quaternion::new(w, qx, qy, qz)
            } else if let Some([roll, pitch, yaw]) = attrs.rpy {
                Quaternion::from_rpy(roll, pitch, yaw)
            } else {
                Quaternion::identity()
            };
            Ok(Transform3D::new(Vec3::new(x, y, z), rotation))
        }
    }
}

fn parse_mask(name: &str, mask: Option<Vec<bool>>) -> Result<[bool; 6], WbcError> {
    match mask {
        None => Ok([true; 6]),
        Some(values) => values.as_slice().try_into().map_err(|_| {
            WbcError::Description(format!(
                "mask of handle {name} must contain 6 booleans, got {}",
                values.len()
            ))
        }),
    }
}

fn parse_points(name: &str, values: &[f64]) -> Result<Vec<Vec3>, WbcError> {
    if values.len() % 3 != 0 {
        return Err(WbcError::Description(format!(
            "points of contact {name} must contain 3*N floats, got {}",
            values.len()
        )));
    }
    Ok(values
        .chunks_exact(3)
        .map(|c| Vec3::new(c[0], c[1], c[2]))
        .collect())
}

/// Decode count-prefixed index lists: `[3, 0, 1, 2, 4, 0, 2, 3, 1]` holds a
/// triangle and a quad.
fn parse_shapes(name: &str, indices: &[usize], n_points: usize) -> Result<Vec<Vec<usize>>, WbcError> {
    let mut shapes = Vec::new();
    let mut i = 0;
    while i < indices.len() {
        let n = indices[i];
        let end = i + 1 + n;
        let shape = indices.get(i + 1..end).ok_or_else(|| {
            WbcError::Description(format!("shape of contact {name} is truncated at index {i}"))
        })?;
        if let Some(bad) = shape.iter().find(|&&p| p >= n_points) {
            return Err(WbcError::Description(format!(
                "shape of contact {name} refers to point {bad}, only {n_points} points"
            )));
        }
        shapes.push(shape.to_vec());
        i = end;
    }
    Ok(shapes)
}

fn key(prefix: Option<&str>, name: &str) -> String {
    match prefix {
        Some(p) => format!("{p}/{name}"),
        None => name.to_string(),
    }
}

/// Parse a description document.
///
/// When `prefix` is given every element is keyed `prefix/name` and carries
/// `prefix` as its robot.
pub fn parse_description_str(src: &str, prefix: Option<&str>) -> Result<RobotDescription, WbcError> {
    let raw: RawDocument =
        toml::from_str(src).map_err(|e| WbcError::Description(format!("failed to parse: {e}")))?;
    let robot = prefix.map(str::to_string);
    let mut desc = RobotDescription::default();

    for g in raw.gripper {
        let gripper = Gripper {
            robot: robot.clone(),
            position: parse_pose(&g.position)?,
            name: g.name,
            clearance: g.clearance,
            link: g.link,
            joints: g.joints,
            torque_constant: g.torque_constant,
        };
        desc.grippers.insert(key(prefix, &gripper.name), gripper);
    }

    for h in raw.handle {
        let handle = Handle {
            robot: robot.clone(),
            position: parse_pose(&h.position)?,
            mask: parse_mask(&h.name, h.mask)?,
            name: h.name,
            clearance: h.clearance,
            link: h.link,
        };
        desc.handles.insert(key(prefix, &handle.name), handle);
    }

    for c in raw.contact {
        let points = parse_points(&c.name, &c.points)?;
        let shapes = parse_shapes(&c.name, &c.shapes, points.len())?;
        let contact = Contact {
            robot: robot.clone(),
            name: c.name,
            link: c.link,
            points,
            shapes,
        };
        desc.contacts.insert(key(prefix, &contact.name), contact);
    }

    debug!(
        grippers = desc.grippers.len(),
        handles = desc.handles.len(),
        contacts = desc.contacts.len(),
        "description parsed"
    );
    Ok(desc)
}

/// Read and parse a description document from `path`.
pub fn load_description(path: &Path, prefix: Option<&str>) -> Result<RobotDescription, WbcError> {
    let src = fs::read_to_string(path)
        .map_err(|e| WbcError::Description(format!("failed to read {}: {e}", path.display())))?;
    parse_description_str(&src, prefix)
}
