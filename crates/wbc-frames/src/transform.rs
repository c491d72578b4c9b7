//! Rigid transforms and the frame graph.
//!
//! [`Transform3D`] is the pose type used everywhere operational frames are
//! manipulated (gripper and handle offsets, relative-grasp modifiers).  It
//! converts to and from the 4×4 homogeneous matrices carried by
//! `matrix_homo` reference channels.
//!
//! [`TfEngine`] keeps a directed graph of named frames.  The control loop
//! serves `frame-pair` bindings from it: the value of channel
//! `frame1_wrt_frame0` is `tf.lookup(frame0, frame1)`.
//!
//! # Example
//!
//! ```rust
//! use wbc_frames::transform::{TfEngine, Transform3D, Vec3, Quaternion};
//!
//! let mut tf = TfEngine::new();
//! tf.set_transform("world", "base_link",
//!     Transform3D::new(Vec3::new(1.0, 0.0, 0.0), Quaternion::identity()));
//! tf.set_transform("base_link", "gripper",
//!     Transform3D::new(Vec3::new(0.5, 0.0, 0.0), Quaternion::identity()));
//!
//! let t = tf.lookup("world", "gripper").unwrap();
//! assert!((t.translation.x - 1.5).abs() < 1e-9);
//! ```

use std::collections::{HashMap, HashSet, VecDeque};

use wbc_types::WbcError;

// ────────────────────────────────────────────────────────────────────────────
// Primitive types
// ────────────────────────────────────────────────────────────────────────────

/// A 3-D translation vector.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Vec3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Vec3 {
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    pub fn zero() -> Self {
        Self::new(0.0, 0.0, 0.0)
    }

    pub fn add(self, rhs: Self) -> Self {
        Self::new(self.x + rhs.x, self.y + rhs.y, self.z + rhs.z)
    }

    pub fn neg(self) -> Self {
        Self::new(-self.x, -self.y, -self.z)
    }

    pub fn to_array(self) -> [f64; 3] {
        [self.x, self.y, self.z]
    }
}

/// A unit quaternion (w, x, y, z convention).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Quaternion {
    pub w: f64,
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Quaternion {
    /// The caller is responsible for providing a unit quaternion.
    pub fn new(w: f64, x: f64, y: f64, z: f64) -> Self {
        Self { w, x, y, z }
    }

    pub fn identity() -> Self {
        Self::new(1.0, 0.0, 0.0, 0.0)
    }

    /// Rotation from roll-pitch-yaw angles (extrinsic X, then Y, then Z).
    pub fn from_rpy(roll: f64, pitch: f64, yaw: f64) -> Self {
        let (sr, cr) = (roll / 2.0).sin_cos();
        let (sp, cp) = (pitch / 2.0).sin_cos();
        let (sy, cy) = (yaw / 2.0).sin_cos();
        Self::new(
            cr * cp * cy + sr * sp * sy,
            sr * cp * cy - cr * sp * sy,
            cr * sp * cy + sr * cp * sy,
            cr * cp * sy - sr * sp * cy,
        )
    }

    /// Hamilton product: compose two rotations.
    pub fn mul(self, rhs: Self) -> Self {
        Self::new(
            self.w * rhs.w - self.x * rhs.x - self.y * rhs.y - self.z * rhs.z,
            self.w * rhs.x + self.x * rhs.w + self.y * rhs.z - self.z * rhs.y,
            self.w * rhs.y - self.x * rhs.z + self.y * rhs.w + self.z * rhs.x,
            self.w * rhs.z + self.x * rhs.y - self.y * rhs.x + self.z * rhs.w,
        )
    }

    /// Conjugate (== inverse for a unit quaternion).
    pub fn conjugate(self) -> Self {
        Self::new(self.w, -self.x, -self.y, -self.z)
    }

    pub fn norm(self) -> f64 {
        (self.w * self.w + self.x * self.x + self.y * self.y + self.z * self.z).sqrt()
    }

    /// Rotate a vector: p' = q * p * q*.
    pub fn rotate(self, v: Vec3) -> Vec3 {
        let p = Self::new(0.0, v.x, v.y, v.z);
        let rotated = self.mul(p).mul(self.conjugate());
        Vec3::new(rotated.x, rotated.y, rotated.z)
    }

    /// 3×3 rotation matrix, row major.
    pub fn to_rotation_matrix(self) -> [[f64; 3]; 3] {
        let Self { w, x, y, z } = self;
        [
            [
                1.0 - 2.0 * (y * y + z * z),
                2.0 * (x * y - z * w),
                2.0 * (x * z + y * w),
            ],
            [
                2.0 * (x * y + z * w),
                1.0 - 2.0 * (x * x + z * z),
                2.0 * (y * z - x * w),
            ],
            [
                2.0 * (x * z - y * w),
                2.0 * (y * z + x * w),
                1.0 - 2.0 * (x * x + y * y),
            ],
        ]
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Transform3D
// ────────────────────────────────────────────────────────────────────────────

/// A rigid-body transform: pose of frame B expressed in frame A.
///
/// To bring a point from frame B into frame A, rotate it by `rotation` then
/// add `translation`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transform3D {
    pub translation: Vec3,
    pub rotation: Quaternion,
}

impl Transform3D {
    pub fn new(translation: Vec3, rotation: Quaternion) -> Self {
        Self {
            translation,
            rotation,
        }
    }

    pub fn identity() -> Self {
        Self::new(Vec3::zero(), Quaternion::identity())
    }

    /// Build from `x y z qx qy qz qw`.
    pub fn from_xyz_xyzw(v: [f64; 7]) -> Self {
        Self::new(
            Vec3::new(v[0], v[1], v[2]),
            Quaternion::new(v[6], v[3], v[4], v[5]),
        )
    }

    /// `x y z qx qy qz qw`.
    pub fn to_xyz_xyzw(self) -> [f64; 7] {
        let Self {
            translation: t,
            rotation: q,
        } = self;
        [t.x, t.y, t.z, q.x, q.y, q.z, q.w]
    }

    /// Compose two transforms: if `self` = T_A_B and `other` = T_B_C, the
    /// result is T_A_C.
    pub fn compose(self, other: Self) -> Self {
        let translated = self.translation.add(self.rotation.rotate(other.translation));
        let rotated = self.rotation.mul(other.rotation);
        Self::new(translated, rotated)
    }

    /// T_B_A from T_A_B.
    pub fn inverse(self) -> Self {
        let inv_rot = self.rotation.conjugate();
        Self::new(inv_rot.rotate(self.translation.neg()), inv_rot)
    }

    /// Apply the transform to a point.
    pub fn apply(self, p: Vec3) -> Vec3 {
        self.translation.add(self.rotation.rotate(p))
    }

    /// 4×4 homogeneous matrix, row major.
    pub fn to_matrix(self) -> [[f64; 4]; 4] {
        let r = self.rotation.to_rotation_matrix();
        let t = self.translation;
        [
            [r[0][0], r[0][1], r[0][2], t.x],
            [r[1][0], r[1][1], r[1][2], t.y],
            [r[2][0], r[2][1], r[2][2], t.z],
            [0.0, 0.0, 0.0, 1.0],
        ]
    }

    /// Whether both transforms map points identically up to `tol`.
    ///
    /// Compares homogeneous matrices, so `q` and `-q` are equal.
    pub fn approx_eq(self, other: Self, tol: f64) -> bool {
        let a = self.to_matrix();
        let b = other.to_matrix();
        a.iter()
            .flatten()
            .zip(b.iter().flatten())
            .all(|(x, y)| (x - y).abs() <= tol)
    }
}

impl Default for Transform3D {
    fn default() -> Self {
        Self::identity()
    }
}

// ────────────────────────────────────────────────────────────────────────────
// TfEngine
// ────────────────────────────────────────────────────────────────────────────

/// A directed graph of named reference frames and the [`Transform3D`]s that
/// relate them.
///
/// Edges are directional: adding `"A" → "B"` does not create the inverse.
/// [`TfEngine::lookup`] performs BFS to find the shortest path and returns
/// the composed transform.
#[derive(Debug, Default)]
pub struct TfEngine {
    /// `edges[from][to] = Transform3D`
    edges: HashMap<String, HashMap<String, Transform3D>>,
}

impl TfEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register or update the pose of `child_frame` in `parent_frame`.
    pub fn set_transform(&mut self, parent_frame: &str, child_frame: &str, transform: Transform3D) {
        self.edges
            .entry(parent_frame.to_string())
            .or_default()
            .insert(child_frame.to_string(), transform);
    }

    /// Pose of `target_frame` expressed in `source_frame`.
    ///
    /// Returns `None` if no path exists between the two frames.
    pub fn lookup(&self, source_frame: &str, target_frame: &str) -> Option<Transform3D> {
        if source_frame == target_frame {
            return Some(Transform3D::identity());
        }

        let mut queue: VecDeque<(String, Transform3D)> = VecDeque::new();
        let mut visited: HashSet<String> = HashSet::new();

        queue.push_back((source_frame.to_string(), Transform3D::identity()));
        visited.insert(source_frame.to_string());

        while let Some((current, accumulated)) = queue.pop_front() {
            if let Some(neighbours) = self.edges.get(&current) {
                for (next, edge_tf) in neighbours {
                    if visited.contains(next) {
                        continue;
                    }
                    let composed = accumulated.compose(*edge_tf);
                    if next == target_frame {
                        return Some(composed);
                    }
                    visited.insert(next.clone());
                    queue.push_back((next.clone(), composed));
                }
            }
        }

        None
    }

    /// Like [`TfEngine::lookup`] but reporting a missing path as an error.
    pub fn require(&self, source_frame: &str, target_frame: &str) -> Result<Transform3D, WbcError> {
        self.lookup(source_frame, target_frame)
            .ok_or_else(|| WbcError::UnknownFrame(format!("{target_frame} wrt {source_frame}")))
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::{FRAC_1_SQRT_2, FRAC_PI_2};

    // ── Quaternion ──────────────────────────────────────────────────────────

    #[test]
    fn quaternion_90deg_yaw_rotates_x_to_y() {
        let q = Quaternion::new(FRAC_1_SQRT_2, 0.0, 0.0, FRAC_1_SQRT_2);
        let r = q.rotate(Vec3::new(1.0, 0.0, 0.0));
        assert!(r.x.abs() < 1e-9, "x should be ~0, got {}", r.x);
        assert!((r.y - 1.0).abs() < 1e-9, "y should be ~1, got {}", r.y);
        assert!(r.z.abs() < 1e-9);
    }

    #[test]
    fn rpy_yaw_matches_axis_angle() {
        let q = Quaternion::from_rpy(0.0, 0.0, FRAC_PI_2);
        assert!((q.w - FRAC_1_SQRT_2).abs() < 1e-9);
        assert!((q.z - FRAC_1_SQRT_2).abs() < 1e-9);
        assert!(q.x.abs() < 1e-9 && q.y.abs() < 1e-9);
    }

    #[test]
    fn rpy_produces_unit_quaternion() {
        let q = Quaternion::from_rpy(0.3, -1.1, 2.4);
        assert!((q.norm() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn rotation_matrix_matches_rotate() {
        let q = Quaternion::from_rpy(0.2, 0.4, -0.7);
        let m = q.to_rotation_matrix();
        let v = Vec3::new(0.3, -1.0, 2.0);
        let r = q.rotate(v);
        let by_matrix = [
            m[0][0] * v.x + m[0][1] * v.y + m[0][2] * v.z,
            m[1][0] * v.x + m[1][1] * v.y + m[1][2] * v.z,
            m[2][0] * v.x + m[2][1] * v.y + m[2][2] * v.z,
        ];
        assert!((r.x - by_matrix[0]).abs() < 1e-9);
        assert!((r.y - by_matrix[1]).abs() < 1e-9);
        assert!((r.z - by_matrix[2]).abs() < 1e-9);
    }

    // ── Transform3D ─────────────────────────────────────────────────────────

    #[test]
    fn inverse_composes_to_identity() {
        let t = Transform3D::new(
            Vec3::new(0.1, -0.4, 1.2),
            Quaternion::from_rpy(0.5, 0.1, -0.3),
        );
        assert!(t.compose(t.inverse()).approx_eq(Transform3D::identity(), 1e-9));
        assert!(t.inverse().compose(t).approx_eq(Transform3D::identity(), 1e-9));
    }

    #[test]
    fn xyz_xyzw_roundtrip() {
        let raw = [1.0, 2.0, 3.0, 0.0, 0.0, FRAC_1_SQRT_2, FRAC_1_SQRT_2];
        let t = Transform3D::from_xyz_xyzw(raw);
        assert_eq!(t.rotation.w, FRAC_1_SQRT_2);
        assert_eq!(t.to_xyz_xyzw(), raw);
    }

    #[test]
    fn matrix_has_translation_in_last_column() {
        let t = Transform3D::new(Vec3::new(1.0, 2.0, 3.0), Quaternion::identity());
        let m = t.to_matrix();
        assert_eq!([m[0][3], m[1][3], m[2][3], m[3][3]], [1.0, 2.0, 3.0, 1.0]);
    }

    #[test]
    fn approx_eq_ignores_quaternion_sign() {
        let q = Quaternion::from_rpy(0.1, 0.2, 0.3);
        let neg = Quaternion::new(-q.w, -q.x, -q.y, -q.z);
        let a = Transform3D::new(Vec3::zero(), q);
        let b = Transform3D::new(Vec3::zero(), neg);
        assert!(a.approx_eq(b, 1e-12));
    }

    // ── TfEngine ────────────────────────────────────────────────────────────

    #[test]
    fn lookup_same_frame_returns_identity() {
        let tf = TfEngine::new();
        assert_eq!(tf.lookup("world", "world").unwrap(), Transform3D::identity());
    }

    #[test]
    fn lookup_composed_chain() {
        let mut tf = TfEngine::new();
        tf.set_transform(
            "world",
            "base_link",
            Transform3D::new(Vec3::new(1.0, 0.0, 0.0), Quaternion::identity()),
        );
        tf.set_transform(
            "base_link",
            "gripper",
            Transform3D::new(Vec3::new(0.5, 0.0, 0.0), Quaternion::identity()),
        );
        let t = tf.lookup("world", "gripper").unwrap();
        assert!((t.translation.x - 1.5).abs() < 1e-9);
    }

    #[test]
    fn lookup_respects_rotation_in_chain() {
        let q90z = Quaternion::new(FRAC_1_SQRT_2, 0.0, 0.0, FRAC_1_SQRT_2);
        let mut tf = TfEngine::new();
        tf.set_transform("world", "base_link", Transform3D::new(Vec3::zero(), q90z));
        tf.set_transform(
            "base_link",
            "camera",
            Transform3D::new(Vec3::new(1.0, 0.0, 0.0), Quaternion::identity()),
        );
        let t = tf.lookup("world", "camera").unwrap();
        assert!(t.translation.x.abs() < 1e-9, "x={}", t.translation.x);
        assert!((t.translation.y - 1.0).abs() < 1e-9, "y={}", t.translation.y);
    }

    #[test]
    fn require_reports_missing_path() {
        let mut tf = TfEngine::new();
        tf.set_transform("world", "base_link", Transform3D::identity());
        assert!(tf.lookup("base_link", "world").is_none());
        assert!(matches!(
            tf.require("base_link", "world"),
            Err(WbcError::UnknownFrame(_))
        ));
    }
}
