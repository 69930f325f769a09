//! View and projection matrices the renderer unprojects pixels with.
//!
//! The world is right-handed with `+Z` up. A zero [`ViewRotation`] looks
//! down `+X`.

use crate::math::{EulerRot, Mat3, Mat4, Quat, Vec2, Vec3, Vec4};
use serde::{Deserialize, Serialize};
use std::f32::consts::FRAC_PI_2;

/// Near plane distance used by the offline projections.
pub const OFFLINE_NEAR_PLANE: f32 = 4.0;

/// Camera orientation in degrees.
#[derive(Debug, Copy, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewRotation {
    /// Rotation around the right axis, positive looks up.
    pub pitch: f32,
    /// Rotation around `+Z`, positive turns from `+X` towards `+Y`.
    pub yaw: f32,
    /// Rotation around the forward axis.
    pub roll: f32,
}

impl ViewRotation {
    /// Creates a new rotation from degrees.
    pub const fn new(pitch: f32, yaw: f32, roll: f32) -> Self { Self { pitch, yaw, roll } }

    /// Converts the rotation into a quaternion.
    pub fn to_quat(self) -> Quat {
        Quat::from_euler(
            EulerRot::ZYX,
            self.yaw.to_radians(),
            -self.pitch.to_radians(),
            self.roll.to_radians(),
        )
    }

    /// World-space forward direction.
    pub fn forward(self) -> Vec3 { self.to_quat() * Vec3::X }

    /// World-space up direction.
    pub fn up(self) -> Vec3 { self.to_quat() * Vec3::Z }
}

/// Faces of a cube map, in the order they are stored in a DDS file.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum CubeFace {
    /// `+X` face.
    PositiveX,
    /// `-X` face.
    NegativeX,
    /// `+Y` face.
    PositiveY,
    /// `-Y` face.
    NegativeY,
    /// `+Z` face.
    PositiveZ,
    /// `-Z` face.
    NegativeZ,
}

impl CubeFace {
    /// All faces in storage order.
    pub const ALL: [CubeFace; 6] = [
        CubeFace::PositiveX,
        CubeFace::NegativeX,
        CubeFace::PositiveY,
        CubeFace::NegativeY,
        CubeFace::PositiveZ,
        CubeFace::NegativeZ,
    ];

    /// Viewing direction and up vector of the face in the left-handed, Y-up
    /// cube map space DDS files use.
    const fn cube_basis(self) -> (Vec3, Vec3) {
        match self {
            CubeFace::PositiveX => (Vec3::X, Vec3::Y),
            CubeFace::NegativeX => (Vec3::NEG_X, Vec3::Y),
            CubeFace::PositiveY => (Vec3::Y, Vec3::NEG_Z),
            CubeFace::NegativeY => (Vec3::NEG_Y, Vec3::Z),
            CubeFace::PositiveZ => (Vec3::Z, Vec3::Y),
            CubeFace::NegativeZ => (Vec3::NEG_Z, Vec3::Y),
        }
    }

    /// Viewing direction and up vector of the face in the Z-up world for a
    /// viewer oriented by `rotation`.
    pub fn world_basis(self, rotation: ViewRotation) -> (Vec3, Vec3) {
        // Cube space looks down +Z with +X on the right; the world looks
        // down +X with -Y on the right.
        let cube_to_world = Mat3::from_cols(Vec3::NEG_Y, Vec3::Z, Vec3::X);
        let q = rotation.to_quat();
        let (dir, up) = self.cube_basis();
        (q * (cube_to_world * dir), q * (cube_to_world * up))
    }
}

/// Matrices describing a single perspective view.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct ViewMatrices {
    origin: Vec3,
    view: Mat4,
    projection: Mat4,
    inv_view_projection: Mat4,
}

impl ViewMatrices {
    /// Creates the view from already built matrices.
    pub fn new(origin: Vec3, view: Mat4, projection: Mat4) -> Self {
        Self {
            origin,
            view,
            projection,
            inv_view_projection: (projection * view).inverse(),
        }
    }

    /// Creates a reversed-Z infinite perspective view looking along
    /// `forward`.
    ///
    /// # Arguments
    ///
    /// * `origin` - Position of the viewer.
    /// * `forward` - Viewing direction.
    /// * `up` - Up direction, must not be parallel to `forward`.
    /// * `fov_y` - Vertical field of view in radians.
    /// * `aspect` - Width over height.
    /// * `near` - Distance of the near plane.
    pub fn look_to(origin: Vec3, forward: Vec3, up: Vec3, fov_y: f32, aspect: f32, near: f32) -> Self {
        Self::new(
            origin,
            Mat4::look_to_rh(origin, forward.normalize(), up.normalize()),
            Mat4::perspective_infinite_reverse_rh(fov_y, aspect, near),
        )
    }

    /// Creates a view oriented by `rotation`.
    pub fn from_rotation(origin: Vec3, rotation: ViewRotation, fov_y: f32, aspect: f32, near: f32) -> Self {
        Self::look_to(origin, rotation.forward(), rotation.up(), fov_y, aspect, near)
    }

    /// Creates the square 90° view of one cube map face.
    pub fn cube_face(origin: Vec3, rotation: ViewRotation, face: CubeFace) -> Self {
        let (forward, up) = face.world_basis(rotation);
        Self::look_to(origin, forward, up, FRAC_PI_2, 1.0, OFFLINE_NEAR_PLANE)
    }

    /// Position of the viewer.
    pub fn origin(&self) -> Vec3 { self.origin }

    /// World to view matrix.
    pub fn view(&self) -> &Mat4 { &self.view }

    /// View to clip matrix.
    pub fn projection(&self) -> &Mat4 { &self.projection }

    /// Clip to world matrix.
    pub fn inv_view_projection(&self) -> &Mat4 { &self.inv_view_projection }

    /// World-space direction pointing from the scene back towards the viewer.
    pub fn reverse_forward(&self) -> Vec3 { self.view.row(2).truncate().normalize() }

    /// Unprojects a point in normalised device coordinates (Y up) to a
    /// world-space position halfway down the depth range.
    pub fn unproject(&self, ndc: Vec2) -> Vec3 { unproject(&self.inv_view_projection, ndc) }
}

/// Unprojects `ndc` at depth 0.5 with the given inverse view-projection.
#[inline]
pub fn unproject(inv_view_projection: &Mat4, ndc: Vec2) -> Vec3 {
    let p = *inv_view_projection * Vec4::new(ndc.x, ndc.y, 0.5, 1.0);
    p.truncate() / p.w
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn assert_vec_eq(a: Vec3, b: Vec3, epsilon: f32) {
        assert!(a.abs_diff_eq(b, epsilon), "{a} != {b}");
    }

    fn direction(view: &ViewMatrices, ndc: Vec2) -> Vec3 { (view.unproject(ndc) - view.origin()).normalize() }

    #[test]
    fn zero_rotation_looks_down_x() {
        let rot = ViewRotation::default();
        assert_vec_eq(rot.forward(), Vec3::X, 1e-6);
        assert_vec_eq(rot.up(), Vec3::Z, 1e-6);
        assert_vec_eq(ViewRotation::new(0.0, 90.0, 0.0).forward(), Vec3::Y, 1e-6);
        assert_vec_eq(ViewRotation::new(90.0, 0.0, 0.0).forward(), Vec3::Z, 1e-6);
    }

    #[test]
    fn centre_of_screen_is_forward() {
        let origin = Vec3::new(10.0, -5.0, 2.0);
        let view = ViewMatrices::from_rotation(origin, ViewRotation::new(0.0, 30.0, 0.0), 1.2, 16.0 / 9.0, 1.0);
        let dir = direction(&view, Vec2::ZERO);
        assert_vec_eq(dir, ViewRotation::new(0.0, 30.0, 0.0).forward(), 1e-4);
        assert_vec_eq(view.reverse_forward(), -dir, 1e-4);
    }

    #[test]
    fn top_left_of_screen_is_up_and_left() {
        let view = ViewMatrices::from_rotation(Vec3::ZERO, ViewRotation::default(), FRAC_PI_2, 1.0, 1.0);
        let dir = direction(&view, Vec2::new(-0.9, 0.9));
        // Looking down +X with Z up, left is +Y.
        assert!(dir.z > 0.0);
        assert!(dir.y > 0.0);
    }

    #[test]
    fn cube_faces_cover_all_axes() {
        let rot = ViewRotation::default();
        let forwards: Vec<Vec3> = CubeFace::ALL.iter().map(|f| f.world_basis(rot).0).collect();
        for axis in [Vec3::X, Vec3::NEG_X, Vec3::Y, Vec3::NEG_Y, Vec3::Z, Vec3::NEG_Z] {
            assert!(forwards.iter().any(|f| f.abs_diff_eq(axis, 1e-6)));
        }
        for face in CubeFace::ALL {
            let (dir, up) = face.world_basis(rot);
            assert_relative_eq!(dir.dot(up), 0.0, epsilon = 1e-6);
        }
        // The front face of the cube looks where the viewer looks.
        assert_vec_eq(CubeFace::PositiveZ.world_basis(rot).0, Vec3::X, 1e-6);
    }

    #[test]
    fn cube_face_view_is_square_and_ninety_degrees() {
        let view = ViewMatrices::cube_face(Vec3::ZERO, ViewRotation::default(), CubeFace::PositiveZ);
        let centre = direction(&view, Vec2::ZERO);
        let edge = direction(&view, Vec2::new(1.0, 0.0));
        assert_relative_eq!(centre.angle_between(edge), std::f32::consts::FRAC_PI_4, epsilon = 1e-4);
    }
}
