//! Camera matrices for occlusion passes.
//!
//! The occluder takes the view with the camera at the origin plus the world
//! camera position in double precision, so far-from-origin worlds never lose
//! precision in the float matrices.

use glam::{DVec3, Mat4, Vec3};

use crate::buffer::{PIXEL_HEIGHT, PIXEL_WIDTH};
use crate::occluder::SceneParams;

/// Aspect ratio of the occlusion buffer.
pub const BUFFER_ASPECT: f32 = PIXEL_WIDTH as f32 / PIXEL_HEIGHT as f32;

/// Projection of a [`Camera`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Projection {
    Perspective {
        fov: f32,
        aspect: f32,
        near: f32,
        far: f32,
    },
    /// Used for shadow passes.
    Orthographic {
        half_width: f32,
        half_height: f32,
        near: f32,
        far: f32,
    },
}

/// Camera for an occlusion pass.
#[derive(Debug, Clone)]
pub struct Camera {
    pub position: DVec3,
    pub direction: Vec3,
    pub up: Vec3,
    pub projection: Projection,
}

impl Default for Camera {
    fn default() -> Self {
        Self {
            position: DVec3::ZERO,
            direction: Vec3::Z,
            up: Vec3::Y,
            projection: Projection::Perspective {
                fov: std::f32::consts::FRAC_PI_2,
                aspect: BUFFER_ASPECT,
                near: 0.05,
                far: 1024.0,
            },
        }
    }
}

impl Camera {
    /// Perspective camera matching the buffer aspect ratio.
    pub fn perspective(position: DVec3, direction: Vec3, fov: f32, near: f32, far: f32) -> Self {
        Self {
            position,
            direction: direction.normalize(),
            up: Vec3::Y,
            projection: Projection::Perspective {
                fov,
                aspect: BUFFER_ASPECT,
                near,
                far,
            },
        }
    }

    /// Orthographic camera, e.g. a light looking down at the terrain.
    pub fn orthographic(
        position: DVec3,
        direction: Vec3,
        half_width: f32,
        half_height: f32,
        near: f32,
        far: f32,
    ) -> Self {
        Self {
            position,
            direction: direction.normalize(),
            up: Vec3::Y,
            projection: Projection::Orthographic {
                half_width,
                half_height,
                near,
                far,
            },
        }
    }

    /// Look at a target position.
    pub fn look_at(&mut self, target: DVec3) {
        self.direction = (target - self.position).as_vec3().normalize();
    }

    /// Rotation-only view matrix.
    pub fn view_matrix(&self) -> Mat4 {
        Mat4::look_to_rh(Vec3::ZERO, self.direction, self.up)
    }

    pub fn projection_matrix(&self) -> Mat4 {
        match self.projection {
            Projection::Perspective {
                fov,
                aspect,
                near,
                far,
            } => Mat4::perspective_rh(fov, aspect, near, far),
            Projection::Orthographic {
                half_width,
                half_height,
                near,
                far,
            } => Mat4::orthographic_rh(
                -half_width,
                half_width,
                -half_height,
                half_height,
                near,
                far,
            ),
        }
    }

    /// Matrices and position for [`crate::TerrainOccluder::prepare`].
    pub fn scene(&self) -> SceneParams {
        SceneParams {
            projection: self.projection_matrix(),
            view: self.view_matrix(),
            camera: self.position,
        }
    }
}
