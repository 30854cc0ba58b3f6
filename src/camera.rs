use glam::{Mat4, Vec3};

/// First-person camera for the 3D pass.
///
/// Owns a perspective projection and a look-at view matrix; both are plain
/// `glam::Mat4` values uploaded into the camera uniform block by
/// `Renderer::upload_camera`.  Projection uses the 0..1 clip depth range
/// wgpu expects.
pub struct Camera {
    pub position: Vec3,
    pub target: Vec3,
    pub field_of_view_y: f32,
    pub aspect: f32,
    pub z_near: f32,
    pub z_far: f32,
    projection: Mat4,
    view: Mat4,
}

impl Camera {
    pub fn new(aspect: f32) -> Self {
        let mut camera = Self {
            position: Vec3::ZERO,
            target: Vec3::NEG_Z,
            field_of_view_y: 77.7,
            aspect,
            z_near: 0.01,
            z_far: 100.0,
            projection: Mat4::IDENTITY,
            view: Mat4::IDENTITY,
        };
        camera.regenerate_projection();
        camera.update();
        camera
    }

    /// Rebuild the projection after changing FOV, aspect or clip planes.
    pub fn regenerate_projection(&mut self) {
        self.projection = Mat4::perspective_rh(
            self.field_of_view_y.to_radians(),
            self.aspect,
            self.z_near,
            self.z_far,
        );
    }

    /// Rebuild the view matrix from the current position and target.
    pub fn update(&mut self) {
        self.view = Mat4::look_at_rh(self.position, self.target, Vec3::Y);
    }

    pub fn projection(&self) -> &Mat4 {
        &self.projection
    }

    pub fn view(&self) -> &Mat4 {
        &self.view
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec4;

    #[test]
    fn view_moves_world_opposite_to_camera() {
        let mut camera = Camera::new(2.4);
        camera.position = Vec3::new(2.0, 0.0, 2.0);
        camera.target = Vec3::new(2.0, 0.0, 1.0);
        camera.update();
        // The target sits on the -Z axis in view space.
        let v = *camera.view() * Vec4::new(2.0, 0.0, 1.0, 1.0);
        assert!(v.x.abs() < 1e-6 && v.y.abs() < 1e-6);
        assert!(v.z < 0.0);
    }

    #[test]
    fn projection_maps_near_plane_to_zero_depth() {
        let camera = Camera::new(1.0);
        let clip = *camera.projection() * Vec4::new(0.0, 0.0, -camera.z_near, 1.0);
        assert!((clip.z / clip.w).abs() < 1e-4);
    }
}
