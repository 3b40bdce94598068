//! Pinhole and thin-lens camera.
//!
//! The view is described by yaw and pitch. In camera space the view axis is
//! -Y and the image plane spans X (image rows) and Z (image columns); the
//! transform `rot_y(yaw) * rot_z(pitch)` takes it to world space. With
//! `pitch = -pi/2` the camera looks at the horizon, `yaw = pi/2` faces +Z.

use std::f64::consts::{FRAC_PI_2, PI, TAU};

use rand::{Rng, RngCore};
use voxen_core::description::CameraDescription;
use voxen_math::{DMat3, DVec3};

use crate::Ray;

pub const MIN_FOV: f64 = 1.0;
pub const MAX_FOV: f64 = 110.0;
pub const MIN_DOF: f64 = 0.5;
pub const MAX_DOF: f64 = 5000.0;

/// Camera for generating rays into the scene.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Camera {
    position: DVec3,
    yaw: f64,
    pitch: f64,
    /// Vertical field of view in degrees
    fov: f64,
    /// Depth of field; larger means a smaller aperture
    dof: f64,
    /// Distance to the plane in focus
    focal_offset: f64,
    infinite_dof: bool,

    // Cached values, refreshed by `update()`
    transform: DMat3,
    fov_tan: f64,
}

impl Camera {
    /// Create a new camera with default settings.
    pub fn new() -> Self {
        let mut camera = Self {
            position: DVec3::ZERO,
            yaw: -FRAC_PI_2,
            pitch: 0.0,
            fov: 70.0,
            dof: 8.0,
            focal_offset: 2.0,
            infinite_dof: true,
            transform: DMat3::IDENTITY,
            fov_tan: 0.0,
        };
        camera.update();
        camera
    }

    /// Set camera position (world coordinates).
    pub fn with_position(mut self, position: DVec3) -> Self {
        self.position = position;
        self
    }

    /// Set view angles.
    pub fn with_view(mut self, yaw: f64, pitch: f64) -> Self {
        self.set_view(yaw, pitch);
        self
    }

    /// Set vertical field of view in degrees.
    pub fn with_fov(mut self, fov: f64) -> Self {
        self.set_fov(fov);
        self
    }

    /// Enable a thin lens focused at `focal_offset`.
    pub fn with_lens(mut self, dof: f64, focal_offset: f64) -> Self {
        self.infinite_dof = false;
        self.dof = dof.clamp(MIN_DOF, MAX_DOF);
        self.focal_offset = focal_offset.max(0.01);
        self
    }

    fn update(&mut self) {
        self.transform = DMat3::from_rotation_y(self.yaw) * DMat3::from_rotation_z(self.pitch);
        self.fov_tan = 2.0 * (self.fov / 360.0 * PI).tan();
    }

    pub fn position(&self) -> DVec3 {
        self.position
    }

    pub fn set_position(&mut self, position: DVec3) {
        self.position = position;
    }

    pub fn yaw(&self) -> f64 {
        self.yaw
    }

    pub fn pitch(&self) -> f64 {
        self.pitch
    }

    pub fn fov(&self) -> f64 {
        self.fov
    }

    pub fn dof(&self) -> f64 {
        self.dof
    }

    pub fn focal_offset(&self) -> f64 {
        self.focal_offset
    }

    pub fn infinite_dof(&self) -> bool {
        self.infinite_dof
    }

    /// Pitch is clamped to [-pi, 0], yaw wraps around.
    pub fn set_view(&mut self, yaw: f64, pitch: f64) {
        self.yaw = wrap_yaw(yaw);
        self.pitch = pitch.clamp(-PI, 0.0);
        self.update();
    }

    pub fn rotate_view(&mut self, yaw: f64, pitch: f64) {
        self.set_view(self.yaw + yaw, self.pitch + pitch);
    }

    pub fn set_fov(&mut self, fov: f64) {
        self.fov = fov.clamp(MIN_FOV, MAX_FOV);
        self.update();
    }

    pub fn set_dof(&mut self, dof: f64) {
        self.dof = dof.clamp(MIN_DOF, MAX_DOF);
    }

    pub fn set_infinite_dof(&mut self, infinite: bool) {
        self.infinite_dof = infinite;
    }

    pub fn set_focal_offset(&mut self, offset: f64) {
        self.focal_offset = offset.max(0.01);
    }

    /// Unit vector along the centre of the view.
    pub fn view_direction(&self) -> DVec3 {
        self.transform * DVec3::NEG_Y
    }

    /// Horizontal unit vector pointing to the right of the image.
    pub fn right(&self) -> DVec3 {
        DMat3::from_rotation_y(self.yaw) * DVec3::Z
    }

    pub fn move_forward(&mut self, amount: f64) {
        self.position += self.view_direction() * amount;
    }

    pub fn move_backward(&mut self, amount: f64) {
        self.move_forward(-amount);
    }

    pub fn strafe_right(&mut self, amount: f64) {
        self.position += self.right() * amount;
    }

    pub fn strafe_left(&mut self, amount: f64) {
        self.strafe_right(-amount);
    }

    pub fn move_up(&mut self, amount: f64) {
        self.position.y += amount;
    }

    pub fn move_down(&mut self, amount: f64) {
        self.position.y -= amount;
    }

    /// Generate a view ray for normalized image coordinates.
    ///
    /// `x` and `y` are measured in units of image height from the image
    /// centre, `y` growing downwards. The origin is in world coordinates.
    pub fn calc_view_ray(&self, x: f64, y: f64, rng: &mut dyn RngCore) -> Ray {
        let (origin, direction) = if self.infinite_dof {
            let d = DVec3::new(self.fov_tan * y, -1.0, self.fov_tan * x);
            (DVec3::ZERO, d.normalize())
        } else {
            self.lens_sample(self.fov_tan * x, self.fov_tan * y, rng)
        };

        let mut ray = Ray::new(
            self.transform * origin + self.position,
            (self.transform * direction).normalize(),
        );
        ray.specular = true;
        ray
    }

    /// Thin lens: jitter the origin over the aperture and aim every sample
    /// at the same point on the focal plane.
    fn lens_sample(&self, x: f64, y: f64, rng: &mut dyn RngCore) -> (DVec3, DVec3) {
        let focus = DVec3::new(y, -1.0, x) * self.focal_offset;
        let aperture = ((0.01 / self.dof) * self.focal_offset).sqrt();
        let (rx, rz) = random_in_unit_disk(rng);
        let origin = DVec3::new(rx * aperture, 0.0, rz * aperture);
        (origin, (focus - origin).normalize())
    }

    pub fn from_description(desc: &CameraDescription) -> Self {
        let mut camera = Camera::new().with_position(DVec3::from_array(desc.position));
        camera.set_view(desc.yaw, desc.pitch);
        camera.set_fov(desc.fov);
        camera.set_dof(desc.dof);
        camera.set_focal_offset(desc.focal_offset);
        camera.infinite_dof = desc.infinite_dof;
        camera
    }

    pub fn to_description(&self) -> CameraDescription {
        CameraDescription {
            position: self.position.to_array(),
            yaw: self.yaw,
            pitch: self.pitch,
            fov: self.fov,
            dof: self.dof,
            infinite_dof: self.infinite_dof,
            focal_offset: self.focal_offset,
        }
    }
}

impl Default for Camera {
    fn default() -> Self {
        Self::new()
    }
}

fn wrap_yaw(yaw: f64) -> f64 {
    if yaw > TAU {
        yaw - TAU
    } else if yaw < -TAU {
        yaw + TAU
    } else {
        yaw
    }
}

/// Sample a random point in the unit disk.
fn random_in_unit_disk(rng: &mut dyn RngCore) -> (f64, f64) {
    loop {
        let x = rng.gen::<f64>() * 2.0 - 1.0;
        let z = rng.gen::<f64>() * 2.0 - 1.0;
        if x * x + z * z <= 1.0 {
            return (x, z);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn looking_along_z() -> Camera {
        Camera::new()
            .with_position(DVec3::new(0.0, 0.0, -5.0))
            .with_view(FRAC_PI_2, -FRAC_PI_2)
    }

    #[test]
    fn test_view_direction_faces_positive_z() {
        let camera = looking_along_z();
        let d = camera.view_direction();
        assert!((d - DVec3::Z).length() < 1e-12, "{:?}", d);
        assert!((camera.right() - DVec3::X).length() < 1e-12);
    }

    #[test]
    fn test_center_ray() {
        let camera = looking_along_z();
        let mut rng = StdRng::seed_from_u64(42);

        let ray = camera.calc_view_ray(0.0, 0.0, &mut rng);
        assert_eq!(ray.o, DVec3::new(0.0, 0.0, -5.0));
        assert!((ray.d - DVec3::Z).length() < 1e-12);
    }

    #[test]
    fn test_image_axes() {
        let camera = looking_along_z();
        let mut rng = StdRng::seed_from_u64(1);

        // top of image looks up, right of image looks +x
        let top = camera.calc_view_ray(0.0, -0.5, &mut rng);
        assert!(top.d.y > 0.0);
        let right = camera.calc_view_ray(0.5, 0.0, &mut rng);
        assert!(right.d.x > 0.0);

        // vertical fov: the top edge is fov/2 above the axis
        let angle = top.d.y.asin().to_degrees();
        assert!((angle - 35.0).abs() < 1e-9);
    }

    #[test]
    fn test_lens_rays_converge_at_focal_plane() {
        let camera = looking_along_z().with_lens(2.0, 10.0);
        let mut rng = StdRng::seed_from_u64(7);

        for _ in 0..16 {
            let ray = camera.calc_view_ray(0.0, 0.0, &mut rng);
            let t = (5.0 - ray.o.z) / ray.d.z;
            let p = ray.o + ray.d * t;
            assert!(p.x.abs() < 1e-9 && p.y.abs() < 1e-9, "{:?}", p);
        }
    }

    #[test]
    fn test_pitch_clamp_and_fov_clamp() {
        let mut camera = Camera::new();
        camera.rotate_view(0.0, 10.0);
        assert_eq!(camera.pitch(), 0.0);
        camera.rotate_view(0.0, -10.0);
        assert_eq!(camera.pitch(), -PI);
        camera.set_fov(500.0);
        assert_eq!(camera.fov(), MAX_FOV);
        camera.set_fov(0.0);
        assert_eq!(camera.fov(), MIN_FOV);
    }

    #[test]
    fn test_movement() {
        let mut camera = looking_along_z();
        camera.move_forward(2.0);
        assert!((camera.position() - DVec3::new(0.0, 0.0, -3.0)).length() < 1e-12);
        camera.strafe_left(1.0);
        assert!((camera.position().x + 1.0).abs() < 1e-12);
        camera.move_up(3.0);
        camera.move_down(1.0);
        assert!((camera.position().y - 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_description_roundtrip() {
        let camera = looking_along_z().with_fov(45.0).with_lens(4.0, 12.0);
        let restored = Camera::from_description(&camera.to_description());
        assert_eq!(restored, camera);
    }
}
