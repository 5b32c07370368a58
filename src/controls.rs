use std::f32::consts::PI;

use glam::{Vec2, Vec3};

use crate::camera::PerspectiveCamera;
use crate::input::InputFrame;

const EPS: f32 = 1e-6;

/// Orbit camera around a target point with inertia.
///
/// Left drag orbits, right or middle drag pans in screen space and the wheel
/// dollies towards the target. Input accumulates into deltas that `update`
/// bleeds off by `damping_factor` every frame.
#[derive(Debug, Clone)]
pub struct OrbitControls {
    pub target: Vec3,
    pub enabled: bool,
    pub damping_factor: f32,
    pub rotate_speed: f32,
    pub pan_speed: f32,
    /// Per-notch dolly factor is `0.95 ^ zoom_speed`.
    pub zoom_speed: f32,
    pub min_distance: f32,
    pub max_distance: f32,
    theta_delta: f32,
    phi_delta: f32,
    pan_offset: Vec3,
    scale: f32,
}

impl Default for OrbitControls {
    fn default() -> Self {
        Self::new(Vec3::new(0.0, 2.0, 0.0))
    }
}

impl OrbitControls {
    pub fn new(target: Vec3) -> Self {
        Self {
            target,
            enabled: true,
            damping_factor: 0.05,
            rotate_speed: 1.0,
            pan_speed: 1.0,
            zoom_speed: 1.0,
            min_distance: 0.0,
            max_distance: f32::INFINITY,
            theta_delta: 0.0,
            phi_delta: 0.0,
            pan_offset: Vec3::ZERO,
            scale: 1.0,
        }
    }

    /// Converts a frame of pointer input into pending rotation, pan and dolly.
    pub fn handle_input(&mut self, frame: &InputFrame, camera: &PerspectiveCamera, height: f32) {
        if !self.enabled {
            return;
        }
        if frame.rotate != Vec2::ZERO {
            self.rotate(frame.rotate, height);
        }
        if frame.pan != Vec2::ZERO {
            self.pan(frame.pan, camera, height);
        }
        if frame.wheel != 0.0 {
            self.dolly(frame.wheel);
        }
    }

    /// Orbits by a pointer delta in pixels; a drag across the full viewport
    /// height is one full turn.
    pub fn rotate(&mut self, delta: Vec2, height: f32) {
        let delta = delta * self.rotate_speed;
        let height = height.max(1.0);
        self.theta_delta -= 2.0 * PI * delta.x / height;
        self.phi_delta -= 2.0 * PI * delta.y / height;
    }

    /// Pans by a pointer delta in pixels so the point under the cursor at the
    /// target's depth follows the cursor.
    pub fn pan(&mut self, delta: Vec2, camera: &PerspectiveCamera, height: f32) {
        let delta = delta * self.pan_speed;
        let height = height.max(1.0);
        let distance = (camera.position - self.target).length() * (camera.fov.to_radians() * 0.5).tan();
        self.pan_offset -= camera.right() * (2.0 * delta.x * distance / height);
        self.pan_offset += camera.up() * (2.0 * delta.y * distance / height);
    }

    /// Positive steps move towards the target.
    pub fn dolly(&mut self, steps: f32) {
        self.scale *= 0.95f32.powf(self.zoom_speed * steps);
    }

    /// Applies one frame of the pending motion to `camera`.
    ///
    /// Returns `true` when the camera moved.
    pub fn update(&mut self, camera: &mut PerspectiveCamera) -> bool {
        if !self.enabled {
            return false;
        }
        let before = (camera.position, camera.orientation);

        let offset = camera.position - self.target;
        let mut radius = offset.length();
        let mut theta = offset.x.atan2(offset.z);
        let mut phi = if radius > 0.0 {
            (offset.y / radius).clamp(-1.0, 1.0).acos()
        } else {
            0.0
        };

        theta += self.theta_delta * self.damping_factor;
        phi += self.phi_delta * self.damping_factor;
        phi = phi.clamp(EPS, PI - EPS);

        radius = (radius * self.scale).clamp(self.min_distance, self.max_distance);
        self.target += self.pan_offset * self.damping_factor;

        let sin_phi_radius = phi.sin() * radius;
        let offset = Vec3::new(
            sin_phi_radius * theta.sin(),
            phi.cos() * radius,
            sin_phi_radius * theta.cos(),
        );
        camera.position = self.target + offset;
        camera.look_at(self.target);

        let keep = 1.0 - self.damping_factor;
        self.theta_delta *= keep;
        self.phi_delta *= keep;
        self.pan_offset *= keep;
        self.scale = 1.0;

        let (position, orientation) = before;
        (camera.position - position).length_squared() > EPS
            || 8.0 * (1.0 - orientation.dot(camera.orientation)) > EPS
    }

    /// Re-targets after the camera was moved externally and drops any inertia.
    pub fn sync_from_camera(&mut self, target: Vec3) {
        self.target = target;
        self.theta_delta = 0.0;
        self.phi_delta = 0.0;
        self.pan_offset = Vec3::ZERO;
        self.scale = 1.0;
    }

    pub fn is_settled(&self) -> bool {
        self.theta_delta.abs() < EPS && self.phi_delta.abs() < EPS && self.pan_offset.length() < EPS
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn camera_at(position: Vec3, target: Vec3) -> PerspectiveCamera {
        let mut camera = PerspectiveCamera::default();
        camera.position = position;
        camera.look_at(target);
        camera
    }

    #[test]
    fn idle_update_keeps_camera_in_place() {
        let mut controls = OrbitControls::default();
        let mut camera = camera_at(Vec3::new(10.0, 5.0, 10.0), controls.target);
        let before = camera.position;
        controls.update(&mut camera);
        assert!((camera.position - before).length() < 1e-4);
    }

    #[test]
    fn damping_spreads_rotation_over_frames() {
        let mut controls = OrbitControls::new(Vec3::ZERO);
        let mut camera = camera_at(Vec3::new(0.0, 0.0, 10.0), Vec3::ZERO);
        controls.rotate(Vec2::new(-100.0, 0.0), 1000.0);
        let total = 2.0 * PI * 0.1;

        assert!(controls.update(&mut camera));
        let theta = camera.position.x.atan2(camera.position.z);
        assert!((theta - total * 0.05).abs() < 1e-4);
        assert!((controls.theta_delta - total * 0.95).abs() < 1e-5);
        // Radius is preserved while orbiting.
        assert!((camera.position.length() - 10.0).abs() < 1e-3);
    }

    #[test]
    fn polar_angle_never_flips_over_the_pole() {
        let mut controls = OrbitControls::new(Vec3::ZERO);
        controls.damping_factor = 1.0;
        let mut camera = camera_at(Vec3::new(0.0, 0.0, 10.0), Vec3::ZERO);
        controls.rotate(Vec2::new(0.0, 5000.0), 100.0);
        controls.update(&mut camera);
        assert!(camera.position.y > 9.99);
        assert!(camera.position.z >= 0.0);
    }

    #[test]
    fn wheel_dollies_towards_target() {
        let mut controls = OrbitControls::new(Vec3::ZERO);
        let mut camera = camera_at(Vec3::new(0.0, 0.0, 10.0), Vec3::ZERO);
        controls.dolly(1.0);
        controls.update(&mut camera);
        assert!((camera.position.length() - 9.5).abs() < 1e-4);
        controls.dolly(-1.0);
        controls.update(&mut camera);
        assert!((camera.position.length() - 10.0).abs() < 1e-3);
    }

    #[test]
    fn pan_moves_target_and_camera_together() {
        let mut controls = OrbitControls::new(Vec3::ZERO);
        controls.damping_factor = 1.0;
        let mut camera = camera_at(Vec3::new(0.0, 0.0, 10.0), Vec3::ZERO);
        controls.pan(Vec2::new(10.0, 0.0), &camera, 100.0);
        controls.update(&mut camera);
        // Dragging right moves the scene right, so the target slides left.
        assert!(controls.target.x < 0.0);
        assert!((camera.position.x - controls.target.x).abs() < 1e-4);
    }

    #[test]
    fn disabled_controls_ignore_input() {
        let mut controls = OrbitControls::new(Vec3::ZERO);
        controls.enabled = false;
        let mut camera = camera_at(Vec3::new(0.0, 0.0, 10.0), Vec3::ZERO);
        let frame = InputFrame {
            rotate: Vec2::new(50.0, 0.0),
            wheel: 3.0,
            ..InputFrame::default()
        };
        controls.handle_input(&frame, &camera, 600.0);
        assert!(!controls.update(&mut camera));
        assert_eq!(camera.position, Vec3::new(0.0, 0.0, 10.0));
        assert!(controls.is_settled());
    }

    #[test]
    fn sync_drops_inertia() {
        let mut controls = OrbitControls::default();
        controls.rotate(Vec2::new(10.0, 10.0), 100.0);
        controls.sync_from_camera(Vec3::new(9.2, 1.8, 38.0));
        assert!(controls.is_settled());
        assert_eq!(controls.target, Vec3::new(9.2, 1.8, 38.0));
    }
}
