use glam::{Quat, Vec3};

use crate::camera::{look_rotation, PerspectiveCamera};
use crate::scene::CameraPreset;
use crate::tween::{Easing, Tween, TweenStatus};

/// Animated move of the camera onto a preset.
///
/// Four tweens share the preset's duration and are applied in a fixed
/// nesting order: orientation, field of view, position, then the orbit
/// target. They start on the same tick so they move together.
#[derive(Debug, Clone)]
pub struct CameraFlight {
    preset: CameraPreset,
    orientation: Tween<Quat>,
    fov: Tween<f32>,
    position: Tween<Vec3>,
    target: Tween<Vec3>,
}

impl CameraFlight {
    /// Starts a flight from the camera's current state.
    pub fn new(
        camera: &PerspectiveCamera,
        controls_target: Vec3,
        fov: f32,
        preset: &CameraPreset,
        easing: Easing,
    ) -> Self {
        let duration = preset.duration.max(0.0);
        let end_orientation = look_rotation(preset.position, preset.target);
        let mut flight = Self {
            preset: preset.clone(),
            orientation: Tween::new(camera.orientation, end_orientation, duration)
                .with_easing(easing),
            fov: Tween::new(fov, preset.fov, duration).with_easing(easing),
            position: Tween::new(camera.position, preset.position, duration).with_easing(easing),
            target: Tween::new(controls_target, preset.target, duration).with_easing(easing),
        };
        flight.start();
        flight
    }

    fn start(&mut self) {
        self.orientation.start();
        self.fov.start();
        self.position.start();
        self.target.start();
    }

    pub fn preset(&self) -> &CameraPreset {
        &self.preset
    }

    /// Advances the flight and writes the interpolated state out.
    pub fn update(
        &mut self,
        dt: f32,
        camera: &mut PerspectiveCamera,
        fov: &mut f32,
        target: &mut Vec3,
    ) -> TweenStatus {
        let status = self.orientation.update(dt);
        camera.orientation = self.orientation.value();

        self.fov.update(dt);
        *fov = self.fov.value();

        self.position.update(dt);
        camera.position = self.position.value();

        self.target.update(dt);
        *target = self.target.value();

        if self.is_finished() {
            // Land exactly on the preset.
            camera.apply_preset(&self.preset);
            *fov = self.preset.fov;
            *target = self.preset.target;
            return TweenStatus::Finished;
        }
        camera.fov = *fov;
        status
    }

    pub fn is_finished(&self) -> bool {
        self.orientation.is_finished()
            && self.fov.is_finished()
            && self.position.is_finished()
            && self.target.is_finished()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn city() -> CameraPreset {
        CameraPreset {
            name: "city".into(),
            position: Vec3::new(10.09952891398274, 5.283287750839582, 0.6046661058867199),
            target: Vec3::new(9.2, 1.8, 38.0),
            fov: 40.0,
            duration: 2.0,
        }
    }

    fn overview_camera() -> PerspectiveCamera {
        let mut camera = PerspectiveCamera::default();
        camera.position = Vec3::new(79.39, 5.31, 44.77);
        camera.look_at(Vec3::new(0.0, 2.0, 0.0));
        camera.fov = 8.0;
        camera
    }

    #[test]
    fn all_parameters_move_together() {
        let mut camera = overview_camera();
        let mut fov = camera.fov;
        let mut target = Vec3::new(0.0, 2.0, 0.0);
        let mut flight = CameraFlight::new(&camera, target, fov, &city(), Easing::Linear);

        let status = flight.update(1.0, &mut camera, &mut fov, &mut target);
        assert_eq!(status, TweenStatus::Running);
        assert!((fov - 24.0).abs() < 1e-4);
        assert!((target - Vec3::new(4.6, 1.9, 19.0)).length() < 1e-4);
        let midway = Vec3::new(79.39, 5.31, 44.77).lerp(city().position, 0.5);
        assert!((camera.position - midway).length() < 1e-3);
        assert_eq!(camera.fov, fov);
    }

    #[test]
    fn lands_exactly_on_the_preset() {
        let mut camera = overview_camera();
        let mut fov = camera.fov;
        let mut target = Vec3::new(0.0, 2.0, 0.0);
        let preset = city();
        let mut flight = CameraFlight::new(&camera, target, fov, &preset, Easing::QuadraticInOut);

        for _ in 0..3 {
            flight.update(0.7, &mut camera, &mut fov, &mut target);
        }
        assert!(flight.is_finished());
        assert_eq!(camera.position, preset.position);
        assert_eq!(fov, 40.0);
        assert_eq!(camera.fov, 40.0);
        assert_eq!(target, preset.target);
        let expected = (preset.target - preset.position).normalize();
        assert!((camera.forward() - expected).length() < 1e-5);
    }

    #[test]
    fn restarting_begins_at_the_current_state() {
        let mut camera = overview_camera();
        let mut fov = camera.fov;
        let mut target = Vec3::new(0.0, 2.0, 0.0);
        let mut flight = CameraFlight::new(&camera, target, fov, &city(), Easing::Linear);
        flight.update(0.5, &mut camera, &mut fov, &mut target);
        let halted = camera.position;

        let mut overview = city();
        overview.position = Vec3::new(79.39, 5.31, 44.77);
        overview.target = Vec3::new(0.0, 2.0, 0.0);
        overview.fov = 8.0;
        let mut second = CameraFlight::new(&camera, target, fov, &overview, Easing::Linear);
        second.update(0.0, &mut camera, &mut fov, &mut target);
        assert!((camera.position - halted).length() < 1e-5);
    }

    #[test]
    fn zero_duration_jumps() {
        let mut camera = overview_camera();
        let mut fov = camera.fov;
        let mut target = Vec3::ZERO;
        let mut preset = city();
        preset.duration = 0.0;
        let mut flight = CameraFlight::new(&camera, target, fov, &preset, Easing::Linear);
        assert_eq!(
            flight.update(0.016, &mut camera, &mut fov, &mut target),
            TweenStatus::Finished
        );
        assert_eq!(camera.position, preset.position);
    }
}
