use glam::{Vec2, Vec3};

use crate::camera::PerspectiveCamera;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Ray {
    pub origin: Vec3,
    /// Unit length.
    pub direction: Vec3,
}

impl Ray {
    pub fn new(origin: Vec3, direction: Vec3) -> Self {
        Self {
            origin,
            direction: direction.normalize_or_zero(),
        }
    }

    /// Ray from the camera through a point in normalized device coordinates.
    pub fn from_camera(ndc: Vec2, camera: &PerspectiveCamera) -> Self {
        let inverse = camera.view_projection().inverse();
        let far = inverse.project_point3(ndc.extend(1.0));
        Self::new(camera.position, far - camera.position)
    }

    pub fn at(&self, distance: f32) -> Vec3 {
        self.origin + self.direction * distance
    }

    /// Distance to the nearest hit in front of the origin.
    pub fn intersect_sphere(&self, center: Vec3, radius: f32) -> Option<f32> {
        let to_center = center - self.origin;
        let along = to_center.dot(self.direction);
        let closest_sq = to_center.length_squared() - along * along;
        let radius_sq = radius * radius;
        if closest_sq > radius_sq {
            return None;
        }
        let half_chord = (radius_sq - closest_sq).sqrt();
        let near = along - half_chord;
        let far = along + half_chord;
        if far < 0.0 {
            None
        } else if near < 0.0 {
            // Origin is inside the sphere.
            Some(far)
        } else {
            Some(near)
        }
    }
}

/// Sphere shaped pick volume.
#[derive(Debug, Clone, PartialEq)]
pub struct PickTarget {
    pub name: String,
    pub center: Vec3,
    pub radius: f32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Intersection {
    pub name: String,
    pub distance: f32,
    pub point: Vec3,
}

#[derive(Debug, Default, Clone, Copy)]
pub struct Raycaster;

impl Raycaster {
    /// All targets hit by `ray`, nearest first.
    pub fn intersect(&self, ray: &Ray, targets: &[PickTarget]) -> Vec<Intersection> {
        let mut hits: Vec<Intersection> = targets
            .iter()
            .filter_map(|target| {
                ray.intersect_sphere(target.center, target.radius)
                    .map(|distance| Intersection {
                        name: target.name.clone(),
                        distance,
                        point: ray.at(distance),
                    })
            })
            .collect();
        hits.sort_by(|a, b| a.distance.total_cmp(&b.distance));
        hits
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HoverEvent {
    Enter(String),
    Leave(String),
}

/// Remembers the nearest hit under the pointer between frames.
#[derive(Debug, Default, Clone)]
pub struct HoverTracker {
    current: Option<Intersection>,
}

impl HoverTracker {
    pub fn update(&mut self, intersections: &[Intersection]) -> Option<HoverEvent> {
        match intersections.first() {
            Some(nearest) => {
                let event = if self.current.is_none() {
                    log::info!("mouse enter");
                    Some(HoverEvent::Enter(nearest.name.clone()))
                } else {
                    None
                };
                self.current = Some(nearest.clone());
                event
            }
            None => {
                let left = self.current.take()?;
                log::info!("mouse leave");
                Some(HoverEvent::Leave(left.name))
            }
        }
    }

    pub fn current(&self) -> Option<&Intersection> {
        self.current.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::Viewport;

    fn target(name: &str, center: Vec3) -> PickTarget {
        PickTarget {
            name: name.to_string(),
            center,
            radius: 0.5,
        }
    }

    #[test]
    fn sphere_hits_and_misses() {
        let ray = Ray::new(Vec3::ZERO, Vec3::NEG_Z);
        assert_eq!(ray.intersect_sphere(Vec3::new(0.0, 0.0, -5.0), 0.5), Some(4.5));
        assert_eq!(ray.intersect_sphere(Vec3::new(2.0, 0.0, -5.0), 0.5), None);
        assert_eq!(ray.intersect_sphere(Vec3::new(0.0, 0.0, 5.0), 0.5), None);
        assert_eq!(ray.intersect_sphere(Vec3::ZERO, 1.0), Some(1.0));
    }

    #[test]
    fn intersections_are_sorted_by_distance() {
        let ray = Ray::new(Vec3::ZERO, Vec3::NEG_Z);
        let hits = Raycaster.intersect(
            &ray,
            &[
                target("Far", Vec3::new(0.0, 0.0, -20.0)),
                target("Near", Vec3::new(0.0, 0.0, -3.0)),
                target("Aside", Vec3::new(5.0, 0.0, -3.0)),
            ],
        );
        let names: Vec<_> = hits.iter().map(|hit| hit.name.as_str()).collect();
        assert_eq!(names, ["Near", "Far"]);
        assert!((hits[0].point - Vec3::new(0.0, 0.0, -2.5)).length() < 1e-5);
    }

    #[test]
    fn camera_ray_through_screen_centre_follows_view_direction() {
        let mut camera = PerspectiveCamera::default();
        camera.aspect = Viewport::new(800, 600).aspect();
        camera.position = Vec3::new(10.0, 5.0, 10.0);
        camera.look_at(Vec3::new(10.7, 1.8, 6.2));
        let ray = Ray::from_camera(Vec2::ZERO, &camera);
        assert!((ray.direction - camera.forward()).length() < 1e-3);
        assert!(ray.intersect_sphere(Vec3::new(10.7, 1.8, 6.2), 0.5).is_some());
    }

    #[test]
    fn hover_reports_enter_and_leave_once() {
        let mut tracker = HoverTracker::default();
        let hit = Intersection {
            name: "Button1".into(),
            distance: 3.0,
            point: Vec3::ZERO,
        };
        assert_eq!(
            tracker.update(&[hit.clone()]),
            Some(HoverEvent::Enter("Button1".into()))
        );
        assert_eq!(tracker.update(&[hit]), None);
        assert_eq!(tracker.current().unwrap().name, "Button1");
        assert_eq!(
            tracker.update(&[]),
            Some(HoverEvent::Leave("Button1".into()))
        );
        assert_eq!(tracker.update(&[]), None);
        assert!(tracker.current().is_none());
    }
}
