use glam::{Vec3, Vec4};

use crate::camera::PerspectiveCamera;
use crate::data_model::{MeshId, SceneNode, TextureId};
use crate::mesh::MeshData;
use crate::scene::{LightDesc, LightKind};
use crate::texture::{CubeImages, TextureImage};
use crate::water::WaterState;

/// Converts an sRGB-encoded colour to linear light.
pub fn srgb_to_linear(color: Vec3) -> Vec3 {
    let channel = |c: f32| {
        if c <= 0.04045 {
            c / 12.92
        } else {
            ((c + 0.055) / 1.055).powf(2.4)
        }
    };
    Vec3::new(channel(color.x), channel(color.y), channel(color.z))
}

/// Lighting state consumed by the renderer's uniform buffer. Colours are
/// linear and premultiplied by intensity.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Lighting {
    pub ambient: Vec3,
    /// Unit vector pointing towards the light.
    pub direction: Vec3,
    pub directional: Vec3,
}

impl Default for Lighting {
    fn default() -> Self {
        Self {
            ambient: Vec3::splat(0.8),
            direction: Vec3::splat(5.0).normalize(),
            directional: Vec3::splat(0.6),
        }
    }
}

impl Lighting {
    /// Sums ambient lights; the first directional light wins. Falls back to
    /// the default rig when the scene declares no lights.
    pub fn from_lights(lights: &[LightDesc]) -> Self {
        if lights.is_empty() {
            return Self::default();
        }
        let mut lighting = Self {
            ambient: Vec3::ZERO,
            direction: Vec3::Y,
            directional: Vec3::ZERO,
        };
        let mut has_directional = false;
        for light in lights {
            let color = srgb_to_linear(light.color) * light.intensity;
            match light.kind {
                LightKind::Ambient => lighting.ambient += color,
                LightKind::Directional if !has_directional => {
                    has_directional = true;
                    lighting.directional = color;
                    let direction = light.position.normalize_or_zero();
                    if direction != Vec3::ZERO {
                        lighting.direction = direction;
                    }
                }
                LightKind::Directional => {}
            }
        }
        lighting
    }
}

/// Water parameters for one frame, colours already linear.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct WaterFrame {
    pub time: f32,
    pub color: Vec3,
    pub sun_color: Vec3,
    pub sun_direction: Vec3,
    pub distortion_scale: f32,
    pub alpha: f32,
}

impl WaterFrame {
    pub fn from_state(state: &WaterState) -> Self {
        Self {
            time: state.time,
            color: srgb_to_linear(state.settings.color),
            sun_color: srgb_to_linear(state.settings.sun_color),
            sun_direction: state.sun_direction(),
            distortion_scale: state.settings.distortion_scale,
            alpha: state.settings.alpha,
        }
    }
}

/// Everything the renderer needs to draw one frame.
#[derive(Clone, Debug)]
pub struct Frame {
    pub camera: PerspectiveCamera,
    pub nodes: Vec<SceneNode>,
    pub lighting: Lighting,
    pub water: Option<WaterFrame>,
    pub clear_color: Vec4,
}

impl Frame {
    /// A frame that only clears the screen.
    pub fn empty(camera: PerspectiveCamera) -> Self {
        Self {
            camera,
            nodes: Vec::new(),
            lighting: Lighting::default(),
            water: None,
            clear_color: Vec4::new(0.0, 0.0, 0.0, 1.0),
        }
    }

    /// Visible nodes in draw order: opaque geometry first, water last.
    pub fn draw_order(&self) -> impl Iterator<Item = &SceneNode> {
        let opaque = self
            .nodes
            .iter()
            .filter(|node| node.visible && !node.is_water());
        let water = self
            .nodes
            .iter()
            .filter(|node| node.visible && node.is_water());
        opaque.chain(water)
    }
}

/// Destination for decoded assets, implemented by the GPU renderer and by
/// the headless summary.
pub trait ResourceSink {
    fn upload_mesh(&mut self, mesh: &MeshData, label: &str) -> MeshId;
    fn upload_texture(&mut self, image: &TextureImage, label: &str) -> TextureId;
    fn set_skybox(&mut self, faces: &CubeImages);
    fn set_water_normals(&mut self, image: &TextureImage);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data_model::{Material, NodeKind};

    #[test]
    fn srgb_conversion_matches_reference_points() {
        assert_eq!(srgb_to_linear(Vec3::ZERO), Vec3::ZERO);
        assert!((srgb_to_linear(Vec3::ONE) - Vec3::ONE).length() < 1e-6);
        let mid = srgb_to_linear(Vec3::splat(0.5));
        assert!((mid.x - 0.214_041).abs() < 1e-4);
    }

    #[test]
    fn lights_combine_into_one_rig() {
        let lights = [
            LightDesc {
                kind: LightKind::Ambient,
                color: Vec3::ONE,
                intensity: 0.8,
                position: Vec3::ZERO,
            },
            LightDesc {
                kind: LightKind::Directional,
                color: Vec3::ONE,
                intensity: 0.6,
                position: Vec3::new(5.0, 5.0, 5.0),
            },
        ];
        let default = Lighting::default();
        let lighting = Lighting::from_lights(&lights);
        assert!(lighting.ambient.abs_diff_eq(default.ambient, 1e-5));
        assert!(lighting.directional.abs_diff_eq(default.directional, 1e-5));
        assert!(lighting.direction.abs_diff_eq(default.direction, 1e-6));
        assert!(lighting.direction.is_normalized());
        assert_eq!(Lighting::from_lights(&[]), default);
    }

    #[test]
    fn water_is_drawn_last() {
        let mut frame = Frame::empty(PerspectiveCamera::default());
        frame.nodes = vec![
            SceneNode {
                name: "Water".into(),
                kind: NodeKind::Water,
                material: Material::Water,
                ..SceneNode::default()
            },
            SceneNode {
                name: "Hidden".into(),
                visible: false,
                ..SceneNode::default()
            },
            SceneNode {
                name: "Pier".into(),
                ..SceneNode::default()
            },
        ];
        let names: Vec<_> = frame.draw_order().map(|node| node.name.as_str()).collect();
        assert_eq!(names, ["Pier", "Water"]);
    }
}
