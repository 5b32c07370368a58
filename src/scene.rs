use std::collections::HashSet;

use anyhow::{anyhow, bail, Context, Result};
use glam::Vec3;
use roxmltree::{Document, Node};
use serde::{Deserialize, Serialize};

/// Names of nodes the runtime adds on its own.
const RESERVED_NAMES: [&str; 2] = [crate::debug::HELPER_NAME, crate::assemble::WATER_NAME];

/// Runtime representation of a scene description.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Scene {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sky: Option<SkyDesc>,
    #[serde(default)]
    pub camera: CameraDesc,
    #[serde(default)]
    pub presets: Vec<CameraPreset>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ocean: Option<OceanSettings>,
    #[serde(default)]
    pub models: Vec<ModelDesc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub font: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub matcap: Option<String>,
    #[serde(default)]
    pub texts: Vec<TextDesc>,
    #[serde(default)]
    pub markers: Vec<MarkerDesc>,
    #[serde(default)]
    pub lights: Vec<LightDesc>,
}

impl Scene {
    /// Parses the scene XML shipped next to the assets.
    pub fn from_xml(xml: &str) -> Result<Self> {
        let document = Document::parse(xml).context("invalid scene XML")?;
        let root = document.root_element();
        if !root.has_tag_name("scene") {
            bail!("expected <scene> root element, found <{}>", root.tag_name().name());
        }

        let mut scene = Scene {
            name: optional_text(&root, "name").unwrap_or_else(|| "Untitled".to_string()),
            ..Scene::default()
        };

        for node in root.children().filter(Node::is_element) {
            match node.tag_name().name() {
                "sky" => scene.sky = Some(parse_sky(&node)?),
                "camera" => scene.camera = parse_camera(&node)?,
                "preset" => scene.presets.push(parse_preset(&node)?),
                "ocean" => scene.ocean = Some(parse_ocean(&node)?),
                "model" => scene.models.push(parse_model(&node)?),
                "font" => scene.font = element_text(&node),
                "matcap" => scene.matcap = element_text(&node),
                "text" => scene.texts.push(parse_text(&node)?),
                "marker" => scene.markers.push(parse_marker(&node)?),
                "light" => scene.lights.push(parse_light(&node)?),
                _ => {}
            }
        }

        scene.validate()?;
        Ok(scene)
    }

    /// Looks up a camera preset by name.
    pub fn preset(&self, name: &str) -> Option<&CameraPreset> {
        self.presets.iter().find(|preset| preset.name == name)
    }

    /// The preset the camera starts at.
    pub fn initial_preset(&self) -> CameraPreset {
        self.camera
            .preset
            .as_deref()
            .and_then(|name| self.preset(name))
            .or_else(|| self.presets.first())
            .cloned()
            .unwrap_or_default()
    }

    /// Every file referenced by the scene, in load order and without duplicates.
    pub fn asset_paths(&self) -> Vec<String> {
        let mut seen = HashSet::new();
        let mut paths = Vec::new();
        let mut push = |path: &str| {
            if seen.insert(path.to_string()) {
                paths.push(path.to_string());
            }
        };

        if let Some(matcap) = &self.matcap {
            push(matcap);
        }
        if let Some(ocean) = &self.ocean {
            push(&ocean.normals);
        }
        if let Some(sky) = &self.sky {
            for face in &sky.faces {
                push(face);
            }
        }
        for model in &self.models {
            push(&model.texture);
        }
        for model in &self.models {
            push(&model.mesh);
        }
        if let Some(font) = &self.font {
            push(font);
        }
        paths
    }

    fn validate(&self) -> Result<()> {
        let mut names = HashSet::new();
        let all_names = self
            .models
            .iter()
            .map(|m| m.name.as_str())
            .chain(self.texts.iter().map(|t| t.name.as_str()))
            .chain(self.markers.iter().map(|m| m.name.as_str()));
        for name in all_names {
            if RESERVED_NAMES.contains(&name) {
                bail!("object name '{name}' is reserved");
            }
            if !names.insert(name) {
                bail!("duplicate object name '{name}'");
            }
        }

        let mut preset_names = HashSet::new();
        for preset in &self.presets {
            if !preset_names.insert(preset.name.as_str()) {
                bail!("duplicate camera preset '{}'", preset.name);
            }
        }

        for marker in &self.markers {
            if let Some(preset) = &marker.preset {
                if !preset_names.contains(preset.as_str()) {
                    bail!(
                        "marker '{}' refers to unknown camera preset '{preset}'",
                        marker.name
                    );
                }
            }
        }
        if let Some(preset) = &self.camera.preset {
            if !preset_names.contains(preset.as_str()) {
                bail!("camera refers to unknown preset '{preset}'");
            }
        }
        Ok(())
    }
}

/// Six cube map faces in `px, nx, py, ny, pz, nz` order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkyDesc {
    pub faces: [String; 6],
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CameraDesc {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preset: Option<String>,
    #[serde(default = "default_near")]
    pub near: f32,
    #[serde(default = "default_far")]
    pub far: f32,
}

impl Default for CameraDesc {
    fn default() -> Self {
        Self {
            preset: None,
            near: default_near(),
            far: default_far(),
        }
    }
}

/// Named camera placement the camera can jump or fly to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CameraPreset {
    pub name: String,
    pub position: Vec3,
    #[serde(default)]
    pub target: Vec3,
    #[serde(default = "default_fov")]
    pub fov: f32,
    /// Fly-to duration in seconds.
    #[serde(default = "default_duration")]
    pub duration: f32,
}

impl Default for CameraPreset {
    fn default() -> Self {
        Self {
            name: "default".to_string(),
            position: Vec3::new(0.0, 2.0, 6.0),
            target: Vec3::ZERO,
            fov: default_fov(),
            duration: default_duration(),
        }
    }
}

/// One part of a baked model: a mesh file and the texture baked for it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelDesc {
    pub name: String,
    pub mesh: String,
    pub texture: String,
    #[serde(default = "default_scale")]
    pub scale: Vec3,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextDesc {
    pub name: String,
    pub content: String,
    #[serde(default = "default_text_size")]
    pub size: f32,
    #[serde(default = "default_text_depth")]
    pub depth: f32,
    #[serde(default)]
    pub position: Vec3,
    /// Euler angles in degrees.
    #[serde(default)]
    pub rotation: Vec3,
    #[serde(default = "default_scale")]
    pub scale: Vec3,
}

/// Clickable sphere that flies the camera to a preset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarkerDesc {
    pub name: String,
    pub position: Vec3,
    #[serde(default = "default_marker_radius")]
    pub radius: f32,
    #[serde(default = "default_marker_segments")]
    pub segments: u32,
    #[serde(default = "default_marker_color")]
    pub color: Vec3,
    #[serde(default = "default_marker_hover_color")]
    pub hover_color: Vec3,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preset: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OceanSettings {
    pub normals: String,
    #[serde(default = "default_ocean_color")]
    pub color: Vec3,
    #[serde(default = "default_white")]
    pub sun_color: Vec3,
    #[serde(default)]
    pub sun_direction: Vec3,
    #[serde(default = "default_distortion_scale")]
    pub distortion_scale: f32,
    #[serde(default = "default_time_modifier")]
    pub time_modifier: f32,
    #[serde(default = "default_ocean_size")]
    pub size: f32,
    #[serde(default = "default_texture_size")]
    pub texture_size: u32,
    #[serde(default = "default_alpha")]
    pub alpha: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LightKind {
    Ambient,
    Directional,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LightDesc {
    pub kind: LightKind,
    pub color: Vec3,
    pub intensity: f32,
    #[serde(default)]
    pub position: Vec3,
}

fn default_near() -> f32 {
    0.1
}

fn default_far() -> f32 {
    1000.0
}

fn default_fov() -> f32 {
    45.0
}

fn default_duration() -> f32 {
    2.0
}

fn default_scale() -> Vec3 {
    Vec3::ONE
}

fn default_text_size() -> f32 {
    0.5
}

fn default_text_depth() -> f32 {
    0.2
}

fn default_marker_radius() -> f32 {
    0.5
}

fn default_marker_segments() -> u32 {
    16
}

fn default_marker_color() -> Vec3 {
    Vec3::new(1.0, 0.0, 0.0)
}

fn default_marker_hover_color() -> Vec3 {
    Vec3::new(0.0, 0.0, 1.0)
}

fn default_ocean_color() -> Vec3 {
    Vec3::new(0.0, 30.0 / 255.0, 15.0 / 255.0)
}

fn default_white() -> Vec3 {
    Vec3::ONE
}

fn default_distortion_scale() -> f32 {
    2.5
}

fn default_time_modifier() -> f32 {
    320.0
}

fn default_ocean_size() -> f32 {
    10_000.0
}

fn default_texture_size() -> u32 {
    512
}

fn default_alpha() -> f32 {
    1.0
}

fn parse_sky(node: &Node<'_, '_>) -> Result<SkyDesc> {
    let faces: Vec<String> = node
        .children()
        .filter(|child| child.has_tag_name("face"))
        .filter_map(|child| element_text(&child))
        .collect();
    let count = faces.len();
    let faces: [String; 6] = faces
        .try_into()
        .map_err(|_| anyhow!("<sky> needs exactly 6 <face> entries, found {count}"))?;
    Ok(SkyDesc { faces })
}

fn parse_camera(node: &Node<'_, '_>) -> Result<CameraDesc> {
    Ok(CameraDesc {
        preset: node
            .attribute("preset")
            .map(str::to_string)
            .or_else(|| optional_text(node, "preset")),
        near: parse_f32(optional_text(node, "near"), default_near())?,
        far: parse_f32(optional_text(node, "far"), default_far())?,
    })
}

fn parse_preset(node: &Node<'_, '_>) -> Result<CameraPreset> {
    let name = required_text(node, "name")?;
    let position = required_text(node, "position")
        .and_then(|text| parse_vec3(Some(text), Vec3::ZERO))
        .with_context(|| format!("invalid position for preset '{name}'"))?;
    Ok(CameraPreset {
        position,
        target: parse_vec3(optional_text(node, "target"), Vec3::ZERO)?,
        fov: parse_f32(optional_text(node, "fov"), default_fov())?,
        duration: parse_f32(optional_text(node, "duration"), default_duration())?,
        name,
    })
}

fn parse_ocean(node: &Node<'_, '_>) -> Result<OceanSettings> {
    Ok(OceanSettings {
        normals: required_text(node, "normals").context("<ocean> is missing normals")?,
        color: parse_color(optional_text(node, "color"), default_ocean_color())?,
        sun_color: parse_color(optional_text(node, "sun-color"), default_white())?,
        sun_direction: parse_vec3(optional_text(node, "sun-direction"), Vec3::ZERO)?,
        distortion_scale: parse_f32(
            optional_text(node, "distortion-scale"),
            default_distortion_scale(),
        )?,
        time_modifier: parse_f32(optional_text(node, "time-modifier"), default_time_modifier())?,
        size: parse_f32(optional_text(node, "size"), default_ocean_size())?,
        texture_size: parse_u32(optional_text(node, "texture-size"), default_texture_size())?,
        alpha: parse_f32(optional_text(node, "alpha"), default_alpha())?,
    })
}

fn parse_model(node: &Node<'_, '_>) -> Result<ModelDesc> {
    let name = required_text(node, "name")?;
    Ok(ModelDesc {
        mesh: required_text(node, "mesh").with_context(|| format!("model '{name}'"))?,
        texture: required_text(node, "texture").with_context(|| format!("model '{name}'"))?,
        scale: parse_vec3(optional_text(node, "scale"), default_scale())?,
        name,
    })
}

fn parse_text(node: &Node<'_, '_>) -> Result<TextDesc> {
    let name = required_text(node, "name")?;
    // Text content keeps inner spacing, only the outer whitespace is trimmed.
    let content = required_text(node, "content").with_context(|| format!("text '{name}'"))?;
    Ok(TextDesc {
        content,
        size: parse_f32(optional_text(node, "size"), default_text_size())?,
        depth: parse_f32(optional_text(node, "depth"), default_text_depth())?,
        position: parse_vec3(optional_text(node, "position"), Vec3::ZERO)?,
        rotation: parse_vec3(optional_text(node, "rotation"), Vec3::ZERO)?,
        scale: parse_vec3(optional_text(node, "scale"), default_scale())?,
        name,
    })
}

fn parse_marker(node: &Node<'_, '_>) -> Result<MarkerDesc> {
    let name = required_text(node, "name")?;
    let position = required_text(node, "position")
        .and_then(|text| parse_vec3(Some(text), Vec3::ZERO))
        .with_context(|| format!("invalid position for marker '{name}'"))?;
    Ok(MarkerDesc {
        position,
        radius: parse_f32(optional_text(node, "radius"), default_marker_radius())?,
        segments: parse_u32(optional_text(node, "segments"), default_marker_segments())?.max(3),
        color: parse_color(optional_text(node, "color"), default_marker_color())?,
        hover_color: parse_color(
            optional_text(node, "hover-color"),
            default_marker_hover_color(),
        )?,
        preset: optional_text(node, "preset"),
        name,
    })
}

fn parse_light(node: &Node<'_, '_>) -> Result<LightDesc> {
    let kind = match required_text(node, "type")?.as_str() {
        "ambient" => LightKind::Ambient,
        "directional" => LightKind::Directional,
        other => bail!("unknown light type '{other}'"),
    };
    Ok(LightDesc {
        kind,
        color: parse_color(optional_text(node, "color"), default_white())?,
        intensity: parse_f32(optional_text(node, "intensity"), 1.0)?,
        position: parse_vec3(optional_text(node, "position"), Vec3::ZERO)?,
    })
}

fn required_text(node: &Node<'_, '_>, tag: &str) -> Result<String> {
    optional_text(node, tag).ok_or_else(|| anyhow!("<{tag}> tag is missing"))
}

fn optional_text(node: &Node<'_, '_>, tag: &str) -> Option<String> {
    node.children()
        .find(|child| child.has_tag_name(tag))
        .and_then(|child| element_text(&child))
}

fn element_text(node: &Node<'_, '_>) -> Option<String> {
    node.text()
        .map(str::trim)
        .filter(|text| !text.is_empty())
        .map(|text| text.to_string())
}

fn parse_vec3(value: Option<String>, default: Vec3) -> Result<Vec3> {
    let Some(value) = value else {
        return Ok(default);
    };
    let numbers = value
        .split_whitespace()
        .map(|component| {
            component
                .parse::<f32>()
                .map_err(|err| anyhow!("invalid vector component '{component}': {err}"))
        })
        .collect::<Result<Vec<_>>>()?;
    match numbers.as_slice() {
        [x, y, z] => Ok(Vec3::new(*x, *y, *z)),
        _ => Err(anyhow!(
            "vector needs 3 components, found {} in '{value}'",
            numbers.len()
        )),
    }
}

/// Accepts `#rrggbb`, `0xrrggbb` or `r g b` with 0-255 components.
fn parse_color(value: Option<String>, default: Vec3) -> Result<Vec3> {
    let Some(value) = value else {
        return Ok(default);
    };
    let hex = value
        .strip_prefix('#')
        .or_else(|| value.strip_prefix("0x"))
        .or_else(|| value.strip_prefix("0X"));
    if let Some(hex) = hex {
        if hex.len() != 6 {
            bail!("hex colour '{value}' must have 6 digits");
        }
        let rgb = u32::from_str_radix(hex, 16)
            .map_err(|err| anyhow!("invalid hex colour '{value}': {err}"))?;
        let r = ((rgb >> 16) & 0xff) as f32;
        let g = ((rgb >> 8) & 0xff) as f32;
        let b = (rgb & 0xff) as f32;
        return Ok(Vec3::new(r, g, b) / 255.0);
    }
    let rgb = parse_vec3(Some(value), default).context("invalid colour")?;
    Ok(rgb / 255.0)
}

fn parse_f32(value: Option<String>, default: f32) -> Result<f32> {
    match value {
        Some(value) => value
            .parse::<f32>()
            .map_err(|err| anyhow!("failed to parse float '{value}': {err}")),
        None => Ok(default),
    }
}

fn parse_u32(value: Option<String>, default: u32) -> Result<u32> {
    match value {
        Some(value) => value
            .parse::<u32>()
            .map_err(|err| anyhow!("failed to parse integer '{value}': {err}")),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
    <scene>
        <name>Harbor</name>
        <camera><preset>overview</preset></camera>
        <preset>
            <name>overview</name>
            <position>79.39 5.3 44.77</position>
            <target>0 2 0</target>
            <fov>8</fov>
        </preset>
        <preset>
            <name>city</name>
            <position>10.1 5.28 0.6</position>
            <target>9.2 1.8 38</target>
            <fov>40</fov>
            <duration>1.5</duration>
        </preset>
        <sky>
            <face>textures/Sky/px.png</face>
            <face>textures/Sky/nx.png</face>
            <face>textures/Sky/py.png</face>
            <face>textures/Sky/ny.png</face>
            <face>textures/Sky/pz.png</face>
            <face>textures/Sky/nz.png</face>
        </sky>
        <ocean>
            <normals>/textures/Misc/waternormals.jpg</normals>
            <color>0x001e0f</color>
            <time-modifier>320</time-modifier>
        </ocean>
        <model>
            <name>FortGorges</name>
            <mesh>/models/FortGorges/FortGorges.glb</mesh>
            <texture>/textures/FortGorges/FortGorges.png</texture>
            <scale>0.5 0.5 0.5</scale>
        </model>
        <font>fonts/helvetiker.ttf</font>
        <text>
            <name>Greeting</name>
            <content>Hi, I'm Henry</content>
            <position>-50 5.5 -30</position>
            <rotation>0 72 0</rotation>
            <scale>5 5 5</scale>
        </text>
        <marker>
            <name>Button1</name>
            <position>10.7 1.8 6.2</position>
            <preset>city</preset>
        </marker>
        <light>
            <type>ambient</type>
            <color>#ffffff</color>
            <intensity>0.8</intensity>
        </light>
    </scene>
    "#;

    #[test]
    fn parse_scene_populates_content() {
        let scene = Scene::from_xml(SAMPLE).unwrap();
        assert_eq!(scene.name, "Harbor");
        assert_eq!(scene.presets.len(), 2);
        assert_eq!(scene.models.len(), 1);
        assert_eq!(scene.models[0].scale, Vec3::splat(0.5));
        assert_eq!(scene.texts[0].content, "Hi, I'm Henry");
        assert_eq!(scene.texts[0].size, 0.5);
        assert_eq!(scene.markers[0].radius, 0.5);
        assert_eq!(scene.markers[0].color, Vec3::new(1.0, 0.0, 0.0));
        assert_eq!(scene.lights[0].kind, LightKind::Ambient);
        let ocean = scene.ocean.as_ref().unwrap();
        assert_eq!(ocean.color, Vec3::new(0.0, 30.0 / 255.0, 15.0 / 255.0));
        assert_eq!(ocean.texture_size, 512);
        assert_eq!(scene.sky.as_ref().unwrap().faces[3], "textures/Sky/ny.png");
    }

    #[test]
    fn initial_preset_follows_camera_element() {
        let scene = Scene::from_xml(SAMPLE).unwrap();
        let preset = scene.initial_preset();
        assert_eq!(preset.name, "overview");
        assert_eq!(preset.fov, 8.0);
        assert_eq!(scene.preset("city").unwrap().duration, 1.5);
    }

    #[test]
    fn initial_preset_defaults_without_presets() {
        let scene = Scene::from_xml("<scene/>").unwrap();
        let preset = scene.initial_preset();
        assert_eq!(preset.position, Vec3::new(0.0, 2.0, 6.0));
        assert_eq!(preset.fov, 45.0);
    }

    #[test]
    fn asset_paths_are_unique_and_complete() {
        let scene = Scene::from_xml(SAMPLE).unwrap();
        let paths = scene.asset_paths();
        assert_eq!(paths.len(), 10);
        assert!(paths.contains(&"/models/FortGorges/FortGorges.glb".to_string()));
        assert!(paths.contains(&"fonts/helvetiker.ttf".to_string()));
        assert_eq!(paths.last().unwrap(), "fonts/helvetiker.ttf");
    }

    #[test]
    fn marker_with_unknown_preset_is_an_error() {
        let bad = r#"<scene>
            <marker><name>M</name><position>0 0 0</position><preset>nowhere</preset></marker>
        </scene>"#;
        let err = Scene::from_xml(bad).unwrap_err();
        assert!(format!("{err:#}").contains("nowhere"));
    }

    #[test]
    fn duplicate_names_are_an_error() {
        let bad = r#"<scene>
            <marker><name>Same</name><position>0 0 0</position></marker>
            <text><name>Same</name><content>x</content></text>
        </scene>"#;
        assert!(Scene::from_xml(bad).is_err());
    }

    #[test]
    fn runtime_node_names_are_reserved() {
        for name in ["Helper", "Water"] {
            let bad = format!(
                "<scene><marker><name>{name}</name><position>10.7 1.8 6.2</position></marker></scene>"
            );
            let err = Scene::from_xml(&bad).unwrap_err();
            assert!(format!("{err:#}").contains("reserved"));
        }
    }

    #[test]
    fn camera_attribute_names_the_initial_preset() {
        let xml = SAMPLE.replace(
            "<camera><preset>overview</preset></camera>",
            r#"<camera preset="city"/>"#,
        );
        let scene = Scene::from_xml(&xml).unwrap();
        assert_eq!(scene.initial_preset().name, "city");
    }

    #[test]
    fn missing_model_texture_is_an_error() {
        let bad = "<scene><model><name>M</name><mesh>m.glb</mesh></model></scene>";
        assert!(Scene::from_xml(bad).is_err());
    }

    #[test]
    fn sky_requires_six_faces() {
        let bad = "<scene><sky><face>a.png</face></sky></scene>";
        assert!(Scene::from_xml(bad).is_err());
    }

    #[test]
    fn colours_accept_hex_and_components() {
        assert_eq!(
            parse_color(Some("#ff8000".into()), Vec3::ZERO).unwrap(),
            Vec3::new(1.0, 128.0 / 255.0, 0.0)
        );
        assert_eq!(
            parse_color(Some("255 128 0".into()), Vec3::ZERO).unwrap(),
            Vec3::new(1.0, 128.0 / 255.0, 0.0)
        );
        assert!(parse_color(Some("#fff".into()), Vec3::ZERO).is_err());
    }

    #[test]
    fn vectors_need_three_components() {
        assert!(parse_vec3(Some("1 2".into()), Vec3::ZERO).is_err());
        assert!(parse_vec3(Some("1 2 x".into()), Vec3::ZERO).is_err());
    }
}
