use std::sync::Arc;

use glam::{EulerRot, Mat4, Quat, Vec3};
use parking_lot::RwLock;

/// Handle to a mesh uploaded to the renderer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct MeshId(pub usize);

/// Handle to a 2D texture uploaded to the renderer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct TextureId(pub usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NodeKind {
    #[default]
    Model,
    Text,
    Marker,
    Helper,
    Water,
}

/// How a node is shaded.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum Material {
    /// Baked lighting sampled straight from a texture.
    Baked(TextureId),
    /// Flat, unlit node colour.
    #[default]
    Basic,
    /// Node colour lit by the scene lights.
    Lit { metalness: f32, roughness: f32 },
    /// View-space normal lookup into a matcap texture.
    Matcap(TextureId),
    /// Ocean surface shading.
    Water,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SceneNode {
    pub name: String,
    pub kind: NodeKind,
    pub mesh: MeshId,
    pub material: Material,
    pub position: Vec3,
    /// Euler angles in degrees.
    pub rotation: Vec3,
    pub scale: Vec3,
    /// Linear RGB.
    pub color: Vec3,
    pub visible: bool,
}

impl Default for SceneNode {
    fn default() -> Self {
        Self {
            name: String::new(),
            kind: NodeKind::default(),
            mesh: MeshId::default(),
            material: Material::default(),
            position: Vec3::ZERO,
            rotation: Vec3::ZERO,
            scale: Vec3::ONE,
            color: Vec3::ONE,
            visible: true,
        }
    }
}

impl SceneNode {
    /// Intrinsic XYZ order, matching three.js `Euler` defaults.
    pub fn rotation_quat(&self) -> Quat {
        let radians = self.rotation * std::f32::consts::PI / 180.0;
        Quat::from_euler(EulerRot::XYZ, radians.x, radians.y, radians.z)
    }

    /// Translation, then rotation, then scale.
    pub fn model_matrix(&self) -> Mat4 {
        Mat4::from_scale_rotation_translation(self.scale, self.rotation_quat(), self.position)
    }

    pub fn is_water(&self) -> bool {
        matches!(self.material, Material::Water)
    }
}

/// Thread-safe container mirroring the mutable state of the scene graph.
#[derive(Debug, Default)]
pub struct DataModel {
    nodes: Arc<RwLock<Vec<SceneNode>>>,
}

impl Clone for DataModel {
    fn clone(&self) -> Self {
        Self {
            nodes: Arc::clone(&self.nodes),
        }
    }
}

impl DataModel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_nodes(nodes: Vec<SceneNode>) -> Self {
        Self {
            nodes: Arc::new(RwLock::new(nodes)),
        }
    }

    pub fn add(&self, node: SceneNode) {
        self.nodes.write().push(node);
    }

    pub fn len(&self) -> usize {
        self.nodes.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.read().is_empty()
    }

    /// Returns a snapshot of all stored nodes.
    pub fn all_nodes(&self) -> Vec<SceneNode> {
        self.nodes.read().clone()
    }

    pub fn nodes_of_kind(&self, kind: NodeKind) -> Vec<SceneNode> {
        self.nodes
            .read()
            .iter()
            .filter(|node| node.kind == kind)
            .cloned()
            .collect()
    }

    pub fn contains_kind(&self, kind: NodeKind) -> bool {
        self.nodes.read().iter().any(|node| node.kind == kind)
    }

    /// Applies a mutation to every node of `kind`, returning how many matched.
    pub fn update_kind<F>(&self, kind: NodeKind, mut updater: F) -> usize
    where
        F: FnMut(&mut SceneNode),
    {
        let mut guard = self.nodes.write();
        let mut count = 0;
        for node in guard.iter_mut().filter(|node| node.kind == kind) {
            updater(node);
            count += 1;
        }
        count
    }

    pub fn contains(&self, name: &str) -> bool {
        self.nodes.read().iter().any(|node| node.name == name)
    }

    /// Returns a clone of the requested node.
    pub fn get(&self, name: &str) -> Option<SceneNode> {
        self.nodes
            .read()
            .iter()
            .find(|node| node.name == name)
            .cloned()
    }

    /// Applies a mutation to the requested node.
    pub fn update<F, R>(&self, name: &str, mut updater: F) -> Option<R>
    where
        F: FnMut(&mut SceneNode) -> R,
    {
        let mut guard = self.nodes.write();
        let node = guard.iter_mut().find(|node| node.name == name)?;
        Some(updater(node))
    }

    pub fn set_position(&self, name: &str, position: Vec3) -> bool {
        self.update(name, |node| node.position = position).is_some()
    }

    pub fn set_color(&self, name: &str, color: Vec3) -> bool {
        self.update(name, |node| node.color = color).is_some()
    }

    pub fn set_visible(&self, name: &str, visible: bool) -> bool {
        self.update(name, |node| node.visible = visible).is_some()
    }
}
