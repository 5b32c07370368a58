use std::collections::HashMap;

use glam::Vec3;

use crate::data_model::{DataModel, Material, MeshId, NodeKind, SceneNode, TextureId};
use crate::geometry::{cuboid, plane, sphere};
use crate::loading::LoadedScene;
use crate::mesh::MeshData;
use crate::render::{srgb_to_linear, Lighting, ResourceSink};
use crate::texture::{CubeImages, TextureImage};
use crate::water::WaterState;

pub const WATER_NAME: &str = "Water";

/// Result of placing a loaded scene into the data model.
#[derive(Debug, Clone)]
pub struct AssembledScene {
    pub model: DataModel,
    pub lighting: Lighting,
    pub water: Option<WaterState>,
    /// Unit box used by the placeable helper.
    pub helper_mesh: MeshId,
    pub has_sky: bool,
    /// Names of scene objects left out because an asset failed.
    pub skipped: Vec<String>,
}

/// Uploads every loaded asset through `sink` and builds the scene nodes.
pub fn assemble(loaded: &LoadedScene, sink: &mut dyn ResourceSink) -> AssembledScene {
    let scene = &loaded.scene;
    let model = DataModel::new();
    let mut skipped = Vec::new();
    let mut meshes: HashMap<String, MeshId> = HashMap::new();
    let mut textures: HashMap<String, TextureId> = HashMap::new();

    let mut texture_id = |sink: &mut dyn ResourceSink, url: &str| -> Option<TextureId> {
        if let Some(id) = textures.get(url) {
            return Some(*id);
        }
        let image = loaded.texture(url)?;
        let id = sink.upload_texture(image, url);
        textures.insert(url.to_string(), id);
        Some(id)
    };

    for desc in &scene.models {
        let mesh = match meshes.get(&desc.mesh) {
            Some(id) => *id,
            None => {
                let Some(data) = loaded.mesh(&desc.mesh) else {
                    log::warn!("skipping model {}: {} did not load", desc.name, desc.mesh);
                    skipped.push(desc.name.clone());
                    continue;
                };
                let id = sink.upload_mesh(data, &desc.mesh);
                meshes.insert(desc.mesh.clone(), id);
                id
            }
        };
        let material = match texture_id(sink, &desc.texture) {
            Some(id) => Material::Baked(id),
            None => Material::Basic,
        };
        model.add(SceneNode {
            name: desc.name.clone(),
            kind: NodeKind::Model,
            mesh,
            material,
            scale: desc.scale,
            ..SceneNode::default()
        });
    }

    let font = scene.font.as_deref().and_then(|url| loaded.font(url));
    let text_material = scene
        .matcap
        .as_deref()
        .and_then(|url| texture_id(sink, url))
        .map(Material::Matcap)
        .unwrap_or(Material::Lit {
            metalness: 0.0,
            roughness: 1.0,
        });
    for desc in &scene.texts {
        let Some(builder) = font else {
            log::warn!("skipping text {}: no font", desc.name);
            skipped.push(desc.name.clone());
            continue;
        };
        let mesh = builder.build(&desc.content, desc.size, desc.depth);
        let mesh = sink.upload_mesh(&mesh, &desc.name);
        model.add(SceneNode {
            name: desc.name.clone(),
            kind: NodeKind::Text,
            mesh,
            material: text_material,
            position: desc.position,
            rotation: desc.rotation,
            scale: desc.scale,
            ..SceneNode::default()
        });
    }

    for desc in &scene.markers {
        let mesh = sphere(desc.radius, desc.segments, desc.segments);
        let mesh = sink.upload_mesh(&mesh, &desc.name);
        model.add(SceneNode {
            name: desc.name.clone(),
            kind: NodeKind::Marker,
            mesh,
            material: Material::Basic,
            position: desc.position,
            color: srgb_to_linear(desc.color),
            ..SceneNode::default()
        });
    }

    let water = scene.ocean.as_ref().map(|ocean| {
        let normals = loaded
            .texture(&ocean.normals)
            .cloned()
            .unwrap_or_else(TextureImage::flat_normal_map);
        sink.set_water_normals(&normals);
        let mesh = sink.upload_mesh(&plane(ocean.size, ocean.size), WATER_NAME);
        model.add(SceneNode {
            name: WATER_NAME.to_string(),
            kind: NodeKind::Water,
            mesh,
            material: Material::Water,
            rotation: Vec3::new(-90.0, 0.0, 0.0),
            ..SceneNode::default()
        });
        WaterState::new(ocean.clone())
    });

    let sky = scene
        .sky
        .as_ref()
        .and_then(|sky| loaded.cube_map(&sky.faces[0]));
    if let Some(faces) = sky {
        sink.set_skybox(faces);
    }

    let helper_mesh = sink.upload_mesh(&cuboid(1.0, 1.0, 1.0), "helper");

    AssembledScene {
        model,
        lighting: Lighting::from_lights(&scene.lights),
        water,
        helper_mesh,
        has_sky: sky.is_some(),
        skipped,
    }
}

/// Counts uploads instead of talking to a GPU.
#[derive(Debug, Default, Clone)]
pub struct ResourceCounter {
    pub meshes: usize,
    pub textures: usize,
    pub vertices: usize,
    pub triangles: usize,
    pub skybox: Option<u32>,
    pub water_normals: Option<(u32, u32)>,
}

impl ResourceSink for ResourceCounter {
    fn upload_mesh(&mut self, mesh: &MeshData, _label: &str) -> MeshId {
        self.meshes += 1;
        self.vertices += mesh.vertex_count();
        self.triangles += mesh.triangle_count();
        MeshId(self.meshes - 1)
    }

    fn upload_texture(&mut self, _image: &TextureImage, _label: &str) -> TextureId {
        self.textures += 1;
        TextureId(self.textures - 1)
    }

    fn set_skybox(&mut self, faces: &CubeImages) {
        self.skybox = Some(faces.size);
    }

    fn set_water_normals(&mut self, image: &TextureImage) {
        self.water_normals = Some((image.width, image.height));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loading::LoadedAsset;
    use crate::scene::Scene;

    const SCENE: &str = r#"<scene>
        <font>/fonts/helvetiker.ttf</font>
        <matcap>/textures/matcaps/1.png</matcap>
        <preset><name>city</name><position>10 5 0</position></preset>
        <ocean><normals>/textures/Misc/waternormals.jpg</normals><size>100</size></ocean>
        <model><name>Pier</name><mesh>/models/pier.glb</mesh><texture>/textures/pier.jpg</texture><scale>0.5 0.5 0.5</scale></model>
        <model><name>Deco</name><mesh>/models/pier.glb</mesh><texture>/textures/pier.jpg</texture></model>
        <model><name>Fort</name><mesh>/models/fort.glb</mesh><texture>/textures/fort.jpg</texture></model>
        <text><name>Greeting</name><content>Hi</content></text>
        <marker><name>Button1</name><position>10.7 1.8 6.2</position><color>#ff0000</color><preset>city</preset></marker>
    </scene>"#;

    fn triangle() -> MeshData {
        let mut mesh = MeshData::default();
        let a = mesh.push_vertex(Vec3::ZERO, Vec3::Z, glam::Vec2::ZERO);
        let b = mesh.push_vertex(Vec3::X, Vec3::Z, glam::Vec2::X);
        let c = mesh.push_vertex(Vec3::Y, Vec3::Z, glam::Vec2::Y);
        mesh.push_triangle(a, b, c);
        mesh
    }

    fn loaded() -> LoadedScene {
        let mut assets = HashMap::new();
        assets.insert("/models/pier.glb".to_string(), LoadedAsset::Mesh(triangle()));
        assets.insert(
            "/textures/pier.jpg".to_string(),
            LoadedAsset::Texture(TextureImage::solid([10, 20, 30, 255])),
        );
        assets.insert(
            "/textures/matcaps/1.png".to_string(),
            LoadedAsset::Texture(TextureImage::solid([200, 200, 200, 255])),
        );
        LoadedScene {
            scene: Scene::from_xml(SCENE).unwrap(),
            assets,
            failed: vec![
                "/models/fort.glb".to_string(),
                "/fonts/helvetiker.ttf".to_string(),
                "/textures/Misc/waternormals.jpg".to_string(),
            ],
        }
    }

    #[test]
    fn failed_assets_degrade_instead_of_aborting() {
        let mut counter = ResourceCounter::default();
        let assembled = assemble(&loaded(), &mut counter);

        assert_eq!(assembled.skipped, vec!["Fort".to_string(), "Greeting".to_string()]);
        assert!(!assembled.has_sky);
        assert_eq!(counter.water_normals, Some((1, 1)));
        assert!(assembled.water.is_some());
        let names: Vec<_> = assembled
            .model
            .all_nodes()
            .into_iter()
            .map(|node| node.name)
            .collect();
        assert_eq!(names, ["Pier", "Deco", "Button1", WATER_NAME]);
    }

    #[test]
    fn shared_files_are_uploaded_once() {
        let mut counter = ResourceCounter::default();
        let assembled = assemble(&loaded(), &mut counter);
        // pier mesh, marker sphere, water plane, helper box
        assert_eq!(counter.meshes, 4);
        // pier texture and matcap
        assert_eq!(counter.textures, 2);
        let pier = assembled.model.get("Pier").unwrap();
        let deco = assembled.model.get("Deco").unwrap();
        assert_eq!(pier.mesh, deco.mesh);
        assert_eq!(pier.material, deco.material);
        assert_eq!(pier.scale, Vec3::splat(0.5));
    }

    #[test]
    fn markers_and_water_are_placed() {
        let mut counter = ResourceCounter::default();
        let assembled = assemble(&loaded(), &mut counter);
        let marker = assembled.model.get("Button1").unwrap();
        assert_eq!(marker.kind, NodeKind::Marker);
        assert_eq!(marker.color, Vec3::new(1.0, 0.0, 0.0));
        assert_eq!(marker.position, Vec3::new(10.7, 1.8, 6.2));

        let water = assembled.model.get(WATER_NAME).unwrap();
        assert!(water.is_water());
        let normal = water.model_matrix().transform_vector3(Vec3::Z);
        assert!((normal - Vec3::Y).length() < 1e-5);
    }
}
