use anyhow::{anyhow, bail, Context, Result};
use glam::{Mat4, Vec2, Vec3};
use gltf::mesh::Mode;

use crate::mesh::MeshData;
use crate::obj::load_obj_from_str;

const DRACO_EXTENSION: &str = "KHR_draco_mesh_compression";

/// Decodes a mesh file, picking the format from the path extension.
pub fn load_mesh(path: &str, bytes: &[u8]) -> Result<MeshData> {
    let extension = path
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .unwrap_or_default();
    match extension.as_str() {
        "glb" | "gltf" => load_gltf(bytes),
        "obj" => {
            let text = std::str::from_utf8(bytes).context("OBJ file is not valid UTF-8")?;
            load_obj_from_str(text)
        }
        other => bail!("unsupported mesh format '.{other}'"),
    }
}

/// Flattens every triangle primitive of the default scene into one mesh.
///
/// Node transforms are baked into the vertices. Buffers must be embedded
/// (GLB binary chunk or data URIs).
pub fn load_gltf(bytes: &[u8]) -> Result<MeshData> {
    // Checked on the raw JSON since the parser rejects unknown required extensions.
    if contains(json_chunk(bytes), DRACO_EXTENSION.as_bytes()) {
        bail!("Draco compressed meshes are not supported ({DRACO_EXTENSION})");
    }
    let gltf = gltf::Gltf::from_slice(bytes).context("invalid glTF document")?;

    let document = &gltf.document;
    let buffers = gltf::import_buffers(document, None, gltf.blob.clone())
        .context("failed to resolve glTF buffers")?;

    let scene = document
        .default_scene()
        .or_else(|| document.scenes().next())
        .ok_or_else(|| anyhow!("glTF file has no scenes"))?;

    let mut mesh = MeshData::default();
    for node in scene.nodes() {
        visit_node(&node, Mat4::IDENTITY, &buffers, &mut mesh)?;
    }
    if mesh.is_empty() {
        bail!("glTF file contains no triangle geometry");
    }
    if mesh.needs_normals() {
        mesh.compute_normals();
    }
    Ok(mesh)
}

/// The JSON part of a GLB container, or the whole input for `.gltf` text.
fn json_chunk(bytes: &[u8]) -> &[u8] {
    if bytes.len() >= 20 && bytes.starts_with(b"glTF") {
        let len = u32::from_le_bytes([bytes[12], bytes[13], bytes[14], bytes[15]]) as usize;
        20usize
            .checked_add(len)
            .and_then(|end| bytes.get(20..end))
            .unwrap_or(&bytes[20..])
    } else {
        bytes
    }
}

fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    haystack.windows(needle.len()).any(|window| window == needle)
}

fn visit_node(
    node: &gltf::Node<'_>,
    parent: Mat4,
    buffers: &[gltf::buffer::Data],
    out: &mut MeshData,
) -> Result<()> {
    let world = parent * Mat4::from_cols_array_2d(&node.transform().matrix());

    if let Some(mesh) = node.mesh() {
        for primitive in mesh.primitives() {
            if primitive.mode() != Mode::Triangles {
                log::debug!(
                    "skipping {:?} primitive in mesh {:?}",
                    primitive.mode(),
                    mesh.name()
                );
                continue;
            }
            let mut part = read_primitive(&primitive, buffers)?;
            part.transform(world);
            out.append(&part);
        }
    }

    for child in node.children() {
        visit_node(&child, world, buffers, out)?;
    }
    Ok(())
}

fn read_primitive(
    primitive: &gltf::Primitive<'_>,
    buffers: &[gltf::buffer::Data],
) -> Result<MeshData> {
    let reader = primitive.reader(|buffer| buffers.get(buffer.index()).map(|data| &data[..]));

    let positions: Vec<Vec3> = reader
        .read_positions()
        .ok_or_else(|| anyhow!("primitive has no POSITION attribute"))?
        .map(Vec3::from)
        .collect();
    let normals: Vec<Vec3> = reader
        .read_normals()
        .map(|iter| iter.map(Vec3::from).collect())
        .unwrap_or_else(|| vec![Vec3::ZERO; positions.len()]);
    let uvs: Vec<Vec2> = reader
        .read_tex_coords(0)
        .map(|iter| iter.into_f32().map(Vec2::from).collect())
        .unwrap_or_else(|| vec![Vec2::ZERO; positions.len()]);
    let indices: Vec<u32> = reader
        .read_indices()
        .map(|iter| iter.into_u32().collect())
        .unwrap_or_else(|| (0..positions.len() as u32).collect());

    let mut mesh = MeshData::default();
    for (i, position) in positions.iter().enumerate() {
        mesh.push_vertex(
            *position,
            normals.get(i).copied().unwrap_or(Vec3::ZERO),
            uvs.get(i).copied().unwrap_or(Vec2::ZERO),
        );
    }
    if let Some(bad) = indices.iter().find(|&&index| index as usize >= positions.len()) {
        bail!("index {bad} out of range for {} vertices", positions.len());
    }
    mesh.indices = indices;
    Ok(mesh)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Builds a GLB holding one triangle under a translated node.
    fn triangle_glb(extra_json: &str) -> Vec<u8> {
        let mut bin = Vec::new();
        for value in [0.0f32, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0, 0.0] {
            bin.extend_from_slice(&value.to_le_bytes());
        }
        for index in [0u16, 1, 2] {
            bin.extend_from_slice(&index.to_le_bytes());
        }
        while bin.len() % 4 != 0 {
            bin.push(0);
        }

        let json = format!(
            r#"{{"asset":{{"version":"2.0"}},{extra_json}"scene":0,"scenes":[{{"nodes":[0]}}],
            "nodes":[{{"mesh":0,"translation":[5,0,0]}}],
            "meshes":[{{"primitives":[{{"attributes":{{"POSITION":0}},"indices":1}}]}}],
            "buffers":[{{"byteLength":{len}}}],
            "bufferViews":[{{"buffer":0,"byteOffset":0,"byteLength":36}},{{"buffer":0,"byteOffset":36,"byteLength":6}}],
            "accessors":[
              {{"bufferView":0,"componentType":5126,"count":3,"type":"VEC3","min":[0,0,0],"max":[1,1,0]}},
              {{"bufferView":1,"componentType":5123,"count":3,"type":"SCALAR"}}]}}"#,
            len = bin.len()
        );
        let mut json = json.into_bytes();
        while json.len() % 4 != 0 {
            json.push(b' ');
        }

        let total = 12 + 8 + json.len() + 8 + bin.len();
        let mut glb = Vec::new();
        glb.extend_from_slice(b"glTF");
        glb.extend_from_slice(&2u32.to_le_bytes());
        glb.extend_from_slice(&(total as u32).to_le_bytes());
        glb.extend_from_slice(&(json.len() as u32).to_le_bytes());
        glb.extend_from_slice(b"JSON");
        glb.extend_from_slice(&json);
        glb.extend_from_slice(&(bin.len() as u32).to_le_bytes());
        glb.extend_from_slice(b"BIN\0");
        glb.extend_from_slice(&bin);
        glb
    }

    #[test]
    fn loads_glb_and_bakes_node_transform() {
        let mesh = load_gltf(&triangle_glb("")).unwrap();
        assert_eq!(mesh.triangle_count(), 1);
        assert_eq!(mesh.position(0), Vec3::new(5.0, 0.0, 0.0));
        assert_eq!(mesh.position(1), Vec3::new(6.0, 0.0, 0.0));
        assert!((mesh.normal(0) - Vec3::Z).length() < 1e-5);
    }

    #[test]
    fn rejects_draco_compressed_files() {
        let glb = triangle_glb(r#""extensionsUsed":["KHR_draco_mesh_compression"],"#);
        let err = load_gltf(&glb).unwrap_err();
        assert!(format!("{err:#}").contains("Draco"));
    }

    #[test]
    fn dispatches_on_extension() {
        let obj = b"v 0 0 0\nv 1 0 0\nv 0 1 0\nf 1 2 3\n";
        assert_eq!(load_mesh("models/a.OBJ", obj).unwrap().triangle_count(), 1);
        assert!(load_mesh("models/a.fbx", obj).is_err());
        assert_eq!(
            load_mesh("/models/a.glb", &triangle_glb("")).unwrap().vertex_count(),
            3
        );
    }

    #[test]
    fn oversized_glb_chunk_length_falls_back_to_the_rest() {
        let mut header = b"glTF".to_vec();
        header.extend_from_slice(&2u32.to_le_bytes());
        header.extend_from_slice(&24u32.to_le_bytes());
        header.extend_from_slice(&u32::MAX.to_le_bytes());
        header.extend_from_slice(b"JSON{}");
        assert_eq!(json_chunk(&header), b"JSON{}");
        assert!(load_gltf(&header).is_err());
    }

    #[test]
    fn garbage_is_an_error() {
        assert!(load_gltf(b"not a gltf").is_err());
    }
}
