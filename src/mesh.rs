use glam::{Mat3, Mat4, Vec2, Vec3};
use serde::{Deserialize, Serialize};

/// Floats per interleaved vertex: position.xyz, normal.xyz, uv.xy.
pub const VERTEX_STRIDE: usize = 8;

/// GPU ready mesh buffers.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct MeshData {
    pub vertices: Vec<f32>,
    pub indices: Vec<u32>,
}

impl MeshData {
    pub fn vertex_count(&self) -> usize {
        self.vertices.len() / VERTEX_STRIDE
    }

    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    /// Appends a vertex and returns its index.
    pub fn push_vertex(&mut self, position: Vec3, normal: Vec3, uv: Vec2) -> u32 {
        let index = self.vertex_count() as u32;
        self.vertices.extend_from_slice(&[
            position.x, position.y, position.z, normal.x, normal.y, normal.z, uv.x, uv.y,
        ]);
        index
    }

    pub fn push_triangle(&mut self, a: u32, b: u32, c: u32) {
        self.indices.extend_from_slice(&[a, b, c]);
    }

    pub fn position(&self, index: usize) -> Vec3 {
        Vec3::from_slice(&self.vertices[index * VERTEX_STRIDE..index * VERTEX_STRIDE + 3])
    }

    pub fn normal(&self, index: usize) -> Vec3 {
        Vec3::from_slice(&self.vertices[index * VERTEX_STRIDE + 3..index * VERTEX_STRIDE + 6])
    }

    /// Axis aligned bounds, or `None` for a mesh without vertices.
    pub fn bounds(&self) -> Option<(Vec3, Vec3)> {
        (0..self.vertex_count()).map(|i| self.position(i)).fold(None, |acc, p| {
            Some(match acc {
                None => (p, p),
                Some((min, max)) => (min.min(p), max.max(p)),
            })
        })
    }

    pub fn translate(&mut self, offset: Vec3) {
        for chunk in self.vertices.chunks_exact_mut(VERTEX_STRIDE) {
            chunk[0] += offset.x;
            chunk[1] += offset.y;
            chunk[2] += offset.z;
        }
    }

    /// Moves the mesh so its bounding box is centred on the origin.
    pub fn center(&mut self) {
        if let Some((min, max)) = self.bounds() {
            self.translate(-(min + max) * 0.5);
        }
    }

    /// Bakes a transform into positions and normals.
    pub fn transform(&mut self, matrix: Mat4) {
        let normal_matrix = Mat3::from_mat4(matrix).inverse().transpose();
        for chunk in self.vertices.chunks_exact_mut(VERTEX_STRIDE) {
            let p = matrix.transform_point3(Vec3::new(chunk[0], chunk[1], chunk[2]));
            let n = (normal_matrix * Vec3::new(chunk[3], chunk[4], chunk[5])).normalize_or_zero();
            chunk[..6].copy_from_slice(&[p.x, p.y, p.z, n.x, n.y, n.z]);
        }
    }

    /// Appends another mesh, offsetting its indices.
    pub fn append(&mut self, other: &MeshData) {
        let base = self.vertex_count() as u32;
        self.vertices.extend_from_slice(&other.vertices);
        self.indices
            .extend(other.indices.iter().map(|index| index + base));
    }

    pub fn needs_normals(&self) -> bool {
        self.vertices
            .chunks_exact(VERTEX_STRIDE)
            .any(|chunk| chunk[3] == 0.0 && chunk[4] == 0.0 && chunk[5] == 0.0)
    }

    /// Replaces normals with area weighted face normals.
    pub fn compute_normals(&mut self) {
        let vertex_count = self.vertex_count();
        let mut accum = vec![Vec3::ZERO; vertex_count];

        for triangle in self.indices.chunks_exact(3) {
            let [i0, i1, i2] = [triangle[0] as usize, triangle[1] as usize, triangle[2] as usize];
            let p0 = self.position(i0);
            let normal = (self.position(i1) - p0).cross(self.position(i2) - p0);
            if normal.length_squared() > f32::EPSILON * f32::EPSILON {
                accum[i0] += normal;
                accum[i1] += normal;
                accum[i2] += normal;
            }
        }

        for (i, normal) in accum.into_iter().enumerate() {
            let normal = normal.normalize_or_zero();
            self.vertices[i * VERTEX_STRIDE + 3] = normal.x;
            self.vertices[i * VERTEX_STRIDE + 4] = normal.y;
            self.vertices[i * VERTEX_STRIDE + 5] = normal.z;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn triangle() -> MeshData {
        let mut mesh = MeshData::default();
        let a = mesh.push_vertex(Vec3::ZERO, Vec3::ZERO, Vec2::ZERO);
        let b = mesh.push_vertex(Vec3::X, Vec3::ZERO, Vec2::X);
        let c = mesh.push_vertex(Vec3::Y, Vec3::ZERO, Vec2::Y);
        mesh.push_triangle(a, b, c);
        mesh
    }

    #[test]
    fn compute_normals_faces_counter_clockwise_side() {
        let mut mesh = triangle();
        assert!(mesh.needs_normals());
        mesh.compute_normals();
        for i in 0..3 {
            assert!((mesh.normal(i) - Vec3::Z).length() < 1e-6);
        }
    }

    #[test]
    fn center_moves_bounds_to_origin() {
        let mut mesh = triangle();
        mesh.translate(Vec3::new(10.0, 4.0, 2.0));
        mesh.center();
        let (min, max) = mesh.bounds().unwrap();
        assert!((min + max).length() < 1e-6);
    }

    #[test]
    fn transform_scales_positions_and_keeps_unit_normals() {
        let mut mesh = triangle();
        mesh.compute_normals();
        mesh.transform(Mat4::from_scale(Vec3::new(2.0, 2.0, 0.5)));
        assert_eq!(mesh.position(1), Vec3::new(2.0, 0.0, 0.0));
        assert!((mesh.normal(0).length() - 1.0).abs() < 1e-6);
    }

    #[test]
    fn append_offsets_indices() {
        let mut mesh = triangle();
        mesh.append(&triangle());
        assert_eq!(mesh.indices, vec![0, 1, 2, 3, 4, 5]);
        assert_eq!(mesh.vertex_count(), 6);
    }

    #[test]
    fn empty_mesh_has_no_bounds() {
        assert!(MeshData::default().bounds().is_none());
    }
}
