use std::f32::consts::PI;

use glam::{Vec2, Vec3};

use crate::mesh::MeshData;

/// UV sphere with the same vertex grid as three.js `SphereGeometry`.
///
/// The poles keep one vertex per column and the degenerate pole triangles
/// are skipped.
pub fn sphere(radius: f32, width_segments: u32, height_segments: u32) -> MeshData {
    let width_segments = width_segments.max(3);
    let height_segments = height_segments.max(2);
    let mut mesh = MeshData::default();
    let mut grid = Vec::with_capacity(height_segments as usize + 1);

    for iy in 0..=height_segments {
        let v = iy as f32 / height_segments as f32;
        let mut row = Vec::with_capacity(width_segments as usize + 1);
        for ix in 0..=width_segments {
            let u = ix as f32 / width_segments as f32;
            let phi = u * 2.0 * PI;
            let theta = v * PI;
            let position = Vec3::new(
                -radius * phi.cos() * theta.sin(),
                radius * theta.cos(),
                radius * phi.sin() * theta.sin(),
            );
            let normal = position.normalize_or_zero();
            row.push(mesh.push_vertex(position, normal, Vec2::new(u, v)));
        }
        grid.push(row);
    }

    for iy in 0..height_segments as usize {
        for ix in 0..width_segments as usize {
            let a = grid[iy][ix + 1];
            let b = grid[iy][ix];
            let c = grid[iy + 1][ix];
            let d = grid[iy + 1][ix + 1];
            if iy != 0 {
                mesh.push_triangle(a, b, d);
            }
            if iy != height_segments as usize - 1 {
                mesh.push_triangle(b, c, d);
            }
        }
    }
    mesh
}

/// Axis aligned box centred on the origin with per-face normals.
pub fn cuboid(width: f32, height: f32, depth: f32) -> MeshData {
    let half = Vec3::new(width, height, depth) * 0.5;
    // (normal, u axis, v axis) with u x v = normal so quads wind counter-clockwise.
    let faces = [
        (Vec3::X, Vec3::NEG_Z, Vec3::Y),
        (Vec3::NEG_X, Vec3::Z, Vec3::Y),
        (Vec3::Y, Vec3::X, Vec3::NEG_Z),
        (Vec3::NEG_Y, Vec3::X, Vec3::Z),
        (Vec3::Z, Vec3::X, Vec3::Y),
        (Vec3::NEG_Z, Vec3::NEG_X, Vec3::Y),
    ];

    let mut mesh = MeshData::default();
    for (normal, u_axis, v_axis) in faces {
        let center = normal * half;
        let u = u_axis * half;
        let v = v_axis * half;
        let corners = [
            (center - u - v, Vec2::new(0.0, 1.0)),
            (center + u - v, Vec2::new(1.0, 1.0)),
            (center + u + v, Vec2::new(1.0, 0.0)),
            (center - u + v, Vec2::new(0.0, 0.0)),
        ];
        let base = mesh.vertex_count() as u32;
        for (position, uv) in corners {
            mesh.push_vertex(position, normal, uv);
        }
        mesh.push_triangle(base, base + 1, base + 2);
        mesh.push_triangle(base, base + 2, base + 3);
    }
    mesh
}

/// Single quad in the XY plane facing +Z.
pub fn plane(width: f32, height: f32) -> MeshData {
    let (hw, hh) = (width * 0.5, height * 0.5);
    let mut mesh = MeshData::default();
    let top_left = mesh.push_vertex(Vec3::new(-hw, hh, 0.0), Vec3::Z, Vec2::new(0.0, 0.0));
    let top_right = mesh.push_vertex(Vec3::new(hw, hh, 0.0), Vec3::Z, Vec2::new(1.0, 0.0));
    let bottom_left = mesh.push_vertex(Vec3::new(-hw, -hh, 0.0), Vec3::Z, Vec2::new(0.0, 1.0));
    let bottom_right = mesh.push_vertex(Vec3::new(hw, -hh, 0.0), Vec3::Z, Vec2::new(1.0, 1.0));
    mesh.push_triangle(top_left, bottom_left, top_right);
    mesh.push_triangle(bottom_left, bottom_right, top_right);
    mesh
}
