use anyhow::{anyhow, Result};
use fontdue::{Font, FontSettings};
use glam::{Vec2, Vec3};

use crate::mesh::MeshData;

/// Pixels per em used when rasterising glyphs for extrusion.
const RASTER_PX: f32 = 64.0;
/// Coverage at or above this value counts as solid.
const COVERAGE_THRESHOLD: u8 = 128;

/// Builds text meshes from one font.
pub struct TextMeshBuilder {
    font: Font,
    raster_px: f32,
}

impl TextMeshBuilder {
    pub fn new(font_bytes: &[u8]) -> Result<Self> {
        let font = Font::from_bytes(font_bytes, FontSettings::default())
            .map_err(|err| anyhow!("failed to parse font: {err}"))?;
        Ok(Self {
            font,
            raster_px: RASTER_PX,
        })
    }

    /// Rasterises `content`, extrudes it to `depth` and centres the result.
    /// One em of the font spans `size` world units.
    pub fn build(&self, content: &str, size: f32, depth: f32) -> MeshData {
        let grid = self.layout(content);
        let mut mesh = extrude(&grid, size / self.raster_px, depth);
        mesh.center();
        mesh
    }

    fn layout(&self, content: &str) -> CoverageGrid {
        let line_height = self
            .font
            .horizontal_line_metrics(self.raster_px)
            .map(|metrics| metrics.new_line_size)
            .unwrap_or(self.raster_px * 1.2);

        let mut glyphs = Vec::new();
        for (line_index, line) in content.lines().enumerate() {
            let baseline = -(line_index as f32 * line_height).round() as i32;
            let mut pen = 0.0f32;
            let mut previous = None;
            for ch in line.chars() {
                if let Some(left) = previous {
                    pen += self
                        .font
                        .horizontal_kern(left, ch, self.raster_px)
                        .unwrap_or(0.0);
                }
                let (metrics, coverage) = self.font.rasterize(ch, self.raster_px);
                if metrics.width > 0 && metrics.height > 0 {
                    glyphs.push(PlacedGlyph {
                        x: (pen + metrics.xmin as f32).round() as i32,
                        y: baseline + metrics.ymin,
                        width: metrics.width,
                        height: metrics.height,
                        coverage,
                    });
                }
                pen += metrics.advance_width;
                previous = Some(ch);
            }
        }
        CoverageGrid::compose(&glyphs)
    }
}

/// One glyph bitmap positioned in pixel space. `x`/`y` locate the bottom-left
/// corner with y pointing up; `coverage` rows run top to bottom.
#[derive(Debug, Clone)]
pub struct PlacedGlyph {
    pub x: i32,
    pub y: i32,
    pub width: usize,
    pub height: usize,
    pub coverage: Vec<u8>,
}

/// Solid/empty cells with row 0 at the bottom.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CoverageGrid {
    pub width: usize,
    pub height: usize,
    cells: Vec<bool>,
}

impl CoverageGrid {
    pub fn new(width: usize, height: usize) -> Self {
        Self {
            width,
            height,
            cells: vec![false; width * height],
        }
    }

    /// Builds a grid from rows of `#` (solid) and anything else (empty),
    /// listed top to bottom.
    pub fn from_rows(rows: &[&str]) -> Self {
        let width = rows.iter().map(|row| row.len()).max().unwrap_or(0);
        let mut grid = Self::new(width, rows.len());
        for (i, row) in rows.iter().enumerate() {
            let y = rows.len() - 1 - i;
            for (x, ch) in row.chars().enumerate() {
                grid.set(x, y, ch == '#');
            }
        }
        grid
    }

    /// Merges glyph bitmaps into one grid covering all of them.
    pub fn compose(glyphs: &[PlacedGlyph]) -> Self {
        let Some(min_x) = glyphs.iter().map(|g| g.x).min() else {
            return Self::default();
        };
        let min_y = glyphs.iter().map(|g| g.y).min().unwrap_or(0);
        let max_x = glyphs.iter().map(|g| g.x + g.width as i32).max().unwrap_or(0);
        let max_y = glyphs.iter().map(|g| g.y + g.height as i32).max().unwrap_or(0);

        let mut grid = Self::new((max_x - min_x) as usize, (max_y - min_y) as usize);
        for glyph in glyphs {
            for row in 0..glyph.height {
                for col in 0..glyph.width {
                    if glyph.coverage[row * glyph.width + col] >= COVERAGE_THRESHOLD {
                        let x = (glyph.x - min_x) as usize + col;
                        let y = (glyph.y - min_y) as usize + (glyph.height - 1 - row);
                        grid.set(x, y, true);
                    }
                }
            }
        }
        grid
    }

    pub fn set(&mut self, x: usize, y: usize, solid: bool) {
        if x < self.width && y < self.height {
            self.cells[y * self.width + x] = solid;
        }
    }

    /// Cells outside the grid are empty.
    pub fn get(&self, x: i64, y: i64) -> bool {
        if x < 0 || y < 0 || x as usize >= self.width || y as usize >= self.height {
            return false;
        }
        self.cells[y as usize * self.width + x as usize]
    }

    pub fn filled(&self) -> usize {
        self.cells.iter().filter(|cell| **cell).count()
    }
}

/// Extrudes solid cells from z = 0 to z = `depth`, each cell `unit` wide.
///
/// Front and back caps merge horizontal runs. Side walls are emitted on every
/// edge between a solid and an empty cell.
pub fn extrude(grid: &CoverageGrid, unit: f32, depth: f32) -> MeshData {
    let mut mesh = MeshData::default();

    for y in 0..grid.height as i64 {
        let mut x = 0i64;
        while x < grid.width as i64 {
            if !grid.get(x, y) {
                x += 1;
                continue;
            }
            let start = x;
            while grid.get(x, y) {
                x += 1;
            }
            let (x0, x1) = (start as f32 * unit, x as f32 * unit);
            let (y0, y1) = (y as f32 * unit, (y + 1) as f32 * unit);
            push_quad(
                &mut mesh,
                [
                    Vec3::new(x0, y0, depth),
                    Vec3::new(x1, y0, depth),
                    Vec3::new(x1, y1, depth),
                    Vec3::new(x0, y1, depth),
                ],
                Vec3::Z,
            );
            push_quad(
                &mut mesh,
                [
                    Vec3::new(x0, y0, 0.0),
                    Vec3::new(x1, y0, 0.0),
                    Vec3::new(x1, y1, 0.0),
                    Vec3::new(x0, y1, 0.0),
                ],
                Vec3::NEG_Z,
            );
        }
    }

    for y in 0..grid.height as i64 {
        for x in 0..grid.width as i64 {
            if !grid.get(x, y) {
                continue;
            }
            let (x0, x1) = (x as f32 * unit, (x + 1) as f32 * unit);
            let (y0, y1) = (y as f32 * unit, (y + 1) as f32 * unit);
            if !grid.get(x + 1, y) {
                push_wall(&mut mesh, Vec2::new(x1, y0), Vec2::new(x1, y1), depth, Vec3::X);
            }
            if !grid.get(x - 1, y) {
                push_wall(&mut mesh, Vec2::new(x0, y0), Vec2::new(x0, y1), depth, Vec3::NEG_X);
            }
            if !grid.get(x, y + 1) {
                push_wall(&mut mesh, Vec2::new(x0, y1), Vec2::new(x1, y1), depth, Vec3::Y);
            }
            if !grid.get(x, y - 1) {
                push_wall(&mut mesh, Vec2::new(x0, y0), Vec2::new(x1, y0), depth, Vec3::NEG_Y);
            }
        }
    }
    mesh
}

fn push_wall(mesh: &mut MeshData, a: Vec2, b: Vec2, depth: f32, normal: Vec3) {
    push_quad(
        mesh,
        [
            a.extend(0.0),
            b.extend(0.0),
            b.extend(depth),
            a.extend(depth),
        ],
        normal,
    );
}

/// Adds a planar quad, flipping the winding so it faces `normal`.
fn push_quad(mesh: &mut MeshData, mut corners: [Vec3; 4], normal: Vec3) {
    let face = (corners[1] - corners[0]).cross(corners[2] - corners[0]);
    if face.dot(normal) < 0.0 {
        corners.reverse();
    }
    let base = mesh.vertex_count() as u32;
    for corner in corners {
        mesh.push_vertex(corner, normal, Vec2::new(corner.x, corner.y));
    }
    mesh.push_triangle(base, base + 1, base + 2);
    mesh.push_triangle(base, base + 2, base + 3);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_cell_becomes_a_cube() {
        let grid = CoverageGrid::from_rows(&["#"]);
        let mesh = extrude(&grid, 1.0, 1.0);
        // Two caps and four walls.
        assert_eq!(mesh.triangle_count(), 12);
        let (min, max) = mesh.bounds().unwrap();
        assert_eq!(min, Vec3::ZERO);
        assert_eq!(max, Vec3::ONE);
    }

    #[test]
    fn caps_merge_horizontal_runs() {
        let grid = CoverageGrid::from_rows(&["###"]);
        let mesh = extrude(&grid, 0.5, 0.2);
        // One run per cap, 2 end walls, 3 top and 3 bottom walls.
        assert_eq!(mesh.triangle_count(), (2 + 2 + 6) * 2);
        let (_, max) = mesh.bounds().unwrap();
        assert!((max - Vec3::new(1.5, 0.5, 0.2)).length() < 1e-6);
    }

    #[test]
    fn interior_edges_have_no_walls() {
        let solid = CoverageGrid::from_rows(&["##", "##"]);
        let mesh = extrude(&solid, 1.0, 1.0);
        // Two runs per cap, eight boundary wall segments.
        assert_eq!(mesh.triangle_count(), (4 + 8) * 2);
    }

    #[test]
    fn windings_match_normals() {
        let grid = CoverageGrid::from_rows(&["#.#", "###", "#.#"]);
        let mesh = extrude(&grid, 1.0, 0.3);
        for tri in mesh.indices.chunks_exact(3) {
            let [a, b, c] = [tri[0] as usize, tri[1] as usize, tri[2] as usize];
            let face = (mesh.position(b) - mesh.position(a))
                .cross(mesh.position(c) - mesh.position(a));
            assert!(face.dot(mesh.normal(a)) > 0.0);
        }
    }

    #[test]
    fn compose_places_glyphs_with_y_up() {
        let glyphs = vec![
            PlacedGlyph {
                x: 0,
                y: 0,
                width: 1,
                height: 2,
                // Top row empty, bottom row solid.
                coverage: vec![0, 255],
            },
            PlacedGlyph {
                x: 3,
                y: -1,
                width: 1,
                height: 1,
                coverage: vec![200],
            },
        ];
        let grid = CoverageGrid::compose(&glyphs);
        assert_eq!((grid.width, grid.height), (4, 3));
        assert!(grid.get(0, 1));
        assert!(!grid.get(0, 2));
        assert!(grid.get(3, 0));
        assert_eq!(grid.filled(), 2);
    }

    #[test]
    fn empty_layout_gives_empty_grid() {
        let grid = CoverageGrid::compose(&[]);
        assert_eq!(grid.filled(), 0);
        assert!(extrude(&grid, 1.0, 1.0).is_empty());
    }

    #[test]
    fn invalid_font_is_rejected() {
        assert!(TextMeshBuilder::new(b"not a font").is_err());
    }
}
