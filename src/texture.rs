use anyhow::{bail, Context, Result};
use image::{imageops::FilterType, RgbaImage};

/// Decoded RGBA8 image ready for upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextureImage {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<u8>,
}

impl TextureImage {
    /// Decodes PNG or JPEG bytes.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let image = image::load_from_memory(bytes).context("failed to decode image")?;
        let rgba = image.to_rgba8();
        Ok(Self {
            width: rgba.width(),
            height: rgba.height(),
            pixels: rgba.into_raw(),
        })
    }

    pub fn solid(rgba: [u8; 4]) -> Self {
        Self {
            width: 1,
            height: 1,
            pixels: rgba.to_vec(),
        }
    }

    /// A normal map whose every texel points straight up the surface normal.
    pub fn flat_normal_map() -> Self {
        Self::solid([128, 128, 255, 255])
    }

    /// Downsizes the image so neither side exceeds `max`, keeping the aspect
    /// ratio. Smaller images are returned unchanged.
    pub fn fit_within(self, max: u32) -> Self {
        if max == 0 || (self.width <= max && self.height <= max) {
            return self;
        }
        let scale = max as f32 / self.width.max(self.height) as f32;
        let width = ((self.width as f32 * scale).round() as u32).clamp(1, max);
        let height = ((self.height as f32 * scale).round() as u32).clamp(1, max);
        let Some(source) = RgbaImage::from_raw(self.width, self.height, self.pixels) else {
            // Pixel buffer does not match the dimensions; nothing sensible to resample.
            return Self::solid([255, 255, 255, 255]);
        };
        let resized = image::imageops::resize(&source, width, height, FilterType::Triangle);
        log::debug!(
            "downsized texture from {}x{} to {width}x{height}",
            source.width(),
            source.height()
        );
        Self {
            width,
            height,
            pixels: resized.into_raw(),
        }
    }
}

/// The six faces of a cube map in `px, nx, py, ny, pz, nz` order.
#[derive(Debug, Clone)]
pub struct CubeImages {
    pub size: u32,
    pub faces: [TextureImage; 6],
}

impl CubeImages {
    pub fn from_faces(faces: [TextureImage; 6]) -> Result<Self> {
        let size = faces[0].width;
        for (index, face) in faces.iter().enumerate() {
            if face.width != face.height {
                bail!(
                    "cube face {index} is not square ({}x{})",
                    face.width,
                    face.height
                );
            }
            if face.width != size {
                bail!(
                    "cube face {index} is {}px but face 0 is {size}px",
                    face.width
                );
            }
        }
        Ok(Self { size, faces })
    }

    /// Decodes six encoded faces.
    pub fn decode(faces: [&[u8]; 6]) -> Result<Self> {
        let mut decoded = Vec::with_capacity(6);
        for (index, bytes) in faces.iter().enumerate() {
            decoded.push(
                TextureImage::decode(bytes).with_context(|| format!("cube face {index}"))?,
            );
        }
        let faces: [TextureImage; 6] = decoded
            .try_into()
            .map_err(|_| anyhow::anyhow!("expected six cube faces"))?;
        Self::from_faces(faces)
    }

    pub fn fit_within(self, max: u32) -> Self {
        let faces = self.faces.map(|face| face.fit_within(max));
        Self {
            size: faces[0].width,
            faces,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn png(width: u32, height: u32) -> Vec<u8> {
        let image = RgbaImage::from_pixel(width, height, image::Rgba([10, 20, 30, 255]));
        let mut bytes = Vec::new();
        image
            .write_to(&mut Cursor::new(&mut bytes), image::ImageOutputFormat::Png)
            .unwrap();
        bytes
    }

    #[test]
    fn decodes_png_as_rgba() {
        let texture = TextureImage::decode(&png(3, 2)).unwrap();
        assert_eq!((texture.width, texture.height), (3, 2));
        assert_eq!(texture.pixels.len(), 3 * 2 * 4);
        assert_eq!(&texture.pixels[..4], &[10, 20, 30, 255]);
    }

    #[test]
    fn fit_within_keeps_aspect_ratio() {
        let texture = TextureImage::decode(&png(64, 32)).unwrap().fit_within(16);
        assert_eq!((texture.width, texture.height), (16, 8));
        assert_eq!(texture.pixels.len(), 16 * 8 * 4);
    }

    #[test]
    fn fit_within_leaves_small_images_alone() {
        let texture = TextureImage::decode(&png(8, 8)).unwrap();
        let same = texture.clone().fit_within(16);
        assert_eq!(texture, same);
    }

    #[test]
    fn cube_faces_must_match() {
        let face = png(4, 4);
        let other = png(8, 8);
        assert!(CubeImages::decode([&face, &face, &face, &face, &face, &face]).is_ok());
        assert!(CubeImages::decode([&face, &face, &other, &face, &face, &face]).is_err());
        let wide = png(8, 4);
        assert!(CubeImages::decode([&wide, &wide, &wide, &wide, &wide, &wide]).is_err());
    }

    #[test]
    fn invalid_bytes_are_an_error() {
        assert!(TextureImage::decode(b"definitely not a png").is_err());
    }
}
