//! wgpu renderer: frame description, GPU resources and WGSL pipelines.

mod common;
mod gpu;
mod shared;

pub use common::{srgb_to_linear, Frame, Lighting, ResourceSink, WaterFrame};
pub use gpu::{OverlayTarget, Renderer};
