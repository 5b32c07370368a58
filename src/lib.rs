//! Interactive harbor portfolio scene.
//!
//! A scene description names the models, texts, clickable markers, camera
//! presets and ocean of the harbor. Assets come from a directory or a single
//! bundle file, load in the background and are assembled into a data model
//! that the wgpu renderer draws every frame. The same frame loop runs in a
//! native window and in the browser.

pub mod app;
pub mod assemble;
pub mod assets;
pub mod camera;
pub mod controls;
pub mod data_model;
pub mod debug;
#[cfg(all(feature = "debug-gui", not(target_arch = "wasm32")))]
pub mod debug_gui;
pub mod flight;
pub mod geometry;
pub mod input;
pub mod loading;
pub mod mesh;
pub mod model;
pub mod obj;
pub mod picking;
pub mod render;
pub mod scene;
pub mod text;
pub mod texture;
pub mod tween;
pub mod water;
#[cfg(target_arch = "wasm32")]
pub mod web;

pub use app::{scene_summary, FrameClock, Portfolio, SceneState};
pub use assemble::{assemble, AssembledScene, ResourceCounter};
pub use assets::{AssetBundle, AssetError, AssetStore, BundleWriter};
pub use camera::{PerspectiveCamera, Viewport};
pub use controls::OrbitControls;
pub use data_model::{DataModel, Material, MeshId, NodeKind, SceneNode, TextureId};
pub use debug::{DebugAction, DebugParams};
pub use flight::CameraFlight;
pub use input::{InputFrame, InputState, KeyCode, MouseButton};
pub use loading::{
    load_parallel, IncrementalLoad, LoadOptions, LoadedScene, LoadingManager, LoadingObserver,
    LogObserver,
};
pub use mesh::MeshData;
pub use render::{Frame, Renderer, ResourceSink};
pub use scene::{CameraPreset, Scene};
pub use tween::{Easing, Tween};
pub use water::WaterState;
