use std::fmt::Write as _;
use std::sync::Arc;

use anyhow::{anyhow, Result};
use glam::Vec3;
use winit::dpi::PhysicalSize;
use winit::event::WindowEvent;

use crate::assemble::{assemble, AssembledScene, ResourceCounter};
use crate::assets::AssetStore;
use crate::camera::{PerspectiveCamera, Viewport};
use crate::controls::OrbitControls;
use crate::data_model::{DataModel, MeshId, NodeKind};
use crate::debug::{place_helper, sync_helper, DebugAction, DebugParams};
use crate::flight::CameraFlight;
use crate::input::{InputFrame, InputState};
use crate::loading::{IncrementalLoad, LoadOptions, LoadedScene, LoadingManager, LoadingObserver};
use crate::picking::{HoverTracker, PickTarget, Ray, Raycaster};
use crate::render::{srgb_to_linear, Frame, Lighting, Renderer, WaterFrame};
use crate::scene::{CameraPreset, Scene};
use crate::tween::{Easing, TweenStatus};
use crate::water::WaterState;

#[cfg(all(feature = "debug-gui", not(target_arch = "wasm32")))]
use crate::debug_gui::DebugGui;

/// Longest step the simulation takes, so a stalled tab does not teleport
/// running flights.
const MAX_FRAME_DELTA: f64 = 0.1;

/// Converts absolute timestamps into per-frame deltas.
#[derive(Debug, Default, Clone, Copy)]
pub struct FrameClock {
    previous: Option<f64>,
}

impl FrameClock {
    /// `now` in seconds from any fixed origin.
    pub fn tick(&mut self, now: f64) -> f32 {
        let delta = self
            .previous
            .map(|previous| (now - previous).clamp(0.0, MAX_FRAME_DELTA))
            .unwrap_or(0.0);
        self.previous = Some(now);
        delta as f32
    }
}

/// Surface size after capping the device pixel ratio.
pub fn capped_size(size: PhysicalSize<u32>, scale_factor: f64, max_ratio: f64) -> PhysicalSize<u32> {
    if scale_factor <= max_ratio || scale_factor <= 0.0 {
        return size;
    }
    let ratio = max_ratio / scale_factor;
    PhysicalSize::new(
        ((f64::from(size.width) * ratio).round() as u32).max(1),
        ((f64::from(size.height) * ratio).round() as u32).max(1),
    )
}

#[derive(Debug, Clone)]
struct Marker {
    name: String,
    center: Vec3,
    radius: f32,
    color: Vec3,
    hover_color: Vec3,
    preset: Option<String>,
}

/// Camera, interaction and animation state of the portfolio, independent of
/// any window or GPU.
pub struct SceneState {
    pub camera: PerspectiveCamera,
    pub controls: OrbitControls,
    pub params: DebugParams,
    flight: Option<CameraFlight>,
    hover: HoverTracker,
    presets: Vec<CameraPreset>,
    markers: Vec<Marker>,
    easing: Easing,
    model: DataModel,
    water: Option<WaterState>,
    lighting: Lighting,
    helper_mesh: Option<MeshId>,
    loaded: bool,
}

impl SceneState {
    pub fn new(scene: &Scene, aspect: f32) -> Self {
        let initial = scene.initial_preset();
        let mut camera =
            PerspectiveCamera::new(initial.fov, aspect, scene.camera.near, scene.camera.far);
        camera.apply_preset(&initial);
        let time_modifier = scene
            .ocean
            .as_ref()
            .map(|ocean| ocean.time_modifier)
            .unwrap_or(320.0);
        let markers = scene
            .markers
            .iter()
            .map(|marker| Marker {
                name: marker.name.clone(),
                center: marker.position,
                radius: marker.radius,
                color: srgb_to_linear(marker.color),
                hover_color: srgb_to_linear(marker.hover_color),
                preset: marker.preset.clone(),
            })
            .collect();
        Self {
            camera,
            controls: OrbitControls::new(initial.target),
            params: DebugParams::new(initial.fov, time_modifier),
            flight: None,
            hover: HoverTracker::default(),
            presets: scene.presets.clone(),
            markers,
            easing: Easing::QuadraticInOut,
            model: DataModel::new(),
            water: None,
            lighting: Lighting::from_lights(&scene.lights),
            helper_mesh: None,
            loaded: false,
        }
    }

    /// Takes over the assembled scene; drawing starts with the next frame.
    pub fn attach(&mut self, assembled: AssembledScene) {
        self.model = assembled.model;
        self.lighting = assembled.lighting;
        self.water = assembled.water;
        self.helper_mesh = Some(assembled.helper_mesh);
        self.loaded = true;
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded
    }

    pub fn model(&self) -> &DataModel {
        &self.model
    }

    pub fn water(&self) -> Option<&WaterState> {
        self.water.as_ref()
    }

    pub fn preset_names(&self) -> Vec<String> {
        self.presets.iter().map(|preset| preset.name.clone()).collect()
    }

    pub fn is_flying(&self) -> bool {
        self.flight.is_some()
    }

    pub fn hovered(&self) -> Option<&str> {
        self.hover.current().map(|hit| hit.name.as_str())
    }

    /// Starts an animated move onto `preset`, replacing any running flight.
    pub fn fly_to(&mut self, preset: &CameraPreset) {
        self.controls.enabled = false;
        self.flight = Some(CameraFlight::new(
            &self.camera,
            self.controls.target,
            self.params.fov(),
            preset,
            self.easing,
        ));
    }

    /// Places the camera on `preset` immediately.
    pub fn jump_to(&mut self, preset: &CameraPreset) {
        self.flight = None;
        self.camera.apply_preset(preset);
        self.params.set_fov(preset.fov);
        self.controls.sync_from_camera(preset.target);
        self.controls.enabled = true;
    }

    /// Runs a debug action. `ToggleGui` is left to the host.
    pub fn apply_action(&mut self, action: DebugAction) {
        match action {
            DebugAction::PlaceHelper => match self.helper_mesh {
                Some(mesh) => {
                    place_helper(&self.model, &self.params, mesh);
                }
                None => log::warn!("scene is still loading"),
            },
            DebugAction::CameraPreset(index) => match self.presets.get(index).cloned() {
                Some(preset) => self.jump_to(&preset),
                None => log::warn!("no camera preset #{}", index + 1),
            },
            DebugAction::LogCamera => {
                log::info!("Camera Details");
                log::info!("{:?}", self.camera);
                log::info!("orbit target {:?}", self.controls.target);
            }
            DebugAction::ToggleGui => {}
        }
    }

    /// Advances one frame.
    pub fn tick(&mut self, dt: f32, input: &InputFrame, viewport: Viewport) {
        if let Some(water) = &mut self.water {
            water.set_time_modifier(self.params.time_modifier());
            water.advance();
        }

        sync_helper(&self.model, &self.params);

        self.camera.fov = self.params.fov();
        self.camera.aspect = viewport.aspect();

        let landed = match &mut self.flight {
            Some(flight) => {
                let mut fov = self.params.fov();
                let mut target = self.controls.target;
                let status = flight.update(dt, &mut self.camera, &mut fov, &mut target);
                self.params.set_fov(fov);
                self.controls.target = target;
                status == TweenStatus::Finished
            }
            None => {
                self.controls
                    .handle_input(input, &self.camera, viewport.height as f32);
                self.controls.update(&mut self.camera);
                false
            }
        };
        if landed {
            self.flight = None;
            self.controls.sync_from_camera(self.controls.target);
            self.controls.enabled = true;
        }

        self.pick(input, viewport);
    }

    fn pick(&mut self, input: &InputFrame, viewport: Viewport) {
        let hits = match input.cursor {
            Some(cursor) => {
                let ray = Ray::from_camera(viewport.to_ndc(cursor), &self.camera);
                let targets: Vec<PickTarget> = self
                    .markers
                    .iter()
                    .map(|marker| PickTarget {
                        name: marker.name.clone(),
                        center: marker.center,
                        radius: marker.radius,
                    })
                    .collect();
                Raycaster.intersect(&ray, &targets)
            }
            None => Vec::new(),
        };
        self.hover.update(&hits);

        for marker in &self.markers {
            self.model.set_color(&marker.name, marker.color);
        }
        for hit in &hits {
            if let Some(marker) = self.markers.iter().find(|marker| marker.name == hit.name) {
                self.model.set_color(&marker.name, marker.hover_color);
            }
        }

        if input.clicks.is_empty() {
            return;
        }
        let Some(name) = self.hovered().map(str::to_string) else {
            return;
        };
        log::info!("{name}");
        let preset = self
            .markers
            .iter()
            .find(|marker| marker.name == name)
            .and_then(|marker| marker.preset.as_deref())
            .and_then(|preset| self.presets.iter().find(|p| p.name == preset))
            .cloned();
        if let Some(preset) = preset {
            self.fly_to(&preset);
        }
    }

    /// Snapshot handed to the renderer.
    pub fn frame(&self) -> Frame {
        if !self.loaded {
            return Frame::empty(self.camera);
        }
        Frame {
            camera: self.camera,
            nodes: self.model.all_nodes(),
            lighting: self.lighting,
            water: self.water.as_ref().map(WaterFrame::from_state),
            ..Frame::empty(self.camera)
        }
    }
}

enum LoadPhase {
    #[cfg(not(target_arch = "wasm32"))]
    Background(std::thread::JoinHandle<LoadedScene>),
    Incremental(IncrementalLoad),
    Done,
}

/// Window-bound application: renderer, input, loading and the scene state.
pub struct Portfolio {
    renderer: Renderer,
    input: InputState,
    state: SceneState,
    clock: FrameClock,
    load: LoadPhase,
    max_pixel_ratio: Option<f64>,
    #[cfg(all(feature = "debug-gui", not(target_arch = "wasm32")))]
    gui: Option<DebugGui>,
}

impl Portfolio {
    /// Starts loading on worker threads; frames render the clear colour until
    /// everything arrived.
    #[cfg(not(target_arch = "wasm32"))]
    pub fn spawn(
        renderer: Renderer,
        scene: Scene,
        store: AssetStore,
        observer: Arc<dyn LoadingObserver>,
    ) -> Self {
        let options = LoadOptions {
            max_texture_size: renderer.max_texture_size(),
        };
        let state = SceneState::new(&scene, aspect_of(renderer.size()));
        let manager = LoadingManager::new(observer);
        let handle = std::thread::spawn(move || {
            crate::loading::load_parallel(scene, &store, &manager, options)
        });
        Self::with_phase(renderer, state, LoadPhase::Background(handle))
    }

    /// Loads one asset per frame on the calling thread.
    pub fn incremental(
        renderer: Renderer,
        scene: Scene,
        store: AssetStore,
        observer: Arc<dyn LoadingObserver>,
    ) -> Self {
        let options = LoadOptions {
            max_texture_size: renderer.max_texture_size(),
        };
        let state = SceneState::new(&scene, aspect_of(renderer.size()));
        let manager = Arc::new(LoadingManager::new(observer));
        let load = IncrementalLoad::new(scene, store, manager, options);
        Self::with_phase(renderer, state, LoadPhase::Incremental(load))
    }

    fn with_phase(renderer: Renderer, state: SceneState, load: LoadPhase) -> Self {
        #[cfg(all(feature = "debug-gui", not(target_arch = "wasm32")))]
        let gui = Some(DebugGui::new(
            renderer.window(),
            renderer.device(),
            renderer.surface_format(),
        ));
        Self {
            renderer,
            input: InputState::new(),
            state,
            clock: FrameClock::default(),
            load,
            max_pixel_ratio: None,
            #[cfg(all(feature = "debug-gui", not(target_arch = "wasm32")))]
            gui,
        }
    }

    /// Caps the drawing buffer resolution relative to CSS pixels.
    pub fn set_max_pixel_ratio(&mut self, ratio: f64) {
        self.max_pixel_ratio = Some(ratio);
        let size = self.renderer.window().inner_size();
        self.resize(size);
    }

    #[cfg(all(feature = "debug-gui", not(target_arch = "wasm32")))]
    pub fn disable_gui(&mut self) {
        self.gui = None;
    }

    pub fn renderer(&self) -> &Renderer {
        &self.renderer
    }

    pub fn state(&self) -> &SceneState {
        &self.state
    }

    pub fn resize(&mut self, size: PhysicalSize<u32>) {
        let size = match self.max_pixel_ratio {
            Some(max) => capped_size(size, self.renderer.window().scale_factor(), max),
            None => size,
        };
        self.renderer.resize(size);
    }

    /// Routes a window event to the debug panel first, then to the input
    /// state. Returns `true` when the event was used.
    pub fn handle_window_event(&mut self, event: &WindowEvent) -> bool {
        #[cfg(all(feature = "debug-gui", not(target_arch = "wasm32")))]
        if let Some(gui) = &mut self.gui {
            if gui.handle_event(self.renderer.window(), event) {
                return true;
            }
        }
        match event {
            WindowEvent::Resized(size) => {
                self.resize(*size);
                true
            }
            _ => self.input.handle_window_event(event),
        }
    }

    fn poll_loading(&mut self) {
        let loaded = match std::mem::replace(&mut self.load, LoadPhase::Done) {
            #[cfg(not(target_arch = "wasm32"))]
            LoadPhase::Background(handle) if handle.is_finished() => match handle.join() {
                Ok(loaded) => Some(loaded),
                Err(_) => {
                    log::error!("asset loader panicked");
                    None
                }
            },
            #[cfg(not(target_arch = "wasm32"))]
            phase @ LoadPhase::Background(_) => {
                self.load = phase;
                None
            }
            LoadPhase::Incremental(mut load) => {
                load.step();
                if load.is_complete() {
                    Some(load.finish())
                } else {
                    self.load = LoadPhase::Incremental(load);
                    None
                }
            }
            LoadPhase::Done => None,
        };
        if let Some(loaded) = loaded {
            if let Some(ocean) = &loaded.scene.ocean {
                self.renderer.set_reflection_size(ocean.texture_size);
            }
            let assembled = assemble(&loaded, &mut self.renderer);
            log::info!(
                "scene assembled with {} nodes ({} skipped)",
                assembled.model.len(),
                assembled.skipped.len()
            );
            self.state.attach(assembled);
        }
    }

    /// Runs one frame: loading, input, debug actions, simulation and drawing.
    /// `now` is in seconds.
    pub fn frame(&mut self, now: f64) -> Result<()> {
        let dt = self.clock.tick(now);
        self.poll_loading();

        let input = self.input.take_frame();
        let mut actions: Vec<DebugAction> = input
            .keys_pressed
            .iter()
            .filter_map(|key| DebugAction::from_key(*key))
            .collect();

        #[cfg(all(feature = "debug-gui", not(target_arch = "wasm32")))]
        if let Some(gui) = &mut self.gui {
            let presets = self.state.preset_names();
            actions.extend(gui.run(self.renderer.window(), &mut self.state.params, &presets));
        }

        for action in actions {
            match action {
                DebugAction::ToggleGui => self.toggle_gui(),
                other => self.state.apply_action(other),
            }
        }

        let size = self.renderer.size();
        self.state.tick(dt, &input, Viewport::new(size.width, size.height));
        let frame = self.state.frame();

        #[cfg(all(feature = "debug-gui", not(target_arch = "wasm32")))]
        let result = match &mut self.gui {
            Some(gui) => {
                let mut overlay = |target: crate::render::OverlayTarget<'_>| gui.paint(target);
                self.renderer.render(&frame, Some(&mut overlay))
            }
            None => self.renderer.render(&frame, None),
        };
        #[cfg(not(all(feature = "debug-gui", not(target_arch = "wasm32"))))]
        let result = self.renderer.render(&frame, None);

        match result {
            Ok(()) => Ok(()),
            Err(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) => {
                self.renderer.reconfigure();
                Ok(())
            }
            Err(wgpu::SurfaceError::OutOfMemory) => Err(anyhow!("GPU is out of memory")),
            Err(wgpu::SurfaceError::Timeout) => {
                log::warn!("Surface timeout; retrying next frame");
                Ok(())
            }
        }
    }

    fn toggle_gui(&mut self) {
        #[cfg(all(feature = "debug-gui", not(target_arch = "wasm32")))]
        if let Some(gui) = &mut self.gui {
            gui.toggle();
            return;
        }
        log::info!("debug panel unavailable in this build");
    }
}

fn aspect_of(size: PhysicalSize<u32>) -> f32 {
    Viewport::new(size.width, size.height).aspect()
}

/// Human readable report of a headless load.
pub fn scene_summary(
    loaded: &LoadedScene,
    assembled: &AssembledScene,
    counter: &ResourceCounter,
) -> String {
    let scene = &loaded.scene;
    let mut out = String::new();
    let _ = writeln!(
        out,
        "Scene '{}': {} models, {} texts, {} markers, {} camera presets",
        scene.name,
        scene.models.len(),
        scene.texts.len(),
        scene.markers.len(),
        scene.presets.len()
    );
    let _ = writeln!(
        out,
        "Assets: {} loaded, {} failed",
        loaded.assets.len(),
        loaded.failed.len()
    );
    for url in &loaded.failed {
        let _ = writeln!(out, " ! {url}");
    }
    let _ = writeln!(
        out,
        "GPU uploads: {} meshes ({} vertices, {} triangles), {} textures",
        counter.meshes, counter.vertices, counter.triangles, counter.textures
    );
    match counter.skybox {
        Some(size) => {
            let _ = writeln!(out, "Sky: {size}px cube map");
        }
        None => {
            let _ = writeln!(out, "Sky: clear colour");
        }
    }
    if let Some(water) = &assembled.water {
        let _ = writeln!(
            out,
            "Water: {0} x {0}, time modifier {1}",
            water.settings.size,
            water.time_modifier()
        );
    }
    let initial = scene.initial_preset();
    let _ = writeln!(
        out,
        "Camera: preset '{}' at ({:.2}, {:.2}, {:.2}) fov {}",
        initial.name, initial.position.x, initial.position.y, initial.position.z, initial.fov
    );
    let _ = writeln!(out, "Nodes:");
    for node in assembled.model.all_nodes() {
        let kind = match node.kind {
            NodeKind::Model => "model",
            NodeKind::Text => "text",
            NodeKind::Marker => "marker",
            NodeKind::Helper => "helper",
            NodeKind::Water => "water",
        };
        let _ = writeln!(
            out,
            " - {} ({kind}) pos=({:.2}, {:.2}, {:.2})",
            node.name, node.position.x, node.position.y, node.position.z
        );
    }
    for name in &assembled.skipped {
        let _ = writeln!(out, " - {name} (skipped)");
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assemble::assemble;
    use crate::debug::HELPER_NAME;
    use glam::Vec2;
    use std::collections::HashMap;

    const SCENE: &str = r#"<scene>
        <name>Harbor</name>
        <camera><preset>overview</preset></camera>
        <preset><name>overview</name><position>79.39 5.31 44.77</position><target>0 2 0</target><fov>8</fov></preset>
        <preset><name>city</name><position>10.1 5.28 0.6</position><target>9.2 1.8 38</target><fov>40</fov><duration>1</duration></preset>
        <ocean><normals>/textures/Misc/waternormals.jpg</normals></ocean>
        <marker><name>Button1</name><position>10.7 1.8 6.2</position><preset>city</preset></marker>
    </scene>"#;

    fn state() -> (SceneState, Viewport) {
        let scene = Scene::from_xml(SCENE).unwrap();
        let viewport = Viewport::new(800, 600);
        let mut state = SceneState::new(&scene, viewport.aspect());
        let loaded = LoadedScene {
            scene,
            assets: HashMap::new(),
            failed: Vec::new(),
        };
        state.attach(assemble(&loaded, &mut ResourceCounter::default()));
        (state, viewport)
    }

    fn screen_point(state: &SceneState, viewport: Viewport, world: Vec3) -> Vec2 {
        let ndc = state.camera.view_projection().project_point3(world);
        Vec2::new(
            (ndc.x + 1.0) * 0.5 * viewport.width as f32,
            (1.0 - ndc.y) * 0.5 * viewport.height as f32,
        )
    }

    #[test]
    fn frame_clock_clamps_long_pauses() {
        let mut clock = FrameClock::default();
        assert_eq!(clock.tick(10.0), 0.0);
        assert!((clock.tick(10.016) - 0.016).abs() < 1e-6);
        assert_eq!(clock.tick(20.0), 0.1);
    }

    #[test]
    fn pixel_ratio_is_capped() {
        let size = PhysicalSize::new(3000, 1500);
        assert_eq!(capped_size(size, 3.0, 2.0), PhysicalSize::new(2000, 1000));
        assert_eq!(capped_size(size, 1.5, 2.0), size);
    }

    #[test]
    fn starts_at_the_named_preset_and_draws_nothing_until_loaded() {
        let scene = Scene::from_xml(SCENE).unwrap();
        let state = SceneState::new(&scene, 1.5);
        assert_eq!(state.camera.position, Vec3::new(79.39, 5.31, 44.77));
        assert_eq!(state.params.fov(), 8.0);
        assert_eq!(state.controls.target, Vec3::new(0.0, 2.0, 0.0));
        assert!(state.frame().nodes.is_empty());
    }

    #[test]
    fn water_time_follows_the_modifier() {
        let (mut state, viewport) = state();
        state.params.set_time_modifier(100.0);
        for _ in 0..100 {
            state.tick(0.016, &InputFrame::default(), viewport);
        }
        let time = state.water().unwrap().time;
        assert!((time - 1.0).abs() < 1e-4);
        assert!(state.frame().water.is_some());
    }

    #[test]
    fn hovering_a_marker_recolours_it() {
        let (mut state, viewport) = state();
        state.tick(0.016, &InputFrame::default(), viewport);
        let base = state.model().get("Button1").unwrap().color;

        let cursor = screen_point(&state, viewport, Vec3::new(10.7, 1.8, 6.2));
        let input = InputFrame {
            cursor: Some(cursor),
            ..InputFrame::default()
        };
        state.tick(0.016, &input, viewport);
        assert_eq!(state.hovered(), Some("Button1"));
        assert_eq!(state.model().get("Button1").unwrap().color, Vec3::new(0.0, 0.0, 1.0));

        state.tick(0.016, &InputFrame::default(), viewport);
        assert_eq!(state.hovered(), None);
        assert_eq!(state.model().get("Button1").unwrap().color, base);
    }

    #[test]
    fn clicking_a_marker_flies_to_its_preset() {
        let (mut state, viewport) = state();
        state.tick(0.016, &InputFrame::default(), viewport);
        let cursor = screen_point(&state, viewport, Vec3::new(10.7, 1.8, 6.2));
        let click = InputFrame {
            cursor: Some(cursor),
            clicks: vec![cursor],
            ..InputFrame::default()
        };
        state.tick(0.016, &click, viewport);
        assert!(state.is_flying());
        assert!(!state.controls.enabled);

        for _ in 0..20 {
            state.tick(0.1, &InputFrame::default(), viewport);
        }
        assert!(!state.is_flying());
        assert!(state.controls.enabled);
        assert_eq!(state.params.fov(), 40.0);
        assert_eq!(state.controls.target, Vec3::new(9.2, 1.8, 38.0));
        assert!((state.camera.position - Vec3::new(10.1, 5.28, 0.6)).length() < 1e-3);
    }

    #[test]
    fn debug_actions_jump_and_place_the_helper() {
        let (mut state, viewport) = state();
        state.apply_action(DebugAction::CameraPreset(1));
        assert_eq!(state.camera.position, Vec3::new(10.1, 5.28, 0.6));
        assert_eq!(state.params.fov(), 40.0);

        state.apply_action(DebugAction::PlaceHelper);
        state.params.set_helper(Vec3::new(1.0, 2.0, 3.0));
        state.tick(0.016, &InputFrame::default(), viewport);
        let helper = state.model().get(HELPER_NAME).unwrap();
        assert!((helper.position - Vec3::new(1.0, 2.0, 3.0)).length() < 1e-4);
    }

    #[test]
    fn summary_lists_nodes_and_failures() {
        let scene = Scene::from_xml(SCENE).unwrap();
        let loaded = LoadedScene {
            scene,
            assets: HashMap::new(),
            failed: vec!["/textures/Misc/waternormals.jpg".to_string()],
        };
        let mut counter = ResourceCounter::default();
        let assembled = assemble(&loaded, &mut counter);
        let summary = scene_summary(&loaded, &assembled, &counter);
        assert!(summary.contains("Scene 'Harbor': 0 models, 0 texts, 1 markers, 2 camera presets"));
        assert!(summary.contains(" ! /textures/Misc/waternormals.jpg"));
        assert!(summary.contains(" - Button1 (marker) pos=(10.70, 1.80, 6.20)"));
        assert!(summary.contains("Sky: clear colour"));
    }
}
