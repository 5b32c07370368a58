use std::any::Any;
use std::collections::{HashMap, VecDeque};
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use parking_lot::Mutex;

use crate::assets::AssetStore;
use crate::mesh::MeshData;
use crate::model::load_mesh;
use crate::scene::Scene;
use crate::text::TextMeshBuilder;
use crate::texture::{CubeImages, TextureImage};

/// Largest texture side the native renderer accepts.
pub const DEFAULT_MAX_TEXTURE_SIZE: u32 = 8192;

/// Receives loading lifecycle callbacks.
pub trait LoadingObserver: Send + Sync {
    fn on_start(&self, _url: &str, _loaded: usize, _total: usize) {}
    fn on_progress(&self, _url: &str, _loaded: usize, _total: usize) {}
    fn on_error(&self, _url: &str) {}
    fn on_load(&self) {}
}

/// Reports loading through the `log` facade.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogObserver;

impl LoadingObserver for LogObserver {
    fn on_start(&self, url: &str, loaded: usize, total: usize) {
        log::info!("Started loading file: {url}. Loaded {loaded} of {total} files.");
    }

    fn on_progress(&self, url: &str, loaded: usize, total: usize) {
        log::debug!("Loading file: {url}. Loaded {loaded} of {total} files.");
    }

    fn on_error(&self, url: &str) {
        log::error!("There was an error loading {url}");
    }

    fn on_load(&self) {
        log::info!("Loading complete!");
    }
}

#[derive(Debug, Default)]
struct Counts {
    loaded: usize,
    total: usize,
    loading: bool,
    completed: bool,
}

/// Tracks how many registered items have finished.
///
/// `on_start` fires for the first item of a batch and `on_load` once every
/// registered item has ended, failed ones included.
pub struct LoadingManager {
    observer: Arc<dyn LoadingObserver>,
    counts: Mutex<Counts>,
}

impl LoadingManager {
    pub fn new(observer: Arc<dyn LoadingObserver>) -> Self {
        Self {
            observer,
            counts: Mutex::new(Counts::default()),
        }
    }

    pub fn item_start(&self, url: &str) {
        let (start, loaded, total) = {
            let mut counts = self.counts.lock();
            counts.total += 1;
            counts.completed = false;
            let start = !counts.loading;
            counts.loading = true;
            (start, counts.loaded, counts.total)
        };
        if start {
            self.observer.on_start(url, loaded, total);
        }
    }

    pub fn item_end(&self, url: &str) {
        let (loaded, total, done) = {
            let mut counts = self.counts.lock();
            counts.loaded += 1;
            let done = counts.loaded == counts.total;
            if done {
                counts.loading = false;
                counts.completed = true;
            }
            (counts.loaded, counts.total, done)
        };
        self.observer.on_progress(url, loaded, total);
        if done {
            self.observer.on_load();
        }
    }

    pub fn item_error(&self, url: &str) {
        self.observer.on_error(url);
    }

    pub fn items_loaded(&self) -> usize {
        self.counts.lock().loaded
    }

    pub fn items_total(&self) -> usize {
        self.counts.lock().total
    }

    pub fn is_complete(&self) -> bool {
        self.counts.lock().completed
    }
}

/// Knobs that depend on the GPU the assets end up on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoadOptions {
    pub max_texture_size: u32,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            max_texture_size: DEFAULT_MAX_TEXTURE_SIZE,
        }
    }
}

/// One file the scene references. Jobs report to a [`LoadingManager`];
/// native builds run them all on worker threads with [`load_parallel`], the
/// web build steps through them one per frame with [`IncrementalLoad`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadJob {
    Mesh(String),
    Texture(String),
    CubeMap([String; 6]),
    Font(String),
}

impl LoadJob {
    /// Jobs for every file the scene references, in load order.
    pub fn for_scene(scene: &Scene) -> Vec<LoadJob> {
        let mut jobs = Vec::new();
        let mut push = |job: LoadJob| {
            if !jobs.contains(&job) {
                jobs.push(job);
            }
        };
        if let Some(matcap) = &scene.matcap {
            push(LoadJob::Texture(matcap.clone()));
        }
        if let Some(ocean) = &scene.ocean {
            push(LoadJob::Texture(ocean.normals.clone()));
        }
        if let Some(sky) = &scene.sky {
            push(LoadJob::CubeMap(sky.faces.clone()));
        }
        for model in &scene.models {
            push(LoadJob::Texture(model.texture.clone()));
        }
        for model in &scene.models {
            push(LoadJob::Mesh(model.mesh.clone()));
        }
        if let Some(font) = &scene.font {
            push(LoadJob::Font(font.clone()));
        }
        jobs
    }

    /// Key the result is stored under; cube maps use their first face.
    pub fn url(&self) -> &str {
        match self {
            Self::Mesh(url) | Self::Texture(url) | Self::Font(url) => url,
            Self::CubeMap(faces) => &faces[0],
        }
    }

    pub fn run(&self, store: &AssetStore, options: &LoadOptions) -> Result<LoadedAsset> {
        match self {
            Self::Mesh(url) => {
                let bytes = store.read(url)?;
                let mesh = load_mesh(url, &bytes).with_context(|| format!("mesh {url}"))?;
                Ok(LoadedAsset::Mesh(mesh))
            }
            Self::Texture(url) => {
                let bytes = store.read(url)?;
                let image = TextureImage::decode(&bytes).with_context(|| format!("texture {url}"))?;
                Ok(LoadedAsset::Texture(image.fit_within(options.max_texture_size)))
            }
            Self::CubeMap(faces) => {
                let mut bytes = Vec::with_capacity(6);
                for face in faces {
                    bytes.push(store.read(face)?);
                }
                let cube = CubeImages::decode([
                    &bytes[0], &bytes[1], &bytes[2], &bytes[3], &bytes[4], &bytes[5],
                ])
                .with_context(|| format!("sky {}", faces.join(", ")))?;
                Ok(LoadedAsset::CubeMap(cube.fit_within(options.max_texture_size)))
            }
            Self::Font(url) => {
                let bytes = store.read(url)?;
                let builder = TextMeshBuilder::new(&bytes).with_context(|| format!("font {url}"))?;
                Ok(LoadedAsset::Font(Arc::new(builder)))
            }
        }
    }
}

/// Decoded result of one job.
#[derive(Clone)]
pub enum LoadedAsset {
    Mesh(MeshData),
    Texture(TextureImage),
    CubeMap(CubeImages),
    Font(Arc<TextMeshBuilder>),
}

/// The scene description with every asset that loaded.
pub struct LoadedScene {
    pub scene: Scene,
    pub assets: HashMap<String, LoadedAsset>,
    pub failed: Vec<String>,
}

impl LoadedScene {
    pub fn mesh(&self, url: &str) -> Option<&MeshData> {
        match self.assets.get(url) {
            Some(LoadedAsset::Mesh(mesh)) => Some(mesh),
            _ => None,
        }
    }

    pub fn texture(&self, url: &str) -> Option<&TextureImage> {
        match self.assets.get(url) {
            Some(LoadedAsset::Texture(texture)) => Some(texture),
            _ => None,
        }
    }

    pub fn cube_map(&self, first_face: &str) -> Option<&CubeImages> {
        match self.assets.get(first_face) {
            Some(LoadedAsset::CubeMap(cube)) => Some(cube),
            _ => None,
        }
    }

    pub fn font(&self, url: &str) -> Option<&TextMeshBuilder> {
        match self.assets.get(url) {
            Some(LoadedAsset::Font(font)) => Some(font),
            _ => None,
        }
    }

    fn collect(
        scene: Scene,
        results: impl IntoIterator<Item = (LoadJob, Result<LoadedAsset>)>,
    ) -> Self {
        let mut assets = HashMap::new();
        let mut failed = Vec::new();
        for (job, result) in results {
            match result {
                Ok(asset) => {
                    assets.insert(job.url().to_string(), asset);
                }
                Err(_) => failed.push(job.url().to_string()),
            }
        }
        Self {
            scene,
            assets,
            failed,
        }
    }
}

/// Turns a panicking decoder into an ordinary failed item.
fn run_guarded<F>(url: &str, run: F) -> Result<LoadedAsset>
where
    F: FnOnce() -> Result<LoadedAsset>,
{
    panic::catch_unwind(AssertUnwindSafe(run))
        .unwrap_or_else(|panic| Err(anyhow!("{url}: loader panicked: {}", panic_text(&*panic))))
}

fn panic_text(panic: &(dyn Any + Send)) -> &str {
    panic
        .downcast_ref::<String>()
        .map(String::as_str)
        .or_else(|| panic.downcast_ref::<&'static str>().copied())
        .unwrap_or("unknown panic")
}

fn finish_job(manager: &LoadingManager, job: &LoadJob, result: &Result<LoadedAsset>) {
    if let Err(err) = result {
        manager.item_error(job.url());
        log::debug!("{}: {err:#}", job.url());
    }
    manager.item_end(job.url());
}

/// Runs every job on its own worker thread and waits for all of them.
pub fn load_parallel(
    scene: Scene,
    store: &AssetStore,
    manager: &LoadingManager,
    options: LoadOptions,
) -> LoadedScene {
    let jobs = LoadJob::for_scene(&scene);
    for job in &jobs {
        manager.item_start(job.url());
    }

    let results: Vec<(LoadJob, Result<LoadedAsset>)> = std::thread::scope(|scope| {
        let handles: Vec<_> = jobs
            .into_iter()
            .map(|job| {
                let key = job.clone();
                let handle = scope.spawn(move || {
                    let result = run_guarded(job.url(), || job.run(store, &options));
                    finish_job(manager, &job, &result);
                    result
                });
                (key, handle)
            })
            .collect();
        handles
            .into_iter()
            .map(|(job, handle)| {
                let result = handle
                    .join()
                    .unwrap_or_else(|_| Err(anyhow!("{}: load worker panicked", job.url())));
                (job, result)
            })
            .collect()
    });

    LoadedScene::collect(scene, results)
}

/// Runs one job per call so a single threaded host can keep drawing between
/// jobs.
pub struct IncrementalLoad {
    scene: Scene,
    store: AssetStore,
    manager: Arc<LoadingManager>,
    options: LoadOptions,
    pending: VecDeque<LoadJob>,
    results: Vec<(LoadJob, Result<LoadedAsset>)>,
}

impl IncrementalLoad {
    pub fn new(
        scene: Scene,
        store: AssetStore,
        manager: Arc<LoadingManager>,
        options: LoadOptions,
    ) -> Self {
        let pending: VecDeque<LoadJob> = LoadJob::for_scene(&scene).into();
        for job in &pending {
            manager.item_start(job.url());
        }
        Self {
            scene,
            store,
            manager,
            options,
            pending,
            results: Vec::new(),
        }
    }

    /// Runs the next job. Returns `false` once nothing is left.
    pub fn step(&mut self) -> bool {
        let Some(job) = self.pending.pop_front() else {
            return false;
        };
        let result = run_guarded(job.url(), || job.run(&self.store, &self.options));
        finish_job(&self.manager, &job, &result);
        self.results.push((job, result));
        true
    }

    pub fn is_complete(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn remaining(&self) -> usize {
        self.pending.len()
    }

    /// Runs anything left and hands over the results.
    pub fn finish(mut self) -> LoadedScene {
        while self.step() {}
        LoadedScene::collect(self.scene, self.results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assets::{AssetBundle, BundleWriter};
    use std::io::Cursor;

    #[derive(Default)]
    struct Recorder {
        events: Mutex<Vec<String>>,
    }

    impl LoadingObserver for Recorder {
        fn on_start(&self, url: &str, loaded: usize, total: usize) {
            self.events.lock().push(format!("start {url} {loaded}/{total}"));
        }
        fn on_progress(&self, _url: &str, loaded: usize, total: usize) {
            self.events.lock().push(format!("progress {loaded}/{total}"));
        }
        fn on_error(&self, url: &str) {
            self.events.lock().push(format!("error {url}"));
        }
        fn on_load(&self) {
            self.events.lock().push("load".to_string());
        }
    }

    fn png() -> Vec<u8> {
        let image = image::RgbaImage::from_pixel(2, 2, image::Rgba([1, 2, 3, 255]));
        let mut bytes = Vec::new();
        image
            .write_to(&mut Cursor::new(&mut bytes), image::ImageOutputFormat::Png)
            .unwrap();
        bytes
    }

    const SCENE: &str = r#"<scene>
        <matcap>/textures/matcaps/1.png</matcap>
        <model><name>Pier</name><mesh>/models/pier.obj</mesh><texture>/textures/pier.png</texture></model>
        <model><name>Fort</name><mesh>/models/fort.obj</mesh><texture>/textures/fort.png</texture></model>
    </scene>"#;

    fn store() -> AssetStore {
        let mut writer = BundleWriter::new();
        writer.add_file("textures/matcaps/1.png", png());
        writer.add_file("textures/pier.png", png());
        writer.add_file("textures/fort.png", png());
        writer.add_file("models/pier.obj", b"v 0 0 0\nv 1 0 0\nv 0 1 0\nf 1 2 3\n".to_vec());
        // fort.obj is missing on purpose.
        AssetStore::Bundle(AssetBundle::from_bytes(writer.to_bytes()).unwrap())
    }

    #[test]
    fn manager_reports_start_progress_and_load() {
        let recorder = Arc::new(Recorder::default());
        let manager = LoadingManager::new(recorder.clone());
        manager.item_start("a");
        manager.item_start("b");
        manager.item_end("a");
        assert!(!manager.is_complete());
        manager.item_error("b");
        manager.item_end("b");
        assert!(manager.is_complete());
        assert_eq!(
            *recorder.events.lock(),
            vec![
                "start a 0/1",
                "progress 1/2",
                "error b",
                "progress 2/2",
                "load"
            ]
        );
    }

    #[test]
    fn panicking_decoder_counts_as_a_failed_item() {
        let recorder = Arc::new(Recorder::default());
        let manager = LoadingManager::new(recorder.clone());
        let job = LoadJob::Mesh("/models/corrupt.glb".to_string());
        manager.item_start(job.url());

        let result = run_guarded(job.url(), || panic!("index out of bounds"));
        finish_job(&manager, &job, &result);

        let err = result.err().unwrap();
        assert!(format!("{err}").contains("index out of bounds"));
        assert!(manager.is_complete());
        let loaded = LoadedScene::collect(Scene::default(), [(job, Err(err))]);
        assert_eq!(loaded.failed, ["/models/corrupt.glb"]);
        assert_eq!(
            recorder.events.lock().last().map(String::as_str),
            Some("load")
        );
    }

    #[test]
    fn jobs_follow_scene_order() {
        let scene = Scene::from_xml(SCENE).unwrap();
        let jobs = LoadJob::for_scene(&scene);
        let urls: Vec<_> = jobs.iter().map(LoadJob::url).collect();
        assert_eq!(
            urls,
            [
                "/textures/matcaps/1.png",
                "/textures/pier.png",
                "/textures/fort.png",
                "/models/pier.obj",
                "/models/fort.obj"
            ]
        );
    }

    #[test]
    fn parallel_load_degrades_on_missing_files() {
        let scene = Scene::from_xml(SCENE).unwrap();
        let recorder = Arc::new(Recorder::default());
        let manager = LoadingManager::new(recorder.clone());
        let loaded = load_parallel(scene, &store(), &manager, LoadOptions::default());

        assert_eq!(loaded.failed, vec!["/models/fort.obj".to_string()]);
        assert!(loaded.mesh("/models/pier.obj").is_some());
        assert!(loaded.texture("/textures/fort.png").is_some());
        assert!(manager.is_complete());
        assert_eq!(manager.items_loaded(), 5);
        let events = recorder.events.lock();
        assert!(events.contains(&"error /models/fort.obj".to_string()));
        assert_eq!(events.last().unwrap(), "load");
    }

    #[test]
    fn incremental_load_runs_one_job_per_step() {
        let scene = Scene::from_xml(SCENE).unwrap();
        let manager = Arc::new(LoadingManager::new(Arc::new(LogObserver)));
        let mut load =
            IncrementalLoad::new(scene, store(), manager.clone(), LoadOptions::default());
        assert_eq!(manager.items_total(), 5);
        assert!(load.step());
        assert_eq!(manager.items_loaded(), 1);
        assert_eq!(load.remaining(), 4);
        let loaded = load.finish();
        assert!(manager.is_complete());
        assert_eq!(loaded.assets.len(), 4);
    }

    #[test]
    fn textures_are_fitted_to_the_limit() {
        let scene = Scene::from_xml(SCENE).unwrap();
        let manager = LoadingManager::new(Arc::new(LogObserver));
        let loaded = load_parallel(
            scene,
            &store(),
            &manager,
            LoadOptions {
                max_texture_size: 1,
            },
        );
        let texture = loaded.texture("/textures/pier.png").unwrap();
        assert_eq!((texture.width, texture.height), (1, 1));
    }
}
