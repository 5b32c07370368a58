use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use pollster::block_on;
use winit::dpi::LogicalSize;
use winit::event::{Event, WindowEvent};
use winit::event_loop::{ControlFlow, EventLoop, EventLoopWindowTarget};
use winit::window::WindowBuilder;

use harborfront::{
    assemble, load_parallel, scene_summary, AssetStore, BundleWriter, LoadOptions,
    LoadingManager, LogObserver, Portfolio, Renderer, ResourceCounter, Scene,
};

/// Interactive harbor portfolio scene.
#[derive(Debug, Parser)]
#[command(name = "harborfront", version)]
struct CliOptions {
    /// Asset directory or `.hbdl` bundle.
    source: PathBuf,
    /// Scene description, looked up on disk first and then inside SOURCE.
    #[arg(long, default_value = "scene.xml")]
    scene: String,
    /// Load and assemble the scene without a window and print a summary.
    #[arg(long)]
    summary_only: bool,
    /// Write SOURCE (a directory) into a bundle and exit.
    #[arg(long, value_name = "OUT")]
    pack: Option<PathBuf>,
    /// Hide the debug panel.
    #[arg(long)]
    no_gui: bool,
}

pub fn run() -> Result<()> {
    let options = CliOptions::parse();

    if let Some(out) = &options.pack {
        return pack(&options.source, out);
    }

    let store = AssetStore::open(&options.source)
        .with_context(|| format!("failed to open assets at {}", options.source.display()))?;
    let xml = read_scene(&store, &options.scene)?;
    let scene = Scene::from_xml(&xml)
        .with_context(|| format!("failed to parse scene {}", options.scene))?;
    println!(
        "Loaded scene '{}' from {} ({} models, {} markers)",
        scene.name,
        store.describe(),
        scene.models.len(),
        scene.markers.len()
    );

    if options.summary_only {
        run_headless(&store, scene)
    } else {
        let headless_store = store.clone();
        let headless_scene = scene.clone();
        match run_interactive(store, scene, !options.no_gui) {
            Ok(()) => Ok(()),
            Err(err) => {
                if err.downcast_ref::<WindowInitError>().is_some() {
                    eprintln!(
                        "{err}. Falling back to --summary-only mode (set DISPLAY or install X11 libs to enable rendering)."
                    );
                    run_headless(&headless_store, headless_scene)
                } else {
                    Err(err)
                }
            }
        }
    }
}

fn read_scene(store: &AssetStore, scene: &str) -> Result<String> {
    let on_disk = Path::new(scene);
    if on_disk.is_file() {
        return std::fs::read_to_string(on_disk)
            .with_context(|| format!("failed to read {}", on_disk.display()));
    }
    store
        .read_to_string(scene)
        .with_context(|| format!("scene {scene} not found on disk or in {}", store.describe()))
}

fn pack(source: &Path, out: &Path) -> Result<()> {
    if !source.is_dir() {
        return Err(anyhow!("--pack needs a directory, got {}", source.display()));
    }
    let mut writer = BundleWriter::new();
    let count = writer.add_directory(source)?;
    writer.write_to(out)?;
    println!("Packed {count} file(s) into {}", out.display());
    Ok(())
}

fn run_headless(store: &AssetStore, scene: Scene) -> Result<()> {
    let manager = LoadingManager::new(Arc::new(LogObserver));
    let loaded = load_parallel(scene, store, &manager, LoadOptions::default());
    let mut counter = ResourceCounter::default();
    let assembled = assemble(&loaded, &mut counter);
    print!("{}", scene_summary(&loaded, &assembled, &counter));
    Ok(())
}

fn run_interactive(store: AssetStore, scene: Scene, show_gui: bool) -> Result<()> {
    let default_hook = panic::take_hook();
    panic::set_hook(Box::new(|_| {}));
    let event_loop = panic::catch_unwind(AssertUnwindSafe(EventLoop::new));
    panic::set_hook(default_hook);
    let event_loop = event_loop
        .map_err(|panic| WindowInitError::from_panic("event loop", panic))?
        .map_err(|err| WindowInitError::from_error("event loop", err))?;
    let window = Arc::new(
        WindowBuilder::new()
            .with_title("Harborfront")
            .with_inner_size(LogicalSize::new(1280.0, 720.0))
            .build(&event_loop)
            .map_err(|err| WindowInitError::from_error("window", err))?,
    );

    let renderer = block_on(Renderer::new(Arc::clone(&window)))?;
    #[allow(unused_mut)]
    let mut portfolio = Portfolio::spawn(renderer, scene, store, Arc::new(LogObserver));
    #[cfg(feature = "debug-gui")]
    if !show_gui {
        portfolio.disable_gui();
    }
    #[cfg(not(feature = "debug-gui"))]
    let _ = show_gui;

    let mut app = AppState {
        portfolio,
        started: Instant::now(),
        last_error: None,
    };

    event_loop
        .run(|event, elwt| {
            elwt.set_control_flow(ControlFlow::Poll);
            if let Err(err) = app.process_event(&event, elwt) {
                app.last_error = Some(err);
                elwt.exit();
            }
        })
        .context("event loop failed")?;

    app.shutdown();

    if let Some(err) = app.last_error {
        return Err(err);
    }

    Ok(())
}

struct AppState {
    portfolio: Portfolio,
    started: Instant,
    last_error: Option<anyhow::Error>,
}

#[derive(Debug)]
struct WindowInitError {
    message: String,
}

impl WindowInitError {
    fn from_panic(stage: &str, panic: Box<dyn Any + Send>) -> Self {
        Self {
            message: format!("failed to initialize {stage}: {}", panic_message(panic)),
        }
    }

    fn from_error(stage: &str, err: impl fmt::Display) -> Self {
        Self {
            message: format!("failed to initialize {stage}: {err}"),
        }
    }
}

impl fmt::Display for WindowInitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for WindowInitError {}

fn panic_message(panic: Box<dyn Any + Send>) -> String {
    match panic.downcast::<String>() {
        Ok(msg) => *msg,
        Err(panic) => match panic.downcast::<&'static str>() {
            Ok(msg) => (*msg).to_string(),
            Err(_) => "unknown panic".into(),
        },
    }
}

impl AppState {
    fn process_event(&mut self, event: &Event<()>, elwt: &EventLoopWindowTarget<()>) -> Result<()> {
        match event {
            Event::WindowEvent { event, window_id }
                if *window_id == self.portfolio.renderer().window_id() =>
            {
                match event {
                    WindowEvent::CloseRequested => elwt.exit(),
                    WindowEvent::RedrawRequested => {
                        self.portfolio
                            .frame(self.started.elapsed().as_secs_f64())?;
                    }
                    other => {
                        self.portfolio.handle_window_event(other);
                    }
                }
            }
            Event::AboutToWait => {
                self.portfolio.renderer().window().request_redraw();
            }
            _ => {}
        }
        Ok(())
    }

    fn shutdown(&self) {
        let state = self.portfolio.state();
        let camera = &state.camera;
        println!(
            "Final camera: pos=({:.2}, {:.2}, {:.2}) fov={:.3} target=({:.2}, {:.2}, {:.2})",
            camera.position.x,
            camera.position.y,
            camera.position.z,
            camera.fov,
            state.controls.target.x,
            state.controls.target.y,
            state.controls.target.z
        );
        if let Some(water) = state.water() {
            println!("Water time: {:.3}", water.time);
        }
    }
}
