#![cfg(target_arch = "wasm32")]

use std::sync::Arc;

use gloo_events::EventListener;
use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;
use winit::event::{Event, WindowEvent};
use winit::event_loop::{ControlFlow, EventLoop, EventLoopWindowTarget};
use winit::platform::web::{EventLoopExtWebSys, WindowBuilderExtWebSys};
use winit::window::WindowBuilder;

use crate::app::Portfolio;
use crate::assets::{AssetBundle, AssetStore};
use crate::loading::{LoadingObserver, LogObserver};
use crate::render::Renderer;
use crate::scene::Scene;

const SCENE_FILE: &str = "scene.xml";
const LOADING_SCREEN_ID: &str = "loading-screen";
const FADE_OUT_CLASS: &str = "fade-out";
const MAX_PIXEL_RATIO: f64 = 2.0;

#[wasm_bindgen(start)]
pub fn start() {
    console_error_panic_hook::set_once();
    wasm_logger::init(wasm_logger::Config::default());
}

/// Renders the bundled scene into the canvas with id `canvas_id`.
#[wasm_bindgen]
pub async fn run(canvas_id: String, bundle_bytes: js_sys::Uint8Array) -> Result<(), JsValue> {
    let bundle = AssetBundle::from_bytes(bundle_bytes.to_vec())
        .map_err(|err| js_error("failed to read bundle", err))?;
    let store = AssetStore::Bundle(bundle);
    let xml = store
        .read_to_string(SCENE_FILE)
        .map_err(|err| js_error("failed to read scene", err))?;
    let scene = Scene::from_xml(&xml).map_err(|err| js_error("failed to parse scene", err))?;
    log::info!(
        "Loaded scene '{}' ({} models, {} markers)",
        scene.name,
        scene.models.len(),
        scene.markers.len()
    );

    let document = web_sys::window()
        .and_then(|window| window.document())
        .ok_or_else(|| JsValue::from_str("missing document"))?;
    let canvas: web_sys::HtmlCanvasElement = document
        .get_element_by_id(&canvas_id)
        .ok_or_else(|| JsValue::from_str("canvas element not found"))?
        .dyn_into()
        .map_err(|_| JsValue::from_str("element is not a canvas"))?;

    let event_loop = EventLoop::new().map_err(|err| js_error("failed to create event loop", err))?;
    let window = Arc::new(
        WindowBuilder::new()
            .with_canvas(Some(canvas))
            .with_title("Harborfront")
            .build(&event_loop)
            .map_err(|err| js_error("window error", err))?,
    );

    let renderer = Renderer::new(Arc::clone(&window))
        .await
        .map_err(|err| js_error("renderer error", err))?;
    let mut portfolio = Portfolio::incremental(renderer, scene, store, Arc::new(PageObserver));
    portfolio.set_max_pixel_ratio(MAX_PIXEL_RATIO);

    event_loop.spawn(move |event, elwt| {
        elwt.set_control_flow(ControlFlow::Poll);
        process_event(&mut portfolio, &event, elwt);
    });

    Ok(())
}

fn process_event(portfolio: &mut Portfolio, event: &Event<()>, elwt: &EventLoopWindowTarget<()>) {
    match event {
        Event::WindowEvent { event, window_id } if *window_id == portfolio.renderer().window_id() => {
            match event {
                WindowEvent::CloseRequested => elwt.exit(),
                WindowEvent::RedrawRequested => {
                    if let Err(err) = portfolio.frame(now_seconds()) {
                        log::error!("Error: {err:?}");
                        elwt.exit();
                    }
                }
                other => {
                    portfolio.handle_window_event(other);
                }
            }
        }
        Event::AboutToWait => portfolio.renderer().window().request_redraw(),
        _ => {}
    }
}

fn now_seconds() -> f64 {
    web_sys::window()
        .and_then(|window| window.performance())
        .map(|performance| performance.now() / 1000.0)
        .unwrap_or(0.0)
}

fn js_error(context: &str, err: impl std::fmt::Display) -> JsValue {
    JsValue::from_str(&format!("{context}: {err}"))
}

/// Logs progress and fades the page's loading screen out once everything
/// arrived.
struct PageObserver;

impl LoadingObserver for PageObserver {
    fn on_start(&self, url: &str, loaded: usize, total: usize) {
        LogObserver.on_start(url, loaded, total);
    }

    fn on_progress(&self, url: &str, loaded: usize, total: usize) {
        LogObserver.on_progress(url, loaded, total);
    }

    fn on_error(&self, url: &str) {
        LogObserver.on_error(url);
    }

    fn on_load(&self) {
        LogObserver.on_load();
        hide_loading_screen();
    }
}

fn hide_loading_screen() {
    let Some(element) = web_sys::window()
        .and_then(|window| window.document())
        .and_then(|document| document.get_element_by_id(LOADING_SCREEN_ID))
    else {
        return;
    };
    if let Err(err) = element.class_list().add_1(FADE_OUT_CLASS) {
        log::warn!("could not fade out the loading screen: {err:?}");
        return;
    }
    let target = element.clone();
    EventListener::once(&element, "transitionend", move |_| target.remove()).forget();
}
