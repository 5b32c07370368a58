use glam::Vec3;
use winit::event::WindowEvent;
use winit::window::Window;

use crate::debug::{DebugAction, DebugParams, FOV_RANGE, HELPER_RANGE, TIME_MODIFIER_RANGE};
use crate::render::OverlayTarget;

pub struct DebugGui {
    state: egui_winit::State,
    renderer: egui_wgpu::Renderer,
    visible: bool,
    pending: Option<egui::FullOutput>,
}

impl DebugGui {
    pub fn new(window: &Window, device: &wgpu::Device, format: wgpu::TextureFormat) -> Self {
        let context = egui::Context::default();
        let state = egui_winit::State::new(
            context,
            egui::ViewportId::ROOT,
            window,
            Some(window.scale_factor() as f32),
            None,
        );
        Self {
            state,
            renderer: egui_wgpu::Renderer::new(device, format, None, 1),
            visible: true,
            pending: None,
        }
    }

    pub fn is_visible(&self) -> bool {
        self.visible
    }

    pub fn toggle(&mut self) {
        self.visible = !self.visible;
    }

    /// Returns `true` when egui wants the event for itself.
    pub fn handle_event(&mut self, window: &Window, event: &WindowEvent) -> bool {
        let response = self.state.on_window_event(window, event);
        self.visible && response.consumed
    }

    /// Lays out the panel, writing slider changes straight into `params`.
    pub fn run(
        &mut self,
        window: &Window,
        params: &mut DebugParams,
        presets: &[String],
    ) -> Vec<DebugAction> {
        let input = self.state.take_egui_input(window);
        let visible = self.visible;
        let mut actions = Vec::new();
        let mut output = self.state.egui_ctx().run(input, |ctx| {
            if visible {
                panel(ctx, params, presets, &mut actions);
            }
        });
        let platform_output = std::mem::take(&mut output.platform_output);
        self.state.handle_platform_output(window, platform_output);
        self.pending = Some(output);
        actions
    }

    /// Paints the panel laid out by the last [`DebugGui::run`].
    pub fn paint(&mut self, target: OverlayTarget<'_>) {
        let Some(output) = self.pending.take() else {
            return;
        };
        let context = self.state.egui_ctx().clone();
        let jobs = context.tessellate(output.shapes, output.pixels_per_point);
        let screen = egui_wgpu::ScreenDescriptor {
            size_in_pixels: [target.size.width, target.size.height],
            pixels_per_point: output.pixels_per_point,
        };

        for (id, delta) in &output.textures_delta.set {
            self.renderer
                .update_texture(target.device, target.queue, *id, delta);
        }
        self.renderer
            .update_buffers(target.device, target.queue, target.encoder, &jobs, &screen);
        {
            let mut pass = target.encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("debug panel"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: target.view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Load,
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
            });
            self.renderer.render(&mut pass, &jobs, &screen);
        }
        for id in &output.textures_delta.free {
            self.renderer.free_texture(id);
        }
    }
}

fn panel(
    ctx: &egui::Context,
    params: &mut DebugParams,
    presets: &[String],
    actions: &mut Vec<DebugAction>,
) {
    egui::Window::new("Debug").default_width(260.0).show(ctx, |ui| {
        egui::CollapsingHeader::new("Cube Helper")
            .default_open(true)
            .show(ui, |ui| {
                if ui.button("placeHelper").clicked() {
                    actions.push(DebugAction::PlaceHelper);
                }
                let mut helper = params.helper();
                let mut changed = false;
                for (label, value) in [
                    ("helperx", &mut helper.x),
                    ("helpery", &mut helper.y),
                    ("helperz", &mut helper.z),
                ] {
                    changed |= ui
                        .add(
                            egui::Slider::new(value, HELPER_RANGE.bounds())
                                .step_by(HELPER_RANGE.step)
                                .text(label),
                        )
                        .changed();
                }
                if changed {
                    params.set_helper(Vec3::new(helper.x, helper.y, helper.z));
                }
            });

        egui::CollapsingHeader::new("Camera")
            .default_open(true)
            .show(ui, |ui| {
                let mut fov = params.fov();
                if ui
                    .add(
                        egui::Slider::new(&mut fov, FOV_RANGE.bounds())
                            .step_by(FOV_RANGE.step)
                            .text("fov"),
                    )
                    .changed()
                {
                    params.set_fov(fov);
                }
                for (index, name) in presets.iter().enumerate() {
                    if ui.button(format!("setCameraPosition{index} ({name})")).clicked() {
                        actions.push(DebugAction::CameraPreset(index));
                    }
                }
                if ui.button("logCamera").clicked() {
                    actions.push(DebugAction::LogCamera);
                }
            });

        egui::CollapsingHeader::new("Ocean")
            .default_open(true)
            .show(ui, |ui| {
                let mut time_modifier = params.time_modifier();
                if ui
                    .add(
                        egui::Slider::new(
                            &mut time_modifier,
                            TIME_MODIFIER_RANGE.bounds(),
                        )
                        .step_by(TIME_MODIFIER_RANGE.step)
                        .text("timeModifier"),
                    )
                    .changed()
                {
                    params.set_time_modifier(time_modifier);
                }
            });
    });
}
