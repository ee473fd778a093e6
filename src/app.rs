use std::path::Path;

use eframe::egui;
use image::RgbaImage;
use tn_annotate::catalog::EXHAUSTED_TEXT;
use tn_annotate::geometry::{Bounds, Corner, Point};
use tn_annotate::measurement::{MIN_PIXEL_MM_RATIO, PIXEL_MM_RATIO_STEP};
use tn_annotate::palette::{ENDPOINT_COLOR, SEGMENT_COLOR};
use tn_annotate::session::{AnnotationSession, Hover, Mode, Persisted};
use tn_annotate::snapshot::Snapshot;
use tn_annotate::store::FileStore;
use tn_annotate::view::{self, Scene, TextMeasure};

// ── Text measurement ────────────────────────────────────────────────────────

/// Lays text out with the context's fonts, synchronously.
struct EguiText<'a>(&'a egui::Context);

impl TextMeasure for EguiText<'_> {
    fn measure(&self, text: &str, font_size: f32) -> (f32, f32) {
        let size = self.0.fonts(|f| {
            f.layout_no_wrap(
                text.to_owned(),
                egui::FontId::proportional(font_size),
                egui::Color32::WHITE,
            )
            .size()
        });
        (size.x, size.y)
    }
}

// ── App ─────────────────────────────────────────────────────────────────────

pub struct AnnotatorApp {
    session: AnnotationSession<FileStore>,
    scene: Scene,
    title: String,

    frame: Option<RgbaImage>,
    texture: Option<egui::TextureHandle>,
    image_size: (f32, f32),

    last_pointer: Option<Point>,
    status: Option<String>,

    // pan & zoom
    pan: egui::Vec2,
    zoom: f32,
    panning: bool,
}

impl AnnotatorApp {
    pub fn new(session: AnnotationSession<FileStore>, frame: RgbaImage, title: String) -> Self {
        let image_size = (frame.width() as f32, frame.height() as f32);
        Self {
            session,
            scene: Scene::new(),
            title,
            frame: Some(frame),
            texture: None,
            image_size,
            last_pointer: None,
            status: None,
            pan: egui::Vec2::ZERO,
            zoom: 1.0,
            panning: false,
        }
    }

    /// Convert image-space coords to screen-space
    fn image_to_screen(&self, canvas_rect: egui::Rect, p: Point) -> egui::Pos2 {
        let center = canvas_rect.center();
        center
            + self.pan
            + (egui::vec2(p.x, p.y) - egui::vec2(self.image_size.0, self.image_size.1) * 0.5)
                * self.zoom
    }

    /// Convert screen-space coords to image-space
    fn screen_to_image(&self, canvas_rect: egui::Rect, screen_pos: egui::Pos2) -> Point {
        let center = canvas_rect.center();
        let rel = screen_pos - center - self.pan;
        Point::new(
            rel.x / self.zoom + self.image_size.0 * 0.5,
            rel.y / self.zoom + self.image_size.1 * 0.5,
        )
    }

    fn bounds_to_screen(&self, canvas_rect: egui::Rect, b: Bounds) -> egui::Rect {
        egui::Rect::from_min_max(
            self.image_to_screen(canvas_rect, Point::new(b.x, b.y)),
            self.image_to_screen(canvas_rect, Point::new(b.right(), b.bottom())),
        )
    }

    fn ensure_texture(&mut self, ctx: &egui::Context) {
        if self.texture.is_some() {
            return;
        }
        if let Some(rgba) = self.frame.take() {
            let size = [rgba.width() as usize, rgba.height() as usize];
            let color_image = egui::ColorImage::from_rgba_unmultiplied(size, rgba.as_raw());
            self.texture = Some(ctx.load_texture("frame", color_image, egui::TextureOptions::LINEAR));
        }
    }

    fn report(&mut self, persisted: Persisted) {
        match persisted {
            Persisted::Failed => {
                self.status = self
                    .session
                    .last_error()
                    .map(|e| format!("Not saved: {e}"));
            }
            Persisted::Written => self.status = None,
            Persisted::Skipped => {}
        }
    }

    fn export_snapshot(&mut self) {
        let Some(path) = rfd::FileDialog::new()
            .add_filter("JSON", &["json"])
            .set_file_name("annotations.json")
            .save_file()
        else {
            return;
        };
        match write_snapshot(&path, &self.session.snapshot()) {
            Ok(()) => {
                tracing::info!(path = %path.display(), "snapshot exported");
                self.status = Some(format!("Exported to {}", path.display()));
            }
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "snapshot export failed");
                self.status = Some(format!("Export failed: {e}"));
            }
        }
    }

    fn controls(&mut self, ui: &mut egui::Ui) {
        ui.horizontal(|ui| {
            ui.label("Mode:");
            let mut mode = self.session.mode();
            for m in [Mode::Drawing, Mode::Measuring] {
                ui.selectable_value(&mut mode, m, m.title());
            }
            if mode != self.session.mode() {
                let persisted = self.session.set_mode(mode);
                self.report(persisted);
            }
            ui.separator();

            match self.session.mode() {
                Mode::Drawing => self.drawing_controls(ui),
                Mode::Measuring => self.measuring_controls(ui),
            }

            ui.separator();
            ui.label(format!("Zoom: {:.0}%", self.zoom * 100.0));
            if ui.button("Export…").clicked() {
                self.export_snapshot();
            }
        });
    }

    fn drawing_controls(&mut self, ui: &mut egui::Ui) {
        let catalog = self.session.catalog();
        let selected = catalog.selected().map(str::to_owned);
        let available = catalog.available().to_vec();
        let mut choice = None;

        ui.add_enabled_ui(!available.is_empty(), |ui| {
            egui::ComboBox::from_id_salt("structure")
                .selected_text(selected.as_deref().unwrap_or(EXHAUSTED_TEXT))
                .show_ui(ui, |ui| {
                    for label in &available {
                        let is_selected = selected.as_deref() == Some(label.as_str());
                        if ui.selectable_label(is_selected, label.as_str()).clicked() {
                            choice = Some(label.clone());
                        }
                    }
                });
        });
        if let Some(label) = choice {
            self.session.select_label(&label);
        }

        let clear = ui.add_enabled(self.session.can_clear_all(), egui::Button::new("Clear All"));
        if clear.clicked() {
            let persisted = self.session.clear_all();
            self.report(persisted);
        }
    }

    fn measuring_controls(&mut self, ui: &mut egui::Ui) {
        ui.label(self.session.measurement_state().status_text());
        if ui.button("Clear TN").clicked() {
            let persisted = self.session.clear_measurement();
            self.report(persisted);
        }
        ui.separator();

        ui.label("Pixel size (mm):");
        let mut ratio = self.session.measurement().pixel_mm_ratio();
        let changed = ui
            .add(
                egui::DragValue::new(&mut ratio)
                    .speed(PIXEL_MM_RATIO_STEP)
                    .range(MIN_PIXEL_MM_RATIO..=10.0)
                    .fixed_decimals(2),
            )
            .changed();
        if changed {
            let persisted = self.session.set_pixel_mm_ratio(ratio);
            self.report(persisted);
        }

        if let Some(d) = self.session.measurement().distance() {
            ui.separator();
            ui.strong(format!("TN: {:.2} mm ({:.2} px)", d.millimeters, d.pixels));
        }
    }

    fn handle_pointer(&mut self, ctx: &egui::Context, response: &egui::Response, canvas_rect: egui::Rect) {
        let (pressed, released, latest) = ctx.input(|i| {
            (
                i.pointer.primary_pressed(),
                i.pointer.primary_released(),
                i.pointer.latest_pos(),
            )
        });
        let Some(screen_pos) = latest else {
            return;
        };
        let p = self.screen_to_image(canvas_rect, screen_pos);
        let frame = PointerFrame {
            pressed,
            released,
            hovered: response.hovered(),
            panning: self.panning,
        };

        if frame.forwards_press() {
            let persisted = self.session.pointer_down(p);
            self.report(persisted);
        }

        if self.last_pointer != Some(p) && frame.forwards_move(self.session.has_active_gesture()) {
            self.session.pointer_move(p);
        }
        self.last_pointer = Some(p);

        if frame.forwards_release() {
            let persisted = self.session.pointer_up(p);
            self.report(persisted);
        }

        if frame.hovered && !frame.panning {
            ctx.set_cursor_icon(cursor_for(self.session.hover(p)));
        }
    }

    fn draw_overlays(&self, painter: &egui::Painter, canvas_rect: egui::Rect) {
        let zoom = self.zoom;
        for (_, v) in self.scene.rects() {
            let rect = self.bounds_to_screen(canvas_rect, v.outline);
            let stroke = v.stroke.to_egui();
            painter.rect_stroke(
                rect,
                0.0,
                egui::Stroke::new(view::RECT_STROKE, stroke),
                egui::StrokeKind::Middle,
            );

            let chip = self.bounds_to_screen(canvas_rect, v.chip);
            painter.rect_filled(chip, 3.0, egui::Color32::from_black_alpha(178));
            painter.text(
                self.image_to_screen(canvas_rect, v.label_pos),
                egui::Align2::LEFT_TOP,
                &v.label,
                egui::FontId::proportional(view::LABEL_FONT_SIZE * zoom),
                egui::Color32::WHITE,
            );

            if let Some(mark) = v.delete_mark {
                painter.text(
                    self.image_to_screen(canvas_rect, mark),
                    egui::Align2::CENTER_CENTER,
                    "×",
                    egui::FontId::proportional(view::DELETE_FONT_SIZE * zoom),
                    v.delete_color.to_egui(),
                );
            }
        }

        let segment_stroke = egui::Stroke::new(view::SEGMENT_STROKE, SEGMENT_COLOR.to_egui());
        if let Some((a, b)) = self.scene.segment {
            let line = [self.image_to_screen(canvas_rect, a), self.image_to_screen(canvas_rect, b)];
            painter.extend(egui::Shape::dashed_line(&line, segment_stroke, view::DASH, view::DASH));
        }
        if let Some((a, b)) = self.scene.preview {
            let line = [self.image_to_screen(canvas_rect, a), self.image_to_screen(canvas_rect, b)];
            let faded = egui::Stroke::new(view::SEGMENT_STROKE, SEGMENT_COLOR.to_egui().gamma_multiply(0.7));
            painter.extend(egui::Shape::dashed_line(&line, faded, view::DASH, view::DASH));
        }

        let cross = egui::Stroke::new(view::ENDPOINT_STROKE, ENDPOINT_COLOR.to_egui());
        let h = view::ENDPOINT_HALF_SIZE * zoom;
        for e in &self.scene.endpoints {
            let c = self.image_to_screen(canvas_rect, *e);
            painter.line_segment([c + egui::vec2(-h, -h), c + egui::vec2(h, h)], cross);
            painter.line_segment([c + egui::vec2(-h, h), c + egui::vec2(h, -h)], cross);
        }
    }
}

/// Primary-button input for one frame and which parts reach the session.
#[derive(Clone, Copy, Debug)]
struct PointerFrame {
    pressed: bool,
    released: bool,
    hovered: bool,
    panning: bool,
}

impl PointerFrame {
    fn forwards_press(self) -> bool {
        self.pressed && self.hovered && !self.panning
    }

    /// Moves go out while over the canvas or mid-drag.
    fn forwards_move(self, gesture_active: bool) -> bool {
        !self.panning && (self.hovered || gesture_active)
    }

    /// A release always ends the gesture, panning or not.
    fn forwards_release(self) -> bool {
        self.released
    }
}

fn cursor_for(hover: Hover) -> egui::CursorIcon {
    match hover {
        Hover::Crosshair => egui::CursorIcon::Crosshair,
        Hover::Move => egui::CursorIcon::Move,
        Hover::Resize(Corner::NorthWest | Corner::SouthEast) => egui::CursorIcon::ResizeNwSe,
        Hover::Resize(Corner::NorthEast | Corner::SouthWest) => egui::CursorIcon::ResizeNeSw,
        Hover::Delete => egui::CursorIcon::PointingHand,
        Hover::Grab => egui::CursorIcon::Grab,
        Hover::Unavailable => egui::CursorIcon::NotAllowed,
    }
}

fn write_snapshot(path: &Path, snapshot: &Snapshot) -> Result<(), Box<dyn std::error::Error>> {
    let data = serde_json::to_string_pretty(snapshot)?;
    std::fs::write(path, data)?;
    Ok(())
}

// ── eframe App impl ────────────────────────────────────────────────────────

impl eframe::App for AnnotatorApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        self.ensure_texture(ctx);

        if ctx.input(|i| i.modifiers.command && i.key_pressed(egui::Key::S)) {
            self.export_snapshot();
        }

        egui::TopBottomPanel::top("controls").show(ctx, |ui| {
            self.controls(ui);
        });

        egui::TopBottomPanel::bottom("status").show(ctx, |ui| {
            ui.horizontal(|ui| {
                ui.label(self.title.as_str());
                if let Some(status) = &self.status {
                    ui.separator();
                    ui.colored_label(egui::Color32::from_rgb(255, 75, 75), status.as_str());
                }
            });
        });

        egui::CentralPanel::default().show(ctx, |ui| {
            let (response, painter) =
                ui.allocate_painter(ui.available_size(), egui::Sense::click_and_drag());
            let canvas_rect = response.rect;

            painter.rect_filled(canvas_rect, 0.0, egui::Color32::from_gray(40));

            if let Some(ref tex) = self.texture {
                let img_rect = egui::Rect::from_min_max(
                    self.image_to_screen(canvas_rect, Point::new(0.0, 0.0)),
                    self.image_to_screen(canvas_rect, Point::new(self.image_size.0, self.image_size.1)),
                );
                painter.image(
                    tex.id(),
                    img_rect,
                    egui::Rect::from_min_max(egui::pos2(0.0, 0.0), egui::pos2(1.0, 1.0)),
                    egui::Color32::WHITE,
                );
            }

            // Handle pan (middle mouse button)
            let middle_down = ctx.input(|i| i.pointer.middle_down());
            if middle_down {
                let delta = ctx.input(|i| i.pointer.delta());
                self.pan += delta;
                self.panning = true;
            } else {
                self.panning = false;
            }

            // Handle zoom (scroll wheel)
            let scroll_delta = ctx.input(|i| i.smooth_scroll_delta.y);
            if scroll_delta != 0.0 && response.hovered() {
                let zoom_factor = 1.0 + scroll_delta * 0.002;
                let new_zoom = (self.zoom * zoom_factor).clamp(0.1, 10.0);
                if let Some(cursor) = response.hover_pos() {
                    let center = canvas_rect.center();
                    let cursor_rel = cursor - center - self.pan;
                    self.pan -= cursor_rel * (new_zoom / self.zoom - 1.0);
                }
                self.zoom = new_zoom;
            }

            self.handle_pointer(ctx, &response, canvas_rect);

            self.scene.sync(&self.session, &EguiText(ctx));
            self.draw_overlays(&painter, canvas_rect);
        });
    }
}
