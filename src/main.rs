use std::path::{Path, PathBuf};

use anyhow::Result;
use eframe::egui::{
    self, Align2, Button, FontId, Key, Label, Pos2, Rect, RichText, ScrollArea, Sense, Stroke, Ui,
    Vec2,
};
use eframe::epaint::PathShape;
use tracing_subscriber::EnvFilter;

use traceview::{
    colors, loader, persistent, selection, store, synthetic, task_timer, timeline, types,
};

use persistent::{PersistentData, PersistentStorage};
use selection::{hit_test, Point, SelectionOverlay};
use store::TraceViewStore;
use task_timer::TaskTimer;
use timeline::{time_axis_labels, TimelineGeometry};
use traceview::ViewConfig;
use types::{
    format_duration, time_point_to_utc_string, value_to_text, Span, MILLISECONDS_PER_SECOND,
};

const DEMO_SEED: u64 = 2024;

fn main() -> eframe::Result {
    init_logging();
    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default().with_inner_size([1280.0, 800.0]),
        ..Default::default()
    };
    eframe::run_native(
        "traceview",
        options,
        Box::new(|_cc| Ok(Box::<App>::default())),
    )
}

fn init_logging() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("traceview=info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

struct Layout {
    timeline_height: f32,
    axis_height: f32,
    tree_row_height: f32,
    tree_indent: f32,
    subtree_bar_width: f32,
    details_width: f32,
}

struct App {
    layout: Layout,
    store: TraceViewStore,
    overlay: SelectionOverlay,

    storage: Option<PersistentStorage>,
    persistent_data: PersistentData,

    status_message: Option<String>,
}

impl Default for App {
    fn default() -> Self {
        let config = ViewConfig::load_default_location().unwrap_or_else(|err| {
            tracing::warn!("Failed to load config: {err:#}, using defaults");
            ViewConfig::default()
        });

        let storage = match PersistentStorage::default_location() {
            Ok(storage) => Some(storage),
            Err(err) => {
                tracing::warn!("Persistent data disabled: {err}");
                None
            }
        };

        let mut res = Self {
            layout: Layout {
                timeline_height: 180.0,
                axis_height: 18.0,
                tree_row_height: 20.0,
                tree_indent: 16.0,
                subtree_bar_width: 120.0,
                details_width: 360.0,
            },
            overlay: SelectionOverlay::new(config.drag_threshold_px),
            store: TraceViewStore::new(config),
            storage,
            persistent_data: PersistentData::default(),
            status_message: None,
        };
        res.load_persistent_data();

        // The first argument is either a trace file or --demo
        if let Some(first_arg) = std::env::args().nth(1) {
            if first_arg == "--demo" {
                res.show_spans(synthetic::demo_trace(DEMO_SEED));
            } else {
                tracing::info!("Trying to open file: {first_arg}");
                if let Err(err) = res.load_file(&PathBuf::from(first_arg)) {
                    tracing::error!("Error loading file: {err:#}");
                    res.status_message = Some(format!("{err:#}"));
                }
            }
        }

        res
    }
}

impl eframe::App for App {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        ctx.style_mut(|s| {
            s.interaction.tooltip_delay = 0.0;
            s.interaction.show_tooltips_only_when_still = false;
        });

        egui::TopBottomPanel::top("top bar").show(ctx, |ui| self.draw_top_bar(ui));

        if self.store.is_empty() {
            egui::CentralPanel::default().show(ctx, |ui| {
                ui.centered_and_justified(|ui| {
                    ui.add(Label::new("No spans to display. Open a trace file to begin."));
                });
            });
            return;
        }

        egui::TopBottomPanel::top("condensed timeline")
            .resizable(true)
            .default_height(self.layout.timeline_height)
            .show(ctx, |ui| self.draw_condensed_timeline(ui, ctx));

        if self.store.selected_span().is_some() {
            egui::SidePanel::right("span details")
                .default_width(self.layout.details_width)
                .show(ctx, |ui| self.draw_span_details(ui));
        }

        egui::CentralPanel::default().show(ctx, |ui| self.draw_tree(ui));

        // Covers toggles as well as ancestors expanded by a selection
        if self.store.take_view_state_changed() {
            self.save_persistent_data();
        }

        ctx.input(|i| {
            if i.key_pressed(Key::Escape) {
                self.store.clear_selected_span();
            }
        });

        // If Ctrl+Q clicked, quit the app
        if ctx.input(|i| i.key_down(Key::Q) && i.modifiers.ctrl) {
            ctx.send_viewport_cmd(egui::ViewportCommand::Close);
        }
    }
}

impl App {
    fn draw_top_bar(&mut self, ui: &mut Ui) {
        ui.horizontal(|ui| {
            if ui.button("Open file").clicked() {
                if let Some(path) = rfd::FileDialog::new().pick_file() {
                    tracing::info!("Loading file: {}", path.display());
                    match self.load_file(&path) {
                        Ok(()) => self.status_message = None,
                        Err(err) => {
                            tracing::error!("Error loading file: {err:#}");
                            self.status_message = Some(format!("{err:#}"));
                        }
                    }
                }
            }
            if ui.button("Demo trace").clicked() {
                self.show_spans(synthetic::demo_trace(DEMO_SEED));
            }

            ui.separator();

            let has_spans = !self.store.is_empty();
            if ui
                .add_enabled(has_spans && self.store.can_zoom_out(), Button::new("-"))
                .clicked()
            {
                self.store.zoom_out();
            }
            ui.label(format!(
                "{:.0}%",
                self.store.zoom().canvas_width_percent()
            ));
            if ui
                .add_enabled(has_spans && self.store.can_zoom_in(), Button::new("+"))
                .clicked()
            {
                self.store.zoom_in();
            }

            ui.separator();

            let selection_count = self.store.selection_count();
            if ui
                .add_enabled(selection_count > 0, Button::new("Clear selection"))
                .clicked()
            {
                self.store.clear_selection();
            }
            if selection_count > 0 {
                ui.label(format!("{selection_count} selected"));
            }

            if let Some(message) = &self.status_message {
                ui.with_layout(
                    egui::Layout::right_to_left(eframe::emath::Align::RIGHT),
                    |ui| {
                        ui.colored_label(colors::MILD_RED, message);
                    },
                );
            }
        });
    }

    fn load_file(&mut self, path: &Path) -> Result<()> {
        let spans = loader::load_trace_file(path)?;
        tracing::info!("Loaded {} spans from {}", spans.len(), path.display());
        self.show_spans(spans);
        Ok(())
    }

    fn show_spans(&mut self, spans: Vec<Span>) {
        self.store.clear_selection();
        self.store.clear_selected_span();
        self.store.set_spans(spans);
        if let Some(key) = self.store.trace_key() {
            if let Some(state) = self.persistent_data.view_state(&key) {
                self.store.restore_view_state(&state);
            }
        }
    }

    fn draw_condensed_timeline(&mut self, ui: &mut Ui, ctx: &egui::Context) {
        let container_width = ui.available_width();
        let geometry = self.store.geometry(container_width);
        let content_height = self.store.layout().content_height(geometry.row_height);

        ScrollArea::both()
            .id_salt("condensed timeline scroll")
            .auto_shrink([false, false])
            .drag_to_scroll(false)
            .show(ui, |ui| {
                let (canvas, response) = ui.allocate_exact_size(
                    Vec2::new(
                        geometry.canvas_width,
                        self.layout.axis_height + content_height,
                    ),
                    Sense::click_and_drag(),
                );
                let visible_canvas = canvas.intersect(ui.clip_rect());
                let spans_origin = Pos2::new(canvas.min.x, canvas.min.y + self.layout.axis_height);

                self.draw_time_axis(ui, canvas, &geometry);
                self.draw_condensed_spans(ui, spans_origin, visible_canvas, &geometry);
                self.handle_timeline_pointer(ctx, spans_origin, visible_canvas, &geometry);

                if let Some(hover_pos) = response.hover_pos() {
                    if !self.overlay.is_dragging() {
                        let local = to_local(hover_pos, spans_origin);
                        if let Some(span_id) = hit_test(local, self.store.layout(), &geometry) {
                            if let Some(span) = self.store.span(&span_id) {
                                response.on_hover_ui_at_pointer(|ui| span_tooltip(ui, span));
                            }
                        }
                    }
                }
            });
    }

    fn draw_time_axis(&self, ui: &mut Ui, canvas: Rect, geometry: &TimelineGeometry) {
        let Some(window) = self.store.layout().window else {
            return;
        };
        let labels = time_axis_labels(&window, self.store.config().axis_intervals);
        let last = labels.len().saturating_sub(1);
        for (i, label) in labels.iter().enumerate() {
            let x = canvas.min.x + (label.position as f32 / 100.0) * geometry.canvas_width;
            ui.painter().line_segment(
                [Pos2::new(x, canvas.min.y), Pos2::new(x, canvas.max.y)],
                Stroke::new(1.0, colors::GRAY_50),
            );
            let align = if i == 0 {
                Align2::LEFT_TOP
            } else if i == last {
                Align2::RIGHT_TOP
            } else {
                Align2::CENTER_TOP
            };
            ui.painter().text(
                Pos2::new(x, canvas.min.y + 2.0),
                align,
                &label.text,
                FontId::monospace(10.0),
                colors::GRAY_180,
            );
        }
    }

    fn draw_condensed_spans(
        &self,
        ui: &mut Ui,
        origin: Pos2,
        visible: Rect,
        geometry: &TimelineGeometry,
    ) {
        let selection = self.store.selection();
        let selected_span_id = self.store.selected_span().map(|s| s.span_id.as_str());
        let spans = self.store.spans();

        for laid_out in &self.store.layout().spans {
            let pixel_rect = geometry.span_rect(laid_out);
            let rect = Rect::from_min_max(
                Pos2::new(origin.x + pixel_rect.min_x, origin.y + pixel_rect.min_y),
                Pos2::new(origin.x + pixel_rect.max_x, origin.y + pixel_rect.max_y - 1.0),
            );
            if !rect.intersects(visible) {
                continue;
            }

            let span = &spans[laid_out.index];
            ui.painter().rect_filled(rect, 0.0, colors::span_fill(span));

            let is_selected = selection.explicit.contains(&span.span_id)
                || selected_span_id == Some(span.span_id.as_str());
            if is_selected {
                let points = vec![
                    rect.min,
                    Pos2::new(rect.max.x, rect.min.y),
                    rect.max,
                    Pos2::new(rect.min.x, rect.max.y),
                ];
                ui.painter()
                    .add(PathShape::closed_line(points, Stroke::new(1.5, colors::WHITE)));
            }
        }

        if let Some(drag_rect) = self.overlay.drag_rect() {
            let normalized = drag_rect.normalized();
            let rect = Rect::from_min_max(
                Pos2::new(origin.x + normalized.min_x, origin.y + normalized.min_y),
                Pos2::new(origin.x + normalized.max_x, origin.y + normalized.max_y),
            );
            ui.painter().rect_filled(rect, 0.0, colors::selection_fill());
            let points = vec![
                rect.min,
                Pos2::new(rect.max.x, rect.min.y),
                rect.max,
                Pos2::new(rect.min.x, rect.max.y),
            ];
            ui.painter()
                .add(PathShape::closed_line(points, Stroke::new(1.0, colors::INTENSE_BLUE2)));
        }
    }

    /// Feeds raw pointer events into the gesture state machine. Egui's own drag detection isn't
    /// used, the overlay decides what is a click and what is a drag.
    fn handle_timeline_pointer(
        &mut self,
        ctx: &egui::Context,
        origin: Pos2,
        visible: Rect,
        geometry: &TimelineGeometry,
    ) {
        let (pressed, released, latest_pos) = ctx.input(|i| {
            (
                i.pointer.primary_pressed(),
                i.pointer.primary_released(),
                i.pointer.latest_pos(),
            )
        });
        let Some(pos) = latest_pos else {
            return;
        };
        let inside = visible.contains(pos);
        let local = to_local(pos, origin);

        if pressed && inside {
            self.overlay.mouse_down(local, self.store.layout(), geometry);
        }
        let outcome = if released {
            self.overlay.mouse_up(local, self.store.layout(), geometry)
        } else if !inside {
            self.overlay.mouse_leave(self.store.layout(), geometry)
        } else {
            self.overlay.mouse_move(local);
            None
        };

        if let Some(outcome) = outcome {
            tracing::debug!(?outcome, "timeline gesture finished");
            self.store.handle_selection_outcome(outcome);
        }
    }

    fn draw_tree(&mut self, ui: &mut Ui) {
        let t = TaskTimer::new("tree rows");
        let rows = self.store.tree_rows();
        t.stop(rows.len());

        let selected_span_id = self.store.selected_span().map(|s| s.span_id.clone());
        let mut clicked: Option<String> = None;
        let mut toggled: Option<String> = None;

        ScrollArea::vertical()
            .id_salt("span tree scroll")
            .auto_shrink([false, false])
            .show_rows(ui, self.layout.tree_row_height, rows.len(), |ui, row_range| {
                for row in &rows[row_range] {
                    let span = &self.store.spans()[row.index];
                    ui.horizontal(|ui| {
                        ui.add_space(row.depth as f32 * self.layout.tree_indent);
                        if row.has_children {
                            let arrow = if span.collapsed { "▶" } else { "▼" };
                            if ui.add(Button::new(arrow).small().frame(false)).clicked() {
                                toggled = Some(span.span_id.clone());
                            }
                        } else {
                            ui.add_space(self.layout.tree_indent);
                        }

                        let mut name = match self.store.path_groups().group_of(span) {
                            Some(group) if group.is_repeated() => group.display_name(),
                            _ => span.name.clone(),
                        };
                        if span.pending {
                            name.push_str(" (pending)");
                        }
                        let mut text = RichText::new(name)
                            .color(colors::span_type_color(span.span_type));
                        if span.is_error() {
                            text = text.color(colors::INTENSE_RED);
                        }
                        if span.pending {
                            text = text.weak().italics();
                        }

                        let is_selected = selected_span_id.as_deref() == Some(&span.span_id);
                        let label = ui.add_enabled(
                            !span.pending,
                            egui::SelectableLabel::new(is_selected, text),
                        );
                        if label.clicked() {
                            clicked = Some(span.span_id.clone());
                        }
                        ui.label(
                            RichText::new(format_duration(span.duration()))
                                .color(colors::GRAY_120)
                                .monospace(),
                        );
                        self.draw_subtree_bar(ui, row.index);
                    });
                }
            });

        if let Some(span_id) = toggled {
            self.store.toggle_collapsed(&span_id);
        }
        if let Some(span_id) = clicked {
            self.store.select_span_by_id(&span_id);
        }
    }

    /// Small bar showing where the span and everything below it ran within the trace.
    fn draw_subtree_bar(&self, ui: &mut Ui, index: usize) {
        let (rect, _) = ui.allocate_exact_size(
            Vec2::new(self.layout.subtree_bar_width, self.layout.tree_row_height * 0.4),
            Sense::hover(),
        );
        ui.painter().rect_filled(rect, 0.0, colors::GRAY_50);

        let Some(window) = self.store.layout().window else {
            return;
        };
        let span = &self.store.spans()[index];
        let (subtree_start, subtree_end) = self.store.subtree_bounds()[index];
        let to_x = |time| {
            let percent = window.percent_of(time).clamp(0.0, 100.0) as f32;
            rect.min.x + percent / 100.0 * rect.width()
        };

        let subtree = Rect::from_min_max(
            Pos2::new(to_x(subtree_start), rect.min.y),
            Pos2::new(to_x(subtree_end).max(to_x(subtree_start) + 1.0), rect.max.y),
        );
        ui.painter()
            .rect_filled(subtree, 0.0, colors::span_fill(span).gamma_multiply(0.4));
        let own = Rect::from_min_max(
            Pos2::new(to_x(span.start_time), rect.min.y),
            Pos2::new(to_x(span.end_time).max(to_x(span.start_time) + 1.0), rect.max.y),
        );
        ui.painter().rect_filled(own, 0.0, colors::span_fill(span));
    }

    fn draw_span_details(&mut self, ui: &mut Ui) {
        let Some(span) = self.store.selected_span() else {
            return;
        };
        let mut close = false;

        ui.horizontal(|ui| {
            ui.heading(&span.name);
            ui.with_layout(
                egui::Layout::right_to_left(eframe::emath::Align::Center),
                |ui| close = ui.button("Close").clicked(),
            );
        });
        ui.separator();
        ui.label(format!("type: {}", span.span_type.label()));
        if span.is_error() {
            ui.colored_label(colors::INTENSE_RED, "status: ERROR");
        }
        ui.label(format!(
            "{:.3} ms",
            span.duration() * MILLISECONDS_PER_SECOND
        ));
        ui.label(format!(
            "{} - {}",
            time_point_to_utc_string(span.start_time),
            time_point_to_utc_string(span.end_time)
        ));
        ui.label(format!("span_id: {}", span.span_id));
        if let Some(parent) = &span.parent_span_id {
            ui.label(format!("parent_span_id: {parent}"));
        }
        ui.label(format!("path: {}", span.path_key().join(" > ")));

        if let Some(group) = self.store.path_groups().group_of(span) {
            if group.is_repeated() {
                ui.label(format!(
                    "{} spans share this path, active for {}",
                    group.len(),
                    format_duration(group.active_duration())
                ));
            }
        }

        ui.separator();
        ScrollArea::vertical()
            .id_salt("span attributes")
            .show(ui, |ui| {
                for (name, value) in &span.attributes {
                    ui.label(format!("{}: {}", name, value_to_text(value)));
                }
            });

        if close {
            self.store.clear_selected_span();
        }
    }

    fn load_persistent_data(&mut self) {
        let Some(storage) = &self.storage else {
            return;
        };
        match storage.load() {
            Ok(data) => self.persistent_data = data,
            Err(err) => tracing::error!("Failed to load persistent data: {err}"),
        }
    }

    fn save_persistent_data(&mut self) {
        let Some(key) = self.store.trace_key() else {
            return;
        };
        self.persistent_data.remember(&key, self.store.view_state());
        let Some(storage) = &self.storage else {
            return;
        };
        if let Err(err) = storage.save(&self.persistent_data) {
            tracing::error!("Failed to save persistent data: {err}");
        }
    }
}

fn to_local(pos: Pos2, origin: Pos2) -> Point {
    Point::new(pos.x, pos.y).to_local(Point::new(origin.x, origin.y))
}

fn span_tooltip(ui: &mut Ui, span: &Span) {
    ui.label(span.name.clone());
    ui.separator();
    ui.label(format!(
        "{:.3} ms",
        span.duration() * MILLISECONDS_PER_SECOND
    ));
    ui.label(format!(
        "{} - {}",
        time_point_to_utc_string(span.start_time),
        time_point_to_utc_string(span.end_time)
    ));
    ui.label(format!("type: {}", span.span_type.label()));
    if span.is_error() {
        ui.colored_label(colors::INTENSE_RED, "ERROR");
    }
}
