//! Condensed timeline layout.
//!
//! Every span of a trace gets a horizontal position and width, as percentages of the trace
//! duration, and a row. Rows are assigned greedily in start time order, reusing the first row
//! that is free again, which yields the minimal number of rows for interval packing.
//!
//! The layout doesn't depend on zoom. Zooming only stretches the canvas the percentages are
//! projected onto, see [`Zoom`] and [`TimelineGeometry`].

use crate::config::ZoomBounds;
use crate::task_timer::TaskTimer;
use crate::types::{format_duration, Span, SpanId, TimePoint};

/// Time range covered by the timeline.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TraceWindow {
    pub start: TimePoint,
    pub end: TimePoint,
}

impl TraceWindow {
    /// Earliest start to latest end of all non-pending spans. Pending spans have no meaningful
    /// end, they are only used when there is nothing else.
    pub fn from_spans(spans: &[Span]) -> Option<TraceWindow> {
        let complete = min_max_time(spans.iter().filter(|s| !s.pending));
        complete.or_else(|| min_max_time(spans.iter()))
    }

    pub fn duration(&self) -> TimePoint {
        self.end - self.start
    }

    /// Position of `time` as a percentage of the window, not clamped.
    pub fn percent_of(&self, time: TimePoint) -> f64 {
        let duration = self.duration();
        if duration <= 0.0 {
            return 0.0;
        }
        (time - self.start) / duration * 100.0
    }
}

fn min_max_time<'a>(spans: impl Iterator<Item = &'a Span>) -> Option<TraceWindow> {
    let mut window: Option<TraceWindow> = None;
    for span in spans {
        match &mut window {
            Some(w) => {
                w.start = w.start.min(span.start_time);
                w.end = w.end.max(span.end_time);
            }
            None => {
                window = Some(TraceWindow {
                    start: span.start_time,
                    end: span.end_time,
                })
            }
        }
    }
    window
}

#[derive(Debug, Clone, PartialEq)]
pub struct CondensedTimelineSpan {
    /// Index of the span in the slice the layout was computed from.
    pub index: usize,
    pub span_id: SpanId,
    /// Percent of the trace duration, `0 <= left <= 100`.
    pub left: f64,
    /// True width in percent, `left + width <= 100`. Can be 0, the rendering floor is applied
    /// by [`TimelineGeometry`].
    pub width: f64,
    pub row: usize,
    pub pending: bool,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct CondensedTimeline {
    /// One entry per input span, in input order.
    pub spans: Vec<CondensedTimelineSpan>,
    pub total_rows: usize,
    pub window: Option<TraceWindow>,
}

impl CondensedTimeline {
    pub fn is_empty(&self) -> bool {
        self.spans.is_empty()
    }

    /// Height of the scrollable canvas, one spare row of padding below the last one.
    pub fn content_height(&self, row_height: f32) -> f32 {
        (self.total_rows + 1) as f32 * row_height
    }

    pub fn get(&self, span_id: &str) -> Option<&CondensedTimelineSpan> {
        self.spans.iter().find(|s| s.span_id == span_id)
    }
}

/// Computes the condensed timeline for `spans`.
///
/// Pure function of the span list: the same list always gives the same rows and positions.
/// Pending spans are treated as running until the end of the window.
pub fn compute_condensed_timeline(spans: &[Span]) -> CondensedTimeline {
    let t = TaskTimer::new("condensed timeline layout");

    let Some(window) = TraceWindow::from_spans(spans) else {
        t.stop(0);
        return CondensedTimeline::default();
    };

    let intervals: Vec<(TimePoint, TimePoint)> = spans
        .iter()
        .map(|span| {
            let end = if span.pending {
                span.end_time.max(window.end)
            } else {
                span.end_time
            };
            (span.start_time, end.max(span.start_time))
        })
        .collect();

    let rows = assign_rows(&intervals);
    let total_rows = rows.iter().map(|row| row + 1).max().unwrap_or(0);

    let layout_spans = spans
        .iter()
        .zip(intervals.iter())
        .zip(rows)
        .enumerate()
        .map(|(index, ((span, &(start, end)), row))| {
            let (left, width) = normalize(&window, start, end);
            CondensedTimelineSpan {
                index,
                span_id: span.span_id.clone(),
                left,
                width,
                row,
                pending: span.pending,
            }
        })
        .collect();

    t.stop(spans.len());
    CondensedTimeline {
        spans: layout_spans,
        total_rows,
        window: Some(window),
    }
}

/// Greedy first fit over intervals sorted by start time. A row is free again for an interval
/// starting exactly when the row's last interval ends.
///
/// Returns the row of every interval, in input order.
pub fn assign_rows(intervals: &[(TimePoint, TimePoint)]) -> Vec<usize> {
    let mut order: Vec<usize> = (0..intervals.len()).collect();
    // Stable, equal start times keep the input order
    order.sort_by(|&a, &b| intervals[a].0.total_cmp(&intervals[b].0));

    let mut row_ends: Vec<TimePoint> = Vec::new();
    let mut rows = vec![0; intervals.len()];
    for i in order {
        let (start, end) = intervals[i];
        match row_ends.iter().position(|&row_end| row_end <= start) {
            Some(row) => {
                row_ends[row] = end;
                rows[i] = row;
            }
            None => {
                rows[i] = row_ends.len();
                row_ends.push(end);
            }
        }
    }
    rows
}

fn normalize(window: &TraceWindow, start: TimePoint, end: TimePoint) -> (f64, f64) {
    if window.duration() <= 0.0 {
        return (0.0, 0.0);
    }
    let left = window.percent_of(start).clamp(0.0, 100.0);
    let right = window.percent_of(end).clamp(left, 100.0);
    (left, right - left)
}

#[derive(Debug, Clone, PartialEq)]
pub struct AxisLabel {
    /// Percent of the canvas width.
    pub position: f64,
    /// Time since the start of the trace.
    pub offset: TimePoint,
    pub text: String,
}

/// Splits the window into `intervals` equal parts, one label per boundary.
/// The number of labels doesn't change with zoom.
pub fn time_axis_labels(window: &TraceWindow, intervals: usize) -> Vec<AxisLabel> {
    if intervals == 0 {
        return Vec::new();
    }
    let duration = window.duration().max(0.0);
    (0..=intervals)
        .map(|i| {
            let fraction = i as f64 / intervals as f64;
            let offset = duration * fraction;
            AxisLabel {
                position: fraction * 100.0,
                offset,
                text: format_duration(offset),
            }
        })
        .collect()
}

/// Horizontal zoom of the condensed timeline.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Zoom {
    factor: f64,
}

impl Default for Zoom {
    fn default() -> Self {
        Zoom { factor: 1.0 }
    }
}

impl Zoom {
    pub fn new(factor: f64, bounds: &ZoomBounds) -> Zoom {
        let factor = if factor.is_finite() { factor } else { 1.0 };
        Zoom {
            factor: factor.clamp(bounds.min, bounds.max),
        }
    }

    pub fn factor(&self) -> f64 {
        self.factor
    }

    pub fn zoom_in(&mut self, bounds: &ZoomBounds) {
        *self = Zoom::new(self.factor + bounds.step, bounds);
    }

    pub fn zoom_out(&mut self, bounds: &ZoomBounds) {
        *self = Zoom::new(self.factor - bounds.step, bounds);
    }

    pub fn can_zoom_in(&self, bounds: &ZoomBounds) -> bool {
        self.factor < bounds.max
    }

    pub fn can_zoom_out(&self, bounds: &ZoomBounds) -> bool {
        self.factor > bounds.min
    }

    /// Width of the canvas relative to the visible container, in percent.
    pub fn canvas_width_percent(&self) -> f64 {
        100.0 * self.factor
    }

    pub fn canvas_width(&self, container_width: f32) -> f32 {
        container_width * self.factor as f32
    }
}

/// Axis aligned rectangle in container-local pixels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PixelRect {
    pub min_x: f32,
    pub min_y: f32,
    pub max_x: f32,
    pub max_y: f32,
}

impl PixelRect {
    pub fn contains(&self, x: f32, y: f32) -> bool {
        self.min_x <= x && x < self.max_x && self.min_y <= y && y < self.max_y
    }

    pub fn width(&self) -> f32 {
        self.max_x - self.min_x
    }
}

/// Projects layout percentages onto the current canvas.
///
/// `canvas_width` must be the width the spans are drawn with at the moment of use, it changes
/// with zoom and window size.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimelineGeometry {
    pub canvas_width: f32,
    pub row_height: f32,
    pub min_rendered_width: f32,
}

impl TimelineGeometry {
    /// Rectangle of a span as drawn, including the minimum rendered width.
    pub fn span_rect(&self, span: &CondensedTimelineSpan) -> PixelRect {
        let min_x = (span.left * self.canvas_width as f64 / 100.0) as f32;
        let width = (span.width * self.canvas_width as f64 / 100.0) as f32;
        let min_y = span.row as f32 * self.row_height;
        PixelRect {
            min_x,
            min_y,
            max_x: min_x + width.max(self.min_rendered_width),
            max_y: min_y + self.row_height,
        }
    }
}
