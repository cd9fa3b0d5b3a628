//! Pointer gestures on the condensed timeline.
//!
//! A press on the timeline is either a click on a span or the start of a rectangle selection.
//! The overlay tells them apart by how far the pointer travels before it is released:
//!
//! ```text
//! Idle --down--> Pending --moved >= threshold--> Dragging --up/leave--> Idle
//!                   |                                (spans under the rectangle)
//!                   +--up--> Idle (click on the span under the press)
//! ```
//!
//! All coordinates are container-local pixels. The overlay never expands selections to
//! ancestors, that's up to the consumer.

use std::collections::BTreeSet;

use crate::timeline::{CondensedTimeline, PixelRect, TimelineGeometry};
use crate::types::SpanId;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub fn new(x: f32, y: f32) -> Point {
        Point { x, y }
    }

    /// Converts a window position into container-local coordinates.
    pub fn to_local(self, container_origin: Point) -> Point {
        Point::new(self.x - container_origin.x, self.y - container_origin.y)
    }

    pub fn distance(self, other: Point) -> f32 {
        ((self.x - other.x).powi(2) + (self.y - other.y).powi(2)).sqrt()
    }
}

/// Rectangle spanned by a drag, the end corner follows the pointer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SelectionRect {
    pub start_x: f32,
    pub start_y: f32,
    pub end_x: f32,
    pub end_y: f32,
}

impl SelectionRect {
    pub fn new(start: Point, end: Point) -> SelectionRect {
        SelectionRect {
            start_x: start.x,
            start_y: start.y,
            end_x: end.x,
            end_y: end.y,
        }
    }

    pub fn normalized(&self) -> PixelRect {
        PixelRect {
            min_x: self.start_x.min(self.end_x),
            min_y: self.start_y.min(self.end_y),
            max_x: self.start_x.max(self.end_x),
            max_y: self.start_y.max(self.end_y),
        }
    }

    /// A rectangle without any extent, i.e. the pointer came back to where it was pressed.
    pub fn is_degenerate(&self) -> bool {
        self.start_x == self.end_x && self.start_y == self.end_y
    }

    /// Strict overlap test, rectangles that only touch don't intersect.
    pub fn intersects(&self, span_rect: &PixelRect) -> bool {
        let rect = self.normalized();
        span_rect.min_x < rect.max_x
            && span_rect.max_x > rect.min_x
            && span_rect.min_y < rect.max_y
            && span_rect.max_y > rect.min_y
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum GestureState {
    Idle,
    /// The button is down but the pointer hasn't moved far enough to be a drag.
    Pending {
        origin: Point,
        /// Span under the press, a release now is a click on it.
        target: Option<SpanId>,
    },
    Dragging {
        rect: SelectionRect,
        target: Option<SpanId>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub enum SelectionOutcome {
    SingleClick(SpanId),
    SelectionComplete(BTreeSet<SpanId>),
    /// A drag that didn't touch any selectable span. The current selection stays as it is.
    EmptyDrag,
}

#[derive(Debug, Clone)]
pub struct SelectionOverlay {
    state: GestureState,
    drag_threshold: f32,
}

impl SelectionOverlay {
    pub fn new(drag_threshold: f32) -> SelectionOverlay {
        SelectionOverlay {
            state: GestureState::Idle,
            drag_threshold,
        }
    }

    pub fn state(&self) -> &GestureState {
        &self.state
    }

    pub fn is_dragging(&self) -> bool {
        matches!(self.state, GestureState::Dragging { .. })
    }

    /// The rectangle to draw while dragging.
    pub fn drag_rect(&self) -> Option<SelectionRect> {
        match &self.state {
            GestureState::Dragging { rect, .. } => Some(*rect),
            _ => None,
        }
    }

    pub fn mouse_down(
        &mut self,
        position: Point,
        timeline: &CondensedTimeline,
        geometry: &TimelineGeometry,
    ) {
        self.state = GestureState::Pending {
            origin: position,
            target: hit_test(position, timeline, geometry),
        };
    }

    pub fn mouse_move(&mut self, position: Point) {
        match &mut self.state {
            GestureState::Idle => {}
            GestureState::Pending { origin, target } => {
                if origin.distance(position) >= self.drag_threshold {
                    self.state = GestureState::Dragging {
                        rect: SelectionRect::new(*origin, position),
                        target: target.take(),
                    };
                }
            }
            GestureState::Dragging { rect, .. } => {
                rect.end_x = position.x;
                rect.end_y = position.y;
            }
        }
    }

    pub fn mouse_up(
        &mut self,
        position: Point,
        timeline: &CondensedTimeline,
        geometry: &TimelineGeometry,
    ) -> Option<SelectionOutcome> {
        self.mouse_move(position);
        self.finish(timeline, geometry)
    }

    /// The pointer left the container. A drag in progress is finalized, not dropped.
    pub fn mouse_leave(
        &mut self,
        timeline: &CondensedTimeline,
        geometry: &TimelineGeometry,
    ) -> Option<SelectionOutcome> {
        match self.state {
            GestureState::Dragging { .. } => self.finish(timeline, geometry),
            _ => {
                self.state = GestureState::Idle;
                None
            }
        }
    }

    fn finish(
        &mut self,
        timeline: &CondensedTimeline,
        geometry: &TimelineGeometry,
    ) -> Option<SelectionOutcome> {
        match std::mem::replace(&mut self.state, GestureState::Idle) {
            GestureState::Idle => None,
            GestureState::Pending { target, .. } => target.map(SelectionOutcome::SingleClick),
            GestureState::Dragging { rect, target } => {
                if rect.is_degenerate() {
                    return target.map(SelectionOutcome::SingleClick);
                }
                let selected = spans_in_rect(&rect, timeline, geometry);
                tracing::debug!(selected = selected.len(), "drag selection finished");
                if selected.is_empty() {
                    Some(SelectionOutcome::EmptyDrag)
                } else {
                    Some(SelectionOutcome::SelectionComplete(selected))
                }
            }
        }
    }
}

/// The selectable span drawn at `position`, if any. When rendered spans overlap because of the
/// minimum width, the one drawn last (on top) wins.
pub fn hit_test(
    position: Point,
    timeline: &CondensedTimeline,
    geometry: &TimelineGeometry,
) -> Option<SpanId> {
    timeline
        .spans
        .iter()
        .rev()
        .filter(|span| !span.pending)
        .find(|span| geometry.span_rect(span).contains(position.x, position.y))
        .map(|span| span.span_id.clone())
}

/// Ids of the selectable spans whose rendered rectangle overlaps `rect`.
pub fn spans_in_rect(
    rect: &SelectionRect,
    timeline: &CondensedTimeline,
    geometry: &TimelineGeometry,
) -> BTreeSet<SpanId> {
    timeline
        .spans
        .iter()
        .filter(|span| !span.pending)
        .filter(|span| rect.intersects(&geometry.span_rect(span)))
        .map(|span| span.span_id.clone())
        .collect()
}
