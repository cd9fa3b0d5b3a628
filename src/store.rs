//! State container of the trace view.
//!
//! The span list and the selection are the source of truth. The tree, the path groups and the
//! condensed timeline are derived from the span list and recomputed when it changes, they are
//! never persisted. Only zoom and collapse preferences cross the persistence boundary, see
//! [`ViewState`].

use std::collections::BTreeSet;

use sha2::{Digest, Sha256};

use crate::config::ViewConfig;
use crate::paths::PathGroups;
use crate::selection::SelectionOutcome;
use crate::timeline::{compute_condensed_timeline, CondensedTimeline, TimelineGeometry, Zoom};
use crate::tree::{SpanTree, TreeRow};
use crate::types::{Span, SpanId, TimePoint};

/// Spans picked on the timeline, plus everything needed to show them in the tree.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Selection {
    /// Spans the user selected.
    pub explicit: BTreeSet<SpanId>,
    /// `explicit` and all of their ancestors.
    pub visible: BTreeSet<SpanId>,
}

impl Selection {
    pub fn is_empty(&self) -> bool {
        self.explicit.is_empty()
    }

    /// What the user is told was selected, ancestors pulled in for display don't count.
    pub fn count(&self) -> usize {
        self.explicit.len()
    }
}

/// The part of the view state that survives a restart.
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ViewState {
    pub zoom: f64,
    pub collapsed: BTreeSet<SpanId>,
}

type Fingerprint = [u8; 32];

#[derive(Debug, Clone)]
pub struct TraceViewStore {
    config: ViewConfig,

    spans: Vec<Span>,
    selected_span: Option<SpanId>,
    selection: Selection,
    zoom: Zoom,

    tree: SpanTree,
    subtree_bounds: Vec<(TimePoint, TimePoint)>,
    path_groups: PathGroups,
    layout: CondensedTimeline,
    layout_fingerprint: Option<Fingerprint>,
    /// Zoom or collapse state changed since the last `take_view_state_changed`.
    view_state_changed: bool,
}

impl TraceViewStore {
    pub fn new(config: ViewConfig) -> TraceViewStore {
        TraceViewStore {
            config,
            spans: Vec::new(),
            selected_span: None,
            selection: Selection::default(),
            zoom: Zoom::default(),
            tree: SpanTree::default(),
            subtree_bounds: Vec::new(),
            path_groups: PathGroups::default(),
            layout: CondensedTimeline::default(),
            layout_fingerprint: None,
            view_state_changed: false,
        }
    }

    pub fn config(&self) -> &ViewConfig {
        &self.config
    }

    /// Replaces the span list. Derived state is rebuilt, the timeline layout only if something
    /// it depends on changed. Selections of spans that are gone are dropped.
    pub fn set_spans(&mut self, spans: Vec<Span>) {
        self.spans = spans;
        self.view_state_changed = false;
        self.tree = SpanTree::build(&self.spans);
        self.subtree_bounds = self.tree.subtree_bounds(&self.spans);
        self.path_groups = PathGroups::new(&self.spans);

        let fingerprint = layout_fingerprint(&self.spans);
        if self.layout_fingerprint != Some(fingerprint) {
            self.layout = compute_condensed_timeline(&self.spans);
            self.layout_fingerprint = Some(fingerprint);
            tracing::debug!(
                spans = self.spans.len(),
                rows = self.layout.total_rows,
                "condensed timeline recomputed"
            );
        }

        if let Some(selected) = &self.selected_span {
            if self.tree.index_of(selected).is_none() {
                self.selected_span = None;
            }
        }
        if !self.selection.is_empty() {
            let previous = std::mem::take(&mut self.selection.explicit);
            self.apply_timeline_selection(previous);
        }
    }

    pub fn spans(&self) -> &[Span] {
        &self.spans
    }

    pub fn span(&self, span_id: &str) -> Option<&Span> {
        self.tree.index_of(span_id).map(|index| &self.spans[index])
    }

    pub fn tree(&self) -> &SpanTree {
        &self.tree
    }

    /// Earliest start and latest end of the subtree under each span, indexed like [`Self::spans`].
    pub fn subtree_bounds(&self) -> &[(TimePoint, TimePoint)] {
        &self.subtree_bounds
    }

    pub fn path_groups(&self) -> &PathGroups {
        &self.path_groups
    }

    pub fn layout(&self) -> &CondensedTimeline {
        &self.layout
    }

    pub fn is_empty(&self) -> bool {
        self.spans.is_empty()
    }

    /// Geometry for drawing and hit testing the condensed timeline in a container of the given
    /// width, at the current zoom.
    pub fn geometry(&self, container_width: f32) -> TimelineGeometry {
        TimelineGeometry {
            canvas_width: self.zoom.canvas_width(container_width),
            row_height: self.config.row_height,
            min_rendered_width: self.config.min_rendered_width_px,
        }
    }

    pub fn selected_span(&self) -> Option<&Span> {
        self.selected_span.as_deref().and_then(|id| self.span(id))
    }

    /// Selects a single span and expands all of its ancestors so that it is visible in the tree.
    /// Unknown and pending spans can't be selected.
    pub fn select_span_by_id(&mut self, span_id: &str) -> bool {
        let Some(index) = self.tree.index_of(span_id) else {
            tracing::warn!(span_id, "cannot select unknown span");
            return false;
        };
        if self.spans[index].pending {
            return false;
        }
        for ancestor in self.tree.ancestors(index) {
            self.expand(ancestor);
        }
        self.selected_span = Some(span_id.to_string());
        true
    }

    pub fn clear_selected_span(&mut self) {
        self.selected_span = None;
    }

    /// Sets the timeline selection. Every ancestor of a selected span becomes visible and is
    /// expanded, the count still only includes the spans that were picked.
    pub fn apply_timeline_selection(&mut self, span_ids: BTreeSet<SpanId>) {
        let mut selection = Selection::default();
        for span_id in span_ids {
            let Some(index) = self.tree.index_of(&span_id) else {
                continue;
            };
            if self.spans[index].pending {
                continue;
            }
            for ancestor in self.tree.ancestors(index) {
                self.expand(ancestor);
                selection.visible.insert(self.spans[ancestor].span_id.clone());
            }
            selection.visible.insert(span_id.clone());
            selection.explicit.insert(span_id);
        }
        self.selection = selection;
    }

    pub fn clear_selection(&mut self) {
        self.selection = Selection::default();
    }

    pub fn selection(&self) -> &Selection {
        &self.selection
    }

    pub fn selection_count(&self) -> usize {
        self.selection.count()
    }

    /// Spans the tree view should show, `None` means everything.
    pub fn visible_span_ids(&self) -> Option<&BTreeSet<SpanId>> {
        if self.selection.is_empty() {
            None
        } else {
            Some(&self.selection.visible)
        }
    }

    /// Routes the result of a timeline gesture.
    pub fn handle_selection_outcome(&mut self, outcome: SelectionOutcome) {
        match outcome {
            SelectionOutcome::SingleClick(span_id) => {
                self.select_span_by_id(&span_id);
            }
            SelectionOutcome::SelectionComplete(span_ids) => {
                self.apply_timeline_selection(span_ids);
            }
            SelectionOutcome::EmptyDrag => {}
        }
    }

    pub fn tree_rows(&self) -> Vec<TreeRow> {
        self.tree.visible_rows(&self.spans, self.visible_span_ids())
    }

    pub fn toggle_collapsed(&mut self, span_id: &str) {
        if let Some(index) = self.tree.index_of(span_id) {
            let span = &mut self.spans[index];
            span.collapsed = !span.collapsed;
            self.view_state_changed = true;
        }
    }

    pub fn set_collapsed(&mut self, span_id: &str, collapsed: bool) {
        if let Some(index) = self.tree.index_of(span_id) {
            if self.spans[index].collapsed != collapsed {
                self.spans[index].collapsed = collapsed;
                self.view_state_changed = true;
            }
        }
    }

    fn expand(&mut self, index: usize) {
        if self.spans[index].collapsed {
            self.spans[index].collapsed = false;
            self.view_state_changed = true;
        }
    }

    /// Returns whether zoom or collapse state changed since the last call and resets the flag.
    pub fn take_view_state_changed(&mut self) -> bool {
        std::mem::take(&mut self.view_state_changed)
    }

    pub fn zoom(&self) -> Zoom {
        self.zoom
    }

    /// Only rescales the canvas, the layout is left untouched.
    pub fn zoom_in(&mut self) {
        let before = self.zoom;
        self.zoom.zoom_in(&self.config.zoom);
        self.view_state_changed |= self.zoom != before;
    }

    pub fn zoom_out(&mut self) {
        let before = self.zoom;
        self.zoom.zoom_out(&self.config.zoom);
        self.view_state_changed |= self.zoom != before;
    }

    pub fn can_zoom_in(&self) -> bool {
        self.zoom.can_zoom_in(&self.config.zoom)
    }

    pub fn can_zoom_out(&self) -> bool {
        self.zoom.can_zoom_out(&self.config.zoom)
    }

    /// Identifies the loaded trace across restarts, made from the ids of its root spans.
    pub fn trace_key(&self) -> Option<String> {
        if self.tree.roots().is_empty() {
            return None;
        }
        let mut root_ids: Vec<&str> = self
            .tree
            .roots()
            .iter()
            .map(|&root| self.spans[root].span_id.as_str())
            .collect();
        root_ids.sort_unstable();
        Some(root_ids.join(","))
    }

    pub fn view_state(&self) -> ViewState {
        ViewState {
            zoom: self.zoom.factor(),
            collapsed: self
                .spans
                .iter()
                .filter(|span| span.collapsed)
                .map(|span| span.span_id.clone())
                .collect(),
        }
    }

    /// Restores persisted preferences. Collapse flags of spans that don't exist are ignored.
    pub fn restore_view_state(&mut self, state: &ViewState) {
        self.zoom = Zoom::new(state.zoom, &self.config.zoom);
        for span in &mut self.spans {
            span.collapsed = state.collapsed.contains(&span.span_id);
        }
        self.view_state_changed = false;
    }
}

/// Hash of everything the condensed timeline depends on.
fn layout_fingerprint(spans: &[Span]) -> Fingerprint {
    let mut hasher = Sha256::new();
    hasher.update((spans.len() as u64).to_le_bytes());
    for span in spans {
        hasher.update(span.span_id.as_bytes());
        hasher.update([0u8]);
        hasher.update(span.start_time.to_le_bytes());
        hasher.update(span.end_time.to_le_bytes());
        hasher.update([span.pending as u8]);
    }
    hasher.finalize().into()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn span(id: &str, parent: Option<&str>, start: f64, end: f64) -> Span {
        Span::new(id, parent.map(str::to_string), id, start, end)
    }

    #[test]
    fn collapse_flags_do_not_change_the_fingerprint() {
        let mut spans = vec![span("a", None, 0.0, 1.0), span("b", Some("a"), 0.2, 0.4)];
        let before = layout_fingerprint(&spans);
        spans[0].collapsed = true;
        assert_eq!(before, layout_fingerprint(&spans));
        spans[1].end_time = 0.5;
        assert_ne!(before, layout_fingerprint(&spans));
    }

    #[test]
    fn selection_survives_a_span_list_refresh() {
        let mut store = TraceViewStore::new(ViewConfig::default());
        store.set_spans(vec![span("a", None, 0.0, 1.0), span("b", Some("a"), 0.2, 0.4)]);
        store.apply_timeline_selection(BTreeSet::from(["b".to_string()]));

        store.set_spans(vec![
            span("a", None, 0.0, 1.0),
            span("b", Some("a"), 0.2, 0.4),
            span("c", Some("a"), 0.5, 0.6),
        ]);
        assert_eq!(store.selection_count(), 1);
        assert_eq!(store.selection().visible.len(), 2);

        store.set_spans(vec![span("a", None, 0.0, 1.0)]);
        assert!(store.selection().is_empty());
    }
}
