use std::collections::BTreeSet;

use traceview::selection::SelectionOutcome;
use traceview::store::ViewState;
use traceview::compute_ancestor_chain;

use test_helpers::*;

fn ids(ids: &[&str]) -> BTreeSet<String> {
    ids.iter().map(|id| id.to_string()).collect()
}

#[test]
fn test_deep_selection_includes_all_ancestors() {
    let mut store = create_store(create_span_chain(5));
    store.apply_timeline_selection(ids(&["s5"]));

    let selection = store.selection();
    assert_eq!(selection.visible.len(), 6);
    assert_eq!(selection.visible, ids(&["root", "s1", "s2", "s3", "s4", "s5"]));
    assert_eq!(store.selection_count(), 1);
}

#[test]
fn test_every_selected_span_has_its_ancestors_visible() {
    let mut spans = create_span_chain(3);
    spans.push(create_child_span("side", "s1", 10.0, 20.0));
    spans.push(create_child_span("leaf", "side", 11.0, 12.0));
    let mut store = create_store(spans);

    store.apply_timeline_selection(ids(&["s3", "leaf"]));
    assert_eq!(store.selection_count(), 2);
    for span_id in &store.selection().explicit {
        let span = store.span(span_id).unwrap();
        for ancestor in compute_ancestor_chain(span, store.spans()) {
            assert!(store.selection().visible.contains(&ancestor));
        }
    }
}

#[test]
fn test_selection_expands_collapsed_ancestors() {
    let mut store = create_store(create_span_chain(3));
    store.set_collapsed("root", true);
    store.set_collapsed("s1", true);
    assert_eq!(store.tree_rows().len(), 1);

    store.apply_timeline_selection(ids(&["s2"]));
    assert!(!store.span("root").unwrap().collapsed);
    assert!(!store.span("s1").unwrap().collapsed);

    // Only the selected span and its ancestors are listed
    let rows: Vec<&str> = store
        .tree_rows()
        .iter()
        .map(|row| store.spans()[row.index].span_id.as_str())
        .collect();
    assert_eq!(rows, vec!["root", "s1", "s2"]);
}

#[test]
fn test_select_span_by_id_reveals_the_span() {
    let mut store = create_store(create_span_chain(4));
    store.set_collapsed("s1", true);

    assert!(store.select_span_by_id("s4"));
    assert_eq!(store.selected_span().unwrap().span_id, "s4");
    assert!(!store.span("s1").unwrap().collapsed);
    assert_eq!(store.tree_rows().len(), 5);

    assert!(!store.select_span_by_id("missing"));
    assert_eq!(store.selected_span().unwrap().span_id, "s4");
}

#[test]
fn test_pending_spans_cannot_be_selected() {
    let mut spans = create_span_chain(1);
    spans.push(create_pending_span("running", Some("s1"), 5.0));
    let mut store = create_store(spans);

    assert!(!store.select_span_by_id("running"));
    store.apply_timeline_selection(ids(&["running"]));
    assert!(store.selection().is_empty());
    // Still shown in the tree
    assert_eq!(store.tree_rows().len(), 3);
}

#[test]
fn test_gesture_outcomes_update_the_store() {
    let mut store = create_store(create_span_chain(2));

    store.handle_selection_outcome(SelectionOutcome::SingleClick("s1".to_string()));
    assert_eq!(store.selected_span().unwrap().span_id, "s1");
    assert!(store.selection().is_empty());

    store.handle_selection_outcome(SelectionOutcome::SelectionComplete(ids(&["s2"])));
    assert_eq!(store.selection_count(), 1);

    // An empty drag keeps what was selected before
    store.handle_selection_outcome(SelectionOutcome::EmptyDrag);
    assert_eq!(store.selection_count(), 1);

    store.clear_selection();
    assert!(store.visible_span_ids().is_none());
    assert_eq!(store.tree_rows().len(), 3);
}

#[test]
fn test_cyclic_parents_do_not_hang() {
    let spans = vec![
        create_child_span("a", "b", 0.0, 1.0),
        create_child_span("b", "a", 0.5, 2.0),
        create_root_span("c", 0.0, 3.0),
    ];
    assert_eq!(compute_ancestor_chain(&spans[0], &spans), vec!["b".to_string()]);

    let mut store = create_store(spans);
    assert_eq!(store.tree_rows().len(), 3);
    store.apply_timeline_selection(ids(&["a", "b"]));
    assert_eq!(store.selection_count(), 2);
    assert_eq!(store.layout().spans.len(), 3);
}

#[test]
fn test_self_parent_has_no_ancestors() {
    let span = create_child_span("a", "a", 0.0, 1.0);
    assert!(compute_ancestor_chain(&span, std::slice::from_ref(&span)).is_empty());
}

#[test]
fn test_dangling_parent_is_a_root() {
    let spans = vec![
        create_child_span("orphan", "gone", 0.0, 1.0),
        create_root_span("root", 0.0, 2.0),
    ];
    assert!(compute_ancestor_chain(&spans[0], &spans).is_empty());
    let store = create_store(spans);
    assert_eq!(store.tree().roots().len(), 2);
}

#[test]
fn test_view_state_round_trip() {
    let mut store = create_store(create_span_chain(2));
    store.zoom_in();
    store.toggle_collapsed("s1");
    let state = store.view_state();
    assert_eq!(
        state,
        ViewState {
            zoom: 1.5,
            collapsed: ids(&["s1"]),
        }
    );

    let mut other = create_store(create_span_chain(2));
    other.restore_view_state(&state);
    assert_eq!(other.zoom().factor(), 1.5);
    assert!(other.span("s1").unwrap().collapsed);
    assert_eq!(other.trace_key(), Some("root".to_string()));
}

#[test]
fn test_zoom_out_of_range_is_clamped() {
    let mut store = create_store(create_span_chain(1));
    store.restore_view_state(&ViewState {
        zoom: 40.0,
        collapsed: BTreeSet::new(),
    });
    assert_eq!(store.zoom().factor(), 5.0);
    assert!(!store.can_zoom_in());
    assert!(store.can_zoom_out());
}

#[test]
fn test_repeated_paths_are_grouped() {
    let mut spans = vec![create_root_span("agent", 0.0, 10.0)];
    for i in 0..3 {
        let mut step = create_child_span(&format!("step-{i}"), "agent", i as f64, i as f64 + 1.5);
        step.name = "step".to_string();
        step.path = vec!["agent".to_string(), "step".to_string()];
        spans.push(step);
    }
    let store = create_store(spans);

    let key = vec!["agent".to_string(), "step".to_string()];
    let group = store.path_groups().get(&key).unwrap();
    assert_eq!(group.len(), 3);
    assert_eq!(group.display_name(), "step (×3)");
    // [0, 1.5] [1, 2.5] [2, 3.5] merge into one segment
    assert_eq!(group.active_segments, vec![(0.0, 3.5)]);
    assert_eq!(store.path_groups().repeated().count(), 1);
}

#[test]
fn test_expanding_ancestors_marks_view_state_changed() {
    let mut store = create_store(create_span_chain(3));
    store.set_collapsed("s1", true);
    assert!(store.take_view_state_changed());
    assert!(!store.take_view_state_changed());

    // Nothing to expand, nothing to save
    store.select_span_by_id("s1");
    assert!(!store.take_view_state_changed());

    store.select_span_by_id("s3");
    assert!(store.take_view_state_changed());
    assert!(store.view_state().collapsed.is_empty());

    store.set_collapsed("s2", true);
    store.take_view_state_changed();
    store.handle_selection_outcome(SelectionOutcome::SelectionComplete(ids(&["s3"])));
    assert!(store.take_view_state_changed());

    store.zoom_in();
    assert!(store.take_view_state_changed());
    store.restore_view_state(&ViewState {
        zoom: 1.0,
        collapsed: ids(&["s1"]),
    });
    assert!(!store.take_view_state_changed());
}

#[test]
fn test_dotted_names_are_not_split_into_segments() {
    let mut spans = vec![create_root_span("agent", 0.0, 10.0)];
    for i in 0..3 {
        let mut call = create_child_span(&format!("call-{i}"), "agent", i as f64, i as f64 + 0.5);
        call.name = "openai.chat".to_string();
        call.path = vec!["agent".to_string(), "openai.chat".to_string()];
        spans.push(call);
    }
    let store = create_store(spans);

    let group = store.path_groups().group_of(&store.spans()[1]).unwrap();
    assert_eq!(group.display_name(), "openai.chat (×3)");
}
