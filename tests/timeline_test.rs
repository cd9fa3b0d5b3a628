use approx::assert_abs_diff_eq;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha20Rng;

use traceview::timeline::{compute_condensed_timeline, time_axis_labels, CondensedTimeline};
use traceview::types::{Span, TimePoint};

use test_helpers::*;

/// Largest number of spans running at the same instant, intervals are half open.
fn max_overlap(spans: &[Span]) -> usize {
    let mut events: Vec<(TimePoint, i32)> = Vec::new();
    for span in spans {
        events.push((span.start_time, 1));
        events.push((span.end_time, -1));
    }
    // Ends before starts at the same time
    events.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));
    let mut current = 0;
    let mut max = 0;
    for (_, delta) in events {
        current += delta;
        max = max.max(current);
    }
    max as usize
}

fn assert_no_overlap_within_rows(spans: &[Span], layout: &CondensedTimeline) {
    for a in &layout.spans {
        for b in &layout.spans {
            if a.index >= b.index || a.row != b.row {
                continue;
            }
            let (sa, sb) = (&spans[a.index], &spans[b.index]);
            let overlapping = sa.start_time < sb.end_time && sb.start_time < sa.end_time;
            assert!(
                !overlapping,
                "{} [{}, {}) and {} [{}, {}) share row {}",
                sa.span_id,
                sa.start_time,
                sa.end_time,
                sb.span_id,
                sb.start_time,
                sb.end_time,
                a.row
            );
        }
    }
}

#[test]
fn test_reference_scenario() {
    let spans = vec![
        create_root_span("a", 0.0, 10.0),
        create_root_span("b", 5.0, 15.0),
        create_root_span("c", 12.0, 20.0),
    ];
    let layout = compute_condensed_timeline(&spans);

    let rows: Vec<usize> = layout.spans.iter().map(|s| s.row).collect();
    assert_eq!(rows, vec![0, 1, 0]);
    assert_eq!(layout.total_rows, 2);

    assert_abs_diff_eq!(layout.spans[0].left, 0.0);
    assert_abs_diff_eq!(layout.spans[0].width, 50.0);
    assert_abs_diff_eq!(layout.spans[1].left, 25.0);
    assert_abs_diff_eq!(layout.spans[2].left, 60.0);
    assert_abs_diff_eq!(layout.spans[2].width, 40.0);
}

#[test]
fn test_random_packing_is_valid_and_minimal() {
    let mut rng = ChaCha20Rng::seed_from_u64(0);
    for _ in 0..200 {
        let count = rng.random_range(1..60);
        let spans = create_random_spans(&mut rng, count);
        let layout = compute_condensed_timeline(&spans);

        assert_eq!(layout.spans.len(), spans.len());
        assert_no_overlap_within_rows(&spans, &layout);
        assert_eq!(layout.total_rows, max_overlap(&spans));
    }
}

#[test]
fn test_layout_is_deterministic() {
    let mut rng = ChaCha20Rng::seed_from_u64(1);
    let spans = create_random_spans(&mut rng, 100);
    let first = compute_condensed_timeline(&spans);
    let second = compute_condensed_timeline(&spans.clone());
    assert_eq!(first, second);
}

#[test]
fn test_positions_stay_within_bounds() {
    let mut rng = ChaCha20Rng::seed_from_u64(2);
    let mut spans = create_random_spans(&mut rng, 80);
    spans.push(create_pending_span("pending", None, 50.0));
    let layout = compute_condensed_timeline(&spans);

    for span in &layout.spans {
        assert!(span.left >= 0.0 && span.left <= 100.0, "left {}", span.left);
        assert!(span.width >= 0.0);
        assert!(span.left + span.width <= 100.0 + 1e-9);
    }
}

#[test]
fn test_pending_spans_run_to_the_end_of_the_trace() {
    let spans = vec![
        create_root_span("root", 0.0, 10.0),
        create_pending_span("running", Some("root"), 6.0),
        create_child_span("late", "root", 8.0, 9.0),
    ];
    let layout = compute_condensed_timeline(&spans);

    let running = layout.get("running").unwrap();
    assert!(running.pending);
    assert_abs_diff_eq!(running.left, 60.0);
    assert_abs_diff_eq!(running.width, 40.0);
    // The pending span still blocks its row
    assert_ne!(layout.get("late").unwrap().row, running.row);
}

#[test]
fn test_only_pending_spans_still_render() {
    let spans = vec![create_pending_span("a", None, 3.0), create_pending_span("b", None, 3.0)];
    let layout = compute_condensed_timeline(&spans);
    assert_eq!(layout.spans.len(), 2);
    for span in &layout.spans {
        assert_eq!((span.left, span.width), (0.0, 0.0));
    }
}

#[test]
fn test_empty_input_has_no_layout() {
    let layout = compute_condensed_timeline(&[]);
    assert!(layout.is_empty());
    assert_eq!(layout.total_rows, 0);
    assert!(layout.window.is_none());
}

#[test]
fn test_zoom_does_not_change_the_layout() {
    let mut store = create_store(create_span_chain(3));
    let before = store.layout().clone();
    let narrow = store.geometry(500.0);

    store.zoom_in();
    store.zoom_in();
    assert_eq!(store.layout(), &before);

    let wide = store.geometry(500.0);
    assert_abs_diff_eq!(wide.canvas_width, narrow.canvas_width * 2.0);
    for span in &before.spans {
        let (a, b) = (narrow.span_rect(span), wide.span_rect(span));
        assert_abs_diff_eq!(b.min_x, a.min_x * 2.0, epsilon = 1e-3);
        assert_eq!(a.min_y, b.min_y);
    }
}

#[test]
fn test_axis_labels() {
    let spans = vec![create_root_span("a", 100.0, 102.0)];
    let layout = compute_condensed_timeline(&spans);
    let labels = time_axis_labels(&layout.window.unwrap(), 4);

    let texts: Vec<&str> = labels.iter().map(|l| l.text.as_str()).collect();
    assert_eq!(texts, vec!["0.0ms", "500.0ms", "1.00s", "1.50s", "2.00s"]);
    assert_abs_diff_eq!(labels[2].position, 50.0);
}
