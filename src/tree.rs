//! Parent/child structure of a flat span list.
//!
//! Spans reference their parent by id. Dangling references make a span a root, and parent
//! cycles are broken while building the tree so that every walk over it terminates.

use std::collections::{BTreeSet, HashMap, HashSet};

use crate::types::{Span, SpanId, TimePoint};

/// Ancestor ids of `span`, ordered from the root down to its immediate parent.
///
/// Walks `parent_span_id` links through `all_spans`. A parent that isn't in the list ends the
/// walk, the span above it is treated as a root. If the walk comes back to a span it has already
/// visited the data is malformed, the walk stops and the chain collected so far is returned.
pub fn compute_ancestor_chain(span: &Span, all_spans: &[Span]) -> Vec<SpanId> {
    let mut spans_by_id: HashMap<&str, &Span> = HashMap::with_capacity(all_spans.len());
    for s in all_spans {
        // First span wins on duplicate ids, same as `SpanTree`
        spans_by_id.entry(s.span_id.as_str()).or_insert(s);
    }

    let mut visited: HashSet<&str> = HashSet::new();
    visited.insert(span.span_id.as_str());

    let mut chain = Vec::new();
    let mut next_parent = span.parent_span_id.as_deref();
    while let Some(parent_id) = next_parent {
        if !visited.insert(parent_id) {
            tracing::warn!(
                span_id = %span.span_id,
                parent_id,
                "parent cycle detected, truncating ancestor chain"
            );
            break;
        }
        let Some(parent) = spans_by_id.get(parent_id) else {
            break;
        };
        chain.push(parent.span_id.clone());
        next_parent = parent.parent_span_id.as_deref();
    }

    chain.reverse();
    chain
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Visit {
    New,
    InProgress,
    Done,
}

/// Index based tree over a span slice. Indexes refer to positions in the slice the tree was
/// built from.
#[derive(Debug, Clone, Default)]
pub struct SpanTree {
    index_by_id: HashMap<SpanId, usize>,
    parents: Vec<Option<usize>>,
    children: Vec<Vec<usize>>,
    roots: Vec<usize>,
}

/// One line of the tree view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TreeRow {
    pub index: usize,
    pub depth: usize,
    pub has_children: bool,
}

impl SpanTree {
    pub fn build(spans: &[Span]) -> SpanTree {
        let mut index_by_id = HashMap::with_capacity(spans.len());
        for (i, span) in spans.iter().enumerate() {
            if index_by_id.contains_key(&span.span_id) {
                tracing::warn!(span_id = %span.span_id, "duplicate span id, keeping the first one");
                continue;
            }
            index_by_id.insert(span.span_id.clone(), i);
        }

        let mut parents: Vec<Option<usize>> = spans
            .iter()
            .enumerate()
            .map(|(i, span)| {
                span.parent_span_id
                    .as_ref()
                    .and_then(|parent_id| index_by_id.get(parent_id).copied())
                    .filter(|&parent| parent != i)
            })
            .collect();

        break_parent_cycles(&mut parents, spans);

        let mut children = vec![Vec::new(); spans.len()];
        let mut roots = Vec::new();
        for (i, parent) in parents.iter().enumerate() {
            match parent {
                Some(p) => children[*p].push(i),
                None => roots.push(i),
            }
        }

        // Stable sort, spans starting at the same time keep their input order
        let by_start_time =
            |a: &usize, b: &usize| spans[*a].start_time.total_cmp(&spans[*b].start_time);
        roots.sort_by(by_start_time);
        for siblings in &mut children {
            siblings.sort_by(by_start_time);
        }

        SpanTree {
            index_by_id,
            parents,
            children,
            roots,
        }
    }

    pub fn len(&self) -> usize {
        self.parents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parents.is_empty()
    }

    pub fn index_of(&self, span_id: &str) -> Option<usize> {
        self.index_by_id.get(span_id).copied()
    }

    pub fn parent(&self, index: usize) -> Option<usize> {
        self.parents.get(index).copied().flatten()
    }

    pub fn children(&self, index: usize) -> &[usize] {
        self.children.get(index).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn roots(&self) -> &[usize] {
        &self.roots
    }

    /// Ancestors of the span at `index`, root first.
    pub fn ancestors(&self, index: usize) -> Vec<usize> {
        let mut ancestors = Vec::new();
        let mut current = self.parent(index);
        while let Some(parent) = current {
            // The tree is acyclic after `break_parent_cycles`, the bound only guards against bugs.
            if ancestors.len() > self.len() {
                break;
            }
            ancestors.push(parent);
            current = self.parent(parent);
        }
        ancestors.reverse();
        ancestors
    }

    pub fn depth(&self, index: usize) -> usize {
        self.ancestors(index).len()
    }

    /// Flattens the forest into tree view rows, depth first.
    ///
    /// Children of collapsed spans are skipped. When `visible` is given, only spans in the set are
    /// shown. The set is expected to be closed under ancestors, a span whose parent is hidden
    /// is hidden as well.
    pub fn visible_rows(
        &self,
        spans: &[Span],
        visible: Option<&BTreeSet<SpanId>>,
    ) -> Vec<TreeRow> {
        let is_visible =
            |index: usize| visible.map_or(true, |set| set.contains(&spans[index].span_id));

        let mut rows = Vec::new();
        let mut stack: Vec<(usize, usize)> = self
            .roots
            .iter()
            .rev()
            .filter(|&&root| is_visible(root))
            .map(|&root| (root, 0))
            .collect();

        while let Some((index, depth)) = stack.pop() {
            let children = self.children(index);
            rows.push(TreeRow {
                index,
                depth,
                has_children: !children.is_empty(),
            });

            if spans[index].collapsed {
                continue;
            }
            for &child in children.iter().rev() {
                if is_visible(child) {
                    stack.push((child, depth + 1));
                }
            }
        }

        rows
    }

    /// Earliest start and latest end of every subtree, indexed like the span slice.
    pub fn subtree_bounds(&self, spans: &[Span]) -> Vec<(TimePoint, TimePoint)> {
        let mut bounds: Vec<(TimePoint, TimePoint)> =
            spans.iter().map(|s| (s.start_time, s.end_time)).collect();

        // Pre-order, then fold children into parents in reverse
        let mut order = Vec::with_capacity(spans.len());
        let mut stack: Vec<usize> = self.roots.clone();
        while let Some(index) = stack.pop() {
            order.push(index);
            stack.extend_from_slice(self.children(index));
        }

        for &index in order.iter().rev() {
            if let Some(parent) = self.parent(index) {
                let (child_start, child_end) = bounds[index];
                let parent_bounds = &mut bounds[parent];
                parent_bounds.0 = parent_bounds.0.min(child_start);
                parent_bounds.1 = parent_bounds.1.max(child_end);
            }
        }

        bounds
    }
}

/// Detaches one span of every parent cycle so that it becomes a root.
/// The span with the lowest index in the cycle is the one that gets detached.
fn break_parent_cycles(parents: &mut [Option<usize>], spans: &[Span]) {
    let mut state = vec![Visit::New; parents.len()];

    for start in 0..parents.len() {
        let mut walked: Vec<usize> = Vec::new();
        let mut current = Some(start);

        while let Some(index) = current {
            match state[index] {
                Visit::Done => break,
                Visit::InProgress => {
                    // Nodes in progress always belong to the current walk
                    if let Some(cycle_start) = walked.iter().position(|&w| w == index) {
                        if let Some(&breaker) = walked[cycle_start..].iter().min() {
                            tracing::warn!(
                                span_id = %spans[breaker].span_id,
                                cycle_len = walked.len() - cycle_start,
                                "parent cycle detected, treating span as a root"
                            );
                            parents[breaker] = None;
                        }
                    }
                    break;
                }
                Visit::New => {
                    state[index] = Visit::InProgress;
                    walked.push(index);
                    current = parents[index];
                }
            }
        }

        for index in walked {
            state[index] = Visit::Done;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn span(id: &str, parent: Option<&str>, start: f64, end: f64) -> Span {
        Span::new(id, parent.map(str::to_string), id, start, end)
    }

    #[test]
    fn dangling_parent_is_a_root() {
        let spans = vec![span("a", None, 0.0, 1.0), span("b", Some("missing"), 0.5, 1.0)];
        let tree = SpanTree::build(&spans);
        assert_eq!(tree.roots(), &[0, 1]);
        assert!(compute_ancestor_chain(&spans[1], &spans).is_empty());
    }

    #[test]
    fn self_parent_has_no_ancestors() {
        let spans = vec![span("a", Some("a"), 0.0, 1.0)];
        assert!(compute_ancestor_chain(&spans[0], &spans).is_empty());
        let tree = SpanTree::build(&spans);
        assert_eq!(tree.roots(), &[0]);
    }

    #[test]
    fn two_cycle_terminates() {
        let spans = vec![span("a", Some("b"), 0.0, 1.0), span("b", Some("a"), 0.0, 1.0)];
        assert_eq!(compute_ancestor_chain(&spans[0], &spans), vec!["b".to_string()]);
        assert_eq!(compute_ancestor_chain(&spans[1], &spans), vec!["a".to_string()]);

        let tree = SpanTree::build(&spans);
        assert_eq!(tree.roots(), &[0]);
        assert_eq!(tree.children(0), &[1]);
        assert_eq!(tree.ancestors(1), vec![0]);
    }

    #[test]
    fn cycle_below_a_root_is_detached() {
        // x -> z -> y -> x, next to an unrelated root
        let spans = vec![
            span("r", None, 0.0, 10.0),
            span("z", Some("y"), 3.0, 4.0),
            span("x", Some("z"), 1.0, 2.0),
            span("y", Some("x"), 2.0, 3.0),
        ];
        let tree = SpanTree::build(&spans);
        // "z" has the lowest index in the cycle
        assert_eq!(tree.roots(), &[0, 1]);
        assert_eq!(tree.ancestors(3), vec![1, 2]);
        for index in 0..spans.len() {
            assert!(tree.ancestors(index).len() < spans.len());
        }
        let rows = tree.visible_rows(&spans, None);
        assert_eq!(rows.len(), spans.len());
    }

    #[test]
    fn children_are_ordered_by_start_time() {
        let spans = vec![
            span("root", None, 0.0, 10.0),
            span("late", Some("root"), 5.0, 6.0),
            span("early", Some("root"), 1.0, 2.0),
            span("tie", Some("root"), 5.0, 5.5),
        ];
        let tree = SpanTree::build(&spans);
        assert_eq!(tree.children(0), &[2, 1, 3]);
    }

    #[test]
    fn collapsed_spans_hide_their_subtree() {
        let mut spans = vec![
            span("root", None, 0.0, 10.0),
            span("child", Some("root"), 1.0, 5.0),
            span("grandchild", Some("child"), 2.0, 3.0),
        ];
        spans[1].collapsed = true;
        let tree = SpanTree::build(&spans);
        let rows = tree.visible_rows(&spans, None);
        assert_eq!(
            rows,
            vec![
                TreeRow {
                    index: 0,
                    depth: 0,
                    has_children: true,
                },
                TreeRow {
                    index: 1,
                    depth: 1,
                    has_children: true,
                },
            ]
        );
    }

    #[test]
    fn subtree_bounds_cover_descendants() {
        let spans = vec![
            span("root", None, 1.0, 2.0),
            span("child", Some("root"), 0.5, 4.0),
            span("grandchild", Some("child"), 3.0, 7.0),
        ];
        let tree = SpanTree::build(&spans);
        let bounds = tree.subtree_bounds(&spans);
        assert_eq!(bounds[0], (0.5, 7.0));
        assert_eq!(bounds[1], (0.5, 7.0));
        assert_eq!(bounds[2], (3.0, 7.0));
    }
}
