//! Grouping of spans that share the same call path.
//!
//! Loops in agent code produce many spans with an identical path (`agent > step > tool`), one
//! per iteration. Grouping them by path lets the views show a single `tool (×3)` entry and the
//! time segments during which any of them was active.

use std::collections::BTreeMap;

use crate::types::{Span, TimePoint};

/// Maps each path key to the spans sharing it, in input order.
pub fn group_by_path(spans: &[Span]) -> BTreeMap<Vec<String>, Vec<&Span>> {
    let mut groups: BTreeMap<Vec<String>, Vec<&Span>> = BTreeMap::new();
    for span in spans {
        groups.entry(span.path_key()).or_default().push(span);
    }
    groups
}

#[derive(Debug, Clone, PartialEq)]
pub struct PathGroup {
    pub key: Vec<String>,
    /// Indexes into the span slice the groups were built from, in input order.
    pub members: Vec<usize>,
    /// Disjoint, sorted intervals during which at least one member was running.
    pub active_segments: Vec<(TimePoint, TimePoint)>,
}

impl PathGroup {
    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn is_repeated(&self) -> bool {
        self.members.len() > 1
    }

    /// Last path segment, with the repetition count for repeated paths: `toolCall (×3)`.
    pub fn display_name(&self) -> String {
        let base = self.key.last().map(String::as_str).unwrap_or_default();
        if self.is_repeated() {
            format!("{base} (×{})", self.members.len())
        } else {
            base.to_string()
        }
    }

    /// Time during which at least one member was running.
    pub fn active_duration(&self) -> TimePoint {
        self.active_segments
            .iter()
            .map(|(start, end)| end - start)
            .sum()
    }
}

#[derive(Debug, Clone, Default)]
pub struct PathGroups {
    groups: BTreeMap<Vec<String>, PathGroup>,
}

impl PathGroups {
    pub fn new(spans: &[Span]) -> PathGroups {
        let mut members_by_key: BTreeMap<Vec<String>, Vec<usize>> = BTreeMap::new();
        for (i, span) in spans.iter().enumerate() {
            members_by_key.entry(span.path_key()).or_default().push(i);
        }

        let groups = members_by_key
            .into_iter()
            .map(|(key, members)| {
                let active_segments = merge_segments(
                    members
                        .iter()
                        .map(|&i| (spans[i].start_time, spans[i].end_time))
                        .collect(),
                );
                let group = PathGroup {
                    key: key.clone(),
                    members,
                    active_segments,
                };
                (key, group)
            })
            .collect();

        PathGroups { groups }
    }

    pub fn get(&self, key: &[String]) -> Option<&PathGroup> {
        self.groups.get(key)
    }

    pub fn group_of(&self, span: &Span) -> Option<&PathGroup> {
        self.groups.get(&span.path_key())
    }

    pub fn repeated(&self) -> impl Iterator<Item = &PathGroup> {
        self.groups.values().filter(|group| group.is_repeated())
    }

    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }
}

/// Merges overlapping or touching intervals.
pub fn merge_segments(
    mut raw_segments: Vec<(TimePoint, TimePoint)>,
) -> Vec<(TimePoint, TimePoint)> {
    raw_segments.sort_by(|a, b| a.0.total_cmp(&b.0));

    let mut merged: Vec<(TimePoint, TimePoint)> = Vec::new();
    for (start, end) in raw_segments {
        if let Some(last) = merged.last_mut() {
            if start <= last.1 {
                last.1 = last.1.max(end);
                continue;
            }
        }
        merged.push((start, end));
    }
    merged
}
