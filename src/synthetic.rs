//! Generated agent traces, for the `--demo` mode of the viewer and for tests.
//!
//! The generated trace looks like a typical agent run: a root span, a few loop iterations, each
//! with an LLM call and some tool calls. One tool call fails and the last iteration is still
//! running.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha20Rng;
use sha2::Digest;
use uuid::Uuid;

use crate::types::{Span, SpanStatus, SpanType, TimePoint};

/// 2024-05-01T12:00:00Z
const DEMO_START_TIME: TimePoint = 1_714_564_800.0;

const TOOL_NAMES: [&str; 4] = ["web_search", "read_file", "run_code", "summarize"];

pub fn make_uuid_from_seed(seed: &str) -> Uuid {
    let digest_bytes: [u8; 32] = sha2::Sha256::digest(seed).into();
    let mut uuid_bytes = [0u8; 16];
    uuid_bytes.copy_from_slice(&digest_bytes[0..16]);
    Uuid::from_bytes(uuid_bytes)
}

struct SpanBuilder {
    name: String,
    span_type: SpanType,
    start_time: TimePoint,
    length: TimePoint,
    status: Option<SpanStatus>,
    pending: bool,
    children: Vec<SpanBuilder>,
}

impl SpanBuilder {
    fn new(
        name: impl Into<String>,
        span_type: SpanType,
        start_time: TimePoint,
        length: TimePoint,
    ) -> Self {
        SpanBuilder {
            name: name.into(),
            span_type,
            start_time,
            length,
            status: None,
            pending: false,
            children: Vec::new(),
        }
    }

    fn with_child(mut self, child: SpanBuilder) -> Self {
        self.children.push(child);
        self
    }

    fn failed(mut self) -> Self {
        self.status = Some(SpanStatus::Error);
        self
    }

    fn still_running(mut self) -> Self {
        self.pending = true;
        self
    }

    fn end_time(&self) -> TimePoint {
        self.start_time + self.length
    }

    /// Flattens the builder tree into spans, parents before children.
    fn build(self, seed: &str, parent: Option<(&str, &[String])>, out: &mut Vec<Span>) {
        let span_id = make_uuid_from_seed(&format!("{seed}/{}", out.len())).to_string();

        let mut path: Vec<String> = parent.map(|(_, path)| path.to_vec()).unwrap_or_default();
        path.push(self.name.clone());

        let mut span = Span::new(
            span_id.clone(),
            parent.map(|(id, _)| id.to_string()),
            self.name,
            self.start_time,
            if self.pending {
                self.start_time
            } else {
                self.start_time + self.length
            },
        );
        span.span_type = self.span_type;
        span.status = self.status;
        span.pending = self.pending;
        span.path = path.clone();
        out.push(span);

        for child in self.children {
            child.build(seed, Some((&span_id, &path)), out);
        }
    }
}

/// A deterministic demo trace, the same seed always gives the same spans.
pub fn demo_trace(seed: u64) -> Vec<Span> {
    let mut rng = ChaCha20Rng::seed_from_u64(seed);
    let iterations = rng.random_range(3..=6);

    let mut cursor = DEMO_START_TIME + 0.05;
    let mut steps = Vec::new();
    for iteration in 0..iterations {
        let step_start = cursor;
        let mut step_children = Vec::new();

        let llm_length = rng.random_range(0.4..2.5);
        step_children.push(SpanBuilder::new("llm_call", SpanType::Llm, cursor, llm_length));
        cursor += llm_length + 0.01;

        // Tool calls of one step run concurrently. The second step always calls at least one
        // tool, its first tool call fails.
        let min_tools = if iteration == 1 { 1 } else { 0 };
        let tool_count = rng.random_range(min_tools..=3);
        let mut tools_end = cursor;
        for tool in 0..tool_count {
            let name = TOOL_NAMES[rng.random_range(0..TOOL_NAMES.len())];
            let length = rng.random_range(0.05..1.2);
            let start = cursor + tool as f64 * 0.02;
            let mut tool_span = SpanBuilder::new(name, SpanType::Tool, start, length);
            if iteration == 1 && tool == 0 {
                tool_span = tool_span.failed();
            }
            tools_end = tools_end.max(tool_span.end_time());
            step_children.push(tool_span);
        }
        cursor = tools_end + 0.01;

        let step_length = cursor - step_start;
        let mut step = SpanBuilder::new("agent_step", SpanType::Default, step_start, step_length);
        if iteration + 1 == iterations {
            step = step.with_child(
                SpanBuilder::new("llm_call", SpanType::Llm, cursor, 0.0).still_running(),
            );
            cursor += 0.01;
        }
        for child in step_children {
            step = step.with_child(child);
        }
        steps.push(step);
        cursor += 0.02;
    }

    let evaluation_length = rng.random_range(0.1..0.5);
    let evaluation =
        SpanBuilder::new("evaluate_answer", SpanType::Evaluator, cursor, evaluation_length);
    cursor += evaluation_length;

    let run_length = cursor + 0.05 - DEMO_START_TIME;
    let mut root = SpanBuilder::new("agent_run", SpanType::Pipeline, DEMO_START_TIME, run_length);
    for step in steps {
        root = root.with_child(step);
    }
    root = root.with_child(evaluation);

    let mut spans = Vec::new();
    root.build(&format!("demo-{seed}"), None, &mut spans);
    spans
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::SpanTree;

    #[test]
    fn demo_trace_is_deterministic() {
        assert_eq!(demo_trace(7), demo_trace(7));
        assert_ne!(demo_trace(7), demo_trace(8));
    }

    #[test]
    fn demo_trace_shape() {
        let spans = demo_trace(42);
        let tree = SpanTree::build(&spans);
        assert_eq!(tree.roots().len(), 1);
        assert!(spans.iter().any(|s| s.pending));
        assert!(spans.iter().any(|s| s.is_error()));
        for (index, span) in spans.iter().enumerate() {
            assert_eq!(span.path.len(), tree.depth(index) + 1);
            assert!(span.start_time <= span.end_time);
        }
    }

    #[test]
    fn every_seed_has_one_error_and_one_pending_span() {
        for seed in 0..100 {
            let spans = demo_trace(seed);
            assert_eq!(spans.iter().filter(|s| s.is_error()).count(), 1, "seed {seed}");
            assert_eq!(spans.iter().filter(|s| s.pending).count(), 1, "seed {seed}");
        }
    }
}
