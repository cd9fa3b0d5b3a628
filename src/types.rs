use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDateTime};

/// Seconds since epoch
pub type TimePoint = f64;

pub type SpanId = String;

pub const MILLISECONDS_PER_SECOND: f64 = 1000.0;

pub fn time_point_from_unix_nano(unix_nano: u64) -> TimePoint {
    unix_nano as f64 / 1_000_000_000.0
}

/// Parses an ISO-8601 timestamp. Timestamps without an offset are read as UTC.
pub fn time_point_from_iso8601(value: &str) -> Option<TimePoint> {
    let value = value.trim();
    if let Ok(date_time) = DateTime::parse_from_rfc3339(value) {
        return Some(date_time_to_time_point(
            date_time.timestamp(),
            date_time.timestamp_subsec_nanos(),
        ));
    }
    let naive = NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f")
        .or_else(|_| NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S%.f"))
        .ok()?;
    let utc = naive.and_utc();
    Some(date_time_to_time_point(utc.timestamp(), utc.timestamp_subsec_nanos()))
}

fn date_time_to_time_point(seconds: i64, nanos: u32) -> TimePoint {
    seconds as f64 + nanos as f64 / 1_000_000_000.0
}

pub fn time_point_to_utc_string(time: TimePoint) -> String {
    let date_time = DateTime::from_timestamp_nanos((time * 1e9) as i64);
    date_time.format("%Y-%m-%d %H:%M:%S%.3f").to_string()
}

/// Human readable duration, milliseconds below one second.
pub fn format_duration(seconds: TimePoint) -> String {
    if seconds.abs() < 1.0 {
        format!("{:.1}ms", seconds * MILLISECONDS_PER_SECOND)
    } else {
        format!("{:.2}s", seconds)
    }
}

/// Category of a span. Only used for colouring and labels, never for layout.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, serde::Serialize, serde::Deserialize,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SpanType {
    Llm,
    Tool,
    Executor,
    Evaluator,
    Evaluation,
    HumanEvaluator,
    Pipeline,
    #[default]
    #[serde(other)]
    Default,
}

impl SpanType {
    pub fn label(&self) -> &'static str {
        match self {
            SpanType::Default => "DEFAULT",
            SpanType::Llm => "LLM",
            SpanType::Tool => "TOOL",
            SpanType::Executor => "EXECUTOR",
            SpanType::Evaluator => "EVALUATOR",
            SpanType::Evaluation => "EVALUATION",
            SpanType::HumanEvaluator => "HUMAN_EVALUATOR",
            SpanType::Pipeline => "PIPELINE",
        }
    }

    pub fn from_label(label: &str) -> SpanType {
        match label.trim().to_ascii_uppercase().as_str() {
            "LLM" => SpanType::Llm,
            "TOOL" => SpanType::Tool,
            "EXECUTOR" => SpanType::Executor,
            "EVALUATOR" => SpanType::Evaluator,
            "EVALUATION" => SpanType::Evaluation,
            "HUMAN_EVALUATOR" => SpanType::HumanEvaluator,
            "PIPELINE" => SpanType::Pipeline,
            _ => SpanType::Default,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SpanStatus {
    Ok,
    Error,
}

impl SpanStatus {
    /// Anything mentioning "error" marks the span as failed.
    pub fn from_label(label: &str) -> SpanStatus {
        if label.to_ascii_lowercase().contains("error") {
            SpanStatus::Error
        } else {
            SpanStatus::Ok
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Span {
    pub span_id: SpanId,
    pub parent_span_id: Option<SpanId>,
    pub name: String,
    pub start_time: TimePoint,
    /// For pending spans this is only the latest known time, usually equal to `start_time`.
    pub end_time: TimePoint,
    pub span_type: SpanType,
    pub status: Option<SpanStatus>,
    /// Names from the root down to this span.
    pub path: Vec<String>,
    pub attributes: BTreeMap<String, serde_json::Value>,

    /// Tree view state, never touched by the timeline layout.
    pub collapsed: bool,
    /// The span's data hasn't fully arrived yet. Rendered, but not interactive.
    pub pending: bool,
}

impl Span {
    pub fn new(
        span_id: impl Into<SpanId>,
        parent_span_id: Option<SpanId>,
        name: impl Into<String>,
        start_time: TimePoint,
        end_time: TimePoint,
    ) -> Span {
        let name = name.into();
        Span {
            span_id: span_id.into(),
            parent_span_id,
            path: vec![name.clone()],
            name,
            start_time,
            end_time: end_time.max(start_time),
            span_type: SpanType::Default,
            status: None,
            attributes: BTreeMap::new(),
            collapsed: false,
            pending: false,
        }
    }

    pub fn duration(&self) -> TimePoint {
        self.end_time - self.start_time
    }

    pub fn is_error(&self) -> bool {
        self.status == Some(SpanStatus::Error)
    }

    /// Path segments used to group spans, falls back to the name for spans without a path.
    /// Segments are kept apart so names containing dots can't collide with deeper paths.
    pub fn path_key(&self) -> Vec<String> {
        if self.path.is_empty() {
            vec![self.name.clone()]
        } else {
            self.path.clone()
        }
    }
}

pub fn value_to_text(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::Null => "empty".to_string(),
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_iso8601_with_and_without_offset() {
        let with_offset = time_point_from_iso8601("2024-05-01T12:00:00.250Z").unwrap();
        let without_offset = time_point_from_iso8601("2024-05-01T12:00:00.250").unwrap();
        assert_eq!(with_offset, without_offset);
        assert_eq!(with_offset, 1714564800.25);

        let shifted = time_point_from_iso8601("2024-05-01T14:00:00+02:00").unwrap();
        assert_eq!(shifted, 1714564800.0);

        assert!(time_point_from_iso8601("yesterday").is_none());
    }

    #[test]
    fn unknown_span_types_fall_back_to_default() {
        let parsed: SpanType = serde_json::from_str("\"LLM\"").unwrap();
        assert_eq!(parsed, SpanType::Llm);
        let unknown: SpanType = serde_json::from_str("\"SOMETHING_NEW\"").unwrap();
        assert_eq!(unknown, SpanType::Default);
        assert_eq!(SpanType::from_label("human_evaluator"), SpanType::HumanEvaluator);
    }

    #[test]
    fn duration_formatting() {
        assert_eq!(format_duration(0.0125), "12.5ms");
        assert_eq!(format_duration(2.5), "2.50s");
    }
}
