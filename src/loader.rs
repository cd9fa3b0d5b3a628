//! Reading traces from disk.
//!
//! Two formats are understood:
//! - a JSON array of spans (or an object with a `spans` array) using camelCase fields and
//!   ISO-8601 timestamps,
//! - OTLP JSON exports, a single `ExportTraceServiceRequest` or an array of them.
//!
//! Either may be gzip compressed.

use std::collections::BTreeMap;
use std::io::Read;
use std::path::Path;

use anyhow::{Context, Result};
use flate2::read::GzDecoder;
use opentelemetry_proto::tonic::collector::trace::v1::ExportTraceServiceRequest;
use opentelemetry_proto::tonic::common::v1::any_value::Value;
use opentelemetry_proto::tonic::trace::v1::status::StatusCode;

use crate::task_timer::TaskTimer;
use crate::tree::SpanTree;
use crate::types::{
    time_point_from_iso8601, time_point_from_unix_nano, Span, SpanId, SpanStatus, SpanType,
};

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error("file is not valid UTF-8")]
    NotUtf8,
    #[error("file is empty")]
    Empty,
    #[error("unrecognized trace format: {0}")]
    UnsupportedFormat(String),
    #[error("span {span_id}: invalid timestamp {value:?}")]
    InvalidTimestamp { span_id: SpanId, value: String },
}

/// Span as it appears in the JSON span format.
#[derive(Debug, Clone, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawSpan {
    span_id: SpanId,
    #[serde(default)]
    parent_span_id: Option<SpanId>,
    #[serde(default)]
    name: String,
    start_time: String,
    #[serde(default)]
    end_time: Option<String>,
    #[serde(default)]
    span_type: SpanType,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    path: Vec<String>,
    #[serde(default)]
    attributes: BTreeMap<String, serde_json::Value>,
    #[serde(default)]
    collapsed: bool,
    #[serde(default)]
    pending: bool,
}

impl TryFrom<RawSpan> for Span {
    type Error = LoadError;

    fn try_from(raw: RawSpan) -> Result<Span, LoadError> {
        let invalid = |value: &str| LoadError::InvalidTimestamp {
            span_id: raw.span_id.clone(),
            value: value.to_string(),
        };

        let start_time = time_point_from_iso8601(&raw.start_time)
            .ok_or_else(|| invalid(&raw.start_time))?;
        let end_time = match raw.end_time.as_deref().filter(|s| !s.trim().is_empty()) {
            Some(value) => match time_point_from_iso8601(value) {
                Some(time) => time,
                None if raw.pending => start_time,
                None => return Err(invalid(value)),
            },
            None if raw.pending => start_time,
            None => return Err(invalid("")),
        };
        if end_time < start_time {
            tracing::warn!(span_id = %raw.span_id, "span ends before it starts, clamping");
        }

        Ok(Span {
            parent_span_id: raw.parent_span_id.filter(|id| !id.is_empty()),
            name: raw.name,
            start_time,
            end_time: end_time.max(start_time),
            span_type: raw.span_type,
            status: raw.status.as_deref().map(SpanStatus::from_label),
            path: raw.path,
            attributes: raw.attributes,
            collapsed: raw.collapsed,
            pending: raw.pending,
            span_id: raw.span_id,
        })
    }
}

pub fn load_trace_file(path: &Path) -> Result<Vec<Span>> {
    let mut file_bytes = Vec::new();
    std::fs::File::open(path)
        .and_then(|mut file| file.read_to_end(&mut file_bytes))
        .with_context(|| format!("failed to read {}", path.display()))?;
    parse_trace_bytes(&file_bytes).with_context(|| format!("failed to parse {}", path.display()))
}

pub fn parse_trace_bytes(file_bytes: &[u8]) -> Result<Vec<Span>> {
    if file_bytes.starts_with(&GZIP_MAGIC) {
        let mut decompressed = Vec::new();
        GzDecoder::new(file_bytes)
            .read_to_end(&mut decompressed)
            .context("failed to decompress gzip data")?;
        return parse_trace_bytes(&decompressed);
    }

    let t = TaskTimer::new("parsing trace file");
    let file_str = std::str::from_utf8(file_bytes).map_err(|_| LoadError::NotUtf8)?;
    if file_str.trim().is_empty() {
        return Err(LoadError::Empty.into());
    }
    let json: serde_json::Value = serde_json::from_str(file_str)?;

    let mut spans = if is_otlp(&json) {
        let mut json = json;
        decode_string_integers(&mut json);
        let requests: Vec<ExportTraceServiceRequest> = match json {
            serde_json::Value::Array(_) => serde_json::from_value(json)?,
            other => vec![serde_json::from_value(other)?],
        };
        spans_from_otlp(&requests)
    } else {
        let raw_spans: Vec<RawSpan> = match json {
            serde_json::Value::Array(_) => serde_json::from_value(json)?,
            serde_json::Value::Object(mut object) => match object.remove("spans") {
                Some(spans) => serde_json::from_value(spans)?,
                None => {
                    return Err(LoadError::UnsupportedFormat(
                        "expected a span array or OTLP export".to_string(),
                    )
                    .into())
                }
            },
            other => return Err(LoadError::UnsupportedFormat(json_kind(&other)).into()),
        };
        raw_spans
            .into_iter()
            .map(Span::try_from)
            .collect::<Result<Vec<Span>, LoadError>>()?
    };

    fill_missing_paths(&mut spans);
    t.stop(spans.len());
    Ok(spans)
}

fn is_otlp(json: &serde_json::Value) -> bool {
    let has_resource_spans = |value: &serde_json::Value| {
        value.get("resourceSpans").is_some() || value.get("resource_spans").is_some()
    };
    match json {
        serde_json::Value::Array(items) => items.first().is_some_and(has_resource_spans),
        other => has_resource_spans(other),
    }
}

/// OTLP/JSON writes 64-bit integers (`startTimeUnixNano`, `intValue`) as strings, the
/// generated structs only accept numbers.
fn decode_string_integers(value: &mut serde_json::Value) {
    match value {
        serde_json::Value::Object(object) => {
            for (key, field) in object.iter_mut() {
                if let serde_json::Value::String(text) = field {
                    if key.ends_with("UnixNano") || key.ends_with("_unix_nano") {
                        if let Ok(number) = text.parse::<u64>() {
                            *field = serde_json::Value::from(number);
                        }
                    } else if key == "intValue" || key == "int_value" {
                        if let Ok(number) = text.parse::<i64>() {
                            *field = serde_json::Value::from(number);
                        }
                    }
                } else {
                    decode_string_integers(field);
                }
            }
        }
        serde_json::Value::Array(items) => items.iter_mut().for_each(decode_string_integers),
        _ => {}
    }
}

fn json_kind(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "a boolean",
        serde_json::Value::Number(_) => "a number",
        serde_json::Value::String(_) => "a string",
        serde_json::Value::Array(_) => "an array",
        serde_json::Value::Object(_) => "an object",
    }
    .to_string()
}

/// Converts OTLP spans. Ids become lowercase hex, a span without an end time is pending.
pub fn spans_from_otlp(requests: &[ExportTraceServiceRequest]) -> Vec<Span> {
    let mut spans = Vec::new();
    for request in requests {
        for rs in &request.resource_spans {
            for ss in &rs.scope_spans {
                for otlp_span in &ss.spans {
                    let attributes: BTreeMap<String, serde_json::Value> = otlp_span
                        .attributes
                        .iter()
                        .map(|attribute| {
                            let value = attribute
                                .value
                                .as_ref()
                                .and_then(|v| v.value.as_ref())
                                .map_or(serde_json::Value::Null, otlp_value_to_json);
                            (attribute.key.clone(), value)
                        })
                        .collect();

                    let pending = otlp_span.end_time_unix_nano == 0;
                    let start_time = time_point_from_unix_nano(otlp_span.start_time_unix_nano);
                    let end_time = if pending {
                        start_time
                    } else {
                        time_point_from_unix_nano(otlp_span.end_time_unix_nano).max(start_time)
                    };

                    let status = otlp_span.status.as_ref().map(|status| {
                        if status.code == StatusCode::Error as i32 {
                            SpanStatus::Error
                        } else {
                            SpanStatus::Ok
                        }
                    });

                    spans.push(Span {
                        span_id: hex::encode(&otlp_span.span_id),
                        parent_span_id: (!otlp_span.parent_span_id.is_empty())
                            .then(|| hex::encode(&otlp_span.parent_span_id)),
                        name: otlp_span.name.clone(),
                        start_time,
                        end_time,
                        span_type: span_type_from_attributes(&attributes),
                        status,
                        path: Vec::new(),
                        attributes,
                        collapsed: false,
                        pending,
                    });
                }
            }
        }
    }
    spans
}

fn span_type_from_attributes(attributes: &BTreeMap<String, serde_json::Value>) -> SpanType {
    if let Some(serde_json::Value::String(label)) = attributes.get("span.type") {
        return SpanType::from_label(label);
    }
    if attributes.keys().any(|key| key.starts_with("gen_ai.")) {
        return SpanType::Llm;
    }
    SpanType::Default
}

pub fn otlp_value_to_json(value: &Value) -> serde_json::Value {
    match value {
        Value::StringValue(s) => serde_json::Value::String(s.clone()),
        Value::BoolValue(b) => serde_json::Value::Bool(*b),
        Value::IntValue(i) => serde_json::Value::from(*i),
        Value::DoubleValue(d) => serde_json::Value::from(*d),
        Value::ArrayValue(a) => serde_json::Value::Array(
            a.values
                .iter()
                .map(|v| {
                    v.value
                        .as_ref()
                        .map_or(serde_json::Value::Null, otlp_value_to_json)
                })
                .collect(),
        ),
        Value::KvlistValue(kv) => serde_json::Value::Object(
            kv.values
                .iter()
                .map(|v| {
                    let value = v
                        .value
                        .as_ref()
                        .and_then(|any| any.value.as_ref())
                        .map_or(serde_json::Value::Null, otlp_value_to_json);
                    (v.key.clone(), value)
                })
                .collect(),
        ),
        Value::BytesValue(b) => serde_json::Value::String(hex::encode(b)),
    }
}

/// Spans without a path get the names of their ancestors followed by their own name.
pub fn fill_missing_paths(spans: &mut [Span]) {
    if spans.iter().all(|span| !span.path.is_empty()) {
        return;
    }

    let tree = SpanTree::build(spans);
    let names: Vec<String> = spans.iter().map(|span| span.name.clone()).collect();

    for (index, span) in spans.iter_mut().enumerate() {
        if !span.path.is_empty() {
            continue;
        }
        span.path = tree
            .ancestors(index)
            .into_iter()
            .map(|ancestor| names[ancestor].clone())
            .chain(std::iter::once(span.name.clone()))
            .collect();
    }
}
