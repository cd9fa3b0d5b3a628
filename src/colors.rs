use eframe::egui::Color32;

use crate::types::{Span, SpanType};

pub const WHITE: Color32 = Color32::WHITE;

pub const GRAY_50: Color32 = Color32::from_gray(50);
pub const GRAY_120: Color32 = Color32::from_gray(120);
pub const GRAY_180: Color32 = Color32::from_gray(180);

pub const LIGHT_BLUE: Color32 = Color32::from_rgb(134, 202, 227);
pub const MILD_BLUE: Color32 = Color32::from_rgb(55, 127, 153);
pub const INTENSE_BLUE2: Color32 = Color32::from_rgb(0, 110, 230);
pub const DARK_YELLOW: Color32 = Color32::from_rgb(242, 176, 34);
pub const MILD_GREEN: Color32 = Color32::from_rgb(90, 170, 110);
pub const MILD_PURPLE: Color32 = Color32::from_rgb(150, 110, 200);
pub const MILD_RED: Color32 = Color32::from_rgb(220, 50, 50);
pub const INTENSE_RED: Color32 = Color32::from_rgb(255, 51, 0);

pub fn selection_fill() -> Color32 {
    Color32::from_rgba_unmultiplied(50, 150, 220, 40)
}

pub fn span_type_color(span_type: SpanType) -> Color32 {
    match span_type {
        SpanType::Default => GRAY_180,
        SpanType::Llm => MILD_PURPLE,
        SpanType::Tool => DARK_YELLOW,
        SpanType::Executor => MILD_BLUE,
        SpanType::Evaluator | SpanType::Evaluation | SpanType::HumanEvaluator => MILD_GREEN,
        SpanType::Pipeline => LIGHT_BLUE,
    }
}

/// Fill of a span on the condensed timeline. Errors win over the type, pending spans are faded.
pub fn span_fill(span: &Span) -> Color32 {
    let base = if span.is_error() {
        MILD_RED
    } else {
        span_type_color(span.span_type)
    };
    if span.pending {
        base.gamma_multiply(0.35)
    } else {
        base
    }
}
