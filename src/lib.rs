pub mod colors;
pub mod config;
pub mod loader;
pub mod paths;
pub mod persistent;
pub mod selection;
pub mod store;
pub mod synthetic;
pub mod task_timer;
pub mod timeline;
pub mod tree;
pub mod types;

pub use config::ViewConfig;
pub use selection::{SelectionOutcome, SelectionOverlay};
pub use store::TraceViewStore;
pub use timeline::{compute_condensed_timeline, CondensedTimeline, CondensedTimelineSpan};
pub use tree::compute_ancestor_chain;
pub use types::{Span, SpanId, TimePoint};
