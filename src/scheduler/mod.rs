//! Request queueing, dispatch, and response triage.

mod engine;
mod queue;
mod refresh;
mod request;
mod triage;

pub use engine::{Scheduler, DEFAULT_MANUAL_DRAIN};
pub use queue::QueueDepth;
pub use refresh::{RATE_LIMIT_STATUS_PATH, REMOTE_CONFIG_PATH};
pub use request::{
    normalize_path, ApiResponse, Completion, RequestHandle, RequestOptions, RequestParams,
    FORM_CONTENT_TYPE,
};

pub(crate) use request::header_map;
