//! Rate-limit observation and state management.

mod entry;
mod table;

pub use entry::{RateLimitEntry, LIMIT_HEADER, REMAINING_HEADER, RESET_HEADER};
pub use table::RateLimitTable;
