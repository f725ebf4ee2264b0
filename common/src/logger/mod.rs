mod init;
mod span;
mod trace_id;

pub use init::{LogFormat, init_logger};
pub use span::{event_span, warn_if_slow};
pub use trace_id::TraceId;
