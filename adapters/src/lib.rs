//! Concrete event sources and sinks for the signal pipeline.

pub mod console;
pub mod memory;
pub mod partitions;
pub mod stdio;

#[cfg(feature = "kafka")]
pub mod kafka;

pub use console::ConsoleAlertSink;
pub use memory::{ChannelSource, RecordingSink};
pub use partitions::PartitionWorkers;
pub use stdio::{JsonLinesSink, JsonLinesSource};
