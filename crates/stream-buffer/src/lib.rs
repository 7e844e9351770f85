//! Bounded Byte Ring for Sensor Streams
//!
//! Provides a fixed-capacity SPSC byte buffer that sheds the oldest
//! bytes on overflow, keeping the newest stream region parseable.

mod buffer;

pub use buffer::StreamBuffer;
