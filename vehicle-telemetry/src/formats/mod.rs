//! Bus log file formats
//!
//! Log files serve two roles: offline decoding (an iterator of frames) and
//! replay, where a recorded log stands in for a live channel behind the
//! [`FrameSource`](crate::acquisition::FrameSource) trait.

pub mod candump;

// Re-export parser types
pub use candump::{CandumpDirectoryOpener, CandumpFrameIterator, CandumpParser, CandumpReplay};
