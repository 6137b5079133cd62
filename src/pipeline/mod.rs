pub mod capture_loop;
pub mod convert;
pub mod encode;

pub use capture_loop::{CaptureLoop, LoopExit, LoopState, LoopSummary};
