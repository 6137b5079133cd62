pub mod fake;
pub mod frame;
pub mod mmap;
pub mod sys;
pub mod v4l2;

pub use fake::FakeDevice;
pub use frame::{BufferDescriptor, FieldMode, FrameFormat, PixelFormat, RawFrame};
pub use mmap::MappedBuffer;
pub use v4l2::{V4l2Capture, V4l2Device};

use crate::daemon::Shutdown;
use crate::error::Result;

/// Acquire/release protocol of a single-buffer capture device.
///
/// One cycle is `enqueue`, `ensure_streaming`, `acquire`; the returned frame
/// borrows the device, so it must be consumed before the next `enqueue`.
pub trait CaptureDevice {
    /// The format the device actually produces
    fn format(&self) -> FrameFormat;

    /// Hand the buffer to the device for filling
    fn enqueue(&mut self) -> Result<()>;

    /// Turn streaming on if it is not on already
    fn ensure_streaming(&mut self) -> Result<()>;

    /// Wait for the buffer to be filled.
    ///
    /// Returns `Ok(None)` when shutdown was requested while waiting.
    fn acquire(&mut self, shutdown: &Shutdown) -> Result<Option<RawFrame<'_>>>;
}
