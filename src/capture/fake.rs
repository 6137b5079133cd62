//! Canned-frame device for running the capture loop without hardware

use bytes::Bytes;
use nix::errno::Errno;
use tracing::debug;

use crate::capture::frame::{FrameFormat, RawFrame};
use crate::capture::CaptureDevice;
use crate::daemon::Shutdown;
use crate::error::{Result, SnapshotError};

/// Replays a fixed list of frames through the single-buffer protocol.
///
/// Once the frames run out the device behaves as if it was unplugged,
/// unless it was built with [`FakeDevice::repeating`].
#[derive(Debug)]
pub struct FakeDevice {
    format: FrameFormat,
    frames: Vec<Bytes>,
    next: usize,
    repeat: bool,
    queued: bool,
    streaming: bool,
    current: Bytes,
    sequence: u32,
    enqueues: u64,
    stream_starts: u64,
}

impl FakeDevice {
    pub fn new(format: FrameFormat, frames: Vec<Bytes>) -> Self {
        Self {
            format,
            frames,
            next: 0,
            repeat: false,
            queued: false,
            streaming: false,
            current: Bytes::new(),
            sequence: 0,
            enqueues: 0,
            stream_starts: 0,
        }
    }

    /// Cycle through the frames forever
    pub fn repeating(mut self) -> Self {
        self.repeat = true;
        self
    }

    pub fn enqueues(&self) -> u64 {
        self.enqueues
    }

    pub fn stream_starts(&self) -> u64 {
        self.stream_starts
    }

    pub fn is_streaming(&self) -> bool {
        self.streaming
    }

    fn next_frame(&mut self) -> Option<Bytes> {
        if self.frames.is_empty() {
            return None;
        }
        if self.next >= self.frames.len() {
            if !self.repeat {
                return None;
            }
            self.next = 0;
        }
        let frame = self.frames[self.next].clone();
        self.next += 1;
        Some(frame)
    }
}

impl CaptureDevice for FakeDevice {
    fn format(&self) -> FrameFormat {
        self.format
    }

    fn enqueue(&mut self) -> Result<()> {
        if self.queued {
            return Err(SnapshotError::Protocol {
                op: "VIDIOC_QBUF",
                source: Errno::EINVAL,
            });
        }
        self.queued = true;
        self.enqueues += 1;
        Ok(())
    }

    fn ensure_streaming(&mut self) -> Result<()> {
        if !self.streaming {
            self.streaming = true;
            self.stream_starts += 1;
        }
        Ok(())
    }

    fn acquire(&mut self, shutdown: &Shutdown) -> Result<Option<RawFrame<'_>>> {
        if shutdown.is_requested() {
            return Ok(None);
        }
        if !self.queued || !self.streaming {
            return Err(SnapshotError::Protocol {
                op: "VIDIOC_DQBUF",
                source: Errno::EINVAL,
            });
        }

        let Some(frame) = self.next_frame() else {
            debug!("Fake device out of frames");
            return Err(SnapshotError::Protocol {
                op: "VIDIOC_DQBUF",
                source: Errno::ENODEV,
            });
        };

        self.queued = false;
        self.current = frame;
        self.sequence += 1;
        Ok(Some(RawFrame {
            data: &self.current,
            sequence: self.sequence,
            format: self.format,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::frame::{FieldMode, PixelFormat};

    fn device(frames: usize) -> FakeDevice {
        let format = FrameFormat::new(2, 1, PixelFormat::Yuyv, FieldMode::Progressive);
        let frames = (0..frames)
            .map(|i| Bytes::from(vec![i as u8, 128, i as u8, 128]))
            .collect();
        FakeDevice::new(format, frames)
    }

    #[test]
    fn replays_frames_in_order_then_disconnects() {
        let shutdown = Shutdown::new();
        let mut dev = device(2);
        assert!(!dev.is_streaming());

        for expected in 0..2u8 {
            dev.enqueue().unwrap();
            dev.ensure_streaming().unwrap();
            let frame = dev.acquire(&shutdown).unwrap().unwrap();
            assert_eq!(frame.data[0], expected);
            assert_eq!(frame.sequence, u32::from(expected) + 1);
        }

        dev.enqueue().unwrap();
        let err = dev.acquire(&shutdown).unwrap_err();
        assert!(matches!(
            err,
            SnapshotError::Protocol {
                source: Errno::ENODEV,
                ..
            }
        ));
        assert!(dev.is_streaming());
        assert_eq!(dev.stream_starts(), 1);
    }

    #[test]
    fn acquire_requires_an_enqueued_buffer() {
        let mut dev = device(1);
        dev.ensure_streaming().unwrap();
        assert!(dev.acquire(&Shutdown::new()).is_err());
    }

    #[test]
    fn double_enqueue_is_rejected() {
        let mut dev = device(1);
        dev.enqueue().unwrap();
        assert!(dev.enqueue().is_err());
    }

    #[test]
    fn repeating_device_wraps_around() {
        let shutdown = Shutdown::new();
        let mut dev = device(2).repeating();
        dev.ensure_streaming().unwrap();
        let seen: Vec<u8> = (0..5)
            .map(|_| {
                dev.enqueue().unwrap();
                dev.acquire(&shutdown).unwrap().unwrap().data[0]
            })
            .collect();
        assert_eq!(seen, [0, 1, 0, 1, 0]);
    }

    #[test]
    fn shutdown_abandons_acquire() {
        let shutdown = Shutdown::new();
        shutdown.request();
        let mut dev = device(1);
        dev.enqueue().unwrap();
        dev.ensure_streaming().unwrap();
        assert!(dev.acquire(&shutdown).unwrap().is_none());
    }
}
