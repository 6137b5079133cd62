//! V4L2 single-buffer capture

use std::os::fd::{BorrowedFd, RawFd};
use std::os::raw::c_int;
use std::path::{Path, PathBuf};

use nix::errno::Errno;
use nix::poll::{poll, PollFd, PollFlags, PollTimeout};
use tracing::{debug, info, instrument, warn};
use v4l::capability::{Capabilities, Flags as CapFlags};
use v4l::video::Capture;
use v4l::{Device, Format};

use crate::capture::frame::{BufferDescriptor, FrameFormat, PixelFormat, RawFrame};
use crate::capture::mmap::MappedBuffer;
use crate::capture::sys::{self, V4l2Buffer, V4l2RequestBuffers};
use crate::capture::CaptureDevice;
use crate::daemon::Shutdown;
use crate::error::{Result, SnapshotError};
use crate::CaptureConfig;

/// How long one poll on the device may block before the shutdown flag is
/// looked at again
const ACQUIRE_POLL_MS: u16 = 250;

/// Open capture device plus its reported capabilities
pub struct V4l2Device {
    device: Device,
    path: PathBuf,
}

impl V4l2Device {
    pub fn open(path: &Path) -> Result<Self> {
        let device = Device::with_path(path).map_err(|source| SnapshotError::Open {
            path: path.to_path_buf(),
            source,
        })?;

        Ok(Self {
            device,
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn fd(&self) -> RawFd {
        self.device.handle().fd()
    }

    /// Query capabilities and require single-frame streaming capture
    pub fn query_capability(&self) -> Result<Capabilities> {
        let caps = self.device.query_caps().map_err(SnapshotError::Capability)?;
        info!("Device: {} ({})", caps.card, caps.driver);

        if !caps.capabilities.contains(CapFlags::VIDEO_CAPTURE) {
            return Err(SnapshotError::Unsupported {
                card: caps.card,
                missing: "video capture",
            });
        }
        if !caps.capabilities.contains(CapFlags::STREAMING) {
            return Err(SnapshotError::Unsupported {
                card: caps.card,
                missing: "streaming I/O",
            });
        }

        Ok(caps)
    }

    /// Request a format and return what the driver actually settled on
    pub fn negotiate_format(&self, requested: &FrameFormat) -> Result<FrameFormat> {
        let mut fmt = Format::new(requested.width, requested.height, requested.pixel_format.into());
        fmt.field_order = requested.field.into();

        let actual = self.device.set_format(&fmt).map_err(SnapshotError::Format)?;
        let negotiated = FrameFormat {
            width: actual.width,
            height: actual.height,
            pixel_format: actual.fourcc.into(),
            field: actual.field_order.into(),
            stride: actual.stride,
        };

        if negotiated.pixel_format != PixelFormat::Yuyv {
            return Err(SnapshotError::PixelFormat(negotiated.pixel_format.to_string()));
        }
        if (negotiated.width, negotiated.height) != (requested.width, requested.height) {
            warn!(
                "Device adjusted resolution from {}x{} to {}x{}",
                requested.width, requested.height, negotiated.width, negotiated.height
            );
        }
        if negotiated.field != requested.field {
            debug!(
                "Device adjusted field mode from {:?} to {:?}",
                requested.field, negotiated.field
            );
        }

        info!(
            "Negotiated {}x{} {} (stride {})",
            negotiated.width, negotiated.height, negotiated.pixel_format, negotiated.stride
        );
        Ok(negotiated)
    }

    /// Ask the driver for `count` mmap buffers and describe the first one
    pub fn request_buffers(&self, count: u32) -> Result<BufferDescriptor> {
        let mut req = V4l2RequestBuffers::mmap_capture(count);
        // SAFETY: `req` is a valid, initialized v4l2_requestbuffers
        unsafe { sys::vidioc_reqbufs(self.fd(), &mut req) }.map_err(SnapshotError::BufferRequest)?;

        if req.count == 0 {
            return Err(SnapshotError::NoBuffers);
        }
        if req.count > count {
            warn!(
                "Driver granted {} buffers, only the first is used",
                req.count
            );
        }

        let mut buf = V4l2Buffer::mmap_capture(0);
        // SAFETY: `buf` is a valid, initialized v4l2_buffer
        unsafe { sys::vidioc_querybuf(self.fd(), &mut buf) }
            .map_err(SnapshotError::BufferRequest)?;

        Ok(BufferDescriptor {
            index: buf.index,
            offset: buf.offset(),
            length: buf.length,
        })
    }
}

/// Negotiated device with its mapped buffer
pub struct V4l2Capture {
    // Taken and unmapped in `drop`, before the device fd closes
    buffer: Option<MappedBuffer>,
    descriptor: BufferDescriptor,
    device: V4l2Device,
    format: FrameFormat,
    streaming: bool,
}

impl V4l2Capture {
    /// Open, query, negotiate, request and map, in that order
    #[instrument(skip(config), fields(device = %config.device.display()))]
    pub fn initialize(config: &CaptureConfig) -> Result<Self> {
        info!("Initializing V4L2 capture");

        let device = V4l2Device::open(&config.device)?;
        device.query_capability()?;
        let format = device.negotiate_format(&config.format)?;
        let descriptor = device.request_buffers(1)?;
        let buffer = MappedBuffer::map(device.fd(), descriptor)?;

        if buffer.len() < format.frame_len() {
            warn!(
                "Capture buffer holds {} bytes, a full frame needs {}",
                buffer.len(),
                format.frame_len()
            );
        }

        info!("Capture buffer mapped ({} bytes)", buffer.len());
        Ok(Self {
            descriptor: buffer.descriptor(),
            buffer: Some(buffer),
            device,
            format,
            streaming: false,
        })
    }

    /// Device descriptor that must survive daemon detachment
    pub fn fd(&self) -> RawFd {
        self.device.fd()
    }

    fn buffer_type() -> c_int {
        sys::BUF_TYPE_VIDEO_CAPTURE as c_int
    }

    fn protocol(op: &'static str) -> impl FnOnce(Errno) -> SnapshotError {
        move |source| SnapshotError::Protocol { op, source }
    }
}

impl CaptureDevice for V4l2Capture {
    fn format(&self) -> FrameFormat {
        self.format
    }

    fn enqueue(&mut self) -> Result<()> {
        let mut buf = V4l2Buffer::mmap_capture(self.descriptor.index);
        // SAFETY: `buf` describes the buffer we requested and mapped
        unsafe { sys::vidioc_qbuf(self.fd(), &mut buf) }.map_err(Self::protocol("VIDIOC_QBUF"))?;
        Ok(())
    }

    fn ensure_streaming(&mut self) -> Result<()> {
        if self.streaming {
            return Ok(());
        }
        let buf_type = Self::buffer_type();
        // SAFETY: the argument is a plain buffer type
        unsafe { sys::vidioc_streamon(self.fd(), &buf_type) }
            .map_err(Self::protocol("VIDIOC_STREAMON"))?;
        self.streaming = true;
        debug!("Streaming on");
        Ok(())
    }

    fn acquire(&mut self, shutdown: &Shutdown) -> Result<Option<RawFrame<'_>>> {
        let fd = self.fd();
        let mut buf = V4l2Buffer::mmap_capture(self.descriptor.index);

        loop {
            if shutdown.is_requested() {
                return Ok(None);
            }

            // SAFETY: the descriptor stays open for the lifetime of `self`
            let borrowed = unsafe { BorrowedFd::borrow_raw(fd) };
            let mut fds = [PollFd::new(borrowed, PollFlags::POLLIN)];
            match poll(&mut fds, PollTimeout::from(ACQUIRE_POLL_MS)) {
                Ok(0) | Err(Errno::EINTR) => continue,
                Ok(_) => {}
                Err(e) => return Err(Self::protocol("poll")(e)),
            }

            // SAFETY: `buf` describes the buffer we requested and mapped
            match unsafe { sys::vidioc_dqbuf(fd, &mut buf) } {
                Ok(_) => break,
                Err(Errno::EAGAIN) | Err(Errno::EINTR) => continue,
                Err(e) => return Err(Self::protocol("VIDIOC_DQBUF")(e)),
            }
        }

        if buf.flags & sys::BUF_FLAG_ERROR != 0 {
            warn!("Driver flagged frame {} as corrupted", buf.sequence);
        }

        let Some(buffer) = &self.buffer else {
            return Err(Self::protocol("VIDIOC_DQBUF")(Errno::EBADF));
        };
        Ok(Some(RawFrame {
            data: buffer.filled(buf.bytesused as usize),
            sequence: buf.sequence,
            format: self.format,
        }))
    }
}

impl Drop for V4l2Capture {
    fn drop(&mut self) {
        if self.streaming {
            let buf_type = Self::buffer_type();
            // SAFETY: the argument is a plain buffer type
            if let Err(e) = unsafe { sys::vidioc_streamoff(self.fd(), &buf_type) } {
                debug!("VIDIOC_STREAMOFF failed: {}", e);
            }
        }
        if let Some(buffer) = self.buffer.take() {
            buffer.unmap();
        }
        info!("Releasing capture device {}", self.device.path().display());
    }
}
