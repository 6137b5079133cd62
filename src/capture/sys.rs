//! Raw V4L2 buffer ioctls that the `v4l` crate only exposes through its
//! multi-buffer stream types.

use std::os::raw::{c_int, c_ulong, c_void};

pub const BUF_TYPE_VIDEO_CAPTURE: u32 = 1;
pub const MEMORY_MMAP: u32 = 1;
/// Driver flagged the buffer contents as corrupted
pub const BUF_FLAG_ERROR: u32 = 0x0000_0040;

#[repr(C)]
#[derive(Debug, Default, Clone, Copy)]
pub struct V4l2RequestBuffers {
    pub count: u32,
    pub type_: u32,
    pub memory: u32,
    pub capabilities: u32,
    pub flags: u8,
    pub reserved: [u8; 3],
}

impl V4l2RequestBuffers {
    pub fn mmap_capture(count: u32) -> Self {
        Self {
            count,
            type_: BUF_TYPE_VIDEO_CAPTURE,
            memory: MEMORY_MMAP,
            ..Default::default()
        }
    }
}

#[repr(C)]
#[derive(Debug, Default, Clone, Copy)]
pub struct V4l2Timecode {
    pub type_: u32,
    pub flags: u32,
    pub frames: u8,
    pub seconds: u8,
    pub minutes: u8,
    pub hours: u8,
    pub userbits: [u8; 4],
}

#[repr(C)]
#[derive(Clone, Copy)]
pub union V4l2BufferLocation {
    pub offset: u32,
    pub userptr: c_ulong,
    pub planes: *mut c_void,
    pub fd: i32,
}

#[repr(C)]
#[derive(Clone, Copy)]
pub struct V4l2Buffer {
    pub index: u32,
    pub type_: u32,
    pub bytesused: u32,
    pub flags: u32,
    pub field: u32,
    pub timestamp: libc::timeval,
    pub timecode: V4l2Timecode,
    pub sequence: u32,
    pub memory: u32,
    pub m: V4l2BufferLocation,
    pub length: u32,
    pub reserved2: u32,
    pub request_fd: i32,
}

impl V4l2Buffer {
    pub fn mmap_capture(index: u32) -> Self {
        Self {
            index,
            type_: BUF_TYPE_VIDEO_CAPTURE,
            bytesused: 0,
            flags: 0,
            field: 0,
            timestamp: libc::timeval {
                tv_sec: 0,
                tv_usec: 0,
            },
            timecode: V4l2Timecode::default(),
            sequence: 0,
            memory: MEMORY_MMAP,
            m: V4l2BufferLocation { userptr: 0 },
            length: 0,
            reserved2: 0,
            request_fd: 0,
        }
    }

    pub fn offset(&self) -> u32 {
        // SAFETY: MMAP buffers always report their location through `offset`
        unsafe { self.m.offset }
    }
}

nix::ioctl_readwrite!(vidioc_reqbufs, b'V', 8, V4l2RequestBuffers);
nix::ioctl_readwrite!(vidioc_querybuf, b'V', 9, V4l2Buffer);
nix::ioctl_readwrite!(vidioc_qbuf, b'V', 15, V4l2Buffer);
nix::ioctl_readwrite!(vidioc_dqbuf, b'V', 17, V4l2Buffer);
nix::ioctl_write_ptr!(vidioc_streamon, b'V', 18, c_int);
nix::ioctl_write_ptr!(vidioc_streamoff, b'V', 19, c_int);

#[cfg(test)]
mod tests {
    use super::*;
    use std::mem::size_of;

    #[test]
    fn request_buffers_matches_kernel_layout() {
        assert_eq!(size_of::<V4l2RequestBuffers>(), 20);
    }

    #[cfg(target_pointer_width = "64")]
    #[test]
    fn buffer_matches_kernel_layout() {
        assert_eq!(size_of::<V4l2Timecode>(), 16);
        assert_eq!(size_of::<V4l2Buffer>(), 88);
    }

    #[test]
    fn mmap_buffer_starts_zeroed() {
        let buf = V4l2Buffer::mmap_capture(0);
        assert_eq!(buf.offset(), 0);
        assert_eq!(buf.type_, BUF_TYPE_VIDEO_CAPTURE);
        assert_eq!(buf.memory, MEMORY_MMAP);
    }
}
