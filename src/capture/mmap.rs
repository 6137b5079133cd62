//! The single memory-mapped capture buffer

use std::os::fd::RawFd;

use memmap2::{Mmap, MmapOptions};
use tracing::debug;

use crate::capture::frame::BufferDescriptor;
use crate::error::{Result, SnapshotError};

/// Device memory mapped into the process.
///
/// The mapping is released by [`MappedBuffer::unmap`] or, on any other exit
/// path, when the value is dropped. Either way it happens exactly once.
pub struct MappedBuffer {
    map: Mmap,
    descriptor: BufferDescriptor,
}

impl MappedBuffer {
    /// Map the buffer the driver described at `descriptor.offset`
    pub fn map(fd: RawFd, descriptor: BufferDescriptor) -> Result<Self> {
        let length = descriptor.length as usize;

        // SAFETY: the driver owns this region until the fd is closed, and we
        // only read from it between a successful dequeue and the next enqueue.
        let map = unsafe {
            MmapOptions::new()
                .offset(u64::from(descriptor.offset))
                .len(length)
                .map(fd)
        }
        .map_err(|source| SnapshotError::Map {
            offset: descriptor.offset,
            length,
            source,
        })?;

        debug!(
            "Mapped capture buffer {} ({} bytes at offset {:#x})",
            descriptor.index, length, descriptor.offset
        );

        Ok(Self { map, descriptor })
    }

    pub fn descriptor(&self) -> BufferDescriptor {
        self.descriptor
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// The first `used` bytes of the buffer, clamped to its length
    pub fn filled(&self, used: usize) -> &[u8] {
        &self.map[..used.min(self.map.len())]
    }

    /// Release the mapping now instead of at scope exit
    pub fn unmap(self) {
        debug!("Unmapping capture buffer {}", self.descriptor.index);
        drop(self);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::os::fd::AsRawFd;

    #[test]
    fn maps_and_clamps_filled_region() {
        let mut file = tempfile::tempfile().unwrap();
        file.write_all(&[7u8; 4096]).unwrap();

        let descriptor = BufferDescriptor {
            index: 0,
            offset: 0,
            length: 4096,
        };
        let buffer = MappedBuffer::map(file.as_raw_fd(), descriptor).unwrap();

        assert_eq!(buffer.len(), 4096);
        assert_eq!(buffer.filled(16), &[7u8; 16]);
        assert_eq!(buffer.filled(10_000).len(), 4096);
        buffer.unmap();
    }

    #[test]
    fn bad_descriptor_is_a_map_error() {
        let descriptor = BufferDescriptor {
            index: 0,
            offset: 0,
            length: 4096,
        };
        let err = MappedBuffer::map(-1, descriptor).err().unwrap();
        assert!(matches!(err, SnapshotError::Map { length: 4096, .. }));
    }
}
