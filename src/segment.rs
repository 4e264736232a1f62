//! Named POSIX shared-memory segments.
//!
//! The process that creates a segment is the only one responsible for
//! unlinking it; consumers only map and unmap. Dropping a `Segment` unmaps
//! the local view and never destroys the name.

use crate::{ShmqError, ShmqResult};
use memmap2::{Mmap, MmapMut, MmapOptions};
use nix::errno::Errno;
use nix::fcntl::OFlag;
use nix::sys::mman::{shm_open, shm_unlink};
use nix::sys::stat::Mode;
use rand::Rng;
use std::fs::File;
use std::sync::atomic::{AtomicU64, Ordering};

// Retries of the name generator when shm_open reports EEXIST.
const MAX_CREATE_ATTEMPTS: u32 = 16;

static SEGMENT_SEQ: AtomicU64 = AtomicU64::new(0);

#[derive(Debug)]
enum Mapping {
    Writable(MmapMut),
    ReadOnly(Mmap),
}

/// A mapped shared-memory segment.
#[derive(Debug)]
pub(crate) struct Segment {
    name: String,
    mapping: Mapping,
}

impl Segment {
    /// Allocates a new uniquely named segment of exactly `size` bytes and
    /// maps it writable.
    pub(crate) fn create(size: usize) -> ShmqResult<Self> {
        if size == 0 {
            // Every header holds at least one tag byte; a zero-sized
            // mapping cannot occur on the regular path.
            return Err(ShmqError::segment(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "segment size must be positive",
            )));
        }
        for _ in 0..MAX_CREATE_ATTEMPTS {
            let name = generate_name();
            let fd = match shm_open(
                name.as_str(),
                OFlag::O_CREAT | OFlag::O_EXCL | OFlag::O_RDWR,
                Mode::S_IRUSR | Mode::S_IWUSR,
            ) {
                Ok(fd) => fd,
                Err(Errno::EEXIST) => continue,
                Err(errno) => return Err(errno.into()),
            };
            let file = File::from(fd);
            match Self::prepare(&file, size) {
                Ok(mmap) => {
                    trace!("created segment {name} ({size} bytes)");
                    return Ok(Self { name, mapping: Mapping::Writable(mmap) });
                }
                Err(e) => {
                    // The name must not outlive a failed allocation.
                    let _ = shm_unlink(name.as_str());
                    return Err(e);
                }
            }
        }
        Err(ShmqError::segment(std::io::Error::new(
            std::io::ErrorKind::AlreadyExists,
            "could not find a free segment name",
        )))
    }

    fn prepare(file: &File, size: usize) -> ShmqResult<MmapMut> {
        let len = i64::try_from(size).map_err(|_| {
            ShmqError::segment(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "segment size exceeds the offset range",
            ))
        })?;
        nix::unistd::ftruncate(file, len)?;
        // Safety: the segment was created with O_EXCL and is resized and
        // written only here, before the descriptor is published.
        unsafe { MmapOptions::new().len(size).map_mut(file) }.map_err(ShmqError::segment)
    }

    /// Maps an existing segment read-only.
    pub(crate) fn open(name: &str, size: usize) -> ShmqResult<Self> {
        let fd = shm_open(name, OFlag::O_RDONLY, Mode::empty())?;
        let file = File::from(fd);
        // Safety: the creating side never writes again once the descriptor
        // is published; this side only reads.
        let mmap =
            unsafe { MmapOptions::new().len(size).map(&file) }.map_err(ShmqError::segment)?;
        trace!("opened segment {name} ({size} bytes)");
        Ok(Self { name: name.to_string(), mapping: Mapping::ReadOnly(mmap) })
    }

    pub(crate) fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn len(&self) -> usize {
        match &self.mapping {
            Mapping::Writable(m) => m.len(),
            Mapping::ReadOnly(m) => m.len(),
        }
    }

    /// Copies `bytes` into the mapped region at `offset`.
    pub(crate) fn write(&mut self, offset: usize, bytes: &[u8]) -> ShmqResult<()> {
        let Mapping::Writable(mmap) = &mut self.mapping else {
            return Err(ShmqError::segment(std::io::Error::new(
                std::io::ErrorKind::PermissionDenied,
                "segment is mapped read-only",
            )));
        };
        let end = offset
            .checked_add(bytes.len())
            .filter(|end| *end <= mmap.len())
            .ok_or_else(|| {
                ShmqError::segment(std::io::Error::new(
                    std::io::ErrorKind::InvalidInput,
                    "write beyond the end of the segment",
                ))
            })?;
        mmap[offset..end].copy_from_slice(bytes);
        Ok(())
    }

    pub(crate) fn as_slice(&self) -> &[u8] {
        match &self.mapping {
            Mapping::Writable(m) => m,
            Mapping::ReadOnly(m) => m,
        }
    }

    /// Removes the name from the OS namespace; the kernel reclaims the
    /// storage once the last mapping is gone. A name that is already gone
    /// is not an error.
    pub(crate) fn unlink(&self) -> ShmqResult<()> {
        unlink_name(&self.name)
    }
}

pub(crate) fn unlink_name(name: &str) -> ShmqResult<()> {
    match shm_unlink(name) {
        Ok(()) | Err(Errno::ENOENT) => Ok(()),
        Err(errno) => Err(errno.into()),
    }
}

fn generate_name() -> String {
    let seq = SEGMENT_SEQ.fetch_add(1, Ordering::Relaxed);
    let nonce: u32 = rand::thread_rng().gen();
    format!("/shmq-{}-{seq}-{nonce:08x}", std::process::id())
}
