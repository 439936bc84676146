//! Host/device shared memory regions.

use crate::driver::{MemFlags, MemHandle};
use crate::util::AlignedBytes;
use bytemuck::Pod;
use std::fmt;

/// How the device may use a buffer. Fixed at creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AccessMode {
    /// Written by the host once, only read by kernels.
    ReadOnly,
    /// Written by kernels, read back by the host.
    WriteOnly,
    ReadWrite,
}

impl AccessMode {
    /// Whether kernels may read the buffer.
    pub fn can_read(self) -> bool {
        matches!(self, AccessMode::ReadOnly | AccessMode::ReadWrite)
    }

    /// Whether kernels may write the buffer.
    pub fn can_write(self) -> bool {
        matches!(self, AccessMode::WriteOnly | AccessMode::ReadWrite)
    }

    pub(crate) fn mem_flags(self) -> MemFlags {
        match self {
            AccessMode::ReadOnly => MemFlags::ReadOnly,
            AccessMode::WriteOnly => MemFlags::WriteOnly,
            AccessMode::ReadWrite => MemFlags::ReadWrite,
        }
    }
}

impl fmt::Display for AccessMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AccessMode::ReadOnly => "read-only",
            AccessMode::WriteOnly => "write-only",
            AccessMode::ReadWrite => "read-write",
        };
        f.write_str(name)
    }
}

/// A device memory object and the host region it was created from.
///
/// The host region is owned by the buffer. Blocking reads refresh it from
/// device memory; host to device copies update it before they are enqueued.
pub struct Buffer {
    handle: MemHandle,
    access: AccessMode,
    host: AlignedBytes,
}

impl Buffer {
    pub(crate) fn new(handle: MemHandle, access: AccessMode, host: AlignedBytes) -> Self {
        Self { handle, access, host }
    }

    pub(crate) fn handle(&self) -> MemHandle {
        self.handle
    }

    /// Size in bytes, fixed at creation.
    pub fn size(&self) -> usize {
        self.host.len()
    }

    pub fn access(&self) -> AccessMode {
        self.access
    }

    pub fn can_read(&self) -> bool {
        self.access.can_read()
    }

    pub fn can_write(&self) -> bool {
        self.access.can_write()
    }

    /// Host region as of the last blocking read or host copy.
    pub fn host_bytes(&self) -> &[u8] {
        self.host.as_bytes()
    }

    /// Typed view of the host region; `None` if the size is not a multiple
    /// of `T`.
    pub fn host_slice<T: Pod>(&self) -> Option<&[T]> {
        self.host.as_slice()
    }

    pub(crate) fn host_mut(&mut self) -> &mut [u8] {
        self.host.as_bytes_mut()
    }
}

impl fmt::Debug for Buffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Buffer")
            .field("handle", &self.handle)
            .field("access", &self.access)
            .field("size", &self.size())
            .finish()
    }
}
