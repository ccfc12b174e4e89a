// SPDX-License-Identifier: MIT

// === Core modules ===
pub mod error;
mod macros;
mod sg;

// === Backend modules ===
mod file;
mod mem;

// === Prelude re-exports (central entrypoint) ===
pub mod prelude {
    pub use super::BlockIO;
    pub use super::BlockIOExt;
    pub use super::BlockIOSetLen;
    pub use super::BlockIOStructExt;
    pub use super::error::*;
    pub use super::file::FileBlockIO;
    pub use super::mem::MemBlockIO;
    pub use super::sg::SgBuffer;
}

pub use file::FileBlockIO;
pub use mem::MemBlockIO;
pub use sg::SgBuffer;

// === Internal use ===
use error::*;
#[allow(clippy::single_component_path_imports)]
use paste;

// === Constants ===
/// Maximum size of internal scratch buffer (used for streaming/chunked ops).
const BLOCK_BUF_SIZE: usize = 8192;

// === Traits ===

/// Block IO abstraction trait.
///
/// Allows read/write/flush at arbitrary offsets.
/// Implementations may target RAM, regular files or block devices.
pub trait BlockIO {
    /// Writes `data` at `offset` (absolute).
    fn write_at(&mut self, offset: u64, data: &[u8]) -> BlockIOResult;

    /// Reads `buf.len()` bytes into `buf` from `offset` (absolute).
    fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> BlockIOResult;

    /// Flushes any buffered data (may be a no-op).
    fn flush(&mut self) -> BlockIOResult;

    /// Current length of the backing storage in bytes.
    fn len(&mut self) -> BlockIOResult<u64>;

    fn is_empty(&mut self) -> BlockIOResult<bool> {
        Ok(self.len()? == 0)
    }
}

/// Trait for setting the length of a BlockIO object.
///
/// Allows resizing the underlying storage (if supported by the backend).
pub trait BlockIOSetLen: BlockIO {
    /// Sets the length of the storage.
    fn set_len(&mut self, len: u64) -> BlockIOResult;
}

/// Extension helpers for BlockIO.
///
/// Provides optimized or convenient helpers:
/// - chunked reads/writes
/// - scatter-gather reads/writes
/// - zero fill, primitive writes
pub trait BlockIOExt: BlockIO {
    /// Reads `buf.len()` bytes from `offset` in chunks of `chunk_size` or less.
    #[inline(always)]
    fn read_in_chunks(&mut self, offset: u64, buf: &mut [u8], chunk_size: usize) -> BlockIOResult {
        let mut remaining = buf.len();
        let mut off = offset;
        let mut pos = 0;

        while remaining > 0 {
            let to_read = remaining.min(chunk_size);
            self.read_at(off, &mut buf[pos..pos + to_read])?;
            off += to_read as u64;
            pos += to_read;
            remaining -= to_read;
        }

        Ok(())
    }

    /// Writes `buf.len()` bytes at `offset` in chunks of `chunk_size` or less.
    #[inline(always)]
    fn write_in_chunks(&mut self, offset: u64, buf: &[u8], chunk_size: usize) -> BlockIOResult {
        let mut remaining = buf.len();
        let mut off = offset;
        let mut pos = 0;

        while remaining > 0 {
            let to_write = remaining.min(chunk_size);
            self.write_at(off, &buf[pos..pos + to_write])?;
            off += to_write as u64;
            pos += to_write;
            remaining -= to_write;
        }

        Ok(())
    }

    /// Fills a region with zeroes.
    ///
    /// Used to clear data ranges and punch fill patterns during format.
    #[inline(always)]
    fn zero_fill(&mut self, offset: u64, len: usize) -> BlockIOResult {
        const ZERO_BUF: [u8; BLOCK_BUF_SIZE] = [0u8; BLOCK_BUF_SIZE];
        let mut remaining = len;
        let mut off = offset;
        while remaining > 0 {
            let chunk = remaining.min(ZERO_BUF.len());
            self.write_at(off, &ZERO_BUF[..chunk])?;
            off += chunk as u64;
            remaining -= chunk;
        }
        Ok(())
    }

    /// Reads `len` bytes starting at `offset` into the scatter-gather buffer,
    /// advancing its cursor. Fails with `Short` if the buffer has less than
    /// `len` bytes of room left.
    fn read_sg_at(&mut self, offset: u64, sg: &mut SgBuffer<'_>, len: usize) -> BlockIOResult {
        if sg.remaining() < len {
            return Err(BlockIOError::Short);
        }
        let mut off = offset;
        let mut left = len;
        while left > 0 {
            let seg = sg.next_segment(left);
            self.read_at(off, seg)?;
            off += seg.len() as u64;
            left -= seg.len();
        }
        Ok(())
    }

    /// Writes `len` bytes from the scatter-gather buffer starting at `offset`,
    /// advancing its cursor. Fails with `Short` if the buffer runs dry.
    fn write_sg_at(&mut self, offset: u64, sg: &mut SgBuffer<'_>, len: usize) -> BlockIOResult {
        if sg.remaining() < len {
            return Err(BlockIOError::Short);
        }
        let mut off = offset;
        let mut left = len;
        while left > 0 {
            let seg = sg.next_segment(left);
            self.write_at(off, seg)?;
            off += seg.len() as u64;
            left -= seg.len();
        }
        Ok(())
    }

    // Implements read/write helpers for primitive types (u16, u32, u64)
    blockio_impl_primitive_rw!(u16, u32, u64);
}

impl<T: BlockIO + ?Sized> BlockIOExt for T {}

/// Extension trait for reading and writing structs using zerocopy.
///
/// Provides helpers to read a struct from a given offset and write a struct
/// at a given offset. Requires the struct to implement zerocopy traits for
/// safe conversion.
pub trait BlockIOStructExt: BlockIO {
    /// Reads a struct of type `T` from the given offset.
    fn read_struct<T: zerocopy::FromBytes + zerocopy::KnownLayout + zerocopy::Immutable>(
        &mut self,
        offset: u64,
    ) -> BlockIOResult<T> {
        let size = core::mem::size_of::<T>();
        let mut buf = vec![0u8; size];
        self.read_at(offset, &mut buf)?;
        T::read_from_bytes(&buf).map_err(|_| BlockIOError::Error("read_struct failed"))
    }

    /// Writes a struct of type `T` at the given offset.
    fn write_struct<T: zerocopy::IntoBytes + zerocopy::Immutable + ?Sized>(
        &mut self,
        offset: u64,
        val: &T,
    ) -> BlockIOResult {
        self.write_at(offset, val.as_bytes())
    }
}

impl<T: BlockIO + ?Sized> BlockIOStructExt for T {}
