// SPDX-License-Identifier: MIT

use crate::{BlockIO, BlockIOSetLen};
use crate::error::{BlockIOError, BlockIOResult};

/// In-memory implementation of `BlockIO`.
///
/// Useful for tests and RAM-backed emulated devices. Unlike a borrowed
/// buffer, the storage is owned so a device can hold the backend by value,
/// and `set_len` can grow it the way a fresh backing file is truncated up
/// during format.
#[derive(Debug, Default)]
pub struct MemBlockIO {
    buffer: Vec<u8>,
}

impl MemBlockIO {
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn with_len(len: usize) -> Self {
        Self {
            buffer: vec![0u8; len],
        }
    }

    #[inline]
    pub fn from_vec(buffer: Vec<u8>) -> Self {
        Self { buffer }
    }

    #[inline]
    pub fn as_slice(&self) -> &[u8] {
        &self.buffer
    }

    #[inline]
    fn check_bounds(&self, offset: u64, len: usize) -> BlockIOResult {
        let end = offset
            .checked_add(len as u64)
            .ok_or(BlockIOError::OutOfBounds)?;
        if end > self.buffer.len() as u64 {
            return Err(BlockIOError::OutOfBounds);
        }
        Ok(())
    }
}

impl BlockIO for MemBlockIO {
    #[inline(always)]
    fn write_at(&mut self, offset: u64, data: &[u8]) -> BlockIOResult {
        self.check_bounds(offset, data.len())?;
        let dst = &mut self.buffer[offset as usize..offset as usize + data.len()];
        dst.copy_from_slice(data);
        Ok(())
    }

    #[inline(always)]
    fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> BlockIOResult {
        self.check_bounds(offset, buf.len())?;
        let src = &self.buffer[offset as usize..offset as usize + buf.len()];
        buf.copy_from_slice(src);
        Ok(())
    }

    #[inline]
    fn flush(&mut self) -> BlockIOResult {
        Ok(())
    }

    #[inline]
    fn len(&mut self) -> BlockIOResult<u64> {
        Ok(self.buffer.len() as u64)
    }
}

impl BlockIOSetLen for MemBlockIO {
    fn set_len(&mut self, new_len: u64) -> BlockIOResult {
        let new_len = usize::try_from(new_len).map_err(|_| BlockIOError::OutOfBounds)?;
        self.buffer.resize(new_len, 0);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prelude::*;

    #[test]
    fn test_rw() {
        let mut io = MemBlockIO::with_len(256);
        io.write_at(10, &[1, 2, 3, 4]).unwrap();

        let mut output = [0u8; 4];
        io.read_at(10, &mut output).unwrap();
        assert_eq!(output, [1, 2, 3, 4]);
    }

    #[test]
    fn test_out_of_bounds() {
        let mut io = MemBlockIO::with_len(16);
        assert_eq!(
            io.write_at(14, &[0u8; 4]).unwrap_err(),
            BlockIOError::OutOfBounds
        );
        assert_eq!(
            io.read_at(u64::MAX, &mut [0u8; 2]).unwrap_err(),
            BlockIOError::OutOfBounds
        );
    }

    #[test]
    fn test_set_len_grows_zeroed() {
        let mut io = MemBlockIO::new();
        io.set_len(512).unwrap();
        assert_eq!(io.len().unwrap(), 512);

        let mut buf = [0xAA; 8];
        io.read_at(504, &mut buf).unwrap();
        assert_eq!(buf, [0u8; 8]);
    }
}
