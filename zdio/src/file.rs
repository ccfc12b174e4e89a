// SPDX-License-Identifier: MIT

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

use crate::{BlockIO, BlockIOSetLen};
use crate::error::BlockIOResult;

/// File-backed implementation of `BlockIO`.
#[derive(Debug)]
pub struct FileBlockIO {
    file: File,
}

impl FileBlockIO {
    #[inline]
    pub fn new(file: File) -> Self {
        Self { file }
    }

    /// Opens `path` read-write, creating it if absent.
    pub fn open_or_create<P: AsRef<Path>>(path: P) -> BlockIOResult<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?;
        Ok(Self { file })
    }

    #[inline]
    pub fn file(&self) -> &File {
        &self.file
    }
}

impl BlockIO for FileBlockIO {
    fn write_at(&mut self, offset: u64, data: &[u8]) -> BlockIOResult {
        self.file.seek(SeekFrom::Start(offset))?;
        self.file.write_all(data)?;
        Ok(())
    }

    fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> BlockIOResult {
        self.file.seek(SeekFrom::Start(offset))?;
        self.file.read_exact(buf)?;
        Ok(())
    }

    fn flush(&mut self) -> BlockIOResult {
        self.file.flush()?;
        self.file.sync_data()?;
        Ok(())
    }

    fn len(&mut self) -> BlockIOResult<u64> {
        Ok(self.file.metadata()?.len())
    }
}

impl BlockIOSetLen for FileBlockIO {
    fn set_len(&mut self, len: u64) -> BlockIOResult {
        self.file.set_len(len)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prelude::*;
    use tempfile::tempfile;

    #[test]
    fn test_rw() {
        let mut io = FileBlockIO::new(tempfile().unwrap());
        io.write_at(10, &[1, 2, 3, 4]).unwrap();

        let mut output = [0u8; 4];
        io.read_at(10, &mut output).unwrap();
        assert_eq!(output, [1, 2, 3, 4]);
    }

    #[test]
    fn test_set_len() {
        let mut io = FileBlockIO::new(tempfile().unwrap());
        io.set_len(4096).unwrap();
        assert_eq!(io.len().unwrap(), 4096);

        let mut buf = [0xFF; 16];
        io.read_at(4080, &mut buf).unwrap();
        assert_eq!(buf, [0u8; 16]);
    }

    #[test]
    fn test_sg_roundtrip_on_file() {
        let mut io = FileBlockIO::new(tempfile().unwrap());
        io.set_len(64).unwrap();

        let mut a = *b"zoned";
        let mut b = *b" block dev";
        {
            let mut segs: [&mut [u8]; 2] = [&mut a, &mut b];
            let mut sg = SgBuffer::new(&mut segs);
            io.write_sg_at(8, &mut sg, 15).unwrap();
        }

        let mut back = [0u8; 15];
        io.read_at(8, &mut back).unwrap();
        assert_eq!(&back, b"zoned block dev");
    }
}
