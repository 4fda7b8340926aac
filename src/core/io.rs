//! Disk I/O for image files

use crate::error::{ImageError, Result};
use crate::header::HEADER_SIZE;
use memmap2::Mmap;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::ops::Deref;
use std::path::Path;

/// Image bytes, either owned or mapped from disk
#[derive(Debug)]
pub enum ImageData {
    Owned(Vec<u8>),
    Mapped(Mmap),
}

impl Deref for ImageData {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        match self {
            ImageData::Owned(bytes) => &bytes[..],
            ImageData::Mapped(map) => &map[..],
        }
    }
}

impl From<Vec<u8>> for ImageData {
    fn from(bytes: Vec<u8>) -> Self {
        ImageData::Owned(bytes)
    }
}

/// Write a finished image to `path`, replacing any existing file
pub fn write_image<P: AsRef<Path>>(path: P, bytes: &[u8]) -> Result<()> {
    let mut file = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(&path)?;

    file.write_all(bytes)?;
    file.flush()?;
    file.sync_all()?;

    Ok(())
}

/// Map an image file read-only
pub fn map_image<P: AsRef<Path>>(path: P) -> Result<ImageData> {
    let file = File::open(&path)?;
    let len = file.metadata()?.len();
    if len < HEADER_SIZE as u64 {
        return Err(ImageError::Truncated("header"));
    }

    // The mapping stays valid as long as nothing truncates the file underneath it.
    let map = unsafe { Mmap::map(&file)? };
    Ok(ImageData::Mapped(map))
}
