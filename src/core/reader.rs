//! Image reader
//!
//! Looks resources up through the serialized perfect hash table without
//! building any in-memory index. Works over owned bytes or a mapped file.

use crate::byte_order::ImageByteOrder;
use crate::compression::Decompressor;
use crate::error::{ImageError, Result};
use crate::header::{detect_byte_order, Header, SLOT_SIZE};
use crate::io::{map_image, ImageData};
use crate::location::ImageLocation;
use crate::perfect_hash::find_slot;
use crate::strings::{read_string, StringLookup};
use crate::tree::PackageReference;
use std::path::Path;

/// String table of a serialized image
#[derive(Debug, Clone, Copy)]
pub struct ImageStrings<'a> {
    bytes: &'a [u8],
}

impl StringLookup for ImageStrings<'_> {
    fn lookup(&self, offset: u32) -> Option<String> {
        read_string(self.bytes, offset)
    }
}

#[derive(Debug)]
pub struct ImageReader {
    data: ImageData,
    header: Header,
    byte_order: ImageByteOrder,
    decompressor: Decompressor,
}

impl ImageReader {
    pub fn from_bytes(bytes: Vec<u8>) -> Result<Self> {
        Self::from_data(ImageData::from(bytes))
    }

    /// Map the image at `path`
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::from_data(map_image(path)?)
    }

    pub fn from_data(data: ImageData) -> Result<Self> {
        let byte_order = detect_byte_order(&data)?;
        let header = Header::from_bytes(&data, byte_order)?;
        if data.len() < header.index_size() {
            return Err(ImageError::Truncated("image index"));
        }
        Ok(ImageReader {
            data,
            header,
            byte_order,
            decompressor: Decompressor::new(),
        })
    }

    /// Replace the codecs used by [`ImageReader::read_resource`]
    pub fn with_decompressor(mut self, decompressor: Decompressor) -> Self {
        self.decompressor = decompressor;
        self
    }

    pub fn header(&self) -> &Header {
        &self.header
    }

    pub fn byte_order(&self) -> ImageByteOrder {
        self.byte_order
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn strings(&self) -> ImageStrings<'_> {
        ImageStrings {
            bytes: &self.data[self.header.strings_offset()..self.header.index_size()],
        }
    }

    fn table_value(&self, base: usize, slot: usize) -> Option<u32> {
        if slot >= self.header.table_length as usize {
            return None;
        }
        self.byte_order.read_u32(self.data.get(base + slot * SLOT_SIZE..)?)
    }

    /// Decode the location record at `offset` in the location stream
    pub fn location_at(&self, offset: u32) -> Result<ImageLocation> {
        let start = self.header.locations_offset();
        let end = self.header.strings_offset();
        let stream = self
            .data
            .get(start + offset as usize..end)
            .ok_or(ImageError::Truncated("location stream"))?;
        ImageLocation::decode(stream)
    }

    /// Location of `name`, if the image holds it
    pub fn find(&self, name: &str) -> Result<Option<ImageLocation>> {
        let redirect_base = self.header.redirect_offset();
        let slot = find_slot(self.header.table_length as usize, name, |i| {
            self.table_value(redirect_base, i).map(|v| v as i32)
        });
        let Some(slot) = slot else {
            return Ok(None);
        };
        let offset = match self.table_value(self.header.offsets_offset(), slot) {
            Some(0) | None => return Ok(None),
            Some(offset) => offset,
        };

        let location = self.location_at(offset)?;
        if location.verify(name, &self.strings()) {
            Ok(Some(location))
        } else {
            Ok(None)
        }
    }

    /// Content bytes as stored for `location`, compressed headers included
    pub fn resource_bytes(&self, location: &ImageLocation) -> Result<&[u8]> {
        let start = (self.header.index_size() as u64).checked_add(location.content_offset());
        let end = start.and_then(|start| start.checked_add(location.stored_size()));
        let range = match (start.map(usize::try_from), end.map(usize::try_from)) {
            (Some(Ok(start)), Some(Ok(end))) => Some(start..end),
            _ => None,
        };
        range
            .and_then(|range| self.data.get(range))
            .ok_or(ImageError::Truncated("resource content"))
    }

    /// Plain content of `name`, every compression stage undone
    pub fn read_resource(&self, name: &str) -> Result<Option<Vec<u8>>> {
        let Some(location) = self.find(name)? else {
            return Ok(None);
        };
        let stored = self.resource_bytes(&location)?;
        if location.compressed_size() == 0 {
            return Ok(Some(stored.to_vec()));
        }
        self.decompressor
            .decompress_bounded(
                stored,
                self.byte_order,
                &self.strings(),
                location.uncompressed_size(),
            )
            .map(Some)
    }

    /// Full names of the children of a directory entry such as
    /// `/modules/m1/p`
    pub fn list_directory(&self, name: &str) -> Result<Option<Vec<String>>> {
        let Some(location) = self.find(name)? else {
            return Ok(None);
        };
        let content = self.resource_bytes(&location)?;
        let strings = self.strings();
        let mut children = Vec::with_capacity(content.len() / SLOT_SIZE);
        for chunk in content.chunks_exact(SLOT_SIZE) {
            let offset = self
                .byte_order
                .read_u32(chunk)
                .ok_or(ImageError::Truncated("directory entry"))?;
            let child = self.location_at(offset)?;
            let child_name = child.full_name(&strings).ok_or_else(|| {
                ImageError::Internal(format!("child of {} has unresolvable name", name))
            })?;
            children.push(child_name);
        }
        Ok(Some(children))
    }

    /// Modules referencing the dotted `package`
    pub fn package_modules(&self, package: &str) -> Result<Option<Vec<PackageReference>>> {
        let Some(location) = self.find(&format!("/packages/{}", package))? else {
            return Ok(None);
        };
        let content = self.resource_bytes(&location)?;
        let strings = self.strings();
        let mut refs = Vec::with_capacity(content.len() / 8);
        for pair in content.chunks_exact(8) {
            let (is_empty, module) = self
                .byte_order
                .read_i32(pair)
                .zip(self.byte_order.read_i32(&pair[4..]))
                .ok_or(ImageError::Truncated("package reference"))?;
            let module = strings.lookup(module as u32).ok_or_else(|| {
                ImageError::Internal(format!("module name of package {} not in string table", package))
            })?;
            refs.push(PackageReference {
                module,
                is_empty: is_empty != 0,
            });
        }
        Ok(Some(refs))
    }

    /// Names of every entry, in offset table order
    pub fn entry_names(&self) -> Result<Vec<String>> {
        let strings = self.strings();
        let base = self.header.offsets_offset();
        let mut names = Vec::with_capacity(self.header.table_length as usize);
        for slot in 0..self.header.table_length as usize {
            match self.table_value(base, slot) {
                Some(0) => {}
                Some(offset) => {
                    let location = self.location_at(offset)?;
                    let name = location.full_name(&strings).ok_or_else(|| {
                        ImageError::Internal(format!("location at {} has unresolvable name", offset))
                    })?;
                    names.push(name);
                }
                None => return Err(ImageError::Truncated("offset table")),
            }
        }
        Ok(names)
    }

    /// Resource names only, synthetic tree entries left out
    pub fn resource_names(&self) -> Result<Vec<String>> {
        let mut names = self.entry_names()?;
        names.retain(|name| !is_tree_entry(name));
        Ok(names)
    }
}

fn is_tree_entry(name: &str) -> bool {
    name == "/modules"
        || name == "/packages"
        || name.starts_with("/modules/")
        || name.starts_with("/packages/")
}
