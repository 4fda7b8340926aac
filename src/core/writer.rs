//! Image index writer and container assembler
//!
//! [`ImageWriter`] collects one location per image entry and serializes the
//! index: header, redirect table, offset table, location stream and string
//! table. [`ImageAssembler`] drives a pool through it and appends resource
//! and tree content.
//!
//! The location stream starts with one reserved zero byte, so a zero in the
//! offset table always means an empty slot.

use crate::byte_order::ImageByteOrder;
use crate::error::{ImageError, Result};
use crate::header::Header;
use crate::location::LocationWriter;
use crate::perfect_hash::PerfectHashBuilder;
use crate::pool::{ResourceEntry, ResourcePool};
use crate::strings::{image_hash, StringTable, DEFAULT_SEED};
use crate::tree::ResourcesTree;
use indexmap::IndexMap;
use std::collections::HashMap;
use std::io;
use tracing::{debug, info, warn};

fn to_u32(value: usize, what: &str) -> Result<u32> {
    u32::try_from(value)
        .map_err(|_| ImageError::Internal(format!("{} of {} bytes exceeds the image format", what, value)))
}

/// Collects the locations of one image
#[derive(Debug)]
pub struct ImageWriter {
    byte_order: ImageByteOrder,
    strings: StringTable,
    locations: IndexMap<String, LocationWriter>,
}

impl ImageWriter {
    pub fn new(byte_order: ImageByteOrder, strings: StringTable) -> Self {
        ImageWriter {
            byte_order,
            strings,
            locations: IndexMap::new(),
        }
    }

    /// Add the location of `name`. Returns false, leaving the first location
    /// in place, when `name` already has one.
    pub fn add_location(
        &mut self,
        name: &str,
        content_offset: u64,
        compressed_size: u64,
        uncompressed_size: u64,
    ) -> bool {
        if self.locations.contains_key(name) {
            warn!("duplicate image location {} skipped", name);
            return false;
        }
        let location = LocationWriter::new_location(
            name,
            &mut self.strings,
            content_offset,
            compressed_size,
            uncompressed_size,
        );
        debug_assert_eq!(
            location.hash(DEFAULT_SEED),
            image_hash(name, DEFAULT_SEED),
            "chained hash of {} differs from its full name hash",
            name
        );
        self.locations.insert(name.to_string(), location);
        true
    }

    pub fn contains(&self, name: &str) -> bool {
        self.locations.contains_key(name)
    }

    pub fn add_string(&mut self, text: &str) -> u32 {
        self.strings.add(text)
    }

    pub fn strings(&self) -> &StringTable {
        &self.strings
    }

    pub fn location_count(&self) -> usize {
        self.locations.len()
    }

    /// Serialize the index. `resource_count` is the number of real
    /// resources among the locations.
    pub fn finish(self, resource_count: usize) -> Result<ImageIndex> {
        let order = self.byte_order;
        let mut builder = PerfectHashBuilder::new();
        for (name, location) in self.locations {
            builder.put(name, location);
        }
        let table = builder.build()?;
        let redirect = table.redirect().to_vec();

        let mut stream = vec![0u8];
        let mut offsets = vec![0u32; redirect.len()];
        let mut placed = HashMap::with_capacity(redirect.len());
        for (slot, entry) in table.into_order().into_iter().enumerate() {
            if let Some(entry) = entry {
                let (name, mut location) = entry.into_parts();
                offsets[slot] = location.write_to(&mut stream);
                placed.insert(name, location);
            }
        }

        let header = Header::new(
            to_u32(resource_count, "resource count")?,
            to_u32(redirect.len(), "hash table")?,
            to_u32(stream.len(), "location stream")?,
            to_u32(self.strings.size(), "string table")?,
        );

        let mut bytes = header.to_bytes(order);
        bytes.reserve(header.index_size() - bytes.len());
        for value in &redirect {
            order.put_i32(&mut bytes, *value);
        }
        for value in &offsets {
            order.put_u32(&mut bytes, *value);
        }
        bytes.extend_from_slice(&stream);
        bytes.extend_from_slice(self.strings.as_bytes());

        debug!(
            "image index: {} locations, table {}, {} location bytes, {} string bytes",
            placed.len(),
            redirect.len(),
            stream.len(),
            self.strings.size()
        );

        Ok(ImageIndex {
            header,
            bytes,
            stream,
            locations: placed,
            strings: self.strings,
        })
    }
}

/// The serialized index of an image, with its locations still at hand
#[derive(Debug)]
pub struct ImageIndex {
    header: Header,
    bytes: Vec<u8>,
    stream: Vec<u8>,
    locations: HashMap<String, LocationWriter>,
    strings: StringTable,
}

impl ImageIndex {
    pub fn header(&self) -> &Header {
        &self.header
    }

    /// Header and index bytes; content follows them in the image
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }

    pub fn strings(&self) -> &StringTable {
        &self.strings
    }

    /// Offset of the location record of `name` in the location stream
    pub fn location_offset(&self, name: &str) -> Option<u32> {
        self.locations.get(name)?.location_offset()
    }

    pub fn content_offset(&self, name: &str) -> Option<u64> {
        self.locations.get(name).map(LocationWriter::content_offset)
    }

    /// Encoded location record of `name`
    pub fn location(&self, name: &str) -> Option<&[u8]> {
        let offset = self.location_offset(name)? as usize;
        self.stream.get(offset..)
    }
}

/// A finished image and what was routed around it
#[derive(Debug)]
pub struct AssembledImage {
    pub bytes: Vec<u8>,
    pub header: Header,
    /// Entries kept out of the image, for an external file writer
    pub external_entries: Vec<ResourceEntry>,
    /// Resource paths the tree could not place
    pub malformed_paths: Vec<String>,
}

/// Assembles a pool into image bytes. Single use.
#[derive(Debug)]
pub struct ImageAssembler {
    byte_order: ImageByteOrder,
}

impl ImageAssembler {
    pub fn new(byte_order: ImageByteOrder) -> Self {
        ImageAssembler { byte_order }
    }

    /// Lay out every image entry of `pool`, then the synthetic tree.
    ///
    /// Compressed entries are stored as they are; their location records the
    /// stored size as compressed and the outermost stage input as
    /// uncompressed.
    pub fn assemble(self, pool: &ResourcePool, strings: StringTable) -> Result<AssembledImage> {
        let order = self.byte_order;
        let mut writer = ImageWriter::new(order, strings);
        let mut content = Vec::new();
        let mut external_entries = Vec::new();
        let mut image_paths = Vec::new();

        for entry in pool.entries() {
            if !entry.kind().is_image_content() {
                warn!("{} ({:?}) routed outside the image", entry.path(), entry.kind());
                external_entries.push(entry.clone());
                continue;
            }

            let offset = content.len() as u64;
            let stored = entry.content_length();
            let (compressed, uncompressed) = if entry.is_compressed() {
                let header = entry.compressed_header(order).ok_or_else(|| {
                    ImageError::Internal(format!("{} has no readable compressed header", entry.path()))
                })?;
                (stored, header.uncompressed_size)
            } else {
                (0, stored)
            };
            if !writer.add_location(entry.path(), offset, compressed, uncompressed) {
                continue;
            }

            let written = entry.write_to(&mut content)?;
            if written != stored {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!("{} yielded {} bytes, expected {}", entry.path(), written, stored),
                )
                .into());
            }
            image_paths.push(entry.path().to_string());
        }

        let resource_count = image_paths.len();
        let mut tree = ResourcesTree::build(&image_paths)?;
        let tree_end = tree.add_locations(&mut writer, content.len() as u64);
        let index = writer.finish(resource_count)?;

        let mut tree_content = Vec::with_capacity((tree_end - content.len() as u64) as usize);
        tree.write_content(&index, order, &mut tree_content)?;

        let header = *index.header();
        let mut bytes = index.into_bytes();
        let index_size = bytes.len();
        bytes.extend_from_slice(&content);
        bytes.extend_from_slice(&tree_content);

        info!(
            "image assembled: {} resources, {} external, index {} bytes, content {} bytes, tree {} bytes",
            resource_count,
            external_entries.len(),
            index_size,
            content.len(),
            tree_content.len()
        );

        Ok(AssembledImage {
            bytes,
            header,
            external_entries,
            malformed_paths: tree.malformed_paths().to_vec(),
        })
    }
}
