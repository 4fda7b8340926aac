use crate::byte_order::ImageByteOrder;
use crate::compression::Decompressor;
use crate::error::{ImageError, Result};
use crate::pool::{ResourceEntry, ResourcePool};
use crate::strings::StringTable;

/// Read-only view of the final pool for consumers outside the image.
///
/// Entries come back decompressed, so an external file writer or a
/// post-processor never sees compressed headers.
#[derive(Debug, Clone)]
pub struct LastPool {
    pool: ResourcePool,
    strings: StringTable,
    decompressor: Decompressor,
}

impl LastPool {
    pub fn new(pool: ResourcePool, strings: StringTable) -> Self {
        Self::with_decompressor(pool, strings, Decompressor::new())
    }

    pub fn with_decompressor(pool: ResourcePool, strings: StringTable, decompressor: Decompressor) -> Self {
        LastPool {
            pool: pool.into_read_only(),
            strings,
            decompressor,
        }
    }

    /// Entry at `path` with its content decompressed
    pub fn find(&self, path: &str) -> Result<Option<ResourceEntry>> {
        self.pool.find(path).map(|entry| self.decompress(entry)).transpose()
    }

    /// Every entry, in pool order, decompressed
    pub fn entries(&self) -> impl Iterator<Item = Result<ResourceEntry>> + '_ {
        self.pool.entries().map(move |entry| self.decompress(entry))
    }

    pub fn content(&self, path: &str) -> Result<Option<Vec<u8>>> {
        match self.pool.find(path) {
            Some(entry) => self.plain_bytes(entry).map(Some),
            None => Ok(None),
        }
    }

    /// Always fails: the last pool is read-only
    pub fn add(&mut self, _entry: ResourceEntry) -> Result<()> {
        Err(ImageError::ReadOnlyPool)
    }

    /// The pool as stored, compressed entries untouched
    pub fn raw(&self) -> &ResourcePool {
        &self.pool
    }

    pub fn strings(&self) -> &StringTable {
        &self.strings
    }

    pub fn byte_order(&self) -> ImageByteOrder {
        self.pool.byte_order()
    }

    pub fn len(&self) -> usize {
        self.pool.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pool.is_empty()
    }

    fn plain_bytes(&self, entry: &ResourceEntry) -> Result<Vec<u8>> {
        let content = entry.content_bytes()?;
        self.decompressor
            .decompress_resource(&content, self.byte_order(), &self.strings)
    }

    fn decompress(&self, entry: &ResourceEntry) -> Result<ResourceEntry> {
        if !entry.is_compressed() {
            return Ok(entry.clone());
        }
        Ok(entry.copy_with_content(self.plain_bytes(entry)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compression::{compress, CompressionConfig};
    use crate::pool::{new_compressed_resource, ResourceKind};

    #[test]
    fn test_decompressed_view() {
        let order = ImageByteOrder::Big;
        let mut strings = StringTable::new();
        let original = ResourceEntry::new("m", "/m/p/A.class", ResourceKind::ClassOrResource, vec![9u8; 2000]);
        let packed = compress(&vec![9u8; 2000], &CompressionConfig::lz4()).unwrap();
        let compressed = new_compressed_resource(&original, &packed, "lz4", None, &mut strings, order).unwrap();

        let mut pool = ResourcePool::new(order);
        pool.add(compressed).unwrap();
        pool.add(ResourceEntry::new("m", "/m/p/B.txt", ResourceKind::ClassOrResource, b"plain".to_vec()))
            .unwrap();

        let mut last = LastPool::new(pool, strings);
        let a = last.find("/m/p/A.class").unwrap().unwrap();
        assert_eq!(a.content_length(), 2000);
        assert!(!a.is_compressed());
        assert!(last.raw().find("/m/p/A.class").unwrap().is_compressed());
        assert_eq!(last.content("/m/p/B.txt").unwrap().unwrap(), b"plain");
        assert!(last.find("/m/p/Missing").unwrap().is_none());
        assert_eq!(last.entries().filter_map(Result::ok).count(), 2);

        let extra = ResourceEntry::new("m", "/m/p/C.txt", ResourceKind::ClassOrResource, vec![]);
        assert!(matches!(last.add(extra), Err(ImageError::ReadOnlyPool)));
    }
}
