//! # modimage - Indexed Module Resource Images
//!
//! `modimage-rs` builds a single read-only container holding the resources of
//! many named modules:
//!
//! - **Resource pool** with per-module views, duplicate and path checks
//! - **Plugin pipeline**: filters, sorters and compressors run in category
//!   order, with an optional frozen resource order
//! - **Perfect-hash index**: every lookup costs one or two hash computations
//! - **Synthetic tree**: `/modules/<module>/...` directories and
//!   `/packages/<package>` ownership records
//! - **Reader** over owned bytes or a memory-mapped file
//!
//! ## Quick Start
//!
//! ```rust
//! use modimage::{ImageBuilder, ImageByteOrder, Result};
//!
//! # fn main() -> Result<()> {
//! let mut builder = ImageBuilder::new(ImageByteOrder::Little);
//! builder.add_bytes("app.core", "/app.core/app/Main.class", b"main".to_vec())?;
//! builder.add_bytes("app.core", "/app.core/app/util/Strings.class", b"util".to_vec())?;
//!
//! let image = builder.build()?;
//! let reader = image.reader()?;
//! assert_eq!(reader.read_resource("/app.core/app/Main.class")?.unwrap(), b"main");
//! assert_eq!(reader.package_modules("app.util")?.unwrap()[0].module, "app.core");
//! # Ok(())
//! # }
//! ```
//!
//! ## Configured Builds
//!
//! ```rust,no_run
//! use modimage::{BuildConfig, ImageBuilder, Result};
//!
//! # fn main() -> Result<()> {
//! let config = BuildConfig::load("image.toml")?;
//! let mut builder = ImageBuilder::from_config(config)?;
//! builder.add_bytes("app.core", "/app.core/app/Main.class", b"main".to_vec())?;
//! builder.build()?.write_to_path("app.image")?;
//! # Ok(())
//! # }
//! ```

pub mod core;

pub use crate::core::{
    archive, byte_order, compression, config, error, header, io, location, perfect_hash, plugin,
    pool, reader, strings, tree, validation, writer,
};

pub use crate::core::{
    archive::{Archive, ArchiveEntry, InMemoryArchive},
    byte_order::ImageByteOrder,
    compression::{CompressionConfig, CompressionMethod, Decompressor, ResourceCodec},
    config::{BuildConfig, PluginConfig},
    error::{ImageError, Result},
    header::Header,
    plugin::{Category, CompressPlugin, ExcludePlugin, LastPool, OrderPlugin, Plugin, PluginStack},
    pool::{ResourceEntry, ResourceKind, ResourcePool, ResourcePoolBuilder, ResourcePoolModule},
    reader::ImageReader,
    strings::StringTable,
    tree::PackageReference,
    writer::{AssembledImage, ImageAssembler},
};

use std::path::Path;
use tracing::info;

/// One image build
///
/// Collects resources, runs them through the plugin stack and assembles the
/// container. [`ImageBuilder::build`] consumes the builder, so an image is
/// serialized exactly once.
#[derive(Debug)]
pub struct ImageBuilder {
    byte_order: ImageByteOrder,
    stack: PluginStack,
    pool: ResourcePool,
}

impl ImageBuilder {
    /// Builder with no plugins
    pub fn new(byte_order: ImageByteOrder) -> Self {
        ImageBuilder {
            byte_order,
            stack: PluginStack::new(),
            pool: ResourcePool::new(byte_order),
        }
    }

    /// Builder with the byte order and plugins of `config`
    pub fn from_config(config: BuildConfig) -> Result<Self> {
        let byte_order = config.byte_order();
        let stack = config.into_stack()?;
        Ok(ImageBuilder {
            byte_order,
            stack,
            pool: ResourcePool::new(byte_order),
        })
    }

    pub fn with_plugin(mut self, plugin: Box<dyn Plugin>) -> Self {
        self.stack.push(plugin);
        self
    }

    /// Freeze the resource order after the plugin named `name`
    pub fn with_last_sorter(mut self, name: impl Into<String>) -> Self {
        self.stack.set_last_sorter(name);
        self
    }

    pub fn byte_order(&self) -> ImageByteOrder {
        self.byte_order
    }

    pub fn add_resource(&mut self, entry: ResourceEntry) -> Result<()> {
        self.pool.add(entry)
    }

    /// Add an in-memory class or resource
    pub fn add_bytes(&mut self, module: &str, path: &str, bytes: Vec<u8>) -> Result<()> {
        self.pool
            .add(ResourceEntry::new(module, path, ResourceKind::ClassOrResource, bytes))
    }

    /// Add every entry of `archives`, closing all of them
    pub fn ingest_archives(&mut self, archives: &mut [Box<dyn Archive>]) -> Result<usize> {
        archive::ingest(&mut self.pool, archives)
    }

    pub fn pool(&self) -> &ResourcePool {
        &self.pool
    }

    /// Run the plugin stack and assemble the image
    pub fn build(self) -> Result<BuiltImage> {
        info!(
            "building image: {} resources in {} modules, {} plugins",
            self.pool.len(),
            self.pool.module_count(),
            self.stack.len()
        );

        let mut strings = StringTable::new();
        let pool = self.stack.visit_resources(self.pool, &mut strings)?;
        let assembled = ImageAssembler::new(self.byte_order).assemble(&pool, strings.clone())?;

        Ok(BuiltImage {
            bytes: assembled.bytes,
            header: assembled.header,
            external_entries: assembled.external_entries,
            malformed_paths: assembled.malformed_paths,
            last_pool: LastPool::new(pool, strings),
        })
    }
}

/// Result of [`ImageBuilder::build`]
#[derive(Debug)]
pub struct BuiltImage {
    bytes: Vec<u8>,
    header: Header,
    external_entries: Vec<ResourceEntry>,
    malformed_paths: Vec<String>,
    last_pool: LastPool,
}

impl BuiltImage {
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }

    pub fn header(&self) -> &Header {
        &self.header
    }

    /// Resources placed in the image; tree entries are not counted
    pub fn resource_count(&self) -> u32 {
        self.header.resource_count
    }

    /// Entries of kinds that live outside the image
    pub fn external_entries(&self) -> &[ResourceEntry] {
        &self.external_entries
    }

    /// Paths the synthetic tree skipped
    pub fn malformed_paths(&self) -> &[String] {
        &self.malformed_paths
    }

    /// Final pool, decompressed on access
    pub fn last_pool(&self) -> &LastPool {
        &self.last_pool
    }

    pub fn write_to_path<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        info!("writing {} byte image to {:?}", self.bytes.len(), path.as_ref());
        io::write_image(path, &self.bytes)
    }

    /// Reader over a copy of the image bytes
    pub fn reader(&self) -> Result<ImageReader> {
        ImageReader::from_bytes(self.bytes.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_and_read() -> Result<()> {
        let mut builder = ImageBuilder::new(ImageByteOrder::Big);
        builder.add_bytes("m1", "/m1/p/A.class", b"alpha".to_vec())?;
        builder.add_resource(ResourceEntry::new(
            "m1",
            "/m1/bin/tool",
            ResourceKind::NativeCmd,
            b"#!".to_vec(),
        ))?;

        let image = builder.build()?;
        assert_eq!(image.resource_count(), 1);
        assert_eq!(image.external_entries().len(), 1);
        assert!(image.malformed_paths().is_empty());
        assert_eq!(image.last_pool().len(), 2);

        let reader = image.reader()?;
        assert_eq!(reader.read_resource("/m1/p/A.class")?.unwrap(), b"alpha");
        assert!(reader.find("/m1/bin/tool")?.is_none());
        Ok(())
    }

    #[test]
    fn test_empty_build() -> Result<()> {
        let image = ImageBuilder::new(ImageByteOrder::Little).build()?;
        assert_eq!(image.resource_count(), 0);
        let reader = image.reader()?;
        assert!(reader.find("/m/anything")?.is_none());
        Ok(())
    }

    #[test]
    fn test_write_to_path() -> Result<()> {
        let temp_dir = tempfile::TempDir::new()?;
        let path = temp_dir.path().join("test.image");

        let mut builder = ImageBuilder::new(ImageByteOrder::native());
        builder.add_bytes("m1", "/m1/p/A.class", b"on disk".to_vec())?;
        builder.build()?.write_to_path(&path)?;

        let reader = ImageReader::open(&path)?;
        assert_eq!(reader.read_resource("/m1/p/A.class")?.unwrap(), b"on disk");
        Ok(())
    }
}
