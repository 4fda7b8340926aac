//! Resource pool
//!
//! The pool is the catalog of every resource of a build and the modules that
//! own them. Paths are unique across the pool and enumeration follows
//! insertion order.
//!
//! A pool is in one of three states:
//! - open: accepts new entries, rejects duplicate paths
//! - read-only: rejects every `add`
//! - ordered: like open, but each `add` must match a frozen path order at
//!   exactly its position

mod entry;

pub use entry::{ContentOpener, ResourceContent, ResourceEntry, ResourceKind};

use crate::byte_order::ImageByteOrder;
use crate::compression::CompressedResourceHeader;
use crate::error::{ImageError, Result};
use crate::strings::StringTable;
use crate::validation::{package_of, validate_resource_path, ModuleName};
use indexmap::IndexMap;
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::trace;

/// File name of a module's descriptor entry
pub const MODULE_DESCRIPTOR: &str = "module-info.class";

#[derive(Debug, Clone, PartialEq, Eq)]
enum PoolMode {
    Open,
    ReadOnly,
    Ordered(Arc<[String]>),
}

#[derive(Debug, Clone)]
pub struct ResourcePool {
    entries: IndexMap<String, ResourceEntry>,
    modules: IndexMap<String, Vec<usize>>,
    byte_order: ImageByteOrder,
    mode: PoolMode,
}

impl ResourcePool {
    /// Open pool accepting any order
    pub fn new(byte_order: ImageByteOrder) -> Self {
        ResourcePool {
            entries: IndexMap::new(),
            modules: IndexMap::new(),
            byte_order,
            mode: PoolMode::Open,
        }
    }

    /// Open pool that only accepts `order`, one path at a time
    pub fn ordered(byte_order: ImageByteOrder, order: Arc<[String]>) -> Self {
        ResourcePool {
            mode: PoolMode::Ordered(order),
            ..Self::new(byte_order)
        }
    }

    pub fn add(&mut self, entry: ResourceEntry) -> Result<()> {
        if self.mode == PoolMode::ReadOnly {
            return Err(ImageError::ReadOnlyPool);
        }

        ModuleName::new(entry.module())?;
        validate_resource_path(entry.module(), entry.path())?;

        if self.entries.contains_key(entry.path()) {
            return Err(ImageError::DuplicatePath {
                path: entry.path().to_string(),
            });
        }

        if let PoolMode::Ordered(order) = &self.mode {
            let position = self.entries.len();
            let expected = order.get(position);
            if expected.map(String::as_str) != Some(entry.path()) {
                return Err(ImageError::OutOfOrder {
                    path: entry.path().to_string(),
                    expected: expected.cloned(),
                });
            }
        }

        trace!("pool add {} ({} bytes)", entry.path(), entry.content_length());
        let (index, _) = self.entries.insert_full(entry.path().to_string(), entry);
        if let Some((_, entry)) = self.entries.get_index(index) {
            self.modules
                .entry(entry.module().to_string())
                .or_default()
                .push(index);
        }
        Ok(())
    }

    pub fn find(&self, path: &str) -> Option<&ResourceEntry> {
        self.entries.get(path)
    }

    /// Find `path` within the module of `context`.
    ///
    /// Paths of other modules are never resolved, even when present.
    pub fn find_in_context(&self, path: &str, context: &ResourceEntry) -> Option<&ResourceEntry> {
        self.find(path)
            .filter(|entry| entry.module() == context.module())
    }

    pub fn contains(&self, path: &str) -> bool {
        self.entries.contains_key(path)
    }

    /// Entries in insertion order
    pub fn entries(&self) -> impl Iterator<Item = &ResourceEntry> + '_ {
        self.entries.values()
    }

    pub fn paths(&self) -> impl Iterator<Item = &str> + '_ {
        self.entries.keys().map(String::as_str)
    }

    /// Modules in order of their first entry
    pub fn modules(&self) -> impl Iterator<Item = ResourcePoolModule<'_>> + '_ {
        self.modules
            .iter()
            .map(move |(name, indices)| ResourcePoolModule {
                name,
                indices,
                pool: self,
            })
    }

    pub fn module(&self, name: &str) -> Option<ResourcePoolModule<'_>> {
        self.modules
            .get_key_value(name)
            .map(|(name, indices)| ResourcePoolModule {
                name,
                indices,
                pool: self,
            })
    }

    pub fn module_count(&self) -> usize {
        self.modules.len()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn byte_order(&self) -> ImageByteOrder {
        self.byte_order
    }

    pub fn is_read_only(&self) -> bool {
        self.mode == PoolMode::ReadOnly
    }

    /// Frozen order this pool was built against, if any
    pub fn frozen_order(&self) -> Option<&[String]> {
        match &self.mode {
            PoolMode::Ordered(order) => Some(order),
            _ => None,
        }
    }

    pub fn into_read_only(mut self) -> Self {
        self.mode = PoolMode::ReadOnly;
        self
    }
}

/// A module of a pool: its name and its entries
#[derive(Debug, Clone, Copy)]
pub struct ResourcePoolModule<'a> {
    name: &'a str,
    indices: &'a [usize],
    pool: &'a ResourcePool,
}

impl<'a> ResourcePoolModule<'a> {
    pub fn name(&self) -> &'a str {
        self.name
    }

    pub fn entries(&self) -> impl Iterator<Item = &'a ResourceEntry> + 'a {
        let pool = self.pool;
        let indices = self.indices;
        indices
            .iter()
            .filter_map(move |&index| pool.entries.get_index(index).map(|(_, entry)| entry))
    }

    pub fn len(&self) -> usize {
        self.indices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    /// Entry of this module at `path`
    pub fn find_entry(&self, path: &str) -> Option<&'a ResourceEntry> {
        self.pool
            .find(path)
            .filter(|entry| entry.module() == self.name)
    }

    /// The module descriptor entry, `/<module>/module-info.class`
    pub fn descriptor(&self) -> Option<&'a ResourceEntry> {
        self.find_entry(&format!("/{}/{}", self.name, MODULE_DESCRIPTOR))
    }

    /// Packages with at least one entry of this module
    pub fn packages(&self) -> BTreeSet<String> {
        self.entries()
            .filter_map(|entry| package_of(entry.path()))
            .collect()
    }
}

/// Fresh pool handed to a plugin stage, with access to the build's strings
#[derive(Debug)]
pub struct ResourcePoolBuilder<'a> {
    pool: ResourcePool,
    strings: &'a mut StringTable,
}

impl<'a> ResourcePoolBuilder<'a> {
    pub fn new(pool: ResourcePool, strings: &'a mut StringTable) -> Self {
        ResourcePoolBuilder { pool, strings }
    }

    pub fn add(&mut self, entry: ResourceEntry) -> Result<()> {
        self.pool.add(entry)
    }

    pub fn strings_mut(&mut self) -> &mut StringTable {
        self.strings
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

    /// The finished stage output, read-only
    pub fn finish(self) -> ResourcePool {
        self.pool.into_read_only()
    }
}

/// Wrap `compressed` as the new content of `original`.
///
/// The result starts with a [`CompressedResourceHeader`] naming the plugin
/// that can undo it. The stage is terminal when `original` was plain bytes.
pub fn new_compressed_resource(
    original: &ResourceEntry,
    compressed: &[u8],
    plugin_name: &str,
    plugin_config: Option<&str>,
    strings: &mut StringTable,
    byte_order: ImageByteOrder,
) -> Result<ResourceEntry> {
    let header = CompressedResourceHeader {
        compressed_size: compressed.len() as u64,
        uncompressed_size: original.content_length(),
        decompressor_name_offset: strings.add(plugin_name),
        decompressor_config_offset: plugin_config
            .map(|config| strings.add(config))
            .unwrap_or(StringTable::EMPTY_OFFSET),
        is_terminal: !original.is_compressed(),
    };

    let mut content = header.to_bytes(byte_order);
    content.extend_from_slice(compressed);
    Ok(original.copy_with_compressed(content))
}
