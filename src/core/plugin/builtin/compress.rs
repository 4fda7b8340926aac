use crate::compression::{compress_if_beneficial, CompressionConfig, CompressionMethod};
use crate::error::Result;
use crate::plugin::{Category, Plugin};
use crate::pool::{new_compressed_resource, ResourcePool, ResourcePoolBuilder};
use crate::strings::PrevisitStrings;
use tracing::debug;

/// Compresses image resources that shrink enough under the configured codec.
///
/// The stage header names the codec, so any [`Decompressor`] that knows it
/// can undo the stage. Already compressed resources get a further, non
/// terminal stage.
///
/// [`Decompressor`]: crate::compression::Decompressor
#[derive(Debug, Clone)]
pub struct CompressPlugin {
    config: CompressionConfig,
}

impl CompressPlugin {
    pub const NAME: &'static str = "compress";

    pub fn new(config: CompressionConfig) -> Self {
        CompressPlugin { config }
    }

    pub fn config(&self) -> &CompressionConfig {
        &self.config
    }

    fn is_candidate(&self, length: u64) -> bool {
        self.config.method != CompressionMethod::None && length >= self.config.threshold as u64
    }
}

impl Plugin for CompressPlugin {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn category(&self) -> Category {
        Category::Compressor
    }

    fn previsit(&self, pool: &ResourcePool, strings: &mut PrevisitStrings) -> Result<()> {
        let described = self.config.describe();
        for entry in pool.entries() {
            if entry.kind().is_image_content() && self.is_candidate(entry.content_length()) {
                strings.add(self.config.method.name());
                if !described.is_empty() {
                    strings.add(&described);
                }
            }
        }
        Ok(())
    }

    fn transform(&self, input: &ResourcePool, output: &mut ResourcePoolBuilder<'_>) -> Result<()> {
        let order = output.byte_order();
        let described = self.config.describe();
        let plugin_config = (!described.is_empty()).then_some(described.as_str());
        let mut compressed_count = 0;

        for entry in input.entries() {
            if !entry.kind().is_image_content() || !self.is_candidate(entry.content_length()) {
                output.add(entry.clone())?;
                continue;
            }

            let content = entry.content_bytes()?;
            let (bytes, method) = compress_if_beneficial(&content, &self.config)?;
            if method == CompressionMethod::None {
                output.add(entry.clone())?;
                continue;
            }

            let compressed = new_compressed_resource(
                entry,
                &bytes,
                method.name(),
                plugin_config,
                output.strings_mut(),
                order,
            )?;
            output.add(compressed)?;
            compressed_count += 1;
        }

        debug!(
            "{} ({}) compressed {} of {} resources",
            Self::NAME,
            self.config.method.name(),
            compressed_count,
            input.len()
        );
        Ok(())
    }
}
