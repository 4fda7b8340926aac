//! Build configuration
//!
//! Selects the byte order and the built-in plugins of one build, and
//! optionally names the plugin whose output freezes the resource order.

use crate::byte_order::ImageByteOrder;
use crate::compression::{CompressionConfig, CompressionMethod};
use crate::error::{ImageError, Result};
use crate::plugin::{CompressPlugin, ExcludePlugin, OrderPlugin, Plugin, PluginStack};
use serde::Deserialize;
use std::path::Path;

/// Build configuration
///
/// # Examples
///
/// ```
/// use modimage::config::BuildConfig;
///
/// let config = BuildConfig::from_toml_str(r#"
///     byte_order = "little"
///     last_sorter = "order-resources"
///
///     [[plugins]]
///     name = "order-resources"
///     patterns = ["/java.base/java/lang/*"]
///
///     [[plugins]]
///     name = "compress"
///     method = "zstd"
/// "#).unwrap();
///
/// let stack = config.into_stack().unwrap();
/// assert_eq!(stack.plugin_names(), ["order-resources", "compress"]);
/// assert_eq!(stack.last_sorter(), Some("order-resources"));
/// ```
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BuildConfig {
    /// Table byte order; native when absent
    #[serde(default)]
    pub byte_order: Option<ImageByteOrder>,

    /// Plugin whose output freezes the resource order
    #[serde(default)]
    pub last_sorter: Option<String>,

    #[serde(default)]
    pub plugins: Vec<PluginConfig>,
}

/// One built-in plugin and its options
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "name", rename_all = "kebab-case")]
pub enum PluginConfig {
    ExcludeResources {
        patterns: Vec<String>,
    },
    OrderResources {
        patterns: Vec<String>,
    },
    Compress {
        method: CompressionMethod,
        #[serde(default)]
        threshold: Option<usize>,
        #[serde(default)]
        min_ratio: Option<f32>,
        #[serde(default)]
        level: Option<i32>,
    },
}

impl PluginConfig {
    /// Instantiate the configured plugin
    pub fn instantiate(&self) -> Result<Box<dyn Plugin>> {
        Ok(match self {
            PluginConfig::ExcludeResources { patterns } => Box::new(ExcludePlugin::new(patterns)?),
            PluginConfig::OrderResources { patterns } => Box::new(OrderPlugin::new(patterns)?),
            PluginConfig::Compress {
                method,
                threshold,
                min_ratio,
                level,
            } => {
                let mut config = match method {
                    CompressionMethod::None => CompressionConfig::none(),
                    CompressionMethod::Lz4 => CompressionConfig::lz4(),
                    CompressionMethod::Zstd => CompressionConfig::zstd(),
                };
                if let Some(threshold) = threshold {
                    config.threshold = *threshold;
                }
                if let Some(min_ratio) = min_ratio {
                    config.min_ratio = *min_ratio;
                }
                if let Some(level) = level {
                    config.level = *level;
                }
                Box::new(CompressPlugin::new(config))
            }
        })
    }
}

impl BuildConfig {
    pub fn from_toml_str(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    pub fn byte_order(&self) -> ImageByteOrder {
        self.byte_order.unwrap_or_else(ImageByteOrder::native)
    }

    /// Build the plugin stack
    pub fn into_stack(self) -> Result<PluginStack> {
        let mut stack = PluginStack::new();
        for plugin in &self.plugins {
            stack.push(plugin.instantiate()?);
        }
        if let Some(name) = self.last_sorter {
            if !stack.plugin_names().contains(&name.as_str()) {
                return Err(ImageError::Config(format!(
                    "last sorter {} is not a configured plugin",
                    name
                )));
            }
            stack.set_last_sorter(name);
        }
        Ok(stack)
    }
}
