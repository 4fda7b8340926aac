use super::compile_all;
use crate::error::Result;
use crate::plugin::{Category, Plugin};
use crate::pool::{ResourcePool, ResourcePoolBuilder};
use regex::Regex;
use tracing::debug;

/// Drops resources whose path matches any of its patterns
#[derive(Debug, Clone)]
pub struct ExcludePlugin {
    patterns: Vec<Regex>,
}

impl ExcludePlugin {
    pub const NAME: &'static str = "exclude-resources";

    pub fn new(patterns: &[String]) -> Result<Self> {
        Ok(ExcludePlugin {
            patterns: compile_all(patterns)?,
        })
    }

    pub fn is_excluded(&self, path: &str) -> bool {
        self.patterns.iter().any(|re| re.is_match(path))
    }
}

impl Plugin for ExcludePlugin {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn category(&self) -> Category {
        Category::Filter
    }

    fn transform(&self, input: &ResourcePool, output: &mut ResourcePoolBuilder<'_>) -> Result<()> {
        let mut dropped = 0;
        for entry in input.entries() {
            if self.is_excluded(entry.path()) {
                dropped += 1;
                continue;
            }
            output.add(entry.clone())?;
        }
        debug!("{} dropped {} resources", Self::NAME, dropped);
        Ok(())
    }
}
