use super::compile_all;
use crate::error::Result;
use crate::plugin::{Category, Plugin};
use crate::pool::{ResourcePool, ResourcePoolBuilder};
use regex::Regex;

/// Reorders resources by the first pattern each path matches.
///
/// Paths matching the first pattern come first, then the second, and so on;
/// unmatched paths go last. Ties keep their input order.
#[derive(Debug, Clone)]
pub struct OrderPlugin {
    patterns: Vec<Regex>,
}

impl OrderPlugin {
    pub const NAME: &'static str = "order-resources";

    pub fn new(patterns: &[String]) -> Result<Self> {
        Ok(OrderPlugin {
            patterns: compile_all(patterns)?,
        })
    }

    fn rank(&self, path: &str) -> usize {
        self.patterns
            .iter()
            .position(|re| re.is_match(path))
            .unwrap_or(self.patterns.len())
    }
}

impl Plugin for OrderPlugin {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn category(&self) -> Category {
        Category::Sorter
    }

    fn transform(&self, input: &ResourcePool, output: &mut ResourcePoolBuilder<'_>) -> Result<()> {
        let mut ranked: Vec<_> = input.entries().map(|e| (self.rank(e.path()), e)).collect();
        ranked.sort_by_key(|(rank, _)| *rank);
        for (_, entry) in ranked {
            output.add(entry.clone())?;
        }
        Ok(())
    }
}
