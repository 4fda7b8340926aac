//! Plugin pipeline
//!
//! A plugin turns one read-only pool into a complete replacement pool. Plugins
//! run in category order; within a category they keep their configured order.
//! See [`PluginStack`] for the previsit pass and the order freeze.

mod builtin;
mod last_pool;
mod stack;

pub use builtin::{glob_to_regex, CompressPlugin, ExcludePlugin, OrderPlugin};
pub use last_pool::LastPool;
pub use stack::PluginStack;

use crate::error::Result;
use crate::pool::{ResourcePool, ResourcePoolBuilder};
use crate::strings::PrevisitStrings;

/// Plugin categories, in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Category {
    Filter,
    Adder,
    Transformer,
    ModuleInfoTransformer,
    Sorter,
    MetaInfoAdder,
    Compressor,
    Verifier,
    Processor,
    Packager,
}

impl Category {
    pub const ALL: [Category; 10] = [
        Category::Filter,
        Category::Adder,
        Category::Transformer,
        Category::ModuleInfoTransformer,
        Category::Sorter,
        Category::MetaInfoAdder,
        Category::Compressor,
        Category::Verifier,
        Category::Processor,
        Category::Packager,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Category::Filter => "filter",
            Category::Adder => "adder",
            Category::Transformer => "transformer",
            Category::ModuleInfoTransformer => "module-info-transformer",
            Category::Sorter => "sorter",
            Category::MetaInfoAdder => "meta-info-adder",
            Category::Compressor => "compressor",
            Category::Verifier => "verifier",
            Category::Processor => "processor",
            Category::Packager => "packager",
        }
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// One pool transformation stage
pub trait Plugin {
    fn name(&self) -> &str;

    fn category(&self) -> Category;

    /// Look at the original pool before any stage runs, registering strings
    /// the transform will intern.
    fn previsit(&self, _pool: &ResourcePool, _strings: &mut PrevisitStrings) -> Result<()> {
        Ok(())
    }

    /// Emit the complete output pool into `output`, untouched entries included
    fn transform(&self, input: &ResourcePool, output: &mut ResourcePoolBuilder<'_>) -> Result<()>;
}

impl std::fmt::Debug for dyn Plugin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.name(), self.category())
    }
}
