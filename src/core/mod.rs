//! Image engine: tables, pool, pipeline, writer and reader

pub mod archive;
pub mod byte_order;
pub mod compression;
pub mod config;
pub mod error;
pub mod header;
pub mod io;
pub mod location;
pub mod perfect_hash;
pub mod plugin;
pub mod pool;
pub mod reader;
pub mod strings;
pub mod tree;
pub mod validation;
pub mod writer;
