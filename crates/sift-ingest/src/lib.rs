#![doc = include_str!("../README.md")]

mod classify;
mod counters;
mod error;
mod ingest;
mod record;
mod source;
mod store;

pub use crate::classify::*;
pub use crate::counters::*;
pub use crate::error::*;
pub use crate::ingest::*;
pub use crate::record::*;
pub use crate::source::*;
pub use crate::store::*;
// Public re-export so downstream crates can build pools via
// `sift_ingest::sift_pool`
pub use sift_pool;
