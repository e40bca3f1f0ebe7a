#![doc = include_str!("../README.md")]

mod error;
mod item;
mod pool;

pub use crate::error::*;
pub use crate::item::*;
pub use crate::pool::*;

#[cfg(test)]
mod tests;
