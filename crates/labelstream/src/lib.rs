#![doc = include_str!("../README.md")]

mod batch;
mod cardinality;
mod config;
mod error;
pub mod index;
mod matcher;
mod names_values;
mod postings;
mod service;
mod sink;
pub mod telemetry;

#[cfg(test)]
mod testing;

pub use crate::batch::*;
pub use crate::cardinality::*;
pub use crate::config::*;
pub use crate::error::*;
pub use crate::matcher::*;
pub use crate::names_values::*;
pub use crate::postings::*;
pub use crate::service::*;
pub use crate::sink::*;
