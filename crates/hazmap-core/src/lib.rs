pub mod calc;
pub mod collect;
pub mod config;
pub mod curve;
pub mod error;
pub mod executor;
pub mod forecast;
pub mod geo;
pub mod gmm;
pub mod graph;
pub mod imt;
pub mod io;
pub mod partition;
pub mod paths;
pub mod prepare;
pub mod site;
pub mod unit_runner;

#[cfg(test)]
mod testutil;

pub use error::{HazardError, Result};
