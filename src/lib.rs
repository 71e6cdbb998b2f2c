//! # parfold
//!
//! In-process map-reduce: feed values from one or more sources, map them in
//! parallel on a pool of dedicated worker threads, and fold the emitted key/value pairs
//! into a `HashMap` on a single consumer.
//!
//! ## Usage
//!
//! ```
//! use parfold::PipelineBuilder;
//!
//! # #[tokio::main(flavor = "multi_thread", worker_threads = 2)]
//! # async fn main() -> parfold::Result<()> {
//! let mut pipeline = PipelineBuilder::new().workers(4).build();
//! pipeline
//!     .feed_iter(vec!["three", "three", "three", "one"])?
//!     .map(|word| [(word, 1u32)])?;
//!
//! let counts = pipeline.reduce(|a, b| a + b).await?;
//! assert_eq!(counts["three"], 3);
//! assert_eq!(counts["one"], 1);
//! # Ok(())
//! # }
//! ```
//!
//! ## Modules
//!
//! - `pipeline` - Controller, input feeders, mapper pool, reducer and run statistics
//! - `config` - Worker count and trace flag, from code, TOML or environment
//! - `error` - Typed sequencing and stage failure errors
//! - `logging` - Subscriber setup for the `tracing` events the pipeline emits
pub mod config;
pub mod error;
pub mod logging;
pub mod pipeline;

pub use config::PipelineConfig;
pub use error::{PipelineError, Result, Stage};
pub use pipeline::feeder::FeederReport;
pub use pipeline::mapper::WorkerReport;
pub use pipeline::stats::PipelineStats;
pub use pipeline::{Pipeline, PipelineBuilder};

#[cfg(test)]
mod property_tests;
