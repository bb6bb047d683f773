//! # Sweeprun: parameter-sweep process execution
//!
//! Sweeprun executes a declarative process template once per member of a
//! stream of parameter sets, across interchangeable backends: a local
//! concurrent worker pool, or an HTCondor batch queue. Each invocation
//! yields its parameter set paired with a result carrying the exit code
//! and handles to captured streams and files.
//!
//! ## Quick Start
//!
//! ```no_run
//! use std::collections::BTreeMap;
//! use sweeprun::{LocalExecutor, OutputSpec, ProcessTemplate, Processor, Resolvable};
//!
//! #[tokio::main]
//! async fn main() -> sweeprun::Result<()> {
//!     let template = ProcessTemplate::builder()
//!         .command("simulate")
//!         .arg("--seed")
//!         .arg(Resolvable::param("seed"))
//!         .capture_stdout(OutputSpec::capture())
//!         .build()?;
//!
//!     let executor = LocalExecutor::builder().workers(4).build()?;
//!     let params = (0..16).map(|seed| {
//!         BTreeMap::from([("seed".to_string(), sweeprun::ParamValue::from(seed))])
//!     });
//!
//!     let mut stream = executor.process(template, Box::new(params)).await?;
//!     while let Some(outcome) = stream.next().await {
//!         let (params, result) = outcome?;
//!         println!("{params:?} -> {}", result.exit_code());
//!     }
//!     executor.shutdown().await?;
//!
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! - **Template**: [`ProcessTemplate`] describes one invocation; resource
//!   descriptors ([`InputSpec`], [`OutputSpec`]) declare its files and
//!   their lifecycle policy.
//! - **Preparation**: the protocol in [`prepare`] realizes descriptors
//!   into concrete files, race-free and cleanup-safe, on either backend.
//! - **Backends**: [`LocalExecutor`] and [`CondorExecutor`] implement the
//!   shared [`Processor`] contract.
//! - **Results**: [`RunResult`] exposes lazily openable accessors; cleanup
//!   is deferred to executor shutdown so accessors never race deletion.
//!
//! File lifecycles are tracked through explicit handler registries
//! ([`cleanup::HandlerList`]); a failed invocation drains its registry
//! before the error surfaces, so no temporary file leaks even on
//! mid-setup failure.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![deny(unsafe_code)]

pub mod cleanup;
pub mod condor;
pub mod error;
pub mod executor;
pub mod params;
pub mod prepare;
pub mod process;
pub mod resource;
pub mod result;

pub use condor::schedd::{CondorCli, Schedd};
pub use condor::{CondorExecutor, JobTemplate};
pub use error::{Result, SweepRunError};
pub use executor::local::LocalExecutor;
pub use executor::{ParamStream, Processor, RunStream};
pub use params::{ParamSet, ParamValue, Resolvable};
pub use process::{Environment, FailureMode, ProcessTemplate};
pub use resource::{InputSpec, OutputSpec, Source};
pub use result::{FileAccessor, RunResult};
