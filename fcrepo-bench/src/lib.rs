//! A benchmark for Fedora Commons repositories.
//!
//! A run prepares a fixed population of objects in the repository, performs one lifecycle action
//! (create, read, update or delete a datastream) on every object using a bounded pool of
//! concurrent workers, and reports per-action latency as well as aggregate and per-thread
//! throughput. Every object created for the run is purged afterwards, even if some actions failed.
//!
//! The entry point is [`BenchmarkRunner`], which drives any [`Repository`] implementation.
//! [`FedoraClient`](remote::fedora::FedoraClient) implements it for the Fedora 3 and Fedora 4
//! REST APIs.
#![warn(missing_debug_implementations)]

pub mod cli;
pub mod collector;
pub mod config;
pub mod error;
pub mod id;
pub mod observability;
pub mod payload;
pub mod pool;
pub mod remote;
pub mod report;
pub mod runner;
pub mod stats;
pub mod worker;

pub use crate::config::{Action, Config, RepositoryVariant};
pub use crate::remote::Repository;
pub use crate::report::Report;
pub use crate::runner::BenchmarkRunner;
