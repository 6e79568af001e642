//! Test utilities for the Fedora Commons benchmark.
//!
//! This crate provides utilities to facilitate testing of the benchmark core and its repository
//! clients. See the modules for all available utilities.

pub mod repository;
pub mod server;
pub mod tracing;
