//! Command line entry point of the Fedora Commons benchmark.
#![warn(missing_debug_implementations)]

fn main() -> anyhow::Result<()> {
    fcrepo_bench::cli::execute()
}
