//! Command line interface of the benchmark binary.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use argh::FromArgs;
use bytesize::ByteSize;
use tokio_util::sync::CancellationToken;

use crate::config::{Action, Config, RepositoryVariant};
use crate::observability;
use crate::remote::fedora::FedoraClient;
use crate::report::Report;
use crate::runner::BenchmarkRunner;

/// Benchmarks create, read, update and delete performance of a Fedora Commons repository.
#[derive(Debug, FromArgs)]
struct Args {
    /// path to the YAML configuration file
    #[argh(option, short = 'c')]
    pub config: Option<PathBuf>,

    /// base URL of the Fedora web application, e.g. http://localhost:8080/fcrepo
    #[argh(option, short = 'f')]
    pub url: Option<String>,

    /// the action to benchmark: CREATE, READ, UPDATE or DELETE
    #[argh(option, short = 'a')]
    pub action: Option<Action>,

    /// the number of objects to run the action on
    #[argh(option, short = 'n')]
    pub num_binaries: Option<usize>,

    /// the datastream size, e.g. 1048576 or 1MiB
    #[argh(option, short = 's')]
    pub size: Option<ByteSize>,

    /// the number of concurrent workers
    #[argh(option, short = 't')]
    pub threads: Option<usize>,

    /// the repository version: FCREPO3 or FCREPO4
    #[argh(option, short = 'v')]
    pub variant: Option<RepositoryVariant>,

    /// file receiving the duration of every action, one per line
    #[argh(option, short = 'l')]
    pub log: Option<PathBuf>,

    /// print the report as JSON instead of text
    #[argh(switch)]
    pub json: bool,
}

impl Args {
    /// Overrides the loaded configuration with the flags given on the command line.
    fn apply(&self, config: &mut Config) {
        if let Some(url) = &self.url {
            config.url = url.clone();
        }
        if let Some(action) = self.action {
            config.action = action;
        }
        if let Some(num_binaries) = self.num_binaries {
            config.num_binaries = num_binaries;
        }
        if let Some(size) = self.size {
            config.size = size;
        }
        if let Some(threads) = self.threads {
            config.threads = threads;
        }
        if let Some(variant) = self.variant {
            config.variant = variant;
        }
        if let Some(log) = &self.log {
            config.log_file = Some(log.clone());
        }
    }
}

/// Bootstrap the runtime and execute the benchmark.
pub fn execute() -> Result<()> {
    let args: Args = argh::from_env();

    let mut config = Config::load(args.config.as_deref()).context("failed to load config")?;
    args.apply(&mut config);
    config.validate()?;

    // One runtime thread per worker, so every in-flight action can block on its own thread.
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .thread_name("bench-worker")
        .enable_all()
        .worker_threads(config.threads)
        .build()?;
    let _runtime_guard = runtime.enter();

    observability::initialize_tracing();
    tracing::debug!(?config);

    let report = runtime.block_on(run(config))?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        report.print();
    }

    Ok(())
}

async fn run(config: Config) -> Result<Report> {
    let client = FedoraClient::new(&config.url, config.variant)
        .context("failed to create repository client")?
        .with_concurrency(config.threads);
    let client = Arc::new(client);

    let interrupt = CancellationToken::new();
    let watcher = tokio::spawn({
        let interrupt = interrupt.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("interrupted, cleaning up before exiting");
                interrupt.cancel();
            }
        }
    });

    let mut runner =
        BenchmarkRunner::new(config.clone(), client.clone()).with_interrupt(interrupt);
    if config.variant == RepositoryVariant::Fcrepo4 {
        runner = runner.with_cluster_size(client);
    }

    let result = runner.run().await;
    watcher.abort();

    result.context("failed to prepare benchmark objects")
}
