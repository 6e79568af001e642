//! Orchestration of a benchmark run.
//!
//! A run goes through four phases:
//!
//! 1. **Preparation** creates the object population, and the datastreams if the action needs
//!    existing content. Failures here are fatal and abort the run before anything is timed.
//! 2. **Dispatch** submits one [`ActionWorker`] per object to a [`WorkerPool`] of the configured
//!    size.
//! 3. **Harvest** waits for the workers in submission order and collects their results. This is
//!    the timed part of the run. A failed task or an interrupt stops the harvest early.
//! 4. **Cleanup** shuts the pool down and purges every prepared object, no matter how the harvest
//!    ended. The [`Report`] is computed from the results harvested before the stop; tasks still
//!    running at that point do not contribute.

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::collector::ResultCollector;
use crate::config::Config;
use crate::error::{HarvestError, PrepareError, TaskError};
use crate::id::ObjectId;
use crate::pool::WorkerPool;
use crate::remote::{ClusterSizeProvider, SharedRepository};
use crate::report::{Report, convert_size};
use crate::stats::AggregateStats;
use crate::worker::{ActionWorker, WorkResult};

type TaskHandle = JoinHandle<Result<WorkResult, TaskError>>;

/// Runs a single benchmark against a repository.
#[derive(Debug)]
pub struct BenchmarkRunner {
    config: Config,
    repository: SharedRepository,
    cluster: Option<Arc<dyn ClusterSizeProvider>>,
    interrupt: CancellationToken,
    collector: ResultCollector,
}

/// Outcome of the harvest phase.
#[derive(Debug)]
struct Harvest {
    runtime: Duration,
    error: Option<HarvestError>,
}

/// Receives one line per harvested result with its duration in milliseconds.
#[derive(Debug)]
struct DurationLog {
    writer: BufWriter<File>,
}

impl DurationLog {
    /// Opens the log, or returns `None` if it cannot be created.
    fn open(path: &Path) -> Option<Self> {
        match File::create(path) {
            Ok(file) => Some(Self {
                writer: BufWriter::new(file),
            }),
            Err(error) => {
                tracing::warn!(
                    path = %path.display(),
                    %error,
                    "unable to open log file, no log output will be generated"
                );
                None
            }
        }
    }

    fn append(&mut self, result: &WorkResult) -> io::Result<()> {
        writeln!(self.writer, "{}", result.duration_ms)
    }

    fn finish(mut self) -> io::Result<()> {
        self.writer.flush()
    }
}

impl BenchmarkRunner {
    /// Creates a runner for `config` against `repository`.
    pub fn new(config: Config, repository: SharedRepository) -> Self {
        Self {
            config,
            repository,
            cluster: None,
            interrupt: CancellationToken::new(),
            collector: ResultCollector::new(),
        }
    }

    /// Logs the number of cluster nodes before and after the run.
    pub fn with_cluster_size(mut self, provider: Arc<dyn ClusterSizeProvider>) -> Self {
        self.cluster = Some(provider);
        self
    }

    /// Stops the harvest early once `token` is cancelled.
    ///
    /// Cleanup and reporting still run after an interrupt.
    pub fn with_interrupt(mut self, token: CancellationToken) -> Self {
        self.interrupt = token;
        self
    }

    /// Executes the benchmark.
    ///
    /// Returns an error only if preparing the objects failed. Failures of individual actions are
    /// reported in the returned [`Report`].
    pub async fn run(self) -> Result<Report, PrepareError> {
        let start = Instant::now();
        let config = &self.config;

        tracing::info!(
            "Running {} {} action(s) against {} with a binary size of {} using {} thread(s)",
            config.num_binaries,
            config.action,
            self.repository.name(),
            convert_size(config.size_bytes()),
            config.threads
        );
        let cluster_size_before = self.query_cluster_size("before").await;

        let ids = self.prepare().await?;
        let mut log = config.log_file.as_deref().and_then(DurationLog::open);

        tracing::info!("scheduling {} actions", ids.len());
        let pool = WorkerPool::new(config.threads);
        let handles = self.dispatch(&pool, &ids);

        let harvest = self.harvest(handles, log.as_mut()).await;
        let results = self.collector.snapshot();
        pool.shutdown();

        if let Some(error) = &harvest.error {
            tracing::error!(
                error = %error_chain(error),
                "error while getting results from worker tasks"
            );
        }
        if let Some(log) = log
            && let Err(error) = log.finish()
        {
            tracing::warn!(%error, "failed to flush log file");
        }

        let purge_error = self.purge(&ids).await;

        let stats = AggregateStats::compute(
            &results,
            config.size_bytes(),
            config.num_binaries,
            config.threads,
            start.elapsed(),
            harvest.runtime,
        );
        let cluster_size_after = self.query_cluster_size("after").await;

        tracing::info!(
            "Completed {} of {} {} action(s)",
            stats.completed,
            config.num_binaries,
            config.action
        );

        Ok(Report {
            action: config.action,
            variant: config.variant,
            num_binaries: config.num_binaries,
            size: config.size_bytes(),
            threads: config.threads,
            stats,
            cluster_size_before,
            cluster_size_after,
            harvest_error: harvest.error.map(|error| error_chain(&error)),
            purge_error,
        })
    }

    /// Creates the objects, and their datastreams if the action operates on existing content.
    async fn prepare(&self) -> Result<Vec<ObjectId>, PrepareError> {
        let config = &self.config;

        tracing::info!("preparing {} objects", config.num_binaries);
        let ids = ObjectId::generate(config.num_binaries);
        self.repository
            .create_objects(&ids)
            .await
            .map_err(PrepareError::CreateObjects)?;

        if config.action.requires_datastreams() {
            tracing::info!(
                "preparing {} datastreams of size {} for {}",
                config.num_binaries,
                convert_size(config.size_bytes()),
                config.action
            );
            self.repository
                .create_datastreams(&ids, config.size_bytes())
                .await
                .map_err(PrepareError::CreateDatastreams)?;
        }

        Ok(ids)
    }

    /// Submits one worker per object, in the order of `ids`.
    fn dispatch(&self, pool: &WorkerPool, ids: &[ObjectId]) -> Vec<TaskHandle> {
        ids.iter()
            .map(|id| {
                let worker = ActionWorker::new(
                    Arc::clone(&self.repository),
                    self.config.action,
                    id.clone(),
                    self.config.size_bytes(),
                );
                pool.submit(worker.execute())
            })
            .collect()
    }

    /// Waits for every task in submission order, collecting the results, and times the whole
    /// loop.
    ///
    /// Stops at the first failed task or when interrupted. Tasks that are still running are not
    /// cancelled.
    async fn harvest(
        &self,
        handles: Vec<TaskHandle>,
        mut log: Option<&mut DurationLog>,
    ) -> Harvest {
        let start = Instant::now();
        let total = handles.len();
        let mut error = None;

        for (index, handle) in handles.into_iter().enumerate() {
            let joined = tokio::select! {
                biased;
                _ = self.interrupt.cancelled() => {
                    error = Some(HarvestError::Interrupted);
                    break;
                }
                joined = handle => joined,
            };

            let result = match joined.map_err(TaskError::from).and_then(|result| result) {
                Ok(result) => result,
                Err(source) => {
                    error = Some(HarvestError::Task {
                        index,
                        total,
                        source,
                    });
                    break;
                }
            };

            tracing::debug!("{} of {} actions finished", index + 1, total);
            let logged = match log.as_deref_mut() {
                Some(log) => log.append(&result),
                None => Ok(()),
            };
            self.collector.append(result);
            if let Err(source) = logged {
                error = Some(HarvestError::Log(source));
                break;
            }
        }

        Harvest {
            runtime: start.elapsed(),
            error,
        }
    }

    /// Removes every prepared object. Failures are logged and returned for the report.
    async fn purge(&self, ids: &[ObjectId]) -> Option<String> {
        let datastreams_only = self.config.action.leaves_datastreams();
        tracing::info!("purging {} objects and datastreams", ids.len());

        match self.repository.purge_objects(ids, datastreams_only).await {
            Ok(()) => None,
            Err(error) => {
                tracing::error!(error = %error_chain(&error), "failed to purge objects");
                Some(error_chain(&error))
            }
        }
    }

    async fn query_cluster_size(&self, when: &str) -> Option<u32> {
        let provider = self.cluster.as_ref()?;
        match provider.cluster_size().await {
            Ok(size) => {
                tracing::info!("The Fedora cluster has {size} node(s) {when} the benchmark");
                Some(size)
            }
            Err(error) => {
                tracing::warn!(%error, "The Fedora cluster size {when} the benchmark is unknown");
                None
            }
        }
    }
}

/// Renders an error with all of its sources, separated by colons.
fn error_chain(error: &dyn std::error::Error) -> String {
    let mut rendered = error.to_string();
    let mut source = error.source();
    while let Some(cause) = source {
        rendered.push_str(": ");
        rendered.push_str(&cause.to_string());
        source = cause.source();
    }
    rendered
}
