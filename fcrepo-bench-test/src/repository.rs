//! An in-memory [`Repository`] that records every call made against it.
//!
//! ```
//! use std::sync::Arc;
//!
//! use fcrepo_bench::{BenchmarkRunner, Config};
//! use fcrepo_bench_test::repository::InMemoryRepository;
//!
//! #[tokio::main]
//! async fn main() {
//!     let repository = InMemoryRepository::new();
//!     let runner = BenchmarkRunner::new(Config::default(), Arc::new(repository.clone()));
//!     let report = runner.run().await.unwrap();
//!
//!     assert!(report.is_complete());
//!     assert_eq!(repository.purges().len(), 1);
//! }
//! ```

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use fcrepo_bench::config::Action;
use fcrepo_bench::error::{RemoteError, RemoteResult};
use fcrepo_bench::id::ObjectId;
use fcrepo_bench::remote::Repository;
use reqwest::StatusCode;

/// A call received by an [`InMemoryRepository`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Call {
    CreateObjects(Vec<ObjectId>),
    CreateDatastreams(Vec<ObjectId>, u64),
    Execute(Action, ObjectId),
    Purge(Vec<ObjectId>, bool),
}

/// Which operations of an [`InMemoryRepository`] fail on purpose.
#[derive(Clone, Copy, Debug, Default)]
struct Failures {
    create_objects: bool,
    create_datastreams: bool,
    purge: bool,
    /// Position, in creation order, of the object whose action fails.
    action: Option<usize>,
}

#[derive(Debug, Default)]
struct State {
    calls: Vec<Call>,
    /// Objects in creation order.
    created: Vec<ObjectId>,
    /// Datastream sizes of live objects, `None` if an object has no datastream.
    objects: HashMap<ObjectId, Option<u64>>,
}

/// A repository keeping objects in memory.
///
/// The repository is [`Clone`], so tests can hold a handle for inspection while the runner owns
/// another one.
#[derive(Clone, Debug, Default)]
pub struct InMemoryRepository {
    delay: Duration,
    /// Position, in creation order, of an object whose action takes longer, and its delay.
    slow: Option<(usize, Duration)>,
    failures: Failures,
    state: Arc<Mutex<State>>,
    in_flight: Arc<AtomicUsize>,
    max_in_flight: Arc<AtomicUsize>,
}

impl InMemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every action take at least `delay`.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Makes the action on the `index`-th created object (zero-based) take at least `delay`.
    pub fn with_delay_at(mut self, index: usize, delay: Duration) -> Self {
        self.slow = Some((index, delay));
        self
    }

    /// Fails the action on the `index`-th created object (zero-based).
    pub fn fail_action_at(mut self, index: usize) -> Self {
        self.failures.action = Some(index);
        self
    }

    pub fn fail_create_objects(mut self) -> Self {
        self.failures.create_objects = true;
        self
    }

    pub fn fail_create_datastreams(mut self) -> Self {
        self.failures.create_datastreams = true;
        self
    }

    pub fn fail_purge(mut self) -> Self {
        self.failures.purge = true;
        self
    }

    /// All calls received so far, in the order they arrived.
    pub fn calls(&self) -> Vec<Call> {
        self.state.lock().unwrap().calls.clone()
    }

    /// The ids passed to `create_objects`, in creation order.
    pub fn created(&self) -> Vec<ObjectId> {
        self.state.lock().unwrap().created.clone()
    }

    /// The arguments of every `purge_objects` call.
    pub fn purges(&self) -> Vec<(Vec<ObjectId>, bool)> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                Call::Purge(ids, datastreams_only) => Some((ids, datastreams_only)),
                _ => None,
            })
            .collect()
    }

    /// The objects an action was executed on, in the order the actions started.
    pub fn executed(&self) -> Vec<ObjectId> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                Call::Execute(_, id) => Some(id),
                _ => None,
            })
            .collect()
    }

    /// Number of objects currently stored.
    pub fn object_count(&self) -> usize {
        self.state.lock().unwrap().objects.len()
    }

    /// The highest number of actions that were running at the same time.
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    fn delay_for(&self, id: &ObjectId) -> Duration {
        match self.slow {
            Some((index, delay)) if self.state.lock().unwrap().created.get(index) == Some(id) => {
                delay
            }
            _ => self.delay,
        }
    }

    fn record(&self, call: Call) {
        self.state.lock().unwrap().calls.push(call);
    }

    fn apply(&self, action: Action, id: &ObjectId, size: u64) -> RemoteResult<()> {
        let mut state = self.state.lock().unwrap();

        if let Some(index) = self.failures.action
            && state.created.get(index) == Some(id)
        {
            return Err(RemoteError::Other(format!("injected failure for {id}")));
        }

        let not_found = || RemoteError::Status {
            context: format!("{action} {id}"),
            status: StatusCode::NOT_FOUND,
        };
        let datastream = state.objects.get_mut(id).ok_or_else(not_found)?;

        let current = *datastream;
        match (action, current) {
            (Action::Create, None) | (Action::Update, Some(_)) => *datastream = Some(size),
            (Action::Create, Some(_)) => {
                return Err(RemoteError::Status {
                    context: format!("{action} {id}"),
                    status: StatusCode::CONFLICT,
                });
            }
            (Action::Read, Some(_)) => (),
            (Action::Delete, Some(_)) => *datastream = None,
            (_, None) => return Err(not_found()),
        }

        Ok(())
    }
}

#[async_trait::async_trait]
impl Repository for InMemoryRepository {
    fn name(&self) -> &'static str {
        "in-memory"
    }

    async fn create_objects(&self, ids: &[ObjectId]) -> RemoteResult<()> {
        self.record(Call::CreateObjects(ids.to_vec()));
        if self.failures.create_objects {
            return Err(RemoteError::Other("injected object creation failure".into()));
        }

        let mut state = self.state.lock().unwrap();
        for id in ids {
            state.created.push(id.clone());
            state.objects.insert(id.clone(), None);
        }
        Ok(())
    }

    async fn create_datastreams(&self, ids: &[ObjectId], size: u64) -> RemoteResult<()> {
        self.record(Call::CreateDatastreams(ids.to_vec(), size));
        if self.failures.create_datastreams {
            return Err(RemoteError::Other(
                "injected datastream creation failure".into(),
            ));
        }

        let mut state = self.state.lock().unwrap();
        for id in ids {
            state.objects.insert(id.clone(), Some(size));
        }
        Ok(())
    }

    async fn purge_objects(&self, ids: &[ObjectId], datastreams_only: bool) -> RemoteResult<()> {
        self.record(Call::Purge(ids.to_vec(), datastreams_only));
        if self.failures.purge {
            return Err(RemoteError::Partial {
                failed: ids.len(),
                total: ids.len(),
            });
        }

        let mut state = self.state.lock().unwrap();
        for id in ids {
            state.objects.remove(id);
        }
        Ok(())
    }

    async fn execute(&self, action: Action, id: &ObjectId, size: u64) -> RemoteResult<()> {
        self.record(Call::Execute(action, id.clone()));

        let running = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(running, Ordering::SeqCst);

        let delay = self.delay_for(id);
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        let result = self.apply(action, id, size);

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }
}
