//! Interfaces to the repository under test.
//!
//! The benchmark core only talks to the repository through the [`Repository`] and
//! [`ClusterSizeProvider`] traits. [`fedora::FedoraClient`] implements both against the Fedora 3 and
//! Fedora 4 REST APIs.

use std::fmt::Debug;
use std::sync::Arc;

use crate::config::Action;
use crate::error::RemoteResult;
use crate::id::ObjectId;

pub mod fedora;

/// A type-erased [`Repository`] instance, shared between the runner and its workers.
pub type SharedRepository = Arc<dyn Repository>;

/// Operations a benchmark run performs against the repository.
#[async_trait::async_trait]
pub trait Repository: Debug + Send + Sync + 'static {
    /// The repository name, used for diagnostics.
    fn name(&self) -> &'static str;

    /// Creates one empty object per id.
    async fn create_objects(&self, ids: &[ObjectId]) -> RemoteResult<()>;

    /// Attaches a datastream of `size` bytes to each of the objects.
    async fn create_datastreams(&self, ids: &[ObjectId], size: u64) -> RemoteResult<()>;

    /// Removes all objects created for the run.
    ///
    /// `datastreams_only` is `true` when the benchmarked action left the datastreams in place, so
    /// they have to be cleaned up along with the objects. It is `false` after a `DELETE` run, where
    /// the datastreams are already gone and only the objects have to be removed.
    ///
    /// Implementations attempt every id even if some of them fail.
    async fn purge_objects(&self, ids: &[ObjectId], datastreams_only: bool) -> RemoteResult<()>;

    /// Performs the benchmarked `action` on a single object.
    ///
    /// `size` is the configured datastream size, used by the actions that upload contents.
    async fn execute(&self, action: Action, id: &ObjectId, size: u64) -> RemoteResult<()>;
}

/// Reports the number of nodes in the repository cluster.
#[async_trait::async_trait]
pub trait ClusterSizeProvider: Debug + Send + Sync + 'static {
    async fn cluster_size(&self) -> RemoteResult<u32>;
}
