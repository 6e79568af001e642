//! The unit of work submitted to the worker pool.

use std::time::Instant;

use serde::Serialize;

use crate::config::Action;
use crate::error::TaskError;
use crate::id::ObjectId;
use crate::remote::SharedRepository;

/// Outcome of one action against one object.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct WorkResult {
    /// The object the action was performed on.
    pub id: ObjectId,
    /// Wall-clock duration of the remote call.
    pub duration_ms: u64,
    /// The configured datastream size.
    ///
    /// This is echoed from the configuration and not measured on the wire.
    pub byte_size: u64,
}

/// Executes exactly one action against exactly one object.
#[derive(Debug)]
pub struct ActionWorker {
    repository: SharedRepository,
    action: Action,
    id: ObjectId,
    size: u64,
}

impl ActionWorker {
    pub fn new(
        repository: SharedRepository,
        action: Action,
        id: ObjectId,
        size: u64,
    ) -> Self {
        Self {
            repository,
            action,
            id,
            size,
        }
    }

    /// Runs the action, timing only the remote call.
    pub async fn execute(self) -> Result<WorkResult, TaskError> {
        let start = Instant::now();
        let outcome = self
            .repository
            .execute(self.action, &self.id, self.size)
            .await;
        let duration_ms = start.elapsed().as_millis() as u64;

        if let Err(source) = outcome {
            tracing::debug!(id = %self.id, error = %source, "{} action failed", self.action);
            return Err(TaskError::Remote {
                id: self.id,
                source,
            });
        }

        Ok(WorkResult {
            id: self.id,
            duration_ms,
            byte_size: self.size,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use super::*;
    use crate::error::{RemoteError, RemoteResult};
    use crate::remote::Repository;

    #[derive(Debug, Default)]
    struct SlowRepository {
        fail: bool,
        calls: Mutex<Vec<(Action, ObjectId, u64)>>,
    }

    #[async_trait::async_trait]
    impl Repository for SlowRepository {
        fn name(&self) -> &'static str {
            "slow"
        }

        async fn create_objects(&self, _ids: &[ObjectId]) -> RemoteResult<()> {
            Ok(())
        }

        async fn create_datastreams(&self, _ids: &[ObjectId], _size: u64) -> RemoteResult<()> {
            Ok(())
        }

        async fn purge_objects(&self, _ids: &[ObjectId], _ds: bool) -> RemoteResult<()> {
            Ok(())
        }

        async fn execute(&self, action: Action, id: &ObjectId, size: u64) -> RemoteResult<()> {
            self.calls.lock().unwrap().push((action, id.clone(), size));
            tokio::time::sleep(Duration::from_millis(20)).await;
            if self.fail {
                return Err(RemoteError::Other("boom".into()));
            }
            Ok(())
        }
    }

    #[tokio::test]
    async fn measures_remote_call() {
        let repository = Arc::new(SlowRepository::default());
        let id = ObjectId::random();

        let worker = ActionWorker::new(repository.clone(), Action::Update, id.clone(), 4096);
        let result = worker.execute().await.unwrap();

        assert_eq!(result.id, id);
        assert_eq!(result.byte_size, 4096);
        assert!(result.duration_ms >= 20);
        assert_eq!(
            repository.calls.lock().unwrap().as_slice(),
            &[(Action::Update, id, 4096)]
        );
    }

    #[tokio::test]
    async fn propagates_failures() {
        let repository = Arc::new(SlowRepository {
            fail: true,
            ..Default::default()
        });
        let id = ObjectId::random();

        let worker = ActionWorker::new(repository, Action::Read, id.clone(), 1);
        let err = worker.execute().await.unwrap_err();

        assert!(matches!(err, TaskError::Remote { id: failed, .. } if failed == id));
    }
}
