//! A [`Repository`] talking to Fedora Commons over its REST API.
//!
//! Fedora 4 exposes objects as LDP containers below `{url}/rest/`, with the datastream as a binary
//! child resource. Deleted resources leave a tombstone behind that has to be removed as well before
//! the path can be reused. Fedora 3 exposes objects below `{url}/objects/` and requires PIDs of the
//! form `namespace:id`.

use std::sync::atomic::{AtomicUsize, Ordering};

use futures_util::StreamExt;
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use reqwest::{Method, RequestBuilder, Response, StatusCode};

use crate::config::{Action, RepositoryVariant};
use crate::error::{RemoteError, RemoteResult};
use crate::id::ObjectId;
use crate::payload::Payload;
use crate::remote::{ClusterSizeProvider, Repository};

/// User agent string used for outgoing requests.
pub const USER_AGENT: &str = concat!("fcrepo-bench/", env!("CARGO_PKG_VERSION"));

/// Identifier of the datastream attached to every benchmark object.
pub const DATASTREAM_ID: &str = "ds1";

/// Namespace of the Fedora 3 PIDs created by the benchmark.
pub const PID_NAMESPACE: &str = "bench";

/// RDF predicate carrying the number of nodes in a Fedora 4 cluster.
pub const CLUSTER_SIZE_PREDICATE: &str = "http://fedora.info/definitions/v4/repository#clusterSize";

const OCTET_STREAM: &str = "application/octet-stream";
const N_TRIPLES: &str = "application/n-triples";

/// HTTP client for a Fedora 3 or Fedora 4 repository.
#[derive(Debug, Clone)]
pub struct FedoraClient {
    client: reqwest::Client,
    url: String,
    variant: RepositoryVariant,
    concurrency: usize,
}

impl FedoraClient {
    /// Creates a client for the repository at `url`.
    ///
    /// `url` is the base URL of the Fedora web application, such as `http://localhost:8080/fcrepo`.
    pub fn new(url: impl Into<String>, variant: RepositoryVariant) -> RemoteResult<Self> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .build()
            .map_err(|cause| RemoteError::Request {
                context: "failed to build http client".to_owned(),
                cause,
            })?;

        Ok(Self {
            client,
            url: url.into().trim_end_matches('/').to_owned(),
            variant,
            concurrency: 1,
        })
    }

    /// Sets the number of concurrent requests used by bulk operations.
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    fn pid(&self, id: &ObjectId) -> String {
        format!("{PID_NAMESPACE}:{id}")
    }

    fn object_url(&self, id: &ObjectId) -> String {
        match self.variant {
            RepositoryVariant::Fcrepo3 => format!("{}/objects/{}", self.url, self.pid(id)),
            RepositoryVariant::Fcrepo4 => format!("{}/rest/{id}", self.url),
        }
    }

    fn datastream_url(&self, id: &ObjectId) -> String {
        match self.variant {
            RepositoryVariant::Fcrepo3 => {
                format!("{}/datastreams/{DATASTREAM_ID}", self.object_url(id))
            }
            RepositoryVariant::Fcrepo4 => format!("{}/{DATASTREAM_ID}", self.object_url(id)),
        }
    }

    fn tombstone_url(resource: &str) -> String {
        format!("{resource}/fcr:tombstone")
    }

    /// Sends a request and maps transport errors and non-success statuses to [`RemoteError`].
    async fn send(
        &self,
        request: RequestBuilder,
        context: impl FnOnce() -> String,
    ) -> RemoteResult<Response> {
        let response = match request.send().await {
            Ok(response) => response,
            Err(cause) => {
                return Err(RemoteError::Request {
                    context: context(),
                    cause,
                });
            }
        };

        let status = response.status();
        if !status.is_success() {
            return Err(RemoteError::Status {
                context: context(),
                status,
            });
        }

        Ok(response)
    }

    /// Deletes a resource, treating a missing resource as success.
    async fn delete(&self, url: String) -> RemoteResult<()> {
        let response = self
            .client
            .delete(&url)
            .send()
            .await
            .map_err(|cause| RemoteError::Request {
                context: format!("DELETE {url}"),
                cause,
            })?;

        let status = response.status();
        if status.is_success() || status == StatusCode::NOT_FOUND || status == StatusCode::GONE {
            return Ok(());
        }

        Err(RemoteError::Status {
            context: format!("DELETE {url}"),
            status,
        })
    }

    #[tracing::instrument(level = "trace", fields(%id), skip_all)]
    async fn create_object(&self, id: &ObjectId) -> RemoteResult<()> {
        let url = self.object_url(id);
        let request = match self.variant {
            RepositoryVariant::Fcrepo3 => self.client.post(&url),
            RepositoryVariant::Fcrepo4 => self.client.put(&url),
        };
        self.send(request, || format!("create object {url}")).await?;
        Ok(())
    }

    /// Uploads a fresh datastream, creating it if `create` is set and replacing it otherwise.
    #[tracing::instrument(level = "trace", fields(%id), skip_all)]
    async fn write_datastream(&self, id: &ObjectId, size: u64, create: bool) -> RemoteResult<()> {
        let url = self.datastream_url(id);
        let request = match (self.variant, create) {
            (RepositoryVariant::Fcrepo3, true) => self.client.post(&url).query(&[
                ("controlGroup", "M"),
                ("dsLabel", "fcrepo-bench datastream"),
                ("mimeType", OCTET_STREAM),
            ]),
            (RepositoryVariant::Fcrepo3, false) => self
                .client
                .put(&url)
                .query(&[("mimeType", OCTET_STREAM)]),
            (RepositoryVariant::Fcrepo4, _) => self.client.put(&url),
        };

        let request = request
            .header(CONTENT_TYPE, OCTET_STREAM)
            .body(Payload::new(size).into_body());
        self.send(request, || format!("write datastream {url}"))
            .await?;
        Ok(())
    }

    #[tracing::instrument(level = "trace", fields(%id), skip_all)]
    async fn read_datastream(&self, id: &ObjectId) -> RemoteResult<()> {
        let url = match self.variant {
            RepositoryVariant::Fcrepo3 => format!("{}/content", self.datastream_url(id)),
            RepositoryVariant::Fcrepo4 => self.datastream_url(id),
        };
        let response = self
            .send(self.client.get(&url), || format!("read datastream {url}"))
            .await?;

        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            chunk.map_err(|cause| RemoteError::Request {
                context: format!("read datastream body {url}"),
                cause,
            })?;
        }
        Ok(())
    }

    #[tracing::instrument(level = "trace", fields(%id), skip_all)]
    async fn delete_datastream(&self, id: &ObjectId) -> RemoteResult<()> {
        let url = self.datastream_url(id);
        let request = self.client.request(Method::DELETE, &url);
        self.send(request, || format!("delete datastream {url}"))
            .await?;

        if self.variant == RepositoryVariant::Fcrepo4 {
            self.delete(Self::tombstone_url(&url)).await?;
        }
        Ok(())
    }

    #[tracing::instrument(level = "trace", fields(%id), skip_all)]
    async fn purge_object(&self, id: &ObjectId, datastreams_only: bool) -> RemoteResult<()> {
        if datastreams_only {
            let url = self.datastream_url(id);
            self.delete(url.clone()).await?;
            if self.variant == RepositoryVariant::Fcrepo4 {
                self.delete(Self::tombstone_url(&url)).await?;
            }
        }

        let url = self.object_url(id);
        self.delete(url.clone()).await?;
        if self.variant == RepositoryVariant::Fcrepo4 {
            self.delete(Self::tombstone_url(&url)).await?;
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl Repository for FedoraClient {
    fn name(&self) -> &'static str {
        self.variant.as_str()
    }

    async fn create_objects(&self, ids: &[ObjectId]) -> RemoteResult<()> {
        let requests: Vec<_> = ids.iter().map(|id| self.create_object(id)).collect();
        futures_util::stream::iter(requests)
            .buffer_unordered(self.concurrency)
            .fold(Ok(()), |acc, result| async move { acc.and(result) })
            .await
    }

    async fn create_datastreams(&self, ids: &[ObjectId], size: u64) -> RemoteResult<()> {
        let requests: Vec<_> = ids
            .iter()
            .map(|id| self.write_datastream(id, size, true))
            .collect();
        futures_util::stream::iter(requests)
            .buffer_unordered(self.concurrency)
            .fold(Ok(()), |acc, result| async move { acc.and(result) })
            .await
    }

    async fn purge_objects(&self, ids: &[ObjectId], datastreams_only: bool) -> RemoteResult<()> {
        let failed = AtomicUsize::new(0);
        futures_util::stream::iter(ids)
            .for_each_concurrent(self.concurrency, |id| {
                let failed = &failed;
                async move {
                    if let Err(error) = self.purge_object(id, datastreams_only).await {
                        tracing::warn!(%id, %error, "failed to purge object");
                        failed.fetch_add(1, Ordering::Relaxed);
                    }
                }
            })
            .await;

        match failed.into_inner() {
            0 => Ok(()),
            failed => Err(RemoteError::Partial {
                failed,
                total: ids.len(),
            }),
        }
    }

    async fn execute(&self, action: Action, id: &ObjectId, size: u64) -> RemoteResult<()> {
        match action {
            Action::Create => self.write_datastream(id, size, true).await,
            Action::Read => self.read_datastream(id).await,
            Action::Update => self.write_datastream(id, size, false).await,
            Action::Delete => self.delete_datastream(id).await,
        }
    }
}

#[async_trait::async_trait]
impl ClusterSizeProvider for FedoraClient {
    async fn cluster_size(&self) -> RemoteResult<u32> {
        if self.variant != RepositoryVariant::Fcrepo4 {
            return Err(RemoteError::Other(format!(
                "cluster size is not available for {}",
                self.variant
            )));
        }

        let url = format!("{}/rest", self.url);
        let response = self
            .send(self.client.get(&url).header(ACCEPT, N_TRIPLES), || {
                format!("query repository description {url}")
            })
            .await?;
        let body = response.text().await.map_err(|cause| RemoteError::Request {
            context: format!("read repository description {url}"),
            cause,
        })?;

        parse_cluster_size(&body, &format!("{url}/"))
    }
}

/// Extracts the cluster size of the repository at `subject` from an N-Triples document.
///
/// Returns `0` if the document does not state a cluster size.
pub fn parse_cluster_size(ntriples: &str, subject: &str) -> RemoteResult<u32> {
    let subject = format!("<{subject}>");
    let predicate = format!("<{CLUSTER_SIZE_PREDICATE}>");

    for line in ntriples.lines() {
        let Some(rest) = line.trim().strip_prefix(subject.as_str()) else {
            continue;
        };
        let Some(object) = rest.trim_start().strip_prefix(predicate.as_str()) else {
            continue;
        };

        let literal = object
            .trim_start()
            .strip_prefix('"')
            .and_then(|literal| literal.split('"').next())
            .ok_or_else(|| RemoteError::Parse {
                context: format!("cluster size is not a literal: {line}"),
            })?;

        return literal.parse().map_err(|_| RemoteError::Parse {
            context: format!("cluster size is not a number: {literal}"),
        });
    }

    Ok(0)
}
