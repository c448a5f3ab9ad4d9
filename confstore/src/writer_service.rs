//! Writer ingress service implementation
//!
//! This module implements the gRPC service the configuration writer uses
//! to commit mutation batches. Each commit is assigned the next version
//! atomically and is durable before it is acknowledged.

use crate::metrics;
use crate::server;
use crate::store::Mutation;
use crate::wire::pb;
use pb::config_writer_server::ConfigWriter;

/// Writer service implementation
#[derive(Debug, Default)]
pub struct ConfigWriterSVC {}

#[tonic::async_trait]
impl ConfigWriter for ConfigWriterSVC {
    /// Commits one batch of mutations under the next version
    ///
    /// # Arguments
    ///
    /// * `request` - The mutations to apply atomically
    ///
    /// # Returns
    ///
    /// Returns the version assigned to the batch
    async fn commit(
        &self,
        request: tonic::Request<pb::CommitRequest>,
    ) -> Result<tonic::Response<pb::CommitReply>, tonic::Status> {
        metrics::record_metrics("commit", || async {
            let mutations: Vec<Mutation> = request
                .into_inner()
                .mutations
                .into_iter()
                .map(Mutation::from)
                .collect();
            log::info!("commit batch of {} mutations", mutations.len());

            let store = server::instance().lock().await.store();
            let version = store.append(mutations)?;
            metrics::CURRENT_VERSION_GAUGE.set(version);
            Ok(tonic::Response::new(pb::CommitReply { version }))
        })
        .await
    }
}
