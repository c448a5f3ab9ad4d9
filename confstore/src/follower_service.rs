//! Follower protocol service implementation
//!
//! This module implements the gRPC service a follower uses to track the
//! configuration store: learn the current version, bootstrap from a full
//! snapshot, read incremental changes, and (on behalf of the coordination
//! layer) trigger compaction.

use crate::metrics;
use crate::server;
use crate::store::ClassFilter;
use crate::wire::pb;
use pb::config_follower_server::ConfigFollower;

/// Follower service implementation
#[derive(Debug, Default)]
pub struct ConfigFollowerSVC {}

#[tonic::async_trait]
impl ConfigFollower for ConfigFollowerSVC {
    /// Reports the most recent committed version
    ///
    /// # Returns
    ///
    /// Returns the log head, or -1 when nothing was ever committed
    async fn get_version(
        &self,
        _request: tonic::Request<pb::GetVersionRequest>,
    ) -> Result<tonic::Response<pb::GetVersionReply>, tonic::Status> {
        metrics::record_metrics("get_version", || async {
            let store = server::instance().lock().await.store();
            Ok(tonic::Response::new(pb::GetVersionReply {
                version: store.current_version(),
            }))
        })
        .await
    }

    /// Materializes the full configuration at a requested version
    ///
    /// Used by a follower to bootstrap, or to resynchronize after its
    /// incremental cursor fell below the retained floor.
    ///
    /// # Arguments
    ///
    /// * `request` - Optional version (defaults to current) and filter
    ///
    /// # Returns
    ///
    /// Returns the materialized mapping plus the version it reflects
    async fn get_full_database(
        &self,
        request: tonic::Request<pb::GetFullDatabaseRequest>,
    ) -> Result<tonic::Response<pb::GetFullDatabaseReply>, tonic::Status> {
        metrics::record_metrics("get_full_database", || async {
            let req = request.get_ref();
            log::debug!(
                "get full database at {:?}, filter {}",
                req.version,
                req.filter.is_some()
            );
            let filter = req.filter.clone().map(ClassFilter::new);
            let store = server::instance().lock().await.store();
            let snapshot = store.materialize(req.version, filter.as_ref())?;
            Ok(tonic::Response::new(pb::GetFullDatabaseReply {
                version: snapshot.version,
                database: snapshot
                    .data
                    .into_iter()
                    .map(|(key, value)| pb::KeyValue { key, value })
                    .collect(),
            }))
        })
        .await
    }

    /// Returns every mutation committed after the follower's cursor
    ///
    /// The reply always carries the log head, even when the (possibly
    /// filtered) mutation list is empty. A cursor below the retained floor
    /// fails with `failed_precondition`; the follower must fall back to
    /// `get_full_database`.
    ///
    /// # Arguments
    ///
    /// * `request` - The follower's last seen version and an optional filter
    ///
    /// # Returns
    ///
    /// Returns the log head and the ordered versioned mutations
    async fn get_changes(
        &self,
        request: tonic::Request<pb::GetChangesRequest>,
    ) -> Result<tonic::Response<pb::GetChangesReply>, tonic::Status> {
        metrics::record_metrics("get_changes", || async {
            let req = request.get_ref();
            log::debug!("get changes since {}", req.last_seen_version);
            let filter = req.filter.clone().map(ClassFilter::new);
            let store = server::instance().lock().await.store();
            let (most_recent_version, mutations) =
                store.changes_since(req.last_seen_version, filter.as_ref())?;
            Ok(tonic::Response::new(pb::GetChangesReply {
                most_recent_version,
                mutations: mutations.iter().map(pb::VersionedMutation::from).collect(),
            }))
        })
        .await
    }

    /// Folds the log prefix up to the requested version into the base
    /// snapshot
    ///
    /// The caller is the coordination layer, which guarantees every live
    /// follower has already advanced past the truncated prefix.
    ///
    /// # Arguments
    ///
    /// * `request` - The last version to truncate
    ///
    /// # Returns
    ///
    /// Returns an empty acknowledgment once the compaction is durable
    async fn compact(
        &self,
        request: tonic::Request<pb::CompactRequest>,
    ) -> Result<tonic::Response<pb::CompactReply>, tonic::Status> {
        metrics::record_metrics("compact", || async {
            let up_to = request.get_ref().last_truncated_version;
            log::info!("compact request up to version {}", up_to);
            let store = server::instance().lock().await.store();
            store.compact(up_to)?;
            metrics::FLOOR_VERSION_GAUGE.set(store.floor_version());
            Ok(tonic::Response::new(pb::CompactReply {}))
        })
        .await
    }
}
