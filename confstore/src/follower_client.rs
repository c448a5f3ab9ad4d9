//! Follower client implementation
//!
//! This module provides the caller-side polling policy of the follower
//! protocol: track the last seen version, read changes incrementally, and
//! fall back to a full snapshot when compaction has outrun the cursor.
//! The store never retries on the follower's behalf; this client is where
//! that responsibility lives.

use std::collections::BTreeMap;

use crate::store::{Version, VersionedMutation, INVALID_VERSION};
use crate::wire::pb;
use pb::config_follower_client::ConfigFollowerClient;

/// Outcome of one poll.
#[derive(Debug)]
pub enum ClientUpdate {
    /// Mutations committed since the previous poll. `most_recent_version`
    /// is the log head even when the list is empty.
    Changes {
        most_recent_version: Version,
        mutations: Vec<VersionedMutation>,
    },
    /// The cursor fell below the retained floor; the full snapshot was
    /// fetched instead and the cursor jumped to its version.
    Resynced {
        version: Version,
        database: BTreeMap<Vec<u8>, Vec<u8>>,
    },
}

/// A follower of one configuration store node.
pub struct FollowerClient {
    client: ConfigFollowerClient<tonic::transport::Channel>,
    filter: Option<Vec<u8>>,
    last_seen: Version,
}

impl FollowerClient {
    pub async fn connect(
        addr: String,
        filter: Option<Vec<u8>>,
    ) -> Result<Self, tonic::transport::Error> {
        let client = ConfigFollowerClient::connect(addr).await?;
        Ok(FollowerClient {
            client,
            filter,
            last_seen: INVALID_VERSION,
        })
    }

    pub fn last_seen_version(&self) -> Version {
        self.last_seen
    }

    /// Asks the store for its current log head.
    pub async fn current_version(&mut self) -> Result<Version, tonic::Status> {
        let reply = self.client.get_version(pb::GetVersionRequest {}).await?;
        Ok(reply.into_inner().version)
    }

    /// Advances the cursor by one round of the follower protocol.
    ///
    /// Issues `get_changes` from the cursor; on `failed_precondition` (the
    /// retained floor moved past us) resynchronizes via
    /// `get_full_database`. Any other error is returned to the caller
    /// untouched.
    pub async fn poll(&mut self) -> Result<ClientUpdate, tonic::Status> {
        let request = pb::GetChangesRequest {
            last_seen_version: self.last_seen,
            filter: self.filter.clone(),
        };
        match self.client.get_changes(request).await {
            Ok(reply) => {
                let reply = reply.into_inner();
                let mutations = reply
                    .mutations
                    .into_iter()
                    .filter_map(|vm| {
                        vm.mutation.map(|mutation| VersionedMutation {
                            version: vm.version,
                            mutation: mutation.into(),
                        })
                    })
                    .collect();
                self.last_seen = reply.most_recent_version;
                Ok(ClientUpdate::Changes {
                    most_recent_version: reply.most_recent_version,
                    mutations,
                })
            }
            Err(status) if status.code() == tonic::Code::FailedPrecondition => {
                log::warn!(
                    "cursor {} fell below the retained floor, resyncing via full snapshot",
                    self.last_seen
                );
                let request = pb::GetFullDatabaseRequest {
                    version: None,
                    filter: self.filter.clone(),
                };
                let reply = self.client.get_full_database(request).await?.into_inner();
                self.last_seen = reply.version;
                Ok(ClientUpdate::Resynced {
                    version: reply.version,
                    database: reply
                        .database
                        .into_iter()
                        .map(|kv| (kv.key, kv.value))
                        .collect(),
                })
            }
            Err(status) => Err(status),
        }
    }
}
