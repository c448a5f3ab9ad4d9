//! Wire types
//!
//! Generated protobuf messages for the follower and writer services, plus
//! the conversions between wire mutations and store mutations and the
//! mapping of store errors onto gRPC status codes.

use crate::store::{Mutation, MutationOp, StoreError, VersionedMutation};

/// Protocol buffer definitions for the configuration store services
pub mod pb {
    tonic::include_proto!("confstore");
}

impl From<&Mutation> for pb::Mutation {
    fn from(mutation: &Mutation) -> Self {
        let (kind, value) = match &mutation.op {
            MutationOp::Set(value) => (pb::MutationKind::Set, value.clone()),
            MutationOp::Clear => (pb::MutationKind::Clear, Vec::new()),
        };
        pb::Mutation {
            kind: kind as i32,
            key: mutation.key.clone(),
            value,
            config_class: mutation.class.clone(),
        }
    }
}

impl From<pb::Mutation> for Mutation {
    fn from(mutation: pb::Mutation) -> Self {
        let op = match mutation.kind() {
            pb::MutationKind::Set => MutationOp::Set(mutation.value),
            pb::MutationKind::Clear => MutationOp::Clear,
        };
        Mutation {
            key: mutation.key,
            class: mutation.config_class,
            op,
        }
    }
}

impl From<&VersionedMutation> for pb::VersionedMutation {
    fn from(vm: &VersionedMutation) -> Self {
        pb::VersionedMutation {
            version: vm.version,
            mutation: Some((&vm.mutation).into()),
        }
    }
}

impl From<StoreError> for tonic::Status {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::StaleVersion { .. } => tonic::Status::failed_precondition(err.to_string()),
            StoreError::VersionTooOld { .. } => tonic::Status::out_of_range(err.to_string()),
            StoreError::VersionNotFound { .. } => tonic::Status::not_found(err.to_string()),
            StoreError::InvalidCompactVersion { .. } => {
                tonic::Status::invalid_argument(err.to_string())
            }
            StoreError::Io(_) | StoreError::Codec(_) => tonic::Status::internal(err.to_string()),
        }
    }
}
