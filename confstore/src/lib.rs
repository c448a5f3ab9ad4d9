//! Replicated versioned configuration store
//!
//! A single node of the coordination layer's configuration store: an
//! append-only versioned mutation log with snapshot materialization,
//! prefix compaction, a gRPC follower protocol, and a gRPC writer ingress.

pub mod config;
pub mod follower_client;
pub mod follower_service;
pub mod metrics;
pub mod server;
pub mod store;
pub mod wire;
pub mod writer_service;
