//! In-cluster agent: a long-lived SSE client that executes gateway
//! commands against the local Kubernetes API.

pub mod backoff;
pub mod connection;
