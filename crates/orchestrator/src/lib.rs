//! Orchestrator & routing plane.
//!
//! Provisions tenant teams (idempotent, serialized per team),
//! reconciles Kubernetes workloads, resolves inbound identifiers to
//! teams, proxies admin agent runs behind impersonation tokens, and
//! hosts the SSE command gateway for in-cluster agents.

pub mod api;
pub mod clients;
pub mod gateway;
pub mod metrics;
pub mod provision;
pub mod state;
