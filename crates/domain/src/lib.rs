//! Shared domain types for the Infrafox platform.
//!
//! Everything that crosses a crate boundary lives here: the error
//! taxonomy, configuration, conversation messages, provider stream
//! events, session events, the routing index, and the effective
//! team-config model consumed from the Config Service.

pub mod config;
pub mod error;
pub mod event;
pub mod message;
pub mod routing;
pub mod sse;
pub mod stream;
pub mod team;

pub use error::{Error, Result};
