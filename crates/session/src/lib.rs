//! Interactive agent session runtime.
//!
//! Each chat thread owns one [`InteractiveSession`]: it drives the LLM
//! conversation turn by turn, dispatches tool calls, answers
//! permission callbacks (blocking user questions), and emits a single
//! ordered stream of typed [`AgentEvent`]s per execution. The
//! [`progress`] module turns that event stream into debounced
//! chat-surface updates.

pub mod cancel;
pub mod handlers;
pub mod harvest;
pub mod hooks;
pub mod progress;
pub mod provider;
pub mod questions;
pub mod server;
pub mod session;
pub mod tools;

pub use cancel::CancelToken;
pub use provider::{ChatRequest, LlmProvider, MessagesClient};
pub use session::InteractiveSession;
pub use tools::{ToolContext, ToolHandler, ToolRegistry};
