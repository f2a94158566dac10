//! Multi-round tool-use orchestration.
//!
//! # Architecture
//!
//! ```text
//! Orchestrator
//!   +-- OrchestratorConfig (model, round limit, retry, system instruction)
//!   +-- ModelProvider (function-calling backend)
//!   +-- ToolRegistry (query / stage / commit)
//!
//! Session (one per conversation)
//!   +-- TurnHistory (bounded by user turns)
//!   +-- StagedSlot (at most one draft)
//! ```
//!
//! # Key Types
//!
//! - [`Orchestrator`]: resolves one user message against a session
//! - [`Session`]: per-conversation state
//! - [`TurnHistory`]: windowed dialogue history
//! - [`AgentReply`]: final text, rounds, stop reason and executed calls
//! - [`StopReason`]: why the loop stopped

pub mod history;
pub mod loop_engine;
pub mod session;
pub mod types;

pub use history::TurnHistory;
pub use loop_engine::Orchestrator;
pub use session::{Session, StagedEntity, StagedSlot};
pub use types::{AgentReply, ExecutedToolCall, OrchestratorConfig, RetryPolicy, StopReason};
