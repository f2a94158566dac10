//! Colloquy: conversational tool-use engine with spoken replies.
//!
//! A user message flows through the engine like this:
//! User message → Orchestrator ⇄ (Model ↔ Tools) → final text → Speech
//!
//! # Architecture
//!
//! - **Orchestrator** (`agent`): multi-round model/tool loop over a bounded,
//!   per-session turn history
//! - **Tools** (`tools`): query, stage and commit over a record store, with
//!   arguments validated into a tagged union before dispatch
//! - **Model** (`llm`): function-calling provider trait and the Gemini adapter
//! - **Streaming extractor** (`stream`): progressive JSON objects from a
//!   streamed response, framed as server-sent events
//! - **Speech** (`tts`): normalize, chunk, synthesize and play with a local
//!   fallback voice and barge-in cancellation
//! - **Surfaces**: the `engine` facade, an `axum` HTTP `server`, and the
//!   `colloquy-chat` / `colloquy-server` binaries

pub mod agent;
pub mod config;
pub mod engine;
pub mod error;
pub mod llm;
pub mod server;
pub mod store;
pub mod stream;
pub mod tools;
pub mod tts;

pub use config::EngineConfig;
pub use engine::{ConversationEngine, UserInput};
pub use error::{Result, SpeechError};
