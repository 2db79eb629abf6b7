//! Routing runtime - model-driven classification and the request router
//!
//! This crate is the model-facing half of tabletalk - the runtime that:
//! - Classifies incoming questions (data query, conversation, or unclear)
//! - Generates candidate SQL over the feasible slice of the schema
//! - Summarizes execution results in plain language
//! - Drives every request through the workflow state machine in core
//!
//! # Architecture
//!
//! Each request walks a constrained loop:
//! 1. **Classification** (`classifier`) - Parse NL → `Classification` with a confidence score
//! 2. **Generation** (`generator`) - Produce one candidate SQL statement
//! 3. **Narration** (`summarizer`, `conversation`) - Compose the text the user reads
//! 4. **Routing** (`runtime`) - Apply workflow transitions and assemble the report
//!
//! # Key Types
//!
//! - `Router` - Main orchestrator (see `runtime` module)
//! - `LlmClient` - Pluggable trait over Ollama and OpenAI-compatible providers
//!
//! # Safety Principle
//!
//! The model is strictly a proposer. It NEVER decides what reaches the
//! warehouse: validation, the row cap, and the query timeout are deterministic
//! decisions made in core, and a sub-threshold classification always ends in
//! clarification rather than execution.

pub mod classifier;
pub mod conversation;
pub mod generator;
pub mod llm;
pub mod prompts;
pub mod providers;
pub mod runtime;
pub mod summarizer;
