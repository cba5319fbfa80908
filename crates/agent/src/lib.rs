//! Agent Runtime - instruction routing and conversation state
//!
//! This crate turns free-form instructions into structured capability
//! invocations:
//! - Keeps the table of registered capabilities (`registry`)
//! - Chooses at most one capability per instruction (`classifier`)
//! - Extracts typed arguments from the instruction and caller context (`extract`)
//! - Records each exchange in a bounded per-session history (`conversation`)
//!
//! # Architecture
//!
//! One dispatch follows a fixed loop:
//! 1. **Snapshot** (`registry`) - Read the registry once; later registrations are not observed
//! 2. **Classification** (`classifier`) - Exactly one call to the classifier seam
//! 3. **Extraction** (`extract`) - Context value, then instruction text, then default
//! 4. **Recording** (`conversation`) - Append one turn when a session is given
//!
//! # Key Types
//!
//! - `AgentRuntime` - Main orchestrator (see `runtime` module)
//! - `Classifier` - Pluggable seam with keyword and LLM implementations
//! - `CapabilityRegistry` - Copy-on-write capability table
//!
//! # Safety Principle
//!
//! The classifier only names a capability. It never fills in arguments and
//! never runs a handler; extraction and execution stay deterministic.

pub mod catalog;
pub mod classifier;
pub mod clock;
pub mod conversation;
pub mod dispatcher;
pub mod extract;
pub mod handlers;
pub mod llm;
pub mod registry;
pub mod runtime;

pub use classifier::{Candidate, Classification, Classifier, KeywordClassifier, LlmClassifier};
pub use clock::{Clock, FixedClock, SystemClock};
pub use conversation::ConversationStore;
pub use dispatcher::Dispatcher;
pub use registry::{CapabilityRegistry, RegistrySnapshot};
pub use runtime::{AgentRuntime, BuildError, ExecutionOutcome, RuntimeStatus};
