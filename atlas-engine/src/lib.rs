//! Atlas Engine - Evolution Modes and Cycle Orchestrator
//!
//! Six executors update a population of scored entities:
//! - Collective intelligence
//! - Hyper-parallel learning
//! - Adversarial evolution
//! - Memory crystallization
//! - External-knowledge absorption
//! - Task discovery with benchmark enhancement
//!
//! [`EvolutionEngine`] validates a request and runs the selected executor(s)
//! over the stalest slice of the population once per cycle.

pub mod context;
pub mod modes;
pub mod orchestrator;
pub mod outcome;
pub mod request;

pub use context::ModeContext;
pub use modes::run_mode;
pub use orchestrator::{summarize, EvolutionEngine};
pub use outcome::{EntityGain, EvolutionSummary, ModeOutcome, WriteStats, TOP_RESULTS};
pub use request::{EvolutionMode, EvolutionRequest, ValidatedRequest};
