//! # Change Engine
//!
//! Change-planning workflows on top of the ticketing, retrieval and
//! text-generation seams:
//!
//! - [`ServiceMapBuilder`]: dependency narratives from the CMDB relationship graph
//! - [`DecompositionEngine`]: change request to change tasks
//! - [`DraftingOrchestrator`]: draft, impact analysis and submission of new changes
//! - [`ChangeIndexer`]: historical changes into the document store
//! - [`KnowledgeAssistant`]: answers grounded in indexed knowledge articles

pub mod decomposition;
pub mod drafting;
pub mod error;
pub mod extraction;
pub mod history;
pub mod knowledge;
mod prompts;
pub mod service_map;
pub mod settings;

pub use decomposition::{DecompositionEngine, DecompositionReport, TaskOutcome};
pub use drafting::{
    ChangeDraft, ChangeSubmission, CreatedChange, DraftOutcome, DraftRequest, DraftingOrchestrator,
};
pub use error::{EngineError, Result};
pub use extraction::{
    extract_from_reply, extract_json_objects, ExtractedSuggestion, Extraction, ExtractionError,
};
pub use history::{ChangeIndexer, IndexReport};
pub use knowledge::{ContextualAnswer, KnowledgeAssistant};
pub use service_map::{CiServiceMap, Direction, ServiceMap, ServiceMapBuilder};
pub use settings::EngineSettings;

#[cfg(test)]
mod tests;
