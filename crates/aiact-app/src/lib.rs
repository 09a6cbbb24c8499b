// The analysis pipeline: inventory management, model-backed classification
// with rule fallback, document generation and inventory export.

pub mod export;
pub mod service;

pub use service::AnalysisService;
