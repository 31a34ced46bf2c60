pub mod document_pipeline;
pub mod extract;
pub mod summarize;

pub use document_pipeline::DocumentPipelineHandler;
pub use extract::ExtractHandler;
pub use summarize::SummarizeHandler;
