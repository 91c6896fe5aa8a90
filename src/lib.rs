pub mod config;
pub mod db {
    pub mod documents;
    pub mod schema_init;
}
pub mod api;
pub mod source;
pub mod fetcher;
pub mod extractor;
pub mod splitter;
pub mod llm;
pub mod embedder;
pub mod chunker;
pub mod pipeline;
pub use pipeline::{Pipeline, PipelineError, PipelineReport};
