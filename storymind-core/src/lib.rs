//! storymind-core: character extraction and visualization pipeline for
//! long-form literary documents.
//!
//! Sequences document loading, embedding-index construction, LLM-driven
//! name extraction, alias deduplication, and RAG-grounded profile
//! synthesis, with deterministic seeded placeholder images as a fallback
//! for the optional text-to-image step.

pub mod chunker;
pub mod config;
pub mod dedup;
pub mod document;
pub mod embedder;
pub mod error;
pub mod index;
pub mod llm;
pub mod logging;
pub mod names;
pub mod orchestrator;
pub mod portrait;
pub mod profile;
pub mod seed;
pub mod storage;

pub use chunker::{window_document, Window};
pub use config::Config;
pub use dedup::{deduplicate, DedupOptions};
pub use document::{SourceFormat, SourceMetadata};
pub use embedder::{l2_distance, CandleEmbedder, Embedder, EMBEDDING_DIM};
pub use error::{ImageProviderError, Result, StoryMindError};
pub use index::{EmbeddingIndex, IndexEntry};
pub use llm::{AnthropicClient, LlmClient};
pub use names::extract as extract_names;
pub use orchestrator::{IngestReport, Orchestrator};
pub use portrait::{generate_image, render_placeholder, GeneratedImage, HttpImageProvider, ImageOutcome, ImageProvider};
pub use profile::{synthesize as synthesize_profile, CharacterProfile};
pub use seed::seed;
pub use storage::{CharacterRow, ImageRow, Source, SourceState, DB};

/// Create the compute device for the current platform, preferring Metal on
/// macOS and falling back to CPU elsewhere or on Metal initialization
/// failure.
pub fn make_device() -> candle_core::Device {
    #[cfg(target_os = "macos")]
    {
        candle_core::Device::new_metal(0).unwrap_or(candle_core::Device::Cpu)
    }
    #[cfg(not(target_os = "macos"))]
    {
        candle_core::Device::Cpu
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn make_device_returns_a_usable_device() {
        let device = device_for_test();
        assert!(device.is_cpu() || device.is_metal());
    }

    fn device_for_test() -> candle_core::Device {
        make_device()
    }

    #[test]
    fn reexports_compile() {
        let _ = EMBEDDING_DIM;
        let _config = Config::default();
        let _db = DB::in_memory().unwrap();
        let _seed = seed("Harry Potter");
        assert_eq!(_seed, 1085936863);
    }
}
