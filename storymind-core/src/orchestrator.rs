//! Pipeline orchestration (C8): sequence C1 through C5 on ingest, and drive
//! C6/C7 on demand for image (re)generation and deletion.
//!
//! Blocking and sequential by design — no intra-source parallelism. Each
//! stage's failure policy matches the propagation table in this crate's
//! error taxonomy: document load and index build failures abort the whole
//! ingest; a single character's profile or image failure is isolated and
//! logged, and the rest of the pipeline continues.

use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;

use crate::config::Config;
use crate::dedup::{self, DedupOptions};
use crate::document;
use crate::embedder::Embedder;
use crate::error::{Result, StoryMindError};
use crate::index::EmbeddingIndex;
use crate::llm::LlmClient;
use crate::names;
use crate::portrait::{self, ImageOutcome, ImageProvider};
use crate::profile;
use crate::seed;
use crate::storage::DB;

/// Summary of a completed (or failed) ingest, returned to the caller.
#[derive(Debug, Clone)]
pub struct IngestReport {
    pub source_id: i64,
    pub title: String,
    pub window_count: usize,
    pub character_count: usize,
}

/// Wires together the storage, embedding, LLM, and image-generation
/// collaborators that drive a full ingest.
pub struct Orchestrator {
    pub db: DB,
    pub data_dir: PathBuf,
    pub image_dir: PathBuf,
    pub llm: Box<dyn LlmClient>,
    pub image_provider: Box<dyn ImageProvider>,
    pub embedder: Box<dyn Embedder>,
    pub config: Config,
}

impl Orchestrator {
    pub fn new(
        db: DB,
        data_dir: PathBuf,
        image_dir: PathBuf,
        llm: Box<dyn LlmClient>,
        image_provider: Box<dyn ImageProvider>,
        embedder: Box<dyn Embedder>,
        config: Config,
    ) -> Result<Self> {
        std::fs::create_dir_all(&data_dir).map_err(StoryMindError::from)?;
        std::fs::create_dir_all(&image_dir).map_err(StoryMindError::from)?;
        Ok(Self {
            db,
            data_dir,
            image_dir,
            llm,
            image_provider,
            embedder,
            config,
        })
    }

    /// Ingest `path`: load, window, embed, extract names, deduplicate, and
    /// synthesize a profile for each surviving canonical character.
    ///
    /// Re-ingesting a document whose normalized title already exists
    /// atomically supersedes the prior source (cascading deletion of its
    /// characters, images, and index).
    pub fn ingest(&mut self, path: &Path) -> Result<IngestReport> {
        let (metadata, windows) = document::load(path)?;
        let source_id =
            self.db
                .upsert_pending_source(&metadata.title, metadata.author.as_deref(), metadata.format.as_str())?;
        self.db.set_source_processing(source_id)?;

        match self.run_ingest_pipeline(source_id, &metadata.title, &windows) {
            Ok(report) => Ok(report),
            Err(err) => {
                tracing::warn!("ingest failed for '{}': {err}", metadata.title);
                let _ = self.db.set_source_failed(source_id, &err.to_string());
                EmbeddingIndex::remove_sidecars(&self.index_path(source_id));
                Err(err)
            }
        }
    }

    fn run_ingest_pipeline(
        &mut self,
        source_id: i64,
        title: &str,
        windows: &[crate::chunker::Window],
    ) -> Result<IngestReport> {
        let texts: Vec<String> = windows.iter().map(|w| w.text.clone()).collect();
        let mut vectors = Vec::with_capacity(texts.len());
        for text in &texts {
            vectors.push(self.embedder.embed(text)?);
        }

        let index = EmbeddingIndex::build(self.embedder.model_identity(), vectors, texts.clone())?;
        let index_path = self.index_path(source_id);
        index.save(&index_path)?;

        let prefix: String = texts
            .iter()
            .scan(0usize, |used, text| {
                if *used >= self.config.prefix_chars() {
                    return None;
                }
                *used += text.len();
                Some(text.as_str())
            })
            .collect::<Vec<_>>()
            .join("\n");

        let extracted_names = names::extract(self.llm.as_ref(), &prefix, self.config.name_limit())?;

        let dedup_opts = DedupOptions {
            semantic: self.config.semantic_dedup(),
        };
        let (canonical_names, alias_map) =
            dedup::deduplicate(&extracted_names, &dedup_opts, Some(self.llm.as_ref()));
        tracing::info!("alias map for '{title}': {alias_map:?}");

        let mut character_count = 0usize;
        for (i, name) in canonical_names.iter().enumerate() {
            match profile::synthesize(name, &index, self.embedder.as_mut(), self.llm.as_ref(), self.config.retrieval_k())
            {
                Ok(Some(profile)) => {
                    let character_seed = seed::seed(&profile.name);
                    if let Err(e) = self.db.insert_character(
                        source_id,
                        &profile.name,
                        &profile.description,
                        profile.mention_count,
                        character_seed,
                    ) {
                        tracing::warn!("failed to persist character '{name}': {e}");
                        continue;
                    }
                    character_count += 1;
                }
                Ok(None) => {
                    tracing::warn!("skipping '{name}': no retrievable context");
                }
                Err(e) => {
                    tracing::warn!("skipping '{name}': profile synthesis failed: {e}");
                }
            }

            if i + 1 < canonical_names.len() {
                thread::sleep(Duration::from_secs(self.config.profile_pacing_secs()));
            }
        }

        self.db.set_source_completed(
            source_id,
            windows.len(),
            character_count,
            &index_path.to_string_lossy(),
        )?;

        Ok(IngestReport {
            source_id,
            title: title.to_string(),
            window_count: windows.len(),
            character_count,
        })
    }

    /// Regenerate a character's portrait. Permitted even if the current
    /// image's outcome is `placeholder`.
    pub fn regenerate_image(&mut self, character_id: i64) -> Result<()> {
        let character = self
            .db
            .get_character(character_id)?
            .ok_or_else(|| StoryMindError::PersistenceError(format!("no such character {character_id}")))?;

        let style = self.config.style();
        let aspect_ratio = self.config.aspect_ratio();
        let character_seed = character.seed as u32;

        let generated = portrait::generate_image(
            self.image_provider.as_ref(),
            &self.image_dir,
            &character.name,
            &character.description,
            &style,
            character_seed,
            &aspect_ratio,
        )
        .map_err(StoryMindError::from)?;

        let outcome = match generated.outcome {
            ImageOutcome::Real => "real",
            ImageOutcome::Placeholder => "placeholder",
        };

        self.db.insert_image(
            character_id,
            &generated.path.to_string_lossy(),
            &generated.prompt,
            &style,
            &aspect_ratio,
            outcome,
            generated.duration_ms,
        )?;

        Ok(())
    }

    /// Delete a source and cascade: image files, image records, characters,
    /// embedding index file, source record. Filesystem deletions are
    /// best-effort; database deletions are transactional.
    pub fn delete_source(&mut self, source_id: i64) -> Result<()> {
        let image_paths = self.db.image_paths_for_source(source_id)?;
        for path in &image_paths {
            let _ = std::fs::remove_file(path);
        }

        let index_path = self.db.delete_source(source_id)?;
        if let Some(index_path) = index_path {
            EmbeddingIndex::remove_sidecars(Path::new(&index_path));
        }

        Ok(())
    }

    fn index_path(&self, source_id: i64) -> PathBuf {
        self.data_dir.join(format!("{source_id}.index"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedder::EMBEDDING_DIM;
    use crate::error::ImageProviderError;
    use crate::llm::FakeLlmClient;

    struct StubEmbedder;

    impl Embedder for StubEmbedder {
        fn embed(&mut self, text: &str) -> Result<Vec<f32>> {
            let mut v = vec![0.0; EMBEDDING_DIM];
            v[0] = text.len() as f32;
            Ok(v)
        }

        fn model_identity(&self) -> &str {
            "stub-embedder"
        }
    }

    struct StubImageProvider;

    impl ImageProvider for StubImageProvider {
        fn generate(
            &self,
            _prompt: &str,
            _seed: u32,
            _aspect_ratio: &str,
        ) -> std::result::Result<Vec<u8>, ImageProviderError> {
            Err(ImageProviderError::Transport("stub: no network in tests".to_string()))
        }
    }

    fn build_orchestrator(data_dir: &Path, image_dir: &Path, llm_response: &str) -> Orchestrator {
        Orchestrator::new(
            DB::in_memory().unwrap(),
            data_dir.to_path_buf(),
            image_dir.to_path_buf(),
            Box::new(FakeLlmClient {
                response: llm_response.to_string(),
            }),
            Box::new(StubImageProvider),
            Box::new(StubEmbedder),
            Config::default(),
        )
        .unwrap()
    }

    #[test]
    fn regenerate_image_falls_back_to_placeholder_without_network() {
        let data_dir = tempfile::tempdir().unwrap();
        let image_dir = tempfile::tempdir().unwrap();
        let mut orchestrator = build_orchestrator(data_dir.path(), image_dir.path(), "unused");

        let source_id = orchestrator
            .db
            .upsert_pending_source("Emma", None, "text")
            .unwrap();
        let character_id = orchestrator
            .db
            .insert_character(source_id, "Emma Woodhouse", "A description.", 5, 42)
            .unwrap();

        orchestrator.regenerate_image(character_id).unwrap();

        let image = orchestrator.db.current_image(character_id).unwrap().unwrap();
        assert_eq!(image.outcome, "placeholder");
    }

    #[test]
    fn delete_source_removes_index_file_and_db_row() {
        let data_dir = tempfile::tempdir().unwrap();
        let image_dir = tempfile::tempdir().unwrap();
        let mut orchestrator = build_orchestrator(data_dir.path(), image_dir.path(), "unused");

        let source_id = orchestrator
            .db
            .upsert_pending_source("Emma", None, "text")
            .unwrap();
        let index_path = orchestrator.index_path(source_id);
        std::fs::write(&index_path, b"stub index bytes").unwrap();
        orchestrator
            .db
            .set_source_completed(source_id, 10, 1, &index_path.to_string_lossy())
            .unwrap();

        orchestrator.delete_source(source_id).unwrap();

        assert!(orchestrator.db.get_source(source_id).unwrap().is_none());
        assert!(!index_path.exists());
    }
}
