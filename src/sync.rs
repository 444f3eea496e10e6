//! Per-document sync: chunk, enrich, embed, and atomically replace the
//! stored chunk set.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{info, warn};

use crate::chunker::chunk_document;
use crate::embed::{build_embedding_input, vector_to_string, EmbeddingInput, EmbeddingProvider};
use crate::enrich::{
    chunks_for_context, document_for_context, generate_context_prefixes, ContextModel,
};
use crate::error::PipelineError;
use crate::store::{ChunkRecord, ChunkStore};
use crate::types::{Document, PipelineConfig};

/// What one document sync did.
#[derive(Debug, Clone)]
pub struct SyncOutcome {
    pub source_id: String,
    pub deleted: usize,
    pub created: usize,
    pub enriched: usize,
    pub embedded: usize,
    /// Set when the document was skipped without touching the store.
    pub skipped_reason: Option<String>,
    pub duration: Duration,
}

impl SyncOutcome {
    fn skipped(source_id: &str, reason: impl Into<String>, started: Instant) -> Self {
        Self {
            source_id: source_id.to_string(),
            deleted: 0,
            created: 0,
            enriched: 0,
            embedded: 0,
            skipped_reason: Some(reason.into()),
            duration: started.elapsed(),
        }
    }
}

/// Drives the chunk → enrich → embed → replace pipeline for one document
/// at a time.
pub struct SyncEngine {
    store: Arc<ChunkStore>,
    /// Absent means chunks are stored without context prefixes.
    context_model: Option<Arc<dyn ContextModel>>,
    embedder: Arc<dyn EmbeddingProvider>,
    config: PipelineConfig,
}

impl SyncEngine {
    pub fn new(
        store: Arc<ChunkStore>,
        context_model: Option<Arc<dyn ContextModel>>,
        embedder: Arc<dyn EmbeddingProvider>,
        config: PipelineConfig,
    ) -> Self {
        Self {
            store,
            context_model,
            embedder,
            config,
        }
    }

    /// Sync one document.
    ///
    /// Enrichment is best-effort: a failure after retries logs and the
    /// document proceeds unenriched. Embedding is required: a failure
    /// aborts the document and the stored set is left untouched.
    pub async fn sync_document(&self, doc: &Document) -> Result<SyncOutcome, PipelineError> {
        let started = Instant::now();

        if !doc.content_type.is_chunkable() {
            warn!(
                document = %doc.label(),
                content_type = %doc.content_type,
                "document not in scope for chunking, skipping"
            );
            return Ok(SyncOutcome::skipped(
                &doc.id,
                format!("content type {} not in scope", doc.content_type),
                started,
            ));
        }

        let chunks = chunk_document(doc, &self.config.chunk_budget);
        if chunks.is_empty() {
            info!(document = %doc.label(), "no chunkable content, skipping");
            return Ok(SyncOutcome::skipped(&doc.id, "no chunkable content", started));
        }

        let mut prefixes: HashMap<String, String> = HashMap::new();
        if let Some(model) = &self.context_model {
            match generate_context_prefixes(
                model.as_ref(),
                &document_for_context(doc),
                &chunks_for_context(&chunks),
                &self.config.context_budget,
                &self.config.retry,
            )
            .await
            {
                Ok(map) => prefixes = map,
                Err(err) => {
                    warn!(
                        document = %doc.label(),
                        error = %err,
                        "context enrichment failed, proceeding without prefixes"
                    );
                }
            }
        }

        let inputs: Vec<EmbeddingInput> = chunks
            .iter()
            .map(|c| EmbeddingInput {
                id: c.path.clone(),
                text: build_embedding_input(
                    &c.content,
                    prefixes.get(&c.path).map(String::as_str),
                    &c.contextual_header,
                ),
            })
            .collect();

        let mut vectors = Vec::with_capacity(inputs.len());
        for batch in inputs.chunks(self.embedder.max_batch_size()) {
            let result = self.embedder.embed_batch(batch).await?;
            vectors.extend(result.embeddings);
        }

        let enriched = chunks
            .iter()
            .filter(|c| prefixes.contains_key(&c.path))
            .count();
        let embedded = vectors.len();
        let records: Vec<ChunkRecord> = chunks
            .iter()
            .zip(&vectors)
            .map(|(chunk, vector)| {
                ChunkRecord::from_chunk(
                    chunk,
                    prefixes.get(&chunk.path).cloned(),
                    Some(vector_to_string(vector)),
                )
            })
            .collect();

        let (deleted, created) = self.store.replace_for_source(&doc.id, records).await?;
        info!(
            document = %doc.label(),
            deleted,
            created,
            enriched,
            embedded,
            "synced document chunks"
        );

        Ok(SyncOutcome {
            source_id: doc.id.clone(),
            deleted,
            created,
            enriched,
            embedded,
            skipped_reason: None,
            duration: started.elapsed(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embed::EmbeddingBatchResult;
    use crate::types::{CanonicalJson, Chapter, Paragraf, SourceCategory};
    use async_trait::async_trait;
    use std::sync::Mutex;

    struct FixedModel {
        response: String,
    }

    #[async_trait]
    impl ContextModel for FixedModel {
        async fn complete(&self, _prompt: &str) -> Result<String, PipelineError> {
            Ok(self.response.clone())
        }
    }

    struct FailingModel;

    #[async_trait]
    impl ContextModel for FailingModel {
        async fn complete(&self, _prompt: &str) -> Result<String, PipelineError> {
            Err(PipelineError::provider("anthropic", "overloaded"))
        }
    }

    struct FakeEmbedder {
        fail: bool,
        calls: Mutex<usize>,
    }

    impl FakeEmbedder {
        fn new(fail: bool) -> Self {
            Self {
                fail,
                calls: Mutex::new(0),
            }
        }
    }

    #[async_trait]
    impl EmbeddingProvider for FakeEmbedder {
        fn max_batch_size(&self) -> usize {
            100
        }

        async fn embed_batch(
            &self,
            inputs: &[EmbeddingInput],
        ) -> Result<EmbeddingBatchResult, PipelineError> {
            *self.calls.lock().unwrap() += 1;
            if self.fail {
                return Err(PipelineError::provider("openai", "rate limited"));
            }
            Ok(EmbeddingBatchResult {
                embeddings: inputs.iter().map(|_| vec![0.1, 0.2]).collect(),
                total_tokens: inputs.len() as u64 * 10,
            })
        }
    }

    fn law(id: &str) -> Document {
        Document {
            id: id.into(),
            title: "Testlag".into(),
            document_number: Some("2020:1".into()),
            content_type: SourceCategory::SfsLaw,
            slug: None,
            json_content: Some(CanonicalJson {
                chapters: vec![Chapter {
                    number: Some("1".into()),
                    title: None,
                    paragrafer: vec![Paragraf {
                        number: "1".into(),
                        heading: None,
                        content: Some("Denna lag gäller alla.".into()),
                        amended_by: None,
                        stycken: vec![],
                    }],
                }],
                ..Default::default()
            }),
            markdown_content: Some("## 1 kap.\n\nDenna lag gäller alla.".into()),
            plain_text_content: None,
        }
    }

    async fn engine(
        model: Option<Arc<dyn ContextModel>>,
        embedder: Arc<FakeEmbedder>,
    ) -> (SyncEngine, Arc<ChunkStore>) {
        let store = Arc::new(ChunkStore::open_in_memory().await.unwrap());
        let mut config = PipelineConfig::default();
        config.retry.max_attempts = 1;
        config.retry.delay = Duration::ZERO;
        (
            SyncEngine::new(store.clone(), model, embedder, config),
            store,
        )
    }

    #[tokio::test]
    async fn amendment_is_skipped_without_store_effect() {
        let embedder = Arc::new(FakeEmbedder::new(false));
        let (engine, store) = engine(None, embedder.clone()).await;
        let mut doc = law("doc-1");
        doc.content_type = SourceCategory::SfsAmendment;

        let outcome = engine.sync_document(&doc).await.unwrap();
        assert!(outcome.skipped_reason.is_some());
        assert_eq!(outcome.created, 0);
        assert_eq!(store.count().await.unwrap(), 0);
        assert_eq!(*embedder.calls.lock().unwrap(), 0);
    }

    #[tokio::test]
    async fn empty_document_is_skipped() {
        let embedder = Arc::new(FakeEmbedder::new(false));
        let (engine, store) = engine(None, embedder).await;
        let mut doc = law("doc-1");
        doc.json_content = None;
        doc.markdown_content = None;

        let outcome = engine.sync_document(&doc).await.unwrap();
        assert_eq!(outcome.skipped_reason.as_deref(), Some("no chunkable content"));
        assert_eq!(store.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn happy_path_persists_enriched_embedded_chunks() {
        let model: Arc<dyn ContextModel> = Arc::new(FixedModel {
            response: r#"{"prefixes": {"kap1.§1": "Inledande bestämmelse i Testlag (2020:1)."}}"#
                .into(),
        });
        let embedder = Arc::new(FakeEmbedder::new(false));
        let (engine, store) = engine(Some(model), embedder).await;

        let outcome = engine.sync_document(&law("doc-1")).await.unwrap();
        assert_eq!(outcome.created, 1);
        assert_eq!(outcome.enriched, 1);
        assert_eq!(outcome.embedded, 1);
        assert!(outcome.skipped_reason.is_none());

        let records = store.chunks_for_source("doc-1").await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(
            records[0].context_prefix.as_deref(),
            Some("Inledande bestämmelse i Testlag (2020:1).")
        );
        assert_eq!(records[0].embedding.as_deref(), Some("[0.1,0.2]"));
    }

    #[tokio::test]
    async fn enrichment_failure_proceeds_unenriched() {
        let model: Arc<dyn ContextModel> = Arc::new(FailingModel);
        let embedder = Arc::new(FakeEmbedder::new(false));
        let (engine, store) = engine(Some(model), embedder).await;

        let outcome = engine.sync_document(&law("doc-1")).await.unwrap();
        assert_eq!(outcome.created, 1);
        assert_eq!(outcome.enriched, 0);

        let records = store.chunks_for_source("doc-1").await.unwrap();
        assert_eq!(records[0].context_prefix, None);
        assert!(records[0].embedding.is_some());
    }

    #[tokio::test]
    async fn embedding_failure_aborts_and_preserves_previous_set() {
        let good = Arc::new(FakeEmbedder::new(false));
        let (engine, store) = engine(None, good).await;
        engine.sync_document(&law("doc-1")).await.unwrap();

        let failing_engine = SyncEngine::new(
            store.clone(),
            None,
            Arc::new(FakeEmbedder::new(true)),
            PipelineConfig::default(),
        );
        let result = failing_engine.sync_document(&law("doc-1")).await;
        assert!(result.is_err());

        let records = store.chunks_for_source("doc-1").await.unwrap();
        assert_eq!(records.len(), 1);
        assert!(records[0].embedding.is_some());
    }
}
