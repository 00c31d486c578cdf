//! Retrieval-augmented memory of generated recipes.
//!
//! The document set is the source of truth; the vector index is a cache
//! derived from it and rebuilt whenever it cannot be trusted.

pub mod document;
pub mod embedder;
pub mod index;
pub mod splitter;
pub mod storage;

use std::path::PathBuf;
use std::sync::Arc;

use crate::error::AssistantError;
use crate::llm::GenerationBackend;
use crate::output::strip_echo;
use crate::prompts::{Fields, PromptTemplate, RETRIEVAL_QA};

pub use document::Document;
pub use embedder::{normalize_embedding, BertEmbedder, BertEmbedderConfig, Embedder, Embedding};
pub use index::{IndexEntry, SearchHit, VectorIndex};
pub use splitter::TextSplitter;
pub use storage::DocumentStorage;

/// How the index follows document additions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IndexPolicy {
    /// Embed only the new document and upsert its chunks
    #[default]
    Incremental,
    /// Re-embed the whole document set on every addition
    Rebuild,
}

#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Persistence directory; `None` keeps everything in memory
    pub directory: Option<PathBuf>,
    /// Chunks retrieved per query
    pub top_k: usize,
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    pub policy: IndexPolicy,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            directory: None,
            top_k: 3,
            chunk_size: 1000,
            chunk_overlap: 200,
            policy: IndexPolicy::Incremental,
        }
    }
}

pub struct RetrievalStore {
    documents: Vec<Document>,
    index: Option<VectorIndex>,
    embedder: Arc<dyn Embedder>,
    backend: Arc<dyn GenerationBackend>,
    splitter: TextSplitter,
    storage: Option<DocumentStorage>,
    template: PromptTemplate,
    config: StoreConfig,
}

impl RetrievalStore {
    /// Open the store, loading persisted documents and a trustworthy index
    /// cache, or rebuilding the index from the documents
    pub fn open(
        config: StoreConfig,
        embedder: Arc<dyn Embedder>,
        backend: Arc<dyn GenerationBackend>,
    ) -> Result<Self, AssistantError> {
        let storage = config.directory.clone().map(DocumentStorage::new);
        if let Some(storage) = &storage {
            log::debug!("opening recipe store at {:?}", storage.dir());
        }
        let documents = match &storage {
            Some(storage) => storage.load_documents()?,
            None => Vec::new(),
        };

        let mut store = Self {
            documents,
            index: None,
            embedder,
            backend,
            splitter: TextSplitter::new(config.chunk_size, config.chunk_overlap),
            storage,
            template: RETRIEVAL_QA,
            config,
        };

        let cached = store
            .storage
            .as_ref()
            .and_then(DocumentStorage::load_index)
            .filter(|index| !store.documents.is_empty() && store.index_is_current(index));

        match cached {
            Some(index) => {
                log::info!(
                    "loaded recipe index: {} document(s), {} chunk(s)",
                    store.documents.len(),
                    index.len()
                );
                store.index = Some(index);
            }
            None if !store.documents.is_empty() => {
                log::info!(
                    "index cache missing or stale; rebuilding from {} document(s)",
                    store.documents.len()
                );
                store.rebuild()?;
            }
            None => {}
        }

        Ok(store)
    }

    /// A store that keeps documents only in memory
    pub fn in_memory(
        embedder: Arc<dyn Embedder>,
        backend: Arc<dyn GenerationBackend>,
    ) -> Result<Self, AssistantError> {
        Self::open(StoreConfig::default(), embedder, backend)
    }

    pub fn documents(&self) -> &[Document] {
        &self.documents
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    /// Append a document, persist the document set, then update the index.
    ///
    /// On failure the document is neither kept in memory nor on disk.
    pub fn add_document(&mut self, document: Document) -> Result<(), AssistantError> {
        self.documents.push(document);

        if let Some(storage) = &self.storage {
            if let Err(error) = storage.save_documents(&self.documents) {
                self.documents.pop();
                return Err(error);
            }
        }

        let indexed = match self.config.policy {
            IndexPolicy::Incremental => self.index_document(self.documents.len() - 1),
            IndexPolicy::Rebuild => self.rebuild(),
        };

        if let Err(error) = indexed {
            self.roll_back_last();
            return Err(error);
        }

        if self.config.policy == IndexPolicy::Incremental {
            self.persist_index();
        }

        log::debug!("recipe store now holds {} document(s)", self.documents.len());
        Ok(())
    }

    /// Rebuild the whole index from the document set
    pub fn rebuild(&mut self) -> Result<(), AssistantError> {
        self.index = None;

        for position in 0..self.documents.len() {
            self.index_document(position)?;
        }

        self.persist_index();
        Ok(())
    }

    /// Top-k chunks most similar to `query`
    pub fn retrieve(&self, query: &str, top_k: usize) -> Result<Vec<SearchHit>, AssistantError> {
        if self.documents.is_empty() {
            return Err(AssistantError::IndexUnavailable);
        }

        let index = self.index.as_ref().ok_or(AssistantError::IndexUnavailable)?;
        let embedding = self
            .embedder
            .embed(query)
            .map_err(|error| AssistantError::Embedding(error.to_string()))?;

        Ok(index.search(&embedding, top_k))
    }

    /// Answer `text` from the stored recipes.
    ///
    /// Requires at least one stored document; an empty store yields
    /// `IndexUnavailable`.
    pub fn query(&self, text: &str) -> Result<String, AssistantError> {
        let hits = self.retrieve(text, self.config.top_k)?;
        let context = hits
            .iter()
            .map(|hit| hit.chunk.as_str())
            .collect::<Vec<_>>()
            .join("\n\n");

        let prompt = self.template.render(
            &Fields::new()
                .text("context", context)
                .text("question", text),
        )?;

        let response = self.backend.generate(&prompt)?;
        let answer = if self.backend.echoes_prompt() {
            strip_echo(&response, &prompt, self.template.echo_line_count())
        } else {
            response.as_str()
        };

        Ok(answer.trim().to_string())
    }

    fn index_document(&mut self, position: usize) -> Result<(), AssistantError> {
        let document = &self.documents[position];
        let chunks = self.splitter.split(&document.text());
        let embeddings = self
            .embedder
            .embed_batch(&chunks)
            .map_err(|error| AssistantError::Embedding(error.to_string()))?;

        let document_id = document.id.clone();
        let index = self
            .index
            .get_or_insert_with(|| VectorIndex::new(self.embedder.model_name()));

        index.upsert(&document_id, chunks.into_iter().zip(embeddings).collect())
    }

    /// Undo a document whose indexing failed
    fn roll_back_last(&mut self) {
        let Some(document) = self.documents.pop() else {
            return;
        };
        log::warn!("dropping recipe for '{}': indexing failed", document.meal);

        if let Some(storage) = &self.storage {
            if let Err(error) = storage.save_documents(&self.documents) {
                log::warn!("{error}");
            }
        }

        if self.config.policy == IndexPolicy::Rebuild {
            if let Err(error) = self.rebuild() {
                log::warn!("index left empty after failed rebuild: {error}");
            }
        }
    }

    fn index_is_current(&self, index: &VectorIndex) -> bool {
        if index.model_name() != self.embedder.model_name() {
            log::warn!(
                "index cache built with {}, embedder is {}",
                index.model_name(),
                self.embedder.model_name()
            );
            return false;
        }

        if index
            .dimension()
            .is_some_and(|dimension| dimension != self.embedder.dimension())
        {
            log::warn!("index cache dimension differs from the embedder's");
            return false;
        }

        index.covers(self.documents.iter().map(|document| document.id.as_str()))
    }

    /// The index is a cache: failing to write it only costs a rebuild later
    fn persist_index(&self) {
        let Some(storage) = &self.storage else {
            return;
        };

        let result = match &self.index {
            Some(index) => storage.save_index(index),
            None => storage.remove_index(),
        };

        if let Err(error) = result {
            log::warn!("{error}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{HashEmbedder, ScriptedBackend};

    fn embedder() -> Arc<dyn Embedder> {
        Arc::new(HashEmbedder::new(1024))
    }

    /// Fails on any text mentioning "mold"
    struct PickyEmbedder(HashEmbedder);

    impl Embedder for PickyEmbedder {
        fn embed(&self, text: &str) -> Result<Embedding, crate::llm::ModelError> {
            if text.contains("mold") {
                return Err(crate::llm::ModelError::InferenceError(
                    "embedder rejected text".to_string(),
                ));
            }
            self.0.embed(text)
        }

        fn dimension(&self) -> usize {
            self.0.dimension()
        }

        fn model_name(&self) -> &str {
            self.0.model_name()
        }
    }

    fn persistent_config(dir: &std::path::Path) -> StoreConfig {
        StoreConfig {
            directory: Some(dir.to_path_buf()),
            ..Default::default()
        }
    }

    #[test]
    fn query_on_empty_store_is_index_unavailable() {
        let backend = Arc::new(ScriptedBackend::new(["unused"]));
        let store = RetrievalStore::in_memory(embedder(), backend.clone()).unwrap();

        assert!(matches!(
            store.query("how do I make soup?"),
            Err(AssistantError::IndexUnavailable)
        ));
        assert!(backend.prompts().is_empty());
    }

    #[test]
    fn query_grounds_prompt_in_relevant_recipes() {
        let backend = Arc::new(ScriptedBackend::new(["  Simmer for an hour. "]));
        let mut store = RetrievalStore::in_memory(embedder(), backend.clone()).unwrap();

        store
            .add_document(Document::new("tomato soup", "Simmer tomatoes with garlic."))
            .unwrap();
        store
            .add_document(Document::new("green salad", "Toss lettuce with vinegar."))
            .unwrap();

        let answer = store.query("How long should tomato soup simmer?").unwrap();
        assert_eq!(answer, "Simmer for an hour.");

        let prompt = &backend.prompts()[0];
        assert!(prompt.contains("Meal: tomato soup"));
        assert!(prompt.contains("Question: How long should tomato soup simmer?"));
    }

    #[test]
    fn retrieve_returns_at_most_top_k() {
        let backend = Arc::new(ScriptedBackend::new(Vec::<String>::new()));
        let mut store = RetrievalStore::in_memory(embedder(), backend).unwrap();
        for meal in ["soup", "stew", "salad", "curry", "pie"] {
            store
                .add_document(Document::new(meal, format!("Cook the {meal}.")))
                .unwrap();
        }

        let hits = store.retrieve("curry", 3).unwrap();
        assert_eq!(hits.len(), 3);
        assert!(hits[0].chunk.contains("curry"));
    }

    #[test]
    fn incremental_and_rebuild_policies_agree() {
        let backend = Arc::new(ScriptedBackend::new(Vec::<String>::new()));
        let mut incremental = RetrievalStore::in_memory(embedder(), backend.clone()).unwrap();
        let mut rebuilding = RetrievalStore::open(
            StoreConfig {
                policy: IndexPolicy::Rebuild,
                ..Default::default()
            },
            embedder(),
            backend,
        )
        .unwrap();

        for document in [
            Document::new("soup", "Boil broth with carrots."),
            Document::new("salad", "Chop lettuce and cucumber."),
        ] {
            incremental.add_document(document.clone()).unwrap();
            rebuilding.add_document(document).unwrap();
        }

        let a = incremental.retrieve("carrots broth", 2).unwrap();
        let b = rebuilding.retrieve("carrots broth", 2).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn documents_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let backend: Arc<dyn GenerationBackend> = Arc::new(ScriptedBackend::new(["answer"]));

        {
            let mut store =
                RetrievalStore::open(persistent_config(dir.path()), embedder(), backend.clone())
                    .unwrap();
            store
                .add_document(Document::new("pancakes", "Whisk flour, eggs and milk."))
                .unwrap();
        }

        let reopened =
            RetrievalStore::open(persistent_config(dir.path()), embedder(), backend).unwrap();
        assert_eq!(reopened.len(), 1);
        assert_eq!(reopened.documents()[0].meal, "pancakes");
        assert_eq!(reopened.query("pancakes?").unwrap(), "answer");
    }

    #[test]
    fn stale_index_cache_is_rebuilt() {
        let dir = tempfile::tempdir().unwrap();
        let backend: Arc<dyn GenerationBackend> = Arc::new(ScriptedBackend::new(["answer"]));
        let storage = DocumentStorage::new(dir.path().to_path_buf());
        storage
            .save_documents(&[Document::new("risotto", "Stir rice slowly.")])
            .unwrap();
        storage.save_index(&VectorIndex::new("some-other-model")).unwrap();

        let store =
            RetrievalStore::open(persistent_config(dir.path()), embedder(), backend).unwrap();

        let hits = store.retrieve("rice", 3).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(
            storage.load_index().unwrap().model_name(),
            "hash-embedder"
        );
    }

    #[test]
    fn echoed_answers_are_stripped() {
        let backend = Arc::new(ScriptedBackend::new(["\nUse ripe tomatoes."]).echoing());
        let mut store = RetrievalStore::in_memory(embedder(), backend).unwrap();
        store
            .add_document(Document::new("tomato soup", "Simmer tomatoes."))
            .unwrap();

        assert_eq!(store.query("tomatoes?").unwrap(), "Use ripe tomatoes.");
    }

    #[test]
    fn cached_index_without_documents_is_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let backend = Arc::new(ScriptedBackend::new(["made up"]));
        DocumentStorage::new(dir.path().to_path_buf())
            .save_index(&VectorIndex::new("hash-embedder"))
            .unwrap();

        let store =
            RetrievalStore::open(persistent_config(dir.path()), embedder(), backend.clone())
                .unwrap();

        assert!(matches!(
            store.query("soup?"),
            Err(AssistantError::IndexUnavailable)
        ));
        assert!(backend.prompts().is_empty());
    }

    #[test]
    fn index_cache_with_other_dimension_is_rebuilt() {
        let dir = tempfile::tempdir().unwrap();
        let backend: Arc<dyn GenerationBackend> = Arc::new(ScriptedBackend::new(["answer"]));
        {
            let mut store = RetrievalStore::open(
                persistent_config(dir.path()),
                Arc::new(HashEmbedder::new(64)),
                backend.clone(),
            )
            .unwrap();
            store
                .add_document(Document::new("curry", "Fry the spices first."))
                .unwrap();
        }

        let store =
            RetrievalStore::open(persistent_config(dir.path()), embedder(), backend).unwrap();
        assert_eq!(store.retrieve("spices", 3).unwrap().len(), 1);

        let cached = DocumentStorage::new(dir.path().to_path_buf())
            .load_index()
            .unwrap();
        assert_eq!(cached.dimension(), Some(1024));
    }

    #[test]
    fn failed_indexing_discards_the_document() {
        for policy in [IndexPolicy::Incremental, IndexPolicy::Rebuild] {
            let dir = tempfile::tempdir().unwrap();
            let backend: Arc<dyn GenerationBackend> =
                Arc::new(ScriptedBackend::new(Vec::<String>::new()));
            let config = StoreConfig {
                policy,
                ..persistent_config(dir.path())
            };
            let picky: Arc<dyn Embedder> = Arc::new(PickyEmbedder(HashEmbedder::new(1024)));

            let mut store =
                RetrievalStore::open(config.clone(), picky.clone(), backend.clone()).unwrap();
            store
                .add_document(Document::new("bread", "Knead and bake."))
                .unwrap();

            let result = store.add_document(Document::new("cheese", "Let the mold ripen."));
            assert!(matches!(result, Err(AssistantError::Embedding(_))), "{policy:?}");
            assert_eq!(store.len(), 1);
            assert_eq!(store.retrieve("bread", 3).unwrap().len(), 1);

            let reopened = RetrievalStore::open(config, picky, backend).unwrap();
            assert_eq!(reopened.len(), 1);
            assert_eq!(reopened.documents()[0].meal, "bread");
        }
    }
}
