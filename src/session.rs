//! Interactive session orchestration.
//!
//! A [`Session`] runs the per-turn loop: classify the user's intent, fetch
//! fresh code context only when the turn needs it, compose the prompt from
//! code, buffer, and recall, then stream the answer. The turn is committed
//! to memory only after its stream completes; a cancelled or failed
//! generation leaves buffer and index untouched, so retrying a question
//! never compounds state.

use std::path::PathBuf;

use anyhow::Result;

use crate::compose::{compose, ComposedContext};
use crate::config::Config;
use crate::embedding::Embedder;
use crate::intent::{classify, Intent};
use crate::llm::{Generator, TokenStream};
use crate::memory::{ConversationBuffer, ConversationTurn, Role, SemanticMemory};
use crate::tools::search_code;
use crate::vector_store::VectorStore;

/// Everything needed to commit a turn once its generation finishes.
#[derive(Debug)]
pub struct PendingTurn {
    pub intent: Intent,
    /// `path:start-end` citations for the fresh code behind this turn.
    pub citations: Vec<String>,
    cited_chunk_ids: Vec<String>,
    user_text: String,
}

pub struct Session<'a> {
    pub session_id: String,
    pub project_root: PathBuf,
    config: &'a Config,
    code_store: &'a dyn VectorStore,
    memory_store: &'a dyn VectorStore,
    embedder: &'a dyn Embedder,
    generator: &'a dyn Generator,
    buffer: ConversationBuffer,
    last_intent: Option<Intent>,
}

impl<'a> Session<'a> {
    pub fn new(
        project_root: PathBuf,
        config: &'a Config,
        code_store: &'a dyn VectorStore,
        memory_store: &'a dyn VectorStore,
        embedder: &'a dyn Embedder,
        generator: &'a dyn Generator,
    ) -> Self {
        Self {
            session_id: uuid::Uuid::new_v4().to_string(),
            project_root,
            config,
            code_store,
            memory_store,
            embedder,
            generator,
            buffer: ConversationBuffer::new(config.memory.buffer_turns),
            last_intent: None,
        }
    }

    /// Start a turn: route, retrieve, compose, and open the token stream.
    ///
    /// Nothing is committed yet. Drop the stream to cancel the turn with no
    /// side effects; drain it and pass the text to
    /// [`commit_turn`](Self::commit_turn) to make it part of the
    /// conversation.
    pub async fn begin_turn(&mut self, message: &str) -> Result<(PendingTurn, TokenStream)> {
        // A failed classification degrades to a code search: the worst case
        // is a retrieval the turn did not need, never a missing one.
        let intent = classify(self.generator, message)
            .await
            .unwrap_or(Intent::CodeSearch);

        // Conversational turns answer from memory alone; the code index is
        // not consulted at all.
        let code_hits = match intent {
            Intent::CodeSearch => {
                search_code(
                    self.code_store,
                    self.embedder,
                    message,
                    self.config.retrieval.top_k,
                )
                .await?
            }
            Intent::Conversational => Vec::new(),
        };

        // A memory-store failure is fatal for the turn, not degraded around:
        // answering without recall would silently drop cited context.
        let memory = SemanticMemory::new(self.memory_store, self.embedder);
        let recalled = memory
            .recall(message, self.config.memory.recall_top_n)
            .await?;

        let composed: ComposedContext = compose(
            message,
            &code_hits,
            &self.buffer,
            &recalled,
            self.config.retrieval.context_budget_chars,
        );

        let stream = self.generator.stream(&composed.prompt).await?;

        Ok((
            PendingTurn {
                intent,
                citations: composed.citations,
                cited_chunk_ids: composed.cited_chunk_ids,
                user_text: message.to_string(),
            },
            stream,
        ))
    }

    /// Commit a completed turn: append both sides to the buffer and promote
    /// whatever the buffer evicts into semantic memory.
    pub async fn commit_turn(&mut self, pending: PendingTurn, answer: String) -> Result<()> {
        self.last_intent = Some(pending.intent);
        let user = ConversationTurn::new(Role::User, pending.user_text, Vec::new());
        let assistant =
            ConversationTurn::new(Role::Assistant, answer, pending.cited_chunk_ids);

        let memory = SemanticMemory::new(self.memory_store, self.embedder);
        for turn in [user, assistant] {
            if let Some(evicted) = self.buffer.push(turn) {
                memory.insert(&evicted).await?;
            }
        }
        Ok(())
    }

    /// Run a full turn to completion: classify, retrieve, generate, commit.
    pub async fn ask(&mut self, message: &str) -> Result<TurnReply> {
        let (pending, stream) = self.begin_turn(message).await?;
        let answer = stream.collect_text().await?;
        let reply = TurnReply {
            intent: pending.intent,
            citations: pending.citations.clone(),
            answer: answer.clone(),
        };
        self.commit_turn(pending, answer).await?;
        Ok(reply)
    }

    pub fn buffer(&self) -> &ConversationBuffer {
        &self.buffer
    }

    /// Intent of the most recently committed turn.
    pub fn last_intent(&self) -> Option<Intent> {
        self.last_intent
    }
}

/// A completed, committed turn.
#[derive(Debug)]
pub struct TurnReply {
    pub intent: Intent,
    pub citations: Vec<String>,
    pub answer: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::IndexError;
    use crate::llm::MockGenerator;
    use crate::vector_store::{InMemoryVectorStore, QueryHit, VectorRecord};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FlatEmbedder;

    #[async_trait]
    impl Embedder for FlatEmbedder {
        async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            Ok(texts.iter().map(|_| vec![1.0, 0.0]).collect())
        }
        fn model_name(&self) -> &str {
            "flat"
        }
        fn dims(&self) -> usize {
            2
        }
    }

    /// Store wrapper that counts similarity queries.
    struct CountingStore {
        inner: InMemoryVectorStore,
        queries: AtomicUsize,
    }

    impl CountingStore {
        fn new() -> Self {
            Self {
                inner: InMemoryVectorStore::new(),
                queries: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl VectorStore for CountingStore {
        async fn upsert(&self, record: VectorRecord) -> Result<()> {
            self.inner.upsert(record).await
        }
        async fn delete(&self, id: &str) -> Result<()> {
            self.inner.delete(id).await
        }
        async fn delete_for_path(&self, path: &str) -> Result<()> {
            self.inner.delete_for_path(path).await
        }
        async fn query(&self, vector: &[f32], top_k: usize) -> Result<Vec<QueryHit>> {
            self.queries.fetch_add(1, Ordering::SeqCst);
            self.inner.query(vector, top_k).await
        }
        async fn count(&self) -> Result<usize> {
            self.inner.count().await
        }
        async fn ids(&self) -> Result<Vec<String>> {
            self.inner.ids().await
        }
    }

    /// Store whose every operation fails as an unavailable backend.
    struct UnavailableStore;

    #[async_trait]
    impl VectorStore for UnavailableStore {
        async fn upsert(&self, _record: VectorRecord) -> Result<()> {
            Err(IndexError::VectorStoreUnavailable("backend down".into()).into())
        }
        async fn delete(&self, _id: &str) -> Result<()> {
            Err(IndexError::VectorStoreUnavailable("backend down".into()).into())
        }
        async fn delete_for_path(&self, _path: &str) -> Result<()> {
            Err(IndexError::VectorStoreUnavailable("backend down".into()).into())
        }
        async fn query(&self, _vector: &[f32], _top_k: usize) -> Result<Vec<QueryHit>> {
            Err(IndexError::VectorStoreUnavailable("backend down".into()).into())
        }
        async fn count(&self) -> Result<usize> {
            Err(IndexError::VectorStoreUnavailable("backend down".into()).into())
        }
        async fn ids(&self) -> Result<Vec<String>> {
            Err(IndexError::VectorStoreUnavailable("backend down".into()).into())
        }
    }

    #[tokio::test]
    async fn conversational_turn_skips_the_code_index() {
        let config = Config::default();
        let code_store = CountingStore::new();
        let memory_store = InMemoryVectorStore::new();
        let embedder = FlatEmbedder;
        // First completion is the classifier, second is the streamed answer.
        let generator = MockGenerator::new(vec!["chat", "I cited src/auth.rs earlier."]);

        let mut session = Session::new(
            PathBuf::from("."),
            &config,
            &code_store,
            &memory_store,
            &embedder,
            &generator,
        );

        let reply = session.ask("what files did you cite?").await.unwrap();
        assert_eq!(reply.intent, Intent::Conversational);
        assert_eq!(code_store.queries.load(Ordering::SeqCst), 0);
        assert!(reply.citations.is_empty());
        assert_eq!(session.buffer().len(), 2);
    }

    #[tokio::test]
    async fn code_search_turn_queries_and_cites() {
        let config = Config::default();
        let code_store = CountingStore::new();
        let memory_store = InMemoryVectorStore::new();
        let embedder = FlatEmbedder;

        let meta = crate::vector_store::ChunkMeta {
            path: "src/auth.rs".into(),
            start_line: 10,
            end_line: 25,
            text: "fn verify() {}".into(),
        };
        code_store
            .upsert(VectorRecord {
                id: "c1".into(),
                path: "src/auth.rs".into(),
                vector: vec![1.0, 0.0],
                metadata: serde_json::to_value(&meta).unwrap(),
            })
            .await
            .unwrap();

        let generator = MockGenerator::new(vec!["search", "verify() rejects stale tokens."]);
        let mut session = Session::new(
            PathBuf::from("."),
            &config,
            &code_store,
            &memory_store,
            &embedder,
            &generator,
        );

        let reply = session.ask("why does auth fail?").await.unwrap();
        assert_eq!(reply.intent, Intent::CodeSearch);
        assert_eq!(code_store.queries.load(Ordering::SeqCst), 1);
        assert_eq!(reply.citations, vec!["src/auth.rs:10-25".to_string()]);
    }

    #[tokio::test]
    async fn classifier_failure_still_runs_a_code_search() {
        let config = Config::default();
        let code_store = CountingStore::new();
        let memory_store = InMemoryVectorStore::new();
        let embedder = FlatEmbedder;
        // Empty script: classification fails, and so does generation later.
        let generator = MockGenerator::new(vec![]);

        let mut session = Session::new(
            PathBuf::from("."),
            &config,
            &code_store,
            &memory_store,
            &embedder,
            &generator,
        );

        // The turn ultimately errors on generation, but the fallback intent
        // routed it through the code index first.
        assert!(session.ask("why does auth fail?").await.is_err());
        assert_eq!(code_store.queries.load(Ordering::SeqCst), 1);
        assert!(session.buffer().is_empty());
    }

    #[tokio::test]
    async fn memory_store_failure_fails_the_turn() {
        let config = Config::default();
        let code_store = CountingStore::new();
        let memory_store = UnavailableStore;
        let embedder = FlatEmbedder;
        let generator = MockGenerator::new(vec!["chat", "never reached"]);

        let mut session = Session::new(
            PathBuf::from("."),
            &config,
            &code_store,
            &memory_store,
            &embedder,
            &generator,
        );

        // Recall hits the dead store; the turn errors out instead of
        // silently answering without memory, and nothing is committed.
        let err = session.ask("what did we conclude?").await.unwrap_err();
        assert!(err.to_string().contains("vector store unavailable"));
        assert!(session.buffer().is_empty());
    }

    #[tokio::test]
    async fn cancelled_turn_leaves_no_trace() {
        let config = Config::default();
        let code_store = CountingStore::new();
        let memory_store = InMemoryVectorStore::new();
        let embedder = FlatEmbedder;
        let generator = MockGenerator::new(vec!["chat", "partial answer"]);

        let mut session = Session::new(
            PathBuf::from("."),
            &config,
            &code_store,
            &memory_store,
            &embedder,
            &generator,
        );

        let (pending, stream) = session.begin_turn("never mind").await.unwrap();
        stream.cancel();
        drop(pending);

        assert!(session.buffer().is_empty());
        assert_eq!(memory_store.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn failed_generation_is_not_committed() {
        let config = Config::default();
        let code_store = CountingStore::new();
        let memory_store = InMemoryVectorStore::new();
        let embedder = FlatEmbedder;
        // Classifier succeeds, generation script is exhausted.
        let generator = MockGenerator::new(vec!["chat"]);

        let mut session = Session::new(
            PathBuf::from("."),
            &config,
            &code_store,
            &memory_store,
            &embedder,
            &generator,
        );

        assert!(session.ask("hello?").await.is_err());
        assert!(session.buffer().is_empty());
    }

    #[tokio::test]
    async fn evicted_turns_are_promoted_to_memory() {
        let mut config = Config::default();
        config.memory.buffer_turns = 2;

        let code_store = CountingStore::new();
        let memory_store = InMemoryVectorStore::new();
        let embedder = FlatEmbedder;
        let generator = MockGenerator::new(vec!["chat", "first answer", "chat", "second answer"]);

        let mut session = Session::new(
            PathBuf::from("."),
            &config,
            &code_store,
            &memory_store,
            &embedder,
            &generator,
        );

        session.ask("first question").await.unwrap();
        assert_eq!(memory_store.count().await.unwrap(), 0);

        // Second turn overflows the 2-turn buffer; the first question and
        // answer land in semantic memory.
        session.ask("second question").await.unwrap();
        assert_eq!(session.buffer().len(), 2);
        assert_eq!(memory_store.count().await.unwrap(), 2);
    }
}
