//! Composition layer tying the pipeline together.
//!
//! [`RagSystem`] wires the document processor, the vector store, the tool
//! registry, the session manager, and the answer generator into the
//! operations the outer surfaces call: folder ingestion, question
//! answering, and course analytics.

use anyhow::Result;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use walkdir::WalkDir;

use crate::config::Config;
use crate::generator::{AnswerGenerator, AnthropicProvider, ModelProvider};
use crate::models::{Course, Source};
use crate::processor::DocumentProcessor;
use crate::session::SessionManager;
use crate::store::{InMemoryStore, VectorStore};
use crate::tools::ToolRegistry;

/// Outcome of one query round-trip.
#[derive(Debug)]
pub struct QueryOutcome {
    pub answer: String,
    pub sources: Vec<Source>,
    pub session_id: String,
}

/// Indexed-course overview for the analytics surfaces.
#[derive(Debug)]
pub struct Analytics {
    pub total_courses: usize,
    pub course_titles: Vec<String>,
}

/// Counters from one folder ingestion pass.
#[derive(Debug, Default)]
pub struct IngestReport {
    pub documents_found: usize,
    pub courses_added: usize,
    pub chunks_indexed: usize,
    pub skipped: usize,
}

pub struct RagSystem {
    store: Arc<dyn VectorStore>,
    processor: DocumentProcessor,
    registry: ToolRegistry,
    sessions: SessionManager,
    generator: AnswerGenerator,
}

impl RagSystem {
    pub fn new(config: &Config) -> Result<Self> {
        let provider = Arc::new(AnthropicProvider::new(&config.model)?);
        Self::with_provider(config, provider)
    }

    /// Same wiring with a caller-supplied model transport.
    pub fn with_provider(config: &Config, provider: Arc<dyn ModelProvider>) -> Result<Self> {
        let store: Arc<dyn VectorStore> =
            Arc::new(InMemoryStore::new(config.retrieval.max_results));
        let processor =
            DocumentProcessor::new(config.chunking.chunk_size, config.chunking.chunk_overlap)?;
        let registry = ToolRegistry::with_builtins(store.clone())?;
        let sessions = SessionManager::new(config.session.max_history);
        let generator = AnswerGenerator::new(provider, config.model.max_tool_rounds);

        Ok(RagSystem {
            store,
            processor,
            registry,
            sessions,
            generator,
        })
    }

    /// Answer one question with the search tools available and any session
    /// history folded into the system context. A missing session id creates
    /// a new session.
    pub async fn query(&self, question: &str, session_id: Option<&str>) -> Result<QueryOutcome> {
        let session_id = match session_id {
            Some(id) => id.to_string(),
            None => self.sessions.create_session(),
        };
        let history = self.sessions.get_history(&session_id);

        let prompt = format!("Answer this question about course materials: {}", question);
        let answer = self
            .generator
            .generate(&prompt, history.as_deref(), Some(&self.registry))
            .await?;

        self.sessions.add_exchange(&session_id, question, &answer.text);

        Ok(QueryOutcome {
            answer: answer.text,
            sources: answer.sources,
            session_id,
        })
    }

    /// Process one course document and index it.
    pub async fn add_course_document(&self, path: &Path) -> Result<(Course, usize)> {
        let (course, chunks) = self.processor.process_document(path)?;
        self.store.add_course_metadata(&course).await?;
        self.store.add_course_content(&chunks).await?;
        Ok((course, chunks.len()))
    }

    /// Ingest every course document in a folder.
    ///
    /// Documents whose course title is already indexed are skipped, so a
    /// second pass over the same folder is a no-op. Files that fail to
    /// process are reported on stderr and skipped.
    pub async fn add_course_folder(&self, dir: &Path, clear: bool) -> Result<IngestReport> {
        if clear {
            self.store.clear().await?;
        }

        if !dir.is_dir() {
            anyhow::bail!("docs folder not found: {}", dir.display());
        }

        let mut files: Vec<PathBuf> = Vec::new();
        for entry in WalkDir::new(dir).max_depth(1) {
            let entry = entry?;
            if !entry.file_type().is_file() {
                continue;
            }
            if !is_course_file(entry.path()) {
                continue;
            }
            files.push(entry.path().to_path_buf());
        }
        // Sort for deterministic ordering
        files.sort();

        let mut report = IngestReport {
            documents_found: files.len(),
            ..Default::default()
        };
        let mut existing = self.store.existing_course_titles().await;

        for path in &files {
            let (course, chunks) = match self.processor.process_document(path) {
                Ok(processed) => processed,
                Err(e) => {
                    eprintln!("error processing {}: {}", path.display(), e);
                    continue;
                }
            };

            if existing.contains(&course.title) {
                report.skipped += 1;
                continue;
            }

            self.store.add_course_metadata(&course).await?;
            self.store.add_course_content(&chunks).await?;
            existing.push(course.title.clone());
            report.courses_added += 1;
            report.chunks_indexed += chunks.len();
        }

        Ok(report)
    }

    /// Load the configured docs folder into the process-local index. A
    /// missing folder is reported on stderr, not fatal, so commands still
    /// run against an empty index.
    pub async fn hydrate(&self, docs_dir: &Path) -> Result<IngestReport> {
        if !docs_dir.is_dir() {
            eprintln!("docs folder not found: {}", docs_dir.display());
            return Ok(IngestReport::default());
        }
        self.add_course_folder(docs_dir, false).await
    }

    pub async fn analytics(&self) -> Analytics {
        let total_courses = self.store.course_count().await;
        let mut course_titles = self.store.existing_course_titles().await;
        course_titles.sort();
        Analytics {
            total_courses,
            course_titles,
        }
    }
}

fn is_course_file(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|ext| ext.to_str()),
        Some(ext) if ext.eq_ignore_ascii_case("txt") || ext.eq_ignore_ascii_case("md")
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generator::{ContentBlock, MessageRequest, ModelResponse, StopReason};
    use anyhow::anyhow;
    use async_trait::async_trait;
    use std::fs;
    use std::sync::Mutex;

    struct CannedProvider {
        text: String,
        requests: Mutex<Vec<MessageRequest>>,
    }

    impl CannedProvider {
        fn new(text: &str) -> Self {
            CannedProvider {
                text: text.to_string(),
                requests: Mutex::new(Vec::new()),
            }
        }

        fn requests(&self) -> Vec<MessageRequest> {
            self.requests.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ModelProvider for CannedProvider {
        async fn create_message(&self, request: &MessageRequest) -> anyhow::Result<ModelResponse> {
            self.requests.lock().unwrap().push(request.clone());
            Ok(ModelResponse {
                content: vec![ContentBlock::Text {
                    text: self.text.clone(),
                }],
                stop_reason: StopReason::EndTurn,
            })
        }
    }

    fn test_system(provider: Arc<CannedProvider>) -> RagSystem {
        RagSystem::with_provider(&Config::default(), provider).unwrap()
    }

    fn write_course(dir: &Path, file: &str, title: &str) {
        let content = format!(
            "Course Title: {}\nCourse Link: http://example.com\nCourse Instructor: Ada\n\n\
             Lesson 0: Basics\nThis lesson covers the basics. It has two sentences.\n",
            title
        );
        fs::write(dir.join(file), content).unwrap();
    }

    #[tokio::test]
    async fn test_folder_ingest_skips_duplicate_titles() {
        let dir = tempfile::tempdir().unwrap();
        write_course(dir.path(), "a.txt", "Same Course");
        write_course(dir.path(), "b.txt", "Same Course");

        let rag = test_system(Arc::new(CannedProvider::new("ok")));
        let report = rag.add_course_folder(dir.path(), false).await.unwrap();

        assert_eq!(report.documents_found, 2);
        assert_eq!(report.courses_added, 1);
        assert_eq!(report.skipped, 1);
        assert!(report.chunks_indexed > 0);
    }

    #[tokio::test]
    async fn test_folder_ingest_ignores_other_extensions() {
        let dir = tempfile::tempdir().unwrap();
        write_course(dir.path(), "course.txt", "Real Course");
        fs::write(dir.path().join("slides.pdf"), "binary").unwrap();
        fs::write(dir.path().join("image.png"), "binary").unwrap();

        let rag = test_system(Arc::new(CannedProvider::new("ok")));
        let report = rag.add_course_folder(dir.path(), false).await.unwrap();

        assert_eq!(report.documents_found, 1);
        assert_eq!(report.courses_added, 1);
    }

    #[tokio::test]
    async fn test_reingest_is_noop_without_clear() {
        let dir = tempfile::tempdir().unwrap();
        write_course(dir.path(), "a.txt", "Course A");

        let rag = test_system(Arc::new(CannedProvider::new("ok")));
        rag.add_course_folder(dir.path(), false).await.unwrap();
        let second = rag.add_course_folder(dir.path(), false).await.unwrap();

        assert_eq!(second.courses_added, 0);
        assert_eq!(second.skipped, 1);
        assert_eq!(rag.analytics().await.total_courses, 1);
    }

    #[tokio::test]
    async fn test_clear_reindexes_from_scratch() {
        let dir = tempfile::tempdir().unwrap();
        write_course(dir.path(), "a.txt", "Course A");

        let rag = test_system(Arc::new(CannedProvider::new("ok")));
        rag.add_course_folder(dir.path(), false).await.unwrap();
        let second = rag.add_course_folder(dir.path(), true).await.unwrap();

        assert_eq!(second.courses_added, 1);
        assert_eq!(second.skipped, 0);
        assert_eq!(rag.analytics().await.total_courses, 1);
    }

    #[tokio::test]
    async fn test_missing_folder_fails_ingest_but_not_hydrate() {
        let rag = test_system(Arc::new(CannedProvider::new("ok")));
        let missing = Path::new("/nonexistent/docs");

        assert!(rag.add_course_folder(missing, false).await.is_err());

        let report = rag.hydrate(missing).await.unwrap();
        assert_eq!(report.documents_found, 0);
    }

    #[tokio::test]
    async fn test_analytics_titles_sorted() {
        let dir = tempfile::tempdir().unwrap();
        write_course(dir.path(), "b.txt", "Zeta Course");
        write_course(dir.path(), "a.txt", "Alpha Course");

        let rag = test_system(Arc::new(CannedProvider::new("ok")));
        rag.add_course_folder(dir.path(), false).await.unwrap();

        let analytics = rag.analytics().await;
        assert_eq!(analytics.total_courses, 2);
        assert_eq!(analytics.course_titles, vec!["Alpha Course", "Zeta Course"]);
    }

    #[tokio::test]
    async fn test_query_wraps_question_and_tracks_session() {
        let provider = Arc::new(CannedProvider::new("The answer."));
        let rag = test_system(provider.clone());

        let outcome = rag.query("What is MCP?", None).await.unwrap();
        assert_eq!(outcome.answer, "The answer.");
        assert!(outcome.session_id.starts_with("session_"));

        rag.query("Tell me more", Some(&outcome.session_id))
            .await
            .unwrap();

        let requests = provider.requests();
        assert_eq!(requests.len(), 2);
        match &requests[0].messages[0].content[0] {
            ContentBlock::Text { text } => {
                assert_eq!(text, "Answer this question about course materials: What is MCP?");
            }
            other => panic!("expected text block, got {:?}", other),
        }

        // Second request sees the first exchange, recorded with the raw
        // question
        assert!(requests[1].system.contains("Previous conversation:"));
        assert!(requests[1].system.contains("User: What is MCP?"));
        assert!(requests[1].system.contains("Assistant: The answer."));
    }

    #[tokio::test]
    async fn test_fresh_session_has_no_history() {
        let provider = Arc::new(CannedProvider::new("ok"));
        let rag = test_system(provider.clone());

        rag.query("first question", None).await.unwrap();

        let requests = provider.requests();
        assert!(!requests[0].system.contains("Previous conversation:"));
    }

    #[tokio::test]
    async fn test_each_anonymous_query_gets_own_session() {
        let provider = Arc::new(CannedProvider::new("ok"));
        let rag = test_system(provider.clone());

        let first = rag.query("q1", None).await.unwrap();
        let second = rag.query("q2", None).await.unwrap();
        assert_ne!(first.session_id, second.session_id);
    }

    #[tokio::test]
    async fn test_add_course_document_indexes_chunks() {
        let dir = tempfile::tempdir().unwrap();
        write_course(dir.path(), "single.txt", "Solo Course");

        let rag = test_system(Arc::new(CannedProvider::new("ok")));
        let (course, chunk_count) = rag
            .add_course_document(&dir.path().join("single.txt"))
            .await
            .unwrap();

        assert_eq!(course.title, "Solo Course");
        assert!(chunk_count > 0);
        assert_eq!(rag.analytics().await.course_titles, vec!["Solo Course"]);
    }

    #[test]
    fn test_is_course_file_extensions() {
        assert!(is_course_file(Path::new("a.txt")));
        assert!(is_course_file(Path::new("a.MD")));
        assert!(!is_course_file(Path::new("a.pdf")));
        assert!(!is_course_file(Path::new("noext")));
    }

    // CannedProvider keeps tests offline; the error path still matters
    #[tokio::test]
    async fn test_query_propagates_provider_failure() {
        struct FailingProvider;

        #[async_trait]
        impl ModelProvider for FailingProvider {
            async fn create_message(
                &self,
                _request: &MessageRequest,
            ) -> anyhow::Result<ModelResponse> {
                Err(anyhow!("ANTHROPIC_API_KEY environment variable not set"))
            }
        }

        let rag =
            RagSystem::with_provider(&Config::default(), Arc::new(FailingProvider)).unwrap();
        let err = rag.query("q", None).await.unwrap_err();
        assert!(err.to_string().contains("ANTHROPIC_API_KEY"));
    }
}
