//! Drives a [`Session`] through analysis and questions.

use std::fmt;
use std::sync::Arc;

use codebase_gpt_index::IndexError;
use codebase_gpt_index::chunker::{Chunk, ChunkerConfig, chunk_file};
use codebase_gpt_index::extractor::Extractor;
use codebase_gpt_index::fetcher::RepoFetcher;
use codebase_gpt_index::indexer::{IndexReport, Indexer};
use tokio::sync::mpsc;

use crate::error::SessionError;
use crate::query::{Answer, QueryEngine};
use crate::session::Session;

/// Progress of one analysis, in emission order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AnalysisStatus {
    Cloning,
    Extracting,
    Embedding { files: usize, chunks: usize },
    Done { documents: usize },
    Failed { message: String },
}

impl fmt::Display for AnalysisStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cloning => f.write_str("Cloning repository..."),
            Self::Extracting => f.write_str("Extracting code files..."),
            Self::Embedding { files, chunks } => {
                write!(f, "Processing and storing embeddings for {chunks} chunks from {files} files...")
            }
            Self::Done { documents } => {
                write!(f, "Repository processed successfully ({documents} documents indexed)")
            }
            Self::Failed { message } => write!(f, "Error processing repository: {message}"),
        }
    }
}

pub type StatusTx = mpsc::UnboundedSender<AnalysisStatus>;

/// Holds a session in `Processing`. Dropping it unfinished marks the analysis failed.
struct ProcessingGuard<'a> {
    session: Option<&'a mut Session>,
    namespace: &'a str,
}

impl<'a> ProcessingGuard<'a> {
    fn new(session: &'a mut Session, namespace: &'a str) -> Self {
        Self {
            session: Some(session),
            namespace,
        }
    }

    fn finish(mut self, succeeded: bool) {
        if let Some(session) = self.session.take() {
            session.finish_analysis(succeeded);
        }
    }
}

impl Drop for ProcessingGuard<'_> {
    fn drop(&mut self) {
        if let Some(session) = self.session.take() {
            tracing::warn!(namespace = self.namespace, "analysis cancelled before completion");
            session.finish_analysis(false);
        }
    }
}

pub struct Controller {
    fetcher: Arc<dyn RepoFetcher>,
    extractor: Extractor,
    chunker: ChunkerConfig,
    indexer: Indexer,
    query: QueryEngine,
}

impl Controller {
    #[must_use]
    pub fn new(
        fetcher: Arc<dyn RepoFetcher>,
        extractor: Extractor,
        chunker: ChunkerConfig,
        indexer: Indexer,
        query: QueryEngine,
    ) -> Self {
        Self {
            fetcher,
            extractor,
            chunker,
            indexer,
            query,
        }
    }

    /// Clone, extract, chunk and index the session's repository.
    ///
    /// On failure, or when the returned future is dropped before completion, the session
    /// returns to awaiting analysis with `repo_processed` cleared.
    ///
    /// # Errors
    ///
    /// [`SessionError::InvalidState`] if the session is not awaiting analysis, or
    /// [`SessionError::Index`] for any pipeline failure.
    pub async fn analyze(
        &self,
        session: &mut Session,
        status: &StatusTx,
    ) -> Result<IndexReport, SessionError> {
        let url = session.begin_analysis()?;
        tracing::info!(namespace = %url, "analyzing repository");
        let processing = ProcessingGuard::new(session, &url);

        match self.run_pipeline(&url, status).await {
            Ok(report) => {
                processing.finish(true);
                let _ = status.send(AnalysisStatus::Done {
                    documents: report.documents_upserted,
                });
                Ok(report)
            }
            Err(e) => {
                processing.finish(false);
                tracing::warn!(namespace = %url, "analysis failed: {e}");
                let _ = status.send(AnalysisStatus::Failed {
                    message: e.to_string(),
                });
                Err(e.into())
            }
        }
    }

    async fn run_pipeline(&self, url: &str, status: &StatusTx) -> Result<IndexReport, IndexError> {
        let _ = status.send(AnalysisStatus::Cloning);
        let snapshot = self.fetcher.fetch(url).await?;

        let _ = status.send(AnalysisStatus::Extracting);
        let extraction = self.extractor.extract_async(snapshot.root()).await?;
        drop(snapshot);
        tracing::info!(
            namespace = url,
            files = extraction.files.len(),
            skipped = extraction.skipped,
            truncated = extraction.truncated,
            "extracted source files"
        );

        let chunks: Vec<Chunk> = extraction
            .files
            .iter()
            .flat_map(|file| chunk_file(file, self.chunker))
            .collect();
        let _ = status.send(AnalysisStatus::Embedding {
            files: extraction.files.len(),
            chunks: chunks.len(),
        });

        let mut report = self.indexer.index(url, chunks).await?;
        report.files_indexed = extraction.files.len();
        Ok(report)
    }

    /// Answer a question about the session's repository.
    ///
    /// The question is recorded before the query runs; the answer only on success.
    ///
    /// # Errors
    ///
    /// [`SessionError::Input`] or [`SessionError::InvalidState`] for unacceptable input,
    /// otherwise whatever [`QueryEngine::answer`] returns.
    pub async fn ask(&self, session: &mut Session, question: &str) -> Result<Answer, SessionError> {
        let namespace = session.begin_question(question)?;
        match self.query.answer(&namespace, question.trim()).await {
            Ok(answer) => {
                session.record_answer(answer.text.as_str());
                Ok(answer)
            }
            Err(e) => {
                tracing::warn!(namespace = %namespace, kind = %e.kind(), "question failed: {e}");
                Err(e)
            }
        }
    }

    pub fn clear(&self, session: &mut Session) {
        session.clear();
    }

    /// Documents currently stored for `namespace`.
    ///
    /// # Errors
    ///
    /// [`SessionError::Index`] if the store cannot be queried.
    pub async fn document_count(&self, namespace: &str) -> Result<u64, SessionError> {
        Ok(self.indexer.document_count(namespace).await?)
    }
}

#[cfg(test)]
mod tests {
    use std::path::Path;
    use std::time::Duration;

    use codebase_gpt_index::CloneError;
    use codebase_gpt_index::extractor::ExtractorConfig;
    use codebase_gpt_index::fetcher::Snapshot;
    use codebase_gpt_index::indexer::{IndexerConfig, ReindexMode};
    use codebase_gpt_index::retriever::{RetrievalConfig, Retriever};
    use codebase_gpt_llm::AnyProvider;
    use codebase_gpt_llm::mock::MockProvider;
    use codebase_gpt_store::{InMemoryVectorStore, VectorStore};
    use tempfile::TempDir;

    use super::*;
    use crate::error::ErrorKind;
    use crate::session::{ChatRole, Phase};

    const URL: &str = "https://github.com/acme/widget";

    /// Serves one fixed directory for every URL.
    struct DirFetcher(TempDir);

    impl RepoFetcher for DirFetcher {
        fn fetch<'a>(
            &'a self,
            _url: &'a str,
        ) -> std::pin::Pin<Box<dyn Future<Output = Result<Snapshot, CloneError>> + Send + 'a>>
        {
            let root = self.0.path().to_path_buf();
            Box::pin(async move { Ok(Snapshot::borrowed(root)) })
        }
    }

    struct FailingFetcher;

    impl RepoFetcher for FailingFetcher {
        fn fetch<'a>(
            &'a self,
            url: &'a str,
        ) -> std::pin::Pin<Box<dyn Future<Output = Result<Snapshot, CloneError>> + Send + 'a>>
        {
            Box::pin(async move {
                Err(CloneError::Failed {
                    status: "exit status: 128".into(),
                    stderr: format!("fatal: repository '{url}' not found"),
                })
            })
        }
    }

    /// Never finishes within a test's patience.
    struct StalledFetcher;

    impl RepoFetcher for StalledFetcher {
        fn fetch<'a>(
            &'a self,
            _url: &'a str,
        ) -> std::pin::Pin<Box<dyn Future<Output = Result<Snapshot, CloneError>> + Send + 'a>>
        {
            Box::pin(async {
                tokio::time::sleep(Duration::from_secs(10)).await;
                Err(CloneError::Timeout(10))
            })
        }
    }

    fn write(root: &Path, rel: &str, content: &str) {
        let path = root.join(rel);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, content).unwrap();
    }

    fn repo() -> TempDir {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "src/widget.rs", "pub fn render_widget() { draw(); }");
        write(dir.path(), "src/db.rs", "pub fn connect_database() {}");
        write(dir.path(), "README.md", "# not indexed");
        dir
    }

    fn controller(fetcher: Arc<dyn RepoFetcher>, chat: MockProvider) -> Controller {
        let store: Arc<dyn VectorStore> = Arc::new(InMemoryVectorStore::new());
        let embedder = Arc::new(AnyProvider::Mock(MockProvider::default()));
        let indexer = Indexer::new(
            Arc::clone(&store),
            Arc::clone(&embedder),
            IndexerConfig {
                collection: "test".into(),
                reindex: ReindexMode::Append,
            },
        );
        let retriever = Retriever::new(store, embedder, "test", RetrievalConfig::default());
        let query = QueryEngine::new(retriever, Arc::new(AnyProvider::Mock(chat)), "system");
        Controller::new(
            fetcher,
            Extractor::new(&ExtractorConfig::default()),
            ChunkerConfig::default(),
            indexer,
            query,
        )
    }

    fn drain(mut rx: mpsc::UnboundedReceiver<AnalysisStatus>) -> Vec<AnalysisStatus> {
        let mut out = Vec::new();
        while let Ok(s) = rx.try_recv() {
            out.push(s);
        }
        out
    }

    #[tokio::test]
    async fn analyze_indexes_and_reports_progress() {
        let ctl = controller(Arc::new(DirFetcher(repo())), MockProvider::default());
        let mut session = Session::new();
        session.enter_url(URL).unwrap();

        let (tx, rx) = mpsc::unbounded_channel();
        let report = ctl.analyze(&mut session, &tx).await.unwrap();
        assert_eq!(report.files_indexed, 2);
        assert_eq!(report.documents_upserted, 2);
        assert_eq!(session.phase(), Phase::Ready);
        assert!(session.repo_processed());
        assert_eq!(ctl.document_count(URL).await.unwrap(), 2);

        assert_eq!(
            drain(rx),
            vec![
                AnalysisStatus::Cloning,
                AnalysisStatus::Extracting,
                AnalysisStatus::Embedding { files: 2, chunks: 2 },
                AnalysisStatus::Done { documents: 2 },
            ]
        );
    }

    #[tokio::test]
    async fn failed_clone_leaves_session_unprocessed() {
        let ctl = controller(Arc::new(FailingFetcher), MockProvider::default());
        let mut session = Session::new();
        session.enter_url(URL).unwrap();

        let (tx, rx) = mpsc::unbounded_channel();
        let err = ctl.analyze(&mut session, &tx).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::CloneError);
        assert_eq!(session.phase(), Phase::AwaitingAnalysis);
        assert!(!session.repo_processed());

        let statuses = drain(rx);
        assert_eq!(statuses.first(), Some(&AnalysisStatus::Cloning));
        let last = statuses.last().unwrap().to_string();
        assert!(last.starts_with("Error processing repository: git clone failed"));
    }

    #[tokio::test]
    async fn timed_out_analysis_returns_session_to_awaiting() {
        let ctl = controller(Arc::new(StalledFetcher), MockProvider::default());
        let mut session = Session::new();
        session.enter_url(URL).unwrap();

        let (tx, rx) = mpsc::unbounded_channel();
        let outcome =
            tokio::time::timeout(Duration::from_millis(50), ctl.analyze(&mut session, &tx)).await;
        assert!(outcome.is_err());

        assert_eq!(session.phase(), Phase::AwaitingAnalysis);
        assert!(!session.repo_processed());
        assert_eq!(drain(rx), vec![AnalysisStatus::Cloning]);

        assert!(session.enter_url("https://github.com/acme/other").unwrap());
        assert_eq!(session.begin_analysis().unwrap(), "https://github.com/acme/other");
    }

    #[tokio::test]
    async fn analyze_rejects_idle_session() {
        let ctl = controller(Arc::new(DirFetcher(repo())), MockProvider::default());
        let mut session = Session::new();
        let (tx, rx) = mpsc::unbounded_channel();
        let err = ctl.analyze(&mut session, &tx).await.unwrap_err();
        assert!(matches!(err, SessionError::InvalidState(_)));
        assert!(drain(rx).is_empty());
    }

    #[tokio::test]
    async fn ask_appends_question_then_answer() {
        let ctl = controller(
            Arc::new(DirFetcher(repo())),
            MockProvider::with_responses(vec!["render_widget draws it.".into()]),
        );
        let mut session = Session::new();
        session.enter_url(URL).unwrap();
        let (tx, _rx) = mpsc::unbounded_channel();
        ctl.analyze(&mut session, &tx).await.unwrap();

        let answer = ctl
            .ask(&mut session, "  how is a widget rendered? ")
            .await
            .unwrap();
        assert!(answer.context_found);

        let history = session.chat_history();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].role, ChatRole::User);
        assert_eq!(history[0].content, "how is a widget rendered?");
        assert_eq!(history[1].role, ChatRole::Assistant);
        assert_eq!(history[1].content, "render_widget draws it.");
    }

    #[tokio::test]
    async fn failed_question_keeps_only_user_message() {
        let chat = MockProvider::with_failing_chat();
        let ctl = controller(Arc::new(DirFetcher(repo())), chat);
        let mut session = Session::new();
        session.enter_url(URL).unwrap();
        let (tx, _rx) = mpsc::unbounded_channel();
        ctl.analyze(&mut session, &tx).await.unwrap();

        let err = ctl.ask(&mut session, "widget?").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::CompletionError);
        assert_eq!(session.chat_history().len(), 1);
        assert_eq!(session.chat_history()[0].role, ChatRole::User);
        assert_eq!(session.phase(), Phase::Ready);
    }

    #[tokio::test]
    async fn clear_empties_history() {
        let ctl = controller(Arc::new(DirFetcher(repo())), MockProvider::default());
        let mut session = Session::new();
        session.enter_url(URL).unwrap();
        let (tx, _rx) = mpsc::unbounded_channel();
        ctl.analyze(&mut session, &tx).await.unwrap();
        ctl.ask(&mut session, "widget?").await.unwrap();

        ctl.clear(&mut session);
        assert!(session.chat_history().is_empty());
        assert!(session.repo_processed());
    }

    #[test]
    fn status_lines() {
        assert_eq!(AnalysisStatus::Cloning.to_string(), "Cloning repository...");
        assert_eq!(
            AnalysisStatus::Embedding { files: 3, chunks: 7 }.to_string(),
            "Processing and storing embeddings for 7 chunks from 3 files..."
        );
        assert_eq!(
            AnalysisStatus::Failed {
                message: "boom".into()
            }
            .to_string(),
            "Error processing repository: boom"
        );
    }
}
