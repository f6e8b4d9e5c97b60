//! Per-user conversation state.

use serde::Serialize;

use crate::error::SessionError;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// No repository URL yet.
    #[default]
    Idle,
    AwaitingAnalysis,
    Processing,
    /// Repository indexed; questions accepted.
    Ready,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

/// State of one user's session. Every transition goes through a method here.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Session {
    repo_url: Option<String>,
    repo_processed: bool,
    phase: Phase,
    chat_history: Vec<ChatMessage>,
}

impl Session {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn repo_url(&self) -> Option<&str> {
        self.repo_url.as_deref()
    }

    #[must_use]
    pub fn repo_processed(&self) -> bool {
        self.repo_processed
    }

    #[must_use]
    pub fn phase(&self) -> Phase {
        self.phase
    }

    #[must_use]
    pub fn chat_history(&self) -> &[ChatMessage] {
        &self.chat_history
    }

    /// Enter a repository URL. A different URL starts over; the same URL changes nothing.
    ///
    /// Returns whether the state was reset.
    ///
    /// # Errors
    ///
    /// [`SessionError::Input`] for a blank URL, [`SessionError::InvalidState`] while an
    /// analysis is running.
    pub fn enter_url(&mut self, url: &str) -> Result<bool, SessionError> {
        let url = url.trim();
        if url.is_empty() {
            return Err(SessionError::Input("Please enter a repository URL".into()));
        }
        if self.phase == Phase::Processing {
            return Err(SessionError::InvalidState(
                "repository analysis is in progress".into(),
            ));
        }
        if self.repo_url.as_deref() == Some(url) {
            return Ok(false);
        }
        self.repo_url = Some(url.to_owned());
        self.repo_processed = false;
        self.chat_history.clear();
        self.phase = Phase::AwaitingAnalysis;
        Ok(true)
    }

    /// Move to `Processing` and return the URL to analyze.
    ///
    /// # Errors
    ///
    /// [`SessionError::InvalidState`] unless the session is awaiting analysis.
    pub fn begin_analysis(&mut self) -> Result<String, SessionError> {
        match self.phase {
            Phase::Idle => Err(SessionError::InvalidState(
                "enter a repository URL first".into(),
            )),
            Phase::Processing => Err(SessionError::InvalidState(
                "repository analysis is in progress".into(),
            )),
            Phase::Ready => Err(SessionError::InvalidState(
                "repository already analyzed".into(),
            )),
            Phase::AwaitingAnalysis => {
                let url = self.repo_url.clone().ok_or_else(|| {
                    SessionError::InvalidState("enter a repository URL first".into())
                })?;
                self.phase = Phase::Processing;
                Ok(url)
            }
        }
    }

    pub fn finish_analysis(&mut self, succeeded: bool) {
        self.repo_processed = succeeded;
        self.phase = if succeeded {
            Phase::Ready
        } else {
            Phase::AwaitingAnalysis
        };
    }

    /// Record the user's question and return the namespace to query.
    ///
    /// # Errors
    ///
    /// [`SessionError::Input`] for a blank question, [`SessionError::InvalidState`] before
    /// the repository is analyzed.
    pub fn begin_question(&mut self, question: &str) -> Result<String, SessionError> {
        let question = question.trim();
        if question.is_empty() {
            return Err(SessionError::Input("Please enter a question".into()));
        }
        let namespace = match (self.phase, self.repo_url.as_ref()) {
            (Phase::Ready, Some(url)) => url.clone(),
            _ => {
                return Err(SessionError::InvalidState(
                    "analyze a repository before asking questions".into(),
                ));
            }
        };
        self.chat_history.push(ChatMessage {
            role: ChatRole::User,
            content: question.to_owned(),
        });
        Ok(namespace)
    }

    pub fn record_answer(&mut self, answer: impl Into<String>) {
        self.chat_history.push(ChatMessage {
            role: ChatRole::Assistant,
            content: answer.into(),
        });
    }

    /// Empty the transcript. Repository and phase are kept.
    pub fn clear(&mut self) {
        self.chat_history.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const URL: &str = "https://github.com/acme/widget";

    fn ready() -> Session {
        let mut s = Session::new();
        s.enter_url(URL).unwrap();
        s.begin_analysis().unwrap();
        s.finish_analysis(true);
        s
    }

    #[test]
    fn new_session_is_idle() {
        let s = Session::new();
        assert_eq!(s.phase(), Phase::Idle);
        assert!(s.repo_url().is_none());
        assert!(!s.repo_processed());
        assert!(s.chat_history().is_empty());
    }

    #[test]
    fn entering_url_awaits_analysis() {
        let mut s = Session::new();
        assert!(s.enter_url("  https://github.com/acme/widget ").unwrap());
        assert_eq!(s.phase(), Phase::AwaitingAnalysis);
        assert_eq!(s.repo_url(), Some(URL));
    }

    #[test]
    fn blank_url_is_input_error() {
        let mut s = Session::new();
        assert!(matches!(s.enter_url("   "), Err(SessionError::Input(_))));
        assert_eq!(s.phase(), Phase::Idle);
    }

    #[test]
    fn same_url_is_noop() {
        let mut s = ready();
        s.begin_question("what is this?").unwrap();
        assert!(!s.enter_url(URL).unwrap());
        assert_eq!(s.phase(), Phase::Ready);
        assert_eq!(s.chat_history().len(), 1);
    }

    #[test]
    fn different_url_resets_state() {
        let mut s = ready();
        s.begin_question("what is this?").unwrap();
        s.record_answer("a widget library");

        assert!(s.enter_url("https://github.com/acme/gadget").unwrap());
        assert_eq!(s.phase(), Phase::AwaitingAnalysis);
        assert!(!s.repo_processed());
        assert!(s.chat_history().is_empty());
    }

    #[test]
    fn analysis_requires_url_and_runs_once() {
        let mut s = Session::new();
        assert!(matches!(s.begin_analysis(), Err(SessionError::InvalidState(_))));

        s.enter_url(URL).unwrap();
        assert_eq!(s.begin_analysis().unwrap(), URL);
        assert_eq!(s.phase(), Phase::Processing);
        assert!(matches!(s.begin_analysis(), Err(SessionError::InvalidState(_))));
        assert!(matches!(s.enter_url("https://x.dev/y"), Err(SessionError::InvalidState(_))));

        s.finish_analysis(true);
        assert!(s.repo_processed());
        let err = s.begin_analysis().unwrap_err();
        assert_eq!(err.to_string(), "repository already analyzed");
    }

    #[test]
    fn failed_analysis_allows_retry() {
        let mut s = Session::new();
        s.enter_url(URL).unwrap();
        s.begin_analysis().unwrap();
        s.finish_analysis(false);
        assert_eq!(s.phase(), Phase::AwaitingAnalysis);
        assert!(!s.repo_processed());
        assert!(s.begin_analysis().is_ok());
    }

    #[test]
    fn questions_need_ready_session() {
        let mut s = Session::new();
        s.enter_url(URL).unwrap();
        assert!(matches!(
            s.begin_question("hello?"),
            Err(SessionError::InvalidState(_))
        ));
        assert!(s.chat_history().is_empty());
    }

    #[test]
    fn blank_question_is_input_error() {
        let mut s = ready();
        assert!(matches!(s.begin_question(" \n"), Err(SessionError::Input(_))));
        assert!(s.chat_history().is_empty());
    }

    #[test]
    fn history_alternates_in_order() {
        let mut s = ready();
        assert_eq!(s.begin_question("first?").unwrap(), URL);
        s.record_answer("one");
        s.begin_question("second?").unwrap();
        s.record_answer("two");

        let roles: Vec<_> = s.chat_history().iter().map(|m| m.role).collect();
        assert_eq!(
            roles,
            vec![ChatRole::User, ChatRole::Assistant, ChatRole::User, ChatRole::Assistant]
        );
        assert_eq!(s.chat_history()[2].content, "second?");
    }

    #[test]
    fn clear_keeps_repository() {
        let mut s = ready();
        s.begin_question("q").unwrap();
        s.record_answer("a");
        s.clear();
        assert!(s.chat_history().is_empty());
        assert_eq!(s.phase(), Phase::Ready);
        assert!(s.repo_processed());
        assert_eq!(s.repo_url(), Some(URL));
    }

    #[test]
    fn serializes_for_display() {
        let s = ready();
        let json = serde_json::to_value(&s).unwrap();
        assert_eq!(json["phase"], "ready");
        assert_eq!(json["repo_url"], URL);
        assert_eq!(json["repo_processed"], true);
    }
}
