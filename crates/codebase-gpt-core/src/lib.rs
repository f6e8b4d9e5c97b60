//! Session state machine, query engine and configuration for CodebaseGPT.

pub mod config;
pub mod controller;
pub mod error;
pub mod query;
pub mod session;
pub mod vault;

pub use config::Config;
pub use controller::{AnalysisStatus, Controller, StatusTx};
pub use error::{ErrorKind, SessionError};
pub use query::{Answer, QueryEngine};
pub use session::{ChatMessage, ChatRole, Phase, Session};
