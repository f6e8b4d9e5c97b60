//! HTTP gateway serving the chat page and the session API.

mod error;
mod handlers;
mod router;
mod server;
mod sessions;

pub use error::GatewayError;
pub use server::GatewayServer;
