//! Clients for external services the chat frontend talks to over HTTP.

pub mod backend;

pub use backend::BackendClient;
