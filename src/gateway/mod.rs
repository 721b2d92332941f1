//! Gateway server implementation

pub mod auth;
mod dispatcher;
mod executor;
mod router;
mod server;
pub mod trace;

pub use auth::{Authenticator, CredentialStore, Principal, StaticCredentialStore};
pub use dispatcher::{DispatchOptions, Dispatcher, Reply};
pub use executor::ToolExecutor;
pub use server::{Gateway, build_chain, build_registry};
