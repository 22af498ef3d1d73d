//! TLS material handling: the process-wide material store, the secret
//! change feed and the watcher that keeps the store current.

pub mod feed;
mod store;
mod watcher;

pub use feed::{HttpSecretEventSource, SecretAction, SecretEvent, SecretEventSource};
pub use store::{TlsContextStore, TlsMaterial};
pub use watcher::{SecretCategory, SecretChangeWatcher, WatcherSettings, WatcherState};
