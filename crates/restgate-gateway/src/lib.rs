pub mod auth;
pub mod connectivity;
pub mod http;
pub mod run;
pub mod tls;

// Re-export commonly used types
pub use auth::AuthenticationService;
pub use connectivity::ConnectivityRetriever;
pub use http::{ExecutedResponse, HttpExecutor, OutboundBody, OutboundRequest, PoolSettings, RetryEvaluator};
pub use run::{RunOrchestrator, RunOutcome, RunRequest};
pub use tls::{SecretChangeWatcher, TlsContextStore};
