//! Certificate change watcher.
//!
//! Subscribes to the secret change feed and keeps the TLS material store
//! current. The watcher is an explicit state machine {Subscribed,
//! Unsubscribed, ReconnectPending} driven by messages on a channel: a closed
//! feed schedules exactly one pending reconnect after an exponentially
//! increasing delay, and a reconnect attempt that fails shuts the watcher
//! down permanently.

use std::sync::Arc;
use std::time::Duration;

use base64::Engine as _;
use futures::stream::BoxStream;
use futures::StreamExt;
use serde::Deserialize;
use tokio::sync::mpsc;

use restgate_core::GatewayResult;

use crate::tls::feed::{SecretAction, SecretEvent, SecretEventSource};
use crate::tls::TlsContextStore;

/// One watched secret category: which store it feeds, the secret name prefix
/// it matches and the data field carrying the base64 certificate payload.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SecretCategory {
    #[serde(rename = "type")]
    pub kind: String,
    pub name_prefix: String,
    pub data_field_key: String,
}

impl SecretCategory {
    fn is_truststore(&self) -> bool {
        self.kind.eq_ignore_ascii_case("truststore")
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct WatcherSettings {
    pub initial_timeout_seconds: u64,
    pub max_timeout_power: u32,
    pub shutdown_grace_seconds: u64,
}

impl Default for WatcherSettings {
    fn default() -> Self {
        Self { initial_timeout_seconds: 8, max_timeout_power: 4, shutdown_grace_seconds: 1 }
    }
}

/// Reconnect delay for the given attempt: the delay doubles per attempt and
/// is capped at `initial << max_timeout_power`, while the attempt counter
/// itself is unbounded.
pub(crate) fn reconnect_delay_seconds(settings: &WatcherSettings, attempt: u32) -> u64 {
    settings.initial_timeout_seconds << attempt.min(settings.max_timeout_power)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatcherState {
    Subscribed,
    Unsubscribed,
    ReconnectPending,
}

enum WatcherMessage {
    ReconnectDue,
    Shutdown,
}

pub struct SecretChangeWatcher {
    tx: mpsc::Sender<WatcherMessage>,
    handle: tokio::task::JoinHandle<()>,
    grace: Duration,
}

impl SecretChangeWatcher {
    /// Subscribe to the feed and start the watcher. A failing initial
    /// subscription is fatal.
    pub async fn start(
        source: Arc<dyn SecretEventSource>,
        store: Arc<TlsContextStore>,
        categories: Vec<SecretCategory>,
        settings: WatcherSettings,
    ) -> GatewayResult<Self> {
        let feed = source.subscribe().await?;
        tracing::info!("certificate change watcher subscribed");

        let grace = Duration::from_secs(settings.shutdown_grace_seconds);
        let (tx, rx) = mpsc::channel(8);
        let driver = Driver {
            source,
            store,
            categories,
            settings,
            tx: tx.clone(),
            state: WatcherState::Subscribed,
            attempt: 0,
        };
        let handle = tokio::spawn(driver.run(Some(feed), rx));
        Ok(Self { tx, handle, grace })
    }

    /// Whether the watcher stopped (shutdown or a failed reconnect).
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Stop the watcher, draining within the grace period before forceful
    /// cancellation.
    pub async fn shutdown(self) {
        let _ = self.tx.send(WatcherMessage::Shutdown).await;
        let mut handle = self.handle;
        if tokio::time::timeout(self.grace, &mut handle).await.is_err() {
            tracing::warn!("certificate watcher did not stop in time, cancelling");
            handle.abort();
        }
    }
}

struct Driver {
    source: Arc<dyn SecretEventSource>,
    store: Arc<TlsContextStore>,
    categories: Vec<SecretCategory>,
    settings: WatcherSettings,
    tx: mpsc::Sender<WatcherMessage>,
    state: WatcherState,
    attempt: u32,
}

impl Driver {
    async fn run(
        mut self,
        mut feed: Option<BoxStream<'static, SecretEvent>>,
        mut rx: mpsc::Receiver<WatcherMessage>,
    ) {
        loop {
            if let Some(stream) = feed.as_mut() {
                let mut closed = false;
                tokio::select! {
                    event = stream.next() => match event {
                        Some(event) => self.handle_event(event),
                        None => closed = true,
                    },
                    message = rx.recv() => match message {
                        // a stale reconnect timer while subscribed is a no-op
                        Some(WatcherMessage::ReconnectDue) => {}
                        Some(WatcherMessage::Shutdown) | None => {
                            self.state = WatcherState::Unsubscribed;
                            return;
                        }
                    },
                }
                if closed {
                    tracing::warn!("secret change feed closed");
                    feed = None;
                    self.schedule_reconnect();
                }
            } else {
                match rx.recv().await {
                    Some(WatcherMessage::ReconnectDue) => {
                        tracing::info!("re-subscribe attempt started");
                        match self.source.subscribe().await {
                            Ok(new_feed) => {
                                tracing::info!("certificate change watcher re-subscribed");
                                self.state = WatcherState::Subscribed;
                                feed = Some(new_feed);
                            }
                            Err(error) => {
                                tracing::error!(%error, "unexpected error in re-subscribe attempt, stopping watcher");
                                self.state = WatcherState::Unsubscribed;
                                return;
                            }
                        }
                    }
                    Some(WatcherMessage::Shutdown) | None => {
                        self.state = WatcherState::Unsubscribed;
                        return;
                    }
                }
            }
        }
    }

    /// Schedule a single pending reconnect; further feed closures while one
    /// is pending are ignored.
    fn schedule_reconnect(&mut self) {
        if self.state == WatcherState::ReconnectPending {
            tracing::info!("re-subscribe already scheduled");
            return;
        }
        self.state = WatcherState::ReconnectPending;
        let delay = reconnect_delay_seconds(&self.settings, self.attempt);
        self.attempt += 1;
        tracing::info!(delay_seconds = delay, attempt = self.attempt, "scheduling re-subscribe");
        let tx = self.tx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(delay)).await;
            let _ = tx.send(WatcherMessage::ReconnectDue).await;
        });
    }

    fn handle_event(&self, event: SecretEvent) {
        for category in &self.categories {
            if !event.name.starts_with(&category.name_prefix) {
                continue;
            }
            match event.action {
                SecretAction::Added | SecretAction::Modified => {
                    let Some(payload) = event.data.get(&category.data_field_key) else {
                        tracing::warn!(secret = %event.name, "no secret data was found in secret");
                        continue;
                    };
                    let decoded = match base64::engine::general_purpose::STANDARD.decode(payload) {
                        Ok(decoded) => decoded,
                        Err(error) => {
                            tracing::warn!(secret = %event.name, %error, "secret payload is not valid base64");
                            continue;
                        }
                    };
                    if category.is_truststore() {
                        self.store.add_truststore_cert(&event.name, decoded);
                    } else {
                        self.store.add_keystore_cert(&event.name, decoded);
                    }
                    tracing::info!(secret = %event.name, action = ?event.action, "secret updated in store");
                }
                SecretAction::Deleted => {
                    if category.is_truststore() {
                        self.store.delete_truststore_cert(&event.name);
                    } else {
                        self.store.delete_keystore_cert(&event.name);
                    }
                    tracing::info!(secret = %event.name, "secret deleted from store");
                }
            }
        }
    }
}
