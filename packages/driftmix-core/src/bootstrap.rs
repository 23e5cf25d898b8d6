//! Application bootstrap and dependency wiring.
//!
//! This module contains the composition root - the single place where all
//! services are instantiated and wired together. This pattern provides:
//!
//! - **Clarity**: All dependency relationships are visible in one place
//! - **Testability**: Easy to swap implementations for testing
//! - **Maintainability**: Service creation logic is isolated from usage

use std::sync::Arc;
use std::time::Duration;

use reqwest::Client;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

use crate::error::{DriftmixError, DriftmixResult};
use crate::mix::player::PlayerContext;
use crate::node::client::NodeClient;
use crate::node::http::NodeHttpClient;
use crate::notify::Notifier;
use crate::protocol_constants::{HTTP_TIMEOUT_SECS, SNAPSHOT_FILE_NAME};
use crate::services::persistence::{rehydrate, spawn_persister, SnapshotStore};
use crate::services::registry::PlayerRegistry;
use crate::state::CoreConfig;
use crate::traits::{CandidateSource, NodeControl, TrackResolver, VoiceGateway};

/// Container for all bootstrapped services.
///
/// This struct holds all the wired services created during bootstrap.
/// The host embeds it and drives it until shutdown.
#[derive(Clone)]
pub struct BootstrappedServices {
    /// Client for the audio-rendering node (socket control plane plus stats).
    pub node: Arc<NodeClient>,
    /// Owns every guild's player; the host feeds voice updates through it.
    pub registry: Arc<PlayerRegistry>,
    /// Snapshot storage, present only when a data directory is configured.
    store: Option<SnapshotStore>,
    /// Shared HTTP client for connection pooling.
    http_client: Client,
    /// Cancellation token for graceful shutdown.
    pub cancel_token: CancellationToken,
}

impl std::fmt::Debug for BootstrappedServices {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BootstrappedServices").finish_non_exhaustive()
    }
}

impl BootstrappedServices {
    /// Returns the shared HTTP client.
    pub fn http_client(&self) -> &Client {
        &self.http_client
    }

    /// Initiates graceful shutdown: stops background tasks and writes one
    /// final snapshot so state changed inside the debounce window survives.
    pub fn shutdown(&self) {
        log::info!("[Bootstrap] Beginning graceful shutdown...");

        // Signal cancellation to all background tasks
        self.cancel_token.cancel();

        if let Some(store) = &self.store {
            match store.save(&self.registry.snapshot_all()) {
                Ok(()) => log::info!(
                    "[Bootstrap] Flushed final snapshot for {} guild(s)",
                    self.registry.len()
                ),
                Err(e) => log::error!("[Bootstrap] Final snapshot write failed: {}", e),
            }
        }

        log::info!("[Bootstrap] Shutdown complete");
    }
}

/// Creates the shared HTTP client for node resolution calls.
///
/// Using a shared client enables connection pooling for better performance.
/// This is created once during bootstrap and injected into services that need it.
fn create_http_client() -> Client {
    Client::builder()
        .timeout(Duration::from_secs(HTTP_TIMEOUT_SECS))
        .build()
        .expect("Failed to create HTTP client")
}

/// Bootstraps all playback services with their dependencies.
///
/// This is the composition root where all services are instantiated and
/// wired together. The wiring order matters - services are created in
/// dependency order:
///
/// 1. Shared infrastructure (HTTP client, dirty signal, cancellation token)
/// 2. Node client and track resolver (depend on node config, HTTP client)
/// 3. Player registry (depends on node, resolver, host-supplied ports)
/// 4. Event router (depends on registry, node event channel)
/// 5. Persistence: rehydrate saved sessions, then start the persister
/// 6. Node socket connect - last, so rehydrated players exist before the
///    first socket-open event fans out
///
/// # Arguments
/// * `config` - Playback core configuration
/// * `user_id` - Bot user id the node plays on behalf of
/// * `source` - Host's related-song source for mix collection
/// * `gateway` - Host's voice gateway for join requests
/// * `notifier` - Host's channel for user-facing failure notices
///
/// # Errors
///
/// Returns an error if the configuration is invalid or the data directory
/// cannot be created.
pub async fn bootstrap_services(
    config: CoreConfig,
    user_id: &str,
    source: Arc<dyn CandidateSource>,
    gateway: Arc<dyn VoiceGateway>,
    notifier: Arc<dyn Notifier>,
) -> DriftmixResult<BootstrappedServices> {
    config.validate().map_err(DriftmixError::Configuration)?;

    // Create cancellation token for graceful shutdown
    let cancel_token = CancellationToken::new();

    // Create shared HTTP client for connection pooling
    let http_client = create_http_client();

    // Dirty signal: players pulse it on state changes, the persister listens
    let dirty = Arc::new(Notify::new());

    // Node client (socket control plane) and HTTP resolver share the config
    let node = NodeClient::new(
        config.node.clone(),
        config.reconnect_delay(),
        cancel_token.clone(),
    );
    let resolver = Arc::new(NodeHttpClient::new(http_client.clone(), config.node.clone()));

    // Wire up the per-player collaborator set
    let ctx = PlayerContext {
        node: Arc::clone(&node) as Arc<dyn NodeControl>,
        resolver: resolver as Arc<dyn TrackResolver>,
        source,
        gateway,
        notifier,
        dirty: Arc::clone(&dirty),
        cancel: cancel_token.clone(),
        max_song_duration_secs: config.max_song_duration_secs,
    };

    let registry = Arc::new(PlayerRegistry::new(ctx));
    registry.start_router(node.subscribe(), cancel_token.clone());

    // Persistence comes up before the socket: rehydrated players must exist
    // when the first socket-open event replays their sessions
    let store = match &config.data_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir).map_err(|e| {
                DriftmixError::Storage(format!("cannot create {}: {}", dir.display(), e))
            })?;
            let store = SnapshotStore::new(dir.join(SNAPSHOT_FILE_NAME));
            rehydrate(&registry, &store).await;
            spawn_persister(
                store.clone(),
                Arc::clone(&registry),
                dirty,
                config.persist_debounce(),
                cancel_token.clone(),
            );
            Some(store)
        }
        None => {
            log::info!("[Bootstrap] No data directory configured, persistence disabled");
            None
        }
    };

    node.connect(user_id);

    Ok(BootstrappedServices {
        node,
        registry,
        store,
        http_client,
        cancel_token,
    })
}
