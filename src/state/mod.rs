mod room;
mod sse;
pub mod state_machine;

use std::sync::Arc;

use tokio::sync::{RwLock, watch};
use tracing::warn;

use crate::{
    config::AppConfig,
    dao::duel_store::{DuelStore, QuizStore},
    dto::sse::{ServerEvent, SystemStatus},
    error::ServiceError,
    services::notifier::Notifier,
};

pub use self::room::{RoomHub, RoomMembership, RoomSignal};
pub use self::sse::{DuelFeed, SseHub};

pub type SharedState = Arc<AppState>;

const SSE_CAPACITY: usize = 64;
const EVENT_SYSTEM_STATUS: &str = "system.status";

/// Storage handles installed by the supervisor.
#[derive(Clone)]
pub struct Storage {
    pub duels: Arc<dyn DuelStore>,
    pub quizzes: Arc<dyn QuizStore>,
}

impl Storage {
    /// Use one backend for both duel records and quiz content.
    pub fn new<S>(store: S) -> Self
    where
        S: DuelStore + QuizStore + 'static,
    {
        let store = Arc::new(store);
        Self {
            duels: store.clone(),
            quizzes: store,
        }
    }
}

/// Central application state storing storage handles, rooms and event hubs.
pub struct AppState {
    storage: RwLock<Option<Storage>>,
    degraded: watch::Sender<bool>,
    config: Arc<AppConfig>,
    rooms: RoomHub,
    sse: SseHub,
    notifier: Arc<dyn Notifier>,
}

impl AppState {
    /// Construct a new [`AppState`] wrapped in an [`Arc`] so it can be cloned cheaply.
    ///
    /// The application starts in degraded mode until a storage backend is installed.
    pub fn new(config: AppConfig, notifier: Arc<dyn Notifier>) -> SharedState {
        let (degraded_tx, _rx) = watch::channel(true);
        Arc::new(Self {
            storage: RwLock::new(None),
            degraded: degraded_tx,
            config: Arc::new(config),
            rooms: RoomHub::new(),
            sse: SseHub::new(SSE_CAPACITY),
            notifier,
        })
    }

    /// Current storage handles, if installed and healthy.
    pub async fn require_storage(&self) -> Result<Storage, ServiceError> {
        if self.is_degraded() {
            return Err(ServiceError::Degraded);
        }
        let guard = self.storage.read().await;
        guard.clone().ok_or(ServiceError::Degraded)
    }

    /// Install a storage backend and leave degraded mode.
    pub async fn set_storage(&self, storage: Storage) {
        {
            let mut guard = self.storage.write().await;
            *guard = Some(storage);
        }
        self.update_degraded(false);
    }

    /// Current degraded flag.
    pub fn is_degraded(&self) -> bool {
        *self.degraded.borrow()
    }

    /// Subscribe to degraded mode updates.
    pub fn degraded_watcher(&self) -> watch::Receiver<bool> {
        self.degraded.subscribe()
    }

    /// Update the degraded flag and announce changes on the SSE hub.
    pub fn update_degraded(&self, value: bool) {
        let changed = self.degraded.send_if_modified(|current| {
            if *current == value {
                return false;
            }
            *current = value;
            true
        });
        if !changed {
            return;
        }

        match ServerEvent::json(
            Some(EVENT_SYSTEM_STATUS.to_string()),
            None,
            &SystemStatus { degraded: value },
        ) {
            Ok(event) => {
                self.sse.publish(event);
            }
            Err(err) => warn!(error = %err, "failed to serialize system status"),
        }
    }

    /// Runtime configuration.
    pub fn config(&self) -> Arc<AppConfig> {
        self.config.clone()
    }

    /// Live duel rooms.
    pub fn rooms(&self) -> &RoomHub {
        &self.rooms
    }

    /// Hub behind the duel outcome streams.
    pub fn sse(&self) -> &SseHub {
        &self.sse
    }

    /// Outcome notifier.
    pub fn notifier(&self) -> Arc<dyn Notifier> {
        self.notifier.clone()
    }
}

#[cfg(test)]
mod tests {
    use uuid::Uuid;

    use super::*;
    use crate::{dao::duel_store::memory::InMemoryDuelStore, services::notifier::LogNotifier};

    #[tokio::test]
    async fn starts_degraded_until_storage_installed() {
        let state = AppState::new(AppConfig::default(), Arc::new(LogNotifier));
        assert!(state.is_degraded());
        assert!(matches!(
            state.require_storage().await,
            Err(ServiceError::Degraded)
        ));

        state
            .set_storage(Storage::new(InMemoryDuelStore::new()))
            .await;
        assert!(!state.is_degraded());
        assert!(state.require_storage().await.is_ok());
    }

    #[tokio::test]
    async fn degraded_changes_are_announced_once() {
        let state = AppState::new(AppConfig::default(), Arc::new(LogNotifier));
        let mut feed = state.sse().follow(Uuid::new_v4());

        state.update_degraded(false);
        state.update_degraded(false);
        state.update_degraded(true);

        let first = feed.next().await.unwrap();
        assert_eq!(first.event.as_deref(), Some(EVENT_SYSTEM_STATUS));
        assert_eq!(first.data, r#"{"degraded":false}"#);
        let second = feed.next().await.unwrap();
        assert_eq!(second.data, r#"{"degraded":true}"#);
    }
}
