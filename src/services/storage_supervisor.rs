use std::{future::Future, time::Duration};

use tokio::time::sleep;
use tracing::{error, info, warn};

use crate::{
    dao::storage::StorageError,
    state::{SharedState, Storage},
};

const INITIAL_DELAY: Duration = Duration::from_millis(1_000);
const MAX_DELAY: Duration = Duration::from_secs(10);
const HEALTH_POLL_INTERVAL: Duration = Duration::from_secs(5);
const MAX_RECONNECT_ATTEMPTS: u32 = 3;

/// Connect to the storage backend and keep the app degraded whenever it is unreachable.
pub async fn run<F, Fut>(state: SharedState, mut connect: F)
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = Result<Storage, StorageError>> + Send,
{
    let mut delay = INITIAL_DELAY;

    loop {
        let storage = match connect().await {
            Ok(storage) => storage,
            Err(err) if err.is_transient() => {
                warn!(error = %err, retry_in_ms = delay.as_millis() as u64, "storage connection attempt failed");
                sleep(delay).await;
                delay = (delay * 2).min(MAX_DELAY);
                continue;
            }
            Err(err) => {
                error!(error = %err, retry_in_ms = delay.as_millis() as u64, "storage rejected the connection");
                sleep(delay).await;
                delay = (delay * 2).min(MAX_DELAY);
                continue;
            }
        };

        state.set_storage(storage.clone()).await;
        info!("storage connection established; leaving degraded mode");
        delay = INITIAL_DELAY;

        watch(&state, &storage).await;

        sleep(delay).await;
        delay = (delay * 2).min(MAX_DELAY);
    }
}

/// Poll the installed backend until it fails and cannot be revived in place.
async fn watch(state: &SharedState, storage: &Storage) {
    loop {
        if storage.duels.health_check().await.is_ok() {
            if state.is_degraded() {
                info!("storage healthy again; leaving degraded mode");
                state.update_degraded(false);
            }
            sleep(HEALTH_POLL_INTERVAL).await;
            continue;
        }

        if reconnect(state, storage).await {
            state.update_degraded(false);
            sleep(HEALTH_POLL_INTERVAL).await;
        } else {
            warn!("exhausted storage reconnect attempts; staying in degraded mode");
            return;
        }
    }
}

async fn reconnect(state: &SharedState, storage: &Storage) -> bool {
    let mut backoff = INITIAL_DELAY;
    for attempt in 0..MAX_RECONNECT_ATTEMPTS {
        match storage.duels.try_reconnect().await {
            Ok(()) => {
                info!(attempt, "storage reconnection succeeded after health check failure");
                return true;
            }
            Err(err) if attempt == 0 => {
                warn!(attempt, error = %err, "storage reconnect failed; entering degraded mode");
                state.update_degraded(true);
            }
            Err(err) => warn!(attempt, error = %err, "storage reconnect attempt failed"),
        }
        sleep(backoff).await;
        backoff = (backoff * 2).min(MAX_DELAY);
    }
    false
}

#[cfg(test)]
mod tests {
    use std::sync::{
        Arc,
        atomic::{AtomicU32, Ordering},
    };

    use super::*;
    use crate::{
        config::AppConfig, dao::duel_store::memory::InMemoryDuelStore,
        services::notifier::LogNotifier, state::AppState,
    };

    #[tokio::test(start_paused = true)]
    async fn retries_until_storage_connects() {
        let state = AppState::new(AppConfig::default(), Arc::new(LogNotifier));
        let attempts = Arc::new(AtomicU32::new(0));

        let counter = attempts.clone();
        let supervisor = tokio::spawn(run(state.clone(), move || {
            let counter = counter.clone();
            async move {
                if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(StorageError::Corrupt("not yet".into()))
                } else {
                    Ok(Storage::new(InMemoryDuelStore::new()))
                }
            }
        }));

        let mut degraded = state.degraded_watcher();
        degraded.wait_for(|value| !*value).await.unwrap();
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
        assert!(state.require_storage().await.is_ok());
        supervisor.abort();
    }
}
