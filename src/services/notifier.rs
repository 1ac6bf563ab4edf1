//! Best-effort outcome notifications. Failures are logged and never reach the caller.

use std::sync::Arc;

use futures::future::BoxFuture;
use serde::Serialize;
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

use crate::{
    config::AppConfig,
    dao::{duel_store::ParticipantSettlement, models::ActivityKind},
};

/// Result of a duel from one participant's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DuelOutcome {
    Won,
    Lost,
    Drawn,
}

impl From<ActivityKind> for DuelOutcome {
    fn from(kind: ActivityKind) -> Self {
        match kind {
            ActivityKind::DuelWon => DuelOutcome::Won,
            ActivityKind::DuelLost => DuelOutcome::Lost,
            ActivityKind::DuelDrawn => DuelOutcome::Drawn,
        }
    }
}

/// Payload delivered to one participant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OutcomeNotice {
    pub user_id: Uuid,
    pub duel_id: Uuid,
    pub outcome: DuelOutcome,
    pub score: u32,
    pub forfeit: bool,
}

impl From<&ParticipantSettlement> for OutcomeNotice {
    fn from(settlement: &ParticipantSettlement) -> Self {
        Self {
            user_id: settlement.user_id,
            duel_id: settlement.activity.duel_id,
            outcome: settlement.activity.kind.into(),
            score: settlement.score,
            forfeit: settlement.activity.forfeit,
        }
    }
}

/// Errors raised by notifier backends.
#[derive(Debug, Error)]
pub enum NotifierError {
    /// The remote endpoint answered with a non-success status.
    #[error("notification rejected with status {status}")]
    Rejected { status: u16 },
    /// The request could not be delivered.
    #[cfg(feature = "http")]
    #[error("notification transport failed")]
    Transport(#[from] reqwest::Error),
}

/// Push-delivery collaborator.
pub trait Notifier: Send + Sync {
    fn notify(&self, notice: OutcomeNotice) -> BoxFuture<'static, Result<(), NotifierError>>;
}

/// Writes outcomes to the log; used when no webhook is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, notice: OutcomeNotice) -> BoxFuture<'static, Result<(), NotifierError>> {
        Box::pin(async move {
            info!(
                user_id = %notice.user_id,
                duel_id = %notice.duel_id,
                outcome = ?notice.outcome,
                score = notice.score,
                forfeit = notice.forfeit,
                "duel outcome"
            );
            Ok(())
        })
    }
}

/// POSTs each notice as JSON to a fixed endpoint.
#[cfg(feature = "http")]
#[derive(Clone)]
pub struct WebhookNotifier {
    client: reqwest::Client,
    url: String,
}

#[cfg(feature = "http")]
impl WebhookNotifier {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: url.into(),
        }
    }
}

#[cfg(feature = "http")]
impl Notifier for WebhookNotifier {
    fn notify(&self, notice: OutcomeNotice) -> BoxFuture<'static, Result<(), NotifierError>> {
        let notifier = self.clone();
        Box::pin(async move {
            let response = notifier
                .client
                .post(&notifier.url)
                .json(&notice)
                .send()
                .await?;
            let status = response.status();
            if !status.is_success() {
                return Err(NotifierError::Rejected {
                    status: status.as_u16(),
                });
            }
            Ok(())
        })
    }
}

/// Pick the notifier backend matching the configuration.
pub fn from_config(config: &AppConfig) -> Arc<dyn Notifier> {
    match config.notifier_webhook_url() {
        #[cfg(feature = "http")]
        Some(url) => {
            info!(url, "outcome notifications sent to webhook");
            Arc::new(WebhookNotifier::new(url))
        }
        #[cfg(not(feature = "http"))]
        Some(url) => {
            warn!(url, "webhook configured but the `http` feature is disabled; logging outcomes");
            Arc::new(LogNotifier)
        }
        None => Arc::new(LogNotifier),
    }
}

/// Deliver `notices` on a background task. Never blocks nor fails the caller.
pub fn dispatch(notifier: Arc<dyn Notifier>, notices: Vec<OutcomeNotice>) {
    if notices.is_empty() {
        return;
    }

    tokio::spawn(async move {
        for notice in notices {
            let user_id = notice.user_id;
            let duel_id = notice.duel_id;
            if let Err(err) = notifier.notify(notice).await {
                warn!(user_id = %user_id, duel_id = %duel_id, error = %err, "outcome notification failed");
            }
        }
    });
}

#[cfg(test)]
mod tests {
    use std::time::SystemTime;

    use tokio::sync::mpsc;

    use super::*;
    use crate::dao::models::ActivityEntity;

    struct FlakyNotifier {
        seen: mpsc::UnboundedSender<Uuid>,
    }

    impl Notifier for FlakyNotifier {
        fn notify(&self, notice: OutcomeNotice) -> BoxFuture<'static, Result<(), NotifierError>> {
            let seen = self.seen.clone();
            Box::pin(async move {
                let _ = seen.send(notice.user_id);
                Err(NotifierError::Rejected { status: 502 })
            })
        }
    }

    fn notice(user_id: Uuid) -> OutcomeNotice {
        OutcomeNotice {
            user_id,
            duel_id: Uuid::new_v4(),
            outcome: DuelOutcome::Won,
            score: 300,
            forfeit: false,
        }
    }

    #[tokio::test]
    async fn failures_do_not_stop_remaining_notices() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let (first, second) = (Uuid::new_v4(), Uuid::new_v4());

        dispatch(
            Arc::new(FlakyNotifier { seen: tx }),
            vec![notice(first), notice(second)],
        );

        assert_eq!(rx.recv().await, Some(first));
        assert_eq!(rx.recv().await, Some(second));
    }

    #[test]
    fn notice_mirrors_settlement() {
        let user_id = Uuid::new_v4();
        let duel_id = Uuid::new_v4();
        let settlement = ParticipantSettlement {
            user_id,
            score: 0,
            won: false,
            xp: 0,
            week: "2026-W42".into(),
            activity: ActivityEntity {
                id: Uuid::new_v4(),
                user_id,
                kind: ActivityKind::DuelLost,
                duel_id,
                opponent_id: Uuid::new_v4(),
                score: 0,
                forfeit: true,
                created_at: SystemTime::now(),
            },
        };

        let notice = OutcomeNotice::from(&settlement);
        assert_eq!(notice.outcome, DuelOutcome::Lost);
        assert_eq!(notice.duel_id, duel_id);
        assert!(notice.forfeit);
    }

    #[test]
    fn log_notifier_is_the_default() {
        let notifier = from_config(&AppConfig::default());
        let outcome = futures::executor::block_on(notifier.notify(notice(Uuid::new_v4())));
        assert!(outcome.is_ok());
    }
}
