//! Cross-tab forced-logout signal.

use std::time::Duration;

use chrono::Utc;
use quoteflow_core::types::DbId;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, mpsc};
use tokio_util::sync::CancellationToken;

use crate::mirror::{LogoutReason, SessionMirror, Verdict};
use crate::store::StoreChange;

/// Emitted once when a tab has to end its session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForcedLogout {
    pub account_id: DbId,
    pub token: String,
    pub reason: LogoutReason,
}

/// Watches the shared store on behalf of one tab.
///
/// Re-checks the tab's mirror whenever its account record changes, and on a
/// fixed tick so that local expiry is noticed in an otherwise quiet store.
pub struct TabNotifier {
    mirror: SessionMirror,
    changes: broadcast::Receiver<StoreChange>,
    check_every: Duration,
}

impl TabNotifier {
    /// Subscribe immediately, so no write made after this call is missed.
    pub fn new(mirror: SessionMirror, check_every: Duration) -> Self {
        let changes = mirror.store().subscribe();
        Self {
            mirror,
            changes,
            check_every,
        }
    }

    /// Run until the tab is forced out or `cancel` fires.
    ///
    /// Sends at most one [`ForcedLogout`] on `events`, then returns.
    pub async fn run(mut self, events: mpsc::Sender<ForcedLogout>, cancel: CancellationToken) {
        let key = self.mirror.store_key();
        let mut ticker = tokio::time::interval(self.check_every);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::debug!(account_id = self.mirror.account_id(), "Tab notifier stopping");
                    return;
                }
                change = self.changes.recv() => match change {
                    Ok(change) if change.key != key => continue,
                    Ok(_) => {}
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::debug!(skipped, "Tab notifier lagged; re-checking");
                    }
                    Err(RecvError::Closed) => return,
                },
                _ = ticker.tick() => {}
            }

            if let Verdict::ForceLogout(reason) = self.mirror.check(Utc::now()).await {
                tracing::info!(
                    account_id = self.mirror.account_id(),
                    ?reason,
                    "Forcing local logout"
                );
                let _ = events
                    .send(ForcedLogout {
                        account_id: self.mirror.account_id(),
                        token: self.mirror.token().to_string(),
                        reason,
                    })
                    .await;
                return;
            }
        }
    }
}
