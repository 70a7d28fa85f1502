//! Short-interval poll of a single quote while an external signer may act on it.
//!
//! The signer works from another session, so nothing reaches the signal bus;
//! polling the quote directly is the only prompt way to see the signature.
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info};

use crate::detector::{Noteworthy, Transition};
use crate::model::{Quote, QuoteStatus};
use crate::session::Session;
use crate::task::TaskHandle;

/// Start polling if the displayed quote awaits the signer; `None` otherwise.
pub fn start(session: Arc<Session>, display: Arc<watch::Sender<Quote>>) -> Option<TaskHandle> {
    if !display.borrow().status.awaits_external_action() {
        return None;
    }
    let period = session.settings().detail_poll_interval();
    Some(TaskHandle::spawn(run(session, display, period)))
}

async fn run(session: Arc<Session>, display: Arc<watch::Sender<Quote>>, period: Duration) {
    let id = display.borrow().id.clone();
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    ticker.tick().await;
    debug!(quote = %id, ?period, "detail poller started");

    loop {
        ticker.tick().await;
        if display.borrow().status != QuoteStatus::Sent {
            break;
        }
        let fresh = match session.backend().get_quote_fresh(&id).await {
            Ok(quote) => quote,
            Err(err) => {
                debug!(quote = %id, %err, "detail poll failed");
                continue;
            }
        };
        if fresh.status == QuoteStatus::Sent {
            continue;
        }

        let to = fresh.status;
        let kind = Noteworthy::classify(QuoteStatus::Sent, to);
        display.send_replace(fresh.clone());
        session.quote_changed_externally(&fresh);
        if let Some(kind @ (Noteworthy::Signed | Noteworthy::Accepted)) = kind {
            info!(quote = %id, to = to.as_str(), "signer acted on quote");
            session.notifier().transition(&Transition {
                quote: fresh,
                from: QuoteStatus::Sent,
                to,
                kind,
            });
        }
        break;
    }
    debug!(quote = %id, "detail poller stopped");
}
