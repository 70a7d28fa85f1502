//! Global activity monitor: watches the most recent quotes and alerts on
//! status transitions, whoever caused them.
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::detector::ChangeDetector;
use crate::model::QuotePage;
use crate::session::{keys, Session};
use crate::store::Snapshot;
use crate::task::TaskHandle;

pub struct ActivityMonitor {
    session: Arc<Session>,
    key: String,
    limit: u32,
    _task: TaskHandle,
}

impl ActivityMonitor {
    /// Start watching and kick off the first (silent) fetch.
    pub fn start(session: Arc<Session>) -> Self {
        let limit = session.settings().activity_page_size;
        let key = keys::quote_list(1, limit, None);
        let mut detector = ChangeDetector::new();

        let mut changes = session.stores().quote_lists.changes();
        if let Some(page) = session.stores().quote_lists.peek(&key).data {
            detector.observe(&page.quotes);
        }

        let task = {
            let session = session.clone();
            let key = key.clone();
            TaskHandle::spawn(async move {
                let first = session.quote_page(1, limit, None).await;
                if first.data.is_none() {
                    debug!(error = ?first.error, "initial activity fetch failed");
                }
                loop {
                    match changes.recv().await {
                        Ok(change) if change.key == key => {
                            let transitions = detector.observe(&change.value.quotes);
                            for t in &transitions {
                                info!(quote = %t.quote.id, from = t.from.as_str(), to = t.to.as_str(), "quote status changed");
                                session.notifier().transition(t);
                            }
                        }
                        Ok(_) => {}
                        Err(RecvError::Lagged(skipped)) => {
                            warn!(skipped, "activity monitor lagged behind store changes");
                        }
                        Err(RecvError::Closed) => break,
                    }
                }
            })
        };

        Self {
            session,
            key,
            limit,
            _task: task,
        }
    }

    /// Time of the last successful fetch of the watched page, changed or not.
    pub fn last_update(&self) -> Option<Instant> {
        self.snapshot().fetched_at
    }

    pub fn snapshot(&self) -> Snapshot<QuotePage> {
        self.session.stores().quote_lists.peek(&self.key)
    }

    /// Fetch now instead of waiting for the next timer tick.
    pub async fn refresh_now(&self) -> Snapshot<QuotePage> {
        self.session.stores().quote_lists.invalidate(&self.key);
        self.session.quote_page(1, self.limit, None).await
    }
}
