//! Headless view consumers. Each view reads through the session's stores and
//! owns the timers and listeners it started; dropping the view releases them.
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::watch;
use tracing::debug;

use crate::error::{ApiError, MutationError};
use crate::model::{DashboardMetrics, Quote, QuotePage, QuoteStatus, ShareLink};
use crate::poller;
use crate::session::{keys, Session};
use crate::store::Snapshot;
use crate::task::TaskHandle;

pub struct DashboardView {
    session: Arc<Session>,
}

impl DashboardView {
    pub async fn open(session: Arc<Session>) -> (Self, Snapshot<DashboardMetrics>) {
        let first = session.dashboard().await;
        (Self { session }, first)
    }

    pub fn snapshot(&self) -> Snapshot<DashboardMetrics> {
        self.session.stores().dashboard.peek(keys::DASHBOARD)
    }
}

pub struct QuoteListView {
    session: Arc<Session>,
    page: u32,
    limit: u32,
    search: Option<String>,
}

impl QuoteListView {
    pub async fn open(
        session: Arc<Session>,
        page: u32,
        limit: u32,
        search: Option<String>,
    ) -> (Self, Snapshot<QuotePage>) {
        let first = session.quote_page(page, limit, search.as_deref()).await;
        let view = Self {
            session,
            page,
            limit,
            search,
        };
        (view, first)
    }

    fn key(&self) -> String {
        keys::quote_list(self.page, self.limit, self.search.as_deref())
    }

    pub fn snapshot(&self) -> Snapshot<QuotePage> {
        self.session.stores().quote_lists.peek(&self.key())
    }

    pub async fn reload(&self) -> Snapshot<QuotePage> {
        self.session
            .quote_page(self.page, self.limit, self.search.as_deref())
            .await
    }

    pub async fn delete(&self, id: &str) -> Result<(), MutationError> {
        self.session.delete_quote(id).await.map_err(|e| surface(&self.session, e))
    }
}

/// Quote detail with the dedicated poller attached while the quote is Sent.
pub struct QuoteDetailView {
    session: Arc<Session>,
    display: Arc<watch::Sender<Quote>>,
    polling: Arc<AtomicBool>,
    _supervisor: TaskHandle,
}

impl QuoteDetailView {
    /// Load the quote; a cold-start failure is returned for the caller to render.
    pub async fn open(session: Arc<Session>, id: &str) -> Result<Self, Arc<ApiError>> {
        let first = session.quote(id).await;
        let quote = match (first.data, first.error) {
            (Some(quote), _) => quote,
            (None, Some(err)) => return Err(err),
            (None, None) => return Err(Arc::new(ApiError::Decode(format!("quote {} unavailable", id)))),
        };
        let display = Arc::new(watch::channel(quote).0);
        let polling = Arc::new(AtomicBool::new(false));
        let supervisor = TaskHandle::spawn(supervise(session.clone(), display.clone(), polling.clone()));
        Ok(Self {
            session,
            display,
            polling,
            _supervisor: supervisor,
        })
    }

    pub fn quote(&self) -> Quote {
        self.display.borrow().clone()
    }

    pub fn watch(&self) -> watch::Receiver<Quote> {
        self.display.subscribe()
    }

    pub fn is_polling(&self) -> bool {
        self.polling.load(Ordering::SeqCst)
    }

    pub async fn set_status(&self, status: QuoteStatus) -> Result<Quote, MutationError> {
        let id = self.display.borrow().id.clone();
        let updated = self
            .session
            .set_quote_status(&id, status)
            .await
            .map_err(|e| surface(&self.session, e))?;
        self.display.send_replace(updated.clone());
        Ok(updated)
    }

    /// Create the signer link, then show the quote as the backend now has it.
    pub async fn share(&self) -> Result<ShareLink, MutationError> {
        let id = self.display.borrow().id.clone();
        let link = self
            .session
            .share_quote(&id)
            .await
            .map_err(|e| surface(&self.session, e))?;
        match self.session.backend().get_quote_fresh(&id).await {
            Ok(quote) => {
                self.display.send_replace(quote);
            }
            Err(err) => debug!(quote = %id, %err, "reload after share failed"),
        }
        Ok(link)
    }

    pub async fn delete(self) -> Result<(), MutationError> {
        let id = self.display.borrow().id.clone();
        self.session
            .delete_quote(&id)
            .await
            .map_err(|e| surface(&self.session, e))
    }
}

/// Keep the poller in step with the displayed status and fold store updates
/// for this quote into the display.
async fn supervise(session: Arc<Session>, display: Arc<watch::Sender<Quote>>, polling: Arc<AtomicBool>) {
    let mut shown = display.subscribe();
    let mut changes = session.stores().quotes.changes();
    let key = keys::quote(&display.borrow().id);
    let mut active: Option<TaskHandle> = None;

    loop {
        let pending = shown.borrow_and_update().status.awaits_external_action();
        let running = active.as_ref().map_or(false, |h| !h.is_finished());
        if !pending {
            if let Some(handle) = active.take() {
                handle.cancel();
            }
        } else if !running {
            active = poller::start(session.clone(), display.clone());
        }
        polling.store(active.is_some(), Ordering::SeqCst);

        tokio::select! {
            res = shown.changed() => {
                if res.is_err() {
                    break;
                }
            }
            msg = changes.recv() => match msg {
                Ok(change) if change.key == key => {
                    display.send_replace(change.value);
                }
                Ok(_) | Err(RecvError::Lagged(_)) => {}
                Err(RecvError::Closed) => break,
            },
        }
    }
}

fn surface(session: &Session, err: MutationError) -> MutationError {
    session.notifier().error(err.to_string());
    err
}
