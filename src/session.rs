//! Per-tab coordinator: owns the stores, the bus handle and the notifier,
//! runs the mutation path and tears everything down on shutdown.

use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, info, instrument};

use crate::api::Backend;
use crate::bus::{SignalBus, Subscription, SyncKind, SyncMessage};
use crate::config::SyncSettings;
use crate::error::MutationError;
use crate::model::{
    Client, ClientInput, ClientPage, DashboardMetrics, NewQuote, Quote, QuotePage, QuoteStatus,
    ShareLink, UpdateQuote,
};
use crate::notifier::{AlertSink, Notifier};
use crate::store::{fetcher, ReadOptions, Snapshot, Store};
use crate::task::TaskHandle;

/// Granularity of the background refresh check.
const REFRESH_TICK: Duration = Duration::from_secs(1);

pub mod keys {
    pub const DASHBOARD: &str = "dashboard/metrics";
    pub const QUOTES_PREFIX: &str = "quotes?";
    pub const CLIENTS_PREFIX: &str = "clients?";

    pub fn quote_list(page: u32, limit: u32, search: Option<&str>) -> String {
        match search.filter(|s| !s.is_empty()) {
            Some(s) => format!("quotes?page={}&limit={}&search={}", page, limit, s),
            None => format!("quotes?page={}&limit={}", page, limit),
        }
    }

    pub fn quote(id: &str) -> String {
        format!("quotes/{}", id)
    }

    pub fn client_list(search: Option<&str>, page: u32, limit: u32) -> String {
        match search.filter(|s| !s.is_empty()) {
            Some(s) => format!("clients?page={}&limit={}&search={}", page, limit, s),
            None => format!("clients?page={}&limit={}", page, limit),
        }
    }

    pub fn client(id: &str) -> String {
        format!("clients/{}", id)
    }
}

/// The tab's caches, cheap to clone into bus callbacks.
#[derive(Clone)]
pub struct Stores {
    pub quote_lists: Store<QuotePage>,
    pub quotes: Store<Quote>,
    pub client_lists: Store<ClientPage>,
    pub clients: Store<Client>,
    pub dashboard: Store<DashboardMetrics>,
}

impl Stores {
    fn new(focus_throttle: Duration) -> Self {
        Self {
            quote_lists: Store::new(focus_throttle),
            quotes: Store::new(focus_throttle),
            client_lists: Store::new(focus_throttle),
            clients: Store::new(focus_throttle),
            dashboard: Store::new(focus_throttle),
        }
    }

    /// Re-fetch whatever a sync message may have made stale.
    pub fn apply(&self, msg: &SyncMessage) {
        match msg.kind {
            SyncKind::QuoteCreated | SyncKind::QuoteUpdated | SyncKind::QuoteDeleted => {
                self.quote_lists.mutate_where(|k| k.starts_with(keys::QUOTES_PREFIX));
                if let Some(id) = &msg.id {
                    self.quotes.mutate(&keys::quote(id));
                }
                self.dashboard.mutate(keys::DASHBOARD);
            }
            SyncKind::ClientCreated | SyncKind::ClientUpdated | SyncKind::ClientDeleted => {
                self.client_lists.mutate_where(|k| k.starts_with(keys::CLIENTS_PREFIX));
                if let Some(id) = &msg.id {
                    self.clients.mutate(&keys::client(id));
                }
                self.dashboard.mutate(keys::DASHBOARD);
            }
            SyncKind::RefreshAll => {
                self.quote_lists.mutate_all();
                self.quotes.mutate_all();
                self.client_lists.mutate_all();
                self.clients.mutate_all();
                self.dashboard.mutate_all();
            }
        }
    }

    fn focus_regained(&self) -> usize {
        self.quote_lists.focus_regained()
            + self.quotes.focus_regained()
            + self.client_lists.focus_regained()
            + self.clients.focus_regained()
            + self.dashboard.focus_regained()
    }

    fn spawn_refreshers(&self) -> Vec<TaskHandle> {
        vec![
            self.quote_lists.spawn_refresher(REFRESH_TICK),
            self.quotes.spawn_refresher(REFRESH_TICK),
            self.dashboard.spawn_refresher(REFRESH_TICK),
        ]
    }
}

pub struct Session {
    backend: Arc<dyn Backend>,
    bus: SignalBus,
    settings: SyncSettings,
    stores: Stores,
    notifier: Notifier,
    subscription: Mutex<Option<Subscription>>,
    refreshers: Mutex<Vec<TaskHandle>>,
}

impl Session {
    /// Build a tab session and wire its bus subscription and refresh timers.
    /// Must be called inside a tokio runtime.
    pub fn start(
        backend: Arc<dyn Backend>,
        bus: SignalBus,
        settings: SyncSettings,
        sink: Arc<dyn AlertSink>,
    ) -> Arc<Self> {
        let stores = Stores::new(settings.focus_throttle());
        let notifier = Notifier::new(sink, settings.alert_duration());

        let listener = stores.clone();
        let subscription = bus.subscribe(move |msg| {
            debug!(kind = msg.kind.as_str(), id = ?msg.id, "sync message from another tab");
            listener.apply(msg);
        });
        let refreshers = stores.spawn_refreshers();
        info!(cross_tab = bus.is_available(), channel = %settings.channel, "session started");

        Arc::new(Self {
            backend,
            bus,
            settings,
            stores,
            notifier,
            subscription: Mutex::new(Some(subscription)),
            refreshers: Mutex::new(refreshers),
        })
    }

    pub fn backend(&self) -> &Arc<dyn Backend> {
        &self.backend
    }

    pub fn stores(&self) -> &Stores {
        &self.stores
    }

    pub fn notifier(&self) -> &Notifier {
        &self.notifier
    }

    pub fn settings(&self) -> &SyncSettings {
        &self.settings
    }

    fn options(&self, refresh: bool) -> ReadOptions {
        let options = ReadOptions {
            dedup_window: self.settings.dedup_window(),
            refresh_interval: None,
            revalidate_on_focus: true,
        };
        if refresh {
            options.with_refresh(self.settings.refresh_interval())
        } else {
            options
        }
    }

    pub async fn quote_page(&self, page: u32, limit: u32, search: Option<&str>) -> Snapshot<QuotePage> {
        let backend = self.backend.clone();
        let owned = search.map(str::to_string);
        let f = fetcher(move || {
            let backend = backend.clone();
            let search = owned.clone();
            async move { backend.list_quotes(page, limit, search.as_deref()).await }
        });
        self.stores
            .quote_lists
            .read(&keys::quote_list(page, limit, search), f, self.options(true))
            .await
    }

    pub async fn quote(&self, id: &str) -> Snapshot<Quote> {
        let backend = self.backend.clone();
        let owned = id.to_string();
        let f = fetcher(move || {
            let backend = backend.clone();
            let id = owned.clone();
            async move { backend.get_quote(&id).await }
        });
        self.stores.quotes.read(&keys::quote(id), f, self.options(true)).await
    }

    pub async fn client_page(&self, search: Option<&str>, page: u32, limit: u32) -> Snapshot<ClientPage> {
        let backend = self.backend.clone();
        let owned = search.map(str::to_string);
        let f = fetcher(move || {
            let backend = backend.clone();
            let search = owned.clone();
            async move { backend.list_clients(search.as_deref(), page, limit).await }
        });
        self.stores
            .client_lists
            .read(&keys::client_list(search, page, limit), f, self.options(false))
            .await
    }

    pub async fn client(&self, id: &str) -> Snapshot<Client> {
        let backend = self.backend.clone();
        let owned = id.to_string();
        let f = fetcher(move || {
            let backend = backend.clone();
            let id = owned.clone();
            async move { backend.get_client(&id).await }
        });
        self.stores.clients.read(&keys::client(id), f, self.options(false)).await
    }

    pub async fn dashboard(&self) -> Snapshot<DashboardMetrics> {
        let backend = self.backend.clone();
        let f = fetcher(move || {
            let backend = backend.clone();
            async move { backend.dashboard_metrics().await }
        });
        self.stores.dashboard.read(keys::DASHBOARD, f, self.options(true)).await
    }

    /// Local effect of a confirmed mutation, then the cross-tab announcement.
    fn confirmed(&self, kind: SyncKind, id: Option<&str>) {
        self.stores.apply(&SyncMessage::new(kind, id.map(str::to_string)));
        self.bus.publish(kind, id);
    }

    #[instrument(skip_all)]
    pub async fn create_quote(&self, data: &NewQuote) -> Result<Quote, MutationError> {
        let quote = self
            .backend
            .create_quote(data)
            .await
            .map_err(|e| MutationError::new("create quote", e))?;
        self.confirmed(SyncKind::QuoteCreated, Some(&quote.id));
        Ok(quote)
    }

    #[instrument(skip(self, data))]
    pub async fn update_quote(&self, id: &str, data: &UpdateQuote) -> Result<Quote, MutationError> {
        let quote = self
            .backend
            .update_quote(id, data)
            .await
            .map_err(|e| MutationError::new("update quote", e))?;
        self.confirmed(SyncKind::QuoteUpdated, Some(id));
        Ok(quote)
    }

    pub async fn set_quote_status(&self, id: &str, status: QuoteStatus) -> Result<Quote, MutationError> {
        self.update_quote(id, &UpdateQuote::status(status)).await
    }

    #[instrument(skip(self))]
    pub async fn delete_quote(&self, id: &str) -> Result<(), MutationError> {
        self.backend
            .delete_quote(id)
            .await
            .map_err(|e| MutationError::new("delete quote", e))?;
        self.confirmed(SyncKind::QuoteDeleted, Some(id));
        Ok(())
    }

    /// Produce the signer link; the backend moves the quote towards Sent.
    #[instrument(skip(self))]
    pub async fn share_quote(&self, id: &str) -> Result<ShareLink, MutationError> {
        let link = self
            .backend
            .share_quote(id)
            .await
            .map_err(|e| MutationError::new("share quote", e))?;
        self.confirmed(SyncKind::QuoteUpdated, Some(id));
        Ok(link)
    }

    #[instrument(skip_all)]
    pub async fn create_client(&self, data: &ClientInput) -> Result<Client, MutationError> {
        let client = self
            .backend
            .create_client(data)
            .await
            .map_err(|e| MutationError::new("create client", e))?;
        self.confirmed(SyncKind::ClientCreated, Some(&client.id));
        Ok(client)
    }

    #[instrument(skip(self, data))]
    pub async fn update_client(&self, id: &str, data: &ClientInput) -> Result<Client, MutationError> {
        let client = self
            .backend
            .update_client(id, data)
            .await
            .map_err(|e| MutationError::new("update client", e))?;
        self.confirmed(SyncKind::ClientUpdated, Some(id));
        Ok(client)
    }

    #[instrument(skip(self))]
    pub async fn delete_client(&self, id: &str) -> Result<(), MutationError> {
        self.backend
            .delete_client(id)
            .await
            .map_err(|e| MutationError::new("delete client", e))?;
        self.confirmed(SyncKind::ClientDeleted, Some(id));
        Ok(())
    }

    /// Re-fetch everything here and in every other tab.
    pub fn refresh_all(&self) {
        self.confirmed(SyncKind::RefreshAll, None);
    }

    /// A quote changed outside any tab (external signer); resync list views.
    pub fn quote_changed_externally(&self, quote: &Quote) {
        self.stores
            .quote_lists
            .mutate_where(|k| k.starts_with(keys::QUOTES_PREFIX));
        self.stores.quotes.mutate(&keys::quote(&quote.id));
        self.stores.dashboard.mutate(keys::DASHBOARD);
    }

    pub fn focus_regained(&self) -> usize {
        self.stores.focus_regained()
    }

    /// Release the bus subscription and stop every refresh timer.
    pub fn shutdown(&self) {
        let Some(sub) = self.subscription.lock().unwrap_or_else(|p| p.into_inner()).take() else {
            return;
        };
        sub.unsubscribe();
        let refreshers: Vec<TaskHandle> = self
            .refreshers
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .drain(..)
            .collect();
        for handle in refreshers {
            handle.cancel();
        }
        info!("session shut down");
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.shutdown();
    }
}
