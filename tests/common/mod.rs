#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use reqwest::StatusCode;
use rust_decimal::Decimal;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use tokio::sync::Mutex;

use devis_sync::api::Backend;
use devis_sync::config::SyncSettings;
use devis_sync::error::ApiError;
use devis_sync::model::{
    Client, ClientInput, ClientPage, Currency, DashboardMetrics, NewQuote, Quote, QuotePage,
    QuoteStatus, ShareLink, SignRequest, UpdateQuote,
};
use devis_sync::notifier::{Alert, AlertSink};

pub fn quote(id: &str, status: QuoteStatus) -> Quote {
    let at = Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap();
    Quote {
        id: id.into(),
        quote_number: format!("Q-{}", id),
        client_id: "c1".into(),
        status,
        currency: Currency::EUR,
        subtotal: Decimal::new(100, 0),
        tax_rate: Decimal::new(20, 0),
        tax_amount: Decimal::new(20, 0),
        total: Decimal::new(120, 0),
        items: Vec::new(),
        notes: None,
        payment_terms: None,
        signer_name: None,
        signed_at: None,
        created_at: at,
        updated_at: at,
    }
}

pub fn new_quote() -> NewQuote {
    NewQuote {
        client_id: "c1".into(),
        currency: Currency::EUR,
        tax_rate: Decimal::new(20, 0),
        notes: None,
        payment_terms: None,
        items: Vec::new(),
    }
}

pub fn settings() -> SyncSettings {
    SyncSettings::default()
}

fn server_error() -> ApiError {
    ApiError::Status {
        status: StatusCode::INTERNAL_SERVER_ERROR,
        body: "boom".into(),
    }
}

/// In-memory backend recording every call.
#[derive(Clone, Default)]
pub struct FakeBackend {
    quotes: Arc<Mutex<Vec<Quote>>>,
    clients: Arc<Mutex<Vec<Client>>>,
    calls: Arc<Mutex<Vec<String>>>,
    fail_reads: Arc<AtomicBool>,
    fail_mutations: Arc<AtomicBool>,
}

impl FakeBackend {
    pub fn with_quotes(quotes: Vec<Quote>) -> Self {
        Self {
            quotes: Arc::new(Mutex::new(quotes)),
            ..Default::default()
        }
    }

    pub fn fail_reads(&self, on: bool) {
        self.fail_reads.store(on, Ordering::SeqCst);
    }

    pub fn fail_mutations(&self, on: bool) {
        self.fail_mutations.store(on, Ordering::SeqCst);
    }

    /// Change a quote behind every tab's back.
    pub async fn set_status(&self, id: &str, status: QuoteStatus) {
        let mut quotes = self.quotes.lock().await;
        if let Some(q) = quotes.iter_mut().find(|q| q.id == id) {
            q.status = status;
        }
    }

    pub async fn count(&self, call: &str) -> usize {
        self.calls.lock().await.iter().filter(|c| c.as_str() == call).count()
    }

    async fn record(&self, call: String) {
        self.calls.lock().await.push(call);
    }

    fn read_guard(&self) -> Result<(), ApiError> {
        if self.fail_reads.load(Ordering::SeqCst) {
            Err(server_error())
        } else {
            Ok(())
        }
    }

    fn mutation_guard(&self) -> Result<(), ApiError> {
        if self.fail_mutations.load(Ordering::SeqCst) {
            Err(server_error())
        } else {
            Ok(())
        }
    }

    async fn find(&self, id: &str) -> Result<Quote, ApiError> {
        self.quotes
            .lock()
            .await
            .iter()
            .find(|q| q.id == id)
            .cloned()
            .ok_or_else(|| ApiError::Status {
                status: StatusCode::NOT_FOUND,
                body: "Quote not found".into(),
            })
    }
}

#[async_trait]
impl Backend for FakeBackend {
    async fn list_quotes(&self, page: u32, limit: u32, _search: Option<&str>) -> Result<QuotePage, ApiError> {
        self.record("list_quotes".into()).await;
        self.read_guard()?;
        let quotes = self.quotes.lock().await;
        let skip = ((page.max(1) - 1) * limit) as usize;
        Ok(QuotePage {
            quotes: quotes.iter().skip(skip).take(limit as usize).cloned().collect(),
            total: quotes.len() as u64,
        })
    }

    async fn get_quote(&self, id: &str) -> Result<Quote, ApiError> {
        self.record(format!("get_quote:{}", id)).await;
        self.read_guard()?;
        self.find(id).await
    }

    async fn get_quote_fresh(&self, id: &str) -> Result<Quote, ApiError> {
        self.record(format!("get_quote_fresh:{}", id)).await;
        self.read_guard()?;
        self.find(id).await
    }

    async fn create_quote(&self, data: &NewQuote) -> Result<Quote, ApiError> {
        self.record("create_quote".into()).await;
        self.mutation_guard()?;
        let mut quotes = self.quotes.lock().await;
        let mut q = quote(&format!("n{}", quotes.len() + 1), QuoteStatus::Draft);
        q.client_id = data.client_id.clone();
        q.currency = data.currency;
        q.tax_rate = data.tax_rate;
        quotes.push(q.clone());
        Ok(q)
    }

    async fn update_quote(&self, id: &str, data: &UpdateQuote) -> Result<Quote, ApiError> {
        self.record(format!("update_quote:{}", id)).await;
        self.mutation_guard()?;
        if let Some(status) = data.status {
            self.set_status(id, status).await;
        }
        self.find(id).await
    }

    async fn delete_quote(&self, id: &str) -> Result<(), ApiError> {
        self.record(format!("delete_quote:{}", id)).await;
        self.mutation_guard()?;
        self.quotes.lock().await.retain(|q| q.id != id);
        Ok(())
    }

    async fn share_quote(&self, id: &str) -> Result<ShareLink, ApiError> {
        self.record(format!("share_quote:{}", id)).await;
        self.mutation_guard()?;
        self.set_status(id, QuoteStatus::Sent).await;
        Ok(ShareLink {
            share_url: format!("http://localhost:3000/sign/{}", id),
        })
    }

    async fn list_clients(&self, _search: Option<&str>, _page: u32, _limit: u32) -> Result<ClientPage, ApiError> {
        self.record("list_clients".into()).await;
        self.read_guard()?;
        let clients = self.clients.lock().await.clone();
        let total = clients.len() as u64;
        Ok(ClientPage { clients, total })
    }

    async fn get_client(&self, id: &str) -> Result<Client, ApiError> {
        self.record(format!("get_client:{}", id)).await;
        self.read_guard()?;
        self.clients
            .lock()
            .await
            .iter()
            .find(|c| c.id == id)
            .cloned()
            .ok_or_else(|| ApiError::Status {
                status: StatusCode::NOT_FOUND,
                body: "Client not found".into(),
            })
    }

    async fn create_client(&self, data: &ClientInput) -> Result<Client, ApiError> {
        self.record("create_client".into()).await;
        self.mutation_guard()?;
        let mut clients = self.clients.lock().await;
        let at = Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap();
        let client = Client {
            id: format!("c{}", clients.len() + 1),
            name: data.name.clone().unwrap_or_default(),
            email: data.email.clone().unwrap_or_default(),
            company: data.company.clone(),
            address: data.address.clone(),
            phone: data.phone.clone(),
            vat_number: data.vat_number.clone(),
            created_at: at,
            updated_at: at,
        };
        clients.push(client.clone());
        Ok(client)
    }

    async fn update_client(&self, id: &str, data: &ClientInput) -> Result<Client, ApiError> {
        self.record(format!("update_client:{}", id)).await;
        self.mutation_guard()?;
        let mut clients = self.clients.lock().await;
        let client = clients
            .iter_mut()
            .find(|c| c.id == id)
            .ok_or_else(server_error)?;
        if let Some(name) = &data.name {
            client.name = name.clone();
        }
        Ok(client.clone())
    }

    async fn delete_client(&self, id: &str) -> Result<(), ApiError> {
        self.record(format!("delete_client:{}", id)).await;
        self.mutation_guard()?;
        self.clients.lock().await.retain(|c| c.id != id);
        Ok(())
    }

    async fn dashboard_metrics(&self) -> Result<DashboardMetrics, ApiError> {
        self.record("dashboard_metrics".into()).await;
        self.read_guard()?;
        Ok(DashboardMetrics {
            total_quotes: self.quotes.lock().await.len() as u64,
            total_clients: self.clients.lock().await.len() as u64,
            ..Default::default()
        })
    }

    async fn public_quote(&self, token: &str) -> Result<Quote, ApiError> {
        self.record(format!("public_quote:{}", token)).await;
        self.find(token).await
    }

    async fn sign_quote(&self, token: &str, data: &SignRequest) -> Result<Quote, ApiError> {
        self.record(format!("sign_quote:{}", token)).await;
        let mut quotes = self.quotes.lock().await;
        let q = quotes
            .iter_mut()
            .find(|q| q.id == token)
            .ok_or_else(server_error)?;
        q.status = QuoteStatus::Signed;
        q.signer_name = Some(data.signer_name.clone());
        q.signed_at = Some(Utc::now());
        Ok(q.clone())
    }
}

#[derive(Default)]
pub struct RecordingSink {
    shown: StdMutex<Vec<Alert>>,
    hidden: StdMutex<Vec<u64>>,
}

impl RecordingSink {
    pub fn shown(&self) -> Vec<Alert> {
        self.shown.lock().unwrap().clone()
    }

    pub fn hidden(&self) -> Vec<u64> {
        self.hidden.lock().unwrap().clone()
    }
}

impl AlertSink for RecordingSink {
    fn show(&self, alert: &Alert) {
        self.shown.lock().unwrap().push(alert.clone());
    }

    fn hide(&self, id: u64) {
        self.hidden.lock().unwrap().push(id);
    }
}

pub fn sign_request(name: &str) -> SignRequest {
    SignRequest {
        signer_name: name.into(),
        signature: "data:image/png;base64,AAAA".into(),
    }
}
