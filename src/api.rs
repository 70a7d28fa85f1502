use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, CACHE_CONTROL, PRAGMA};
use reqwest::{Client as HttpClient, Method, RequestBuilder, Url};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt;
use tracing::{debug, instrument};

use crate::config::Config;
use crate::error::ApiError;
use crate::model::{
    Client, ClientInput, ClientPage, DashboardMetrics, NewQuote, Quote, QuotePage, ShareLink,
    SignRequest, UpdateQuote,
};

pub const DEFAULT_API_BASE: &str = "http://localhost:8000/";

/// Typed requests against the quote backend.
///
/// Everything except the `public_*`/`sign_quote` calls carries the bearer token.
#[async_trait]
pub trait Backend: Send + Sync {
    async fn list_quotes(&self, page: u32, limit: u32, search: Option<&str>) -> Result<QuotePage, ApiError>;
    async fn get_quote(&self, id: &str) -> Result<Quote, ApiError>;
    /// Like `get_quote` but defeats intermediate caches.
    async fn get_quote_fresh(&self, id: &str) -> Result<Quote, ApiError>;
    async fn create_quote(&self, data: &NewQuote) -> Result<Quote, ApiError>;
    async fn update_quote(&self, id: &str, data: &UpdateQuote) -> Result<Quote, ApiError>;
    async fn delete_quote(&self, id: &str) -> Result<(), ApiError>;
    async fn share_quote(&self, id: &str) -> Result<ShareLink, ApiError>;

    async fn list_clients(&self, search: Option<&str>, page: u32, limit: u32) -> Result<ClientPage, ApiError>;
    async fn get_client(&self, id: &str) -> Result<Client, ApiError>;
    async fn create_client(&self, data: &ClientInput) -> Result<Client, ApiError>;
    async fn update_client(&self, id: &str, data: &ClientInput) -> Result<Client, ApiError>;
    async fn delete_client(&self, id: &str) -> Result<(), ApiError>;

    async fn dashboard_metrics(&self) -> Result<DashboardMetrics, ApiError>;

    async fn public_quote(&self, token: &str) -> Result<Quote, ApiError>;
    async fn sign_quote(&self, token: &str, data: &SignRequest) -> Result<Quote, ApiError>;
}

#[derive(Clone)]
pub struct ApiClient {
    http: HttpClient,
    base_url: Url,
    token: Option<String>,
}

impl fmt::Debug for ApiClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiClient")
            .field("base_url", &self.base_url)
            .field("authenticated", &self.token.is_some())
            .finish_non_exhaustive()
    }
}

impl ApiClient {
    pub fn new(base_url: Url, token: Option<String>) -> Result<Self, ApiError> {
        let http = HttpClient::builder()
            .user_agent("devis-sync/0.1")
            .no_proxy()
            .build()
            .map_err(ApiError::Transport)?;
        Ok(Self {
            http,
            base_url: normalize_base(base_url),
            token,
        })
    }

    pub fn from_config(cfg: &Config) -> Result<Self, ApiError> {
        let base_url = Url::parse(&cfg.api.base_url)
            .map_err(|e| ApiError::InvalidUrl(format!("{}: {}", cfg.api.base_url, e)))?;
        Self::new(base_url, cfg.resolved_token())
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn endpoint(&self, path: &str) -> Result<Url, ApiError> {
        self.base_url
            .join(path.trim_start_matches('/'))
            .map_err(|e| ApiError::InvalidUrl(format!("{}: {}", path, e)))
    }

    /// Build an authenticated request; fails before any I/O without a token.
    pub fn authed(&self, method: Method, url: Url) -> Result<RequestBuilder, ApiError> {
        let token = self.token.as_deref().ok_or(ApiError::Unauthorized)?;
        Ok(self
            .http
            .request(method, url)
            .header(AUTHORIZATION, format!("Bearer {}", token)))
    }

    pub fn quote_list_url(&self, page: u32, limit: u32, search: Option<&str>) -> Result<Url, ApiError> {
        let mut url = self.endpoint("api/quotes")?;
        {
            let mut q = url.query_pairs_mut();
            q.append_pair("page", &page.to_string());
            q.append_pair("limit", &limit.to_string());
            if let Some(search) = search.filter(|s| !s.is_empty()) {
                q.append_pair("search", search);
            }
        }
        Ok(url)
    }

    pub fn fresh_quote_url(&self, id: &str) -> Result<Url, ApiError> {
        let mut url = self.endpoint(&format!("api/quotes/{}", id))?;
        url.query_pairs_mut()
            .append_pair("_t", &chrono::Utc::now().timestamp_millis().to_string());
        Ok(url)
    }

    async fn send<T: DeserializeOwned>(&self, req: RequestBuilder) -> Result<T, ApiError> {
        let res = self.execute(req).await?;
        res.json::<T>().await.map_err(|e| ApiError::Decode(e.to_string()))
    }

    async fn send_empty(&self, req: RequestBuilder) -> Result<(), ApiError> {
        self.execute(req).await.map(|_| ())
    }

    async fn execute(&self, req: RequestBuilder) -> Result<reqwest::Response, ApiError> {
        let request = req.build()?;
        debug!(method=%request.method(), url=%request.url(), "sending backend request");
        let res = self.http.execute(request).await.map_err(ApiError::Transport)?;
        let status = res.status();
        if !status.is_success() {
            let body = res.text().await.unwrap_or_default();
            return Err(ApiError::from_status(status, body));
        }
        Ok(res)
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        let req = self.authed(Method::GET, self.endpoint(path)?)?;
        self.send(req).await
    }

    async fn write_json<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: &B,
    ) -> Result<T, ApiError> {
        let req = self.authed(method, self.endpoint(path)?)?.json(body);
        self.send(req).await
    }
}

#[async_trait]
impl Backend for ApiClient {
    #[instrument(skip(self))]
    async fn list_quotes(&self, page: u32, limit: u32, search: Option<&str>) -> Result<QuotePage, ApiError> {
        let req = self.authed(Method::GET, self.quote_list_url(page, limit, search)?)?;
        self.send(req).await
    }

    async fn get_quote(&self, id: &str) -> Result<Quote, ApiError> {
        self.get_json(&format!("api/quotes/{}", id)).await
    }

    async fn get_quote_fresh(&self, id: &str) -> Result<Quote, ApiError> {
        let req = self
            .authed(Method::GET, self.fresh_quote_url(id)?)?
            .header(CACHE_CONTROL, "no-store")
            .header(PRAGMA, "no-cache");
        self.send(req).await
    }

    async fn create_quote(&self, data: &NewQuote) -> Result<Quote, ApiError> {
        self.write_json(Method::POST, "api/quotes", data).await
    }

    async fn update_quote(&self, id: &str, data: &UpdateQuote) -> Result<Quote, ApiError> {
        self.write_json(Method::PUT, &format!("api/quotes/{}", id), data).await
    }

    async fn delete_quote(&self, id: &str) -> Result<(), ApiError> {
        let req = self.authed(Method::DELETE, self.endpoint(&format!("api/quotes/{}", id))?)?;
        self.send_empty(req).await
    }

    async fn share_quote(&self, id: &str) -> Result<ShareLink, ApiError> {
        let req = self.authed(Method::POST, self.endpoint(&format!("api/quotes/{}/share", id))?)?;
        self.send(req).await
    }

    async fn list_clients(&self, search: Option<&str>, page: u32, limit: u32) -> Result<ClientPage, ApiError> {
        let mut url = self.endpoint("api/clients")?;
        {
            let mut q = url.query_pairs_mut();
            if let Some(search) = search.filter(|s| !s.is_empty()) {
                q.append_pair("search", search);
            }
            q.append_pair("page", &page.to_string());
            q.append_pair("limit", &limit.to_string());
        }
        let req = self.authed(Method::GET, url)?;
        self.send(req).await
    }

    async fn get_client(&self, id: &str) -> Result<Client, ApiError> {
        self.get_json(&format!("api/clients/{}", id)).await
    }

    async fn create_client(&self, data: &ClientInput) -> Result<Client, ApiError> {
        self.write_json(Method::POST, "api/clients", data).await
    }

    async fn update_client(&self, id: &str, data: &ClientInput) -> Result<Client, ApiError> {
        self.write_json(Method::PUT, &format!("api/clients/{}", id), data).await
    }

    async fn delete_client(&self, id: &str) -> Result<(), ApiError> {
        let req = self.authed(Method::DELETE, self.endpoint(&format!("api/clients/{}", id))?)?;
        self.send_empty(req).await
    }

    async fn dashboard_metrics(&self) -> Result<DashboardMetrics, ApiError> {
        self.get_json("api/dashboard/metrics").await
    }

    async fn public_quote(&self, token: &str) -> Result<Quote, ApiError> {
        let req = self
            .http
            .get(self.endpoint(&format!("api/public/quotes/{}", token))?);
        self.send(req).await
    }

    async fn sign_quote(&self, token: &str, data: &SignRequest) -> Result<Quote, ApiError> {
        let req = self
            .http
            .post(self.endpoint(&format!("api/public/quotes/{}/sign", token))?)
            .json(data);
        self.send(req).await
    }
}

/// `Url::join` drops the last segment unless the base ends with '/'.
fn normalize_base(mut url: Url) -> Url {
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    url
}
