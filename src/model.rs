use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum QuoteStatus {
    Draft,
    Sent,
    Signed,
    Accepted,
    Rejected,
}

impl QuoteStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            QuoteStatus::Draft => "Draft",
            QuoteStatus::Sent => "Sent",
            QuoteStatus::Signed => "Signed",
            QuoteStatus::Accepted => "Accepted",
            QuoteStatus::Rejected => "Rejected",
        }
    }

    /// Status in which an external signer may change the quote.
    pub fn awaits_external_action(&self) -> bool {
        matches!(self, QuoteStatus::Sent)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
pub enum Currency {
    #[default]
    EUR,
    USD,
    GBP,
    CHF,
    CAD,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QuoteItem {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub description: String,
    #[serde(with = "rust_decimal::serde::float")]
    pub quantity: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub unit_price: Decimal,
    #[serde(default, with = "rust_decimal::serde::float_option", skip_serializing_if = "Option::is_none")]
    pub total: Option<Decimal>,
    #[serde(default)]
    pub order: i32,
}

impl QuoteItem {
    pub fn line_total(&self) -> Decimal {
        self.total.unwrap_or(self.quantity * self.unit_price)
    }
}

/// A quote as observed by the sync core. `client_id` is a weak reference.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Quote {
    pub id: String,
    pub quote_number: String,
    pub client_id: String,
    pub status: QuoteStatus,
    pub currency: Currency,
    #[serde(with = "rust_decimal::serde::float")]
    pub subtotal: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub tax_rate: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub tax_amount: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub total: Decimal,
    #[serde(default)]
    pub items: Vec<QuoteItem>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub payment_terms: Option<String>,
    #[serde(default)]
    pub signer_name: Option<String>,
    #[serde(default)]
    pub signed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QuotePage {
    pub quotes: Vec<Quote>,
    pub total: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NewQuote {
    pub client_id: String,
    pub currency: Currency,
    #[serde(with = "rust_decimal::serde::float")]
    pub tax_rate: Decimal,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payment_terms: Option<String>,
    pub items: Vec<QuoteItem>,
}

/// Partial update; absent fields are left untouched by the backend.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct UpdateQuote {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub currency: Option<Currency>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<QuoteStatus>,
    #[serde(default, with = "rust_decimal::serde::float_option", skip_serializing_if = "Option::is_none")]
    pub tax_rate: Option<Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payment_terms: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub items: Option<Vec<QuoteItem>>,
}

impl UpdateQuote {
    pub fn status(status: QuoteStatus) -> Self {
        Self {
            status: Some(status),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ShareLink {
    pub share_url: String,
}

/// Body posted by the external signer on the public surface.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SignRequest {
    pub signer_name: String,
    pub signature: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Client {
    pub id: String,
    pub name: String,
    pub email: String,
    #[serde(default)]
    pub company: Option<String>,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub vat_number: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ClientPage {
    pub clients: Vec<Client>,
    pub total: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct ClientInput {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub company: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vat_number: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StatusCount {
    pub status: String,
    pub count: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CurrencyTotal {
    pub currency: String,
    #[serde(with = "rust_decimal::serde::float")]
    pub total: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RecentQuote {
    pub id: String,
    pub quote_number: String,
    pub status: String,
    pub currency: String,
    #[serde(with = "rust_decimal::serde::float")]
    pub total: Decimal,
    pub created_at: DateTime<Utc>,
    pub client_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MonthlyRevenue {
    pub name: String,
    #[serde(with = "rust_decimal::serde::float")]
    pub total: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct FiscalRevenue {
    #[serde(with = "rust_decimal::serde::float")]
    pub year_to_date: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub quarter_to_date: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub current_year: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub current_quarter: Decimal,
}

/// Aggregates shown by the dashboard.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct DashboardMetrics {
    pub total_quotes: u64,
    pub total_clients: u64,
    #[serde(default)]
    pub quotes_by_status: Vec<StatusCount>,
    #[serde(default)]
    pub totals_by_currency: Vec<CurrencyTotal>,
    #[serde(default)]
    pub recent_quotes: Vec<RecentQuote>,
    #[serde(default)]
    pub monthly_revenue: Vec<MonthlyRevenue>,
    #[serde(default)]
    pub fiscal_revenue: FiscalRevenue,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn quote_parses_backend_payload() {
        let raw = json!({
            "id": "q1",
            "quote_number": "Q-2024-001",
            "user_id": "u1",
            "client_id": "c1",
            "status": "Signed",
            "currency": "EUR",
            "subtotal": 100.0,
            "tax_rate": 20.0,
            "tax_amount": 20.0,
            "total": 120.0,
            "items": [
                {"description": "Audit", "quantity": 2, "unit_price": 50.0, "total": 100.0, "order": 0}
            ],
            "signer_name": "Alice",
            "signed_at": "2024-03-01T10:00:00Z",
            "created_at": "2024-02-01T10:00:00Z",
            "updated_at": "2024-03-01T10:00:00Z"
        });
        let quote: Quote = serde_json::from_value(raw).unwrap();
        assert_eq!(quote.status, QuoteStatus::Signed);
        assert_eq!(quote.total, Decimal::new(120, 0));
        assert_eq!(quote.items[0].line_total(), Decimal::new(100, 0));
        assert_eq!(quote.signer_name.as_deref(), Some("Alice"));
    }

    #[test]
    fn update_quote_serializes_only_present_fields() {
        let body = serde_json::to_value(UpdateQuote::status(QuoteStatus::Accepted)).unwrap();
        assert_eq!(body, json!({"status": "Accepted"}));
    }

    #[test]
    fn line_total_falls_back_to_product() {
        let item = QuoteItem {
            id: None,
            description: "Design".into(),
            quantity: Decimal::new(3, 0),
            unit_price: Decimal::new(1250, 2),
            total: None,
            order: 1,
        };
        assert_eq!(item.line_total(), Decimal::new(3750, 2));
    }

    #[test]
    fn only_sent_awaits_external_action() {
        assert!(QuoteStatus::Sent.awaits_external_action());
        for status in [QuoteStatus::Draft, QuoteStatus::Signed, QuoteStatus::Accepted, QuoteStatus::Rejected] {
            assert!(!status.awaits_external_action());
        }
    }
}
