//! User-facing, dismissible, auto-expiring alerts.
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::detector::{Noteworthy, Transition};
use crate::model::QuoteStatus;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlertLevel {
    Success,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AlertAction {
    /// Open the quote detail view; only ever followed on user request.
    ViewQuote { quote_id: String },
}

impl AlertAction {
    pub fn label(&self) -> &'static str {
        match self {
            AlertAction::ViewQuote { .. } => "View",
        }
    }

    pub fn route(&self) -> String {
        match self {
            AlertAction::ViewQuote { quote_id } => format!("/quotes/{}", quote_id),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Alert {
    pub id: u64,
    pub level: AlertLevel,
    pub title: String,
    pub description: Option<String>,
    pub action: Option<AlertAction>,
    pub expires_at: Instant,
}

/// Where alerts are rendered.
pub trait AlertSink: Send + Sync {
    fn show(&self, alert: &Alert);
    fn hide(&self, _id: u64) {}
}

/// Renders alerts as log lines.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

impl AlertSink for LogSink {
    fn show(&self, alert: &Alert) {
        let description = alert.description.as_deref().unwrap_or("");
        let action = alert.action.as_ref().map(|a| a.route());
        match alert.level {
            AlertLevel::Success => info!(id = alert.id, ?action, "{} {}", alert.title, description),
            AlertLevel::Error => warn!(id = alert.id, ?action, "{} {}", alert.title, description),
        }
    }
}

struct Inner {
    alerts: Mutex<Vec<Alert>>,
    /// Transitions already announced, until their alert would have expired.
    announced: Mutex<HashMap<(String, QuoteStatus), Instant>>,
    next_id: AtomicU64,
    sink: Arc<dyn AlertSink>,
    duration: Duration,
}

#[derive(Clone)]
pub struct Notifier {
    inner: Arc<Inner>,
}

impl Notifier {
    pub fn new(sink: Arc<dyn AlertSink>, duration: Duration) -> Self {
        Self {
            inner: Arc::new(Inner {
                alerts: Mutex::new(Vec::new()),
                announced: Mutex::new(HashMap::new()),
                next_id: AtomicU64::new(1),
                sink,
                duration,
            }),
        }
    }

    fn alerts(&self) -> MutexGuard<'_, Vec<Alert>> {
        lock(&self.inner.alerts)
    }

    pub fn push(
        &self,
        level: AlertLevel,
        title: impl Into<String>,
        description: Option<String>,
        action: Option<AlertAction>,
    ) -> u64 {
        let alert = Alert {
            id: self.inner.next_id.fetch_add(1, Ordering::Relaxed),
            level,
            title: title.into(),
            description,
            action,
            expires_at: Instant::now() + self.inner.duration,
        };
        self.inner.sink.show(&alert);
        let (id, expires_at) = (alert.id, alert.expires_at);
        self.alerts().push(alert);
        self.schedule_expiry(expires_at);
        id
    }

    /// Hide the alert once it expires. The timer holds no strong reference,
    /// so it does nothing after the notifier is gone.
    fn schedule_expiry(&self, at: Instant) {
        let Ok(runtime) = Handle::try_current() else {
            debug!("no runtime; alerts expire on the next prune");
            return;
        };
        let inner: Weak<Inner> = Arc::downgrade(&self.inner);
        runtime.spawn(async move {
            tokio::time::sleep_until(at).await;
            if let Some(inner) = inner.upgrade() {
                Notifier { inner }.prune_expired();
            }
        });
    }

    /// One alert per transition. A transition already announced while its
    /// alert is still live is dropped and `None` returned.
    pub fn transition(&self, t: &Transition) -> Option<u64> {
        let now = Instant::now();
        {
            let mut announced = lock(&self.inner.announced);
            let key = (t.quote.id.clone(), t.to);
            if announced.get(&key).map_or(false, |until| *until > now) {
                debug!(quote = %t.quote.id, to = t.to.as_str(), "transition already announced");
                return None;
            }
            announced.insert(key, now + self.inner.duration);
        }

        let number = &t.quote.quote_number;
        let id = match t.kind {
            Noteworthy::Signed => self.push(
                AlertLevel::Success,
                format!("Quote {} was signed!", number),
                Some(format!(
                    "By {}",
                    t.quote.signer_name.as_deref().unwrap_or("the client")
                )),
                Some(AlertAction::ViewQuote {
                    quote_id: t.quote.id.clone(),
                }),
            ),
            Noteworthy::Accepted => self.push(
                AlertLevel::Success,
                format!("Quote {} was accepted!", number),
                None,
                Some(AlertAction::ViewQuote {
                    quote_id: t.quote.id.clone(),
                }),
            ),
            Noteworthy::Rejected => self.push(
                AlertLevel::Error,
                format!("Quote {} was rejected.", number),
                Some("Open the quote for details.".to_string()),
                None,
            ),
        };
        Some(id)
    }

    pub fn error(&self, message: impl Into<String>) -> u64 {
        self.push(AlertLevel::Error, message, None, None)
    }

    pub fn dismiss(&self, id: u64) -> bool {
        let removed = {
            let mut alerts = self.alerts();
            let before = alerts.len();
            alerts.retain(|a| a.id != id);
            alerts.len() != before
        };
        if removed {
            self.inner.sink.hide(id);
        }
        removed
    }

    /// Follow an alert's action. Returns the route to navigate to.
    pub fn activate(&self, id: u64) -> Option<String> {
        let route = self
            .alerts()
            .iter()
            .find(|a| a.id == id)
            .and_then(|a| a.action.as_ref())
            .map(AlertAction::route)?;
        self.dismiss(id);
        Some(route)
    }

    pub fn prune_expired(&self) -> usize {
        let now = Instant::now();
        lock(&self.inner.announced).retain(|_, until| *until > now);
        let expired: Vec<u64> = {
            let mut alerts = self.alerts();
            let ids = alerts
                .iter()
                .filter(|a| a.expires_at <= now)
                .map(|a| a.id)
                .collect();
            alerts.retain(|a| a.expires_at > now);
            ids
        };
        for id in &expired {
            self.inner.sink.hide(*id);
        }
        expired.len()
    }

    /// Alerts still on screen.
    pub fn active(&self) -> Vec<Alert> {
        self.prune_expired();
        self.alerts().clone()
    }
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|p| p.into_inner())
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::detector::tests::quote;

    #[derive(Default)]
    pub(crate) struct RecordingSink {
        pub shown: Mutex<Vec<Alert>>,
        pub hidden: Mutex<Vec<u64>>,
    }

    impl AlertSink for RecordingSink {
        fn show(&self, alert: &Alert) {
            self.shown.lock().unwrap().push(alert.clone());
        }

        fn hide(&self, id: u64) {
            self.hidden.lock().unwrap().push(id);
        }
    }

    fn transition(kind: Noteworthy, to: QuoteStatus) -> Transition {
        let mut q = quote("1", to);
        q.signer_name = Some("Alice".into());
        Transition {
            quote: q,
            from: QuoteStatus::Sent,
            to,
            kind,
        }
    }

    fn notifier() -> (Arc<RecordingSink>, Notifier) {
        let sink = Arc::new(RecordingSink::default());
        let notifier = Notifier::new(sink.clone(), Duration::from_secs(8));
        (sink, notifier)
    }

    #[tokio::test(start_paused = true)]
    async fn signed_alert_is_success_with_view_action() {
        let (sink, notifier) = notifier();
        notifier.transition(&transition(Noteworthy::Signed, QuoteStatus::Signed));
        let shown = sink.shown.lock().unwrap();
        assert_eq!(shown.len(), 1);
        assert_eq!(shown[0].level, AlertLevel::Success);
        assert_eq!(shown[0].title, "Quote Q-1 was signed!");
        assert_eq!(shown[0].description.as_deref(), Some("By Alice"));
        assert_eq!(shown[0].action.as_ref().map(|a| a.label()), Some("View"));
    }

    #[tokio::test(start_paused = true)]
    async fn rejected_alert_is_error_without_action() {
        let (_, notifier) = notifier();
        let id = notifier
            .transition(&transition(Noteworthy::Rejected, QuoteStatus::Rejected))
            .unwrap();
        let alert = notifier.active().into_iter().find(|a| a.id == id).unwrap();
        assert_eq!(alert.level, AlertLevel::Error);
        assert!(alert.action.is_none());
        assert_eq!(notifier.activate(id), None);
    }

    #[tokio::test(start_paused = true)]
    async fn activate_returns_route_and_dismisses() {
        let (sink, notifier) = notifier();
        let id = notifier
            .transition(&transition(Noteworthy::Accepted, QuoteStatus::Accepted))
            .unwrap();
        assert_eq!(notifier.activate(id).as_deref(), Some("/quotes/1"));
        assert!(notifier.active().is_empty());
        assert_eq!(*sink.hidden.lock().unwrap(), vec![id]);
    }

    #[tokio::test(start_paused = true)]
    async fn alerts_expire() {
        let (_, notifier) = notifier();
        notifier.error("failed to delete quote");
        assert_eq!(notifier.active().len(), 1);
        tokio::time::advance(Duration::from_secs(9)).await;
        assert!(notifier.active().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn dismiss_unknown_is_false() {
        let (_, notifier) = notifier();
        let id = notifier.error("boom");
        assert!(notifier.dismiss(id));
        assert!(!notifier.dismiss(id));
    }

    #[tokio::test(start_paused = true)]
    async fn expired_alerts_are_hidden_without_being_read() {
        let (sink, notifier) = notifier();
        let ids: Vec<u64> = (0..100).map(|i| notifier.error(format!("failure {}", i))).collect();
        tokio::time::sleep(Duration::from_secs(9)).await;
        assert_eq!(*sink.hidden.lock().unwrap(), ids);
        assert!(notifier.alerts().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn repeated_transition_is_announced_once() {
        let (sink, notifier) = notifier();
        let signed = transition(Noteworthy::Signed, QuoteStatus::Signed);
        assert!(notifier.transition(&signed).is_some());
        assert!(notifier.transition(&signed).is_none());
        assert!(notifier
            .transition(&transition(Noteworthy::Rejected, QuoteStatus::Rejected))
            .is_some());
        assert_eq!(sink.shown.lock().unwrap().len(), 2);

        tokio::time::sleep(Duration::from_secs(9)).await;
        assert!(notifier.transition(&signed).is_some());
        assert_eq!(sink.shown.lock().unwrap().len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn dismissed_alert_is_not_hidden_twice() {
        let (sink, notifier) = notifier();
        let id = notifier.error("boom");
        assert!(notifier.dismiss(id));
        tokio::time::sleep(Duration::from_secs(9)).await;
        assert_eq!(*sink.hidden.lock().unwrap(), vec![id]);
    }
}
