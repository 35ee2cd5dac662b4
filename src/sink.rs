//! Where an accepted booking goes: the store, the owner's inbox, or both.

use std::fmt::Write as _;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{info, warn};

use crate::mailer::{EmailMessage, MailError, Mailer};
use crate::models::{Id, NewBooking};
use crate::repo::{BookingRepo, RepoError};
use crate::sites::SiteDirectory;

#[derive(thiserror::Error, Debug)]
pub enum SinkError {
    #[error(transparent)]
    Storage(#[from] RepoError),
    #[error(transparent)]
    Delivery(#[from] MailError),
}

/// Outcome of a successful `record`. `id` is only known when a row was written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Receipt {
    pub id: Option<Id>,
}

#[async_trait]
pub trait BookingSink: Send + Sync {
    async fn record(&self, booking: NewBooking) -> Result<Receipt, SinkError>;
}

pub struct StoreSink {
    repo: Arc<dyn BookingRepo>,
}

impl StoreSink {
    pub fn new(repo: Arc<dyn BookingRepo>) -> Self {
        Self { repo }
    }
}

#[async_trait]
impl BookingSink for StoreSink {
    async fn record(&self, booking: NewBooking) -> Result<Receipt, SinkError> {
        let site = booking.site.clone();
        let id = self.repo.insert(booking).await?;
        info!(id, site = %site, "booking stored");
        Ok(Receipt { id: Some(id) })
    }
}

/// Builds owner notifications. Recipients come from the site's profile,
/// falling back to the deployment-wide list.
#[derive(Clone)]
pub struct Notifier {
    mailer: Arc<dyn Mailer>,
    sites: Arc<SiteDirectory>,
    from: String,
    default_to: Vec<String>,
}

impl Notifier {
    pub fn new(mailer: Arc<dyn Mailer>, sites: Arc<SiteDirectory>, from: impl Into<String>, default_to: Vec<String>) -> Self {
        Self { mailer, sites, from: from.into(), default_to }
    }

    pub fn compose(&self, b: &NewBooking, id: Option<Id>) -> EmailMessage {
        let profile = self.sites.get(&b.site);
        let property = profile.map(|p| p.property_name.as_str()).unwrap_or(&b.site);
        let to = match profile {
            Some(p) if !p.notify_email.is_empty() => p.notify_email.clone(),
            _ => self.default_to.clone(),
        };

        let mut text = String::new();
        let _ = writeln!(text, "New booking request for {property}");
        if let Some(id) = id {
            let _ = writeln!(text, "Reference: #{id}");
        }
        let _ = writeln!(text);
        let _ = writeln!(text, "Name: {}", b.name);
        let _ = writeln!(text, "Email: {}", b.email);
        let _ = writeln!(text, "Phone: {}", b.phone.as_deref().unwrap_or("-"));
        let _ = writeln!(text, "Dates: {} to {}", b.start_date, b.end_date);
        if let Some(g) = &b.extras.guests {
            let _ = writeln!(text, "Guests: {}", display_value(g));
        }
        if let Some(f) = &b.extras.flexibility {
            let _ = writeln!(text, "Flexibility: {}", display_value(f));
        }
        let _ = writeln!(text, "Site: {}", b.site);
        if let Some(m) = &b.message {
            let _ = writeln!(text, "\nMessage:\n{m}");
        }
        if let Some(ip) = &b.ip {
            let _ = writeln!(text, "\nSubmitted from {ip}");
        }

        EmailMessage {
            from: self.from.clone(),
            to,
            reply_to: Some(b.email.clone()),
            subject: format!("Booking request: {property} ({} to {})", b.start_date, b.end_date),
            text,
        }
    }

    pub async fn notify(&self, b: &NewBooking, id: Option<Id>) -> Result<(), MailError> {
        self.mailer.send(&self.compose(b, id)).await
    }
}

fn display_value(v: &serde_json::Value) -> String {
    match v {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Email-only deployment: nothing is persisted.
pub struct MailSink {
    notifier: Notifier,
}

impl MailSink {
    pub fn new(notifier: Notifier) -> Self {
        Self { notifier }
    }
}

#[async_trait]
impl BookingSink for MailSink {
    async fn record(&self, booking: NewBooking) -> Result<Receipt, SinkError> {
        self.notifier.notify(&booking, None).await?;
        info!(site = %booking.site, "booking emailed");
        Ok(Receipt { id: None })
    }
}

/// Stores first, then notifies. Once the row exists the request has
/// succeeded, so a mail failure is only logged.
pub struct NotifyingStoreSink {
    repo: Arc<dyn BookingRepo>,
    notifier: Notifier,
}

impl NotifyingStoreSink {
    pub fn new(repo: Arc<dyn BookingRepo>, notifier: Notifier) -> Self {
        Self { repo, notifier }
    }
}

#[async_trait]
impl BookingSink for NotifyingStoreSink {
    async fn record(&self, booking: NewBooking) -> Result<Receipt, SinkError> {
        let id = self.repo.insert(booking.clone()).await?;
        info!(id, site = %booking.site, "booking stored");
        if let Err(e) = self.notifier.notify(&booking, Some(id)).await {
            warn!(id, error = %e, "booking stored but owner notification failed");
        }
        Ok(Receipt { id: Some(id) })
    }
}
