use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value; // opaque extras blob
use utoipa::{IntoParams, ToSchema};

pub type Id = i64;

/// Status every booking starts with.
pub const DEFAULT_STATUS: &str = "pending";
/// Soft-delete sentinel. Terminal: nothing moves a booking out of it.
pub const DELETED_STATUS: &str = "deleted";

pub const MAX_STATUS_LEN: usize = 32;
pub const MAX_MESSAGE_LEN: usize = 5000;

pub const DEFAULT_LIST_LIMIT: i64 = 50;
pub const MAX_LIST_LIMIT: i64 = 200;
pub const MAX_LIST_OFFSET: i64 = 10_000;

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Booking {
    pub id: Id,
    pub created_at: DateTime<Utc>,
    pub site: String,
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    pub start_date: String,
    pub end_date: String,
    pub message: Option<String>,
    pub status: String,
    #[schema(value_type = Object)]
    pub extras: Value,
}

impl Booking {
    pub fn is_deleted(&self) -> bool {
        self.status == DELETED_STATUS
    }
}

/// Canonical creation command produced by the request validator.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NewBooking {
    pub site: String,
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    pub start_date: String,
    pub end_date: String,
    pub message: Option<String>,
    pub extras: BookingExtras,
    pub ip: Option<String>, // provenance: written once, never returned
    pub user_agent: Option<String>,
}

/// Side payload kept verbatim; nothing queries these fields.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct BookingExtras {
    pub guests: Option<Value>,
    pub flexibility: Option<Value>,
    pub property: Option<Value>,
    pub honeypot: Option<Value>,
}

impl BookingExtras {
    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }

    pub fn honeypot_filled(&self) -> bool {
        self.honeypot.is_some()
    }
}

/// Admin partial update. Only these two fields are ever mutable.
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema, PartialEq)]
pub struct BookingPatch {
    pub status: Option<String>,
    pub message: Option<String>,
}

impl BookingPatch {
    pub fn is_empty(&self) -> bool {
        self.status.is_none() && self.message.is_none()
    }
}

/// Raw list query string as received; see [`ListQuery::from_params`].
#[derive(Debug, Default, Deserialize, IntoParams)]
#[serde(rename_all = "camelCase")]
#[into_params(parameter_in = Query)]
pub struct ListParams {
    /// 1..=200, default 50
    pub limit: Option<String>,
    /// 0..=10000, default 0
    pub offset: Option<String>,
    pub site: Option<String>,
    /// `true` to include soft-deleted bookings
    pub include_deleted: Option<String>,
}

impl ListParams {
    /// Builds params from decoded query pairs. Unknown keys are ignored and
    /// the first occurrence of a repeated key wins.
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        let mut p = Self::default();
        for (key, value) in pairs {
            let slot = match key.as_ref() {
                "limit" => &mut p.limit,
                "offset" => &mut p.offset,
                "site" => &mut p.site,
                "includeDeleted" => &mut p.include_deleted,
                _ => continue,
            };
            if slot.is_none() {
                *slot = Some(value.into());
            }
        }
        p
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListQuery {
    pub limit: i64,
    pub offset: i64,
    pub site: Option<String>,
    pub include_deleted: bool,
}

impl Default for ListQuery {
    fn default() -> Self {
        Self { limit: DEFAULT_LIST_LIMIT, offset: 0, site: None, include_deleted: false }
    }
}

impl ListQuery {
    pub fn from_params(p: &ListParams) -> Self {
        let site = p
            .site
            .as_deref()
            .map(crate::validate::slugify)
            .filter(|s| !s.is_empty());
        Self {
            limit: clamp_int(p.limit.as_deref(), 1, MAX_LIST_LIMIT, DEFAULT_LIST_LIMIT),
            offset: clamp_int(p.offset.as_deref(), 0, MAX_LIST_OFFSET, 0),
            site,
            include_deleted: p.include_deleted.as_deref().map(str::trim) == Some("true"),
        }
    }
}

/// Parses `raw` and clamps it into `[min, max]`. Unparseable input, and a zero
/// when zero is below `min`, yield `default`.
pub fn clamp_int(raw: Option<&str>, min: i64, max: i64, default: i64) -> i64 {
    match raw.map(str::trim).and_then(|s| s.parse::<i64>().ok()) {
        Some(0) if min > 0 => default,
        Some(n) => n.clamp(min, max),
        None => default,
    }
}
