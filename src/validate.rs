//! Inbound booking payload normalisation.
//!
//! The public form has been through a few revisions, so several field names
//! are accepted for the same value. Everything is trimmed before it is
//! checked, and all missing fields are reported together.

use serde_json::{Map, Value};

use crate::models::{BookingExtras, NewBooking, MAX_MESSAGE_LEN};

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum ValidationError {
    #[error("missing required fields: {0:?}")]
    MissingFields(Vec<&'static str>),
    #[error("invalid email")]
    InvalidEmail,
}

/// A validated create request, still carrying the bot-check token.
#[derive(Debug, Clone, PartialEq)]
pub struct BookingSubmission {
    pub site: String,
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    pub start_date: String,
    pub end_date: String,
    pub message: Option<String>,
    pub turnstile_token: String,
    pub extras: BookingExtras,
}

/// Request provenance captured by the HTTP layer.
#[derive(Debug, Clone, Default)]
pub struct Provenance {
    pub ip: Option<String>,
    pub user_agent: Option<String>,
}

impl BookingSubmission {
    pub fn from_json(body: &Value) -> Result<Self, ValidationError> {
        let empty = Map::new();
        let obj = body.as_object().unwrap_or(&empty);

        let site = slugify(&first_str(obj, &["site", "propertySlug", "property"]));
        let name = first_str(obj, &["name"]);
        let email = first_str(obj, &["email"]);
        let start_date = first_str(obj, &["startDate", "checkIn"]);
        let end_date = first_str(obj, &["endDate", "checkOut"]);
        let turnstile_token = first_str(obj, &["turnstileToken"]);

        let missing: Vec<&'static str> = [
            ("site", &site),
            ("name", &name),
            ("email", &email),
            ("startDate", &start_date),
            ("endDate", &end_date),
            ("turnstileToken", &turnstile_token),
        ]
        .into_iter()
        .filter(|(_, v)| v.is_empty())
        .map(|(k, _)| k)
        .collect();
        if !missing.is_empty() {
            return Err(ValidationError::MissingFields(missing));
        }
        if !is_valid_email(&email) {
            return Err(ValidationError::InvalidEmail);
        }

        let message = first_str(obj, &["message"]);
        let phone = first_str(obj, &["phone"]);

        Ok(Self {
            site,
            name,
            email,
            phone: non_empty(phone),
            start_date,
            end_date,
            message: non_empty(truncate_chars(&message, MAX_MESSAGE_LEN)),
            turnstile_token,
            extras: BookingExtras {
                guests: opaque(obj, "guests"),
                flexibility: opaque(obj, "flexibility"),
                property: opaque(obj, "property"),
                honeypot: opaque(obj, "honeypot"),
            },
        })
    }

    pub fn into_new_booking(self, provenance: Provenance) -> NewBooking {
        NewBooking {
            site: self.site,
            name: self.name,
            email: self.email,
            phone: self.phone,
            start_date: self.start_date,
            end_date: self.end_date,
            message: self.message,
            extras: self.extras,
            ip: provenance.ip,
            user_agent: provenance.user_agent,
        }
    }
}

/// Lowercases and collapses every run of non `[a-z0-9]` characters into a
/// single hyphen, with no hyphen at either end.
pub fn slugify(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut pending_hyphen = false;
    for c in raw.chars().flat_map(char::to_lowercase) {
        if c.is_ascii_lowercase() || c.is_ascii_digit() {
            if pending_hyphen && !out.is_empty() {
                out.push('-');
            }
            pending_hyphen = false;
            out.push(c);
        } else {
            pending_hyphen = true;
        }
    }
    out
}

/// `local@domain.tld` with no whitespace anywhere. Deliberately loose.
pub fn is_valid_email(s: &str) -> bool {
    if s.chars().any(char::is_whitespace) {
        return false;
    }
    let Some((local, domain)) = s.split_once('@') else { return false };
    if local.is_empty() || domain.contains('@') {
        return false;
    }
    // some dot must have non-empty text on both sides
    domain
        .char_indices()
        .filter(|&(_, c)| c == '.')
        .any(|(i, _)| i > 0 && i + 1 < domain.len())
}

pub fn truncate_chars(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        Some((idx, _)) => s[..idx].to_string(),
        None => s.to_string(),
    }
}

fn first_str(obj: &Map<String, Value>, keys: &[&str]) -> String {
    keys.iter()
        .filter_map(|k| obj.get(*k))
        .map(scalar_to_string)
        .map(|s| s.trim().to_string())
        .find(|s| !s.is_empty())
        .unwrap_or_default()
}

fn scalar_to_string(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        _ => String::new(),
    }
}

fn non_empty(s: String) -> Option<String> {
    if s.is_empty() { None } else { Some(s) }
}

fn opaque(obj: &Map<String, Value>, key: &str) -> Option<Value> {
    match obj.get(key) {
        None | Some(Value::Null) | Some(Value::Bool(false)) => None,
        Some(Value::String(s)) if s.trim().is_empty() => None,
        Some(v) => Some(v.clone()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn valid() -> Value {
        json!({
            "site": "8063 Princeton Dr",
            "name": "Ada",
            "email": "ada@example.com",
            "startDate": "2025-01-01",
            "endDate": "2025-01-05",
            "turnstileToken": "tok"
        })
    }

    #[test]
    fn slugify_examples() {
        assert_eq!(slugify("8063 Princeton Dr!"), "8063-princeton-dr");
        assert_eq!(slugify("  --Casa   Azul--  "), "casa-azul");
        assert_eq!(slugify("!!!"), "");
        assert_eq!(slugify("a__b..c"), "a-b-c");
    }

    #[test]
    fn slugify_is_idempotent() {
        for s in ["8063 Princeton Dr!", "Ünïcode Villa 2", "-x-", "plain", ""] {
            let once = slugify(s);
            assert_eq!(slugify(&once), once);
        }
    }

    #[test]
    fn email_shape() {
        assert!(is_valid_email("a@b.co"));
        assert!(is_valid_email("first.last+tag@sub.example.org"));
        assert!(!is_valid_email("not-an-email"));
        assert!(!is_valid_email("a@b"));
        assert!(!is_valid_email("a @b.com"));
        assert!(!is_valid_email("@b.com"));
        assert!(!is_valid_email("a@.com"));
        assert!(!is_valid_email("a@b."));
        assert!(!is_valid_email("a@b@c.com"));
    }

    #[test]
    fn accepts_valid_payload() {
        let sub = BookingSubmission::from_json(&valid()).unwrap();
        assert_eq!(sub.site, "8063-princeton-dr");
        assert_eq!(sub.phone, None);
        assert_eq!(sub.message, None);
        assert_eq!(sub.turnstile_token, "tok");
    }

    #[test]
    fn each_single_missing_field_is_reported_alone() {
        for field in ["site", "name", "email", "startDate", "endDate", "turnstileToken"] {
            let mut body = valid();
            body.as_object_mut().unwrap().remove(field);
            let err = BookingSubmission::from_json(&body).unwrap_err();
            assert_eq!(err, ValidationError::MissingFields(vec![field]), "field {field}");
        }
    }

    #[test]
    fn reports_all_missing_fields_together() {
        let err = BookingSubmission::from_json(&json!({"name": "Ada", "email": "   "})).unwrap_err();
        assert_eq!(
            err,
            ValidationError::MissingFields(vec!["site", "email", "startDate", "endDate", "turnstileToken"])
        );
    }

    #[test]
    fn non_object_body_reports_everything_missing() {
        let err = BookingSubmission::from_json(&json!([1, 2])).unwrap_err();
        assert!(matches!(err, ValidationError::MissingFields(f) if f.len() == 6));
    }

    #[test]
    fn aliases_resolve() {
        let body = json!({
            "propertySlug": "Casa Azul",
            "name": " Ada ",
            "email": "ada@example.com",
            "checkIn": "2025-02-01",
            "checkOut": "2025-02-03",
            "turnstileToken": "tok"
        });
        let sub = BookingSubmission::from_json(&body).unwrap();
        assert_eq!(sub.site, "casa-azul");
        assert_eq!(sub.name, "Ada");
        assert_eq!(sub.start_date, "2025-02-01");
        assert_eq!(sub.end_date, "2025-02-03");

        let body = json!({
            "property": "Beach House",
            "name": "Ada",
            "email": "ada@example.com",
            "startDate": "x",
            "endDate": "y",
            "turnstileToken": "tok"
        });
        let sub = BookingSubmission::from_json(&body).unwrap();
        assert_eq!(sub.site, "beach-house");
        assert_eq!(sub.extras.property, Some(json!("Beach House")));
    }

    #[test]
    fn invalid_email_rejected_even_when_complete() {
        let mut body = valid();
        body["email"] = json!("not-an-email");
        assert_eq!(BookingSubmission::from_json(&body).unwrap_err(), ValidationError::InvalidEmail);
    }

    #[test]
    fn long_message_truncated_not_rejected() {
        let mut body = valid();
        body["message"] = json!("é".repeat(MAX_MESSAGE_LEN + 20));
        let sub = BookingSubmission::from_json(&body).unwrap();
        assert_eq!(sub.message.unwrap().chars().count(), MAX_MESSAGE_LEN);
    }

    #[test]
    fn extras_preserved_including_honeypot() {
        let mut body = valid();
        body["guests"] = json!(4);
        body["flexibility"] = json!("+/- 2 days");
        body["honeypot"] = json!("http://spam");
        let sub = BookingSubmission::from_json(&body).unwrap();
        assert_eq!(sub.extras.guests, Some(json!(4)));
        assert_eq!(sub.extras.flexibility, Some(json!("+/- 2 days")));
        assert!(sub.extras.honeypot_filled());
    }

    #[test]
    fn truncate_chars_respects_boundaries() {
        assert_eq!(truncate_chars("héllo", 2), "hé");
        assert_eq!(truncate_chars("hi", 10), "hi");
    }
}
