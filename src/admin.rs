use std::fmt::Write as _;

use crate::models::Booking;

/// Rows shown on the HTML admin page.
pub const ADMIN_PAGE_LIMIT: i64 = 100;

const HEAD: &str = r#"<!doctype html><meta charset="utf-8"><title>Bookings</title>
<style>body{font:14px/1.5 system-ui,-apple-system,Segoe UI,Roboto,Arial;padding:20px;}table{border-collapse:collapse;width:100%}th,td{border:1px solid #eee;padding:6px 8px;text-align:left;vertical-align:top}th{background:#fafafa;}</style>
<h1>Bookings</h1>
<table><thead><tr>
<th>ID</th><th>Created</th><th>Site</th><th>Name</th><th>Email</th><th>Phone</th><th>Dates</th><th>Status</th><th>Message</th>
</tr></thead><tbody>"#;

pub fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            c => out.push(c),
        }
    }
    out
}

pub fn render_table(rows: &[Booking]) -> String {
    let mut html = String::from(HEAD);
    for b in rows {
        let _ = write!(
            html,
            "\n<tr><td>{}</td><td>{}</td><td>{}</td><td>{}</td><td>{}</td><td>{}</td><td>{} &rarr; {}</td><td>{}</td><td>{}</td></tr>",
            b.id,
            escape_html(&b.created_at.to_rfc3339()),
            escape_html(&b.site),
            escape_html(&b.name),
            escape_html(&b.email),
            escape_html(b.phone.as_deref().unwrap_or("")),
            escape_html(&b.start_date),
            escape_html(&b.end_date),
            escape_html(&b.status),
            escape_html(b.message.as_deref().unwrap_or("")),
        );
    }
    html.push_str("\n</tbody></table>\n");
    html
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn booking(name: &str, message: Option<&str>) -> Booking {
        Booking {
            id: 1,
            created_at: Utc::now(),
            site: "casa-azul".into(),
            name: name.into(),
            email: "a@b.co".into(),
            phone: None,
            start_date: "2025-01-01".into(),
            end_date: "2025-01-02".into(),
            message: message.map(String::from),
            status: "pending".into(),
            extras: serde_json::json!({}),
        }
    }

    #[test]
    fn escapes_markup() {
        assert_eq!(escape_html(r#"<b>"Tom" & 'Jerry'</b>"#), "&lt;b&gt;&quot;Tom&quot; &amp; &#39;Jerry&#39;&lt;/b&gt;");
    }

    #[test]
    fn table_never_contains_raw_user_markup() {
        let html = render_table(&[booking("<script>alert(1)</script>", Some("<img src=x>"))]);
        assert!(!html.contains("<script>"));
        assert!(!html.contains("<img"));
        assert!(html.contains("&lt;script&gt;"));
        assert!(html.contains("casa-azul"));
    }

    #[test]
    fn empty_table_still_renders() {
        let html = render_table(&[]);
        assert!(html.contains("<tbody>"));
        assert!(html.ends_with("</tbody></table>\n"));
    }
}
