#![cfg(feature = "inmem-store")]

use std::sync::Arc;
use std::time::Duration;

use actix_web::{test, web, App};
use async_trait::async_trait;
use bookings_api::mailer::{EmailMessage, HttpMailer, MailError, Mailer};
use bookings_api::models::ListQuery;
use bookings_api::repo::{inmem::InMemRepo, BookingRepo};
use bookings_api::sink::{MailSink, Notifier, NotifyingStoreSink};
use bookings_api::sites::{SiteDirectory, SiteProfile};
use bookings_api::turnstile::BotCheck;
use bookings_api::{config, AccessGate, AppState};
use serde_json::{json, Value};
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

struct AlwaysPass;

#[async_trait]
impl BotCheck for AlwaysPass {
    async fn verify(&self, _token: &str, _remote_ip: Option<&str>) -> bool {
        true
    }
}

fn sites() -> Arc<SiteDirectory> {
    Arc::new(
        SiteDirectory::from_profiles(vec![SiteProfile {
            slug: "casa-azul".into(),
            property_name: "Casa Azul".into(),
            notify_email: vec!["owner@casa-azul.example".into()],
            ..Default::default()
        }])
        .unwrap(),
    )
}

fn notifier(server: &MockServer) -> Notifier {
    let mailer = HttpMailer::new(format!("{}/send", server.uri()), Some("mail-token".into()));
    Notifier::new(Arc::new(mailer), sites(), "bookings@example.net", vec!["ops@example.net".into()])
}

fn payload(site: &str) -> Value {
    json!({
        "site": site, "name": "Ana", "email": "ana@example.com",
        "startDate": "2025-08-01", "endDate": "2025-08-04",
        "guests": 3, "turnstileToken": "tok"
    })
}

#[tokio::test]
async fn http_mailer_posts_json_with_bearer_token() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/send"))
        .and(header("authorization", "Bearer mail-token"))
        .and(body_partial_json(json!({"to": ["a@example.com"], "subject": "hi"})))
        .respond_with(ResponseTemplate::new(202))
        .expect(1)
        .mount(&server)
        .await;

    let mailer = HttpMailer::new(format!("{}/send", server.uri()), Some("mail-token".into()));
    let msg = EmailMessage {
        from: "bookings@example.net".into(),
        to: vec!["a@example.com".into()],
        reply_to: None,
        subject: "hi".into(),
        text: "body".into(),
    };
    mailer.send(&msg).await.unwrap();
}

#[tokio::test]
async fn http_mailer_reports_rejection_and_timeout() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/send"))
        .respond_with(ResponseTemplate::new(422).set_body_string("bad sender"))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/slow"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_millis(500)))
        .mount(&server)
        .await;

    let msg = EmailMessage {
        from: "x@example.net".into(),
        to: vec!["a@example.com".into()],
        reply_to: None,
        subject: "s".into(),
        text: "t".into(),
    };
    let err = HttpMailer::new(format!("{}/send", server.uri()), None).send(&msg).await.unwrap_err();
    match err {
        MailError::Rejected { status, body } => {
            assert_eq!(status, 422);
            assert_eq!(body, "bad sender");
        }
        other => panic!("unexpected {other:?}"),
    }

    let err = HttpMailer::new(format!("{}/slow", server.uri()), None)
        .with_timeout(Duration::from_millis(50))
        .send(&msg)
        .await
        .unwrap_err();
    assert!(matches!(err, MailError::Timeout));
}

#[actix_web::test]
async fn email_mode_sends_to_site_owner_and_returns_no_id() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/send"))
        .and(body_partial_json(json!({
            "to": ["owner@casa-azul.example"],
            "reply_to": "ana@example.com",
            "from": "bookings@example.net"
        })))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let repo = Arc::new(InMemRepo::new());
    let state = AppState::new(repo.clone(), Arc::new(AlwaysPass), AccessGate::deny_all())
        .with_sink(Arc::new(MailSink::new(notifier(&server))));
    let app = test::init_service(App::new().app_data(web::Data::new(state)).configure(config)).await;

    let req = test::TestRequest::post().uri("/v1/bookings").set_json(payload("casa-azul")).to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 200);
    let body: Value = serde_json::from_slice(&test::read_body(resp).await).unwrap();
    assert_eq!(body, json!({"ok": true}));
    assert!(repo.list(&ListQuery::default()).await.unwrap().is_empty());
}

#[actix_web::test]
async fn email_mode_delivery_failure_is_bad_gateway() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/send"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let state = AppState::new(Arc::new(InMemRepo::new()), Arc::new(AlwaysPass), AccessGate::deny_all())
        .with_sink(Arc::new(MailSink::new(notifier(&server))));
    let app = test::init_service(App::new().app_data(web::Data::new(state)).configure(config)).await;

    // unknown site falls back to the default recipients
    let req = test::TestRequest::post().uri("/v1/bookings").set_json(payload("villa-sol")).to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 502);
    let body: Value = serde_json::from_slice(&test::read_body(resp).await).unwrap();
    assert_eq!(body, json!({"error": "Email delivery failed"}));
}

#[actix_web::test]
async fn store_and_email_keeps_the_row_when_mail_fails() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/send"))
        .respond_with(ResponseTemplate::new(503))
        .expect(1)
        .mount(&server)
        .await;

    let repo = Arc::new(InMemRepo::new());
    let state = AppState::new(repo.clone(), Arc::new(AlwaysPass), AccessGate::deny_all())
        .with_sink(Arc::new(NotifyingStoreSink::new(repo.clone(), notifier(&server))));
    let app = test::init_service(App::new().app_data(web::Data::new(state)).configure(config)).await;

    let req = test::TestRequest::post().uri("/v1/bookings").set_json(payload("casa-azul")).to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 200);
    let body: Value = serde_json::from_slice(&test::read_body(resp).await).unwrap();
    assert!(body["id"].as_i64().is_some());
    assert_eq!(repo.list(&ListQuery::default()).await.unwrap().len(), 1);
}
