use std::sync::Arc;

use actix_web::{web, App, HttpServer};
use anyhow::Context;
use tracing::{info, warn, Level};
use tracing_actix_web::TracingLogger;
use tracing_subscriber::EnvFilter;
use utoipa::OpenApi; // bring trait into scope for ApiDoc::openapi()
use utoipa_swagger_ui::SwaggerUi;

use bookings_api::config::{AppConfig, SinkMode};
use bookings_api::mailer::HttpMailer;
use bookings_api::openapi::ApiDoc;
use bookings_api::rate_limit::{InMemoryRateLimiter, RateLimiterFacade};
use bookings_api::repo::BookingRepo;
use bookings_api::sink::{BookingSink, MailSink, Notifier, NotifyingStoreSink, StoreSink};
use bookings_api::sites::SiteDirectory;
use bookings_api::turnstile::TurnstileVerifier;
use bookings_api::{config, AccessGate, AppState, CorsPolicy, SecurityHeaders};

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    // Load .env automatically only in debug builds; production sets the environment externally.
    if cfg!(debug_assertions) {
        let _ = dotenv::dotenv();
    }

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(Level::INFO.into()))
        .init();

    info!("Bootstrapping bookings API");

    let cfg = AppConfig::from_env()?;
    let sites = Arc::new(match &cfg.sites_file {
        Some(path) => SiteDirectory::load(path)?,
        None => SiteDirectory::empty(),
    });
    cfg.validate(sites.has_notify_addresses())?;
    for w in cfg.warnings() {
        warn!("{w}");
    }

    let repo = build_repo(&cfg).await?;
    let sink = build_sink(&cfg, repo.clone(), sites.clone());
    info!(sink = cfg.sink_mode.as_str(), sites = sites.len(), "booking sink ready");

    let verifier = TurnstileVerifier::new(cfg.turnstile_secret.clone())
        .with_verify_url(cfg.turnstile_verify_url.clone())
        .with_timeout(cfg.turnstile_timeout);
    let gate = AccessGate::from_settings(
        cfg.trusted_identity_header.as_deref(),
        cfg.admin_user.as_deref(),
        cfg.admin_pass.as_deref(),
    );

    let mut state = AppState::new(repo, Arc::new(verifier), gate)
        .with_sink(sink)
        .with_sites(sites);
    if let Some(h) = &cfg.client_ip_header {
        state = state.with_client_ip_header(h.clone());
    }
    if cfg.rate_limit_enabled {
        info!(limit = cfg.rate_limit.booking_limit, window_secs = cfg.rate_limit.booking_window.as_secs(), "booking throttle enabled");
        state = state.with_rate_limiter(RateLimiterFacade::new(InMemoryRateLimiter::new(), cfg.rate_limit.clone()));
    }

    let openapi = ApiDoc::openapi();
    let cors = CorsPolicy::new(cfg.allowed_origins.clone());
    let security = SecurityHeaders::default().with_hsts(cfg.enable_hsts);
    let data = web::Data::new(state);

    let server = HttpServer::new(move || {
        App::new()
            .wrap(TracingLogger::default())
            .wrap(security.clone())
            .wrap(cors.clone())
            .app_data(data.clone())
            .service(SwaggerUi::new("/docs/{_:.*}").url("/docs/openapi.json", openapi.clone()))
            .configure(config)
    })
    .bind(cfg.bind_addr.as_str())
    .with_context(|| format!("binding {}", cfg.bind_addr))?;

    info!("Listening on http://{}", cfg.bind_addr);
    server.run().await?;
    Ok(())
}

async fn build_repo(cfg: &AppConfig) -> anyhow::Result<Arc<dyn BookingRepo>> {
    #[cfg(feature = "postgres-store")]
    if let Some(url) = &cfg.database_url {
        use sqlx::postgres::PgPoolOptions;
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect_lazy(url)
            .context("creating Postgres pool")?;
        let repo = bookings_api::repo::pg::PgRepo::new(pool);
        repo.migrate().await.context("running migrations")?;
        info!("Using Postgres repository backend");
        return Ok(Arc::new(repo));
    }

    #[cfg(feature = "inmem-store")]
    return inmem_repo(cfg);
    #[cfg(not(feature = "inmem-store"))]
    anyhow::bail!("DATABASE_URL must be set when built without inmem-store");
}

#[cfg(feature = "inmem-store")]
fn inmem_repo(cfg: &AppConfig) -> anyhow::Result<Arc<dyn BookingRepo>> {
    std::fs::create_dir_all(&cfg.data_dir)
        .with_context(|| format!("creating data dir {}", cfg.data_dir.display()))?;
    let path = cfg.data_dir.join("bookings.json");
    info!(snapshot = %path.display(), "Using in-memory repository backend");
    let repo = bookings_api::repo::inmem::InMemRepo::with_snapshot(&path)
        .with_context(|| format!("loading snapshot {}", path.display()))?;
    Ok(Arc::new(repo))
}

fn build_sink(cfg: &AppConfig, repo: Arc<dyn BookingRepo>, sites: Arc<SiteDirectory>) -> Arc<dyn BookingSink> {
    let notifier = || {
        // validate() has already ensured the URL is present for email modes
        let url = cfg.mail_api_url.clone().unwrap_or_default();
        let mailer = HttpMailer::new(url, cfg.mail_api_token.clone());
        Notifier::new(Arc::new(mailer), sites.clone(), cfg.notify_from.clone(), cfg.notify_to.clone())
    };
    match cfg.sink_mode {
        SinkMode::Store => Arc::new(StoreSink::new(repo)),
        SinkMode::Email => Arc::new(MailSink::new(notifier())),
        SinkMode::StoreAndEmail => Arc::new(NotifyingStoreSink::new(repo, notifier())),
    }
}
