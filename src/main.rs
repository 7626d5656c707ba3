use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

use wa_invoicer::config;
use wa_invoicer::db::{self, SqliteStore};
use wa_invoicer::handlers::{Collaborators, Engine};
use wa_invoicer::services::Transcriber;
use wa_invoicer::session::SystemClock;
use wa_invoicer::transcribe::HttpTranscriber;
use wa_invoicer::webhook::{self, WebhookState};
use wa_invoicer::whatsapp::WhatsAppClient;

#[derive(Debug, Parser)]
#[command(author, version, about)]
struct Args {
    /// Path to YAML config file
    #[arg(long, default_value = "config.yaml")]
    config: PathBuf,

    /// Validate the config file and exit
    #[arg(long)]
    check_config: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_target(false)
        .compact()
        .init();

    let args = Args::parse();
    let cfg = config::load(Some(&args.config))
        .with_context(|| format!("loading {}", args.config.display()))?;
    if args.check_config {
        info!(path = %args.config.display(), "config ok");
        return Ok(());
    }
    cfg.ensure_dirs()?;

    let database_url = std::env::var("DATABASE_URL").unwrap_or_else(|_| cfg.database_url());
    let pool = db::init_pool(&database_url).await?;
    db::run_migrations(&pool).await?;

    let store = Arc::new(SqliteStore::new(pool).with_document_base(cfg.app.document_base_url.clone()));
    let transport = Arc::new(WhatsAppClient::from_config(&cfg)?);
    let transcriber = match &cfg.transcription {
        Some(t) => Some(Arc::new(HttpTranscriber::new(t)?) as Arc<dyn Transcriber>),
        None => None,
    };
    if transcriber.is_none() {
        info!("no transcription endpoint configured; voice notes will be declined");
    }

    let engine = Engine::new(
        Collaborators {
            accounts: store.clone(),
            quota: store.clone(),
            catalog: store.clone(),
            invoices: store,
            transport,
            transcriber,
        },
        cfg.engine_settings(),
        Arc::new(SystemClock),
    );
    let app = webhook::router(WebhookState {
        engine: Arc::new(engine),
        verify_token: cfg.whatsapp.verify_token.clone(),
    });

    let addr = cfg.bind_addr();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    info!(%addr, "listening for webhook deliveries");
    axum::serve(listener, app).await?;
    Ok(())
}
