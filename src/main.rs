//! Linkzur Marketplace - B2B marketplace API server

use anyhow::Result;
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use linkzur_marketplace::{
    api::{self, AppState},
    auth::AuthKeys,
    config::Config,
    notify::{LogMailer, Mailer, NatsMailer, Notifier},
    render::TextInvoiceRenderer,
    storage::LocalFileStore,
};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env()?;
    let db = PgPoolOptions::new()
        .max_connections(config.database_max_connections)
        .connect(&config.database_url)
        .await?;
    sqlx::migrate!("./migrations").run(&db).await?;

    let mailer: Arc<dyn Mailer> = match &config.nats_url {
        Some(url) => match async_nats::connect(url).await {
            Ok(client) => Arc::new(NatsMailer::new(client)),
            Err(e) => {
                warn!(error = %e, "NATS unavailable, outbound mail will only be logged");
                Arc::new(LogMailer)
            }
        },
        None => Arc::new(LogMailer),
    };

    let state = AppState {
        notifier: Notifier::new(db.clone(), mailer, config.mail_from.clone()),
        auth: AuthKeys::from_secret(&config.jwt_secret),
        files: Arc::new(LocalFileStore::new(&config.media_root, config.media_url.clone())),
        renderer: Arc::new(TextInvoiceRenderer),
        config: Arc::new(config),
        db,
    };
    let port = state.config.port;
    let app = api::router(state);

    info!("Linkzur Marketplace listening on 0.0.0.0:{}", port);
    axum::serve(tokio::net::TcpListener::bind(format!("0.0.0.0:{}", port)).await?, app).await?;
    Ok(())
}
