use std::sync::Arc;

use tracing_subscriber::EnvFilter;

use secretary::config::{AppConfig, StoreConfig};
use secretary::db;
use secretary::handlers;
use secretary::services::ai::openai::OpenAiProvider;
use secretary::services::ai::LlmProvider;
use secretary::services::datetime::RegexExtractor;
use secretary::services::store::{AppointmentStore, ConversationLog, SqliteStore, SupabaseStore};
use secretary::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let config = AppConfig::from_env()?;

    let (store, history): (Arc<dyn AppointmentStore>, Arc<dyn ConversationLog>) =
        match &config.store {
            StoreConfig::Sqlite { path } => {
                tracing::info!(path = %path, "using SQLite store");
                let store = Arc::new(SqliteStore::new(db::init_db(path)?));
                let history: Arc<dyn ConversationLog> = store.clone();
                (store as Arc<dyn AppointmentStore>, history)
            }
            StoreConfig::Supabase { url, service_key } => {
                tracing::info!(url = %url, "using Supabase store");
                let store = Arc::new(SupabaseStore::new(url.clone(), service_key.clone()));
                let history: Arc<dyn ConversationLog> = store.clone();
                (store as Arc<dyn AppointmentStore>, history)
            }
        };

    let llm: Option<Box<dyn LlmProvider>> = if config.llm_fallback {
        tracing::info!(
            model = %config.openai_model,
            base_url = %config.openai_base_url,
            structured_actions = config.llm_actions,
            "completion fallback enabled"
        );
        Some(Box::new(
            OpenAiProvider::new(
                config.openai_api_key.clone(),
                config.openai_model.clone(),
                config.openai_base_url.clone(),
            )
            .with_json_output(config.llm_actions),
        ))
    } else {
        None
    };

    let state = Arc::new(AppState {
        extractor: Box::new(RegexExtractor::new(
            config.weekday_rollover,
            config.hour_overflow,
        )),
        history: (config.history_limit > 0).then_some(history),
        store,
        llm,
        config: config.clone(),
    });

    let app = handlers::router(state);

    let addr = format!("0.0.0.0:{}", config.port);
    tracing::info!(timezone = %config.timezone, "starting server on {addr}");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
