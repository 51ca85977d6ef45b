use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod cities;
mod config;
mod database;
mod routes;
mod utils;
mod weather;

use config::Config;
use database::{Stores, DEFAULT_USER_ID};
use routes::{create_router, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file
    dotenv::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "weather_dashboard_server=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = Config::from_env()?;
    if !config.has_api_key() && !config.demo_mode {
        tracing::warn!("WEATHERAPI_KEY is not set, weather requests will serve placeholders");
    }

    // Storage falls back to memory when SQLite is off or unreachable
    let stores = Stores::from_config(&config).await;
    match stores.purge_expired_weather().await {
        Ok(0) => {}
        Ok(removed) => tracing::info!("Purged {} expired weather snapshots", removed),
        Err(e) => tracing::warn!("Failed to purge expired weather snapshots: {}", e),
    }

    let state = AppState::build(config, stores)?;

    if state.config.seed_default_cities {
        match state.cities.seed_defaults(DEFAULT_USER_ID).await {
            Ok(cities) => tracing::info!("Seeded default cities ({} total)", cities.len()),
            Err(e) => tracing::warn!("Failed to seed default cities: {}", e),
        }
    }

    let bind_addr = state.config.bind_addr.clone();
    let app = create_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    tracing::info!("Server starting on http://{}", bind_addr);

    axum::serve(listener, app).await?;

    Ok(())
}
