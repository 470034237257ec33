use clap::{Parser, Subcommand};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool};
use std::str::FromStr;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use flight_weather_server::config::Config;
use flight_weather_server::database::Database;
use flight_weather_server::forecast::{ForecastCache, ForecastService, OpenMeteoClient};
use flight_weather_server::routes::{create_router, AppState};

#[derive(Parser)]
#[command(version, about = "Airport weather forecasts for flights")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP server (default)
    Serve,
    /// Recreate the database and load airports and tickets
    InitDb,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file
    dotenv::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "flight_weather_server=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    let config = Config::from_env()?;

    let options = SqliteConnectOptions::from_str(&config.database_url)?.create_if_missing(true);
    let pool = SqlitePool::connect_with(options).await?;
    let database = Arc::new(Database::new(pool));

    match cli.command.unwrap_or(Command::Serve) {
        Command::InitDb => {
            database.init_db(&config).await?;
            tracing::info!("Initialized the database.");
            Ok(())
        }
        Command::Serve => serve(config, database).await,
    }
}

async fn serve(config: Config, database: Arc<Database>) -> anyhow::Result<()> {
    database.ensure_tables().await?;

    let weather_client = OpenMeteoClient::new(&config)?;
    let forecasts = ForecastService::new(
        Arc::new(weather_client),
        ForecastCache::new(config.forecast_cache_capacity),
    );

    let state = AppState {
        database,
        forecasts: Arc::new(forecasts),
    };

    let app = create_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let listener = tokio::net::TcpListener::bind(config.bind_addr.as_str()).await?;
    tracing::info!("Server starting on http://{}", config.bind_addr);

    axum::serve(listener, app).await?;

    Ok(())
}
