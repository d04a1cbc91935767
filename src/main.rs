use tracing::info;
use tracing_subscriber::fmt::format::FmtSpan;

use foodgram::media::Media;
use foodgram::routes::{self, authentication::Tokens};
use foodgram::settings::Settings;
use foodgram::store::Store;

#[tokio::main]
async fn main() -> Result<(), handle_errors::Error> {
    dotenv::dotenv().ok();
    let config = Settings::load()?;

    let log_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| config.log_filter());
    tracing_subscriber::fmt()
        .with_env_filter(log_filter)
        .with_span_events(FmtSpan::CLOSE)
        .init();

    let store = Store::new(&config.database_url()).await?;
    sqlx::migrate!("./migrations")
        .run(&store.connection)
        .await
        .map_err(|e| handle_errors::Error::Configuration(format!("cannot run migrations: {}", e)))?;

    let tokens = Tokens::new(&config.token_key, config.token_lifetime_hours)?;
    let media = Media::new(&config.media_root, &config.media_url);
    tokio::fs::create_dir_all(&media.root)
        .await
        .map_err(handle_errors::Error::StdFileError)?;

    let routes = routes::api(store, tokens, media, config.page_settings());

    info!("Foodgram listening on port {}", config.port);
    warp::serve(routes).run(([0, 0, 0, 0], config.port)).await;

    Ok(())
}
