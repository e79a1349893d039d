use std::net::SocketAddr;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use estate_moderation::auth::{Argon2Hasher, AuthService, JwtSigner};
use estate_moderation::config::AppConfig;
use estate_moderation::handlers::{self, AppState};
use estate_moderation::house::HouseService;
use estate_moderation::moderation::FlatWorkflow;
use estate_moderation::repo::{PgFlatRepo, PgHouseRepo, PgNotificationRepo, PgUserRepo};
use estate_moderation::scheduler::NotificationScheduler;
use estate_moderation::sender::{LogSender, Sender, TelegramSender};
use estate_moderation::store::{PgStore, RetryStore, Store};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    if std::env::var("RUST_LOG").is_err() {
        std::env::set_var("RUST_LOG", "info");
    }
    env_logger::init();

    let config = AppConfig::load()?;
    log::info!("Loaded config: {:?}", config);

    let pg = PgStore::connect(&config.database_url, config.pool_size)?;
    pg.ping().await?;
    log::info!("Database reachable");
    let store: Arc<dyn Store> = Arc::new(RetryStore::new(pg, config.retry_policy()));

    let houses = Arc::new(PgHouseRepo::new(store.clone()));
    let flats = Arc::new(PgFlatRepo::new(store.clone()));
    let users = Arc::new(PgUserRepo::new(store.clone()));
    let notifications = Arc::new(PgNotificationRepo::new(store));

    let sender: Arc<dyn Sender> = match config.telegram() {
        Some((token, chat_id)) => {
            log::info!("Delivering messages through telegram chat {}", chat_id);
            Arc::new(TelegramSender::new(config.telegram_api_url.clone(), token, chat_id))
        }
        None => {
            log::warn!("No telegram bot configured, messages go to the log");
            Arc::new(LogSender)
        }
    };

    let tokens = Arc::new(JwtSigner::new(config.jwt_secret.clone(), config.jwt_ttl_hours));
    let state = AppState {
        auth: Arc::new(AuthService::new(
            users.clone(),
            sender.clone(),
            Arc::new(Argon2Hasher::new()),
            tokens.clone(),
            config.code_ttl(),
        )),
        flats: Arc::new(FlatWorkflow::new(
            flats,
            houses.clone(),
            users,
            notifications.clone(),
            config.flat_threshold,
        )),
        houses: Arc::new(HouseService::new(houses)),
        tokens,
        request_timeout: config.db_timeout(),
    };

    let scheduler = NotificationScheduler::new(notifications, sender).start(
        CancellationToken::new(),
        config.notify_frequency(),
        config.notify_timeout(),
    )?;

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    log::info!("Starting server on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    let served = axum::serve(listener, handlers::router(state).into_make_service())
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                log::error!("Could not listen for shutdown signal: {}", e);
            }
            log::info!("Shutting down");
        })
        .await;

    scheduler.stop().await;
    served?;
    Ok(())
}
