use std::net::TcpListener;
use std::sync::Arc;

use bookly::auth::AuthService;
use bookly::blocklist::RedisBlocklist;
use bookly::configuration::get_configuration;
use bookly::email_client::{EmailClient, SenderEmail};
use bookly::mail_queue::{spawn_mail_worker, MailQueue, RetryPolicy};
use bookly::startup::run;
use bookly::telemetry::init_telemetry;
use bookly::users::PgUserStore;
use sqlx::postgres::PgPoolOptions;

fn startup_error(kind: std::io::ErrorKind, message: &str) -> std::io::Error {
    std::io::Error::new(kind, message.to_string())
}

#[tokio::main]
async fn main() -> std::io::Result<()> {
    init_telemetry();

    tracing::info!("Starting application");

    let configuration = match get_configuration() {
        Ok(config) => {
            tracing::info!("Configuration loaded successfully");
            config
        }
        Err(e) => {
            tracing::error!("Failed to read configuration: {}", e);
            return Err(startup_error(std::io::ErrorKind::InvalidInput, "Configuration error"));
        }
    };

    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&configuration.database.connection_string())
        .await
        .map_err(|e| {
            tracing::error!("Failed to create connection pool: {}", e);
            startup_error(std::io::ErrorKind::ConnectionRefused, "Database connection error")
        })?;
    tracing::info!("Database connection pool created");

    let blocklist = RedisBlocklist::connect(&configuration.redis.url)
        .await
        .map_err(|e| {
            tracing::error!("Failed to connect to Redis: {}", e);
            startup_error(std::io::ErrorKind::ConnectionRefused, "Redis connection error")
        })?;
    tracing::info!("Token blocklist connected");

    let auth = AuthService::new(
        Arc::new(PgUserStore::new(pool)),
        Arc::new(blocklist),
        &configuration.jwt,
    )
    .map_err(|e| {
        tracing::error!("Invalid JWT settings: {}", e);
        startup_error(std::io::ErrorKind::InvalidInput, "JWT configuration error")
    })?;

    let sender = SenderEmail::parse(&configuration.email.sender).map_err(|e| {
        tracing::error!("Invalid sender address: {}", e);
        startup_error(std::io::ErrorKind::InvalidInput, "Email configuration error")
    })?;
    let email_client = EmailClient::new(
        configuration.email.base_url.clone(),
        sender,
        reqwest::Client::new(),
    );

    let (mail, receiver) = MailQueue::new();
    let _worker = spawn_mail_worker(
        receiver,
        Arc::new(email_client),
        RetryPolicy::new(configuration.email.max_attempts),
    );

    let address = format!(
        "{}:{}",
        configuration.application.host, configuration.application.port
    );
    let listener = TcpListener::bind(&address)?;
    tracing::info!("Server listening on: {}", address);

    let server = run(listener, auth, mail, configuration.application.clone())?;
    server.await
}
