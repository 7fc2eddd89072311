pub mod auth;
pub mod blocklist;
pub mod configuration;
pub mod email_client;
pub mod error;
pub mod logger;
pub mod mail_queue;
pub mod middleware;
pub mod routes;
pub mod startup;
pub mod telemetry;
pub mod users;
pub mod validators;
