use config::ConfigError;

#[derive(serde::Deserialize, Clone)]
pub struct Settings {
    pub database: DatabaseSettings,
    pub application: ApplicationSettings,
    pub redis: RedisSettings,
    pub jwt: JwtSettings,
    pub email: EmailSettings,
}

#[derive(serde::Deserialize, Clone)]
pub struct ApplicationSettings {
    #[serde(default = "default_host")]
    pub host: String,
    pub port: u16,
    /// Public URL used when building links in outgoing mail
    pub base_url: String,
}

#[derive(serde::Deserialize, Clone)]
pub struct DatabaseSettings {
    pub username: String,
    pub password: String,
    pub port: u16,
    pub host: String,
    pub database_name: String,
}

impl DatabaseSettings {
    pub fn connection_string(&self) -> String {
        format!(
            "postgres://{}:{}@{}:{}/{}",
            self.username, self.password, self.host, self.port, self.database_name
        )
    }
}

#[derive(serde::Deserialize, Clone)]
pub struct RedisSettings {
    pub url: String,
}

/// Token signing settings
#[derive(serde::Deserialize, Clone)]
pub struct JwtSettings {
    pub secret: String,
    #[serde(default = "default_algorithm")]
    pub algorithm: String,
    #[serde(default = "default_access_expiry")]
    pub access_token_expiry: i64,   // seconds
    #[serde(default = "default_refresh_expiry")]
    pub refresh_token_expiry: i64,  // seconds
    #[serde(default = "default_url_token_expiry")]
    pub url_token_expiry: i64,      // seconds, verification and reset links
}

#[derive(serde::Deserialize, Clone)]
pub struct EmailSettings {
    pub base_url: String,
    pub sender: String,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_algorithm() -> String {
    "HS256".to_string()
}

fn default_access_expiry() -> i64 {
    3600
}

fn default_refresh_expiry() -> i64 {
    2 * 24 * 3600
}

fn default_url_token_expiry() -> i64 {
    24 * 3600
}

fn default_max_attempts() -> u32 {
    3
}

/// Loads `configuration.yaml` (if present) and overlays `APP_`-prefixed
/// environment variables, e.g. `APP_JWT__SECRET`.
pub fn get_configuration() -> Result<Settings, ConfigError> {
    let settings = config::Config::builder()
        .add_source(config::File::with_name("configuration").required(false))
        .add_source(
            config::Environment::with_prefix("APP")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        )
        .build()?;
    settings.try_deserialize::<Settings>()
}
