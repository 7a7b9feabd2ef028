// config.rs
use tracing_subscriber::filter::LevelFilter;

#[derive(Debug, Clone)]
pub struct Config {
    /// When unset the service runs on the in-memory store.
    pub database_url: Option<String>,
    pub port: u16,
    pub log_level: LevelFilter,
    pub db_max_connections: u32,
    pub db_min_connections: u32,
    /// JSON file of jobs and workers loaded into the in-memory store.
    pub seed_file: Option<String>,
}

impl Config {
    pub fn init() -> Config {
        let database_url = std::env::var("DATABASE_URL")
            .ok()
            .filter(|url| !url.trim().is_empty());

        let port = std::env::var("PORT")
            .ok()
            .and_then(|p| p.parse::<u16>().ok())
            .unwrap_or(8000);

        let log_level = std::env::var("LOG_LEVEL")
            .ok()
            .and_then(|level| level.trim().parse::<LevelFilter>().ok())
            .unwrap_or(LevelFilter::DEBUG);

        let db_max_connections = std::env::var("DB_MAX_CONNECTIONS")
            .ok()
            .and_then(|n| n.parse::<u32>().ok())
            .filter(|n| *n > 0)
            .unwrap_or(20);

        let seed_file = std::env::var("SEED_FILE")
            .ok()
            .filter(|path| !path.trim().is_empty());

        Config {
            database_url,
            port,
            log_level,
            db_max_connections,
            db_min_connections: db_max_connections.min(5),
            seed_file,
        }
    }
}
