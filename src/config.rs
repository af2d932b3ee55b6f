use std::env;

#[derive(Debug, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub redis: RedisConfig,
    pub auth: AuthConfig,
    pub services: ServicesConfig,
    pub feed: FeedConfig,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub environment: String,
}

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub database: String,
    pub ssl_mode: String,
    pub max_connections: u32,
}

#[derive(Debug, Clone)]
pub struct RedisConfig {
    pub host: String,
    pub port: u16,
    pub password: Option<String>,
    pub db: i64,
}

/// Token validation only. Tokens are minted by the identity directory; this
/// service just needs the shared secret to verify them.
#[derive(Debug, Clone)]
pub struct AuthConfig {
    pub jwt_secret: String,
}

/// Base URLs of the external collaborators.
#[derive(Debug, Clone)]
pub struct ServicesConfig {
    pub identity_url: String,
    pub listing_url: String,
    pub notify_url: Option<String>,
}

#[derive(Debug, Clone)]
pub struct FeedConfig {
    pub default_page_size: i64,
    pub max_page_size: i64,
}

impl Config {
    pub fn load() -> Self {
        dotenvy::dotenv().ok();

        Config {
            server: ServerConfig {
                host: env::var("SERVER_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
                port: env::var("SERVER_PORT")
                    .ok()
                    .and_then(|p| p.parse().ok())
                    .unwrap_or(8080),
                environment: env::var("ENVIRONMENT").unwrap_or_else(|_| "development".to_string()),
            },
            database: DatabaseConfig {
                host: env::var("DB_HOST").unwrap_or_else(|_| "localhost".to_string()),
                port: env::var("DB_PORT")
                    .ok()
                    .and_then(|p| p.parse().ok())
                    .unwrap_or(5432),
                user: env::var("DB_USER").unwrap_or_else(|_| "postgres".to_string()),
                password: env::var("DB_PASSWORD").unwrap_or_else(|_| "postgres".to_string()),
                database: env::var("DB_NAME").unwrap_or_else(|_| "dealtalk".to_string()),
                ssl_mode: env::var("DB_SSL_MODE").unwrap_or_else(|_| "disable".to_string()),
                max_connections: env::var("DB_MAX_CONNS")
                    .ok()
                    .and_then(|p| p.parse().ok())
                    .unwrap_or(25),
            },
            redis: RedisConfig {
                host: env::var("REDIS_HOST").unwrap_or_else(|_| "localhost".to_string()),
                port: env::var("REDIS_PORT")
                    .ok()
                    .and_then(|p| p.parse().ok())
                    .unwrap_or(6379),
                password: env::var("REDIS_PASSWORD").ok(),
                db: env::var("REDIS_DB")
                    .ok()
                    .and_then(|p| p.parse().ok())
                    .unwrap_or(0),
            },
            auth: AuthConfig {
                jwt_secret: env::var("JWT_SECRET")
                    .unwrap_or_else(|_| "super-secret-jwt-key-change-in-production".to_string()),
            },
            services: ServicesConfig {
                identity_url: env::var("IDENTITY_SERVICE_URL")
                    .unwrap_or_else(|_| "http://localhost:8081".to_string()),
                listing_url: env::var("LISTING_SERVICE_URL")
                    .unwrap_or_else(|_| "http://localhost:8082".to_string()),
                notify_url: env::var("NOTIFY_WEBHOOK_URL").ok(),
            },
            feed: FeedConfig {
                default_page_size: env::var("FEED_PAGE_SIZE")
                    .ok()
                    .and_then(|p| p.parse().ok())
                    .unwrap_or(30),
                max_page_size: env::var("FEED_MAX_PAGE_SIZE")
                    .ok()
                    .and_then(|p| p.parse().ok())
                    .unwrap_or(100),
            },
        }
    }

    pub fn database_url(&self) -> String {
        format!(
            "postgres://{}:{}@{}:{}/{}?sslmode={}",
            self.database.user,
            self.database.password,
            self.database.host,
            self.database.port,
            self.database.database,
            self.database.ssl_mode
        )
    }

    pub fn redis_url(&self) -> String {
        match &self.redis.password {
            Some(password) => format!(
                "redis://:{}@{}:{}/{}",
                password, self.redis.host, self.redis.port, self.redis.db
            ),
            None => format!(
                "redis://{}:{}/{}",
                self.redis.host, self.redis.port, self.redis.db
            ),
        }
    }
}
