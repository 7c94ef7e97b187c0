use serde::Deserialize;

/// Everything the auth layer needs, passed in explicitly at construction.
#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    pub jwt_secret: String,
    pub jwt_ttl_minutes: i64,
    pub reset_ttl_minutes: i64,
    pub cookie_secure: bool,
    /// Base URL embedded in password-reset links.
    pub public_url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SmtpConfig {
    pub host: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub from_address: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub database_url: String,
    pub auth: AuthConfig,
    pub smtp: SmtpConfig,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url = std::env::var("DATABASE_URL")?;
        let auth = AuthConfig {
            jwt_secret: std::env::var("JWT_SECRET")?,
            jwt_ttl_minutes: std::env::var("JWT_TTL_MINUTES")
                .ok()
                .and_then(|v| v.parse::<i64>().ok())
                .unwrap_or(60 * 24 * 90),
            reset_ttl_minutes: std::env::var("RESET_TTL_MINUTES")
                .ok()
                .and_then(|v| v.parse::<i64>().ok())
                .unwrap_or(10),
            cookie_secure: std::env::var("APP_ENV")
                .map(|v| v == "production")
                .unwrap_or(false),
            public_url: std::env::var("PUBLIC_URL")
                .unwrap_or_else(|_| "http://localhost:8080".into()),
        };
        let smtp = SmtpConfig {
            host: std::env::var("SMTP_HOST").ok(),
            username: std::env::var("SMTP_USERNAME").ok(),
            password: std::env::var("SMTP_PASSWORD").ok(),
            from_address: std::env::var("SMTP_FROM_ADDRESS").ok(),
        };
        Ok(Self {
            database_url,
            auth,
            smtp,
        })
    }
}

#[cfg(test)]
impl AuthConfig {
    pub fn for_tests() -> Self {
        Self {
            jwt_secret: "test-secret".into(),
            jwt_ttl_minutes: 60,
            reset_ttl_minutes: 10,
            cookie_secure: false,
            public_url: "http://localhost:8080".into(),
        }
    }
}
