use serde::Deserialize;

/// Content types accepted for material uploads.
pub const DEFAULT_ALLOWED_FILE_TYPES: &[&str] = &[
    "application/pdf",
    "application/vnd.openxmlformats-officedocument.presentationml.presentation",
    "application/vnd.ms-powerpoint",
    "text/plain",
    "application/msword",
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
];

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub database_url: String,
    pub port: u16,
    pub cors_origins: Vec<String>,

    // Material storage
    pub upload_dir: String,
    pub max_file_size_mb: u64,
    pub allowed_file_types: Vec<String>,

    // External analysis software
    pub analysis_service_url: String,
    pub analysis_health_url: String,
    pub analysis_api_key: Option<String>,
    pub analysis_timeout_secs: u64,
    pub analysis_claim_ttl_secs: u64,

    // Mail relay (notifications are skipped when unset)
    pub mail_relay_url: Option<String>,
    pub mail_relay_api_key: Option<String>,
    pub mail_from: String,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let analysis_service_url = std::env::var("ANALYSIS_SOFTWARE_URL")
            .unwrap_or_else(|_| "http://localhost:8001/analyze".to_string());
        let analysis_service_url = require_http_url("ANALYSIS_SOFTWARE_URL", analysis_service_url)?;

        let analysis_health_url = match optional_var("ANALYSIS_HEALTH_URL") {
            Some(url) => require_http_url("ANALYSIS_HEALTH_URL", url)?,
            None => derive_health_url(&analysis_service_url)?,
        };

        let config = Self {
            database_url: std::env::var("DB_URL")
                .or_else(|_| std::env::var("DATABASE_URL"))
                .map_err(|_| {
                    anyhow::anyhow!("DB_URL or DATABASE_URL environment variable required")
                })
                .and_then(|url| {
                    if url.trim().is_empty() {
                        anyhow::bail!("DB_URL cannot be empty");
                    }
                    if !url.starts_with("postgresql://") && !url.starts_with("postgres://") {
                        anyhow::bail!("DB_URL must start with postgresql:// or postgres://");
                    }
                    Ok(url)
                })?,
            port: std::env::var("PORT")
                .unwrap_or_else(|_| "8000".to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("PORT must be a valid number between 1-65535"))?,
            cors_origins: optional_var("CORS_ORIGINS")
                .map(|raw| split_list(&raw))
                .unwrap_or_else(|| {
                    vec![
                        "http://localhost:3000".to_string(),
                        "http://localhost:8000".to_string(),
                    ]
                }),
            upload_dir: optional_var("UPLOAD_DIR").unwrap_or_else(|| "./uploads".to_string()),
            max_file_size_mb: parse_number("MAX_FILE_SIZE_MB", 50)?,
            allowed_file_types: optional_var("ALLOWED_FILE_TYPES")
                .map(|raw| split_list(&raw))
                .unwrap_or_else(|| {
                    DEFAULT_ALLOWED_FILE_TYPES
                        .iter()
                        .map(|t| t.to_string())
                        .collect()
                }),
            analysis_service_url,
            analysis_health_url,
            analysis_api_key: optional_var("ANALYSIS_SOFTWARE_API_KEY"),
            analysis_timeout_secs: parse_number("ANALYSIS_TIMEOUT_SECONDS", 120)?,
            analysis_claim_ttl_secs: parse_number("ANALYSIS_CLAIM_TTL_SECONDS", 600)?,
            mail_relay_url: match optional_var("MAIL_RELAY_URL") {
                Some(url) => Some(require_http_url("MAIL_RELAY_URL", url)?),
                None => None,
            },
            mail_relay_api_key: optional_var("MAIL_RELAY_API_KEY"),
            mail_from: optional_var("MAIL_FROM")
                .unwrap_or_else(|| "noreply@pitchdecks.com".to_string()),
        };

        if config.analysis_timeout_secs == 0 {
            anyhow::bail!("ANALYSIS_TIMEOUT_SECONDS must be greater than zero");
        }
        if config.max_file_size_mb == 0 {
            anyhow::bail!("MAX_FILE_SIZE_MB must be greater than zero");
        }

        // Log successful configuration load (without sensitive values)
        tracing::info!("Configuration loaded successfully");
        tracing::debug!("Database URL: {}...", log_prefix(&config.database_url, 20));
        tracing::debug!("Analysis service URL: {}", config.analysis_service_url);
        tracing::debug!("Analysis health URL: {}", config.analysis_health_url);
        if config.analysis_api_key.is_none() {
            tracing::warn!("ANALYSIS_SOFTWARE_API_KEY not set, analysis requests are unauthenticated");
        }
        if config.mail_relay_url.is_none() {
            tracing::warn!("MAIL_RELAY_URL not set, lead notifications are disabled");
        }
        tracing::debug!("Server Port: {}", config.port);

        Ok(config)
    }

    pub fn max_file_size_bytes(&self) -> u64 {
        self.max_file_size_mb * 1024 * 1024
    }
}

/// First `chars` characters of a secret-bearing value, cut on a char boundary.
fn log_prefix(value: &str, chars: usize) -> String {
    value.chars().take(chars).collect()
}

fn optional_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|s| !s.trim().is_empty())
}

fn parse_number<T: std::str::FromStr>(name: &str, default: T) -> anyhow::Result<T> {
    match optional_var(name) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| anyhow::anyhow!("{} must be a valid non-negative number", name)),
        None => Ok(default),
    }
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn require_http_url(name: &str, url: String) -> anyhow::Result<String> {
    if !url.starts_with("http://") && !url.starts_with("https://") {
        anyhow::bail!("{} must start with http:// or https://", name);
    }
    url::Url::parse(&url).map_err(|e| anyhow::anyhow!("{} is not a valid URL: {}", name, e))?;
    Ok(url)
}

/// Health endpoint next to the analyze endpoint: `.../analyze` -> `.../health`.
///
/// URLs without a trailing `analyze` segment get `/health` appended.
pub fn derive_health_url(analysis_url: &str) -> anyhow::Result<String> {
    let mut url = url::Url::parse(analysis_url)
        .map_err(|e| anyhow::anyhow!("Invalid analysis URL '{}': {}", analysis_url, e))?;

    let path = url.path().trim_end_matches('/');
    let new_path = match path.strip_suffix("/analyze") {
        Some(prefix) => format!("{}/health", prefix),
        None => format!("{}/health", path),
    };
    url.set_path(&new_path);
    Ok(url.to_string())
}
