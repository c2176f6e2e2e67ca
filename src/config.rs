/*
 * Responsibility
 * - 環境変数や設定の読み込み (service identity, trust mode, signing key, request-id prefix など)
 * - 設定値のバリデーション (不足なら起動失敗)
 */
use std::fmt;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppEnv {
    Development,
    Production,
}

impl AppEnv {
    pub fn from_env() -> Self {
        match std::env::var("APP_ENV")
            .unwrap_or_else(|_| "development".to_string())
            .to_ascii_lowercase()
            .as_str()
        {
            "production" | "prod" => Self::Production,
            _ => Self::Development,
        }
    }

    pub fn is_production(&self) -> bool {
        matches!(self, Self::Production)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Development => "development",
            Self::Production => "production",
        }
    }
}

#[derive(Debug)]
pub enum ConfigError {
    Missing(&'static str),
    Invalid(&'static str),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Missing(key) => write!(f, "missing configuration: {}", key),
            ConfigError::Invalid(key) => write!(f, "invalid configuration: {}", key),
        }
    }
}

impl std::error::Error for ConfigError {}

/// Name / version / build hash of one service in the fleet.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ServiceIdentity {
    pub name: String,
    pub version: String,
    pub version_hash: String,
}

pub struct Config {
    pub addr: SocketAddr,
    pub app_env: AppEnv,

    pub service: ServiceIdentity,

    pub is_behind_gateway: bool,
    pub accept_api_key_scheme: bool,
    pub request_id_prefix: String,

    pub signing_key_pem: String,

    pub observability_path: PathBuf,

    pub discovery_server_url: Option<String>,
    pub outbound_timeout: Duration,
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Do not print key material
        f.debug_struct("Config")
            .field("addr", &self.addr)
            .field("app_env", &self.app_env)
            .field("service", &self.service)
            .field("is_behind_gateway", &self.is_behind_gateway)
            .field("accept_api_key_scheme", &self.accept_api_key_scheme)
            .field("request_id_prefix", &self.request_id_prefix)
            .field("observability_path", &self.observability_path)
            .field("discovery_server_url", &self.discovery_server_url)
            .field("outbound_timeout", &self.outbound_timeout)
            .finish()
    }
}

fn env_bool(key: &'static str) -> Result<bool, ConfigError> {
    match std::env::var(key) {
        Err(_) => Ok(false),
        Ok(v) => match v.trim().to_ascii_lowercase().as_str() {
            "" | "0" | "false" | "no" => Ok(false),
            "1" | "true" | "yes" => Ok(true),
            _ => Err(ConfigError::Invalid(key)),
        },
    }
}

fn env_required(key: &'static str) -> Result<String, ConfigError> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .ok_or(ConfigError::Missing(key))
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let port: u16 = std::env::var("PORT")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(3000);

        let addr: SocketAddr = SocketAddr::from_str(&format!("0.0.0.0:{}", port))
            .map_err(|_| ConfigError::Invalid("PORT"))?;

        let app_env = AppEnv::from_env();

        let service = ServiceIdentity {
            name: env_required("SERVICE_NAME")?,
            version: std::env::var("SERVICE_VERSION")
                .unwrap_or_else(|_| env!("CARGO_PKG_VERSION").to_string()),
            version_hash: std::env::var("SERVICE_VERSION_HASH")
                .unwrap_or_else(|_| "dev".to_string()),
        };

        let is_behind_gateway = env_bool("IS_BEHIND_GATEWAY")?;
        let accept_api_key_scheme = env_bool("ACCEPT_API_KEY_SCHEME")?;

        let request_id_prefix = env_required("REQUEST_ID_PREFIX")?;
        if request_id_prefix.contains(|c: char| c == '_' || c.is_whitespace()) {
            return Err(ConfigError::Invalid("REQUEST_ID_PREFIX"));
        }

        let signing_key_pem = env_required("AUTH_SIGNING_KEY_PEM")?.replace("\\n", "\n");

        let observability_path = std::env::var("OBSERVABILITY_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("./request-logs"));

        let discovery_server_url = std::env::var("DISCOVERY_SERVER_URL")
            .ok()
            .map(|v| v.trim().trim_end_matches('/').to_string())
            .filter(|v| !v.is_empty());

        if let Some(url) = &discovery_server_url {
            url::Url::parse(url).map_err(|_| ConfigError::Invalid("DISCOVERY_SERVER_URL"))?;
        }

        let outbound_timeout = std::env::var("OUTBOUND_TIMEOUT_SECONDS")
            .ok()
            .map(|v| v.parse::<u64>())
            .transpose()
            .map_err(|_| ConfigError::Invalid("OUTBOUND_TIMEOUT_SECONDS"))?
            .map(Duration::from_secs)
            .unwrap_or(Duration::from_secs(5));

        Ok(Self {
            addr,
            app_env,
            service,
            is_behind_gateway,
            accept_api_key_scheme,
            request_id_prefix,
            signing_key_pem,
            observability_path,
            discovery_server_url,
            outbound_timeout,
        })
    }
}
