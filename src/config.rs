use std::env;
use std::path::Path;

use serde::Deserialize;

#[derive(Debug, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub store: StoreConfig,
    pub fcm: FcmConfig,
    pub dispatch: DispatchConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Bearer token required on the trigger endpoint. Read from `TRIGGER_TOKEN`;
    /// when unset the endpoint is open (the platform in front is expected to guard it).
    pub trigger_token: Option<String>,
}

/// Where reminders live. The REST backend wins when both of its keys are set.
#[derive(Debug, Clone)]
pub enum StoreConfig {
    Sqlite(DatabaseConfig),
    Rest(RestStoreConfig),
}

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

#[derive(Debug, Clone)]
pub struct RestStoreConfig {
    /// Project URL, e.g. `https://xyz.supabase.co`.
    pub url: String,
    /// Service-role key; sent both as `apikey` and as bearer token.
    pub service_key: String,
}

/// Google service-account material, in the layout of the downloaded JSON key file.
#[derive(Clone, Deserialize)]
pub struct ServiceAccount {
    pub project_id: String,
    pub client_email: String,
    pub private_key: String,
    #[serde(default)]
    pub private_key_id: Option<String>,
    #[serde(default)]
    pub token_uri: Option<String>,
}

impl std::fmt::Debug for ServiceAccount {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceAccount")
            .field("project_id", &self.project_id)
            .field("client_email", &self.client_email)
            .field("private_key", &"(redacted)")
            .field("private_key_id", &self.private_key_id)
            .finish()
    }
}

impl ServiceAccount {
    pub fn from_json(raw: &str) -> Result<Self, ConfigError> {
        serde_json::from_str(raw).map_err(|e| {
            ConfigError::InvalidValue(format!("FIREBASE_SERVICE_ACCOUNT_PATH ({})", e))
        })
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            ConfigError::InvalidValue(format!(
                "FIREBASE_SERVICE_ACCOUNT_PATH ({}: {})",
                path.display(),
                e
            ))
        })?;
        Self::from_json(&raw)
    }
}

#[derive(Debug, Clone)]
pub struct FcmConfig {
    pub service_account: ServiceAccount,
    /// OAuth token endpoint used for the assertion exchange.
    pub token_uri: String,
    /// Base URL of the FCM HTTP v1 API (overridable for tests and emulators).
    pub base_url: String,
    /// Value of the `click_action` data key sent with every message.
    pub click_action: String,
    /// Per-call timeout for both the token exchange and message sends.
    pub request_timeout_seconds: u64,
}

#[derive(Debug, Clone)]
pub struct DispatchConfig {
    /// Maximum number of todos selected per invocation.
    pub batch_limit: u32,
    /// Maximum number of todos processed concurrently within one invocation.
    pub concurrency: u32,
    /// No new todo is started once this many seconds have passed since selection.
    pub deadline_seconds: u64,
    /// When set, an in-process worker runs a dispatch cycle at this interval.
    pub interval_seconds: Option<u64>,
}

#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub json: bool,
}

pub const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";
pub const DEFAULT_FCM_BASE_URL: &str = "https://fcm.googleapis.com";
pub const DEFAULT_CLICK_ACTION: &str = "FLUTTER_NOTIFICATION_CLICK";

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let store = match (env::var("SUPABASE_URL"), env::var("SUPABASE_SERVICE_ROLE_KEY")) {
            (Ok(url), Ok(service_key)) => StoreConfig::Rest(RestStoreConfig {
                url: url.trim_end_matches('/').to_string(),
                service_key,
            }),
            _ => StoreConfig::Sqlite(DatabaseConfig {
                url: env::var("DATABASE_URL")
                    .unwrap_or_else(|_| "sqlite://data/app.db".to_string()),
                max_connections: env::var("DATABASE_MAX_CONNECTIONS")
                    .unwrap_or_else(|_| "5".to_string())
                    .parse()
                    .unwrap_or(5),
            }),
        };

        let service_account = match env::var("FIREBASE_SERVICE_ACCOUNT_PATH") {
            Ok(path) => ServiceAccount::from_file(Path::new(&path))?,
            Err(_) => ServiceAccount {
                project_id: required("FCM_PROJECT_ID")?,
                client_email: required("FCM_CLIENT_EMAIL")?,
                // Keys pasted into a single env line carry literal `\n` sequences.
                private_key: required("FCM_PRIVATE_KEY")?.replace("\\n", "\n"),
                private_key_id: env::var("FCM_PRIVATE_KEY_ID").ok(),
                token_uri: None,
            },
        };

        let token_uri = env::var("FCM_TOKEN_URI")
            .ok()
            .or_else(|| service_account.token_uri.clone())
            .unwrap_or_else(|| DEFAULT_TOKEN_URI.to_string());

        Ok(Config {
            server: ServerConfig {
                host: env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
                port: env::var("PORT")
                    .unwrap_or_else(|_| "8080".to_string())
                    .parse()
                    .map_err(|_| ConfigError::InvalidValue("PORT".to_string()))?,
                trigger_token: env::var("TRIGGER_TOKEN").ok().filter(|t| !t.is_empty()),
            },
            store,
            fcm: FcmConfig {
                service_account,
                token_uri,
                base_url: env::var("FCM_BASE_URL")
                    .unwrap_or_else(|_| DEFAULT_FCM_BASE_URL.to_string())
                    .trim_end_matches('/')
                    .to_string(),
                click_action: env::var("FCM_CLICK_ACTION")
                    .unwrap_or_else(|_| DEFAULT_CLICK_ACTION.to_string()),
                request_timeout_seconds: env::var("FCM_REQUEST_TIMEOUT_SECONDS")
                    .unwrap_or_else(|_| "10".to_string())
                    .parse()
                    .unwrap_or(10u64),
            },
            dispatch: DispatchConfig {
                batch_limit: env::var("DISPATCH_BATCH_LIMIT")
                    .unwrap_or_else(|_| "20".to_string())
                    .parse()
                    .map_err(|_| ConfigError::InvalidValue("DISPATCH_BATCH_LIMIT".to_string()))?,
                concurrency: env::var("DISPATCH_CONCURRENCY")
                    .unwrap_or_else(|_| "4".to_string())
                    .parse()
                    .unwrap_or(4u32)
                    .max(1),
                deadline_seconds: env::var("DISPATCH_DEADLINE_SECONDS")
                    .unwrap_or_else(|_| "50".to_string())
                    .parse()
                    .unwrap_or(50u64),
                interval_seconds: match env::var("DISPATCH_INTERVAL_SECONDS") {
                    Ok(v) => Some(v.parse::<u64>().map_err(|_| {
                        ConfigError::InvalidValue("DISPATCH_INTERVAL_SECONDS".to_string())
                    })?)
                    .filter(|secs| *secs > 0),
                    Err(_) => None,
                },
            },
            logging: LoggingConfig {
                json: matches!(
                    env::var("LOG_FORMAT").map(|v| v.to_lowercase()).as_deref(),
                    Ok("json")
                ),
            },
        })
    }
}

fn required(key: &str) -> Result<String, ConfigError> {
    env::var(key).map_err(|_| ConfigError::MissingEnv(key.to_string()))
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnv(String),

    #[error("Invalid value for environment variable: {0}")]
    InvalidValue(String),
}

#[cfg(test)]
impl Default for Config {
    fn default() -> Self {
        Config {
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 8080,
                trigger_token: None,
            },
            store: StoreConfig::Sqlite(DatabaseConfig {
                url: "sqlite::memory:".to_string(),
                max_connections: 1,
            }),
            fcm: FcmConfig {
                service_account: ServiceAccount {
                    project_id: "demo-project".to_string(),
                    client_email: "notifier@demo-project.iam.gserviceaccount.com".to_string(),
                    private_key: String::new(),
                    private_key_id: None,
                    token_uri: None,
                },
                token_uri: DEFAULT_TOKEN_URI.to_string(),
                base_url: DEFAULT_FCM_BASE_URL.to_string(),
                click_action: DEFAULT_CLICK_ACTION.to_string(),
                request_timeout_seconds: 10,
            },
            dispatch: DispatchConfig {
                batch_limit: 20,
                concurrency: 4,
                deadline_seconds: 50,
                interval_seconds: None,
            },
            logging: LoggingConfig { json: false },
        }
    }
}
