use std::env;
use std::path::PathBuf;
use std::time::Duration;

/// How a session should be acquired.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthStrategy {
    /// Try token extraction first, fall back to the live bridge.
    Auto,
    /// Only read the JWT from Plaud Desktop's local storage.
    Token,
    /// Only attach to the running Plaud Desktop process.
    Bridge,
    /// Exchange configured client credentials for a token.
    Keys,
}

impl AuthStrategy {
    fn parse(value: &str) -> Self {
        match value.to_ascii_lowercase().as_str() {
            "token" => AuthStrategy::Token,
            "bridge" => AuthStrategy::Bridge,
            "keys" => AuthStrategy::Keys,
            _ => AuthStrategy::Auto,
        }
    }
}

/// Runtime configuration, read once from `PLAUD_*` environment variables.
///
/// No credentials are required for the default strategies; authentication is
/// borrowed from the Plaud Desktop app.
#[derive(Debug, Clone)]
pub struct Config {
    pub api_base: String,
    pub storage_dir: PathBuf,
    pub strategy: AuthStrategy,
    pub bridge_port: u16,
    pub http_addr: String,
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub request_timeout: Duration,
    pub handshake_timeout: Duration,
}

impl Config {
    pub fn from_env() -> Self {
        let mut strategy = env::var("PLAUD_AUTH_STRATEGY")
            .map(|v| AuthStrategy::parse(&v))
            .unwrap_or(AuthStrategy::Auto);
        let client_id = env::var("PLAUD_CLIENT_ID").ok().filter(|v| !v.is_empty());
        let client_secret = env::var("PLAUD_CLIENT_SECRET").ok().filter(|v| !v.is_empty());
        if strategy == AuthStrategy::Keys && (client_id.is_none() || client_secret.is_none()) {
            log::warn!("PLAUD_AUTH_STRATEGY=keys but credentials missing, falling back to auto");
            strategy = AuthStrategy::Auto;
        }

        Config {
            api_base: env::var("PLAUD_API_BASE")
                .unwrap_or_else(|_| "https://api.plaud.ai".to_string()),
            storage_dir: env::var("PLAUD_STORAGE_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| default_storage_dir()),
            strategy,
            bridge_port: env::var("PLAUD_BRIDGE_PORT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(9229),
            http_addr: env::var("PLAUD_HTTP_ADDR")
                .unwrap_or_else(|_| "127.0.0.1:8848".to_string()),
            client_id,
            client_secret,
            request_timeout: Duration::from_secs(30),
            handshake_timeout: Duration::from_secs(5),
        }
    }
}

/// Where the desktop app's Electron local storage lives on this platform.
fn default_storage_dir() -> PathBuf {
    let home = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));
    if cfg!(target_os = "macos") {
        home.join("Library/Application Support/Plaud/Local Storage/leveldb")
    } else if cfg!(target_os = "windows") {
        home.join("AppData/Roaming/Plaud/Local Storage/leveldb")
    } else {
        home.join(".config/Plaud/Local Storage/leveldb")
    }
}
