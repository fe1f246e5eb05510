use sentinex_core::GateMode;
use std::path::PathBuf;
use std::time::Duration;

/// Which D-Bus bus the daemon registers on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BusKind {
    Session,
    System,
}

/// Daemon configuration, loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Path to the SQLite database file.
    pub db_path: PathBuf,
    /// Fence definitions loaded into the store at startup and on reload.
    pub fences_file: Option<PathBuf>,
    /// Geofenced or unrestricted attendance.
    pub gate_mode: GateMode,
    /// Root URL of the face comparison service.
    pub face_api_url: String,
    /// Root URL of the world time service; `None` stamps records with the local clock.
    pub time_api_url: Option<String>,
    /// IANA zone queried on the world time service.
    pub timezone: String,
    /// Timeout for each HTTP request to the remote services.
    pub http_timeout_secs: u64,
    pub bus: BusKind,
}

impl Config {
    /// Load configuration from `SENTINEX_*` environment variables with defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env) with an arbitrary variable source.
    pub fn from_lookup(var: impl Fn(&str) -> Option<String>) -> Self {
        let data_dir = var("XDG_DATA_HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|| {
                let home = var("HOME").unwrap_or_else(|| "/tmp".to_string());
                PathBuf::from(home).join(".local/share")
            })
            .join("sentinex");

        let db_path = var("SENTINEX_DB_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|| data_dir.join("attendance.db"));

        let gate_mode = if var("SENTINEX_GEOFENCE_ENABLED").is_some_and(|v| v == "0") {
            GateMode::Unrestricted
        } else {
            GateMode::Geofenced
        };

        let time_api_url = match var("SENTINEX_TIME_API_URL") {
            Some(v) if v.trim().is_empty() => None,
            Some(v) => Some(v),
            None => Some("http://worldtimeapi.org".to_string()),
        };

        let bus = match var("SENTINEX_BUS").as_deref() {
            Some("system") => BusKind::System,
            _ => BusKind::Session,
        };

        Self {
            db_path,
            fences_file: var("SENTINEX_FENCES_FILE")
                .filter(|v| !v.is_empty())
                .map(PathBuf::from),
            gate_mode,
            face_api_url: var("SENTINEX_FACE_API_URL")
                .unwrap_or_else(|| "http://127.0.0.1:5000".to_string()),
            time_api_url,
            timezone: var("SENTINEX_TIMEZONE").unwrap_or_else(|| "Asia/Manila".to_string()),
            http_timeout_secs: parse_or(var("SENTINEX_HTTP_TIMEOUT_SECS"), 15),
            bus,
        }
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }
}

fn parse_or<T: std::str::FromStr>(value: Option<String>, default: T) -> T {
    value.and_then(|v| v.parse().ok()).unwrap_or(default)
}
