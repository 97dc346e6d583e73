use crate::components::calendar::Interval;
use crate::error::{config_error, env_error, AppResult};
use dotenvy::dotenv;
use serde::Deserialize;
use std::env;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

/// Default OAuth redirect URL, must match the app registration
pub const DEFAULT_REDIRECT_URL: &str = "http://localhost:9091/callback";

/// Default location of the optional settings file
pub const DEFAULT_CONFIG_FILE: &str = "config/meeting-reminder.toml";

/// Main configuration structure
#[derive(Debug, Clone)]
pub struct Config {
    /// Azure AD tenant ID
    pub tenant_id: String,
    /// OAuth client ID
    pub client_id: String,
    /// OAuth client secret
    pub client_secret: String,
    /// OAuth redirect URL served locally during authorization
    pub redirect_url: String,
    /// Polling interval in minutes
    pub watch_interval_minutes: u32,
    /// Browser executable used to open the reminder page
    pub browser_path: Option<String>,
    /// Directory the reminder page is written to
    pub output_dir: PathBuf,
    /// Directory prefix handed to the browser
    pub open_dir: PathBuf,
    /// Where the OAuth token is persisted
    pub token_path: PathBuf,
    /// Log file, stdout when unset
    pub log_file: Option<PathBuf>,
}

/// Non-secret settings that may live in the TOML file
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct FileSettings {
    pub watch_interval_minutes: Option<u32>,
    pub browser_path: Option<String>,
    pub output_dir: Option<PathBuf>,
    pub open_dir: Option<PathBuf>,
    pub redirect_url: Option<String>,
    pub token_path: Option<PathBuf>,
    pub log_file: Option<PathBuf>,
}

impl FileSettings {
    /// Read the settings file; only an absent default file falls back to defaults
    pub fn read(path: &Path, explicit: bool) -> AppResult<Self> {
        match fs::read_to_string(path) {
            Ok(content) => Ok(toml::from_str(&content)?),
            Err(e) if e.kind() == ErrorKind::NotFound && !explicit => Ok(Self::default()),
            Err(e) => Err(config_error(&format!(
                "Failed to read config file {}: {}",
                path.display(),
                e
            ))),
        }
    }
}

impl Config {
    /// Load configuration from .env, the settings file and the environment
    pub fn load() -> AppResult<Self> {
        // Load .env file if it exists
        dotenv().ok();

        let file = match env::var("MEETING_REMINDER_CONFIG").ok().filter(|v| !v.is_empty()) {
            Some(path) => FileSettings::read(Path::new(&path), true)?,
            None => FileSettings::read(Path::new(DEFAULT_CONFIG_FILE), false)?,
        };

        Self::from_sources(file, |key| env::var(key).ok().filter(|v| !v.is_empty()))
    }

    /// Build the configuration from file settings overridden by `lookup`
    pub fn from_sources<F>(file: FileSettings, lookup: F) -> AppResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        // Required credentials
        let tenant_id = lookup("TENANT_ID").ok_or_else(|| env_error("TENANT_ID"))?;
        let client_id = lookup("CLIENT_ID").ok_or_else(|| env_error("CLIENT_ID"))?;
        let client_secret = lookup("CLIENT_SECRET").ok_or_else(|| env_error("CLIENT_SECRET"))?;

        let watch_interval_minutes = match lookup("WATCH_INTERVAL_MINUTES") {
            Some(raw) => raw
                .trim()
                .parse::<u32>()
                .map_err(|_| config_error("Invalid WATCH_INTERVAL_MINUTES format"))?,
            None => file.watch_interval_minutes.unwrap_or(1),
        };
        if watch_interval_minutes == 0 {
            return Err(config_error("WATCH_INTERVAL_MINUTES must be at least 1"));
        }

        let browser_path = lookup("BROWSER_PATH").or(file.browser_path);
        let output_dir = lookup("OUTPUT_DIR")
            .map(PathBuf::from)
            .or(file.output_dir)
            .unwrap_or_else(env::temp_dir);
        let open_dir = lookup("OPEN_DIR")
            .map(PathBuf::from)
            .or(file.open_dir)
            .unwrap_or_else(|| output_dir.clone());
        let redirect_url = lookup("REDIRECT_URL")
            .or(file.redirect_url)
            .unwrap_or_else(|| DEFAULT_REDIRECT_URL.to_string());
        let token_path = match lookup("TOKEN_PATH").map(PathBuf::from).or(file.token_path) {
            Some(path) => path,
            None => default_token_path()?,
        };
        let log_file = lookup("LOG_FILE").map(PathBuf::from).or(file.log_file);

        Ok(Config {
            tenant_id,
            client_id,
            client_secret,
            redirect_url,
            watch_interval_minutes,
            browser_path,
            output_dir,
            open_dir,
            token_path,
            log_file,
        })
    }

    /// Polling interval as a validated bucket size
    pub fn interval(&self) -> AppResult<Interval> {
        Interval::from_minutes(self.watch_interval_minutes)
    }
}

fn default_token_path() -> AppResult<PathBuf> {
    let dir = dirs::config_dir().ok_or_else(|| config_error("Could not determine user config directory"))?;
    Ok(dir.join("meeting-reminder").join("token.json"))
}
