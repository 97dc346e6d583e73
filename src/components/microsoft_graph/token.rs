use crate::config::Config;
use crate::error::{auth_error, AppResult};
use chrono::Utc;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{info, warn};
use url::Url;

/// Scopes requested from Azure AD
pub const SCOPES: &str = "https://graph.microsoft.com/Calendars.Read offline_access";

/// Tokens are refreshed when they expire within this many seconds
const EXPIRY_MARGIN_SECS: i64 = 60;

/// OAuth token as persisted on disk
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredToken {
    pub access_token: String,
    pub refresh_token: Option<String>,
    /// Unix timestamp (seconds)
    pub expires_at: i64,
}

impl StoredToken {
    /// Usable for at least another minute at `now` (unix seconds)
    pub fn is_valid_at(&self, now: i64) -> bool {
        !self.access_token.is_empty() && self.expires_at - EXPIRY_MARGIN_SECS > now
    }
}

/// Token endpoint response
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    refresh_token: Option<String>,
    expires_in: Option<i64>,
}

impl TokenResponse {
    fn into_stored(self, previous_refresh: Option<String>) -> StoredToken {
        StoredToken {
            access_token: self.access_token,
            // Azure AD may omit the refresh token on refresh
            refresh_token: self.refresh_token.or(previous_refresh),
            expires_at: Utc::now().timestamp() + self.expires_in.unwrap_or(3600),
        }
    }
}

/// Acquires, refreshes and persists the Microsoft Graph access token
pub struct TokenManager {
    tenant_id: String,
    client_id: String,
    client_secret: String,
    redirect_url: String,
    token_path: PathBuf,
    client: Client,
    token: Mutex<Option<StoredToken>>,
}

impl TokenManager {
    pub fn new(config: &Config) -> Self {
        Self {
            tenant_id: config.tenant_id.clone(),
            client_id: config.client_id.clone(),
            client_secret: config.client_secret.clone(),
            redirect_url: config.redirect_url.clone(),
            token_path: config.token_path.clone(),
            client: Client::new(),
            token: Mutex::new(None),
        }
    }

    fn endpoint(&self, action: &str) -> String {
        format!(
            "https://login.microsoftonline.com/{}/oauth2/v2.0/{}",
            self.tenant_id, action
        )
    }

    /// Authorization URL the user is sent to
    pub fn authorization_url(&self, state: &str) -> AppResult<Url> {
        let mut url = Url::parse(&self.endpoint("authorize"))
            .map_err(|e| auth_error(&format!("Failed to parse authorize URL: {}", e)))?;
        url.query_pairs_mut()
            .append_pair("client_id", &self.client_id)
            .append_pair("response_type", "code")
            .append_pair("redirect_uri", &self.redirect_url)
            .append_pair("response_mode", "query")
            .append_pair("scope", SCOPES)
            .append_pair("state", state);
        Ok(url)
    }

    /// Make sure a usable token exists, running the browser flow if needed
    pub async fn ensure_authorized(&self) -> AppResult<()> {
        match load_token(&self.token_path).await {
            Ok(Some(token)) => {
                info!("Loaded saved token, checking validity...");
                *self.token.lock().await = Some(token);
                match self.access_token().await {
                    Ok(_) => {
                        info!("Saved token is valid, using it for authentication.");
                        return Ok(());
                    }
                    Err(e) => warn!("Saved token is invalid ({}), starting authentication process...", e),
                }
            }
            Ok(None) => info!("No saved token found, starting authentication process..."),
            Err(e) => warn!("Failed to read saved token ({}), starting authentication process...", e),
        }

        self.authorize().await.map(|_| ())
    }

    /// Current access token, refreshed when close to expiry
    pub async fn access_token(&self) -> AppResult<String> {
        let mut guard = self.token.lock().await;
        let token = guard
            .as_ref()
            .ok_or_else(|| auth_error("Not authorized, run get_calendar_token first"))?;

        if token.is_valid_at(Utc::now().timestamp()) {
            return Ok(token.access_token.clone());
        }

        let refresh_token = token
            .refresh_token
            .clone()
            .ok_or_else(|| auth_error("No valid refresh token available"))?;

        info!("Refreshing access token...");
        let refreshed = self.refresh(&refresh_token).await?;
        if let Err(e) = save_token(&self.token_path, &refreshed).await {
            warn!("Failed to save refreshed token: {}", e);
        }
        let access = refreshed.access_token.clone();
        *guard = Some(refreshed);
        Ok(access)
    }

    async fn refresh(&self, refresh_token: &str) -> AppResult<StoredToken> {
        let params = [
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.as_str()),
            ("refresh_token", refresh_token),
            ("grant_type", "refresh_token"),
            ("scope", SCOPES),
        ];
        let response = self.request_token(&params, "refresh token").await?;
        Ok(response.into_stored(Some(refresh_token.to_string())))
    }

    async fn exchange_code(&self, code: &str) -> AppResult<StoredToken> {
        let params = [
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.as_str()),
            ("code", code),
            ("redirect_uri", self.redirect_url.as_str()),
            ("grant_type", "authorization_code"),
            ("scope", SCOPES),
        ];
        let response = self.request_token(&params, "exchange authorization code").await?;
        Ok(response.into_stored(None))
    }

    async fn request_token(&self, params: &[(&str, &str)], what: &str) -> AppResult<TokenResponse> {
        let response = self
            .client
            .post(self.endpoint("token"))
            .form(params)
            .send()
            .await
            .map_err(|e| auth_error(&format!("Failed to {}: {}", what, e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_body = response
                .text()
                .await
                .unwrap_or_else(|_| "Could not read error response".to_string());
            return Err(auth_error(&format!(
                "Failed to {}: HTTP {} - {}",
                what, status, error_body
            )));
        }

        response
            .json()
            .await
            .map_err(|e| auth_error(&format!("Failed to parse token response: {}", e)))
    }

    /// Run the interactive authorization-code flow and persist the token
    pub async fn authorize(&self) -> AppResult<StoredToken> {
        let state = uuid::Uuid::new_v4().to_string();
        let auth_url = self.authorization_url(&state)?;

        info!("Open the following URL in your browser to authenticate:\n{}", auth_url);
        if let Err(e) = webbrowser::open(auth_url.as_str()) {
            warn!("Failed to open browser: {}", e);
        }

        let redirect = Url::parse(&self.redirect_url)
            .map_err(|e| auth_error(&format!("Invalid redirect URL: {}", e)))?;
        let code = tokio::task::spawn_blocking(move || wait_for_code(&redirect, &state))
            .await
            .map_err(|e| auth_error(&format!("Callback listener failed: {}", e)))??;

        let token = self.exchange_code(&code).await?;
        save_token(&self.token_path, &token).await?;
        info!("Token saved to {}", self.token_path.display());

        *self.token.lock().await = Some(token.clone());
        Ok(token)
    }
}

/// Serve the redirect URL until a callback with the right state arrives
fn wait_for_code(redirect: &Url, state: &str) -> AppResult<String> {
    let port = redirect
        .port_or_known_default()
        .ok_or_else(|| auth_error("Redirect URL has no port"))?;
    let server = tiny_http::Server::http(("0.0.0.0", port))
        .map_err(|e| auth_error(&format!("Failed to start callback server: {}", e)))?;
    info!("Waiting for authorization callback on port {}...", port);

    loop {
        let request = server.recv()?;
        let url = Url::parse("http://localhost")
            .and_then(|base| base.join(request.url()))
            .map_err(|e| auth_error(&format!("Invalid callback URL: {}", e)))?;

        if url.path() != redirect.path() {
            let _ = request.respond(tiny_http::Response::from_string("Not found").with_status_code(404));
            continue;
        }

        match extract_code(&url, state) {
            Ok(code) => {
                let _ = request.respond(tiny_http::Response::from_string(
                    "Authentication completed. You can close this window.",
                ));
                return Ok(code);
            }
            Err(message) => {
                warn!("Rejected authorization callback: {}", message);
                let _ = request.respond(tiny_http::Response::from_string(message).with_status_code(400));
            }
        }
    }
}

/// Pull the authorization code out of a callback URL
pub fn extract_code(url: &Url, expected_state: &str) -> Result<String, &'static str> {
    let mut state = None;
    let mut code = None;
    for (key, value) in url.query_pairs() {
        match key.as_ref() {
            "state" => state = Some(value.into_owned()),
            "code" => code = Some(value.into_owned()),
            _ => {}
        }
    }

    if state.as_deref() != Some(expected_state) {
        return Err("State mismatch");
    }
    code.filter(|c| !c.is_empty()).ok_or("Code not found")
}

/// Read the persisted token, `None` when no file exists
pub async fn load_token(path: &Path) -> AppResult<Option<StoredToken>> {
    let data = match fs::read_to_string(path).await {
        Ok(data) => data,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    Ok(Some(serde_json::from_str(&data)?))
}

/// Persist the token, readable by the current user only
pub async fn save_token(path: &Path, token: &StoredToken) -> AppResult<()> {
    if let Some(dir) = path.parent() {
        if !dir.as_os_str().is_empty() {
            create_private_dir(dir).await?;
        }
    }

    let data = serde_json::to_vec(token)?;
    let mut options = fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    options.mode(0o600);
    let mut file = options.open(path).await?;
    file.write_all(&data).await?;
    // tokio finishes writes in the background until flushed
    file.flush().await?;
    Ok(())
}

async fn create_private_dir(dir: &Path) -> std::io::Result<()> {
    let mut builder = fs::DirBuilder::new();
    builder.recursive(true);
    #[cfg(unix)]
    builder.mode(0o700);
    builder.create(dir).await
}

#[cfg(test)]
mod tests {
    use super::*;

    fn token(expires_at: i64) -> StoredToken {
        StoredToken {
            access_token: "access".to_string(),
            refresh_token: Some("refresh".to_string()),
            expires_at,
        }
    }

    #[test]
    fn test_token_validity_margin() {
        let now = 1_700_000_000;
        assert!(token(now + 3600).is_valid_at(now));
        assert!(!token(now + 30).is_valid_at(now));
        assert!(!token(now - 10).is_valid_at(now));
    }

    #[tokio::test]
    async fn test_save_and_load_token() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("token.json");

        assert_eq!(load_token(&path).await.unwrap(), None);

        let stored = token(1_700_000_000);
        save_token(&path, &stored).await.unwrap();
        assert_eq!(load_token(&path).await.unwrap(), Some(stored));

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = std::fs::metadata(&path).unwrap().permissions().mode();
            assert_eq!(mode & 0o777, 0o600);
            let dir_mode = std::fs::metadata(path.parent().unwrap()).unwrap().permissions().mode();
            assert_eq!(dir_mode & 0o777, 0o700);
        }
    }

    /// Repeated writes from a single-threaded runtime, alongside another task
    #[tokio::test(flavor = "current_thread")]
    async fn test_token_rewrites_on_current_thread_runtime() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("token.json");
        let ticker = tokio::spawn(async {
            for _ in 0..3 {
                tokio::task::yield_now().await;
            }
            "ticked"
        });

        for expires_at in [1_700_000_000, 1_700_003_600] {
            save_token(&path, &token(expires_at)).await.unwrap();
        }
        // A shorter rewrite must not leave bytes of the previous token behind
        let short = StoredToken {
            access_token: "a".to_string(),
            refresh_token: None,
            expires_at: 1,
        };
        save_token(&path, &short).await.unwrap();

        assert_eq!(load_token(&path).await.unwrap(), Some(short));
        assert_eq!(ticker.await.unwrap(), "ticked");
    }

    #[tokio::test]
    async fn test_corrupt_token_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("token.json");
        fs::write(&path, "not json").await.unwrap();
        assert!(load_token(&path).await.is_err());
    }

    #[test]
    fn test_extract_code() {
        let url = Url::parse("http://localhost:9091/callback?code=abc&state=s1").unwrap();
        assert_eq!(extract_code(&url, "s1"), Ok("abc".to_string()));
        assert_eq!(extract_code(&url, "other"), Err("State mismatch"));

        let url = Url::parse("http://localhost:9091/callback?state=s1").unwrap();
        assert_eq!(extract_code(&url, "s1"), Err("Code not found"));
    }

    #[test]
    fn test_authorization_url() {
        let config = crate::config::Config::from_sources(Default::default(), |key| match key {
            "TENANT_ID" => Some("contoso".to_string()),
            "CLIENT_ID" => Some("client-1".to_string()),
            "CLIENT_SECRET" => Some("secret".to_string()),
            "TOKEN_PATH" => Some("/tmp/token.json".to_string()),
            _ => None,
        })
        .unwrap();
        let manager = TokenManager::new(&config);
        let url = manager.authorization_url("xyz").unwrap();

        assert_eq!(url.host_str(), Some("login.microsoftonline.com"));
        assert_eq!(url.path(), "/contoso/oauth2/v2.0/authorize");
        let pairs: Vec<(String, String)> = url.query_pairs().into_owned().collect();
        assert!(pairs.contains(&("client_id".to_string(), "client-1".to_string())));
        assert!(pairs.contains(&("state".to_string(), "xyz".to_string())));
        assert!(pairs.contains(&("scope".to_string(), SCOPES.to_string())));
    }
}
