//! Controller Session
//!
//! Owns the authentication state for one fabric controller and issues
//! authenticated reads and writes.
//!
//! ## State machine
//!
//! ```text
//! Unauthenticated --authenticate()--> Authenticated(token)
//! Authenticated   --401/403 seen----> Unauthenticated
//! ```
//!
//! `get`/`post` authenticate lazily. A 401/403 clears the token and returns
//! [`ControllerError::Auth`]; the next call logs in again. The session never
//! retries on its own.
//!
//! ## Wire contract
//!
//! | Call | Request |
//! |------|---------|
//! | Login | `POST {base}/api/aaaLogin.json` with `{"aaaUser":{"attributes":{"name","pwd"}}}` |
//! | Logout | `POST {base}/api/aaaLogout.json` |
//! | Read | `GET {base}/api/...json[?query]` |
//! | Write | `POST {base}/api/...json` with a JSON body |
//!
//! The token travels as the `APIC-cookie` cookie.

use chrono::{DateTime, Utc};
use fab_core::config::{mask_secret, ControllerSettings};
use reqwest::header::{COOKIE, SET_COOKIE};
use reqwest::{Client, Method, StatusCode};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::error::{classify_status, ControllerError};
use crate::path::ResourcePath;

pub const LOGIN_PATH: &str = "/api/aaaLogin.json";
pub const LOGOUT_PATH: &str = "/api/aaaLogout.json";
pub const TOKEN_COOKIE: &str = "APIC-cookie";

/// Observable session state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Unauthenticated,
    Authenticated,
}

/// Token state; only `authenticate` sets a token
#[derive(Debug, Default)]
struct AuthState {
    token: Option<String>,
    issued_at: Option<DateTime<Utc>>,
    /// The controller did not report a refresh timeout
    expiry_unknown: bool,
    refresh_timeout_secs: Option<u64>,
}

impl AuthState {
    fn invalidate(&mut self) {
        self.token = None;
        self.issued_at = None;
        self.refresh_timeout_secs = None;
        self.expiry_unknown = true;
    }
}

/// Authenticated REST session against one controller
pub struct ControllerSession {
    client: Client,
    base_url: String,
    username: String,
    password: String,
    auth: Mutex<AuthState>,
    logins: AtomicU64,
}

impl ControllerSession {
    /// Build a session from settings. No network traffic happens here.
    pub fn new(settings: &ControllerSettings) -> Result<Self, ControllerError> {
        if settings.accept_invalid_certs {
            warn!(
                "Accepting invalid TLS certificates from {} (self-signed controller)",
                settings.base_url
            );
        }

        let client = Client::builder()
            .danger_accept_invalid_certs(settings.accept_invalid_certs)
            .timeout(Duration::from_secs(settings.timeout_secs))
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| ControllerError::Setup(e.to_string()))?;

        debug!(
            "Controller session for {}@{} (password {})",
            settings.username,
            settings.base_url,
            mask_secret(&settings.password)
        );

        Ok(Self {
            client,
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            username: settings.username.clone(),
            password: settings.password.clone(),
            auth: Mutex::new(AuthState {
                expiry_unknown: true,
                ..AuthState::default()
            }),
            logins: AtomicU64::new(0),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub async fn state(&self) -> SessionState {
        if self.auth.lock().await.token.is_some() {
            SessionState::Authenticated
        } else {
            SessionState::Unauthenticated
        }
    }

    /// Number of login attempts made so far
    pub fn login_attempts(&self) -> u64 {
        self.logins.load(Ordering::Relaxed)
    }

    /// Whether the controller reported a token lifetime at login
    pub async fn expiry_unknown(&self) -> bool {
        self.auth.lock().await.expiry_unknown
    }

    /// Post credentials to the login resource and store the session token
    pub async fn authenticate(&self) -> Result<(), ControllerError> {
        let mut auth = self.auth.lock().await;
        self.login(&mut auth).await
    }

    async fn login(&self, auth: &mut AuthState) -> Result<(), ControllerError> {
        self.logins.fetch_add(1, Ordering::Relaxed);
        auth.invalidate();

        let url = format!("{}{}", self.base_url, LOGIN_PATH);
        info!("Authenticating to {} as {}", self.base_url, self.username);

        let payload = json!({
            "aaaUser": {
                "attributes": {
                    "name": self.username,
                    "pwd": self.password
                }
            }
        });

        let response = self
            .client
            .post(&url)
            .json(&payload)
            .send()
            .await
            .map_err(|e| ControllerError::Auth(format!("login request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            warn!("Login to {} rejected with HTTP {}", self.base_url, status);
            return Err(ControllerError::Auth(format!(
                "login rejected with HTTP {}",
                status.as_u16()
            )));
        }

        let cookie_token = response
            .headers()
            .get_all(SET_COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .find_map(token_from_set_cookie);

        let body: Value = response
            .json()
            .await
            .map_err(|e| ControllerError::Auth(format!("unreadable login response: {}", e)))?;

        let attributes = body
            .pointer("/imdata/0/aaaLogin/attributes")
            .cloned()
            .unwrap_or(Value::Null);

        let token = attributes
            .get("token")
            .and_then(Value::as_str)
            .map(str::to_string)
            .or(cookie_token)
            .ok_or_else(|| ControllerError::Auth("login response carried no token".to_string()))?;

        let refresh_timeout_secs = attributes
            .get("refreshTimeoutSeconds")
            .and_then(|v| match v {
                Value::String(s) => s.parse().ok(),
                Value::Number(n) => n.as_u64(),
                _ => None,
            });

        auth.token = Some(token);
        auth.issued_at = Some(Utc::now());
        auth.refresh_timeout_secs = refresh_timeout_secs;
        auth.expiry_unknown = refresh_timeout_secs.is_none();

        info!("Authenticated to {}", self.base_url);
        Ok(())
    }

    /// Current token, logging in first when there is none
    async fn current_token(&self) -> Result<String, ControllerError> {
        let mut auth = self.auth.lock().await;
        if auth.token.is_none() {
            debug!("No session token, authenticating lazily");
            self.login(&mut auth).await?;
        }
        auth.token
            .clone()
            .ok_or_else(|| ControllerError::Auth("no session token".to_string()))
    }

    /// Drop the token that was rejected, unless a newer one replaced it meanwhile
    async fn invalidate(&self, rejected: &str) {
        let mut auth = self.auth.lock().await;
        if auth.token.as_deref() == Some(rejected) {
            auth.invalidate();
            info!("Session token invalidated, next call re-authenticates");
        }
    }

    /// GET a resource. The path is grammar-checked before any network call.
    pub async fn get(&self, path: &str) -> Result<Value, ControllerError> {
        let path = ResourcePath::parse(path)?;
        self.get_resource(&path).await
    }

    pub async fn get_resource(&self, path: &ResourcePath) -> Result<Value, ControllerError> {
        self.request(Method::GET, path, None).await
    }

    /// POST a JSON object to a resource
    pub async fn post(&self, path: &str, payload: &Value) -> Result<Value, ControllerError> {
        let path = ResourcePath::parse(path)?;
        self.post_resource(&path, payload).await
    }

    pub async fn post_resource(
        &self,
        path: &ResourcePath,
        payload: &Value,
    ) -> Result<Value, ControllerError> {
        if !payload.is_object() {
            return Err(ControllerError::invalid_path(
                path.as_str(),
                "write payload must be a JSON object",
            ));
        }
        self.request(Method::POST, path, Some(payload)).await
    }

    async fn request(
        &self,
        method: Method,
        path: &ResourcePath,
        body: Option<&Value>,
    ) -> Result<Value, ControllerError> {
        let token = self.current_token().await?;
        let url = format!("{}{}", self.base_url, path);
        debug!("{} {}", method, url);

        let mut request = self
            .client
            .request(method, &url)
            .header(COOKIE, format!("{}={}", TOKEN_COOKIE, token));
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request
            .send()
            .await
            .map_err(|e| ControllerError::Network(e.to_string()))?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            self.invalidate(&token).await;
            return Err(ControllerError::Auth(format!(
                "controller returned HTTP {} for {}",
                status.as_u16(),
                path
            )));
        }

        let text = response
            .text()
            .await
            .map_err(|e| ControllerError::Network(e.to_string()))?;

        if !status.is_success() {
            warn!("{} failed with HTTP {}", path, status);
            return Err(classify_status(status.as_u16(), text));
        }

        serde_json::from_str(&text).map_err(|e| ControllerError::Parse(e.to_string()))
    }

    /// Best-effort logout; the token is dropped either way
    pub async fn logout(&self) {
        let mut auth = self.auth.lock().await;
        let Some(token) = auth.token.clone() else {
            return;
        };
        auth.invalidate();

        let url = format!("{}{}", self.base_url, LOGOUT_PATH);
        let payload = json!({ "aaaUser": { "attributes": { "name": self.username } } });
        match self
            .client
            .post(&url)
            .header(COOKIE, format!("{}={}", TOKEN_COOKIE, token))
            .json(&payload)
            .send()
            .await
        {
            Ok(resp) => debug!("Logout returned HTTP {}", resp.status()),
            Err(e) => debug!("Logout failed: {}", e),
        }
    }
}

fn token_from_set_cookie(header: &str) -> Option<String> {
    let pair = header.split(';').next()?.trim();
    let (name, value) = pair.split_once('=')?;
    (name == TOKEN_COOKIE && !value.is_empty()).then(|| value.to_string())
}
