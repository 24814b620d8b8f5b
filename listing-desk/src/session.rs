//! Admin session gate.
//!
//! Credentials come from configuration and are compared verbatim. A
//! successful login yields a token that is `base64("{millis}-{marker}")`;
//! a session is "valid" when the cookie decodes and contains the marker.
//!
//! This is not a security mechanism: the token is unsigned, guessable and
//! never stored server-side, so anyone can forge one. It is kept as-is to
//! stay compatible with the existing admin front-end, which mints the same
//! token shape itself. Replace it with signed, server-verified sessions
//! before relying on it.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use chrono::{DateTime, TimeZone, Utc};
use tracing::{info, warn};

use crate::config::AdminConfig;
use crate::error::{Error, Result};

/// Cookie name for the admin token
pub const SESSION_COOKIE: &str = "admin-token";

/// Marker every valid token carries after decoding.
pub const TOKEN_MARKER: &str = "mgsi-admin";

/// Cookie lifetime (7 days).
pub const SESSION_MAX_AGE_SECS: i64 = 7 * 24 * 60 * 60;

/// Checks admin credentials and issues/validates session tokens.
pub struct SessionGate {
    username: Option<String>,
    password: Option<String>,
    secure_cookies: bool,
}

impl SessionGate {
    pub fn new(config: &AdminConfig, secure_cookies: bool) -> Self {
        Self {
            username: config.username.clone(),
            password: config.password.clone(),
            secure_cookies,
        }
    }

    /// Compare credentials and return a fresh token on success.
    pub fn login(&self, username: &str, password: &str) -> Result<String> {
        let (Some(valid_user), Some(valid_pass)) = (&self.username, &self.password) else {
            warn!("Admin credentials not configured");
            return Err(Error::Configuration("admin credentials are not configured"));
        };

        if username != valid_user || password != valid_pass {
            warn!(username = %username, "Rejected admin login");
            return Err(Error::InvalidCredentials);
        }

        info!(username = %username, "Admin logged in");
        Ok(issue_token(Utc::now()))
    }

    /// `Set-Cookie` value carrying a session token.
    ///
    /// Not HttpOnly: the admin UI reads the cookie from script.
    pub fn session_cookie(&self, token: &str) -> String {
        let mut cookie = format!(
            "{SESSION_COOKIE}={token}; Path=/; Max-Age={SESSION_MAX_AGE_SECS}; SameSite=Lax"
        );
        if self.secure_cookies {
            cookie.push_str("; Secure");
        }
        cookie
    }

    /// `Set-Cookie` value that expires the session cookie immediately.
    pub fn cleared_cookie(&self) -> String {
        let mut cookie = format!(
            "{SESSION_COOKIE}=; Path=/; Expires=Thu, 01 Jan 1970 00:00:00 GMT; Max-Age=0; SameSite=Lax"
        );
        if self.secure_cookies {
            cookie.push_str("; Secure");
        }
        cookie
    }
}

/// Build a token for the given creation time.
pub fn issue_token(now: DateTime<Utc>) -> String {
    STANDARD.encode(format!("{}-{TOKEN_MARKER}", now.timestamp_millis()))
}

/// Structural check only: the token decodes and contains the marker.
pub fn check_session(token: &str) -> bool {
    decode_token(token).is_some_and(|decoded| decoded.contains(TOKEN_MARKER))
}

/// Creation time embedded in a token, if it has the expected shape.
pub fn token_created_at(token: &str) -> Option<DateTime<Utc>> {
    let decoded = decode_token(token)?;
    let millis = decoded.strip_suffix(&format!("-{TOKEN_MARKER}"))?;
    let millis: i64 = millis.parse().ok()?;
    Utc.timestamp_millis_opt(millis).single()
}

fn decode_token(token: &str) -> Option<String> {
    let bytes = STANDARD.decode(token.trim()).ok()?;
    String::from_utf8(bytes).ok()
}
