//! Google OAuth credentials.
//!
//! Two flows are supported: the installed-app user flow that backs the
//! Gmail token, and the service-account JWT grant used to read the roster
//! spreadsheet.

use crate::error::CredentialError;
use crate::services::api_error;
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use log::{debug, info};
use rand::distributions::Alphanumeric;
use rand::Rng;
use reqwest::blocking::Client;
use reqwest::Url;
use serde::{Deserialize, Serialize};

/// Scope needed to send mail as the authorized user.
pub const GMAIL_SEND_SCOPE: &str = "https://www.googleapis.com/auth/gmail.send";

/// Scope needed to read the roster spreadsheet.
pub const SHEETS_READONLY_SCOPE: &str = "https://www.googleapis.com/auth/spreadsheets.readonly";

const DEFAULT_AUTH_URI: &str = "https://accounts.google.com/o/oauth2/auth";
const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";
const DEFAULT_REDIRECT_URI: &str = "http://localhost";
const JWT_BEARER_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";

/// Tokens this close to expiry are treated as expired.
const EXPIRY_SKEW_SECS: i64 = 10;

fn default_auth_uri() -> String {
    DEFAULT_AUTH_URI.to_string()
}

fn default_token_uri() -> String {
    DEFAULT_TOKEN_URI.to_string()
}

/// OAuth client configuration as downloaded from the Google console.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientSecrets {
    #[serde(alias = "web")]
    pub installed: OAuthClient,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OAuthClient {
    pub client_id: String,
    pub client_secret: String,
    #[serde(default = "default_auth_uri")]
    pub auth_uri: String,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
    #[serde(default)]
    pub redirect_uris: Vec<String>,
}

/// An authorized-user token.
///
/// Field names follow the JSON Google's client libraries write, so a
/// token produced by either side can be read by the other. Unknown fields
/// are carried through untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OAuthToken {
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
    pub client_id: String,
    pub client_secret: String,
    #[serde(default)]
    pub scopes: Vec<String>,
    #[serde(default)]
    pub expiry: Option<DateTime<Utc>>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// Body of a successful token endpoint response.
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<i64>,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    scope: Option<String>,
}

impl OAuthToken {
    /// Expired if the expiry is known and falls within the skew window.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        match self.expiry {
            Some(expiry) => now + Duration::seconds(EXPIRY_SKEW_SECS) >= expiry,
            None => false,
        }
    }

    /// Has an access token that has not expired.
    pub fn is_valid(&self, now: DateTime<Utc>) -> bool {
        self.token.is_some() && !self.is_expired(now)
    }

    pub fn can_refresh(&self) -> bool {
        self.refresh_token.is_some()
    }

    /// A usable access token, refreshing in place when needed.
    pub fn access_token(
        &mut self,
        http: &Client,
        now: DateTime<Utc>,
    ) -> Result<String, CredentialError> {
        if !self.is_valid(now) {
            self.refresh(http, now)?;
        }
        self.token
            .clone()
            .ok_or_else(|| CredentialError::Decode("token endpoint returned no access token".into()))
    }

    /// Exchange the refresh token for a new access token.
    pub fn refresh(&mut self, http: &Client, now: DateTime<Utc>) -> Result<(), CredentialError> {
        let refresh_token = self
            .refresh_token
            .clone()
            .ok_or(CredentialError::NotRefreshable)?;

        debug!("refreshing OAuth token for client {}", self.client_id);
        let params = [
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token.as_str()),
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.as_str()),
        ];
        let response = post_token_request(http, &self.token_uri, &params)?;
        self.apply(response, now);
        Ok(())
    }

    fn apply(&mut self, response: TokenResponse, now: DateTime<Utc>) {
        self.token = Some(response.access_token);
        self.expiry = response.expires_in.map(|secs| now + Duration::seconds(secs));
        if let Some(refresh_token) = response.refresh_token {
            self.refresh_token = Some(refresh_token);
        }
        if let Some(scope) = response.scope {
            self.scopes = scope.split_whitespace().map(str::to_string).collect();
        }
    }
}

fn post_token_request(
    http: &Client,
    token_uri: &str,
    params: &[(&str, &str)],
) -> Result<TokenResponse, CredentialError> {
    let response = http.post(token_uri).form(params).send()?;
    if !response.status().is_success() {
        let (status, message) = api_error(response);
        return Err(CredentialError::Api { status, message });
    }
    response
        .json::<TokenResponse>()
        .map_err(|e| CredentialError::Decode(e.to_string()))
}

/// Interactive installed-app authorization.
///
/// The consent URL is shown to the operator, who pastes back either the
/// bare authorization code or the full URL the browser was redirected to.
#[derive(Debug, Clone)]
pub struct InstalledAppFlow {
    client: OAuthClient,
    scopes: Vec<String>,
    redirect_uri: String,
    state: String,
}

impl InstalledAppFlow {
    pub fn new(secrets: &ClientSecrets, scopes: &[&str]) -> Self {
        let client = secrets.installed.clone();
        let redirect_uri = client
            .redirect_uris
            .first()
            .cloned()
            .unwrap_or_else(|| DEFAULT_REDIRECT_URI.to_string());
        let state: String = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(30)
            .map(char::from)
            .collect();
        Self {
            client,
            scopes: scopes.iter().map(|s| s.to_string()).collect(),
            redirect_uri,
            state,
        }
    }

    pub fn state(&self) -> &str {
        &self.state
    }

    /// URL the operator opens to grant consent.
    pub fn authorization_url(&self) -> Result<String, CredentialError> {
        let scope = self.scopes.join(" ");
        let url = Url::parse_with_params(
            &self.client.auth_uri,
            &[
                ("response_type", "code"),
                ("client_id", self.client.client_id.as_str()),
                ("redirect_uri", self.redirect_uri.as_str()),
                ("scope", scope.as_str()),
                ("state", self.state.as_str()),
                ("access_type", "offline"),
                ("prompt", "consent"),
            ],
        )
        .map_err(|e| CredentialError::Authorization(format!("bad auth_uri: {}", e)))?;
        Ok(url.into())
    }

    /// Pull the authorization code out of what the operator pasted.
    pub fn extract_code(&self, pasted: &str) -> Result<String, CredentialError> {
        let pasted = pasted.trim();
        if pasted.is_empty() {
            return Err(CredentialError::Authorization("no authorization code given".into()));
        }
        let url = match Url::parse(pasted) {
            Ok(url) => url,
            Err(_) => return Ok(pasted.to_string()),
        };

        let mut code = None;
        let mut state = None;
        for (key, value) in url.query_pairs() {
            match key.as_ref() {
                "code" => code = Some(value.into_owned()),
                "state" => state = Some(value.into_owned()),
                "error" => {
                    return Err(CredentialError::Authorization(format!(
                        "consent was refused: {}",
                        value
                    )))
                }
                _ => {}
            }
        }
        if let Some(state) = state {
            if state != self.state {
                return Err(CredentialError::Authorization("state mismatch".into()));
            }
        }
        code.ok_or_else(|| CredentialError::Authorization("redirect URL carries no code".into()))
    }

    /// Trade the pasted code for a fresh token.
    pub fn exchange(
        &self,
        http: &Client,
        pasted: &str,
        now: DateTime<Utc>,
    ) -> Result<OAuthToken, CredentialError> {
        let code = self.extract_code(pasted)?;
        let params = [
            ("grant_type", "authorization_code"),
            ("code", code.as_str()),
            ("client_id", self.client.client_id.as_str()),
            ("client_secret", self.client.client_secret.as_str()),
            ("redirect_uri", self.redirect_uri.as_str()),
        ];
        let response = post_token_request(http, &self.client.token_uri, &params)?;
        info!("authorization code exchanged for a new token");

        let mut token = OAuthToken {
            token: None,
            refresh_token: None,
            token_uri: self.client.token_uri.clone(),
            client_id: self.client.client_id.clone(),
            client_secret: self.client.client_secret.clone(),
            scopes: self.scopes.clone(),
            expiry: None,
            extra: serde_json::Map::new(),
        };
        token.apply(response, now);
        Ok(token)
    }
}

/// Service account key file contents.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceAccountKey {
    pub client_email: String,
    pub private_key: String,
    #[serde(default)]
    pub private_key_id: Option<String>,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
}

#[derive(Debug, Serialize)]
struct AssertionClaims<'a> {
    iss: &'a str,
    scope: String,
    aud: &'a str,
    iat: i64,
    exp: i64,
}

impl ServiceAccountKey {
    /// Obtain an access token with the JWT bearer grant.
    pub fn access_token(
        &self,
        http: &Client,
        scopes: &[&str],
        now: DateTime<Utc>,
    ) -> Result<String, CredentialError> {
        let assertion = self.signed_assertion(scopes, now)?;
        let params = [("grant_type", JWT_BEARER_GRANT), ("assertion", assertion.as_str())];
        let response = post_token_request(http, &self.token_uri, &params)?;
        debug!("service account {} authorized", self.client_email);
        Ok(response.access_token)
    }

    fn signed_assertion(&self, scopes: &[&str], now: DateTime<Utc>) -> Result<String, CredentialError> {
        let mut header = Header::new(Algorithm::RS256);
        header.kid = self.private_key_id.clone();
        let claims = AssertionClaims {
            iss: &self.client_email,
            scope: scopes.join(" "),
            aud: &self.token_uri,
            iat: now.timestamp(),
            exp: (now + Duration::hours(1)).timestamp(),
        };
        let key = EncodingKey::from_rsa_pem(self.private_key.as_bytes())?;
        Ok(jsonwebtoken::encode(&header, &claims, &key)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn secrets() -> ClientSecrets {
        serde_json::from_str(
            r#"{"installed": {
                "client_id": "cid.apps.googleusercontent.com",
                "client_secret": "shh",
                "redirect_uris": ["http://localhost:8080/"]
            }}"#,
        )
        .unwrap()
    }

    fn token(expiry: Option<DateTime<Utc>>) -> OAuthToken {
        OAuthToken {
            token: Some("ya29.a0".into()),
            refresh_token: Some("1//refresh".into()),
            token_uri: DEFAULT_TOKEN_URI.into(),
            client_id: "cid".into(),
            client_secret: "shh".into(),
            scopes: vec![GMAIL_SEND_SCOPE.into()],
            expiry,
            extra: serde_json::Map::new(),
        }
    }

    #[test]
    fn test_client_secrets_defaults() {
        let s = secrets();
        assert_eq!(s.installed.token_uri, DEFAULT_TOKEN_URI);
        assert_eq!(s.installed.auth_uri, DEFAULT_AUTH_URI);
    }

    #[test]
    fn test_web_client_alias() {
        let s: ClientSecrets =
            serde_json::from_str(r#"{"web": {"client_id": "a", "client_secret": "b"}}"#).unwrap();
        assert_eq!(s.installed.client_id, "a");
        assert!(s.installed.redirect_uris.is_empty());
    }

    #[test]
    fn test_token_expiry_with_skew() {
        let now = Utc.with_ymd_and_hms(2024, 4, 1, 12, 0, 0).unwrap();
        assert!(token(Some(now + Duration::hours(1))).is_valid(now));
        assert!(token(Some(now + Duration::seconds(5))).is_expired(now));
        assert!(token(Some(now - Duration::seconds(1))).is_expired(now));
        assert!(!token(None).is_expired(now));

        let mut missing = token(None);
        missing.token = None;
        assert!(!missing.is_valid(now));
    }

    #[test]
    fn test_python_token_json_is_readable() {
        let raw = r#"{
            "token": "ya29.x",
            "refresh_token": "1//r",
            "token_uri": "https://oauth2.googleapis.com/token",
            "client_id": "cid",
            "client_secret": "shh",
            "scopes": ["https://www.googleapis.com/auth/gmail.send"],
            "universe_domain": "googleapis.com",
            "expiry": "2024-04-01T12:00:00.123456Z"
        }"#;
        let parsed: OAuthToken = serde_json::from_str(raw).unwrap();
        assert_eq!(parsed.token.as_deref(), Some("ya29.x"));
        assert!(parsed.expiry.is_some());
        assert_eq!(parsed.extra.get("universe_domain").unwrap(), "googleapis.com");

        let back = serde_json::to_value(&parsed).unwrap();
        assert_eq!(back["universe_domain"], "googleapis.com");
    }

    #[test]
    fn test_refresh_without_refresh_token() {
        let mut t = token(None);
        t.refresh_token = None;
        assert!(!t.can_refresh());
        let http = Client::new();
        let err = t.refresh(&http, Utc::now()).unwrap_err();
        assert!(matches!(err, CredentialError::NotRefreshable));
    }

    #[test]
    fn test_authorization_url() {
        let flow = InstalledAppFlow::new(&secrets(), &[GMAIL_SEND_SCOPE]);
        let url = Url::parse(&flow.authorization_url().unwrap()).unwrap();
        let pairs: std::collections::HashMap<_, _> = url.query_pairs().into_owned().collect();
        assert_eq!(pairs["client_id"], "cid.apps.googleusercontent.com");
        assert_eq!(pairs["redirect_uri"], "http://localhost:8080/");
        assert_eq!(pairs["scope"], GMAIL_SEND_SCOPE);
        assert_eq!(pairs["access_type"], "offline");
        assert_eq!(pairs["state"], flow.state());
    }

    #[test]
    fn test_extract_code() {
        let flow = InstalledAppFlow::new(&secrets(), &[GMAIL_SEND_SCOPE]);
        assert_eq!(flow.extract_code("  4/0Abc  ").unwrap(), "4/0Abc");

        let redirect = format!("http://localhost:8080/?state={}&code=4%2F0Xyz&scope=x", flow.state());
        assert_eq!(flow.extract_code(&redirect).unwrap(), "4/0Xyz");

        let forged = "http://localhost:8080/?state=other&code=abc";
        assert!(flow.extract_code(forged).is_err());

        let refused = "http://localhost:8080/?error=access_denied";
        assert!(flow.extract_code(refused).is_err());
        assert!(flow.extract_code("").is_err());
    }
}
