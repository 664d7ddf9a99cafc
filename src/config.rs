//! Run configuration.
//!
//! Values come from the process environment, optionally seeded from a
//! `.env` file. Each run validates every key it needs in one pass so the
//! operator sees the full list of what is missing.

use crate::error::{ConfigError, InvalidValue};
use crate::services::google_auth::{ClientSecrets, OAuthToken, ServiceAccountKey};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use log::{error, info};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};

/// Configuration keys.
pub mod keys {
    pub const VENMO_ACCESS_TOKEN: &str = "VENMO_ACCESS_TOKEN";
    pub const SERVICE_ACCOUNT_CREDENTIALS: &str = "SERVICE_ACCOUNT_CREDENTIALS";
    pub const SPREADSHEET_KEY: &str = "SPREADSHEET_KEY";
    pub const RECIPIENT_EMAIL: &str = "RECIPIENT_EMAIL";
    pub const EMAIL_OAUTH_CREDENTIALS: &str = "EMAIL_OAUTH_CREDENTIALS";
    pub const EMAIL_OAUTH_TOKEN: &str = "EMAIL_OAUTH_TOKEN";
    pub const TELEGRAM_BOT_TOKEN: &str = "TELEGRAM_BOT_TOKEN";
    pub const TELEGRAM_CHAT_ID: &str = "TELEGRAM_CHAT_ID";
}

/// Default location of the configuration store.
pub const DEFAULT_ENV_FILE: &str = ".env";

/// Decode a base64-encoded JSON blob.
///
/// Blobs written by older tooling are wrapped as a bytes literal
/// (`b'...'`); the wrapper is stripped before decoding.
pub fn decode_blob<T: DeserializeOwned>(raw: &str) -> Result<T, String> {
    let trimmed = raw.trim();
    let inner = trimmed
        .strip_prefix("b'")
        .and_then(|s| s.strip_suffix('\''))
        .unwrap_or(trimmed);
    let bytes = STANDARD
        .decode(inner)
        .map_err(|e| format!("not valid base64: {}", e))?;
    serde_json::from_slice(&bytes).map_err(|e| format!("not valid JSON: {}", e))
}

/// Encode a value as a base64 JSON blob.
pub fn encode_blob<T: Serialize>(value: &T) -> Result<String, ConfigError> {
    let json = serde_json::to_vec(value).map_err(|e| ConfigError::Invalid {
        key: "blob".into(),
        reason: e.to_string(),
    })?;
    Ok(STANDARD.encode(json))
}

/// Collects required values, remembering every one that is absent or
/// undecodable.
///
/// `require` and `require_blob` only return `None` after recording the
/// problem, so a config assembled from their results is either complete
/// or accompanied by at least one diagnostic.
struct Requirements<'a> {
    lookup: &'a dyn Fn(&str) -> Option<String>,
    missing: Vec<String>,
    invalid: Vec<InvalidValue>,
}

impl<'a> Requirements<'a> {
    fn new(lookup: &'a dyn Fn(&str) -> Option<String>) -> Self {
        Self {
            lookup,
            missing: Vec::new(),
            invalid: Vec::new(),
        }
    }

    fn optional(&self, key: &str) -> Option<String> {
        (self.lookup)(key).filter(|v| !v.trim().is_empty())
    }

    fn require(&mut self, key: &str) -> Option<String> {
        match self.optional(key) {
            Some(value) => {
                info!("✅ {} is available in the environment.", key);
                Some(value)
            }
            None => {
                error!("❌ Can't find {} in environment.", key);
                self.missing.push(key.to_string());
                None
            }
        }
    }

    fn require_blob<T: DeserializeOwned>(&mut self, key: &str) -> Option<T> {
        let raw = self.require(key)?;
        match decode_blob(&raw) {
            Ok(value) => Some(value),
            Err(reason) => {
                error!("❌ {} could not be decoded: {}", key, reason);
                self.invalid.push(InvalidValue {
                    key: key.to_string(),
                    reason,
                });
                None
            }
        }
    }

    /// Hand back the assembled config, or every problem found on the way.
    fn finish<T>(self, assembled: Option<T>) -> Result<T, ConfigError> {
        match assembled {
            Some(config) if self.missing.is_empty() && self.invalid.is_empty() => Ok(config),
            _ => Err(ConfigError::Incomplete {
                missing: self.missing,
                invalid: self.invalid,
            }),
        }
    }
}

/// Where and how to mail the summary.
#[derive(Debug, Clone)]
pub struct EmailConfig {
    pub recipient: String,
    pub client_secrets: ClientSecrets,
    pub token: OAuthToken,
}

/// Optional chat channel for the summary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TelegramConfig {
    pub bot_token: String,
    pub chat_id: String,
}

fn telegram(req: &Requirements<'_>) -> Option<TelegramConfig> {
    match (req.optional(keys::TELEGRAM_BOT_TOKEN), req.optional(keys::TELEGRAM_CHAT_ID)) {
        (Some(bot_token), Some(chat_id)) => Some(TelegramConfig { bot_token, chat_id }),
        _ => None,
    }
}

fn email(req: &mut Requirements<'_>) -> Option<EmailConfig> {
    let recipient = req.require(keys::RECIPIENT_EMAIL);
    let client_secrets = req.require_blob(keys::EMAIL_OAUTH_CREDENTIALS);
    let token = req.require_blob(keys::EMAIL_OAUTH_TOKEN);
    Some(EmailConfig {
        recipient: recipient?,
        client_secrets: client_secrets?,
        token: token?,
    })
}

/// Everything the monthly billing run needs.
#[derive(Debug, Clone)]
pub struct BillingConfig {
    pub venmo_access_token: String,
    pub service_account: ServiceAccountKey,
    pub spreadsheet_key: String,
    pub email: EmailConfig,
    pub telegram: Option<TelegramConfig>,
}

impl BillingConfig {
    pub fn from_lookup(lookup: &dyn Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut req = Requirements::new(lookup);
        let venmo_access_token = req.require(keys::VENMO_ACCESS_TOKEN);
        let service_account = req.require_blob(keys::SERVICE_ACCOUNT_CREDENTIALS);
        let spreadsheet_key = req.require(keys::SPREADSHEET_KEY);
        let email = email(&mut req);
        let telegram = telegram(&req);

        let assembled = (|| {
            Some(Self {
                venmo_access_token: venmo_access_token?,
                service_account: service_account?,
                spreadsheet_key: spreadsheet_key?,
                email: email?,
                telegram,
            })
        })();
        req.finish(assembled)
    }
}

/// Everything the late sweep needs.
#[derive(Debug, Clone)]
pub struct LateSweepConfig {
    pub venmo_access_token: String,
    pub email: EmailConfig,
    pub telegram: Option<TelegramConfig>,
}

impl LateSweepConfig {
    pub fn from_lookup(lookup: &dyn Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut req = Requirements::new(lookup);
        let venmo_access_token = req.require(keys::VENMO_ACCESS_TOKEN);
        let email = email(&mut req);
        let telegram = telegram(&req);

        let assembled = (|| {
            Some(Self {
                venmo_access_token: venmo_access_token?,
                email: email?,
                telegram,
            })
        })();
        req.finish(assembled)
    }
}

/// Everything the credential refresh needs.
#[derive(Debug, Clone)]
pub struct RefreshConfig {
    pub client_secrets: ClientSecrets,
    pub token: OAuthToken,
}

impl RefreshConfig {
    pub fn from_lookup(lookup: &dyn Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut req = Requirements::new(lookup);
        let client_secrets = req.require_blob(keys::EMAIL_OAUTH_CREDENTIALS);
        let token = req.require_blob(keys::EMAIL_OAUTH_TOKEN);

        let assembled = (|| {
            Some(Self {
                client_secrets: client_secrets?,
                token: token?,
            })
        })();
        req.finish(assembled)
    }
}

/// Look a key up in the process environment.
pub fn process_env(key: &str) -> Option<String> {
    std::env::var(key).ok()
}

/// Persistent home of configuration values.
pub trait ConfigStore {
    fn persist(&mut self, key: &str, value: &str) -> Result<(), ConfigError>;
}

/// A dotenv file rewritten in place.
///
/// The line assigning `key` is replaced; if there is none the assignment
/// is appended. Every other line is kept as is.
#[derive(Debug, Clone)]
pub struct EnvFileStore {
    path: PathBuf,
}

impl EnvFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

fn assigns(line: &str, key: &str) -> bool {
    let line = line.trim_start();
    let line = line.strip_prefix("export ").unwrap_or(line).trim_start();
    line.strip_prefix(key)
        .map_or(false, |rest| rest.trim_start().starts_with('='))
}

fn rewrite_env(contents: &str, key: &str, value: &str) -> String {
    let assignment = format!("{}={}", key, value);
    let mut replaced = false;
    let mut lines: Vec<String> = contents
        .lines()
        .map(|line| {
            if !replaced && assigns(line, key) {
                replaced = true;
                assignment.clone()
            } else {
                line.to_string()
            }
        })
        .collect();
    if !replaced {
        lines.push(assignment);
    }
    let mut out = lines.join("\n");
    out.push('\n');
    out
}

impl ConfigStore for EnvFileStore {
    fn persist(&mut self, key: &str, value: &str) -> Result<(), ConfigError> {
        let contents = match fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => String::new(),
            Err(e) => return Err(e.into()),
        };
        fs::write(&self.path, rewrite_env(&contents, key, value))?;
        info!("updated {} in {}", key, self.path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn blob(json: &str) -> String {
        STANDARD.encode(json)
    }

    fn base_env() -> HashMap<&'static str, String> {
        let mut env = HashMap::new();
        env.insert(keys::VENMO_ACCESS_TOKEN, "venmo-token".to_string());
        env.insert(
            keys::SERVICE_ACCOUNT_CREDENTIALS,
            blob(r#"{"client_email": "svc@x.iam.gserviceaccount.com", "private_key": "k"}"#),
        );
        env.insert(keys::SPREADSHEET_KEY, "sheet-key".to_string());
        env.insert(keys::RECIPIENT_EMAIL, "treasurer@example.com".to_string());
        env.insert(
            keys::EMAIL_OAUTH_CREDENTIALS,
            format!("b'{}'", blob(r#"{"installed": {"client_id": "c", "client_secret": "s"}}"#)),
        );
        env.insert(
            keys::EMAIL_OAUTH_TOKEN,
            blob(r#"{"token": "t", "refresh_token": "r", "client_id": "c", "client_secret": "s"}"#),
        );
        env
    }

    fn lookup<'a>(env: &'a HashMap<&'static str, String>) -> impl Fn(&str) -> Option<String> + 'a {
        move |key: &str| env.get(key).cloned()
    }

    #[test]
    fn test_billing_config_complete() {
        let env = base_env();
        let config = BillingConfig::from_lookup(&lookup(&env)).unwrap();
        assert_eq!(config.venmo_access_token, "venmo-token");
        assert_eq!(config.spreadsheet_key, "sheet-key");
        assert_eq!(config.email.client_secrets.installed.client_id, "c");
        assert_eq!(config.email.token.refresh_token.as_deref(), Some("r"));
        assert!(config.telegram.is_none());
    }

    #[test]
    fn test_all_missing_keys_reported_at_once() {
        let mut env = base_env();
        env.remove(keys::VENMO_ACCESS_TOKEN);
        env.remove(keys::RECIPIENT_EMAIL);
        env.insert(keys::SPREADSHEET_KEY, "   ".to_string());

        let err = BillingConfig::from_lookup(&lookup(&env)).unwrap_err();
        match err {
            ConfigError::Incomplete { missing, invalid } => {
                assert_eq!(
                    missing,
                    vec!["VENMO_ACCESS_TOKEN", "SPREADSHEET_KEY", "RECIPIENT_EMAIL"]
                );
                assert!(invalid.is_empty());
            }
            other => panic!("unexpected error: {}", other),
        }
    }

    #[test]
    fn test_undecodable_blob_is_invalid() {
        let mut env = base_env();
        env.insert(keys::EMAIL_OAUTH_TOKEN, "%%%".to_string());
        let err = RefreshConfig::from_lookup(&lookup(&env)).unwrap_err();
        match err {
            ConfigError::Incomplete { missing, invalid } => {
                assert!(missing.is_empty());
                assert_eq!(invalid.len(), 1);
                assert_eq!(invalid[0].key, "EMAIL_OAUTH_TOKEN");
            }
            other => panic!("unexpected error: {}", other),
        }
    }

    #[test]
    fn test_missing_and_invalid_keys_reported_together() {
        let mut env = base_env();
        env.remove(keys::SPREADSHEET_KEY);
        env.insert(keys::SERVICE_ACCOUNT_CREDENTIALS, "not base64!".to_string());
        env.insert(keys::EMAIL_OAUTH_TOKEN, STANDARD.encode("not json"));

        let err = BillingConfig::from_lookup(&lookup(&env)).unwrap_err();
        match err {
            ConfigError::Incomplete { missing, invalid } => {
                assert_eq!(missing, vec!["SPREADSHEET_KEY"]);
                let keys: Vec<&str> = invalid.iter().map(|v| v.key.as_str()).collect();
                assert_eq!(keys, vec!["SERVICE_ACCOUNT_CREDENTIALS", "EMAIL_OAUTH_TOKEN"]);
            }
            other => panic!("unexpected error: {}", other),
        }
    }

    #[test]
    fn test_problem_report_never_empty() {
        let env: HashMap<&'static str, String> = HashMap::new();
        let err = RefreshConfig::from_lookup(&lookup(&env)).unwrap_err();
        assert_eq!(
            err.to_string(),
            "missing required configuration: EMAIL_OAUTH_CREDENTIALS, EMAIL_OAUTH_TOKEN"
        );
    }

    #[test]
    fn test_late_sweep_needs_no_spreadsheet() {
        let mut env = base_env();
        env.remove(keys::SPREADSHEET_KEY);
        env.remove(keys::SERVICE_ACCOUNT_CREDENTIALS);
        env.insert(keys::TELEGRAM_BOT_TOKEN, "bot".to_string());
        env.insert(keys::TELEGRAM_CHAT_ID, "chat".to_string());
        let config = LateSweepConfig::from_lookup(&lookup(&env)).unwrap();
        assert_eq!(
            config.telegram,
            Some(TelegramConfig {
                bot_token: "bot".into(),
                chat_id: "chat".into()
            })
        );
    }

    #[test]
    fn test_blob_round_trip_and_legacy_wrapper() {
        let token: OAuthToken = decode_blob(&base_env()[keys::EMAIL_OAUTH_TOKEN]).unwrap();
        let encoded = encode_blob(&token).unwrap();
        let again: OAuthToken = decode_blob(&encoded).unwrap();
        assert_eq!(token, again);

        let wrapped: OAuthToken = decode_blob(&format!("b'{}'", encoded)).unwrap();
        assert_eq!(token, wrapped);
    }

    #[test]
    fn test_rewrite_env_replaces_only_target() {
        let contents = "# secrets\nEMAIL_OAUTH_TOKEN=old\nexport OTHER=1\nEMAIL_OAUTH_TOKEN_BACKUP=x\n";
        let out = rewrite_env(contents, "EMAIL_OAUTH_TOKEN", "new");
        assert_eq!(
            out,
            "# secrets\nEMAIL_OAUTH_TOKEN=new\nexport OTHER=1\nEMAIL_OAUTH_TOKEN_BACKUP=x\n"
        );
    }

    #[test]
    fn test_rewrite_env_appends_when_absent() {
        let out = rewrite_env("A=1", "B", "2");
        assert_eq!(out, "A=1\nB=2\n");
        assert_eq!(rewrite_env("", "B", "2"), "B=2\n");
    }

    #[test]
    fn test_env_file_store_persists() {
        let path = std::env::temp_dir().join(format!("tuition-billing-{}.env", uuid::Uuid::new_v4()));
        fs::write(&path, "EMAIL_OAUTH_TOKEN=old\n").unwrap();
        let mut store = EnvFileStore::new(&path);
        store.persist("EMAIL_OAUTH_TOKEN", "fresh").unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "EMAIL_OAUTH_TOKEN=fresh\n");
        fs::remove_file(&path).unwrap();
    }
}
