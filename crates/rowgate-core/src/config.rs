use crate::error::{Result, RowgateError};
use serde::{Deserialize, Serialize};
use std::path::Path;

// ---------------------------------------------------------------------------
// ConfigWarning / WarnLevel
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigWarning {
    pub level: WarnLevel,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarnLevel {
    Warning,
    Error,
}

// ---------------------------------------------------------------------------
// EnvelopeStyle / MissingActionPolicy
// ---------------------------------------------------------------------------

/// Shape of the error envelope. `Flag` keeps `status: 1` with a `message`
/// key; `HttpCode` sets `status` numerically equal to the HTTP status with
/// a `msg` key. Both shapes exist in deployed clients, so both are kept.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnvelopeStyle {
    #[default]
    Flag,
    HttpCode,
}

/// What to do when no descriptor row exists for an (action, method) pair.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MissingActionPolicy {
    /// Answer 404 (default).
    #[default]
    Reject,
    /// Proceed anonymously with whatever template came back (the empty
    /// string on a clean miss).
    Permissive,
}

// ---------------------------------------------------------------------------
// ConnectConfig
// ---------------------------------------------------------------------------

/// Third-party identity provider settings. All fields default to empty;
/// the connect endpoints answer with a provider error until configured.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectConfig {
    #[serde(default)]
    pub app_id: String,
    #[serde(default)]
    pub secret: String,
    /// Authorization-code exchange endpoint.
    #[serde(default)]
    pub auth_url: String,
    /// Client-credential access-token endpoint (signed requests, step one).
    #[serde(default)]
    pub token_url: String,
    /// Page-ticket endpoint (signed requests, step two).
    #[serde(default)]
    pub ticket_url: String,
}

impl ConnectConfig {
    pub fn login_configured(&self) -> bool {
        !self.app_id.is_empty() && !self.secret.is_empty() && !self.auth_url.is_empty()
    }

    pub fn signature_configured(&self) -> bool {
        !self.app_id.is_empty()
            && !self.secret.is_empty()
            && !self.token_url.is_empty()
            && !self.ticket_url.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Config (top-level)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// Database driver: `postgres`, `mysql`, or `sqlite`.
    pub driver: String,
    pub dsn: String,
    /// Descriptor lookup query. Takes exactly two positional parameters
    /// (action, method) and returns exactly two columns (template text,
    /// nullable auth flag). This contract is shared with the external
    /// store and must not change shape.
    pub query: String,
    /// Catch-all route pattern; must contain `{action}`.
    #[serde(default = "default_api_route")]
    pub api: String,
    #[serde(default = "default_port")]
    pub port: u16,

    pub jwt_secret: String,
    /// Token lifetime in seconds.
    #[serde(default = "default_jwt_expire")]
    pub jwt_expire: i64,
    #[serde(default = "default_jwt_issuer")]
    pub jwt_issuer: String,

    #[serde(default)]
    pub connect: ConnectConfig,

    #[serde(default = "default_login_path")]
    pub login_path: String,
    #[serde(default = "default_connect_path")]
    pub connect_path: String,
    /// Action name the local login flow looks up in the descriptor store.
    #[serde(default = "default_login_action")]
    pub login_action: String,
    /// Action name the third-party login flow looks up.
    #[serde(default = "default_connect_action")]
    pub connect_action: String,
    /// Reserved GET action answered by the signed-request provider.
    #[serde(default = "default_signature_action")]
    pub signature_action: String,

    #[serde(default)]
    pub envelope: EnvelopeStyle,
    #[serde(default)]
    pub missing_action: MissingActionPolicy,
}

fn default_api_route() -> String {
    "/api/{action}".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_jwt_expire() -> i64 {
    7200
}

fn default_jwt_issuer() -> String {
    "rowgate".to_string()
}

fn default_login_path() -> String {
    "/login".to_string()
}

fn default_connect_path() -> String {
    "/connect".to_string()
}

fn default_login_action() -> String {
    "login".to_string()
}

fn default_connect_action() -> String {
    "connect".to_string()
}

fn default_signature_action() -> String {
    "signature".to_string()
}

const SUPPORTED_DRIVERS: &[&str] = &["postgres", "postgresql", "mysql", "sqlite", "sqlite3"];

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(RowgateError::ConfigNotFound(path.display().to_string()));
        }
        let data = std::fs::read_to_string(path)?;
        let cfg: Config = serde_json::from_str(&data)?;
        Ok(cfg)
    }

    // -----------------------------------------------------------------------
    // Validation
    // -----------------------------------------------------------------------

    pub fn validate(&self) -> Vec<ConfigWarning> {
        let mut warnings = Vec::new();

        if !SUPPORTED_DRIVERS.contains(&self.driver.as_str()) {
            warnings.push(ConfigWarning {
                level: WarnLevel::Error,
                message: format!(
                    "unsupported driver '{}' (expected postgres, mysql, or sqlite)",
                    self.driver
                ),
            });
        }

        if self.dsn.trim().is_empty() {
            warnings.push(ConfigWarning {
                level: WarnLevel::Error,
                message: "dsn is empty".to_string(),
            });
        }

        if self.query.trim().is_empty() {
            warnings.push(ConfigWarning {
                level: WarnLevel::Error,
                message: "query is empty — the dispatcher cannot look up any action".to_string(),
            });
        }

        if !self.api.contains("{action}") {
            warnings.push(ConfigWarning {
                level: WarnLevel::Error,
                message: format!("api route '{}' does not contain an {{action}} segment", self.api),
            });
        }

        if self.jwt_secret.is_empty() {
            warnings.push(ConfigWarning {
                level: WarnLevel::Error,
                message: "jwtSecret is empty — session tokens cannot be signed".to_string(),
            });
        }

        if self.jwt_expire <= 0 {
            warnings.push(ConfigWarning {
                level: WarnLevel::Warning,
                message: format!("jwtExpire={} issues tokens that are already expired", self.jwt_expire),
            });
        }

        let c = &self.connect;
        let any_connect = !c.app_id.is_empty()
            || !c.secret.is_empty()
            || !c.auth_url.is_empty()
            || !c.token_url.is_empty()
            || !c.ticket_url.is_empty();
        if any_connect && !c.login_configured() {
            warnings.push(ConfigWarning {
                level: WarnLevel::Warning,
                message: "connect is partially configured — third-party login needs appId, secret, and authUrl".to_string(),
            });
        }
        if any_connect && !c.signature_configured() {
            warnings.push(ConfigWarning {
                level: WarnLevel::Warning,
                message: "connect is partially configured — signed requests need appId, secret, tokenUrl, and ticketUrl".to_string(),
            });
        }

        warnings
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal_json() -> &'static str {
        r#"{
            "driver": "sqlite",
            "dsn": "sqlite://api.db",
            "query": "SELECT template, auth FROM api WHERE action = ? AND method = ?",
            "jwtSecret": "s3cret"
        }"#
    }

    #[test]
    fn minimal_config_fills_defaults() {
        let cfg: Config = serde_json::from_str(minimal_json()).unwrap();
        assert_eq!(cfg.api, "/api/{action}");
        assert_eq!(cfg.port, 8080);
        assert_eq!(cfg.jwt_expire, 7200);
        assert_eq!(cfg.jwt_issuer, "rowgate");
        assert_eq!(cfg.login_path, "/login");
        assert_eq!(cfg.connect_path, "/connect");
        assert_eq!(cfg.login_action, "login");
        assert_eq!(cfg.connect_action, "connect");
        assert_eq!(cfg.signature_action, "signature");
        assert_eq!(cfg.envelope, EnvelopeStyle::Flag);
        assert_eq!(cfg.missing_action, MissingActionPolicy::Reject);
        assert!(cfg.connect.app_id.is_empty());
    }

    #[test]
    fn minimal_config_validates_clean() {
        let cfg: Config = serde_json::from_str(minimal_json()).unwrap();
        assert!(cfg.validate().is_empty());
    }

    #[test]
    fn envelope_and_policy_parse_snake_case() {
        let json = r#"{
            "driver": "mysql",
            "dsn": "mysql://u:p@localhost/api",
            "query": "SELECT template, auth FROM api WHERE action = ? AND method = ?",
            "jwtSecret": "s",
            "envelope": "http_code",
            "missingAction": "permissive"
        }"#;
        let cfg: Config = serde_json::from_str(json).unwrap();
        assert_eq!(cfg.envelope, EnvelopeStyle::HttpCode);
        assert_eq!(cfg.missing_action, MissingActionPolicy::Permissive);
    }

    #[test]
    fn config_roundtrip() {
        let cfg: Config = serde_json::from_str(minimal_json()).unwrap();
        let out = serde_json::to_string(&cfg).unwrap();
        let parsed: Config = serde_json::from_str(&out).unwrap();
        assert_eq!(parsed.driver, "sqlite");
        assert_eq!(parsed.port, cfg.port);
    }

    #[test]
    fn unknown_driver_is_an_error() {
        let mut cfg: Config = serde_json::from_str(minimal_json()).unwrap();
        cfg.driver = "mssql".to_string();
        let warnings = cfg.validate();
        assert!(warnings
            .iter()
            .any(|w| w.level == WarnLevel::Error && w.message.contains("unsupported driver")));
    }

    #[test]
    fn empty_secret_is_an_error() {
        let mut cfg: Config = serde_json::from_str(minimal_json()).unwrap();
        cfg.jwt_secret = String::new();
        let warnings = cfg.validate();
        assert!(warnings.iter().any(|w| w.message.contains("jwtSecret")));
    }

    #[test]
    fn api_without_action_segment_is_an_error() {
        let mut cfg: Config = serde_json::from_str(minimal_json()).unwrap();
        cfg.api = "/api/fixed".to_string();
        let warnings = cfg.validate();
        assert!(warnings.iter().any(|w| w.message.contains("{action}")));
    }

    #[test]
    fn partial_connect_config_warns() {
        let mut cfg: Config = serde_json::from_str(minimal_json()).unwrap();
        cfg.connect.app_id = "app-1".to_string();
        let warnings = cfg.validate();
        assert!(warnings
            .iter()
            .any(|w| w.level == WarnLevel::Warning && w.message.contains("partially configured")));
    }

    #[test]
    fn negative_expiry_warns() {
        let mut cfg: Config = serde_json::from_str(minimal_json()).unwrap();
        cfg.jwt_expire = -5;
        let warnings = cfg.validate();
        assert!(warnings.iter().any(|w| w.level == WarnLevel::Warning));
    }

    #[test]
    fn load_missing_file_errors() {
        let err = Config::load(Path::new("/nonexistent/rowgate.json")).unwrap_err();
        assert!(matches!(err, RowgateError::ConfigNotFound(_)));
    }
}
