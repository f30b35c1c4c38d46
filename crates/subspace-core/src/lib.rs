use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use url::Url;

pub const CONFIG_FILE_NAME: &str = "gateway.toml";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {message}")]
    Read { path: PathBuf, message: String },
    #[error("invalid TOML in {path}: {message}")]
    Parse { path: PathBuf, message: String },
    #[error("invalid configuration: {0}")]
    Invalid(String),
    #[error("failed to write {path}: {message}")]
    Write { path: PathBuf, message: String },
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSettings {
    pub cookie_name: String,
    pub sso_cookie_name: String,
    pub secret_env: String,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            cookie_name: "__subspace_session".to_string(),
            sso_cookie_name: "__subspace_sso_session".to_string(),
            secret_env: "SUBSPACE_SESSION_SECRET".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouteSettings {
    pub signin: String,
    pub configure: String,
}

impl Default for RouteSettings {
    fn default() -> Self {
        Self {
            signin: "/signin".to_string(),
            configure: "/configure".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FederationSettings {
    pub enabled: bool,
    pub idp_sso_url: Option<Url>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    pub http_host: String,
    pub listen: SocketAddr,
    pub secure_cookies: bool,
    pub log_format: LogFormat,
    pub session: SessionSettings,
    pub routes: RouteSettings,
    pub federation: FederationSettings,
}

pub fn validate_config(config: &GatewayConfig) -> Result<(), ConfigError> {
    if config.http_host.trim().is_empty() {
        return Err(ConfigError::Invalid("http_host must not be empty".to_string()));
    }
    for (key, name) in [
        ("session.cookie_name", &config.session.cookie_name),
        ("session.sso_cookie_name", &config.session.sso_cookie_name),
    ] {
        if !is_cookie_token(name) {
            return Err(ConfigError::Invalid(format!(
                "{key} {name:?} is not a valid cookie name"
            )));
        }
    }
    if config.session.cookie_name == config.session.sso_cookie_name {
        return Err(ConfigError::Invalid(
            "session.cookie_name and session.sso_cookie_name must differ".to_string(),
        ));
    }
    if config.session.secret_env.trim().is_empty() {
        return Err(ConfigError::Invalid(
            "session.secret_env must name an environment variable".to_string(),
        ));
    }
    for (key, path) in [
        ("routes.signin", &config.routes.signin),
        ("routes.configure", &config.routes.configure),
    ] {
        if !path.starts_with('/') {
            return Err(ConfigError::Invalid(format!(
                "{key} must be an absolute path, got {path:?}"
            )));
        }
    }
    if config.federation.enabled && config.federation.idp_sso_url.is_none() {
        return Err(ConfigError::Invalid(
            "federation.idp_sso_url is required when federation is enabled".to_string(),
        ));
    }
    Ok(())
}

fn is_cookie_token(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_graphic() && !"()<>@,;:\\\"/[]?={}".contains(c))
}

#[derive(Debug, Deserialize)]
struct RawConfig {
    http_host: String,
    #[serde(default = "default_listen")]
    listen: SocketAddr,
    #[serde(default)]
    secure_cookies: bool,
    #[serde(default)]
    log_format: LogFormat,
    #[serde(default)]
    session: RawSession,
    #[serde(default)]
    routes: RawRoutes,
    #[serde(default)]
    federation: FederationSettings,
}

#[derive(Debug, Default, Deserialize)]
struct RawSession {
    cookie_name: Option<String>,
    sso_cookie_name: Option<String>,
    secret_env: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct RawRoutes {
    signin: Option<String>,
    configure: Option<String>,
}

fn default_listen() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 8080))
}

pub fn default_config_dir() -> PathBuf {
    if let Ok(home) = std::env::var("HOME") {
        PathBuf::from(home).join(".config").join("subspace")
    } else {
        PathBuf::from(".subspace")
    }
}

pub fn load_config_from_dir(dir: &Path) -> Result<GatewayConfig, ConfigError> {
    load_config_from_file(&dir.join(CONFIG_FILE_NAME))
}

pub fn load_config_from_file(path: &Path) -> Result<GatewayConfig, ConfigError> {
    let content = fs::read_to_string(path).map_err(|e| ConfigError::Read {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;
    let config = parse_config(&content).map_err(|e| match e {
        ConfigError::Parse { message, .. } => ConfigError::Parse {
            path: path.to_path_buf(),
            message,
        },
        other => other,
    })?;
    Ok(config)
}

pub fn parse_config(content: &str) -> Result<GatewayConfig, ConfigError> {
    let raw: RawConfig = toml::from_str(content).map_err(|e| ConfigError::Parse {
        path: PathBuf::from("<inline>"),
        message: e.to_string(),
    })?;

    let session_defaults = SessionSettings::default();
    let route_defaults = RouteSettings::default();

    let config = GatewayConfig {
        http_host: raw.http_host,
        listen: raw.listen,
        secure_cookies: raw.secure_cookies,
        log_format: raw.log_format,
        session: SessionSettings {
            cookie_name: raw
                .session
                .cookie_name
                .unwrap_or(session_defaults.cookie_name),
            sso_cookie_name: raw
                .session
                .sso_cookie_name
                .unwrap_or(session_defaults.sso_cookie_name),
            secret_env: raw
                .session
                .secret_env
                .unwrap_or(session_defaults.secret_env),
        },
        routes: RouteSettings {
            signin: raw.routes.signin.unwrap_or(route_defaults.signin),
            configure: raw.routes.configure.unwrap_or(route_defaults.configure),
        },
        federation: raw.federation,
    };

    validate_config(&config)?;
    Ok(config)
}

pub fn write_default_config_file(dir: &Path) -> Result<PathBuf, ConfigError> {
    fs::create_dir_all(dir).map_err(|e| ConfigError::Write {
        path: dir.to_path_buf(),
        message: e.to_string(),
    })?;

    let path = dir.join(CONFIG_FILE_NAME);
    if !path.exists() {
        fs::write(&path, include_str!("../../../docs/gateway.toml.example")).map_err(|e| {
            ConfigError::Write {
                path: path.clone(),
                message: e.to_string(),
            }
        })?;
    }
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_config_gets_defaults() {
        let cfg = parse_config("http_host = \"vpn.example.com\"").unwrap();
        assert_eq!(cfg.listen, default_listen());
        assert!(!cfg.secure_cookies);
        assert_eq!(cfg.log_format, LogFormat::Pretty);
        assert_eq!(cfg.session.cookie_name, "__subspace_session");
        assert_eq!(cfg.session.sso_cookie_name, "__subspace_sso_session");
        assert_eq!(cfg.routes.signin, "/signin");
        assert_eq!(cfg.routes.configure, "/configure");
        assert!(!cfg.federation.enabled);
    }

    #[test]
    fn example_file_parses() {
        let cfg = parse_config(include_str!("../../../docs/gateway.toml.example")).unwrap();
        assert_eq!(cfg.http_host, "vpn.example.com");
    }

    #[test]
    fn federation_requires_sso_url() {
        let err = parse_config(
            "http_host = \"h\"\n[federation]\nenabled = true\n",
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));

        let cfg = parse_config(
            "http_host = \"h\"\n[federation]\nenabled = true\nidp_sso_url = \"https://login.okta.com/sso\"\n",
        )
        .unwrap();
        assert!(cfg.federation.enabled);
    }

    #[test]
    fn rejects_bad_values() {
        assert!(parse_config("http_host = \"\"").is_err());
        assert!(parse_config("http_host = \"h\"\n[session]\ncookie_name = \"a b\"\n").is_err());
        assert!(
            parse_config("http_host = \"h\"\n[session]\nsso_cookie_name = \"__subspace_session\"\n")
                .is_err()
        );
        assert!(parse_config("http_host = \"h\"\n[routes]\nsignin = \"signin\"\n").is_err());
        assert!(matches!(
            parse_config("http_host = ").unwrap_err(),
            ConfigError::Parse { .. }
        ));
    }

    #[test]
    fn default_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_default_config_file(dir.path()).unwrap();
        assert!(path.ends_with(CONFIG_FILE_NAME));
        let cfg = load_config_from_dir(dir.path()).unwrap();
        assert_eq!(cfg.session.secret_env, "SUBSPACE_SESSION_SECRET");
    }

    #[test]
    fn missing_file_reports_path() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_config_from_dir(dir.path()).unwrap_err();
        assert!(err.to_string().contains(CONFIG_FILE_NAME));
    }
}
