//! Configuration management for the share server
//!
//! Built-in defaults, then an optional `rax-share.toml`, then `RAX_SHARE__*`
//! environment variables. Command-line flags are applied on top by the CLI.

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::collections::{HashMap, HashSet};
use std::net::IpAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::protocol::Protocol;
use crate::server::ListenerConfig;
use crate::server::config::{DEFAULT_SHARE_NAME, DEFAULT_SMB_COMMAND};

/// Config file looked up in the working directory when `--config` is absent.
pub const DEFAULT_CONFIG_FILE: &str = "rax-share";

pub const ENV_PREFIX: &str = "RAX_SHARE";

/// Complete service configuration
#[derive(Debug, Deserialize, Clone)]
pub struct ServiceConfig {
    /// Address every listener binds
    pub address: String,

    /// The one directory all protocols serve
    pub directory: PathBuf,

    pub ports: PortConfig,

    /// Protocols to start, in startup order
    pub enabled: Vec<Protocol>,

    /// SFTP host key; an ephemeral key is generated when unset or unusable
    #[serde(default)]
    pub key_path: Option<PathBuf>,

    pub smb: SmbConfig,

    /// Stop every listener as soon as one fails
    pub fail_fast: bool,

    pub grace_period_secs: u64,

    pub ingest_idle_timeout_secs: u64,

    pub log: LogConfig,
}

#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct PortConfig {
    pub http: u16,
    pub ftp: u16,
    pub smb: u16,
    pub sftp: u16,
    pub ingest: u16,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SmbConfig {
    pub share_name: String,

    /// External SMB server executable, optionally with leading arguments
    pub command: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LogConfig {
    pub level: String,

    /// Per-component overrides, e.g. `http = "debug"`
    #[serde(default)]
    pub components: HashMap<String, String>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            components: HashMap::new(),
        }
    }
}

impl PortConfig {
    pub fn port(&self, protocol: Protocol) -> u16 {
        match protocol {
            Protocol::Http => self.http,
            Protocol::Ftp => self.ftp,
            Protocol::Smb => self.smb,
            Protocol::Sftp => self.sftp,
            Protocol::Ingest => self.ingest,
        }
    }

    pub fn set_port(&mut self, protocol: Protocol, port: u16) {
        match protocol {
            Protocol::Http => self.http = port,
            Protocol::Ftp => self.ftp = port,
            Protocol::Smb => self.smb = port,
            Protocol::Sftp => self.sftp = port,
            Protocol::Ingest => self.ingest = port,
        }
    }
}

impl ServiceConfig {
    /// Load configuration from `path`, or from `rax-share.toml` if present,
    /// with environment overrides. Not validated; flags may still change it.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut builder = Self::defaults(Config::builder())?;

        builder = match path {
            Some(path) => builder.add_source(File::from(path).required(true)),
            None => builder.add_source(File::with_name(DEFAULT_CONFIG_FILE).required(false)),
        };

        let settings = builder
            .add_source(Environment::with_prefix(ENV_PREFIX).separator("__"))
            .build()?;

        settings.try_deserialize()
    }

    fn defaults(
        builder: config::ConfigBuilder<config::builder::DefaultState>,
    ) -> Result<config::ConfigBuilder<config::builder::DefaultState>, ConfigError> {
        let enabled: Vec<&str> = Protocol::ALL.iter().map(|p| p.as_arg()).collect();
        let mut builder = builder
            .set_default("address", "0.0.0.0")?
            .set_default("directory", ".")?
            .set_default("enabled", enabled)?
            .set_default("smb.share_name", DEFAULT_SHARE_NAME)?
            .set_default("smb.command", DEFAULT_SMB_COMMAND)?
            .set_default("fail_fast", false)?
            .set_default("grace_period_secs", 5_i64)?
            .set_default("ingest_idle_timeout_secs", 5_i64)?
            .set_default("log.level", "info")?;

        for protocol in Protocol::ALL {
            builder = builder.set_default(
                format!("ports.{}", protocol.as_arg()),
                i64::from(protocol.default_port()),
            )?;
        }

        Ok(builder)
    }

    /// Validation for all configuration values
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.ip_address()?;

        if self.directory.as_os_str().is_empty() {
            return Err(ConfigError::Message("directory cannot be empty".into()));
        }

        let enabled = self.enabled_protocols();
        if enabled.is_empty() {
            return Err(ConfigError::Message(
                "at least one protocol must be enabled".into(),
            ));
        }

        let mut seen = HashMap::new();
        for protocol in enabled {
            let port = self.ports.port(protocol);
            if port == 0 {
                return Err(ConfigError::Message(format!(
                    "{} port cannot be 0",
                    protocol
                )));
            }
            if let Some(other) = seen.insert(port, protocol) {
                return Err(ConfigError::Message(format!(
                    "{} and {} both use port {}",
                    other, protocol, port
                )));
            }
        }

        if self.smb.share_name.trim().is_empty() {
            return Err(ConfigError::Message("smb.share_name cannot be empty".into()));
        }

        if self.grace_period_secs == 0 {
            return Err(ConfigError::Message(
                "grace_period_secs must be greater than 0".into(),
            ));
        }

        if self.ingest_idle_timeout_secs == 0 {
            return Err(ConfigError::Message(
                "ingest_idle_timeout_secs must be greater than 0".into(),
            ));
        }

        Ok(())
    }

    pub fn ip_address(&self) -> Result<IpAddr, ConfigError> {
        self.address
            .trim()
            .parse()
            .map_err(|_| ConfigError::Message(format!("invalid address: {}", self.address)))
    }

    /// Enabled protocols in startup order, without duplicates.
    pub fn enabled_protocols(&self) -> Vec<Protocol> {
        let mut seen = HashSet::new();
        self.enabled
            .iter()
            .copied()
            .filter(|p| seen.insert(*p))
            .collect()
    }

    pub fn grace_period(&self) -> Duration {
        Duration::from_secs(self.grace_period_secs)
    }

    pub fn ingest_idle_timeout(&self) -> Duration {
        Duration::from_secs(self.ingest_idle_timeout_secs)
    }

    /// One immutable [`ListenerConfig`] per enabled protocol, all serving
    /// `directory`.
    pub fn listener_configs(&self, directory: &Path) -> Result<Vec<ListenerConfig>, ConfigError> {
        let address = self.ip_address()?;

        Ok(self
            .enabled_protocols()
            .into_iter()
            .map(|protocol| ListenerConfig {
                protocol,
                address,
                port: self.ports.port(protocol),
                directory: directory.to_path_buf(),
                key_path: self.key_path.clone(),
                share_name: self.smb.share_name.clone(),
                smb_command: self.smb.command.clone(),
                idle_timeout: self.ingest_idle_timeout(),
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn load_toml(contents: &str) -> Result<ServiceConfig, ConfigError> {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        ServiceConfig::load(Some(file.path()))
    }

    #[test]
    fn defaults_enable_everything_on_standard_ports() {
        let config = load_toml("").unwrap();
        config.validate().unwrap();

        assert_eq!(config.address, "0.0.0.0");
        assert_eq!(config.directory, PathBuf::from("."));
        assert_eq!(config.enabled_protocols(), Protocol::ALL.to_vec());
        for protocol in Protocol::ALL {
            assert_eq!(config.ports.port(protocol), protocol.default_port());
        }
        assert_eq!(config.smb.share_name, "rax");
        assert!(!config.fail_fast);
        assert_eq!(config.grace_period(), Duration::from_secs(5));
        assert_eq!(config.log.level, "info");
    }

    #[test]
    fn file_values_override_defaults() {
        let config = load_toml(
            r#"
            address = "127.0.0.1"
            enabled = ["http", "ingest"]
            fail_fast = true

            [ports]
            http = 8080

            [log.components]
            http = "debug"
            "#,
        )
        .unwrap();
        config.validate().unwrap();

        assert_eq!(config.ports.http, 8080);
        assert_eq!(config.ports.ftp, 2121);
        assert_eq!(
            config.enabled_protocols(),
            vec![Protocol::Http, Protocol::Ingest]
        );
        assert!(config.fail_fast);
        assert_eq!(config.log.components.get("http").unwrap(), "debug");
    }

    #[test]
    fn rejects_port_zero() {
        let mut config = load_toml("").unwrap();
        config.ports.sftp = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_duplicate_ports_only_among_enabled() {
        let mut config = load_toml("").unwrap();
        config.ports.ftp = config.ports.http;
        assert!(config.validate().is_err());

        config.enabled = vec![Protocol::Http, Protocol::Sftp];
        assert!(config.validate().is_ok());
    }

    #[test]
    fn rejects_empty_enabled_list_share_name_and_grace() {
        let mut config = load_toml("").unwrap();
        config.enabled.clear();
        assert!(config.validate().is_err());

        let mut config = load_toml("").unwrap();
        config.smb.share_name = " ".into();
        assert!(config.validate().is_err());

        let mut config = load_toml("").unwrap();
        config.grace_period_secs = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_bad_address() {
        let mut config = load_toml("").unwrap();
        config.address = "not-an-ip".into();
        assert!(config.validate().is_err());
    }

    #[test]
    fn listener_configs_follow_enabled_order() {
        let mut config = load_toml("").unwrap();
        config.address = "127.0.0.1".into();
        config.enabled = vec![Protocol::Sftp, Protocol::Http, Protocol::Sftp];

        let listeners = config.listener_configs(Path::new("/srv")).unwrap();
        assert_eq!(listeners.len(), 2);
        assert_eq!(listeners[0].protocol, Protocol::Sftp);
        assert_eq!(listeners[0].port, 2222);
        assert_eq!(listeners[1].protocol, Protocol::Http);
        assert_eq!(listeners[1].directory, PathBuf::from("/srv"));
        assert_eq!(listeners[1].address.to_string(), "127.0.0.1");
    }

    #[test]
    fn missing_explicit_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(ServiceConfig::load(Some(&dir.path().join("absent.toml"))).is_err());
    }
}
