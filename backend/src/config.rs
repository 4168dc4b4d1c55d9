//! Configuration management.

use crate::paths::{DataPaths, PathConfig};
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Configuration structure that matches the TOML file format.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct ConfigFile {
    #[serde(default)]
    server: ServerConfig,
    #[serde(default)]
    rtsp: RtspConfig,
    #[serde(default)]
    transcoder: TranscoderConfig,
    #[serde(default)]
    storage: StorageConfig,
    #[serde(default)]
    discovery: DiscoveryConfig,
    #[serde(default)]
    logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ServerConfig {
    #[serde(default = "default_port")]
    port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
        }
    }
}

fn default_port() -> u16 {
    usbcam_types::DEFAULT_PORT
}

/// Streaming server the transcoder publishes to, and the credential gate it calls back.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RtspConfig {
    pub host: String,
    pub tcp_port: u16,
    /// Value of `-rtsp_transport` passed to the transcoder.
    pub transport: String,
    /// Listen address of the credential gate.
    pub auth_server: String,
    /// Secret holding the stream credentials.
    pub credential_secret: String,
}

impl Default for RtspConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            tcp_port: 8554,
            transport: "tcp".to_string(),
            auth_server: "localhost:8000".to_string(),
            credential_secret: "rtspauth".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TranscoderConfig {
    pub program: String,
    /// Arguments placed before the generated ones, e.g. `-hide_banner`.
    pub leading_args: Vec<String>,
    pub startup_grace_ms: u64,
    /// Transcoder log level; `trace` also shows progress statistics.
    pub log_level: String,
}

impl Default for TranscoderConfig {
    fn default() -> Self {
        Self {
            program: "ffmpeg".to_string(),
            leading_args: Vec::new(),
            startup_grace_ms: 4000,
            log_level: "info".to_string(),
        }
    }
}

impl TranscoderConfig {
    pub fn startup_grace(&self) -> Duration {
        Duration::from_millis(self.startup_grace_ms)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct StorageConfig {
    data_dir: Option<PathBuf>,
    registry_path: Option<PathBuf>,
    secrets_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscoveryConfig {
    /// Seconds between discovery scans, 0 disables periodic scanning.
    pub interval_secs: u64,
    /// Register and add discovered devices without operator action.
    pub auto_provision: bool,
}

impl DiscoveryConfig {
    pub fn interval(&self) -> Option<Duration> {
        (self.interval_secs > 0).then(|| Duration::from_secs(self.interval_secs))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
struct LoggingConfig {
    /// Path to log file (if set, logs will be written to file in addition to stdout)
    log_file: Option<PathBuf>,
    /// Log level (trace, debug, info, warn, error)
    /// If not set, uses RUST_LOG environment variable or defaults to "info"
    log_level: Option<String>,
}

/// Values given on the command line, the highest priority layer.
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub port: Option<u16>,
    pub data_dir: Option<PathBuf>,
    pub registry_path: Option<PathBuf>,
    pub secrets_path: Option<PathBuf>,
    pub transcoder: Option<String>,
    pub log_level: Option<String>,
}

/// Application configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Port of the device API
    pub port: u16,
    pub rtsp: RtspConfig,
    pub transcoder: TranscoderConfig,
    pub discovery: DiscoveryConfig,
    pub registry_path: PathBuf,
    pub secrets_path: PathBuf,
    /// Path to log file (if set, logs will be written to file in addition to stdout)
    pub log_file: Option<PathBuf>,
    /// Log level (if set, overrides RUST_LOG environment variable)
    pub log_level: Option<String>,
}

impl Config {
    /// Load configuration with full priority chain: CLI args > env vars > config files > defaults.
    ///
    /// Config files are searched in this order:
    /// 1. `.usbcam.toml` in current directory
    /// 2. `config.toml` in user config directory (~/.config/usbcam/ on Linux)
    ///
    /// Environment variables use the `USBCAM_` prefix and `__` between
    /// section and key, e.g. `USBCAM_RTSP__TCP_PORT=9554`.
    pub fn from_figment(cli: CliOverrides) -> anyhow::Result<Self> {
        let local_config = std::env::current_dir()
            .ok()
            .map(|d| d.join(".usbcam.toml"));
        let user_config = directories::ProjectDirs::from("", "", "usbcam")
            .map(|dirs| dirs.config_dir().join("config.toml"));

        let mut figment = Figment::new().merge(Serialized::defaults(ConfigFile::default()));

        for path in [user_config, local_config].into_iter().flatten() {
            if path.exists() {
                figment = figment.merge(Toml::file(path));
            }
        }

        figment = figment.merge(Env::prefixed("USBCAM_").split("__"));

        if let Some(port) = cli.port {
            figment = figment.merge(Serialized::default("server.port", port));
        }
        if let Some(ref dir) = cli.data_dir {
            figment = figment.merge(Serialized::default("storage.data_dir", dir));
        }
        if let Some(ref path) = cli.registry_path {
            figment = figment.merge(Serialized::default("storage.registry_path", path));
        }
        if let Some(ref path) = cli.secrets_path {
            figment = figment.merge(Serialized::default("storage.secrets_path", path));
        }
        if let Some(ref program) = cli.transcoder {
            figment = figment.merge(Serialized::default("transcoder.program", program));
        }
        if let Some(ref level) = cli.log_level {
            figment = figment.merge(Serialized::default("logging.log_level", level));
        }

        let config_file: ConfigFile = figment.extract()?;

        let data_paths = DataPaths::resolve(PathConfig {
            data_dir: config_file.storage.data_dir,
            registry_path: config_file.storage.registry_path,
            secrets_path: config_file.storage.secrets_path,
        })?;

        Ok(Self {
            port: config_file.server.port,
            rtsp: config_file.rtsp,
            transcoder: config_file.transcoder,
            discovery: config_file.discovery,
            registry_path: data_paths.registry_path,
            secrets_path: data_paths.secrets_path,
            log_file: config_file.logging.log_file,
            log_level: config_file.logging.log_level,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::fs;
    use tempfile::TempDir;

    fn clear_env() {
        for key in [
            "USBCAM_SERVER__PORT",
            "USBCAM_RTSP__TCP_PORT",
            "USBCAM_STORAGE__DATA_DIR",
        ] {
            std::env::remove_var(key);
        }
    }

    /// Run `f` with the current directory set to `dir`.
    fn in_dir<T>(dir: &TempDir, f: impl FnOnce() -> T) -> T {
        let original_dir = std::env::current_dir().unwrap();
        std::env::set_current_dir(dir).unwrap();
        let result = f();
        let _ = std::env::set_current_dir(original_dir);
        result
    }

    fn data_dir_override(dir: &TempDir) -> CliOverrides {
        CliOverrides {
            data_dir: Some(dir.path().join("data")),
            ..Default::default()
        }
    }

    #[test]
    #[serial]
    fn test_from_figment_defaults() {
        clear_env();
        let temp_dir = TempDir::new().unwrap();

        let config = in_dir(&temp_dir, || {
            Config::from_figment(data_dir_override(&temp_dir)).unwrap()
        });

        assert_eq!(config.port, usbcam_types::DEFAULT_PORT);
        assert_eq!(config.rtsp, RtspConfig::default());
        assert_eq!(config.transcoder.program, "ffmpeg");
        assert_eq!(config.transcoder.startup_grace(), Duration::from_secs(4));
        assert_eq!(config.discovery.interval(), None);
        assert_eq!(
            config.registry_path,
            temp_dir.path().join("data").join("registry.json")
        );
    }

    #[test]
    #[serial]
    fn test_from_figment_config_file() {
        clear_env();
        let temp_dir = TempDir::new().unwrap();
        fs::write(
            temp_dir.path().join(".usbcam.toml"),
            r#"
[server]
port = 7777

[rtsp]
host = "mediamtx"
tcp_port = 9554

[transcoder]
leading_args = ["-hide_banner"]

[discovery]
interval_secs = 30
auto_provision = true
"#,
        )
        .unwrap();

        let config = in_dir(&temp_dir, || {
            Config::from_figment(data_dir_override(&temp_dir)).unwrap()
        });

        assert_eq!(config.port, 7777);
        assert_eq!(config.rtsp.host, "mediamtx");
        assert_eq!(config.rtsp.tcp_port, 9554);
        assert_eq!(config.rtsp.auth_server, "localhost:8000");
        assert_eq!(config.transcoder.leading_args, vec!["-hide_banner"]);
        assert_eq!(config.discovery.interval(), Some(Duration::from_secs(30)));
        assert!(config.discovery.auto_provision);
    }

    #[test]
    #[serial]
    fn test_env_vars_override_config_file() {
        clear_env();
        let temp_dir = TempDir::new().unwrap();
        fs::write(
            temp_dir.path().join(".usbcam.toml"),
            "[server]\nport = 7777\n[rtsp]\ntcp_port = 9554",
        )
        .unwrap();

        std::env::set_var("USBCAM_SERVER__PORT", "8888");
        std::env::set_var("USBCAM_RTSP__TCP_PORT", "8555");

        let config = in_dir(&temp_dir, || {
            Config::from_figment(data_dir_override(&temp_dir)).unwrap()
        });
        clear_env();

        assert_eq!(config.port, 8888);
        assert_eq!(config.rtsp.tcp_port, 8555);
    }

    #[test]
    #[serial]
    fn test_cli_overrides_env_and_config() {
        clear_env();
        let temp_dir = TempDir::new().unwrap();
        fs::write(temp_dir.path().join(".usbcam.toml"), "[server]\nport = 7777").unwrap();
        std::env::set_var("USBCAM_SERVER__PORT", "8888");

        let registry = temp_dir.path().join("custom-registry.json");
        let config = in_dir(&temp_dir, || {
            Config::from_figment(CliOverrides {
                port: Some(9999),
                registry_path: Some(registry.clone()),
                transcoder: Some("/opt/ffmpeg/bin/ffmpeg".to_string()),
                ..data_dir_override(&temp_dir)
            })
            .unwrap()
        });
        clear_env();

        assert_eq!(config.port, 9999);
        assert_eq!(config.registry_path, registry);
        assert_eq!(config.transcoder.program, "/opt/ffmpeg/bin/ffmpeg");
    }
}
