//! Data path resolution.
//!
//! Decides where the device registry and the secret store live, based on
//! explicit configuration, Docker detection and platform conventions.

use directories::ProjectDirs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

const REGISTRY_FILE: &str = "registry.json";
const SECRETS_FILE: &str = "secrets.json";

/// Resolved locations of the service's data files.
#[derive(Debug, Clone)]
pub struct DataPaths {
    /// Device registry file
    pub registry_path: PathBuf,
    /// Credential store file
    pub secrets_path: PathBuf,
}

/// Configuration for path resolution.
#[derive(Debug, Default)]
pub struct PathConfig {
    /// Directory holding both data files unless overridden individually
    pub data_dir: Option<PathBuf>,
    pub registry_path: Option<PathBuf>,
    pub secrets_path: Option<PathBuf>,
}

impl DataPaths {
    /// Resolve data paths.
    ///
    /// Priority (highest to lowest):
    /// 1. Explicit registry_path/secrets_path
    /// 2. Explicit data_dir
    /// 3. Default directory (Docker-detected or platform-specific)
    pub fn resolve(config: PathConfig) -> anyhow::Result<Self> {
        let base_dir = match config.data_dir {
            Some(dir) => dir,
            None => Self::default_data_dir(),
        };

        if !base_dir.exists() {
            std::fs::create_dir_all(&base_dir)?;
            info!("Created data directory: {}", base_dir.display());
        }

        let registry_path = Self::pick(config.registry_path, &base_dir, REGISTRY_FILE);
        let secrets_path = Self::pick(config.secrets_path, &base_dir, SECRETS_FILE);

        info!("Data paths resolved:");
        info!("  Registry: {}", registry_path.display());
        info!("  Secrets:  {}", secrets_path.display());

        Ok(Self {
            registry_path,
            secrets_path,
        })
    }

    fn pick(explicit: Option<PathBuf>, base_dir: &Path, file_name: &str) -> PathBuf {
        let default = base_dir.join(file_name);
        match explicit {
            Some(path) => {
                if path != default {
                    info!(
                        "Using custom {} path: {} (overriding default: {})",
                        file_name,
                        path.display(),
                        default.display()
                    );
                }
                path
            }
            None => default,
        }
    }

    fn default_data_dir() -> PathBuf {
        if Self::is_docker() {
            info!("Docker environment detected, using ./data/ for storage");
            return PathBuf::from("./data");
        }

        match ProjectDirs::from("com", "eyevinn", "usbcam") {
            Some(proj_dirs) => {
                let data_dir = proj_dirs.data_dir().to_path_buf();
                info!(
                    "Using platform-specific data directory: {}",
                    data_dir.display()
                );
                data_dir
            }
            None => {
                warn!("Could not determine user data directory, falling back to ./data/");
                PathBuf::from("./data")
            }
        }
    }

    /// Detect if running inside a Docker container.
    pub fn is_docker() -> bool {
        if Path::new("/.dockerenv").exists() {
            return true;
        }

        if let Ok(cgroup) = std::fs::read_to_string("/proc/self/cgroup") {
            if cgroup.contains("docker") || cgroup.contains("containerd") {
                return true;
            }
        }

        false
    }
}
