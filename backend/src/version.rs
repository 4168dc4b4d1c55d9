/// Version and build information embedded at compile time
use serde::Serialize;
use utoipa::ToSchema;

use crate::paths::DataPaths;

/// Build and version information
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct VersionInfo {
    /// Package version from Cargo.toml
    pub version: &'static str,
    /// Git commit hash (short)
    pub git_hash: &'static str,
    /// Git tag (if on a tagged commit)
    pub git_tag: &'static str,
    pub git_branch: &'static str,
    /// Whether the working directory had uncommitted changes
    pub git_dirty: bool,
    /// Build timestamp (ISO 8601 format)
    pub build_timestamp: &'static str,
    /// Operating system name and version
    pub os_info: String,
    pub in_docker: bool,
}

impl VersionInfo {
    pub fn get() -> Self {
        Self {
            version: env!("CARGO_PKG_VERSION"),
            git_hash: env!("GIT_HASH"),
            git_tag: env!("GIT_TAG"),
            git_branch: env!("GIT_BRANCH"),
            git_dirty: env!("GIT_DIRTY") == "true",
            build_timestamp: env!("BUILD_TIMESTAMP"),
            os_info: os_info(),
            in_docker: DataPaths::is_docker(),
        }
    }

    /// `v1.2.3` on a tagged release, `v1.2.3-dev+<hash>[-dirty]` otherwise.
    pub fn version_string(&self) -> String {
        if !self.git_tag.is_empty() {
            return self.git_tag.to_string();
        }
        let mut version = format!("v{}-dev+{}", self.version, self.git_hash);
        if self.git_dirty {
            version.push_str("-dirty");
        }
        version
    }
}

/// `PRETTY_NAME` from /etc/os-release, or the target OS and architecture.
fn os_info() -> String {
    let fallback = || format!("{} {}", std::env::consts::OS, std::env::consts::ARCH);
    let Ok(content) = std::fs::read_to_string("/etc/os-release") else {
        return fallback();
    };
    content
        .lines()
        .find_map(|line| line.strip_prefix("PRETTY_NAME="))
        .map(|value| value.trim_matches('"').to_string())
        .unwrap_or_else(fallback)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_info() {
        let info = VersionInfo::get();

        // Always set by build.rs
        assert!(!info.version.is_empty());
        assert!(!info.git_hash.is_empty());
        assert!(!info.build_timestamp.is_empty());
        assert!(info.version_string().starts_with('v') || !info.git_tag.is_empty());
    }
}
