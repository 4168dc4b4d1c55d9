//! Version information API endpoint.

use axum::Json;

use crate::version::VersionInfo;

/// Get version and build information
///
/// Returns the package version, git commit, tag and branch, whether the
/// working tree was dirty, the build timestamp and the host OS.
#[utoipa::path(
    get,
    path = "/api/version",
    tag = "System",
    responses(
        (status = 200, description = "Version information", body = VersionInfo)
    )
)]
pub async fn get_version() -> Json<VersionInfo> {
    Json(VersionInfo::get())
}
