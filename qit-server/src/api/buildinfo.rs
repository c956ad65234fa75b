//! Build information API endpoint

use axum::{extract::State, response::Json};
use serde::Serialize;

use crate::AppState;

/// `git describe` output at build time, suffixed `-dirty` for modified trees
pub const GIT_REVISION: &str = env!("QIT_GIT_REVISION");
/// UTC build time, RFC 3339
pub const BUILD_TIME: &str = env!("QIT_BUILD_TIME");
pub const BUILD_PROFILE: &str = env!("QIT_BUILD_PROFILE");

#[derive(Debug, Serialize)]
pub struct BuildInfo {
    pub version: &'static str,
    pub git_hash: &'static str,
    pub build_timestamp: &'static str,
    pub build_profile: &'static str,
    pub started_at: String,
}

/// GET /api/buildinfo
pub async fn get_build_info(State(state): State<AppState>) -> Json<BuildInfo> {
    Json(BuildInfo {
        version: env!("CARGO_PKG_VERSION"),
        git_hash: GIT_REVISION,
        build_timestamp: BUILD_TIME,
        build_profile: BUILD_PROFILE,
        started_at: state.startup_time.to_rfc3339(),
    })
}
