use std::fmt;

use serde::Serialize;

/// Build metadata baked in at compile time
///
/// Binaries fill the `BUILD_*` and `REPO_VERSION` variables from their
/// build script; use [`build_info!`](crate::build_info) there so the
/// values of the calling crate are picked up.
#[derive(Debug, Clone, Serialize)]
pub struct BuildInfo {
    pub version: &'static str,
    pub repo_version: &'static str,
    pub build_profile: &'static str,
    pub build_features: &'static str,
    pub build_timestamp: &'static str,
}

impl fmt::Display for BuildInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({}, {} build, features: {}, built {})",
            self.version,
            self.repo_version,
            self.build_profile,
            self.build_features,
            self.build_timestamp
        )
    }
}

#[macro_export]
macro_rules! build_info {
    () => {
        $crate::version::BuildInfo {
            version: env!("CARGO_PKG_VERSION"),
            repo_version: option_env!("REPO_VERSION").unwrap_or("unknown"),
            build_profile: option_env!("BUILD_PROFILE").unwrap_or("unknown"),
            build_features: option_env!("BUILD_FEATURES").unwrap_or("none"),
            build_timestamp: option_env!("BUILD_TIMESTAMP").unwrap_or("unknown"),
        }
    };
}

/// Build metadata of this library
pub fn build_info() -> BuildInfo {
    crate::build_info!()
}
