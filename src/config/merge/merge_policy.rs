//! Merge rules: defaults, override order, conflict handling.

use crate::config::{
    DEFAULT_BUILD_RETENTION_DAYS, DEFAULT_CHANNEL_DIR, DEFAULT_CONTENT_PATH,
    DEFAULT_REUSE_RETENTION_DAYS, DEFAULT_TARGET_RUNWAY_DAYS, DEFAULT_WORK_DIR,
};
use config::Config;
use config::ConfigBuilder;
use config::ConfigError;

/// Create a Config builder with merge policy defaults applied.
pub fn builder_with_defaults() -> Result<ConfigBuilder<config::builder::DefaultState>, ConfigError>
{
    Config::builder()
        .set_default("mode", "combined")?
        .set_default("content_path", DEFAULT_CONTENT_PATH)?
        .set_default("work_dir", DEFAULT_WORK_DIR)?
        .set_default("channel_dir", DEFAULT_CHANNEL_DIR)?
        .set_default("target_runway_days", DEFAULT_TARGET_RUNWAY_DAYS)?
        .set_default("build_retention_days", u64::from(DEFAULT_BUILD_RETENTION_DAYS))?
        .set_default("reuse_retention_days", u64::from(DEFAULT_REUSE_RETENTION_DAYS))?
        .set_default("with_cdn", false)?
        .set_default("allow_untrusted", false)
}
