//! Pipeline configuration from the environment.

use std::path::PathBuf;

use lectio_store::StoreLayout;

/// Process-level configuration for the generation pipeline.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub outputs_dir: PathBuf,
    pub uploads_dir: PathBuf,
    pub job_data_dir: PathBuf,
    pub analysis_dir: PathBuf,

    /// Bounded section worker pool size
    pub section_parallelism: usize,
    /// Fail startup when renderer/muxer binaries are missing
    pub strict_runtime_checks: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            outputs_dir: PathBuf::from("data/outputs"),
            uploads_dir: PathBuf::from("data/uploads"),
            job_data_dir: PathBuf::from("data/jobs"),
            analysis_dir: PathBuf::from("data/analysis"),
            section_parallelism: 4,
            strict_runtime_checks: false,
        }
    }
}

impl PipelineConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let data_root =
            PathBuf::from(std::env::var("DATA_ROOT").unwrap_or_else(|_| "data".to_string()));
        Self {
            outputs_dir: env_path("OUTPUTS_DIR").unwrap_or_else(|| data_root.join("outputs")),
            uploads_dir: env_path("UPLOADS_DIR").unwrap_or_else(|| data_root.join("uploads")),
            job_data_dir: env_path("JOB_DATA_DIR").unwrap_or_else(|| data_root.join("jobs")),
            analysis_dir: env_path("ANALYSIS_DIR").unwrap_or_else(|| data_root.join("analysis")),
            section_parallelism: env_usize("SECTION_PARALLELISM", defaults.section_parallelism)
                .max(1),
            strict_runtime_checks: env_bool("STARTUP_STRICT_RUNTIME_CHECKS", false),
        }
    }

    pub fn store_layout(&self) -> StoreLayout {
        StoreLayout::new(&self.outputs_dir, &self.uploads_dir, &self.job_data_dir)
    }
}

pub(crate) fn env_path(name: &str) -> Option<PathBuf> {
    std::env::var(name).ok().map(PathBuf::from)
}

pub(crate) fn env_usize(name: &str, default: usize) -> usize {
    std::env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

pub(crate) fn env_u64(name: &str, default: u64) -> u64 {
    std::env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

pub(crate) fn env_f64(name: &str, default: f64) -> f64 {
    std::env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

pub(crate) fn env_bool(name: &str, default: bool) -> bool {
    match std::env::var(name) {
        Ok(value) => matches!(
            value.trim().to_lowercase().as_str(),
            "1" | "true" | "yes" | "on"
        ),
        Err(_) => default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_env_bool_parsing() {
        std::env::set_var("TEST_BOOL_X", "TRUE");
        assert!(env_bool("TEST_BOOL_X", false));
        std::env::set_var("TEST_BOOL_X", "off");
        assert!(!env_bool("TEST_BOOL_X", true));
        std::env::remove_var("TEST_BOOL_X");
        assert!(env_bool("TEST_BOOL_X", true));
    }

    #[test]
    fn test_parallelism_floor() {
        std::env::set_var("SECTION_PARALLELISM", "0");
        let config = PipelineConfig::from_env();
        assert_eq!(config.section_parallelism, 1);
        std::env::remove_var("SECTION_PARALLELISM");
    }
}
