use std::env;
use std::path::PathBuf;
use std::time::Duration;

/// Runtime configuration for uploads, temp storage and document processing
#[derive(Debug, Clone)]
pub struct ProcessingConfig {
    /// Maximum upload size in megabytes (default: 25)
    pub max_file_size_mb: usize,

    /// Maximum page count of any input or output document (default: 200)
    pub max_pages: usize,

    /// Deadline for a single processing request in milliseconds (default: 90s)
    pub job_timeout_ms: u64,

    /// Deadline for a compression request in milliseconds (default: 180s)
    pub compress_timeout_ms: u64,

    /// Sniffed MIME types accepted by the validator
    pub allowed_mimes: Vec<String>,

    /// Requests allowed per client in one rate limit window (default: 60)
    pub rate_limit_points: u32,

    /// Rate limit window length in seconds (default: 60)
    pub rate_limit_duration_secs: u64,

    /// Key rate limits on `X-Forwarded-For`/`X-Real-IP`. Only enable behind a
    /// reverse proxy that overwrites these headers (default: false).
    pub trust_proxy_headers: bool,

    /// Use Ghostscript for compression when available (default: false)
    pub enable_ghostscript: bool,

    /// Interval between background sweeps in hours (default: 1)
    pub temp_cleanup_interval_hours: u64,

    /// Jobs older than this are removed by the sweep (default: 1)
    pub temp_max_age_hours: u64,

    /// Base directory holding one subdirectory per job
    pub temp_dir: PathBuf,

    /// Default rasterization resolution (default: 150)
    pub raster_dpi: u32,

    /// Path or name of the poppler `pdftocairo` binary
    pub pdftocairo_path: String,

    /// Path or name of the Ghostscript binary
    pub ghostscript_path: String,
}

impl Default for ProcessingConfig {
    fn default() -> Self {
        Self {
            max_file_size_mb: 25,
            max_pages: 200,
            job_timeout_ms: 90_000,
            compress_timeout_ms: 180_000,
            allowed_mimes: vec![
                "application/pdf".to_string(),
                "image/jpeg".to_string(),
                "image/png".to_string(),
            ],
            rate_limit_points: 60,
            rate_limit_duration_secs: 60,
            trust_proxy_headers: false,
            enable_ghostscript: false,
            temp_cleanup_interval_hours: 1,
            temp_max_age_hours: 1,
            temp_dir: env::temp_dir().join("pdf-tools"),
            raster_dpi: 150,
            pdftocairo_path: "pdftocairo".to_string(),
            ghostscript_path: "gs".to_string(),
        }
    }
}

impl ProcessingConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        let default = Self::default();

        Self {
            max_file_size_mb: parse_var("MAX_FILE_SIZE_MB").unwrap_or(default.max_file_size_mb),

            max_pages: parse_var("MAX_PAGES").unwrap_or(default.max_pages),

            job_timeout_ms: parse_var("JOB_TIMEOUT_MS").unwrap_or(default.job_timeout_ms),

            compress_timeout_ms: parse_var("COMPRESS_TIMEOUT_MS")
                .unwrap_or(default.compress_timeout_ms),

            allowed_mimes: env::var("ALLOWED_MIMES")
                .ok()
                .map(|v| {
                    v.split(',')
                        .map(|s| s.trim().to_lowercase())
                        .filter(|s| !s.is_empty())
                        .collect::<Vec<_>>()
                })
                .filter(|mimes| !mimes.is_empty())
                .unwrap_or(default.allowed_mimes),

            rate_limit_points: parse_var("RATE_LIMIT_POINTS").unwrap_or(default.rate_limit_points),

            rate_limit_duration_secs: parse_var("RATE_LIMIT_DURATION")
                .unwrap_or(default.rate_limit_duration_secs),

            trust_proxy_headers: env::var("TRUST_PROXY_HEADERS")
                .map(|v| v.to_lowercase() == "true" || v == "1")
                .unwrap_or(default.trust_proxy_headers),

            enable_ghostscript: env::var("ENABLE_GHOSTSCRIPT")
                .map(|v| v.to_lowercase() == "true" || v == "1")
                .unwrap_or(default.enable_ghostscript),

            temp_cleanup_interval_hours: parse_var("TEMP_CLEANUP_INTERVAL_HOURS")
                .unwrap_or(default.temp_cleanup_interval_hours),

            temp_max_age_hours: parse_var("TEMP_MAX_AGE_HOURS")
                .unwrap_or(default.temp_max_age_hours),

            temp_dir: env::var("TEMP_DIR")
                .ok()
                .filter(|v| !v.trim().is_empty())
                .map(PathBuf::from)
                .unwrap_or(default.temp_dir),

            raster_dpi: parse_var("RASTER_DPI").unwrap_or(default.raster_dpi),

            pdftocairo_path: env::var("PDFTOCAIRO_PATH").unwrap_or(default.pdftocairo_path),

            ghostscript_path: env::var("GHOSTSCRIPT_PATH").unwrap_or(default.ghostscript_path),
        }
    }

    /// Create config for development (relaxed limits, no Ghostscript)
    pub fn development() -> Self {
        Self {
            max_file_size_mb: 100,
            max_pages: 1000,
            rate_limit_points: 10_000,
            enable_ghostscript: false,
            ..Self::default()
        }
    }

    /// Upload size limit in bytes
    pub fn max_file_size_bytes(&self) -> usize {
        self.max_file_size_mb.saturating_mul(1024 * 1024)
    }

    pub fn job_timeout(&self) -> Duration {
        Duration::from_millis(self.job_timeout_ms)
    }

    pub fn compress_timeout(&self) -> Duration {
        Duration::from_millis(self.compress_timeout_ms)
    }

    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_secs(self.temp_cleanup_interval_hours.max(1).saturating_mul(3600))
    }
}

fn parse_var<T: std::str::FromStr>(key: &str) -> Option<T> {
    env::var(key).ok().and_then(|v| v.trim().parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ProcessingConfig::default();
        assert_eq!(config.max_file_size_mb, 25);
        assert_eq!(config.max_file_size_bytes(), 25 * 1024 * 1024);
        assert_eq!(config.max_pages, 200);
        assert_eq!(config.job_timeout(), Duration::from_secs(90));
        assert_eq!(config.compress_timeout(), Duration::from_secs(180));
        assert!(!config.enable_ghostscript);
        assert_eq!(
            config.allowed_mimes,
            vec!["application/pdf", "image/jpeg", "image/png"]
        );
    }

    #[test]
    fn test_development_config() {
        let config = ProcessingConfig::development();
        assert!(!config.enable_ghostscript);
        assert_eq!(config.max_file_size_mb, 100);
        assert_eq!(config.temp_cleanup_interval_hours, 1);
    }

    #[test]
    fn test_cleanup_interval_never_zero() {
        let config = ProcessingConfig {
            temp_cleanup_interval_hours: 0,
            ..ProcessingConfig::default()
        };
        assert_eq!(config.cleanup_interval(), Duration::from_secs(3600));
    }

    #[test]
    fn test_oversized_values_saturate() {
        let config = ProcessingConfig {
            max_file_size_mb: usize::MAX / 2,
            temp_cleanup_interval_hours: u64::MAX,
            ..ProcessingConfig::default()
        };
        assert_eq!(config.max_file_size_bytes(), usize::MAX);
        assert_eq!(config.cleanup_interval(), Duration::from_secs(u64::MAX));
    }

    #[test]
    fn test_from_env_allowed_mimes() {
        unsafe { env::set_var("ALLOWED_MIMES", " application/pdf , IMAGE/PNG ,") };
        let config = ProcessingConfig::from_env();
        unsafe { env::remove_var("ALLOWED_MIMES") };
        assert_eq!(config.allowed_mimes, vec!["application/pdf", "image/png"]);
    }
}
