use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_ARTIFACTS_DIR: &str = "artifacts";
pub const DEFAULT_PYPI_URL: &str = "https://pypi.org";
pub const DEFAULT_NPM_URL: &str = "https://registry.npmjs.org";
pub const DEFAULT_CRATES_URL: &str = "https://crates.io";
pub const DEFAULT_CRATES_DOWNLOAD_URL: &str = "https://static.crates.io";
pub const DEFAULT_SYFT: &str = "syft";
pub const DEFAULT_GRYPE: &str = "grype";
pub const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_DOWNLOAD_TIMEOUT_SECS: u64 = 120;
pub const DEFAULT_TOOL_TIMEOUT_SECS: u64 = 300;

/// Locations and limits consumed by the concrete tasks.
///
/// The CLI fills this from its arguments; library callers start from
/// [`Settings::default`] and override fields directly.
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub artifacts_dir: PathBuf,
    pub pypi_url: String,
    pub npm_url: String,
    pub crates_url: String,
    pub crates_download_url: String,
    pub syft_path: String,
    pub grype_path: String,
    pub http_timeout: Duration,
    pub download_timeout: Duration,
    pub tool_timeout: Duration,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            artifacts_dir: PathBuf::from(DEFAULT_ARTIFACTS_DIR),
            pypi_url: DEFAULT_PYPI_URL.to_string(),
            npm_url: DEFAULT_NPM_URL.to_string(),
            crates_url: DEFAULT_CRATES_URL.to_string(),
            crates_download_url: DEFAULT_CRATES_DOWNLOAD_URL.to_string(),
            syft_path: DEFAULT_SYFT.to_string(),
            grype_path: DEFAULT_GRYPE.to_string(),
            http_timeout: Duration::from_secs(DEFAULT_HTTP_TIMEOUT_SECS),
            download_timeout: Duration::from_secs(DEFAULT_DOWNLOAD_TIMEOUT_SECS),
            tool_timeout: Duration::from_secs(DEFAULT_TOOL_TIMEOUT_SECS),
        }
    }
}

impl Settings {
    pub fn downloads_dir(&self) -> PathBuf {
        self.artifacts_dir.join("downloads")
    }
}
