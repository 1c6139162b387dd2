use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, ValueEnum};
use clap_verbosity_flag::{Verbosity, WarnLevel};
use pkgaudit::Settings;
use pkgaudit::settings::{
    DEFAULT_ARTIFACTS_DIR, DEFAULT_CRATES_DOWNLOAD_URL, DEFAULT_CRATES_URL,
    DEFAULT_DOWNLOAD_TIMEOUT_SECS, DEFAULT_GRYPE, DEFAULT_HTTP_TIMEOUT_SECS, DEFAULT_NPM_URL,
    DEFAULT_PYPI_URL, DEFAULT_SYFT, DEFAULT_TOOL_TIMEOUT_SECS,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Text,
    Json,
}

#[derive(Parser)]
#[command(name = "pkgaudit", version)]
#[command(about = "Audit a package from PyPI, npm or crates.io", long_about = None)]
pub struct Cli {
    /// Package name as published on the registry
    pub package: String,

    /// Audit this version instead of the latest release
    #[arg(long = "pkg-version", value_name = "VERSION")]
    pub pkg_version: Option<String>,

    /// Registry the package comes from
    #[arg(short, long, default_value = "pypi")]
    pub source: String,

    /// Print the audit result as JSON
    #[arg(long)]
    pub json: bool,

    /// Directory for downloads, SBOMs and reports
    #[arg(long, env = "PKGAUDIT_ARTIFACTS_DIR", default_value = DEFAULT_ARTIFACTS_DIR)]
    pub artifacts_dir: PathBuf,

    /// Format of diagnostic logs written to stderr
    #[arg(long, value_enum, default_value = "text")]
    pub log_format: LogFormat,

    #[command(flatten)]
    pub verbosity: Verbosity<WarnLevel>,

    #[arg(long, env = "PKGAUDIT_PYPI_URL", default_value = DEFAULT_PYPI_URL, help_heading = "Registries")]
    pub pypi_url: String,

    #[arg(long, env = "PKGAUDIT_NPM_URL", default_value = DEFAULT_NPM_URL, help_heading = "Registries")]
    pub npm_url: String,

    #[arg(long, env = "PKGAUDIT_CRATES_URL", default_value = DEFAULT_CRATES_URL, help_heading = "Registries")]
    pub crates_url: String,

    #[arg(
        long,
        env = "PKGAUDIT_CRATES_DOWNLOAD_URL",
        default_value = DEFAULT_CRATES_DOWNLOAD_URL,
        help_heading = "Registries"
    )]
    pub crates_download_url: String,

    /// Request timeout for registry API calls, in seconds
    #[arg(
        long,
        env = "PKGAUDIT_HTTP_TIMEOUT_SECS",
        default_value_t = DEFAULT_HTTP_TIMEOUT_SECS,
        value_name = "SECS",
        help_heading = "Registries"
    )]
    pub http_timeout: u64,

    /// Timeout for one artifact download, in seconds
    #[arg(
        long,
        env = "PKGAUDIT_DOWNLOAD_TIMEOUT_SECS",
        default_value_t = DEFAULT_DOWNLOAD_TIMEOUT_SECS,
        value_name = "SECS",
        help_heading = "Registries"
    )]
    pub download_timeout: u64,

    /// Path to the syft binary
    #[arg(long, env = "PKGAUDIT_SYFT", default_value = DEFAULT_SYFT, help_heading = "Tools")]
    pub syft: String,

    /// Path to the grype binary
    #[arg(long, env = "PKGAUDIT_GRYPE", default_value = DEFAULT_GRYPE, help_heading = "Tools")]
    pub grype: String,

    /// Timeout for one syft or grype run, in seconds
    #[arg(
        long,
        env = "PKGAUDIT_TOOL_TIMEOUT_SECS",
        default_value_t = DEFAULT_TOOL_TIMEOUT_SECS,
        value_name = "SECS",
        help_heading = "Tools"
    )]
    pub tool_timeout: u64,
}

impl Cli {
    pub fn settings(&self) -> Settings {
        Settings {
            artifacts_dir: self.artifacts_dir.clone(),
            pypi_url: self.pypi_url.clone(),
            npm_url: self.npm_url.clone(),
            crates_url: self.crates_url.clone(),
            crates_download_url: self.crates_download_url.clone(),
            syft_path: self.syft.clone(),
            grype_path: self.grype.clone(),
            http_timeout: Duration::from_secs(self.http_timeout),
            download_timeout: Duration::from_secs(self.download_timeout),
            tool_timeout: Duration::from_secs(self.tool_timeout),
        }
    }
}
