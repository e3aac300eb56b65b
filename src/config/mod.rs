//! Configuration types for the install pipeline.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Package requested when none is configured.
pub const DEFAULT_PACKAGE: &str = "jp.radiko.Player";

/// Remote endpoints used by the pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Endpoints {
    /// ClientLogin URL.
    pub login_url: String,
    /// Market API request URL.
    pub store_url: String,
    /// User agent sent to the market and download hosts.
    pub user_agent: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            login_url: "https://www.google.com/accounts/ClientLogin".to_string(),
            store_url: "https://android.clients.google.com/market/api/ApiRequest".to_string(),
            user_agent: "Android-Market/2".to_string(),
        }
    }
}

/// Device and carrier fields reported in the market request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceProfile {
    /// Market client version code.
    pub client_version: u32,
    /// Device and SDK identifier, e.g. `passion:9`.
    pub device_model: String,
    /// Locale language.
    pub language: String,
    /// Locale country.
    pub country: String,
    /// Network operator name.
    pub operator_name: String,
    /// SIM operator name.
    pub sim_operator_name: String,
    /// Network operator MCC+MNC.
    pub operator_numeric: String,
    /// SIM operator MCC+MNC.
    pub sim_operator_numeric: String,
}

impl Default for DeviceProfile {
    fn default() -> Self {
        Self {
            client_version: 2_009_011,
            device_model: "passion:9".to_string(),
            language: "en".to_string(),
            country: "us".to_string(),
            operator_name: "DoCoMo".to_string(),
            sim_operator_name: "DoCoMo".to_string(),
            operator_numeric: "44010".to_string(),
            sim_operator_numeric: "44010".to_string(),
        }
    }
}

/// Configuration for the download and install step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DownloadConfig {
    /// Package name to request.
    pub package_name: String,
    /// Directory the `.apk` file is written to.
    pub output_dir: PathBuf,
    /// Program (and leading arguments) that receives the downloaded file path.
    pub install_command: Vec<String>,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            package_name: DEFAULT_PACKAGE.to_string(),
            output_dir: dirs::download_dir().unwrap_or_else(|| PathBuf::from(".")),
            install_command: Vec::new(),
        }
    }
}

impl DownloadConfig {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the package to request.
    #[must_use]
    pub fn with_package_name(mut self, package: impl Into<String>) -> Self {
        self.package_name = package.into();
        self
    }

    /// Sets the output directory.
    #[must_use]
    pub fn with_output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output_dir = dir.into();
        self
    }

    /// Sets the install command.
    #[must_use]
    pub fn with_install_command(mut self, command: Vec<String>) -> Self {
        self.install_command = command;
        self
    }

    /// Returns the local path of the downloaded package file.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the package name is empty or could
    /// escape the output directory.
    pub fn output_path(&self) -> Result<PathBuf> {
        let name = &self.package_name;
        if name.is_empty() || name.contains(['/', '\\']) || name.contains("..") {
            return Err(Error::Config(format!("invalid package name {name:?}")));
        }
        Ok(self.output_dir.join(format!("{name}.apk")))
    }
}

/// Complete application configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Remote endpoints.
    pub endpoints: Endpoints,
    /// Reported device profile.
    pub device: DeviceProfile,
    /// Download settings.
    pub download: DownloadConfig,
}

impl AppConfig {
    /// Creates a new config with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the default config file location.
    #[must_use]
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("market-dl")
            .join("config.toml")
    }

    /// Parses a configuration from TOML text; missing keys keep their defaults.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the text is not valid TOML for this schema.
    pub fn from_toml(text: &str) -> Result<Self> {
        toml::from_str(text).map_err(|e| Error::Config(e.to_string()))
    }

    /// Loads the configuration from `path`, or defaults if the file does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load_from(path: &Path) -> Result<Self> {
        match std::fs::read_to_string(path) {
            Ok(text) => {
                log::debug!("Loading config from {}", path.display());
                Self::from_toml(&text)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(Error::Io(e)),
        }
    }

    /// Loads the configuration from the default location.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file exists but is invalid.
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::default_path())
    }
}
