//! market-dl - A library for fetching a package from the Android Market.
//!
//! The pipeline logs in to the account endpoint, asks the market API for a
//! signed download URL, follows its redirect to the package file and hands
//! the result to an install mechanism. It is independent of any UI: callers
//! follow a run through [`InstallerEvents`].
//!
//! # Example
//!
//! ```no_run
//! use market_dl::{
//!     AppConfig, Credentials, DeviceIdentity, Installer, NoEvents, NoInstall, build_client,
//! };
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example() -> market_dl::Result<()> {
//! let config = AppConfig::load()?;
//! let http = build_client(&config.endpoints.user_agent)?;
//! let device = DeviceIdentity::from_android_id("3735928559")?;
//!
//! let installer = Installer::new(config, http);
//! let path = installer
//!     .run(
//!         &device,
//!         &Credentials::new("user@example.com", "password"),
//!         &NoEvents,
//!         &NoInstall,
//!         &CancellationToken::new(),
//!     )
//!     .await?;
//! println!("Saved {}", path.display());
//! # Ok(())
//! # }
//! ```

#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

pub mod auth;
#[cfg(feature = "cli")]
pub mod cli;
pub mod config;
pub mod device;
pub mod download;
pub mod error;
pub mod fs;
pub mod http;
pub mod installer;
pub mod request;
pub mod store;
pub mod wire;

// Re-export main types for convenience
pub use auth::{AuthClient, AuthTokens, Credentials};
pub use config::{AppConfig, DEFAULT_PACKAGE, DeviceProfile, DownloadConfig, Endpoints};
pub use device::DeviceIdentity;
pub use download::{DownloadProgress, Downloader, NoProgress};
pub use error::{Error, Result};
pub use fs::{FileSystem, TokioFileSystem};
pub use http::build_client;
pub use installer::{
    CommandInstaller, CredentialSource, InstallerEvents, Installer, NoEvents, NoInstall,
    PackageInstaller, Status,
};
pub use request::MarketRequest;
pub use store::{DownloadTarget, StoreClient};
