//! Sequential install pipeline: login, resolve, download, hand off.

use std::fmt;
use std::path::{Path, PathBuf};

use tokio_util::sync::CancellationToken;

use crate::auth::{AuthClient, Credentials};
use crate::config::AppConfig;
use crate::device::DeviceIdentity;
use crate::download::{DownloadProgress, Downloader};
use crate::error::{Error, Result};
use crate::fs::{FileSystem, TokioFileSystem};
use crate::store::StoreClient;

/// MIME type of an installable package.
pub const PACKAGE_MIME_TYPE: &str = "application/vnd.android.package-archive";

/// Pipeline stage announced through [`InstallerEvents::on_status`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    /// Logging in to the account endpoint.
    LoggingIn,
    /// Asking the market for the download URL.
    RequestingMarket,
    /// Transferring the package.
    Downloading,
    /// Handing the package to the installer.
    Installing,
    /// The run failed; the detail carries the message.
    Error,
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::LoggingIn => "Logging in",
            Self::RequestingMarket => "Requesting download URL",
            Self::Downloading => "Downloading package",
            Self::Installing => "Installing package",
            Self::Error => "Download failed",
        })
    }
}

/// Callbacks through which a front end follows a run.
///
/// All methods default to no-ops. They are called from the task running
/// the pipeline; moving work to another thread is up to the implementor.
pub trait InstallerEvents: DownloadProgress {
    /// Called when the pipeline enters a stage or fails.
    fn on_status(&self, _status: Status, _detail: Option<&str>) {}

    /// Called once the package has been handed off.
    fn on_complete(&self, _path: &Path) {}
}

/// Events implementation that ignores everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoEvents;

impl DownloadProgress for NoEvents {}
impl InstallerEvents for NoEvents {}

/// Supplies the account credentials when the pipeline needs them.
pub trait CredentialSource: Send + Sync {
    /// Returns the credentials to log in with.
    ///
    /// # Errors
    ///
    /// Implementations fail if no credentials can be obtained.
    fn credentials(&self) -> Result<Credentials>;
}

impl CredentialSource for Credentials {
    fn credentials(&self) -> Result<Credentials> {
        Ok(self.clone())
    }
}

/// Platform mechanism that installs a downloaded package.
#[async_trait::async_trait]
pub trait PackageInstaller: Send + Sync {
    /// Installs the package at `path`.
    async fn install(&self, path: &Path) -> Result<()>;
}

/// Leaves the package in place without installing it.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoInstall;

#[async_trait::async_trait]
impl PackageInstaller for NoInstall {
    async fn install(&self, path: &Path) -> Result<()> {
        log::info!("Package saved to {} ({PACKAGE_MIME_TYPE})", path.display());
        Ok(())
    }
}

/// Runs an external program with the package path as its last argument,
/// e.g. `adb install -r <path>`.
#[derive(Debug, Clone)]
pub struct CommandInstaller {
    program: String,
    args: Vec<String>,
}

impl CommandInstaller {
    /// Builds an installer from a command line; `None` if it is empty.
    #[must_use]
    pub fn from_command(command: &[String]) -> Option<Self> {
        let (program, args) = command.split_first()?;
        Some(Self {
            program: program.clone(),
            args: args.to_vec(),
        })
    }
}

#[async_trait::async_trait]
impl PackageInstaller for CommandInstaller {
    async fn install(&self, path: &Path) -> Result<()> {
        log::info!("Running {} {:?} {}", self.program, self.args, path.display());
        let status = tokio::process::Command::new(&self.program)
            .args(&self.args)
            .arg(path)
            .status()
            .await?;
        if status.success() {
            Ok(())
        } else {
            Err(Error::Install(format!("{} exited with {status}", self.program)))
        }
    }
}

/// Drives one install run from login to hand-off.
pub struct Installer<F: FileSystem = TokioFileSystem> {
    config: AppConfig,
    auth: AuthClient,
    store: StoreClient,
    downloader: Downloader<F>,
}

impl Installer<TokioFileSystem> {
    /// Creates an installer whose stages share `http`.
    #[must_use]
    pub fn new(config: AppConfig, http: reqwest::Client) -> Self {
        Self::with_fs(config, http, TokioFileSystem)
    }
}

impl<F: FileSystem> Installer<F> {
    /// Creates an installer with a custom file system implementation.
    #[must_use]
    pub fn with_fs(config: AppConfig, http: reqwest::Client, fs: F) -> Self {
        let endpoints = &config.endpoints;
        let auth = AuthClient::new(http.clone(), &endpoints.login_url);
        let store = StoreClient::new(
            http.clone(),
            &endpoints.store_url,
            &endpoints.user_agent,
            config.device.clone(),
        );
        let downloader = Downloader::with_fs(http, &endpoints.user_agent, fs);
        Self {
            config,
            auth,
            store,
            downloader,
        }
    }

    /// Returns the configuration this installer runs with.
    #[must_use]
    pub const fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Runs the pipeline and returns the path of the installed package.
    ///
    /// Any failure is reported through [`Status::Error`] before being
    /// returned; nothing is retried.
    ///
    /// # Errors
    ///
    /// Returns the error of the first stage that fails, or
    /// [`Error::Cancelled`] if `cancel` fires.
    pub async fn run(
        &self,
        device: &DeviceIdentity,
        credentials: &dyn CredentialSource,
        events: &dyn InstallerEvents,
        installer: &dyn PackageInstaller,
        cancel: &CancellationToken,
    ) -> Result<PathBuf> {
        match self
            .run_stages(device, credentials, events, installer, cancel)
            .await
        {
            Ok(path) => {
                events.on_complete(&path);
                Ok(path)
            }
            Err(e) => {
                log::error!("Install failed: {e}");
                events.on_status(Status::Error, Some(&e.to_string()));
                Err(e)
            }
        }
    }

    async fn run_stages(
        &self,
        device: &DeviceIdentity,
        credentials: &dyn CredentialSource,
        events: &dyn InstallerEvents,
        installer: &dyn PackageInstaller,
        cancel: &CancellationToken,
    ) -> Result<PathBuf> {
        let package = &self.config.download.package_name;
        let path = self.config.download.output_path()?;
        check_cancelled(cancel)?;
        let credentials = credentials.credentials()?;

        events.on_status(Status::LoggingIn, None);
        let tokens = self.auth.login(&credentials).await?;
        drop(credentials);
        let auth_token = tokens.auth()?;
        check_cancelled(cancel)?;

        events.on_status(Status::RequestingMarket, None);
        let target = self
            .store
            .resolve_download(auth_token, device.as_str(), package)
            .await?;
        check_cancelled(cancel)?;

        events.on_status(Status::Downloading, None);
        self.downloader
            .download(&target, &path, events, cancel)
            .await?;
        check_cancelled(cancel)?;

        events.on_status(Status::Installing, None);
        installer.install(&path).await?;
        Ok(path)
    }
}

fn check_cancelled(cancel: &CancellationToken) -> Result<()> {
    if cancel.is_cancelled() {
        Err(Error::Cancelled)
    } else {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{DownloadConfig, Endpoints};
    use flate2::Compression;
    use flate2::write::GzEncoder;
    use httpmock::prelude::*;
    use std::io::Write;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    #[derive(Default)]
    struct Recorder {
        statuses: Mutex<Vec<(Status, Option<String>)>>,
        progress: Mutex<Vec<u8>>,
        completed: Mutex<Option<PathBuf>>,
    }

    impl DownloadProgress for Recorder {
        fn on_progress(&self, percent: u8) {
            self.progress.lock().unwrap().push(percent);
        }
    }

    impl InstallerEvents for Recorder {
        fn on_status(&self, status: Status, detail: Option<&str>) {
            self.statuses
                .lock()
                .unwrap()
                .push((status, detail.map(str::to_string)));
        }

        fn on_complete(&self, path: &Path) {
            *self.completed.lock().unwrap() = Some(path.to_path_buf());
        }
    }

    #[derive(Default)]
    struct CountingInstaller(AtomicUsize);

    #[async_trait::async_trait]
    impl PackageInstaller for CountingInstaller {
        async fn install(&self, _path: &Path) -> Result<()> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn gzip(data: &[u8]) -> Vec<u8> {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(data).unwrap();
        encoder.finish().unwrap()
    }

    fn config(server: &MockServer, dir: &Path) -> AppConfig {
        AppConfig {
            endpoints: Endpoints {
                login_url: server.url("/accounts/ClientLogin"),
                store_url: server.url("/market/api/ApiRequest"),
                ..Endpoints::default()
            },
            download: DownloadConfig::new().with_output_dir(dir),
            ..AppConfig::default()
        }
    }

    fn installer(config: AppConfig) -> Installer {
        Installer::new(config, crate::http::build_client("Android-Market/2").unwrap())
    }

    async fn mock_login(server: &MockServer) {
        server
            .mock_async(|when, then| {
                when.method(POST).path("/accounts/ClientLogin");
                then.status(200).body("SID=s\nAuth=XYZ\n");
            })
            .await;
    }

    #[tokio::test]
    async fn happy_path_installs_package() {
        let server = MockServer::start_async().await;
        let payload = vec![0x50u8; 12_345];
        let dl_url = server.url("/market/download");
        let apk_url = server.url("/files/jp.radiko.Player.apk");

        mock_login(&server).await;
        let store = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/market/api/ApiRequest")
                    .header("cookie", "ANDROIDSECURE=XYZ")
                    .body_contains("version=2&request=");
                then.status(200)
                    .body(gzip(format!("\u{12}{dl_url} MarketDA99887").as_bytes()));
            })
            .await;
        server
            .mock_async(|when, then| {
                when.method(GET)
                    .path("/market/download")
                    .header("cookie", "MarketDA=99887");
                then.status(302).header("Location", apk_url.as_str());
            })
            .await;
        server
            .mock_async(|when, then| {
                when.method(GET)
                    .path("/files/jp.radiko.Player.apk")
                    .header("cookie", "MarketDA=99887");
                then.status(200).body(payload.clone());
            })
            .await;

        let dir = TempDir::new().unwrap();
        let recorder = Recorder::default();
        let counting = CountingInstaller::default();
        let device = DeviceIdentity::from_android_id("11259375").unwrap();

        let path = installer(config(&server, dir.path()))
            .run(
                &device,
                &Credentials::new("user@example.com", "secret"),
                &recorder,
                &counting,
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        store.assert_async().await;
        assert_eq!(path, dir.path().join("jp.radiko.Player.apk"));
        assert_eq!(std::fs::read(&path).unwrap(), payload);
        assert_eq!(counting.0.load(Ordering::SeqCst), 1);
        assert_eq!(*recorder.completed.lock().unwrap(), Some(path));
        assert_eq!(recorder.progress.lock().unwrap().last(), Some(&100));

        let statuses: Vec<_> = recorder
            .statuses
            .lock()
            .unwrap()
            .iter()
            .map(|(s, _)| *s)
            .collect();
        assert_eq!(
            statuses,
            vec![
                Status::LoggingIn,
                Status::RequestingMarket,
                Status::Downloading,
                Status::Installing
            ]
        );
    }

    #[tokio::test]
    async fn login_failure_reports_body_and_stops() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/accounts/ClientLogin");
                then.status(403).body("Error=BadAuthentication");
            })
            .await;
        let store = server
            .mock_async(|when, then| {
                when.path("/market/api/ApiRequest");
                then.status(200);
            })
            .await;

        let dir = TempDir::new().unwrap();
        let recorder = Recorder::default();
        let counting = CountingInstaller::default();

        let err = installer(config(&server, dir.path()))
            .run(
                &DeviceIdentity::from_android_id("1").unwrap(),
                &Credentials::new("user@example.com", "wrong"),
                &recorder,
                &counting,
                &CancellationToken::new(),
            )
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Http { status: 403, .. }));
        assert_eq!(store.hits_async().await, 0);
        assert_eq!(counting.0.load(Ordering::SeqCst), 0);
        assert!(recorder.completed.lock().unwrap().is_none());

        let statuses = recorder.statuses.lock().unwrap();
        let (last, detail) = statuses.last().unwrap();
        assert_eq!(*last, Status::Error);
        assert!(detail.as_deref().unwrap().contains("Error=BadAuthentication"));
    }

    /// Serves one response that declares 1000 bytes, sends 900 and hangs up.
    async fn short_body_server() -> std::net::SocketAddr {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = Vec::new();
            let mut buf = [0u8; 1024];
            while !request.windows(4).any(|w| w == b"\r\n\r\n") {
                let n = socket.read(&mut buf).await.unwrap();
                if n == 0 {
                    return;
                }
                request.extend_from_slice(&buf[..n]);
            }
            socket
                .write_all(b"HTTP/1.1 200 OK\r\nContent-Length: 1000\r\n\r\n")
                .await
                .unwrap();
            socket.write_all(&[1u8; 900]).await.unwrap();
            socket.shutdown().await.unwrap();
        });
        addr
    }

    #[tokio::test]
    async fn short_transfer_skips_install() {
        let server = MockServer::start_async().await;
        let dl_url = server.url("/market/download");
        let apk_url = format!("http://{}/pkg.apk", short_body_server().await);

        mock_login(&server).await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/market/api/ApiRequest");
                then.status(200)
                    .body(gzip(format!("{dl_url} MarketDA7").as_bytes()));
            })
            .await;
        server
            .mock_async(|when, then| {
                when.path("/market/download");
                then.status(302).header("Location", apk_url.as_str());
            })
            .await;

        let dir = TempDir::new().unwrap();
        let recorder = Recorder::default();
        let counting = CountingInstaller::default();

        let err = installer(config(&server, dir.path()))
            .run(
                &DeviceIdentity::from_android_id("1").unwrap(),
                &Credentials::new("user@example.com", "secret"),
                &recorder,
                &counting,
                &CancellationToken::new(),
            )
            .await
            .unwrap_err();

        assert!(
            matches!(
                err,
                Error::IncompleteTransfer {
                    expected: 1000,
                    received: 900
                }
            ),
            "got {err:?}"
        );
        assert_eq!(counting.0.load(Ordering::SeqCst), 0);
        assert!(recorder.completed.lock().unwrap().is_none());
        assert!(!dir.path().join("jp.radiko.Player.apk").exists());
    }

    #[tokio::test]
    async fn cancelled_run_makes_no_requests() {
        let server = MockServer::start_async().await;
        let login = server
            .mock_async(|when, then| {
                when.path("/accounts/ClientLogin");
                then.status(200).body("Auth=XYZ\n");
            })
            .await;
        let store = server
            .mock_async(|when, then| {
                when.path("/market/api/ApiRequest");
                then.status(200);
            })
            .await;

        let dir = TempDir::new().unwrap();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = installer(config(&server, dir.path()))
            .run(
                &DeviceIdentity::from_android_id("1").unwrap(),
                &Credentials::new("user@example.com", "secret"),
                &NoEvents,
                &NoInstall,
                &cancel,
            )
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Cancelled));
        assert_eq!(login.hits_async().await, 0);
        assert_eq!(store.hits_async().await, 0);
    }

    #[tokio::test]
    async fn escaping_package_name_is_rejected_before_login() {
        let server = MockServer::start_async().await;
        let login = server
            .mock_async(|when, then| {
                when.path("/accounts/ClientLogin");
                then.status(200).body("Auth=XYZ\n");
            })
            .await;

        let dir = TempDir::new().unwrap();
        let mut config = config(&server, dir.path());
        config.download.package_name = "../escape".to_string();

        let err = installer(config)
            .run(
                &DeviceIdentity::from_android_id("1").unwrap(),
                &Credentials::new("user@example.com", "secret"),
                &NoEvents,
                &NoInstall,
                &CancellationToken::new(),
            )
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Config(_)));
        assert_eq!(login.hits_async().await, 0);
    }

    #[test]
    fn command_installer_requires_program() {
        assert!(CommandInstaller::from_command(&[]).is_none());
        let cmd = CommandInstaller::from_command(&["adb".into(), "install".into(), "-r".into()])
            .unwrap();
        assert_eq!(cmd.program, "adb");
        assert_eq!(cmd.args, vec!["install", "-r"]);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn command_installer_reports_failure() {
        let ok = CommandInstaller::from_command(&["true".into()]).unwrap();
        ok.install(Path::new("pkg.apk")).await.unwrap();

        let failing = CommandInstaller::from_command(&["false".into()]).unwrap();
        let err = failing.install(Path::new("pkg.apk")).await.unwrap_err();
        assert!(matches!(err, Error::Install(_)));
    }

    #[test]
    fn status_messages() {
        assert_eq!(Status::LoggingIn.to_string(), "Logging in");
        assert_eq!(Status::Error.to_string(), "Download failed");
    }
}
