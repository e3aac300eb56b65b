//! CLI mode for market - command-line front end of the install pipeline.

mod progress;

use std::path::PathBuf;
use std::time::Instant;

use indicatif::{HumanBytes, HumanDuration};
use tokio_util::sync::CancellationToken;

use crate::{
    AppConfig, CommandInstaller, Credentials, DeviceIdentity, Error, Installer,
    NoInstall, PackageInstaller, build_client,
};

use progress::BarReporter;

/// Options parsed from the command line.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CliArgs {
    /// Package to fetch instead of the configured one.
    pub package: Option<String>,
    /// Output directory override.
    pub output_dir: Option<PathBuf>,
    /// Config file override.
    pub config_path: Option<PathBuf>,
    /// Android id override.
    pub android_id: Option<String>,
    /// Install command override, split on whitespace.
    pub install_command: Option<Vec<String>>,
    /// Number of `-v` flags.
    pub verbosity: u8,
    /// Whether `--help` was requested.
    pub help: bool,
}

impl CliArgs {
    /// Parses arguments (without the program name).
    ///
    /// # Errors
    ///
    /// Returns a message for unknown options or options missing a value.
    pub fn parse<I: IntoIterator<Item = String>>(args: I) -> Result<Self, String> {
        let mut parsed = Self::default();
        let mut args = args.into_iter();

        while let Some(arg) = args.next() {
            let mut value = |name: &str| {
                args.next()
                    .ok_or_else(|| format!("{name} requires a value"))
            };
            match arg.as_str() {
                "-o" | "--output" => parsed.output_dir = Some(PathBuf::from(value(&arg)?)),
                "-c" | "--config" => parsed.config_path = Some(PathBuf::from(value(&arg)?)),
                "--android-id" => parsed.android_id = Some(value(&arg)?),
                "--install" => {
                    let command = value(&arg)?;
                    parsed.install_command =
                        Some(command.split_whitespace().map(str::to_string).collect());
                }
                "-v" | "--verbose" => parsed.verbosity = parsed.verbosity.saturating_add(1),
                "-vv" => parsed.verbosity = parsed.verbosity.saturating_add(2),
                "-h" | "--help" => parsed.help = true,
                other if !other.starts_with('-') && parsed.package.is_none() => {
                    parsed.package = Some(other.to_string());
                }
                other => return Err(format!("Unknown option: {other}")),
            }
        }
        Ok(parsed)
    }

    /// Applies the overrides on top of a loaded configuration.
    #[must_use]
    pub fn apply(&self, mut config: AppConfig) -> AppConfig {
        if let Some(package) = &self.package {
            config.download.package_name.clone_from(package);
        }
        if let Some(dir) = &self.output_dir {
            config.download.output_dir.clone_from(dir);
        }
        if let Some(command) = &self.install_command {
            config.download.install_command.clone_from(command);
        }
        config
    }
}

/// Prints usage information.
pub fn print_usage() {
    eprintln!("Usage: market [OPTIONS] [PACKAGE]");
    eprintln!();
    eprintln!("Arguments:");
    eprintln!("  [PACKAGE]             Package to download (default: {})", crate::DEFAULT_PACKAGE);
    eprintln!();
    eprintln!("Options:");
    eprintln!("  -o, --output <DIR>    Directory to save the .apk to");
    eprintln!("  -c, --config <FILE>   Config file (default: {})", AppConfig::default_path().display());
    eprintln!("      --android-id <ID> Decimal android id of the device");
    eprintln!("      --install <CMD>   Command run with the .apk path, e.g. \"adb install -r\"");
    eprintln!("  -v, --verbose         More log output (repeatable)");
    eprintln!("  -h, --help            Show this help");
    eprintln!();
    eprintln!("Environment:");
    eprintln!("  MARKET_EMAIL          Account e-mail (prompted if unset)");
    eprintln!("  MARKET_PASSWORD       Account password (prompted if unset)");
    eprintln!("  ANDROID_ID            Decimal android id of the device");
}

/// Completes the given credentials, prompting on stderr for what is missing.
///
/// Blocks on terminal input.
fn read_credentials(email: Option<String>, password: Option<String>) -> crate::Result<Credentials> {
    let term = console::Term::stderr();
    let email = match email {
        Some(email) => email,
        None => {
            term.write_str("Account e-mail: ")?;
            term.read_line()?
        }
    };
    let password = match password {
        Some(password) => password,
        None => {
            term.write_str(&format!("Password for {email}: "))?;
            term.read_secure_line()?
        }
    };
    Ok(Credentials::new(email.trim(), password))
}

/// Takes credentials from `MARKET_EMAIL`/`MARKET_PASSWORD`, prompting off the
/// async workers for anything unset.
async fn collect_credentials() -> crate::Result<Credentials> {
    let email = std::env::var("MARKET_EMAIL").ok();
    let password = std::env::var("MARKET_PASSWORD").ok();
    tokio::task::spawn_blocking(move || read_credentials(email, password))
        .await
        .map_err(std::io::Error::from)?
}

fn device_identity(args: &CliArgs) -> crate::Result<DeviceIdentity> {
    let android_id = args
        .android_id
        .clone()
        .or_else(|| std::env::var("ANDROID_ID").ok())
        .ok_or(Error::DeviceIdUnavailable)?;
    DeviceIdentity::from_android_id(&android_id)
}

/// Runs the CLI with already-parsed arguments.
///
/// # Errors
///
/// Returns an error if the configuration is invalid or any pipeline stage fails.
pub async fn run(args: CliArgs) -> crate::Result<()> {
    let config = match &args.config_path {
        Some(path) => AppConfig::load_from(path)?,
        None => AppConfig::load()?,
    };
    let config = args.apply(config);
    let device = device_identity(&args)?;
    log::debug!("Device id {device}");

    let http = build_client(&config.endpoints.user_agent)?;
    let package_installer: Box<dyn PackageInstaller> =
        match CommandInstaller::from_command(&config.download.install_command) {
            Some(command) => Box::new(command),
            None => Box::new(NoInstall),
        };

    let cancel = CancellationToken::new();
    let ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            log::warn!("Interrupted, stopping");
            ctrl_c.cancel();
        }
    });

    let credentials = collect_credentials().await?;
    let reporter = BarReporter::new(&config.download.package_name);
    let installer = Installer::new(config, http);
    let started = Instant::now();

    let path = installer
        .run(
            &device,
            &credentials,
            &reporter,
            package_installer.as_ref(),
            &cancel,
        )
        .await?;

    let size = tokio::fs::metadata(&path).await.map(|m| m.len()).unwrap_or(0);
    println!(
        "{} ({}) in {}",
        path.display(),
        HumanBytes(size),
        HumanDuration(started.elapsed())
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Result<CliArgs, String> {
        CliArgs::parse(args.iter().map(|s| (*s).to_string()))
    }

    #[test]
    fn credentials_from_values_need_no_prompt() {
        let creds =
            read_credentials(Some(" user@example.com\n".into()), Some("secret".into())).unwrap();
        assert_eq!(creds.email, "user@example.com");
        assert_eq!(creds.password, "secret");
    }

    #[test]
    fn parse_defaults() {
        assert_eq!(parse(&[]).unwrap(), CliArgs::default());
    }

    #[test]
    fn parse_all_options() {
        let args = parse(&[
            "com.example.app",
            "-o",
            "/tmp/apks",
            "--android-id",
            "12345",
            "--install",
            "adb install -r",
            "-v",
            "-v",
        ])
        .unwrap();

        assert_eq!(args.package.as_deref(), Some("com.example.app"));
        assert_eq!(args.output_dir, Some(PathBuf::from("/tmp/apks")));
        assert_eq!(args.android_id.as_deref(), Some("12345"));
        assert_eq!(
            args.install_command,
            Some(vec!["adb".to_string(), "install".to_string(), "-r".to_string()])
        );
        assert_eq!(args.verbosity, 2);
    }

    #[test]
    fn parse_rejects_unknown_and_missing_values() {
        assert_eq!(parse(&["--bogus"]).unwrap_err(), "Unknown option: --bogus");
        assert_eq!(parse(&["-o"]).unwrap_err(), "-o requires a value");
        assert!(parse(&["one", "two"]).is_err());
    }

    #[test]
    fn apply_overrides_config() {
        let args = parse(&["com.example.app", "--output", "/tmp/apks"]).unwrap();
        let config = args.apply(AppConfig::default());
        assert_eq!(
            config.download.output_path().unwrap(),
            PathBuf::from("/tmp/apks/com.example.app.apk")
        );
        assert!(config.download.install_command.is_empty());
    }

    #[test]
    fn device_identity_prefers_flag() {
        let args = parse(&["--android-id", "255"]).unwrap();
        assert_eq!(device_identity(&args).unwrap().as_str(), "ff");
    }
}
