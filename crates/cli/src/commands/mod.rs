//! CLI command definitions and execution
//!
//! This module contains all CLI commands and their implementations.

use std::sync::Arc;

use clap::{Parser, Subcommand};

use bp_core::{Config, ConfigManager, Error, Profile, Transfer, TransferResult};
use bp_s3::S3Client;

use crate::exit_code::ExitCode;
use crate::output::{Formatter, OutputConfig, ProgressBar};

mod buckets;
mod check;
mod export;
mod import;
mod probe;
mod profile;
mod sync;

/// bp - bucketport
///
/// Back up, restore and mirror buckets on S3-compatible object stores.
#[derive(Parser, Debug)]
#[command(name = "bp")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Output format: human-readable or JSON
    #[arg(long, global = true, default_value = "false")]
    pub json: bool,

    /// Disable colored output
    #[arg(long, global = true, default_value = "false")]
    pub no_color: bool,

    /// Disable progress bar
    #[arg(long, global = true, default_value = "false")]
    pub no_progress: bool,

    /// Suppress non-error output
    #[arg(short, long, global = true, default_value = "false")]
    pub quiet: bool,

    /// Enable debug logging
    #[arg(long, global = true, default_value = "false")]
    pub debug: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Manage storage endpoint profiles
    #[command(subcommand)]
    Profile(profile::ProfileCommands),

    /// List buckets
    Buckets(buckets::BucketsArgs),

    /// Export a bucket to an archive or directory
    Export(export::ExportArgs),

    /// Import an archive or directory into a bucket
    Import(import::ImportArgs),

    /// Make one bucket match another
    Sync(sync::SyncArgs),

    /// Run a connectivity smoke test against a bucket
    Check(check::CheckArgs),

    /// Two-stage persistence probe
    #[command(subcommand)]
    Probe(probe::ProbeCommands),
}

/// Everything a command needs besides its own arguments
pub(crate) struct Context {
    pub config_manager: ConfigManager,
    pub config: Config,
    pub formatter: Formatter,
}

/// Execute the CLI command and return an exit code
pub async fn execute(cli: Cli) -> ExitCode {
    let flags = OutputConfig {
        json: cli.json,
        no_color: cli.no_color,
        no_progress: cli.no_progress,
        quiet: cli.quiet,
    };

    let loaded = ConfigManager::new().and_then(|manager| {
        let config = manager.load()?;
        tracing::debug!(
            path = %manager.config_path().display(),
            profiles = config.profiles.len(),
            "configuration loaded"
        );
        Ok((manager, config))
    });
    let (config_manager, config) = match loaded {
        Ok(loaded) => loaded,
        Err(e) => return fail(&Formatter::new(flags), &e),
    };

    let ctx = Context {
        formatter: Formatter::new(flags.resolve(&config.defaults)),
        config_manager,
        config,
    };

    match cli.command {
        Commands::Profile(cmd) => profile::execute(cmd, ctx),
        Commands::Buckets(args) => buckets::execute(args, &ctx).await,
        Commands::Export(args) => export::execute(args, &ctx).await,
        Commands::Import(args) => import::execute(args, &ctx).await,
        Commands::Sync(args) => sync::execute(args, &ctx).await,
        Commands::Check(args) => check::execute(args, &ctx).await,
        Commands::Probe(cmd) => probe::execute(cmd, &ctx).await,
    }
}

/// Print an error and map it to its exit code
pub(crate) fn fail(formatter: &Formatter, error: &Error) -> ExitCode {
    tracing::debug!(error = ?error, "command failed");
    formatter.error(&error.to_string());
    ExitCode::from_error(error)
}

fn find_profile(config: &Config, name: &str) -> bp_core::Result<Profile> {
    config
        .profiles
        .iter()
        .find(|p| p.name == name)
        .cloned()
        .ok_or_else(|| Error::ProfileNotFound(name.to_string()))
}

/// Build a transfer engine talking to the named profile
pub(crate) async fn connect(ctx: &Context, profile: &str) -> bp_core::Result<Transfer> {
    let profile = find_profile(&ctx.config, profile)?;
    tracing::debug!(
        profile = %profile.name,
        endpoint = %profile.endpoint,
        max_workers = ctx.config.transfer.max_workers,
        "connecting"
    );
    let client = S3Client::new(&profile).await?;
    Ok(Transfer::new(Arc::new(client), ctx.config.transfer.clone()))
}

/// Fail with NotFound unless `bucket` exists
pub(crate) async fn require_bucket(transfer: &Transfer, bucket: &str) -> bp_core::Result<()> {
    if transfer.store().bucket_exists(bucket).await? {
        Ok(())
    } else {
        Err(Error::NotFound(format!("bucket '{bucket}'")))
    }
}

/// Progress bar wired to the engine's `(processed, total)` callback
pub(crate) fn progress_bar(ctx: &Context, message: &str) -> ProgressBar {
    ProgressBar::new(ctx.formatter.config(), message)
}

/// Exit code of a batch operation that ran to completion
pub(crate) fn batch_exit(ctx: &Context, result: &TransferResult) -> ExitCode {
    if result.has_failures() {
        ctx.formatter.failures(&result.failures, result.failed);
        ExitCode::PartialFailure
    } else {
        ExitCode::Success
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parses_export() {
        let cli = Cli::try_parse_from(["bp", "export", "garage/photos/2024/", "out.tar.gz"]).unwrap();
        assert!(matches!(cli.command, Commands::Export(_)));
    }

    #[test]
    fn test_cli_global_flags_after_subcommand() {
        let cli =
            Cli::try_parse_from(["bp", "buckets", "garage", "--json", "--no-color"]).unwrap();
        assert!(cli.json);
        assert!(cli.no_color);
    }

    #[test]
    fn test_cli_requires_subcommand() {
        assert!(Cli::try_parse_from(["bp"]).is_err());
    }

    #[test]
    fn test_find_profile() {
        let mut config = Config::default();
        config
            .profiles
            .push(Profile::new("garage", "localhost:3900", "a", "b"));
        assert_eq!(find_profile(&config, "garage").unwrap().name, "garage");
        assert!(matches!(
            find_profile(&config, "missing"),
            Err(Error::ProfileNotFound(_))
        ));
    }

    #[test]
    fn test_batch_exit() {
        let ctx = Context {
            config_manager: ConfigManager::with_path("unused.toml".into()),
            config: Config::default(),
            formatter: Formatter::new(OutputConfig {
                quiet: true,
                ..Default::default()
            }),
        };
        let mut result = TransferResult::default();
        result.record_success();
        assert_eq!(batch_exit(&ctx, &result), ExitCode::Success);

        result.record_failure("k", &Error::transfer("k", "boom"));
        assert_eq!(batch_exit(&ctx, &result), ExitCode::PartialFailure);
    }
}
