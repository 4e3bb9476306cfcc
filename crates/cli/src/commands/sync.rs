//! sync command - Make one bucket match another
//!
//! Both locations must use the same profile; a sync runs over a single
//! client connection.

use clap::Args;
use serde::Serialize;

use bp_core::{Error, RemotePath, SyncPlan, TransferResult, parse_remote};

use super::{Context, batch_exit, connect, fail, progress_bar, require_bucket};
use crate::exit_code::ExitCode;

/// Sync two buckets
#[derive(Args, Debug)]
pub struct SyncArgs {
    /// Source (profile/bucket[/prefix])
    pub source: String,

    /// Destination (profile/bucket)
    pub target: String,

    /// Delete destination objects that are not in the source
    #[arg(long)]
    pub delete: bool,

    /// Show what would change without copying or deleting
    #[arg(long)]
    pub dry_run: bool,
}

#[derive(Debug, Serialize)]
struct SyncOutput {
    source: String,
    target: String,
    copied: u64,
    skipped: u64,
    deleted: u64,
    failed: u64,
}

impl SyncOutput {
    fn new(source: &RemotePath, target: &RemotePath, result: &TransferResult) -> Self {
        Self {
            source: source.to_string(),
            target: target.to_string(),
            copied: result.succeeded,
            skipped: result.skipped,
            deleted: result.deleted,
            failed: result.failed,
        }
    }
}

impl std::fmt::Display for SyncOutput {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Synced {} to {}: {} copied, {} unchanged, {} deleted, {} failed",
            self.source, self.target, self.copied, self.skipped, self.deleted, self.failed
        )
    }
}

#[derive(Debug, Serialize)]
struct DryRunOutput {
    dry_run: bool,
    copy: Vec<String>,
    delete: Vec<String>,
    unchanged: usize,
}

impl From<&SyncPlan> for DryRunOutput {
    fn from(plan: &SyncPlan) -> Self {
        Self {
            dry_run: true,
            copy: plan.copy.iter().map(|o| o.key.clone()).collect(),
            delete: plan.delete.clone(),
            unchanged: plan.skip.len(),
        }
    }
}

impl std::fmt::Display for DryRunOutput {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for key in &self.copy {
            writeln!(f, "copy   {key}")?;
        }
        for key in &self.delete {
            writeln!(f, "delete {key}")?;
        }
        write!(
            f,
            "{} to copy, {} to delete, {} unchanged (dry run)",
            self.copy.len(),
            self.delete.len(),
            self.unchanged
        )
    }
}

fn parse_locations(args: &SyncArgs) -> bp_core::Result<(RemotePath, RemotePath)> {
    let source = parse_remote(&args.source)?;
    let target = parse_remote(&args.target)?;

    if source.profile != target.profile {
        return Err(Error::InvalidPath(format!(
            "source profile '{}' and destination profile '{}' differ",
            source.profile, target.profile
        )));
    }
    if !target.prefix.is_empty() {
        return Err(Error::InvalidPath(format!(
            "'{}': the destination must be a bucket",
            args.target
        )));
    }
    Ok((source, target))
}

/// Execute the sync command
pub async fn execute(args: SyncArgs, ctx: &Context) -> ExitCode {
    let (source, target) = match parse_locations(&args) {
        Ok(locations) => locations,
        Err(e) => return fail(&ctx.formatter, &e),
    };

    let transfer = match connect(ctx, &source.profile).await {
        Ok(transfer) => transfer,
        Err(e) => return fail(&ctx.formatter, &e),
    };
    for bucket in [&source.bucket, &target.bucket] {
        if let Err(e) = require_bucket(&transfer, bucket).await {
            return fail(&ctx.formatter, &e);
        }
    }

    if args.dry_run {
        return match transfer
            .plan_sync(&source.bucket, &target.bucket, &source.prefix, args.delete)
            .await
        {
            Ok(plan) => {
                ctx.formatter.output(&DryRunOutput::from(&plan));
                ExitCode::Success
            }
            Err(e) => fail(&ctx.formatter, &e),
        };
    }

    let bar = progress_bar(ctx, "syncing");
    let progress = |done: u64, total: u64| bar.update(done, total);
    let result = transfer
        .sync_buckets(
            &source.bucket,
            &target.bucket,
            &source.prefix,
            args.delete,
            Some(&progress),
        )
        .await;
    bar.finish_and_clear();

    match result {
        Ok(result) => {
            ctx.formatter
                .output(&SyncOutput::new(&source, &target, &result));
            batch_exit(ctx, &result)
        }
        Err(e) => fail(&ctx.formatter, &e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bp_core::ObjectDescriptor;

    fn args(source: &str, target: &str) -> SyncArgs {
        SyncArgs {
            source: source.into(),
            target: target.into(),
            delete: false,
            dry_run: false,
        }
    }

    #[test]
    fn test_parse_locations() {
        let (source, target) = parse_locations(&args("garage/a/logs/", "garage/b")).unwrap();
        assert_eq!(source.prefix, "logs/");
        assert_eq!(target.bucket, "b");
    }

    #[test]
    fn test_parse_locations_rejects_mixed_profiles() {
        let err = parse_locations(&args("garage/a", "minio/b")).unwrap_err();
        assert!(matches!(err, Error::InvalidPath(_)));
        assert_eq!(err.exit_code(), 2);
    }

    #[test]
    fn test_parse_locations_rejects_destination_prefix() {
        assert!(parse_locations(&args("garage/a", "garage/b/sub/")).is_err());
    }

    #[test]
    fn test_dry_run_output() {
        let plan = SyncPlan {
            copy: vec![ObjectDescriptor {
                key: "x".into(),
                size: 1,
                etag: "e1".into(),
                last_modified: None,
            }],
            skip: vec!["y".into()],
            delete: vec!["orphan".into()],
        };
        let rendered = DryRunOutput::from(&plan).to_string();
        assert!(rendered.contains("copy   x"));
        assert!(rendered.contains("delete orphan"));
        assert!(rendered.ends_with("1 to copy, 1 to delete, 1 unchanged (dry run)"));
    }
}
