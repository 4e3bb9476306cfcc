//! import command - Restore a bucket
//!
//! Reads an archive written by `bp export`, or with `--dir` a directory
//! tree. A key prefix is only meaningful for directory imports; archive
//! members already carry full keys.

use std::path::PathBuf;

use clap::Args;
use serde::Serialize;

use bp_core::{Error, TransferResult, parse_remote};

use super::{Context, batch_exit, connect, fail, progress_bar, require_bucket};
use crate::exit_code::ExitCode;

/// Import into a bucket
#[derive(Args, Debug)]
pub struct ImportArgs {
    /// Archive file, or directory with --dir
    pub source: PathBuf,

    /// Destination (profile/bucket[/prefix])
    pub target: String,

    /// Read a directory tree instead of an archive
    #[arg(long)]
    pub dir: bool,

    /// Skip keys that already exist in the destination
    #[arg(long)]
    pub no_overwrite: bool,
}

#[derive(Debug, Serialize)]
struct ImportOutput {
    source: String,
    target: String,
    imported: u64,
    skipped: u64,
    failed: u64,
}

impl ImportOutput {
    fn new(source: String, target: String, result: &TransferResult) -> Self {
        Self {
            source,
            target,
            imported: result.succeeded,
            skipped: result.skipped,
            failed: result.failed,
        }
    }
}

impl std::fmt::Display for ImportOutput {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Imported {} objects into {} ({} skipped, {} failed)",
            self.imported, self.target, self.skipped, self.failed
        )
    }
}

/// Execute the import command
pub async fn execute(args: ImportArgs, ctx: &Context) -> ExitCode {
    let target = match parse_remote(&args.target) {
        Ok(target) => target,
        Err(e) => return fail(&ctx.formatter, &e),
    };
    if !args.dir && !target.prefix.is_empty() {
        let e = Error::InvalidPath(format!(
            "'{}': a key prefix is only supported with --dir",
            args.target
        ));
        return fail(&ctx.formatter, &e);
    }

    let transfer = match connect(ctx, &target.profile).await {
        Ok(transfer) => transfer,
        Err(e) => return fail(&ctx.formatter, &e),
    };
    if let Err(e) = require_bucket(&transfer, &target.bucket).await {
        return fail(&ctx.formatter, &e);
    }

    let overwrite = !args.no_overwrite;
    let bar = progress_bar(ctx, "importing");
    let progress = |done: u64, total: u64| bar.update(done, total);
    let result = if args.dir {
        transfer
            .import_from_directory(
                &target.bucket,
                &args.source,
                &target.prefix,
                overwrite,
                Some(&progress),
            )
            .await
    } else {
        transfer
            .import_bucket(&target.bucket, &args.source, overwrite, Some(&progress))
            .await
    };
    bar.finish_and_clear();

    match result {
        Ok(result) => {
            ctx.formatter.output(&ImportOutput::new(
                args.source.display().to_string(),
                target.to_string(),
                &result,
            ));
            batch_exit(ctx, &result)
        }
        Err(e) => fail(&ctx.formatter, &e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_import_output_display() {
        let mut result = TransferResult::default();
        result.record_success();
        result.record_skip();
        let output = ImportOutput::new("backup.tar.gz".into(), "garage/photos".into(), &result);
        assert_eq!(
            output.to_string(),
            "Imported 1 objects into garage/photos (1 skipped, 0 failed)"
        );
    }
}
