//! export command - Back up a bucket
//!
//! Writes a gzip-compressed tar archive by default, or a directory tree
//! with `--dir`. The manifest is written last in both modes.

use std::path::PathBuf;

use clap::Args;
use serde::Serialize;

use bp_core::{ExportReport, RemotePath, parse_remote};

use super::{Context, batch_exit, connect, fail, progress_bar, require_bucket};
use crate::exit_code::ExitCode;

/// Export a bucket
#[derive(Args, Debug)]
pub struct ExportArgs {
    /// Source (profile/bucket[/prefix])
    pub source: String,

    /// Archive file, or directory with --dir
    pub target: PathBuf,

    /// Mirror into a directory instead of writing an archive
    #[arg(long)]
    pub dir: bool,
}

#[derive(Debug, Serialize)]
struct ExportOutput {
    source: String,
    target: String,
    exported: u64,
    failed: u64,
    total_size_bytes: u64,
    total_size_human: String,
}

impl ExportOutput {
    fn new(source: &RemotePath, target: &std::path::Path, report: &ExportReport) -> Self {
        Self {
            source: source.to_string(),
            target: target.display().to_string(),
            exported: report.result.succeeded,
            failed: report.result.failed,
            total_size_bytes: report.manifest.total_size,
            total_size_human: humansize::format_size(report.manifest.total_size, humansize::BINARY),
        }
    }
}

impl std::fmt::Display for ExportOutput {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Exported {} objects ({}) from {} to {}",
            self.exported, self.total_size_human, self.source, self.target
        )?;
        if self.failed > 0 {
            write!(f, ", {} failed", self.failed)?;
        }
        Ok(())
    }
}

/// Execute the export command
pub async fn execute(args: ExportArgs, ctx: &Context) -> ExitCode {
    let source = match parse_remote(&args.source) {
        Ok(source) => source,
        Err(e) => return fail(&ctx.formatter, &e),
    };

    let transfer = match connect(ctx, &source.profile).await {
        Ok(transfer) => transfer,
        Err(e) => return fail(&ctx.formatter, &e),
    };
    if let Err(e) = require_bucket(&transfer, &source.bucket).await {
        return fail(&ctx.formatter, &e);
    }

    let bar = progress_bar(ctx, "exporting");
    let progress = |done: u64, total: u64| bar.update(done, total);
    let report = if args.dir {
        transfer
            .export_to_directory(&source.bucket, &args.target, &source.prefix, Some(&progress))
            .await
    } else {
        transfer
            .export_bucket(&source.bucket, &args.target, &source.prefix, Some(&progress))
            .await
    };
    bar.finish_and_clear();

    match report {
        Ok(report) => {
            ctx.formatter
                .output(&ExportOutput::new(&source, &args.target, &report));
            batch_exit(ctx, &report.result)
        }
        Err(e) => fail(&ctx.formatter, &e),
    }
}
