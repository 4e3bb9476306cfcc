//! check command - Connectivity smoke test

use clap::Args;
use comfy_table::{Table, presets::UTF8_BORDERS_ONLY};

use bp_core::parse_remote;
use bp_core::probe::{SmokeReport, StepStatus, run_smoke_test};

use super::{Context, connect, fail};
use crate::exit_code::ExitCode;

/// Run a smoke test against a bucket
#[derive(Args, Debug)]
pub struct CheckArgs {
    /// Bucket to test (profile/bucket); created if missing
    pub target: String,
}

/// Execute the check command
pub async fn execute(args: CheckArgs, ctx: &Context) -> ExitCode {
    let target = match parse_remote(&args.target) {
        Ok(target) => target,
        Err(e) => return fail(&ctx.formatter, &e),
    };
    let transfer = match connect(ctx, &target.profile).await {
        Ok(transfer) => transfer,
        Err(e) => return fail(&ctx.formatter, &e),
    };

    let report = run_smoke_test(transfer.store(), &target.bucket).await;

    if ctx.formatter.is_json() {
        ctx.formatter.json(&report);
    } else {
        ctx.formatter.println(&steps_table(&report).to_string());
    }

    if report.passed() {
        ctx.formatter
            .success(&format!("{target}: all checks passed"));
        ExitCode::Success
    } else {
        ctx.formatter.error(&format!("{target}: smoke test failed"));
        ExitCode::GeneralError
    }
}

fn steps_table(report: &SmokeReport) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_BORDERS_ONLY)
        .set_header(vec!["Step", "Result", "Error"]);
    for step in &report.steps {
        let status = match step.status {
            StepStatus::Passed => "passed",
            StepStatus::Failed => "FAILED",
            StepStatus::Skipped => "skipped",
        };
        table.add_row(vec![
            step.name,
            status,
            step.error.as_deref().unwrap_or(""),
        ]);
    }
    table
}

#[cfg(test)]
mod tests {
    use super::*;
    use bp_core::MemoryStore;

    #[tokio::test]
    async fn test_steps_table_shows_every_step() {
        let store = MemoryStore::with_buckets(&["b"]);
        let report = run_smoke_test(&store, "b").await;
        let rendered = steps_table(&report).to_string();
        for step in ["bucket_exists", "put_object", "get_object", "list_objects", "delete_object"] {
            assert!(rendered.contains(step), "{step}");
        }
        assert!(!rendered.contains("FAILED"));
    }
}
