//! buckets command - List bucket names for a profile

use clap::Args;
use serde::Serialize;

use super::{Context, connect, fail};
use crate::exit_code::ExitCode;

/// List buckets
#[derive(Args, Debug)]
pub struct BucketsArgs {
    /// Profile name
    pub profile: String,
}

#[derive(Debug, Serialize)]
struct BucketsOutput {
    profile: String,
    buckets: Vec<String>,
}

impl std::fmt::Display for BucketsOutput {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.buckets.is_empty() {
            return write!(f, "No buckets on profile '{}'.", self.profile);
        }
        write!(f, "{}", self.buckets.join("\n"))
    }
}

/// Execute the buckets command
pub async fn execute(args: BucketsArgs, ctx: &Context) -> ExitCode {
    let buckets = match connect(ctx, &args.profile).await {
        Ok(transfer) => transfer.list_buckets().await,
        Err(e) => Err(e),
    };

    match buckets {
        Ok(buckets) => {
            ctx.formatter.output(&BucketsOutput {
                profile: args.profile,
                buckets,
            });
            ExitCode::Success
        }
        Err(e) => fail(&ctx.formatter, &e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_buckets_display() {
        let output = BucketsOutput {
            profile: "garage".into(),
            buckets: vec!["a".into(), "b".into()],
        };
        assert_eq!(output.to_string(), "a\nb");

        let empty = BucketsOutput {
            profile: "garage".into(),
            buckets: vec![],
        };
        assert!(empty.to_string().contains("No buckets"));
    }
}
