//! probe commands - Two-stage persistence probe
//!
//! `write` uploads deterministic objects and records them in a state file;
//! `verify`, usually run after a restart of the store, reads them back.

use std::path::PathBuf;

use clap::{Args, Subcommand};
use serde::Serialize;

use bp_core::probe::{
    DEFAULT_PROBE_OBJECTS, DEFAULT_PROBE_SIZE, ProbeVerification, clear_probe, verify_probe,
    write_probe,
};
use bp_core::{Error, ProbeState, ProbeStateFile, RemotePath, parse_remote};

use super::{Context, connect, fail};
use crate::exit_code::ExitCode;

/// Persistence probe subcommands
#[derive(Subcommand, Debug)]
pub enum ProbeCommands {
    /// Upload probe objects and save their state
    Write(WriteArgs),

    /// Check that every recorded probe object is intact
    Verify(StateArgs),

    /// Delete the probe objects and the state file
    Clear(StateArgs),
}

#[derive(Args, Debug)]
pub struct WriteArgs {
    /// Bucket to probe (profile/bucket); created if missing
    pub target: String,

    /// Number of objects to write
    #[arg(long, default_value_t = DEFAULT_PROBE_OBJECTS)]
    pub count: usize,

    /// Size of each object in bytes
    #[arg(long, default_value_t = DEFAULT_PROBE_SIZE)]
    pub size: usize,

    /// State file (default: probe-state.json in the config directory)
    #[arg(long)]
    pub state_file: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub struct StateArgs {
    /// Probed bucket (profile/bucket)
    pub target: String,

    /// State file (default: probe-state.json in the config directory)
    #[arg(long)]
    pub state_file: Option<PathBuf>,
}

#[derive(Debug, Serialize)]
struct VerifyOutput<'a> {
    bucket: &'a str,
    run_id: &'a str,
    checked: u64,
    missing: &'a [String],
    corrupt: &'a [String],
    intact: bool,
}

impl<'a> VerifyOutput<'a> {
    fn new(state: &'a ProbeState, verification: &'a ProbeVerification) -> Self {
        Self {
            bucket: &state.bucket,
            run_id: &state.run_id,
            checked: verification.checked,
            missing: &verification.missing,
            corrupt: &verification.corrupt,
            intact: verification.is_intact(),
        }
    }
}

impl std::fmt::Display for VerifyOutput<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for key in self.missing {
            writeln!(f, "missing {key}")?;
        }
        for key in self.corrupt {
            writeln!(f, "corrupt {key}")?;
        }
        write!(
            f,
            "Checked {} probe objects in {}: {} missing, {} corrupt",
            self.checked,
            self.bucket,
            self.missing.len(),
            self.corrupt.len()
        )
    }
}

fn state_file(path: Option<PathBuf>) -> bp_core::Result<ProbeStateFile> {
    match path {
        Some(path) => Ok(ProbeStateFile::new(path)),
        None => ProbeStateFile::default_location(),
    }
}

/// Load the saved state and make sure it belongs to `target`
fn load_state(file: &ProbeStateFile, target: &RemotePath) -> bp_core::Result<ProbeState> {
    let state = file.load()?.ok_or_else(|| {
        Error::NotFound(format!(
            "no probe state at {}; run 'bp probe write' first",
            file.path().display()
        ))
    })?;
    if state.bucket != target.bucket {
        return Err(Error::InvalidPath(format!(
            "probe state belongs to bucket '{}', not '{}'",
            state.bucket, target.bucket
        )));
    }
    Ok(state)
}

/// Execute a probe subcommand
pub async fn execute(cmd: ProbeCommands, ctx: &Context) -> ExitCode {
    match cmd {
        ProbeCommands::Write(args) => write(args, ctx).await,
        ProbeCommands::Verify(args) => verify(args, ctx).await,
        ProbeCommands::Clear(args) => clear(args, ctx).await,
    }
}

async fn write(args: WriteArgs, ctx: &Context) -> ExitCode {
    let run = async move {
        let target = parse_remote(&args.target)?;
        let file = state_file(args.state_file)?;
        if file.load()?.is_some() {
            ctx.formatter.warning(&format!(
                "replacing existing probe state at {}",
                file.path().display()
            ));
        }
        let transfer = connect(ctx, &target.profile).await?;
        let state = write_probe(transfer.store(), &target.bucket, args.count, args.size).await?;
        file.save(&state)?;
        Ok::<_, Error>((state, file))
    };

    match run.await {
        Ok((state, file)) => {
            if ctx.formatter.is_json() {
                ctx.formatter.json(&state);
            } else {
                ctx.formatter.success(&format!(
                    "Wrote {} probe objects to {} (run {}), state saved to {}",
                    state.objects.len(),
                    state.bucket,
                    state.run_id,
                    file.path().display()
                ));
            }
            ExitCode::Success
        }
        Err(e) => fail(&ctx.formatter, &e),
    }
}

async fn verify(args: StateArgs, ctx: &Context) -> ExitCode {
    let run = async move {
        let target = parse_remote(&args.target)?;
        let state = load_state(&state_file(args.state_file)?, &target)?;
        let transfer = connect(ctx, &target.profile).await?;
        let verification = verify_probe(transfer.store(), &state).await?;
        Ok::<_, Error>((state, verification))
    };

    match run.await {
        Ok((state, verification)) => {
            ctx.formatter.output(&VerifyOutput::new(&state, &verification));
            if verification.is_intact() {
                ExitCode::Success
            } else {
                ExitCode::PartialFailure
            }
        }
        Err(e) => fail(&ctx.formatter, &e),
    }
}

async fn clear(args: StateArgs, ctx: &Context) -> ExitCode {
    let run = async move {
        let target = parse_remote(&args.target)?;
        let file = state_file(args.state_file)?;
        let state = load_state(&file, &target)?;
        let transfer = connect(ctx, &target.profile).await?;
        let removed = clear_probe(transfer.store(), &state).await?;
        file.clear()?;
        Ok::<_, Error>((state.bucket, removed))
    };

    match run.await {
        Ok((bucket, removed)) => {
            ctx.formatter
                .success(&format!("Removed {removed} probe objects from {bucket}"));
            ExitCode::Success
        }
        Err(e) => fail(&ctx.formatter, &e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bp_core::{MemoryStore, ObjectStore};

    #[test]
    fn test_load_state_missing_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let file = ProbeStateFile::new(dir.path().join("state.json"));
        let err = load_state(&file, &RemotePath::new("garage", "b", "")).unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[tokio::test]
    async fn test_load_state_rejects_other_bucket() {
        let store = MemoryStore::new();
        let state = write_probe(&store, "b", 2, 16).await.unwrap();
        let dir = tempfile::tempdir().unwrap();
        let file = ProbeStateFile::new(dir.path().join("state.json"));
        file.save(&state).unwrap();

        assert_eq!(
            load_state(&file, &RemotePath::new("garage", "b", ""))
                .unwrap()
                .run_id,
            state.run_id
        );
        let err = load_state(&file, &RemotePath::new("garage", "other", "")).unwrap_err();
        assert_eq!(err.exit_code(), 2);
    }

    #[tokio::test]
    async fn test_verify_output_lists_losses() {
        let store = MemoryStore::new();
        let state = write_probe(&store, "b", 3, 16).await.unwrap();
        store
            .delete_object("b", &state.objects[1].key)
            .await
            .unwrap();
        let verification = verify_probe(&store, &state).await.unwrap();

        let rendered = VerifyOutput::new(&state, &verification).to_string();
        assert!(rendered.contains(&format!("missing {}", state.objects[1].key)));
        assert!(rendered.ends_with("Checked 3 probe objects in b: 1 missing, 0 corrupt"));
    }
}
