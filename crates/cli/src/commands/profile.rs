//! Profile management commands
//!
//! Profiles are named references to S3-compatible endpoints, including
//! connection details and credentials.

use clap::Subcommand;
use comfy_table::{Table, presets::UTF8_BORDERS_ONLY};
use serde::Serialize;

use bp_core::{Profile, ProfileManager};

use super::{Context, fail};
use crate::exit_code::ExitCode;

/// Profile subcommands for managing storage endpoints
#[derive(Subcommand, Debug)]
pub enum ProfileCommands {
    /// Add or update a profile
    Set(SetArgs),

    /// List all configured profiles
    List,

    /// Remove a profile
    Remove(RemoveArgs),
}

/// Arguments for the `profile set` command
#[derive(clap::Args, Debug)]
pub struct SetArgs {
    /// Profile name (e.g., "garage", "backup")
    pub name: String,

    /// Endpoint URL or host:port (e.g., "localhost:3900")
    pub endpoint: String,

    /// Access key ID
    pub access_key: String,

    /// Secret access key
    pub secret_key: String,

    /// Region used for request signing
    #[arg(long, default_value = "garage")]
    pub region: String,

    /// Use HTTPS when the endpoint has no scheme
    #[arg(long)]
    pub secure: bool,

    /// Use virtual-hosted bucket addressing instead of path style
    #[arg(long)]
    pub virtual_host: bool,

    /// Fail instead of replacing an existing profile
    #[arg(long)]
    pub no_clobber: bool,
}

/// Arguments for the `profile remove` command
#[derive(clap::Args, Debug)]
pub struct RemoveArgs {
    /// Name of the profile to remove
    pub name: String,
}

/// Profile information for output (without credentials)
#[derive(Serialize)]
struct ProfileInfo {
    name: String,
    endpoint: String,
    region: String,
    path_style: bool,
}

impl From<&Profile> for ProfileInfo {
    fn from(profile: &Profile) -> Self {
        Self {
            name: profile.name.clone(),
            endpoint: profile
                .endpoint_url()
                .unwrap_or_else(|_| profile.endpoint.clone()),
            region: profile.region.clone(),
            path_style: profile.path_style,
        }
    }
}

#[derive(Serialize)]
struct ProfileListOutput {
    profiles: Vec<ProfileInfo>,
}

/// JSON output for profile set/remove operations
#[derive(Serialize)]
struct ProfileOperationOutput {
    success: bool,
    profile: String,
    message: String,
}

/// Execute a profile subcommand
pub fn execute(cmd: ProfileCommands, ctx: Context) -> ExitCode {
    let Context {
        config_manager,
        formatter,
        ..
    } = ctx;
    let manager = ProfileManager::with_config_manager(config_manager);

    match cmd {
        ProfileCommands::Set(args) => {
            let name = args.name.clone();
            let mut profile = Profile::new(args.name, args.endpoint, args.access_key, args.secret_key);
            profile.region = args.region;
            profile.secure = args.secure;
            profile.path_style = !args.virtual_host;

            let saved = if args.no_clobber {
                manager.add(profile)
            } else {
                manager.set(profile)
            };
            match saved {
                Ok(()) => {
                    let message = format!("Profile '{name}' configured successfully");
                    if formatter.is_json() {
                        formatter.json(&ProfileOperationOutput {
                            success: true,
                            profile: name,
                            message,
                        });
                    } else {
                        formatter.success(&message);
                    }
                    ExitCode::Success
                }
                Err(e) => fail(&formatter, &e),
            }
        }
        ProfileCommands::List => match manager.list() {
            Ok(profiles) => {
                let profiles: Vec<ProfileInfo> = profiles.iter().map(ProfileInfo::from).collect();
                if formatter.is_json() {
                    formatter.json(&ProfileListOutput { profiles });
                } else if profiles.is_empty() {
                    formatter.println("No profiles configured.");
                } else {
                    formatter.println(&profile_table(&profiles).to_string());
                }
                ExitCode::Success
            }
            Err(e) => fail(&formatter, &e),
        },
        ProfileCommands::Remove(args) => match manager.remove(&args.name) {
            Ok(()) => {
                let message = format!("Profile '{}' removed successfully", args.name);
                if formatter.is_json() {
                    formatter.json(&ProfileOperationOutput {
                        success: true,
                        profile: args.name,
                        message,
                    });
                } else {
                    formatter.success(&message);
                }
                ExitCode::Success
            }
            Err(e) => fail(&formatter, &e),
        },
    }
}

fn profile_table(profiles: &[ProfileInfo]) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_BORDERS_ONLY)
        .set_header(vec!["Name", "Endpoint", "Region", "Addressing"]);
    for profile in profiles {
        table.add_row(vec![
            profile.name.as_str(),
            profile.endpoint.as_str(),
            profile.region.as_str(),
            if profile.path_style { "path" } else { "virtual-host" },
        ]);
    }
    table
}
