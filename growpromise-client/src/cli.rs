use std::path::PathBuf;

use clap::{Parser, Subcommand};

const HELP_EPILOG: &str = r#"Config resolution order:
  1) --config/-c PATH
  2) $GROWPROMISE_CONFIG
  3) XDG default: ~/.config/growpromise/client.yaml

Actions submitted while the server is unreachable are kept in a durable
queue and replayed on the next `sync` (or any later `submit`).
"#;

#[derive(Debug, Parser)]
#[command(
    name = "growpromise-client",
    version,
    about = "Dependent-side sync agent for GrowPromise",
    long_about = None,
    after_long_help = HELP_EPILOG,
)]
pub struct Cli {
    /// Path to YAML config file
    #[arg(short, long)]
    pub config: Option<PathBuf>,
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Log in to the server and save the token in the keyring
    Login {
        /// Server URL (e.g., http://127.0.0.1:5230). Falls back to config or prompt.
        #[arg(long)]
        server: Option<String>,
        /// Username. Falls back to prompt.
        #[arg(long)]
        username: Option<String>,
    },
    /// Submit photographic proof for an assignment (queued if offline)
    Submit {
        /// Assignment id to verify
        #[arg(long)]
        assignment: String,
        /// Opaque reference to the uploaded proof image
        #[arg(long)]
        image: String,
        /// Optional note for the guardian
        #[arg(long)]
        note: Option<String>,
    },
    /// Replay queued actions against the server
    Sync,
    /// Inspect or edit the pending-action queue
    Queue {
        #[command(subcommand)]
        command: QueueCommand,
    },
    /// Show assignments, sticker balance and plant (cached when offline)
    Status,
    /// List the sticker collection
    Stickers,
    /// List redeemable rewards
    Rewards,
    /// Redeem a reward by id
    Redeem {
        /// Reward id to redeem
        #[arg(long)]
        reward: String,
    },
    /// Adopt a plant; lists available types when --type is omitted
    Adopt {
        /// Plant type id
        #[arg(long = "type")]
        plant_type: Option<String>,
    },
    /// Water the active plant
    Water,
    /// Spend experience to advance the plant a stage
    Advance,
}

#[derive(Debug, Subcommand)]
pub enum QueueCommand {
    /// List queued actions
    List,
    /// Drop a queued action by sequence number
    Drop {
        #[arg(long)]
        seq: u64,
    },
}
