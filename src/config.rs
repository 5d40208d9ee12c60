//! Command-line configuration for the `escrowfold` binary.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

use escrowfold::{Actor, DealCommand, TransitionPolicy};

/// Drive the escrow deal engine against an on-disk store.
#[derive(Debug, Parser)]
#[command(name = "escrowfold", version, about, long_about = None)]
pub struct Cli {
    /// Directory holding the `deals/` table
    #[arg(short, long, env = "ESCROWFOLD_DATA_DIR", default_value = ".escrowfold")]
    pub data_dir: PathBuf,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, env = "RUST_LOG", default_value = "info")]
    pub log_level: String,

    /// Log output format
    #[arg(long, env = "LOG_FORMAT", value_enum, default_value_t = LogFormat::Compact)]
    pub log_format: LogFormat,

    /// Whether out-of-order commands are rejected or recorded
    #[arg(long, env = "ESCROWFOLD_POLICY", value_enum, default_value_t = PolicyArg::Guarded)]
    pub policy: PolicyArg,

    #[command(subcommand)]
    pub command: Command,
}

impl Cli {
    /// Load configuration from environment and CLI arguments.
    ///
    /// # Errors
    ///
    /// Returns an error if the arguments cannot be parsed.
    pub fn load() -> Result<Self, clap::Error> {
        // Load .env file if present (ignore if missing)
        _ = dotenvy::dotenv();

        Self::try_parse()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Compact,
    Json,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum PolicyArg {
    Guarded,
    Recorded,
}

impl From<PolicyArg> for TransitionPolicy {
    fn from(arg: PolicyArg) -> Self {
        match arg {
            PolicyArg::Guarded => Self::Guarded,
            PolicyArg::Recorded => Self::Recorded,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ActorArg {
    Dealer,
    Buyer,
    Agent,
}

impl From<ActorArg> for Actor {
    fn from(arg: ActorArg) -> Self {
        match arg {
            ActorArg::Dealer => Self::Dealer,
            ActorArg::Buyer => Self::Buyer,
            ActorArg::Agent => Self::Agent,
        }
    }
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Create a draft deal
    Create(CreateArgs),

    /// Print one deal, or its quotation/invoice with `--document`
    Show {
        id: String,
        #[arg(long)]
        document: bool,
    },

    /// Print every deal, newest first
    List,

    /// Print the invoice index
    Invoices,

    /// Apply a lifecycle command to a deal
    Op {
        id: String,
        /// One of generate_quotation, send_to_buyer, confirm_by_buyer,
        /// pay_success, pay_fail, mark_ready, confirm_handover,
        /// mark_released, refund, cancel, expire
        #[arg(value_parser = parse_command)]
        command: DealCommand,
        /// Role to record instead of the command's default
        #[arg(long, value_enum)]
        actor: Option<ActorArg>,
        #[arg(long)]
        correlation_id: Option<String>,
    },

    /// Look deals up by OTP, or confirm a handover with `--deal`
    Verify {
        otp: String,
        /// Deal to confirm the handover for
        #[arg(long)]
        deal: Option<String>,
        /// Also release escrow after confirming
        #[arg(long, requires = "deal")]
        release: bool,
    },

    /// Replace all deals with the demo data set
    Reset,
}

#[derive(Debug, Args)]
pub struct CreateArgs {
    #[arg(long)]
    pub title: String,
    #[arg(long)]
    pub quantity: u32,
    /// Price per unit in the minor currency unit
    #[arg(long)]
    pub unit_price: u64,
    #[arg(long)]
    pub buyer_name: String,
    #[arg(long)]
    pub buyer_phone: String,
    #[arg(long)]
    pub buyer_email: String,
    /// Pickup centre id; omit for delivery
    #[arg(long, requires = "centre_name")]
    pub centre_id: Option<String>,
    #[arg(long)]
    pub centre_name: Option<String>,
    #[arg(long, default_value = "")]
    pub centre_address: String,
    #[arg(long)]
    pub notes: Option<String>,
    /// Image reference; repeat for several
    #[arg(long = "image")]
    pub images: Vec<String>,
}

fn parse_command(s: &str) -> Result<DealCommand, String> {
    DealCommand::ALL
        .into_iter()
        .find(|c| c.as_str() == s)
        .ok_or_else(|| format!("unknown command `{s}`"))
}
