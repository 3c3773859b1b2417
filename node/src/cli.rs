//! # CLI Interface
//!
//! Command-line structure for the `timelockr` binary, via `clap` derive.
//! Every vault operation is one subcommand that signs a single transaction
//! with a key file and applies it to the local data directory.

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use timelockr_protocol::crypto::PublicKey;

use crate::logging::LogFormat;

/// Timelockr vault host.
///
/// Keeps vault records, token balances and the replay set in a local
/// sled database. Each command reads the state, applies at most one
/// signed transaction and writes the result back atomically.
#[derive(Parser, Debug)]
#[command(
    name = "timelockr",
    about = "Timelocked custody vaults with delayed backup recovery",
    version,
    propagate_version = true
)]
pub struct TimelockrCli {
    /// Directory holding the vault database.
    #[arg(long, short = 'd', global = true, env = "TIMELOCKR_DATA_DIR", default_value = ".timelockr")]
    pub data_dir: PathBuf,

    /// Log output format.
    #[arg(long, global = true, env = "TIMELOCKR_LOG_FORMAT", value_enum, default_value_t = LogFormat::Pretty)]
    pub log_format: LogFormat,

    /// Default log filter when `RUST_LOG` is not set.
    #[arg(long, global = true, env = "TIMELOCKR_LOG", default_value = "timelockr=info,timelockr_contracts=info,timelockr_protocol=warn")]
    pub log_level: String,

    /// Recovery delay in seconds. Pinned into the database on first use;
    /// later runs must pass the same value or omit it.
    #[arg(long, global = true, env = "TIMELOCKR_RECOVERY_DELAY")]
    pub recovery_delay: Option<i64>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Top-level subcommands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Generate a new identity keypair.
    Keygen(KeygenArgs),
    /// Credit units to an external account (devnet funding).
    Mint(MintArgs),
    /// Create the signer's vault.
    Init(InitArgs),
    /// Move units from the signer into their vault.
    Deposit(DepositArgs),
    /// As backup, start the recovery clock on an owner's vault.
    TriggerRecovery(OwnerArgs),
    /// Withdraw a vault's full balance to the signer.
    Withdraw(WithdrawArgs),
    /// As owner, cancel a pending recovery.
    CancelRecovery(SignerArgs),
    /// Print an owner's vault record.
    Show(LookupArgs),
    /// Print an account's token balance.
    Balance(BalanceArgs),
    /// Print the vault address for an owner.
    Address(LookupArgs),
}

#[derive(Args, Debug)]
pub struct KeygenArgs {
    /// Write the hex secret key here instead of printing it.
    #[arg(long, short = 'o')]
    pub out: Option<PathBuf>,
}

/// Signing key shared by every transaction-producing command.
#[derive(Args, Debug)]
pub struct SignerArgs {
    /// File holding the signer's hex-encoded secret key.
    #[arg(long, short = 'k', env = "TIMELOCKR_KEY")]
    pub key: PathBuf,
}

#[derive(Args, Debug)]
pub struct MintArgs {
    /// Account to credit (base58).
    #[arg(long)]
    pub to: PublicKey,

    #[arg(long)]
    pub amount: u64,
}

#[derive(Args, Debug)]
pub struct InitArgs {
    #[command(flatten)]
    pub signer: SignerArgs,

    /// Backup identity (base58).
    #[arg(long)]
    pub backup: PublicKey,

    /// Absolute unlock time, unix seconds.
    #[arg(long, conflicts_with = "unlock_in", required_unless_present = "unlock_in")]
    pub unlock_at: Option<i64>,

    /// Unlock this many seconds from now.
    #[arg(long)]
    pub unlock_in: Option<i64>,
}

#[derive(Args, Debug)]
pub struct DepositArgs {
    #[command(flatten)]
    pub signer: SignerArgs,

    #[arg(long)]
    pub amount: u64,
}

/// Signer acting on someone else's vault.
#[derive(Args, Debug)]
pub struct OwnerArgs {
    #[command(flatten)]
    pub signer: SignerArgs,

    /// Owner of the target vault (base58).
    #[arg(long)]
    pub owner: PublicKey,
}

#[derive(Args, Debug)]
pub struct WithdrawArgs {
    #[command(flatten)]
    pub signer: SignerArgs,

    /// Owner of the target vault. Defaults to the signer.
    #[arg(long)]
    pub owner: Option<PublicKey>,
}

#[derive(Args, Debug)]
pub struct LookupArgs {
    /// Vault owner (base58).
    #[arg(long)]
    pub owner: PublicKey,
}

#[derive(Args, Debug)]
pub struct BalanceArgs {
    /// Account to inspect (base58).
    #[arg(long)]
    pub account: PublicKey,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn verify_cli_structure() {
        TimelockrCli::command().debug_assert();
    }

    #[test]
    fn parses_withdraw_with_global_options() {
        let owner = PublicKey::from_bytes([3; 32]).to_base58();
        let cli = TimelockrCli::try_parse_from([
            "timelockr",
            "withdraw",
            "--key",
            "backup.key",
            "--owner",
            &owner,
            "--data-dir",
            "/tmp/vaults",
            "--log-format",
            "json",
        ])
        .unwrap();

        assert_eq!(cli.data_dir, PathBuf::from("/tmp/vaults"));
        assert_eq!(cli.log_format, LogFormat::Json);
        match cli.command {
            Commands::Withdraw(args) => {
                assert_eq!(args.signer.key, PathBuf::from("backup.key"));
                assert_eq!(args.owner, Some(PublicKey::from_bytes([3; 32])));
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn init_requires_exactly_one_unlock_option() {
        let backup = PublicKey::from_bytes([4; 32]).to_base58();
        let base = ["timelockr", "init", "--key", "k", "--backup", backup.as_str()];

        assert!(TimelockrCli::try_parse_from(base).is_err());
        assert!(TimelockrCli::try_parse_from(
            base.iter().copied().chain(["--unlock-in", "60", "--unlock-at", "5"])
        )
        .is_err());
        assert!(TimelockrCli::try_parse_from(base.iter().copied().chain(["--unlock-in", "60"])).is_ok());
    }

    #[test]
    fn rejects_malformed_public_key() {
        let result = TimelockrCli::try_parse_from(["timelockr", "balance", "--account", "not-a-key!"]);
        assert!(result.is_err());
    }
}
