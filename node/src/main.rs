// Copyright (c) 2026 ALAS Technology. MIT License.
// See LICENSE for details.

//! # Timelockr Host
//!
//! Entry point for the `timelockr` binary. Parses CLI arguments, initializes
//! logging, opens the local vault database and applies at most one signed
//! transaction per invocation.
//!
//! Command results go to stdout as JSON; logs go to stderr.
//!
//! The recovery delay is a deployment parameter. The first command that
//! opens a data directory pins it into the database, and every later run
//! is checked against the pinned value so existing vaults never see their
//! recovery delay change.

mod cli;
mod logging;

use anyhow::{bail, Context, Result};
use clap::Parser;
use serde_json::{json, Value};
use std::path::Path;

use timelockr_contracts::instruction::{Instruction, Transaction};
use timelockr_contracts::runtime::{Receipt, Runtime, SystemClock};
use timelockr_contracts::RecoveryState;
use timelockr_protocol::config::{VaultConfig, DEFAULT_RECOVERY_DELAY_SECS};
use timelockr_protocol::crypto::{Keypair, PublicKey};
use timelockr_protocol::storage::{AccountsDb, ChangeSet};

use cli::{Commands, TimelockrCli};

fn main() -> Result<()> {
    let cli = TimelockrCli::parse();
    logging::init_logging(&cli.log_level, cli.log_format);

    let output = match cli.command {
        Commands::Keygen(args) => keygen(args)?,
        command => {
            let mut node = Node::open(&cli.data_dir, cli.recovery_delay)?;
            node.execute(command)?
        }
    };

    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

/// Generates an identity and either writes it to a key file or prints it.
fn keygen(args: cli::KeygenArgs) -> Result<Value> {
    let keypair = Keypair::generate();
    let public_key = keypair.public_key().to_base58();

    match args.out {
        Some(path) => {
            std::fs::write(&path, keypair.secret_key_hex())
                .with_context(|| format!("failed to write key to {}", path.display()))?;

            #[cfg(unix)]
            {
                use std::os::unix::fs::PermissionsExt;
                std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o600))?;
            }

            tracing::info!(%public_key, key_path = %path.display(), "keypair generated");
            Ok(json!({ "public_key": public_key, "key_file": path.display().to_string() }))
        }
        None => Ok(json!({ "public_key": public_key, "secret_key": keypair.secret_key_hex() })),
    }
}

fn load_keypair(path: &Path) -> Result<Keypair> {
    let hex = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read key file {}", path.display()))?;
    Keypair::from_hex(&hex).with_context(|| format!("invalid key file {}", path.display()))
}

/// Unique per invocation, so two identical requests made at different
/// moments are not mistaken for a replay.
fn fresh_nonce() -> u64 {
    chrono::Utc::now().timestamp_micros().unsigned_abs()
}

// ---------------------------------------------------------------------------
// Node
// ---------------------------------------------------------------------------

/// An opened data directory: the database plus the runtime loaded from it.
struct Node {
    db: AccountsDb,
    runtime: Runtime<SystemClock>,
}

impl Node {
    fn open(data_dir: &Path, recovery_delay: Option<i64>) -> Result<Self> {
        std::fs::create_dir_all(data_dir)
            .with_context(|| format!("failed to create data directory {}", data_dir.display()))?;

        let db_path = data_dir.join("db");
        let db = AccountsDb::open(&db_path)
            .with_context(|| format!("failed to open database at {}", db_path.display()))?;
        let config = pinned_config(&db, recovery_delay)?;

        let runtime = Runtime::load(config, SystemClock, &db).context("failed to load vault state")?;
        tracing::debug!(
            path = %db_path.display(),
            recovery_delay_secs = config.recovery_delay_secs,
            accounts = db.account_count(),
            "data directory opened"
        );
        Ok(Self { db, runtime })
    }

    fn execute(&mut self, command: Commands) -> Result<Value> {
        match command {
            Commands::Keygen(_) => bail!("keygen does not use a data directory"),
            Commands::Mint(args) => self.mint(&args.to, args.amount),
            Commands::Init(args) => {
                let keypair = load_keypair(&args.signer.key)?;
                let unlock_time = match (args.unlock_at, args.unlock_in) {
                    (Some(at), _) => at,
                    (None, Some(secs)) => self
                        .runtime
                        .now()
                        .checked_add(secs)
                        .context("unlock time out of range")?,
                    (None, None) => bail!("one of --unlock-at or --unlock-in is required"),
                };
                let owner = keypair.public_key();
                self.submit(
                    &keypair,
                    &owner,
                    Instruction::Initialize {
                        unlock_time,
                        backup_address: args.backup,
                    },
                )
            }
            Commands::Deposit(args) => {
                let keypair = load_keypair(&args.signer.key)?;
                let owner = keypair.public_key();
                self.submit(&keypair, &owner, Instruction::Deposit { amount: args.amount })
            }
            Commands::TriggerRecovery(args) => {
                let keypair = load_keypair(&args.signer.key)?;
                self.submit(&keypair, &args.owner, Instruction::TriggerRecovery)
            }
            Commands::Withdraw(args) => {
                let keypair = load_keypair(&args.signer.key)?;
                let owner = args.owner.unwrap_or_else(|| keypair.public_key());
                self.submit(&keypair, &owner, Instruction::Withdraw)
            }
            Commands::CancelRecovery(args) => {
                let keypair = load_keypair(&args.key)?;
                let owner = keypair.public_key();
                self.submit(&keypair, &owner, Instruction::CancelRecovery)
            }
            Commands::Show(args) => self.show(&args.owner),
            Commands::Balance(args) => Ok(json!({
                "account": args.account.to_base58(),
                "balance": self.runtime.bank().balance_of(&args.account),
            })),
            Commands::Address(args) => {
                let (address, nonce) = self.runtime.processor().vault_address(&args.owner)?;
                Ok(json!({
                    "owner": args.owner.to_base58(),
                    "vault": address.to_base58(),
                    "nonce": nonce,
                }))
            }
        }
    }

    fn mint(&mut self, account: &PublicKey, amount: u64) -> Result<Value> {
        let balance = self.runtime.bank_mut().mint(account, amount)?;
        self.db.commit(&ChangeSet {
            balances: vec![(*account, balance)],
            ..ChangeSet::default()
        })?;
        Ok(json!({ "account": account.to_base58(), "balance": balance }))
    }

    /// Sign `instruction` against `owner`'s vault and apply it.
    fn submit(&mut self, keypair: &Keypair, owner: &PublicKey, instruction: Instruction) -> Result<Value> {
        let vault = self.runtime.vault_address(owner)?;
        let name = instruction.to_string();
        let tx = Transaction::new_signed(vault, instruction, keypair, fresh_nonce());

        let receipt = self
            .runtime
            .process_and_persist(&tx, &self.db)
            .with_context(|| format!("{name} rejected"))?;
        Ok(receipt_json(&receipt))
    }

    fn show(&self, owner: &PublicKey) -> Result<Value> {
        let vault = self.runtime.vault_address(owner)?;
        let Some(record) = self.runtime.bank().vault(&vault) else {
            bail!("no vault for owner {owner}");
        };
        let now = self.runtime.now();
        let recovery = match record.recovery_state(now) {
            RecoveryState::NoRecovery => json!({ "state": "none" }),
            RecoveryState::Pending { ready_at } => json!({ "state": "pending", "ready_at": ready_at }),
            RecoveryState::Ready => json!({ "state": "ready" }),
        };
        Ok(json!({
            "vault": vault.to_base58(),
            "owner": record.owner.to_base58(),
            "backup_address": record.backup_address.to_base58(),
            "amount": record.amount,
            "custody_balance": self.runtime.bank().balance_of(&vault),
            "unlock_time": record.unlock_time,
            "unlocked": record.owner_unlocked(now),
            "recovery_enabled": record.recovery_enabled,
            "recovery_request_time": record.recovery_request_time,
            "recovery": recovery,
            "now": now,
        }))
    }
}

/// Config for this data directory: the pinned one if present, otherwise a
/// fresh one that gets pinned now.
fn pinned_config(db: &AccountsDb, requested_delay: Option<i64>) -> Result<VaultConfig> {
    match db.load_config()? {
        Some(pinned) => {
            if let Some(delay) = requested_delay {
                if delay != pinned.recovery_delay_secs {
                    bail!(
                        "data directory is pinned to a recovery delay of {}s, refusing {}s",
                        pinned.recovery_delay_secs,
                        delay
                    );
                }
            }
            Ok(pinned)
        }
        None => {
            let config =
                VaultConfig::with_recovery_delay(requested_delay.unwrap_or(DEFAULT_RECOVERY_DELAY_SECS));
            config.validate()?;
            db.store_config(&config)?;
            tracing::info!(recovery_delay_secs = config.recovery_delay_secs, "deployment config pinned");
            Ok(config)
        }
    }
}

fn receipt_json(receipt: &Receipt) -> Value {
    json!({
        "transaction": hex::encode(receipt.transaction_id),
        "vault": receipt.vault.to_base58(),
        "outcome": receipt.outcome,
        "amount": receipt.record.amount,
        "recovery_enabled": receipt.record.recovery_enabled,
        "recovery_request_time": receipt.record.recovery_request_time,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_is_pinned_on_first_open() {
        let dir = tempfile::tempdir().unwrap();
        {
            let node = Node::open(dir.path(), Some(3_600)).unwrap();
            assert_eq!(node.runtime.processor().config().recovery_delay_secs, 3_600);
        }

        let node = Node::open(dir.path(), None).unwrap();
        assert_eq!(node.runtime.processor().config().recovery_delay_secs, 3_600);
        drop(node);

        assert!(Node::open(dir.path(), Some(10)).is_err());
    }

    #[test]
    fn negative_delay_is_refused() {
        let dir = tempfile::tempdir().unwrap();
        assert!(Node::open(dir.path(), Some(-1)).is_err());
    }

    #[test]
    fn vault_commands_persist_across_opens() {
        let dir = tempfile::tempdir().unwrap();
        let owner = Keypair::generate();
        let key_path = dir.path().join("owner.key");
        std::fs::write(&key_path, owner.secret_key_hex()).unwrap();
        let data_dir = dir.path().join("data");

        {
            let mut node = Node::open(&data_dir, None).unwrap();
            node.execute(Commands::Mint(cli::MintArgs {
                to: owner.public_key(),
                amount: 1_000,
            }))
            .unwrap();
            node.execute(Commands::Init(cli::InitArgs {
                signer: cli::SignerArgs { key: key_path.clone() },
                backup: Keypair::generate().public_key(),
                unlock_at: None,
                unlock_in: Some(3_600),
            }))
            .unwrap();
            let out = node
                .execute(Commands::Deposit(cli::DepositArgs {
                    signer: cli::SignerArgs { key: key_path.clone() },
                    amount: 600,
                }))
                .unwrap();
            assert_eq!(out["outcome"]["kind"], "deposited");
            assert_eq!(out["amount"], 600);
        }

        let mut node = Node::open(&data_dir, None).unwrap();
        let shown = node
            .execute(Commands::Show(cli::LookupArgs {
                owner: owner.public_key(),
            }))
            .unwrap();
        assert_eq!(shown["amount"], 600);
        assert_eq!(shown["custody_balance"], 600);
        assert_eq!(shown["unlocked"], false);
        assert_eq!(shown["recovery"]["state"], "none");

        // Still locked for another hour.
        let err = node
            .execute(Commands::Withdraw(cli::WithdrawArgs {
                signer: cli::SignerArgs { key: key_path },
                owner: None,
            }))
            .unwrap_err();
        assert!(err.to_string().contains("Withdraw rejected"));

        let balance = node
            .execute(Commands::Balance(cli::BalanceArgs {
                account: owner.public_key(),
            }))
            .unwrap();
        assert_eq!(balance["balance"], 400);
    }
}
