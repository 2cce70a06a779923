use std::sync::Arc;

use {
    anyhow::{Context, bail},
    clap::{Args, Subcommand},
    secrecy::{ExposeSecret, Secret},
    tally_config::TallyConfig,
    tally_vault::{Decrypted, FileStore, SweepReport, Vault, VaultState},
};

#[derive(Args)]
pub struct PassphraseArg {
    /// Vault passphrase.
    #[arg(long, env = "TALLY_PASSPHRASE", hide_env_values = true)]
    passphrase: Option<String>,
}

impl PassphraseArg {
    fn take(self) -> anyhow::Result<Secret<String>> {
        match self.passphrase {
            Some(p) => Ok(Secret::new(p)),
            None => bail!("passphrase required: pass --passphrase or set TALLY_PASSPHRASE"),
        }
    }
}

#[derive(Subcommand)]
pub enum VaultAction {
    /// Print the vault status as JSON.
    Status,
    /// Create a new vault with a passphrase.
    Setup {
        #[command(flatten)]
        passphrase: PassphraseArg,
    },
    /// Check the passphrase (runs the legacy sweep as a side effect).
    Unlock {
        #[command(flatten)]
        passphrase: PassphraseArg,
    },
    /// Encrypt text into an envelope.
    Encrypt {
        text: String,
        #[command(flatten)]
        passphrase: PassphraseArg,
    },
    /// Decrypt an envelope. Non-envelope input is echoed back.
    Decrypt {
        text: String,
        #[command(flatten)]
        passphrase: PassphraseArg,
    },
    /// Re-encrypt plaintext entries left in the store.
    Migrate {
        #[command(flatten)]
        passphrase: PassphraseArg,
    },
    /// Delete vault metadata. Encrypted entries become unreadable.
    Clear {
        /// Confirm the deletion.
        #[arg(long)]
        yes: bool,
    },
}

pub async fn handle_vault(action: VaultAction, config: &TallyConfig) -> anyhow::Result<()> {
    let vault = open_vault(config)?;
    let status = vault.initialize().await;
    if status.state == VaultState::Error {
        bail!("cryptographic primitives unavailable; the vault cannot be used");
    }

    match action {
        VaultAction::Status => {
            println!("{}", serde_json::to_string_pretty(&status)?);
        },
        VaultAction::Setup { passphrase } => {
            let passphrase = passphrase.take()?;
            let report = vault.setup_passphrase(passphrase.expose_secret()).await?;
            println!("Vault created.");
            print_report(&report);
        },
        VaultAction::Unlock { passphrase } => {
            unlock(&vault, passphrase).await?;
            println!("Passphrase accepted.");
        },
        VaultAction::Encrypt { text, passphrase } => {
            unlock(&vault, passphrase).await?;
            let envelope = vault.encryptor().encrypt_string(text.as_str())?;
            println!("{}", envelope.to_json()?);
        },
        VaultAction::Decrypt { text, passphrase } => {
            unlock(&vault, passphrase).await?;
            match vault.encryptor().try_decrypt_string(&text)? {
                Decrypted::Plaintext(plaintext) => println!("{plaintext}"),
                Decrypted::Passthrough(raw) => {
                    eprintln!("input is not an envelope, echoing it back");
                    println!("{raw}");
                },
            }
        },
        VaultAction::Migrate { passphrase } => {
            let report = unlock(&vault, passphrase).await?;
            print_report(&report);
        },
        VaultAction::Clear { yes } => {
            if !yes {
                bail!("refusing to clear the vault without --yes");
            }
            vault.clear_all().await?;
            println!("Vault metadata removed.");
        },
    }

    vault.lock().await;
    Ok(())
}

fn open_vault(config: &TallyConfig) -> anyhow::Result<Vault> {
    let path = tally_config::resolve_store_path(config);
    let store = FileStore::open(&path)
        .with_context(|| format!("failed to open store at {}", path.display()))?;
    Ok(Vault::new(Arc::new(store), config.vault.clone()))
}

async fn unlock(vault: &Vault, passphrase: PassphraseArg) -> anyhow::Result<SweepReport> {
    let passphrase = passphrase.take()?;
    Ok(vault.unlock(passphrase.expose_secret()).await?)
}

fn print_report(report: &SweepReport) {
    println!(
        "Legacy entries: {} migrated, {} skipped, {} already encrypted.",
        report.migrated, report.skipped, report.already_encrypted
    );
}
