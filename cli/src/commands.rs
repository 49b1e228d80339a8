//! Command handlers.
//!
//! Items are printed as JSON on stdout. Credential passwords are masked
//! unless `--reveal` is given. Errors carry user-facing messages only.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use directories::ProjectDirs;
use serde::Serialize;
use zeroize::Zeroizing;

use sdm_vault::session_key::SESSION_KEY_SLOT;
use sdm_vault::{
    Credential, CredentialDraft, CredentialPatch, HttpMirror, LinkDraft, LinkPatch, MessageDraft,
    MessagePatch, VaultConfig, VaultError, VaultService,
};

use crate::{AddItem, Cli, Command, Kind, UpdateItem};

/// Environment variable consulted before prompting for the master password.
const MASTER_PASSWORD_ENV: &str = "SDM_MASTER_PASSWORD";

const MASKED: &str = "********";

const MIRROR_FLUSH_TIMEOUT: Duration = Duration::from_secs(5);

pub async fn run(cli: Cli) -> Result<()> {
    let data_dir = match cli.data_dir {
        Some(dir) => dir,
        None => default_data_dir()?,
    };
    let mut config = VaultConfig::load(&data_dir);
    config
        .session_key_file
        .get_or_insert_with(|| PathBuf::from(SESSION_KEY_SLOT));

    if matches!(cli.command, Command::Config) {
        return print_json(&config);
    }

    // The mirror is wired here rather than by `VaultService::open` so the
    // process can wait for deliveries before exiting.
    let mirror = config.mirror_url.take().map(HttpMirror::new);
    let mut vault = VaultService::open(&config, &data_dir);
    if let Some(mirror) = &mirror {
        vault = vault.with_mirror(mirror.clone());
    }

    let result = dispatch(&vault, cli.command).await;
    if let Some(mirror) = mirror {
        mirror.flush(MIRROR_FLUSH_TIMEOUT).await;
    }
    result
}

async fn dispatch(vault: &VaultService, command: Command) -> Result<()> {
    match command {
        Command::Unlock => unlock(vault).await,
        Command::Lock => {
            vault.lock();
            println!("locked");
            Ok(())
        }
        Command::Status => {
            vault.resume().await.map_err(user_error)?;
            println!("{}", vault.state());
            Ok(())
        }
        Command::Config => Ok(()),
        Command::List { kind, reveal } => {
            require_unlocked(vault).await?;
            print_kind(vault, kind, "", reveal)
        }
        Command::Search { kind, term, reveal } => {
            require_unlocked(vault).await?;
            print_kind(vault, kind, &term, reveal)
        }
        Command::Add { item } => {
            require_unlocked(vault).await?;
            let id = add(vault, item)?;
            println!("{id}");
            Ok(())
        }
        Command::Update { item } => {
            require_unlocked(vault).await?;
            update(vault, item)
        }
        Command::Delete { kind, id } => {
            require_unlocked(vault).await?;
            delete(vault, kind, &id)
        }
    }
}

async fn unlock(vault: &VaultService) -> Result<()> {
    if vault.resume().await.map_err(user_error)? {
        println!("already unlocked");
        return Ok(());
    }
    let password = read_master_password()?;
    vault.unlock(&password).await.map_err(user_error)?;
    println!("unlocked");
    Ok(())
}

async fn require_unlocked(vault: &VaultService) -> Result<()> {
    if vault.resume().await.map_err(user_error)? {
        Ok(())
    } else {
        bail!("vault is locked, run `sdm unlock` first")
    }
}

fn print_kind(vault: &VaultService, kind: Kind, term: &str, reveal: bool) -> Result<()> {
    match kind {
        Kind::Credentials => {
            let creds = vault.search_credentials(term).map_err(user_error)?;
            print_json(&credentials_view(&creds, reveal)?)
        }
        Kind::Messages => print_json(&vault.search_messages(term).map_err(user_error)?),
        Kind::Links => print_json(&vault.search_links(term).map_err(user_error)?),
    }
}

fn add(vault: &VaultService, item: AddItem) -> Result<String> {
    let id = match item {
        AddItem::Credential { site, url, user } => {
            let pass = prompt_secret(&format!("Password for {site}: "))?;
            vault.add_credential(CredentialDraft {
                site,
                url,
                user,
                pass: pass.as_str().to_owned(),
            })
        }
        AddItem::Message { title, body } => vault.add_message(MessageDraft { title, body }),
        AddItem::Link { name, url } => vault.add_link(LinkDraft { name, url }),
    };
    id.map_err(user_error)
}

fn update(vault: &VaultService, item: UpdateItem) -> Result<()> {
    match item {
        UpdateItem::Credential {
            id,
            site,
            url,
            user,
            new_pass,
        } => {
            let found = vault.credential(&id).map_err(user_error)?.is_some();
            ensure_exists(found, "credential", &id)?;
            let pass = if new_pass {
                let pass = prompt_secret("New password (empty keeps the current one): ")?;
                Some(pass.as_str().to_owned())
            } else {
                None
            };
            vault
                .update_credential(
                    &id,
                    CredentialPatch {
                        site,
                        url,
                        user,
                        pass,
                    },
                )
                .map_err(user_error)?;
        }
        UpdateItem::Message { id, title, body } => {
            let found = vault.message(&id).map_err(user_error)?.is_some();
            ensure_exists(found, "message", &id)?;
            vault
                .update_message(&id, MessagePatch { title, body })
                .map_err(user_error)?;
        }
        UpdateItem::Link { id, name, url } => {
            let found = vault.link(&id).map_err(user_error)?.is_some();
            ensure_exists(found, "link", &id)?;
            vault
                .update_link(&id, LinkPatch { name, url })
                .map_err(user_error)?;
        }
    }
    println!("updated");
    Ok(())
}

fn delete(vault: &VaultService, kind: Kind, id: &str) -> Result<()> {
    let existed = match kind {
        Kind::Credentials => vault.credential(id).map_err(user_error)?.is_some(),
        Kind::Messages => vault.message(id).map_err(user_error)?.is_some(),
        Kind::Links => vault.link(id).map_err(user_error)?.is_some(),
    };
    let deleted = match kind {
        Kind::Credentials => vault.delete_credential(id),
        Kind::Messages => vault.delete_message(id),
        Kind::Links => vault.delete_link(id),
    };
    deleted.map_err(user_error)?;
    println!("{}", if existed { "deleted" } else { "nothing to delete" });
    Ok(())
}

fn ensure_exists(found: bool, kind: &str, id: &str) -> Result<()> {
    if found {
        Ok(())
    } else {
        Err(anyhow!("no {kind} with id {id}"))
    }
}

/// Credentials as JSON, with `pass` masked unless `reveal`.
fn credentials_view(creds: &[Credential], reveal: bool) -> Result<serde_json::Value> {
    let mut value = serde_json::to_value(creds)?;
    if !reveal {
        if let Some(items) = value.as_array_mut() {
            for item in items {
                if let Some(pass) = item.get_mut("pass") {
                    *pass = serde_json::Value::from(MASKED);
                }
            }
        }
    }
    Ok(value)
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Message for the terminal. Internal detail stays in the debug log.
fn user_error(err: VaultError) -> anyhow::Error {
    tracing::debug!("vault error: {err:?}");
    match err {
        VaultError::UnlockFailed => anyhow!("unlock failed, check the password and try again"),
        VaultError::CryptoNotReady { .. } => {
            anyhow!("crypto self-test did not complete, try again")
        }
        other => anyhow::Error::new(other),
    }
}

fn default_data_dir() -> Result<PathBuf> {
    let dirs = ProjectDirs::from("org", "sdm", "secure-data-manager")
        .ok_or_else(|| anyhow!("cannot determine data directory, pass --data-dir"))?;
    Ok(dirs.data_dir().to_path_buf())
}

fn read_master_password() -> Result<Zeroizing<String>> {
    if let Ok(password) = std::env::var(MASTER_PASSWORD_ENV) {
        if !password.is_empty() {
            return Ok(Zeroizing::new(password));
        }
    }
    let password = prompt_secret("Master password: ")?;
    if password.is_empty() {
        bail!("empty master password not allowed");
    }
    Ok(password)
}

fn prompt_secret(prompt: &str) -> Result<Zeroizing<String>> {
    rpassword::prompt_password(prompt)
        .map(Zeroizing::new)
        .context("failed to read from terminal")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn credential() -> Credential {
        Credential {
            id: "c1".into(),
            site: "Example".into(),
            url: "https://example.com".into(),
            user: "alice".into(),
            pass: "hunter2".into(),
        }
    }

    #[test]
    fn credentials_are_masked_by_default() {
        let view = credentials_view(&[credential()], false).unwrap();
        assert_eq!(view[0]["pass"], MASKED);
        assert_eq!(view[0]["site"], "Example");
        assert!(!view.to_string().contains("hunter2"));
    }

    #[test]
    fn reveal_shows_password() {
        let view = credentials_view(&[credential()], true).unwrap();
        assert_eq!(view[0]["pass"], "hunter2");
    }

    #[test]
    fn unlock_failure_message_is_generic() {
        let msg = user_error(VaultError::UnlockFailed).to_string();
        assert!(msg.contains("check the password"));
    }

    #[test]
    fn missing_item_is_reported() {
        assert!(ensure_exists(false, "link", "x").is_err());
        assert!(ensure_exists(true, "link", "x").is_ok());
    }
}
