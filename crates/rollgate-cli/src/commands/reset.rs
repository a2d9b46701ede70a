use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, bail};
use tracing::info;

use rollgate_core::{RuntimePair, Settings, epoch_millis};
use rollgate_state::StateStore;

pub fn reset(
    settings: &Settings,
    old: &str,
    new: &str,
    force: bool,
    data_dir: Option<PathBuf>,
) -> anyhow::Result<ExitCode> {
    let pair = RuntimePair::new(super::parse_runtime(old, None)?, super::parse_runtime(new, None)?);
    let key = pair.key();
    let dir = data_dir.unwrap_or_else(|| settings.rollout.data_dir.clone());
    let store = StateStore::open_dir(&dir)
        .with_context(|| format!("opening state in {}", dir.display()))?;

    reset_pair(&store, &key, force)?;
    Ok(ExitCode::SUCCESS)
}

fn reset_pair(store: &StateStore, key: &str, force: bool) -> anyhow::Result<()> {
    let live_lease = store
        .get_lease(key)?
        .filter(|lease| !lease.is_expired(epoch_millis()));
    if let Some(lease) = &live_lease {
        if !force {
            bail!(
                "rollout {key} is in progress under operation '{}' (lease expires at {} ms); pass --force to clear it",
                lease.token,
                lease.expires_at_ms
            );
        }
    }

    let removed = store.delete_record(key)?;
    let cleared = store.clear_lease(key)?;
    info!(pair = %key, removed, cleared, "rollout state reset");
    match (removed, cleared) {
        (false, false) => println!("nothing recorded for {key}"),
        _ => println!("✓ reset {key}"),
    }
    Ok(())
}
