use crate::store::{Store, StoreError};

const VERSION_KEY: &[u8] = b"_meta:schema_version";

struct Migration {
    version: u32,
    name: &'static str,
    apply: fn(&Store) -> Result<(), StoreError>,
}

/// Ordered by version; versions are dense starting at 1.
const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        name: "001_initial",
        apply: m001_initial,
    },
];

pub fn latest_version() -> u32 {
    MIGRATIONS.last().map(|m| m.version).unwrap_or(0)
}

/// Applies pending migrations and returns how many ran.
///
/// The version is stored after each step, so a crash between a migration and
/// its checkpoint re-runs that one migration on restart. Every migration must
/// therefore be idempotent.
pub fn run(store: &Store) -> Result<usize, StoreError> {
    let current = current_version(store)?;
    if current > latest_version() {
        return Err(StoreError::Migration {
            version: current,
            message: format!(
                "store schema {current} is newer than this binary ({})",
                latest_version()
            ),
        });
    }

    let mut applied = 0;
    for migration in MIGRATIONS.iter().filter(|m| m.version > current) {
        tracing::info!(version = migration.version, name = migration.name, "Running migration");
        (migration.apply)(store).map_err(|e| StoreError::Migration {
            version: migration.version,
            message: e.to_string(),
        })?;
        set_version(store, migration.version)?;
        applied += 1;
    }

    if applied > 0 {
        tracing::info!(applied, version = latest_version(), "Store schema up to date");
    }
    Ok(applied)
}

pub fn current_version(store: &Store) -> Result<u32, StoreError> {
    let Some(raw) = store.config_versions.get(VERSION_KEY)? else {
        return Ok(0);
    };
    let bytes: [u8; 4] = raw.as_ref().try_into().map_err(|_| StoreError::Migration {
        version: 0,
        message: format!("corrupt schema version ({} bytes)", raw.len()),
    })?;
    Ok(u32::from_be_bytes(bytes))
}

/// Only moves forward.
pub fn set_version(store: &Store, version: u32) -> Result<(), StoreError> {
    let current = current_version(store)?;
    if version < current {
        return Err(StoreError::Migration {
            version,
            message: format!("refuse to downgrade from {current} to {version}"),
        });
    }

    store
        .config_versions
        .insert(VERSION_KEY, &version.to_be_bytes())?;
    Ok(())
}

fn m001_initial(_store: &Store) -> Result<(), StoreError> {
    Ok(())
}
