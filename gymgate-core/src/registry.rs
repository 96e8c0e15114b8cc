//! File-backed origin registry and tenant state store.
//!
//! # Storage layout
//!
//! ```text
//! ~/.gymgate/
//!   origins/
//!     <tenant_id>.yaml   (one OriginEntry per tenant, mode 0600)
//!   tenants/
//!     <tenant_id>.yaml   (TenantState: status + port, mode 0600)
//! ```
//!
//! One file per tenant gives last-writer-wins per `tenant_id` and lets
//! readers scan concurrently with a single mutator.
//!
//! # API pattern
//!
//! Every function has two forms:
//! - `fn_at(home: &Path, …)`: explicit home, used in tests with `TempDir`
//! - `fn(…)`: derives home from `dirs::home_dir()`, delegates to `_at`
//!
//! Components never call these directly; they go through the
//! [`OriginRegistry`] and [`TenantStore`] traits so the store can be swapped.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{io_err, RegistryError};
use crate::types::{OriginEntry, TenantId, TenantState};

// ---------------------------------------------------------------------------
// 1. Traits
// ---------------------------------------------------------------------------

/// Keyed collection of [`OriginEntry`] rows, one per tenant.
pub trait OriginRegistry {
    /// Full scan of every origin currently registered.
    fn list_origins(&self) -> Result<Vec<OriginEntry>, RegistryError>;

    fn get_origin(&self, tenant: &TenantId) -> Result<Option<OriginEntry>, RegistryError>;

    /// Insert or replace the entry for `entry.tenant_id`.
    fn upsert_origin(&self, entry: &OriginEntry) -> Result<(), RegistryError>;

    /// Returns `true` if an entry existed.
    fn delete_origin(&self, tenant: &TenantId) -> Result<bool, RegistryError>;
}

/// The `status`/`port` part of tenant metadata owned by the supervisor.
pub trait TenantStore {
    fn load_tenant(&self, tenant: &TenantId) -> Result<Option<TenantState>, RegistryError>;

    fn save_tenant(&self, state: &TenantState) -> Result<(), RegistryError>;

    fn delete_tenant(&self, tenant: &TenantId) -> Result<bool, RegistryError>;

    fn list_tenants(&self) -> Result<Vec<TenantState>, RegistryError>;
}

// ---------------------------------------------------------------------------
// 2. Path helpers
// ---------------------------------------------------------------------------

/// `<home>/.gymgate/`
pub fn gymgate_root(home: &Path) -> PathBuf {
    home.join(".gymgate")
}

/// `<home>/.gymgate/origins/`
pub fn origins_dir_at(home: &Path) -> PathBuf {
    gymgate_root(home).join("origins")
}

/// `<home>/.gymgate/tenants/`
pub fn tenants_dir_at(home: &Path) -> PathBuf {
    gymgate_root(home).join("tenants")
}

/// `<home>/.gymgate/origins/<tenant>.yaml`. Validates the id, no I/O.
pub fn origin_path_at(home: &Path, tenant: &TenantId) -> Result<PathBuf, RegistryError> {
    validate_tenant_id(tenant)?;
    Ok(origins_dir_at(home).join(format!("{}.yaml", tenant.0)))
}

/// `<home>/.gymgate/tenants/<tenant>.yaml`. Validates the id, no I/O.
pub fn tenant_path_at(home: &Path, tenant: &TenantId) -> Result<PathBuf, RegistryError> {
    validate_tenant_id(tenant)?;
    Ok(tenants_dir_at(home).join(format!("{}.yaml", tenant.0)))
}

/// Tenant ids become file names: reject empty, dot-names and separators.
pub fn validate_tenant_id(tenant: &TenantId) -> Result<(), RegistryError> {
    let id = tenant.as_str();
    let bad = id.is_empty()
        || id.starts_with('.')
        || id.contains(['/', '\\', '\0'])
        || id.chars().any(char::is_whitespace);
    if bad {
        return Err(RegistryError::InvalidTenantId(id.to_owned()));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// 3. Origins
// ---------------------------------------------------------------------------

/// Every origin under `<home>/.gymgate/origins/`, ordered by file name.
pub fn list_origins_at(home: &Path) -> Result<Vec<OriginEntry>, RegistryError> {
    list_yaml_dir(&origins_dir_at(home))
}

pub fn list_origins() -> Result<Vec<OriginEntry>, RegistryError> {
    list_origins_at(&home()?)
}

pub fn load_origin_at(home: &Path, tenant: &TenantId) -> Result<Option<OriginEntry>, RegistryError> {
    load_yaml(&origin_path_at(home, tenant)?)
}

/// Atomically write the origin entry for `entry.tenant_id`.
pub fn save_origin_at(home: &Path, entry: &OriginEntry) -> Result<(), RegistryError> {
    save_yaml(&origin_path_at(home, &entry.tenant_id)?, entry)
}

pub fn delete_origin_at(home: &Path, tenant: &TenantId) -> Result<bool, RegistryError> {
    remove_if_present(&origin_path_at(home, tenant)?)
}

/// Seed the reserved `frontend` allow-list origin if it is not present yet.
///
/// Returns `true` when a new entry was written.
pub fn seed_frontend_at(home: &Path, url: &str) -> Result<bool, RegistryError> {
    let tenant = TenantId::frontend();
    if load_origin_at(home, &tenant)?.is_some() {
        return Ok(false);
    }
    let entry = OriginEntry {
        tenant_id: tenant,
        port: None,
        url: url.to_owned(),
        created_at: chrono::Utc::now(),
    };
    save_origin_at(home, &entry)?;
    Ok(true)
}

// ---------------------------------------------------------------------------
// 4. Tenant state
// ---------------------------------------------------------------------------

pub fn list_tenants_at(home: &Path) -> Result<Vec<TenantState>, RegistryError> {
    list_yaml_dir(&tenants_dir_at(home))
}

pub fn load_tenant_at(home: &Path, tenant: &TenantId) -> Result<Option<TenantState>, RegistryError> {
    load_yaml(&tenant_path_at(home, tenant)?)
}

pub fn save_tenant_at(home: &Path, state: &TenantState) -> Result<(), RegistryError> {
    save_yaml(&tenant_path_at(home, &state.id)?, state)
}

pub fn delete_tenant_at(home: &Path, tenant: &TenantId) -> Result<bool, RegistryError> {
    remove_if_present(&tenant_path_at(home, tenant)?)
}

// ---------------------------------------------------------------------------
// 5. FileRegistry
// ---------------------------------------------------------------------------

/// [`OriginRegistry`] + [`TenantStore`] over the `~/.gymgate/` layout.
///
/// Holds only the home path; every call re-reads disk.
#[derive(Debug, Clone)]
pub struct FileRegistry {
    home: PathBuf,
}

impl FileRegistry {
    pub fn new(home: impl Into<PathBuf>) -> Self {
        Self { home: home.into() }
    }

    /// Registry rooted at `dirs::home_dir()`.
    pub fn from_home() -> Result<Self, RegistryError> {
        Ok(Self::new(home()?))
    }

    pub fn home(&self) -> &Path {
        &self.home
    }
}

impl OriginRegistry for FileRegistry {
    fn list_origins(&self) -> Result<Vec<OriginEntry>, RegistryError> {
        list_origins_at(&self.home)
    }

    fn get_origin(&self, tenant: &TenantId) -> Result<Option<OriginEntry>, RegistryError> {
        load_origin_at(&self.home, tenant)
    }

    fn upsert_origin(&self, entry: &OriginEntry) -> Result<(), RegistryError> {
        save_origin_at(&self.home, entry)
    }

    fn delete_origin(&self, tenant: &TenantId) -> Result<bool, RegistryError> {
        delete_origin_at(&self.home, tenant)
    }
}

impl TenantStore for FileRegistry {
    fn load_tenant(&self, tenant: &TenantId) -> Result<Option<TenantState>, RegistryError> {
        load_tenant_at(&self.home, tenant)
    }

    fn save_tenant(&self, state: &TenantState) -> Result<(), RegistryError> {
        save_tenant_at(&self.home, state)
    }

    fn delete_tenant(&self, tenant: &TenantId) -> Result<bool, RegistryError> {
        delete_tenant_at(&self.home, tenant)
    }

    fn list_tenants(&self) -> Result<Vec<TenantState>, RegistryError> {
        list_tenants_at(&self.home)
    }
}

// ---------------------------------------------------------------------------
// Private helpers
// ---------------------------------------------------------------------------

fn home() -> Result<PathBuf, RegistryError> {
    dirs::home_dir().ok_or(RegistryError::HomeNotFound)
}

fn list_yaml_dir<T: DeserializeOwned>(dir: &Path) -> Result<Vec<T>, RegistryError> {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(err) if err.kind() == ErrorKind::NotFound => return Ok(vec![]),
        Err(err) => return Err(io_err(dir, err)),
    };

    let mut files: Vec<_> = entries
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().map(|t| t.is_file()).unwrap_or(false))
        .filter(|e| e.file_name().to_string_lossy().ends_with(".yaml"))
        .collect();
    files.sort_by_key(|e| e.file_name());

    let mut result = Vec::with_capacity(files.len());
    for file in files {
        let path = file.path();
        let contents = match std::fs::read_to_string(&path) {
            Ok(contents) => contents,
            // Deleted between read_dir and read: a concurrent teardown.
            Err(err) if err.kind() == ErrorKind::NotFound => continue,
            Err(err) => return Err(io_err(&path, err)),
        };
        let value = serde_yaml::from_str(&contents)
            .map_err(|source| RegistryError::Parse { path, source })?;
        result.push(value);
    }
    Ok(result)
}

fn load_yaml<T: DeserializeOwned>(path: &Path) -> Result<Option<T>, RegistryError> {
    let contents = match std::fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
        Err(err) => return Err(io_err(path, err)),
    };
    serde_yaml::from_str(&contents)
        .map(Some)
        .map_err(|source| RegistryError::Parse {
            path: path.to_path_buf(),
            source,
        })
}

/// Write flow: serialize → `.yaml.tmp` sibling → `chmod 0600` → `rename`.
fn save_yaml<T: Serialize>(path: &Path, value: &T) -> Result<(), RegistryError> {
    if let Some(dir) = path.parent() {
        ensure_dir(dir)?;
    }
    let tmp = path.with_extension("yaml.tmp");
    let yaml = serde_yaml::to_string(value)?;
    std::fs::write(&tmp, yaml).map_err(|e| io_err(&tmp, e))?;
    set_file_permissions(&tmp)?;
    if let Err(err) = std::fs::rename(&tmp, path) {
        let _ = std::fs::remove_file(&tmp);
        return Err(io_err(path, err));
    }
    Ok(())
}

fn remove_if_present(path: &Path) -> Result<bool, RegistryError> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(false),
        Err(err) => Err(io_err(path, err)),
    }
}

fn ensure_dir(dir: &Path) -> Result<(), RegistryError> {
    if !dir.exists() {
        std::fs::create_dir_all(dir).map_err(|e| io_err(dir, e))?;
        set_dir_permissions(dir)?;
    }
    Ok(())
}

#[cfg(unix)]
fn set_dir_permissions(path: &Path) -> Result<(), RegistryError> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o700))
        .map_err(|e| io_err(path, e))
}
#[cfg(not(unix))]
fn set_dir_permissions(_path: &Path) -> Result<(), RegistryError> {
    Ok(())
}

#[cfg(unix)]
fn set_file_permissions(path: &Path) -> Result<(), RegistryError> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))
        .map_err(|e| io_err(path, e))
}
#[cfg(not(unix))]
fn set_file_permissions(_path: &Path) -> Result<(), RegistryError> {
    Ok(())
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::TenantStatus;
    use tempfile::TempDir;

    fn make_home() -> TempDir {
        TempDir::new().expect("tempdir")
    }

    #[test]
    fn origin_path_is_correct() {
        let home = make_home();
        let path = origin_path_at(home.path(), &TenantId::from("gymA")).expect("path");
        assert!(path.ends_with(".gymgate/origins/gymA.yaml"));
    }

    #[test]
    fn rejects_path_like_tenant_ids() {
        for bad in ["", "..", ".hidden", "a/b", "a b"] {
            let err = validate_tenant_id(&TenantId::from(bad)).unwrap_err();
            assert!(matches!(err, RegistryError::InvalidTenantId(_)), "{bad:?}");
        }
        validate_tenant_id(&TenantId::from("65a1f0c2e4b0")).expect("object-id style id");
    }

    #[test]
    fn list_origins_empty_when_dir_missing() {
        let home = make_home();
        assert!(list_origins_at(home.path()).expect("list").is_empty());
    }

    #[test]
    fn upsert_replaces_existing_entry() {
        let home = make_home();
        let reg = FileRegistry::new(home.path());
        reg.upsert_origin(&OriginEntry::for_port(TenantId::from("t1"), 3001))
            .expect("insert");
        reg.upsert_origin(&OriginEntry::for_port(TenantId::from("t1"), 3002))
            .expect("replace");

        let all = reg.list_origins().expect("list");
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].port, Some(3002));
    }

    #[test]
    fn delete_origin_reports_presence() {
        let home = make_home();
        let reg = FileRegistry::new(home.path());
        let id = TenantId::from("t1");
        assert!(!reg.delete_origin(&id).expect("delete missing"));
        reg.upsert_origin(&OriginEntry::for_port(id.clone(), 3001))
            .expect("insert");
        assert!(reg.delete_origin(&id).expect("delete"));
        assert!(reg.get_origin(&id).expect("get").is_none());
    }

    #[test]
    fn atomic_write_cleans_up_tmp() {
        let home = make_home();
        let id = TenantId::from("t1");
        save_origin_at(home.path(), &OriginEntry::for_port(id.clone(), 3001)).expect("save");
        let tmp = origin_path_at(home.path(), &id)
            .unwrap()
            .with_extension("yaml.tmp");
        assert!(!tmp.exists(), ".tmp must be gone after successful save");
    }

    #[test]
    fn seed_frontend_is_idempotent() {
        let home = make_home();
        assert!(seed_frontend_at(home.path(), "http://localhost:5180").expect("seed"));
        assert!(!seed_frontend_at(home.path(), "http://elsewhere").expect("reseed"));
        let entry = load_origin_at(home.path(), &TenantId::frontend())
            .expect("load")
            .expect("present");
        assert_eq!(entry.url, "http://localhost:5180");
        assert_eq!(entry.upstream_port(), None);
    }

    #[test]
    fn tenant_state_roundtrip() {
        let home = make_home();
        let reg = FileRegistry::new(home.path());
        let mut state = TenantState::new(TenantId::from("gymA"));
        state.status = TenantStatus::Running;
        state.port = Some(4100);
        reg.save_tenant(&state).expect("save");

        let loaded = reg
            .load_tenant(&TenantId::from("gymA"))
            .expect("load")
            .expect("present");
        assert_eq!(loaded, state);
        assert_eq!(reg.list_tenants().expect("list").len(), 1);
    }

    #[test]
    fn home_not_found_error_message() {
        assert!(RegistryError::HomeNotFound.to_string().contains("home directory"));
    }
}
