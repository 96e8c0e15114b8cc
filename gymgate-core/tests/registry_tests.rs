//! Registry error-message, atomic-write-safety, and trait-level integration tests.

use assert_fs::prelude::*;
use gymgate_core::{
    registry::{self, FileRegistry, OriginRegistry, TenantStore},
    types::{OriginEntry, TenantId, TenantState, TenantStatus},
    RegistryError,
};
use predicates::prelude::predicate;
use rstest::rstest;

fn t(id: &str) -> TenantId {
    TenantId::from(id)
}

// ---------------------------------------------------------------------------
// 1. Load error messages
// ---------------------------------------------------------------------------

#[test]
fn corrupt_origin_file_returns_parse_error_with_path() {
    let home = assert_fs::TempDir::new().expect("tempdir");
    home.child(".gymgate/origins/gymA.yaml")
        .write_str(": : corrupt : yaml : !!!\n  - broken: [unclosed")
        .expect("write");

    let err = FileRegistry::new(home.path()).list_origins().unwrap_err();
    assert!(matches!(err, RegistryError::Parse { .. }), "got: {err}");
    assert!(err.to_string().contains("gymA.yaml"), "got: {err}");
}

#[test]
fn wrong_shape_tenant_file_returns_parse_error() {
    let home = assert_fs::TempDir::new().expect("tempdir");
    home.child(".gymgate/tenants/gymA.yaml")
        .write_str("- this is a list, not a mapping\n")
        .expect("write");

    let err = FileRegistry::new(home.path())
        .load_tenant(&t("gymA"))
        .unwrap_err();
    assert!(matches!(err, RegistryError::Parse { .. }), "got: {err}");
}

#[rstest]
#[case("../escape")]
#[case("nested/tenant")]
#[case("")]
fn invalid_ids_never_touch_disk(#[case] id: &str) {
    let home = assert_fs::TempDir::new().expect("tempdir");
    let reg = FileRegistry::new(home.path());
    let err = reg
        .upsert_origin(&OriginEntry::for_port(t(id), 3001))
        .unwrap_err();
    assert!(matches!(err, RegistryError::InvalidTenantId(_)));
    home.child(".gymgate").assert(predicate::path::missing());
}

// ---------------------------------------------------------------------------
// 2. Scan behaviour
// ---------------------------------------------------------------------------

#[test]
fn list_skips_tmp_and_foreign_files() {
    let home = assert_fs::TempDir::new().expect("tempdir");
    let reg = FileRegistry::new(home.path());
    reg.upsert_origin(&OriginEntry::for_port(t("t1"), 3001))
        .expect("insert");
    home.child(".gymgate/origins/t2.yaml.tmp")
        .write_str("half written")
        .expect("write tmp");
    home.child(".gymgate/origins/README")
        .write_str("not yaml")
        .expect("write readme");

    let all = reg.list_origins().expect("list");
    assert_eq!(all.len(), 1);
    assert_eq!(all[0].tenant_id, t("t1"));
}

#[test]
fn list_is_ordered_by_tenant_file_name() {
    let home = assert_fs::TempDir::new().expect("tempdir");
    let reg = FileRegistry::new(home.path());
    for (id, port) in [("t2", 3002), ("t1", 3001), ("t3", 3003)] {
        reg.upsert_origin(&OriginEntry::for_port(t(id), port))
            .expect("insert");
    }
    let ports: Vec<_> = reg
        .list_origins()
        .expect("list")
        .into_iter()
        .map(|o| o.port)
        .collect();
    assert_eq!(ports, vec![Some(3001), Some(3002), Some(3003)]);
}

// ---------------------------------------------------------------------------
// 3. Tenant state
// ---------------------------------------------------------------------------

#[test]
fn tenant_file_is_written_with_0600() {
    let home = assert_fs::TempDir::new().expect("tempdir");
    let mut state = TenantState::new(t("gymA"));
    state.status = TenantStatus::Running;
    state.port = Some(4000);
    registry::save_tenant_at(home.path(), &state).expect("save");

    let path = registry::tenant_path_at(home.path(), &t("gymA")).expect("path");
    home.child(".gymgate/tenants/gymA.yaml")
        .assert(predicate::str::contains("status: running"));
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mode = std::fs::metadata(&path).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode, 0o600);
    }
}

#[test]
fn delete_tenant_is_idempotent() {
    let home = assert_fs::TempDir::new().expect("tempdir");
    let reg = FileRegistry::new(home.path());
    reg.save_tenant(&TenantState::new(t("gymA"))).expect("save");
    assert!(reg.delete_tenant(&t("gymA")).expect("first delete"));
    assert!(!reg.delete_tenant(&t("gymA")).expect("second delete"));
}
