//! Offline validation of a files tree.

mod common;

use pretty_assertions::assert_eq;
use serde_json::json;

use common::harness::{outcome, status};
use common::*;
use intersync::sync::{OperationKind, Status};
use intersync::{Identity, SyncError};

#[test]
fn test_references_outside_the_tree_are_assumed_remote() {
    let h = TestHarness::new();
    h.write("policies/ntp/ntp1.yaml", &ObjectBuilder::ntp("ntp1").org("prod").yaml());

    let report = h.validate();

    let result = outcome(&report, &Identity::scoped("ntp.Policy", "prod", "ntp1"));
    assert_eq!(result.status, Status::Succeeded);
    assert!(result.dry_run);
    assert_eq!(report.exit_code(), 0);
    assert!(h.remote.calls().is_empty());
}

#[test]
fn test_schema_violations_are_reported() {
    let h = TestHarness::new();
    h.write(
        "policies/ntp/ntp1.yaml",
        &ObjectBuilder::ntp("ntp1")
            .field("NtpServers", json!(["a", "b", "c", "d", "e"]))
            .yaml(),
    );
    h.write("policies/ntp/ntp2.yaml", &ObjectBuilder::ntp("ntp2").yaml());

    let report = h.validate();

    let bad = outcome(&report, &Identity::scoped("ntp.Policy", "default", "ntp1"));
    assert_eq!(bad.status, Status::Failed);
    assert!(matches!(bad.error, Some(SyncError::Schema(_))));
    assert_eq!(
        status(&report, &Identity::scoped("ntp.Policy", "default", "ntp2")),
        Status::Succeeded
    );
    assert_eq!(report.exit_code(), 1);
}

#[test]
fn test_cycles_are_found_offline() {
    let h = TestHarness::with(node_registry(), intersync::InMemoryRemote::new());
    h.write("nodes/a.yaml", &node("a", Some("b")));
    h.write("nodes/b.yaml", &node("b", Some("a")));

    let report = h.validate();

    assert_eq!(report.summary().failed, 2);
    assert_eq!(report.exit_code(), 1);
}

#[test]
fn test_populated_remote_is_left_untouched() {
    let h = TestHarness::new();
    h.remote.insert(
        "ntp.Policy",
        fields(json!({"Name": "ntp1", "Organization": "default", "Timezone": "UTC"})),
    );
    h.remote.insert(
        "ntp.Policy",
        fields(json!({"Name": "stale", "Organization": "default"})),
    );
    h.write(
        "policies/ntp/ntp1.yaml",
        &ObjectBuilder::ntp("ntp1")
            .field("Timezone", json!("Europe/Berlin"))
            .yaml(),
    );

    let report = h.validate();

    let result = outcome(&report, &Identity::scoped("ntp.Policy", "default", "ntp1"));
    assert_eq!(result.kind, OperationKind::Create);
    assert!(result.dry_run);
    assert_eq!(report.plan.delete, 0);
    assert!(h.remote.calls().is_empty());
    assert_eq!(h.remote.objects("ntp.Policy")[0]["Timezone"], json!("UTC"));
    assert_eq!(h.remote_names("ntp.Policy").len(), 2);
}
