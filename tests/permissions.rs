//! Integration tests for permission resolution and application.
#![allow(clippy::expect_used, clippy::unwrap_used)]

mod common;

use std::os::unix::fs::PermissionsExt as _;

use common::TestTreeBuilder;
use dotsafe::safety::guard::ConcurrencyGuard;
use dotsafe::safety::orchestrator::FileOperationOrchestrator;
use dotsafe::safety::permissions::{PermissionConfig, PermissionRules, parse_mode};

fn mode_of(path: &std::path::Path) -> u32 {
    std::fs::metadata(path).unwrap().permissions().mode() & 0o777
}

#[test]
fn literal_name_beats_extension_glob() {
    let rules = PermissionRules::new([("config", "0600"), ("*.conf", "0644")]).unwrap();
    assert_eq!(rules.resolve("config", "0640").unwrap(), "0600");
}

#[test]
fn longer_literal_part_wins_between_single_wildcards() {
    let rules = PermissionRules::new([("*.pub", "0644"), ("id_*", "0600")]).unwrap();
    assert_eq!(rules.resolve("id_rsa.pub", "0640").unwrap(), "0644");
    assert_eq!(rules.resolve("id_rsa", "0640").unwrap(), "0600");
}

#[test]
fn mode_validation() {
    assert_eq!(parse_mode("0777").unwrap(), 0o777);
    assert_eq!(parse_mode("0600").unwrap(), 0o600);
    assert!(parse_mode("0999").is_err());
    assert!(parse_mode("abc").is_err());
    assert!(PermissionRules::new([("*.sh", "0999")]).is_err());
}

#[test]
fn resolution_table() {
    let rules = PermissionRules::new([
        ("config", "0600"),
        ("*.conf", "0644"),
        ("*.pub", "0644"),
        ("id_*", "0600"),
        ("*.sh", "0755"),
    ])
    .unwrap();
    let table: Vec<String> = [
        "config",
        "app.conf",
        "id_rsa",
        "id_rsa.pub",
        "install.sh",
        "id_setup.sh",
        "README",
    ]
    .iter()
    .map(|name| format!("{name} -> {}", rules.resolve(name, "0640").unwrap()))
    .collect();

    insta::assert_snapshot!(table.join("\n"), @r"
    config -> 0600
    app.conf -> 0644
    id_rsa -> 0600
    id_rsa.pub -> 0644
    install.sh -> 0755
    id_setup.sh -> 0755
    README -> 0640
    ");
}

#[test]
fn recursive_rules_apply_across_a_tree() {
    let tree = TestTreeBuilder::new()
        .with_existing(".ssh/id_ed25519", "private")
        .with_existing(".ssh/id_ed25519.pub", "public")
        .with_existing(".ssh/config", "Host *")
        .build();
    let config = PermissionConfig::new(
        "0640",
        "0700",
        true,
        PermissionRules::new([("id_*", "0600"), ("*.pub", "0644")]).unwrap(),
    )
    .unwrap();
    let guard = ConcurrencyGuard::new(2);
    let backup = tree.backup_config();
    let orchestrator = FileOperationOrchestrator::new(&guard, &backup, tree.path("home"));

    let outcome = orchestrator
        .apply_permissions(&tree.path("home/.ssh"), &config)
        .unwrap();

    assert!(outcome.warnings.is_empty());
    assert_eq!(mode_of(&tree.path("home/.ssh")), 0o700);
    assert_eq!(mode_of(&tree.path("home/.ssh/id_ed25519")), 0o600);
    assert_eq!(mode_of(&tree.path("home/.ssh/id_ed25519.pub")), 0o644);
    assert_eq!(mode_of(&tree.path("home/.ssh/config")), 0o640);

    let again = orchestrator
        .apply_permissions(&tree.path("home/.ssh"), &config)
        .unwrap();
    assert_eq!(again.change, dotsafe::resources::ResourceChange::AlreadyCorrect);
}
