use assert_cmd::cargo_bin;
use assert_cmd::prelude::*;
use predicates::prelude::*;
use std::process::Command;

#[cfg(not(feature = "storage-rocksdb"))]
#[test]
fn test_rocksdb_fallback_warning() {
    let mut cmd = Command::new(cargo_bin!("wallet-ledger"));
    cmd.args(["balance", "5551234", "--accounts", "tests/fixtures/accounts.csv"])
        .arg("--db-path")
        .arg("some_db");

    cmd.assert()
        .success()
        .stderr(predicate::str::contains("WARNING: Persistent storage requested via --db-path, but 'storage-rocksdb' feature is not enabled. Falling back to In-Memory storage."));
}

#[cfg(not(feature = "storage-mysql"))]
#[test]
fn test_mysql_fallback_warning() {
    let mut cmd = Command::new(cargo_bin!("wallet-ledger"));
    cmd.args(["balance", "5551234", "--accounts", "tests/fixtures/accounts.csv"])
        .args(["--database-url", "mysql://localhost/wallet"]);

    cmd.assert()
        .success()
        .stderr(predicate::str::contains("WARNING: MySQL storage requested via --database-url"));
}

#[cfg(feature = "storage-rocksdb")]
#[test]
fn test_rocksdb_no_fallback_warning() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("test_db");

    let mut cmd = Command::new(cargo_bin!("wallet-ledger"));
    cmd.args(["balance", "5551234", "--accounts", "tests/fixtures/accounts.csv"])
        .arg("--db-path")
        .arg(&db_path);

    cmd.assert()
        .success()
        .stderr(predicate::str::contains("WARNING").not());
}
