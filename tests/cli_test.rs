use assert_cmd::cargo_bin;
use assert_cmd::prelude::*;
use predicates::prelude::*;
use std::process::Command;

#[test]
fn test_replay_end_to_end() -> Result<(), Box<dyn std::error::Error>> {
    let mut cmd = Command::new(cargo_bin!("wallet-ledger"));
    cmd.arg("--accounts")
        .arg("tests/fixtures/accounts.csv")
        .arg("replay")
        .arg("tests/fixtures/requests.jsonl");

    let output = cmd.output()?;
    assert!(output.status.success());

    let replies: Vec<serde_json::Value> = String::from_utf8(output.stdout)?
        .lines()
        .map(serde_json::from_str)
        .collect::<Result<_, _>>()?;

    // The unknown operation on line 10 is reported, not answered.
    assert_eq!(replies.len(), 9);
    let statuses: Vec<u64> = replies.iter().map(|r| r["status"].as_u64().unwrap()).collect();
    assert_eq!(statuses, [200, 200, 200, 200, 200, 400, 400, 404, 200]);

    assert_eq!(replies[0]["body"]["newBalance"], 90);
    assert_eq!(replies[1]["body"]["newBalance"], 115);
    assert_eq!(replies[2]["body"]["newBalance"], 125);
    assert_eq!(replies[3]["body"]["newBalance"], 130);
    assert_eq!(replies[4]["body"]["balance"], 130);
    assert_eq!(replies[5]["body"]["error"], "missing_parameter");
    assert_eq!(replies[6]["body"]["error"], "invalid_argument");
    assert_eq!(replies[7]["body"]["error"], "account_not_found");
    assert_eq!(replies[8]["body"]["balance"], 20.5);

    let stderr = String::from_utf8(output.stderr)?;
    assert!(stderr.contains("Error reading request"));
    Ok(())
}

#[test]
fn test_balance_command() {
    let mut cmd = Command::new(cargo_bin!("wallet-ledger"));
    cmd.args(["balance", "5559876", "--accounts", "tests/fixtures/accounts.csv"]);

    cmd.assert()
        .success()
        .stdout(predicate::str::contains(r#"{"balance":20.5}"#));
}

#[test]
fn test_balance_of_unknown_account_fails() {
    let mut cmd = Command::new(cargo_bin!("wallet-ledger"));
    cmd.args(["balance", "404", "--accounts", "tests/fixtures/accounts.csv"]);

    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("404"));
}

#[test]
fn test_missing_request_file() {
    let mut cmd = Command::new(cargo_bin!("wallet-ledger"));
    cmd.args(["replay", "tests/fixtures/does-not-exist.jsonl"]);

    cmd.assert().failure();
}
