use assert_cmd::cargo_bin;
use assert_cmd::prelude::*;
use predicates::prelude::*;
use std::process::Command;

fn run(rows: &[[&str; 4]]) -> assert_cmd::assert::Assert {
    let file = tempfile::NamedTempFile::new().unwrap();
    let mut wtr = csv::Writer::from_path(file.path()).unwrap();
    wtr.write_record(["type", "account", "counterparty", "amount"])
        .unwrap();
    for row in rows {
        wtr.write_record(row).unwrap();
    }
    wtr.flush().unwrap();
    drop(wtr);

    let mut cmd = Command::new(cargo_bin!("ledgerline"));
    cmd.env_remove("DATABASE_URL").env_remove("RUST_LOG");
    cmd.arg(file.path());
    cmd.assert()
}

#[test]
fn test_malformed_csv_handling() {
    run(&[
        ["open", "A", "", "1.0"],
        // Invalid type
        ["withdraw", "A", "", "1.0"],
        // Missing amount
        ["open", "B", "", ""],
        // Transfer without a counterparty
        ["transfer", "A", "", "1.0"],
        ["open", "C", "", "2.0"],
    ])
    .success()
    .stderr(predicate::str::contains("Error reading operation"))
    .stderr(predicate::str::contains("transfer requires a counterparty"))
    .stderr(predicate::str::contains("invalid account id").not())
    .stdout(predicate::str::contains("A,1.00000"))
    .stdout(predicate::str::contains("C,2.00000"))
    .stdout(predicate::str::contains("B,").not());
}

#[test]
fn test_invalid_values() {
    run(&[
        ["open", "A", "", "not_a_number"],
        ["open", "B", "", "-5"],
        ["open", "this-id-is-far-too-long-to-be-accepted", "", "1"],
        ["open", "C", "", "5.0"],
        ["transfer", "C", "C", "1"],
        ["transfer", "C", "D", "-1"],
        ["transfer", "C", "C2", "1"],
    ])
    .success()
    .stderr(predicate::str::contains("Error reading operation"))
    .stderr(predicate::str::contains(
        "initial balance cannot be negative",
    ))
    .stderr(predicate::str::contains(
        "source account and destination account cannot be the same",
    ))
    .stderr(predicate::str::contains("destination account D does not exist"))
    .stdout(predicate::eq("account,balance\nC,5.00000\n"));
}

#[test]
fn test_boundary_values() {
    run(&[
        ["open", "A", "", "1000000000000000000"],
        ["open", "B", "", "1000000000000000001"],
        ["open", "C", "", "1000000000000000"],
        ["transfer", "C", "A", "1"],
        ["open", "D", "", "0"],
        ["transfer", "C", "D", "1000000000000001"],
    ])
    .success()
    .stderr(predicate::str::contains("exceeds the maximum"))
    .stdout(predicate::str::contains("A,1000000000000000000.00000"))
    .stdout(predicate::str::contains("C,1000000000000000.00000"))
    .stdout(predicate::str::contains("D,0.00000"));
}

#[test]
fn test_long_amounts_are_exact() {
    run(&[
        ["open", "A", "", "1234567890123.12346"],
        ["open", "B", "", "0"],
        ["transfer", "A", "B", "999999999999.999995"],
    ])
    .success()
    .stdout(predicate::eq(
        "account,balance\nA,234567890123.12346\nB,1000000000000.00000\n",
    ));
}

#[test]
fn test_long_opening_balance_is_exact() {
    run(&[["open", "A", "", "1234567890123.12346"]])
        .success()
        .stdout(predicate::str::contains("A,1234567890123.12346"));
}
