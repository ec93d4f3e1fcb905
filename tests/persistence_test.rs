#![cfg(feature = "storage-rocksdb")]

use assert_cmd::cargo_bin;
use std::io::Write;
use std::process::Command;
use tempfile::tempdir;

#[test]
fn test_rocksdb_state_survives_restart() {
    let dir = tempdir().unwrap();
    let db_path = dir.path().join("vend_db");

    // 1. First run: load stock and complete one vend.
    let mut csv1 = tempfile::NamedTempFile::new().unwrap();
    writeln!(csv1, "event, machine, product, motor, price, count, command, outcome").unwrap();
    writeln!(csv1, "stock, v1, 1, 3, 2.50, 3,,").unwrap();
    writeln!(csv1, "purchase, v1, 1,,,,,").unwrap();
    writeln!(csv1, "ack, v1,, 3,,, 1, success").unwrap();

    let mut cmd1 = Command::new(cargo_bin!("vendlink"));
    cmd1.arg(csv1.path()).arg("--db-path").arg(&db_path);

    let output1 = cmd1.output().expect("failed to execute command");
    assert!(output1.status.success());
    let stdout1 = String::from_utf8_lossy(&output1.stdout);
    assert!(stdout1.contains("1,v1,3,2.50,2"));

    // 2. Second run against the same database: stock recovered, command ids
    // keep counting, another vend lands on the recovered state.
    let mut csv2 = tempfile::NamedTempFile::new().unwrap();
    writeln!(csv2, "event, machine, product, motor, price, count, command, outcome").unwrap();
    writeln!(csv2, "purchase, v1, 1,,,,,").unwrap();
    writeln!(csv2, "ack, v1,, 3,,, 2, success").unwrap();

    let mut cmd2 = Command::new(cargo_bin!("vendlink"));
    cmd2.arg(csv2.path()).arg("--db-path").arg(&db_path);

    let output2 = cmd2.output().expect("failed to execute command");
    assert!(output2.status.success());
    let stdout2 = String::from_utf8_lossy(&output2.stdout);
    assert!(stdout2.contains("1,v1,3,2.50,1"));
}
