#![allow(missing_docs)]

use std::fs;

use assert_cmd::cargo::cargo_bin_cmd;
use serde_json::Value;
use strider::graph::shard::{read_shard, shard_path};
use strider::{HostId, VertexId};
use tempfile::TempDir;

const EDGE_LIST: &str = "\
# tiny graph
0 1
1 2

2 3
% trailing comment
3 0
";

#[test]
fn split_writes_one_shard_per_part() {
    let dir = TempDir::new().expect("tempdir");
    let input = dir.path().join("graph.txt");
    fs::write(&input, EDGE_LIST).unwrap();
    let out = dir.path().join("shards");

    let output = cargo_bin_cmd!("strider")
        .args(["--format", "json", "split", "--parts", "2", "--mirror"])
        .arg("--input")
        .arg(&input)
        .arg("--out")
        .arg(&out)
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();

    let summary: Value = serde_json::from_slice(&output).expect("json summary");
    assert_eq!(summary["edges_read"], 4);
    assert_eq!(summary["records_per_part"], serde_json::json!([4, 4]));

    let even = read_shard(&shard_path(&out, 0)).unwrap();
    assert!(even.iter().all(|e| e.src.0 % 2 == 0));
    assert!(even
        .iter()
        .any(|e| e.src == VertexId(0) && e.dst == VertexId(3) && e.dst_host == HostId(1)));
    let odd = read_shard(&shard_path(&out, 1)).unwrap();
    assert!(odd.iter().all(|e| e.src.0 % 2 == 1));
}

#[test]
fn split_text_output_names_the_shards() {
    let dir = TempDir::new().expect("tempdir");
    let input = dir.path().join("graph.txt");
    fs::write(&input, EDGE_LIST).unwrap();
    let out = dir.path().join("shards");

    let output = cargo_bin_cmd!("strider")
        .args(["split", "--parts", "3"])
        .arg("--input")
        .arg(&input)
        .arg("--out")
        .arg(&out)
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let text = String::from_utf8(output).unwrap();
    assert!(text.contains("Split 4 edges into 3 shards"));
    assert!(text.contains("2.shard"));
}

#[test]
fn malformed_line_fails_with_its_number() {
    let dir = TempDir::new().expect("tempdir");
    let input = dir.path().join("bad.txt");
    fs::write(&input, "0 1\n1 two\n").unwrap();

    let output = cargo_bin_cmd!("strider")
        .args(["split", "--parts", "2"])
        .arg("--input")
        .arg(&input)
        .arg("--out")
        .arg(dir.path().join("shards"))
        .assert()
        .failure()
        .get_output()
        .stderr
        .clone();
    let stderr = String::from_utf8(output).unwrap();
    assert!(stderr.contains("line 2"), "stderr: {stderr}");
}
