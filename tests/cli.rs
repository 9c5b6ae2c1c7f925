use std::fs;
use std::path::{Path, PathBuf};

use assert_cmd::Command;
use predicates::prelude::*;
use serde_json::{json, Value};
use tempfile::TempDir;

fn write_json(dir: &Path, name: &str, value: &Value) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, serde_json::to_string_pretty(value).expect("serialize")).expect("write");
    path
}

fn read_json(path: &Path) -> Value {
    serde_json::from_str(&fs::read_to_string(path).expect("read")).expect("parse")
}

/// Fifteen images: 1..=12 labeled round-robin over three classes, 13..=15
/// negative.
fn multiclass_document() -> Value {
    let images: Vec<Value> = (1..=15)
        .map(|i| json!({"id": i, "file_name": format!("{}.jpg", i)}))
        .collect();
    let annotations: Vec<Value> = (1..=12)
        .map(|i| json!({"id": i, "image_id": i, "category_id": (i - 1) % 3 + 1}))
        .collect();
    json!({
        "images": images,
        "categories": [
            {"id": 1, "name": "cat"},
            {"id": 2, "name": "dog"},
            {"id": 3, "name": "bird"}
        ],
        "annotations": annotations
    })
}

fn fixture() -> (TempDir, PathBuf) {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = write_json(dir.path(), "train.json", &multiclass_document());
    (dir, path)
}

fn cmd() -> Command {
    Command::cargo_bin("visionmanifest").unwrap()
}

#[test]
fn runs() {
    cmd()
        .assert()
        .success()
        .stdout(predicate::str::contains("visionmanifest"));
}

#[test]
fn outputs_tool_name() {
    cmd().arg("-V").assert().success().stdout("visionmanifest 0.1.0\n");
}

// Inspect subcommand tests

#[test]
fn inspect_prints_category_table() {
    let (_dir, input) = fixture();
    cmd()
        .args(["inspect", "--task", "classification_multiclass"])
        .arg(&input)
        .assert()
        .success()
        .stdout(predicate::str::contains("Images:"))
        .stdout(predicate::str::contains("bird"));
}

#[test]
fn inspect_json_output_format() {
    let (_dir, input) = fixture();
    let output = cmd()
        .args(["inspect", "--task", "multiclass", "--format", "json"])
        .arg(&input)
        .output()
        .expect("run");
    assert!(output.status.success());
    let report: Value = serde_json::from_slice(&output.stdout).expect("json report");
    assert_eq!(report["images"], json!(15));
    assert_eq!(report["negative_images"], json!(3));
    assert_eq!(report["labels"], json!(12));
}

#[test]
fn unknown_task_is_rejected() {
    let (_dir, input) = fixture();
    cmd()
        .args(["inspect", "--task", "segmentation"])
        .arg(&input)
        .assert()
        .failure()
        .stderr(predicate::str::contains("segmentation"));
}

#[test]
fn missing_input_file_fails() {
    cmd()
        .args(["inspect", "--task", "multiclass", "does/not/exist.json"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Error"));
}

// Split subcommand tests

#[test]
fn split_writes_both_partitions() {
    let (dir, input) = fixture();
    let first = dir.path().join("first.json");
    let second = dir.path().join("second.json");
    cmd()
        .args(["split", "--task", "multiclass", "--ratio", "0.5", "--seed", "3"])
        .arg(&input)
        .arg("--first")
        .arg(&first)
        .arg("--second")
        .arg(&second)
        .assert()
        .success()
        .stdout(predicate::str::contains("Split 15 images"));

    let first = read_json(&first);
    let second = read_json(&second);
    let images = |doc: &Value| doc["images"].as_array().map(Vec::len).unwrap_or(0);
    assert_eq!(images(&first) + images(&second), 15);
    assert_eq!(first["categories"], second["categories"]);
}

#[test]
fn split_seed_can_come_from_environment() {
    let (dir, input) = fixture();
    let run = |suffix: &str| {
        let first = dir.path().join(format!("first-{}.json", suffix));
        let second = dir.path().join(format!("second-{}.json", suffix));
        cmd()
            .env("VISIONMANIFEST_SEED", "99")
            .args(["split", "--task", "multiclass"])
            .arg(&input)
            .arg("--first")
            .arg(&first)
            .arg("--second")
            .arg(&second)
            .assert()
            .success();
        read_json(&first)
    };
    assert_eq!(run("a"), run("b"));
}

// Sample subcommand tests

#[test]
fn sample_few_shot_covers_every_category() {
    let (dir, input) = fixture();
    let output = dir.path().join("few.json");
    cmd()
        .args(["sample", "--task", "multiclass", "--strategy", "few-shot", "--n-shots", "2"])
        .arg(&input)
        .arg("-o")
        .arg(&output)
        .assert()
        .success();

    let doc = read_json(&output);
    let annotations = doc["annotations"].as_array().expect("annotations");
    for category in 1..=3 {
        let count = annotations
            .iter()
            .filter(|a| a["category_id"] == json!(category))
            .count();
        assert!(count >= 2, "category {} has {} annotations", category, count);
    }
}

#[test]
fn sample_num_samples_requires_count() {
    let (dir, input) = fixture();
    cmd()
        .args(["sample", "--task", "multiclass", "--strategy", "num-samples"])
        .arg(&input)
        .arg("-o")
        .arg(dir.path().join("out.json"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("--n-samples is required"));
}

#[test]
fn sample_without_replacement_cannot_exceed_source() {
    let (dir, input) = fixture();
    cmd()
        .args([
            "sample",
            "--task",
            "multiclass",
            "--strategy",
            "num-samples",
            "--n-samples",
            "40",
        ])
        .arg(&input)
        .arg("-o")
        .arg(dir.path().join("out.json"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("Cannot draw 40 samples"));
}

#[test]
fn sample_by_ratio_writes_subset() {
    let (dir, input) = fixture();
    let output = dir.path().join("ratio.json");
    cmd()
        .args(["sample", "--task", "multiclass", "--strategy", "ratio", "--ratio", "0.5"])
        .arg(&input)
        .arg("-o")
        .arg(&output)
        .assert()
        .success()
        .stdout(predicate::str::contains("Wrote"));
    let doc = read_json(&output);
    let images = doc["images"].as_array().expect("images").len();
    // four per class bucket -> 2 each, three negatives -> 2
    assert_eq!(images, 8);
}

// Merge, spawn, weights, category removal, filter

#[test]
fn merge_concatenates_documents() {
    let (dir, input) = fixture();
    let output = dir.path().join("merged.json");
    cmd()
        .args(["merge", "--task", "multiclass"])
        .arg(&input)
        .arg(&input)
        .arg("-o")
        .arg(&output)
        .assert()
        .success()
        .stdout(predicate::str::contains("Wrote 30 images"));
    let doc = read_json(&output);
    assert_eq!(doc["categories"].as_array().expect("categories").len(), 3);
    assert_eq!(doc["annotations"].as_array().expect("annotations").len(), 24);
}

#[test]
fn spawn_reaches_target_size() {
    let (dir, input) = fixture();
    let output = dir.path().join("spawned.json");
    cmd()
        .args(["spawn", "--task", "multiclass", "--target-size", "40", "--balanced"])
        .arg(&input)
        .arg("-o")
        .arg(&output)
        .assert()
        .success();
    let doc = read_json(&output);
    assert_eq!(doc["images"].as_array().expect("images").len(), 40);
}

#[test]
fn weights_prints_one_weight_per_image() {
    let (_dir, input) = fixture();
    let output = cmd()
        .args(["weights", "--task", "multiclass"])
        .arg(&input)
        .output()
        .expect("run");
    assert!(output.status.success());
    let weights: Vec<f64> = serde_json::from_slice(&output.stdout).expect("weights");
    assert_eq!(weights.len(), 15);
    assert!(weights.iter().all(|w| (0.2..=5.0).contains(w)));
}

#[test]
fn remove_categories_renumbers_the_rest() {
    let (dir, input) = fixture();
    let output = dir.path().join("removed.json");
    cmd()
        .args(["remove-categories", "--task", "multiclass", "--names", "cat,dog"])
        .arg(&input)
        .arg("-o")
        .arg(&output)
        .assert()
        .success();
    let doc = read_json(&output);
    assert_eq!(doc["categories"], json!([{"id": 1, "name": "bird"}]));
    assert_eq!(doc["annotations"].as_array().expect("annotations").len(), 4);
}

#[test]
fn filter_drops_unlabeled_images() {
    let (dir, input) = fixture();
    let output = dir.path().join("filtered.json");
    cmd()
        .args(["filter", "--task", "multiclass"])
        .arg(&input)
        .arg("-o")
        .arg(&output)
        .assert()
        .success()
        .stdout(predicate::str::contains("Wrote 12 images"));
}

// Key-value-pair documents

fn kvp_fixture(dir: &Path) -> (PathBuf, PathBuf) {
    let schema = write_json(
        dir,
        "schema.json",
        &json!({
            "name": "pairs",
            "fieldSchema": {"same": {"type": "boolean"}}
        }),
    );
    let doc = write_json(
        dir,
        "pairs.json",
        &json!({
            "images": [
                {"id": 1, "file_name": "a.jpg"},
                {"id": 2, "file_name": "b.jpg"}
            ],
            "annotations": [
                {"id": 1, "image_ids": [1, 2], "fields": {"same": {"value": false}}},
                {"id": 2, "image_ids": [2]}
            ]
        }),
    );
    (schema, doc)
}

#[test]
fn key_value_pair_documents_need_a_schema() {
    let dir = tempfile::tempdir().expect("tempdir");
    let (_schema, doc) = kvp_fixture(dir.path());
    cmd()
        .args(["inspect", "--task", "kvp"])
        .arg(&doc)
        .assert()
        .failure()
        .stderr(predicate::str::contains("schema"));
}

#[test]
fn key_value_pair_filter_drops_negative_annotations() {
    let dir = tempfile::tempdir().expect("tempdir");
    let (schema, doc) = kvp_fixture(dir.path());
    let output = dir.path().join("filtered.json");
    cmd()
        .args(["filter", "--task", "kvp", "--schema"])
        .arg(&schema)
        .arg(&doc)
        .arg("-o")
        .arg(&output)
        .assert()
        .success();
    let filtered = read_json(&output);
    assert_eq!(
        filtered["annotations"],
        json!([{"id": 1, "image_ids": [1, 2], "fields": {"same": {"value": false}}}])
    );
}
