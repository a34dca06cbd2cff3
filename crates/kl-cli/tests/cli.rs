//! CLI command integration tests.
//! Each test writes the scenario dictionary into its own temp directory.

use std::path::PathBuf;

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

const SCENARIO: &str = include_str!("../../kl-core/tests/data/scenario.dict");
const READINGS: &str = "you1-die2-neng2-liu2-yi4-lv3-fang1";

fn kl_cmd() -> Command {
    #[allow(deprecated)]
    let mut cmd = Command::cargo_bin("kl").unwrap();
    cmd.env_remove("KL_CONFIG");
    cmd
}

fn scenario(dir: &TempDir) -> PathBuf {
    let path = dir.path().join("scenario.txt");
    std::fs::write(&path, SCENARIO).unwrap();
    path
}

fn compile_all(dir: &TempDir) {
    kl_cmd()
        .arg("compile")
        .arg(scenario(dir))
        .arg("--bin")
        .arg(dir.path().join("d.bin"))
        .arg("--sql")
        .arg(dir.path().join("d.sql"))
        .arg("--db")
        .arg(dir.path().join("d.db"))
        .assert()
        .success()
        .stdout(predicate::str::contains("18 entries, 13 nodes"));
}

#[test]
fn compile_then_stats_on_every_encoding() {
    let dir = TempDir::new().unwrap();
    compile_all(&dir);

    for (name, backend) in [("d.bin", "memory"), ("d.sql", "sql"), ("d.db", "sql")] {
        kl_cmd()
            .arg("stats")
            .arg(dir.path().join(name))
            .assert()
            .success()
            .stdout(predicate::str::contains(format!("backend:    {backend}")))
            .stdout(predicate::str::contains("entries:    18"))
            .stdout(predicate::str::contains("nodes:      13"))
            .stdout(predicate::str::contains("readings:   7"));
    }
}

#[test]
fn compile_requires_an_output() {
    let dir = TempDir::new().unwrap();
    kl_cmd()
        .arg("compile")
        .arg(scenario(&dir))
        .assert()
        .failure()
        .stderr(predicate::str::contains("nothing to write"));
}

#[test]
fn query_exact_partial_and_filtered() {
    let dir = TempDir::new().unwrap();
    compile_all(&dir);
    let db = dir.path().join("d.db");

    kl_cmd()
        .arg("query")
        .arg(&db)
        .arg("fang1")
        .assert()
        .success()
        .stdout(predicate::str::contains("fang1\t方\t-4\n"))
        .stdout(predicate::str::contains("fang1\t芳\t-2\t0\t一縷\n"));

    kl_cmd()
        .arg("query")
        .arg(&db)
        .arg("liu2")
        .arg("--partial")
        .assert()
        .success()
        .stdout(predicate::str::contains("liu2-yi4\t留意\t-3\n"));

    kl_cmd()
        .arg("query")
        .arg(&db)
        .arg("liu2")
        .args(["--type", "5"])
        .assert()
        .success()
        .stdout(predicate::str::contains("(no grams)"));
}

#[test]
fn assemble_scenario_with_overrides() {
    let dir = TempDir::new().unwrap();
    let dict = scenario(&dir);

    kl_cmd()
        .arg("assemble")
        .arg(&dict)
        .arg(READINGS)
        .assert()
        .success()
        .stdout("幽蝶 能 留意 呂方\n");

    kl_cmd()
        .arg("assemble")
        .arg(&dict)
        .args(["you1", "die2", "neng2", "liu2", "yi4", "lv3", "fang1"])
        .args(["--override", "liu2=留@3", "--override", "yi4-lv3=一縷@4"])
        .assert()
        .success()
        .stdout("幽蝶 能 留 一縷 芳\n");

    kl_cmd()
        .arg("assemble")
        .arg(&dict)
        .arg(READINGS)
        .args(["--override", "liu2=留@3", "--override", "yi4-lv3=一縷@4"])
        .arg("--unigrams-only")
        .assert()
        .success()
        .stdout("幽蝶 能 留 一縷 方\n");
}

#[test]
fn assemble_json_and_dot() {
    let dir = TempDir::new().unwrap();
    compile_all(&dir);

    let output = kl_cmd()
        .arg("assemble")
        .arg(dir.path().join("d.sql"))
        .arg(READINGS)
        .arg("--json")
        .output()
        .unwrap();
    assert!(output.status.success());
    let units: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    let values: Vec<&str> = units
        .as_array()
        .unwrap()
        .iter()
        .map(|u| u["value"].as_str().unwrap())
        .collect();
    assert_eq!(values, vec!["幽蝶", "能", "留意", "呂方"]);
    assert_eq!(units[2]["start"], 3);

    kl_cmd()
        .arg("assemble")
        .arg(dir.path().join("d.bin"))
        .arg(READINGS)
        .args(["--dot", "--vertical"])
        .assert()
        .success()
        .stdout(predicate::str::contains("digraph {\ngraph [ rankdir=TB ];\nBOS;\n"))
        .stdout(predicate::str::contains("BOS -> 幽蝶;\n"))
        .stdout(predicate::str::ends_with("EOS;\n}\n"));
}

#[test]
fn assemble_rejects_bad_override() {
    let dir = TempDir::new().unwrap();
    kl_cmd()
        .arg("assemble")
        .arg(scenario(&dir))
        .arg(READINGS)
        .args(["--override", "liu2=留@9"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("cannot override"));
}

#[test]
fn config_file_sets_separator() {
    let dir = TempDir::new().unwrap();
    let dict = dir.path().join("under.txt");
    let text: String = SCENARIO
        .lines()
        .filter(|l| !l.starts_with('#'))
        .map(|l| {
            let (key, rest) = l.split_once(' ').unwrap();
            format!("{}{rest}\n", key.replace('-', "_"))
        })
        .collect();
    std::fs::write(&dict, text).unwrap();
    let config = dir.path().join("kl.toml");
    std::fs::write(&config, "separator = \"_\"\nbigram_policy = \"additive\"\n").unwrap();

    kl_cmd()
        .env("KL_CONFIG", &config)
        .arg("stats")
        .arg(&dict)
        .assert()
        .success()
        .stdout(predicate::str::contains("separator:  _"))
        .stdout(predicate::str::contains("nodes:      13"));

    kl_cmd()
        .env("KL_CONFIG", &config)
        .arg("assemble")
        .arg(&dict)
        .arg("you1_die2_neng2_liu2_yi4_lv3_fang1")
        .assert()
        .success()
        .stdout("幽蝶 能 留意 呂方\n");
}

#[test]
fn corrupt_binary_reports_context() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("broken.bin");
    std::fs::write(&path, b"KLTR\x09\x00garbage").unwrap();
    kl_cmd()
        .arg("stats")
        .arg(&path)
        .assert()
        .failure()
        .stderr(predicate::str::contains("failed to load dictionary"));
}

#[test]
fn bigram_policy_values_are_listed_and_checked() {
    kl_cmd()
        .args(["assemble", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("replace"))
        .stdout(predicate::str::contains("additive"))
        .stdout(predicate::str::contains("max"));

    let dir = TempDir::new().unwrap();
    let dict = scenario(&dir);
    kl_cmd()
        .args(["--bigram-policy", "sum", "assemble"])
        .arg(&dict)
        .arg(READINGS)
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid value 'sum'"));

    kl_cmd()
        .args(["--bigram-policy", "Additive", "assemble"])
        .arg(&dict)
        .arg(READINGS)
        .assert()
        .success()
        .stdout("幽蝶 能 留意 呂方\n");
}
