use std::path::{Path, PathBuf};

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

const DIRECTORY: &str = r#"[
  {
    "dn": "dc=example,dc=com",
    "attributes": { "objectClass": ["top", "domain"], "dc": ["example"] }
  },
  {
    "dn": "ou=people,dc=example,dc=com",
    "attributes": { "objectClass": ["top", "organizationalUnit"], "ou": ["people"] }
  },
  {
    "dn": "uid=ana,ou=people,dc=example,dc=com",
    "attributes": {
      "objectClass": ["top", "person", "organizationalPerson", "inetOrgPerson", "extensibleObject"],
      "uid": ["ana"], "cn": ["Ana Smith"], "sn": ["Smith"], "uidNumber": ["1001"]
    }
  },
  {
    "dn": "uid=bob,ou=people,dc=example,dc=com",
    "attributes": {
      "objectClass": ["top", "person", "organizationalPerson", "inetOrgPerson", "extensibleObject"],
      "uid": ["bob"], "cn": ["Bob Jones"], "sn": ["Jones"], "uidNumber": ["1002"]
    }
  }
]"#;

/// Temp dir holding a config path that does not exist yet
struct Workspace {
    dir: TempDir,
}

impl Workspace {
    fn new() -> Self {
        Self {
            dir: tempfile::tempdir().unwrap(),
        }
    }

    fn path(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    fn write(&self, name: &str, contents: &str) -> PathBuf {
        let path = self.path(name);
        std::fs::write(&path, contents).unwrap();
        path
    }

    fn quarry(&self) -> Command {
        let mut cmd = Command::cargo_bin("quarry").unwrap();
        cmd.env("QUARRY_CONFIG", self.path("config.toml")).env_remove("RUST_LOG");
        cmd
    }
}

fn arg(path: &Path) -> &str {
    path.to_str().unwrap()
}

#[test]
fn test_filter_prints_canonical_form() {
    let ws = Workspace::new();
    ws.quarry()
        .args(["filter", "(&(cn=Bob)(sn=J*))"])
        .assert()
        .success()
        .stdout("(&(cn=Bob)(sn=J*))\n");
}

#[test]
fn test_filter_tree_as_json() {
    let ws = Workspace::new();
    let output = ws
        .quarry()
        .args(["-f", "json", "filter", "--tree", "(!(cn=a))"])
        .output()
        .unwrap();
    assert!(output.status.success());

    let parsed: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(parsed["filter"], "(!(cn=a))");
    assert_eq!(parsed["depth"], 1);
    assert_eq!(parsed["tree"]["type"], "NOT");
    assert_eq!(parsed["tree"]["children"][0]["type"], "EQUALITY");
}

#[test]
fn test_filter_reports_error_offset() {
    let ws = Workspace::new();
    ws.quarry()
        .args(["filter", "(&(cn=a)x(sn=b))"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("offset 8"));
}

#[test]
fn test_search_matches_filter() {
    let ws = Workspace::new();
    let file = ws.write("directory.json", DIRECTORY);

    ws.quarry()
        .args(["search", arg(&file), "(sn=smith)"])
        .assert()
        .success()
        .stdout(predicate::str::contains("dn: uid=ana,ou=people,dc=example,dc=com"))
        .stdout(predicate::str::contains("uid=bob").not());

    ws.quarry()
        .args(["search", arg(&file), "(uidNumber>=1002)", "--count"])
        .assert()
        .success()
        .stdout("1\n");
}

#[test]
fn test_search_scope_and_attributes() {
    let ws = Workspace::new();
    let file = ws.write("directory.json", DIRECTORY);

    let output = ws
        .quarry()
        .args([
            "-f",
            "json",
            "search",
            arg(&file),
            "(objectClass=*)",
            "--base",
            "ou=people,dc=example,dc=com",
            "--scope",
            "one",
            "--attributes",
            "sn",
            "--entry-dn",
        ])
        .output()
        .unwrap();
    assert!(output.status.success());

    let records: Vec<serde_json::Value> = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(records.len(), 2);
    assert_eq!(records[0]["attributes"]["sn"][0], "Smith");
    assert!(records[0]["attributes"].get("cn").is_none());
}

#[test]
fn test_search_virtual_attribute() {
    let ws = Workspace::new();
    let file = ws.write("directory.json", DIRECTORY);

    ws.quarry()
        .args(["search", arg(&file), "(description=staff)", "--virtual", "description=staff", "--count"])
        .assert()
        .success()
        .stdout("4\n");
}

#[test]
fn test_search_collective_subentry_scope() {
    let ws = Workspace::new();
    let mut records: Vec<serde_json::Value> = serde_json::from_str(DIRECTORY).unwrap();
    records.push(serde_json::json!({
        "dn": "ou=groups,dc=example,dc=com",
        "attributes": { "objectClass": ["top", "organizationalUnit"], "ou": ["groups"] }
    }));
    records.push(serde_json::json!({
        "dn": "cn=group locality,dc=example,dc=com",
        "attributes": {
            "objectClass": ["top", "subentry", "collectiveAttributeSubentry"],
            "cn": ["group locality"],
            "subtreeSpecification": ["{ base \"ou=groups\" }"],
            "c-l": ["Paris"]
        }
    }));
    let file = ws.write("directory.json", &serde_json::to_string(&records).unwrap());

    ws.quarry()
        .args(["search", arg(&file), "(l=Paris)"])
        .assert()
        .success()
        .stdout(predicate::str::contains("dn: ou=groups,dc=example,dc=com"))
        .stdout(predicate::str::contains("ou=people").not());
}

#[test]
fn test_search_without_matches() {
    let ws = Workspace::new();
    let file = ws.write("directory.json", DIRECTORY);

    ws.quarry()
        .args(["search", arg(&file), "(sn=nobody)"])
        .assert()
        .success()
        .stdout("")
        .stderr(predicate::str::contains("No entries found"));
}

#[test]
fn test_encode_decode_file() {
    let ws = Workspace::new();
    let file = ws.write("directory.json", DIRECTORY);
    let encoded = ws.path("directory.bin");

    ws.quarry()
        .args(["encode", arg(&file), "-o", arg(&encoded), "--deflate"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Encoded 4 entries"));

    ws.quarry()
        .args(["decode", arg(&encoded)])
        .assert()
        .success()
        .stdout(predicate::str::contains("dn: uid=bob,ou=people,dc=example,dc=com"))
        .stdout(predicate::str::contains("sn: Jones"));
}

#[test]
fn test_encode_sizes_with_compressed_schema() {
    let ws = Workspace::new();
    let file = ws.write("directory.json", DIRECTORY);
    ws.write(
        "config.toml",
        "[codec]\ncompress_attribute_descriptions = true\ncompress_object_classes = true\n",
    );

    ws.quarry()
        .args(["encode", arg(&file)])
        .assert()
        .success()
        .stdout(predicate::str::contains("total"));

    ws.quarry()
        .args(["encode", arg(&file), "-o", arg(&ws.path("out.bin"))])
        .assert()
        .failure()
        .stderr(predicate::str::contains("compressed schema"));
}

#[test]
fn test_decode_rejects_garbage() {
    let ws = Workspace::new();
    let file = ws.write("garbage.bin", "not an encoded entry");

    ws.quarry().args(["decode", arg(&file)]).assert().failure();
}

#[test]
fn test_validate() {
    let ws = Workspace::new();
    let good = ws.write("directory.json", DIRECTORY);
    ws.quarry()
        .args(["validate", arg(&good)])
        .assert()
        .success()
        .stdout(predicate::str::contains("ok      dc=example,dc=com"))
        .stdout(predicate::str::contains("ok      uid=ana,ou=people,dc=example,dc=com"));

    // With an explicit suffix below it, the domain entry's parent is looked up
    ws.quarry()
        .args(["validate", arg(&good), "--suffix", "ou=people,dc=example,dc=com"])
        .assert()
        .failure()
        .stdout(predicate::str::contains("parent dc=com does not exist"));

    let bad = ws.write(
        "bad.json",
        r#"{ "dn": "cn=nosn,dc=example,dc=com", "attributes": { "objectClass": ["top", "person"], "cn": ["nosn"] } }"#,
    );
    ws.quarry()
        .args(["validate", arg(&bad)])
        .assert()
        .failure()
        .stdout(predicate::str::contains("invalid cn=nosn,dc=example,dc=com"))
        .stderr(predicate::str::contains("1 of 1 entries failed"));
}

#[test]
fn test_modify() {
    let ws = Workspace::new();
    let file = ws.write("directory.json", DIRECTORY);
    let out = ws.path("bob.json");

    ws.quarry()
        .args([
            "modify",
            arg(&file),
            "--dn",
            "uid=bob,ou=people,dc=example,dc=com",
            "--add",
            "mail=bob@example.com",
            "--increment",
            "uidNumber=10",
            "-o",
            arg(&out),
        ])
        .assert()
        .success();

    let record: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(&out).unwrap()).unwrap();
    assert_eq!(record["attributes"]["mail"][0], "bob@example.com");
    assert_eq!(record["attributes"]["uidNumber"][0], "1012");

    ws.quarry()
        .args(["modify", arg(&out), "--delete", "sn=Smith"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("No such attribute"));

    ws.quarry()
        .args(["modify", arg(&file), "--add", "mail=x@example.com"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("--dn"));
}

#[test]
fn test_config_commands() {
    let ws = Workspace::new();

    ws.quarry().args(["config", "init"]).assert().success();
    ws.quarry()
        .args(["config", "init"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("--force"));

    ws.quarry()
        .args(["config", "set", "codec.deflate", "true"])
        .assert()
        .success()
        .stdout("Set codec.deflate = true\n");
    ws.quarry()
        .args(["config", "get", "codec.deflate"])
        .assert()
        .success()
        .stdout("true\n");
    ws.quarry()
        .args(["config", "get", "codec.level"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Available keys"));
    ws.quarry()
        .args(["config", "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("validation.structural_class = reject"));
    ws.quarry()
        .args(["config", "path"])
        .assert()
        .success()
        .stdout(predicate::str::contains("config.toml"));
}

#[test]
fn test_completions() {
    Command::cargo_bin("quarry")
        .unwrap()
        .args(["completions", "bash"])
        .assert()
        .success()
        .stdout(predicate::str::contains("quarry"));
}
