//! Contracts the binary makes to scripts: subcommand names, exit codes,
//! profile handling, and export headers that the paired import accepts.

use pcectl::commands::{cwp, eb, label, rule, svc, wkld};
use pcectl::core::error::PceError;
use pcectl::core::headers::HeaderMap;
use pcectl::core::output::export_file_name;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};

fn pcectl(dir: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_pcectl"))
        .current_dir(dir)
        .env("PCECTL_CONFIG", dir.join("pce.toml"))
        .env("NO_COLOR", "1")
        .env_remove("PCE_FQDN")
        .env_remove("RUST_LOG")
        .args(args)
        .output()
        .expect("failed to execute pcectl")
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).to_string()
}

#[test]
fn help_lists_every_subcommand() {
    let tmp = tempfile::tempdir().unwrap();
    let output = pcectl(tmp.path(), &["--help"]);
    assert!(output.status.success());
    let help = stdout(&output);
    for command in [
        "pce-add",
        "pce-list",
        "label-export",
        "label-import",
        "wkld-export",
        "wkld-import",
        "mode",
        "unpair",
        "rule-export",
        "rule-import",
        "svc-export",
        "svc-import",
        "eb-export",
        "eb-import",
        "cwp-export",
        "cwp-import",
    ] {
        assert!(help.contains(command), "missing {} in:\n{}", command, help);
    }
}

#[test]
fn conflicting_flags_are_a_usage_error() {
    let tmp = tempfile::tempdir().unwrap();
    let output = pcectl(tmp.path(), &["wkld-export", "--managed-only", "--unmanaged-only"]);
    assert_eq!(output.status.code(), Some(2));
}

#[test]
fn profiles_round_trip_through_the_config_file() {
    let tmp = tempfile::tempdir().unwrap();
    let added = pcectl(
        tmp.path(),
        &[
            "pce-add",
            "lab",
            "--fqdn",
            "pce.lab.example.com",
            "--api-user",
            "api_123",
            "--api-key",
            "topsecret",
        ],
    );
    assert!(added.status.success(), "{}", String::from_utf8_lossy(&added.stderr));

    let listed = pcectl(tmp.path(), &["pce-list"]);
    assert!(listed.status.success());
    let text = stdout(&listed);
    assert!(text.contains("lab"), "{}", text);
    assert!(text.contains("pce.lab.example.com:8443"), "{}", text);
    assert!(!text.contains("topsecret"));

    let config = std::fs::read_to_string(tmp.path().join("pce.toml")).unwrap();
    assert!(config.contains("default = \"lab\""), "{}", config);
    assert!(!tmp.path().join("pcectl.log").exists(), "profile commands wrote a log file");
}

#[test]
fn missing_configuration_exits_one() {
    let tmp = tempfile::tempdir().unwrap();
    std::fs::write(tmp.path().join("m.csv"), "hostname,enforcement\nweb1,full\n").unwrap();
    let output = pcectl(tmp.path(), &["mode", "m.csv", "--log-file", "run.log"]);
    assert_eq!(output.status.code(), Some(1));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("no PCE configured"), "{}", stderr);
    assert!(tmp.path().join("run.log").exists());
}

#[test]
fn exit_codes() {
    assert_eq!(PceError::SafetyLimit("3 updates exceed --max-update 2".into()).exit_code(), 3);
    assert_eq!(PceError::validation(2, "bad").exit_code(), 1);
    assert_eq!(PceError::ConfigError("x".into()).exit_code(), 1);
    assert_eq!(PceError::NotFound("label env:qa".into()).exit_code(), 1);
}

#[test]
fn export_file_names() {
    assert_eq!(
        export_file_name("wkld-export", Some(PathBuf::from("out.csv"))),
        PathBuf::from("out.csv")
    );
    let generated = export_file_name("rule-export", None);
    let name = generated.to_string_lossy();
    assert!(name.starts_with("rule-export-"), "{}", name);
    assert!(name.ends_with(".csv"), "{}", name);
}

fn header_map(header: &[&str]) -> HeaderMap {
    HeaderMap::build(&header.iter().map(|s| s.to_string()).collect::<Vec<_>>())
}

#[test]
fn every_export_header_maps_onto_itself() {
    let headers: [&[&str]; 6] = [
        &label::EXPORT_HEADER,
        &wkld::EXPORT_HEADER,
        &rule::EXPORT_HEADER,
        &svc::EXPORT_HEADER,
        &eb::EXPORT_HEADER,
        &cwp::EXPORT_HEADER,
    ];
    for header in headers {
        let map = header_map(header);
        for (i, field) in header.iter().enumerate() {
            assert_eq!(map.column(field), Some(i), "{} in {:?}", field, header);
        }
    }
}

#[test]
fn spreadsheet_style_headers_are_recognised() {
    let map = header_map(&["Host Name", "Role", "Enforcement Mode", "External Data Reference", "Notes"]);
    assert_eq!(map.column("hostname"), Some(0));
    assert_eq!(map.column("role"), Some(1));
    assert_eq!(map.column("enforcement"), Some(2));
    assert_eq!(map.column("external_data_reference"), Some(3));
    assert!(!map.has("notes"));
}
