//! `wkld-import` end to end against the in-memory PCE: label reconciliation,
//! placeholder labels, and the confirmation gate.

#[path = "../support/mod.rs"]
mod support;

use pcectl::commands::wkld::{self, WkldImportArgs};
use pcectl::commands::{Context, ImportSettings};
use pcectl::core::apply::{ApplyOptions, Console, Prompt};
use pcectl::core::error::{PceError, PceResult};
use pretty_assertions::assert_eq;
use serde_json::json;
use std::path::PathBuf;
use support::{Answer, FakePce, Untouchable, label, write_csv};

fn pce() -> FakePce {
    FakePce::new()
        .with(
            "/orgs/1/labels",
            vec![label(1, "role", "test"), label(2, "app", "app1")],
        )
        .with(
            "/orgs/1/workloads",
            vec![
                json!({
                    "href": "/orgs/1/workloads/1",
                    "hostname": "db1",
                    "labels": [{"href": "/orgs/1/labels/1"}, {"href": "/orgs/1/labels/2"}],
                    "ven": {"href": "/orgs/1/vens/1"},
                }),
                json!({
                    "href": "/orgs/1/workloads/2",
                    "hostname": "db2",
                    "labels": [{"href": "/orgs/1/labels/1"}, {"href": "/orgs/1/labels/2"}],
                }),
            ],
        )
}

fn clear() -> ImportSettings {
    ImportSettings {
        remove_value: "CLEAR".into(),
    }
}

fn applying() -> ApplyOptions {
    ApplyOptions {
        update_pce: true,
        no_prompt: true,
        ..ApplyOptions::default()
    }
}

fn import(
    pce: &FakePce,
    csv: PathBuf,
    opts: ApplyOptions,
    prompt: &mut dyn Prompt,
    umwl: bool,
) -> (PceResult<()>, String) {
    colored::control::set_override(false);
    let mut out = Vec::new();
    let result = {
        let mut ctx = Context {
            api: pce,
            opts,
            settings: clear(),
            console: Console {
                prompt,
                out: &mut out,
            },
        };
        wkld::run_import(
            &mut ctx,
            WkldImportArgs {
                csv,
                umwl,
                allow_enforcement_changes: false,
            },
        )
    };
    (result, String::from_utf8_lossy(&out).to_string())
}

#[test]
fn role_change_creates_label_then_updates_workload() {
    let tmp = tempfile::tempdir().unwrap();
    let csv = write_csv(tmp.path(), "w.csv", &["hostname,role,app", "db1,prod,app1"]);
    let pce = pce();

    let (result, _) = import(&pce, csv, applying(), &mut Untouchable, false);
    result.unwrap();

    assert_eq!(pce.paths(), vec!["POST /orgs/1/labels", "PUT /orgs/1/workloads/bulk_update"]);
    let calls = pce.calls();
    assert_eq!(calls[0].body, json!({"key": "role", "value": "prod"}));
    assert_eq!(
        calls[1].body,
        json!([{
            "href": "/orgs/1/workloads/1",
            "labels": [{"href": "/orgs/1/labels/100"}, {"href": "/orgs/1/labels/2"}],
        }])
    );
}

#[test]
fn remove_sentinel_clears_role() {
    let tmp = tempfile::tempdir().unwrap();
    let csv = write_csv(tmp.path(), "w.csv", &["hostname,role,app", "db2,CLEAR,app1"]);
    let pce = pce();

    let (result, _) = import(&pce, csv, applying(), &mut Untouchable, false);
    result.unwrap();

    assert_eq!(pce.paths(), vec!["PUT /orgs/1/workloads/bulk_update"]);
    assert_eq!(
        pce.calls()[0].body,
        json!([{"href": "/orgs/1/workloads/2", "labels": [{"href": "/orgs/1/labels/2"}]}])
    );
}

#[test]
fn dry_run_never_mutates() {
    let tmp = tempfile::tempdir().unwrap();
    let csv = write_csv(tmp.path(), "w.csv", &["hostname,role", "db1,prod", "web9,test"]);
    let pce = pce();

    let (result, out) = import(&pce, csv, ApplyOptions::default(), &mut Untouchable, true);
    result.unwrap();

    assert!(pce.calls().is_empty());
    assert!(out.contains("1 to update, 1 to create"), "{}", out);
    assert!(out.contains("dry run"), "{}", out);
}

#[test]
fn anything_but_yes_declines() {
    for answer in ["no", "y", "yes please", ""] {
        let tmp = tempfile::tempdir().unwrap();
        let csv = write_csv(tmp.path(), "w.csv", &["hostname,role", "db1,prod"]);
        let pce = pce();
        let opts = ApplyOptions {
            update_pce: true,
            ..ApplyOptions::default()
        };

        let (result, out) = import(&pce, csv, opts, &mut Answer(answer), false);
        result.unwrap();

        assert!(pce.calls().is_empty(), "answer {:?} mutated the PCE", answer);
        assert!(out.contains("aborted"), "{}", out);
    }
}

#[test]
fn yes_in_any_case_applies() {
    let tmp = tempfile::tempdir().unwrap();
    let csv = write_csv(tmp.path(), "w.csv", &["hostname,app", "db2,app1", "db1,CLEAR"]);
    let pce = pce();
    let opts = ApplyOptions {
        update_pce: true,
        ..ApplyOptions::default()
    };

    let (result, _) = import(&pce, csv, opts, &mut Answer(" YES "), false);
    result.unwrap();

    assert_eq!(pce.paths(), vec!["PUT /orgs/1/workloads/bulk_update"]);
}

#[test]
fn unmatched_rows_need_umwl() {
    let tmp = tempfile::tempdir().unwrap();
    let csv = write_csv(tmp.path(), "w.csv", &["hostname,name,role", "web9,Web 9,test"]);

    let pce = pce();
    let (result, out) = import(&pce, csv.clone(), applying(), &mut Untouchable, false);
    result.unwrap();
    assert!(pce.calls().is_empty());
    assert!(out.contains("1 skipped"), "{}", out);

    let pce = self::pce();
    let (result, _) = import(&pce, csv, applying(), &mut Untouchable, true);
    result.unwrap();
    assert_eq!(pce.paths(), vec!["PUT /orgs/1/workloads/bulk_create"]);
    assert_eq!(
        pce.calls()[0].body,
        json!([{"hostname": "web9", "name": "Web 9", "labels": [{"href": "/orgs/1/labels/1"}]}])
    );
}

#[test]
fn safety_limit_stops_before_any_call() {
    let tmp = tempfile::tempdir().unwrap();
    let csv = write_csv(tmp.path(), "w.csv", &["hostname,role", "db1,prod", "db2,CLEAR"]);
    let pce = pce();
    let opts = ApplyOptions {
        max_update: Some(1),
        ..applying()
    };

    let (result, _) = import(&pce, csv, opts, &mut Untouchable, false);

    let err = result.unwrap_err();
    assert!(matches!(err, PceError::SafetyLimit(_)));
    assert_eq!(err.exit_code(), 3);
    assert!(pce.calls().is_empty());
}

#[test]
fn unknown_href_is_fatal_with_line_number() {
    let tmp = tempfile::tempdir().unwrap();
    let csv = write_csv(
        tmp.path(),
        "w.csv",
        &["href,role", "/orgs/1/workloads/1,test", "/orgs/1/workloads/99,test"],
    );
    let pce = pce();

    let (result, _) = import(&pce, csv, applying(), &mut Untouchable, false);

    let err = result.unwrap_err();
    assert!(err.to_string().starts_with("CSV line 3:"), "{}", err);
    assert!(pce.calls().is_empty());
}
