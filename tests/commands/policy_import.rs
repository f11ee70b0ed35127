//! `rule-import`, `svc-import` and `eb-import` end to end, including
//! provisioning of the touched draft objects.

#[path = "../support/mod.rs"]
mod support;

use pcectl::commands::rule::{self, RuleImportArgs};
use pcectl::commands::svc::{self, SvcImportArgs};
use pcectl::commands::{Context, ImportSettings};
use pcectl::core::apply::{ApplyOptions, Console};
use pcectl::core::error::{PceError, PceResult};
use pretty_assertions::assert_eq;
use serde_json::json;
use support::{FakePce, label, write_csv};

const RULESET: &str = "/orgs/1/sec_policy/draft/rule_sets/7";
const RULE: &str = "/orgs/1/sec_policy/draft/rule_sets/7/sec_rules/1";

fn pce() -> FakePce {
    FakePce::new()
        .with("/orgs/1/labels", vec![label(1, "role", "db"), label(2, "role", "web")])
        .with(
            "/orgs/1/sec_policy/draft/rule_sets",
            vec![json!({
                "href": RULESET,
                "name": "Billing",
                "enabled": true,
                "rules": [{
                    "href": RULE,
                    "enabled": true,
                    "consumers": [{"label": {"href": "/orgs/1/labels/2"}}],
                    "providers": [{"label": {"href": "/orgs/1/labels/1"}}],
                    "ingress_services": [{"port": 5432, "proto": 6}],
                }],
            })],
        )
        .with(
            "/orgs/1/sec_policy/draft/services",
            vec![json!({
                "href": "/orgs/1/sec_policy/draft/services/3",
                "name": "Postgres",
                "service_ports": [{"port": 5432, "proto": 6}],
            })],
        )
}

fn with_context<F>(pce: &FakePce, f: F) -> PceResult<()>
where
    F: FnOnce(&mut Context) -> PceResult<()>,
{
    colored::control::set_override(false);
    let mut prompt = support::Untouchable;
    let mut out = Vec::new();
    let mut ctx = Context {
        api: pce,
        opts: ApplyOptions {
            update_pce: true,
            no_prompt: true,
            ..ApplyOptions::default()
        },
        settings: ImportSettings::default(),
        console: Console {
            prompt: &mut prompt,
            out: &mut out,
        },
    };
    f(&mut ctx)
}

#[test]
fn rule_update_then_create_then_provision() {
    let tmp = tempfile::tempdir().unwrap();
    let csv = write_csv(
        tmp.path(),
        "rules.csv",
        &[
            "ruleset_name,rule_href,src_labels,dst_labels,services",
            &format!("Billing,{},role:web,role:db,5432/tcp;5433/tcp", RULE),
            "Billing,,role:web,role:db,443/tcp",
        ],
    );
    let pce = pce();

    with_context(&pce, |ctx| {
        rule::run_import(ctx, RuleImportArgs { csv, provision: true })
    })
    .unwrap();

    assert_eq!(
        pce.paths(),
        vec![
            format!("PUT {}", RULE),
            format!("POST {}/sec_rules", RULESET),
            "POST /orgs/1/sec_policy".to_string(),
        ]
    );
    let calls = pce.calls();
    assert_eq!(
        calls[0].body,
        json!({"ingress_services": [{"port": 5432, "proto": 6}, {"port": 5433, "proto": 6}]})
    );
    assert_eq!(
        calls[1].body,
        json!({
            "enabled": true,
            "consumers": [{"label": {"href": "/orgs/1/labels/2"}}],
            "providers": [{"label": {"href": "/orgs/1/labels/1"}}],
            "ingress_services": [{"port": 443, "proto": 6}],
            "resolve_labels_as": {"providers": ["workloads"], "consumers": ["workloads"]},
        })
    );
    assert_eq!(calls[2].body["change_subset"], json!({"rule_sets": [{"href": RULESET}]}));
}

#[test]
fn rule_in_missing_ruleset_is_fatal() {
    let tmp = tempfile::tempdir().unwrap();
    let csv = write_csv(
        tmp.path(),
        "rules.csv",
        &["ruleset_name,src_labels,dst_labels,services", "Payroll,role:web,role:db,443/tcp"],
    );
    let pce = pce();

    let err = with_context(&pce, |ctx| {
        rule::run_import(ctx, RuleImportArgs { csv, provision: false })
    })
    .unwrap_err();

    assert!(matches!(err, PceError::ReferenceError { line: 2, .. }));
    assert_eq!(err.to_string(), "CSV line 2: ruleset 'Payroll' does not exist");
    assert!(pce.calls().is_empty());
}

#[test]
fn rule_with_new_label_creates_it_first() {
    let tmp = tempfile::tempdir().unwrap();
    let csv = write_csv(
        tmp.path(),
        "rules.csv",
        &[
            "ruleset_name,rule_href,src_labels,services",
            &format!("Billing,{},role:batch,", RULE),
        ],
    );
    let pce = pce();

    with_context(&pce, |ctx| {
        rule::run_import(ctx, RuleImportArgs { csv, provision: false })
    })
    .unwrap();

    assert_eq!(pce.paths(), vec!["POST /orgs/1/labels".to_string(), format!("PUT {}", RULE)]);
    assert_eq!(
        pce.calls()[1].body,
        json!({"consumers": [{"label": {"href": "/orgs/1/labels/100"}}]})
    );
}

#[test]
fn services_update_by_name_and_create() {
    let tmp = tempfile::tempdir().unwrap();
    let csv = write_csv(
        tmp.path(),
        "svc.csv",
        &["name,ports,description", "Postgres,5432/tcp,primary db", "DNS,53/udp;53/tcp,"],
    );
    let pce = pce();

    with_context(&pce, |ctx| svc::run_import(ctx, SvcImportArgs { csv, provision: false })).unwrap();

    assert_eq!(
        pce.paths(),
        vec![
            "PUT /orgs/1/sec_policy/draft/services/3",
            "POST /orgs/1/sec_policy/draft/services",
        ]
    );
    let calls = pce.calls();
    assert_eq!(calls[0].body, json!({"description": "primary db"}));
    assert_eq!(
        calls[1].body,
        json!({
            "name": "DNS",
            "service_ports": [{"port": 53, "proto": 6}, {"port": 53, "proto": 17}],
        })
    );
}
