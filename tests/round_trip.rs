//! Exporting with one command and re-importing the untouched file with its
//! paired import must queue nothing, even with `--update-pce --no-prompt`.

mod support;

use pcectl::commands::{Context, ImportSettings, cwp, eb, label, rule, svc, wkld};
use pcectl::core::apply::{ApplyOptions, Console};
use pcectl::core::error::PceResult;
use serde_json::json;
use std::path::Path;
use support::FakePce;

fn pce() -> FakePce {
    FakePce::new()
        .with(
            "/orgs/1/labels",
            vec![
                support::label(1, "role", "db"),
                support::label(2, "app", "crm"),
                support::label(3, "env", "prod"),
                support::label(4, "loc", "ams"),
            ],
        )
        .with(
            "/orgs/1/workloads",
            vec![
                json!({
                    "href": "/orgs/1/workloads/1",
                    "hostname": "db1.example.com",
                    "name": "db1",
                    "description": "primary, replicated",
                    "labels": [
                        {"href": "/orgs/1/labels/1"},
                        {"href": "/orgs/1/labels/2"},
                        {"href": "/orgs/1/labels/3"},
                    ],
                    "interfaces": [{"name": "eth0", "address": "10.0.0.5", "cidr_block": 24}],
                    "enforcement_mode": "selective",
                    "visibility_level": "flow_summary",
                    "ven": {"href": "/orgs/1/vens/1"},
                    "online": true,
                }),
                json!({
                    "href": "/orgs/1/workloads/2",
                    "hostname": "nas1",
                    "labels": [{"href": "/orgs/1/labels/4"}],
                    "interfaces": [
                        {"name": "eth0", "address": "10.0.1.9"},
                        {"name": "eth1", "address": "fe80::1", "cidr_block": 64},
                        {"name": "eth2", "address": null},
                    ],
                    "public_ip": "203.0.113.10",
                    "external_data_set": "cmdb",
                    "external_data_reference": "CI-42",
                }),
            ],
        )
        .with(
            "/orgs/1/sec_policy/draft/services",
            vec![
                json!({
                    "href": "/orgs/1/sec_policy/draft/services/1",
                    "name": "All Services",
                    "service_ports": [{"proto": -1}],
                }),
                json!({
                    "href": "/orgs/1/sec_policy/draft/services/3",
                    "name": "Web",
                    "description": "http and https",
                    "service_ports": [
                        {"port": 80, "proto": 6},
                        {"port": 8000, "to_port": 8080, "proto": 6},
                        {"proto": 1},
                    ],
                }),
                json!({
                    "href": "/orgs/1/sec_policy/draft/services/4",
                    "name": "All TCP and GRE",
                    "service_ports": [{"proto": 6}, {"proto": 47}],
                }),
                json!({
                    "href": "/orgs/1/sec_policy/draft/services/5",
                    "name": "Ping",
                    "service_ports": [
                        {"proto": 1, "icmp_type": 8, "icmp_code": 0},
                        {"proto": 58, "icmp_type": 128},
                    ],
                }),
            ],
        )
        .with(
            "/orgs/1/sec_policy/draft/ip_lists",
            vec![json!({"href": "/orgs/1/sec_policy/draft/ip_lists/1", "name": "Any"})],
        )
        .with(
            "/orgs/1/sec_policy/draft/rule_sets",
            vec![json!({
                "href": "/orgs/1/sec_policy/draft/rule_sets/7",
                "name": "CRM",
                "rules": [
                    {
                        "href": "/orgs/1/sec_policy/draft/rule_sets/7/sec_rules/1",
                        "enabled": true,
                        "consumers": [{"ip_list": {"href": "/orgs/1/sec_policy/draft/ip_lists/1"}}],
                        "providers": [{"label": {"href": "/orgs/1/labels/2"}}],
                        "ingress_services": [
                            {"href": "/orgs/1/sec_policy/draft/services/3"},
                            {"href": "/orgs/1/sec_policy/draft/services/1"},
                            {"port": 443, "proto": 6},
                            {"proto": 17},
                            {"proto": 1, "icmp_type": 0},
                        ],
                    },
                    {
                        "href": "/orgs/1/sec_policy/draft/rule_sets/7/sec_rules/2",
                        "enabled": false,
                        "description": "db access",
                        "consumers": [{"actors": "ams"}],
                        "providers": [{"workload": {"href": "/orgs/1/workloads/1"}}],
                        "ingress_services": [{"port": 5432, "proto": 6}],
                        "unscoped_consumers": true,
                        "stateless": true,
                    },
                ],
            })],
        )
        .with(
            "/orgs/1/sec_policy/draft/enforcement_boundaries",
            vec![json!({
                "href": "/orgs/1/sec_policy/draft/enforcement_boundaries/2",
                "name": "No RDP",
                "consumers": [{"ip_list": {"href": "/orgs/1/sec_policy/draft/ip_lists/1"}}],
                "providers": [{"actors": "ams"}],
                "ingress_services": [
                    {"port": 3389, "proto": 6},
                    {"href": "/orgs/1/sec_policy/draft/services/5"},
                    {"proto": 47},
                ],
            })],
        )
        .with(
            "/orgs/1/container_clusters",
            vec![json!({"href": "/orgs/1/container_clusters/c1", "name": "k8s"})],
        )
        .with(
            "/orgs/1/container_clusters/c1/container_workload_profiles",
            vec![json!({
                "href": "/orgs/1/container_clusters/c1/container_workload_profiles/p1",
                "namespace": "payments",
                "name": "payments",
                "enforcement_mode": "full",
                "visibility_level": "flow_summary",
                "managed": true,
                "labels": [
                    {"key": "env", "assignment": {"href": "/orgs/1/labels/3"}},
                    {"key": "app", "restriction": [{"href": "/orgs/1/labels/2"}]},
                ],
            })],
        )
}

fn with_context<F>(pce: &FakePce, out: &mut Vec<u8>, f: F) -> PceResult<()>
where
    F: FnOnce(&mut Context) -> PceResult<()>,
{
    colored::control::set_override(false);
    let mut prompt = support::Untouchable;
    let mut ctx = Context {
        api: pce,
        opts: ApplyOptions {
            update_pce: true,
            no_prompt: true,
            ..ApplyOptions::default()
        },
        settings: ImportSettings::default(),
        console: Console { prompt: &mut prompt, out },
    };
    f(&mut ctx)
}

fn assert_no_op(pce: &FakePce, out: &[u8], file: &Path) {
    let out = String::from_utf8_lossy(out);
    assert!(pce.calls().is_empty(), "{:?}\n{}", pce.paths(), out);
    assert!(out.contains("0 to update, 0 to create"), "{}", out);
    let exported = std::fs::read_to_string(file).unwrap();
    assert!(exported.lines().count() > 1, "{}", exported);
}

#[test]
fn labels() {
    let tmp = tempfile::tempdir().unwrap();
    let file = tmp.path().join("labels.csv");
    let pce = pce();
    let mut out = Vec::new();
    with_context(&pce, &mut out, |ctx| {
        label::run_export(ctx, label::LabelExportArgs { output_file: Some(file.clone()) })?;
        label::run_import(ctx, label::LabelImportArgs { csv: file.clone() })
    })
    .unwrap();
    assert_no_op(&pce, &out, &file);
}

#[test]
fn workloads() {
    let tmp = tempfile::tempdir().unwrap();
    let file = tmp.path().join("wkld.csv");
    let pce = pce();
    let mut out = Vec::new();
    with_context(&pce, &mut out, |ctx| {
        wkld::run_export(
            ctx,
            wkld::WkldExportArgs {
                output_file: Some(file.clone()),
                managed_only: false,
                unmanaged_only: false,
                label_filter: None,
            },
        )?;
        wkld::run_import(
            ctx,
            wkld::WkldImportArgs {
                csv: file.clone(),
                umwl: true,
                allow_enforcement_changes: true,
            },
        )
    })
    .unwrap();
    assert_no_op(&pce, &out, &file);
}

#[test]
fn rules() {
    let tmp = tempfile::tempdir().unwrap();
    let file = tmp.path().join("rules.csv");
    let pce = pce();
    let mut out = Vec::new();
    with_context(&pce, &mut out, |ctx| {
        rule::run_export(ctx, rule::RuleExportArgs { output_file: Some(file.clone()), ruleset: None })?;
        rule::run_import(ctx, rule::RuleImportArgs { csv: file.clone(), provision: true })
    })
    .unwrap();
    assert_no_op(&pce, &out, &file);
}

#[test]
fn services() {
    let tmp = tempfile::tempdir().unwrap();
    let file = tmp.path().join("svc.csv");
    let pce = pce();
    let mut out = Vec::new();
    with_context(&pce, &mut out, |ctx| {
        svc::run_export(ctx, svc::SvcExportArgs { output_file: Some(file.clone()) })?;
        svc::run_import(ctx, svc::SvcImportArgs { csv: file.clone(), provision: true })
    })
    .unwrap();
    assert_no_op(&pce, &out, &file);
    let exported = std::fs::read_to_string(&file).unwrap();
    for cell in ["all", "tcp;proto:47", "icmp:8:0;icmpv6:128"] {
        assert!(exported.contains(cell), "missing {} in:\n{}", cell, exported);
    }
}

#[test]
fn enforcement_boundaries() {
    let tmp = tempfile::tempdir().unwrap();
    let file = tmp.path().join("eb.csv");
    let pce = pce();
    let mut out = Vec::new();
    with_context(&pce, &mut out, |ctx| {
        eb::run_export(ctx, eb::EbExportArgs { output_file: Some(file.clone()) })?;
        eb::run_import(ctx, eb::EbImportArgs { csv: file.clone(), provision: true })
    })
    .unwrap();
    assert_no_op(&pce, &out, &file);
}

#[test]
fn container_workload_profiles() {
    let tmp = tempfile::tempdir().unwrap();
    let file = tmp.path().join("cwp.csv");
    let pce = pce();
    let mut out = Vec::new();
    with_context(&pce, &mut out, |ctx| {
        cwp::run_export(ctx, cwp::CwpExportArgs { output_file: Some(file.clone()) })?;
        cwp::run_import(ctx, cwp::CwpImportArgs { csv: file.clone() })
    })
    .unwrap();
    assert_no_op(&pce, &out, &file);
}
