//! `rule-export` / `rule-import`.
//!
//! Rows with a `rule_href` update that rule. Rows without one create a rule
//! in the ruleset named by `ruleset_name`, which must already exist.

use crate::commands::policy::{
    self, ActorKind, RULE_CONSUMERS, RULE_PROVIDERS, actors_json, reconcile_actors, render_actors,
};
use crate::commands::{Context, ImportSettings, data_rows, join_items, read_csv};
use crate::core::apply::ObjectWriter;
use crate::core::csvio::Row;
use crate::core::diff::{Diff, DiffEntry};
use crate::core::error::{PceError, PceResult};
use crate::core::headers::{self as h, HeaderMap};
use crate::core::inventory::{Inventory, LoadInput};
use crate::core::model::{Rule, RuleSet};
use crate::core::reconcile::{self, Policy, Reconciled};
use serde_json::{Value, json};
use std::collections::BTreeSet;
use std::path::PathBuf;

pub const EXPORT_HEADER: [&str; 23] = [
    h::RULESET_NAME,
    h::RULE_HREF,
    h::RULE_ENABLED,
    h::DESCRIPTION,
    h::SRC_LABELS,
    h::SRC_LABEL_GROUPS,
    h::SRC_IPLISTS,
    h::SRC_WORKLOADS,
    h::SRC_ALL_WORKLOADS,
    h::SRC_USER_GROUPS,
    h::UNSCOPED_CONSUMERS,
    h::DST_LABELS,
    h::DST_LABEL_GROUPS,
    h::DST_IPLISTS,
    h::DST_WORKLOADS,
    h::DST_ALL_WORKLOADS,
    h::DST_VIRTUAL_SERVICES,
    h::SERVICES,
    h::MACHINE_AUTH,
    h::SEC_CONNECT,
    h::STATELESS,
    h::EXT_DATA_SET,
    h::EXT_DATA_REF,
];

#[derive(clap::Args, Debug)]
pub struct RuleExportArgs {
    #[clap(long)]
    pub output_file: Option<PathBuf>,
    /// Only rules in this ruleset.
    #[clap(long)]
    pub ruleset: Option<String>,
}

#[derive(clap::Args, Debug)]
pub struct RuleImportArgs {
    pub csv: PathBuf,
    /// Provision the changed rulesets after applying.
    #[clap(long)]
    pub provision: bool,
}

pub fn export_row(inv: &Inventory, ruleset: &RuleSet, rule: &Rule) -> Row {
    let user_groups = join_items(rule.consuming_security_principals.iter().map(|r| {
        inv.user_groups
            .get(&r.href)
            .map(|o| o.name.clone())
            .unwrap_or_else(|| r.href.clone())
    }));
    vec![
        ruleset.name.clone(),
        rule.href.clone(),
        rule.enabled.to_string(),
        rule.description.clone().unwrap_or_default(),
        render_actors(inv, &rule.consumers, ActorKind::Label),
        render_actors(inv, &rule.consumers, ActorKind::LabelGroup),
        render_actors(inv, &rule.consumers, ActorKind::IpList),
        render_actors(inv, &rule.consumers, ActorKind::Workload),
        render_actors(inv, &rule.consumers, ActorKind::AllWorkloads),
        user_groups,
        rule.unscoped_consumers.to_string(),
        render_actors(inv, &rule.providers, ActorKind::Label),
        render_actors(inv, &rule.providers, ActorKind::LabelGroup),
        render_actors(inv, &rule.providers, ActorKind::IpList),
        render_actors(inv, &rule.providers, ActorKind::Workload),
        render_actors(inv, &rule.providers, ActorKind::AllWorkloads),
        render_actors(inv, &rule.providers, ActorKind::VirtualService),
        policy::render_services(inv, &rule.ingress_services),
        rule.machine_auth.to_string(),
        rule.sec_connect.to_string(),
        rule.stateless.to_string(),
        rule.external_data_set.clone().unwrap_or_default(),
        rule.external_data_reference.clone().unwrap_or_default(),
    ]
}

pub fn export_rows(inv: &Inventory, only: Option<&str>) -> PceResult<Vec<Row>> {
    let rulesets: Vec<&RuleSet> = match only {
        Some(key) => vec![
            inv.ruleset(key)
                .ok_or_else(|| PceError::NotFound(format!("ruleset '{}'", key)))?,
        ],
        None => inv.rulesets.values().collect(),
    };
    Ok(rulesets
        .into_iter()
        .flat_map(|rs| rs.rules.iter().map(move |r| export_row(inv, rs, r)))
        .collect())
}

pub fn run_export(ctx: &mut Context, args: RuleExportArgs) -> PceResult<()> {
    let inv = Inventory::load(ctx.api, &LoadInput::policy(), "rule-export")?;
    let rows = export_rows(&inv, args.ruleset.as_deref())?;
    ctx.write_export("rule-export", args.output_file, &EXPORT_HEADER, &rows)?;
    Ok(())
}

fn flag(entry: &mut DiffEntry, api_field: &str, current: bool, cell: &str, policy: &Policy) -> PceResult<()> {
    entry.track(api_field, reconcile::boolean(current, cell, policy)?);
    Ok(())
}

pub fn plan(
    inv: &mut Inventory,
    header: &HeaderMap,
    rows: &[Row],
    settings: &ImportSettings,
) -> PceResult<Diff> {
    header.require(&[h::RULESET_NAME, h::SERVICES])?;
    let mut diff = Diff::default();

    for (line, row) in data_rows(rows) {
        let rule_href = header.cell(row, h::RULE_HREF);
        let (current, parent) = if rule_href.is_empty() {
            let name = header.cell(row, h::RULESET_NAME);
            let ruleset = inv.ruleset(name).ok_or_else(|| {
                PceError::reference(line, format!("ruleset '{}' does not exist", name))
            })?;
            (None, Some(format!("{}/sec_rules", ruleset.href)))
        } else {
            let rule = inv.rule(rule_href).cloned().ok_or_else(|| {
                PceError::reference(line, format!("rule {} does not exist", rule_href))
            })?;
            (Some(rule), None)
        };
        let creating = current.is_none();
        let policy = Policy::new(&settings.remove_value, creating, line);
        let base = current.clone().unwrap_or_default();
        let target = match &current {
            Some(r) => r.href.clone(),
            None => format!("new rule in {}", header.cell(row, h::RULESET_NAME)),
        };
        let mut entry = DiffEntry::new(line, target, current.map(|r| r.href));
        entry.patch.parent = parent;

        let consumers = reconcile_actors(inv, header, row, &base.consumers, RULE_CONSUMERS, &policy)?;
        entry.track("consumers", Reconciled { changed: consumers.changed, value: actors_json(&consumers.value) });
        let providers = reconcile_actors(inv, header, row, &base.providers, RULE_PROVIDERS, &policy)?;
        entry.track("providers", Reconciled { changed: providers.changed, value: actors_json(&providers.value) });

        let current_groups: BTreeSet<String> =
            base.consuming_security_principals.iter().map(|r| r.href.clone()).collect();
        let groups = reconcile::set(&current_groups, header.cell(row, h::SRC_USER_GROUPS), &policy, |item| {
            inv.user_group(item)
                .map(|g| g.href.clone())
                .ok_or_else(|| PceError::reference(line, format!("user group '{}' does not exist", item)))
        })?;
        entry.track(
            "consuming_security_principals",
            Reconciled {
                changed: groups.changed,
                value: Value::Array(groups.value.iter().map(|href| json!({ "href": href })).collect()),
            },
        );

        entry.track(
            "ingress_services",
            policy::reconcile_services(inv, &base.ingress_services, header.cell(row, h::SERVICES), &policy)?,
        );

        flag(&mut entry, "enabled", base.enabled, header.cell(row, h::RULE_ENABLED), &policy)?;
        flag(&mut entry, "unscoped_consumers", base.unscoped_consumers, header.cell(row, h::UNSCOPED_CONSUMERS), &policy)?;
        flag(&mut entry, "machine_auth", base.machine_auth, header.cell(row, h::MACHINE_AUTH), &policy)?;
        flag(&mut entry, "sec_connect", base.sec_connect, header.cell(row, h::SEC_CONNECT), &policy)?;
        flag(&mut entry, "stateless", base.stateless, header.cell(row, h::STATELESS), &policy)?;

        entry.track_string(
            "description",
            reconcile::scalar(base.description.as_deref(), header.cell(row, h::DESCRIPTION), &policy),
        );
        entry.track_string(
            "external_data_set",
            reconcile::scalar(base.external_data_set.as_deref(), header.cell(row, h::EXT_DATA_SET), &policy),
        );
        entry.track_string(
            "external_data_reference",
            reconcile::scalar(base.external_data_reference.as_deref(), header.cell(row, h::EXT_DATA_REF), &policy),
        );

        if creating {
            let fields = &mut entry.patch.fields;
            fields.entry("enabled").or_insert(json!(true));
            fields.entry("consumers").or_insert(json!([]));
            fields.entry("providers").or_insert(json!([]));
            fields.insert(
                "resolve_labels_as".into(),
                json!({ "providers": ["workloads"], "consumers": ["workloads"] }),
            );
        }
        diff.record(entry, true);
    }
    Ok(diff.finish(inv))
}

/// Rulesets a planned diff touches, for provisioning.
pub fn touched_rulesets(inv: &Inventory, diff: &Diff) -> BTreeSet<String> {
    let updated = diff
        .updates
        .iter()
        .filter_map(|e| e.href().and_then(|href| inv.rule_owner(href)).map(str::to_string));
    let created = diff.creates.iter().filter_map(|e| {
        e.patch
            .parent
            .as_deref()
            .and_then(|p| p.strip_suffix("/sec_rules"))
            .map(str::to_string)
    });
    updated.chain(created).collect()
}

pub fn run_import(ctx: &mut Context, args: RuleImportArgs) -> PceResult<()> {
    let (header, rows) = read_csv(&args.csv)?;
    let mut inv = Inventory::load(ctx.api, &LoadInput::policy(), "rule-import")?;
    let diff = plan(&mut inv, &header, &rows, &ctx.settings)?;
    let rulesets = touched_rulesets(&inv, &diff);
    let writer = ObjectWriter {
        collection: crate::core::api::draft_path(ctx.api, "rule_sets"),
        kind: "rule",
    };
    let report = ctx.apply(&mut inv, diff, &writer, "rule-import")?;
    if args.provision && report.applied {
        ctx.provision("rule_sets", rulesets, "rule-import")?;
    }
    Ok(())
}
