//! `cwp-export` / `cwp-import`: container workload profiles.
//!
//! Profiles are addressed by cluster name plus namespace. They are created
//! by the cluster itself, so the import only updates; a row naming an
//! unknown cluster or namespace is warned about and skipped.

use crate::commands::{Context, ImportSettings, data_rows, read_csv};
use crate::core::apply::ObjectWriter;
use crate::core::csvio::Row;
use crate::core::diff::{Diff, DiffEntry};
use crate::core::error::PceResult;
use crate::core::headers::{self as h, HeaderMap, LABEL_KEYS};
use crate::core::inventory::{Inventory, LoadInput};
use crate::core::model::{ContainerWorkloadProfile, NamedObject};
use crate::core::reconcile::{self, Policy, Reconciled};
use serde_json::{Value, json};
use std::path::PathBuf;
use tracing::warn;

pub const EXPORT_HEADER: [&str; 12] = [
    h::CLUSTER,
    h::NAMESPACE,
    h::HREF,
    h::NAME,
    h::DESCRIPTION,
    h::ROLE,
    h::APP,
    h::ENV,
    h::LOC,
    h::ENFORCEMENT,
    h::VISIBILITY,
    h::MANAGED,
];

#[derive(clap::Args, Debug)]
pub struct CwpExportArgs {
    #[clap(long)]
    pub output_file: Option<PathBuf>,
}

#[derive(clap::Args, Debug)]
pub struct CwpImportArgs {
    /// CSV with cluster and namespace columns.
    pub csv: PathBuf,
}

fn load_input() -> LoadInput {
    LoadInput {
        labels: true,
        container_profiles: true,
        ..LoadInput::default()
    }
}

fn belongs_to(profile: &ContainerWorkloadProfile, cluster: &NamedObject) -> bool {
    profile
        .href
        .strip_prefix(cluster.href.as_str())
        .is_some_and(|rest| rest.starts_with('/'))
}

fn label_value(inv: &Inventory, profile: &ContainerWorkloadProfile, key: &str) -> String {
    profile
        .assigned_label(key)
        .and_then(|href| inv.label(href))
        .map(|l| l.value.clone())
        .unwrap_or_default()
}

pub fn export_row(inv: &Inventory, cluster: &NamedObject, p: &ContainerWorkloadProfile) -> Row {
    let mut row = vec![
        cluster.name.clone(),
        p.namespace.clone().unwrap_or_default(),
        p.href.clone(),
        p.name.clone().unwrap_or_default(),
        p.description.clone().unwrap_or_default(),
    ];
    row.extend(LABEL_KEYS.iter().map(|key| label_value(inv, p, key)));
    row.push(p.enforcement_mode.clone().unwrap_or_default());
    row.push(p.visibility_level.clone().unwrap_or_default());
    row.push(p.managed.to_string());
    row
}

/// Export rows ordered by cluster, then by profile href.
pub fn export_rows(inv: &Inventory) -> Vec<Row> {
    let mut rows = Vec::new();
    for cluster in inv.container_clusters.values() {
        for profile in inv.container_profiles.values().filter(|p| belongs_to(p, cluster)) {
            rows.push(export_row(inv, cluster, profile));
        }
    }
    rows
}

pub fn run_export(ctx: &mut Context, args: CwpExportArgs) -> PceResult<()> {
    let inv = Inventory::load(ctx.api, &load_input(), "cwp-export")?;
    ctx.write_export("cwp-export", args.output_file, &EXPORT_HEADER, &export_rows(&inv))?;
    Ok(())
}

/// Label assignments for the four dimensions. Assignments for other keys
/// are carried over untouched.
fn reconcile_labels(
    inv: &mut Inventory,
    header: &HeaderMap,
    row: &[String],
    profile: &ContainerWorkloadProfile,
    policy: &Policy,
) -> Reconciled<Value> {
    let mut changed = false;
    let mut assignments: Vec<(String, String)> = profile
        .labels
        .iter()
        .filter(|l| !LABEL_KEYS.contains(&l.key.as_str()))
        .filter_map(|l| l.assignment.as_ref().map(|a| (l.key.clone(), a.href.clone())))
        .collect();
    for key in LABEL_KEYS {
        let r = reconcile::label(inv, profile.assigned_label(key), key, header.cell(row, key), policy);
        changed |= r.changed;
        if let Some(href) = r.value {
            assignments.push((key.to_string(), href));
        }
    }
    let value = assignments
        .into_iter()
        .map(|(key, href)| json!({ "key": key, "assignment": { "href": href } }))
        .collect();
    Reconciled {
        changed,
        value: Value::Array(value),
    }
}

pub fn plan(
    inv: &mut Inventory,
    header: &HeaderMap,
    rows: &[Row],
    settings: &ImportSettings,
) -> PceResult<Diff> {
    header.require(&[h::CLUSTER, h::NAMESPACE])?;
    let mut diff = Diff::default();

    for (line, row) in data_rows(rows) {
        let cluster_name = header.cell(row, h::CLUSTER);
        let namespace = header.cell(row, h::NAMESPACE);
        let Some(cluster) = inv.container_cluster(cluster_name).cloned() else {
            warn!(line, cluster = cluster_name, "container cluster does not exist; skipping");
            diff.skip();
            continue;
        };
        let Some(profile) = inv.container_profile(&cluster.href, namespace).cloned() else {
            warn!(
                line,
                cluster = cluster_name,
                namespace,
                "no container workload profile for namespace; skipping"
            );
            diff.skip();
            continue;
        };

        let policy = Policy::new(&settings.remove_value, false, line);
        let mut entry = DiffEntry::new(
            line,
            format!("{}/{}", cluster_name, namespace),
            Some(profile.href.clone()),
        );
        entry.track_string(
            "name",
            reconcile::scalar(profile.name.as_deref(), header.cell(row, h::NAME), &policy),
        );
        entry.track_string(
            "description",
            reconcile::scalar(profile.description.as_deref(), header.cell(row, h::DESCRIPTION), &policy),
        );
        entry.track("labels", reconcile_labels(inv, header, row, &profile, &policy));
        entry.track_string(
            "enforcement_mode",
            reconcile::enforcement_mode(
                profile.enforcement_mode.as_deref(),
                header.cell(row, h::ENFORCEMENT),
                &policy,
            )?,
        );
        entry.track_string(
            "visibility_level",
            reconcile::visibility_level(
                profile.visibility_level.as_deref(),
                header.cell(row, h::VISIBILITY),
                &policy,
            )?,
        );
        diff.record(entry, false);
    }
    Ok(diff.finish(inv))
}

pub fn run_import(ctx: &mut Context, args: CwpImportArgs) -> PceResult<()> {
    let (header, rows) = read_csv(&args.csv)?;
    let mut inv = Inventory::load(ctx.api, &load_input(), "cwp-import")?;
    let diff = plan(&mut inv, &header, &rows, &ctx.settings)?;
    // Updates only; profiles are never created from a CSV row.
    let writer = ObjectWriter {
        collection: String::new(),
        kind: "container workload profile",
    };
    ctx.apply(&mut inv, diff, &writer, "cwp-import")?;
    Ok(())
}
