//! `wkld-export` / `wkld-import`.
//!
//! Import matches each row to a workload by href, then hostname, then name,
//! then the external data `set|reference` pair. An href that matches nothing
//! is fatal; a row that matches nothing by the other keys becomes an
//! unmanaged workload when `--umwl` is set and is skipped otherwise.
//!
//! Hostname, interfaces, public IP and OS fields of managed workloads are
//! reported by the VEN and are never edited.

use crate::commands::{Context, ImportSettings, data_rows, join_items, read_csv};
use crate::core::apply::WorkloadWriter;
use crate::core::csvio::Row;
use crate::core::diff::{Diff, DiffEntry};
use crate::core::error::{PceError, PceResult};
use crate::core::headers::{self as h, HeaderMap, LABEL_KEYS};
use crate::core::inventory::{Inventory, LoadInput};
use crate::core::model::{Interface, Workload};
use crate::core::reconcile::{self, Policy, Reconciled};
use serde_json::{Value, json};
use std::path::PathBuf;
use tracing::{debug, warn};

pub const EXPORT_HEADER: [&str; 19] = [
    h::HREF,
    h::HOSTNAME,
    h::NAME,
    h::ROLE,
    h::APP,
    h::ENV,
    h::LOC,
    h::INTERFACES,
    h::PUBLIC_IP,
    h::DESCRIPTION,
    h::ENFORCEMENT,
    h::VISIBILITY,
    h::OS_ID,
    h::OS_DETAIL,
    h::DATACENTER,
    h::EXT_DATA_SET,
    h::EXT_DATA_REF,
    h::MANAGED,
    h::ONLINE,
];

/// VEN-owned fields: (CSV field, API field).
const VEN_OWNED: [(&str, &str); 3] = [
    (h::PUBLIC_IP, "public_ip"),
    (h::OS_ID, "os_id"),
    (h::OS_DETAIL, "os_detail"),
];

#[derive(clap::Args, Debug)]
pub struct WkldExportArgs {
    #[clap(long)]
    pub output_file: Option<PathBuf>,
    /// Only workloads with a paired VEN.
    #[clap(long, conflicts_with = "unmanaged_only")]
    pub managed_only: bool,
    /// Only workloads without a VEN.
    #[clap(long)]
    pub unmanaged_only: bool,
    /// Only workloads carrying this label (key:value).
    #[clap(long)]
    pub label_filter: Option<String>,
}

#[derive(clap::Args, Debug)]
pub struct WkldImportArgs {
    pub csv: PathBuf,
    /// Create unmanaged workloads for rows that match no existing workload.
    #[clap(long)]
    pub umwl: bool,
    /// Apply enforcement and visibility changes (ignored with a warning otherwise).
    #[clap(long)]
    pub allow_enforcement_changes: bool,
}

#[derive(Debug, Clone, Default)]
pub struct WkldImportOptions {
    pub umwl: bool,
    pub allow_enforcement_changes: bool,
}

fn label_value(inv: &Inventory, workload: &Workload, key: &str) -> String {
    current_label(inv, workload, key)
        .and_then(|href| inv.label(href))
        .map(|l| l.value.clone())
        .unwrap_or_default()
}

fn current_label<'w>(inv: &Inventory, workload: &'w Workload, key: &str) -> Option<&'w str> {
    workload
        .labels
        .iter()
        .map(|l| l.href.as_str())
        .find(|href| inv.label(href).is_some_and(|l| l.key == key))
}

pub fn export_row(inv: &Inventory, w: &Workload) -> Row {
    let opt = |v: &Option<String>| v.clone().unwrap_or_default();
    vec![
        w.href.clone(),
        opt(&w.hostname),
        opt(&w.name),
        label_value(inv, w, h::ROLE),
        label_value(inv, w, h::APP),
        label_value(inv, w, h::ENV),
        label_value(inv, w, h::LOC),
        join_items(w.interfaces.iter().map(Interface::render)),
        opt(&w.public_ip),
        opt(&w.description),
        opt(&w.enforcement_mode),
        opt(&w.visibility_level),
        opt(&w.os_id),
        opt(&w.os_detail),
        opt(&w.data_center),
        opt(&w.external_data_set),
        opt(&w.external_data_reference),
        w.managed().to_string(),
        w.online.to_string(),
    ]
}

fn workload_query(inv: &Inventory, args: &WkldExportArgs) -> PceResult<Vec<(String, String)>> {
    let mut query = Vec::new();
    if args.managed_only {
        query.push(("managed".to_string(), "true".to_string()));
    }
    if args.unmanaged_only {
        query.push(("managed".to_string(), "false".to_string()));
    }
    if let Some(filter) = &args.label_filter {
        let (key, value) = reconcile::split_kv(filter, 0)
            .map_err(|_| PceError::ConfigError(format!("--label-filter '{}' must be key:value", filter)))?;
        let label = inv
            .label_by_kv(key, value)
            .ok_or_else(|| PceError::NotFound(format!("label {}:{}", key, value)))?;
        query.push(("labels".to_string(), json!([[label.href]]).to_string()));
    }
    Ok(query)
}

pub fn run_export(ctx: &mut Context, args: WkldExportArgs) -> PceResult<()> {
    let labels_only = LoadInput {
        labels: true,
        ..LoadInput::default()
    };
    let mut inv = Inventory::load(ctx.api, &labels_only, "wkld-export")?;
    let query = workload_query(&inv, &args)?;
    let path = crate::core::api::org_path(ctx.api, "workloads");
    for w in crate::core::api::fetch::<Workload>(ctx.api, &path, &query)? {
        inv.add_workload(w);
    }
    let rows: Vec<Row> = inv.workloads.values().map(|w| export_row(&inv, w)).collect();
    ctx.write_export("wkld-export", args.output_file, &EXPORT_HEADER, &rows)?;
    Ok(())
}

/// Find the workload a row describes. `Err` only for an unknown href.
fn match_row<'i>(
    inv: &'i Inventory,
    header: &HeaderMap,
    row: &[String],
    line: usize,
) -> PceResult<Option<&'i Workload>> {
    let href = header.cell(row, h::HREF);
    if !href.is_empty() {
        return inv
            .workloads
            .get(href)
            .map(Some)
            .ok_or_else(|| PceError::reference(line, format!("workload {} does not exist", href)));
    }
    let hostname = header.cell(row, h::HOSTNAME);
    if let Some(w) = (!hostname.is_empty()).then(|| inv.workload_by_hostname(hostname)).flatten() {
        return Ok(Some(w));
    }
    let name = header.cell(row, h::NAME);
    if let Some(w) = (!name.is_empty()).then(|| inv.workload_by_name(name)).flatten() {
        return Ok(Some(w));
    }
    let (set, reference) = (header.cell(row, h::EXT_DATA_SET), header.cell(row, h::EXT_DATA_REF));
    if !set.is_empty() && !reference.is_empty() {
        return Ok(inv.workload_by_external(set, reference));
    }
    Ok(None)
}

fn interface_json(i: &Interface) -> Value {
    let mut obj = json!({ "name": i.name });
    if let Some(address) = &i.address {
        obj["address"] = json!(address);
    }
    if let Some(cidr) = i.cidr_block {
        obj["cidr_block"] = json!(cidr);
    }
    obj
}

/// Reconcile the four label columns; returns the full new label list when
/// any dimension changed. Labels with other keys are kept.
pub fn reconcile_labels(
    inv: &mut Inventory,
    header: &HeaderMap,
    row: &[String],
    current: &[String],
    policy: &Policy,
) -> Reconciled<Vec<String>> {
    let mut changed = false;
    let mut hrefs: Vec<String> = current
        .iter()
        .filter(|href| {
            inv.label(href)
                .is_none_or(|l| !LABEL_KEYS.contains(&l.key.as_str()))
        })
        .cloned()
        .collect();
    for key in LABEL_KEYS {
        let existing = current
            .iter()
            .find(|href| inv.label(href).is_some_and(|l| l.key == key))
            .cloned();
        let r = reconcile::label(inv, existing.as_deref(), key, header.cell(row, key), policy);
        changed |= r.changed;
        hrefs.extend(r.value);
    }
    Reconciled { changed, value: hrefs }
}

fn labels_json(hrefs: &[String]) -> Value {
    Value::Array(hrefs.iter().map(|h| json!({ "href": h })).collect())
}

pub fn plan(
    inv: &mut Inventory,
    header: &HeaderMap,
    rows: &[Row],
    settings: &ImportSettings,
    opts: &WkldImportOptions,
) -> PceResult<Diff> {
    header.require_any(&[h::HREF, h::HOSTNAME, h::NAME, h::EXT_DATA_REF])?;
    let mut diff = Diff::default();

    for (line, row) in data_rows(rows) {
        let current = match_row(inv, header, row, line)?.cloned();
        let creating = current.is_none();
        let policy = Policy::new(&settings.remove_value, creating, line);
        let target = match &current {
            Some(w) => w.display_name().to_string(),
            None => {
                let named = [header.cell(row, h::HOSTNAME), header.cell(row, h::NAME)]
                    .into_iter()
                    .find(|s| !s.is_empty());
                match (named, opts.umwl) {
                    (Some(n), true) => n.to_string(),
                    (None, true) => {
                        return Err(PceError::validation(
                            line,
                            "a new workload needs a hostname or name",
                        ));
                    }
                    (_, false) => {
                        warn!(line, "no matching workload; pass --umwl to create it. Skipping row");
                        diff.skip();
                        continue;
                    }
                }
            }
        };
        let mut entry = DiffEntry::new(line, target, current.as_ref().map(|w| w.href.clone()));
        let base = current.clone().unwrap_or_default();
        let managed = base.managed();

        if managed {
            for field in [h::HOSTNAME, h::INTERFACES, h::PUBLIC_IP, h::OS_ID, h::OS_DETAIL] {
                if !header.cell(row, field).is_empty() {
                    debug!(line, field, "managed workload field is VEN-owned; ignoring");
                }
            }
        } else {
            entry.track_string(
                "hostname",
                reconcile::scalar(base.hostname.as_deref(), header.cell(row, h::HOSTNAME), &policy),
            );
            let ifaces = reconcile::interfaces(&base.interfaces, header.cell(row, h::INTERFACES), &policy)?;
            entry.track(
                "interfaces",
                Reconciled {
                    changed: ifaces.changed,
                    value: Value::Array(ifaces.value.iter().map(interface_json).collect()),
                },
            );
            for (field, api_field) in VEN_OWNED {
                let current_value = match field {
                    h::PUBLIC_IP => base.public_ip.as_deref(),
                    h::OS_ID => base.os_id.as_deref(),
                    _ => base.os_detail.as_deref(),
                };
                entry.track_string(api_field, reconcile::scalar(current_value, header.cell(row, field), &policy));
            }
        }

        for (field, api_field, current_value) in [
            (h::NAME, "name", base.name.as_deref()),
            (h::DESCRIPTION, "description", base.description.as_deref()),
            (h::DATACENTER, "data_center", base.data_center.as_deref()),
            (h::EXT_DATA_SET, "external_data_set", base.external_data_set.as_deref()),
            (h::EXT_DATA_REF, "external_data_reference", base.external_data_reference.as_deref()),
        ] {
            entry.track_string(api_field, reconcile::scalar(current_value, header.cell(row, field), &policy));
        }

        let current_labels: Vec<String> = base.labels.iter().map(|l| l.href.clone()).collect();
        let labels = reconcile_labels(inv, header, row, &current_labels, &policy);
        entry.track(
            "labels",
            Reconciled {
                changed: labels.changed,
                value: labels_json(&labels.value),
            },
        );

        let modes = [
            (
                "enforcement_mode",
                reconcile::enforcement_mode(base.enforcement_mode.as_deref(), header.cell(row, h::ENFORCEMENT), &policy)?,
            ),
            (
                "visibility_level",
                reconcile::visibility_level(base.visibility_level.as_deref(), header.cell(row, h::VISIBILITY), &policy)?,
            ),
        ];
        for (api_field, r) in modes {
            if r.changed && !opts.allow_enforcement_changes {
                warn!(line, field = api_field, value = r.value.as_deref().unwrap_or_default(),
                    "change ignored; pass --allow-enforcement-changes to apply it");
                continue;
            }
            entry.track_string(api_field, r);
        }

        diff.record(entry, opts.umwl);
    }
    Ok(diff.finish(inv))
}

pub fn run_import(ctx: &mut Context, args: WkldImportArgs) -> PceResult<()> {
    let (header, rows) = read_csv(&args.csv)?;
    let input = LoadInput {
        labels: true,
        workloads: true,
        ..LoadInput::default()
    };
    let mut inv = Inventory::load(ctx.api, &input, "wkld-import")?;
    let opts = WkldImportOptions {
        umwl: args.umwl,
        allow_enforcement_changes: args.allow_enforcement_changes,
    };
    let diff = plan(&mut inv, &header, &rows, &ctx.settings, &opts)?;
    ctx.apply(&mut inv, diff, &WorkloadWriter, "wkld-import")?;
    Ok(())
}
