//! `svc-export` / `svc-import`.

use crate::commands::{Context, ImportSettings, data_rows, join_items, read_csv};
use crate::core::api;
use crate::core::apply::ObjectWriter;
use crate::core::csvio::Row;
use crate::core::diff::{Diff, DiffEntry};
use crate::core::error::{PceError, PceResult};
use crate::core::headers::{self as h, HeaderMap};
use crate::core::inventory::{Inventory, LoadInput};
use crate::core::model::Service;
use crate::core::reconcile::{self, Policy, Reconciled};
use serde_json::Value;
use std::collections::BTreeSet;
use std::path::PathBuf;

pub const EXPORT_HEADER: [&str; 6] = [
    h::HREF,
    h::NAME,
    h::DESCRIPTION,
    h::PORTS,
    h::EXT_DATA_SET,
    h::EXT_DATA_REF,
];

#[derive(clap::Args, Debug)]
pub struct SvcExportArgs {
    #[clap(long)]
    pub output_file: Option<PathBuf>,
}

#[derive(clap::Args, Debug)]
pub struct SvcImportArgs {
    pub csv: PathBuf,
    /// Provision the changed services after applying.
    #[clap(long)]
    pub provision: bool,
}

pub fn export_row(s: &Service) -> Row {
    vec![
        s.href.clone(),
        s.name.clone(),
        s.description.clone().unwrap_or_default(),
        join_items(s.service_ports.iter().map(reconcile::render_port)),
        s.external_data_set.clone().unwrap_or_default(),
        s.external_data_reference.clone().unwrap_or_default(),
    ]
}

pub fn run_export(ctx: &mut Context, args: SvcExportArgs) -> PceResult<()> {
    let input = LoadInput {
        services: true,
        ..LoadInput::default()
    };
    let inv = Inventory::load(ctx.api, &input, "svc-export")?;
    let rows: Vec<Row> = inv.services.values().map(export_row).collect();
    ctx.write_export("svc-export", args.output_file, &EXPORT_HEADER, &rows)?;
    Ok(())
}

fn reconcile_ports(service: &Service, cell: &str, policy: &Policy) -> PceResult<Reconciled<Value>> {
    let current: BTreeSet<String> = service.service_ports.iter().map(reconcile::render_port).collect();
    let r = reconcile::set(&current, cell, policy, |item| {
        reconcile::parse_port(item, policy.line).map(|p| reconcile::render_port(&p))
    })?;
    let ports = r
        .value
        .iter()
        .map(|k| reconcile::ingress_json(k, policy.line))
        .collect::<PceResult<Vec<_>>>()?;
    Ok(Reconciled {
        changed: r.changed,
        value: Value::Array(ports),
    })
}

pub fn plan(
    inv: &mut Inventory,
    header: &HeaderMap,
    rows: &[Row],
    settings: &ImportSettings,
) -> PceResult<Diff> {
    header.require(&[h::NAME, h::PORTS])?;
    let mut diff = Diff::default();

    for (line, row) in data_rows(rows) {
        let href = header.cell(row, h::HREF);
        let name = header.cell(row, h::NAME);
        let current = if href.is_empty() {
            inv.service(name).cloned()
        } else {
            Some(inv.service(href).cloned().ok_or_else(|| {
                PceError::reference(line, format!("service {} does not exist", href))
            })?)
        };
        if current.is_none() && name.is_empty() {
            return Err(PceError::validation(line, "a new service needs a name"));
        }
        let creating = current.is_none();
        let policy = Policy::new(&settings.remove_value, creating, line);
        let base = current.clone().unwrap_or_default();
        let mut entry = DiffEntry::new(line, name, current.map(|s| s.href));

        entry.track_string("name", reconcile::scalar(Some(base.name.as_str()), name, &policy));
        entry.track_string(
            "description",
            reconcile::scalar(base.description.as_deref(), header.cell(row, h::DESCRIPTION), &policy),
        );
        entry.track("service_ports", reconcile_ports(&base, header.cell(row, h::PORTS), &policy)?);
        entry.track_string(
            "external_data_set",
            reconcile::scalar(base.external_data_set.as_deref(), header.cell(row, h::EXT_DATA_SET), &policy),
        );
        entry.track_string(
            "external_data_reference",
            reconcile::scalar(base.external_data_reference.as_deref(), header.cell(row, h::EXT_DATA_REF), &policy),
        );
        diff.record(entry, true);
    }
    Ok(diff.finish(inv))
}

pub fn run_import(ctx: &mut Context, args: SvcImportArgs) -> PceResult<()> {
    let (header, rows) = read_csv(&args.csv)?;
    let input = LoadInput {
        services: true,
        ..LoadInput::default()
    };
    let mut inv = Inventory::load(ctx.api, &input, "svc-import")?;
    let diff = plan(&mut inv, &header, &rows, &ctx.settings)?;
    let writer = ObjectWriter {
        collection: api::draft_path(ctx.api, "services"),
        kind: "service",
    };
    let report = ctx.apply(&mut inv, diff, &writer, "svc-import")?;
    if args.provision && report.applied {
        ctx.provision("services", report.touched.into_iter().collect(), "svc-import")?;
    }
    Ok(())
}
