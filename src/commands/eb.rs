//! `eb-export` / `eb-import`: enforcement boundaries.

use crate::commands::policy::{
    self, BOUNDARY_CONSUMERS, BOUNDARY_PROVIDERS, actors_json, reconcile_actors, render_actors,
};
use crate::commands::{Context, ImportSettings, data_rows, read_csv};
use crate::core::api;
use crate::core::apply::ObjectWriter;
use crate::core::csvio::Row;
use crate::core::diff::{Diff, DiffEntry};
use crate::core::error::{PceError, PceResult};
use crate::core::headers::{self as h, HeaderMap};
use crate::core::inventory::{Inventory, LoadInput};
use crate::core::model::EnforcementBoundary;
use crate::core::reconcile::{self, Policy, Reconciled};
use std::path::PathBuf;

pub const EXPORT_HEADER: [&str; 11] = [
    h::HREF,
    h::NAME,
    h::SRC_LABELS,
    h::SRC_LABEL_GROUPS,
    h::SRC_IPLISTS,
    h::SRC_ALL_WORKLOADS,
    h::DST_LABELS,
    h::DST_LABEL_GROUPS,
    h::DST_IPLISTS,
    h::DST_ALL_WORKLOADS,
    h::SERVICES,
];

#[derive(clap::Args, Debug)]
pub struct EbExportArgs {
    #[clap(long)]
    pub output_file: Option<PathBuf>,
}

#[derive(clap::Args, Debug)]
pub struct EbImportArgs {
    pub csv: PathBuf,
    /// Provision the changed boundaries after applying.
    #[clap(long)]
    pub provision: bool,
}

fn load_input() -> LoadInput {
    LoadInput {
        enforcement_boundaries: true,
        workloads: false,
        ..LoadInput::policy()
    }
}

pub fn export_row(inv: &Inventory, eb: &EnforcementBoundary) -> Row {
    let mut row = vec![eb.href.clone(), eb.name.clone()];
    for (_, kind) in BOUNDARY_CONSUMERS {
        row.push(render_actors(inv, &eb.consumers, *kind));
    }
    for (_, kind) in BOUNDARY_PROVIDERS {
        row.push(render_actors(inv, &eb.providers, *kind));
    }
    row.push(policy::render_services(inv, &eb.ingress_services));
    row
}

pub fn run_export(ctx: &mut Context, args: EbExportArgs) -> PceResult<()> {
    let inv = Inventory::load(ctx.api, &load_input(), "eb-export")?;
    let rows: Vec<Row> = inv
        .enforcement_boundaries
        .values()
        .map(|eb| export_row(&inv, eb))
        .collect();
    ctx.write_export("eb-export", args.output_file, &EXPORT_HEADER, &rows)?;
    Ok(())
}

pub fn plan(
    inv: &mut Inventory,
    header: &HeaderMap,
    rows: &[Row],
    settings: &ImportSettings,
) -> PceResult<Diff> {
    header.require(&[h::NAME, h::SERVICES])?;
    let mut diff = Diff::default();

    for (line, row) in data_rows(rows) {
        let href = header.cell(row, h::HREF);
        let name = header.cell(row, h::NAME);
        let current = if href.is_empty() {
            inv.enforcement_boundary(name).cloned()
        } else {
            Some(inv.enforcement_boundary(href).cloned().ok_or_else(|| {
                PceError::reference(line, format!("enforcement boundary {} does not exist", href))
            })?)
        };
        if current.is_none() && name.is_empty() {
            return Err(PceError::validation(line, "a new enforcement boundary needs a name"));
        }
        let creating = current.is_none();
        let policy = Policy::new(&settings.remove_value, creating, line);
        let base = current.clone().unwrap_or_default();
        let mut entry = DiffEntry::new(line, name, current.map(|eb| eb.href));

        entry.track_string("name", reconcile::scalar(Some(base.name.as_str()), name, &policy));
        let consumers = reconcile_actors(inv, header, row, &base.consumers, BOUNDARY_CONSUMERS, &policy)?;
        entry.track("consumers", Reconciled { changed: consumers.changed, value: actors_json(&consumers.value) });
        let providers = reconcile_actors(inv, header, row, &base.providers, BOUNDARY_PROVIDERS, &policy)?;
        entry.track("providers", Reconciled { changed: providers.changed, value: actors_json(&providers.value) });
        entry.track(
            "ingress_services",
            policy::reconcile_services(inv, &base.ingress_services, header.cell(row, h::SERVICES), &policy)?,
        );
        diff.record(entry, true);
    }
    Ok(diff.finish(inv))
}

pub fn run_import(ctx: &mut Context, args: EbImportArgs) -> PceResult<()> {
    let (header, rows) = read_csv(&args.csv)?;
    let mut inv = Inventory::load(ctx.api, &load_input(), "eb-import")?;
    let diff = plan(&mut inv, &header, &rows, &ctx.settings)?;
    let writer = ObjectWriter {
        collection: api::draft_path(ctx.api, "enforcement_boundaries"),
        kind: "enforcement boundary",
    };
    let report = ctx.apply(&mut inv, diff, &writer, "eb-import")?;
    if args.provision && report.applied {
        ctx.provision("enforcement_boundaries", report.touched.into_iter().collect(), "eb-import")?;
    }
    Ok(())
}
