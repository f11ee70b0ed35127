//! `label-export` / `label-import`.

use crate::commands::{Context, ImportSettings, data_rows, read_csv};
use crate::core::api;
use crate::core::apply::ObjectWriter;
use crate::core::csvio::Row;
use crate::core::diff::{Diff, DiffEntry};
use crate::core::error::{PceError, PceResult};
use crate::core::headers::{self as h, HeaderMap};
use crate::core::inventory::{Inventory, LoadInput};
use crate::core::reconcile::{self, Policy};
use std::collections::BTreeSet;
use std::path::PathBuf;
use tracing::warn;

pub const EXPORT_HEADER: [&str; 5] = [h::HREF, h::KEY, h::VALUE, h::EXT_DATA_SET, h::EXT_DATA_REF];

#[derive(clap::Args, Debug)]
pub struct LabelExportArgs {
    #[clap(long)]
    pub output_file: Option<PathBuf>,
}

#[derive(clap::Args, Debug)]
pub struct LabelImportArgs {
    /// CSV with key and value columns.
    pub csv: PathBuf,
}

pub fn export_rows(inv: &Inventory) -> Vec<Row> {
    inv.labels
        .values()
        .map(|l| {
            vec![
                l.href.clone(),
                l.key.clone(),
                l.value.clone(),
                l.external_data_set.clone().unwrap_or_default(),
                l.external_data_reference.clone().unwrap_or_default(),
            ]
        })
        .collect()
}

pub fn run_export(ctx: &mut Context, args: LabelExportArgs) -> PceResult<()> {
    let input = LoadInput {
        labels: true,
        ..LoadInput::default()
    };
    let inv = Inventory::load(ctx.api, &input, "label-export")?;
    ctx.write_export("label-export", args.output_file, &EXPORT_HEADER, &export_rows(&inv))?;
    Ok(())
}

/// Rows with an href update that label; rows without one match on
/// `key`+`value` and create the label when it does not exist.
pub fn plan(
    inv: &mut Inventory,
    header: &HeaderMap,
    rows: &[Row],
    settings: &ImportSettings,
) -> PceResult<Diff> {
    header.require(&[h::KEY, h::VALUE])?;
    let mut diff = Diff::default();
    let mut seen = BTreeSet::new();

    for (line, row) in data_rows(rows) {
        let key = header.cell(row, h::KEY);
        let value = header.cell(row, h::VALUE);
        if key.is_empty() || value.is_empty() {
            return Err(PceError::validation(line, "key and value are required"));
        }
        if !seen.insert((key.to_string(), value.to_string())) {
            warn!(line, key, value, "duplicate label row; skipping");
            diff.skip();
            continue;
        }

        let href = header.cell(row, h::HREF);
        let existing = if href.is_empty() {
            inv.label_by_kv(key, value).cloned()
        } else {
            Some(inv.label(href).cloned().ok_or_else(|| {
                PceError::reference(line, format!("label {} does not exist", href))
            })?)
        };
        let creating = existing.is_none();
        let policy = Policy::new(&settings.remove_value, creating, line);
        let mut entry = DiffEntry::new(
            line,
            format!("{}:{}", key, value),
            existing.as_ref().map(|l| l.href.clone()),
        );

        match &existing {
            Some(label) if label.key != key => {
                return Err(PceError::validation(
                    line,
                    format!("label key cannot change ({} → {})", label.key, key),
                ));
            }
            Some(label) => {
                entry.track_string(
                    "value",
                    reconcile::scalar(Some(label.value.as_str()), value, &policy),
                );
            }
            None => {
                entry.patch.set("key", key);
                entry.patch.set("value", value);
                entry.changed = true;
            }
        }
        let current = existing.as_ref();
        entry.track_string(
            "external_data_set",
            reconcile::scalar(
                current.and_then(|l| l.external_data_set.as_deref()),
                header.cell(row, h::EXT_DATA_SET),
                &policy,
            ),
        );
        entry.track_string(
            "external_data_reference",
            reconcile::scalar(
                current.and_then(|l| l.external_data_reference.as_deref()),
                header.cell(row, h::EXT_DATA_REF),
                &policy,
            ),
        );
        diff.record(entry, true);
    }
    Ok(diff.finish(inv))
}

pub fn run_import(ctx: &mut Context, args: LabelImportArgs) -> PceResult<()> {
    let (header, rows) = read_csv(&args.csv)?;
    let input = LoadInput {
        labels: true,
        ..LoadInput::default()
    };
    let mut inv = Inventory::load(ctx.api, &input, "label-import")?;
    let diff = plan(&mut inv, &header, &rows, &ctx.settings)?;
    let writer = ObjectWriter {
        collection: api::org_path(ctx.api, "labels"),
        kind: "label",
    };
    ctx.apply(&mut inv, diff, &writer, "label-import")?;
    Ok(())
}
