//! `unpair`: unpair the VENs of the workloads listed in a CSV.

use crate::commands::{Context, data_rows, read_csv};
use crate::core::apply::UnpairWriter;
use crate::core::csvio::Row;
use crate::core::diff::{Diff, DiffEntry};
use crate::core::error::{PceError, PceResult};
use crate::core::headers::{self as h, HeaderMap};
use crate::core::inventory::{Inventory, LoadInput};
use std::collections::BTreeSet;
use std::path::PathBuf;
use tracing::warn;

/// Firewall state the VEN leaves behind.
#[derive(clap::ValueEnum, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Restore {
    /// Rules that were in place before pairing.
    #[default]
    Saved,
    /// The OS default firewall.
    Default,
    /// No firewall.
    Disable,
}

impl Restore {
    pub fn as_str(&self) -> &'static str {
        match self {
            Restore::Saved => "saved",
            Restore::Default => "default",
            Restore::Disable => "disable",
        }
    }
}

#[derive(clap::Args, Debug)]
pub struct UnpairArgs {
    /// CSV with an href or hostname column.
    pub csv: PathBuf,
    #[clap(long, value_enum, default_value_t = Restore::Saved)]
    pub restore: Restore,
}

/// One update entry per distinct VEN. Unmanaged workloads are skipped.
pub fn plan(inv: &Inventory, header: &HeaderMap, rows: &[Row], restore: Restore) -> PceResult<Diff> {
    header.require_any(&[h::HREF, h::HOSTNAME])?;
    let mut diff = Diff::default();
    let mut seen = BTreeSet::new();

    for (line, row) in data_rows(rows) {
        let key = [header.cell(row, h::HREF), header.cell(row, h::HOSTNAME)]
            .into_iter()
            .find(|s| !s.is_empty())
            .ok_or_else(|| PceError::validation(line, "href or hostname is required"))?;
        let workload = inv
            .workload(key)
            .ok_or_else(|| PceError::reference(line, format!("workload '{}' does not exist", key)))?;
        let Some(ven) = &workload.ven else {
            warn!(line, workload = workload.display_name(), "workload is unmanaged; skipping");
            diff.skip();
            continue;
        };
        if !seen.insert(ven.href.clone()) {
            diff.unchanged += 1;
            continue;
        }
        let mut entry = DiffEntry::new(line, workload.display_name(), Some(ven.href.clone()));
        entry.patch.set("firewall_restore", restore.as_str());
        entry.changed = true;
        diff.record(entry, false);
    }
    Ok(diff)
}

pub fn run(ctx: &mut Context, args: UnpairArgs) -> PceResult<()> {
    let (header, rows) = read_csv(&args.csv)?;
    let input = LoadInput {
        workloads: true,
        workload_query: vec![("managed".to_string(), "true".to_string())],
        ..LoadInput::default()
    };
    let mut inv = Inventory::load(ctx.api, &input, "unpair")?;
    let diff = plan(&inv, &header, &rows, args.restore)?;
    let writer = UnpairWriter {
        firewall_restore: args.restore.as_str().to_string(),
    };
    ctx.apply(&mut inv, diff, &writer, "unpair")?;
    Ok(())
}
