//! `mode`: change workload enforcement and visibility from a CSV of
//! `href|hostname,enforcement,visibility`.

use crate::commands::{Context, ImportSettings, data_rows, read_csv};
use crate::core::apply::WorkloadWriter;
use crate::core::csvio::Row;
use crate::core::diff::{Diff, DiffEntry};
use crate::core::error::{PceError, PceResult};
use crate::core::headers::{self as h, HeaderMap};
use crate::core::inventory::{Inventory, LoadInput};
use crate::core::reconcile::{self, Policy};
use std::path::PathBuf;

#[derive(clap::Args, Debug)]
pub struct ModeArgs {
    pub csv: PathBuf,
}

pub fn plan(
    inv: &mut Inventory,
    header: &HeaderMap,
    rows: &[Row],
    settings: &ImportSettings,
) -> PceResult<Diff> {
    header.require_any(&[h::HREF, h::HOSTNAME])?;
    header.require_any(&[h::ENFORCEMENT, h::VISIBILITY])?;
    let mut diff = Diff::default();

    for (line, row) in data_rows(rows) {
        let key = [header.cell(row, h::HREF), header.cell(row, h::HOSTNAME)]
            .into_iter()
            .find(|s| !s.is_empty())
            .ok_or_else(|| PceError::validation(line, "href or hostname is required"))?;
        let workload = inv
            .workload(key)
            .cloned()
            .ok_or_else(|| PceError::reference(line, format!("workload '{}' does not exist", key)))?;
        let policy = Policy::new(&settings.remove_value, false, line);
        let mut entry = DiffEntry::new(line, workload.display_name(), Some(workload.href.clone()));
        entry.track_string(
            "enforcement_mode",
            reconcile::enforcement_mode(
                workload.enforcement_mode.as_deref(),
                header.cell(row, h::ENFORCEMENT),
                &policy,
            )?,
        );
        entry.track_string(
            "visibility_level",
            reconcile::visibility_level(
                workload.visibility_level.as_deref(),
                header.cell(row, h::VISIBILITY),
                &policy,
            )?,
        );
        diff.record(entry, false);
    }
    Ok(diff.finish(inv))
}

pub fn run(ctx: &mut Context, args: ModeArgs) -> PceResult<()> {
    let (header, rows) = read_csv(&args.csv)?;
    let input = LoadInput {
        workloads: true,
        ..LoadInput::default()
    };
    let mut inv = Inventory::load(ctx.api, &input, "mode")?;
    let diff = plan(&mut inv, &header, &rows, &ctx.settings)?;
    ctx.apply(&mut inv, diff, &WorkloadWriter, "mode")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::model::Workload;
    use serde_json::json;

    fn rows(lines: &[&[&str]]) -> Vec<Row> {
        lines
            .iter()
            .map(|l| l.iter().map(|c| c.to_string()).collect())
            .collect()
    }

    fn inventory() -> Inventory {
        let mut inv = Inventory::new("mode");
        inv.add_workload(Workload {
            href: "/orgs/1/workloads/1".into(),
            hostname: Some("web1".into()),
            enforcement_mode: Some("idle".into()),
            visibility_level: Some("flow_summary".into()),
            ..Workload::default()
        });
        inv
    }

    #[test]
    fn only_changed_modes_are_sent() {
        let mut inv = inventory();
        let rows = rows(&[
            &["hostname", "enforcement", "visibility"],
            &["web1", "full", "flow_summary"],
        ]);
        let header = HeaderMap::build(&rows[0]);
        let diff = plan(&mut inv, &header, &rows, &ImportSettings::default()).unwrap();
        assert_eq!(diff.updates[0].patch.bulk_body(), json!({
            "href": "/orgs/1/workloads/1",
            "enforcement_mode": "full"
        }));
    }

    #[test]
    fn bad_mode_reports_line() {
        let mut inv = inventory();
        let rows = rows(&[&["hostname", "enforcement"], &["web1", "full"], &["web1", "locked"]]);
        let header = HeaderMap::build(&rows[0]);
        let err = plan(&mut inv, &header, &rows, &ImportSettings::default()).unwrap_err();
        assert!(err.to_string().starts_with("CSV line 3:"));
    }

    #[test]
    fn unknown_workload_is_fatal() {
        let mut inv = inventory();
        let rows = rows(&[&["hostname", "enforcement"], &["db9", "full"]]);
        let header = HeaderMap::build(&rows[0]);
        assert!(matches!(
            plan(&mut inv, &header, &rows, &ImportSettings::default()),
            Err(PceError::ReferenceError { line: 2, .. })
        ));
    }
}
