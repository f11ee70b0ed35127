//! One module per object type. Each import splits into a pure `plan`
//! (CSV rows + inventory → [`Diff`]) and a `run` that loads, plans and hands
//! the diff to [`apply::execute`]. Exports load, render rows and write CSV.
//!
//! [`Diff`]: crate::core::diff::Diff

pub mod cwp;
pub mod eb;
pub mod label;
pub mod mode;
pub mod pce;
pub mod policy;
pub mod rule;
pub mod svc;
pub mod unpair;
pub mod wkld;

use crate::core::api::{self, PceApi};
use crate::core::apply::{self, ApplyOptions, ApplyReport, Console, Writer};
use crate::core::csvio::{self, Row};
use crate::core::diff::Diff;
use crate::core::error::PceResult;
use crate::core::headers::HeaderMap;
use crate::core::inventory::Inventory;
use crate::core::output;
use serde_json::{Map, Value, json};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use tracing::info;

/// Settings shared by every import, taken from the global flags.
#[derive(Debug, Clone)]
pub struct ImportSettings {
    pub remove_value: String,
}

impl Default for ImportSettings {
    fn default() -> Self {
        Self {
            remove_value: crate::DEFAULT_REMOVE_VALUE.to_string(),
        }
    }
}

/// Everything a command needs for one run.
pub struct Context<'a> {
    pub api: &'a dyn PceApi,
    pub opts: ApplyOptions,
    pub settings: ImportSettings,
    pub console: Console<'a>,
}

impl Context<'_> {
    pub fn apply(
        &mut self,
        inv: &mut Inventory,
        diff: Diff,
        writer: &dyn Writer,
        command: &str,
    ) -> PceResult<ApplyReport> {
        apply::execute(self.api, inv, diff, writer, &self.opts, &mut self.console, command)
    }

    /// Write an export and tell the operator where it went.
    pub fn write_export(
        &mut self,
        command: &str,
        output_file: Option<PathBuf>,
        header: &[&str],
        rows: &[Row],
    ) -> PceResult<PathBuf> {
        let path = output::export_file_name(command, output_file);
        csvio::write_file(&path, header, rows)?;
        info!(command, rows = rows.len(), path = %path.display(), "export written");
        output::print_done(
            self.console.out,
            &format!("{} row(s) written to {}", rows.len(), path.display()),
        )?;
        Ok(path)
    }

    /// POST a provisioning request covering `hrefs` under `kind`.
    pub fn provision(&mut self, kind: &str, hrefs: BTreeSet<String>, command: &str) -> PceResult<()> {
        if hrefs.is_empty() {
            return Ok(());
        }
        let items: Vec<Value> = hrefs.iter().map(|h| json!({ "href": h })).collect();
        let mut subset = Map::new();
        subset.insert(kind.to_string(), Value::Array(items));
        api::provision(self.api, Value::Object(subset), &format!("pcectl {}", command))?;
        output::print_done(
            self.console.out,
            &format!("provisioned {} {}", hrefs.len(), kind),
        )
    }
}

/// Read a CSV file and map its header row.
pub fn read_csv(path: &Path) -> PceResult<(HeaderMap, Vec<Row>)> {
    let rows = csvio::read_rows(path)?;
    let header = HeaderMap::build(&rows[0]);
    Ok((header, rows))
}

/// Data rows with their 1-based file line numbers, blank rows dropped.
pub fn data_rows(rows: &[Row]) -> impl Iterator<Item = (usize, &Row)> {
    rows.iter()
        .enumerate()
        .skip(1)
        .filter(|(_, row)| !csvio::is_blank(row))
        .map(|(i, row)| (csvio::line_number(i), row))
}

pub fn join_items<I: IntoIterator<Item = String>>(items: I) -> String {
    items.into_iter().collect::<Vec<_>>().join(";")
}
