//! CLI struct definitions for the pcectl command-line interface.
//!
//! All clap-derived top-level types live here. Per-command argument structs
//! live next to their implementation in `commands/`.

use crate::commands::{cwp, eb, label, mode, pce, rule, svc, unpair, wkld};
use crate::core::logging::DEFAULT_LOG_FILE;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[clap(
    name = "pcectl",
    version = env!("CARGO_PKG_VERSION"),
    about = "Export PCE objects to CSV, edit them, and reconcile the CSV back into the PCE."
)]
pub(crate) struct Cli {
    #[clap(flatten)]
    pub global: GlobalArgs,
    #[clap(subcommand)]
    pub command: Command,
}

#[derive(clap::Args, Debug)]
pub(crate) struct GlobalArgs {
    /// PCE profile from the config file (defaults to the configured default).
    #[clap(long, global = true)]
    pub pce: Option<String>,
    /// Push changes to the PCE. Without it every import is a dry run.
    #[clap(long, global = true)]
    pub update_pce: bool,
    /// Skip the confirmation prompt (requires --update-pce to matter).
    #[clap(long, global = true)]
    pub no_prompt: bool,
    /// Cell value that clears a field.
    #[clap(long, global = true, default_value = crate::DEFAULT_REMOVE_VALUE)]
    pub remove_value: String,
    /// Abort before applying if more than this many objects would be created.
    #[clap(long, global = true)]
    pub max_create: Option<usize>,
    /// Abort before applying if more than this many objects would be updated.
    #[clap(long, global = true)]
    pub max_update: Option<usize>,
    /// Debug-level logging.
    #[clap(long, short = 'v', global = true)]
    pub verbose: bool,
    #[clap(long, global = true, default_value = DEFAULT_LOG_FILE)]
    pub log_file: PathBuf,
}

#[derive(Subcommand, Debug)]
pub(crate) enum Command {
    /// Add or replace a PCE profile in the config file
    PceAdd(pce::PceAddArgs),
    /// List configured PCE profiles
    PceList,
    /// Export labels
    LabelExport(label::LabelExportArgs),
    /// Create or update labels from a CSV
    LabelImport(label::LabelImportArgs),
    /// Export workloads
    WkldExport(wkld::WkldExportArgs),
    /// Create or update workloads from a CSV
    WkldImport(wkld::WkldImportArgs),
    /// Change workload enforcement and visibility from a CSV
    Mode(mode::ModeArgs),
    /// Unpair the VENs of the workloads in a CSV
    Unpair(unpair::UnpairArgs),
    /// Export rules across rulesets
    RuleExport(rule::RuleExportArgs),
    /// Create or update rules from a CSV
    RuleImport(rule::RuleImportArgs),
    /// Export services
    SvcExport(svc::SvcExportArgs),
    /// Create or update services from a CSV
    SvcImport(svc::SvcImportArgs),
    /// Export enforcement boundaries
    EbExport(eb::EbExportArgs),
    /// Create or update enforcement boundaries from a CSV
    EbImport(eb::EbImportArgs),
    /// Export container workload profiles
    CwpExport(cwp::CwpExportArgs),
    /// Update container workload profiles from a CSV
    CwpImport(cwp::CwpImportArgs),
}
