//! pcectl: CSV reconciliation for a segmentation control plane (PCE).
//!
//! **Export, edit in a spreadsheet, import the minimal diff.**
//!
//! Every `*-export` command loads objects from the PCE and writes them as
//! CSV. Every `*-import` command reads such a CSV back, compares each row
//! with the live object, and queues only the fields that actually differ.
//!
//! # Architecture
//!
//! - [`core::inventory`]: an in-memory, multi-key index of PCE objects
//!   loaded once per run.
//! - [`core::reconcile`]: the per-field comparison policy (blank keeps,
//!   the remove sentinel clears, anything else replaces).
//! - [`core::diff`]: rows partitioned into update, create and no-op.
//! - [`core::apply`]: summary, safety limits, confirmation, and the
//!   ordered writes (labels, then updates, then creates).
//! - [`commands`]: one module per object type, each a pure `plan` plus a
//!   thin `run` wrapper.
//!
//! Nothing is written to the PCE without `--update-pce`.

pub mod commands;
pub mod core;

mod cli;

use crate::cli::{Cli, Command};
use crate::commands::{Context, ImportSettings};
use crate::core::api::HttpPce;
use crate::core::apply::{ApplyOptions, Console, TerminalPrompt};
use crate::core::config::{ConfigFile, config_path};
use crate::core::error::PceResult;
use crate::core::logging;
use clap::Parser;
use tracing::debug;

/// Default cell value that clears a field on import.
pub const DEFAULT_REMOVE_VALUE: &str = "DELETE";

pub fn run() -> PceResult<()> {
    let cli = Cli::parse();
    let global = cli.global;

    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    let config = config_path();

    // Profile management never talks to a PCE and leaves no log file.
    match cli.command {
        Command::PceAdd(args) => return commands::pce::run_add(&config, args, &mut out),
        Command::PceList => return commands::pce::run_list(&config, &mut out),
        _ => {}
    }

    logging::init(global.verbose, &global.log_file)?;
    debug!(command = ?cli.command, "starting");

    let profile = ConfigFile::load(&config)?.resolve(global.pce.as_deref(), |k| std::env::var(k).ok())?;
    let api = HttpPce::new(&profile)?;
    let mut prompt = TerminalPrompt;

    let mut ctx = Context {
        api: &api,
        opts: ApplyOptions {
            update_pce: global.update_pce,
            no_prompt: global.no_prompt,
            max_create: global.max_create,
            max_update: global.max_update,
        },
        settings: ImportSettings {
            remove_value: global.remove_value,
        },
        console: Console {
            prompt: &mut prompt,
            out: &mut out,
        },
    };

    match cli.command {
        Command::PceAdd(_) | Command::PceList => Ok(()),
        Command::LabelExport(args) => commands::label::run_export(&mut ctx, args),
        Command::LabelImport(args) => commands::label::run_import(&mut ctx, args),
        Command::WkldExport(args) => commands::wkld::run_export(&mut ctx, args),
        Command::WkldImport(args) => commands::wkld::run_import(&mut ctx, args),
        Command::Mode(args) => commands::mode::run(&mut ctx, args),
        Command::Unpair(args) => commands::unpair::run(&mut ctx, args),
        Command::RuleExport(args) => commands::rule::run_export(&mut ctx, args),
        Command::RuleImport(args) => commands::rule::run_import(&mut ctx, args),
        Command::SvcExport(args) => commands::svc::run_export(&mut ctx, args),
        Command::SvcImport(args) => commands::svc::run_import(&mut ctx, args),
        Command::EbExport(args) => commands::eb::run_export(&mut ctx, args),
        Command::EbImport(args) => commands::eb::run_import(&mut ctx, args),
        Command::CwpExport(args) => commands::cwp::run_export(&mut ctx, args),
        Command::CwpImport(args) => commands::cwp::run_import(&mut ctx, args),
    }
}
