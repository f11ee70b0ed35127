//! Confirmation and apply.
//!
//! Nothing mutates the PCE unless `--update-pce` is set. With it, the
//! operator must type `yes` unless `--no-prompt` is also given. Placeholder
//! labels are created first, then queued entities are rewritten to the real
//! hrefs, then updates run, then creates. Any API error aborts the run.

use crate::core::api::{self, PceApi};
use crate::core::diff::{Diff, DiffEntry};
use crate::core::error::{PceError, PceResult};
use crate::core::inventory::Inventory;
use crate::core::output;
use serde_json::{Value, json};
use std::collections::HashMap;
use std::io::{self, BufRead, IsTerminal, Write};
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyState {
    DryRun,
    PromptPending,
    Applying,
}

impl ApplyState {
    pub fn from_flags(update_pce: bool, no_prompt: bool) -> Self {
        match (update_pce, no_prompt) {
            (false, _) => ApplyState::DryRun,
            (true, false) => ApplyState::PromptPending,
            (true, true) => ApplyState::Applying,
        }
    }

    /// Resolve a pending prompt. Only `yes` (any case) moves to Applying.
    pub fn answer(self, answer: &str) -> Option<Self> {
        match self {
            ApplyState::PromptPending if answer.trim().eq_ignore_ascii_case("yes") => {
                Some(ApplyState::Applying)
            }
            ApplyState::PromptPending => None,
            other => Some(other),
        }
    }
}

/// Where the operator's answer to the apply question comes from.
pub trait Prompt {
    fn ask(&mut self, question: &str) -> PceResult<String>;
}

/// Type-to-confirm prompt on the controlling terminal. With stdin
/// redirected, one line is read from it instead; end of input is an empty
/// answer.
pub struct TerminalPrompt;

impl Prompt for TerminalPrompt {
    fn ask(&mut self, question: &str) -> PceResult<String> {
        let question = format!("{} Type 'yes' to confirm", question);
        if !(io::stdin().is_terminal() && io::stderr().is_terminal()) {
            eprint!("{}: ", question);
            let mut answer = String::new();
            io::stdin().lock().read_line(&mut answer)?;
            return Ok(answer);
        }
        let answer = dialoguer::Input::<String>::new()
            .with_prompt(question)
            .allow_empty(true)
            .interact_text()?;
        Ok(answer)
    }
}

/// Ask once. Only `yes` (any case) confirms.
pub fn confirm(prompt: &mut dyn Prompt, question: &str) -> PceResult<bool> {
    let answer = prompt.ask(question)?;
    Ok(ApplyState::PromptPending.answer(&answer) == Some(ApplyState::Applying))
}

#[derive(Debug, Clone, Default)]
pub struct ApplyOptions {
    pub update_pce: bool,
    pub no_prompt: bool,
    pub max_create: Option<usize>,
    pub max_update: Option<usize>,
}

impl ApplyOptions {
    pub fn state(&self) -> ApplyState {
        ApplyState::from_flags(self.update_pce, self.no_prompt)
    }

    pub fn check_limits(&self, diff: &Diff) -> PceResult<()> {
        if let Some(max) = self.max_update
            && diff.updates.len() > max
        {
            return Err(PceError::SafetyLimit(format!(
                "{} updates exceed --max-update {}",
                diff.updates.len(),
                max
            )));
        }
        if let Some(max) = self.max_create
            && diff.creates.len() > max
        {
            return Err(PceError::SafetyLimit(format!(
                "{} creates exceed --max-create {}",
                diff.creates.len(),
                max
            )));
        }
        Ok(())
    }
}

/// Where a run asks for confirmation and writes its summaries.
pub struct Console<'a> {
    pub prompt: &'a mut dyn Prompt,
    pub out: &'a mut dyn Write,
}

/// How a command pushes its queued entries. Both methods return the hrefs
/// they touched.
pub trait Writer {
    fn update(&self, api: &dyn PceApi, entries: &[DiffEntry]) -> PceResult<Vec<String>>;
    fn create(&self, api: &dyn PceApi, entries: &[DiffEntry]) -> PceResult<Vec<String>>;
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ApplyReport {
    pub applied: bool,
    pub updated: usize,
    pub created: usize,
    pub labels_created: usize,
    pub touched: Vec<String>,
}

/// Summarize, gate, and apply `diff`.
pub fn execute(
    api: &dyn PceApi,
    inv: &mut Inventory,
    mut diff: Diff,
    writer: &dyn Writer,
    opts: &ApplyOptions,
    console: &mut Console,
    command: &str,
) -> PceResult<ApplyReport> {
    output::print_summary(console.out, command, &diff)?;
    opts.check_limits(&diff)?;

    if !diff.has_work() {
        info!(command, unchanged = diff.unchanged, "nothing to apply");
        return Ok(ApplyReport::default());
    }

    match opts.state() {
        ApplyState::DryRun => {
            writeln!(console.out, "dry run: re-run with --update-pce to apply")?;
            info!(command, updates = diff.updates.len(), creates = diff.creates.len(), "dry run");
            return Ok(ApplyReport::default());
        }
        ApplyState::PromptPending => {
            let question = format!(
                "Apply {} update(s) and {} create(s) to the PCE?",
                diff.updates.len(),
                diff.creates.len()
            );
            if !confirm(console.prompt, &question)? {
                writeln!(console.out, "aborted: no changes made")?;
                info!(command, "operator declined");
                return Ok(ApplyReport::default());
            }
        }
        ApplyState::Applying => {}
    }

    let mut real = HashMap::new();
    for pending in &diff.new_labels {
        let label = api::create_label(api, &pending.key, &pending.value)?;
        real.insert(pending.placeholder.clone(), label.href.clone());
        inv.register_created_label(label);
    }
    for entry in diff.updates.iter_mut().chain(diff.creates.iter_mut()) {
        entry.patch.substitute_hrefs(&real);
    }

    let mut touched = Vec::new();
    if !diff.updates.is_empty() {
        touched.extend(writer.update(api, &diff.updates)?);
    }
    if !diff.creates.is_empty() {
        touched.extend(writer.create(api, &diff.creates)?);
    }

    let report = ApplyReport {
        applied: true,
        updated: diff.updates.len(),
        created: diff.creates.len(),
        labels_created: real.len(),
        touched,
    };
    output::print_done(
        console.out,
        &format!(
            "{} updated, {} created, {} label(s) created",
            report.updated, report.created, report.labels_created
        ),
    )?;
    Ok(report)
}

/// Workloads go through the bulk endpoints.
pub struct WorkloadWriter;

impl Writer for WorkloadWriter {
    fn update(&self, api: &dyn PceApi, entries: &[DiffEntry]) -> PceResult<Vec<String>> {
        let items = entries.iter().map(|e| e.patch.bulk_body()).collect();
        api::bulk_workloads(api, "bulk_update", items)?;
        for e in entries {
            info!(line = e.line, href = e.href().unwrap_or_default(), "updated workload");
        }
        Ok(entries.iter().filter_map(|e| e.href().map(str::to_string)).collect())
    }

    fn create(&self, api: &dyn PceApi, entries: &[DiffEntry]) -> PceResult<Vec<String>> {
        let items = entries.iter().map(|e| e.patch.body()).collect();
        let results = api::bulk_workloads(api, "bulk_create", items)?;
        let hrefs: Vec<String> = results.into_iter().filter_map(|r| r.href).collect();
        for (e, href) in entries.iter().zip(hrefs.iter()) {
            info!(line = e.line, href = %href, "created workload");
        }
        Ok(hrefs)
    }
}

/// Policy objects and labels: PUT to the href, POST to the collection.
pub struct ObjectWriter {
    pub collection: String,
    pub kind: &'static str,
}

impl Writer for ObjectWriter {
    fn update(&self, api: &dyn PceApi, entries: &[DiffEntry]) -> PceResult<Vec<String>> {
        let mut touched = Vec::with_capacity(entries.len());
        for e in entries {
            let Some(href) = e.href() else { continue };
            api.put(href, &api::without_href(e.patch.body()))?;
            info!(line = e.line, href, kind = self.kind, "updated");
            touched.push(href.to_string());
        }
        Ok(touched)
    }

    fn create(&self, api: &dyn PceApi, entries: &[DiffEntry]) -> PceResult<Vec<String>> {
        let mut touched = Vec::with_capacity(entries.len());
        for e in entries {
            let path = e.patch.parent.as_deref().unwrap_or(&self.collection);
            let created = api.post(path, &e.patch.body())?;
            let href = created["href"]
                .as_str()
                .filter(|h| !h.is_empty())
                .ok_or_else(|| PceError::ApiError {
                    status: 200,
                    path: path.to_string(),
                    message: format!("created {} for CSV line {} has no href", self.kind, e.line),
                })?
                .to_string();
            info!(line = e.line, href = %href, kind = self.kind, "created");
            touched.push(href);
        }
        Ok(touched)
    }
}

/// VEN unpair. Each update entry's href is a VEN href.
pub struct UnpairWriter {
    pub firewall_restore: String,
}

impl Writer for UnpairWriter {
    fn update(&self, api: &dyn PceApi, entries: &[DiffEntry]) -> PceResult<Vec<String>> {
        let path = api::org_path(api, "vens/unpair");
        let hrefs: Vec<String> = entries.iter().filter_map(|e| e.href().map(str::to_string)).collect();
        for chunk in hrefs.chunks(api::BULK_CHUNK) {
            let vens: Vec<Value> = chunk.iter().map(|h| json!({ "href": h })).collect();
            api.put(
                &path,
                &json!({ "vens": vens, "firewall_restore": self.firewall_restore }),
            )?;
            info!(count = chunk.len(), restore = %self.firewall_restore, "unpaired VENs");
        }
        Ok(hrefs)
    }

    fn create(&self, _api: &dyn PceApi, _entries: &[DiffEntry]) -> PceResult<Vec<String>> {
        Ok(Vec::new())
    }
}
