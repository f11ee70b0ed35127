//! Actor and service columns shared by rule and enforcement boundary
//! import/export.
//!
//! Each side of a policy object is one set of actors spread over several
//! columns (`src_labels`, `src_iplists`, ...). Every column reconciles its
//! own slice of the set, so a blank column leaves that slice alone. Labels
//! resolve through the inventory and may become placeholders; every other
//! reference must already exist.

use crate::commands::join_items;
use crate::core::error::{PceError, PceResult};
use crate::core::headers::{self as h, HeaderMap};
use crate::core::inventory::Inventory;
use crate::core::model::{Actor, IngressService};
use crate::core::reconcile::{self, Policy, Reconciled};
use serde_json::{Map, Value, json};
use std::collections::BTreeSet;

const ALL_WORKLOADS: &str = "ams";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActorKind {
    Label,
    LabelGroup,
    IpList,
    Workload,
    VirtualService,
    AllWorkloads,
}

impl ActorKind {
    fn field(&self) -> &'static str {
        match self {
            ActorKind::Label => "label",
            ActorKind::LabelGroup => "label_group",
            ActorKind::IpList => "ip_list",
            ActorKind::Workload => "workload",
            ActorKind::VirtualService => "virtual_service",
            ActorKind::AllWorkloads => "actors",
        }
    }

    fn key(&self, href: &str) -> String {
        format!("{}={}", self.field(), href)
    }

    fn owns(&self, key: &str) -> bool {
        match self {
            ActorKind::AllWorkloads => key == ALL_WORKLOADS,
            _ => key.starts_with(&format!("{}=", self.field())),
        }
    }
}

/// (column, kind) pairs for one side of a policy object.
pub type ActorColumns = &'static [(&'static str, ActorKind)];

pub const RULE_CONSUMERS: ActorColumns = &[
    (h::SRC_LABELS, ActorKind::Label),
    (h::SRC_LABEL_GROUPS, ActorKind::LabelGroup),
    (h::SRC_IPLISTS, ActorKind::IpList),
    (h::SRC_WORKLOADS, ActorKind::Workload),
    (h::SRC_ALL_WORKLOADS, ActorKind::AllWorkloads),
];

pub const RULE_PROVIDERS: ActorColumns = &[
    (h::DST_LABELS, ActorKind::Label),
    (h::DST_LABEL_GROUPS, ActorKind::LabelGroup),
    (h::DST_IPLISTS, ActorKind::IpList),
    (h::DST_WORKLOADS, ActorKind::Workload),
    (h::DST_ALL_WORKLOADS, ActorKind::AllWorkloads),
    (h::DST_VIRTUAL_SERVICES, ActorKind::VirtualService),
];

pub const BOUNDARY_CONSUMERS: ActorColumns = &[
    (h::SRC_LABELS, ActorKind::Label),
    (h::SRC_LABEL_GROUPS, ActorKind::LabelGroup),
    (h::SRC_IPLISTS, ActorKind::IpList),
    (h::SRC_ALL_WORKLOADS, ActorKind::AllWorkloads),
];

pub const BOUNDARY_PROVIDERS: ActorColumns = &[
    (h::DST_LABELS, ActorKind::Label),
    (h::DST_LABEL_GROUPS, ActorKind::LabelGroup),
    (h::DST_IPLISTS, ActorKind::IpList),
    (h::DST_ALL_WORKLOADS, ActorKind::AllWorkloads),
];

/// Canonical set key of an actor: `label=/orgs/1/labels/4`, `ams`, ...
pub fn actor_key(actor: &Actor) -> Option<String> {
    if actor.is_all_workloads() {
        return Some(ALL_WORKLOADS.to_string());
    }
    [
        (ActorKind::Label, &actor.label),
        (ActorKind::LabelGroup, &actor.label_group),
        (ActorKind::IpList, &actor.ip_list),
        (ActorKind::Workload, &actor.workload),
        (ActorKind::VirtualService, &actor.virtual_service),
    ]
    .into_iter()
    .find_map(|(kind, r)| r.as_ref().map(|r| kind.key(&r.href)))
}

pub fn actor_json(key: &str) -> Value {
    if key == ALL_WORKLOADS {
        return json!({ "actors": ALL_WORKLOADS });
    }
    match key.split_once('=') {
        Some((field, href)) => {
            let mut actor = Map::new();
            actor.insert(field.to_string(), json!({ "href": href }));
            Value::Object(actor)
        }
        None => json!({ "actors": key }),
    }
}

pub fn actors_json(keys: &BTreeSet<String>) -> Value {
    Value::Array(keys.iter().map(|k| actor_json(k)).collect())
}

fn resolve_actor(inv: &mut Inventory, kind: ActorKind, item: &str, line: usize) -> PceResult<String> {
    let missing = |what: &str| PceError::reference(line, format!("{} '{}' does not exist", what, item));
    let href = match kind {
        ActorKind::Label => {
            let (key, value) = reconcile::split_kv(item, line)?;
            inv.resolve_label(key, value)
        }
        ActorKind::LabelGroup => inv.label_group(item).map(|o| o.href.clone()).ok_or_else(|| missing("label group"))?,
        ActorKind::IpList => inv.ip_list(item).map(|o| o.href.clone()).ok_or_else(|| missing("IP list"))?,
        ActorKind::Workload => inv.workload(item).map(|w| w.href.clone()).ok_or_else(|| missing("workload"))?,
        ActorKind::VirtualService => inv
            .virtual_service(item)
            .map(|o| o.href.clone())
            .ok_or_else(|| missing("virtual service"))?,
        ActorKind::AllWorkloads => return Ok(ALL_WORKLOADS.to_string()),
    };
    Ok(kind.key(&href))
}

/// Reconcile one side of a policy object column by column.
pub fn reconcile_actors(
    inv: &mut Inventory,
    header: &HeaderMap,
    row: &[String],
    current: &[Actor],
    columns: ActorColumns,
    policy: &Policy,
) -> PceResult<Reconciled<BTreeSet<String>>> {
    let current: BTreeSet<String> = current.iter().filter_map(actor_key).collect();
    let mut changed = false;
    let mut value = BTreeSet::new();

    for &(column, kind) in columns {
        let slice: BTreeSet<String> = current.iter().filter(|k| kind.owns(k)).cloned().collect();
        if !header.has(column) {
            value.extend(slice);
            continue;
        }
        let cell = header.cell(row, column);
        if kind == ActorKind::AllWorkloads {
            let r = reconcile::boolean(!slice.is_empty(), cell, policy)?;
            changed |= r.changed;
            if r.value {
                value.insert(ALL_WORKLOADS.to_string());
            }
            continue;
        }
        let r = reconcile::set(&slice, cell, policy, |item| resolve_actor(inv, kind, item, policy.line))?;
        changed |= r.changed;
        value.extend(r.value);
    }
    Ok(Reconciled { changed, value })
}

/// Cell text for one actor column.
pub fn render_actors(inv: &Inventory, actors: &[Actor], kind: ActorKind) -> String {
    if kind == ActorKind::AllWorkloads {
        return actors.iter().any(Actor::is_all_workloads).to_string();
    }
    let names = actors.iter().filter_map(|a| {
        let href = match kind {
            ActorKind::Label => a.label.as_ref(),
            ActorKind::LabelGroup => a.label_group.as_ref(),
            ActorKind::IpList => a.ip_list.as_ref(),
            ActorKind::Workload => a.workload.as_ref(),
            ActorKind::VirtualService => a.virtual_service.as_ref(),
            ActorKind::AllWorkloads => None,
        }?
        .href
        .as_str();
        Some(match kind {
            ActorKind::Label => inv.label_key_value(href).unwrap_or_else(|| href.to_string()),
            ActorKind::LabelGroup => named(inv.label_groups.get(href).map(|o| o.name.as_str()), href),
            ActorKind::IpList => named(inv.ip_lists.get(href).map(|o| o.name.as_str()), href),
            ActorKind::VirtualService => named(inv.virtual_services.get(href).map(|o| o.name.as_str()), href),
            _ => named(inv.workloads.get(href).map(|w| w.display_name()), href),
        })
    });
    join_items(names)
}

fn named(name: Option<&str>, href: &str) -> String {
    name.unwrap_or(href).to_string()
}

/// Services as names (for service objects) or port syntax.
pub fn render_services(inv: &Inventory, services: &[IngressService]) -> String {
    join_items(services.iter().filter_map(|s| match &s.href {
        Some(href) => Some(named(inv.services.get(href).map(|s| s.name.as_str()), href)),
        None => reconcile::ingress_key(s),
    }))
}

/// The `services` column as a set of service hrefs and port forms.
pub fn reconcile_services(
    inv: &Inventory,
    current: &[IngressService],
    cell: &str,
    policy: &Policy,
) -> PceResult<Reconciled<Value>> {
    let current: BTreeSet<String> = current.iter().filter_map(reconcile::ingress_key).collect();
    let r = reconcile::set(&current, cell, policy, |item| {
        reconcile::resolve_service(inv, item, policy.line)
    })?;
    let value = r
        .value
        .iter()
        .map(|k| reconcile::ingress_json(k, policy.line))
        .collect::<PceResult<Vec<_>>>()?;
    Ok(Reconciled {
        changed: r.changed,
        value: Value::Array(value),
    })
}
