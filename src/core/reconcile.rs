//! Per-field comparison of a CSV cell against the current remote value.
//!
//! One policy applies to every field:
//! - a blank cell keeps the current value;
//! - the remove sentinel clears the field (a change unless already empty);
//! - any other value that differs from the current one is adopted;
//! - when the object is being created there is nothing to diff against, so
//!   every provided value counts as a change.
//!
//! Set-valued fields compare with symmetric difference and, when they
//! differ, the CSV set replaces the remote set in full.

use crate::core::error::{PceError, PceResult};
use crate::core::inventory::Inventory;
use crate::core::model::{ALL_PROTOCOLS, IngressService, Interface, ServicePort};
use regex::Regex;
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

/// Separates items inside one cell.
pub const ITEM_SEP: char = ';';
/// Separates key and value inside one item.
pub const KV_SEP: char = ':';

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reconciled<T> {
    pub changed: bool,
    pub value: T,
}

impl<T> Reconciled<T> {
    pub fn unchanged(value: T) -> Self {
        Self {
            changed: false,
            value,
        }
    }

    pub fn changed(value: T) -> Self {
        Self {
            changed: true,
            value,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Policy<'a> {
    pub remove_value: &'a str,
    pub creating: bool,
    pub line: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Cell<'c> {
    Blank,
    Remove,
    Value(&'c str),
}

impl<'a> Policy<'a> {
    pub fn new(remove_value: &'a str, creating: bool, line: usize) -> Self {
        Self {
            remove_value,
            creating,
            line,
        }
    }

    fn classify<'c>(&self, cell: &'c str) -> Cell<'c> {
        let cell = cell.trim();
        if cell.is_empty() {
            Cell::Blank
        } else if cell == self.remove_value {
            Cell::Remove
        } else {
            Cell::Value(cell)
        }
    }
}

fn non_empty(current: Option<&str>) -> Option<&str> {
    current.filter(|s| !s.is_empty())
}

/// Plain string field (hostname, name, description, external data, ...).
pub fn scalar(current: Option<&str>, cell: &str, policy: &Policy) -> Reconciled<Option<String>> {
    let current = non_empty(current);
    match policy.classify(cell) {
        Cell::Blank => Reconciled::unchanged(current.map(str::to_string)),
        Cell::Remove => {
            if current.is_some() {
                Reconciled::changed(None)
            } else {
                Reconciled::unchanged(None)
            }
        }
        Cell::Value(v) if policy.creating || current != Some(v) => {
            Reconciled::changed(Some(v.to_string()))
        }
        Cell::Value(v) => Reconciled::unchanged(Some(v.to_string())),
    }
}

pub fn parse_bool(cell: &str, line: usize) -> PceResult<bool> {
    match cell.trim().to_ascii_lowercase().as_str() {
        "true" | "yes" | "1" | "y" => Ok(true),
        "false" | "no" | "0" | "n" => Ok(false),
        other => Err(PceError::validation(
            line,
            format!("'{}' is not a boolean (use true or false)", other),
        )),
    }
}

/// Boolean field. The remove sentinel resets it to `false`.
pub fn boolean(current: bool, cell: &str, policy: &Policy) -> PceResult<Reconciled<bool>> {
    Ok(match policy.classify(cell) {
        Cell::Blank => Reconciled::unchanged(current),
        Cell::Remove => Reconciled {
            changed: current,
            value: false,
        },
        Cell::Value(v) => {
            let value = parse_bool(v, policy.line)?;
            Reconciled {
                changed: policy.creating || value != current,
                value,
            }
        }
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnforcementMode {
    Idle,
    VisibilityOnly,
    Selective,
    Full,
}

impl EnforcementMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            EnforcementMode::Idle => "idle",
            EnforcementMode::VisibilityOnly => "visibility_only",
            EnforcementMode::Selective => "selective",
            EnforcementMode::Full => "full",
        }
    }
}

impl FromStr for EnforcementMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace([' ', '-'], "_").as_str() {
            "idle" => Ok(EnforcementMode::Idle),
            "visibility_only" | "build" => Ok(EnforcementMode::VisibilityOnly),
            "selective" => Ok(EnforcementMode::Selective),
            "full" | "enforced" => Ok(EnforcementMode::Full),
            _ => Err(format!(
                "invalid enforcement mode '{}' (idle, visibility_only, selective, full)",
                s
            )),
        }
    }
}

impl fmt::Display for EnforcementMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VisibilityLevel {
    FlowFullDetail,
    FlowSummary,
    FlowDrops,
    FlowOff,
    EnhancedDataCollection,
}

impl VisibilityLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            VisibilityLevel::FlowFullDetail => "flow_full_detail",
            VisibilityLevel::FlowSummary => "flow_summary",
            VisibilityLevel::FlowDrops => "flow_drops",
            VisibilityLevel::FlowOff => "flow_off",
            VisibilityLevel::EnhancedDataCollection => "enhanced_data_collection",
        }
    }
}

impl FromStr for VisibilityLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace([' ', '-'], "_").as_str() {
            "flow_full_detail" => Ok(VisibilityLevel::FlowFullDetail),
            "flow_summary" => Ok(VisibilityLevel::FlowSummary),
            "flow_drops" => Ok(VisibilityLevel::FlowDrops),
            "flow_off" => Ok(VisibilityLevel::FlowOff),
            "enhanced_data_collection" => Ok(VisibilityLevel::EnhancedDataCollection),
            _ => Err(format!(
                "invalid visibility level '{}' (flow_full_detail, flow_summary, flow_drops, flow_off, enhanced_data_collection)",
                s
            )),
        }
    }
}

/// Validated enum field stored as its canonical string.
fn enumerated<T, F>(
    current: Option<&str>,
    cell: &str,
    policy: &Policy,
    render: F,
) -> PceResult<Reconciled<Option<String>>>
where
    T: FromStr<Err = String>,
    F: Fn(&T) -> &'static str,
{
    match policy.classify(cell) {
        Cell::Value(v) => {
            let parsed: T = v.parse().map_err(|e| PceError::validation(policy.line, e))?;
            Ok(scalar(current, render(&parsed), policy))
        }
        Cell::Remove => Err(PceError::validation(
            policy.line,
            format!("'{}' cannot clear a mode; give a value or leave it blank", cell.trim()),
        )),
        Cell::Blank => Ok(scalar(current, cell, policy)),
    }
}

pub fn enforcement_mode(
    current: Option<&str>,
    cell: &str,
    policy: &Policy,
) -> PceResult<Reconciled<Option<String>>> {
    enumerated::<EnforcementMode, _>(current, cell, policy, |m| m.as_str())
}

pub fn visibility_level(
    current: Option<&str>,
    cell: &str,
    policy: &Policy,
) -> PceResult<Reconciled<Option<String>>> {
    enumerated::<VisibilityLevel, _>(current, cell, policy, |v| v.as_str())
}

/// Split a cell on `;`, dropping empty items.
pub fn split_items(cell: &str) -> Vec<&str> {
    cell.split(ITEM_SEP)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect()
}

/// Split `key:value`, splitting on the first `:` only.
pub fn split_kv(item: &str, line: usize) -> PceResult<(&str, &str)> {
    match item.split_once(KV_SEP) {
        Some((k, v)) if !k.trim().is_empty() && !v.trim().is_empty() => Ok((k.trim(), v.trim())),
        _ => Err(PceError::validation(
            line,
            format!("'{}' is not in key{}value form", item, KV_SEP),
        )),
    }
}

/// One label dimension. `current_href` is the object's label for `key`.
///
/// Values are compared, not hrefs, so an unchanged value never touches the
/// inventory. A new value resolves through the inventory and may produce a
/// placeholder href.
pub fn label(
    inv: &mut Inventory,
    current_href: Option<&str>,
    key: &str,
    cell: &str,
    policy: &Policy,
) -> Reconciled<Option<String>> {
    let current_value = current_href
        .and_then(|h| inv.label(h))
        .map(|l| l.value.clone());
    match policy.classify(cell) {
        Cell::Blank => Reconciled::unchanged(current_href.map(str::to_string)),
        Cell::Remove => Reconciled {
            changed: current_href.is_some(),
            value: None,
        },
        Cell::Value(v) if !policy.creating && current_value.as_deref() == Some(v) => {
            Reconciled::unchanged(current_href.map(str::to_string))
        }
        Cell::Value(v) => Reconciled::changed(Some(inv.resolve_label(key, v))),
    }
}

/// Set-valued field. Every `;`-separated item is mapped through `resolve`
/// (name → href, `port/proto` → canonical form, ...) before comparing.
pub fn set<F>(
    current: &BTreeSet<String>,
    cell: &str,
    policy: &Policy,
    mut resolve: F,
) -> PceResult<Reconciled<BTreeSet<String>>>
where
    F: FnMut(&str) -> PceResult<String>,
{
    match policy.classify(cell) {
        Cell::Blank => Ok(Reconciled::unchanged(current.clone())),
        Cell::Remove => Ok(Reconciled {
            changed: !current.is_empty(),
            value: BTreeSet::new(),
        }),
        Cell::Value(v) => {
            let declared = split_items(v)
                .into_iter()
                .map(&mut resolve)
                .collect::<PceResult<BTreeSet<String>>>()?;
            let differs = declared.symmetric_difference(current).next().is_some();
            Ok(Reconciled {
                changed: policy.creating || differs,
                value: declared,
            })
        }
    }
}

static INTERFACE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?P<name>[^:]+)(?::(?P<addr>[0-9A-Fa-f.:]+?)(?:/(?P<cidr>\d{1,3}))?)?$")
        .expect("interface regex")
});

pub fn parse_interface(item: &str, line: usize) -> PceResult<Interface> {
    let caps = INTERFACE_RE.captures(item.trim()).ok_or_else(|| {
        PceError::validation(
            line,
            format!("interface '{}' must look like eth0[:10.0.0.5[/24]]", item),
        )
    })?;
    let cidr_block = match caps.name("cidr") {
        Some(c) => Some(c.as_str().parse::<u8>().map_err(|_| {
            PceError::validation(line, format!("invalid prefix length in '{}'", item))
        })?),
        None => None,
    };
    Ok(Interface {
        name: caps["name"].trim().to_string(),
        address: caps.name("addr").map(|a| a.as_str().to_string()),
        cidr_block,
    })
}

/// Interfaces reconcile as a set of their rendered `name:addr/cidr` form.
pub fn interfaces(
    current: &[Interface],
    cell: &str,
    policy: &Policy,
) -> PceResult<Reconciled<Vec<Interface>>> {
    let current_set: BTreeSet<String> = current.iter().map(Interface::render).collect();
    let reconciled = set(&current_set, cell, policy, |item| {
        parse_interface(item, policy.line).map(|i| i.render())
    })?;
    if !reconciled.changed {
        return Ok(Reconciled::unchanged(current.to_vec()));
    }
    let value = reconciled
        .value
        .iter()
        .map(|item| parse_interface(item, policy.line))
        .collect::<PceResult<Vec<_>>>()?;
    Ok(Reconciled::changed(value))
}

static PORT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?P<port>\d{1,5})(?:-(?P<to>\d{1,5}))?\s*[/ ]\s*(?P<proto>[A-Za-z]+|\d{1,3})$")
        .expect("port regex")
});

/// A protocol without a port: `tcp`, `all`, `proto:47`, `icmp:8`, `icmp:3:1`.
static PROTO_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^(?P<proto>tcp|udp|icmpv6|icmp|all|proto:\d{1,3})(?::(?P<type>\d{1,3})(?::(?P<code>\d{1,3}))?)?$")
        .expect("protocol regex")
});

fn proto_number(proto: &str) -> Option<i16> {
    let proto = proto.to_ascii_lowercase();
    match proto.as_str() {
        "tcp" => Some(6),
        "udp" => Some(17),
        "icmp" => Some(1),
        "icmpv6" => Some(58),
        "all" => Some(ALL_PROTOCOLS),
        n => n
            .strip_prefix("proto:")
            .unwrap_or(n)
            .parse::<u8>()
            .ok()
            .map(i16::from),
    }
}

fn proto_name(proto: i16) -> Option<&'static str> {
    match proto {
        6 => Some("tcp"),
        17 => Some("udp"),
        1 => Some("icmp"),
        58 => Some("icmpv6"),
        ALL_PROTOCOLS => Some("all"),
        _ => None,
    }
}

fn is_icmp(proto: i16) -> bool {
    matches!(proto, 1 | 58)
}

/// Parse `443/tcp`, `8000-8080/udp`, a bare protocol (`tcp`, `all`,
/// `proto:47`) or an ICMP type and code (`icmp:8`, `icmpv6:1:4`).
pub fn parse_port(item: &str, line: usize) -> PceResult<ServicePort> {
    let item = item.trim();
    let invalid = || {
        PceError::validation(
            line,
            format!(
                "'{}' is not a port (use 443/tcp, 8000-8080/udp, tcp, icmp:8 or all)",
                item
            ),
        )
    };

    if let Some(caps) = PROTO_RE.captures(item) {
        let small = |group: &str| -> PceResult<Option<u8>> {
            caps.name(group)
                .map(|m| m.as_str().parse::<u8>().map_err(|_| invalid()))
                .transpose()
        };
        let proto = proto_number(&caps["proto"]).ok_or_else(invalid)?;
        let icmp_type = small("type")?;
        let icmp_code = small("code")?;
        if icmp_type.is_some() && !is_icmp(proto) {
            return Err(invalid());
        }
        return Ok(ServicePort {
            proto,
            icmp_type,
            icmp_code,
            ..ServicePort::default()
        });
    }

    let caps = PORT_RE.captures(item).ok_or_else(invalid)?;
    let port: u16 = caps["port"].parse().map_err(|_| invalid())?;
    let to_port = match caps.name("to") {
        Some(t) => Some(t.as_str().parse::<u16>().map_err(|_| invalid())?),
        None => None,
    };
    if matches!(to_port, Some(t) if t <= port) {
        return Err(invalid());
    }
    let proto = proto_number(&caps["proto"])
        .filter(|p| *p != ALL_PROTOCOLS)
        .ok_or_else(invalid)?;
    Ok(ServicePort {
        port: Some(port),
        to_port,
        proto,
        ..ServicePort::default()
    })
}

pub fn is_port(item: &str) -> bool {
    parse_port(item, 0).is_ok()
}

/// Inverse of [`parse_port`]: every rendered form parses back to the same
/// port.
pub fn render_port(port: &ServicePort) -> String {
    let proto = match proto_name(port.proto) {
        Some(name) => name.to_string(),
        None if port.port.is_some() => port.proto.to_string(),
        None => format!("proto:{}", port.proto),
    };
    match (port.port, port.to_port) {
        (Some(p), Some(t)) => format!("{}-{}/{}", p, t, proto),
        (Some(p), None) => format!("{}/{}", p, proto),
        (None, _) => match (port.icmp_type, port.icmp_code) {
            (Some(t), Some(c)) if is_icmp(port.proto) => format!("{}:{}:{}", proto, t, c),
            (Some(t), None) if is_icmp(port.proto) => format!("{}:{}", proto, t),
            _ => proto,
        },
    }
}

/// Canonical set key of an ingress service: its href, or its port form.
pub fn ingress_key(service: &IngressService) -> Option<String> {
    if let Some(href) = &service.href {
        return Some(href.clone());
    }
    service.proto.map(|proto| {
        render_port(&ServicePort {
            port: service.port,
            to_port: service.to_port,
            proto,
            icmp_type: service.icmp_type,
            icmp_code: service.icmp_code,
        })
    })
}

/// Map one `services` item to its canonical key: port syntax first, then
/// service name. Unknown service names are fatal.
pub fn resolve_service(inv: &Inventory, item: &str, line: usize) -> PceResult<String> {
    if is_port(item) {
        return parse_port(item, line).map(|p| render_port(&p));
    }
    inv.service(item)
        .map(|s| s.href.clone())
        .ok_or_else(|| PceError::reference(line, format!("service '{}' does not exist", item)))
}

/// JSON form of a canonical service key for `ingress_services`.
pub fn ingress_json(key: &str, line: usize) -> PceResult<serde_json::Value> {
    if key.starts_with('/') {
        return Ok(serde_json::json!({ "href": key }));
    }
    let port = parse_port(key, line)?;
    let mut obj = serde_json::json!({ "proto": port.proto });
    if let Some(p) = port.port {
        obj["port"] = p.into();
    }
    if let Some(t) = port.to_port {
        obj["to_port"] = t.into();
    }
    if let Some(t) = port.icmp_type {
        obj["icmp_type"] = t.into();
    }
    if let Some(c) = port.icmp_code {
        obj["icmp_code"] = c.into();
    }
    Ok(obj)
}
