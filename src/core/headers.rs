//! CSV header mapping.
//!
//! Headers are matched case-insensitively and with `_`, `-`, `.` and spaces
//! ignored, then run through a synonym table, so `Host Name`, `host_name`
//! and `host` all land on [`HOSTNAME`]. Headers that match nothing are
//! ignored so that extra spreadsheet columns never break an import.

use crate::core::error::{PceError, PceResult};
use rustc_hash::FxHashMap;

pub const HREF: &str = "href";
pub const HOSTNAME: &str = "hostname";
pub const NAME: &str = "name";
pub const DESCRIPTION: &str = "description";
pub const ROLE: &str = "role";
pub const APP: &str = "app";
pub const ENV: &str = "env";
pub const LOC: &str = "loc";
pub const INTERFACES: &str = "interfaces";
pub const PUBLIC_IP: &str = "public_ip";
pub const ENFORCEMENT: &str = "enforcement";
pub const VISIBILITY: &str = "visibility";
pub const OS_ID: &str = "os_id";
pub const OS_DETAIL: &str = "os_detail";
pub const DATACENTER: &str = "datacenter";
pub const EXT_DATA_SET: &str = "external_data_set";
pub const EXT_DATA_REF: &str = "external_data_reference";
pub const MANAGED: &str = "managed";
pub const ONLINE: &str = "online";
pub const KEY: &str = "key";
pub const VALUE: &str = "value";
pub const RULESET_NAME: &str = "ruleset_name";
pub const RULE_HREF: &str = "rule_href";
pub const RULE_ENABLED: &str = "rule_enabled";
pub const UNSCOPED_CONSUMERS: &str = "unscoped_consumers";
pub const SRC_LABELS: &str = "src_labels";
pub const SRC_LABEL_GROUPS: &str = "src_label_groups";
pub const SRC_IPLISTS: &str = "src_iplists";
pub const SRC_WORKLOADS: &str = "src_workloads";
pub const SRC_ALL_WORKLOADS: &str = "src_all_workloads";
pub const SRC_USER_GROUPS: &str = "src_user_groups";
pub const DST_LABELS: &str = "dst_labels";
pub const DST_LABEL_GROUPS: &str = "dst_label_groups";
pub const DST_IPLISTS: &str = "dst_iplists";
pub const DST_WORKLOADS: &str = "dst_workloads";
pub const DST_ALL_WORKLOADS: &str = "dst_all_workloads";
pub const DST_VIRTUAL_SERVICES: &str = "dst_virtual_services";
pub const SERVICES: &str = "services";
pub const MACHINE_AUTH: &str = "machine_auth";
pub const SEC_CONNECT: &str = "sec_connect";
pub const STATELESS: &str = "stateless";
pub const PORTS: &str = "ports";
pub const CLUSTER: &str = "cluster";
pub const NAMESPACE: &str = "namespace";

/// The four label dimensions every workload-like import understands.
pub const LABEL_KEYS: [&str; 4] = [ROLE, APP, ENV, LOC];

/// (normalized alias, canonical field). Canonical names are added
/// automatically by [`canonical`], so only true synonyms are listed.
const SYNONYMS: &[(&str, &str)] = &[
    ("host", HOSTNAME),
    ("hostnames", HOSTNAME),
    ("fqdn", HOSTNAME),
    ("workloadname", NAME),
    ("wkldname", NAME),
    ("desc", DESCRIPTION),
    ("roles", ROLE),
    ("application", APP),
    ("apps", APP),
    ("environment", ENV),
    ("location", LOC),
    ("interface", INTERFACES),
    ("ifaces", INTERFACES),
    ("ips", INTERFACES),
    ("ipaddresses", INTERFACES),
    ("publicip", PUBLIC_IP),
    ("enforcementmode", ENFORCEMENT),
    ("mode", ENFORCEMENT),
    ("visibilitylevel", VISIBILITY),
    ("os", OS_ID),
    ("dc", DATACENTER),
    ("datacentre", DATACENTER),
    ("extdataset", EXT_DATA_SET),
    ("extdataref", EXT_DATA_REF),
    ("externaldataref", EXT_DATA_REF),
    ("workloadhref", HREF),
    ("wkldhref", HREF),
    ("labelkey", KEY),
    ("labelvalue", VALUE),
    ("ruleset", RULESET_NAME),
    ("enabled", RULE_ENABLED),
    ("consumerlabels", SRC_LABELS),
    ("consumerlabelgroups", SRC_LABEL_GROUPS),
    ("consumeriplists", SRC_IPLISTS),
    ("consumerworkloads", SRC_WORKLOADS),
    ("consumerallworkloads", SRC_ALL_WORKLOADS),
    ("consumerusergroups", SRC_USER_GROUPS),
    ("providerlabels", DST_LABELS),
    ("providerlabelgroups", DST_LABEL_GROUPS),
    ("provideriplists", DST_IPLISTS),
    ("providerworkloads", DST_WORKLOADS),
    ("providerallworkloads", DST_ALL_WORKLOADS),
    ("providervirtualservices", DST_VIRTUAL_SERVICES),
    ("service", SERVICES),
    ("svc", SERVICES),
    ("serviceports", PORTS),
    ("containercluster", CLUSTER),
    ("clustername", CLUSTER),
    ("ns", NAMESPACE),
];

const CANONICAL: &[&str] = &[
    HREF,
    HOSTNAME,
    NAME,
    DESCRIPTION,
    ROLE,
    APP,
    ENV,
    LOC,
    INTERFACES,
    PUBLIC_IP,
    ENFORCEMENT,
    VISIBILITY,
    OS_ID,
    OS_DETAIL,
    DATACENTER,
    EXT_DATA_SET,
    EXT_DATA_REF,
    MANAGED,
    ONLINE,
    KEY,
    VALUE,
    RULESET_NAME,
    RULE_HREF,
    RULE_ENABLED,
    UNSCOPED_CONSUMERS,
    SRC_LABELS,
    SRC_LABEL_GROUPS,
    SRC_IPLISTS,
    SRC_WORKLOADS,
    SRC_ALL_WORKLOADS,
    SRC_USER_GROUPS,
    DST_LABELS,
    DST_LABEL_GROUPS,
    DST_IPLISTS,
    DST_WORKLOADS,
    DST_ALL_WORKLOADS,
    DST_VIRTUAL_SERVICES,
    SERVICES,
    MACHINE_AUTH,
    SEC_CONNECT,
    STATELESS,
    PORTS,
    CLUSTER,
    NAMESPACE,
];

fn normalize(header: &str) -> String {
    header
        .chars()
        .filter(|c| c.is_alphanumeric())
        .flat_map(char::to_lowercase)
        .collect()
}

/// Map one raw header to its canonical field, if it has one.
pub fn canonical(header: &str) -> Option<&'static str> {
    let n = normalize(header);
    CANONICAL
        .iter()
        .find(|c| normalize(c) == n)
        .copied()
        .or_else(|| SYNONYMS.iter().find(|(alias, _)| *alias == n).map(|(_, c)| *c))
}

#[derive(Debug, Clone, Default)]
pub struct HeaderMap {
    index: FxHashMap<&'static str, usize>,
}

impl HeaderMap {
    /// First occurrence wins when two headers map to the same field.
    pub fn build(row0: &[String]) -> Self {
        let mut index = FxHashMap::default();
        for (i, header) in row0.iter().enumerate() {
            if let Some(field) = canonical(header) {
                index.entry(field).or_insert(i);
            }
        }
        Self { index }
    }

    pub fn has(&self, field: &str) -> bool {
        self.index.contains_key(field)
    }

    pub fn column(&self, field: &str) -> Option<usize> {
        self.index.get(field).copied()
    }

    /// Fail naming every missing required field.
    pub fn require(&self, fields: &[&str]) -> PceResult<()> {
        let missing: Vec<&str> = fields.iter().copied().filter(|f| !self.has(f)).collect();
        if missing.is_empty() {
            Ok(())
        } else {
            Err(PceError::MissingHeaders(missing.join(", ")))
        }
    }

    /// Fail unless at least one of `fields` is present.
    pub fn require_any(&self, fields: &[&str]) -> PceResult<()> {
        if fields.iter().any(|f| self.has(f)) {
            Ok(())
        } else {
            Err(PceError::MissingHeaders(format!("one of {}", fields.join(", "))))
        }
    }

    /// Trimmed cell for `field`, or `""` when the column or cell is absent.
    pub fn cell<'r>(&self, row: &'r [String], field: &str) -> &'r str {
        self.column(field)
            .and_then(|i| row.get(i))
            .map(|s| s.trim())
            .unwrap_or("")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(cells: &[&str]) -> Vec<String> {
        cells.iter().map(|c| c.to_string()).collect()
    }

    #[test]
    fn synonyms_map_to_one_field() {
        for h in ["host", "hostname", "host_name", "Host Name", "HOSTNAME"] {
            assert_eq!(canonical(h), Some(HOSTNAME), "{}", h);
        }
        assert_eq!(canonical("Environment"), Some(ENV));
        assert_eq!(canonical("rule-set"), Some(RULESET_NAME));
        assert_eq!(canonical("favorite_color"), None);
    }

    #[test]
    fn unknown_headers_ignored_and_cells_positional() {
        let hm = HeaderMap::build(&row(&["notes", "role", "host"]));
        assert_eq!(hm.column(ROLE), Some(1));
        assert_eq!(hm.column(HOSTNAME), Some(2));
        assert_eq!(hm.cell(&row(&["x", " prod ", "web1"]), ROLE), "prod");
        assert_eq!(hm.cell(&row(&["x"]), HOSTNAME), "");
        assert_eq!(hm.cell(&row(&["x"]), APP), "");
    }

    #[test]
    fn missing_required_fields_listed() {
        let hm = HeaderMap::build(&row(&["name"]));
        let err = hm.require(&[RULESET_NAME, SERVICES]).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Missing required CSV header(s): ruleset_name, services"
        );
        assert!(hm.require_any(&[HREF, NAME]).is_ok());
    }
}
