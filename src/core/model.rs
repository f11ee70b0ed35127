//! Typed views of the PCE objects the importers and exporters work with.
//!
//! Only the fields pcectl reads are modeled. Every struct tolerates missing
//! and `null` fields because the PCE omits most properties that are unset.

use serde::{Deserialize, Deserializer};

/// Deserialize `null` as `T::default()`.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Deserialize `""` as `None` so that "empty" has exactly one representation.
fn empty_as_none<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.filter(|s| !s.is_empty()))
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct Href {
    pub href: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct Label {
    pub href: String,
    pub key: String,
    pub value: String,
    #[serde(default, deserialize_with = "empty_as_none")]
    pub external_data_set: Option<String>,
    #[serde(default, deserialize_with = "empty_as_none")]
    pub external_data_reference: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct Interface {
    pub name: String,
    #[serde(default, deserialize_with = "empty_as_none")]
    pub address: Option<String>,
    #[serde(default)]
    pub cidr_block: Option<u8>,
}

impl Interface {
    /// `name:address[/cidr]`, the CSV cell form of one interface.
    pub fn render(&self) -> String {
        match (&self.address, self.cidr_block) {
            (Some(address), Some(cidr)) => format!("{}:{}/{}", self.name, address, cidr),
            (Some(address), None) => format!("{}:{}", self.name, address),
            (None, _) => self.name.clone(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct Workload {
    pub href: String,
    #[serde(default, deserialize_with = "empty_as_none")]
    pub hostname: Option<String>,
    #[serde(default, deserialize_with = "empty_as_none")]
    pub name: Option<String>,
    #[serde(default, deserialize_with = "empty_as_none")]
    pub description: Option<String>,
    #[serde(default, deserialize_with = "empty_as_none")]
    pub public_ip: Option<String>,
    #[serde(default, deserialize_with = "empty_as_none")]
    pub os_id: Option<String>,
    #[serde(default, deserialize_with = "empty_as_none")]
    pub os_detail: Option<String>,
    #[serde(default, deserialize_with = "empty_as_none")]
    pub data_center: Option<String>,
    #[serde(default, deserialize_with = "empty_as_none")]
    pub external_data_set: Option<String>,
    #[serde(default, deserialize_with = "empty_as_none")]
    pub external_data_reference: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub labels: Vec<Href>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub interfaces: Vec<Interface>,
    #[serde(default, deserialize_with = "empty_as_none")]
    pub enforcement_mode: Option<String>,
    #[serde(default, deserialize_with = "empty_as_none")]
    pub visibility_level: Option<String>,
    #[serde(default)]
    pub online: bool,
    #[serde(default)]
    pub ven: Option<Href>,
}

impl Workload {
    /// A workload is managed when a VEN is paired to it.
    pub fn managed(&self) -> bool {
        self.ven.is_some()
    }

    /// Hostname if present, otherwise name, otherwise href.
    pub fn display_name(&self) -> &str {
        self.hostname
            .as_deref()
            .or(self.name.as_deref())
            .unwrap_or(&self.href)
    }
}

/// One side of a rule or enforcement boundary. Exactly one field is set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct Actor {
    #[serde(default)]
    pub label: Option<Href>,
    #[serde(default)]
    pub label_group: Option<Href>,
    #[serde(default)]
    pub ip_list: Option<Href>,
    #[serde(default)]
    pub workload: Option<Href>,
    #[serde(default)]
    pub virtual_service: Option<Href>,
    #[serde(default)]
    pub actors: Option<String>,
}

impl Actor {
    pub fn is_all_workloads(&self) -> bool {
        self.actors.as_deref() == Some("ams")
    }
}

/// Either a reference to a service object or an inline port range.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct IngressService {
    #[serde(default)]
    pub href: Option<String>,
    #[serde(default)]
    pub port: Option<u16>,
    #[serde(default)]
    pub to_port: Option<u16>,
    #[serde(default)]
    pub proto: Option<i16>,
    #[serde(default)]
    pub icmp_type: Option<u8>,
    #[serde(default)]
    pub icmp_code: Option<u8>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct Rule {
    pub href: String,
    #[serde(default)]
    pub enabled: bool,
    #[serde(default, deserialize_with = "empty_as_none")]
    pub description: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub providers: Vec<Actor>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub consumers: Vec<Actor>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub consuming_security_principals: Vec<Href>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub ingress_services: Vec<IngressService>,
    #[serde(default)]
    pub unscoped_consumers: bool,
    #[serde(default)]
    pub machine_auth: bool,
    #[serde(default)]
    pub sec_connect: bool,
    #[serde(default)]
    pub stateless: bool,
    #[serde(default, deserialize_with = "empty_as_none")]
    pub external_data_set: Option<String>,
    #[serde(default, deserialize_with = "empty_as_none")]
    pub external_data_reference: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct RuleSet {
    pub href: String,
    pub name: String,
    #[serde(default)]
    pub enabled: bool,
    #[serde(default, deserialize_with = "null_as_default")]
    pub rules: Vec<Rule>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ServicePort {
    #[serde(default)]
    pub port: Option<u16>,
    #[serde(default)]
    pub to_port: Option<u16>,
    /// IP protocol number; `-1` means every protocol.
    pub proto: i16,
    #[serde(default)]
    pub icmp_type: Option<u8>,
    #[serde(default)]
    pub icmp_code: Option<u8>,
}

/// Protocol value the PCE uses for "All Services".
pub const ALL_PROTOCOLS: i16 = -1;

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct Service {
    pub href: String,
    pub name: String,
    #[serde(default, deserialize_with = "empty_as_none")]
    pub description: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub service_ports: Vec<ServicePort>,
    #[serde(default, deserialize_with = "empty_as_none")]
    pub external_data_set: Option<String>,
    #[serde(default, deserialize_with = "empty_as_none")]
    pub external_data_reference: Option<String>,
}

/// Objects that are only ever referenced by name: IP lists, label groups,
/// virtual services, user groups and container clusters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct NamedObject {
    pub href: String,
    pub name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct EnforcementBoundary {
    pub href: String,
    pub name: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub providers: Vec<Actor>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub consumers: Vec<Actor>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub ingress_services: Vec<IngressService>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ProfileLabel {
    pub key: String,
    #[serde(default)]
    pub assignment: Option<Href>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ContainerWorkloadProfile {
    pub href: String,
    #[serde(default, deserialize_with = "empty_as_none")]
    pub name: Option<String>,
    #[serde(default, deserialize_with = "empty_as_none")]
    pub namespace: Option<String>,
    #[serde(default, deserialize_with = "empty_as_none")]
    pub description: Option<String>,
    #[serde(default, deserialize_with = "empty_as_none")]
    pub enforcement_mode: Option<String>,
    #[serde(default, deserialize_with = "empty_as_none")]
    pub visibility_level: Option<String>,
    #[serde(default)]
    pub managed: bool,
    #[serde(default, deserialize_with = "null_as_default")]
    pub labels: Vec<ProfileLabel>,
}

impl ContainerWorkloadProfile {
    pub fn assigned_label(&self, key: &str) -> Option<&str> {
        self.labels
            .iter()
            .find(|l| l.key == key)
            .and_then(|l| l.assignment.as_ref())
            .map(|a| a.href.as_str())
    }
}

/// Per-item status returned by the workload bulk endpoints.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct BulkResult {
    #[serde(default)]
    pub href: Option<String>,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub message: Option<String>,
}
