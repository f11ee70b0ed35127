//! In-memory snapshot of PCE objects for a single command run.
//!
//! Every collection is keyed by href and by namespaced aliases
//! (`hostname=web1`, `name=web1`, `kv=role=db`, ...). Commands declare the
//! object types they need through [`LoadInput`] so that a run only pays
//! for the API calls it uses.
//!
//! Labels the CSV names but the PCE does not have yet resolve to a
//! placeholder href (`<prefix>-temp-<key>-<value>`). The apply step creates
//! them and swaps the placeholders for real hrefs.

use crate::core::api::{self, PceApi};
use crate::core::error::PceResult;
use crate::core::model::{
    ContainerWorkloadProfile, EnforcementBoundary, Label, NamedObject, Rule, RuleSet, Service,
    Workload,
};
use rustc_hash::FxHashMap;
use std::collections::BTreeMap;
use tracing::info;

#[derive(Debug, Clone)]
pub struct Keyed<T> {
    items: BTreeMap<String, T>,
    aliases: FxHashMap<String, String>,
}

impl<T> Default for Keyed<T> {
    fn default() -> Self {
        Self {
            items: BTreeMap::new(),
            aliases: FxHashMap::default(),
        }
    }
}

impl<T> Keyed<T> {
    /// Later inserts win on alias collisions.
    pub fn insert(&mut self, href: &str, item: T, aliases: impl IntoIterator<Item = String>) {
        for alias in aliases {
            self.aliases.insert(alias, href.to_string());
        }
        self.items.insert(href.to_string(), item);
    }

    pub fn get(&self, href: &str) -> Option<&T> {
        self.items.get(href)
    }

    pub fn get_alias(&self, alias: &str) -> Option<&T> {
        self.aliases.get(alias).and_then(|href| self.items.get(href))
    }

    pub fn values(&self) -> impl Iterator<Item = &T> {
        self.items.values()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

fn name_alias(name: &str) -> String {
    format!("name={}", name)
}

fn kv_alias(key: &str, value: &str) -> String {
    format!("kv={}={}", key, value)
}

/// Object types (and workload filters) a command needs loaded.
#[derive(Debug, Clone, Default)]
pub struct LoadInput {
    pub labels: bool,
    pub workloads: bool,
    pub workload_query: Vec<(String, String)>,
    pub rulesets: bool,
    pub services: bool,
    pub ip_lists: bool,
    pub label_groups: bool,
    pub virtual_services: bool,
    pub user_groups: bool,
    pub enforcement_boundaries: bool,
    pub container_profiles: bool,
}

impl LoadInput {
    /// Everything a rule or boundary may reference.
    pub fn policy() -> Self {
        Self {
            labels: true,
            workloads: true,
            rulesets: true,
            services: true,
            ip_lists: true,
            label_groups: true,
            virtual_services: true,
            user_groups: true,
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingLabel {
    pub key: String,
    pub value: String,
    pub placeholder: String,
}

#[derive(Debug, Clone, Default)]
pub struct Inventory {
    pub labels: Keyed<Label>,
    pub workloads: Keyed<Workload>,
    pub rulesets: Keyed<RuleSet>,
    pub rules: Keyed<Rule>,
    pub services: Keyed<Service>,
    pub ip_lists: Keyed<NamedObject>,
    pub label_groups: Keyed<NamedObject>,
    pub virtual_services: Keyed<NamedObject>,
    pub user_groups: Keyed<NamedObject>,
    pub enforcement_boundaries: Keyed<EnforcementBoundary>,
    pub container_clusters: Keyed<NamedObject>,
    pub container_profiles: Keyed<ContainerWorkloadProfile>,
    rule_owner: FxHashMap<String, String>,
    placeholder_prefix: String,
    pending: BTreeMap<(String, String), String>,
}

impl Inventory {
    pub fn new(placeholder_prefix: &str) -> Self {
        Self {
            placeholder_prefix: placeholder_prefix.to_string(),
            ..Self::default()
        }
    }

    /// Fetch every collection `input` asks for. Any API error aborts.
    pub fn load(api: &dyn PceApi, input: &LoadInput, placeholder_prefix: &str) -> PceResult<Self> {
        let mut inv = Self::new(placeholder_prefix);
        let none: &[(String, String)] = &[];

        if input.labels {
            for label in api::fetch::<Label>(api, &api::org_path(api, "labels"), none)? {
                inv.add_label(label);
            }
        }
        if input.workloads {
            let path = api::org_path(api, "workloads");
            for workload in api::fetch::<Workload>(api, &path, &input.workload_query)? {
                inv.add_workload(workload);
            }
        }
        if input.rulesets {
            for ruleset in api::fetch::<RuleSet>(api, &api::draft_path(api, "rule_sets"), none)? {
                inv.add_ruleset(ruleset);
            }
        }
        if input.services {
            for service in api::fetch::<Service>(api, &api::draft_path(api, "services"), none)? {
                inv.add_service(service);
            }
        }
        if input.ip_lists {
            for ipl in api::fetch::<NamedObject>(api, &api::draft_path(api, "ip_lists"), none)? {
                Self::add_named(&mut inv.ip_lists, ipl);
            }
        }
        if input.label_groups {
            let path = api::draft_path(api, "label_groups");
            for lg in api::fetch::<NamedObject>(api, &path, none)? {
                Self::add_named(&mut inv.label_groups, lg);
            }
        }
        if input.virtual_services {
            let path = api::draft_path(api, "virtual_services");
            for vs in api::fetch::<NamedObject>(api, &path, none)? {
                Self::add_named(&mut inv.virtual_services, vs);
            }
        }
        if input.user_groups {
            let path = api::org_path(api, "security_principals");
            for ug in api::fetch::<NamedObject>(api, &path, none)? {
                Self::add_named(&mut inv.user_groups, ug);
            }
        }
        if input.enforcement_boundaries {
            let path = api::draft_path(api, "enforcement_boundaries");
            for eb in api::fetch::<EnforcementBoundary>(api, &path, none)? {
                inv.add_enforcement_boundary(eb);
            }
        }
        if input.container_profiles {
            let path = api::org_path(api, "container_clusters");
            let clusters = api::fetch::<NamedObject>(api, &path, none)?;
            for cluster in clusters {
                let profiles_path = format!("{}/container_workload_profiles", cluster.href);
                for profile in api::fetch::<ContainerWorkloadProfile>(api, &profiles_path, none)? {
                    inv.add_container_profile(&cluster.href, profile);
                }
                inv.add_container_cluster(cluster);
            }
        }

        info!(
            labels = inv.labels.len(),
            workloads = inv.workloads.len(),
            rulesets = inv.rulesets.len(),
            services = inv.services.len(),
            boundaries = inv.enforcement_boundaries.len(),
            container_profiles = inv.container_profiles.len(),
            "loaded PCE inventory"
        );
        Ok(inv)
    }

    pub fn add_label(&mut self, label: Label) {
        let alias = kv_alias(&label.key, &label.value);
        self.labels.insert(&label.href.clone(), label, [alias]);
    }

    pub fn add_workload(&mut self, workload: Workload) {
        let mut aliases = Vec::new();
        if let Some(h) = &workload.hostname {
            aliases.push(format!("hostname={}", h));
        }
        if let Some(n) = &workload.name {
            aliases.push(name_alias(n));
        }
        if let (Some(set), Some(reference)) =
            (&workload.external_data_set, &workload.external_data_reference)
        {
            aliases.push(format!("ext={}|{}", set, reference));
        }
        self.workloads.insert(&workload.href.clone(), workload, aliases);
    }

    pub fn add_ruleset(&mut self, ruleset: RuleSet) {
        for rule in &ruleset.rules {
            self.rule_owner.insert(rule.href.clone(), ruleset.href.clone());
            self.rules.insert(&rule.href, rule.clone(), Vec::<String>::new());
        }
        let alias = name_alias(&ruleset.name);
        self.rulesets.insert(&ruleset.href.clone(), ruleset, [alias]);
    }

    pub fn add_service(&mut self, service: Service) {
        let alias = name_alias(&service.name);
        self.services.insert(&service.href.clone(), service, [alias]);
    }

    pub fn add_named(keyed: &mut Keyed<NamedObject>, object: NamedObject) {
        let alias = name_alias(&object.name);
        keyed.insert(&object.href.clone(), object, [alias]);
    }

    pub fn add_enforcement_boundary(&mut self, eb: EnforcementBoundary) {
        let alias = name_alias(&eb.name);
        self.enforcement_boundaries.insert(&eb.href.clone(), eb, [alias]);
    }

    pub fn add_container_cluster(&mut self, cluster: NamedObject) {
        Self::add_named(&mut self.container_clusters, cluster);
    }

    pub fn add_container_profile(&mut self, cluster_href: &str, profile: ContainerWorkloadProfile) {
        let mut aliases = Vec::new();
        if let Some(ns) = &profile.namespace {
            aliases.push(format!("ns={}/{}", cluster_href, ns));
        }
        self.container_profiles.insert(&profile.href.clone(), profile, aliases);
    }

    pub fn label(&self, href: &str) -> Option<&Label> {
        self.labels.get(href)
    }

    pub fn label_by_kv(&self, key: &str, value: &str) -> Option<&Label> {
        self.labels.get_alias(&kv_alias(key, value))
    }

    /// Look a workload up by href, hostname, name or `set|reference`.
    pub fn workload(&self, key: &str) -> Option<&Workload> {
        self.workloads
            .get(key)
            .or_else(|| self.workload_by_hostname(key))
            .or_else(|| self.workload_by_name(key))
            .or_else(|| self.workloads.get_alias(&format!("ext={}", key)))
    }

    pub fn workload_by_hostname(&self, hostname: &str) -> Option<&Workload> {
        self.workloads.get_alias(&format!("hostname={}", hostname))
    }

    pub fn workload_by_name(&self, name: &str) -> Option<&Workload> {
        self.workloads.get_alias(&name_alias(name))
    }

    pub fn workload_by_external(&self, set: &str, reference: &str) -> Option<&Workload> {
        self.workloads.get_alias(&format!("ext={}|{}", set, reference))
    }

    pub fn ruleset(&self, key: &str) -> Option<&RuleSet> {
        self.rulesets
            .get(key)
            .or_else(|| self.rulesets.get_alias(&name_alias(key)))
    }

    pub fn rule(&self, href: &str) -> Option<&Rule> {
        self.rules.get(href)
    }

    /// Ruleset href owning a rule href.
    pub fn rule_owner(&self, rule_href: &str) -> Option<&str> {
        self.rule_owner.get(rule_href).map(String::as_str)
    }

    pub fn service(&self, key: &str) -> Option<&Service> {
        self.services
            .get(key)
            .or_else(|| self.services.get_alias(&name_alias(key)))
    }

    pub fn ip_list(&self, key: &str) -> Option<&NamedObject> {
        lookup(&self.ip_lists, key)
    }

    pub fn label_group(&self, key: &str) -> Option<&NamedObject> {
        lookup(&self.label_groups, key)
    }

    pub fn virtual_service(&self, key: &str) -> Option<&NamedObject> {
        lookup(&self.virtual_services, key)
    }

    pub fn user_group(&self, key: &str) -> Option<&NamedObject> {
        lookup(&self.user_groups, key)
    }

    pub fn container_cluster(&self, key: &str) -> Option<&NamedObject> {
        lookup(&self.container_clusters, key)
    }

    pub fn enforcement_boundary(&self, key: &str) -> Option<&EnforcementBoundary> {
        self.enforcement_boundaries
            .get(key)
            .or_else(|| self.enforcement_boundaries.get_alias(&name_alias(key)))
    }

    pub fn container_profile(&self, cluster_href: &str, namespace: &str) -> Option<&ContainerWorkloadProfile> {
        self.container_profiles
            .get_alias(&format!("ns={}/{}", cluster_href, namespace))
    }

    /// Real href for `(key, value)`, or its memoised placeholder.
    pub fn resolve_label(&mut self, key: &str, value: &str) -> String {
        if let Some(label) = self.label_by_kv(key, value) {
            return label.href.clone();
        }
        let prefix = &self.placeholder_prefix;
        self.pending
            .entry((key.to_string(), value.to_string()))
            .or_insert_with(|| format!("{}-temp-{}-{}", prefix, key, value))
            .clone()
    }

    pub fn pending_labels(&self) -> Vec<PendingLabel> {
        self.pending
            .iter()
            .map(|((key, value), placeholder)| PendingLabel {
                key: key.clone(),
                value: value.clone(),
                placeholder: placeholder.clone(),
            })
            .collect()
    }

    /// Record a label created for a placeholder so later lookups see it.
    pub fn register_created_label(&mut self, label: Label) {
        self.pending.remove(&(label.key.clone(), label.value.clone()));
        self.add_label(label);
    }

    /// `key:value` for a real or placeholder label href.
    pub fn label_key_value(&self, href: &str) -> Option<String> {
        if let Some(label) = self.label(href) {
            return Some(format!("{}:{}", label.key, label.value));
        }
        self.pending
            .iter()
            .find(|(_, placeholder)| placeholder.as_str() == href)
            .map(|((key, value), _)| format!("{}:{}", key, value))
    }
}

fn lookup<'a>(keyed: &'a Keyed<NamedObject>, key: &str) -> Option<&'a NamedObject> {
    keyed.get(key).or_else(|| keyed.get_alias(&name_alias(key)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn label(href: &str, key: &str, value: &str) -> Label {
        Label {
            href: href.into(),
            key: key.into(),
            value: value.into(),
            ..Label::default()
        }
    }

    #[test]
    fn workload_lookup_by_every_alias() {
        let mut inv = Inventory::new("wkld-import");
        inv.add_workload(Workload {
            href: "/orgs/1/workloads/a".into(),
            hostname: Some("web1.corp".into()),
            name: Some("web1".into()),
            external_data_set: Some("cmdb".into()),
            external_data_reference: Some("42".into()),
            ..Workload::default()
        });
        for key in ["/orgs/1/workloads/a", "web1.corp", "web1", "cmdb|42"] {
            assert_eq!(
                inv.workload(key).map(|w| w.href.as_str()),
                Some("/orgs/1/workloads/a"),
                "{}",
                key
            );
        }
        assert!(inv.workload_by_hostname("web1").is_none());
    }

    #[test]
    fn placeholder_is_memoised_and_queued_once() {
        let mut inv = Inventory::new("wkld-import");
        inv.add_label(label("/orgs/1/labels/1", "role", "web"));

        assert_eq!(inv.resolve_label("role", "web"), "/orgs/1/labels/1");
        let first = inv.resolve_label("role", "db");
        let second = inv.resolve_label("role", "db");
        assert_eq!(first, "wkld-import-temp-role-db");
        assert_eq!(first, second);
        assert_eq!(inv.pending_labels().len(), 1);
        assert_eq!(inv.label_key_value(&first).as_deref(), Some("role:db"));

        inv.register_created_label(label("/orgs/1/labels/9", "role", "db"));
        assert!(inv.pending_labels().is_empty());
        assert_eq!(inv.resolve_label("role", "db"), "/orgs/1/labels/9");
    }

    #[test]
    fn rules_know_their_ruleset() {
        let mut inv = Inventory::default();
        inv.add_ruleset(RuleSet {
            href: "/orgs/1/sec_policy/draft/rule_sets/5".into(),
            name: "rs-web".into(),
            enabled: true,
            rules: vec![Rule {
                href: "/orgs/1/sec_policy/draft/rule_sets/5/sec_rules/9".into(),
                ..Rule::default()
            }],
        });
        assert!(inv.ruleset("rs-web").is_some());
        assert_eq!(
            inv.rule_owner("/orgs/1/sec_policy/draft/rule_sets/5/sec_rules/9"),
            Some("/orgs/1/sec_policy/draft/rule_sets/5")
        );
    }
}
