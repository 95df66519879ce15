//! Read-only indices over ingested entities.
//!
//! The store is built once from the ordered record stream and never mutated
//! afterwards, so any number of resolver and detector queries can share it.
//!
//! ## Redefinition
//!
//! A later statement for the same name and scope replaces scalar attributes
//! (value, description, dynamic filter). Member lists accumulate instead, so
//! membership facts recorded earlier in the file are kept.
//!
//! ## Name resolution
//!
//! A name used by a rule or group in device-group `X` means `X`'s own object
//! when `X` defines one, otherwise the shared object. Shared rules and groups
//! only see shared objects. [`EntityStore::resolve_scope`] applies this.

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;

use crate::model::{
    field_values, AddressAttr, AddressGroup, AddressObject, EntityRecord, GroupAttr, ObjectKey,
    Rule, RuleField, RuleKey, RuleKind, Scope,
};
use crate::redundancy::{normalize_value, IpKey};

/// Entity counts for reporting.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StoreStats {
    pub addresses: usize,
    pub address_groups: usize,
    pub security_rules: usize,
    pub nat_rules: usize,
    pub device_groups: usize,
}

/// One rule field naming a value, at the first line it was seen.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleReference {
    pub rule: RuleKey,
    pub field: RuleField,
    pub position: usize,
}

#[derive(Debug, Default)]
pub struct EntityStore {
    addresses: BTreeMap<String, Vec<AddressObject>>,
    groups: BTreeMap<String, Vec<AddressGroup>>,
    rules: BTreeMap<RuleKey, Rule>,
    ip_index: BTreeMap<IpKey, Vec<ObjectKey>>,
    /// Member name to the groups whose static list names it.
    containing: BTreeMap<String, BTreeSet<ObjectKey>>,
    /// Value to the rule fields naming it, in rule key order.
    referencing: BTreeMap<String, Vec<RuleReference>>,
    device_groups: BTreeSet<String>,
}

impl EntityStore {
    /// Fold records, in input order, into the store.
    pub fn build<I>(records: I) -> Self
    where
        I: IntoIterator<Item = EntityRecord>,
    {
        let mut store = Self::default();
        for record in records {
            store.apply(record);
        }
        store.build_indices();
        let stats = store.stats();
        tracing::info!(
            addresses = stats.addresses,
            address_groups = stats.address_groups,
            security_rules = stats.security_rules,
            nat_rules = stats.nat_rules,
            device_groups = stats.device_groups,
            "entity store built"
        );
        store
    }

    fn apply(&mut self, record: EntityRecord) {
        match record {
            EntityRecord::DeviceGroup { name, .. } => {
                self.device_groups.insert(name);
            }
            EntityRecord::Address {
                scope,
                name,
                attr,
                position,
            } => {
                self.note_scope(&scope);
                let defs = self.addresses.entry(name.clone()).or_default();
                let index = match defs.iter().position(|def| def.scope == scope) {
                    Some(index) => index,
                    None => {
                        defs.push(AddressObject {
                            name,
                            scope,
                            value: None,
                            description: None,
                            position,
                        });
                        defs.len() - 1
                    }
                };
                let object = &mut defs[index];
                match attr {
                    AddressAttr::Value(value) => object.value = Some(value),
                    AddressAttr::Description(text) => object.description = Some(text),
                }
            }
            EntityRecord::AddressGroup {
                scope,
                name,
                attr,
                position,
            } => {
                self.note_scope(&scope);
                let defs = self.groups.entry(name.clone()).or_default();
                let index = match defs.iter().position(|def| def.scope == scope) {
                    Some(index) => index,
                    None => {
                        defs.push(AddressGroup {
                            name,
                            scope,
                            members: Vec::new(),
                            dynamic_filter: None,
                            description: None,
                            position,
                        });
                        defs.len() - 1
                    }
                };
                let group = &mut defs[index];
                match attr {
                    GroupAttr::Static(members) => {
                        for member in members {
                            if !group.members.contains(&member) {
                                group.members.push(member);
                            }
                        }
                    }
                    GroupAttr::Dynamic(filter) => group.dynamic_filter = Some(filter),
                    GroupAttr::Description(text) => group.description = Some(text),
                }
            }
            EntityRecord::RuleFragment {
                kind,
                scope,
                rulebase,
                name,
                text,
                position,
            } => {
                self.note_scope(&scope);
                let key = RuleKey {
                    kind,
                    scope: scope.clone(),
                    name: name.clone(),
                };
                let rule = self
                    .rules
                    .entry(key)
                    .or_insert_with(|| Rule::new(kind, scope, rulebase.clone(), name, position));
                if rule.rulebase.is_none() {
                    rule.rulebase = rulebase;
                }
                rule.absorb(&text, position);
            }
        }
    }

    fn note_scope(&mut self, scope: &Scope) {
        if let Some(name) = scope.device_group_name() {
            if !self.device_groups.contains(name) {
                self.device_groups.insert(name.to_string());
            }
        }
    }

    fn build_indices(&mut self) {
        self.ip_index.clear();
        self.containing.clear();
        self.referencing.clear();
        for group in self.groups.values().flatten() {
            for member in &group.members {
                self.containing
                    .entry(member.clone())
                    .or_default()
                    .insert(ObjectKey {
                        scope: group.scope.clone(),
                        name: group.name.clone(),
                    });
            }
        }
        for object in self.addresses.values().flatten() {
            let Some(key) = object.value.as_ref().and_then(normalize_value) else {
                continue;
            };
            self.ip_index.entry(key).or_default().push(object.key());
        }
        for keys in self.ip_index.values_mut() {
            keys.sort();
        }
        for rule in self.rules.values() {
            let key = rule.key();
            let mut seen: BTreeSet<(String, RuleField)> = BTreeSet::new();
            for line in &rule.lines {
                for (field, value) in field_values(&line.text) {
                    if field.address_context().is_none() || seen.contains(&(value.clone(), field)) {
                        continue;
                    }
                    self.referencing
                        .entry(value.clone())
                        .or_default()
                        .push(RuleReference {
                            rule: key.clone(),
                            field,
                            position: line.position,
                        });
                    seen.insert((value, field));
                }
            }
        }
    }

    /// Every definition of `name`, across scopes.
    pub fn addresses_named(&self, name: &str) -> &[AddressObject] {
        self.addresses.get(name).map_or(&[], Vec::as_slice)
    }

    pub fn address(&self, name: &str, scope: &Scope) -> Option<&AddressObject> {
        self.addresses_named(name)
            .iter()
            .find(|object| object.scope == *scope)
    }

    pub fn address_by_key(&self, key: &ObjectKey) -> Option<&AddressObject> {
        self.address(&key.name, &key.scope)
    }

    pub fn addresses(&self) -> impl Iterator<Item = &AddressObject> {
        self.addresses.values().flatten()
    }

    /// Every definition of group `name`, across scopes.
    pub fn groups_named(&self, name: &str) -> &[AddressGroup] {
        self.groups.get(name).map_or(&[], Vec::as_slice)
    }

    pub fn group(&self, name: &str, scope: &Scope) -> Option<&AddressGroup> {
        self.groups_named(name)
            .iter()
            .find(|group| group.scope == *scope)
    }

    pub fn groups(&self) -> impl Iterator<Item = &AddressGroup> {
        self.groups.values().flatten()
    }

    /// Groups whose static member list names `member`, in key order.
    pub fn groups_containing(&self, member: &str) -> impl Iterator<Item = &ObjectKey> {
        self.containing.get(member).into_iter().flatten()
    }

    /// Rule fields naming `value`, in rule key order.
    pub fn rule_references(&self, value: &str) -> &[RuleReference] {
        self.referencing.get(value).map_or(&[], Vec::as_slice)
    }

    /// Every value rules name, in value order.
    pub fn rule_reference_index(&self) -> impl Iterator<Item = (&str, &[RuleReference])> {
        self.referencing
            .iter()
            .map(|(value, references)| (value.as_str(), references.as_slice()))
    }

    /// Scope whose definition of `name` a reference made from `from` sees.
    /// `None` when neither the device group nor shared defines the name.
    pub fn resolve_scope(&self, name: &str, from: &Scope) -> Option<Scope> {
        if !from.is_shared() && self.defines(name, from) {
            return Some(from.clone());
        }
        self.defines(name, &Scope::Shared).then_some(Scope::Shared)
    }

    /// Whether `scope` defines an address or group called `name`.
    pub fn defines(&self, name: &str, scope: &Scope) -> bool {
        self.address(name, scope).is_some() || self.group(name, scope).is_some()
    }

    /// Rules in key order: kind, then scope, then name.
    pub fn rules(&self) -> impl Iterator<Item = &Rule> {
        self.rules.values()
    }

    pub fn rule(&self, key: &RuleKey) -> Option<&Rule> {
        self.rules.get(key)
    }

    pub fn rules_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Rule> + 'a {
        self.rules.values().filter(move |rule| rule.name == name)
    }

    /// Addresses whose value normalizes to `key`.
    pub fn by_ip_key(&self, key: &IpKey) -> &[ObjectKey] {
        self.ip_index.get(key).map_or(&[], Vec::as_slice)
    }

    /// Every equivalence key with its members, in key order.
    pub fn ip_classes(&self) -> impl Iterator<Item = (&IpKey, &[ObjectKey])> {
        self.ip_index.iter().map(|(key, members)| (key, members.as_slice()))
    }

    pub fn device_groups(&self) -> &BTreeSet<String> {
        &self.device_groups
    }

    /// Whether any address or group is defined under `name`.
    pub fn is_defined(&self, name: &str) -> bool {
        self.addresses.contains_key(name) || self.groups.contains_key(name)
    }

    pub fn stats(&self) -> StoreStats {
        let count_rules = |kind: RuleKind| self.rules.keys().filter(|key| key.kind == kind).count();
        StoreStats {
            addresses: self.addresses.values().map(Vec::len).sum(),
            address_groups: self.groups.values().map(Vec::len).sum(),
            security_rules: count_rules(RuleKind::Security),
            nat_rules: count_rules(RuleKind::Nat),
            device_groups: self.device_groups.len(),
        }
    }
}
