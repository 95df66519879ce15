//! Remediation plans that fold redundant addresses into one canonical object.
//!
//! Commands are emitted in phases, each phase in deterministic order:
//!
//! 1. `target_creation`: create the canonical object in shared scope when the
//!    scope decision promoted it;
//! 2. `definitions`: delete every redundant definition, grouped by scope;
//! 3. `address_groups`: rewrite each group naming a redundant object;
//! 4. `security_rules` / `nat_rules`: rewrite each rule field naming one.
//!
//! A member is rewritten only where its name resolves to one of the redundant
//! definitions, and never where the holder's device group defines a different
//! object under the canonical name (the rewritten reference would land on that
//! object instead).
//!
//! Anything that cannot be written as a safe command becomes a commented
//! `# manual review:` line plus a note. Synthesis itself never fails.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt::{self, Display, Formatter};

use panconf_core::quote_token;
use serde::Serialize;

use crate::model::{AddressObject, ObjectKey, Rule, RuleField, RuleKey, RuleKind, Scope};
use crate::redundancy::{normalize_value, PeerUsage};
use crate::scope::ScopeDecision;
use crate::store::EntityStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CommandKind {
    Create,
    Delete,
    Replace,
    /// Append one member to a list.
    Add,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanSection {
    TargetCreation,
    Definitions,
    AddressGroups,
    SecurityRules,
    NatRules,
}

impl PlanSection {
    pub const ALL: [PlanSection; 5] = [
        PlanSection::TargetCreation,
        PlanSection::Definitions,
        PlanSection::AddressGroups,
        PlanSection::SecurityRules,
        PlanSection::NatRules,
    ];
}

impl Display for PlanSection {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let title = match self {
            PlanSection::TargetCreation => "Target creation",
            PlanSection::Definitions => "Redundant definitions",
            PlanSection::AddressGroups => "Address groups",
            PlanSection::SecurityRules => "Security rules",
            PlanSection::NatRules => "NAT rules",
        };
        f.write_str(title)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CleanupCommand {
    pub kind: CommandKind,
    pub section: PlanSection,
    pub text: String,
    pub description: String,
    /// The text is a commented placeholder, not an executable command.
    pub manual_review: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CleanupPlan {
    pub target: String,
    pub scope: Scope,
    pub reason: String,
    pub peers: Vec<ObjectKey>,
    pub commands: Vec<CleanupCommand>,
    pub notes: Vec<String>,
}

impl CleanupPlan {
    pub fn commands_in(&self, section: PlanSection) -> impl Iterator<Item = &CleanupCommand> {
        self.commands
            .iter()
            .filter(move |command| command.section == section)
    }

    pub fn manual_review_count(&self) -> usize {
        self.commands
            .iter()
            .filter(|command| command.manual_review)
            .count()
    }
}

/// Build the consolidation plan for `target`.
///
/// # Arguments
///
/// * `store` - Entities the usages were resolved against
/// * `target` - Canonical object name
/// * `target_def` - Definition the scope decision was made for, if any
/// * `decision` - Output of [`crate::scope::decide`]
/// * `usages` - One entry per redundant peer definition
pub fn synthesize(
    store: &EntityStore,
    target: &str,
    target_def: Option<&AddressObject>,
    decision: &ScopeDecision,
    usages: &[PeerUsage],
) -> CleanupPlan {
    let mut plan = CleanupPlan {
        target: target.to_string(),
        scope: decision.scope.clone(),
        reason: decision.reason.to_string(),
        peers: usages.iter().map(|usage| usage.peer.clone()).collect(),
        commands: Vec::new(),
        notes: Vec::new(),
    };
    let rewrite = Rewrite {
        store,
        target,
        target_def,
        decision,
        peers: usages.iter().map(|usage| usage.peer.clone()).collect(),
    };

    if decision.promoted {
        creation_phase(&mut plan, target, target_def, usages);
    }
    deletion_phase(&mut plan, usages);
    group_phase(&mut plan, &rewrite, usages);
    rule_phase(&mut plan, &rewrite, usages);
    scope_notes(&mut plan, target, decision, usages);

    tracing::debug!(
        object = target,
        commands = plan.commands.len(),
        manual = plan.manual_review_count(),
        "cleanup plan synthesized"
    );
    plan
}

/// Context for rewriting member lists.
struct Rewrite<'a> {
    store: &'a EntityStore,
    target: &'a str,
    target_def: Option<&'a AddressObject>,
    decision: &'a ScopeDecision,
    peers: BTreeSet<ObjectKey>,
}

impl Rewrite<'_> {
    /// Replace every member resolving to a peer with the target, keeping
    /// order and dropping repeats.
    fn substitute(&self, members: &[String], holder: &Scope) -> Vec<String> {
        let mut out: Vec<String> = Vec::with_capacity(members.len());
        for member in members {
            let is_peer = self
                .store
                .resolve_scope(member, holder)
                .is_some_and(|scope| {
                    self.peers.contains(&ObjectKey {
                        scope,
                        name: member.clone(),
                    })
                });
            let name = if is_peer { self.target } else { member.as_str() };
            if !out.iter().any(|existing| existing == name) {
                out.push(name.to_string());
            }
        }
        out
    }

    /// A different object the target name would resolve to from `holder`.
    fn shadowed_by(&self, holder: &Scope) -> Option<String> {
        if holder.is_shared()
            || *holder == self.decision.scope
            || self.target_def.is_some_and(|def| def.scope == *holder)
        {
            return None;
        }
        if self.store.group(self.target, holder).is_some() {
            return Some(format!("address-group {} in {holder}", self.target));
        }
        let local = self.store.address(self.target, holder)?;
        let expected = self
            .target_def
            .and_then(|def| def.value.as_ref())
            .and_then(normalize_value);
        let found = local.value.as_ref().and_then(normalize_value);
        if expected.is_some() && found == expected {
            return None;
        }
        Some(format!("address {}", local.key()))
    }
}

fn creation_phase(
    plan: &mut CleanupPlan,
    target: &str,
    target_def: Option<&AddressObject>,
    usages: &[PeerUsage],
) {
    let value = target_def
        .and_then(|def| def.value.clone())
        .or_else(|| usages.iter().find_map(|usage| usage.value.clone()));
    match value {
        Some(value) => plan.commands.push(CleanupCommand {
            kind: CommandKind::Create,
            section: PlanSection::TargetCreation,
            text: format!(
                "set shared address {} {} {}",
                quote_token(target),
                value.attribute(),
                quote_token(value.text())
            ),
            description: format!("create {target} in shared scope"),
            manual_review: false,
        }),
        None => {
            plan.commands.push(CleanupCommand {
                kind: CommandKind::Create,
                section: PlanSection::TargetCreation,
                text: format!("# manual review: create shared address {target}; no value is known"),
                description: format!("create {target} in shared scope"),
                manual_review: true,
            });
            plan.notes
                .push(format!("no value found for {target}; shared object must be created by hand"));
        }
    }
    if let Some(def) = target_def {
        if let Some(group) = def.scope.device_group_name() {
            plan.notes.push(format!(
                "device-group {group} still defines {target}; remove it once the shared copy is in place"
            ));
        }
    }
}

fn deletion_phase(plan: &mut CleanupPlan, usages: &[PeerUsage]) {
    let mut peers: Vec<&PeerUsage> = usages.iter().collect();
    peers.sort_by(|a, b| a.peer.cmp(&b.peer));
    peers.dedup_by(|a, b| a.peer == b.peer);
    for usage in peers {
        let value = usage
            .value
            .as_ref()
            .map(|value| format!(" ({value})"))
            .unwrap_or_default();
        plan.commands.push(CleanupCommand {
            kind: CommandKind::Delete,
            section: PlanSection::Definitions,
            text: format!(
                "delete {} address {}",
                usage.peer.scope.command_prefix(),
                quote_token(&usage.peer.name)
            ),
            description: format!("remove redundant {}{value}", usage.peer),
            manual_review: false,
        });
    }
}

fn group_phase(plan: &mut CleanupPlan, rewrite: &Rewrite<'_>, usages: &[PeerUsage]) {
    let target = rewrite.target;
    let mut groups: BTreeMap<ObjectKey, BTreeSet<String>> = BTreeMap::new();
    for edge in usages.iter().flat_map(|usage| &usage.memberships) {
        groups
            .entry(ObjectKey {
                scope: edge.scope.clone(),
                name: edge.source.clone(),
            })
            .or_default()
            .insert(edge.object.clone());
    }

    for (key, replaced) in groups {
        let Some(group) = rewrite.store.group(&key.name, &key.scope) else {
            plan.notes
                .push(format!("address-group {key} could not be found; update it by hand"));
            continue;
        };
        if let Some(shadow) = rewrite.shadowed_by(&group.scope) {
            let holder = format!("address-group {}", quote_token(&group.name));
            shadowed(plan, PlanSection::AddressGroups, &holder, &join(&replaced), target, &shadow);
            continue;
        }
        let members = rewrite.substitute(&group.members, &group.scope);
        plan.commands.push(CleanupCommand {
            kind: CommandKind::Replace,
            section: PlanSection::AddressGroups,
            text: format!(
                "set {} address-group {} static {}",
                group.scope.command_prefix(),
                quote_token(&group.name),
                bracketed(&members)
            ),
            description: format!(
                "replace {} with {target} in address-group {}",
                join(&replaced),
                group.name
            ),
            manual_review: false,
        });
    }
}

fn rule_phase(plan: &mut CleanupPlan, rewrite: &Rewrite<'_>, usages: &[PeerUsage]) {
    let target = rewrite.target;
    let mut fields: BTreeMap<(RuleKey, RuleField), BTreeSet<String>> = BTreeMap::new();
    for edge in usages.iter().flat_map(|usage| &usage.direct) {
        let (Some(key), Some(field)) = (edge.rule_key(), edge.field) else {
            continue;
        };
        fields
            .entry((key, field))
            .or_default()
            .insert(edge.object.clone());
    }

    for ((key, field), replaced) in fields {
        let section = match key.kind {
            RuleKind::Security => PlanSection::SecurityRules,
            RuleKind::Nat => PlanSection::NatRules,
        };
        let Some(rule) = rewrite.store.rule(&key) else {
            plan.notes.push(format!(
                "{} {} could not be found; update it by hand",
                key.kind, key.name
            ));
            continue;
        };
        let replaced = join(&replaced);
        if let Some(shadow) = rewrite.shadowed_by(&rule.scope) {
            let holder = format!("{} {}", key.kind, quote_token(&rule.name));
            shadowed(plan, section, &holder, &replaced, target, &shadow);
            continue;
        }
        let description = format!(
            "replace {replaced} with {target} in {} {} {}",
            key.kind,
            rule.name,
            field.keyword()
        );

        if matches!(
            field,
            RuleField::Source | RuleField::Destination | RuleField::Service
        ) {
            let members = rewrite.substitute(rule.members(field), &rule.scope);
            plan.commands.push(CleanupCommand {
                kind: CommandKind::Replace,
                section,
                text: format!(
                    "set {} {} {}",
                    rule_path(rule),
                    field.keyword(),
                    bracketed(&members)
                ),
                description,
                manual_review: false,
            });
            continue;
        }

        let location = match field {
            RuleField::Unscoped => "an unrecognized field".to_string(),
            other => other.keyword().to_string(),
        };
        plan.commands.push(CleanupCommand {
            kind: CommandKind::Replace,
            section,
            text: format!(
                "# manual review: {} {} uses {replaced} in {location}; replace with {target}",
                key.kind,
                quote_token(&rule.name)
            ),
            description,
            manual_review: true,
        });
        plan.notes.push(format!(
            "{} {} references {replaced} in {location}; review it by hand",
            key.kind, rule.name
        ));
    }
}

fn scope_notes(plan: &mut CleanupPlan, target: &str, decision: &ScopeDecision, usages: &[PeerUsage]) {
    if decision.affected.len() > 1 {
        plan.notes.push(format!(
            "redundant objects are used across device groups: {}",
            decision.affected.join(", ")
        ));
    }
    if decision.scope.is_shared() {
        return;
    }
    let shared_users: BTreeSet<String> = usages
        .iter()
        .flat_map(|usage| usage.direct.iter().chain(&usage.memberships))
        .filter(|edge| edge.scope.is_shared())
        .map(|edge| edge.source.clone())
        .collect();
    if !shared_users.is_empty() {
        plan.notes.push(format!(
            "shared {} would reference device-group object {target}: {}",
            if shared_users.len() == 1 { "entity" } else { "entities" },
            join(&shared_users)
        ));
    }
}

fn shadowed(
    plan: &mut CleanupPlan,
    section: PlanSection,
    holder: &str,
    replaced: &str,
    target: &str,
    shadow: &str,
) {
    plan.commands.push(CleanupCommand {
        kind: CommandKind::Replace,
        section,
        text: format!(
            "# manual review: {holder} uses {replaced}; {target} there would mean {shadow}"
        ),
        description: format!("replace {replaced} with {target} in {holder}"),
        manual_review: true,
    });
    plan.notes.push(format!(
        "{holder} keeps {replaced}: {shadow} hides the consolidated {target}"
    ));
}

pub(crate) fn rule_path(rule: &Rule) -> String {
    let kind = rule.kind.keyword();
    let name = quote_token(&rule.name);
    match (&rule.scope, rule.rulebase.as_deref()) {
        (Scope::Shared, Some("rulebase")) => format!("rulebase {kind} rules {name}"),
        (scope, Some(rulebase)) => {
            format!("{} {rulebase} {kind} rules {name}", scope.command_prefix())
        }
        (scope, None) => format!("{} {kind} rules {name}", scope.command_prefix()),
    }
}

fn bracketed(members: &[String]) -> String {
    let quoted: Vec<String> = members.iter().map(|member| quote_token(member)).collect();
    format!("[ {} ]", quoted.join(" "))
}

fn join(names: &BTreeSet<String>) -> String {
    names.iter().cloned().collect::<Vec<_>>().join(", ")
}
