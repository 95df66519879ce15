//! Copying an address object under a new name and value.
//!
//! The copy is created in the source's scope with the source's description.
//! Every group and rule field whose use of the source name resolves to the
//! source then gains the new name ([`CopyMode::Add`]) or has the source
//! swapped for it ([`CopyMode::Replace`]). List edits are single-member `set`
//! and `delete` statements, which PAN-OS applies one entry at a time.
//!
//! Holders that cannot take a plain list edit get a `# manual review:` line:
//! NAT translation fields, values under no recognized field, and holders
//! whose device group defines its own object under the new name.

use std::collections::BTreeSet;

use panconf_core::quote_token;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::cleanup::{rule_path, CleanupCommand, CommandKind, PlanSection};
use crate::model::{AddressObject, AddressValue, ObjectKey, RuleField, RuleKind, Scope};
use crate::redundancy::normalize_ip;
use crate::resolver::Resolver;
use crate::store::EntityStore;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CopyMode {
    /// Keep the source everywhere and add the copy next to it.
    #[default]
    Add,
    /// Put the copy where the source was.
    Replace,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CopyRequest {
    pub source: String,
    /// Which definition of `source` to copy; needed when several scopes
    /// define it.
    pub scope: Option<Scope>,
    pub new_name: String,
    /// `ip-netmask` value of the copy.
    pub new_value: String,
    pub mode: CopyMode,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CopyError {
    #[error("address object {0} is not defined")]
    UnknownSource(String),
    #[error("address object {name} is defined in {scopes}; choose one with --device-group")]
    AmbiguousSource { name: String, scopes: String },
    #[error("new address name is empty")]
    EmptyName,
    #[error("invalid ip-netmask value '{0}'")]
    InvalidAddress(String),
    #[error("{0} is already defined")]
    NameInUse(ObjectKey),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CopySummary {
    pub address_groups: usize,
    pub security_rules: usize,
    pub nat_rules: usize,
    pub manual_review: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CopyPlan {
    pub source: ObjectKey,
    pub copy: ObjectKey,
    pub value: AddressValue,
    pub mode: CopyMode,
    pub commands: Vec<CleanupCommand>,
    pub notes: Vec<String>,
    pub summary: CopySummary,
}

impl CopyPlan {
    pub fn commands_in(&self, section: PlanSection) -> impl Iterator<Item = &CleanupCommand> {
        self.commands
            .iter()
            .filter(move |command| command.section == section)
    }
}

/// Build the commands that copy `request.source` and wire the copy in.
pub fn plan_copy(store: &EntityStore, request: &CopyRequest) -> Result<CopyPlan, CopyError> {
    let new_name = request.new_name.trim();
    if new_name.is_empty() {
        return Err(CopyError::EmptyName);
    }
    let new_value = request.new_value.trim();
    if normalize_ip(new_value).is_none() {
        return Err(CopyError::InvalidAddress(request.new_value.clone()));
    }

    let source = pick_source(store, request)?;
    let copy = ObjectKey {
        scope: source.scope.clone(),
        name: new_name.to_string(),
    };
    if store.defines(new_name, &source.scope) {
        return Err(CopyError::NameInUse(copy));
    }

    let mut plan = CopyPlan {
        source: source.key(),
        copy,
        value: AddressValue::IpNetmask(new_value.to_string()),
        mode: request.mode,
        commands: Vec::new(),
        notes: Vec::new(),
        summary: CopySummary::default(),
    };
    creation(&mut plan, source);
    group_edits(&mut plan, store);
    rule_edits(&mut plan, store);
    plan.summary.manual_review = plan
        .commands
        .iter()
        .filter(|command| command.manual_review)
        .count();

    tracing::debug!(
        source = %plan.source,
        copy = %plan.copy,
        commands = plan.commands.len(),
        manual = plan.summary.manual_review,
        "copy plan built"
    );
    Ok(plan)
}

fn pick_source<'s>(
    store: &'s EntityStore,
    request: &CopyRequest,
) -> Result<&'s AddressObject, CopyError> {
    let candidates: Vec<&AddressObject> = store
        .addresses_named(&request.source)
        .iter()
        .filter(|object| request.scope.as_ref().map_or(true, |scope| object.scope == *scope))
        .collect();
    match candidates.as_slice() {
        [] => Err(CopyError::UnknownSource(request.source.clone())),
        [only] => Ok(only),
        several => Err(CopyError::AmbiguousSource {
            name: request.source.clone(),
            scopes: several
                .iter()
                .map(|object| object.scope.to_string())
                .collect::<Vec<_>>()
                .join(", "),
        }),
    }
}

fn creation(plan: &mut CopyPlan, source: &AddressObject) {
    let prefix = format!(
        "set {} address {}",
        plan.copy.scope.command_prefix(),
        quote_token(&plan.copy.name)
    );
    plan.commands.push(CleanupCommand {
        kind: CommandKind::Create,
        section: PlanSection::TargetCreation,
        text: format!("{prefix} ip-netmask {}", quote_token(plan.value.text())),
        description: format!("create {} as a copy of {}", plan.copy, plan.source),
        manual_review: false,
    });
    if let Some(description) = &source.description {
        plan.commands.push(CleanupCommand {
            kind: CommandKind::Create,
            section: PlanSection::TargetCreation,
            text: format!("{prefix} description {}", quote_token(description)),
            description: format!("copy the description of {}", plan.source),
            manual_review: false,
        });
    }
}

/// Device group whose own object would capture the new name from `holder`.
fn captured_in<'a>(store: &EntityStore, plan: &CopyPlan, holder: &'a Scope) -> Option<&'a str> {
    if *holder == plan.copy.scope {
        return None;
    }
    holder
        .device_group_name()
        .filter(|_| store.defines(&plan.copy.name, holder))
}

fn group_edits(plan: &mut CopyPlan, store: &EntityStore) {
    let memberships = Resolver::new(store).memberships_of(&plan.source);
    for edge in memberships {
        plan.summary.address_groups += 1;
        let path = format!(
            "{} address-group {}",
            edge.scope.command_prefix(),
            quote_token(&edge.source)
        );
        let holder = format!("address-group {}", quote_token(&edge.source));
        if let Some(group) = captured_in(store, plan, &edge.scope) {
            blocked(plan, PlanSection::AddressGroups, &holder, group);
            continue;
        }
        list_edits(plan, PlanSection::AddressGroups, &path, "static", &holder);
    }
}

fn rule_edits(plan: &mut CopyPlan, store: &EntityStore) {
    // rule key order: security rules first
    let edges = Resolver::new(store).direct_to(&plan.source);
    let mut rules = BTreeSet::new();
    for edge in edges {
        let (Some(key), Some(field)) = (edge.rule_key(), edge.field) else {
            continue;
        };
        let Some(rule) = store.rule(&key) else {
            continue;
        };
        let section = match key.kind {
            RuleKind::Security => PlanSection::SecurityRules,
            RuleKind::Nat => PlanSection::NatRules,
        };
        if rules.insert(key.clone()) {
            match key.kind {
                RuleKind::Security => plan.summary.security_rules += 1,
                RuleKind::Nat => plan.summary.nat_rules += 1,
            }
        }
        let holder = format!("{} {}", key.kind, quote_token(&rule.name));

        if let Some(group) = captured_in(store, plan, &rule.scope) {
            blocked(plan, section, &holder, group);
            continue;
        }
        if !matches!(
            field,
            RuleField::Source | RuleField::Destination | RuleField::Service
        ) {
            let location = match field {
                RuleField::Unscoped => "an unrecognized field".to_string(),
                other => other.keyword().to_string(),
            };
            plan.commands.push(CleanupCommand {
                kind: CommandKind::Replace,
                section,
                text: format!(
                    "# manual review: {holder} uses {} in {location}; add {}",
                    plan.source.name, plan.copy.name
                ),
                description: format!("add {} to {holder}", plan.copy.name),
                manual_review: true,
            });
            plan.notes
                .push(format!("{holder} uses {} in {location}; edit it by hand", plan.source.name));
            continue;
        }
        list_edits(plan, section, &rule_path(rule), field.keyword(), &holder);
    }
}

/// `set` the copy into a list and, in replace mode, `delete` the source.
fn list_edits(plan: &mut CopyPlan, section: PlanSection, path: &str, list: &str, holder: &str) {
    let copy = quote_token(&plan.copy.name);
    let source = quote_token(&plan.source.name);
    plan.commands.push(CleanupCommand {
        kind: CommandKind::Add,
        section,
        text: format!("set {path} {list} {copy}"),
        description: format!("add {} to {holder} {list}", plan.copy.name),
        manual_review: false,
    });
    if plan.mode == CopyMode::Replace {
        plan.commands.push(CleanupCommand {
            kind: CommandKind::Delete,
            section,
            text: format!("delete {path} {list} {source}"),
            description: format!("remove {} from {holder} {list}", plan.source.name),
            manual_review: false,
        });
    }
}

fn blocked(plan: &mut CopyPlan, section: PlanSection, holder: &str, device_group: &str) {
    plan.commands.push(CleanupCommand {
        kind: CommandKind::Replace,
        section,
        text: format!(
            "# manual review: {holder} uses {}; {} there means device-group {device_group}'s own object",
            plan.source.name, plan.copy.name
        ),
        description: format!("add {} to {holder}", plan.copy.name),
        manual_review: true,
    });
    plan.notes.push(format!(
        "device-group {device_group} defines its own {}; {holder} was left unchanged",
        plan.copy.name
    ));
}
