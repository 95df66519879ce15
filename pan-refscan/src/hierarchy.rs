//! Store-wide view of address-group nesting.
//!
//! A group's children are the members that resolve, from the group's scope,
//! to another group. Root groups are those no other group has as a child.
//! Depth counts nesting levels below a group: a group without group members
//! has depth 0. Loops are followed once and reported separately.
//!
//! The same pass lists cross-scope references: names a rule or group uses
//! that nothing visible from its scope defines, while some device group
//! does. Device-group inheritance is not modeled, so a device group using an
//! ancestor's object shows up here too.

use std::collections::{BTreeMap, BTreeSet, HashSet};

use serde::Serialize;
use tracing::instrument;

use crate::analysis::AnalysisError;
use crate::cancel::CancelToken;
use crate::model::{AddressGroup, ObjectKey, RuleField, Scope};
use crate::resolver::{CycleDiagnostic, Resolver, SourceType};
use crate::store::EntityStore;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GroupNode {
    pub name: String,
    pub scope: Scope,
    /// Member groups, in member order.
    pub children: Vec<ObjectKey>,
    pub depth: usize,
    /// No other group contains this one.
    pub root: bool,
}

/// A use of a name only some other device group defines.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct CrossScopeReference {
    pub name: String,
    pub holder: String,
    pub holder_type: SourceType,
    pub scope: Scope,
    /// Rule field holding the name; `None` for group members.
    pub field: Option<RuleField>,
    /// Device groups defining the name.
    pub defined_in: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HierarchyReport {
    pub groups: Vec<GroupNode>,
    pub roots: Vec<ObjectKey>,
    pub max_depth: usize,
    pub cycles: Vec<CycleDiagnostic>,
    pub cross_scope: Vec<CrossScopeReference>,
}

/// Nesting, root groups, loops and cross-scope references for the whole store.
#[instrument(skip_all)]
pub fn group_hierarchy(
    store: &EntityStore,
    cancel: &CancelToken,
) -> Result<HierarchyReport, AnalysisError> {
    let children: BTreeMap<ObjectKey, Vec<ObjectKey>> = store
        .groups()
        .map(|group| (group.key(), child_groups(store, group)))
        .collect();
    let nested: BTreeSet<&ObjectKey> = children.values().flatten().collect();

    cancel.check()?;
    let depths = nesting_depths(&children);
    let groups: Vec<GroupNode> = children
        .iter()
        .map(|(key, kids)| GroupNode {
            name: key.name.clone(),
            scope: key.scope.clone(),
            children: kids.clone(),
            depth: depths.get(key).copied().unwrap_or(0),
            root: !nested.contains(key),
        })
        .collect();
    let roots: Vec<ObjectKey> = children
        .keys()
        .filter(|key| !nested.contains(key))
        .cloned()
        .collect();
    let max_depth = depths.values().copied().max().unwrap_or(0);

    cancel.check()?;
    let cycles = Resolver::new(store).find_cycles(children.keys().cloned());

    cancel.check()?;
    let cross_scope = cross_scope_references(store);

    tracing::info!(
        groups = groups.len(),
        roots = roots.len(),
        max_depth,
        cycles = cycles.len(),
        cross_scope = cross_scope.len(),
        "group hierarchy complete"
    );
    Ok(HierarchyReport {
        groups,
        roots,
        max_depth,
        cycles,
        cross_scope,
    })
}

/// Rule and group uses of names defined only in other device groups.
pub fn cross_scope_references(store: &EntityStore) -> Vec<CrossScopeReference> {
    let mut found = BTreeSet::new();

    for group in store.groups() {
        for member in &group.members {
            if let Some(defined_in) = defined_elsewhere(store, member, &group.scope) {
                found.insert(CrossScopeReference {
                    name: member.clone(),
                    holder: group.name.clone(),
                    holder_type: SourceType::AddressGroup,
                    scope: group.scope.clone(),
                    field: None,
                    defined_in,
                });
            }
        }
    }

    for (value, references) in store.rule_reference_index() {
        for reference in references {
            if reference.field.address_context().is_none() {
                continue;
            }
            if let Some(defined_in) = defined_elsewhere(store, value, &reference.rule.scope) {
                found.insert(CrossScopeReference {
                    name: value.to_string(),
                    holder: reference.rule.name.clone(),
                    holder_type: reference.rule.kind.into(),
                    scope: reference.rule.scope.clone(),
                    field: Some(reference.field),
                    defined_in,
                });
            }
        }
    }

    found.into_iter().collect()
}

/// Device groups defining `name`, when nothing visible from `from` does.
fn defined_elsewhere(store: &EntityStore, name: &str, from: &Scope) -> Option<Vec<String>> {
    if store.resolve_scope(name, from).is_some() {
        return None;
    }
    let scopes: BTreeSet<&str> = store
        .addresses_named(name)
        .iter()
        .map(|object| &object.scope)
        .chain(store.groups_named(name).iter().map(|group| &group.scope))
        .filter_map(Scope::device_group_name)
        .collect();
    if scopes.is_empty() {
        return None;
    }
    Some(scopes.into_iter().map(str::to_string).collect())
}

fn child_groups(store: &EntityStore, group: &AddressGroup) -> Vec<ObjectKey> {
    let mut children: Vec<ObjectKey> = Vec::new();
    for member in &group.members {
        let Some(scope) = store.resolve_scope(member, &group.scope) else {
            continue;
        };
        if let Some(child) = store.group(member, &scope) {
            let key = child.key();
            if !children.contains(&key) {
                children.push(key);
            }
        }
    }
    children
}

/// Longest chain of nested groups below each group, walked iteratively.
/// An edge back into the current path adds nothing.
fn nesting_depths(children: &BTreeMap<ObjectKey, Vec<ObjectKey>>) -> BTreeMap<ObjectKey, usize> {
    let mut depths: BTreeMap<ObjectKey, usize> = BTreeMap::new();
    let mut on_path: HashSet<&ObjectKey> = HashSet::new();

    for start in children.keys() {
        if depths.contains_key(start) {
            continue;
        }
        on_path.insert(start);
        let mut stack: Vec<(&ObjectKey, usize)> = vec![(start, 0)];

        while let Some((node, next)) = stack.last_mut() {
            let node: &ObjectKey = *node;
            let kids = children.get(node).map_or(&[][..], Vec::as_slice);
            if let Some(child) = kids.get(*next) {
                *next += 1;
                if !depths.contains_key(child) && on_path.insert(child) {
                    stack.push((child, 0));
                }
                continue;
            }
            let depth = kids
                .iter()
                .filter_map(|child| depths.get(child))
                .map(|depth| depth + 1)
                .max()
                .unwrap_or(0);
            depths.insert(node.clone(), depth);
            on_path.remove(node);
            stack.pop();
        }
    }
    depths
}
