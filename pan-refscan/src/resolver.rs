//! Reference resolution: who uses an object, directly or through groups.
//!
//! ## Matching
//!
//! A rule references a name only when one of its field values is exactly that
//! name (whole-token match), so `web1` never matches `web10`. The field the
//! value sits under decides the reference context; a value seen before any
//! field keyword is reported with context `unknown`.
//!
//! Lookups come in two flavours. By name ([`Resolver::find_direct`] and
//! friends) every use of the name counts, including uses of names nothing
//! defines. By object ([`Resolver::direct_to`] and friends) a use counts only
//! when the name resolves to that definition from the scope of the rule or
//! group holding it, so a device group's own `web` hides the shared one.
//! Groups reached through nesting are always matched by object.
//!
//! ## Nesting
//!
//! Group containment is walked breadth-first with an explicit worklist and a
//! per-call visited set, so every container is reported once at its shortest
//! chain depth. Loops are then looked for on the containment graph itself
//! with an iterative depth-first walk; each loop is reported once.

use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};

use serde::Serialize;

use crate::model::{AddressGroup, FieldContext, ObjectKey, RuleField, RuleKey, RuleKind, Scope};
use crate::store::EntityStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ReferenceKind {
    Direct,
    Indirect,
    Membership,
}

/// Type of the entity holding a reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum SourceType {
    SecurityRule,
    NatRule,
    AddressGroup,
}

impl From<RuleKind> for SourceType {
    fn from(kind: RuleKind) -> Self {
        match kind {
            RuleKind::Security => SourceType::SecurityRule,
            RuleKind::Nat => SourceType::NatRule,
        }
    }
}

/// One usage of an object.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct ReferenceEdge {
    /// Name of the referenced object.
    pub object: String,
    pub kind: ReferenceKind,
    /// Name of the rule or group holding the reference.
    pub source: String,
    pub source_type: SourceType,
    /// Scope of the holding rule or group.
    pub scope: Scope,
    pub context: FieldContext,
    /// Rule field the value was found under; `None` for group memberships.
    pub field: Option<RuleField>,
    /// Group the rule actually names, for indirect references.
    pub via: Option<String>,
    /// Containment depth of `via` below the object; 0 for direct references.
    pub depth: usize,
    pub position: usize,
}

impl ReferenceEdge {
    pub fn device_group(&self) -> Option<&str> {
        self.scope.device_group_name()
    }

    /// Key of the holding rule, when the source is a rule.
    pub fn rule_key(&self) -> Option<RuleKey> {
        let kind = match self.source_type {
            SourceType::SecurityRule => RuleKind::Security,
            SourceType::NatRule => RuleKind::Nat,
            SourceType::AddressGroup => return None,
        };
        Some(RuleKey {
            kind,
            scope: self.scope.clone(),
            name: self.source.clone(),
        })
    }
}

/// A group that contains the target, possibly through other groups.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ContainerGroup {
    pub name: String,
    pub scope: Scope,
    /// 1 for groups naming the target directly.
    pub depth: usize,
    /// Member through which this group contains the target.
    pub via: String,
}

impl ContainerGroup {
    pub fn key(&self) -> ObjectKey {
        ObjectKey {
            scope: self.scope.clone(),
            name: self.name.clone(),
        }
    }
}

/// A containment loop.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CycleDiagnostic {
    /// Group whose membership closes the loop.
    pub group: String,
    /// Groups on the loop, starting and ending with `group`.
    pub cycle: Vec<String>,
}

impl CycleDiagnostic {
    pub fn message(&self) -> String {
        format!(
            "address-group '{}' contains itself through {}",
            self.group,
            self.cycle.join(" -> ")
        )
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct GroupTraversal {
    /// Containers in breadth-first order.
    pub containers: Vec<ContainerGroup>,
    pub cycles: Vec<CycleDiagnostic>,
}

/// Read-only queries over an [`EntityStore`].
#[derive(Debug, Clone, Copy)]
pub struct Resolver<'s> {
    store: &'s EntityStore,
}

impl<'s> Resolver<'s> {
    pub fn new(store: &'s EntityStore) -> Self {
        Self { store }
    }

    /// Rules whose source, destination, service or NAT translation fields
    /// name `target`.
    pub fn find_direct(&self, target: &str) -> Vec<ReferenceEdge> {
        self.rule_edges(target, None)
    }

    /// [`Resolver::find_direct`] restricted to uses resolving to `object`.
    pub fn direct_to(&self, object: &ObjectKey) -> Vec<ReferenceEdge> {
        self.rule_edges(&object.name, Some(&object.scope))
    }

    /// Names of groups whose static member list names `target`.
    pub fn find_containing_groups(&self, target: &str) -> Vec<String> {
        let names: BTreeSet<&str> = self
            .store
            .groups_containing(target)
            .map(|key| key.name.as_str())
            .collect();
        names.into_iter().map(str::to_string).collect()
    }

    /// [`Resolver::find_containing_groups`] as membership edges, one per
    /// group definition.
    pub fn memberships(&self, target: &str) -> Vec<ReferenceEdge> {
        self.membership_edges(target, None)
    }

    /// Membership edges of groups whose member resolves to `object`.
    pub fn memberships_of(&self, object: &ObjectKey) -> Vec<ReferenceEdge> {
        self.membership_edges(&object.name, Some(&object.scope))
    }

    /// Every group containing `target` at any depth, plus containment loops.
    pub fn find_nested_groups(&self, target: &str) -> GroupTraversal {
        self.traverse(target, None)
    }

    /// [`Resolver::find_nested_groups`] starting from one definition.
    pub fn nested_groups_of(&self, object: &ObjectKey) -> GroupTraversal {
        self.traverse(&object.name, Some(&object.scope))
    }

    /// Rules naming any group that contains `target`, excluding rules that
    /// already reference `target` directly.
    pub fn find_indirect(&self, target: &str) -> Vec<ReferenceEdge> {
        let direct = rule_names(&self.find_direct(target));
        self.indirect_excluding(target, &self.find_nested_groups(target), &direct)
    }

    /// [`Resolver::find_indirect`] starting from one definition.
    pub fn indirect_to(&self, object: &ObjectKey) -> Vec<ReferenceEdge> {
        let direct = rule_names(&self.direct_to(object));
        self.indirect_excluding(&object.name, &self.nested_groups_of(object), &direct)
    }

    /// [`Resolver::find_indirect`] over a traversal the caller already has.
    pub fn indirect_excluding(
        &self,
        target: &str,
        traversal: &GroupTraversal,
        direct_rules: &BTreeSet<String>,
    ) -> Vec<ReferenceEdge> {
        let mut edges = Vec::new();
        for container in &traversal.containers {
            for mut edge in self.rule_edges(&container.name, Some(&container.scope)) {
                if direct_rules.contains(&edge.source) {
                    continue;
                }
                edge.object = target.to_string();
                edge.kind = ReferenceKind::Indirect;
                edge.via = Some(container.name.clone());
                edge.depth = container.depth;
                edges.push(edge);
            }
        }
        edges.sort();
        edges.dedup();
        edges
    }

    /// Whether any rule or group names `name`.
    pub fn is_referenced(&self, name: &str) -> bool {
        self.store.groups_containing(name).next().is_some()
            || !self.store.rule_references(name).is_empty()
    }

    /// Groups whose member list names `member` and resolves to it.
    pub fn holders(&self, member: &ObjectKey) -> Vec<ObjectKey> {
        self.holders_of(&member.name, Some(&member.scope))
    }

    /// Containment loops reachable from `roots`, following "is contained in"
    /// edges. Each loop is reported once, whichever group it was entered at.
    pub fn find_cycles<I>(&self, roots: I) -> Vec<CycleDiagnostic>
    where
        I: IntoIterator<Item = ObjectKey>,
    {
        struct Frame {
            node: ObjectKey,
            holders: Vec<ObjectKey>,
            next: usize,
        }

        let mut cycles = Vec::new();
        let mut seen: BTreeSet<Vec<ObjectKey>> = BTreeSet::new();
        let mut finished: HashSet<ObjectKey> = HashSet::new();
        // group -> its index on the current walk
        let mut on_stack: HashMap<ObjectKey, usize> = HashMap::new();

        for root in roots {
            if finished.contains(&root) || on_stack.contains_key(&root) {
                continue;
            }
            on_stack.insert(root.clone(), 0);
            let mut stack = vec![Frame {
                holders: self.holders(&root),
                node: root,
                next: 0,
            }];

            while let Some(frame) = stack.last_mut() {
                let Some(holder) = frame.holders.get(frame.next).cloned() else {
                    if let Some(done) = stack.pop() {
                        on_stack.remove(&done.node);
                        finished.insert(done.node);
                    }
                    continue;
                };
                frame.next += 1;

                if let Some(&start) = on_stack.get(&holder) {
                    let ring: Vec<ObjectKey> =
                        stack[start..].iter().map(|frame| frame.node.clone()).collect();
                    if seen.insert(canonical_ring(&ring)) {
                        let mut cycle: Vec<String> = ring.into_iter().map(|key| key.name).collect();
                        cycle.push(holder.name.clone());
                        let diagnostic = CycleDiagnostic {
                            group: holder.name,
                            cycle,
                        };
                        tracing::warn!("{}", diagnostic.message());
                        cycles.push(diagnostic);
                    }
                } else if !finished.contains(&holder) {
                    on_stack.insert(holder.clone(), stack.len());
                    stack.push(Frame {
                        holders: self.holders(&holder),
                        node: holder,
                        next: 0,
                    });
                }
            }
        }
        cycles
    }

    fn traverse(&self, name: &str, scope: Option<&Scope>) -> GroupTraversal {
        let mut traversal = GroupTraversal::default();
        // The subject itself, when it is a group, is never its own container.
        let subjects: Vec<ObjectKey> = self
            .store
            .groups_named(name)
            .iter()
            .filter(|group| scope.map_or(true, |scope| group.scope == *scope))
            .map(AddressGroup::key)
            .collect();
        let mut reached: HashSet<ObjectKey> = subjects.iter().cloned().collect();

        // (member, groups holding it, depth of those groups)
        let mut worklist: VecDeque<(String, Vec<ObjectKey>, usize)> =
            VecDeque::from([(name.to_string(), self.holders_of(name, scope), 1)]);
        while let Some((via, holders, depth)) = worklist.pop_front() {
            for holder in holders {
                if !reached.insert(holder.clone()) {
                    continue;
                }
                worklist.push_back((holder.name.clone(), self.holders(&holder), depth + 1));
                traversal.containers.push(ContainerGroup {
                    name: holder.name,
                    scope: holder.scope,
                    depth,
                    via: via.clone(),
                });
            }
        }

        let roots = subjects
            .into_iter()
            .chain(traversal.containers.iter().map(ContainerGroup::key));
        traversal.cycles = self.find_cycles(roots);
        traversal
    }

    /// Whether a use of `name` held in `holder` counts for the subject.
    fn accepts(&self, name: &str, scope: Option<&Scope>, holder: &Scope) -> bool {
        match scope {
            None => true,
            Some(scope) => self.store.resolve_scope(name, holder).as_ref() == Some(scope),
        }
    }

    fn holders_of(&self, name: &str, scope: Option<&Scope>) -> Vec<ObjectKey> {
        self.store
            .groups_containing(name)
            .filter(|holder| self.accepts(name, scope, &holder.scope))
            .cloned()
            .collect()
    }

    fn membership_edges(&self, name: &str, scope: Option<&Scope>) -> Vec<ReferenceEdge> {
        self.holders_of(name, scope)
            .iter()
            .filter_map(|key| self.store.group(&key.name, &key.scope))
            .map(|group| ReferenceEdge {
                object: name.to_string(),
                kind: ReferenceKind::Membership,
                source: group.name.clone(),
                source_type: SourceType::AddressGroup,
                scope: group.scope.clone(),
                context: FieldContext::Unknown,
                field: None,
                via: None,
                depth: 1,
                position: group.position,
            })
            .collect()
    }

    fn rule_edges(&self, name: &str, scope: Option<&Scope>) -> Vec<ReferenceEdge> {
        self.store
            .rule_references(name)
            .iter()
            .filter(|reference| self.accepts(name, scope, &reference.rule.scope))
            .filter_map(|reference| {
                let context = reference.field.address_context()?;
                Some(ReferenceEdge {
                    object: name.to_string(),
                    kind: ReferenceKind::Direct,
                    source: reference.rule.name.clone(),
                    source_type: reference.rule.kind.into(),
                    scope: reference.rule.scope.clone(),
                    context,
                    field: Some(reference.field),
                    via: None,
                    depth: 0,
                    position: reference.position,
                })
            })
            .collect()
    }
}

fn rule_names(edges: &[ReferenceEdge]) -> BTreeSet<String> {
    edges.iter().map(|edge| edge.source.clone()).collect()
}

/// Loop members rotated to start at the smallest key.
fn canonical_ring(ring: &[ObjectKey]) -> Vec<ObjectKey> {
    let start = ring
        .iter()
        .enumerate()
        .min_by(|a, b| a.1.cmp(b.1))
        .map_or(0, |(index, _)| index);
    ring[start..].iter().chain(&ring[..start]).cloned().collect()
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use pretty_assertions::assert_eq;

    use super::{ReferenceKind, Resolver};
    use crate::model::{FieldContext, ObjectKey, RuleField, Scope};
    use crate::store::tests::store_from;

    #[test]
    fn end_to_end_web_example() {
        let store = store_from(
            "set shared address-group web static [ a b ]\n\
             set device-group DG1 security rules \"R1\" source a\n",
        );
        let resolver = Resolver::new(&store);

        let direct = resolver.find_direct("a");
        assert_eq!(direct.len(), 1);
        assert_eq!(direct[0].source, "R1");
        assert_eq!(direct[0].context, FieldContext::Source);
        assert_eq!(direct[0].device_group(), Some("DG1"));
        assert_eq!(resolver.find_containing_groups("a"), vec!["web"]);
        assert!(resolver.find_indirect("a").is_empty());
    }

    #[test]
    fn whole_token_matching_ignores_prefixes() {
        let store = store_from(
            "set shared security rules R1 source web10\n\
             set shared address-group g static [ web10 ]\n",
        );
        let resolver = Resolver::new(&store);
        assert!(resolver.find_direct("web1").is_empty());
        assert!(resolver.find_containing_groups("web1").is_empty());
        assert_eq!(resolver.find_direct("web10").len(), 1);
    }

    #[test]
    fn chain_yields_edges_via_each_container_with_depth() {
        let store = store_from(
            "set shared address-group B static [ A ]\n\
             set shared address-group C static [ B ]\n\
             set shared security rules R source B\n\
             set shared security rules R destination C\n",
        );
        let resolver = Resolver::new(&store);
        let indirect = resolver.find_indirect("A");

        let via: Vec<(String, Option<String>, usize, FieldContext)> = indirect
            .iter()
            .map(|edge| (edge.source.clone(), edge.via.clone(), edge.depth, edge.context))
            .collect();
        assert_eq!(
            via,
            vec![
                ("R".to_string(), Some("B".to_string()), 1, FieldContext::Source),
                ("R".to_string(), Some("C".to_string()), 2, FieldContext::Destination),
            ]
        );
        assert!(indirect.iter().all(|edge| edge.kind == ReferenceKind::Indirect));
        assert!(indirect.iter().all(|edge| edge.object == "A"));
    }

    #[test]
    fn direct_rules_are_not_repeated_as_indirect() {
        let store = store_from(
            "set shared address-group G static [ a ]\n\
             set shared security rules R1 source a\n\
             set shared security rules R1 destination G\n\
             set shared security rules R2 destination G\n",
        );
        let resolver = Resolver::new(&store);
        let direct: BTreeSet<String> =
            resolver.find_direct("a").into_iter().map(|e| e.source).collect();
        let indirect: BTreeSet<String> =
            resolver.find_indirect("a").into_iter().map(|e| e.source).collect();
        assert_eq!(direct, BTreeSet::from(["R1".to_string()]));
        assert_eq!(indirect, BTreeSet::from(["R2".to_string()]));
        assert!(direct.is_disjoint(&indirect));
    }

    #[test]
    fn cyclic_groups_terminate_with_one_diagnostic() {
        let store = store_from(
            "set shared address-group A static [ x B ]\n\
             set shared address-group B static [ A ]\n",
        );
        let resolver = Resolver::new(&store);

        let traversal = resolver.find_nested_groups("x");
        assert_eq!(traversal.cycles.len(), 1);
        assert_eq!(traversal.cycles[0].cycle, vec!["A", "B", "A"]);
        let names: Vec<&str> = traversal.containers.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["A", "B"]);

        let from_group = resolver.find_nested_groups("A");
        assert_eq!(from_group.cycles.len(), 1);
    }

    #[test]
    fn loop_between_two_holders_of_the_target_is_reported() {
        let store = store_from(
            "set shared address-group A static [ x B ]\n\
             set shared address-group B static [ x A ]\n",
        );
        let traversal = Resolver::new(&store).find_nested_groups("x");
        let names: Vec<&str> = traversal.containers.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["A", "B"]);
        assert!(traversal.containers.iter().all(|c| c.depth == 1));
        assert_eq!(traversal.cycles.len(), 1);
        assert_eq!(traversal.cycles[0].cycle, vec!["A", "B", "A"]);
    }

    #[test]
    fn store_wide_cycles_are_reported_once_per_loop() {
        let store = store_from(
            "set shared address-group A static [ B ]\n\
             set shared address-group B static [ C ]\n\
             set shared address-group C static [ A ]\n\
             set shared address-group D static [ A ]\n",
        );
        let resolver = Resolver::new(&store);
        let roots = store.groups().map(|group| group.key());
        let cycles = resolver.find_cycles(roots);
        assert_eq!(cycles.len(), 1);
        assert_eq!(cycles[0].cycle.len(), 4);
        assert_eq!(cycles[0].cycle.first(), cycles[0].cycle.last());
    }

    #[test]
    fn self_containing_group_is_a_cycle() {
        let store = store_from("set shared address-group loop static [ loop h ]\n");
        let traversal = Resolver::new(&store).find_nested_groups("h");
        assert_eq!(traversal.cycles.len(), 1);
        assert_eq!(traversal.cycles[0].cycle, vec!["loop", "loop"]);
    }

    #[test]
    fn diamond_containment_is_not_a_cycle() {
        let store = store_from(
            "set shared address-group L static [ a ]\n\
             set shared address-group R static [ a ]\n\
             set shared address-group top static [ L R ]\n",
        );
        let traversal = Resolver::new(&store).find_nested_groups("a");
        assert!(traversal.cycles.is_empty());
        let top = traversal
            .containers
            .iter()
            .find(|c| c.name == "top")
            .expect("top");
        assert_eq!(top.depth, 2);
    }

    #[test]
    fn nat_translation_and_unscoped_values_are_classified() {
        let store = store_from(
            "set shared nat rules N1 destination-translation translated-address srv\n\
             set shared security rules R9 srv\n",
        );
        let direct = Resolver::new(&store).find_direct("srv");
        let fields: Vec<(Option<RuleField>, FieldContext)> =
            direct.iter().map(|e| (e.field, e.context)).collect();
        assert_eq!(
            fields,
            vec![
                (Some(RuleField::Unscoped), FieldContext::Unknown),
                (Some(RuleField::DestinationTranslation), FieldContext::Destination),
            ]
        );
    }

    #[test]
    fn device_group_definition_hides_shared_object_of_same_name() {
        let store = store_from(
            "set shared address web ip-netmask 10.0.0.1\n\
             set device-group DG3 address web ip-netmask 10.9.9.9\n\
             set device-group DG3 pre-rulebase security rules R3 destination web\n\
             set device-group DG3 address-group local static [ web ]\n\
             set device-group DG3 pre-rulebase security rules R4 source local\n\
             set device-group DG2 pre-rulebase security rules R2 destination web\n\
             set shared address-group wide static [ web ]\n",
        );
        let resolver = Resolver::new(&store);
        let shared = ObjectKey {
            scope: Scope::Shared,
            name: "web".to_string(),
        };
        let local = ObjectKey {
            scope: Scope::device_group("DG3"),
            name: "web".to_string(),
        };

        let sources = |edges: Vec<super::ReferenceEdge>| -> Vec<String> {
            edges.into_iter().map(|edge| edge.source).collect()
        };
        assert_eq!(sources(resolver.direct_to(&shared)), vec!["R2"]);
        assert_eq!(sources(resolver.direct_to(&local)), vec!["R3"]);
        assert_eq!(sources(resolver.memberships_of(&shared)), vec!["wide"]);
        assert_eq!(sources(resolver.memberships_of(&local)), vec!["local"]);
        assert!(resolver.indirect_to(&shared).is_empty());
        assert_eq!(sources(resolver.indirect_to(&local)), vec!["R4"]);

        assert_eq!(resolver.find_direct("web").len(), 2);
        assert_eq!(resolver.memberships("web").len(), 2);
    }

    #[test]
    fn undefined_names_are_only_found_by_name() {
        let store = store_from("set device-group DG1 security rules R1 source ghost\n");
        let resolver = Resolver::new(&store);
        assert!(resolver.is_referenced("ghost"));
        assert_eq!(resolver.find_direct("ghost").len(), 1);
        let key = ObjectKey {
            scope: Scope::Shared,
            name: "ghost".to_string(),
        };
        assert!(resolver.direct_to(&key).is_empty());
    }
}
