//! Per-target analysis and the store-wide redundancy pass.
//!
//! Every list in a [`TargetReport`] is sorted so that two runs over the same
//! input render identically, whatever order the workers finished in.

use std::collections::BTreeSet;

use rayon::prelude::*;
use serde::Serialize;
use thiserror::Error;
use tracing::instrument;

use crate::cancel::{CancelToken, Canceled};
use crate::cleanup::{synthesize, CleanupPlan};
use crate::model::{AddressObject, AddressValue, ObjectKey, Scope};
use crate::redundancy::{IpKey, PeerUsage, RedundancyDetector};
use crate::resolver::{CycleDiagnostic, ReferenceEdge, Resolver};
use crate::scope::{decide, ScopeDecision};
use crate::store::EntityStore;

#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error(transparent)]
    Canceled(#[from] Canceled),
}

#[derive(Debug, Clone, Copy, Default)]
pub struct AnalysisOptions {
    /// Attach a cleanup plan to every defined target.
    pub with_cleanup: bool,
}

/// A group containing the target, one entry per group definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GroupMembership {
    pub name: String,
    pub scope: Scope,
    pub definition: String,
    pub depth: usize,
    pub via: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RedundantAddress {
    pub name: String,
    pub scope: Scope,
    pub value: Option<AddressValue>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TargetReport {
    pub target: String,
    /// Whether any address object carries the target's name. References to
    /// undefined names are still reported.
    pub defined: bool,
    pub definitions: Vec<AddressObject>,
    pub device_groups: Vec<String>,
    pub direct_rules: Vec<ReferenceEdge>,
    pub indirect_rules: Vec<ReferenceEdge>,
    pub address_groups: Vec<GroupMembership>,
    pub cycles: Vec<CycleDiagnostic>,
    pub redundant: Vec<RedundantAddress>,
    pub scope_decision: Option<ScopeDecision>,
    pub cleanup: Option<CleanupPlan>,
}

impl TargetReport {
    pub fn is_referenced(&self) -> bool {
        !self.direct_rules.is_empty()
            || !self.indirect_rules.is_empty()
            || !self.address_groups.is_empty()
    }
}

/// Resolve every reference to `target` and, when it is defined, its
/// redundant peers and their consolidation.
#[instrument(skip_all, fields(object = target))]
pub fn analyze_target(
    store: &EntityStore,
    target: &str,
    options: &AnalysisOptions,
    cancel: &CancelToken,
) -> Result<TargetReport, AnalysisError> {
    let resolver = Resolver::new(store);
    let definitions: Vec<AddressObject> = {
        let mut defs = store.addresses_named(target).to_vec();
        defs.sort_by(|a, b| a.scope.cmp(&b.scope));
        defs
    };

    cancel.check()?;
    let mut direct_rules = resolver.find_direct(target);
    direct_rules.sort();
    let direct_names: BTreeSet<String> =
        direct_rules.iter().map(|edge| edge.source.clone()).collect();

    cancel.check()?;
    let traversal = resolver.find_nested_groups(target);
    let indirect_rules = resolver.indirect_excluding(target, &traversal, &direct_names);

    let mut address_groups: Vec<GroupMembership> = traversal
        .containers
        .iter()
        .map(|container| GroupMembership {
            name: container.name.clone(),
            scope: container.scope.clone(),
            definition: store
                .group(&container.name, &container.scope)
                .map(|group| group.definition())
                .unwrap_or_default(),
            depth: container.depth,
            via: container.via.clone(),
        })
        .collect();
    address_groups.sort_by(|a, b| (&a.name, &a.scope).cmp(&(&b.name, &b.scope)));

    let mut cycles = traversal.cycles.clone();
    cycles.sort_by(|a, b| a.cycle.cmp(&b.cycle));

    let device_groups: BTreeSet<String> = definitions
        .iter()
        .map(|def| &def.scope)
        .chain(direct_rules.iter().map(|edge| &edge.scope))
        .chain(indirect_rules.iter().map(|edge| &edge.scope))
        .chain(address_groups.iter().map(|group| &group.scope))
        .filter_map(Scope::device_group_name)
        .map(str::to_string)
        .collect();

    cancel.check()?;
    let detector = RedundancyDetector::new(store);
    let peers = detector.find_redundant(target);
    let redundant: Vec<RedundantAddress> = peers
        .iter()
        .map(|peer| RedundantAddress {
            name: peer.name.clone(),
            scope: peer.scope.clone(),
            value: peer.value.clone(),
        })
        .collect();

    // Shared sorts first, so a shared definition is the one placed.
    let target_def = definitions.first();
    let mut scope_decision = None;
    let mut cleanup = None;
    if let Some(def) = target_def {
        let usages: Vec<PeerUsage> = peers.iter().map(|peer| detector.usage(peer)).collect();
        cancel.check()?;
        let decision = decide(&def.scope, &usages);
        if options.with_cleanup {
            cleanup = Some(synthesize(store, target, Some(def), &decision, &usages));
        }
        scope_decision = Some(decision);
    }

    tracing::info!(
        object = target,
        direct = direct_rules.len(),
        indirect = indirect_rules.len(),
        groups = address_groups.len(),
        redundant = redundant.len(),
        "target analyzed"
    );

    Ok(TargetReport {
        target: target.to_string(),
        defined: !definitions.is_empty(),
        definitions,
        device_groups: device_groups.into_iter().collect(),
        direct_rules,
        indirect_rules,
        address_groups,
        cycles,
        redundant,
        scope_decision,
        cleanup,
    })
}

/// Analyze independent targets concurrently; reports keep input order.
pub fn analyze_targets(
    store: &EntityStore,
    targets: &[String],
    options: &AnalysisOptions,
    cancel: &CancelToken,
) -> Result<Vec<TargetReport>, AnalysisError> {
    targets
        .par_iter()
        .map(|target| analyze_target(store, target, options, cancel))
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClassMember {
    pub name: String,
    pub scope: Scope,
    pub value: Option<AddressValue>,
    pub referenced: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClassReport {
    pub key: IpKey,
    pub members: Vec<ClassMember>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RedundancyReport {
    pub classes: Vec<ClassReport>,
    /// Addresses no rule or group names.
    pub unused: Vec<ObjectKey>,
}

impl RedundancyReport {
    pub fn redundant_objects(&self) -> usize {
        self.classes
            .iter()
            .map(|class| class.members.len().saturating_sub(1))
            .sum()
    }
}

/// Every redundancy class in the store plus the unreferenced addresses.
#[instrument(skip_all)]
pub fn redundancy_report(
    store: &EntityStore,
    cancel: &CancelToken,
) -> Result<RedundancyReport, AnalysisError> {
    let resolver = Resolver::new(store);
    let classes = RedundancyDetector::new(store)
        .classes()
        .into_par_iter()
        .map(|class| {
            cancel.check()?;
            let members = class
                .members
                .iter()
                .filter_map(|key| store.address_by_key(key))
                .map(|object| ClassMember {
                    name: object.name.clone(),
                    scope: object.scope.clone(),
                    value: object.value.clone(),
                    referenced: resolver.is_referenced(&object.name),
                })
                .collect();
            Ok(ClassReport {
                key: class.key,
                members,
            })
        })
        .collect::<Result<Vec<_>, AnalysisError>>()?;

    cancel.check()?;
    let unused = unused_addresses(store);
    tracing::info!(
        classes = classes.len(),
        unused = unused.len(),
        "redundancy pass complete"
    );
    Ok(RedundancyReport { classes, unused })
}

/// Address definitions whose name no rule or group references.
pub fn unused_addresses(store: &EntityStore) -> Vec<ObjectKey> {
    let resolver = Resolver::new(store);
    let mut unused: Vec<ObjectKey> = store
        .addresses()
        .filter(|object| !resolver.is_referenced(&object.name))
        .map(AddressObject::key)
        .collect();
    unused.sort();
    unused
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::{analyze_target, analyze_targets, redundancy_report, unused_addresses, AnalysisOptions};
    use crate::cancel::CancelToken;
    use crate::model::{ObjectKey, Scope};
    use crate::store::tests::store_from;

    const CONFIG: &str = "set shared address web ip-netmask 10.0.0.1/32\n\
        set device-group DG1 address web-dup ip-netmask 10.0.0.1\n\
        set device-group DG2 address lonely ip-netmask 10.9.9.9\n\
        set shared address-group frontends static [ web ]\n\
        set shared address-group all static [ frontends ]\n\
        set device-group DG1 pre-rulebase security rules allow-web destination web\n\
        set device-group DG2 pre-rulebase security rules allow-all source all\n\
        set device-group DG1 pre-rulebase security rules legacy source web-dup\n";

    #[test]
    fn report_collects_every_category() {
        let store = store_from(CONFIG);
        let report = analyze_target(
            &store,
            "web",
            &AnalysisOptions { with_cleanup: true },
            &CancelToken::new(),
        )
        .expect("analysis");

        assert!(report.defined);
        assert_eq!(report.definitions.len(), 1);
        assert_eq!(report.direct_rules.len(), 1);
        assert_eq!(report.direct_rules[0].source, "allow-web");
        assert_eq!(report.indirect_rules.len(), 1);
        assert_eq!(report.indirect_rules[0].via.as_deref(), Some("all"));
        assert_eq!(report.indirect_rules[0].depth, 2);
        let groups: Vec<(&str, usize)> = report
            .address_groups
            .iter()
            .map(|group| (group.name.as_str(), group.depth))
            .collect();
        assert_eq!(groups, vec![("all", 2), ("frontends", 1)]);
        assert_eq!(report.device_groups, vec!["DG1", "DG2"]);
        assert_eq!(report.redundant.len(), 1);
        assert_eq!(report.redundant[0].name, "web-dup");

        let decision = report.scope_decision.as_ref().expect("decision");
        assert_eq!(decision.scope, Scope::Shared);
        let plan = report.cleanup.as_ref().expect("cleanup plan");
        assert!(plan
            .commands
            .iter()
            .any(|command| command.text == "delete device-group DG1 address web-dup"));
    }

    #[test]
    fn undefined_target_still_reports_references() {
        let store = store_from("set shared security rules R1 source ghost\n");
        let report = analyze_target(
            &store,
            "ghost",
            &AnalysisOptions::default(),
            &CancelToken::new(),
        )
        .expect("analysis");
        assert!(!report.defined);
        assert_eq!(report.direct_rules.len(), 1);
        assert!(report.scope_decision.is_none());
        assert!(report.cleanup.is_none());
    }

    #[test]
    fn canceled_token_stops_analysis() {
        let store = store_from(CONFIG);
        let cancel = CancelToken::new();
        cancel.cancel();
        let targets = vec!["web".to_string(), "lonely".to_string()];
        let result = analyze_targets(&store, &targets, &AnalysisOptions::default(), &cancel);
        assert!(result.is_err());
    }

    #[test]
    fn multi_target_reports_keep_input_order() {
        let store = store_from(CONFIG);
        let targets = vec!["lonely".to_string(), "web".to_string()];
        let reports = analyze_targets(
            &store,
            &targets,
            &AnalysisOptions::default(),
            &CancelToken::new(),
        )
        .expect("analysis");
        let names: Vec<&str> = reports.iter().map(|r| r.target.as_str()).collect();
        assert_eq!(names, vec!["lonely", "web"]);
        assert!(!reports[0].is_referenced());
    }

    #[test]
    fn redundancy_pass_lists_classes_and_unused() {
        let store = store_from(CONFIG);
        let report = redundancy_report(&store, &CancelToken::new()).expect("report");
        assert_eq!(report.classes.len(), 1);
        assert_eq!(report.classes[0].key.as_str(), "10.0.0.1/32");
        assert!(report.classes[0].members.iter().all(|member| member.referenced));
        assert_eq!(report.redundant_objects(), 1);
        assert_eq!(
            report.unused,
            vec![ObjectKey {
                scope: Scope::device_group("DG2"),
                name: "lonely".to_string()
            }]
        );
        assert_eq!(unused_addresses(&store), report.unused);
    }
}
