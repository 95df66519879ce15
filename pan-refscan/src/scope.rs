//! Placement of the canonical object after consolidation.
//!
//! The decision is greedy and per target. Rules are checked in order and the
//! first that applies wins:
//!
//! 1. the target is already shared: keep it shared;
//! 2. the redundant peers are used in more than one device group: promote to
//!    shared;
//! 3. the peers are used in exactly one device group, but not the target's:
//!    promote to shared;
//! 4. otherwise keep the target where it is.

use std::collections::BTreeSet;
use std::fmt::{self, Display, Formatter};

use serde::Serialize;

use crate::model::Scope;
use crate::redundancy::PeerUsage;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "rule", rename_all = "kebab-case")]
pub enum ScopeReason {
    AlreadyShared,
    SpansDeviceGroups { device_groups: Vec<String> },
    OutsideTargetDeviceGroup { target: String, affected: String },
    KeepCurrent,
}

impl Display for ScopeReason {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            ScopeReason::AlreadyShared => write!(f, "target is already in shared scope"),
            ScopeReason::SpansDeviceGroups { device_groups } => write!(
                f,
                "redundant objects are used in {} device groups ({})",
                device_groups.len(),
                device_groups.join(", ")
            ),
            ScopeReason::OutsideTargetDeviceGroup { target, affected } => write!(
                f,
                "redundant objects are used in device group {affected}, target lives in {target}"
            ),
            ScopeReason::KeepCurrent => write!(f, "all usage stays within the target's scope"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScopeDecision {
    pub scope: Scope,
    pub reason: ScopeReason,
    /// Device groups touched by any peer's usage.
    pub affected: Vec<String>,
    /// Whether the canonical object must be created in shared scope.
    pub promoted: bool,
}

/// Decide the canonical scope for a target given its peers' usage.
pub fn decide(target: &Scope, usages: &[PeerUsage]) -> ScopeDecision {
    let affected: BTreeSet<String> = usages
        .iter()
        .flat_map(|usage| usage.device_groups.iter().cloned())
        .collect();
    let affected: Vec<String> = affected.into_iter().collect();

    let (scope, reason) = match (target, affected.as_slice()) {
        (Scope::Shared, _) => (Scope::Shared, ScopeReason::AlreadyShared),
        (_, groups) if groups.len() > 1 => (
            Scope::Shared,
            ScopeReason::SpansDeviceGroups {
                device_groups: groups.to_vec(),
            },
        ),
        (Scope::DeviceGroup(own), [only]) if own != only => (
            Scope::Shared,
            ScopeReason::OutsideTargetDeviceGroup {
                target: own.clone(),
                affected: only.clone(),
            },
        ),
        (current, _) => (current.clone(), ScopeReason::KeepCurrent),
    };

    let promoted = scope != *target;
    tracing::debug!(%scope, %reason, promoted, "scope decided");
    ScopeDecision {
        scope,
        reason,
        affected,
        promoted,
    }
}
