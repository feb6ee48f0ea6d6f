// crates/ota-updates-core/src/runtime/selection.rs
// ============================================================================
// Module: OTA Selection Policy
// Description: Pure selection of the update to launch and the loader rule.
// Purpose: Make launch selection pluggable and deterministic.
// Dependencies: crate::core
// ============================================================================

//! ## Overview
//! A [`SelectionPolicy`] is a capability injected into the launcher and the
//! ingestor. Selection is a pure function over candidates: it never mutates
//! state, and identical inputs always pick the same update because ties on
//! commit time are broken by update id.

// ============================================================================
// SECTION: Imports
// ============================================================================

use crate::core::identifiers::RuntimeVersion;
use crate::core::update::ManifestFilters;
use crate::core::update::Update;
use crate::core::update::update_matches_filters;

// ============================================================================
// SECTION: Constraints
// ============================================================================

/// Constraints every candidate must satisfy.
#[derive(Debug, Clone, Copy)]
pub struct SelectionConstraints<'a> {
    /// Runtime version of the running application.
    pub runtime_version: &'a RuntimeVersion,
    /// Manifest filters from the latest manifest response.
    pub filters: &'a ManifestFilters,
}

// ============================================================================
// SECTION: Policy
// ============================================================================

/// Pluggable update selection strategy.
pub trait SelectionPolicy: Send + Sync {
    /// Returns the update to launch, if any candidate is compatible.
    fn select_launchable<'a>(
        &self,
        candidates: &'a [Update],
        constraints: &SelectionConstraints<'_>,
    ) -> Option<&'a Update>;

    /// Returns true when `new_update` should be stored in preference to the
    /// currently launched update.
    fn should_load_new_update(
        &self,
        new_update: &Update,
        launched_update: Option<&Update>,
        constraints: &SelectionConstraints<'_>,
    ) -> bool;
}

/// Selects by runtime version and manifest filters, newest commit first.
#[derive(Debug, Clone, Copy, Default)]
pub struct FilterAwareSelectionPolicy;

impl FilterAwareSelectionPolicy {
    /// Creates the policy.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Returns true when the update targets the running runtime version and
    /// agrees with the filters.
    fn is_compatible(update: &Update, constraints: &SelectionConstraints<'_>) -> bool {
        update.runtime_version == *constraints.runtime_version
            && update_matches_filters(update, constraints.filters)
    }
}

impl SelectionPolicy for FilterAwareSelectionPolicy {
    fn select_launchable<'a>(
        &self,
        candidates: &'a [Update],
        constraints: &SelectionConstraints<'_>,
    ) -> Option<&'a Update> {
        candidates
            .iter()
            .filter(|update| update.is_launchable() && Self::is_compatible(update, constraints))
            .max_by(|left, right| {
                left.commit_time.cmp(&right.commit_time).then_with(|| left.id.cmp(&right.id))
            })
    }

    fn should_load_new_update(
        &self,
        new_update: &Update,
        launched_update: Option<&Update>,
        constraints: &SelectionConstraints<'_>,
    ) -> bool {
        if !Self::is_compatible(new_update, constraints) {
            return false;
        }
        let Some(launched) = launched_update else {
            return true;
        };
        if !update_matches_filters(launched, constraints.filters) {
            return true;
        }
        new_update.commit_time > launched.commit_time
    }
}
