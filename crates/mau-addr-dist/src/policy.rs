//! Per-category strict/relax verification policy.

use crate::{AddrDistFault, HazardClass};

/// Verification profile selecting the default relax flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub enum VerificationProfile {
    /// Every check aborts the run.
    #[default]
    Strict,
    /// Every check logs and continues with last-writer-wins.
    Relaxed,
}

/// Severity policy for each hazard class.
///
/// A strict class turns a failed check into an `Err`; a relaxed class logs the
/// fault and lets the caller continue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
#[allow(clippy::struct_excessive_bools)]
pub struct VerificationPolicy {
    /// Relax configuration errors.
    pub relax_config: bool,
    /// Relax conflicting writes onto rows, buses and deferred slots.
    pub relax_multi_write: bool,
    /// Relax unconsumed or undriven addresses.
    pub relax_consumption: bool,
    /// Relax addresses asserted by predicated-off tables.
    pub relax_predication: bool,
}

impl Default for VerificationPolicy {
    fn default() -> Self {
        Self::STRICT
    }
}

impl VerificationPolicy {
    /// All classes strict.
    pub const STRICT: Self = Self::from_profile(VerificationProfile::Strict);
    /// All classes relaxed.
    pub const RELAXED: Self = Self::from_profile(VerificationProfile::Relaxed);

    /// Builds the policy a profile implies.
    #[must_use]
    pub const fn from_profile(profile: VerificationProfile) -> Self {
        let relax = matches!(profile, VerificationProfile::Relaxed);
        Self {
            relax_config: relax,
            relax_multi_write: relax,
            relax_consumption: relax,
            relax_predication: relax,
        }
    }

    /// Returns a copy with one class relaxed or made strict.
    #[must_use]
    pub const fn with_relaxed(mut self, class: HazardClass, relaxed: bool) -> Self {
        match class {
            HazardClass::Config => self.relax_config = relaxed,
            HazardClass::MultiWrite => self.relax_multi_write = relaxed,
            HazardClass::Consumption => self.relax_consumption = relaxed,
            HazardClass::Predication => self.relax_predication = relaxed,
        }
        self
    }

    /// Returns `true` when failures of `class` only log.
    #[must_use]
    pub const fn is_relaxed(&self, class: HazardClass) -> bool {
        match class {
            HazardClass::Config => self.relax_config,
            HazardClass::MultiWrite => self.relax_multi_write,
            HazardClass::Consumption => self.relax_consumption,
            HazardClass::Predication => self.relax_predication,
        }
    }

    /// Applies the policy to a failed check.
    ///
    /// # Errors
    ///
    /// Returns `fault` unchanged when its class is strict.
    pub fn enforce(&self, fault: AddrDistFault) -> Result<(), AddrDistFault> {
        let class = fault.class();
        if self.is_relaxed(class) {
            tracing::warn!(?class, %fault, "relaxed address-distribution check");
            Ok(())
        } else {
            tracing::error!(?class, %fault, "address-distribution check failed");
            Err(fault)
        }
    }
}
