//! Request-scoped entitlement.
//!
//! A `CapabilityContext` can only be built from a `VerifiedIdentity`, which the HTTP layer
//! produces after authenticating the trusted proxy. Tool arguments never reach this module.

use crate::traits::{ToolSpec, ToolTier};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriptionTier {
    Free,
    Pro,
}

impl SubscriptionTier {
    /// Anything other than `PRO` is treated as free.
    pub fn parse(raw: &str) -> Self {
        if raw.trim().eq_ignore_ascii_case("pro") {
            Self::Pro
        } else {
            Self::Free
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriptionStatus {
    None,
    Active,
    Trialing,
    PastDue,
    Canceled,
}

impl SubscriptionStatus {
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_uppercase().as_str() {
            "ACTIVE" => Self::Active,
            "TRIALING" => Self::Trialing,
            "PAST_DUE" => Self::PastDue,
            "CANCELED" | "CANCELLED" => Self::Canceled,
            _ => Self::None,
        }
    }
}

/// Identity claims already verified by the trusted collaborator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedIdentity {
    pub user_id: String,
    pub tier: SubscriptionTier,
    pub status: SubscriptionStatus,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapabilityContext {
    user_id: String,
    is_pro: bool,
}

impl CapabilityContext {
    pub fn from_verified(identity: &VerifiedIdentity) -> Self {
        let is_pro = identity.tier == SubscriptionTier::Pro
            && matches!(
                identity.status,
                SubscriptionStatus::Active | SubscriptionStatus::Trialing
            );
        Self {
            user_id: identity.user_id.clone(),
            is_pro,
        }
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn is_pro(&self) -> bool {
        self.is_pro
    }
}

pub struct CapabilityGate;

impl CapabilityGate {
    pub fn is_available(spec: &ToolSpec, ctx: &CapabilityContext) -> bool {
        match spec.tier {
            ToolTier::Base => true,
            ToolTier::Pro => ctx.is_pro(),
        }
    }
}

#[cfg(test)]
pub(crate) fn test_context(is_pro: bool) -> CapabilityContext {
    CapabilityContext::from_verified(&VerifiedIdentity {
        user_id: "user-1".to_string(),
        tier: if is_pro {
            SubscriptionTier::Pro
        } else {
            SubscriptionTier::Free
        },
        status: SubscriptionStatus::Active,
    })
}
