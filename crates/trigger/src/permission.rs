//! Permission gate deciding whether the session user may fire the webhook.

use std::collections::BTreeSet;

use crate::{UserId, WebhookConfig};

/// Who may trigger the webhook.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PermissionRule {
    Everyone,
    /// Only the listed users.
    SpecificUsers(BTreeSet<UserId>),
    /// Only the creator of the base.
    CreatorOnly,
    /// Only users currently collaborating on the base.
    CollaboratorsOnly,
}

impl PermissionRule {
    /// Short lower-case tag used in logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Everyone => "everyone",
            Self::SpecificUsers(_) => "specific_users",
            Self::CreatorOnly => "creator_only",
            Self::CollaboratorsOnly => "collaborators_only",
        }
    }
}

/// Returns `true` iff `current_user` satisfies `rule`.
///
/// Pure function of its inputs. An anonymous session (`current_user` is
/// `None`) only passes [`PermissionRule::Everyone`].
pub fn can_trigger(
    rule: &PermissionRule,
    current_user: Option<&UserId>,
    collaborators: &[UserId],
    creator: Option<&UserId>,
) -> bool {
    if let PermissionRule::Everyone = rule {
        return true;
    }
    let Some(user) = current_user else {
        return false;
    };
    match rule {
        PermissionRule::Everyone => true,
        PermissionRule::SpecificUsers(allowed) => allowed.contains(user),
        PermissionRule::CreatorOnly => creator == Some(user),
        PermissionRule::CollaboratorsOnly => collaborators.contains(user),
    }
}

/// A [`PermissionRule`] combined with the target-URL requirement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PermissionPolicy {
    pub rule: PermissionRule,
    /// When set, triggering is refused while no webhook target is configured.
    pub requires_target: bool,
}

impl PermissionPolicy {
    pub fn new(rule: PermissionRule) -> Self {
        Self {
            rule,
            requires_target: true,
        }
    }

    /// Evaluates the rule and, if required, the presence of a target URL.
    pub fn allows(
        &self,
        config: &WebhookConfig,
        current_user: Option<&UserId>,
        collaborators: &[UserId],
        creator: Option<&UserId>,
    ) -> bool {
        if self.requires_target && !config.has_target() {
            return false;
        }
        can_trigger(&self.rule, current_user, collaborators, creator)
    }
}

impl Default for PermissionPolicy {
    fn default() -> Self {
        Self::new(PermissionRule::Everyone)
    }
}
