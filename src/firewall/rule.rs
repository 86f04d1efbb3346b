use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use super::action::{ActionKind, FirewallAction, PortRule};
use super::FirewallError;
use crate::error::MatchError;
use crate::net::ips_in_list;

const DEFAULT_PRIORITY: i64 = 1000;

/// A firewall policy record in API field shape, as written in rule files
/// and as fetched from the inventory.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default, rename_all = "camelCase")]
pub struct FirewallRuleDef {
    pub name: Option<String>,
    pub project_id: Option<String>,
    pub full_name: Option<String>,
    pub network: Option<String>,
    pub priority: Option<i64>,
    pub direction: Option<String>,
    pub source_ranges: Vec<String>,
    pub destination_ranges: Vec<String>,
    pub source_tags: Vec<String>,
    pub target_tags: Vec<String>,
    pub source_service_accounts: Vec<String>,
    pub target_service_accounts: Vec<String>,
    pub allowed: Option<Vec<PortRule>>,
    pub denied: Option<Vec<PortRule>>,
}

/// A firewall policy with its action, scope fields, and comparison
/// operations.
///
/// Read-only after construction. The ordering operations answer "is this
/// policy already covered by that one": [`is_subset_of()`](Self::is_subset_of)
/// means every connection this rule describes is also described by the
/// other.
#[derive(Debug, Clone)]
pub struct FirewallRule {
    name: Option<String>,
    project_id: Option<String>,
    full_name: Option<String>,
    network: Option<String>,
    priority: Option<i64>,
    direction: Option<String>,
    source_ranges: Vec<String>,
    destination_ranges: Vec<String>,
    source_tags: BTreeSet<String>,
    target_tags: BTreeSet<String>,
    source_service_accounts: BTreeSet<String>,
    target_service_accounts: BTreeSet<String>,
    action: FirewallAction,
}

impl PartialEq for FirewallRule {
    /// Exact comparison of the fields that define a policy's behavior:
    /// direction, network, tags, ranges, and the raw action. Identity
    /// fields (name, project, priority) are deliberately left out, so two
    /// differently-named rules describing the same policy compare equal.
    fn eq(&self, other: &Self) -> bool {
        self.direction == other.direction
            && self.network == other.network
            && self.source_tags == other.source_tags
            && self.target_tags == other.target_tags
            && self.source_ranges == other.source_ranges
            && self.destination_ranges == other.destination_ranges
            && self.action == other.action
    }
}

impl FirewallRule {
    /// Build a rule from its API-shaped definition.
    ///
    /// # Errors
    ///
    /// Returns [`FirewallError`] if both allowed and denied rules are
    /// present, or neither is.
    pub fn from_def(def: FirewallRuleDef) -> Result<Self, FirewallError> {
        let allowed_present = def.allowed.as_ref().is_some_and(|rules| !rules.is_empty());
        let denied_present = def.denied.as_ref().is_some_and(|rules| !rules.is_empty());
        if allowed_present && denied_present {
            return Err(FirewallError::AllowedAndDenied);
        }
        if def.allowed.is_none() && def.denied.is_none() {
            return Err(FirewallError::MissingAction);
        }
        let action = if allowed_present {
            FirewallAction::new(ActionKind::Allow, def.allowed.unwrap_or_default())
        } else {
            FirewallAction::new(ActionKind::Deny, def.denied.unwrap_or_default())
        };
        Ok(Self {
            name: def.name,
            project_id: def.project_id,
            full_name: def.full_name,
            network: def.network,
            priority: def.priority,
            direction: def.direction.map(|direction| direction.to_uppercase()),
            source_ranges: sorted_unique(def.source_ranges),
            destination_ranges: sorted_unique(def.destination_ranges),
            source_tags: def.source_tags.into_iter().collect(),
            target_tags: def.target_tags.into_iter().collect(),
            source_service_accounts: def.source_service_accounts.into_iter().collect(),
            target_service_accounts: def.target_service_accounts.into_iter().collect(),
            action,
        })
    }

    /// Build a rule from a raw inventory record.
    ///
    /// # Errors
    ///
    /// Returns [`FirewallError`] if the record does not deserialize to the
    /// API shape or fails the allow-xor-deny check.
    pub fn from_value(value: &serde_json::Value) -> Result<Self, FirewallError> {
        let def: FirewallRuleDef = serde_json::from_value(value.clone()).map_err(|err| {
            FirewallError::Malformed {
                reason: err.to_string(),
            }
        })?;
        Self::from_def(def)
    }

    #[must_use]
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    #[must_use]
    pub fn project_id(&self) -> Option<&str> {
        self.project_id.as_deref()
    }

    #[must_use]
    pub fn network(&self) -> Option<&str> {
        self.network.as_deref()
    }

    #[must_use]
    pub fn direction(&self) -> Option<&str> {
        self.direction.as_deref()
    }

    /// The effective priority; the API default is 1000 when unset.
    #[must_use]
    pub fn priority(&self) -> i64 {
        self.priority.unwrap_or(DEFAULT_PRIORITY)
    }

    #[must_use]
    pub fn source_ranges(&self) -> &[String] {
        &self.source_ranges
    }

    #[must_use]
    pub fn destination_ranges(&self) -> &[String] {
        &self.destination_ranges
    }

    #[must_use]
    pub fn source_tags(&self) -> &BTreeSet<String> {
        &self.source_tags
    }

    #[must_use]
    pub fn target_tags(&self) -> &BTreeSet<String> {
        &self.target_tags
    }

    #[must_use]
    pub fn action(&self) -> &FirewallAction {
        &self.action
    }

    /// Whether this policy is permitted by (covered by) `other`: same
    /// direction and network where both are set, tags and action covered,
    /// and every source/destination range contained in one of `other`'s.
    ///
    /// # Errors
    ///
    /// Returns [`MatchError`] if a range or port in either rule fails to
    /// parse.
    pub fn is_subset_of(&self, other: &FirewallRule) -> Result<bool, MatchError> {
        let direction_ok = self.direction.is_none()
            || other.direction.is_none()
            || self.direction == other.direction;
        // Asymmetric on purpose: a rule with no network can only be
        // covered by a rule that is also network-agnostic.
        let network_ok = other.network.is_none() || self.network == other.network;
        let source_tags_ok =
            other.source_tags.is_empty() || self.source_tags.is_subset(&other.source_tags);
        let target_tags_ok =
            other.target_tags.is_empty() || self.target_tags.is_subset(&other.target_tags);
        if !(direction_ok && network_ok && source_tags_ok && target_tags_ok) {
            return Ok(false);
        }
        Ok(self.action.is_subset_of(&other.action)?
            && ips_in_list(&self.source_ranges, &other.source_ranges)?
            && ips_in_list(&self.destination_ranges, &other.destination_ranges)?)
    }

    /// Whether this policy covers `other`. The mirror of
    /// [`is_subset_of()`](Self::is_subset_of), with network tolerance in
    /// both directions.
    ///
    /// # Errors
    ///
    /// Returns [`MatchError`] if a range or port in either rule fails to
    /// parse.
    pub fn is_superset_of(&self, other: &FirewallRule) -> Result<bool, MatchError> {
        let direction_ok = self.direction.is_none()
            || other.direction.is_none()
            || self.direction == other.direction;
        let network_ok =
            self.network.is_none() || other.network.is_none() || self.network == other.network;
        let source_tags_ok =
            self.source_tags.is_empty() || other.source_tags.is_subset(&self.source_tags);
        let target_tags_ok =
            self.target_tags.is_empty() || other.target_tags.is_subset(&self.target_tags);
        if !(direction_ok && network_ok && source_tags_ok && target_tags_ok) {
            return Ok(false);
        }
        Ok(self.action.is_superset_of(&other.action)?
            && ips_in_list(&other.source_ranges, &self.source_ranges)?
            && ips_in_list(&other.destination_ranges, &self.destination_ranges)?)
    }

    /// Whether two policies describe the same connections: every scope
    /// field equal and the actions equivalent under the all-port
    /// sentinels.
    ///
    /// # Errors
    ///
    /// Returns [`MatchError`] if a port range in either rule fails to
    /// parse.
    pub fn is_equivalent(&self, other: &FirewallRule) -> Result<bool, MatchError> {
        Ok(self.direction == other.direction
            && self.network == other.network
            && self.source_tags == other.source_tags
            && self.target_tags == other.target_tags
            && self.source_ranges == other.source_ranges
            && self.destination_ranges == other.destination_ranges
            && self.action.is_equivalent(&other.action)?)
    }

    /// Validate the rule against the firewall API's shape requirements.
    ///
    /// # Errors
    ///
    /// Returns [`FirewallError`] on the first failed check.
    pub fn validate(&self) -> Result<(), FirewallError> {
        self.validate_keys()?;
        self.validate_direction()?;
        self.validate_priority()?;
        self.action.validate()
    }

    fn validate_keys(&self) -> Result<(), FirewallError> {
        let name = self
            .name
            .as_deref()
            .ok_or(FirewallError::MissingField { field: "name" })?;
        if self.network.is_none() {
            return Err(FirewallError::MissingField { field: "network" });
        }
        if name.len() > 63 {
            return Err(FirewallError::NameTooLong {
                name: name.to_owned(),
            });
        }

        let capped: [(&str, usize); 4] = [
            ("sourceRanges", self.source_ranges.len()),
            ("sourceTags", self.source_tags.len()),
            ("targetTags", self.target_tags.len()),
            ("destinationRanges", self.destination_ranges.len()),
        ];
        for (field, len) in capped {
            if len > 256 {
                return Err(FirewallError::TooManyValues { field });
            }
        }

        let has_service_accounts =
            !self.source_service_accounts.is_empty() || !self.target_service_accounts.is_empty();
        if !self.source_tags.is_empty() && has_service_accounts {
            return Err(FirewallError::TagsWithServiceAccounts {
                field: "sourceTags",
            });
        }
        if !self.target_tags.is_empty() && has_service_accounts {
            return Err(FirewallError::TagsWithServiceAccounts {
                field: "targetTags",
            });
        }

        if self.source_service_accounts.len() > 1 {
            return Err(FirewallError::TooManyServiceAccounts {
                field: "sourceServiceAccount",
            });
        }
        if self.target_service_accounts.len() > 1 {
            return Err(FirewallError::TooManyServiceAccounts {
                field: "targetServiceAccount",
            });
        }
        Ok(())
    }

    fn validate_direction(&self) -> Result<(), FirewallError> {
        match self.direction.as_deref() {
            Some("INGRESS") => {
                if self.source_ranges.is_empty()
                    && self.source_tags.is_empty()
                    && self.source_service_accounts.is_empty()
                {
                    return Err(FirewallError::MissingIngressSource);
                }
                if !self.destination_ranges.is_empty() {
                    return Err(FirewallError::IngressWithDestinationRanges);
                }
                Ok(())
            }
            Some("EGRESS") => {
                if self.destination_ranges.is_empty() {
                    return Err(FirewallError::MissingEgressDestinationRanges);
                }
                if !self.source_ranges.is_empty()
                    || !self.source_tags.is_empty()
                    || !self.source_service_accounts.is_empty()
                {
                    return Err(FirewallError::EgressWithSources);
                }
                Ok(())
            }
            _ => Err(FirewallError::InvalidDirection),
        }
    }

    fn validate_priority(&self) -> Result<(), FirewallError> {
        if let Some(priority) = self.priority {
            if !(0..=65535).contains(&priority) {
                return Err(FirewallError::PriorityOutOfRange { priority });
            }
        }
        Ok(())
    }
}

impl fmt::Display for FirewallRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "FirewallRule(name={}, network={}, direction={}, action={})",
            self.name.as_deref().unwrap_or("-"),
            self.network.as_deref().unwrap_or("-"),
            self.direction.as_deref().unwrap_or("-"),
            self.action,
        )
    }
}

fn sorted_unique(values: Vec<String>) -> Vec<String> {
    let set: BTreeSet<String> = values.into_iter().collect();
    set.into_iter().collect()
}
