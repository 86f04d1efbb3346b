use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::firewall::FirewallRuleDef;

/// How a rule treats the records it applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RuleMode {
    /// Flag anything NOT matching an allowed pattern or tree node.
    Whitelist,
    /// Flag anything that DOES match a forbidden pattern.
    Blacklist,
    /// After scanning all records, flag every required entity never seen.
    Required,
    /// Flag unless the full record set corresponds exactly to the rule's
    /// golden set.
    Matches,
}

impl RuleMode {
    pub const ALL: [RuleMode; 4] = [
        RuleMode::Whitelist,
        RuleMode::Blacklist,
        RuleMode::Required,
        RuleMode::Matches,
    ];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            RuleMode::Whitelist => "whitelist",
            RuleMode::Blacklist => "blacklist",
            RuleMode::Required => "required",
            RuleMode::Matches => "matches",
        }
    }
}

impl fmt::Display for RuleMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for RuleMode {
    type Err = ();

    /// Case-insensitive; rule files write modes in assorted casings.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lowered = s.to_ascii_lowercase();
        RuleMode::ALL
            .into_iter()
            .find(|mode| mode.as_str() == lowered)
            .ok_or(())
    }
}

/// One node of a rule's resource tree, as written in the rules file.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ResourceTreeNodeDef {
    #[serde(rename = "type")]
    pub resource_type: String,
    pub resource_id: String,
    #[serde(default)]
    pub children: Vec<ResourceTreeNodeDef>,
}

/// Definition shape for one resource-hierarchy rule.
#[derive(Debug, Clone, Deserialize)]
pub struct ResourceRuleDef {
    pub name: String,
    #[serde(default)]
    pub mode: Option<String>,
    pub resource_types: Vec<String>,
    #[serde(default)]
    pub resource_trees: Vec<ResourceTreeNodeDef>,
}

/// Definition shape for one firewall policy rule.
#[derive(Debug, Clone, Deserialize)]
pub struct FirewallPolicyRuleDef {
    pub rule_id: String,
    pub mode: String,
    #[serde(default)]
    pub match_policies: Vec<FirewallRuleDef>,
    #[serde(default)]
    pub verify_policies: Vec<FirewallRuleDef>,
    #[serde(default = "default_exact_match")]
    pub exact_match: bool,
}

fn default_exact_match() -> bool {
    true
}

/// Definition shape for one field-pattern (ACL) rule.
#[derive(Debug, Clone, Deserialize)]
pub struct AclRuleDef {
    pub name: String,
    pub mode: String,
    pub fields: BTreeMap<String, String>,
}
