use std::collections::{BTreeSet, HashSet};

use serde_json::{json, Value};

use super::RuleBook;
use crate::error::{MatchError, SchemaError};
use crate::firewall::FirewallRule;
use crate::types::{FirewallPolicyRuleDef, RuleMode, Violation};

pub const FIREWALL_WHITELIST_VIOLATION: &str = "FIREWALL_WHITELIST_VIOLATION";
pub const FIREWALL_BLACKLIST_VIOLATION: &str = "FIREWALL_BLACKLIST_VIOLATION";
pub const FIREWALL_REQUIRED_VIOLATION: &str = "FIREWALL_REQUIRED_VIOLATION";
pub const FIREWALL_MATCHES_VIOLATION: &str = "FIREWALL_MATCHES_VIOLATION";

/// Checks if the policy is not covered by any of the allowed rules.
///
/// # Errors
///
/// Returns [`MatchError`] if a range or port fails to parse.
pub fn is_whitelist_violation(
    rules: &[FirewallRule],
    policy: &FirewallRule,
) -> Result<bool, MatchError> {
    for rule in rules {
        if policy.is_subset_of(rule)? {
            return Ok(false);
        }
    }
    Ok(true)
}

/// Checks if the policy covers any of the forbidden rules.
///
/// # Errors
///
/// Returns [`MatchError`] if a range or port fails to parse.
pub fn is_blacklist_violation(
    rules: &[FirewallRule],
    policy: &FirewallRule,
) -> Result<bool, MatchError> {
    for rule in rules {
        if policy.is_superset_of(rule)? {
            return Ok(true);
        }
    }
    Ok(false)
}

/// Checks if the rule is absent from the policies: exact equality when
/// `exact_match` is set, sentinel-aware equivalence otherwise.
///
/// # Errors
///
/// Returns [`MatchError`] if a port range fails to parse.
pub fn is_rule_exists_violation(
    rule: &FirewallRule,
    policies: &[FirewallRule],
    exact_match: bool,
) -> Result<bool, MatchError> {
    for policy in policies {
        let found = if exact_match {
            policy == rule
        } else {
            policy.is_equivalent(rule)?
        };
        if found {
            return Ok(false);
        }
    }
    Ok(true)
}

/// One firewall policy rule: its mode, the match policies that select
/// applicable scanned policies, and (for whitelist/blacklist) the verify
/// policies they are checked against.
#[derive(Debug, Clone)]
pub struct FirewallPolicyRule {
    id: String,
    index: usize,
    mode: RuleMode,
    exact_match: bool,
    match_rules: Vec<FirewallRule>,
    verify_rules: Vec<FirewallRule>,
}

impl FirewallPolicyRule {
    fn from_definition(definition: &Value, index: usize) -> Result<Self, SchemaError> {
        let def: FirewallPolicyRuleDef =
            serde_json::from_value(definition.clone()).map_err(|err| SchemaError::InvalidRule {
                index,
                reason: err.to_string(),
            })?;
        let mode = def
            .mode
            .parse::<RuleMode>()
            .map_err(|()| SchemaError::InvalidMode {
                index,
                mode: def.mode.clone(),
            })?;
        match mode {
            RuleMode::Whitelist | RuleMode::Blacklist => {
                if def.match_policies.is_empty() || def.verify_policies.is_empty() {
                    return Err(SchemaError::InvalidRule {
                        index,
                        reason: "whitelist and blacklist rules require match and verify policies"
                            .into(),
                    });
                }
            }
            RuleMode::Required | RuleMode::Matches => {
                if def.match_policies.is_empty() {
                    return Err(SchemaError::InvalidRule {
                        index,
                        reason: "required and matches rules require match policies".into(),
                    });
                }
                if !def.verify_policies.is_empty() {
                    return Err(SchemaError::InvalidRule {
                        index,
                        reason: "required and matches rules cannot have verify policies".into(),
                    });
                }
            }
        }

        // Match policies in required/matches mode describe rules expected
        // to exist verbatim, so they must be valid for the API.
        let validate = matches!(mode, RuleMode::Required | RuleMode::Matches);
        let match_rules = build_rules(&def.match_policies, validate, index)?;
        let verify_rules = build_rules(&def.verify_policies, false, index)?;

        Ok(Self {
            id: def.rule_id,
            index,
            mode,
            exact_match: def.exact_match,
            match_rules,
            verify_rules,
        })
    }

    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    #[must_use]
    pub fn index(&self) -> usize {
        self.index
    }

    #[must_use]
    pub fn mode(&self) -> RuleMode {
        self.mode
    }

    fn find_violations(
        &self,
        policies: &[FirewallRule],
        violations: &mut Vec<Violation>,
    ) -> Result<(), MatchError> {
        match self.mode {
            RuleMode::Matches => self.match_violations(policies, violations),
            RuleMode::Required => self.required_violations(policies, violations),
            RuleMode::Whitelist => self.whitelist_violations(policies, violations),
            RuleMode::Blacklist => self.blacklist_violations(policies, violations),
        }
    }

    /// The policy set must correspond one-to-one to the match set;
    /// anything extra, missing, or changed yields a single violation
    /// carrying the recommended inserts, deletes, and updates.
    fn match_violations(
        &self,
        policies: &[FirewallRule],
        violations: &mut Vec<Violation>,
    ) -> Result<(), MatchError> {
        let mut inserts = BTreeSet::new();
        let mut deletes = BTreeSet::new();
        for (i, rule) in self.match_rules.iter().enumerate() {
            if is_rule_exists_violation(rule, policies, self.exact_match)? {
                inserts.insert(format!("{}: rule {}", self.id, i));
            }
        }
        for policy in policies {
            if is_rule_exists_violation(policy, &self.match_rules, self.exact_match)? {
                deletes.insert(policy.name().unwrap_or_default().to_owned());
            }
        }
        let updates: BTreeSet<String> = inserts.intersection(&deletes).cloned().collect();
        let inserts: Vec<&String> = inserts.difference(&updates).collect();
        let deletes: Vec<&String> = deletes.difference(&updates).collect();

        if !inserts.is_empty() || !deletes.is_empty() || !updates.is_empty() {
            violations.push(self.create_violation(
                &policies.iter().collect::<Vec<_>>(),
                FIREWALL_MATCHES_VIOLATION,
                json!({
                    "INSERT_FIREWALL_RULES": inserts,
                    "DELETE_FIREWALL_RULES": deletes,
                    "UPDATE_FIREWALL_RULES": updates,
                }),
            ));
        }
        Ok(())
    }

    /// Every match policy must exist among the scanned policies.
    fn required_violations(
        &self,
        policies: &[FirewallRule],
        violations: &mut Vec<Violation>,
    ) -> Result<(), MatchError> {
        for (i, rule) in self.match_rules.iter().enumerate() {
            if is_rule_exists_violation(rule, policies, self.exact_match)? {
                violations.push(self.create_violation(
                    &policies.iter().collect::<Vec<_>>(),
                    FIREWALL_REQUIRED_VIOLATION,
                    json!({
                        "INSERT_FIREWALL_RULES": [format!("{}: rule {}", self.id, i)],
                    }),
                ));
            }
        }
        Ok(())
    }

    /// Policies selected by a match policy must be covered by one of the
    /// verify policies.
    fn whitelist_violations(
        &self,
        policies: &[FirewallRule],
        violations: &mut Vec<Violation>,
    ) -> Result<(), MatchError> {
        for policy in policies {
            if !self.applies_to(policy)? {
                continue;
            }
            if is_whitelist_violation(&self.verify_rules, policy)? {
                violations.push(self.create_violation(
                    &[policy],
                    FIREWALL_WHITELIST_VIOLATION,
                    json!({
                        "DELETE_FIREWALL_RULES": [policy.name().unwrap_or_default()],
                    }),
                ));
            }
        }
        Ok(())
    }

    /// Policies selected by a match policy must not cover any verify
    /// policy.
    fn blacklist_violations(
        &self,
        policies: &[FirewallRule],
        violations: &mut Vec<Violation>,
    ) -> Result<(), MatchError> {
        for policy in policies {
            if !self.applies_to(policy)? {
                continue;
            }
            if is_blacklist_violation(&self.verify_rules, policy)? {
                violations.push(self.create_violation(
                    &[policy],
                    FIREWALL_BLACKLIST_VIOLATION,
                    json!({
                        "DELETE_FIREWALL_RULES": [policy.name().unwrap_or_default()],
                    }),
                ));
            }
        }
        Ok(())
    }

    /// A scanned policy is in this rule's scope when it covers one of the
    /// match policies.
    fn applies_to(&self, policy: &FirewallRule) -> Result<bool, MatchError> {
        for rule in &self.match_rules {
            if policy.is_superset_of(rule)? {
                return Ok(true);
            }
        }
        Ok(false)
    }

    fn create_violation(
        &self,
        policies: &[&FirewallRule],
        violation_type: &str,
        recommended_actions: Value,
    ) -> Violation {
        let policy_names: Vec<&str> = policies
            .iter()
            .map(|policy| policy.name().unwrap_or_default())
            .collect();
        Violation {
            resource_id: policies
                .first()
                .and_then(|policy| policy.project_id())
                .unwrap_or_default()
                .to_owned(),
            resource_type: "firewall_rule".to_owned(),
            rule_name: self.id.clone(),
            rule_index: self.index,
            violation_type: violation_type.to_owned(),
            violation_data: json!({
                "policy_names": policy_names,
                "recommended_actions": recommended_actions,
            }),
        }
    }
}

/// The rule book for firewall policy auditing.
#[derive(Debug, Clone)]
pub struct FirewallRuleBook {
    rules: Vec<FirewallPolicyRule>,
}

impl FirewallRuleBook {
    #[must_use]
    pub fn rules(&self) -> &[FirewallPolicyRule] {
        &self.rules
    }
}

impl RuleBook for FirewallRuleBook {
    type Record = FirewallRule;

    fn from_definitions(definitions: &[Value]) -> Result<Self, SchemaError> {
        let mut rules: Vec<FirewallPolicyRule> = Vec::with_capacity(definitions.len());
        let mut seen: HashSet<String> = HashSet::new();
        for (index, definition) in definitions.iter().enumerate() {
            let rule = FirewallPolicyRule::from_definition(definition, index)?;
            if !seen.insert(rule.id.clone()) {
                return Err(SchemaError::DuplicateRuleId { id: rule.id, index });
            }
            rules.push(rule);
        }
        Ok(Self { rules })
    }

    fn find_violations(&self, records: &[FirewallRule]) -> Result<Vec<Violation>, MatchError> {
        let mut violations = Vec::new();
        for rule in &self.rules {
            rule.find_violations(records, &mut violations)?;
        }
        Ok(violations)
    }

    fn rule_count(&self) -> usize {
        self.rules.len()
    }
}

fn build_rules(
    policies: &[crate::firewall::FirewallRuleDef],
    validate: bool,
    index: usize,
) -> Result<Vec<FirewallRule>, SchemaError> {
    let mut rules = Vec::with_capacity(policies.len());
    for policy in policies {
        let rule =
            FirewallRule::from_def(policy.clone()).map_err(|err| SchemaError::InvalidRule {
                index,
                reason: err.to_string(),
            })?;
        if validate {
            rule.validate().map_err(|err| SchemaError::InvalidRule {
                index,
                reason: err.to_string(),
            })?;
        }
        rules.push(rule);
    }
    Ok(rules)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn book(definitions: Value) -> FirewallRuleBook {
        let defs = definitions.as_array().unwrap().clone();
        FirewallRuleBook::from_definitions(&defs).unwrap()
    }

    fn policy(value: Value) -> FirewallRule {
        FirewallRule::from_value(&value).unwrap()
    }

    fn open_ssh_policy(source: &str) -> FirewallRule {
        policy(json!({
            "name": "ssh-in",
            "projectId": "proj-1",
            "network": "default",
            "direction": "ingress",
            "sourceRanges": [source],
            "allowed": [{"IPProtocol": "tcp", "ports": ["22"]}],
        }))
    }

    fn no_open_ingress_rule() -> Value {
        json!({
            "rule_id": "no-open-ingress",
            "mode": "blacklist",
            "match_policies": [{
                "direction": "ingress",
                "allowed": ["*"],
            }],
            "verify_policies": [{
                "sourceRanges": ["0.0.0.0/0"],
                "allowed": ["*"],
            }],
        })
    }

    #[test]
    fn blacklist_flags_open_source_range() {
        let book = book(json!([no_open_ingress_rule()]));
        let violations = book
            .find_violations(&[open_ssh_policy("0.0.0.0/0")])
            .unwrap();
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].violation_type, FIREWALL_BLACKLIST_VIOLATION);
        assert_eq!(violations[0].rule_name, "no-open-ingress");
        assert_eq!(violations[0].resource_id, "proj-1");
        assert_eq!(
            violations[0].violation_data["policy_names"],
            json!(["ssh-in"])
        );
    }

    #[test]
    fn blacklist_passes_narrow_source_range() {
        let book = book(json!([no_open_ingress_rule()]));
        let violations = book.find_violations(&[open_ssh_policy("1.1.1.1")]).unwrap();
        assert!(violations.is_empty());
    }

    #[test]
    fn whitelist_flags_uncovered_policy() {
        let book = book(json!([{
            "rule_id": "only-internal-ssh",
            "mode": "whitelist",
            "match_policies": [{
                "direction": "ingress",
                "allowed": ["*"],
            }],
            "verify_policies": [{
                "direction": "ingress",
                "sourceRanges": ["10.0.0.0/8"],
                "allowed": [{"IPProtocol": "tcp", "ports": ["22"]}],
            }],
        }]));
        let internal = book
            .find_violations(&[open_ssh_policy("10.1.2.3")])
            .unwrap();
        assert!(internal.is_empty());

        let external = book
            .find_violations(&[open_ssh_policy("8.8.8.8")])
            .unwrap();
        assert_eq!(external.len(), 1);
        assert_eq!(external[0].violation_type, FIREWALL_WHITELIST_VIOLATION);
    }

    #[test]
    fn required_flags_missing_rule() {
        let required = json!({
            "rule_id": "must-allow-health-checks",
            "mode": "required",
            "match_policies": [{
                "name": "allow-health-checks",
                "network": "default",
                "direction": "ingress",
                "sourceRanges": ["130.211.0.0/22"],
                "allowed": [{"IPProtocol": "tcp", "ports": ["80"]}],
            }],
        });
        let book = book(json!([required]));

        let present = policy(json!({
            "name": "allow-health-checks",
            "network": "default",
            "direction": "ingress",
            "sourceRanges": ["130.211.0.0/22"],
            "allowed": [{"IPProtocol": "tcp", "ports": ["80"]}],
        }));
        assert!(book.find_violations(&[present]).unwrap().is_empty());

        let violations = book
            .find_violations(&[open_ssh_policy("10.0.0.0/8")])
            .unwrap();
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].violation_type, FIREWALL_REQUIRED_VIOLATION);
        assert_eq!(
            violations[0].violation_data["recommended_actions"]["INSERT_FIREWALL_RULES"],
            json!(["must-allow-health-checks: rule 0"])
        );
    }

    #[test]
    fn matches_mode_reports_inserts_and_deletes() {
        let book = book(json!([{
            "rule_id": "golden-set",
            "mode": "matches",
            "match_policies": [{
                "name": "golden",
                "network": "default",
                "direction": "ingress",
                "sourceRanges": ["10.0.0.0/8"],
                "allowed": [{"IPProtocol": "tcp", "ports": ["443"]}],
            }],
        }]));

        let stray = open_ssh_policy("10.0.0.0/8");
        let violations = book.find_violations(&[stray]).unwrap();
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].violation_type, FIREWALL_MATCHES_VIOLATION);
        let actions = &violations[0].violation_data["recommended_actions"];
        assert_eq!(
            actions["INSERT_FIREWALL_RULES"],
            json!(["golden-set: rule 0"])
        );
        assert_eq!(actions["DELETE_FIREWALL_RULES"], json!(["ssh-in"]));
        assert_eq!(actions["UPDATE_FIREWALL_RULES"], json!([]));
    }

    #[test]
    fn matches_mode_exact_set_is_silent() {
        let golden = json!({
            "name": "golden",
            "network": "default",
            "direction": "ingress",
            "sourceRanges": ["10.0.0.0/8"],
            "allowed": [{"IPProtocol": "tcp", "ports": ["443"]}],
        });
        let book = book(json!([{
            "rule_id": "golden-set",
            "mode": "matches",
            "match_policies": [golden.clone()],
        }]));
        let violations = book.find_violations(&[policy(golden)]).unwrap();
        assert!(violations.is_empty());
    }

    #[test]
    fn duplicate_rule_id_is_rejected() {
        let defs = vec![no_open_ingress_rule(), no_open_ingress_rule()];
        let err = FirewallRuleBook::from_definitions(&defs).unwrap_err();
        assert!(matches!(
            err,
            SchemaError::DuplicateRuleId { index: 1, .. }
        ));
    }

    #[test]
    fn whitelist_requires_verify_policies() {
        let defs = vec![json!({
            "rule_id": "r1",
            "mode": "whitelist",
            "match_policies": [{"allowed": ["*"]}],
        })];
        let err = FirewallRuleBook::from_definitions(&defs).unwrap_err();
        assert!(matches!(err, SchemaError::InvalidRule { index: 0, .. }));
    }

    #[test]
    fn required_forbids_verify_policies() {
        let defs = vec![json!({
            "rule_id": "r1",
            "mode": "required",
            "match_policies": [{"allowed": ["*"]}],
            "verify_policies": [{"allowed": ["*"]}],
        })];
        let err = FirewallRuleBook::from_definitions(&defs).unwrap_err();
        assert!(matches!(err, SchemaError::InvalidRule { index: 0, .. }));
    }

    #[test]
    fn required_match_policies_are_validated() {
        // Missing network, so API validation fails at load time.
        let defs = vec![json!({
            "rule_id": "r1",
            "mode": "required",
            "match_policies": [{
                "name": "incomplete",
                "direction": "ingress",
                "sourceRanges": ["10.0.0.0/8"],
                "allowed": [{"IPProtocol": "tcp", "ports": ["80"]}],
            }],
        })];
        let err = FirewallRuleBook::from_definitions(&defs).unwrap_err();
        assert!(matches!(err, SchemaError::InvalidRule { index: 0, .. }));
    }

    #[test]
    fn unknown_mode_is_rejected() {
        let defs = vec![json!({
            "rule_id": "r1",
            "mode": "greylist",
            "match_policies": [{"allowed": ["*"]}],
        })];
        let err = FirewallRuleBook::from_definitions(&defs).unwrap_err();
        assert!(matches!(err, SchemaError::InvalidMode { index: 0, .. }));
    }

    #[test]
    fn two_rules_flag_in_file_order_without_dedup() {
        let book = book(json!([
            no_open_ingress_rule(),
            {
                "rule_id": "second-blacklist",
                "mode": "blacklist",
                "match_policies": [{"direction": "ingress", "allowed": ["*"]}],
                "verify_policies": [{"sourceRanges": ["0.0.0.0/0"], "allowed": ["*"]}],
            },
        ]));
        let violations = book
            .find_violations(&[open_ssh_policy("0.0.0.0/0")])
            .unwrap();
        assert_eq!(violations.len(), 2);
        assert_eq!(violations[0].rule_name, "no-open-ingress");
        assert_eq!(violations[0].rule_index, 0);
        assert_eq!(violations[1].rule_name, "second-blacklist");
        assert_eq!(violations[1].rule_index, 1);
    }
}
