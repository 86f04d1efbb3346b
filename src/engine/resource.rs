use std::collections::HashSet;

use serde_json::{json, Value};

use super::RuleBook;
use crate::error::{MatchError, SchemaError};
use crate::tree::{NodeId, ResourceTree};
use crate::types::{Resource, ResourceRuleDef, RuleMode, Violation};

pub const RESOURCE_VIOLATION: &str = "RESOURCE_VIOLATION";

/// One resource-hierarchy rule: a set of applicable types and the tree of
/// allowed/required nodes.
#[derive(Debug, Clone)]
pub struct ResourceRule {
    name: String,
    index: usize,
    resource_types: HashSet<String>,
    tree: ResourceTree,
}

impl ResourceRule {
    fn from_definition(definition: &Value, index: usize) -> Result<Self, SchemaError> {
        let def: ResourceRuleDef =
            serde_json::from_value(definition.clone()).map_err(|err| SchemaError::InvalidRule {
                index,
                reason: err.to_string(),
            })?;
        if let Some(mode) = &def.mode {
            // The mode is declarative for this engine (both passes always
            // run), but an unknown mode is still a schema error.
            mode.parse::<RuleMode>()
                .map_err(|()| SchemaError::InvalidMode {
                    index,
                    mode: mode.clone(),
                })?;
        }
        if def.resource_types.is_empty() {
            return Err(SchemaError::InvalidRule {
                index,
                reason: "resource_types must not be empty".into(),
            });
        }
        Ok(Self {
            name: def.name,
            index,
            resource_types: def.resource_types.into_iter().collect(),
            tree: ResourceTree::from_defs(&def.resource_trees),
        })
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn index(&self) -> usize {
        self.index
    }

    /// Run both violation passes for this rule.
    ///
    /// First the per-resource pass: every applicable resource that matches
    /// no tree node is a violation. Then the required-but-missing pass:
    /// every concrete tree node that no resource matched is a violation,
    /// even when zero resources were supplied.
    fn find_violations(&self, resources: &[Resource], violations: &mut Vec<Violation>) {
        let mut matched: HashSet<NodeId> = HashSet::new();
        for resource in resources {
            if !self.resource_types.contains(&resource.resource_type) {
                continue;
            }
            match self
                .tree
                .match_resource(&resource.full_name, &self.resource_types)
            {
                Some(node) => {
                    matched.insert(node);
                }
                None => violations.push(Violation {
                    resource_id: resource.id.clone(),
                    resource_type: resource.resource_type.clone(),
                    rule_name: self.name.clone(),
                    rule_index: self.index,
                    violation_type: RESOURCE_VIOLATION.to_owned(),
                    violation_data: json!({
                        "resource_name": resource.display_name,
                        "full_name": resource.full_name,
                        "resource_data": resource.data.clone().unwrap_or_default(),
                    }),
                }),
            }
        }

        for node in self.tree.concrete_nodes() {
            if !matched.contains(&node) {
                let resource_id = self.tree.resource_id(node);
                violations.push(Violation {
                    resource_id: resource_id.to_owned(),
                    resource_type: self.tree.resource_type(node).unwrap_or_default().to_owned(),
                    rule_name: self.name.clone(),
                    rule_index: self.index,
                    violation_type: RESOURCE_VIOLATION.to_owned(),
                    violation_data: json!({
                        "resource_name": resource_id,
                        "full_name": resource_id,
                        "resource_data": "",
                    }),
                });
            }
        }
    }
}

/// The rule book for resource-hierarchy auditing.
#[derive(Debug, Clone)]
pub struct ResourceRuleBook {
    rules: Vec<ResourceRule>,
}

impl ResourceRuleBook {
    #[must_use]
    pub fn rules(&self) -> &[ResourceRule] {
        &self.rules
    }
}

impl RuleBook for ResourceRuleBook {
    type Record = Resource;

    fn from_definitions(definitions: &[Value]) -> Result<Self, SchemaError> {
        let mut rules = Vec::with_capacity(definitions.len());
        for (index, definition) in definitions.iter().enumerate() {
            rules.push(ResourceRule::from_definition(definition, index)?);
        }
        Ok(Self { rules })
    }

    fn find_violations(&self, records: &[Resource]) -> Result<Vec<Violation>, MatchError> {
        let mut violations = Vec::new();
        for rule in &self.rules {
            rule.find_violations(records, &mut violations);
        }
        Ok(violations)
    }

    fn rule_count(&self) -> usize {
        self.rules.len()
    }
}
