use std::collections::BTreeMap;

use serde_json::{json, Value};

use super::RuleBook;
use crate::error::{MatchError, SchemaError};
use crate::pattern::{escape_and_globify, GlobPattern};
use crate::types::{AclRuleDef, RuleMode, Violation};

pub const ACL_VIOLATION: &str = "ACL_VIOLATION";

/// An access-control record supplied by the scanner collaborator: a typed,
/// id'd resource plus its named ACL fields (entity, email, domain, role,
/// and so on). Fields a record does not carry compare as empty strings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AclRecord {
    pub resource_type: String,
    pub resource_id: String,
    pub fields: BTreeMap<String, String>,
}

impl AclRecord {
    #[must_use]
    pub fn new(resource_type: impl Into<String>, resource_id: impl Into<String>) -> Self {
        Self {
            resource_type: resource_type.into(),
            resource_id: resource_id.into(),
            fields: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.insert(name.into(), value.into());
        self
    }
}

/// One field-pattern rule: a glob per named field, compiled at load time.
#[derive(Debug, Clone)]
pub struct AclRule {
    name: String,
    index: usize,
    mode: RuleMode,
    fields: Vec<(String, GlobPattern)>,
}

impl AclRule {
    fn from_definition(definition: &Value, index: usize) -> Result<Self, SchemaError> {
        let def: AclRuleDef =
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
        if !matches!(mode, RuleMode::Whitelist | RuleMode::Blacklist) {
            return Err(SchemaError::InvalidRule {
                index,
                reason: format!("mode '{mode}' is not supported for field-pattern rules"),
            });
        }
        if def.fields.is_empty() {
            return Err(SchemaError::InvalidRule {
                index,
                reason: "fields must not be empty".into(),
            });
        }
        let mut fields = Vec::with_capacity(def.fields.len());
        for (field, glob) in def.fields {
            let pattern = escape_and_globify(&glob).map_err(|err| SchemaError::InvalidRule {
                index,
                reason: format!("pattern '{glob}' for field '{field}': {err}"),
            })?;
            fields.push((field, pattern));
        }
        Ok(Self {
            name: def.name,
            index,
            mode,
            fields,
        })
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn mode(&self) -> RuleMode {
        self.mode
    }

    /// Whether every field pattern accepts the record. Bare-`*` patterns
    /// accept without evaluating the regex.
    fn matches(&self, record: &AclRecord) -> bool {
        self.fields.iter().all(|(field, pattern)| {
            if pattern.matches_any() {
                return true;
            }
            let value = record
                .fields
                .get(field)
                .map(String::as_str)
                .unwrap_or_default();
            pattern.is_match(value)
        })
    }

    fn find_violations(&self, records: &[AclRecord], violations: &mut Vec<Violation>) {
        for record in records {
            let flagged = match self.mode {
                RuleMode::Blacklist => self.matches(record),
                _ => !self.matches(record),
            };
            if flagged {
                violations.push(Violation {
                    resource_id: record.resource_id.clone(),
                    resource_type: record.resource_type.clone(),
                    rule_name: self.name.clone(),
                    rule_index: self.index,
                    violation_type: ACL_VIOLATION.to_owned(),
                    violation_data: json!({
                        "mode": self.mode.as_str(),
                        "fields": record.fields,
                    }),
                });
            }
        }
    }
}

/// The rule book for field-pattern (ACL) auditing.
#[derive(Debug, Clone)]
pub struct AclRuleBook {
    rules: Vec<AclRule>,
}

impl AclRuleBook {
    #[must_use]
    pub fn rules(&self) -> &[AclRule] {
        &self.rules
    }
}

impl RuleBook for AclRuleBook {
    type Record = AclRecord;

    fn from_definitions(definitions: &[Value]) -> Result<Self, SchemaError> {
        let mut rules = Vec::with_capacity(definitions.len());
        for (index, definition) in definitions.iter().enumerate() {
            rules.push(AclRule::from_definition(definition, index)?);
        }
        Ok(Self { rules })
    }

    fn find_violations(&self, records: &[AclRecord]) -> Result<Vec<Violation>, MatchError> {
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
