use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::sync::OnceLock;

use serde::{Deserialize, Serialize};

use super::FirewallError;
use crate::error::MatchError;
use crate::net::expand_port_range;

/// Port spellings that all mean "every port" when comparing port sets.
/// `0-65355` is a typo that ships in real rule data; keep it as written.
pub const ALL_PORT_REPRESENTATIONS: [&str; 3] = ["all", "0-65355", "1-65535"];

/// The wildcard port rule matching any protocol and port set.
pub const MATCH_ANY: &str = "*";

/// Whether an action permits or blocks its protocol-port set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionKind {
    Allow,
    Deny,
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ActionKind::Allow => write!(f, "allowed"),
            ActionKind::Deny => write!(f, "denied"),
        }
    }
}

/// One protocol entry of a firewall action, in API shape.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ProtocolPorts {
    #[serde(rename = "IPProtocol")]
    pub protocol: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ports: Option<Vec<String>>,
}

/// One entry of an action's rule list: either a protocol entry or the
/// `"*"` wildcard used by match-policy templates.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(untagged)]
pub enum PortRule {
    Any(String),
    Ports(ProtocolPorts),
}

impl PortRule {
    #[must_use]
    pub fn is_any(&self) -> bool {
        matches!(self, PortRule::Any(token) if token == MATCH_ANY)
    }
}

/// The allow-or-deny protocol-port payload of a firewall rule, independent
/// of its source, direction, and network fields.
///
/// `rules` never changes after construction, so the expensive derived
/// views (`applies_to_all`, `expanded_rules`) are computed once on first
/// use and cached for the object's lifetime.
#[derive(Debug, Clone)]
pub struct FirewallAction {
    kind: ActionKind,
    rules: Vec<PortRule>,
    applies_to_all: OnceLock<bool>,
    expanded_rules: OnceLock<HashMap<String, BTreeSet<String>>>,
}

impl PartialEq for FirewallAction {
    /// Exact comparison of the action kind and raw (sorted) rules; the
    /// sentinel-aware equivalence lives in [`is_equivalent()`](Self::is_equivalent).
    fn eq(&self, other: &Self) -> bool {
        self.kind == other.kind && self.rules == other.rules
    }
}

impl fmt::Display for FirewallAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "FirewallAction(action={}, rules={})",
            self.kind,
            self.rules.len()
        )
    }
}

impl FirewallAction {
    /// Build an action over the given rule list. Rules are normalized:
    /// sorted by protocol, ports sorted numerically by range start, and a
    /// port list containing `all` collapsed to just `all`.
    #[must_use]
    pub fn new(kind: ActionKind, rules: Vec<PortRule>) -> Self {
        Self {
            kind,
            rules: sort_rules(rules),
            applies_to_all: OnceLock::new(),
            expanded_rules: OnceLock::new(),
        }
    }

    #[must_use]
    pub fn kind(&self) -> ActionKind {
        self.kind
    }

    #[must_use]
    pub fn rules(&self) -> &[PortRule] {
        &self.rules
    }

    /// Whether any protocol entry is the literal `all` protocol.
    #[must_use]
    pub fn applies_to_all(&self) -> bool {
        *self.applies_to_all.get_or_init(|| {
            self.rules
                .iter()
                .any(|rule| matches!(rule, PortRule::Ports(entry) if entry.protocol == "all"))
        })
    }

    /// Whether every entry is the `"*"` wildcard. Vacuously true for an
    /// empty rule list.
    #[must_use]
    pub fn any_value(&self) -> bool {
        self.rules.iter().all(PortRule::is_any)
    }

    /// The per-protocol sets of individual ports, ranges expanded. Empty
    /// when the action is the `"*"` wildcard.
    ///
    /// # Errors
    ///
    /// Returns [`MatchError`] if a port range in the rules fails to parse.
    /// Successful expansions are cached; failures are not.
    pub fn expanded_rules(&self) -> Result<&HashMap<String, BTreeSet<String>>, MatchError> {
        if let Some(expanded) = self.expanded_rules.get() {
            return Ok(expanded);
        }
        let computed = self.compute_expanded()?;
        Ok(self.expanded_rules.get_or_init(|| computed))
    }

    fn compute_expanded(&self) -> Result<HashMap<String, BTreeSet<String>>, MatchError> {
        let mut expanded: HashMap<String, BTreeSet<String>> = HashMap::new();
        if self.any_value() {
            return Ok(expanded);
        }
        for rule in &self.rules {
            if let PortRule::Ports(entry) = rule {
                let ports = entry
                    .ports
                    .clone()
                    .unwrap_or_else(|| vec!["all".to_owned()]);
                let set = expanded.entry(entry.protocol.clone()).or_default();
                for port in &ports {
                    // The all-port spellings stay unexpanded so the
                    // sentinel comparisons in ports_are_subset and
                    // ports_are_equal can see them.
                    if ALL_PORT_REPRESENTATIONS.contains(&port.as_str()) {
                        set.insert(port.clone());
                    } else if port.contains('-') {
                        set.extend(expand_port_range(port)?);
                    } else {
                        set.insert(port.clone());
                    }
                }
            }
        }
        Ok(expanded)
    }

    /// Whether `ports_1` is covered by `ports_2`, treating any
    /// [`ALL_PORT_REPRESENTATIONS`] member in `ports_2` as "every port".
    #[must_use]
    pub fn ports_are_subset(ports_1: &BTreeSet<String>, ports_2: &BTreeSet<String>) -> bool {
        if ALL_PORT_REPRESENTATIONS
            .iter()
            .any(|all| ports_2.contains(*all))
        {
            return true;
        }
        ports_1.is_subset(ports_2)
    }

    /// Whether two port sets are the same, treating the all-port sentinels
    /// as equal to each other.
    #[must_use]
    pub fn ports_are_equal(ports_1: &BTreeSet<String>, ports_2: &BTreeSet<String>) -> bool {
        let all_1 = ALL_PORT_REPRESENTATIONS
            .iter()
            .any(|all| ports_1.contains(*all));
        let all_2 = ALL_PORT_REPRESENTATIONS
            .iter()
            .any(|all| ports_2.contains(*all));
        if all_1 && all_2 {
            return true;
        }
        ports_1 == ports_2
    }

    /// Whether this action's protocol-port set is covered by `other`'s.
    ///
    /// # Errors
    ///
    /// Returns [`MatchError`] if either action's port ranges fail to parse.
    pub fn is_subset_of(&self, other: &FirewallAction) -> Result<bool, MatchError> {
        if self.kind != other.kind {
            return Ok(false);
        }
        if self.any_value() || other.any_value() || other.applies_to_all() {
            return Ok(true);
        }
        let other_expanded = other.expanded_rules()?;
        if other_expanded.is_empty() {
            return Ok(true);
        }
        let expanded = self.expanded_rules()?;
        let empty = BTreeSet::new();
        for (protocol, ports) in expanded {
            let other_ports = other_expanded.get(protocol).unwrap_or(&empty);
            if !Self::ports_are_subset(ports, other_ports) {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Whether this action's protocol-port set covers `other`'s.
    ///
    /// # Errors
    ///
    /// Returns [`MatchError`] if either action's port ranges fail to parse.
    pub fn is_superset_of(&self, other: &FirewallAction) -> Result<bool, MatchError> {
        if self.kind != other.kind {
            return Ok(false);
        }
        if self.any_value() || other.any_value() || self.applies_to_all() {
            return Ok(true);
        }
        let expanded = self.expanded_rules()?;
        if expanded.is_empty() {
            return Ok(true);
        }
        let other_expanded = other.expanded_rules()?;
        let empty = BTreeSet::new();
        for (protocol, other_ports) in other_expanded {
            let ports = expanded.get(protocol).unwrap_or(&empty);
            if !Self::ports_are_subset(other_ports, ports) {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Whether two actions are functionally the same: same kind, same
    /// protocols, and per-protocol port sets equal under the all-port
    /// sentinel treatment.
    ///
    /// # Errors
    ///
    /// Returns [`MatchError`] if either action's port ranges fail to parse.
    pub fn is_equivalent(&self, other: &FirewallAction) -> Result<bool, MatchError> {
        if self.kind != other.kind {
            return Ok(false);
        }
        if self.any_value() || other.any_value() {
            return Ok(true);
        }
        let expanded = self.expanded_rules()?;
        let other_expanded = other.expanded_rules()?;
        if expanded.len() != other_expanded.len()
            || !expanded.keys().all(|key| other_expanded.contains_key(key))
        {
            return Ok(false);
        }
        let empty = BTreeSet::new();
        for (protocol, ports) in expanded {
            let other_ports = other_expanded.get(protocol).unwrap_or(&empty);
            if !Self::ports_are_equal(ports, other_ports) {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Validate that the rules are well-formed for the firewall API.
    ///
    /// # Errors
    ///
    /// Returns [`FirewallError`] on the first malformed entry.
    pub fn validate(&self) -> Result<(), FirewallError> {
        for rule in &self.rules {
            match rule {
                PortRule::Any(token) if token == MATCH_ANY => {}
                PortRule::Any(token) => {
                    return Err(FirewallError::InvalidPortRule {
                        value: token.clone(),
                    })
                }
                PortRule::Ports(entry) => {
                    if entry.protocol.is_empty() {
                        return Err(FirewallError::MissingProtocol);
                    }
                    if let Some(ports) = &entry.ports {
                        if entry.protocol != "tcp" && entry.protocol != "udp" {
                            return Err(FirewallError::PortsOnNonTcpUdp {
                                protocol: entry.protocol.clone(),
                            });
                        }
                        for port in ports {
                            if port.contains('-') {
                                validate_port_range(port)?;
                            } else {
                                validate_port(port)?;
                            }
                        }
                    }
                }
            }
        }
        Ok(())
    }
}

/// Normalize a rule list: protocol-sorted, ports numerically sorted by
/// range start, `all` collapsing its port list. A list containing the
/// `"*"` wildcard is left untouched.
fn sort_rules(mut rules: Vec<PortRule>) -> Vec<PortRule> {
    if rules.iter().any(PortRule::is_any) {
        return rules;
    }
    rules.sort_by(|a, b| protocol_of(a).cmp(protocol_of(b)));
    for rule in &mut rules {
        if let PortRule::Ports(entry) = rule {
            if let Some(ports) = &mut entry.ports {
                if ports.iter().any(|port| port == "all") {
                    *ports = vec!["all".to_owned()];
                } else {
                    ports.sort_by_key(|port| {
                        port.split('-')
                            .next()
                            .unwrap_or("")
                            .parse::<u64>()
                            .unwrap_or(u64::MAX)
                    });
                }
            }
        }
    }
    rules
}

fn protocol_of(rule: &PortRule) -> &str {
    match rule {
        PortRule::Ports(entry) => &entry.protocol,
        PortRule::Any(_) => "",
    }
}

/// Check that a string is a valid port number, returning it as an int.
///
/// # Errors
///
/// Returns [`FirewallError`] if the string is not an integer in 0..=65535.
pub fn validate_port(port: &str) -> Result<i64, FirewallError> {
    let number: i64 = port
        .parse()
        .map_err(|_| FirewallError::PortNotAnInt {
            port: port.to_owned(),
        })?;
    if !(0..=65535).contains(&number) {
        return Err(FirewallError::PortOutOfRange { port: number });
    }
    Ok(number)
}

/// Check that a string is a valid `start-end` port range.
///
/// # Errors
///
/// Returns [`FirewallError`] if the range is malformed, either bound is
/// invalid, or start exceeds end.
pub fn validate_port_range(port_range: &str) -> Result<(), FirewallError> {
    let bounds: Vec<&str> = port_range.split('-').collect();
    if bounds.len() != 2 {
        return Err(FirewallError::InvalidPortRange {
            range: port_range.to_owned(),
        });
    }
    let start = validate_port(bounds[0])?;
    let end = validate_port(bounds[1])?;
    if start > end {
        return Err(FirewallError::InvertedPortRange {
            range: port_range.to_owned(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ports_entry(protocol: &str, ports: &[&str]) -> PortRule {
        PortRule::Ports(ProtocolPorts {
            protocol: protocol.to_owned(),
            ports: Some(ports.iter().map(|p| (*p).to_owned()).collect()),
        })
    }

    fn protocol_entry(protocol: &str) -> PortRule {
        PortRule::Ports(ProtocolPorts {
            protocol: protocol.to_owned(),
            ports: None,
        })
    }

    fn port_set(ports: &[&str]) -> BTreeSet<String> {
        ports.iter().map(|p| (*p).to_owned()).collect()
    }

    #[test]
    fn sort_rules_orders_by_protocol_and_port() {
        let action = FirewallAction::new(
            ActionKind::Allow,
            vec![
                ports_entry("udp", &["53"]),
                ports_entry("tcp", &["443", "80", "8080-8081"]),
            ],
        );
        let rules = action.rules();
        assert_eq!(protocol_of(&rules[0]), "tcp");
        assert_eq!(protocol_of(&rules[1]), "udp");
        match &rules[0] {
            PortRule::Ports(entry) => {
                assert_eq!(entry.ports.as_deref().unwrap(), ["80", "443", "8080-8081"]);
            }
            PortRule::Any(_) => panic!("expected ports entry"),
        }
    }

    #[test]
    fn sort_rules_collapses_all_ports() {
        let action = FirewallAction::new(
            ActionKind::Allow,
            vec![ports_entry("tcp", &["22", "all", "80"])],
        );
        match &action.rules()[0] {
            PortRule::Ports(entry) => assert_eq!(entry.ports.as_deref().unwrap(), ["all"]),
            PortRule::Any(_) => panic!("expected ports entry"),
        }
    }

    #[test]
    fn applies_to_all_detects_all_protocol() {
        let all = FirewallAction::new(ActionKind::Allow, vec![protocol_entry("all")]);
        let tcp = FirewallAction::new(ActionKind::Allow, vec![ports_entry("tcp", &["22"])]);
        assert!(all.applies_to_all());
        assert!(!tcp.applies_to_all());
    }

    #[test]
    fn any_value_wildcard() {
        let any = FirewallAction::new(
            ActionKind::Allow,
            vec![PortRule::Any(MATCH_ANY.to_owned())],
        );
        assert!(any.any_value());
        assert!(any.expanded_rules().unwrap().is_empty());
    }

    #[test]
    fn expanded_rules_expands_ranges() {
        let action = FirewallAction::new(
            ActionKind::Allow,
            vec![ports_entry("tcp", &["21-23"]), ports_entry("udp", &["53"])],
        );
        let expanded = action.expanded_rules().unwrap();
        assert_eq!(expanded["tcp"], port_set(&["21", "22", "23"]));
        assert_eq!(expanded["udp"], port_set(&["53"]));
    }

    #[test]
    fn expanded_rules_defaults_missing_ports_to_all() {
        let action = FirewallAction::new(ActionKind::Allow, vec![protocol_entry("icmp")]);
        let expanded = action.expanded_rules().unwrap();
        assert_eq!(expanded["icmp"], port_set(&["all"]));
    }

    #[test]
    fn expanded_rules_keep_all_port_sentinels() {
        let full = FirewallAction::new(ActionKind::Allow, vec![ports_entry("tcp", &["1-65535"])]);
        assert_eq!(full.expanded_rules().unwrap()["tcp"], port_set(&["1-65535"]));

        let narrow = FirewallAction::new(ActionKind::Allow, vec![ports_entry("tcp", &["22"])]);
        assert!(narrow.is_subset_of(&full).unwrap());

        let all = FirewallAction::new(ActionKind::Allow, vec![ports_entry("tcp", &["all"])]);
        assert!(all.is_equivalent(&full).unwrap());
    }

    #[test]
    fn expanded_rules_propagates_bad_range() {
        let action =
            FirewallAction::new(ActionKind::Allow, vec![ports_entry("tcp", &["x-y"])]);
        assert!(action.expanded_rules().is_err());
    }

    #[test]
    fn ports_are_subset_with_all_sentinel() {
        for all in ALL_PORT_REPRESENTATIONS {
            assert!(FirewallAction::ports_are_subset(
                &port_set(&["22"]),
                &port_set(&[all]),
            ));
        }
        assert!(FirewallAction::ports_are_subset(
            &port_set(&["22"]),
            &port_set(&["21", "22", "23"]),
        ));
        assert!(!FirewallAction::ports_are_subset(
            &port_set(&["22"]),
            &port_set(&["80"]),
        ));
    }

    #[test]
    fn ports_are_equal_under_sentinels() {
        assert!(FirewallAction::ports_are_equal(
            &port_set(&["all"]),
            &port_set(&["1-65535"]),
        ));
        assert!(FirewallAction::ports_are_equal(
            &port_set(&["0-65355"]),
            &port_set(&["all"]),
        ));
        assert!(!FirewallAction::ports_are_equal(
            &port_set(&["all"]),
            &port_set(&["22"]),
        ));
        assert!(FirewallAction::ports_are_equal(
            &port_set(&["22"]),
            &port_set(&["22"]),
        ));
    }

    #[test]
    fn subset_across_kinds_is_false() {
        let allow = FirewallAction::new(ActionKind::Allow, vec![ports_entry("tcp", &["22"])]);
        let deny = FirewallAction::new(ActionKind::Deny, vec![ports_entry("tcp", &["22"])]);
        assert!(!allow.is_subset_of(&deny).unwrap());
        assert!(!allow.is_equivalent(&deny).unwrap());
    }

    #[test]
    fn subset_of_wider_range() {
        let narrow = FirewallAction::new(ActionKind::Allow, vec![ports_entry("tcp", &["22"])]);
        let wide = FirewallAction::new(ActionKind::Allow, vec![ports_entry("tcp", &["21-23"])]);
        assert!(narrow.is_subset_of(&wide).unwrap());
        assert!(!wide.is_subset_of(&narrow).unwrap());
        assert!(wide.is_superset_of(&narrow).unwrap());
    }

    #[test]
    fn subset_missing_protocol_fails() {
        let udp = FirewallAction::new(ActionKind::Allow, vec![ports_entry("udp", &["53"])]);
        let tcp = FirewallAction::new(ActionKind::Allow, vec![ports_entry("tcp", &["53"])]);
        assert!(!udp.is_subset_of(&tcp).unwrap());
    }

    #[test]
    fn subset_of_all_protocol() {
        let narrow = FirewallAction::new(ActionKind::Allow, vec![ports_entry("tcp", &["22"])]);
        let all = FirewallAction::new(ActionKind::Allow, vec![protocol_entry("all")]);
        assert!(narrow.is_subset_of(&all).unwrap());
        assert!(all.is_superset_of(&narrow).unwrap());
    }

    #[test]
    fn equivalent_requires_same_protocol_keys() {
        let tcp = FirewallAction::new(ActionKind::Allow, vec![ports_entry("tcp", &["22"])]);
        let both = FirewallAction::new(
            ActionKind::Allow,
            vec![ports_entry("tcp", &["22"]), ports_entry("udp", &["53"])],
        );
        assert!(!tcp.is_equivalent(&both).unwrap());
    }

    #[test]
    fn equivalent_expanded_ranges() {
        let range = FirewallAction::new(ActionKind::Allow, vec![ports_entry("tcp", &["21-23"])]);
        let listed =
            FirewallAction::new(ActionKind::Allow, vec![ports_entry("tcp", &["21", "22", "23"])]);
        assert!(range.is_equivalent(&listed).unwrap());
        assert_ne!(range, listed);
    }

    #[test]
    fn validate_accepts_well_formed() {
        let action = FirewallAction::new(
            ActionKind::Allow,
            vec![ports_entry("tcp", &["22", "8000-9000"]), protocol_entry("icmp")],
        );
        assert!(action.validate().is_ok());
    }

    #[test]
    fn validate_rejects_ports_on_icmp() {
        let action = FirewallAction::new(ActionKind::Allow, vec![ports_entry("icmp", &["22"])]);
        assert!(matches!(
            action.validate(),
            Err(FirewallError::PortsOnNonTcpUdp { .. })
        ));
    }

    #[test]
    fn validate_rejects_non_wildcard_string() {
        let action = FirewallAction::new(
            ActionKind::Allow,
            vec![
                PortRule::Any("bogus".to_owned()),
                PortRule::Any(MATCH_ANY.to_owned()),
            ],
        );
        assert!(matches!(
            action.validate(),
            Err(FirewallError::InvalidPortRule { .. })
        ));
    }

    #[test]
    fn validate_port_bounds() {
        assert_eq!(validate_port("0").unwrap(), 0);
        assert_eq!(validate_port("65535").unwrap(), 65535);
        assert!(matches!(
            validate_port("65536"),
            Err(FirewallError::PortOutOfRange { .. })
        ));
        assert!(matches!(
            validate_port("-1"),
            Err(FirewallError::PortOutOfRange { .. })
        ));
        assert!(matches!(
            validate_port("ssh"),
            Err(FirewallError::PortNotAnInt { .. })
        ));
    }

    #[test]
    fn validate_port_range_bounds() {
        assert!(validate_port_range("1-2").is_ok());
        assert!(matches!(
            validate_port_range("2-1"),
            Err(FirewallError::InvertedPortRange { .. })
        ));
        assert!(matches!(
            validate_port_range("1-2-3"),
            Err(FirewallError::InvalidPortRange { .. })
        ));
    }

    #[test]
    fn port_rule_deserializes_both_shapes() {
        let any: PortRule = serde_json::from_value(serde_json::json!("*")).unwrap();
        assert!(any.is_any());
        let entry: PortRule = serde_json::from_value(serde_json::json!({
            "IPProtocol": "tcp",
            "ports": ["22"],
        }))
        .unwrap();
        assert!(!entry.is_any());
    }
}
