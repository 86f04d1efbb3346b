mod engine;
mod error;
mod firewall;
mod load;
mod net;
mod path;
mod pattern;
mod tree;
mod types;

pub use engine::{
    is_blacklist_violation, is_rule_exists_violation, is_whitelist_violation, AclRecord, AclRule,
    AclRuleBook, AclRulesEngine, FirewallPolicyRule, FirewallRuleBook, FirewallRulesEngine,
    ResourceRule, ResourceRuleBook, ResourceRulesEngine, RuleBook, RulesEngine, RulesSource,
    ACL_VIOLATION, FIREWALL_BLACKLIST_VIOLATION, FIREWALL_MATCHES_VIOLATION,
    FIREWALL_REQUIRED_VIOLATION, FIREWALL_WHITELIST_VIOLATION, RESOURCE_VIOLATION,
};
pub use error::{LoadError, MatchError, SchemaError, VigilError};
pub use firewall::{
    validate_port, validate_port_range, ActionKind, FirewallAction, FirewallError, FirewallRule,
    FirewallRuleDef, PortRule, ProtocolPorts, ALL_PORT_REPRESENTATIONS, MATCH_ANY,
};
pub use load::{
    load_rule_definitions, load_rule_definitions_from_store, parse_rule_definitions, ObjectStore,
    RulesFormat,
};
pub use net::{expand_port_range, expand_ports, ip_in_range, ips_in_list};
pub use path::{PathSegment, ResourcePath};
pub use pattern::{escape_and_globify, GlobPattern, MATCH_ANY_PATTERN};
pub use tree::{NodeId, ResourceTree, WILDCARD};
pub use types::{
    flatten_violations, AclRuleDef, FirewallPolicyRuleDef, Resource, ResourceRuleDef,
    ResourceTreeNodeDef, RuleMode, Violation,
};
