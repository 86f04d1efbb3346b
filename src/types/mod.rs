mod definition;
mod resource;
mod violation;

pub use definition::{
    AclRuleDef, FirewallPolicyRuleDef, ResourceRuleDef, ResourceTreeNodeDef, RuleMode,
};
pub use resource::Resource;
pub use violation::{flatten_violations, Violation};
