use thiserror::Error;

use crate::firewall::FirewallError;

/// Errors raised while reading and parsing a rules-definition file.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("rules path is empty")]
    EmptyRulesPath,

    #[error("unsupported rules file extension '{extension}'")]
    UnsupportedExtension { extension: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("failed to parse rules file as JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("failed to parse rules file as YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("failed to fetch object '{object}' from bucket '{bucket}': {reason}")]
    ObjectFetch {
        bucket: String,
        object: String,
        reason: String,
    },
}

/// Errors raised while validating rule definitions into a rule book.
///
/// A rule book loads completely or not at all; the first schema error
/// aborts the build and names the offending rule by its position in the
/// definitions file.
#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("rule {index} is invalid: {reason}")]
    InvalidRule { index: usize, reason: String },

    #[error("rule {index} has unsupported mode '{mode}'")]
    InvalidMode { index: usize, mode: String },

    #[error("duplicate rule id '{id}' (rule {index})")]
    DuplicateRuleId { id: String, index: usize },
}

/// Data-conversion failures surfaced while matching records against rules.
///
/// Absence of a match is never an error; these cover malformed input data
/// only (unparseable ports, bad CIDR strings).
#[derive(Debug, Error)]
pub enum MatchError {
    #[error("port range '{range}' is not of the form start-end")]
    MalformedPortRange { range: String },

    #[error("invalid port number '{port}' in range '{range}'")]
    InvalidPortNumber { range: String, port: String },

    #[error("invalid ip address or network '{addr}'")]
    InvalidIpNetwork { addr: String },
}

/// Unified error type covering loading, schema validation, matching, and
/// firewall record construction.
///
/// Returned by the engine-level entry points like
/// [`RulesEngine::find_violations()`](crate::RulesEngine::find_violations).
#[derive(Debug, Error)]
pub enum VigilError {
    #[error(transparent)]
    Load(#[from] LoadError),

    #[error(transparent)]
    Schema(#[from] SchemaError),

    #[error(transparent)]
    Match(#[from] MatchError),

    #[error(transparent)]
    Firewall(#[from] FirewallError),
}
