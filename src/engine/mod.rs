mod acl;
mod firewall;
mod resource;

use std::path::PathBuf;
use std::sync::{Arc, RwLock};

use serde_json::Value;
use tracing::debug;

pub use acl::{AclRecord, AclRule, AclRuleBook, ACL_VIOLATION};
pub use firewall::{
    is_blacklist_violation, is_rule_exists_violation, is_whitelist_violation, FirewallPolicyRule,
    FirewallRuleBook, FIREWALL_BLACKLIST_VIOLATION, FIREWALL_MATCHES_VIOLATION,
    FIREWALL_REQUIRED_VIOLATION, FIREWALL_WHITELIST_VIOLATION,
};
pub use resource::{ResourceRule, ResourceRuleBook, RESOURCE_VIOLATION};

use crate::error::{MatchError, SchemaError, VigilError};
use crate::load::{load_rule_definitions, load_rule_definitions_from_store, ObjectStore};
use crate::types::Violation;

/// A built, queryable collection of rules loaded from one definitions
/// file.
///
/// Books are immutable once built and safe to share across threads;
/// rebuilding produces a fresh book rather than mutating in place.
pub trait RuleBook: Send + Sync + Sized {
    /// The record type this book's rules evaluate.
    type Record;

    /// Build the book from raw rule definitions, in file order.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaError`] on the first invalid definition, naming
    /// its index. There is no partial success: the book loads completely
    /// or not at all.
    fn from_definitions(definitions: &[Value]) -> Result<Self, SchemaError>;

    /// Evaluate every rule, in load order, against the record collection
    /// and concatenate the violations. No cross-rule deduplication.
    ///
    /// # Errors
    ///
    /// Returns [`MatchError`] if a record carries unparseable data.
    fn find_violations(&self, records: &[Self::Record]) -> Result<Vec<Violation>, MatchError>;

    /// Number of rules in the book.
    fn rule_count(&self) -> usize;
}

/// Where an engine reads its rule definitions from.
#[derive(Debug, Clone)]
pub enum RulesSource {
    LocalFile(PathBuf),
    Object { bucket: String, object: String },
}

/// The reusable engine shell around a [`RuleBook`].
///
/// Loads definitions from its source, builds an immutable book, and
/// evaluates records against it. A rebuild constructs a new book and
/// atomically swaps the shared reference, so concurrent evaluations keep
/// using the snapshot they started with.
pub struct RulesEngine<B> {
    source: RulesSource,
    store: Option<Arc<dyn ObjectStore + Send + Sync>>,
    book: RwLock<Option<Arc<B>>>,
}

impl<B: RuleBook> RulesEngine<B> {
    /// An engine reading definitions from a local file.
    #[must_use]
    pub fn from_file(path: impl Into<PathBuf>) -> Self {
        Self {
            source: RulesSource::LocalFile(path.into()),
            store: None,
            book: RwLock::new(None),
        }
    }

    /// An engine fetching definitions from an object store.
    #[must_use]
    pub fn from_object_store(
        store: Arc<dyn ObjectStore + Send + Sync>,
        bucket: impl Into<String>,
        object: impl Into<String>,
    ) -> Self {
        Self {
            source: RulesSource::Object {
                bucket: bucket.into(),
                object: object.into(),
            },
            store: Some(store),
            book: RwLock::new(None),
        }
    }

    /// The current book snapshot, if one has been built.
    #[must_use]
    pub fn rule_book(&self) -> Option<Arc<B>> {
        self.book
            .read()
            .expect("rule book lock poisoned")
            .clone()
    }

    /// Load definitions and swap in a freshly built book.
    ///
    /// # Errors
    ///
    /// Returns [`VigilError`] on load or schema failure; the previous
    /// book, if any, stays in place.
    pub fn build_rule_book(&self) -> Result<Arc<B>, VigilError> {
        let definitions = match &self.source {
            RulesSource::LocalFile(path) => load_rule_definitions(path)?,
            RulesSource::Object { bucket, object } => {
                let store = self.store.as_deref().ok_or(crate::error::LoadError::ObjectFetch {
                    bucket: bucket.clone(),
                    object: object.clone(),
                    reason: "no object store configured".to_owned(),
                })?;
                load_rule_definitions_from_store(store, bucket, object)?
            }
        };
        let book = Arc::new(B::from_definitions(&definitions)?);
        debug!(rules = book.rule_count(), "rule book built");
        let mut slot = self.book.write().expect("rule book lock poisoned");
        *slot = Some(Arc::clone(&book));
        Ok(book)
    }

    /// Evaluate records against the book, building it on first use or
    /// when `force_rebuild` is set.
    ///
    /// # Errors
    ///
    /// Returns [`VigilError`] on load, schema, or matching failure.
    pub fn find_violations(
        &self,
        records: &[B::Record],
        force_rebuild: bool,
    ) -> Result<Vec<Violation>, VigilError> {
        let book = if force_rebuild {
            self.build_rule_book()?
        } else {
            match self.rule_book() {
                Some(book) => book,
                None => self.build_rule_book()?,
            }
        };
        debug!(records = records.len(), "scanning records for violations");
        Ok(book.find_violations(records)?)
    }
}

/// Engine over resource-hierarchy rules.
pub type ResourceRulesEngine = RulesEngine<ResourceRuleBook>;
/// Engine over firewall policy rules.
pub type FirewallRulesEngine = RulesEngine<FirewallRuleBook>;
/// Engine over field-pattern (ACL) rules.
pub type AclRulesEngine = RulesEngine<AclRuleBook>;
