//! Domain-scoped identifiers and the cache that interns them.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

#[derive(Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
struct IdentInner {
    domain: String,
    name: String,
}

/// A value within a domain. Two idents are equal when both their domain and
/// name are equal.
///
/// Cloning is cheap: clones share one allocation, so an ident reused across
/// thousands of facts costs one string pair in memory.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Ident(Arc<IdentInner>);

impl Ident {
    pub fn new(domain: impl Into<String>, name: impl Into<String>) -> Self {
        Self(Arc::new(IdentInner {
            domain: domain.into(),
            name: name.into(),
        }))
    }

    pub fn domain(&self) -> &str {
        &self.0.domain
    }

    pub fn name(&self) -> &str {
        &self.0.name
    }
}

impl fmt::Display for Ident {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.domain.is_empty() {
            write!(f, "{}", self.0.name)
        } else {
            write!(f, "{}/{}", self.0.domain, self.0.name)
        }
    }
}

/// Interns idents per domain so repeated `(domain, name)` pairs resolve to
/// the same shared [`Ident`].
#[derive(Debug, Default)]
pub struct IdentCache {
    domains: HashMap<String, HashMap<String, Ident>>,
}

impl IdentCache {
    /// Return the cached ident for `(domain, name)`, creating it on first use.
    pub fn add(&mut self, domain: &str, name: &str) -> Ident {
        let names = self.domains.entry(domain.to_string()).or_default();
        names
            .entry(name.to_string())
            .or_insert_with(|| Ident::new(domain, name))
            .clone()
    }

    pub fn get(&self, domain: &str, name: &str) -> Option<Ident> {
        self.domains.get(domain)?.get(name).cloned()
    }

    /// Total number of interned idents across all domains.
    pub fn len(&self) -> usize {
        self.domains.values().map(HashMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
