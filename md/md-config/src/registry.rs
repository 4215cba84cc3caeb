//! The node creation registry.
//!
//! Maps textual name prefixes to creation functions. A creation function
//! receives the node's configuration subgroup and a [`GraphContext`] over
//! its already-constructed parents, and returns the computation. Lookup uses
//! longest-prefix match, so families of related terms ("hbond",
//! "hbond_backbone", ...) can share one creation function while more
//! specific registrations win.
//!
//! The registry is an explicit value passed to the builder: populate it once
//! during program setup, either from [`NodeRegistry::with_standard_nodes`]
//! or by registering term libraries by hand.

use md_core::{DerivComputation, GraphContext};

use crate::error::{ConfigError, Result};
use crate::standard::register_standard_nodes;
use crate::tree::ConfigGroup;

/// A node creation function.
pub type CreationFn = Box<
    dyn Fn(&ConfigGroup, &mut GraphContext<'_>) -> Result<Box<dyn DerivComputation>>
        + Send
        + Sync,
>;

/// Number of parents a creation function accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arity {
    /// Exactly this many parents.
    Exact(usize),
    /// One or more parents (the variadic form).
    AtLeastOne,
}

/// One registered node type.
pub struct RegistryEntry {
    prefix: String,
    arity: Arity,
    create: CreationFn,
}

impl RegistryEntry {
    /// The registered name prefix.
    #[must_use]
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// The declared arity.
    #[must_use]
    pub fn arity(&self) -> Arity {
        self.arity
    }

    /// Fail with [`ConfigError::ArgCountMismatch`] unless `actual` parents
    /// satisfy the declared arity.
    pub fn check_arity(&self, node: &str, actual: usize) -> Result<()> {
        let ok = match self.arity {
            Arity::Exact(expected) => actual == expected,
            Arity::AtLeastOne => actual >= 1,
        };
        if ok {
            return Ok(());
        }
        let expected = match self.arity {
            Arity::Exact(expected) => expected.to_string(),
            Arity::AtLeastOne => "at least 1".to_string(),
        };
        Err(ConfigError::ArgCountMismatch {
            node: node.to_string(),
            expected,
            actual,
        })
    }

    /// Run the creation function.
    pub fn create(
        &self,
        group: &ConfigGroup,
        ctx: &mut GraphContext<'_>,
    ) -> Result<Box<dyn DerivComputation>> {
        (self.create)(group, ctx)
    }
}

/// Ordered mapping from name prefix to creation function.
#[derive(Default)]
pub struct NodeRegistry {
    entries: Vec<RegistryEntry>,
}

impl NodeRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry with the built-in terms registered.
    #[must_use]
    pub fn with_standard_nodes() -> Self {
        let mut registry = Self::new();
        register_standard_nodes(&mut registry);
        registry
    }

    /// Register a creation function under a name prefix with an explicit
    /// arity.
    pub fn register<F>(&mut self, prefix: impl Into<String>, arity: Arity, create: F)
    where
        F: Fn(&ConfigGroup, &mut GraphContext<'_>) -> Result<Box<dyn DerivComputation>>
            + Send
            + Sync
            + 'static,
    {
        self.entries.push(RegistryEntry {
            prefix: prefix.into(),
            arity,
            create: Box::new(create),
        });
    }

    /// Register a parentless node type.
    pub fn register0<F>(&mut self, prefix: impl Into<String>, create: F)
    where
        F: Fn(&ConfigGroup, &mut GraphContext<'_>) -> Result<Box<dyn DerivComputation>>
            + Send
            + Sync
            + 'static,
    {
        self.register(prefix, Arity::Exact(0), create);
    }

    /// Register a one-parent node type.
    pub fn register1<F>(&mut self, prefix: impl Into<String>, create: F)
    where
        F: Fn(&ConfigGroup, &mut GraphContext<'_>) -> Result<Box<dyn DerivComputation>>
            + Send
            + Sync
            + 'static,
    {
        self.register(prefix, Arity::Exact(1), create);
    }

    /// Register a two-parent node type.
    pub fn register2<F>(&mut self, prefix: impl Into<String>, create: F)
    where
        F: Fn(&ConfigGroup, &mut GraphContext<'_>) -> Result<Box<dyn DerivComputation>>
            + Send
            + Sync
            + 'static,
    {
        self.register(prefix, Arity::Exact(2), create);
    }

    /// Register a three-parent node type.
    pub fn register3<F>(&mut self, prefix: impl Into<String>, create: F)
    where
        F: Fn(&ConfigGroup, &mut GraphContext<'_>) -> Result<Box<dyn DerivComputation>>
            + Send
            + Sync
            + 'static,
    {
        self.register(prefix, Arity::Exact(3), create);
    }

    /// Register a variadic node type taking one or more parents.
    pub fn register_variadic<F>(&mut self, prefix: impl Into<String>, create: F)
    where
        F: Fn(&ConfigGroup, &mut GraphContext<'_>) -> Result<Box<dyn DerivComputation>>
            + Send
            + Sync
            + 'static,
    {
        self.register(prefix, Arity::AtLeastOne, create);
    }

    /// Longest-prefix lookup of a node name against the registered keys.
    #[must_use]
    pub fn lookup(&self, name: &str) -> Option<&RegistryEntry> {
        self.entries
            .iter()
            .filter(|entry| name.starts_with(&entry.prefix))
            .max_by_key(|entry| entry.prefix.len())
    }

    /// Number of registered entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no entries are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
