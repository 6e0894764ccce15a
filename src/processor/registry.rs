//! Registry of map processors, keyed by name.
//!
//! Modules register their processors while they load; the configuration
//! compiler resolves `map <name> { ... }` sections against the registry.
//! The tree is created lazily on the first registration and dropped by
//! [`Registry::teardown`].

use parking_lot::RwLock;
use std::collections::btree_map::Entry;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, trace};

use crate::error::Result;
use crate::processor::definition::{ModuleHandle, ProcessorDefinition, ProcessorSpec};
use crate::processor::name::ProcName;

type Tree = BTreeMap<ProcName, Arc<ProcessorDefinition>>;

/// Registry of map processors
#[derive(Debug, Default)]
pub struct Registry {
    tree: RwLock<Option<Tree>>,
}

impl Registry {
    /// Create a registry. No tree is allocated until the first registration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a map processor, replacing any processor of the same name.
    ///
    /// A replaced processor keeps its definition object: instances created
    /// from it pick up `spec` on their next evaluation.
    ///
    /// # Example
    ///
    /// ```
    /// use mapproc::{ModuleInstance, ProcessorSpec, Registry, ResultCode};
    /// use mapproc::{InstanceData, ModuleHandle, Request, ValueMap};
    ///
    /// let registry = Registry::new();
    /// let module = ModuleInstance::new("rlm_csv");
    ///
    /// registry
    ///     .register(&module, "csv", ProcessorSpec::new(
    ///         |_: &ModuleHandle, _: Option<&InstanceData>, _: &mut Request, _: &str, _: &[ValueMap]| {
    ///             ResultCode::Noop
    ///         },
    ///     ))
    ///     .unwrap();
    ///
    /// assert!(registry.find("csv").is_some());
    /// ```
    pub fn register(
        &self,
        owner: &ModuleHandle,
        name: &str,
        spec: ProcessorSpec,
    ) -> Result<Arc<ProcessorDefinition>> {
        let key = ProcName::new(name)?;

        let mut guard = self.tree.write();
        let tree = guard.get_or_insert_with(|| {
            debug!("Created map processor tree");
            Tree::new()
        });

        let definition = match tree.entry(key) {
            Entry::Occupied(entry) => {
                let definition = Arc::clone(entry.get());
                debug!(
                    "Replacing map processor '{}' (was provided by '{}', now '{}')",
                    name,
                    definition.owner().name(),
                    owner.name()
                );
                definition.replace(owner, spec);
                definition
            }
            Entry::Vacant(entry) => {
                let key = entry.key().clone();
                let definition = Arc::new(ProcessorDefinition::new(key, owner, spec));
                entry.insert(Arc::clone(&definition));
                definition
            }
        };

        trace!("map_proc_register: {} ({})", name, owner.name());
        Ok(definition)
    }

    /// Find a processor by name.
    ///
    /// Returns `None` when the name is unknown, cannot be a valid name, or
    /// nothing has been registered yet.
    pub fn find(&self, name: &str) -> Option<Arc<ProcessorDefinition>> {
        let key = ProcName::new(name).ok()?;

        let guard = self.tree.read();
        guard.as_ref()?.get(&key).cloned()
    }

    /// Remove a processor by name. Returns whether one was removed.
    ///
    /// Instances already holding the definition keep working; only new
    /// lookups stop finding it.
    pub fn unregister(&self, name: &str) -> bool {
        let Ok(key) = ProcName::new(name) else {
            return false;
        };

        let mut guard = self.tree.write();
        let removed = guard
            .as_mut()
            .and_then(|tree| tree.remove(&key))
            .is_some();

        if removed {
            debug!("Unregistered map processor '{}'", name);
        }
        removed
    }

    /// Remove every processor first created under `owner`.
    ///
    /// Call this from the module's teardown path. Processors `owner` only
    /// replaced are left alone; processors it created are removed even if a
    /// later module replaced them.
    pub fn unregister_owner(&self, owner: &ModuleHandle) -> usize {
        let mut guard = self.tree.write();
        let Some(tree) = guard.as_mut() else {
            return 0;
        };

        let before = tree.len();
        tree.retain(|name, definition| {
            let owned = definition.allocated_by(owner);
            if owned {
                debug!("Unregistered map processor '{}' (module '{}' torn down)", name, owner.name());
            }
            !owned
        });
        before - tree.len()
    }

    /// Drop the whole tree. Safe to call when nothing was ever registered;
    /// a later registration starts a fresh tree.
    pub fn teardown(&self) {
        if let Some(tree) = self.tree.write().take() {
            debug!("Freed map processor tree ({} processors)", tree.len());
        }
    }

    /// Registered names, in tree order.
    pub fn names(&self) -> Vec<String> {
        self.tree
            .read()
            .as_ref()
            .map(|tree| tree.values().map(|d| d.key().to_string()).collect())
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.tree.read().as_ref().map_or(0, |tree| tree.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether the tree has been created (and not torn down).
    pub fn is_initialized(&self) -> bool {
        self.tree.read().is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::map::ValueMap;
    use crate::processor::definition::{InstanceData, ModuleInstance};
    use crate::processor::name::MAX_NAME_LEN;
    use crate::rcode::ResultCode;
    use crate::request::Request;

    fn returning(code: ResultCode) -> ProcessorSpec {
        ProcessorSpec::new(
            move |_: &ModuleHandle,
                  _: Option<&InstanceData>,
                  _: &mut Request,
                  _: &str,
                  _: &[ValueMap]| code,
        )
    }

    fn run(definition: &ProcessorDefinition) -> ResultCode {
        let slot = definition.snapshot();
        slot.spec
            .evaluate
            .evaluate(&slot.owner, None, &mut Request::new(), "", &[])
    }

    #[test]
    fn test_find_on_uninitialized_registry() {
        let registry = Registry::new();

        assert!(!registry.is_initialized());
        assert!(registry.find("sql").is_none());
        assert!(registry.find("").is_none());
        assert!(registry.is_empty());
    }

    #[test]
    fn test_register_and_find() {
        let registry = Registry::new();
        let module = ModuleInstance::new("rlm_sql");

        registry.register(&module, "sql", returning(ResultCode::Ok)).unwrap();

        let found = registry.find("sql").unwrap();
        assert_eq!(found.name(), "sql");
        assert_eq!(run(&found), ResultCode::Ok);
        assert!(registry.find("sq").is_none());
        assert!(registry.find("sql2").is_none());
    }

    #[test]
    fn test_register_rejects_invalid_names() {
        let registry = Registry::new();
        let module = ModuleInstance::new("m");

        assert!(registry.register(&module, "", returning(ResultCode::Ok)).is_err());
        let long = "a".repeat(MAX_NAME_LEN + 1);
        assert!(registry.register(&module, &long, returning(ResultCode::Ok)).is_err());
        assert!(registry.find(&long).is_none());
        assert!(!registry.is_initialized());
    }

    #[test]
    fn test_prefix_names_are_distinct() {
        let registry = Registry::new();
        let module = ModuleInstance::new("m");

        registry.register(&module, "sql", returning(ResultCode::Ok)).unwrap();
        registry.register(&module, "sql_backup", returning(ResultCode::Noop)).unwrap();

        assert_eq!(registry.len(), 2);
        assert_eq!(run(&registry.find("sql").unwrap()), ResultCode::Ok);
        assert_eq!(run(&registry.find("sql_backup").unwrap()), ResultCode::Noop);
    }

    #[test]
    fn test_replace_reuses_definition() {
        let registry = Registry::new();
        let first = ModuleInstance::new("first");
        let second = ModuleInstance::new("second");

        let original = registry.register(&first, "sql", returning(ResultCode::Ok)).unwrap();
        let replaced = registry.register(&second, "sql", returning(ResultCode::Reject)).unwrap();

        assert!(Arc::ptr_eq(&original, &replaced));
        assert_eq!(registry.len(), 1);
        assert_eq!(run(&original), ResultCode::Reject);
        assert_eq!(registry.find("sql").unwrap().owner().name(), "second");
    }

    #[test]
    fn test_unregister() {
        let registry = Registry::new();
        let module = ModuleInstance::new("m");
        registry.register(&module, "csv", returning(ResultCode::Ok)).unwrap();

        assert!(registry.unregister("csv"));
        assert!(!registry.unregister("csv"));
        assert!(!registry.unregister(""));
        assert!(registry.find("csv").is_none());
    }

    #[test]
    fn test_unregister_owner_only_removes_allocated_entries() {
        let registry = Registry::new();
        let ldap = ModuleInstance::new("rlm_ldap");
        let sql = ModuleInstance::new("rlm_sql");

        registry.register(&ldap, "ldap", returning(ResultCode::Ok)).unwrap();
        registry.register(&sql, "sql", returning(ResultCode::Ok)).unwrap();
        // ldap replaces sql's processor but did not create it
        registry.register(&ldap, "sql", returning(ResultCode::Updated)).unwrap();

        assert_eq!(registry.unregister_owner(&ldap), 1);
        assert!(registry.find("ldap").is_none());
        assert!(registry.find("sql").is_some());

        assert_eq!(registry.unregister_owner(&sql), 1);
        assert!(registry.is_empty());
    }

    #[test]
    fn test_teardown_and_reuse() {
        let registry = Registry::new();
        registry.teardown();

        let module = ModuleInstance::new("m");
        let kept = registry.register(&module, "json", returning(ResultCode::Ok)).unwrap();
        registry.teardown();

        assert!(!registry.is_initialized());
        assert!(registry.find("json").is_none());
        // Definitions held elsewhere outlive the tree
        assert_eq!(run(&kept), ResultCode::Ok);

        registry.register(&module, "json", returning(ResultCode::Noop)).unwrap();
        assert_eq!(run(&registry.find("json").unwrap()), ResultCode::Noop);
        assert_eq!(run(&kept), ResultCode::Ok);
    }

    #[test]
    fn test_names_in_tree_order() {
        let registry = Registry::new();
        let module = ModuleInstance::new("m");
        for name in ["ldap", "sql", "csv", "redis"] {
            registry.register(&module, name, returning(ResultCode::Ok)).unwrap();
        }

        assert_eq!(registry.names(), vec!["csv", "sql", "ldap", "redis"]);
    }
}
