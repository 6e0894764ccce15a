//! Processor definitions and the capability traits modules implement.
//!
//! A module exposes a map processor by registering a [`ProcessorSpec`]: a
//! required [`Evaluate`] capability plus optional [`Escape`] and
//! [`Instantiate`] capabilities and an optional instance-data initialiser.
//! All capabilities have blanket impls for closures.

use parking_lot::RwLock;
use std::any::Any;
use std::fmt;
use std::sync::{Arc, Weak};

use crate::map::ValueMap;
use crate::processor::name::ProcName;
use crate::rcode::ResultCode;
use crate::request::Request;
use crate::template::Template;

/// Per-instance private state, created by the definition's initialiser.
pub type InstanceData = Box<dyn Any + Send + Sync>;

/// Downcast instance data handed to a capability.
pub fn downcast_data<T: Any>(data: Option<&InstanceData>) -> Option<&T> {
    data.and_then(|d| (**d).downcast_ref::<T>())
}

/// Module instance that owns one or more processors.
pub struct ModuleInstance {
    name: String,
    state: Box<dyn Any + Send + Sync>,
}

pub type ModuleHandle = Arc<ModuleInstance>;

impl ModuleInstance {
    /// Module with no state of its own.
    pub fn new(name: impl Into<String>) -> ModuleHandle {
        Self::with_state(name, ())
    }

    pub fn with_state<T: Any + Send + Sync>(name: impl Into<String>, state: T) -> ModuleHandle {
        Arc::new(Self {
            name: name.into(),
            state: Box::new(state),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state<T: Any>(&self) -> Option<&T> {
        (*self.state).downcast_ref::<T>()
    }
}

impl fmt::Debug for ModuleInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModuleInstance").field("name", &self.name).finish()
    }
}

/// Runs the processor for one request.
///
/// Receives the expanded source value and the section's rules, and is expected
/// to apply the rules to `request`.
pub trait Evaluate: Send + Sync {
    fn evaluate(
        &self,
        owner: &ModuleHandle,
        data: Option<&InstanceData>,
        request: &mut Request,
        value: &str,
        maps: &[ValueMap],
    ) -> ResultCode;
}

impl<F> Evaluate for F
where
    F: Fn(&ModuleHandle, Option<&InstanceData>, &mut Request, &str, &[ValueMap]) -> ResultCode
        + Send
        + Sync,
{
    fn evaluate(
        &self,
        owner: &ModuleHandle,
        data: Option<&InstanceData>,
        request: &mut Request,
        value: &str,
        maps: &[ValueMap],
    ) -> ResultCode {
        self(owner, data, request, value, maps)
    }
}

/// Sanitises a value interpolated into the source template.
pub trait Escape: Send + Sync {
    fn escape(&self, request: &Request, raw: &str, owner: &ModuleHandle) -> String;
}

impl<F> Escape for F
where
    F: Fn(&Request, &str, &ModuleHandle) -> String + Send + Sync,
{
    fn escape(&self, request: &Request, raw: &str, owner: &ModuleHandle) -> String {
        self(request, raw, owner)
    }
}

/// Validates a map section and fills in its instance data, once per section.
pub trait Instantiate: Send + Sync {
    fn instantiate(
        &self,
        data: Option<&mut InstanceData>,
        owner: &ModuleHandle,
        source: &Template,
        maps: &[ValueMap],
    ) -> Result<(), String>;
}

impl<F> Instantiate for F
where
    F: Fn(Option<&mut InstanceData>, &ModuleHandle, &Template, &[ValueMap]) -> Result<(), String>
        + Send
        + Sync,
{
    fn instantiate(
        &self,
        data: Option<&mut InstanceData>,
        owner: &ModuleHandle,
        source: &Template,
        maps: &[ValueMap],
    ) -> Result<(), String> {
        self(data, owner, source, maps)
    }
}

/// Creates the instance data for a new instance.
pub type DataInit = Arc<dyn Fn() -> Result<InstanceData, String> + Send + Sync>;

/// Capabilities supplied when registering a processor.
#[derive(Clone)]
pub struct ProcessorSpec {
    pub(crate) evaluate: Arc<dyn Evaluate>,
    pub(crate) escape: Option<Arc<dyn Escape>>,
    pub(crate) instantiate: Option<Arc<dyn Instantiate>>,
    pub(crate) data_init: Option<DataInit>,
}

impl ProcessorSpec {
    pub fn new(evaluate: impl Evaluate + 'static) -> Self {
        Self {
            evaluate: Arc::new(evaluate),
            escape: None,
            instantiate: None,
            data_init: None,
        }
    }

    pub fn with_escape(mut self, escape: impl Escape + 'static) -> Self {
        self.escape = Some(Arc::new(escape));
        self
    }

    pub fn with_instantiate(mut self, instantiate: impl Instantiate + 'static) -> Self {
        self.instantiate = Some(Arc::new(instantiate));
        self
    }

    /// Give every instance a `T::default()` value as its data.
    pub fn with_instance_data<T: Default + Any + Send + Sync>(mut self) -> Self {
        self.data_init = Some(Arc::new(|| Ok::<InstanceData, String>(Box::new(T::default()))));
        self
    }

    /// Like [`with_instance_data`](Self::with_instance_data) with a fallible initialiser.
    pub fn with_instance_data_fn<F>(mut self, init: F) -> Self
    where
        F: Fn() -> Result<InstanceData, String> + Send + Sync + 'static,
    {
        self.data_init = Some(Arc::new(init));
        self
    }
}

impl fmt::Debug for ProcessorSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProcessorSpec")
            .field("escape", &self.escape.is_some())
            .field("instantiate", &self.instantiate.is_some())
            .field("instance_data", &self.data_init.is_some())
            .finish()
    }
}

/// Registered processor.
///
/// Re-registering the same name rewrites the slot of the existing definition,
/// so instances created earlier see the new capabilities on their next
/// evaluation.
pub struct ProcessorDefinition {
    name: ProcName,
    /// Module the definition was first created under. Owner teardown removes
    /// the definition only when it matches this module.
    allocated_by: Weak<ModuleInstance>,
    slot: RwLock<Slot>,
}

#[derive(Clone)]
pub(crate) struct Slot {
    pub(crate) owner: ModuleHandle,
    pub(crate) spec: ProcessorSpec,
}

impl ProcessorDefinition {
    pub(crate) fn new(name: ProcName, owner: &ModuleHandle, spec: ProcessorSpec) -> Self {
        Self {
            name,
            allocated_by: Arc::downgrade(owner),
            slot: RwLock::new(Slot {
                owner: Arc::clone(owner),
                spec,
            }),
        }
    }

    pub(crate) fn replace(&self, owner: &ModuleHandle, spec: ProcessorSpec) {
        let mut slot = self.slot.write();
        slot.owner = Arc::clone(owner);
        slot.spec = spec;
    }

    /// Clone the current capabilities so callers never hold the lock while
    /// calling into a module.
    pub(crate) fn snapshot(&self) -> Slot {
        self.slot.read().clone()
    }

    pub(crate) fn allocated_by(&self, owner: &ModuleHandle) -> bool {
        self.allocated_by
            .upgrade()
            .is_some_and(|module| Arc::ptr_eq(&module, owner))
    }

    pub fn name(&self) -> &str {
        self.name.as_str()
    }

    pub(crate) fn key(&self) -> &ProcName {
        &self.name
    }

    /// Module currently providing the capabilities.
    pub fn owner(&self) -> ModuleHandle {
        Arc::clone(&self.slot.read().owner)
    }

    pub fn has_escape(&self) -> bool {
        self.slot.read().spec.escape.is_some()
    }

    pub fn has_instantiate(&self) -> bool {
        self.slot.read().spec.instantiate.is_some()
    }

    pub fn has_instance_data(&self) -> bool {
        self.slot.read().spec.data_init.is_some()
    }
}

impl fmt::Debug for ProcessorDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let slot = self.slot.read();
        f.debug_struct("ProcessorDefinition")
            .field("name", &self.name.as_str())
            .field("owner", &slot.owner.name())
            .field("spec", &slot.spec)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn noop(
        _: &ModuleHandle,
        _: Option<&InstanceData>,
        _: &mut Request,
        _: &str,
        _: &[ValueMap],
    ) -> ResultCode {
        ResultCode::Noop
    }

    #[test]
    fn test_module_state() {
        let module = ModuleInstance::with_state("sql", 42u32);
        assert_eq!(module.name(), "sql");
        assert_eq!(module.state::<u32>(), Some(&42));
        assert_eq!(module.state::<String>(), None);
    }

    #[test]
    fn test_spec_builder_flags() {
        let spec = ProcessorSpec::new(noop).with_instance_data::<Vec<u8>>();
        let owner = ModuleInstance::new("csv");
        let def = ProcessorDefinition::new(ProcName::new("csv").unwrap(), &owner, spec);

        assert!(def.has_instance_data());
        assert!(!def.has_escape());
        assert!(!def.has_instantiate());
        assert_eq!(def.owner().name(), "csv");
    }

    #[test]
    fn test_allocated_by_survives_replace() {
        let first = ModuleInstance::new("first");
        let second = ModuleInstance::new("second");
        let def = ProcessorDefinition::new(
            ProcName::new("sql").unwrap(),
            &first,
            ProcessorSpec::new(noop),
        );

        def.replace(&second, ProcessorSpec::new(noop));

        assert_eq!(def.owner().name(), "second");
        assert!(def.allocated_by(&first));
        assert!(!def.allocated_by(&second));
    }

    #[test]
    fn test_downcast_data() {
        let data: InstanceData = Box::new(String::from("cached"));
        assert_eq!(downcast_data::<String>(Some(&data)).map(String::as_str), Some("cached"));
        assert!(downcast_data::<u64>(Some(&data)).is_none());
        assert!(downcast_data::<String>(None).is_none());
    }
}
