//! Map processor registration, instantiation and evaluation.
//!
//! Lifecycle:
//!
//! 1. A module registers a processor under a name with [`Registry::register`].
//! 2. For each `map <name> { ... }` section the configuration compiler looks
//!    the name up with [`Registry::find`] and builds a [`ProcessorInstance`].
//! 3. Each request reaching the section calls [`ProcessorInstance::evaluate`].

pub mod definition;
pub mod evaluator;
pub mod instance;
pub mod name;
pub mod registry;

pub use definition::{
    downcast_data, DataInit, Escape, Evaluate, InstanceData, Instantiate, ModuleHandle,
    ModuleInstance, ProcessorDefinition, ProcessorSpec,
};
pub use instance::ProcessorInstance;
pub use name::{ProcName, MAX_NAME_LEN};
pub use registry::Registry;
