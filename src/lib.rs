//! # mapproc: map processor registry and evaluation pipeline
//!
//! Modules of an authentication/authorization server use `mapproc` to expose
//! *map processors*: named functions that take an expanded source string and
//! a list of attribute-mapping rules, look something up (an SQL row, an LDAP
//! entry, a CSV line) and write the results onto the request.
//!
//! ## Features
//!
//! - **Registry**: name-keyed processors with replace-on-duplicate semantics
//!   and owner-driven cleanup
//! - **Instances**: one per configured `map` section, with typed private data
//! - **Evaluation**: source template expansion with per-processor escaping,
//!   then dispatch to the processor
//! - **Configuration**: `map` sections loaded from YAML
//!
//! ## Example
//!
//! ```
//! use mapproc::{
//!     AttrValue, InstanceData, MapConfig, ModuleHandle, ModuleInstance, ProcessorSpec,
//!     Registry, Request, ResultCode, ValueMap,
//! };
//!
//! let registry = Registry::new();
//! let module = ModuleInstance::new("rlm_echo");
//!
//! registry.register(&module, "echo", ProcessorSpec::new(
//!     |_: &ModuleHandle, _: Option<&InstanceData>, request: &mut Request, value: &str, maps: &[ValueMap]| {
//!         for map in maps {
//!             map.apply(request, AttrValue::from(value));
//!         }
//!         ResultCode::Updated
//!     },
//! )).unwrap();
//!
//! let config = MapConfig::from_yaml_str(r#"
//! maps:
//!   - processor: echo
//!     source: "Hello %{User-Name}"
//!     rules:
//!       - "reply:Reply-Message := greeting"
//! "#).unwrap();
//!
//! let instances = config.compile(&registry).unwrap();
//! let mut request = Request::new().with_attribute("User-Name", "bob");
//!
//! assert_eq!(instances[0].evaluate_default(&mut request), ResultCode::Updated);
//! ```

// Core modules
pub mod error;
pub mod rcode;
pub mod value;
pub mod request;
pub mod map;
pub mod template;

// Registry, instances and evaluation
pub mod processor;

// YAML configuration of map sections
pub mod config_loader;

// Re-export key types
pub use error::{MapProcError, Result};
pub use rcode::ResultCode;
pub use value::AttrValue;
pub use request::{AttrList, AttrRef, ListKind, Request};
pub use map::{MapOperator, ValueMap};
pub use template::{DefaultExpander, Expander, Template, XlatNode};

pub use processor::{
    downcast_data, DataInit, Escape, Evaluate, InstanceData, Instantiate, ModuleHandle,
    ModuleInstance, ProcName, ProcessorDefinition, ProcessorInstance, ProcessorSpec, Registry,
    MAX_NAME_LEN,
};

pub use config_loader::{MapConfig, MapSection};
