//! Per-section processor instances.
//!
//! One [`ProcessorInstance`] is built for every `map` section at
//! configuration time and then evaluated for each request that reaches the
//! section.

use std::any::Any;
use std::sync::Arc;
use tracing::debug;

use crate::error::{MapProcError, Result};
use crate::map::ValueMap;
use crate::processor::definition::{downcast_data, InstanceData, ProcessorDefinition};
use crate::template::Template;

/// A processor bound to a source template and a rule list
pub struct ProcessorInstance {
    pub(crate) definition: Arc<ProcessorDefinition>,
    pub(crate) source: Template,
    pub(crate) rules: Vec<ValueMap>,
    pub(crate) data: Option<InstanceData>,
}

impl ProcessorInstance {
    /// Build an instance of `definition`.
    ///
    /// If the processor has an instantiate capability, its instance data is
    /// created first (when it has an initialiser) and handed to it together
    /// with the source and rules. A rejected instantiation drops the instance
    /// and its data.
    ///
    /// Every call produces a new, independent instance.
    pub fn new(
        definition: Arc<ProcessorDefinition>,
        source: Template,
        rules: Vec<ValueMap>,
    ) -> Result<Self> {
        let slot = definition.snapshot();
        let mut instance = Self {
            definition,
            source,
            rules,
            data: None,
        };

        if let Some(instantiate) = &slot.spec.instantiate {
            if let Some(init) = &slot.spec.data_init {
                let data = init().map_err(|reason| {
                    MapProcError::Allocation(format!(
                        "instance data for map processor '{}': {}",
                        instance.definition.name(),
                        reason
                    ))
                })?;
                instance.data = Some(data);
            }

            instantiate
                .instantiate(
                    instance.data.as_mut(),
                    &slot.owner,
                    &instance.source,
                    &instance.rules,
                )
                .map_err(|reason| {
                    debug!(
                        "Map processor '{}' rejected section: {}",
                        instance.definition.name(),
                        reason
                    );
                    MapProcError::Instantiation {
                        processor: instance.definition.name().to_string(),
                        reason,
                    }
                })?;
        }

        Ok(instance)
    }

    pub fn definition(&self) -> &Arc<ProcessorDefinition> {
        &self.definition
    }

    pub fn source(&self) -> &Template {
        &self.source
    }

    pub fn rules(&self) -> &[ValueMap] {
        &self.rules
    }

    pub fn data(&self) -> Option<&InstanceData> {
        self.data.as_ref()
    }

    /// Instance data downcast to the type the processor stored.
    pub fn data_as<T: Any>(&self) -> Option<&T> {
        downcast_data(self.data.as_ref())
    }
}

impl std::fmt::Debug for ProcessorInstance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessorInstance")
            .field("processor", &self.definition.name())
            .field("source", &self.source.to_string())
            .field("rules", &self.rules.len())
            .field("has_data", &self.data.is_some())
            .finish()
    }
}
