//! Map section configuration loader.
//!
//! Loads `map` sections from YAML and compiles them against a [`Registry`]
//! into [`ProcessorInstance`]s, ready to be evaluated per request.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use tracing::{debug, warn};

use crate::error::{MapProcError, Result};
use crate::map::ValueMap;
use crate::processor::{ProcessorInstance, Registry};
use crate::template::Template;

/// One `map <processor> <source> { rules }` section.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MapSection {
    /// Name the processor was registered under
    pub processor: String,

    /// Source template, expanded per request
    pub source: String,

    /// Attribute-mapping rules, e.g. `reply:Reply-Message := message`
    pub rules: Vec<ValueMap>,
}

/// Section as written in YAML. Rules stay text until the section is built so
/// a malformed rule is reported as a validation error.
#[derive(Debug, Deserialize)]
struct RawMapSection {
    processor: String,
    source: String,
    #[serde(default)]
    rules: Vec<String>,
}

#[derive(Debug, Default, Deserialize)]
struct RawMapConfig {
    #[serde(default)]
    maps: Vec<RawMapSection>,
}

impl RawMapSection {
    fn into_section(self, index: usize) -> Result<MapSection> {
        let rules = self
            .rules
            .iter()
            .map(|rule| ValueMap::parse(rule))
            .collect::<Result<Vec<_>>>()
            .map_err(|e| match e {
                MapProcError::Validation(msg) => {
                    MapProcError::Validation(format!("Map section {}: {}", index, msg))
                }
                other => other,
            })?;

        Ok(MapSection {
            processor: self.processor,
            source: self.source,
            rules,
        })
    }
}

impl MapSection {
    /// Resolve the processor and build an instance for this section.
    pub fn compile(&self, registry: &Registry) -> Result<ProcessorInstance> {
        let definition = registry
            .find(&self.processor)
            .ok_or_else(|| MapProcError::NotFound(self.processor.clone()))?;

        let source = Template::parse(&self.source)?;
        let instance = ProcessorInstance::new(definition, source, self.rules.clone())?;

        debug!(
            "Compiled map section for '{}' ({} rules)",
            self.processor,
            self.rules.len()
        );
        Ok(instance)
    }
}

/// Collection of map sections.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MapConfig {
    pub maps: Vec<MapSection>,
}

impl MapConfig {
    /// Load map sections from a YAML file.
    ///
    /// # Example
    /// ```ignore
    /// use mapproc::MapConfig;
    ///
    /// let config = MapConfig::load_from_file("config/maps.yaml")?;
    /// let instances = config.compile(&registry)?;
    /// ```
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        let contents = fs::read_to_string(path).map_err(|e| {
            MapProcError::Config(format!("Failed to read config file {}: {}", path.display(), e))
        })?;

        Self::from_yaml_str(&contents)
    }

    /// Parse map sections from YAML text.
    pub fn from_yaml_str(contents: &str) -> Result<Self> {
        let raw: RawMapConfig = serde_yaml::from_str(contents)?;
        let maps = raw
            .maps
            .into_iter()
            .enumerate()
            .map(|(index, section)| section.into_section(index))
            .collect::<Result<Vec<_>>>()?;

        let config = MapConfig { maps };
        config.validate()?;
        Ok(config)
    }

    /// Load every `.yaml`/`.yml` file in a directory.
    ///
    /// Files that fail to parse are logged and skipped.
    pub fn load_from_dir<P: AsRef<Path>>(dir_path: P) -> Result<Self> {
        let dir_path = dir_path.as_ref();

        if !dir_path.is_dir() {
            return Err(MapProcError::Config(format!(
                "Not a config directory: {}",
                dir_path.display()
            )));
        }

        let mut paths: Vec<_> = fs::read_dir(dir_path)?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| {
                path.extension()
                    .is_some_and(|ext| ext == "yaml" || ext == "yml")
            })
            .collect();
        // read_dir order is platform dependent
        paths.sort();

        let mut config = MapConfig::default();
        for path in paths {
            match Self::load_from_file(&path) {
                Ok(loaded) => config.maps.extend(loaded.maps),
                Err(e) => warn!("Skipping map config {}: {}", path.display(), e),
            }
        }

        Ok(config)
    }

    /// Check that every section names a processor and has a parseable source.
    pub fn validate(&self) -> Result<()> {
        for (index, section) in self.maps.iter().enumerate() {
            if section.processor.trim().is_empty() {
                return Err(MapProcError::Validation(format!(
                    "Map section {} has no processor name",
                    index
                )));
            }
            Template::parse(&section.source)?;
        }
        Ok(())
    }

    /// Compile every section, stopping at the first failure.
    pub fn compile(&self, registry: &Registry) -> Result<Vec<ProcessorInstance>> {
        self.maps
            .iter()
            .map(|section| section.compile(registry))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::processor::{InstanceData, ModuleHandle, ModuleInstance, ProcessorSpec};
    use crate::rcode::ResultCode;
    use crate::request::Request;

    const CONFIG: &str = r#"
maps:
  - processor: sql
    source: "SELECT name, class FROM users WHERE name = '%{User-Name}'"
    rules:
      - "reply:Reply-Message := name"
      - "reply:Class += class"
  - processor: csv
    source: "&Calling-Station-Id"
"#;

    fn registry_with(names: &[&str]) -> Registry {
        let registry = Registry::new();
        let module = ModuleInstance::new("test");
        for name in names {
            registry
                .register(
                    &module,
                    name,
                    ProcessorSpec::new(
                        |_: &ModuleHandle,
                         _: Option<&InstanceData>,
                         _: &mut Request,
                         _: &str,
                         _: &[ValueMap]| ResultCode::Ok,
                    ),
                )
                .unwrap();
        }
        registry
    }

    #[test]
    fn test_parse_config() {
        let config = MapConfig::from_yaml_str(CONFIG).unwrap();

        assert_eq!(config.maps.len(), 2);
        assert_eq!(config.maps[0].processor, "sql");
        assert_eq!(config.maps[0].rules.len(), 2);
        assert!(config.maps[1].rules.is_empty());
    }

    #[test]
    fn test_parse_rejects_bad_rule() {
        let yaml = "maps:\n  - processor: sql\n    source: x\n    rules:\n      - \"Foo\"\n";
        let err = MapConfig::from_yaml_str(yaml).unwrap_err();
        assert!(matches!(err, MapProcError::Validation(ref m) if m.contains("'Foo'")));

        let yaml = "maps:\n  - processor: sql\n    source: x\n    rules:\n      - \"session:Foo := bar\"\n";
        let err = MapConfig::from_yaml_str(yaml).unwrap_err();
        assert!(matches!(err, MapProcError::Validation(ref m) if m.starts_with("Map section 0")));
    }

    #[test]
    fn test_yaml_syntax_error_is_config_error() {
        let err = MapConfig::from_yaml_str("maps: [ this is not valid").unwrap_err();
        assert!(matches!(err, MapProcError::Config(_)));
    }

    #[test]
    fn test_serialized_config_reloads() {
        let config = MapConfig::from_yaml_str(CONFIG).unwrap();

        let yaml = serde_yaml::to_string(&config).unwrap();
        assert_eq!(MapConfig::from_yaml_str(&yaml).unwrap(), config);
    }

    #[test]
    fn test_validate_rejects_bad_source() {
        let yaml = "maps:\n  - processor: sql\n    source: \"%{User-Name\"\n";
        let err = MapConfig::from_yaml_str(yaml).unwrap_err();
        assert!(matches!(err, MapProcError::Validation(_)));
    }

    #[test]
    fn test_compile() {
        let config = MapConfig::from_yaml_str(CONFIG).unwrap();
        let registry = registry_with(&["sql", "csv"]);

        let instances = config.compile(&registry).unwrap();

        assert_eq!(instances.len(), 2);
        assert_eq!(instances[0].definition().name(), "sql");
        assert_eq!(instances[1].rules().len(), 0);
    }

    #[test]
    fn test_compile_unknown_processor() {
        let config = MapConfig::from_yaml_str(CONFIG).unwrap();
        let registry = registry_with(&["sql"]);

        let err = config.compile(&registry).unwrap_err();
        assert_eq!(err, MapProcError::NotFound("csv".to_string()));
    }

    #[test]
    fn test_empty_config() {
        let config = MapConfig::from_yaml_str("{}").unwrap();
        assert!(config.maps.is_empty());
        assert!(config.compile(&Registry::new()).unwrap().is_empty());
    }
}
