//! Value source driver registry for viewer configuration.

use std::collections::HashMap;
use std::sync::Arc;

use smol_str::SmolStr;

use crate::error::DisplayError;

use super::{LoopbackSource, SimulatedSource, ValueSource};

pub struct SourceDriverRegistry {
    entries: HashMap<SmolStr, SourceDriverEntry>,
}

impl Default for SourceDriverRegistry {
    fn default() -> Self {
        Self::new()
    }
}

pub struct SourceSpec {
    pub name: SmolStr,
    pub source: Arc<dyn ValueSource>,
}

type SourceCreate = fn(&toml::Value) -> Result<Arc<dyn ValueSource>, DisplayError>;
type SourceValidate = fn(&toml::Value) -> Result<(), DisplayError>;

#[derive(Clone)]
struct SourceDriverEntry {
    canonical: SmolStr,
    create: SourceCreate,
    validate: SourceValidate,
}

impl SourceDriverRegistry {
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }

    pub fn default_registry() -> Self {
        let mut registry = Self::new();
        registry.register("simulated", create_simulated, SimulatedSource::validate_params);
        registry.register_alias("sim", "simulated");
        registry.register("loopback", create_loopback, validate_any);
        registry.register_alias("echo", "loopback");
        registry
    }

    pub fn register(
        &mut self,
        name: impl Into<SmolStr>,
        create: SourceCreate,
        validate: SourceValidate,
    ) {
        let canonical = normalize_name(name.into());
        let entry = SourceDriverEntry {
            canonical: canonical.clone(),
            create,
            validate,
        };
        self.entries.insert(canonical, entry);
    }

    pub fn register_alias(&mut self, alias: impl Into<SmolStr>, target: &str) {
        let alias = normalize_name(alias.into());
        let target = normalize_name(SmolStr::new(target));
        if let Some(entry) = self.entries.get(&target).cloned() {
            self.entries.insert(alias, entry);
        }
    }

    pub fn validate(&self, driver: &str, params: &toml::Value) -> Result<(), DisplayError> {
        if is_none_driver(driver) {
            return Ok(());
        }
        let entry = self.entry(driver)?;
        (entry.validate)(params)
    }

    /// Builds the named driver; `none` yields `Ok(None)`.
    pub fn build(
        &self,
        driver: &str,
        params: &toml::Value,
    ) -> Result<Option<SourceSpec>, DisplayError> {
        if is_none_driver(driver) {
            return Ok(None);
        }
        let entry = self.entry(driver)?;
        let source = (entry.create)(params)?;
        Ok(Some(SourceSpec {
            name: entry.canonical.clone(),
            source,
        }))
    }

    fn entry(&self, driver: &str) -> Result<&SourceDriverEntry, DisplayError> {
        self.entries
            .get(&normalize_name(SmolStr::new(driver)))
            .ok_or_else(|| {
                DisplayError::InvalidConfig(format!("unsupported source.driver '{driver}'").into())
            })
    }
}

fn normalize_name(name: SmolStr) -> SmolStr {
    SmolStr::new(name.as_str().trim().to_ascii_lowercase())
}

fn is_none_driver(name: &str) -> bool {
    name.trim().eq_ignore_ascii_case("none")
}

fn validate_any(_params: &toml::Value) -> Result<(), DisplayError> {
    Ok(())
}

fn create_simulated(params: &toml::Value) -> Result<Arc<dyn ValueSource>, DisplayError> {
    Ok(Arc::new(SimulatedSource::from_params(params)?))
}

fn create_loopback(_params: &toml::Value) -> Result<Arc<dyn ValueSource>, DisplayError> {
    Ok(Arc::new(LoopbackSource::new()))
}
