//! Module Factory
//!
//! Maps module class names to constructors. The manager asks the factory for
//! every class named in the middleware's module list; a class that was never
//! registered aborts startup.

use crate::error::{Result, RuntimeError};
use crate::instance::{ModuleActor, ModuleInstance};
use crate::module::Module;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

type Constructor = Arc<dyn Fn(&str, &str) -> Box<dyn ModuleInstance> + Send + Sync>;

#[derive(Default)]
pub struct ModuleFactory {
    constructors: BTreeMap<String, Constructor>,
}

impl ModuleFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `M` under `class`, constructed with `M::default()`
    pub fn register<M: Module + Default>(&mut self, class: &str) -> Result<()> {
        self.register_with(class, M::default)
    }

    /// Register `class` with a custom constructor
    pub fn register_with<M, F>(&mut self, class: &str, constructor: F) -> Result<()>
    where
        M: Module,
        F: Fn() -> M + Send + Sync + 'static,
    {
        if self.constructors.contains_key(class) {
            return Err(RuntimeError::DuplicateModuleClass {
                class: class.to_string(),
            });
        }
        let constructor: Constructor = Arc::new(move |module_id: &str, class: &str| {
            Box::new(ModuleActor::new(module_id, class, constructor())) as Box<dyn ModuleInstance>
        });
        self.constructors.insert(class.to_string(), constructor);
        debug!(class, module_type = std::any::type_name::<M>(), "Registered module class");
        Ok(())
    }

    pub fn is_module_class_registered(&self, class: &str) -> bool {
        self.constructors.contains_key(class)
    }

    /// Registered class names, sorted
    pub fn registered_classes(&self) -> Vec<String> {
        self.constructors.keys().cloned().collect()
    }

    /// Fresh instance of `class` tagged with `module_id`
    pub fn get_instance(&self, class: &str, module_id: &str) -> Result<Box<dyn ModuleInstance>> {
        let constructor = self
            .constructors
            .get(class)
            .ok_or_else(|| RuntimeError::UnknownModuleClass {
                class: class.to_string(),
            })?;
        Ok(constructor(module_id, class))
    }

    pub fn len(&self) -> usize {
        self.constructors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.constructors.is_empty()
    }
}

impl std::fmt::Debug for ModuleFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModuleFactory")
            .field("classes", &self.registered_classes())
            .finish()
    }
}
