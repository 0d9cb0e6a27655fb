/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Bounded, ordered collection of registered modules.
//!
//! The registry owns every module for the lifetime of the process together
//! with a parallel array of [`RuntimeStat`]s (one per module, primary
//! context).  Index `i` of both arrays always refers to the same module.
//!
//! Registration happens before setup; [`seal`](ModuleRegistry::seal) ends the
//! registration phase and from then on the shape never changes.

use tracing::{debug, info};

use crate::error::RegistryError;
use crate::module::{Module, SecondaryModule};
use crate::stat::RuntimeStat;

/// Stable position of a module in the registry, assigned at registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ModuleId(usize);

impl ModuleId {
    pub fn index(self) -> usize {
        self.0
    }
}

/// A secondary-context half, still tagged with the module it came from.
pub struct SecondaryEntry {
    pub id: ModuleId,
    pub name: String,
    pub module: Box<dyn SecondaryModule>,
}

pub struct ModuleRegistry {
    modules: Vec<Box<dyn Module>>,
    runtime: Vec<RuntimeStat>,
    secondary: Vec<SecondaryEntry>,
    capacity: usize,
    sealed: bool,
}

impl ModuleRegistry {
    pub fn new(capacity: usize) -> Self {
        Self {
            modules: Vec::with_capacity(capacity),
            runtime: Vec::with_capacity(capacity),
            secondary: Vec::new(),
            capacity,
            sealed: false,
        }
    }

    /// Register `module` at the next index.
    ///
    /// The module's secondary half, if it has one, is detached here and kept
    /// until the secondary context collects it.
    ///
    /// # Errors
    /// * [`RegistryError::Sealed`] after [`seal`](Self::seal).
    /// * [`RegistryError::Full`] when `capacity` modules are registered.
    pub fn add(&mut self, mut module: Box<dyn Module>) -> Result<ModuleId, RegistryError> {
        if self.sealed {
            return Err(RegistryError::Sealed {
                module: module.name().to_string(),
            });
        }
        if self.modules.len() >= self.capacity {
            return Err(RegistryError::Full {
                module: module.name().to_string(),
                capacity: self.capacity,
            });
        }

        let id = ModuleId(self.modules.len());
        if let Some(half) = module.take_secondary() {
            debug!(module = module.name(), "module brings a secondary half");
            self.secondary.push(SecondaryEntry {
                id,
                name: module.name().to_string(),
                module: half,
            });
        }

        info!(module = module.name(), index = id.0, "module registered");
        self.modules.push(module);
        self.runtime.push(RuntimeStat::new());
        Ok(id)
    }

    /// End the registration phase.
    pub fn seal(&mut self) {
        if !self.sealed {
            self.sealed = true;
            debug!(count = self.modules.len(), "module registry sealed");
        }
    }

    pub fn is_sealed(&self) -> bool {
        self.sealed
    }

    pub fn len(&self) -> usize {
        self.modules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// `true` while secondary halves are waiting to be collected.
    pub fn has_secondary(&self) -> bool {
        !self.secondary.is_empty()
    }

    /// Move all secondary halves out, in registration order.
    pub fn take_secondary(&mut self) -> Vec<SecondaryEntry> {
        std::mem::take(&mut self.secondary)
    }

    pub fn get(&self, id: ModuleId) -> Option<&dyn Module> {
        self.modules.get(id.0).map(|m| m.as_ref())
    }

    pub fn name(&self, index: usize) -> &str {
        self.modules.get(index).map(|m| m.name()).unwrap_or("?")
    }

    /// Module and its statistics entry at `index`, borrowed together.
    ///
    /// # Panics
    /// Panics if `index >= len()`.
    pub fn entry_mut(&mut self, index: usize) -> (&mut dyn Module, &mut RuntimeStat) {
        (self.modules[index].as_mut(), &mut self.runtime[index])
    }

    pub fn iter(&self) -> impl Iterator<Item = &Box<dyn Module>> {
        self.modules.iter()
    }

    /// Modules in registration order.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Box<dyn Module>> {
        self.modules.iter_mut()
    }

    pub fn runtime(&self, index: usize) -> Option<&RuntimeStat> {
        self.runtime.get(index)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
