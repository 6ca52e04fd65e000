//! Stage registrations and the field-ownership table.

use super::{project_fields, Projection, StageInput, StageProcessor};
use crate::context::{ContextField, RunContext};
use crate::errors::{codes, ContractErrorInfo, TopologyError};
use parking_lot::RwLock;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

/// A stage processor together with the fields it reads and owns.
#[derive(Clone)]
pub struct StageRegistration {
    processor: Arc<dyn StageProcessor>,
    owns: BTreeSet<ContextField>,
    reads: BTreeSet<ContextField>,
    projection: Option<Projection>,
}

impl StageRegistration {
    /// Creates a registration that owns and reads nothing.
    #[must_use]
    pub fn new(processor: Arc<dyn StageProcessor>) -> Self {
        Self {
            processor,
            owns: BTreeSet::new(),
            reads: BTreeSet::new(),
            projection: None,
        }
    }

    /// Declares the fields the stage may write.
    #[must_use]
    pub fn owns(mut self, fields: impl IntoIterator<Item = ContextField>) -> Self {
        self.owns.extend(fields);
        self
    }

    /// Declares the fields the default projection passes to the stage.
    #[must_use]
    pub fn reads(mut self, fields: impl IntoIterator<Item = ContextField>) -> Self {
        self.reads.extend(fields);
        self
    }

    /// Replaces the default projection.
    #[must_use]
    pub fn with_projection<F>(mut self, projection: F) -> Self
    where
        F: Fn(&RunContext) -> StageInput + Send + Sync + 'static,
    {
        self.projection = Some(Arc::new(projection));
        self
    }

    /// Returns the stage name.
    #[must_use]
    pub fn name(&self) -> &str {
        self.processor.name()
    }

    /// Returns the processor.
    #[must_use]
    pub fn processor(&self) -> &Arc<dyn StageProcessor> {
        &self.processor
    }

    /// Returns the owned fields.
    #[must_use]
    pub const fn owned_fields(&self) -> &BTreeSet<ContextField> {
        &self.owns
    }

    /// Returns the read fields.
    #[must_use]
    pub const fn read_fields(&self) -> &BTreeSet<ContextField> {
        &self.reads
    }

    /// Returns true if the stage may write the field.
    #[must_use]
    pub fn may_write(&self, field: ContextField) -> bool {
        self.owns.contains(&field)
    }

    /// Computes the stage input from the context.
    #[must_use]
    pub fn project(&self, ctx: &RunContext) -> StageInput {
        match &self.projection {
            Some(projection) => projection(ctx),
            None => project_fields(ctx, &self.reads),
        }
    }

    /// Validates the registration on its own.
    ///
    /// # Errors
    ///
    /// Returns an error if the name is blank or a reserved field is claimed.
    pub fn validate(&self) -> Result<(), TopologyError> {
        if self.name().trim().is_empty() {
            return Err(TopologyError::new(
                "Stage name cannot be empty",
                ContractErrorInfo::new(codes::EMPTY_NAME, "Stage registered without a name"),
            ));
        }

        if let Some(field) = self.owns.iter().find(|f| f.is_reserved()) {
            return Err(TopologyError::new(
                format!("Stage '{}' cannot own reserved field '{field}'", self.name()),
                ContractErrorInfo::new(
                    codes::RESERVED_FIELD,
                    format!("'{field}' is seeded from the run input"),
                )
                .with_fix_hint("Read the field instead of owning it."),
            )
            .with_stages(vec![self.name().to_string()]));
        }

        Ok(())
    }
}

impl std::fmt::Debug for StageRegistration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StageRegistration")
            .field("name", &self.name())
            .field("owns", &self.owns)
            .field("reads", &self.reads)
            .field("custom_projection", &self.projection.is_some())
            .finish()
    }
}

/// Registered stages, looked up by name.
///
/// Ownership is checked here: no two registrations may own the same field,
/// which keeps merges of parallel groups race-free without locking.
#[derive(Debug, Default)]
pub struct StageRegistry {
    stages: RwLock<HashMap<String, Arc<StageRegistration>>>,
}

impl StageRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a stage, replacing any registration with the same name.
    ///
    /// Returns the replaced registration, if any.
    ///
    /// # Errors
    ///
    /// Returns an error if the registration is invalid or claims a field
    /// owned by a differently named stage.
    pub fn register(
        &self,
        registration: StageRegistration,
    ) -> Result<Option<Arc<StageRegistration>>, TopologyError> {
        registration.validate()?;

        let mut stages = self.stages.write();
        let name = registration.name().to_string();

        for (other_name, other) in stages.iter() {
            if *other_name == name {
                continue;
            }
            let overlap: Vec<String> = registration
                .owns
                .intersection(&other.owns)
                .map(ToString::to_string)
                .collect();
            if !overlap.is_empty() {
                return Err(TopologyError::new(
                    format!(
                        "Stage '{name}' claims field(s) {} already owned by '{other_name}'",
                        overlap.join(", ")
                    ),
                    ContractErrorInfo::new(codes::OVERLAP, "Field ownership must be disjoint")
                        .with_fix_hint("Give each field exactly one owning stage."),
                )
                .with_stages(vec![name.clone(), other_name.clone()]));
            }
        }

        tracing::debug!(stage = %name, owns = ?registration.owns, "Registered stage");
        Ok(stages.insert(name, Arc::new(registration)))
    }

    /// Gets a registration by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<Arc<StageRegistration>> {
        self.stages.read().get(name).cloned()
    }

    /// Returns true if a stage is registered under the name.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.stages.read().contains_key(name)
    }

    /// Removes a registration.
    pub fn unregister(&self, name: &str) -> Option<Arc<StageRegistration>> {
        self.stages.write().remove(name)
    }

    /// Returns the registered names, sorted.
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.stages.read().keys().cloned().collect();
        names.sort();
        names
    }

    /// Returns the number of registrations.
    #[must_use]
    pub fn len(&self) -> usize {
        self.stages.read().len()
    }

    /// Returns true if nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.stages.read().is_empty()
    }
}
