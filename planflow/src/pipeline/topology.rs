//! The fixed step sequence of a planning run.

use crate::errors::{codes, ContractErrorInfo, TopologyError};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// One step of a topology.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TopologyStep {
    /// A single stage.
    Stage {
        /// The stage name.
        name: String,
    },
    /// A stage whose verdict can reject the design.
    Gate {
        /// The stage name.
        name: String,
    },
    /// Stages run concurrently and merged together.
    Parallel {
        /// The group name, used as the step name.
        name: String,
        /// Member stage names, in merge order.
        members: Vec<String>,
    },
}

impl TopologyStep {
    /// Returns the step name.
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Self::Stage { name } | Self::Gate { name } | Self::Parallel { name, .. } => name,
        }
    }

    /// Returns the stage names the step executes.
    #[must_use]
    pub fn stage_names(&self) -> Vec<&str> {
        match self {
            Self::Stage { name } | Self::Gate { name } => vec![name.as_str()],
            Self::Parallel { members, .. } => members.iter().map(String::as_str).collect(),
        }
    }

    /// Returns true for a gate.
    #[must_use]
    pub const fn is_gate(&self) -> bool {
        matches!(self, Self::Gate { .. })
    }
}

/// A validated, immutable step sequence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Topology {
    name: String,
    steps: Vec<TopologyStep>,
}

impl Topology {
    /// Starts building a topology.
    #[must_use]
    pub fn builder(name: impl Into<String>) -> TopologyBuilder {
        TopologyBuilder::new(name)
    }

    /// Returns the topology name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the steps in execution order.
    #[must_use]
    pub fn steps(&self) -> &[TopologyStep] {
        &self.steps
    }

    /// Returns the step names in execution order.
    #[must_use]
    pub fn step_names(&self) -> Vec<&str> {
        self.steps.iter().map(TopologyStep::name).collect()
    }

    /// Returns every stage name, group members included.
    #[must_use]
    pub fn stage_names(&self) -> Vec<&str> {
        self.steps.iter().flat_map(TopologyStep::stage_names).collect()
    }

    /// Finds the step that executes a stage.
    #[must_use]
    pub fn step_for_stage(&self, stage: &str) -> Option<&TopologyStep> {
        self.steps
            .iter()
            .find(|step| step.stage_names().contains(&stage))
    }

    /// Returns the number of steps.
    #[must_use]
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    /// Always false for a built topology.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

/// Builds a [`Topology`], validating names on [`build`](Self::build).
#[derive(Debug, Clone)]
pub struct TopologyBuilder {
    name: String,
    steps: Vec<TopologyStep>,
}

impl TopologyBuilder {
    /// Creates an empty builder.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            steps: Vec::new(),
        }
    }

    /// Appends a single stage.
    #[must_use]
    pub fn stage(mut self, name: impl Into<String>) -> Self {
        self.steps.push(TopologyStep::Stage { name: name.into() });
        self
    }

    /// Appends a gate stage.
    #[must_use]
    pub fn gate(mut self, name: impl Into<String>) -> Self {
        self.steps.push(TopologyStep::Gate { name: name.into() });
        self
    }

    /// Appends a parallel group.
    #[must_use]
    pub fn parallel(
        mut self,
        name: impl Into<String>,
        members: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        self.steps.push(TopologyStep::Parallel {
            name: name.into(),
            members: members.into_iter().map(Into::into).collect(),
        });
        self
    }

    /// Validates and builds the topology.
    ///
    /// # Errors
    ///
    /// Returns an error if there are no steps, a name is blank, a group has
    /// no members, or a name (stage or group) appears twice.
    pub fn build(self) -> Result<Topology, TopologyError> {
        if self.steps.is_empty() {
            return Err(TopologyError::new(
                format!("Topology '{}' has no steps", self.name),
                ContractErrorInfo::new(codes::EMPTY, "Cannot build an empty topology")
                    .with_fix_hint("Add at least one stage before building."),
            ));
        }

        let mut seen: HashSet<&str> = HashSet::new();
        for step in &self.steps {
            if let TopologyStep::Parallel { name, members } = step {
                if members.is_empty() {
                    return Err(TopologyError::new(
                        format!("Parallel group '{name}' has no members"),
                        ContractErrorInfo::new(codes::EMPTY_GROUP, "Groups need at least one stage"),
                    )
                    .with_stages(vec![name.clone()]));
                }
            }

            let mut names = vec![step.name()];
            if matches!(step, TopologyStep::Parallel { .. }) {
                names.extend(step.stage_names());
            }

            for name in names {
                if name.trim().is_empty() {
                    return Err(TopologyError::new(
                        "Topology contains a step with an empty name",
                        ContractErrorInfo::new(codes::EMPTY_NAME, "Every step needs a name"),
                    ));
                }
                if !seen.insert(name) {
                    return Err(TopologyError::new(
                        format!("Name '{name}' appears more than once in the topology"),
                        ContractErrorInfo::new(codes::DUPLICATE, "Stage names must be unique")
                            .with_fix_hint("Rename one of the stages."),
                    )
                    .with_stages(vec![name.to_string()]));
                }
            }
        }

        Ok(Topology {
            name: self.name,
            steps: self.steps,
        })
    }
}
