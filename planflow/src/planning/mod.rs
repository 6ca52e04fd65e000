//! The house-planning topology.
//!
//! Stage names, the field-ownership table and the validation report
//! convention used by the design gate. Stage implementations are supplied
//! by the host; this module only fixes their contracts.
//!
//! ```text
//! plot-analysis
//!   -> site-constraints [regulation-compliance, engineer-clarification,
//!                        vastu-compliance, eco-design]
//!   -> architectural-zoning -> dimensioning -> engineering-plan
//!   -> design-validation (gate)
//!   -> deliverables [cost-estimation, design-narrative]
//!   -> visualization
//! ```

use crate::context::ContextField;
use crate::context::ContextField as F;
use crate::errors::{codes, ContractErrorInfo, TopologyError};
use crate::pipeline::Topology;
use crate::stages::{GateVerdict, StageProcessor, StageRegistration, StageResult};
use std::sync::Arc;

/// Name of the planning topology.
pub const PLANNING_TOPOLOGY: &str = "house-planning";

/// Reads the survey and derives plot geometry.
pub const PLOT_ANALYSIS: &str = "plot-analysis";
/// Parallel group of site constraint stages.
pub const SITE_CONSTRAINTS: &str = "site-constraints";
/// Setbacks, FAR and bye-laws.
pub const REGULATION_COMPLIANCE: &str = "regulation-compliance";
/// Structural approach, asking the engineer where the survey is silent.
pub const ENGINEER_CLARIFICATION: &str = "engineer-clarification";
/// Vastu zone mapping.
pub const VASTU_COMPLIANCE: &str = "vastu-compliance";
/// Passive design choices.
pub const ECO_DESIGN: &str = "eco-design";
/// Public, private and service zoning.
pub const ARCHITECTURAL_ZONING: &str = "architectural-zoning";
/// Room sizes and placement.
pub const DIMENSIONING: &str = "dimensioning";
/// Walls, staircase, plumbing and ventilation.
pub const ENGINEERING_PLAN: &str = "engineering-plan";
/// Gate checking the layout against the plot and regulations.
pub const DESIGN_VALIDATION: &str = "design-validation";
/// Parallel group of deliverable stages.
pub const DELIVERABLES: &str = "deliverables";
/// Bill of quantities.
pub const COST_ESTIMATION: &str = "cost-estimation";
/// Written description of the design.
pub const DESIGN_NARRATIVE: &str = "design-narrative";
/// Drawing generation.
pub const VISUALIZATION: &str = "visualization";

/// The fields a planning stage reads and owns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StageContract {
    /// Stage name.
    pub name: &'static str,
    /// Fields the stage may write.
    pub owns: &'static [ContextField],
    /// Fields projected into the stage input.
    pub reads: &'static [ContextField],
}

/// Ownership table for every planning stage, in topology order.
pub const CONTRACTS: [StageContract; 12] = [
    StageContract {
        name: PLOT_ANALYSIS,
        owns: &[F::PlotAnalysis],
        reads: &[F::SiteSurvey],
    },
    StageContract {
        name: REGULATION_COMPLIANCE,
        owns: &[F::Regulations],
        reads: &[F::SiteSurvey, F::PlotAnalysis],
    },
    StageContract {
        name: ENGINEER_CLARIFICATION,
        owns: &[F::StructuralStrategy],
        reads: &[F::SiteSurvey, F::PlotAnalysis],
    },
    StageContract {
        name: VASTU_COMPLIANCE,
        owns: &[F::VastuZones],
        reads: &[F::PlotAnalysis],
    },
    StageContract {
        name: ECO_DESIGN,
        owns: &[F::EcoDesign],
        reads: &[F::SiteSurvey, F::PlotAnalysis],
    },
    StageContract {
        name: ARCHITECTURAL_ZONING,
        owns: &[F::Zoning],
        reads: &[F::PlotAnalysis, F::Regulations, F::VastuZones, F::EcoDesign],
    },
    StageContract {
        name: DIMENSIONING,
        owns: &[F::RoomLayout],
        reads: &[F::SiteSurvey, F::PlotAnalysis, F::Regulations, F::Zoning],
    },
    StageContract {
        name: ENGINEERING_PLAN,
        owns: &[F::EngineeringPlan],
        reads: &[F::PlotAnalysis, F::StructuralStrategy, F::RoomLayout],
    },
    StageContract {
        name: DESIGN_VALIDATION,
        owns: &[F::Validation],
        reads: &[F::PlotAnalysis, F::Regulations, F::RoomLayout, F::EngineeringPlan],
    },
    StageContract {
        name: COST_ESTIMATION,
        owns: &[F::CostEstimate],
        reads: &[F::StructuralStrategy, F::RoomLayout, F::EngineeringPlan],
    },
    StageContract {
        name: DESIGN_NARRATIVE,
        owns: &[F::Narrative],
        reads: &[
            F::PlotAnalysis,
            F::VastuZones,
            F::EcoDesign,
            F::Zoning,
            F::RoomLayout,
            F::Validation,
        ],
    },
    StageContract {
        name: VISUALIZATION,
        owns: &[F::Visualization],
        reads: &[F::PlotAnalysis, F::Zoning, F::RoomLayout, F::EngineeringPlan],
    },
];

/// Looks up a stage contract by name.
#[must_use]
pub fn contract(name: &str) -> Option<&'static StageContract> {
    CONTRACTS.iter().find(|c| c.name == name)
}

/// Builds the planning topology.
///
/// # Errors
///
/// Never fails for the built-in step list; the result type mirrors
/// [`TopologyBuilder::build`](crate::pipeline::TopologyBuilder::build).
pub fn planning_topology() -> Result<Topology, TopologyError> {
    Topology::builder(PLANNING_TOPOLOGY)
        .stage(PLOT_ANALYSIS)
        .parallel(
            SITE_CONSTRAINTS,
            [
                REGULATION_COMPLIANCE,
                ENGINEER_CLARIFICATION,
                VASTU_COMPLIANCE,
                ECO_DESIGN,
            ],
        )
        .stage(ARCHITECTURAL_ZONING)
        .stage(DIMENSIONING)
        .stage(ENGINEERING_PLAN)
        .gate(DESIGN_VALIDATION)
        .parallel(DELIVERABLES, [COST_ESTIMATION, DESIGN_NARRATIVE])
        .stage(VISUALIZATION)
        .build()
}

/// Wraps a processor in a registration carrying its planning contract.
///
/// # Errors
///
/// Returns an error if the processor's name is not a planning stage.
pub fn planning_registration(
    processor: Arc<dyn StageProcessor>,
) -> Result<StageRegistration, TopologyError> {
    let name = processor.name().to_string();
    let contract = contract(&name).ok_or_else(|| {
        TopologyError::new(
            format!("'{name}' is not a planning stage"),
            ContractErrorInfo::new(codes::UNKNOWN_STAGE, "No ownership entry for the stage")
                .with_fix_hint("Use one of the stage names in planflow::planning."),
        )
        .with_stages(vec![name.clone()])
    })?;

    Ok(StageRegistration::new(processor)
        .owns(contract.owns.iter().copied())
        .reads(contract.reads.iter().copied()))
}

/// Derives the gate verdict from a validation report.
///
/// The report is an object with an optional `is_valid` flag and an
/// `issues` array of strings or `{"message": ...}` objects. The design is
/// rejected when `is_valid` is false, or when the flag is absent and issues
/// were reported.
#[must_use]
pub fn verdict_from_report(report: &serde_json::Value) -> GateVerdict {
    let issues: Vec<String> = report
        .get("issues")
        .and_then(serde_json::Value::as_array)
        .map(|items| items.iter().filter_map(issue_text).collect())
        .unwrap_or_default();

    let valid = report
        .get("is_valid")
        .and_then(serde_json::Value::as_bool)
        .unwrap_or(issues.is_empty());

    if valid {
        GateVerdict::Approved
    } else if issues.is_empty() {
        GateVerdict::rejected(["design failed validation"])
    } else {
        GateVerdict::Rejected { issues }
    }
}

/// Builds the design gate's result from its validation report.
#[must_use]
pub fn validation_result(report: serde_json::Value) -> StageResult {
    let verdict = verdict_from_report(&report);
    StageResult::ok_field(ContextField::Validation, report).with_verdict(verdict)
}

fn issue_text(item: &serde_json::Value) -> Option<String> {
    match item {
        serde_json::Value::String(s) => Some(s.clone()),
        serde_json::Value::Object(o) => o
            .get("message")
            .and_then(serde_json::Value::as_str)
            .map(ToString::to_string),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::TopologyStep;
    use crate::stages::{FnStage, StageInput, StageRegistry};
    use serde_json::json;

    fn noop(name: &'static str) -> Arc<dyn StageProcessor> {
        Arc::new(FnStage::new(name, |_: &StageInput| StageResult::ok_empty()))
    }

    #[test]
    fn test_planning_topology_shape() {
        let topology = planning_topology().unwrap();
        assert_eq!(topology.name(), PLANNING_TOPOLOGY);
        assert_eq!(
            topology.step_names(),
            vec![
                PLOT_ANALYSIS,
                SITE_CONSTRAINTS,
                ARCHITECTURAL_ZONING,
                DIMENSIONING,
                ENGINEERING_PLAN,
                DESIGN_VALIDATION,
                DELIVERABLES,
                VISUALIZATION,
            ]
        );
        assert!(matches!(
            topology.step_for_stage(DESIGN_VALIDATION),
            Some(TopologyStep::Gate { .. })
        ));
    }

    #[test]
    fn test_every_topology_stage_has_a_contract() {
        let topology = planning_topology().unwrap();
        for stage in topology.stage_names() {
            assert!(contract(stage).is_some(), "missing contract for {stage}");
        }
    }

    #[test]
    fn test_contracts_register_without_overlap() {
        let registry = StageRegistry::new();
        for contract in &CONTRACTS {
            registry
                .register(planning_registration(noop(contract.name)).unwrap())
                .unwrap();
        }
        assert_eq!(registry.len(), CONTRACTS.len());
    }

    #[test]
    fn test_no_contract_owns_the_site_survey() {
        assert!(CONTRACTS
            .iter()
            .all(|c| !c.owns.contains(&ContextField::SiteSurvey)));
    }

    #[test]
    fn test_planning_registration_applies_contract() {
        let registration = planning_registration(noop(DIMENSIONING)).unwrap();
        assert!(registration.may_write(ContextField::RoomLayout));
        assert!(!registration.may_write(ContextField::Zoning));
        assert!(registration.read_fields().contains(&ContextField::Zoning));

        let err = planning_registration(noop("landscaping")).unwrap_err();
        assert_eq!(err.code(), codes::UNKNOWN_STAGE);
    }

    #[test]
    fn test_verdict_from_report() {
        assert_eq!(
            verdict_from_report(&json!({"is_valid": true, "issues": []})),
            GateVerdict::Approved
        );
        assert_eq!(verdict_from_report(&json!({})), GateVerdict::Approved);
        assert_eq!(
            verdict_from_report(&json!({
                "issues": ["kitchen below 50 sqft", {"message": "rooms overlap"}, 3]
            })),
            GateVerdict::rejected(["kitchen below 50 sqft", "rooms overlap"])
        );
        assert_eq!(
            verdict_from_report(&json!({"is_valid": false})),
            GateVerdict::rejected(["design failed validation"])
        );
    }

    #[test]
    fn test_validation_result_writes_report() {
        let result = validation_result(json!({"is_valid": false, "issues": ["no stair"]}));
        assert!(result.success);
        assert_eq!(result.written_fields(), vec![ContextField::Validation]);
        assert!(result.verdict.unwrap().is_rejected());
    }
}
