//! Schema-typed domain fields accumulated across a planning run.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Identifies one domain slot of the run context.
///
/// Every slot except [`ContextField::SiteSurvey`] is written by exactly one
/// registered stage; the site survey is the run input and is seeded by the
/// orchestrator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContextField {
    /// Raw site survey supplied as run input.
    SiteSurvey,
    /// Plot geometry, orientation, road side and soil notes.
    PlotAnalysis,
    /// Setbacks, FAR and local building bye-laws.
    Regulations,
    /// Load-bearing, RCC or hybrid structural approach.
    StructuralStrategy,
    /// Vastu direction to room-type mapping.
    VastuZones,
    /// Passive cooling, daylight and material choices.
    EcoDesign,
    /// Public/private/service zoning of the plan.
    Zoning,
    /// Dimensioned rooms with adjacencies.
    RoomLayout,
    /// Walls, staircase, plumbing, ventilation and expansion provisions.
    EngineeringPlan,
    /// Design validation report.
    Validation,
    /// Bill of quantities and cost range.
    CostEstimate,
    /// Human-readable design narrative.
    Narrative,
    /// Rendered drawing references.
    Visualization,
}

impl ContextField {
    /// All fields in schema order.
    pub const ALL: [Self; 13] = [
        Self::SiteSurvey,
        Self::PlotAnalysis,
        Self::Regulations,
        Self::StructuralStrategy,
        Self::VastuZones,
        Self::EcoDesign,
        Self::Zoning,
        Self::RoomLayout,
        Self::EngineeringPlan,
        Self::Validation,
        Self::CostEstimate,
        Self::Narrative,
        Self::Visualization,
    ];

    /// Returns the snake_case name of the field.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::SiteSurvey => "site_survey",
            Self::PlotAnalysis => "plot_analysis",
            Self::Regulations => "regulations",
            Self::StructuralStrategy => "structural_strategy",
            Self::VastuZones => "vastu_zones",
            Self::EcoDesign => "eco_design",
            Self::Zoning => "zoning",
            Self::RoomLayout => "room_layout",
            Self::EngineeringPlan => "engineering_plan",
            Self::Validation => "validation",
            Self::CostEstimate => "cost_estimate",
            Self::Narrative => "narrative",
            Self::Visualization => "visualization",
        }
    }

    /// Returns true if the field is seeded by the orchestrator rather than a stage.
    #[must_use]
    pub const fn is_reserved(&self) -> bool {
        matches!(self, Self::SiteSurvey)
    }
}

impl fmt::Display for ContextField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ContextField {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|field| field.as_str() == s)
            .ok_or_else(|| format!("unknown context field '{s}'"))
    }
}

/// The domain bag of a run context.
///
/// Each slot holds the JSON payload produced by its owning stage.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DesignFields {
    #[serde(skip_serializing_if = "Option::is_none")]
    site_survey: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    plot_analysis: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    regulations: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    structural_strategy: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    vastu_zones: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    eco_design: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    zoning: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    room_layout: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    engineering_plan: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    validation: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    cost_estimate: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    narrative: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    visualization: Option<serde_json::Value>,
}

impl DesignFields {
    /// Creates an empty field bag.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self, field: ContextField) -> &Option<serde_json::Value> {
        match field {
            ContextField::SiteSurvey => &self.site_survey,
            ContextField::PlotAnalysis => &self.plot_analysis,
            ContextField::Regulations => &self.regulations,
            ContextField::StructuralStrategy => &self.structural_strategy,
            ContextField::VastuZones => &self.vastu_zones,
            ContextField::EcoDesign => &self.eco_design,
            ContextField::Zoning => &self.zoning,
            ContextField::RoomLayout => &self.room_layout,
            ContextField::EngineeringPlan => &self.engineering_plan,
            ContextField::Validation => &self.validation,
            ContextField::CostEstimate => &self.cost_estimate,
            ContextField::Narrative => &self.narrative,
            ContextField::Visualization => &self.visualization,
        }
    }

    fn slot_mut(&mut self, field: ContextField) -> &mut Option<serde_json::Value> {
        match field {
            ContextField::SiteSurvey => &mut self.site_survey,
            ContextField::PlotAnalysis => &mut self.plot_analysis,
            ContextField::Regulations => &mut self.regulations,
            ContextField::StructuralStrategy => &mut self.structural_strategy,
            ContextField::VastuZones => &mut self.vastu_zones,
            ContextField::EcoDesign => &mut self.eco_design,
            ContextField::Zoning => &mut self.zoning,
            ContextField::RoomLayout => &mut self.room_layout,
            ContextField::EngineeringPlan => &mut self.engineering_plan,
            ContextField::Validation => &mut self.validation,
            ContextField::CostEstimate => &mut self.cost_estimate,
            ContextField::Narrative => &mut self.narrative,
            ContextField::Visualization => &mut self.visualization,
        }
    }

    /// Gets the value of a field.
    #[must_use]
    pub fn get(&self, field: ContextField) -> Option<&serde_json::Value> {
        self.slot(field).as_ref()
    }

    /// Sets a field, returning the previous value.
    pub fn set(&mut self, field: ContextField, value: serde_json::Value) -> Option<serde_json::Value> {
        self.slot_mut(field).replace(value)
    }

    /// Clears a field, returning the previous value.
    pub fn clear(&mut self, field: ContextField) -> Option<serde_json::Value> {
        self.slot_mut(field).take()
    }

    /// Returns true if the field holds a value.
    #[must_use]
    pub fn is_populated(&self, field: ContextField) -> bool {
        self.slot(field).is_some()
    }

    /// Returns the populated fields in schema order.
    #[must_use]
    pub fn populated(&self) -> Vec<ContextField> {
        ContextField::ALL
            .iter()
            .copied()
            .filter(|field| self.is_populated(*field))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_field_names_round_trip_through_from_str() {
        for field in ContextField::ALL {
            assert_eq!(field.as_str().parse::<ContextField>().unwrap(), field);
        }
        assert!("rooms".parse::<ContextField>().is_err());
    }

    #[test]
    fn test_field_serializes_snake_case() {
        let json = serde_json::to_string(&ContextField::RoomLayout).unwrap();
        assert_eq!(json, r#""room_layout""#);
    }

    #[test]
    fn test_only_site_survey_is_reserved() {
        let reserved: Vec<_> = ContextField::ALL.iter().filter(|f| f.is_reserved()).collect();
        assert_eq!(reserved, vec![&ContextField::SiteSurvey]);
    }

    #[test]
    fn test_set_get_and_clear() {
        let mut fields = DesignFields::new();
        assert!(fields.get(ContextField::Zoning).is_none());

        let prev = fields.set(ContextField::Zoning, serde_json::json!({"public": ["living"]}));
        assert!(prev.is_none());
        assert!(fields.is_populated(ContextField::Zoning));

        let prev = fields.set(ContextField::Zoning, serde_json::json!({}));
        assert_eq!(prev, Some(serde_json::json!({"public": ["living"]})));

        assert_eq!(fields.clear(ContextField::Zoning), Some(serde_json::json!({})));
        assert!(!fields.is_populated(ContextField::Zoning));
    }

    #[test]
    fn test_populated_is_in_schema_order() {
        let mut fields = DesignFields::new();
        fields.set(ContextField::Narrative, serde_json::json!("text"));
        fields.set(ContextField::PlotAnalysis, serde_json::json!({"width": 30}));

        assert_eq!(
            fields.populated(),
            vec![ContextField::PlotAnalysis, ContextField::Narrative]
        );
    }

    #[test]
    fn test_serialization_skips_empty_slots() {
        let mut fields = DesignFields::new();
        fields.set(ContextField::Regulations, serde_json::json!({"far": 1.75}));

        let json = serde_json::to_value(&fields).unwrap();
        assert_eq!(json, serde_json::json!({"regulations": {"far": 1.75}}));
    }
}
