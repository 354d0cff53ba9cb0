//! Report section identifiers and project context.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::DraftingError;

/// The fixed set of report sections the drafter knows how to write.
///
/// Serialized as the snake_case identifier used by the report templates
/// (`"executive_summary"`, `"budget_summary"`, ...).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SectionType {
    ExecutiveSummary,
    SiteObservations,
    BuildingStatus,
    BudgetSummary,
    ScheduleSummary,
    ChangeOrders,
    SafetyObservations,
    Recommendations,
}

impl SectionType {
    /// Every section type, in template order.
    pub const ALL: [SectionType; 8] = [
        SectionType::ExecutiveSummary,
        SectionType::SiteObservations,
        SectionType::BuildingStatus,
        SectionType::BudgetSummary,
        SectionType::ScheduleSummary,
        SectionType::ChangeOrders,
        SectionType::SafetyObservations,
        SectionType::Recommendations,
    ];

    /// Stable identifier, also used as the embedding index tag.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ExecutiveSummary => "executive_summary",
            Self::SiteObservations => "site_observations",
            Self::BuildingStatus => "building_status",
            Self::BudgetSummary => "budget_summary",
            Self::ScheduleSummary => "schedule_summary",
            Self::ChangeOrders => "change_orders",
            Self::SafetyObservations => "safety_observations",
            Self::Recommendations => "recommendations",
        }
    }

    /// Human heading, e.g. "Executive Summary".
    pub fn title(&self) -> String {
        self.as_str()
            .split('_')
            .map(|word| {
                let mut chars = word.chars();
                match chars.next() {
                    Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                    None => String::new(),
                }
            })
            .collect::<Vec<_>>()
            .join(" ")
    }
}

impl fmt::Display for SectionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SectionType {
    type Err = DraftingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_lowercase().replace([' ', '-'], "_");
        SectionType::ALL
            .iter()
            .copied()
            .find(|t| t.as_str() == normalized)
            .ok_or_else(|| DraftingError::validation(format!("unknown section type: {s:?}")))
    }
}

/// Project-level facts shown at the top of every generation request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProjectContext {
    pub project_name: String,
    pub site_name: Option<String>,
    pub report_number: Option<String>,
    pub inspection_date: Option<NaiveDate>,
    pub report_date: Option<NaiveDate>,
    pub weather_conditions: Option<String>,
    pub personnel_on_site: Option<String>,
}

impl ProjectContext {
    /// Create a context for a project.
    pub fn new(project_name: impl Into<String>) -> Self {
        Self {
            project_name: project_name.into(),
            ..Default::default()
        }
    }

    /// Set the site name.
    pub fn with_site(mut self, site: impl Into<String>) -> Self {
        self.site_name = Some(site.into());
        self
    }

    /// Set the report number.
    pub fn with_report_number(mut self, number: impl Into<String>) -> Self {
        self.report_number = Some(number.into());
        self
    }

    /// Set the inspection date.
    pub fn with_inspection_date(mut self, date: NaiveDate) -> Self {
        self.inspection_date = Some(date);
        self
    }

    /// Set the report date.
    pub fn with_report_date(mut self, date: NaiveDate) -> Self {
        self.report_date = Some(date);
        self
    }

    /// Set the weather conditions.
    pub fn with_weather(mut self, weather: impl Into<String>) -> Self {
        self.weather_conditions = Some(weather.into());
        self
    }

    /// Set the personnel on site.
    pub fn with_personnel(mut self, personnel: impl Into<String>) -> Self {
        self.personnel_on_site = Some(personnel.into());
        self
    }

    /// Render as `- Key: value` lines, skipping unknown fields.
    pub fn render_lines(&self) -> Vec<String> {
        let mut lines = vec![format!("- Project: {}", self.project_name)];
        if let Some(site) = &self.site_name {
            lines.push(format!("- Site: {site}"));
        }
        if let Some(number) = &self.report_number {
            lines.push(format!("- Report Number: {number}"));
        }
        if let Some(date) = self.inspection_date {
            lines.push(format!("- Inspection Date: {date}"));
        }
        if let Some(date) = self.report_date {
            lines.push(format!("- Report Date: {date}"));
        }
        if let Some(weather) = &self.weather_conditions {
            lines.push(format!("- Weather: {weather}"));
        }
        if let Some(personnel) = &self.personnel_on_site {
            lines.push(format!("- Personnel: {personnel}"));
        }
        lines
    }
}
