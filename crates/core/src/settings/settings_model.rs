use std::collections::HashMap;
use std::str::FromStr;

use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use crate::constants::{
    DEFAULT_DURATION_TOLERANCE_SECS, DEFAULT_START_TOLERANCE_SECS, DEFAULT_TASK_NAME,
    DEFAULT_VERIFY_STALENESS_HOURS,
};
use crate::errors::Error;
use crate::worklogs::WorklogFilter;

/// Thresholds for destination-vs-source drift detection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DriftTolerance {
    pub duration_seconds: i64,
    /// Allowed difference between the time-of-day of both start times.
    pub start_time_seconds: i64,
}

impl Default for DriftTolerance {
    fn default() -> Self {
        Self {
            duration_seconds: DEFAULT_DURATION_TOLERANCE_SECS,
            start_time_seconds: DEFAULT_START_TOLERANCE_SECS,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BillableRule {
    /// Billable when the worklog carries billable seconds.
    Auto,
    Always,
    Never,
}

impl FromStr for BillableRule {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "auto" => Ok(BillableRule::Auto),
            "always" | "always_billable" => Ok(BillableRule::Always),
            "never" | "never_billable" => Ok(BillableRule::Never),
            other => Err(Error::InvalidConfigValue(format!(
                "unknown billable rule '{}'",
                other
            ))),
        }
    }
}

/// Name-based routing of worklogs to destination projects and tasks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoutingRules {
    /// Project key -> destination project name. Unmapped keys use the key itself.
    pub project_mappings: HashMap<String, String>,
    /// Issue type -> destination task name.
    pub task_mappings: HashMap<String, String>,
    pub default_task: Option<String>,
    pub billable_default: BillableRule,
    /// Project key -> rule overriding `billable_default`.
    pub billable_overrides: HashMap<String, BillableRule>,
}

impl Default for RoutingRules {
    fn default() -> Self {
        Self {
            project_mappings: HashMap::new(),
            task_mappings: HashMap::new(),
            default_task: Some(DEFAULT_TASK_NAME.to_string()),
            billable_default: BillableRule::Auto,
            billable_overrides: HashMap::new(),
        }
    }
}

impl RoutingRules {
    pub fn project_name<'a>(&'a self, project_key: &'a str) -> &'a str {
        self.project_mappings
            .get(project_key)
            .map(String::as_str)
            .unwrap_or(project_key)
    }

    pub fn task_name(&self, container_type: Option<&str>) -> Option<&str> {
        container_type
            .and_then(|t| self.task_mappings.get(t))
            .or(self.default_task.as_ref())
            .map(String::as_str)
    }

    pub fn billable(&self, project_key: &str, billable_seconds: Option<i64>) -> bool {
        let rule = self
            .billable_overrides
            .get(project_key)
            .copied()
            .unwrap_or(self.billable_default);
        match rule {
            BillableRule::Auto => billable_seconds.unwrap_or(0) > 0,
            BillableRule::Always => true,
            BillableRule::Never => false,
        }
    }
}

/// Engine-facing settings for one sync run.
#[derive(Debug, Clone, PartialEq)]
pub struct SyncSettings {
    pub tolerance: DriftTolerance,
    /// Zone in which source start times are expressed.
    pub source_timezone: Tz,
    pub verify_staleness_hours: i64,
    pub routing: RoutingRules,
    pub filter: WorklogFilter,
    /// Plan and report without writing to the destination.
    pub dry_run: bool,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            tolerance: DriftTolerance::default(),
            source_timezone: Tz::UTC,
            verify_staleness_hours: DEFAULT_VERIFY_STALENESS_HOURS,
            routing: RoutingRules::default(),
            filter: WorklogFilter::default(),
            dry_run: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_billable_rules() {
        let mut rules = RoutingRules::default();
        assert!(rules.billable("AS", Some(60)));
        assert!(!rules.billable("AS", Some(0)));
        assert!(!rules.billable("AS", None));

        rules
            .billable_overrides
            .insert("OPS".to_string(), BillableRule::Never);
        rules.billable_default = BillableRule::Always;
        assert!(rules.billable("AS", None));
        assert!(!rules.billable("OPS", Some(3600)));
    }

    #[test]
    fn test_project_and_task_names() {
        let mut rules = RoutingRules::default();
        rules
            .project_mappings
            .insert("AS".to_string(), "Alpha Suite".to_string());
        rules
            .task_mappings
            .insert("Bug".to_string(), "Bugfixing".to_string());

        assert_eq!(rules.project_name("AS"), "Alpha Suite");
        assert_eq!(rules.project_name("OPS"), "OPS");
        assert_eq!(rules.task_name(Some("Bug")), Some("Bugfixing"));
        assert_eq!(rules.task_name(Some("Story")), Some(DEFAULT_TASK_NAME));

        rules.default_task = None;
        assert_eq!(rules.task_name(None), None);
    }

    #[test]
    fn test_parse_billable_rule() {
        assert_eq!("AUTO".parse::<BillableRule>().unwrap(), BillableRule::Auto);
        assert_eq!(
            "always_billable".parse::<BillableRule>().unwrap(),
            BillableRule::Always
        );
        assert!("sometimes".parse::<BillableRule>().is_err());
    }
}
