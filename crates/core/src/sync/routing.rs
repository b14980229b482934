//! Per-run lookup table from container keys to destination projects and tasks.
//!
//! Built from a fresh `list_projects`/`list_tasks` call at the start of each
//! run and passed to the executor explicitly.

use std::collections::HashMap;

use log::debug;

use crate::entries::{DestinationProject, DestinationTask};
use crate::errors::{Result, RoutingError};
use crate::settings::RoutingRules;
use crate::worklogs::SourceWorklog;

/// Where a worklog's entry lives in the destination.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Route {
    pub project_id: String,
    pub task_id: Option<String>,
    pub billable: bool,
}

#[derive(Debug, Clone, Default)]
pub struct RoutingTable {
    /// Lower-cased project name -> project id.
    projects: HashMap<String, String>,
    /// (project id, lower-cased task name) -> task id.
    tasks: HashMap<(String, String), String>,
    rules: RoutingRules,
}

impl RoutingTable {
    pub fn build(
        projects: Vec<DestinationProject>,
        tasks: Vec<DestinationTask>,
        rules: RoutingRules,
    ) -> Self {
        let projects = projects
            .into_iter()
            .map(|p| (p.name.trim().to_lowercase(), p.id))
            .collect();
        let tasks = tasks
            .into_iter()
            .map(|t| ((t.project_id, t.name.trim().to_lowercase()), t.id))
            .collect();
        Self {
            projects,
            tasks,
            rules,
        }
    }

    pub fn project_count(&self) -> usize {
        self.projects.len()
    }

    /// Billable flag alone; needs no project lookup.
    pub fn billable(&self, worklog: &SourceWorklog) -> bool {
        self.rules
            .billable(worklog.project_key(), worklog.billable_seconds)
    }

    /// Resolves project, task and billable flag for a worklog.
    ///
    /// A missing project is an error. A missing task is not: the entry is
    /// created without one.
    pub fn resolve(&self, worklog: &SourceWorklog) -> Result<Route> {
        if worklog.container_key.trim().is_empty() {
            return Err(RoutingError::MissingContainerKey(worklog.source_id.clone()).into());
        }

        let project_key = worklog.project_key();
        let project_name = self.rules.project_name(project_key);
        let project_id = self
            .projects
            .get(&project_name.trim().to_lowercase())
            .cloned()
            .ok_or_else(|| RoutingError::ProjectNotFound {
                project_name: project_name.to_string(),
                container_key: worklog.container_key.clone(),
            })?;

        let task_id = self
            .rules
            .task_name(worklog.container_type.as_deref())
            .and_then(|task_name| {
                let found = self
                    .tasks
                    .get(&(project_id.clone(), task_name.trim().to_lowercase()))
                    .cloned();
                if found.is_none() {
                    debug!(
                        "Task '{}' not found in project '{}', creating entry without task",
                        task_name, project_name
                    );
                }
                found
            });

        Ok(Route {
            project_id,
            task_id,
            billable: self.billable(worklog),
        })
    }
}
