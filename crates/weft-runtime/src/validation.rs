// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Reference validation over the registered resources.
//!
//! Every resource becomes a node named `"<kind>:<id>"` (tasks are
//! `"task:<workflow>/<task>"`). Workflows contribute edges to their tasks,
//! tasks to their inline agent and tool and to the tasks their transitions
//! name. The report lists edges pointing at unregistered nodes and every
//! cycle found by a depth-first walk.

use std::collections::{BTreeMap, BTreeSet, HashSet};

use serde::Serialize;
use tracing::debug;
use weft_dsl::{Project, Resource, ResourceKind, Task, Workflow};

use crate::engine::{Engine, Resources};

// ============================================================================
// Report
// ============================================================================

/// A problem (or advisory) tied to one resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationFinding {
    pub resource_type: String,
    pub resource_id: String,
    pub message: String,
}

/// A dependency edge whose target is not registered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MissingReference {
    /// Kind of the referring node.
    pub resource_type: String,
    /// Id of the referring node.
    pub resource_id: String,
    /// Unregistered target node.
    pub reference: String,
}

/// A closed dependency chain; the first node is repeated at the end.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CircularDependency {
    pub chain: Vec<String>,
}

/// Outcome of [`Engine::validate_references`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ValidationReport {
    /// No errors, no missing references and no cycles.
    pub valid: bool,
    pub errors: Vec<ValidationFinding>,
    pub warnings: Vec<ValidationFinding>,
    /// Distinct registered nodes.
    pub resource_count: usize,
    pub circular_deps: Vec<CircularDependency>,
    pub missing_refs: Vec<MissingReference>,
    /// Node to its sorted dependencies.
    pub dependency_graph: BTreeMap<String, Vec<String>>,
}

impl Engine {
    /// Check references between registered resources.
    ///
    /// Pure and read-only; callable before, during and after a run.
    pub fn validate_references(&self) -> ValidationReport {
        let report = validate(&self.resources);
        debug!(
            valid = report.valid,
            resources = report.resource_count,
            errors = report.errors.len(),
            missing = report.missing_refs.len(),
            cycles = report.circular_deps.len(),
            "Validated references"
        );
        report
    }
}

/// Validate `resources` into a report.
pub fn validate(resources: &Resources) -> ValidationReport {
    let mut graph = Graph::default();

    if let Some(project) = &resources.project {
        graph.register_project(project);
    }
    for workflow in &resources.workflows {
        graph.register_workflow(workflow);
    }
    graph.register_simple(&resources.agents);
    graph.register_simple(&resources.tools);
    graph.register_simple(&resources.knowledge_bases);
    graph.register_simple(&resources.memories);
    graph.register_simple(&resources.mcp_servers);
    graph.register_simple(&resources.schemas);
    graph.register_simple(&resources.models);
    graph.register_simple(&resources.schedules);
    graph.register_simple(&resources.webhooks);

    graph.into_report()
}

// ============================================================================
// Graph construction
// ============================================================================

#[derive(Default)]
struct Graph {
    nodes: BTreeSet<String>,
    /// Dependencies in registration order, deduplicated.
    edges: BTreeMap<String, Vec<String>>,
    errors: Vec<ValidationFinding>,
    warnings: Vec<ValidationFinding>,
}

fn finding(kind: ResourceKind, id: &str, message: impl Into<String>) -> ValidationFinding {
    ValidationFinding {
        resource_type: kind.to_string(),
        resource_id: id.to_string(),
        message: message.into(),
    }
}

fn task_node(workflow_id: &str, task_id: &str) -> String {
    ResourceKind::Task.node(&format!("{workflow_id}/{task_id}"))
}

impl Graph {
    fn add_node(&mut self, node: String) {
        self.nodes.insert(node);
    }

    fn add_edge(&mut self, from: &str, to: String) {
        let deps = self.edges.entry(from.to_string()).or_default();
        if !deps.contains(&to) {
            deps.push(to);
        }
    }

    fn register_project(&mut self, project: &Project) {
        let name = project.resource_id();
        if name.is_empty() {
            self.errors
                .push(finding(ResourceKind::Project, "", "project name is required"));
            return;
        }
        self.add_node(ResourceKind::Project.node(&name));
    }

    fn register_workflow(&mut self, workflow: &Workflow) {
        let id = workflow.resource_id();
        if id.is_empty() {
            self.errors
                .push(finding(ResourceKind::Workflow, "", "workflow id is required"));
            return;
        }
        let workflow_node = ResourceKind::Workflow.node(&id);
        self.add_node(workflow_node.clone());

        self.register_scoped(&id, &workflow.agents, "workflow agent with empty id ignored");
        self.register_scoped(&id, &workflow.tools, "workflow tool with empty id ignored");
        self.register_scoped(
            &id,
            &workflow.knowledge_bases,
            "workflow knowledge base with empty id ignored",
        );

        let mut seen = HashSet::new();
        for task in &workflow.tasks {
            let task_id = task.id.trim();
            if task_id.is_empty() {
                self.errors
                    .push(finding(ResourceKind::Workflow, &id, "task id is required"));
                continue;
            }
            if !seen.insert(task_id) {
                self.errors.push(finding(
                    ResourceKind::Workflow,
                    &id,
                    format!("duplicate task id {task_id}"),
                ));
            }
            let node = task_node(&id, task_id);
            self.add_node(node.clone());
            self.add_edge(&workflow_node, node.clone());
            self.register_task_bindings(&id, &node, task);
        }
    }

    /// Workflow-scoped resources only become nodes; they have no edges of
    /// their own.
    fn register_scoped<T: Resource>(&mut self, workflow_id: &str, items: &[T], message: &str) {
        for item in items {
            let id = item.resource_id();
            if id.is_empty() {
                self.warnings
                    .push(finding(ResourceKind::Workflow, workflow_id, message));
                continue;
            }
            self.add_node(T::KIND.node(&id));
        }
    }

    fn register_task_bindings(&mut self, workflow_id: &str, node: &str, task: &Task) {
        if let Some(agent) = &task.agent {
            let id = agent.resource_id();
            if !id.is_empty() {
                let target = ResourceKind::Agent.node(&id);
                self.add_node(target.clone());
                self.add_edge(node, target);
            }
        }
        if let Some(tool) = &task.tool {
            let id = tool.resource_id();
            if !id.is_empty() {
                let target = ResourceKind::Tool.node(&id);
                self.add_node(target.clone());
                self.add_edge(node, target);
            }
        }
        if let Some(next) = task.success_next() {
            self.add_edge(node, task_node(workflow_id, next));
        }
        if let Some(next) = task.error_next() {
            self.add_edge(node, task_node(workflow_id, next));
        }
    }

    fn register_simple<T: Resource>(&mut self, items: &[T]) {
        for item in items {
            let id = item.resource_id();
            if id.is_empty() {
                self.warnings
                    .push(finding(T::KIND, "", "resource with empty id ignored"));
                continue;
            }
            self.add_node(T::KIND.node(&id));
        }
    }

    // ========================================================================
    // Analysis
    // ========================================================================

    fn missing_references(&self) -> Vec<MissingReference> {
        let mut missing = Vec::new();
        for (from, deps) in &self.edges {
            for dep in deps {
                if self.nodes.contains(dep) {
                    continue;
                }
                let (resource_type, resource_id) = split_node(from);
                missing.push(MissingReference {
                    resource_type: resource_type.to_string(),
                    resource_id: resource_id.to_string(),
                    reference: dep.clone(),
                });
            }
        }
        missing
    }

    /// Depth-first walk with an explicit frame stack. Every edge back into
    /// the current path yields one cycle.
    fn cycles(&self) -> Vec<CircularDependency> {
        let mut cycles = Vec::new();
        let mut visited: HashSet<&str> = HashSet::new();
        let mut on_path: HashSet<&str> = HashSet::new();
        let mut path: Vec<&str> = Vec::new();
        let mut frames: Vec<(&str, usize)> = Vec::new();

        for root in self.edges.keys() {
            let root = root.as_str();
            if visited.contains(root) {
                continue;
            }
            visited.insert(root);
            on_path.insert(root);
            path.push(root);
            frames.push((root, 0));

            while let Some((node, next)) = frames.last_mut() {
                let deps = self.edges.get(*node).map(Vec::as_slice).unwrap_or(&[]);
                let Some(dep) = deps.get(*next) else {
                    on_path.remove(*node);
                    path.pop();
                    frames.pop();
                    continue;
                };
                *next += 1;

                let dep = dep.as_str();
                if !visited.contains(dep) {
                    visited.insert(dep);
                    on_path.insert(dep);
                    path.push(dep);
                    frames.push((dep, 0));
                } else if on_path.contains(dep) {
                    cycles.push(CircularDependency {
                        chain: close_cycle(&path, dep),
                    });
                }
            }
        }
        cycles
    }

    fn into_report(self) -> ValidationReport {
        let missing_refs = self.missing_references();
        let circular_deps = self.cycles();

        let dependency_graph = self
            .edges
            .into_iter()
            .map(|(node, mut deps)| {
                deps.sort();
                (node, deps)
            })
            .collect();

        let valid = self.errors.is_empty() && missing_refs.is_empty() && circular_deps.is_empty();
        ValidationReport {
            valid,
            errors: self.errors,
            warnings: self.warnings,
            resource_count: self.nodes.len(),
            circular_deps,
            missing_refs,
            dependency_graph,
        }
    }
}

/// Path from the last occurrence of `target` onwards, closed with `target`.
fn close_cycle(path: &[&str], target: &str) -> Vec<String> {
    let start = path.iter().rposition(|node| *node == target);
    let mut chain: Vec<String> = match start {
        Some(start) => path[start..].iter().map(|node| node.to_string()).collect(),
        None => Vec::new(),
    };
    chain.push(target.to_string());
    chain
}

/// `"kind:id"` into its parts; a node without `:` is all kind.
fn split_node(node: &str) -> (&str, &str) {
    node.split_once(':').unwrap_or((node, ""))
}

#[cfg(test)]
mod tests {
    use super::*;
    use weft_dsl::{Agent, ModelProvider, Schema, Tool, Webhook};

    fn resources(workflows: Vec<Workflow>) -> Resources {
        Resources {
            project: Some(Project::new("shop")),
            workflows,
            ..Default::default()
        }
    }

    #[test]
    fn test_valid_workflow() {
        let workflow = Workflow::new("checkout")
            .with_agent(Agent::new("clerk"))
            .with_task(
                Task::new("charge")
                    .with_tool(Tool::new("stripe"))
                    .on_success("receipt"),
            )
            .with_task(Task::new("receipt").with_agent(Agent::new("clerk")));

        let report = validate(&resources(vec![workflow]));

        assert!(report.valid, "{report:?}");
        assert!(report.errors.is_empty());
        assert!(report.missing_refs.is_empty());
        assert!(report.circular_deps.is_empty());
        // project, workflow, agent, two tasks, tool
        assert_eq!(report.resource_count, 6);
        assert_eq!(
            report.dependency_graph["workflow:checkout"],
            vec!["task:checkout/charge", "task:checkout/receipt"]
        );
        assert_eq!(
            report.dependency_graph["task:checkout/charge"],
            vec!["task:checkout/receipt", "tool:stripe"]
        );
    }

    #[test]
    fn test_missing_transition_target() {
        let workflow = Workflow::new("wf").with_task(Task::new("a").on_success("missing"));

        let report = validate(&resources(vec![workflow]));

        assert!(!report.valid);
        assert_eq!(
            report.missing_refs,
            vec![MissingReference {
                resource_type: "task".into(),
                resource_id: "wf/a".into(),
                reference: "task:wf/missing".into(),
            }]
        );
    }

    #[test]
    fn test_mutual_cycle() {
        let workflow = Workflow::new("wf")
            .with_task(Task::new("a").on_success("b"))
            .with_task(Task::new("b").on_error("a"));

        let report = validate(&resources(vec![workflow]));

        assert!(!report.valid);
        assert!(report.missing_refs.is_empty());
        assert_eq!(report.circular_deps.len(), 1);
        assert_eq!(
            report.circular_deps[0].chain,
            vec!["task:wf/a", "task:wf/b", "task:wf/a"]
        );
    }

    #[test]
    fn test_self_loop() {
        let workflow = Workflow::new("wf").with_task(Task::new("a").on_success("a"));

        let report = validate(&resources(vec![workflow]));

        assert_eq!(report.circular_deps[0].chain, vec!["task:wf/a", "task:wf/a"]);
    }

    #[test]
    fn test_duplicate_task_ids_per_workflow() {
        let first = Workflow::new("one")
            .with_task(Task::new("a"))
            .with_task(Task::new("a"))
            .with_task(Task::new(" a "));
        let second = Workflow::new("two").with_task(Task::new("a"));

        let report = validate(&resources(vec![first, second]));

        assert!(!report.valid);
        assert_eq!(report.errors.len(), 2);
        for error in &report.errors {
            assert_eq!(error.resource_type, "workflow");
            assert_eq!(error.resource_id, "one");
            assert_eq!(error.message, "duplicate task id a");
        }
        assert_eq!(report.dependency_graph["workflow:one"], vec!["task:one/a"]);
    }

    #[test]
    fn test_blank_ids() {
        let workflow = Workflow::new("wf")
            .with_agent(Agent::new(" "))
            .with_task(Task::new(""));
        let resources = Resources {
            project: Some(Project::new("  ")),
            workflows: vec![workflow, Workflow::new("")],
            tools: vec![Tool::new("")],
            models: vec![ModelProvider::new("", "")],
            webhooks: vec![Webhook::new("hooks")],
            schemas: vec![Schema::new("", serde_json::json!({}))],
            ..Default::default()
        };

        let report = validate(&resources);

        let errors: Vec<_> = report
            .errors
            .iter()
            .map(|e| (e.resource_type.as_str(), e.resource_id.as_str(), e.message.as_str()))
            .collect();
        assert_eq!(
            errors,
            vec![
                ("project", "", "project name is required"),
                ("workflow", "wf", "task id is required"),
                ("workflow", "", "workflow id is required"),
            ]
        );

        let warnings: Vec<_> = report
            .warnings
            .iter()
            .map(|w| (w.resource_type.as_str(), w.message.as_str()))
            .collect();
        assert_eq!(
            warnings,
            vec![
                ("workflow", "workflow agent with empty id ignored"),
                ("tool", "resource with empty id ignored"),
                ("schema", "resource with empty id ignored"),
                ("model", "resource with empty id ignored"),
            ]
        );
        // workflow:wf and webhook:hooks
        assert_eq!(report.resource_count, 2);
    }

    #[test]
    fn test_model_node_id() {
        let resources = Resources {
            models: vec![ModelProvider::new("openai", "gpt-4o")],
            ..Default::default()
        };
        let report = validate(&resources);
        assert!(report.valid);
        assert_eq!(report.resource_count, 1);
    }

    #[test]
    fn test_close_cycle() {
        assert_eq!(close_cycle(&["a", "b", "c"], "b"), vec!["b", "c", "b"]);
        assert_eq!(close_cycle(&["a"], "z"), vec!["z"]);
        assert_eq!(split_node("task:wf/a"), ("task", "wf/a"));
        assert_eq!(split_node("bare"), ("bare", ""));
    }
}
