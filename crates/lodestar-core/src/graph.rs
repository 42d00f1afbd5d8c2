//! Dependency graph resolution for batch items.
//!
//! An edge `A → B` means "B depends on A" — A must succeed before B may run.
//! The graph is built once per batch from the flat item list; building
//! performs all batch-fatal validation (duplicate ids, unknown references,
//! self-dependencies, cycles, ambiguous targets) so that a constructed graph
//! is always safe to schedule from.
//!
//! Topological ordering is computed via Kahn's algorithm with a sorted
//! tie-break, so sequential runs are deterministic for a given input.

use std::collections::{HashMap, HashSet, VecDeque};

use crate::error::{SchedulerError, SchedulerResult};
use crate::item::BatchDeploymentItem;
use crate::report::ItemStatus;

/// Validated dependency graph over one batch's items.
#[derive(Debug, Clone)]
pub struct DependencyGraph {
    /// `item_id → ids it depends on` (upstream adjacency).
    upstream: HashMap<String, Vec<String>>,
    /// `item_id → ids depending on it` (downstream adjacency).
    downstream: HashMap<String, HashSet<String>>,
    /// Item ids in input order.
    order: Vec<String>,
}

impl DependencyGraph {
    /// Build and validate the graph for `items`.
    ///
    /// Returns the first batch-fatal problem found: a duplicate id, a
    /// dependency on an unknown id, a self-dependency, an item with an
    /// ambiguous or missing deploy target, or a dependency cycle.
    /// Validation is a pure function of the input — calling it twice on the
    /// same list yields the same verdict.
    pub fn build(items: &[BatchDeploymentItem]) -> SchedulerResult<Self> {
        let mut upstream: HashMap<String, Vec<String>> = HashMap::new();
        let mut downstream: HashMap<String, HashSet<String>> = HashMap::new();
        let mut order = Vec::with_capacity(items.len());

        for item in items {
            if upstream.contains_key(&item.id) {
                return Err(SchedulerError::DuplicateItemId {
                    id: item.id.clone(),
                });
            }
            // Exactly-one-target rule, checked before anything runs.
            item.target()?;
            upstream.insert(item.id.clone(), item.depends_on.clone());
            downstream.entry(item.id.clone()).or_default();
            order.push(item.id.clone());
        }

        for item in items {
            for dep in &item.depends_on {
                if dep == &item.id {
                    return Err(SchedulerError::SelfDependency {
                        item: item.id.clone(),
                    });
                }
                if !upstream.contains_key(dep) {
                    return Err(SchedulerError::UnknownDependency {
                        item: item.id.clone(),
                        dependency: dep.clone(),
                    });
                }
                downstream
                    .entry(dep.clone())
                    .or_default()
                    .insert(item.id.clone());
            }
        }

        let graph = Self {
            upstream,
            downstream,
            order,
        };
        graph.check_acyclic()?;
        Ok(graph)
    }

    /// Direct dependencies of `item_id`.
    pub fn dependencies_of(&self, item_id: &str) -> &[String] {
        self.upstream
            .get(item_id)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// An item is ready when every dependency has terminated successfully.
    pub fn is_ready<F>(&self, item_id: &str, status_of: F) -> bool
    where
        F: Fn(&str) -> ItemStatus,
    {
        self.dependencies_of(item_id)
            .iter()
            .all(|dep| status_of(dep) == ItemStatus::Succeeded)
    }

    /// First dependency whose terminal status permanently blocks `item_id`
    /// (failed, cancelled, or skipped), if any. A blocked item must be
    /// finalized as skipped — it can never become ready.
    pub fn blocking_dependency<F>(&self, item_id: &str, status_of: F) -> Option<&str>
    where
        F: Fn(&str) -> ItemStatus,
    {
        self.dependencies_of(item_id)
            .iter()
            .find(|dep| status_of(dep).blocks_dependents())
            .map(String::as_str)
    }

    /// Item ids in topological order (dependencies before dependents).
    ///
    /// Kahn's algorithm; ties broken by sorted id so the order is stable.
    pub fn topological_order(&self) -> Vec<String> {
        let mut in_degree: HashMap<&str, usize> = self
            .order
            .iter()
            .map(|id| (id.as_str(), self.dependencies_of(id).len()))
            .collect();

        let mut roots: Vec<&str> = in_degree
            .iter()
            .filter(|(_, &deg)| deg == 0)
            .map(|(&id, _)| id)
            .collect();
        roots.sort_unstable();
        let mut queue: VecDeque<&str> = roots.into_iter().collect();

        let mut sorted = Vec::with_capacity(self.order.len());
        while let Some(id) = queue.pop_front() {
            sorted.push(id.to_string());
            if let Some(dependents) = self.downstream.get(id) {
                let mut next: Vec<&str> = Vec::new();
                for dep in dependents {
                    let deg = in_degree.get_mut(dep.as_str()).expect("known node");
                    *deg -= 1;
                    if *deg == 0 {
                        next.push(dep.as_str());
                    }
                }
                next.sort_unstable();
                queue.extend(next);
            }
        }

        // `build` rejected cycles, so every node is emitted.
        debug_assert_eq!(sorted.len(), self.order.len());
        sorted
    }

    /// All transitive dependents of `item_id` (BFS over downstream edges).
    pub fn transitive_dependents(&self, item_id: &str) -> Vec<String> {
        let mut visited = HashSet::new();
        let mut queue = VecDeque::new();
        queue.push_back(item_id.to_string());

        while let Some(current) = queue.pop_front() {
            if let Some(deps) = self.downstream.get(&current) {
                for dep in deps {
                    if visited.insert(dep.clone()) {
                        queue.push_back(dep.clone());
                    }
                }
            }
        }

        visited.into_iter().collect()
    }

    /// DFS cycle check with a three-color marker: `visited` holds finished
    /// (black) nodes, `path` holds the active recursion stack (gray). Any
    /// edge back into the active path signals a cycle.
    fn check_acyclic(&self) -> SchedulerResult<()> {
        let mut visited: HashSet<&str> = HashSet::new();
        for id in &self.order {
            if !visited.contains(id.as_str()) {
                let mut path = Vec::new();
                self.dfs_cycle(id, &mut visited, &mut path)?;
            }
        }
        Ok(())
    }

    fn dfs_cycle<'a>(
        &'a self,
        node: &'a str,
        visited: &mut HashSet<&'a str>,
        path: &mut Vec<&'a str>,
    ) -> SchedulerResult<()> {
        if let Some(pos) = path.iter().position(|&p| p == node) {
            let mut cycle: Vec<String> = path[pos..].iter().map(|s| s.to_string()).collect();
            cycle.push(node.to_string());
            return Err(SchedulerError::DependencyCycle { items: cycle });
        }
        if visited.contains(node) {
            return Ok(());
        }
        path.push(node);
        for dep in self.dependencies_of(node) {
            self.dfs_cycle(dep, visited, path)?;
        }
        path.pop();
        visited.insert(node);
        Ok(())
    }
}
