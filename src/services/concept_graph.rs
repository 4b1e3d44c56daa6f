//! Concept dependency graph with per-node mastery.
//!
//! Nodes live in an arena indexed by position; prerequisite edges are
//! stored as indices into the same arena. The graph is built once per
//! diagnostic pass and replaced wholesale on re-diagnosis; only mastery
//! mutates in place.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::collaborators::{ConceptQuery, Objective};
use crate::services::ability::{sigmoid, AbilityState};

const TARGET_CONCEPTS: usize = 18;
const MAX_CONCEPTS: usize = 25;
const DEPTH_MASTERY_STEP: f64 = 0.05;
pub const FRONTIER_LOW: f64 = 0.3;
pub const FRONTIER_HIGH: f64 = 0.7;

/// Depth labels reused across objective clusters.
const LEVEL_NAMES: [&str; 7] = [
    "fundamentals",
    "core workflows",
    "configuration",
    "integration",
    "advanced scenarios",
    "troubleshooting",
    "optimization",
];

#[derive(Debug, Error, PartialEq)]
pub enum GraphError {
    #[error("no objectives to build a graph from")]
    EmptyObjectives,
    #[error("prerequisite edges form a cycle")]
    CyclicDependency,
    #[error("unknown concept {0}")]
    UnknownConcept(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Concept {
    pub id: String,
    pub name: String,
    pub objective_id: String,
    /// Arena indices of prerequisite concepts. Fixed after build.
    pub prerequisites: Vec<usize>,
    pub mastery: f64,
    pub last_reviewed: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConceptGraph {
    nodes: Vec<Concept>,
    #[serde(skip)]
    index: HashMap<String, usize>,
}

impl ConceptGraph {
    /// Builds a 15-25 node graph: one prerequisite chain per objective,
    /// consecutive chains bridged root-to-root so the graph is connected.
    /// Initial mastery starts from per-objective accuracy when the
    /// diagnostic covered the objective, otherwise from the logistic of
    /// theta, and decays with chain depth.
    pub fn build(
        objectives: &[Objective],
        ability: &AbilityState,
        objective_accuracy: &HashMap<String, f64>,
    ) -> Result<Self, GraphError> {
        if objectives.is_empty() {
            return Err(GraphError::EmptyObjectives);
        }

        let per_cluster = TARGET_CONCEPTS.div_ceil(objectives.len());
        let baseline = sigmoid(ability.theta);

        let mut nodes = Vec::new();
        let mut cluster_roots: Vec<usize> = Vec::new();

        'outer: for objective in objectives {
            let base = objective_accuracy
                .get(&objective.id)
                .copied()
                .unwrap_or(baseline);

            for depth in 0..per_cluster {
                if nodes.len() >= MAX_CONCEPTS {
                    break 'outer;
                }
                let idx = nodes.len();
                let mut prerequisites = Vec::new();
                if depth > 0 {
                    prerequisites.push(idx - 1);
                } else if let Some(&prev_root) = cluster_roots.last() {
                    prerequisites.push(prev_root);
                }
                if depth == 0 {
                    cluster_roots.push(idx);
                }

                let level = LEVEL_NAMES[depth % LEVEL_NAMES.len()];
                nodes.push(Concept {
                    id: format!("{}-c{:02}", objective.id, depth + 1),
                    name: format!("{}: {}", objective.name, level),
                    objective_id: objective.id.clone(),
                    prerequisites,
                    mastery: (base - depth as f64 * DEPTH_MASTERY_STEP).clamp(0.0, 1.0),
                    last_reviewed: None,
                });
            }
        }

        let graph = Self::from_nodes(nodes)?;
        debug!(concepts = graph.len(), "concept graph built");
        Ok(graph)
    }

    /// Assembles a graph from explicit nodes, validating edge targets and
    /// acyclicity.
    pub fn from_nodes(nodes: Vec<Concept>) -> Result<Self, GraphError> {
        for node in &nodes {
            for &prereq in &node.prerequisites {
                if prereq >= nodes.len() {
                    return Err(GraphError::UnknownConcept(format!("#{prereq}")));
                }
            }
        }

        let index = nodes
            .iter()
            .enumerate()
            .map(|(i, n)| (n.id.clone(), i))
            .collect();
        let graph = Self { nodes, index };
        if !graph.validate_acyclic() {
            return Err(GraphError::CyclicDependency);
        }
        Ok(graph)
    }

    /// Kahn's algorithm: the graph is acyclic iff every node can be
    /// removed in dependency order.
    pub fn validate_acyclic(&self) -> bool {
        self.topological_order().len() == self.nodes.len()
    }

    /// Prerequisite-first ordering over all concept ids, lowest index
    /// first among ties so the order is deterministic. Shorter than the
    /// node count when a cycle blocks removal.
    pub fn topological_order(&self) -> Vec<String> {
        let mut indegree = vec![0usize; self.nodes.len()];
        for (i, node) in self.nodes.iter().enumerate() {
            indegree[i] = node.prerequisites.len();
        }

        let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); self.nodes.len()];
        for (i, node) in self.nodes.iter().enumerate() {
            for &prereq in &node.prerequisites {
                dependents[prereq].push(i);
            }
        }

        let mut queue: BinaryHeap<Reverse<usize>> = indegree
            .iter()
            .enumerate()
            .filter(|(_, &d)| d == 0)
            .map(|(i, _)| Reverse(i))
            .collect();
        let mut order = Vec::with_capacity(self.nodes.len());
        while let Some(Reverse(i)) = queue.pop() {
            order.push(self.nodes[i].id.clone());
            for &dep in &dependents[i] {
                indegree[dep] -= 1;
                if indegree[dep] == 0 {
                    queue.push(Reverse(dep));
                }
            }
        }
        order
    }

    pub fn set_mastery(&mut self, concept_id: &str, value: f64) -> Result<(), GraphError> {
        let idx = self
            .index
            .get(concept_id)
            .copied()
            .ok_or_else(|| GraphError::UnknownConcept(concept_id.to_string()))?;
        self.nodes[idx].mastery = value.clamp(0.0, 1.0);
        Ok(())
    }

    pub fn adjust_mastery(&mut self, concept_id: &str, delta: f64) -> Result<(), GraphError> {
        let current = self.mastery(concept_id)?;
        self.set_mastery(concept_id, current + delta)
    }

    pub fn mark_reviewed(&mut self, concept_id: &str, at: DateTime<Utc>) -> Result<(), GraphError> {
        let idx = self
            .index
            .get(concept_id)
            .copied()
            .ok_or_else(|| GraphError::UnknownConcept(concept_id.to_string()))?;
        self.nodes[idx].last_reviewed = Some(at);
        Ok(())
    }

    pub fn mastery(&self, concept_id: &str) -> Result<f64, GraphError> {
        self.index
            .get(concept_id)
            .map(|&i| self.nodes[i].mastery)
            .ok_or_else(|| GraphError::UnknownConcept(concept_id.to_string()))
    }

    /// Concepts below the mastery threshold, weakest first. Catches
    /// material the frontier skips because it sits under the zone.
    pub fn weak_areas(&self, threshold: f64) -> Vec<String> {
        let mut weak: Vec<(f64, String)> = self
            .nodes
            .iter()
            .filter(|n| n.mastery < threshold)
            .map(|n| (n.mastery, n.id.clone()))
            .collect();
        weak.sort_by(|a, b| a.0.total_cmp(&b.0).then_with(|| a.1.cmp(&b.1)));
        weak.into_iter().map(|(_, id)| id).collect()
    }

    /// Concepts in the zone of proximal development, ascending by id.
    pub fn frontier(&self) -> Vec<String> {
        let mut ids: Vec<String> = self
            .nodes
            .iter()
            .filter(|n| n.mastery >= FRONTIER_LOW && n.mastery <= FRONTIER_HIGH)
            .map(|n| n.id.clone())
            .collect();
        ids.sort();
        ids
    }

    pub fn concepts(&self) -> &[Concept] {
        &self.nodes
    }

    pub fn get(&self, concept_id: &str) -> Option<&Concept> {
        self.index.get(concept_id).map(|&i| &self.nodes[i])
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn average_mastery(&self) -> f64 {
        if self.nodes.is_empty() {
            return 0.0;
        }
        self.nodes.iter().map(|n| n.mastery).sum::<f64>() / self.nodes.len() as f64
    }

    pub fn concept_queries(&self) -> Vec<ConceptQuery> {
        self.nodes
            .iter()
            .map(|n| ConceptQuery { id: n.id.clone(), name: n.name.clone() })
            .collect()
    }

    /// Rebuilds the id index after deserialization.
    pub fn reindex(&mut self) {
        self.index = self
            .nodes
            .iter()
            .enumerate()
            .map(|(i, n)| (n.id.clone(), i))
            .collect();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::Objective;

    fn objectives(n: usize) -> Vec<Objective> {
        (0..n)
            .map(|i| Objective {
                id: format!("obj-{}", i + 1),
                name: format!("Area {}", i + 1),
                description: String::new(),
                weight_percent: 100.0 / n as f64,
            })
            .collect()
    }

    #[test]
    fn test_build_node_count_in_range() {
        for n in 1..=10 {
            let graph =
                ConceptGraph::build(&objectives(n), &AbilityState::new(), &HashMap::new()).unwrap();
            assert!(
                (15..=25).contains(&graph.len()),
                "{} objectives gave {} concepts",
                n,
                graph.len()
            );
            assert!(graph.validate_acyclic());
        }
    }

    #[test]
    fn test_build_rejects_empty_objectives() {
        let err = ConceptGraph::build(&[], &AbilityState::new(), &HashMap::new()).unwrap_err();
        assert_eq!(err, GraphError::EmptyObjectives);
    }

    #[test]
    fn test_cycle_rejected() {
        let nodes = vec![
            Concept {
                id: "a".into(),
                name: "a".into(),
                objective_id: "o".into(),
                prerequisites: vec![1],
                mastery: 0.5,
                last_reviewed: None,
            },
            Concept {
                id: "b".into(),
                name: "b".into(),
                objective_id: "o".into(),
                prerequisites: vec![0],
                mastery: 0.5,
                last_reviewed: None,
            },
        ];
        assert_eq!(ConceptGraph::from_nodes(nodes).unwrap_err(), GraphError::CyclicDependency);
    }

    #[test]
    fn test_frontier_inclusive_bounds_and_order() {
        let mut graph =
            ConceptGraph::build(&objectives(4), &AbilityState::new(), &HashMap::new()).unwrap();
        let ids: Vec<String> = graph.concepts().iter().map(|c| c.id.clone()).collect();
        for id in &ids {
            graph.set_mastery(id, 0.9).unwrap();
        }
        graph.set_mastery(&ids[3], 0.3).unwrap();
        graph.set_mastery(&ids[1], 0.7).unwrap();
        graph.set_mastery(&ids[2], 0.5).unwrap();
        graph.set_mastery(&ids[0], 0.29).unwrap();

        let mut expected = vec![ids[1].clone(), ids[2].clone(), ids[3].clone()];
        expected.sort();
        assert_eq!(graph.frontier(), expected);
    }

    #[test]
    fn test_topological_order_respects_prerequisites() {
        let graph =
            ConceptGraph::build(&objectives(3), &AbilityState::new(), &HashMap::new()).unwrap();
        let order = graph.topological_order();
        assert_eq!(order.len(), graph.len());
        let position: HashMap<&str, usize> =
            order.iter().enumerate().map(|(i, id)| (id.as_str(), i)).collect();
        for concept in graph.concepts() {
            for &prereq in &concept.prerequisites {
                let prereq_id = graph.concepts()[prereq].id.as_str();
                assert!(position[prereq_id] < position[concept.id.as_str()]);
            }
        }
    }

    #[test]
    fn test_weak_areas_sorted_weakest_first() {
        let mut graph =
            ConceptGraph::build(&objectives(3), &AbilityState::new(), &HashMap::new()).unwrap();
        let ids: Vec<String> = graph.concepts().iter().map(|c| c.id.clone()).collect();
        for id in &ids {
            graph.set_mastery(id, 0.8).unwrap();
        }
        graph.set_mastery(&ids[0], 0.2).unwrap();
        graph.set_mastery(&ids[1], 0.1).unwrap();
        assert_eq!(graph.weak_areas(0.3), vec![ids[1].clone(), ids[0].clone()]);
        assert!(graph.weak_areas(0.05).is_empty());
    }

    #[test]
    fn test_set_mastery_clamps_and_checks_id() {
        let mut graph =
            ConceptGraph::build(&objectives(3), &AbilityState::new(), &HashMap::new()).unwrap();
        let id = graph.concepts()[0].id.clone();
        graph.set_mastery(&id, 1.7).unwrap();
        assert!((graph.mastery(&id).unwrap() - 1.0).abs() < 1e-9);
        assert!(matches!(
            graph.set_mastery("ghost", 0.5),
            Err(GraphError::UnknownConcept(_))
        ));
    }

    #[test]
    fn test_mastery_seeded_from_objective_accuracy() {
        let objs = objectives(2);
        let mut accuracy = HashMap::new();
        accuracy.insert("obj-1".to_string(), 0.9);
        accuracy.insert("obj-2".to_string(), 0.1);
        let graph = ConceptGraph::build(&objs, &AbilityState::new(), &accuracy).unwrap();
        let strong = graph.mastery("obj-1-c01").unwrap();
        let weak = graph.mastery("obj-2-c01").unwrap();
        assert!(strong > weak);
    }
}
