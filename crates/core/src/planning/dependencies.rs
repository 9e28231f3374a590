//! # Dependency Manager
//!
//! Extracts the components a finding batch touches, relates them through a
//! static dependency table, synthesizes temporal "more urgent first" edges,
//! and detects cycles. Cycles are reported as data; nothing here decides
//! how to break them.

use std::collections::{BTreeMap, BTreeSet, HashSet};

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::types::{Finding, Priority};

/// Component vocabulary recognized in recommended actions
const ACTION_COMPONENTS: &[&str] = &[
    "ROI Calculator",
    "Policy Tracker",
    "Global Comparator",
    "AI Dashboard",
    "Database",
    "API",
];

/// Keyword map for component references in free impact text
const TEXT_KEYWORDS: &[(&str, &[&str])] = &[
    ("ROI Calculator", &["roi", "calculator", "calculation"]),
    ("Policy Tracker", &["policy", "legislation", "compliance"]),
    ("Global Comparator", &["global", "international", "comparison"]),
    ("AI Dashboard", &["dashboard", "analytics", "insights"]),
];

/// Declared dependencies of each known component
fn declared_dependencies(component: &str) -> &'static [&'static str] {
    match component {
        "ROI Calculator" => &[
            "Data Sources",
            "Calculation Engine",
            "Success Rates",
            "Cost Data",
        ],
        "Policy Tracker" => &[
            "Legislative Database",
            "Compliance Engine",
            "Notification System",
        ],
        "Global Comparator" => &["International Data", "Market Analysis", "Currency Conversion"],
        "AI Dashboard" => &[
            "ROI Calculator",
            "Policy Tracker",
            "Analytics Engine",
            "Visualization",
        ],
        _ => &[],
    }
}

/// Projection of a dependency map for visualization
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DependencyGraph {
    pub nodes: Vec<GraphNode>,
    pub edges: Vec<GraphEdge>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphNode {
    pub id: String,
    pub label: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphEdge {
    pub source: String,
    pub target: String,
}

#[derive(Debug, Default)]
pub struct DependencyManager;

impl DependencyManager {
    pub fn new() -> Self {
        Self
    }

    /// Map each referenced component to what it depends on, plus synthetic
    /// temporal nodes ordering findings by urgency.
    pub fn analyze(&self, findings: &[Finding]) -> BTreeMap<String, Vec<String>> {
        let mut dependencies = BTreeMap::new();
        let components = self.extract_components(findings);

        for component in &components {
            let mut deps: Vec<String> = declared_dependencies(component)
                .iter()
                .map(|d| d.to_string())
                .collect();
            deps.extend(self.reverse_dependents(component, &components));
            if !deps.is_empty() {
                dependencies.insert(component.clone(), deps);
            }
        }

        for (node, edges) in self.temporal_dependencies(findings) {
            dependencies.entry(node).or_default().extend(edges);
        }

        dependencies
    }

    /// Iterative depth-first cycle detection over an adjacency map.
    ///
    /// Each discovered cycle is the suffix of the traversal path starting
    /// at the revisited node. Terminates on any finite graph and reaches
    /// every unvisited root.
    pub fn detect_cycles(&self, dependencies: &BTreeMap<String, Vec<String>>) -> Vec<Vec<String>> {
        struct Frame {
            node: String,
            next_child: usize,
            entered: bool,
        }

        let mut cycles = Vec::new();
        let mut visited: HashSet<String> = HashSet::new();

        for root in dependencies.keys() {
            if visited.contains(root) {
                continue;
            }

            let mut stack = vec![Frame {
                node: root.clone(),
                next_child: 0,
                entered: false,
            }];
            let mut path: Vec<String> = Vec::new();
            let mut on_stack: HashSet<String> = HashSet::new();

            while let Some(frame) = stack.last_mut() {
                if !frame.entered {
                    frame.entered = true;
                    visited.insert(frame.node.clone());
                    on_stack.insert(frame.node.clone());
                    path.push(frame.node.clone());
                }

                let children = dependencies
                    .get(&frame.node)
                    .map(|c| c.as_slice())
                    .unwrap_or(&[]);

                if frame.next_child < children.len() {
                    let child = children[frame.next_child].clone();
                    frame.next_child += 1;
                    if !visited.contains(&child) {
                        stack.push(Frame {
                            node: child,
                            next_child: 0,
                            entered: false,
                        });
                    } else if on_stack.contains(&child) {
                        if let Some(start) = path.iter().position(|n| n == &child) {
                            cycles.push(path[start..].to_vec());
                        }
                    }
                } else {
                    on_stack.remove(&frame.node);
                    path.pop();
                    stack.pop();
                }
            }
        }

        cycles
    }

    /// Pure projection of a dependency map into nodes and edges.
    pub fn dependency_graph(&self, dependencies: &BTreeMap<String, Vec<String>>) -> DependencyGraph {
        let mut nodes = Vec::new();
        let mut edges = Vec::new();
        let mut seen = HashSet::new();

        for (key, deps) in dependencies {
            if seen.insert(key.clone()) {
                nodes.push(GraphNode {
                    id: key.clone(),
                    label: key.clone(),
                });
            }
            for dep in deps {
                if seen.insert(dep.clone()) {
                    nodes.push(GraphNode {
                        id: dep.clone(),
                        label: dep.clone(),
                    });
                }
                edges.push(GraphEdge {
                    source: dep.clone(),
                    target: key.clone(),
                });
            }
        }

        DependencyGraph { nodes, edges }
    }

    /// Component referenced by a recommended action, if any.
    pub fn component_from_action(&self, action: &str) -> Option<&'static str> {
        let lower = action.to_lowercase();
        ACTION_COMPONENTS
            .iter()
            .find(|component| lower.contains(&component.to_lowercase()))
            .copied()
    }

    /// Component referenced by free impact text, if any.
    pub fn component_from_text(&self, text: &str) -> Option<&'static str> {
        let lower = text.to_lowercase();
        for (component, keywords) in TEXT_KEYWORDS {
            if keywords.iter().any(|keyword| lower.contains(keyword)) {
                return Some(component);
            }
        }
        None
    }

    fn extract_components(&self, findings: &[Finding]) -> BTreeSet<String> {
        let mut components = BTreeSet::new();
        for finding in findings {
            for action in &finding.recommended_actions {
                if let Some(component) = self.component_from_action(action) {
                    components.insert(component.to_string());
                }
            }
            if let Some(component) = self.component_from_text(&finding.impact) {
                components.insert(component.to_string());
            }
        }
        components
    }

    fn reverse_dependents(&self, component: &str, all: &BTreeSet<String>) -> Vec<String> {
        all.iter()
            .filter(|other| {
                other.as_str() != component
                    && declared_dependencies(other).contains(&component)
            })
            .cloned()
            .collect()
    }

    /// Sort findings by urgency descending; every strictly-decreasing
    /// adjacent pair yields an edge from the less urgent finding's node to
    /// the more urgent one's.
    fn temporal_dependencies(&self, findings: &[Finding]) -> BTreeMap<String, Vec<String>> {
        let mut temporal = BTreeMap::new();

        let mut sorted: Vec<&Finding> = findings.iter().collect();
        sorted.sort_by(|a, b| {
            self.urgency(b)
                .partial_cmp(&self.urgency(a))
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        for pair in sorted.windows(2) {
            let (current, next) = (pair[0], pair[1]);
            if self.urgency(current) > self.urgency(next) {
                temporal
                    .entry(format!("finding-{}", next.id))
                    .or_insert_with(Vec::new)
                    .push(format!("finding-{}", current.id));
            }
        }

        temporal
    }

    fn urgency(&self, finding: &Finding) -> f64 {
        let mut urgency = match finding.priority {
            Priority::Critical => 10.0,
            Priority::High => 7.0,
            Priority::Medium => 4.0,
            Priority::Low => 1.0,
        };

        if let Some(effective) = finding
            .data_field("effective_date")
            .and_then(super::impact::parse_date)
        {
            let days_until = (effective - Utc::now()).num_days();
            if days_until < 30 {
                urgency += 5.0;
            } else if days_until < 90 {
                urgency += 2.0;
            }
        }

        urgency
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{new_id, Category};

    fn finding(priority: Priority, actions: &[&str], impact: &str) -> Finding {
        Finding {
            id: new_id("F"),
            source: "CDC".to_string(),
            category: Category::Scientific,
            title: "Test".to_string(),
            description: "Test".to_string(),
            key_points: vec![],
            impact: impact.to_string(),
            priority,
            confidence_score: 0.9,
            data: None,
            recommended_actions: actions.iter().map(|a| a.to_string()).collect(),
            validation_required: false,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_component_extraction_from_actions_and_text() {
        let manager = DependencyManager::new();
        assert_eq!(
            manager.component_from_action("Update ROI Calculator constants"),
            Some("ROI Calculator")
        );
        assert_eq!(manager.component_from_action("Do nothing specific"), None);
        assert_eq!(
            manager.component_from_text("new compliance requirements"),
            Some("Policy Tracker")
        );
    }

    #[test]
    fn test_analyze_includes_declared_and_reverse_dependencies() {
        let manager = DependencyManager::new();
        let batch = vec![
            finding(Priority::High, &["Update ROI Calculator"], "none"),
            finding(Priority::High, &["Refresh AI Dashboard widgets"], "none"),
        ];
        let dependencies = manager.analyze(&batch);

        let roi = dependencies.get("ROI Calculator").expect("roi entry");
        assert!(roi.contains(&"Calculation Engine".to_string()));
        // AI Dashboard declares ROI Calculator, so it shows up as a
        // reverse dependent too.
        assert!(roi.contains(&"AI Dashboard".to_string()));
    }

    #[test]
    fn test_temporal_edges_order_by_urgency() {
        let manager = DependencyManager::new();
        let urgent = finding(Priority::Critical, &["Update ROI Calculator"], "none");
        let relaxed = finding(Priority::Low, &["Update API docs"], "none");
        let urgent_id = urgent.id.clone();
        let relaxed_id = relaxed.id.clone();

        let dependencies = manager.analyze(&[urgent, relaxed]);
        let node = format!("finding-{}", relaxed_id);
        let edges = dependencies.get(&node).expect("temporal node");
        assert_eq!(edges, &vec![format!("finding-{}", urgent_id)]);
    }

    #[test]
    fn test_acyclic_graph_has_no_cycles() {
        let manager = DependencyManager::new();
        let mut dependencies = BTreeMap::new();
        dependencies.insert("A".to_string(), vec!["B".to_string()]);
        dependencies.insert("B".to_string(), vec!["C".to_string()]);
        assert!(manager.detect_cycles(&dependencies).is_empty());
    }

    #[test]
    fn test_triangle_yields_one_cycle() {
        let manager = DependencyManager::new();
        let mut dependencies = BTreeMap::new();
        dependencies.insert("A".to_string(), vec!["B".to_string()]);
        dependencies.insert("B".to_string(), vec!["C".to_string()]);
        dependencies.insert("C".to_string(), vec!["A".to_string()]);

        let cycles = manager.detect_cycles(&dependencies);
        assert_eq!(cycles.len(), 1);
        let cycle: HashSet<String> = cycles[0].iter().cloned().collect();
        assert_eq!(cycle.len(), 3);
        for node in ["A", "B", "C"] {
            assert!(cycle.contains(node));
        }
    }

    #[test]
    fn test_self_loop_is_a_cycle() {
        let manager = DependencyManager::new();
        let mut dependencies = BTreeMap::new();
        dependencies.insert("A".to_string(), vec!["A".to_string()]);
        let cycles = manager.detect_cycles(&dependencies);
        assert_eq!(cycles, vec![vec!["A".to_string()]]);
    }

    #[test]
    fn test_graph_projection_keeps_nodes_unique() {
        let manager = DependencyManager::new();
        let mut dependencies = BTreeMap::new();
        dependencies.insert("A".to_string(), vec!["B".to_string(), "C".to_string()]);
        dependencies.insert("B".to_string(), vec!["C".to_string()]);

        let graph = manager.dependency_graph(&dependencies);
        assert_eq!(graph.nodes.len(), 3);
        assert_eq!(graph.edges.len(), 3);
        assert!(graph
            .edges
            .iter()
            .any(|e| e.source == "B" && e.target == "A"));
    }
}
