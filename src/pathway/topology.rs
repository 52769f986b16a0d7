//! Signed, weighted pathway graphs

use std::collections::{BTreeMap, HashMap, HashSet};

use log::{debug, info, warn};
use ndarray::Array2;
use serde::{Deserialize, Serialize};

use crate::config::PathwayConfig;
use crate::error::{Result, SspaError};
use crate::io::{read_allow_list, read_topology, TopologyEdge};

/// Marker in the `to` column declaring an isolated node
pub const NO_TARGET: &str = "-";

/// Directed edge between two node indices
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Edge {
    pub from: usize,
    pub to: usize,
    /// Signed interaction strength, e.g. +1 activation, -1 inhibition
    pub weight: f64,
}

/// One pathway: nodes are Entrez gene IDs
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathwayTopology {
    pub name: String,
    pub nodes: Vec<String>,
    pub edges: Vec<Edge>,
}

impl PathwayTopology {
    pub fn n_nodes(&self) -> usize {
        self.nodes.len()
    }

    pub fn n_edges(&self) -> usize {
        self.edges.len()
    }

    /// Number of outgoing edges per node
    pub fn out_degrees(&self) -> Vec<usize> {
        let mut degrees = vec![0; self.n_nodes()];
        for e in &self.edges {
            degrees[e.from] += 1;
        }
        degrees
    }

    /// Propagation matrix `B[i][j] = w(j -> i) / outdeg(j)`
    pub fn normalized_beta(&self) -> Array2<f64> {
        let n = self.n_nodes();
        let degrees = self.out_degrees();
        let mut beta = Array2::<f64>::zeros((n, n));
        for e in &self.edges {
            beta[[e.to, e.from]] += e.weight / degrees[e.from] as f64;
        }
        beta
    }
}

/// Group edge rows into pathways, sorted by name
///
/// With an allow-list only the named pathways are kept. Repeated edges keep
/// their first weight.
pub fn build_topologies(rows: Vec<TopologyEdge>, allow_list: Option<&HashSet<String>>) -> Result<Vec<PathwayTopology>> {
    struct Builder {
        nodes: Vec<String>,
        lookup: HashMap<String, usize>,
        edges: Vec<Edge>,
        seen: HashSet<(usize, usize)>,
    }

    impl Builder {
        fn node(&mut self, id: &str) -> usize {
            if let Some(&i) = self.lookup.get(id) {
                return i;
            }
            self.nodes.push(id.to_string());
            self.lookup.insert(id.to_string(), self.nodes.len() - 1);
            self.nodes.len() - 1
        }
    }

    let mut pathways: BTreeMap<String, Builder> = BTreeMap::new();
    let mut duplicates = 0usize;

    for row in rows {
        if allow_list.is_some_and(|allow| !allow.contains(&row.pathway)) {
            continue;
        }
        if row.from.is_empty() || row.from == NO_TARGET || row.to.is_empty() {
            return Err(SspaError::InvalidTopology {
                reason: format!("Edge in '{}' lacks a source or target node", row.pathway),
            });
        }

        let builder = pathways.entry(row.pathway).or_insert_with(|| Builder {
            nodes: Vec::new(),
            lookup: HashMap::new(),
            edges: Vec::new(),
            seen: HashSet::new(),
        });
        let from = builder.node(&row.from);
        if row.to == NO_TARGET {
            continue;
        }
        let to = builder.node(&row.to);
        if builder.seen.insert((from, to)) {
            builder.edges.push(Edge {
                from,
                to,
                weight: row.weight,
            });
        } else {
            duplicates += 1;
        }
    }

    if duplicates > 0 {
        debug!("Ignored {} repeated pathway edges", duplicates);
    }

    Ok(pathways
        .into_iter()
        .map(|(name, b)| PathwayTopology {
            name,
            nodes: b.nodes,
            edges: b.edges,
        })
        .collect())
}

/// Read the configured topology file and apply the allow-list
pub fn load_topologies(config: &PathwayConfig) -> Result<Vec<PathwayTopology>> {
    let rows = read_topology(&config.topology)?;
    let allow_list = match &config.allow_list {
        Some(path) => Some(read_allow_list(path)?),
        None => None,
    };

    let topologies = build_topologies(rows, allow_list.as_ref())?;

    if let Some(allow) = &allow_list {
        let present: HashSet<&str> = topologies.iter().map(|t| t.name.as_str()).collect();
        let mut missing: Vec<&String> = allow.iter().filter(|n| !present.contains(n.as_str())).collect();
        missing.sort();
        for name in missing {
            warn!("Allow-listed pathway '{}' not found in {}", name, config.topology.display());
        }
    }

    if topologies.is_empty() {
        return Err(SspaError::InvalidTopology {
            reason: "No pathways left after applying the allow-list".to_string(),
        });
    }

    info!(
        "Loaded {} pathways ({} edges)",
        topologies.len(),
        topologies.iter().map(|t| t.n_edges()).sum::<usize>()
    );
    Ok(topologies)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn edge(pathway: &str, from: &str, to: &str, weight: f64) -> TopologyEdge {
        TopologyEdge {
            pathway: pathway.to_string(),
            from: from.to_string(),
            to: to.to_string(),
            weight,
        }
    }

    #[test]
    fn test_build_groups_and_sorts() {
        let rows = vec![
            edge("Wnt", "1", "2", 1.0),
            edge("Apoptosis", "7", "8", -1.0),
            edge("Wnt", "2", "3", 1.0),
            edge("Wnt", "9", "-", 0.0),
            edge("Wnt", "1", "2", -1.0),
        ];
        let topologies = build_topologies(rows, None).unwrap();
        assert_eq!(topologies.len(), 2);
        assert_eq!(topologies[0].name, "Apoptosis");

        let wnt = &topologies[1];
        assert_eq!(wnt.nodes, vec!["1", "2", "3", "9"]);
        assert_eq!(wnt.n_edges(), 2);
        assert_eq!(wnt.edges[0].weight, 1.0);
    }

    #[test]
    fn test_allow_list_filters() {
        let rows = vec![edge("Wnt", "1", "2", 1.0), edge("Apoptosis", "7", "8", -1.0)];
        let allow: HashSet<String> = ["Wnt".to_string()].into_iter().collect();
        let topologies = build_topologies(rows, Some(&allow)).unwrap();
        assert_eq!(topologies.len(), 1);
        assert_eq!(topologies[0].name, "Wnt");
    }

    #[test]
    fn test_normalized_beta() {
        // 1 -> 2 (+1), 1 -> 3 (-1), 2 -> 3 (+1)
        let rows = vec![
            edge("P", "1", "2", 1.0),
            edge("P", "1", "3", -1.0),
            edge("P", "2", "3", 1.0),
        ];
        let topology = build_topologies(rows, None).unwrap().remove(0);
        let beta = topology.normalized_beta();
        assert_eq!(beta[[1, 0]], 0.5);
        assert_eq!(beta[[2, 0]], -0.5);
        assert_eq!(beta[[2, 1]], 1.0);
        assert_eq!(beta[[0, 1]], 0.0);
    }

    #[test]
    fn test_missing_node_rejected() {
        let rows = vec![edge("P", "", "2", 1.0)];
        assert!(build_topologies(rows, None).is_err());
    }
}
