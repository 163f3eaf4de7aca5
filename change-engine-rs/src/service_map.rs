//! Dependency narratives around a configuration item.
//!
//! The builder walks `cmdb_rel_ci` rows outward from a seed CI, either toward
//! parents ([`Direction::Ancestor`]) or toward children
//! ([`Direction::Descendant`]), and renders each visited node's edges as one
//! text block. Each `(CI, direction)` pair is expanded at most once, so cyclic
//! graphs terminate; depth and node-count bounds cap the remaining cost.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use log::{debug, warn};
use serde::{Deserialize, Serialize};

use itsm_client::{CmdbApi, ConfigurationItem, Endpoint, RelationshipEdge};

use crate::error::{bounded, EngineError, Result};
use crate::settings::EngineSettings;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// Toward parents
    Ancestor,
    /// Toward children
    Descendant,
}

impl Direction {
    /// Role the current node must hold on an edge for that edge to count
    fn own_role<'a>(&self, edge: &'a RelationshipEdge) -> &'a str {
        match self {
            Direction::Ancestor => &edge.child,
            Direction::Descendant => &edge.parent,
        }
    }

    /// The node the walk continues into
    fn next_node<'a>(&self, edge: &'a RelationshipEdge) -> &'a str {
        match self {
            Direction::Ancestor => &edge.parent,
            Direction::Descendant => &edge.child,
        }
    }
}

/// Ordered narrative blocks, one per expanded node
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ServiceMap {
    pub blocks: Vec<String>,
    /// A depth or node bound stopped the walk early
    #[serde(default)]
    pub truncated: bool,
}

impl ServiceMap {
    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    pub fn lines(&self) -> impl Iterator<Item = &str> {
        self.blocks
            .iter()
            .flat_map(|block| block.lines())
            .map(str::trim)
            .filter(|line| !line.is_empty())
    }

    /// Narrative as a titled text section
    pub fn explain(&self, ci_label: &str) -> String {
        let mut text = format!("Service Map For CI {}-\n", ci_label);
        for line in self.lines() {
            text.push_str(line);
            text.push('\n');
        }
        text
    }
}

/// A resolved CI and its bidirectional map
#[derive(Debug, Clone, Serialize)]
pub struct CiServiceMap {
    pub configuration_item: ConfigurationItem,
    pub service_map: ServiceMap,
}

fn describe_endpoint(end: &Endpoint<'_>, parts: &mut Vec<String>) {
    if !end.class.trim().is_empty() {
        parts.push(end.class.trim().to_string());
    }
    if !end.name.trim().is_empty() {
        parts.push(end.name.trim().to_string());
    }
    if let Some(ip) = end.ip_address {
        parts.push(format!("with IP address {}", ip.trim()));
    }
}

/// `<parent class> <parent name> [with IP address ..] <relation> <child class> <child name> [..]`
pub fn describe_edge(edge: &RelationshipEdge) -> String {
    let mut parts = Vec::new();
    describe_endpoint(&edge.parent_end(), &mut parts);
    let relation = edge.relation_label();
    if !relation.is_empty() {
        parts.push(relation.to_string());
    }
    describe_endpoint(&edge.child_end(), &mut parts);
    parts.join(" ")
}

pub struct ServiceMapBuilder {
    cmdb: Arc<dyn CmdbApi>,
    max_depth: usize,
    max_nodes: usize,
    call_timeout: Duration,
}

impl ServiceMapBuilder {
    pub fn new(cmdb: Arc<dyn CmdbApi>) -> Self {
        Self::with_settings(cmdb, &EngineSettings::default())
    }

    pub fn with_settings(cmdb: Arc<dyn CmdbApi>, settings: &EngineSettings) -> Self {
        Self {
            cmdb,
            max_depth: settings.max_depth,
            max_nodes: settings.max_nodes.max(1),
            call_timeout: settings.call_timeout,
        }
    }

    pub fn with_limits(mut self, max_depth: usize, max_nodes: usize) -> Self {
        self.max_depth = max_depth;
        self.max_nodes = max_nodes.max(1);
        self
    }

    pub async fn build_map(&self, seed_id: &str, direction: Direction) -> Result<ServiceMap> {
        self.extend_map(seed_id, direction, ServiceMap::default()).await
    }

    /// Walk from `seed_id` and append to an existing map.
    ///
    /// Nodes are expanded depth-first in the order their edges were returned.
    /// A fetch failure aborts the walk.
    pub async fn extend_map(
        &self,
        seed_id: &str,
        direction: Direction,
        mut map: ServiceMap,
    ) -> Result<ServiceMap> {
        let seed_id = seed_id.trim();
        if seed_id.is_empty() {
            return Err(EngineError::Validation("CI identifier is empty".to_string()));
        }

        let mut emitted: HashSet<String> = map.lines().map(str::to_string).collect();
        let mut visited: HashSet<(String, Direction)> = HashSet::new();
        let mut stack: Vec<(String, usize)> = vec![(seed_id.to_string(), 0)];

        while let Some((node, depth)) = stack.pop() {
            if !visited.insert((node.clone(), direction)) {
                continue;
            }
            if visited.len() > self.max_nodes {
                warn!(
                    "Service map walk from {} stopped after {} nodes",
                    seed_id, self.max_nodes
                );
                map.truncated = true;
                break;
            }

            let edges = bounded(
                self.call_timeout,
                "relationship lookup",
                self.cmdb.get_ci_relationships(&node),
            )
            .await?;

            let mut block = String::new();
            let mut targets = Vec::new();

            for edge in &edges {
                if edge.parent_end().is_blank() || edge.child_end().is_blank() {
                    continue;
                }
                if direction.own_role(edge) != node {
                    continue;
                }

                let next = direction.next_node(edge);
                if !next.is_empty() {
                    targets.push(next.to_string());
                }

                let line = describe_edge(edge);
                if !line.is_empty() && emitted.insert(line.clone()) {
                    block.push_str(&line);
                    block.push('\n');
                }
            }

            if !block.is_empty() {
                map.blocks.push(block);
            }

            targets.retain(|t| !visited.contains(&(t.clone(), direction)));
            if targets.is_empty() {
                continue;
            }
            if depth >= self.max_depth {
                debug!("Depth bound reached at {} ({:?})", node, direction);
                map.truncated = true;
                continue;
            }

            // Reverse so the first target is expanded first
            for target in targets.into_iter().rev() {
                stack.push((target, depth + 1));
            }
        }

        if map.truncated {
            warn!("Service map for {} ({:?}) is truncated", seed_id, direction);
        }
        Ok(map)
    }

    /// Ancestor walk reversed, then the descendant walk appended
    pub async fn build_bidirectional(&self, seed_id: &str) -> Result<ServiceMap> {
        let mut map = self.build_map(seed_id, Direction::Ancestor).await?;
        map.blocks.reverse();
        self.extend_map(seed_id, Direction::Descendant, map).await
    }

    /// Resolve a CI by name or IP and map its dependencies
    pub async fn analyze_ci(&self, name_or_ip: &str) -> Result<CiServiceMap> {
        let matches = bounded(
            self.call_timeout,
            "CI lookup",
            self.cmdb.find_configuration_items(name_or_ip),
        )
        .await?;

        let configuration_item = matches.into_iter().next().ok_or_else(|| {
            EngineError::NotFound(format!("No configuration item matches '{}'", name_or_ip.trim()))
        })?;

        let service_map = self.build_bidirectional(&configuration_item.sys_id).await?;
        Ok(CiServiceMap {
            configuration_item,
            service_map,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn edge(parent: &str, child: &str, relation: &str) -> RelationshipEdge {
        RelationshipEdge {
            parent: parent.to_string(),
            child: child.to_string(),
            parent_name: parent.to_string(),
            parent_class: "Application".to_string(),
            child_name: child.to_string(),
            child_class: "Linux Server".to_string(),
            type_name: relation.to_string(),
            ..RelationshipEdge::default()
        }
    }

    #[test]
    fn test_describe_edge_with_ip() {
        let mut e = edge("app1", "srv1", "Runs on::Runs");
        e.child_ip = Some("10.0.0.5".to_string());
        assert_eq!(
            describe_edge(&e),
            "Application app1 Runs on Linux Server srv1 with IP address 10.0.0.5"
        );
    }

    #[test]
    fn test_describe_edge_omits_empty_class() {
        let mut e = edge("app1", "srv1", "Depends on::Used by");
        e.parent_class.clear();
        assert_eq!(describe_edge(&e), "app1 Depends on Linux Server srv1");
    }

    #[test]
    fn test_explain_lists_lines() {
        let map = ServiceMap {
            blocks: vec!["a b\nc d\n".to_string(), "e f\n".to_string()],
            truncated: false,
        };
        assert_eq!(map.explain("web01"), "Service Map For CI web01-\na b\nc d\ne f\n");
    }
}
