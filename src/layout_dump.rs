use crate::layout::{ClusterKind, Layout};
use crate::model::FamilyGraph;
use serde::Serialize;
use std::collections::HashMap;
use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

#[derive(Debug, Serialize)]
pub struct LayoutDump {
    pub width: f32,
    pub height: f32,
    pub converged: bool,
    pub nodes: Vec<NodeDump>,
    pub edges: Vec<EdgeDump>,
    pub clusters: Vec<ClusterDump>,
}

#[derive(Debug, Serialize)]
pub struct NodeDump {
    pub id: String,
    pub name: String,
    pub generation: i32,
    pub x: f32,
    pub y: f32,
    pub anchor_x: f32,
    pub spouse_ids: Vec<String>,
    pub cluster: usize,
}

#[derive(Debug, Serialize)]
pub struct EdgeDump {
    pub from: String,
    pub to: String,
    pub kind: &'static str,
    pub points: Vec<[f32; 2]>,
}

#[derive(Debug, Serialize)]
pub struct ClusterDump {
    pub generation: i32,
    pub index: usize,
    pub kind: ClusterKind,
    pub members: Vec<String>,
    pub children: Vec<String>,
    pub descendant_count: usize,
    pub parent_cluster: Option<usize>,
    pub width: f32,
}

impl LayoutDump {
    pub fn from_layout(layout: &Layout, graph: &FamilyGraph) -> Self {
        let nodes: Vec<NodeDump> = layout
            .nodes
            .iter()
            .map(|node| NodeDump {
                id: node.id.clone(),
                name: graph.name_of(&node.id).to_string(),
                generation: node.generation,
                x: node.x,
                y: node.y,
                anchor_x: node.anchor_x,
                spouse_ids: node.spouse_ids.clone(),
                cluster: node.cluster,
            })
            .collect();

        let placed: HashMap<&str, (f32, f32, f32)> = layout
            .nodes
            .iter()
            .map(|node| (node.id.as_str(), (node.x, node.y, node.anchor_x)))
            .collect();
        let mut edges = Vec::new();
        for node in &layout.nodes {
            let (x, y, anchor_x) = (node.x, node.y, node.anchor_x);
            for spouse in &node.spouse_ids {
                if node.id.as_str() >= spouse.as_str() {
                    continue;
                }
                if let Some((sx, sy, _)) = placed.get(spouse.as_str()) {
                    edges.push(EdgeDump {
                        from: node.id.clone(),
                        to: spouse.clone(),
                        kind: "spouse",
                        points: vec![[x, y], [*sx, *sy]],
                    });
                }
            }
            // Descent lines leave from the parents' shared anchor.
            for child in graph.children(&node.id) {
                if let Some((cx, cy, _)) = placed.get(child) {
                    let mid_y = (y + cy) / 2.0;
                    edges.push(EdgeDump {
                        from: node.id.clone(),
                        to: child.to_string(),
                        kind: "parent-child",
                        points: vec![[anchor_x, y], [anchor_x, mid_y], [*cx, mid_y], [*cx, *cy]],
                    });
                }
            }
        }

        let clusters = layout
            .clusters
            .iter()
            .flat_map(|(generation, row)| {
                row.iter().enumerate().map(move |(index, cluster)| ClusterDump {
                    generation: *generation,
                    index,
                    kind: cluster.kind,
                    members: cluster.members.clone(),
                    children: cluster.children.clone(),
                    descendant_count: cluster.descendants.len(),
                    parent_cluster: cluster.parent_cluster,
                    width: cluster.width,
                })
            })
            .collect();

        LayoutDump {
            width: layout.width,
            height: layout.height,
            converged: layout.converged,
            nodes,
            edges,
            clusters,
        }
    }
}

pub fn write_layout_dump(path: &Path, layout: &Layout, graph: &FamilyGraph) -> anyhow::Result<()> {
    let file = File::create(path)?;
    let writer = BufWriter::new(file);
    let dump = LayoutDump::from_layout(layout, graph);
    serde_json::to_writer_pretty(writer, &dump)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LayoutConfig;
    use crate::layout::compute_layout;
    use crate::parser::parse_family;

    #[test]
    fn dump_has_spouse_and_descent_edges() {
        let graph = parse_family("a + b\na, b -> c").unwrap();
        let layout = compute_layout(&graph, &LayoutConfig::default());
        let dump = LayoutDump::from_layout(&layout, &graph);
        assert_eq!(dump.nodes.len(), 3);
        assert_eq!(dump.edges.iter().filter(|e| e.kind == "spouse").count(), 1);
        assert_eq!(dump.edges.iter().filter(|e| e.kind == "parent-child").count(), 2);
        assert_eq!(dump.clusters.len(), 2);
        assert_eq!(dump.clusters[0].descendant_count, 1);

        let json = serde_json::to_value(&dump).unwrap();
        assert_eq!(json["clusters"][0]["kind"], "couple");
    }
}
