use std::collections::BTreeMap;

use super::types::{FamilyCluster, LayoutNode};
use crate::config::LayoutConfig;
use crate::model::FamilyGraph;

/// Places every cluster row by row. Rows are centered on x = 0 and each
/// cluster is centered inside the width reserved for it.
pub fn position_clusters(
    graph: &FamilyGraph,
    clusters: &BTreeMap<i32, Vec<FamilyCluster>>,
    config: &LayoutConfig,
) -> Vec<LayoutNode> {
    let mut nodes = Vec::new();
    for (generation, row) in clusters {
        if row.is_empty() {
            continue;
        }
        let y = *generation as f32 * config.vertical_spacing;
        let total: f32 = row.iter().map(|c| c.width).sum::<f32>()
            + (row.len() - 1) as f32 * config.family_gap;
        let mut cursor = -total / 2.0;
        for (index, cluster) in row.iter().enumerate() {
            let center = cursor + cluster.width / 2.0;
            place_cluster(graph, cluster, index, center, y, config, &mut nodes);
            cursor += cluster.width + config.family_gap;
        }
    }
    nodes
}

/// Spouse subgroups sit side by side around `center`; a couple is the
/// one-subgroup case with both cards around a shared anchor.
fn place_cluster(
    graph: &FamilyGraph,
    cluster: &FamilyCluster,
    index: usize,
    center: f32,
    y: f32,
    config: &LayoutConfig,
    out: &mut Vec<LayoutNode>,
) {
    let widths: Vec<f32> = cluster
        .spouse_groups
        .iter()
        .map(|group| config.cards_width(group.len()))
        .collect();
    let total = widths.iter().sum::<f32>()
        + widths.len().saturating_sub(1) as f32 * config.spouse_group_gap;
    let step = config.card_width + config.card_gap;

    let mut left = center - total / 2.0;
    for (group, width) in cluster.spouse_groups.iter().zip(&widths) {
        let anchor_x = left + width / 2.0;
        for (slot, id) in group.iter().enumerate() {
            out.push(LayoutNode {
                id: id.clone(),
                x: left + config.card_width / 2.0 + slot as f32 * step,
                y,
                generation: cluster.generation,
                spouse_ids: graph.spouses(id).map(str::to_string).collect(),
                anchor_x,
                cluster: index,
            });
        }
        left += width + config.spouse_group_gap;
    }
}

/// Bounding size of the placed cards.
pub(super) fn extent(nodes: &[LayoutNode], config: &LayoutConfig) -> (f32, f32) {
    if nodes.is_empty() {
        return (0.0, 0.0);
    }
    let mut min_x = f32::MAX;
    let mut max_x = f32::MIN;
    let mut min_y = f32::MAX;
    let mut max_y = f32::MIN;
    for node in nodes {
        min_x = min_x.min(node.x);
        max_x = max_x.max(node.x);
        min_y = min_y.min(node.y);
        max_y = max_y.max(node.y);
    }
    (max_x - min_x + config.card_width, max_y - min_y)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::types::ClusterKind;
    use std::collections::BTreeSet;

    fn cluster(kind: ClusterKind, groups: &[&[&str]], width: f32) -> FamilyCluster {
        let spouse_groups: Vec<Vec<String>> = groups
            .iter()
            .map(|g| g.iter().map(|m| m.to_string()).collect())
            .collect();
        FamilyCluster {
            kind,
            generation: 0,
            members: spouse_groups.iter().flatten().cloned().collect(),
            spouse_groups,
            children: Vec::new(),
            descendants: BTreeSet::new(),
            parent_cluster: None,
            width,
        }
    }

    #[test]
    fn couple_cards_flank_a_shared_anchor() {
        let graph = FamilyGraph::new();
        let config = LayoutConfig::default();
        let row = vec![cluster(ClusterKind::Couple, &[&["a", "b"]], 340.0)];
        let clusters = BTreeMap::from([(0, row)]);
        let nodes = position_clusters(&graph, &clusters, &config);
        assert_eq!(nodes[0].x, -90.0);
        assert_eq!(nodes[1].x, 90.0);
        assert_eq!(nodes[0].anchor_x, 0.0);
        assert_eq!(nodes[1].anchor_x, 0.0);
    }

    #[test]
    fn row_is_centered_on_zero() {
        let graph = FamilyGraph::new();
        let config = LayoutConfig::default();
        let row = vec![
            cluster(ClusterKind::Single, &[&["a"]], 200.0),
            cluster(ClusterKind::Single, &[&["b"]], 200.0),
        ];
        let clusters = BTreeMap::from([(0, row)]);
        let nodes = position_clusters(&graph, &clusters, &config);
        assert_eq!(nodes[0].x, -140.0);
        assert_eq!(nodes[1].x, 140.0);
        assert_eq!(nodes[1].cluster, 1);
    }

    #[test]
    fn spouse_subgroups_are_spaced_by_the_group_gap() {
        let graph = FamilyGraph::new();
        let config = LayoutConfig::default();
        let row = vec![cluster(ClusterKind::CoParents, &[&["a", "b"], &["c"]], 560.0)];
        let clusters = BTreeMap::from([(1, row)]);
        let nodes = position_clusters(&graph, &clusters, &config);
        // 340 + 60 + 160 = 560 wide, starting at -280
        assert_eq!(nodes[0].x, -200.0);
        assert_eq!(nodes[1].x, -20.0);
        assert_eq!(nodes[2].x, 200.0);
        assert_eq!(nodes[0].anchor_x, -110.0);
        assert_eq!(nodes[2].anchor_x, 200.0);
        assert!(nodes.iter().all(|n| n.y == 220.0));
    }

    #[test]
    fn extent_covers_cards() {
        let config = LayoutConfig::default();
        assert_eq!(extent(&[], &config), (0.0, 0.0));
    }
}
