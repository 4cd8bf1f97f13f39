use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;

use super::generations::GenerationMap;
use crate::model::MemberId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ClusterKind {
    Single,
    Couple,
    /// Partners linked by shared children, possibly across several marriages.
    CoParents,
}

/// Members of one generation that are drawn as a single family unit.
#[derive(Debug, Clone, Serialize)]
pub struct FamilyCluster {
    pub kind: ClusterKind,
    pub generation: i32,
    /// Left-to-right order.
    pub members: Vec<MemberId>,
    /// Spouse groups in the same order as `members`; couples stay adjacent.
    pub spouse_groups: Vec<Vec<MemberId>>,
    pub children: Vec<MemberId>,
    pub descendants: BTreeSet<MemberId>,
    /// Index of the cluster in the generation above that placed this one.
    pub parent_cluster: Option<usize>,
    pub width: f32,
}

#[derive(Debug, Clone, Serialize)]
pub struct LayoutNode {
    pub id: MemberId,
    pub x: f32,
    pub y: f32,
    pub generation: i32,
    pub spouse_ids: Vec<MemberId>,
    /// Center of the couple or spouse group the member is drawn in.
    pub anchor_x: f32,
    pub cluster: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct Layout {
    pub nodes: Vec<LayoutNode>,
    pub generations: GenerationMap,
    pub clusters: BTreeMap<i32, Vec<FamilyCluster>>,
    pub width: f32,
    pub height: f32,
    pub converged: bool,
}

impl Layout {
    pub fn node(&self, id: &str) -> Option<&LayoutNode> {
        self.nodes.iter().find(|node| node.id == id)
    }

    pub fn row(&self, generation: i32) -> impl Iterator<Item = &LayoutNode> {
        self.nodes
            .iter()
            .filter(move |node| node.generation == generation)
    }
}
