pub mod clusters;
pub mod generations;
pub mod position;
pub mod trace;
mod types;

pub use clusters::{build_clusters, build_clusters_with};
pub use generations::{
    ConstraintViolation, GenerationAssignment, GenerationMap, assign_generations,
    assign_generations_with, constraint_violations,
};
pub use position::position_clusters;
pub use trace::{LayoutObserver, NoopObserver, Pass, RecordingObserver, TraceEvent, TracingObserver};
pub use types::*;

use crate::config::LayoutConfig;
use crate::model::FamilyGraph;

pub fn compute_layout(graph: &FamilyGraph, config: &LayoutConfig) -> Layout {
    let mut observer = TracingObserver;
    compute_layout_with(graph, config, &mut observer)
}

pub fn compute_layout_with(
    graph: &FamilyGraph,
    config: &LayoutConfig,
    observer: &mut dyn LayoutObserver,
) -> Layout {
    let assignment = assign_generations_with(graph, &config.generations, observer);

    let clusters = build_clusters_with(graph, &assignment.generations, config);
    observer.pass_finished(Pass::Clustering, clusters.values().map(Vec::len).sum());

    let nodes = position_clusters(graph, &clusters, config);
    observer.pass_finished(Pass::Positioning, nodes.len());

    let (width, height) = position::extent(&nodes, config);
    Layout {
        nodes,
        generations: assignment.generations,
        clusters,
        width,
        height,
        converged: assignment.converged,
    }
}

/// Layout with default spacing; nodes come row by row, left to right.
pub fn layout(graph: &FamilyGraph) -> Vec<LayoutNode> {
    compute_layout(graph, &LayoutConfig::default()).nodes
}
