use std::collections::BTreeMap;
use std::path::Path;

use phylo_graph::layout::{ClusterKind, constraint_violations};
use phylo_graph::{FamilyGraph, Layout, LayoutConfig, compute_layout, load_family};

fn load_fixture(name: &str) -> FamilyGraph {
    let path = Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join(name);
    assert!(path.exists(), "fixture missing: {name}");
    load_family(&path).unwrap_or_else(|err| panic!("{name}: {err:#}"))
}

fn assert_well_formed(graph: &FamilyGraph, layout: &Layout, config: &LayoutConfig, fixture: &str) {
    assert!(layout.converged, "{fixture}: generation passes did not converge");

    let violations = constraint_violations(graph, &layout.generations);
    assert!(violations.is_empty(), "{fixture}: {violations:?}");

    let mut placed: Vec<&str> = layout.nodes.iter().map(|n| n.id.as_str()).collect();
    placed.sort_unstable();
    let expected: Vec<&str> = graph.ids().collect();
    assert_eq!(placed, expected, "{fixture}: every member is placed once");

    let mut rows: BTreeMap<i32, Vec<f32>> = BTreeMap::new();
    for node in &layout.nodes {
        assert_eq!(
            node.y,
            node.generation as f32 * config.vertical_spacing,
            "{fixture}: {} sits off its row",
            node.id
        );
        rows.entry(node.generation).or_default().push(node.x);
    }
    for (generation, mut xs) in rows {
        xs.sort_by(|a, b| a.partial_cmp(b).unwrap());
        for pair in xs.windows(2) {
            assert!(
                pair[1] - pair[0] >= config.card_width - 0.01,
                "{fixture}: cards overlap in generation {generation}"
            );
        }
        let (min, max) = (xs[0], xs[xs.len() - 1]);
        assert!(
            (min + max).abs() <= layout.width,
            "{fixture}: generation {generation} is not centered"
        );
    }
}

#[test]
fn layout_all_fixtures() {
    // Keep this list explicit so new fixtures must be added intentionally.
    let fixtures = [
        "nuclear.family",
        "three_generations.family",
        "blended.family",
        "polygamy.family",
        "in_laws.family",
        "disconnected.family",
    ];
    let config = LayoutConfig::default();
    for fixture in fixtures {
        let graph = load_fixture(fixture);
        let layout = compute_layout(&graph, &config);
        assert_well_formed(&graph, &layout, &config, fixture);
    }
}

#[test]
fn nuclear_children_are_ordered_by_age() {
    let graph = load_fixture("nuclear.family");
    let layout = compute_layout(&graph, &LayoutConfig::default());
    let joel = layout.node("jo").unwrap();
    let kim = layout.node("ki").unwrap();
    assert!(joel.x < kim.x, "older child is placed first");
    assert_eq!(layout.clusters[&0][0].kind, ClusterKind::Couple);
}

#[test]
fn three_generations_rows() {
    let graph = load_fixture("three_generations.family");
    let layout = compute_layout(&graph, &LayoutConfig::default());
    let generation = |id: &str| layout.generations[id];
    assert_eq!(generation("gp"), 0);
    assert_eq!(generation("mom"), 1);
    assert_eq!(generation("uncle"), 1);
    assert_eq!(generation("wife"), 2);
    assert_eq!(generation("cuz"), 2);
    assert_eq!(generation("baby"), 3);
}

#[test]
fn blended_family_keeps_half_siblings_together() {
    let graph = load_fixture("blended.family");
    let layout = compute_layout(&graph, &LayoutConfig::default());
    let generation = |id: &str| layout.generations[id];
    assert_eq!(generation("s1"), generation("s2"));
    assert_eq!(generation("mom1"), generation("mom2"));
    assert_eq!(generation("mom2_bro"), generation("mom2"));
    assert_eq!(generation("mp1") + 1, generation("mom2"));
    assert_eq!(generation("x"), generation("y"));

    let unit = layout.clusters[&generation("dad")]
        .iter()
        .find(|c| c.members.iter().any(|m| m == "dad"))
        .unwrap();
    assert_eq!(unit.kind, ClusterKind::CoParents);
    assert_eq!(unit.members.len(), 3);
}

#[test]
fn polygamous_member_is_centered_in_the_unit() {
    let graph = load_fixture("polygamy.family");
    let layout = compute_layout(&graph, &LayoutConfig::default());
    let unit = &layout.clusters[&0][0];
    assert_eq!(unit.members.len(), 4);
    let h = unit.members.iter().position(|m| m == "h").unwrap();
    assert!(h == 1 || h == 2, "hub sits between spouses, got {:?}", unit.members);
}

#[test]
fn married_in_family_follows_the_deeper_lineage() {
    let graph = load_fixture("in_laws.family");
    let layout = compute_layout(&graph, &LayoutConfig::default());
    let generation = |id: &str| layout.generations[id];
    assert_eq!(generation("bride"), 2);
    assert_eq!(generation("groom"), 2);
    assert_eq!(generation("q1"), 1);
    assert_eq!(generation("groom_sis"), 2);
    assert_eq!(generation("sis_husband"), 2);
    assert_eq!(generation("heir"), 3);
}

#[test]
fn loners_sit_in_the_top_row() {
    let graph = load_fixture("disconnected.family");
    let layout = compute_layout(&graph, &LayoutConfig::default());
    assert_eq!(layout.generations["loner"], 0);
    assert_eq!(layout.generations["hermit"], 0);
    assert_eq!(layout.row(0).count(), 4);
}
