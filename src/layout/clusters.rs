use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet, VecDeque};

use super::generations::GenerationMap;
use super::types::{ClusterKind, FamilyCluster};
use crate::config::LayoutConfig;
use crate::model::{FamilyGraph, Member};

/// Cluster under construction; ids borrow from the graph.
#[derive(Debug, Clone)]
struct Unit<'g> {
    kind: ClusterKind,
    groups: Vec<Vec<&'g str>>,
    children: Vec<&'g str>,
    parent: Option<usize>,
}

impl<'g> Unit<'g> {
    fn members(&self) -> impl Iterator<Item = &'g str> + '_ {
        self.groups.iter().flatten().copied()
    }
}

/// Oldest first when both dates are known, dated before undated, then name.
pub(super) fn age_order(graph: &FamilyGraph, a: &str, b: &str) -> Ordering {
    let key = |id: &str| graph.get(id).and_then(Member::birth_key);
    let by_birth = match (key(a), key(b)) {
        (Some(x), Some(y)) => x.cmp(&y),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    };
    by_birth
        .then_with(|| graph.name_of(a).cmp(graph.name_of(b)))
        .then_with(|| a.cmp(b))
}

fn median_parent_position(graph: &FamilyGraph, child: &str, positions: &HashMap<&str, usize>) -> f32 {
    let mut values: Vec<f32> = graph
        .parents(child)
        .filter_map(|parent| positions.get(parent).map(|pos| *pos as f32))
        .collect();
    if values.is_empty() {
        return 0.0;
    }
    values.sort_by(|a, b| a.partial_cmp(b).unwrap_or(Ordering::Equal));
    let mid = values.len() / 2;
    if values.len() % 2 == 1 {
        values[mid]
    } else {
        (values[mid - 1] + values[mid]) * 0.5
    }
}

fn shared_children(graph: &FamilyGraph, a: &str, b: &str) -> usize {
    graph.children(a).filter(|child| graph.has_parent(child, b)).count()
}

struct Grouper<'g, 'l> {
    graph: &'g FamilyGraph,
    level: &'l HashMap<&'g str, i32>,
    generation: i32,
}

impl<'g> Grouper<'g, '_> {
    fn in_row(&self, id: &str) -> bool {
        self.level.get(id) == Some(&self.generation)
    }

    /// Unassigned spouses reachable from `start` inside this row, `start` first.
    fn spouse_component(&self, start: &'g str, assigned: &HashSet<&'g str>) -> Vec<&'g str> {
        if assigned.contains(start) {
            return Vec::new();
        }
        let mut seen: HashSet<&'g str> = HashSet::from([start]);
        let mut out = vec![start];
        let mut queue = VecDeque::from([start]);
        while let Some(current) = queue.pop_front() {
            for spouse in self.graph.spouses(current) {
                if self.in_row(spouse) && !assigned.contains(spouse) && seen.insert(spouse) {
                    out.push(spouse);
                    queue.push_back(spouse);
                }
            }
        }
        out
    }

    /// Splits `seeds` (plus married-in partners and co-parents from this row)
    /// into family units. Groups keep the order of their earliest seed.
    fn group(&self, seeds: &[&'g str], assigned: &mut HashSet<&'g str>) -> Vec<Vec<&'g str>> {
        let graph = self.graph;
        let mut groups: Vec<Vec<&'g str>> = Vec::new();
        let mut group_of: HashMap<&'g str, usize> = HashMap::new();

        for &seed in seeds {
            let component = self.spouse_component(seed, assigned);
            if component.len() < 2 {
                continue;
            }
            let index = groups.len();
            for &member in &component {
                assigned.insert(member);
                group_of.insert(member, index);
            }
            groups.push(component);
        }

        let mut queue: VecDeque<&'g str> = seeds
            .iter()
            .copied()
            .filter(|seed| group_of.contains_key(seed) || !assigned.contains(seed))
            .collect();
        let mut visited: HashSet<&'g str> = HashSet::new();
        while let Some(member) = queue.pop_front() {
            if !visited.insert(member) {
                continue;
            }
            for child in graph.children(member) {
                let partners: Vec<&'g str> =
                    graph.parents(child).filter(|p| self.in_row(p)).collect();
                if partners.len() < 2 {
                    continue;
                }
                let mut existing: Vec<usize> = partners
                    .iter()
                    .filter_map(|p| group_of.get(p).copied())
                    .collect();
                existing.sort_unstable();
                existing.dedup();
                let fresh: Vec<&'g str> = partners
                    .iter()
                    .copied()
                    .filter(|p| !assigned.contains(p))
                    .collect();
                let target = match existing.first() {
                    Some(&index) => index,
                    None if fresh.len() >= 2 => {
                        groups.push(Vec::new());
                        groups.len() - 1
                    }
                    None => continue,
                };
                for &other in existing.iter().skip(1) {
                    let moved = std::mem::take(&mut groups[other]);
                    for &m in &moved {
                        group_of.insert(m, target);
                    }
                    groups[target].extend(moved);
                }
                for partner in fresh {
                    for m in self.spouse_component(partner, assigned) {
                        assigned.insert(m);
                        group_of.insert(m, target);
                        groups[target].push(m);
                        queue.push_back(m);
                    }
                }
            }
        }

        for &seed in seeds {
            if assigned.insert(seed) {
                groups.push(vec![seed]);
            }
        }

        let rank: HashMap<&str, usize> = seeds.iter().enumerate().map(|(i, s)| (*s, i)).collect();
        let first_seed = |group: &Vec<&'g str>| {
            group
                .iter()
                .filter_map(|m| rank.get(m).copied())
                .min()
                .unwrap_or(usize::MAX)
        };
        groups.retain(|group| !group.is_empty());
        groups.sort_by_key(first_seed);
        groups
    }

    /// Orders one family unit left to right: spouse subgroups chained by the
    /// children they share, the best-connected subgroup in the middle.
    fn arrange(&self, members: Vec<&'g str>) -> (ClusterKind, Vec<Vec<&'g str>>) {
        let graph = self.graph;
        if members.len() == 1 {
            return (ClusterKind::Single, vec![members]);
        }
        let inside: HashSet<&'g str> = members.iter().copied().collect();
        let mut placed: HashSet<&'g str> = HashSet::new();
        let mut subgroups: Vec<Vec<&'g str>> = Vec::new();
        for &member in &members {
            if !placed.insert(member) {
                continue;
            }
            let mut subgroup = vec![member];
            let mut queue = VecDeque::from([member]);
            while let Some(current) = queue.pop_front() {
                for spouse in graph.spouses(current) {
                    if inside.contains(spouse) && placed.insert(spouse) {
                        subgroup.push(spouse);
                        queue.push_back(spouse);
                    }
                }
            }
            subgroups.push(center_hub(graph, subgroup));
        }

        if subgroups.len() == 1 && members.len() == 2 {
            return (ClusterKind::Couple, subgroups);
        }
        if subgroups.len() == 1 {
            return (ClusterKind::CoParents, subgroups);
        }

        let count = subgroups.len();
        let mut links = vec![vec![0usize; count]; count];
        for i in 0..count {
            for j in (i + 1)..count {
                let shared: usize = subgroups[i]
                    .iter()
                    .flat_map(|a| subgroups[j].iter().map(move |b| (*a, *b)))
                    .map(|(a, b)| shared_children(graph, a, b))
                    .sum();
                links[i][j] = shared;
                links[j][i] = shared;
            }
        }
        let total = |i: usize| links[i].iter().sum::<usize>();
        let hub = (0..count)
            .max_by(|a, b| total(*a).cmp(&total(*b)).then_with(|| b.cmp(a)))
            .unwrap_or(0);

        let mut visit_order = vec![hub];
        let mut seen = vec![false; count];
        seen[hub] = true;
        let mut cursor = 0;
        while visit_order.len() < count {
            if cursor < visit_order.len() {
                let from = visit_order[cursor];
                cursor += 1;
                let mut next: Vec<usize> = (0..count)
                    .filter(|j| !seen[*j] && links[from][*j] > 0)
                    .collect();
                next.sort_by(|a, b| links[from][*b].cmp(&links[from][*a]).then_with(|| a.cmp(b)));
                for j in next {
                    seen[j] = true;
                    visit_order.push(j);
                }
            } else if let Some(j) = (0..count).find(|j| !seen[*j]) {
                seen[j] = true;
                visit_order.push(j);
            }
        }

        let mut row: VecDeque<usize> = VecDeque::new();
        for (step, index) in visit_order.into_iter().enumerate() {
            if step % 2 == 1 || step == 0 {
                row.push_back(index);
            } else {
                row.push_front(index);
            }
        }
        let row: Vec<usize> = row.into_iter().collect();

        let mut ordered = Vec::with_capacity(count);
        for (position, &index) in row.iter().enumerate() {
            let mut subgroup = subgroups[index].clone();
            if subgroup.len() == 2 {
                let lean = |member: &str| -> i64 {
                    let mut score = 0i64;
                    for (other_position, &other) in row.iter().enumerate() {
                        if other_position == position {
                            continue;
                        }
                        let shared: usize = subgroups[other]
                            .iter()
                            .map(|b| shared_children(graph, member, b))
                            .sum();
                        if other_position < position {
                            score += shared as i64;
                        } else {
                            score -= shared as i64;
                        }
                    }
                    score
                };
                subgroup.sort_by_key(|member| std::cmp::Reverse(lean(*member)));
            }
            ordered.push(subgroup);
        }
        (ClusterKind::CoParents, ordered)
    }
}

/// A member married to several others in the same subgroup sits between them.
fn center_hub<'g>(graph: &FamilyGraph, subgroup: Vec<&'g str>) -> Vec<&'g str> {
    if subgroup.len() < 3 {
        return subgroup;
    }
    let degree = |id: &str| subgroup.iter().filter(|o| graph.has_spouse(id, o)).count();
    let mut by_degree = subgroup.clone();
    by_degree.sort_by(|a, b| degree(*b).cmp(&degree(*a)));
    let mut row: VecDeque<&'g str> = VecDeque::new();
    for (step, id) in by_degree.into_iter().enumerate() {
        if step % 2 == 0 {
            row.push_back(id);
        } else {
            row.push_front(id);
        }
    }
    row.into_iter().collect()
}

/// Every child of `parent` living in `generation`, including ones another
/// unit already claimed, ordered by where their parents sit inside the unit,
/// then by age.
fn ordered_children<'g>(grouper: &Grouper<'g, '_>, parent: &Unit<'g>) -> Vec<&'g str> {
    let graph = grouper.graph;
    let positions: HashMap<&str, usize> = parent.members().enumerate().map(|(i, m)| (m, i)).collect();
    let mut seen: HashSet<&'g str> = HashSet::new();
    let mut kids: Vec<(&'g str, f32)> = Vec::new();
    for member in parent.members() {
        for child in graph.children(member) {
            if !grouper.in_row(child) || !seen.insert(child) {
                continue;
            }
            kids.push((child, median_parent_position(graph, child, &positions)));
        }
    }
    kids.sort_by(|a, b| {
        a.1.partial_cmp(&b.1)
            .unwrap_or(Ordering::Equal)
            .then_with(|| age_order(graph, a.0, b.0))
    });
    kids.into_iter().map(|(id, _)| id).collect()
}

pub fn build_clusters(
    graph: &FamilyGraph,
    generations: &GenerationMap,
) -> BTreeMap<i32, Vec<FamilyCluster>> {
    build_clusters_with(graph, generations, &LayoutConfig::default())
}

pub fn build_clusters_with(
    graph: &FamilyGraph,
    generations: &GenerationMap,
    config: &LayoutConfig,
) -> BTreeMap<i32, Vec<FamilyCluster>> {
    let mut level: HashMap<&str, i32> = HashMap::new();
    let mut rows: BTreeMap<i32, Vec<&str>> = BTreeMap::new();
    for id in graph.ids() {
        if let Some(generation) = generations.get(id) {
            level.insert(id, *generation);
            rows.entry(*generation).or_default().push(id);
        }
    }
    for row in rows.values_mut() {
        row.sort_by(|a, b| age_order(graph, a, b));
    }

    let mut units: BTreeMap<i32, Vec<Unit>> = BTreeMap::new();
    let mut assigned: HashSet<&str> = HashSet::new();
    let mut previous: Option<i32> = None;
    for (&generation, row) in &rows {
        let grouper = Grouper {
            graph,
            level: &level,
            generation,
        };
        let mut out: Vec<Unit> = Vec::new();
        let mut placed_children: Vec<(usize, Vec<&str>)> = Vec::new();

        if let Some(parents) = previous.and_then(|p| units.get(&p)) {
            for (parent_index, parent) in parents.iter().enumerate() {
                let children = ordered_children(&grouper, parent);
                if children.is_empty() {
                    continue;
                }
                // Children married into an earlier unit stay listed here but
                // are not grouped twice.
                let seeds: Vec<&str> = children
                    .iter()
                    .copied()
                    .filter(|child| !assigned.contains(child))
                    .collect();
                for members in grouper.group(&seeds, &mut assigned) {
                    let (kind, groups) = grouper.arrange(members);
                    out.push(Unit {
                        kind,
                        groups,
                        children: Vec::new(),
                        parent: Some(parent_index),
                    });
                }
                placed_children.push((parent_index, children));
            }
        }

        let rest: Vec<&str> = row
            .iter()
            .copied()
            .filter(|id| !assigned.contains(id))
            .collect();
        for members in grouper.group(&rest, &mut assigned) {
            let (kind, groups) = grouper.arrange(members);
            out.push(Unit {
                kind,
                groups,
                children: Vec::new(),
                parent: None,
            });
        }

        if let Some(parents) = previous.and_then(|p| units.get_mut(&p)) {
            for (index, seeds) in placed_children {
                parents[index].children = seeds;
            }
        }
        units.insert(generation, out);
        previous = Some(generation);
    }

    finish(graph, units, config)
}

fn descendants_of<'g>(graph: &'g FamilyGraph, unit: &Unit<'g>) -> BTreeSet<String> {
    let mut out = BTreeSet::new();
    let mut queue: VecDeque<&'g str> = unit.members().collect();
    let mut seen: HashSet<&'g str> = unit.members().collect();
    while let Some(current) = queue.pop_front() {
        for child in graph.children(current) {
            if seen.insert(child) {
                out.insert(child.to_string());
                queue.push_back(child);
            }
        }
    }
    out
}

/// Converts units to clusters and reserves widths bottom-up so every family
/// has room for the subtree hanging under it.
fn finish(
    graph: &FamilyGraph,
    units: BTreeMap<i32, Vec<Unit>>,
    config: &LayoutConfig,
) -> BTreeMap<i32, Vec<FamilyCluster>> {
    let mut clusters: BTreeMap<i32, Vec<FamilyCluster>> = BTreeMap::new();
    for (generation, row) in &units {
        let converted = row
            .iter()
            .map(|unit| FamilyCluster {
                kind: unit.kind,
                generation: *generation,
                members: unit.members().map(str::to_string).collect(),
                spouse_groups: unit
                    .groups
                    .iter()
                    .map(|group| group.iter().map(|m| m.to_string()).collect())
                    .collect(),
                children: unit.children.iter().map(|c| c.to_string()).collect(),
                descendants: descendants_of(graph, unit),
                parent_cluster: unit.parent,
                width: 0.0,
            })
            .collect();
        clusters.insert(*generation, converted);
    }

    let generations: Vec<i32> = clusters.keys().copied().collect();
    for (position, generation) in generations.iter().enumerate().rev() {
        let below: Vec<(Option<usize>, f32)> = generations
            .get(position + 1)
            .and_then(|next| clusters.get(next))
            .map(|row| row.iter().map(|c| (c.parent_cluster, c.width)).collect())
            .unwrap_or_default();
        let Some(row) = clusters.get_mut(generation) else {
            continue;
        };
        for (index, cluster) in row.iter_mut().enumerate() {
            let subtree: Vec<f32> = below
                .iter()
                .filter(|(parent, _)| *parent == Some(index))
                .map(|(_, width)| *width)
                .collect();
            cluster.width = cluster_width(cluster, &subtree, config);
        }
    }
    clusters
}

pub(super) fn parents_width(cluster: &FamilyCluster, config: &LayoutConfig) -> f32 {
    match cluster.kind {
        ClusterKind::Single => config.card_width,
        ClusterKind::Couple => config.couple_width(),
        ClusterKind::CoParents => {
            let cards: f32 = cluster
                .spouse_groups
                .iter()
                .map(|group| config.cards_width(group.len()))
                .sum();
            let gaps = cluster.spouse_groups.len().saturating_sub(1) as f32;
            cards + gaps * config.spouse_group_gap
        }
    }
}

fn cluster_width(cluster: &FamilyCluster, subtree: &[f32], config: &LayoutConfig) -> f32 {
    let slots = cluster.children.len();
    let child_slots = if slots == 0 {
        0.0
    } else {
        slots as f32 * config.child_width + (slots - 1) as f32 * config.child_spacing
    };
    let subtree_width = if subtree.is_empty() {
        0.0
    } else {
        subtree.iter().sum::<f32>() + (subtree.len() - 1) as f32 * config.family_gap
    };
    parents_width(cluster, config)
        .max(child_slots)
        .max(subtree_width)
        .max(config.min_unit_width)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::generations::assign_generations;
    use crate::model::Member;

    fn family(members: &[Member], spouses: &[(&str, &str)], parents: &[(&str, &str)]) -> FamilyGraph {
        let mut graph = FamilyGraph::from_members(members.iter().cloned());
        for (a, b) in spouses {
            graph.add_spouse(a, b).unwrap();
        }
        for (p, c) in parents {
            graph.add_parent_child(p, c).unwrap();
        }
        graph
    }

    fn people(ids: &[&str]) -> Vec<Member> {
        ids.iter().map(|id| Member::new(*id, *id)).collect()
    }

    fn clusters_for(graph: &FamilyGraph) -> BTreeMap<i32, Vec<FamilyCluster>> {
        build_clusters(graph, &assign_generations(graph))
    }

    #[test]
    fn couple_and_their_child() {
        let graph = family(&people(&["a", "b", "c"]), &[("a", "b")], &[("a", "c"), ("b", "c")]);
        let clusters = clusters_for(&graph);
        let top = &clusters[&0];
        assert_eq!(top.len(), 1);
        assert_eq!(top[0].kind, ClusterKind::Couple);
        assert_eq!(top[0].children, vec!["c".to_string()]);
        assert!(top[0].descendants.contains("c"));
        let below = &clusters[&1];
        assert_eq!(below[0].kind, ClusterKind::Single);
        assert_eq!(below[0].parent_cluster, Some(0));
    }

    #[test]
    fn unmarried_parents_form_one_unit() {
        let graph = family(&people(&["a", "b", "c"]), &[], &[("a", "c"), ("b", "c")]);
        let clusters = clusters_for(&graph);
        assert_eq!(clusters[&0].len(), 1);
        assert_eq!(clusters[&0][0].kind, ClusterKind::CoParents);
        assert_eq!(clusters[&0][0].members.len(), 2);
    }

    #[test]
    fn linked_couples_meet_in_the_middle() {
        let graph = family(
            &people(&["a", "b", "c", "d", "k"]),
            &[("a", "b"), ("c", "d")],
            &[("b", "k"), ("c", "k")],
        );
        let clusters = clusters_for(&graph);
        let unit = &clusters[&0][0];
        assert_eq!(unit.kind, ClusterKind::CoParents);
        assert_eq!(unit.spouse_groups.len(), 2);
        let b = unit.members.iter().position(|m| m == "b").unwrap();
        let c = unit.members.iter().position(|m| m == "c").unwrap();
        assert_eq!(b.abs_diff(c), 1);
    }

    #[test]
    fn remarried_member_sits_between_spouses() {
        let graph = family(
            &people(&["dad", "mom1", "mom2"]),
            &[("dad", "mom1"), ("dad", "mom2")],
            &[],
        );
        let clusters = clusters_for(&graph);
        let unit = &clusters[&0][0];
        assert_eq!(unit.kind, ClusterKind::CoParents);
        assert_eq!(unit.members[1], "dad");
    }

    #[test]
    fn children_are_ordered_oldest_first() {
        let members = vec![
            Member::new("p", "Parent"),
            Member::new("young", "Zed").with_birth_date("2001-05-01"),
            Member::new("old", "Amy").with_birth_date("1995-02-10"),
            Member::new("undated", "Bob"),
        ];
        let graph = family(&members, &[], &[("p", "young"), ("p", "old"), ("p", "undated")]);
        let clusters = clusters_for(&graph);
        assert_eq!(clusters[&0][0].children, vec!["old", "young", "undated"]);
        let row: Vec<&str> = clusters[&1].iter().map(|c| c.members[0].as_str()).collect();
        assert_eq!(row, vec!["old", "young", "undated"]);
    }

    #[test]
    fn married_in_spouse_clusters_with_partner() {
        let graph = family(
            &people(&["p", "kid", "partner", "grandkid"]),
            &[("kid", "partner")],
            &[("p", "kid"), ("kid", "grandkid"), ("partner", "grandkid")],
        );
        let clusters = clusters_for(&graph);
        let row = &clusters[&1];
        assert_eq!(row.len(), 1);
        assert_eq!(row[0].kind, ClusterKind::Couple);
        assert_eq!(row[0].members[0], "kid");
        assert_eq!(row[0].parent_cluster, Some(0));
    }

    #[test]
    fn children_married_across_families_stay_listed_under_both() {
        let graph = family(
            &people(&["a1", "a2", "ak", "b1", "b2", "bk", "kid"]),
            &[("a1", "a2"), ("b1", "b2"), ("ak", "bk")],
            &[
                ("a1", "ak"),
                ("a2", "ak"),
                ("b1", "bk"),
                ("b2", "bk"),
                ("ak", "kid"),
                ("bk", "kid"),
            ],
        );
        let clusters = clusters_for(&graph);
        let top = &clusters[&0];
        assert_eq!(top.len(), 2);
        assert_eq!(top[0].members, vec!["a1", "a2"]);
        assert_eq!(top[0].children, vec!["ak"]);
        assert_eq!(top[1].members, vec!["b1", "b2"]);
        assert_eq!(top[1].children, vec!["bk"]);
        assert!(top[1].descendants.contains("kid"));
        assert_eq!(top[1].width, LayoutConfig::default().couple_width());

        // the married couple is still grouped only once
        let row = &clusters[&1];
        assert_eq!(row.len(), 1);
        assert_eq!(row[0].kind, ClusterKind::Couple);
        assert_eq!(row[0].parent_cluster, Some(0));
    }

    #[test]
    fn every_member_lands_in_exactly_one_cluster() {
        let graph = family(
            &people(&["g1", "g2", "a", "b", "c", "x", "y", "z", "solo"]),
            &[("g1", "g2"), ("a", "x")],
            &[
                ("g1", "a"),
                ("g2", "a"),
                ("g1", "b"),
                ("g2", "b"),
                ("a", "c"),
                ("x", "c"),
                ("y", "z"),
            ],
        );
        let clusters = clusters_for(&graph);
        let mut seen: Vec<String> = clusters
            .values()
            .flatten()
            .flat_map(|c| c.members.iter().cloned())
            .collect();
        seen.sort();
        let mut expected: Vec<String> = graph.ids().map(str::to_string).collect();
        expected.sort();
        assert_eq!(seen, expected);
    }

    #[test]
    fn width_reserves_child_slots() {
        let graph = family(
            &people(&["a", "b", "c1", "c2", "c3"]),
            &[("a", "b")],
            &[("a", "c1"), ("a", "c2"), ("a", "c3"), ("b", "c1"), ("b", "c2"), ("b", "c3")],
        );
        let clusters = clusters_for(&graph);
        // three 200-wide leaf units plus two family gaps beat 3 * 180 + 2 * 40
        assert_eq!(clusters[&0][0].width, 760.0);
        assert_eq!(clusters[&1][0].width, 200.0);
    }

    #[test]
    fn median_of_parent_positions() {
        let graph = family(&people(&["a", "b", "c", "k"]), &[], &[("a", "k"), ("c", "k")]);
        let positions = HashMap::from([("a", 0usize), ("b", 1), ("c", 2)]);
        assert_eq!(median_parent_position(&graph, "k", &positions), 1.0);
    }
}
