use std::cmp::Reverse;
use std::collections::{BTreeMap, BinaryHeap, HashMap, HashSet, VecDeque};

use serde::Serialize;

use super::trace::{LayoutObserver, Pass};
use crate::config::GenerationConfig;
use crate::model::{FamilyGraph, MemberId};
use crate::relationship::ancestor_distances;

pub type GenerationMap = BTreeMap<MemberId, i32>;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct GenerationAssignment {
    pub generations: GenerationMap,
    pub roots: Vec<MemberId>,
    /// False when a capped loop stopped early; the map is still complete.
    pub converged: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum ConstraintViolation {
    ParentNotAbove { parent: MemberId, child: MemberId },
    SpousesSplit { a: MemberId, b: MemberId },
    CoParentsSplit { a: MemberId, b: MemberId },
    SiblingsSplit { a: MemberId, b: MemberId },
}

/// Parent-before-child order over the parent edges. Ready members are taken
/// smallest id first; on a cycle the smallest remaining id is forced out.
pub(super) fn topological_order(graph: &FamilyGraph) -> Vec<&str> {
    let mut indeg: HashMap<&str, usize> = HashMap::new();
    for id in graph.ids() {
        indeg.insert(id, graph.parents(id).filter(|p| *p != id).count());
    }
    let mut ready: BinaryHeap<Reverse<&str>> = indeg
        .iter()
        .filter(|(_, deg)| **deg == 0)
        .map(|(id, _)| Reverse(*id))
        .collect();

    let mut order = Vec::with_capacity(graph.len());
    let mut processed: HashSet<&str> = HashSet::new();
    loop {
        while let Some(Reverse(id)) = ready.pop() {
            if !processed.insert(id) {
                continue;
            }
            order.push(id);
            for child in graph.children(id) {
                if processed.contains(child) {
                    continue;
                }
                if let Some(deg) = indeg.get_mut(child) {
                    *deg = deg.saturating_sub(1);
                    if *deg == 0 {
                        ready.push(Reverse(child));
                    }
                }
            }
        }
        if processed.len() >= graph.len() {
            break;
        }
        let next = graph.ids().find(|id| !processed.contains(id));
        match next {
            Some(id) => ready.push(Reverse(id)),
            None => break,
        }
    }
    order
}

struct Assigner<'a, 'o> {
    graph: &'a FamilyGraph,
    config: &'a GenerationConfig,
    observer: &'o mut dyn LayoutObserver,
    order: Vec<&'a str>,
    levels: HashMap<&'a str, i32>,
    writes: usize,
}

impl<'a, 'o> Assigner<'a, 'o> {
    fn new(
        graph: &'a FamilyGraph,
        config: &'a GenerationConfig,
        observer: &'o mut dyn LayoutObserver,
    ) -> Self {
        Self {
            graph,
            config,
            observer,
            order: topological_order(graph),
            levels: HashMap::new(),
            writes: 0,
        }
    }

    fn level(&self, id: &str) -> Option<i32> {
        self.levels.get(id).copied()
    }

    fn set(&mut self, id: &'a str, level: i32, pass: Pass) -> bool {
        let previous = self.levels.insert(id, level);
        if previous == Some(level) {
            return false;
        }
        if let Some(from) = previous {
            self.observer.member_moved(id, from, level, pass);
        }
        self.writes += 1;
        true
    }

    fn run(&mut self, pass: Pass, step: impl FnOnce(&mut Self)) -> usize {
        let before = self.writes;
        step(self);
        let changed = self.writes - before;
        self.observer.pass_finished(pass, changed);
        changed
    }

    fn descendant_depth(
        &self,
        id: &'a str,
        branch: &mut HashSet<&'a str>,
        memo: &mut HashMap<&'a str, usize>,
    ) -> usize {
        if let Some(depth) = memo.get(id) {
            return *depth;
        }
        if !branch.insert(id) {
            return 0;
        }
        let graph = self.graph;
        let mut depth = 0;
        for child in graph.children(id) {
            if branch.contains(child) {
                continue;
            }
            depth = depth.max(1 + self.descendant_depth(child, branch, memo));
        }
        branch.remove(id);
        memo.insert(id, depth);
        depth
    }

    /// Parentless members that head at least one line of descent. Childless
    /// orphans are only used when nobody qualifies.
    fn select_roots(&self) -> Vec<&'a str> {
        let graph = self.graph;
        let parentless: Vec<&'a str> = self
            .order
            .iter()
            .copied()
            .filter(|id| graph.parents(id).next().is_none())
            .collect();
        let mut memo = HashMap::new();
        let mut deep = Vec::new();
        for &id in &parentless {
            let mut branch = HashSet::new();
            if self.descendant_depth(id, &mut branch, &mut memo) > 0 {
                deep.push(id);
            }
        }
        if deep.is_empty() { parentless } else { deep }
    }

    fn forward_propagation(&mut self, roots: &[&'a str]) {
        let pass = Pass::ForwardPropagation;
        for &root in roots {
            if self.level(root).is_none() {
                self.set(root, 0, pass);
            }
        }
        let graph = self.graph;
        let cap = self.config.propagation_passes.max(1);
        for sweep in 0..cap {
            let before = self.writes;
            for index in 0..self.order.len() {
                let id = self.order[index];
                let mut parents = graph.parents(id).peekable();
                if parents.peek().is_none() {
                    if self.level(id).is_none() {
                        self.set(id, 0, pass);
                    }
                    continue;
                }
                let mut highest: Option<i32> = None;
                let mut complete = true;
                for parent in parents {
                    match self.level(parent) {
                        Some(level) => highest = Some(highest.map_or(level, |h| h.max(level))),
                        None => {
                            complete = false;
                            break;
                        }
                    }
                }
                if let (true, Some(highest)) = (complete, highest) {
                    self.set(id, highest + 1, pass);
                }
            }
            if self.writes == before {
                return;
            }
            if sweep + 1 == cap {
                self.observer.not_converged(pass, cap);
            }
        }
    }

    /// Pushes ancestors of `id` upward until each sits strictly above its
    /// child. Ids already on the current branch are skipped.
    fn raise_ancestors(&mut self, id: &'a str, pass: Pass) {
        let mut branch = HashSet::new();
        self.raise_from(id, pass, &mut branch);
    }

    fn raise_from(&mut self, id: &'a str, pass: Pass, branch: &mut HashSet<&'a str>) {
        let Some(level) = self.level(id) else {
            return;
        };
        if !branch.insert(id) {
            return;
        }
        let graph = self.graph;
        let parents: Vec<&'a str> = graph.parents(id).collect();
        for parent in parents {
            if branch.contains(parent) {
                continue;
            }
            if matches!(self.level(parent), Some(p) if p >= level) {
                self.set(parent, level - 1, pass);
                self.raise_from(parent, pass, branch);
            }
        }
        branch.remove(id);
    }

    fn assigned(&self, ids: impl Iterator<Item = &'a str>) -> Vec<(&'a str, i32)> {
        ids.filter_map(|id| self.level(id).map(|level| (id, level)))
            .collect()
    }

    fn co_parent_alignment(&mut self) {
        let pass = Pass::CoParentAlignment;
        let graph = self.graph;
        for index in 0..self.order.len() {
            let child = self.order[index];
            let parents = self.assigned(graph.parents(child));
            if parents.len() < 2 {
                continue;
            }
            let Some(target) = parents.iter().map(|(_, level)| *level).min() else {
                continue;
            };
            for (parent, level) in parents {
                if level <= target {
                    continue;
                }
                self.set(parent, target, pass);
                self.raise_ancestors(parent, pass);
                // The moved parent's own siblings follow as one cohort.
                let grandparents: Vec<&'a str> = graph.parents(parent).collect();
                for grandparent in grandparents {
                    let cohort = self.assigned(graph.children(grandparent));
                    for (sibling, sibling_level) in cohort {
                        if sibling != parent && sibling_level > target {
                            self.set(sibling, target, pass);
                            self.raise_ancestors(sibling, pass);
                        }
                    }
                }
            }
        }
    }

    fn sibling_cohesion(&mut self, pass: Pass) {
        let graph = self.graph;
        for index in 0..self.order.len() {
            let parent = self.order[index];
            let children = self.assigned(graph.children(parent));
            if children.len() < 2 {
                continue;
            }
            let Some(target) = children.iter().map(|(_, level)| *level).min() else {
                continue;
            };
            for (child, level) in children {
                if level > target {
                    self.set(child, target, pass);
                    self.raise_ancestors(child, pass);
                }
            }
        }
    }

    fn lineage_depth(&self, id: &str) -> u32 {
        ancestor_distances(self.graph, id)
            .values()
            .copied()
            .max()
            .unwrap_or(0)
    }

    /// The spouse with the longer recorded ancestry anchors the pair; on a
    /// tie the one already placed lower in the tree does.
    fn pick_anchor(&self, a: &'a str, b: &'a str) -> (&'a str, &'a str) {
        let key = |id: &str| (self.lineage_depth(id), self.level(id).unwrap_or(0));
        if key(b) > key(a) { (b, a) } else { (a, b) }
    }

    fn spouse_realignment(&mut self) {
        let graph = self.graph;
        for index in 0..self.order.len() {
            let id = self.order[index];
            let spouses: Vec<&'a str> = graph.spouses(id).collect();
            for spouse in spouses {
                let (Some(a), Some(b)) = (self.level(id), self.level(spouse)) else {
                    continue;
                };
                if a == b {
                    continue;
                }
                let (anchor, married_in) = self.pick_anchor(id, spouse);
                self.repin_family(anchor, married_in);
            }
        }
    }

    /// Re-pins the family reachable from `start` (without crossing `anchor`)
    /// at offsets relative to the anchor's generation: parents one up,
    /// children one down, spouses and siblings level.
    fn repin_family(&mut self, anchor: &'a str, start: &'a str) {
        let pass = Pass::SpouseRealignment;
        let Some(base) = self.level(anchor) else {
            return;
        };
        let graph = self.graph;
        let max_depth = self.config.realign_depth;
        let mut visited: HashSet<&'a str> = HashSet::from([anchor, start]);
        let mut queue: VecDeque<(&'a str, i32, usize)> = VecDeque::from([(start, base, 0)]);
        let mut truncated = false;
        while let Some((member, level, depth)) = queue.pop_front() {
            self.set(member, level, pass);
            if depth >= max_depth {
                truncated = true;
                continue;
            }
            let mut next: Vec<(&'a str, i32)> = Vec::new();
            next.extend(graph.parents(member).map(|p| (p, level - 1)));
            next.extend(graph.children(member).map(|c| (c, level + 1)));
            next.extend(graph.spouses(member).map(|s| (s, level)));
            next.extend(graph.siblings(member).into_iter().map(|s| (s, level)));
            for (relative, relative_level) in next {
                if self.level(relative).is_some() && visited.insert(relative) {
                    queue.push_back((relative, relative_level, depth + 1));
                }
            }
        }
        if truncated {
            let message = format!("re-pin from `{start}` stopped at depth {max_depth}");
            self.observer.note(pass, &message);
        }
    }

    /// Worklist repair of every ordering and equality constraint. Values only
    /// move upward (decrease), so a consistent family always settles; the
    /// budget bounds contradictory inputs.
    fn settle(&mut self) -> bool {
        let pass = Pass::Validation;
        let graph = self.graph;
        let passes = self.config.settle_passes.max(1);
        let mut budget = passes * (graph.len() + graph.edge_count()).max(1);
        let mut queue: VecDeque<&'a str> = self.order.iter().copied().collect();
        let mut queued: HashSet<&'a str> = queue.iter().copied().collect();

        while let Some(member) = queue.pop_front() {
            queued.remove(member);
            if budget == 0 {
                self.observer.not_converged(pass, passes);
                return false;
            }
            budget -= 1;
            let Some(level) = self.level(member) else {
                continue;
            };
            let mut bounds: Vec<(&'a str, i32)> = Vec::new();
            bounds.extend(graph.parents(member).map(|p| (p, level - 1)));
            bounds.extend(graph.spouses(member).map(|s| (s, level)));
            bounds.extend(graph.co_parents(member).into_iter().map(|c| (c, level)));
            bounds.extend(graph.siblings(member).into_iter().map(|s| (s, level)));
            for (other, ceiling) in bounds {
                let Some(current) = self.level(other) else {
                    continue;
                };
                if current > ceiling {
                    self.set(other, ceiling, pass);
                    if queued.insert(other) {
                        queue.push_back(other);
                    }
                }
            }
        }
        true
    }

    /// Shifts every connected family so its topmost generation is 0.
    fn normalize_components(&mut self) {
        let graph = self.graph;
        for component in graph.components() {
            let Some(top) = component.iter().filter_map(|id| self.level(id)).min() else {
                continue;
            };
            if top == 0 {
                continue;
            }
            for id in component {
                if let Some(level) = self.level(id) {
                    self.set(id, level - top, Pass::Normalization);
                }
            }
        }
    }

    fn assign_orphans(&mut self) {
        for index in 0..self.order.len() {
            let id = self.order[index];
            if self.level(id).is_none() {
                self.set(id, 0, Pass::Orphans);
            }
        }
    }
}

pub fn assign_generations(graph: &FamilyGraph) -> GenerationMap {
    let mut observer = super::trace::TracingObserver;
    assign_generations_with(graph, &GenerationConfig::default(), &mut observer).generations
}

pub fn assign_generations_with(
    graph: &FamilyGraph,
    config: &GenerationConfig,
    observer: &mut dyn LayoutObserver,
) -> GenerationAssignment {
    let mut assigner = Assigner::new(graph, config, observer);

    let roots = assigner.select_roots();
    assigner
        .observer
        .pass_finished(Pass::RootSelection, roots.len());

    let rounds = config.propagation_passes.max(1);
    let mut converged = false;
    for _ in 0..rounds {
        let mut changed = 0;
        changed += assigner.run(Pass::ForwardPropagation, |a| a.forward_propagation(&roots));
        changed += assigner.run(Pass::CoParentAlignment, |a| a.co_parent_alignment());
        changed += assigner.run(Pass::SiblingCohesion, |a| {
            a.sibling_cohesion(Pass::SiblingCohesion)
        });
        changed += assigner.run(Pass::SpouseRealignment, |a| a.spouse_realignment());
        if changed == 0 {
            converged = true;
            break;
        }
    }
    if !converged {
        assigner.observer.not_converged(Pass::ForwardPropagation, rounds);
    }

    let mut settled = true;
    assigner.run(Pass::Validation, |a| settled = a.settle());
    assigner.run(Pass::FinalSiblingCohesion, |a| {
        a.sibling_cohesion(Pass::FinalSiblingCohesion)
    });
    assigner.run(Pass::Normalization, |a| a.normalize_components());
    assigner.run(Pass::Orphans, |a| a.assign_orphans());

    let generations = assigner
        .levels
        .iter()
        .map(|(id, level)| (id.to_string(), *level))
        .collect();
    GenerationAssignment {
        generations,
        roots: roots.iter().map(|id| id.to_string()).collect(),
        converged: converged && settled,
    }
}

pub fn constraint_violations(
    graph: &FamilyGraph,
    generations: &GenerationMap,
) -> Vec<ConstraintViolation> {
    let level = |id: &str| generations.get(id).copied();
    let mut out = Vec::new();
    for id in graph.ids() {
        let Some(own) = level(id) else {
            continue;
        };
        for child in graph.children(id) {
            if matches!(level(child), Some(c) if own >= c) {
                out.push(ConstraintViolation::ParentNotAbove {
                    parent: id.to_string(),
                    child: child.to_string(),
                });
            }
        }
        for spouse in graph.spouses(id) {
            if id < spouse && matches!(level(spouse), Some(s) if s != own) {
                out.push(ConstraintViolation::SpousesSplit {
                    a: id.to_string(),
                    b: spouse.to_string(),
                });
            }
        }
        for other in graph.co_parents(id) {
            if id < other
                && !graph.has_spouse(id, other)
                && matches!(level(other), Some(o) if o != own)
            {
                out.push(ConstraintViolation::CoParentsSplit {
                    a: id.to_string(),
                    b: other.to_string(),
                });
            }
        }
        for sibling in graph.siblings(id) {
            if id < sibling && matches!(level(sibling), Some(s) if s != own) {
                out.push(ConstraintViolation::SiblingsSplit {
                    a: id.to_string(),
                    b: sibling.to_string(),
                });
            }
        }
    }
    out
}
