use crate::model::{FamilyGraph, Gender, MemberId};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Relationship {
    Oneself,
    Spouse,
    Parent,
    Child,
    Sibling,
    /// `generations` >= 2; 2 is a grandparent.
    Ancestor { generations: u32 },
    Descendant { generations: u32 },
    /// 1 is a plain aunt/uncle, 2 a great-aunt/uncle.
    AuntUncle { generations: u32 },
    NieceNephew { generations: u32 },
    Cousin { degree: u32, removal: u32 },
    InLaw { kind: InLawKind },
    Step { kind: StepKind },
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(tag = "relation", rename_all = "camelCase")]
pub enum InLawKind {
    Parent,
    Child,
    Sibling,
    Ancestor { generations: u32 },
    Descendant { generations: u32 },
    AuntUncle { generations: u32 },
    NieceNephew { generations: u32 },
    Cousin { degree: u32, removal: u32 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum StepKind {
    Parent,
    Sibling,
}

impl Relationship {
    pub fn is_blood(&self) -> bool {
        matches!(
            self,
            Self::Parent
                | Self::Child
                | Self::Sibling
                | Self::Ancestor { .. }
                | Self::Descendant { .. }
                | Self::AuntUncle { .. }
                | Self::NieceNephew { .. }
                | Self::Cousin { .. }
        )
    }

    /// The label `b` would get when the query is flipped, for relations where
    /// that is well defined. Affinal kinds only flip for parent/child.
    pub fn inverse(&self) -> Option<Self> {
        let flipped = match *self {
            Self::Oneself => Self::Oneself,
            Self::Spouse => Self::Spouse,
            Self::Parent => Self::Child,
            Self::Child => Self::Parent,
            Self::Sibling => Self::Sibling,
            Self::Ancestor { generations } => Self::Descendant { generations },
            Self::Descendant { generations } => Self::Ancestor { generations },
            Self::AuntUncle { generations } => Self::NieceNephew { generations },
            Self::NieceNephew { generations } => Self::AuntUncle { generations },
            Self::Cousin { degree, removal } => Self::Cousin { degree, removal },
            Self::InLaw {
                kind: InLawKind::Parent,
            } => Self::InLaw {
                kind: InLawKind::Child,
            },
            Self::InLaw {
                kind: InLawKind::Child,
            } => Self::InLaw {
                kind: InLawKind::Parent,
            },
            Self::InLaw {
                kind: InLawKind::Sibling,
            } => Self::InLaw {
                kind: InLawKind::Sibling,
            },
            Self::Step {
                kind: StepKind::Sibling,
            } => Self::Step {
                kind: StepKind::Sibling,
            },
            _ => return None,
        };
        Some(flipped)
    }

    fn as_in_law(&self) -> Option<InLawKind> {
        let kind = match *self {
            Self::Parent => InLawKind::Parent,
            Self::Child => InLawKind::Child,
            Self::Sibling => InLawKind::Sibling,
            Self::Ancestor { generations } => InLawKind::Ancestor { generations },
            Self::Descendant { generations } => InLawKind::Descendant { generations },
            Self::AuntUncle { generations } => InLawKind::AuntUncle { generations },
            Self::NieceNephew { generations } => InLawKind::NieceNephew { generations },
            Self::Cousin { degree, removal } => InLawKind::Cousin { degree, removal },
            _ => return None,
        };
        Some(kind)
    }

    pub fn gendered_label(&self, gender: Option<Gender>) -> String {
        let pick = |male: &str, female: &str, neutral: &str| -> String {
            match gender {
                Some(Gender::Male) => male.to_string(),
                Some(Gender::Female) => female.to_string(),
                _ => neutral.to_string(),
            }
        };
        match *self {
            Self::Spouse => pick("Husband", "Wife", "Spouse"),
            Self::Parent => pick("Father", "Mother", "Parent"),
            Self::Child => pick("Son", "Daughter", "Child"),
            Self::Sibling => pick("Brother", "Sister", "Sibling"),
            Self::Ancestor { generations } => format!(
                "{}{}",
                greats(generations.saturating_sub(2)),
                pick("Grandfather", "Grandmother", "Grandparent")
            ),
            Self::Descendant { generations } => format!(
                "{}{}",
                greats(generations.saturating_sub(2)),
                pick("Grandson", "Granddaughter", "Grandchild")
            ),
            Self::AuntUncle { generations } => format!(
                "{}{}",
                greats(generations.saturating_sub(1)),
                pick("Uncle", "Aunt", "Aunt/Uncle")
            ),
            Self::NieceNephew { generations } => format!(
                "{}{}",
                greats(generations.saturating_sub(1)),
                pick("Nephew", "Niece", "Niece/Nephew")
            ),
            Self::InLaw { kind } => {
                let base = match kind {
                    InLawKind::Parent => Self::Parent,
                    InLawKind::Child => Self::Child,
                    InLawKind::Sibling => Self::Sibling,
                    InLawKind::Ancestor { generations } => Self::Ancestor { generations },
                    InLawKind::Descendant { generations } => Self::Descendant { generations },
                    InLawKind::AuntUncle { generations } => Self::AuntUncle { generations },
                    InLawKind::NieceNephew { generations } => Self::NieceNephew { generations },
                    InLawKind::Cousin { degree, removal } => {
                        return cousin_label(degree, removal, "-in-law");
                    }
                };
                format!("{}-in-law", base.gendered_label(gender))
            }
            Self::Step {
                kind: StepKind::Parent,
            } => pick("Stepfather", "Stepmother", "Step-parent"),
            Self::Step {
                kind: StepKind::Sibling,
            } => pick("Stepbrother", "Stepsister", "Step-sibling"),
            Self::Oneself | Self::Cousin { .. } | Self::Unknown => self.to_string(),
        }
    }
}

fn greats(count: u32) -> String {
    "Great-".repeat(count as usize)
}

pub fn ordinal(n: u32) -> String {
    let suffix = if (10..=20).contains(&(n % 100)) {
        "th"
    } else {
        match n % 10 {
            1 => "st",
            2 => "nd",
            3 => "rd",
            _ => "th",
        }
    };
    format!("{n}{suffix}")
}

fn cousin_label(degree: u32, removal: u32, suffix: &str) -> String {
    let base = format!("{} Cousin{}", ordinal(degree), suffix);
    match removal {
        0 => base,
        1 => format!("{base}, once removed"),
        2 => format!("{base}, twice removed"),
        n => format!("{base}, {n} times removed"),
    }
}

impl fmt::Display for Relationship {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Oneself => f.write_str("Self"),
            Self::Unknown => f.write_str("Unknown"),
            Self::Cousin { degree, removal } => f.write_str(&cousin_label(*degree, *removal, "")),
            other => f.write_str(&other.gendered_label(None)),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RelationshipReport {
    pub from: MemberId,
    pub to: MemberId,
    pub relationship: Relationship,
    pub label: String,
    pub path: Vec<MemberId>,
}

/// Breadth-first walk strictly along parent edges. Maps every ancestor to its
/// distance (1 = parent).
pub fn ancestor_distances<'a>(graph: &'a FamilyGraph, id: &'a str) -> BTreeMap<&'a str, u32> {
    let mut distances: BTreeMap<&str, u32> = BTreeMap::new();
    let mut queue: VecDeque<(&str, u32)> = VecDeque::new();
    queue.push_back((id, 0));
    while let Some((current, distance)) = queue.pop_front() {
        for parent in graph.parents(current) {
            if parent == id || distances.contains_key(parent) {
                continue;
            }
            distances.insert(parent, distance + 1);
            queue.push_back((parent, distance + 1));
        }
    }
    distances
}

/// Blood labels name `a`'s role toward `b`; in-law and step labels name `b`
/// as seen from `a`.
pub fn relationship(graph: &FamilyGraph, a: &str, b: &str) -> Relationship {
    if !graph.contains(a) || !graph.contains(b) {
        return Relationship::Unknown;
    }
    if a == b {
        return Relationship::Oneself;
    }
    if graph.has_spouse(a, b) {
        return Relationship::Spouse;
    }
    if graph.has_child(a, b) {
        return Relationship::Parent;
    }
    if graph.has_parent(a, b) {
        return Relationship::Child;
    }
    if let Some(blood) = blood_relationship(graph, a, b) {
        return blood;
    }
    affinal_relationship(graph, a, b).unwrap_or(Relationship::Unknown)
}

fn blood_relationship(graph: &FamilyGraph, a: &str, b: &str) -> Option<Relationship> {
    if a == b {
        return None;
    }
    let ancestors_a = ancestor_distances(graph, a);
    let ancestors_b = ancestor_distances(graph, b);

    if let Some(&distance) = ancestors_b.get(a) {
        return Some(match distance {
            1 => Relationship::Parent,
            d => Relationship::Ancestor { generations: d },
        });
    }
    if let Some(&distance) = ancestors_a.get(b) {
        return Some(match distance {
            1 => Relationship::Child,
            d => Relationship::Descendant { generations: d },
        });
    }

    let mut closest: Option<(u32, u32)> = None;
    for (ancestor, &dist_a) in &ancestors_a {
        let Some(&dist_b) = ancestors_b.get(ancestor) else {
            continue;
        };
        let better = closest.is_none_or(|(best_a, best_b)| dist_a + dist_b < best_a + best_b);
        if better {
            closest = Some((dist_a, dist_b));
        }
    }
    let (dist_a, dist_b) = closest?;

    let label = if dist_a == 1 && dist_b == 1 {
        Relationship::Sibling
    } else if dist_a == 1 {
        Relationship::AuntUncle {
            generations: dist_b - 1,
        }
    } else if dist_b == 1 {
        Relationship::NieceNephew {
            generations: dist_a - 1,
        }
    } else {
        Relationship::Cousin {
            degree: dist_a.min(dist_b) - 1,
            removal: dist_a.abs_diff(dist_b),
        }
    };
    Some(label)
}

fn shares_parent(graph: &FamilyGraph, a: &str, b: &str) -> bool {
    graph.parents(a).any(|p| graph.has_child(p, b))
}

fn affinal_relationship(graph: &FamilyGraph, a: &str, b: &str) -> Option<Relationship> {
    let in_law = |kind| Relationship::InLaw { kind };

    for spouse in graph.spouses(a) {
        if graph.has_parent(spouse, b) {
            return Some(in_law(InLawKind::Parent));
        }
        if graph.has_child(spouse, b) {
            return Some(in_law(InLawKind::Child));
        }
        if shares_parent(graph, spouse, b) {
            return Some(in_law(InLawKind::Sibling));
        }
    }

    for child in graph.children(a) {
        if graph.has_spouse(child, b) {
            return Some(in_law(InLawKind::Child));
        }
    }

    for parent in graph.parents(a) {
        if graph.has_spouse(parent, b) {
            return Some(Relationship::Step {
                kind: StepKind::Parent,
            });
        }
    }
    for parent in graph.parents(a) {
        for step_parent in graph.spouses(parent) {
            if graph.has_child(step_parent, b) {
                return Some(Relationship::Step {
                    kind: StepKind::Sibling,
                });
            }
        }
    }

    // b's blood relation to a's spouse, e.g. the spouse's grandmother.
    for spouse in graph.spouses(a) {
        if spouse == b {
            continue;
        }
        if let Some(kind) = blood_relationship(graph, b, spouse).and_then(|r| r.as_in_law()) {
            return Some(in_law(kind));
        }
    }

    // b married to one of a's blood relatives, e.g. a sibling's husband.
    for relative in graph.spouses(b) {
        if relative == a {
            continue;
        }
        if let Some(kind) = blood_relationship(graph, relative, a).and_then(|r| r.as_in_law()) {
            return Some(in_law(kind));
        }
    }

    None
}

/// Shortest undirected path over spouse, parent and child edges, both ends
/// included. Empty when either id is unknown or `b` is unreachable.
pub fn path(graph: &FamilyGraph, a: &str, b: &str) -> Vec<MemberId> {
    if !graph.contains(a) || !graph.contains(b) {
        return Vec::new();
    }
    if a == b {
        return vec![a.to_string()];
    }
    let mut previous: HashMap<&str, &str> = HashMap::new();
    let mut queue: VecDeque<&str> = VecDeque::new();
    previous.insert(a, a);
    queue.push_back(a);
    while let Some(current) = queue.pop_front() {
        if current == b {
            break;
        }
        for next in graph.neighbors(current) {
            if previous.contains_key(next) {
                continue;
            }
            previous.insert(next, current);
            queue.push_back(next);
        }
    }
    if !previous.contains_key(b) {
        return Vec::new();
    }
    let mut out = vec![b.to_string()];
    let mut cursor = b;
    while cursor != a {
        let Some(&prev) = previous.get(cursor) else {
            return Vec::new();
        };
        out.push(prev.to_string());
        cursor = prev;
    }
    out.reverse();
    out
}

pub fn relationship_report(graph: &FamilyGraph, a: &str, b: &str) -> RelationshipReport {
    let relationship = relationship(graph, a, b);
    let subject = match relationship {
        Relationship::InLaw { .. } | Relationship::Step { .. } => b,
        _ => a,
    };
    let gender = graph.get(subject).and_then(|member| member.gender());
    RelationshipReport {
        from: a.to_string(),
        to: b.to_string(),
        relationship,
        label: relationship.gendered_label(gender),
        path: path(graph, a, b),
    }
}
