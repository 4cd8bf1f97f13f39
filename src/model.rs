use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashSet, VecDeque};
use thiserror::Error;

pub type MemberId = String;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Gender {
    Male,
    Female,
    Other,
}

impl Gender {
    /// Maps the free-form gender values stored on members onto the three
    /// buckets used for label wording. Unknown values fall back to `Other`.
    pub fn from_token(token: &str) -> Option<Self> {
        let token = token.trim().to_ascii_lowercase();
        if token.is_empty() {
            return None;
        }
        match token.as_str() {
            "male" | "man" | "m" | "transgender-man" | "demiboy" => Some(Self::Male),
            "female" | "woman" | "f" | "transgender-woman" | "demigirl" => Some(Self::Female),
            "prefer-not-to-say" | "prefer not to say" => None,
            _ => Some(Self::Other),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Member {
    pub id: MemberId,
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub birth_date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gender: Option<String>,
    #[serde(default)]
    pub spouse_ids: BTreeSet<MemberId>,
    #[serde(default)]
    pub parent_ids: BTreeSet<MemberId>,
    #[serde(default)]
    pub child_ids: BTreeSet<MemberId>,
}

impl Member {
    pub fn new(id: impl Into<MemberId>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn with_birth_date(mut self, date: impl Into<String>) -> Self {
        self.birth_date = Some(date.into());
        self
    }

    pub fn with_gender(mut self, gender: impl Into<String>) -> Self {
        self.gender = Some(gender.into());
        self
    }

    pub fn gender(&self) -> Option<Gender> {
        self.gender.as_deref().and_then(Gender::from_token)
    }

    /// Sort key for age ordering: `(year, month, day)` parsed from an ISO-like
    /// date prefix. Missing components default to 1 so a bare year still sorts.
    pub fn birth_key(&self) -> Option<(i32, u32, u32)> {
        parse_date_key(self.birth_date.as_deref()?)
    }
}

fn parse_date_key(raw: &str) -> Option<(i32, u32, u32)> {
    let date = raw.trim().split(['T', ' ']).next()?;
    let mut parts = date.split('-');
    let year = parts.next()?.parse::<i32>().ok()?;
    let month = parts
        .next()
        .map(|m| m.parse::<u32>().ok())
        .unwrap_or(Some(1))?;
    let day = parts
        .next()
        .map(|d| d.parse::<u32>().ok())
        .unwrap_or(Some(1))?;
    Some((year, month, day))
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum GraphError {
    #[error("member `{0}` does not exist")]
    UnknownMember(MemberId),
    #[error("member `{0}` cannot be related to itself")]
    SelfReference(MemberId),
    #[error("member `{0}` already exists")]
    DuplicateMember(MemberId),
    #[error("`{parent}` is a descendant of `{child}`; the edge would create a cycle")]
    CircularParentage { parent: MemberId, child: MemberId },
}

/// In-memory family snapshot. Edges live on the members themselves and are
/// kept mirrored by the mutators below; graphs assembled by hand may be
/// asymmetric or dangling and every traversal tolerates that.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FamilyGraph {
    pub members: BTreeMap<MemberId, Member>,
}

impl FamilyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_members(members: impl IntoIterator<Item = Member>) -> Self {
        let members = members
            .into_iter()
            .map(|member| (member.id.clone(), member))
            .collect();
        Self { members }
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.members.contains_key(id)
    }

    pub fn get(&self, id: &str) -> Option<&Member> {
        self.members.get(id)
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.members.keys().map(String::as_str)
    }

    pub fn name_of<'a>(&'a self, id: &'a str) -> &'a str {
        self.members
            .get(id)
            .map(|member| member.name.as_str())
            .filter(|name| !name.is_empty())
            .unwrap_or(id)
    }

    fn existing<'a>(
        &'a self,
        set: Option<&'a BTreeSet<MemberId>>,
        owner: &'a str,
    ) -> impl Iterator<Item = &'a str> + 'a {
        set.into_iter()
            .flatten()
            .map(String::as_str)
            .filter(move |id| *id != owner && self.members.contains_key(*id))
    }

    pub fn spouses<'a>(&'a self, id: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.existing(self.members.get(id).map(|m| &m.spouse_ids), id)
    }

    pub fn parents<'a>(&'a self, id: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.existing(self.members.get(id).map(|m| &m.parent_ids), id)
    }

    pub fn children<'a>(&'a self, id: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.existing(self.members.get(id).map(|m| &m.child_ids), id)
    }

    pub fn has_spouse(&self, a: &str, b: &str) -> bool {
        self.spouses(a).any(|s| s == b)
    }

    pub fn has_child(&self, parent: &str, child: &str) -> bool {
        self.children(parent).any(|c| c == child)
    }

    pub fn has_parent(&self, child: &str, parent: &str) -> bool {
        self.parents(child).any(|p| p == parent)
    }

    /// Union of spouse, parent and child edges, deduplicated, in sorted order.
    pub fn neighbors<'a>(&'a self, id: &'a str) -> Vec<&'a str> {
        let mut out: BTreeSet<&str> = BTreeSet::new();
        out.extend(self.spouses(id));
        out.extend(self.parents(id));
        out.extend(self.children(id));
        out.into_iter().collect()
    }

    /// Members sharing at least one parent with `id`.
    pub fn siblings<'a>(&'a self, id: &'a str) -> Vec<&'a str> {
        let mut out: BTreeSet<&str> = BTreeSet::new();
        for parent in self.parents(id) {
            out.extend(self.children(parent).filter(|c| *c != id));
        }
        out.into_iter().collect()
    }

    /// Members sharing at least one child with `id`, married or not.
    pub fn co_parents<'a>(&'a self, id: &'a str) -> Vec<&'a str> {
        let mut out: BTreeSet<&str> = BTreeSet::new();
        for child in self.children(id) {
            out.extend(self.parents(child).filter(|p| *p != id));
        }
        out.into_iter().collect()
    }

    pub fn is_ancestor(&self, ancestor: &str, descendant: &str) -> bool {
        let mut visited: HashSet<&str> = HashSet::new();
        let mut queue: VecDeque<&str> = VecDeque::new();
        queue.push_back(descendant);
        visited.insert(descendant);
        while let Some(current) = queue.pop_front() {
            for parent in self.parents(current) {
                if parent == ancestor {
                    return true;
                }
                if visited.insert(parent) {
                    queue.push_back(parent);
                }
            }
        }
        false
    }

    /// Connected components over the undirected neighbor view, each sorted,
    /// listed in order of their smallest id.
    pub fn components(&self) -> Vec<Vec<&str>> {
        let mut seen: HashSet<&str> = HashSet::new();
        let mut components = Vec::new();
        for id in self.ids() {
            if !seen.insert(id) {
                continue;
            }
            let mut component = vec![id];
            let mut queue = VecDeque::from([id]);
            while let Some(current) = queue.pop_front() {
                for next in self.neighbors(current) {
                    if seen.insert(next) {
                        component.push(next);
                        queue.push_back(next);
                    }
                }
            }
            component.sort_unstable();
            components.push(component);
        }
        components
    }

    pub fn edge_count(&self) -> usize {
        let spouses: usize = self.members.values().map(|m| m.spouse_ids.len()).sum();
        let parents: usize = self.members.values().map(|m| m.parent_ids.len()).sum();
        spouses / 2 + parents
    }

    pub fn add_member(&mut self, member: Member) -> Result<(), GraphError> {
        if self.members.contains_key(&member.id) {
            return Err(GraphError::DuplicateMember(member.id));
        }
        self.members.insert(member.id.clone(), member);
        Ok(())
    }

    /// Inserts a bare member when `id` is new, otherwise fills in any
    /// attributes that are provided.
    pub fn ensure_member(&mut self, id: &str, name: Option<String>) -> &mut Member {
        let entry = self
            .members
            .entry(id.to_string())
            .or_insert_with(|| Member::new(id, id));
        if let Some(name) = name {
            entry.name = name;
        }
        entry
    }

    fn require(&self, id: &str) -> Result<(), GraphError> {
        if self.members.contains_key(id) {
            Ok(())
        } else {
            Err(GraphError::UnknownMember(id.to_string()))
        }
    }

    pub fn add_spouse(&mut self, a: &str, b: &str) -> Result<(), GraphError> {
        if a == b {
            return Err(GraphError::SelfReference(a.to_string()));
        }
        self.require(a)?;
        self.require(b)?;
        if let Some(member) = self.members.get_mut(a) {
            member.spouse_ids.insert(b.to_string());
        }
        if let Some(member) = self.members.get_mut(b) {
            member.spouse_ids.insert(a.to_string());
        }
        Ok(())
    }

    pub fn add_parent_child(&mut self, parent: &str, child: &str) -> Result<(), GraphError> {
        if parent == child {
            return Err(GraphError::SelfReference(parent.to_string()));
        }
        self.require(parent)?;
        self.require(child)?;
        if self.is_ancestor(child, parent) {
            return Err(GraphError::CircularParentage {
                parent: parent.to_string(),
                child: child.to_string(),
            });
        }
        if let Some(member) = self.members.get_mut(parent) {
            member.child_ids.insert(child.to_string());
        }
        if let Some(member) = self.members.get_mut(child) {
            member.parent_ids.insert(parent.to_string());
        }
        Ok(())
    }

    /// Returns whether an edge was actually removed.
    pub fn remove_spouse(&mut self, a: &str, b: &str) -> Result<bool, GraphError> {
        self.require(a)?;
        self.require(b)?;
        let mut removed = false;
        if let Some(member) = self.members.get_mut(a) {
            removed |= member.spouse_ids.remove(b);
        }
        if let Some(member) = self.members.get_mut(b) {
            removed |= member.spouse_ids.remove(a);
        }
        Ok(removed)
    }

    pub fn remove_parent_child(&mut self, parent: &str, child: &str) -> Result<bool, GraphError> {
        self.require(parent)?;
        self.require(child)?;
        let mut removed = false;
        if let Some(member) = self.members.get_mut(parent) {
            removed |= member.child_ids.remove(child);
        }
        if let Some(member) = self.members.get_mut(child) {
            removed |= member.parent_ids.remove(parent);
        }
        Ok(removed)
    }

    /// Drops a member and every edge pointing at it.
    pub fn remove_member(&mut self, id: &str) -> Option<Member> {
        let removed = self.members.remove(id)?;
        for member in self.members.values_mut() {
            member.spouse_ids.remove(id);
            member.parent_ids.remove(id);
            member.child_ids.remove(id);
        }
        Some(removed)
    }

    pub fn from_document(doc: FamilyDocument) -> Self {
        let mut graph = FamilyGraph::new();
        for record in doc.members {
            let member = graph.ensure_member(&record.id, Some(record.name));
            member.birth_date = record.birth_date;
            member.gender = record.gender;
        }
        for row in doc.relationships {
            let result = match row.kind {
                RelationshipKind::Spouse => graph.add_spouse(&row.a_member_id, &row.b_member_id),
                RelationshipKind::ParentChild => {
                    graph.add_parent_child(&row.a_member_id, &row.b_member_id)
                }
            };
            if let Err(err) = result {
                tracing::warn!(
                    a = %row.a_member_id,
                    b = %row.b_member_id,
                    kind = ?row.kind,
                    error = %err,
                    "skipping relationship row"
                );
            }
        }
        graph
    }

    pub fn to_document(&self) -> FamilyDocument {
        let members = self
            .members
            .values()
            .map(|member| MemberRecord {
                id: member.id.clone(),
                name: member.name.clone(),
                birth_date: member.birth_date.clone(),
                gender: member.gender.clone(),
            })
            .collect();
        let mut relationships = Vec::new();
        for member in self.members.values() {
            for spouse in self.spouses(&member.id) {
                if member.id.as_str() < spouse {
                    relationships.push(RelationshipRow {
                        kind: RelationshipKind::Spouse,
                        a_member_id: member.id.clone(),
                        b_member_id: spouse.to_string(),
                    });
                }
            }
            for child in self.children(&member.id) {
                relationships.push(RelationshipRow {
                    kind: RelationshipKind::ParentChild,
                    a_member_id: member.id.clone(),
                    b_member_id: child.to_string(),
                });
            }
        }
        FamilyDocument {
            members,
            relationships,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RelationshipKind {
    #[serde(rename = "spouse")]
    Spouse,
    #[serde(rename = "parent-child")]
    ParentChild,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemberRecord {
    pub id: MemberId,
    #[serde(default)]
    pub name: String,
    #[serde(default, alias = "dob", skip_serializing_if = "Option::is_none")]
    pub birth_date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gender: Option<String>,
}

/// One stored relationship row. For `parent-child` rows `a` is the parent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelationshipRow {
    #[serde(rename = "type")]
    pub kind: RelationshipKind,
    pub a_member_id: MemberId,
    pub b_member_id: MemberId,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FamilyDocument {
    #[serde(default)]
    pub members: Vec<MemberRecord>,
    #[serde(default)]
    pub relationships: Vec<RelationshipRow>,
}
