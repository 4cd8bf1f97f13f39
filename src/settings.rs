use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use thiserror::Error;

use crate::model::{FamilyGraph, MemberId};

const LISTED_NAMES: usize = 5;
const IMPACT_SAMPLE: usize = 10;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TreeSettings {
    pub monogamy: bool,
    pub allow_polygamy: bool,
    pub max_spouses_per_member: Option<usize>,
    pub allow_same_sex: bool,
    pub allow_single_parent: bool,
    /// Children with more than two parents.
    pub allow_multi_parent_children: bool,
    pub max_parents_per_child: Option<usize>,
}

impl Default for TreeSettings {
    fn default() -> Self {
        Self {
            monogamy: false,
            allow_polygamy: true,
            max_spouses_per_member: None,
            allow_same_sex: true,
            allow_single_parent: true,
            allow_multi_parent_children: true,
            max_parents_per_child: None,
        }
    }
}

impl TreeSettings {
    pub fn single_spouse(&self) -> bool {
        self.monogamy || !self.allow_polygamy
    }
}

pub fn load_settings(path: Option<&Path>) -> anyhow::Result<TreeSettings> {
    let Some(path) = path else {
        return Ok(TreeSettings::default());
    };
    let contents = std::fs::read_to_string(path)?;
    Ok(json5::from_str(&contents)?)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Rule {
    Monogamy,
    MaxSpouses,
    SameSex,
    SingleParent,
    MultiParent,
    MaxParents,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Violation {
    pub rule: Rule,
    pub members: Vec<MemberId>,
    /// Display form: a member name, or "A & B" for a couple.
    pub subject: String,
    /// Spouse or parent count behind a limit rule.
    pub count: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SettingsError {
    #[error("settings change rejected: {}", .0.join("; "))]
    ChangeRejected(Vec<String>),
    #[error("member `{0}` does not exist")]
    UnknownMember(MemberId),
    #[error("member `{0}` cannot be related to itself")]
    SelfRelation(MemberId),
    #[error("`{0}` and `{1}` are already related that way")]
    AlreadyRelated(MemberId, MemberId),
    #[error("cannot make `{parent}` a parent of its own ancestor `{child}`")]
    CircularParentage { parent: MemberId, child: MemberId },
    #[error("second parent `{0}` must differ from the parent and the child")]
    InvalidSecondParent(MemberId),
    #[error("monogamy enabled: {0} already has a spouse")]
    MonogamyConflict(String),
    #[error("{name} has reached the spouse limit ({limit})")]
    SpouseLimit { name: String, limit: usize },
    #[error("same-sex unions are not allowed in this tree")]
    SameSexNotAllowed,
    #[error("single-parent children are not allowed in this tree; name a second parent")]
    SingleParentNotAllowed,
    #[error("children with more than two parents are not allowed in this tree")]
    MultiParentNotAllowed,
    #[error("child would exceed the parent limit ({0})")]
    ParentLimit(usize),
}

fn same_gender(graph: &FamilyGraph, a: &str, b: &str) -> bool {
    let gender = |id: &str| graph.get(id).and_then(|m| m.gender.as_deref());
    match (gender(a), gender(b)) {
        (Some(x), Some(y)) => !x.is_empty() && x.eq_ignore_ascii_case(y),
        _ => false,
    }
}

fn member_violation(graph: &FamilyGraph, rule: Rule, id: &str, count: Option<usize>) -> Violation {
    Violation {
        rule,
        members: vec![id.to_string()],
        subject: graph.name_of(id).to_string(),
        count,
    }
}

fn spouse_count_violations(graph: &FamilyGraph, rule: Rule, limit: usize) -> Vec<Violation> {
    graph
        .ids()
        .filter_map(|id| {
            let count = graph.spouses(id).count();
            (count > limit).then(|| member_violation(graph, rule, id, Some(count)))
        })
        .collect()
}

fn parent_count_violations(
    graph: &FamilyGraph,
    rule: Rule,
    matches: impl Fn(usize) -> bool,
) -> Vec<Violation> {
    graph
        .ids()
        .filter_map(|id| {
            let count = graph.parents(id).count();
            matches(count).then(|| member_violation(graph, rule, id, Some(count)))
        })
        .collect()
}

fn same_sex_violations(graph: &FamilyGraph) -> Vec<Violation> {
    let mut out = Vec::new();
    for id in graph.ids() {
        for spouse in graph.spouses(id) {
            if id < spouse && same_gender(graph, id, spouse) {
                out.push(Violation {
                    rule: Rule::SameSex,
                    members: vec![id.to_string(), spouse.to_string()],
                    subject: format!("{} & {}", graph.name_of(id), graph.name_of(spouse)),
                    count: None,
                });
            }
        }
    }
    out
}

fn violations_for(graph: &FamilyGraph, rule: Rule, settings: &TreeSettings) -> Vec<Violation> {
    match rule {
        Rule::Monogamy => spouse_count_violations(graph, rule, 1),
        Rule::MaxSpouses => settings
            .max_spouses_per_member
            .map(|limit| spouse_count_violations(graph, rule, limit))
            .unwrap_or_default(),
        Rule::SameSex => same_sex_violations(graph),
        Rule::SingleParent => parent_count_violations(graph, rule, |n| n == 1),
        Rule::MultiParent => parent_count_violations(graph, rule, |n| n > 2),
        Rule::MaxParents => match settings.max_parents_per_child {
            Some(limit) => parent_count_violations(graph, rule, |n| n > limit),
            None => Vec::new(),
        },
    }
}

pub fn check_graph(graph: &FamilyGraph, settings: &TreeSettings) -> Vec<Violation> {
    let mut rules = Vec::new();
    if settings.single_spouse() {
        rules.push(Rule::Monogamy);
    }
    rules.push(Rule::MaxSpouses);
    if !settings.allow_same_sex {
        rules.push(Rule::SameSex);
    }
    if !settings.allow_single_parent {
        rules.push(Rule::SingleParent);
    }
    if !settings.allow_multi_parent_children {
        rules.push(Rule::MultiParent);
    }
    rules.push(Rule::MaxParents);
    rules
        .into_iter()
        .flat_map(|rule| violations_for(graph, rule, settings))
        .collect()
}

fn tightens_limit(current: Option<usize>, proposed: Option<usize>) -> bool {
    match (current, proposed) {
        (_, None) => false,
        (None, Some(_)) => true,
        (Some(old), Some(new)) => new < old,
    }
}

fn tightened_rules(current: &TreeSettings, proposed: &TreeSettings) -> Vec<Rule> {
    let mut rules = Vec::new();
    if proposed.single_spouse() && !current.single_spouse() {
        rules.push(Rule::Monogamy);
    }
    if tightens_limit(current.max_spouses_per_member, proposed.max_spouses_per_member) {
        rules.push(Rule::MaxSpouses);
    }
    if !proposed.allow_same_sex && current.allow_same_sex {
        rules.push(Rule::SameSex);
    }
    if !proposed.allow_single_parent && current.allow_single_parent {
        rules.push(Rule::SingleParent);
    }
    if !proposed.allow_multi_parent_children && current.allow_multi_parent_children {
        rules.push(Rule::MultiParent);
    }
    if tightens_limit(current.max_parents_per_child, proposed.max_parents_per_child) {
        rules.push(Rule::MaxParents);
    }
    rules
}

fn list_names(violations: &[Violation]) -> String {
    let names: Vec<&str> = violations
        .iter()
        .take(LISTED_NAMES)
        .map(|v| v.subject.as_str())
        .collect();
    let mut out = names.join(", ");
    if violations.len() > LISTED_NAMES {
        out.push_str(&format!(" and {} more", violations.len() - LISTED_NAMES));
    }
    out
}

fn rejection_message(rule: Rule, settings: &TreeSettings, violations: &[Violation]) -> String {
    let n = violations.len();
    let most = violations.iter().filter_map(|v| v.count).max().unwrap_or(0);
    let names = list_names(violations);
    match rule {
        Rule::Monogamy => format!(
            "cannot enable monogamy: {n} member(s) have multiple spouses ({names})"
        ),
        Rule::MaxSpouses => format!(
            "cannot lower max spouses per member to {}: {n} member(s) have more (up to {most}) ({names})",
            settings.max_spouses_per_member.unwrap_or(0)
        ),
        Rule::SameSex => format!(
            "cannot disable same-sex unions: {n} such union(s) exist ({names})"
        ),
        Rule::SingleParent => format!(
            "cannot disable single parents: {n} child(ren) have only one parent ({names})"
        ),
        Rule::MultiParent => format!(
            "cannot disable multi-parent children: {n} child(ren) have more than two parents ({names})"
        ),
        Rule::MaxParents => format!(
            "cannot lower max parents per child to {}: {n} child(ren) have more (up to {most}) ({names})",
            settings.max_parents_per_child.unwrap_or(0)
        ),
    }
}

/// Accepts any loosening; rejects a tightening that existing members
/// already break.
pub fn validate_settings_change(
    graph: &FamilyGraph,
    current: &TreeSettings,
    proposed: &TreeSettings,
) -> Result<(), SettingsError> {
    if graph.is_empty() {
        return Ok(());
    }
    let mut errors = Vec::new();
    for rule in tightened_rules(current, proposed) {
        let violations = violations_for(graph, rule, proposed);
        if !violations.is_empty() {
            errors.push(rejection_message(rule, proposed, &violations));
        }
    }
    if errors.is_empty() {
        tracing::debug!("settings change accepted");
        Ok(())
    } else {
        tracing::warn!(problems = errors.len(), "settings change rejected");
        Err(SettingsError::ChangeRejected(errors))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SettingChange {
    pub setting: &'static str,
    pub old_value: Value,
    pub new_value: Value,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ImpactWarning {
    pub rule: Rule,
    pub count: usize,
    pub subjects: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeImpact {
    pub total_members: usize,
    pub total_relationships: usize,
    pub changes: Vec<SettingChange>,
    pub warnings: Vec<ImpactWarning>,
    pub safe: bool,
}

pub fn change_impact(
    graph: &FamilyGraph,
    current: &TreeSettings,
    proposed: &TreeSettings,
) -> ChangeImpact {
    let mut changes = Vec::new();
    let mut record = |setting: &'static str, old: Value, new: Value| {
        if old != new {
            changes.push(SettingChange {
                setting,
                old_value: old,
                new_value: new,
            });
        }
    };
    record("monogamy", json!(current.monogamy), json!(proposed.monogamy));
    record(
        "allowPolygamy",
        json!(current.allow_polygamy),
        json!(proposed.allow_polygamy),
    );
    record(
        "allowSameSex",
        json!(current.allow_same_sex),
        json!(proposed.allow_same_sex),
    );
    record(
        "allowSingleParent",
        json!(current.allow_single_parent),
        json!(proposed.allow_single_parent),
    );
    record(
        "allowMultiParentChildren",
        json!(current.allow_multi_parent_children),
        json!(proposed.allow_multi_parent_children),
    );
    record(
        "maxSpousesPerMember",
        json!(current.max_spouses_per_member),
        json!(proposed.max_spouses_per_member),
    );
    record(
        "maxParentsPerChild",
        json!(current.max_parents_per_child),
        json!(proposed.max_parents_per_child),
    );

    let warnings: Vec<ImpactWarning> = tightened_rules(current, proposed)
        .into_iter()
        .filter_map(|rule| {
            let violations = violations_for(graph, rule, proposed);
            (!violations.is_empty()).then(|| ImpactWarning {
                rule,
                count: violations.len(),
                subjects: violations
                    .iter()
                    .take(IMPACT_SAMPLE)
                    .map(|v| v.subject.clone())
                    .collect(),
            })
        })
        .collect();

    ChangeImpact {
        total_members: graph.len(),
        total_relationships: graph.edge_count(),
        changes,
        safe: warnings.is_empty(),
        warnings,
    }
}

fn require(graph: &FamilyGraph, id: &str) -> Result<(), SettingsError> {
    if graph.contains(id) {
        Ok(())
    } else {
        Err(SettingsError::UnknownMember(id.to_string()))
    }
}

pub fn check_spouse_addition(
    graph: &FamilyGraph,
    settings: &TreeSettings,
    a: &str,
    b: &str,
) -> Result<(), SettingsError> {
    require(graph, a)?;
    require(graph, b)?;
    if a == b {
        return Err(SettingsError::SelfRelation(a.to_string()));
    }
    if graph.has_spouse(a, b) {
        return Err(SettingsError::AlreadyRelated(a.to_string(), b.to_string()));
    }
    if settings.single_spouse() {
        for id in [a, b] {
            if graph.spouses(id).next().is_some() {
                return Err(SettingsError::MonogamyConflict(graph.name_of(id).to_string()));
            }
        }
    }
    if let Some(limit) = settings.max_spouses_per_member {
        for id in [a, b] {
            if graph.spouses(id).count() >= limit {
                return Err(SettingsError::SpouseLimit {
                    name: graph.name_of(id).to_string(),
                    limit,
                });
            }
        }
    }
    if !settings.allow_same_sex && same_gender(graph, a, b) {
        return Err(SettingsError::SameSexNotAllowed);
    }
    Ok(())
}

/// Checks adding `child` under `parent`, optionally with a second parent in
/// the same step.
pub fn check_child_addition(
    graph: &FamilyGraph,
    settings: &TreeSettings,
    parent: &str,
    child: &str,
    second_parent: Option<&str>,
) -> Result<(), SettingsError> {
    require(graph, parent)?;
    require(graph, child)?;
    if parent == child {
        return Err(SettingsError::SelfRelation(parent.to_string()));
    }
    if graph.is_ancestor(child, parent) {
        return Err(SettingsError::CircularParentage {
            parent: parent.to_string(),
            child: child.to_string(),
        });
    }
    if graph.has_child(parent, child) {
        return Err(SettingsError::AlreadyRelated(
            parent.to_string(),
            child.to_string(),
        ));
    }

    let current = graph.parents(child).count();
    let mut proposed = current + 1;
    if let Some(second) = second_parent {
        require(graph, second)?;
        if second == child || second == parent {
            return Err(SettingsError::InvalidSecondParent(second.to_string()));
        }
        if graph.is_ancestor(child, second) {
            return Err(SettingsError::CircularParentage {
                parent: second.to_string(),
                child: child.to_string(),
            });
        }
        if graph.has_child(second, child) {
            return Err(SettingsError::AlreadyRelated(
                second.to_string(),
                child.to_string(),
            ));
        }
        proposed += 1;
    }

    if current == 0 && second_parent.is_none() && !settings.allow_single_parent {
        return Err(SettingsError::SingleParentNotAllowed);
    }
    if proposed > 2 && !settings.allow_multi_parent_children {
        return Err(SettingsError::MultiParentNotAllowed);
    }
    if let Some(limit) = settings.max_parents_per_child {
        if proposed > limit {
            return Err(SettingsError::ParentLimit(limit));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Member;

    fn polygamous() -> FamilyGraph {
        let mut graph = FamilyGraph::from_members([
            Member::new("h", "Hal").with_gender("male"),
            Member::new("w1", "Wren").with_gender("female"),
            Member::new("w2", "Willa").with_gender("female"),
            Member::new("k", "Kit"),
        ]);
        graph.add_spouse("h", "w1").unwrap();
        graph.add_spouse("h", "w2").unwrap();
        graph.add_parent_child("h", "k").unwrap();
        graph
    }

    #[test]
    fn defaults_allow_everything() {
        assert!(check_graph(&polygamous(), &TreeSettings::default()).is_empty());
    }

    #[test]
    fn monogamy_flags_remarried_member() {
        let settings = TreeSettings {
            monogamy: true,
            ..TreeSettings::default()
        };
        let violations = check_graph(&polygamous(), &settings);
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].rule, Rule::Monogamy);
        assert_eq!(violations[0].subject, "Hal");
        assert_eq!(violations[0].count, Some(2));
    }

    #[test]
    fn tightening_is_rejected_with_names() {
        let graph = polygamous();
        let proposed = TreeSettings {
            allow_polygamy: false,
            allow_single_parent: false,
            ..TreeSettings::default()
        };
        let err = validate_settings_change(&graph, &TreeSettings::default(), &proposed)
            .unwrap_err();
        let SettingsError::ChangeRejected(messages) = err else {
            panic!("expected a rejected change");
        };
        assert_eq!(messages.len(), 2);
        assert!(messages[0].contains("Hal"));
        assert!(messages[1].contains("Kit"));
    }

    #[test]
    fn loosening_is_always_accepted() {
        let graph = polygamous();
        let strict = TreeSettings {
            monogamy: true,
            allow_same_sex: false,
            ..TreeSettings::default()
        };
        assert!(validate_settings_change(&graph, &strict, &TreeSettings::default()).is_ok());
    }

    #[test]
    fn long_name_lists_are_truncated() {
        let mut graph = FamilyGraph::from_members([Member::new("p", "Pat")]);
        for i in 0..7 {
            let id = format!("c{i}");
            graph.add_member(Member::new(id.clone(), format!("Child {i}"))).unwrap();
            graph.add_parent_child("p", &id).unwrap();
        }
        let proposed = TreeSettings {
            allow_single_parent: false,
            ..TreeSettings::default()
        };
        let err = validate_settings_change(&graph, &TreeSettings::default(), &proposed)
            .unwrap_err();
        assert!(err.to_string().contains("and 2 more"));
    }

    #[test]
    fn impact_lists_changes_and_warnings() {
        let graph = polygamous();
        let proposed = TreeSettings {
            max_spouses_per_member: Some(1),
            ..TreeSettings::default()
        };
        let impact = change_impact(&graph, &TreeSettings::default(), &proposed);
        assert!(!impact.safe);
        assert_eq!(impact.total_members, 4);
        assert_eq!(impact.total_relationships, 3);
        assert_eq!(impact.changes.len(), 1);
        assert_eq!(impact.changes[0].setting, "maxSpousesPerMember");
        assert_eq!(impact.warnings[0].rule, Rule::MaxSpouses);
        assert_eq!(impact.warnings[0].subjects, vec!["Hal".to_string()]);
    }

    #[test]
    fn spouse_addition_checks() {
        let graph = polygamous();
        let strict = TreeSettings {
            monogamy: true,
            allow_same_sex: false,
            ..TreeSettings::default()
        };
        assert_eq!(
            check_spouse_addition(&graph, &strict, "k", "w1"),
            Err(SettingsError::MonogamyConflict("Wren".to_string()))
        );
        assert_eq!(
            check_spouse_addition(&graph, &TreeSettings::default(), "h", "h"),
            Err(SettingsError::SelfRelation("h".to_string()))
        );
        assert_eq!(
            check_spouse_addition(&graph, &TreeSettings::default(), "h", "w1"),
            Err(SettingsError::AlreadyRelated("h".to_string(), "w1".to_string()))
        );
        let no_same_sex = TreeSettings {
            allow_same_sex: false,
            ..TreeSettings::default()
        };
        assert_eq!(
            check_spouse_addition(&graph, &no_same_sex, "w1", "w2"),
            Err(SettingsError::SameSexNotAllowed)
        );
        assert!(check_spouse_addition(&graph, &TreeSettings::default(), "k", "w1").is_ok());
    }

    #[test]
    fn child_addition_checks() {
        let graph = polygamous();
        let defaults = TreeSettings::default();
        assert!(matches!(
            check_child_addition(&graph, &defaults, "k", "h", None),
            Err(SettingsError::CircularParentage { .. })
        ));
        assert_eq!(
            check_child_addition(&graph, &defaults, "w1", "k", Some("w1")),
            Err(SettingsError::InvalidSecondParent("w1".to_string()))
        );
        let two_max = TreeSettings {
            allow_multi_parent_children: false,
            ..defaults.clone()
        };
        assert_eq!(
            check_child_addition(&graph, &two_max, "w1", "k", Some("w2")),
            Err(SettingsError::MultiParentNotAllowed)
        );
        assert!(check_child_addition(&graph, &two_max, "w1", "k", None).is_ok());

        let couples_only = TreeSettings {
            allow_single_parent: false,
            ..defaults
        };
        assert_eq!(
            check_child_addition(&graph, &couples_only, "w2", "w1", None),
            Err(SettingsError::SingleParentNotAllowed)
        );
        assert_eq!(
            check_child_addition(&graph, &couples_only, "ghost", "k", None),
            Err(SettingsError::UnknownMember("ghost".to_string()))
        );
    }

    #[test]
    fn settings_parse_from_camel_case() {
        let settings: TreeSettings =
            json5::from_str("{ monogamy: true, maxParentsPerChild: 2 }").unwrap();
        assert!(settings.single_spouse());
        assert_eq!(settings.max_parents_per_child, Some(2));
        assert!(settings.allow_same_sex);
    }
}
