use std::path::Path;

use anyhow::{Context, Result, bail};
use once_cell::sync::Lazy;
use regex::Regex;

use crate::model::{FamilyDocument, FamilyGraph, Gender};

static PERSON_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"^person\s+([\w.-]+)(?:\s+"([^"]*)")?((?:\s+\w+=\S+)*)\s*$"#).unwrap()
});
static ATTR_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(\w+)=(\S+)").unwrap());
static SPOUSE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^([\w.-]+)\s*\+\s*([\w.-]+)$").unwrap());
static DESCENT_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(.+?)\s*->\s*(.+)$").unwrap());
static ID_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[\w.-]+$").unwrap());
static DATE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d{4}-\d{2}-\d{2}$").unwrap());

/// Drops a `#` comment unless the `#` sits inside a quoted name.
fn strip_comment(line: &str) -> &str {
    let mut quoted = false;
    for (idx, ch) in line.char_indices() {
        match ch {
            '"' => quoted = !quoted,
            '#' if !quoted => return &line[..idx],
            _ => {}
        }
    }
    line
}

fn id_list(raw: &str, line_no: usize) -> Result<Vec<&str>> {
    let ids: Vec<&str> = raw.split(',').map(str::trim).collect();
    for id in &ids {
        if !ID_RE.is_match(id) {
            bail!("line {line_no}: `{id}` is not a valid member id");
        }
    }
    Ok(ids)
}

/// Parses the line-oriented family notation:
///
/// ```text
/// person ann "Ann Lee" born=1950-03-02 gender=female
/// ann + bob
/// ann, bob -> cat, dan
/// ```
///
/// Ids used by an edge before any `person` line are created with the id as
/// their name.
pub fn parse_family(input: &str) -> Result<FamilyGraph> {
    let mut graph = FamilyGraph::new();
    for (index, raw_line) in input.lines().enumerate() {
        let line_no = index + 1;
        let line = strip_comment(raw_line).trim();
        if line.is_empty() {
            continue;
        }

        if let Some(caps) = PERSON_RE.captures(line) {
            let id = &caps[1];
            let name = caps.get(2).map(|m| m.as_str().to_string());
            let member = graph.ensure_member(id, name);
            if let Some(attrs) = caps.get(3) {
                for attr in ATTR_RE.captures_iter(attrs.as_str()) {
                    let value = &attr[2];
                    match &attr[1] {
                        "born" => {
                            if !DATE_RE.is_match(value) {
                                bail!("line {line_no}: birth date `{value}` is not YYYY-MM-DD");
                            }
                            member.birth_date = Some(value.to_string());
                        }
                        "gender" => {
                            if Gender::from_token(value).is_none() {
                                tracing::debug!(line = line_no, value, "gender recorded as unspecified");
                            }
                            member.gender = Some(value.to_string());
                        }
                        other => bail!("line {line_no}: unknown attribute `{other}`"),
                    }
                }
            }
            continue;
        }

        if let Some(caps) = SPOUSE_RE.captures(line) {
            let (a, b) = (&caps[1], &caps[2]);
            graph.ensure_member(a, None);
            graph.ensure_member(b, None);
            graph
                .add_spouse(a, b)
                .with_context(|| format!("line {line_no}: `{a} + {b}`"))?;
            continue;
        }

        if let Some(caps) = DESCENT_RE.captures(line) {
            let parents = id_list(&caps[1], line_no)?;
            let children = id_list(&caps[2], line_no)?;
            for id in parents.iter().chain(&children) {
                graph.ensure_member(id, None);
            }
            for parent in &parents {
                for child in &children {
                    graph
                        .add_parent_child(parent, child)
                        .with_context(|| format!("line {line_no}: `{parent} -> {child}`"))?;
                }
            }
            continue;
        }

        bail!("line {line_no}: cannot parse `{line}`");
    }
    Ok(graph)
}

pub fn parse_document(json: &str) -> Result<FamilyGraph> {
    let doc: FamilyDocument = serde_json::from_str(json).context("invalid family document")?;
    Ok(FamilyGraph::from_document(doc))
}

/// `.json` files hold a [`FamilyDocument`]; anything else is read as notation.
pub fn load_family(path: &Path) -> Result<FamilyGraph> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    let is_json = path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
    if is_json {
        parse_document(&contents)
    } else {
        parse_family(&contents).with_context(|| format!("in {}", path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_people_and_edges() {
        let graph = parse_family(
            r#"
            # grandparents
            person gp "George Pike" born=1931-07-14 gender=male
            person gm "Gwen # Pike" gender=female
            gp + gm
            gp, gm -> dad, aunt   # two kids
            person dad "David"
            "#,
        )
        .unwrap();
        assert_eq!(graph.len(), 4);
        assert_eq!(graph.name_of("gm"), "Gwen # Pike");
        assert_eq!(graph.name_of("dad"), "David");
        assert_eq!(graph.name_of("aunt"), "aunt");
        assert_eq!(graph.get("gp").unwrap().birth_key(), Some((1931, 7, 14)));
        assert!(graph.has_spouse("gm", "gp"));
        assert_eq!(graph.parents("aunt").count(), 2);
    }

    #[test]
    fn rejects_unknown_syntax_with_line_number() {
        let err = parse_family("person a\na ~ b").unwrap_err();
        assert!(err.to_string().contains("line 2"));
    }

    #[test]
    fn rejects_bad_dates_and_attributes() {
        assert!(parse_family("person a born=1990").is_err());
        assert!(parse_family("person a hair=red").is_err());
    }

    #[test]
    fn cycles_are_reported() {
        let err = parse_family("a -> b\nb -> a").unwrap_err();
        assert!(format!("{err:#}").contains("line 2"));
    }

    #[test]
    fn strip_comment_respects_quotes() {
        assert_eq!(strip_comment(r#"person a "x#y" # note"#), r#"person a "x#y" "#);
        assert_eq!(strip_comment("a + b"), "a + b");
    }

    #[test]
    fn json_documents_load() {
        let graph = parse_document(
            r#"{
                "members": [
                    {"id": "a", "name": "Ann", "dob": "1980-01-01"},
                    {"id": "b", "name": "Ben"}
                ],
                "relationships": [
                    {"type": "spouse", "a_member_id": "a", "b_member_id": "b"}
                ]
            }"#,
        )
        .unwrap();
        assert!(graph.has_spouse("a", "b"));
        assert_eq!(graph.get("a").unwrap().birth_date.as_deref(), Some("1980-01-01"));
    }
}
