// =============================================================================
// universe.rs — WHO WE FETCH FOR
// =============================================================================
//
// A universe file maps the entity we care about (ticker or fund id) to the
// identifier the filing repository uses for it:
//
//   { "ACME": "0000012345", "7203": "E02144", "BRK": 1067983 }
//
// Numeric source ids are accepted and rendered as written. The CLI may narrow
// the universe to a handful of entities; names it does not recognize are
// reported and skipped. A universe that ends up empty is fatal to the run.
// =============================================================================

use serde_json::{Map, Value};
use std::path::Path;
use tracing::{info, warn};

use crate::error::{IngestError, Result};
use crate::models::Entity;

/// Load a universe file, optionally narrowed to `overrides`.
///
/// Without overrides the entities come back sorted by id. With overrides they
/// come back in override order, deduplicated.
pub fn load_universe(path: &Path, overrides: Option<&[String]>) -> Result<Vec<Entity>> {
    let raw = std::fs::read_to_string(path).map_err(|e| {
        IngestError::UniverseUnavailable(format!("cannot read {}: {e}", path.display()))
    })?;
    let mapping: Map<String, Value> = serde_json::from_str(&raw).map_err(|e| {
        IngestError::UniverseUnavailable(format!("{} is not a JSON object: {e}", path.display()))
    })?;

    let mut universe: Vec<Entity> = Vec::with_capacity(mapping.len());
    for (entity_id, value) in &mapping {
        match source_id(value) {
            Some(source) => universe.push(Entity::new(entity_id.trim(), source)),
            None => warn!(entity = %entity_id, "Universe entry has no usable source id, skipping"),
        }
    }
    universe.sort_by(|a, b| a.entity_id.cmp(&b.entity_id));

    let selected = match overrides {
        None => universe,
        Some(wanted) => narrow(&universe, wanted),
    };

    if selected.is_empty() {
        return Err(IngestError::UniverseUnavailable(format!(
            "no entities selected from {}",
            path.display()
        )));
    }

    info!(
        path = %path.display(),
        entities = selected.len(),
        available = mapping.len(),
        "Universe loaded"
    );
    Ok(selected)
}

/// Split a comma-separated CLI list into trimmed, non-empty ids.
pub fn parse_override_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn source_id(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn narrow(universe: &[Entity], wanted: &[String]) -> Vec<Entity> {
    let mut selected: Vec<Entity> = Vec::new();
    for id in wanted {
        let id = id.trim();
        let found = universe
            .iter()
            .find(|e| e.entity_id == id)
            .or_else(|| universe.iter().find(|e| e.entity_id.eq_ignore_ascii_case(id)));
        match found {
            Some(entity) if !selected.contains(entity) => selected.push(entity.clone()),
            Some(_) => {}
            None => warn!(entity = %id, "Requested entity is not in the universe, skipping"),
        }
    }
    selected
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn write_universe(contents: &str) -> (tempfile::TempDir, std::path::PathBuf) {
        let dir = tempdir().unwrap();
        let path = dir.path().join("activist.json");
        std::fs::write(&path, contents).unwrap();
        (dir, path)
    }

    #[test]
    fn test_full_universe_is_sorted() {
        let (_dir, path) = write_universe(r#"{"ZETA": "0000000009", "ACME": 12345, "BLANK": ""}"#);
        let universe = load_universe(&path, None).unwrap();
        assert_eq!(
            universe,
            vec![Entity::new("ACME", "12345"), Entity::new("ZETA", "0000000009")]
        );
    }

    #[test]
    fn test_overrides_keep_order_and_skip_unknowns() {
        let (_dir, path) =
            write_universe(r#"{"ACME": "1", "BETA": "2", "GAMA": "3"}"#);
        let wanted = vec!["gama".to_string(), "NOPE".to_string(), "ACME".to_string(), "ACME".to_string()];
        let universe = load_universe(&path, Some(wanted.as_slice())).unwrap();
        assert_eq!(universe, vec![Entity::new("GAMA", "3"), Entity::new("ACME", "1")]);
    }

    #[test]
    fn test_missing_or_empty_universe_is_unavailable() {
        let dir = tempdir().unwrap();
        let missing = load_universe(&dir.path().join("nope.json"), None);
        assert!(matches!(missing, Err(IngestError::UniverseUnavailable(_))));

        let (_dir, path) = write_universe(r#"{"ACME": "1"}"#);
        let filtered = load_universe(&path, Some(&["OTHER".to_string()][..]));
        assert!(matches!(filtered, Err(IngestError::UniverseUnavailable(_))));

        let (_dir, path) = write_universe("[1, 2, 3]");
        assert!(matches!(load_universe(&path, None), Err(IngestError::UniverseUnavailable(_))));
    }

    #[test]
    fn test_parse_override_list() {
        assert_eq!(parse_override_list(" ACME, ,BETA ,"), vec!["ACME", "BETA"]);
    }
}
