//! Filter engine: name globs and exact tags, include/exclude.
//!
//! Pure and deterministic: equal inputs produce equal outputs and equal
//! reason strings. Reasons are logged, never served over HTTP.

use glob::Pattern;
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::config::{FilterConfig, FilterRules};
use crate::registry::{Server, ServerRegistry};

/// Outcome for one server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterDecision {
    pub name: String,
    pub included: bool,
    pub reason: String,
}

/// The filtered snapshot plus the per-server decision trail.
#[derive(Debug, Clone)]
pub struct FilterOutcome {
    pub registry: ServerRegistry,
    pub decisions: Vec<FilterDecision>,
}

/// Apply a filter to a registry, producing a new registry that keeps the
/// source's insertion order.
pub fn apply(registry: &ServerRegistry, filter: &FilterConfig) -> FilterOutcome {
    let mut servers = Vec::with_capacity(registry.servers.len());
    let mut decisions = Vec::with_capacity(registry.servers.len());

    for server in &registry.servers {
        let decision = decide(server, filter);
        debug!(
            "[Filter] {}: included={} ({})",
            decision.name, decision.included, decision.reason
        );
        if decision.included {
            servers.push(server.clone());
        }
        decisions.push(decision);
    }

    FilterOutcome {
        registry: ServerRegistry {
            schema_version: registry.schema_version.clone(),
            last_updated: registry.last_updated,
            servers,
        },
        decisions,
    }
}

/// Decide inclusion for a single server. Both the name rule and the tag
/// rule must pass; exclude beats include within each rule.
pub fn decide(server: &Server, filter: &FilterConfig) -> FilterDecision {
    let name = server.name.clone();

    match name_rule(&server.name, &filter.names) {
        Ok(None) => {}
        Ok(Some(reason)) | Err(reason) => {
            return FilterDecision {
                name,
                included: false,
                reason,
            }
        }
    }

    match tag_rule(&server.tags, &filter.tags) {
        None => {}
        Some(reason) => {
            return FilterDecision {
                name,
                included: false,
                reason,
            }
        }
    }

    FilterDecision {
        name,
        included: true,
        reason: "passed name and tag rules".to_string(),
    }
}

/// Name rule. `Ok(None)` = pass, `Ok(Some(reason))` = excluded,
/// `Err(reason)` = excluded because a pattern failed to compile.
fn name_rule(name: &str, rules: &FilterRules) -> Result<Option<String>, String> {
    // Exclude first: it wins regardless of any include match.
    for raw in &rules.exclude {
        let pattern = Pattern::new(raw)
            .map_err(|e| format!("invalid exclude pattern {raw:?}: {e}"))?;
        if pattern.matches(name) {
            return Ok(Some(format!("name matches exclude pattern {raw:?}")));
        }
    }

    if !rules.include.is_empty() {
        let mut matched = false;
        for raw in &rules.include {
            let pattern = Pattern::new(raw)
                .map_err(|e| format!("invalid include pattern {raw:?}: {e}"))?;
            if pattern.matches(name) {
                matched = true;
                break;
            }
        }
        if !matched {
            return Ok(Some("name matches no include pattern".to_string()));
        }
    }

    Ok(None)
}

/// Tag rule: exact string matches. `None` = pass.
fn tag_rule(tags: &[String], rules: &FilterRules) -> Option<String> {
    for tag in &rules.exclude {
        if tags.iter().any(|t| t == tag) {
            return Some(format!("tag {tag:?} is excluded"));
        }
    }

    if !rules.include.is_empty() {
        let matched = rules.include.iter().any(|tag| tags.iter().any(|t| t == tag));
        if !matched {
            return Some("no tag matches the include list".to_string());
        }
    }

    None
}

/// Hash of the canonical filter serialization: sorted pattern lists,
/// fixed key order, no insignificant whitespace. Reordering rules in the
/// config file does not change the hash.
pub fn filter_hash(filter: Option<&FilterConfig>) -> String {
    let canonical = match filter {
        Some(f) => {
            let sorted = |list: &[String]| {
                let mut v = list.to_vec();
                v.sort();
                v
            };
            serde_json::json!({
                "names": {
                    "exclude": sorted(&f.names.exclude),
                    "include": sorted(&f.names.include),
                },
                "tags": {
                    "exclude": sorted(&f.tags.exclude),
                    "include": sorted(&f.tags.include),
                },
            })
        }
        None => serde_json::json!(null),
    };
    let serialized = canonical.to_string();
    hex::encode(Sha256::digest(serialized.as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn server(name: &str, tags: &[&str]) -> Server {
        Server {
            name: name.to_string(),
            description: String::new(),
            tags: tags.iter().map(|t| t.to_string()).collect(),
            version: "1.0.0".to_string(),
            packages: vec![],
            remotes: vec![crate::registry::RemoteEndpoint {
                url: "https://example.com".to_string(),
                transport: Default::default(),
                headers: vec![],
            }],
            meta: None,
        }
    }

    fn registry(servers: Vec<Server>) -> ServerRegistry {
        ServerRegistry::new(Utc::now(), servers)
    }

    fn names_filter(include: &[&str], exclude: &[&str]) -> FilterConfig {
        FilterConfig {
            names: FilterRules {
                include: include.iter().map(|s| s.to_string()).collect(),
                exclude: exclude.iter().map(|s| s.to_string()).collect(),
            },
            tags: FilterRules::default(),
        }
    }

    #[test]
    fn test_exclude_wins_over_include() {
        let filter = names_filter(&["postgres-*"], &["*-experimental"]);
        let reg = registry(vec![
            server("postgres-stable", &[]),
            server("postgres-experimental", &[]),
            server("redis-stable", &[]),
        ]);
        let outcome = apply(&reg, &filter);
        let names: Vec<&str> = outcome
            .registry
            .servers
            .iter()
            .map(|s| s.name.as_str())
            .collect();
        assert_eq!(names, vec!["postgres-stable"]);
        assert!(outcome.decisions[1]
            .reason
            .contains("exclude pattern"));
    }

    #[test]
    fn test_invalid_include_pattern_excludes_everything() {
        let filter = names_filter(&["["], &[]);
        let reg = registry(vec![server("a", &[]), server("b", &[])]);
        let outcome = apply(&reg, &filter);
        assert!(outcome.registry.is_empty());
        for decision in &outcome.decisions {
            assert!(!decision.included);
            assert!(decision.reason.contains("invalid include pattern"));
        }
    }

    #[test]
    fn test_empty_include_matches_all() {
        let filter = FilterConfig::default();
        let reg = registry(vec![server("a", &[]), server("b", &[])]);
        let outcome = apply(&reg, &filter);
        assert_eq!(outcome.registry.len(), 2);
    }

    #[test]
    fn test_tag_rules_exact_match() {
        let filter = FilterConfig {
            names: FilterRules::default(),
            tags: FilterRules {
                include: vec!["database".to_string()],
                exclude: vec!["deprecated".to_string()],
            },
        };
        let reg = registry(vec![
            server("kept", &["database"]),
            server("wrong-tag", &["databases"]),
            server("excluded", &["database", "deprecated"]),
            server("untagged", &[]),
        ]);
        let outcome = apply(&reg, &filter);
        let names: Vec<&str> = outcome
            .registry
            .servers
            .iter()
            .map(|s| s.name.as_str())
            .collect();
        assert_eq!(names, vec!["kept"]);
    }

    #[test]
    fn test_filter_is_idempotent() {
        let filter = names_filter(&["p-*"], &["p-old*"]);
        let reg = registry(vec![
            server("p-new", &[]),
            server("p-old-1", &[]),
            server("q", &[]),
        ]);
        let once = apply(&reg, &filter);
        let twice = apply(&once.registry, &filter);
        assert_eq!(once.registry, twice.registry);
    }

    #[test]
    fn test_deterministic_reasons() {
        let filter = names_filter(&["x-*"], &[]);
        let reg = registry(vec![server("y", &[])]);
        let first = apply(&reg, &filter);
        let second = apply(&reg, &filter);
        assert_eq!(first.decisions, second.decisions);
    }

    #[test]
    fn test_both_rules_must_pass() {
        let filter = FilterConfig {
            names: FilterRules {
                include: vec!["db-*".to_string()],
                exclude: vec![],
            },
            tags: FilterRules {
                include: vec!["stable".to_string()],
                exclude: vec![],
            },
        };
        let reg = registry(vec![
            server("db-postgres", &["stable"]),
            server("db-redis", &["beta"]),
            server("cache-redis", &["stable"]),
        ]);
        let outcome = apply(&reg, &filter);
        let names: Vec<&str> = outcome
            .registry
            .servers
            .iter()
            .map(|s| s.name.as_str())
            .collect();
        assert_eq!(names, vec!["db-postgres"]);
    }

    #[test]
    fn test_question_mark_and_character_class_globs() {
        let filter = names_filter(&["tool-?", "srv-[ab]"], &[]);
        let reg = registry(vec![
            server("tool-1", &[]),
            server("tool-10", &[]),
            server("srv-a", &[]),
            server("srv-c", &[]),
        ]);
        let outcome = apply(&reg, &filter);
        let names: Vec<&str> = outcome
            .registry
            .servers
            .iter()
            .map(|s| s.name.as_str())
            .collect();
        assert_eq!(names, vec!["tool-1", "srv-a"]);
    }

    #[test]
    fn test_filter_hash_ignores_ordering() {
        let a = names_filter(&["b", "a"], &["z", "y"]);
        let b = names_filter(&["a", "b"], &["y", "z"]);
        assert_eq!(filter_hash(Some(&a)), filter_hash(Some(&b)));
    }

    #[test]
    fn test_filter_hash_differs_on_content() {
        let a = names_filter(&["a"], &[]);
        let b = names_filter(&["b"], &[]);
        assert_ne!(filter_hash(Some(&a)), filter_hash(Some(&b)));
        assert_ne!(filter_hash(Some(&a)), filter_hash(None));
    }
}
