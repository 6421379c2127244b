//! Domain normalizer (spec.md §4.16), ported directly from
//! `original_source/src/core/domains.py`.

use regex::Regex;
use std::collections::HashMap;
use std::sync::LazyLock;

/// The fixed canonical domain set every stored memory's `domain` must
/// belong to (spec.md §8 "Canonical domain" invariant).
pub const CANONICAL_DOMAINS: [&str; 15] = [
    "general",
    "infrastructure",
    "development",
    "testing",
    "security",
    "api",
    "database",
    "frontend",
    "devops",
    "networking",
    "ai-ml",
    "tooling",
    "configuration",
    "documentation",
    "sessions",
];

static DOMAIN_ALIASES: LazyLock<HashMap<&'static str, &'static str>> = LazyLock::new(|| {
    HashMap::from([
        // infrastructure
        ("redis", "infrastructure"),
        ("docker", "infrastructure"),
        ("casaos", "infrastructure"),
        ("proxmox", "infrastructure"),
        ("homelab", "infrastructure"),
        ("linux", "infrastructure"),
        ("ubuntu", "infrastructure"),
        ("vm", "infrastructure"),
        ("container", "infrastructure"),
        ("containers", "infrastructure"),
        ("containerization", "infrastructure"),
        ("server", "infrastructure"),
        // database
        ("neo4j", "database"),
        ("qdrant", "database"),
        ("postgres", "database"),
        ("postgresql", "database"),
        ("sql", "database"),
        ("sqlite", "database"),
        ("mongodb", "database"),
        ("db", "database"),
        ("database schema", "database"),
        ("schema", "database"),
        // frontend
        ("react", "frontend"),
        ("dashboard", "frontend"),
        ("tailwind", "frontend"),
        ("css", "frontend"),
        ("ui", "frontend"),
        ("ux", "frontend"),
        ("ui/ux", "frontend"),
        ("vite", "frontend"),
        ("daisyui", "frontend"),
        ("html", "frontend"),
        ("component", "frontend"),
        ("components", "frontend"),
        ("interaction", "frontend"),
        // development
        ("python", "development"),
        ("typescript", "development"),
        ("javascript", "development"),
        ("node", "development"),
        ("nodejs", "development"),
        ("node.js", "development"),
        ("coding", "development"),
        ("programming", "development"),
        ("backend", "development"),
        ("code", "development"),
        ("refactoring", "development"),
        ("architecture", "development"),
        ("dependencies", "development"),
        // api
        ("fastapi", "api"),
        ("rest", "api"),
        ("endpoints", "api"),
        ("http", "api"),
        ("api", "api"),
        // ai-ml
        ("ollama", "ai-ml"),
        ("llm", "ai-ml"),
        ("embeddings", "ai-ml"),
        ("embedding", "ai-ml"),
        ("ai", "ai-ml"),
        ("ml", "ai-ml"),
        ("machine learning", "ai-ml"),
        ("artificial intelligence", "ai-ml"),
        ("neural", "ai-ml"),
        ("nlp", "ai-ml"),
        ("model", "ai-ml"),
        // tooling
        ("npm", "tooling"),
        ("bun", "tooling"),
        ("pip", "tooling"),
        ("ruff", "tooling"),
        ("mypy", "tooling"),
        ("tools", "tooling"),
        // devops
        ("git", "devops"),
        ("ci-cd", "devops"),
        ("ci/cd", "devops"),
        ("deployment", "devops"),
        ("deploy", "devops"),
        ("ssh", "devops"),
        ("scp", "devops"),
        ("version control", "devops"),
        ("build system", "devops"),
        // networking
        ("nginx", "networking"),
        ("dns", "networking"),
        ("vpn", "networking"),
        ("network", "networking"),
        ("cors", "networking"),
        ("proxy", "networking"),
        // security
        ("ssl", "security"),
        ("tls", "security"),
        ("auth", "security"),
        ("authentication", "security"),
        ("authorization", "security"),
        ("encryption", "security"),
        // testing
        ("pytest", "testing"),
        ("vitest", "testing"),
        ("jest", "testing"),
        ("tests", "testing"),
        ("test", "testing"),
        ("verification", "testing"),
        // configuration
        ("config", "configuration"),
        ("settings", "configuration"),
        ("env", "configuration"),
        ("environment", "configuration"),
        // documentation
        ("docs", "documentation"),
        ("readme", "documentation"),
        // sessions
        ("session", "sessions"),
        ("session-summary", "sessions"),
    ])
});

static DOMAIN_PRIORITY: LazyLock<HashMap<&'static str, i32>> = LazyLock::new(|| {
    HashMap::from([
        ("api", 1),
        ("database", 1),
        ("security", 1),
        ("ai-ml", 1),
        ("testing", 2),
        ("infrastructure", 2),
        ("frontend", 2),
        ("networking", 2),
        ("devops", 3),
        ("tooling", 3),
        ("configuration", 3),
        ("documentation", 4),
        ("sessions", 4),
        ("development", 5),
        ("general", 99),
    ])
});

static SPLIT_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[/\-_,&]+|\s+").unwrap());

/// Normalize a freeform domain string to a canonical domain.
#[must_use]
pub fn normalize_domain(raw: &str) -> String {
    let cleaned = raw.trim().to_lowercase();
    if cleaned.is_empty() {
        return "general".to_string();
    }

    if CANONICAL_DOMAINS.contains(&cleaned.as_str()) {
        return cleaned;
    }

    if let Some(mapped) = DOMAIN_ALIASES.get(cleaned.as_str()) {
        return (*mapped).to_string();
    }

    let mut candidates: Vec<&'static str> = Vec::new();
    for seg in SPLIT_RE.split(&cleaned) {
        let seg = seg.trim();
        if seg.is_empty() {
            continue;
        }
        if let Some(canonical) = CANONICAL_DOMAINS.iter().find(|d| **d == seg) {
            candidates.push(canonical);
        } else if let Some(mapped) = DOMAIN_ALIASES.get(seg) {
            candidates.push(mapped);
        }
    }

    if let Some(best) = candidates.into_iter().min_by_key(|d| DOMAIN_PRIORITY.get(d).copied().unwrap_or(50)) {
        return best.to_string();
    }

    "general".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonical_passes_through() {
        assert_eq!(normalize_domain("database"), "database");
    }

    #[test]
    fn alias_resolves() {
        assert_eq!(normalize_domain("Postgres"), "database");
        assert_eq!(normalize_domain("REDIS"), "infrastructure");
    }

    #[test]
    fn segment_priority_picks_most_specific() {
        // "api" (priority 1) beats "development" (priority 5).
        assert_eq!(normalize_domain("backend-api"), "api");
    }

    #[test]
    fn unknown_falls_back_to_general() {
        assert_eq!(normalize_domain("xyzzy"), "general");
    }

    #[test]
    fn empty_falls_back_to_general() {
        assert_eq!(normalize_domain("   "), "general");
    }
}
