//! Stateless tool-to-service routing. A fixed prefix table; unknown tools
//! default to the knowledge service rather than failing, since the Gateway
//! will reject an unroutable service id anyway.

const PREFIX_TABLE: &[(&str, &str)] = &[
    ("rag_", "knowledge"),
    ("web_search", "web_search"),
    ("git_", "repo_ops"),
];

const EXACT_TABLE: &[(&str, &str)] = &[
    ("execute_python", "sandbox"),
    ("execute_bash", "sandbox"),
    ("vision_analysis", "vision"),
    ("file_analysis", "file_extraction"),
];

pub struct Router;

impl Router {
    /// Resolves `tool` to a service id, defaulting to `"knowledge"` for
    /// anything the table doesn't recognize.
    #[must_use]
    pub fn resolve_service(tool: &str) -> &'static str {
        if let Some((_, service)) = EXACT_TABLE.iter().find(|(t, _)| *t == tool) {
            return service;
        }
        if let Some((_, service)) = PREFIX_TABLE.iter().find(|(prefix, _)| tool.starts_with(prefix)) {
            return service;
        }
        "knowledge"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn routes_rag_tools_to_knowledge() {
        assert_eq!(Router::resolve_service("rag_search_multiple"), "knowledge");
    }

    #[test]
    fn routes_execution_tools_to_sandbox() {
        assert_eq!(Router::resolve_service("execute_python"), "sandbox");
        assert_eq!(Router::resolve_service("execute_bash"), "sandbox");
    }

    #[test]
    fn routes_web_search_variants() {
        assert_eq!(Router::resolve_service("web_search_news"), "web_search");
    }

    #[test]
    fn unknown_tool_defaults_to_knowledge() {
        assert_eq!(Router::resolve_service("something_unheard_of"), "knowledge");
    }
}
