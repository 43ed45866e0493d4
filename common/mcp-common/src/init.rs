//! Logging setup for stdio servers

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Initialize logging to stderr
///
/// stdout carries the MCP protocol, so everything goes to stderr. `RUST_LOG`
/// controls filtering, with `crate_name` at `info` unless overridden. Set
/// `LOG_FORMAT=json` for structured output.
///
/// Fails if a global subscriber is already installed.
pub fn init_tracing(crate_name: &str) -> anyhow::Result<()> {
    let filter = EnvFilter::from_default_env().add_directive(default_directive(crate_name).parse()?);

    let registry = tracing_subscriber::registry().with(filter);
    let layer = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);

    if json_requested(std::env::var("LOG_FORMAT").ok().as_deref()) {
        registry.with(layer.json()).try_init()?;
    } else {
        registry.with(layer.with_ansi(false)).try_init()?;
    }
    Ok(())
}

fn default_directive(crate_name: &str) -> String {
    format!("{}=info", crate_name.replace('-', "_"))
}

fn json_requested(format: Option<&str>) -> bool {
    format.is_some_and(|v| v.trim().eq_ignore_ascii_case("json"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_directive_uses_module_path() {
        assert_eq!(default_directive("evidence-search-mcp"), "evidence_search_mcp=info");
        assert_eq!(default_directive("evidence_search_mcp"), "evidence_search_mcp=info");
        assert!(default_directive("evidence-search-mcp")
            .parse::<tracing_subscriber::filter::Directive>()
            .is_ok());
    }

    #[test]
    fn test_json_requested() {
        assert!(json_requested(Some("json")));
        assert!(json_requested(Some("JSON ")));
        assert!(!json_requested(Some("text")));
        assert!(!json_requested(None));
    }
}
