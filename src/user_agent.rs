//! User-Agent string sent by the crawler and the downloader.

const PROJECT_UA_URL: &str = "https://github.com/fierce/harvester";

/// Default User-Agent for page and file requests (identifies the tool).
#[must_use]
pub(crate) fn default_user_agent() -> String {
    let version = env!("CARGO_PKG_VERSION");
    format!("harvester/{version} (+{PROJECT_UA_URL})")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_agent_names_tool_and_version() {
        let ua = default_user_agent();
        assert!(ua.starts_with("harvester/"), "unexpected UA: {ua}");
        assert!(ua.contains(env!("CARGO_PKG_VERSION")));
        assert!(ua.contains(PROJECT_UA_URL));
    }
}
