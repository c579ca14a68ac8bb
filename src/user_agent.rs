//! Shared User-Agent strings for catalog, resolver, and download HTTP clients.
//!
//! Single source for project URL and UA format so scrape and download traffic
//! stay consistent and easy to update (good citizenship; RFC 9308).

/// Project URL for User-Agent identification (good citizenship; RFC 9308).
const PROJECT_UA_URL: &str = "https://github.com/nicksrandall/Harvester";

/// Default User-Agent for catalog and download requests (identifies the tool).
#[must_use]
pub(crate) fn default_harvest_user_agent() -> String {
    let version = env!("CARGO_PKG_VERSION");
    format!("harvester/{version} (archival-research-tool; +{PROJECT_UA_URL})")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ua_contains_project_url_and_version() {
        let ua = default_harvest_user_agent();
        assert!(ua.contains(PROJECT_UA_URL), "UA must contain project URL");
        assert_eq!(
            env!("CARGO_PKG_VERSION"),
            ua.strip_prefix("harvester/")
                .and_then(|s| s.split(' ').next())
                .expect("UA has version"),
            "UA must contain crate version"
        );
    }

    #[test]
    fn test_ua_identifies_purpose() {
        let ua = default_harvest_user_agent();
        assert!(
            ua.contains("archival-research-tool"),
            "UA must identify as archival-research-tool: {ua}"
        );
    }
}
