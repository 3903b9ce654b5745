//! User-Agent string sent with every request.

/// Project URL advertised in the User-Agent (RFC 9308 good citizenship).
const PROJECT_UA_URL: &str = "https://github.com/fierce/webget";

/// Default User-Agent for fetches (identifies the tool and its version).
#[must_use]
pub(crate) fn default_user_agent() -> String {
    let version = env!("CARGO_PKG_VERSION");
    format!("webget/{version} (+{PROJECT_UA_URL})")
}
