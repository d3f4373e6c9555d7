//! Deterministic naming of swarm services and the opaque per-user token.
//!
//! The token is the only form of the user identifier that ever reaches the
//! orchestrator namespace (service names, mount sources, labels).

use sha2::{Digest, Sha256};

/// Placeholder replaced by the user token inside mount sources.
pub const USERNAME_PLACEHOLDER: &str = "{username}";

/// Session suffix used when the caller runs the default (unnamed) server.
pub const DEFAULT_SESSION_SUFFIX: &str = "1";

/// Hex characters kept from the SHA-256 digest (128 bits).
pub const USER_TOKEN_LEN: usize = 32;

/// Hashes a user identifier into a lowercase hex token safe for DNS labels.
pub fn user_token(user: &str) -> String {
    let digest = Sha256::digest(user.as_bytes());
    let mut token = hex::encode(digest);
    token.truncate(USER_TOKEN_LEN);
    token
}

/// Builds `{prefix}-{token}-{session}`; an empty session becomes `"1"`.
pub fn derive_service_name(prefix: &str, user: &str, session: &str) -> String {
    let suffix = if session.is_empty() {
        DEFAULT_SESSION_SUFFIX
    } else {
        session
    };
    format!("{}-{}-{}", prefix, user_token(user), suffix)
}

/// Replaces every `{username}` in `template` with the user token.
///
/// Only mount sources and volume driver options go through here.
pub fn substitute_username(template: &str, user: &str) -> String {
    if !template.contains(USERNAME_PLACEHOLDER) {
        return template.to_string();
    }
    template.replace(USERNAME_PLACEHOLDER, &user_token(user))
}
