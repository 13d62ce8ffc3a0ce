use std::collections::HashMap;

/// Client-side credential store collaborator.
///
/// Lookups never fail; a missing key is `None` and the caller degrades to an
/// empty credential.
pub trait CredentialStore: Send + Sync {
    /// Returns the stored value for `key`, if any.
    fn get(&self, key: &str) -> Option<String>;
}

/// Store with no credentials; every lookup is absent.
#[derive(Debug, Default)]
pub struct NoCredentials;

impl CredentialStore for NoCredentials {
    fn get(&self, _key: &str) -> Option<String> {
        None
    }
}

/// Key under which the shared-token → credential map is stored.
pub(crate) const TOKEN_STORE_KEY: &str = "token";

/// Extracts the shared token from a share URL path (its last non-empty
/// segment).
pub fn shared_token_from_path(path: &str) -> Option<&str> {
    path.rsplit('/').find(|segment| !segment.is_empty())
}

/// Resolves the bearer credential for a public endpoint.
///
/// The store holds a JSON map of shared-token → credential under
/// [`TOKEN_STORE_KEY`]. Absence of the entry, a malformed map, or an unknown
/// shared token all degrade to the empty credential rather than failing the
/// request.
pub(crate) fn bearer_credential(store: &dyn CredentialStore, shared_token: &str) -> String {
    let Some(raw) = store.get(TOKEN_STORE_KEY) else {
        return String::new();
    };
    match serde_json::from_str::<HashMap<String, String>>(&raw) {
        Ok(map) => map.get(shared_token).cloned().unwrap_or_default(),
        Err(_) => String::new(),
    }
}
