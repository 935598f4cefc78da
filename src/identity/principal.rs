use serde::{Deserialize, Serialize};

/// Externally verified (identifier, display name) pair from the ORCID
/// provider. Never self-asserted by the client beyond the initial exchange.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Identity {
    pub orcid: String,
    /// Provider-supplied display name; empty when the user has marked their
    /// name private, which callers must surface as an explicit notice.
    #[serde(default)]
    pub name: String,
}

impl Identity {
    pub fn new(orcid: impl Into<String>, name: impl Into<String>) -> Self {
        Self { orcid: orcid.into(), name: name.into() }
    }

    pub fn name_is_private(&self) -> bool {
        self.name.is_empty()
    }
}
