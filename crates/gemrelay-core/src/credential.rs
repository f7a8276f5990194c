//! Per-request credential resolution

/// Where the key used for a request came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialSource {
    Caller,
    Fallback,
}

impl std::fmt::Display for CredentialSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Caller => write!(f, "caller"),
            Self::Fallback => write!(f, "fallback"),
        }
    }
}

/// An API key plus its source. The key itself never appears in `Debug` output.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential {
    key: String,
    source: CredentialSource,
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credential")
            .field("key", &"[REDACTED]")
            .field("source", &self.source)
            .finish()
    }
}

impl Credential {
    pub fn new(key: impl Into<String>, source: CredentialSource) -> Self {
        Self {
            key: key.into(),
            source,
        }
    }

    /// Pick the caller's key when it is non-blank, otherwise the fallback key.
    /// Returns `None` when neither is usable.
    pub fn resolve(caller_key: Option<&str>, fallback_key: Option<&str>) -> Option<Self> {
        fn usable(k: Option<&str>) -> Option<&str> {
            k.map(str::trim).filter(|k| !k.is_empty())
        }

        if let Some(key) = usable(caller_key) {
            return Some(Self::new(key, CredentialSource::Caller));
        }
        usable(fallback_key).map(|key| Self::new(key, CredentialSource::Fallback))
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn source(&self) -> CredentialSource {
        self.source
    }
}
