//! Physical -> logical channel names.

/// Strips the store's key prefix from stream names reported by the store.
#[derive(Debug, Clone, Default)]
pub struct ChannelNormalizer {
    prefix: String,
}

impl ChannelNormalizer {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    /// Remove the prefix once from the front of `physical`, if present.
    /// The prefix is matched literally.
    pub fn normalize<'a>(&self, physical: &'a str) -> &'a str {
        physical.strip_prefix(self.prefix.as_str()).unwrap_or(physical)
    }
}
