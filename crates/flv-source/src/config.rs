use std::fmt::Display;

/// Upper bound of samples a track holds ahead of requests.
pub const MAX_SAMPLE_QUEUE_DEPTH: usize = 4;

#[derive(Debug, Clone)]
pub struct SourceConfig {
    /// Samples each track buffers ahead of requests, 1 to 4
    pub sample_queue_depth: usize,

    /// Maximum number of tags header discovery looks at (None = until ready)
    pub discovery_tag_limit: Option<usize>,

    /// Fail open when no onMetaData tag precedes the media tags
    pub require_metadata: bool,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            sample_queue_depth: MAX_SAMPLE_QUEUE_DEPTH,
            discovery_tag_limit: None,
            require_metadata: false,
        }
    }
}

impl Display for SourceConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let limit_display = match self.discovery_tag_limit {
            Some(limit) => format!("{limit} tags"),
            None => "unlimited".to_string(),
        };

        write!(
            f,
            "SourceConfig {{ sample_queue_depth: {}, discovery_tag_limit: {}, \
             require_metadata: {} }}",
            self.sample_queue_depth, limit_display, self.require_metadata
        )
    }
}

impl SourceConfig {
    pub fn builder() -> SourceConfigBuilder {
        SourceConfigBuilder::default()
    }
}

#[derive(Debug, Clone, Default)]
pub struct SourceConfigBuilder {
    config: SourceConfig,
}

impl SourceConfigBuilder {
    /// Clamped to 1..=4.
    pub fn sample_queue_depth(mut self, depth: usize) -> Self {
        self.config.sample_queue_depth = depth.clamp(1, MAX_SAMPLE_QUEUE_DEPTH);
        self
    }

    pub fn discovery_tag_limit(mut self, limit: usize) -> Self {
        self.config.discovery_tag_limit = Some(limit);
        self
    }

    pub fn require_metadata(mut self, require: bool) -> Self {
        self.config.require_metadata = require;
        self
    }

    pub fn build(self) -> SourceConfig {
        self.config
    }
}
