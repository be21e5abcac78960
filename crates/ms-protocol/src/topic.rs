//! Topic naming
//!
//! Commands travel on `<prefix>/<suffix>` and responses on
//! `<prefix>/response/<suffix>`. The suffix is a fixed routing token shared
//! by every build. It namespaces traffic on a shared broker and is not a
//! secret; anyone on the broker can subscribe to it.

/// Routing token appended to both topics
pub const TOPIC_SUFFIX: &str = "x9vkff7p4";

/// Command and response topics derived from a configured prefix
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Topics {
    command: String,
    response: String,
}

impl Topics {
    /// Derive both topics from a prefix
    pub fn new(prefix: &str) -> Self {
        Self {
            command: format!("{}/{}", prefix, TOPIC_SUFFIX),
            response: format!("{}/response/{}", prefix, TOPIC_SUFFIX),
        }
    }

    /// Topic the server subscribes to and clients publish commands on
    pub fn command(&self) -> &str {
        &self.command
    }

    /// Topic clients subscribe to and the server publishes responses on
    pub fn response(&self) -> &str {
        &self.response
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_topics_from_prefix() {
        let topics = Topics::new("mqtt-shell");
        assert_eq!(topics.command(), "mqtt-shell/x9vkff7p4");
        assert_eq!(topics.response(), "mqtt-shell/response/x9vkff7p4");
    }

    #[test]
    fn test_nested_prefix() {
        let topics = Topics::new("site/rack-3");
        assert_eq!(topics.command(), "site/rack-3/x9vkff7p4");
        assert_eq!(topics.response(), "site/rack-3/response/x9vkff7p4");
        assert_ne!(topics.command(), topics.response());
    }
}
