/// An MQTT topic name, matched against subscribed filters at publish time.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Topic {
    pub name: String,
}

impl Topic {
    /// Build a new topic, assuming the name is valid. Every topic this
    /// broker classifies already passed `topic_grammar::Route::classify`,
    /// so there is no second validation step here.
    pub fn new_unchecked(name: &str) -> Topic {
        Topic { name: name.to_string() }
    }
}

/// A single MQTT subscription filter, QoS 0 only (`spec.md` §4.3).
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct TopicFilter {
    pub patterns: Vec<String>,
}

impl TopicFilter {
    /// Build a new topic filter, assuming the pattern is valid.
    pub fn new_unchecked(pattern: &str) -> TopicFilter {
        TopicFilter {
            patterns: vec![pattern.to_string()],
        }
    }

    /// Check if the given topic matches this filter's pattern.
    pub fn accept_topic(&self, topic: &Topic) -> bool {
        self.patterns
            .iter()
            .any(|pattern| rumqttc::matches(&topic.name, pattern))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accept_topic_matches_single_level_wildcard() {
        let filter = TopicFilter::new_unchecked("device/+/r");
        assert!(filter.accept_topic(&Topic::new_unchecked("device/cid-1/r")));
        assert!(!filter.accept_topic(&Topic::new_unchecked("device/cid-1/s")));
    }

    #[test]
    fn accept_topic_matches_exact_pattern_only() {
        let filter = TopicFilter::new_unchecked("group/alerts/r");
        assert!(filter.accept_topic(&Topic::new_unchecked("group/alerts/r")));
        assert!(!filter.accept_topic(&Topic::new_unchecked("group/other/r")));
    }
}
