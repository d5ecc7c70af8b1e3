//! Topic resolution: explicit names or a regex over broker metadata.

use std::collections::BTreeSet;

use regex::Regex;
use tracing::{info, warn};

use crate::broker::Broker;
use crate::error::{Error, Result};

/// Which topics a run reads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TopicSelector {
    /// Exactly these topics.
    Names(Vec<String>),
    /// Every existing topic whose whole name matches the regex.
    Pattern(String),
}

impl TopicSelector {
    /// Build a selector from the two mutually exclusive configuration options.
    ///
    /// Fails without touching the broker when both or neither are given.
    pub fn from_options(topics: Option<Vec<String>>, pattern: Option<String>) -> Result<Self> {
        let topics = topics.filter(|t| !t.is_empty());
        match (topics, pattern) {
            (Some(_), Some(_)) => Err(Error::InvalidConfig(
                "Specify either topics or topics_regex, not both".to_string(),
            )),
            (None, None) => Err(Error::InvalidConfig(
                "One of topics or topics_regex is required".to_string(),
            )),
            (Some(topics), None) => Ok(TopicSelector::Names(topics)),
            (None, Some(pattern)) => {
                compile(&pattern)?;
                Ok(TopicSelector::Pattern(pattern))
            }
        }
    }
}

/// Compile `pattern` so that it only matches whole topic names.
pub fn compile(pattern: &str) -> Result<Regex> {
    Ok(Regex::new(&format!("^(?:{pattern})$"))?)
}

/// Resolve a selector to a de-duplicated topic set.
///
/// Explicit names are passed through without a broker call. A pattern
/// queries metadata once; a failed query is a transport error and an empty
/// match after a successful query is a configuration error.
pub async fn resolve<B: Broker + ?Sized>(
    broker: &B,
    selector: &TopicSelector,
) -> Result<BTreeSet<String>> {
    match selector {
        TopicSelector::Names(names) => Ok(names.iter().cloned().collect()),
        TopicSelector::Pattern(pattern) => {
            let regex = compile(pattern)?;
            let metadata = broker.fetch_metadata(None).await?;
            let matched: BTreeSet<String> = metadata
                .into_keys()
                .filter(|name| regex.is_match(name))
                .collect();
            if matched.is_empty() {
                return Err(Error::NoMatchingTopics(pattern.clone()));
            }
            info!("Topics matching '{pattern}': {matched:?}");
            Ok(matched)
        }
    }
}

/// Best-effort variant of [`resolve`] for listing topics.
///
/// Any failure is logged and yields an empty set.
pub async fn discover<B: Broker + ?Sized>(broker: &B, pattern: &str) -> BTreeSet<String> {
    match resolve(broker, &TopicSelector::Pattern(pattern.to_string())).await {
        Ok(topics) => topics,
        Err(Error::NoMatchingTopics(_)) => BTreeSet::new(),
        Err(e) => {
            warn!("Topic discovery for '{pattern}' failed: {e}");
            BTreeSet::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::testing::MemoryBroker;

    fn broker_with(topics: &[&str]) -> MemoryBroker {
        let broker = MemoryBroker::new();
        for topic in topics {
            broker.create_topic(topic, 1);
        }
        broker
    }

    fn set(names: &[&str]) -> BTreeSet<String> {
        names.iter().map(|n| n.to_string()).collect()
    }

    #[test]
    fn test_selector_requires_exactly_one_option() {
        let both = TopicSelector::from_options(Some(vec!["a".into()]), Some("a.*".into()));
        assert_eq!(both.unwrap_err().kind(), ErrorKind::Configuration);

        let neither = TopicSelector::from_options(None, None);
        assert_eq!(neither.unwrap_err().kind(), ErrorKind::Configuration);

        let empty = TopicSelector::from_options(Some(vec![]), None);
        assert_eq!(empty.unwrap_err().kind(), ErrorKind::Configuration);

        let bad = TopicSelector::from_options(None, Some("(".into()));
        assert!(matches!(bad, Err(Error::InvalidPattern(_))));
    }

    #[tokio::test]
    async fn test_resolve_pattern_full_match() {
        let broker = broker_with(&["orders_v1", "orders_v2", "payments", "old_orders_v1"]);
        let selector = TopicSelector::Pattern("^orders_.*$".to_string());
        let topics = resolve(&broker, &selector).await.unwrap();
        assert_eq!(topics, set(&["orders_v1", "orders_v2"]));
    }

    #[tokio::test]
    async fn test_resolve_pattern_is_not_a_substring_search() {
        let broker = broker_with(&["orders", "orders_archive", "all_orders"]);
        let selector = TopicSelector::Pattern("orders".to_string());
        let topics = resolve(&broker, &selector).await.unwrap();
        assert_eq!(topics, set(&["orders"]));
    }

    #[tokio::test]
    async fn test_resolve_names_deduplicates_without_broker_call() {
        let broker = broker_with(&[]);
        broker.fail_metadata(true);
        let selector = TopicSelector::Names(vec!["b".into(), "a".into(), "b".into()]);
        let topics = resolve(&broker, &selector).await.unwrap();
        assert_eq!(topics, set(&["a", "b"]));
    }

    #[tokio::test]
    async fn test_resolve_zero_match_is_configuration_error() {
        let broker = broker_with(&["payments"]);
        let selector = TopicSelector::Pattern("^orders_.*$".to_string());
        let err = resolve(&broker, &selector).await.unwrap_err();
        assert!(matches!(err, Error::NoMatchingTopics(_)));
        assert_eq!(err.kind(), ErrorKind::Configuration);
    }

    #[tokio::test]
    async fn test_resolve_metadata_failure_is_transport_error() {
        let broker = broker_with(&["orders_v1"]);
        broker.fail_metadata(true);
        let selector = TopicSelector::Pattern("^orders_.*$".to_string());
        let err = resolve(&broker, &selector).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Transport);
    }

    #[tokio::test]
    async fn test_discover_is_opportunistic() {
        let broker = broker_with(&["orders_v1", "payments"]);
        assert_eq!(discover(&broker, "orders_.*").await, set(&["orders_v1"]));
        assert!(discover(&broker, "nothing").await.is_empty());

        broker.fail_metadata(true);
        assert!(discover(&broker, "orders_.*").await.is_empty());
    }
}
