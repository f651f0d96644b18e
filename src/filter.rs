use std::collections::HashSet;

/// Predicate over record metadata.
///
/// All dimensions are optional and combine with AND. Time bounds are
/// inclusive on both ends.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecordFilter {
    topics: Option<HashSet<String>>,
    start_ns: Option<i64>,
    end_ns: Option<i64>,
}

impl RecordFilter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Keep only records on one of `topics`. An empty set matches nothing.
    pub fn topics<I, S>(mut self, topics: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.topics = Some(topics.into_iter().map(Into::into).collect());
        self
    }

    pub fn topic(mut self, topic: impl Into<String>) -> Self {
        self.topics
            .get_or_insert_with(HashSet::new)
            .insert(topic.into());
        self
    }

    pub fn start_ns(mut self, start_ns: i64) -> Self {
        self.start_ns = Some(start_ns);
        self
    }

    pub fn end_ns(mut self, end_ns: i64) -> Self {
        self.end_ns = Some(end_ns);
        self
    }

    pub fn time_range(self, start_ns: i64, end_ns: i64) -> Self {
        self.start_ns(start_ns).end_ns(end_ns)
    }

    pub fn topic_set(&self) -> Option<&HashSet<String>> {
        self.topics.as_ref()
    }

    pub fn bounds(&self) -> (Option<i64>, Option<i64>) {
        (self.start_ns, self.end_ns)
    }

    pub fn is_unbounded(&self) -> bool {
        self.topics.is_none() && self.start_ns.is_none() && self.end_ns.is_none()
    }

    pub fn matches(&self, topic: &str, time_ns: i64) -> bool {
        if let Some(topics) = &self.topics {
            if !topics.contains(topic) {
                return false;
            }
        }
        if self.start_ns.is_some_and(|start| time_ns < start) {
            return false;
        }
        if self.end_ns.is_some_and(|end| time_ns > end) {
            return false;
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_matches_everything() {
        let filter = RecordFilter::new();
        assert!(filter.is_unbounded());
        assert!(filter.matches("/any", i64::MIN));
        assert!(filter.matches("/any", i64::MAX));
    }

    #[test]
    fn topic_membership() {
        let filter = RecordFilter::new().topics(["/a", "/b"]);
        assert!(filter.matches("/a", 0));
        assert!(filter.matches("/b", 0));
        assert!(!filter.matches("/c", 0));

        let none = RecordFilter::new().topics(Vec::<String>::new());
        assert!(!none.matches("/a", 0));
    }

    #[test]
    fn bounds_are_inclusive() {
        let filter = RecordFilter::new().time_range(10, 20);
        assert!(!filter.matches("/a", 9));
        assert!(filter.matches("/a", 10));
        assert!(filter.matches("/a", 20));
        assert!(!filter.matches("/a", 21));
    }

    #[test]
    fn dimensions_combine_with_and() {
        let filter = RecordFilter::new().topic("/a").start_ns(5);
        assert!(filter.matches("/a", 5));
        assert!(!filter.matches("/a", 4));
        assert!(!filter.matches("/b", 6));
    }
}
