/// One `(type, id)` step of a resource's hierarchical full name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathSegment {
    pub resource_type: String,
    pub resource_id: String,
}

impl PathSegment {
    #[must_use]
    pub fn new(resource_type: impl Into<String>, resource_id: impl Into<String>) -> Self {
        Self {
            resource_type: resource_type.into(),
            resource_id: resource_id.into(),
        }
    }
}

/// The decomposed form of a hierarchical resource full name.
///
/// A full name is a `/`-delimited sequence of `type/id` pairs, root first,
/// conventionally with a trailing slash:
/// `organization/123/project/my-proj/firewall/456/`.
///
/// Segments are stored **leaf first**; tree matching reverses them back to
/// root-first order before walking.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResourcePath {
    segments: Vec<PathSegment>,
}

impl ResourcePath {
    /// Decompose a full name into its `(type, id)` segments.
    ///
    /// An odd trailing fragment at the root end (a type with no id) is
    /// dropped rather than reported, matching the tolerance of the
    /// inventory formats this consumes.
    #[must_use]
    pub fn parse(full_name: &str) -> Self {
        let trimmed = full_name.trim_end_matches('/');
        if trimmed.is_empty() {
            return Self::default();
        }
        let parts: Vec<&str> = trimmed.split('/').collect();
        let mut segments = Vec::with_capacity(parts.len() / 2);
        for chunk in parts.rchunks(2) {
            if let [resource_type, resource_id] = chunk {
                segments.push(PathSegment::new(*resource_type, *resource_id));
            }
        }
        Self { segments }
    }

    /// The segments in leaf-first order.
    #[must_use]
    pub fn segments(&self) -> &[PathSegment] {
        &self.segments
    }

    /// The segments in root-first order.
    #[must_use]
    pub fn root_first(&self) -> Vec<&PathSegment> {
        self.segments.iter().rev().collect()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.segments.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_simple_full_name() {
        let path = ResourcePath::parse("organization/123/project/my-proj/");
        assert_eq!(
            path.segments(),
            &[
                PathSegment::new("project", "my-proj"),
                PathSegment::new("organization", "123"),
            ]
        );
    }

    #[test]
    fn root_first_reverses() {
        let path = ResourcePath::parse("organization/123/project/my-proj/");
        let root_first = path.root_first();
        assert_eq!(root_first[0], &PathSegment::new("organization", "123"));
        assert_eq!(root_first[1], &PathSegment::new("project", "my-proj"));
    }

    #[test]
    fn parse_without_trailing_slash() {
        let path = ResourcePath::parse("organization/123/project/my-proj");
        assert_eq!(path.len(), 2);
    }

    #[test]
    fn parse_three_levels() {
        let path = ResourcePath::parse("organization/88888/project/myproject/firewall/99999/");
        assert_eq!(
            path.root_first(),
            vec![
                &PathSegment::new("organization", "88888"),
                &PathSegment::new("project", "myproject"),
                &PathSegment::new("firewall", "99999"),
            ]
        );
    }

    #[test]
    fn odd_root_fragment_is_dropped() {
        let path = ResourcePath::parse("dangling/organization/123/");
        assert_eq!(path.segments(), &[PathSegment::new("organization", "123")]);
    }

    #[test]
    fn empty_full_name() {
        assert!(ResourcePath::parse("").is_empty());
        assert!(ResourcePath::parse("/").is_empty());
    }

    #[test]
    fn single_pair() {
        let path = ResourcePath::parse("bucket/my-bucket/");
        assert_eq!(path.segments(), &[PathSegment::new("bucket", "my-bucket")]);
    }
}
