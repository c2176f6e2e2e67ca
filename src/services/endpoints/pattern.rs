//! URL pattern matching for registered endpoints.
//!
//! A pattern is a `/`-delimited list of segments. A segment wrapped in `{` and `}`
//! is a placeholder and matches any single path segment; every other segment must
//! be byte-equal. No normalization is applied (trailing slashes are significant).

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Placeholder(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UrlPattern {
    raw: String,
    segments: Vec<Segment>,
}

impl UrlPattern {
    pub fn parse(raw: &str) -> Self {
        let segments = raw
            .split('/')
            .map(|s| {
                if is_placeholder(s) {
                    Segment::Placeholder(s[1..s.len() - 1].to_string())
                } else {
                    Segment::Literal(s.to_string())
                }
            })
            .collect();

        Self {
            raw: raw.to_string(),
            segments,
        }
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Names of the placeholder segments, in order.
    pub fn placeholders(&self) -> impl Iterator<Item = &str> {
        self.segments.iter().filter_map(|s| match s {
            Segment::Placeholder(name) => Some(name.as_str()),
            Segment::Literal(_) => None,
        })
    }

    /// First segment this matcher and axum's router would read differently:
    /// catch-alls (`{*rest}`), empty placeholders and stray braces.
    pub fn unsupported_segment(&self) -> Option<&str> {
        self.segments.iter().find_map(|s| match s {
            Segment::Placeholder(name)
                if name.is_empty() || name.starts_with('*') || name.contains(['{', '}']) =>
            {
                Some(name.as_str())
            }
            Segment::Literal(lit) if lit.contains(['{', '}']) => Some(lit.as_str()),
            _ => None,
        })
    }

    /// Placeholder names that sit at the same position after an identical prefix.
    /// One router cannot hold both patterns.
    pub fn placeholder_conflict<'a>(&'a self, other: &'a UrlPattern) -> Option<(&'a str, &'a str)> {
        for (a, b) in self.segments.iter().zip(&other.segments) {
            match (a, b) {
                (Segment::Placeholder(x), Segment::Placeholder(y)) if x != y => {
                    return Some((x.as_str(), y.as_str()));
                }
                (Segment::Placeholder(_), Segment::Placeholder(_)) => {}
                (Segment::Literal(x), Segment::Literal(y)) if x == y => {}
                _ => return None,
            }
        }
        None
    }

    pub fn matches(&self, path: &str) -> bool {
        // static routes: cheap path
        if path == self.raw {
            return true;
        }

        let mut candidate = path.split('/');
        let mut count = 0usize;

        for segment in &self.segments {
            let Some(part) = candidate.next() else {
                return false;
            };
            count += 1;

            if let Segment::Literal(lit) = segment
                && lit != part
            {
                return false;
            }
        }

        candidate.next().is_none() && count == self.segments.len()
    }
}

fn is_placeholder(segment: &str) -> bool {
    segment.len() >= 2 && segment.starts_with('{') && segment.ends_with('}')
}
