//! Relationship declarations: links, has-many chains, has-a and is-a entries.

use std::fmt;

/// One hop of a relationship: a model, optionally pinned to a column (`Model.column`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Link {
    pub model: String,
    pub column: Option<String>,
}

impl Link {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            column: None,
        }
    }

    /// Parse `Model` or `Model.column`.
    pub fn parse(text: &str) -> Self {
        match text.split_once('.') {
            Some((model, column)) => Self {
                model: model.to_string(),
                column: Some(column.to_string()),
            },
            None => Self::new(text),
        }
    }
}

impl fmt::Display for Link {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.column {
            Some(column) => write!(f, "{}.{column}", self.model),
            None => f.write_str(&self.model),
        }
    }
}

/// A has-many chain: zero or more link tables followed by the target model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chain {
    pub links: Vec<Link>,
    /// Recursion cap; defaults to the number of links.
    pub depth: Option<u32>,
}

impl Chain {
    /// Parse link specs. A trailing all-digit element is the recursion cap.
    pub fn parse<I, S>(specs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut links: Vec<String> = specs.into_iter().map(|s| s.as_ref().to_string()).collect();
        let depth = match links.last() {
            Some(last) if !last.is_empty() && last.bytes().all(|b| b.is_ascii_digit()) => {
                let depth = last.parse().ok();
                links.pop();
                depth
            }
            _ => None,
        };
        Self {
            links: links.iter().map(|s| Link::parse(s)).collect(),
            depth,
        }
    }

    /// The last link, whose model the chain resolves to.
    pub fn target(&self) -> Option<&Link> {
        self.links.last()
    }

    pub fn hops(&self) -> usize {
        self.links.len()
    }

    pub fn effective_depth(&self) -> u32 {
        self.depth
            .unwrap_or_else(|| u32::try_from(self.links.len()).unwrap_or(u32::MAX))
    }
}

/// Default recursion cap for has-a loads without an explicit depth.
pub const DEFAULT_HAS_A_DEPTH: u32 = 2;

/// A reference from this model to exactly one record of `target`, held in `column`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HasA {
    pub target: Link,
    pub column: String,
    pub depth: Option<u32>,
}

impl HasA {
    pub fn effective_depth(&self) -> u32 {
        self.depth.unwrap_or(DEFAULT_HAS_A_DEPTH)
    }
}

/// Table-per-class inheritance: `column` on this model points at the `target` parent row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IsA {
    pub column: String,
    pub target: Link,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_link_parse() {
        assert_eq!(Link::parse("Tag"), Link::new("Tag"));
        let link = Link::parse("Tagging.post_id");
        assert_eq!(link.model, "Tagging");
        assert_eq!(link.column.as_deref(), Some("post_id"));
        assert_eq!(link.to_string(), "Tagging.post_id");
    }

    #[test]
    fn test_chain_trailing_depth() {
        let chain = Chain::parse(["Tagging", "Tag", "3"]);
        assert_eq!(chain.hops(), 2);
        assert_eq!(chain.depth, Some(3));
        assert_eq!(chain.effective_depth(), 3);
        assert_eq!(chain.target().map(|l| l.model.as_str()), Some("Tag"));
    }

    #[test]
    fn test_chain_default_depth_is_length() {
        let chain = Chain::parse(["Tagging", "Tag"]);
        assert_eq!(chain.depth, None);
        assert_eq!(chain.effective_depth(), 2);
    }

    #[test]
    fn test_has_a_default_depth() {
        let has_a = HasA {
            target: Link::new("Person"),
            column: "person_id".into(),
            depth: None,
        };
        assert_eq!(has_a.effective_depth(), 2);
    }
}
