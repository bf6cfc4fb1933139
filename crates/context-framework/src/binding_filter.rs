//! # Binding Filters
//!
//! Bindings are found by key pattern, by tag or by an arbitrary predicate.
//!
//! - **Glob patterns**: `*` matches any run of characters except `.` and `:`, `?` matches
//!   a single such character. Every other character is literal, so `foo+bar` only
//!   matches `foo+bar`. With bindings `foo`, `foo.bar` and `foo:bar`, the pattern `*`
//!   finds `foo`, `*.*` finds `foo.bar` and `*:ba*` finds `foo:bar`.
//! - **Regular expressions** match anywhere in the key.
//! - **Predicates** are [`BindingFilter`] closures.
//!
//! Tag patterns work the same way over tag names, or compare a map of name/value pairs.

use crate::binding::Binding;
use crate::tags::{BindingTag, TagMap, TagValue};
use regex::Regex;
use std::fmt;
use std::sync::Arc;
use tracing::{trace, warn};

/// A predicate over bindings.
pub type BindingFilter = Arc<dyn Fn(&Binding) -> bool + Send + Sync>;

/// Wraps a closure as a [`BindingFilter`].
pub fn binding_filter<F>(f: F) -> BindingFilter
where
    F: Fn(&Binding) -> bool + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Matches every binding.
pub fn all_bindings() -> BindingFilter {
    Arc::new(|_: &Binding| true)
}

/// A key pattern or predicate accepted by `Context::find`.
#[derive(Clone)]
pub enum BindingPattern {
    All,
    Glob(String),
    Regex(Regex),
    Filter(BindingFilter),
}

impl BindingPattern {
    pub fn into_filter(self) -> BindingFilter {
        match self {
            BindingPattern::All => all_bindings(),
            BindingPattern::Glob(pattern) => match wildcard_to_regex(&pattern) {
                Ok(regex) => Arc::new(move |b: &Binding| regex.is_match(b.key())),
                Err(e) => {
                    warn!(pattern, error = %e, "Invalid key pattern, nothing will match");
                    Arc::new(|_: &Binding| false)
                }
            },
            BindingPattern::Regex(regex) => Arc::new(move |b: &Binding| regex.is_match(b.key())),
            BindingPattern::Filter(filter) => filter,
        }
    }
}

impl fmt::Debug for BindingPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BindingPattern::All => f.write_str("All"),
            BindingPattern::Glob(p) => write!(f, "Glob({p})"),
            BindingPattern::Regex(r) => write!(f, "Regex({})", r.as_str()),
            BindingPattern::Filter(_) => f.write_str("Filter"),
        }
    }
}

impl From<&str> for BindingPattern {
    fn from(s: &str) -> Self {
        BindingPattern::Glob(s.to_string())
    }
}

impl From<String> for BindingPattern {
    fn from(s: String) -> Self {
        BindingPattern::Glob(s)
    }
}

impl From<Regex> for BindingPattern {
    fn from(r: Regex) -> Self {
        BindingPattern::Regex(r)
    }
}

impl From<BindingFilter> for BindingPattern {
    fn from(f: BindingFilter) -> Self {
        BindingPattern::Filter(f)
    }
}

/// Translates a glob into an anchored regex. `*` and `?` stop at `.` and `:`.
pub fn wildcard_to_regex(pattern: &str) -> Result<Regex, regex::Error> {
    let mut source = String::with_capacity(pattern.len() + 8);
    source.push('^');
    for c in pattern.chars() {
        match c {
            '*' => source.push_str("[^.:]*"),
            '?' => source.push_str("[^.:]"),
            c => source.push_str(&regex::escape(c.encode_utf8(&mut [0; 4]))),
        }
    }
    source.push('$');
    trace!(pattern, regex = %source, "Translated wildcard");
    Regex::new(&source)
}

fn is_wildcard(pattern: &str) -> bool {
    pattern.contains('*') || pattern.contains('?')
}

/// Expected value of a tag inside a [`TagPattern::Map`].
#[derive(Clone, Debug, PartialEq)]
pub enum TagMatch {
    /// The tag must be present with exactly this value.
    Exact(TagValue),
    /// The tag must be present with any value.
    Any,
}

/// A tag pattern accepted by `find_by_tag` and [`filter_by_tag`].
#[derive(Clone, Debug)]
pub enum TagPattern {
    /// A tag name, or a glob over tag names when it contains `*` or `?`.
    Name(String),
    Regex(Regex),
    /// Every listed tag must match.
    Map(Vec<(String, TagMatch)>),
}

impl TagPattern {
    /// Builds a map pattern from exact name/value pairs.
    pub fn pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<TagValue>,
    {
        TagPattern::Map(
            pairs
                .into_iter()
                .map(|(k, v)| (k.into(), TagMatch::Exact(v.into())))
                .collect(),
        )
    }

    /// Adds a presence-only requirement to a map pattern.
    pub fn with_any(self, name: impl Into<String>) -> Self {
        let mut entries = match self {
            TagPattern::Map(entries) => entries,
            TagPattern::Name(n) => vec![(n, TagMatch::Any)],
            TagPattern::Regex(_) => Vec::new(),
        };
        entries.push((name.into(), TagMatch::Any));
        TagPattern::Map(entries)
    }
}

impl From<&str> for TagPattern {
    fn from(s: &str) -> Self {
        TagPattern::Name(s.to_string())
    }
}

impl From<String> for TagPattern {
    fn from(s: String) -> Self {
        TagPattern::Name(s)
    }
}

impl From<Regex> for TagPattern {
    fn from(r: Regex) -> Self {
        TagPattern::Regex(r)
    }
}

impl From<BindingTag> for TagPattern {
    fn from(tag: BindingTag) -> Self {
        match tag {
            BindingTag::Name(n) => TagPattern::Name(n),
            BindingTag::Pairs(pairs) => TagPattern::Map(
                pairs
                    .into_iter()
                    .map(|(k, v)| (k, TagMatch::Exact(v)))
                    .collect(),
            ),
        }
    }
}

/// Creates a filter that matches bindings by tag.
pub fn filter_by_tag(pattern: impl Into<TagPattern>) -> BindingFilter {
    let pattern = pattern.into();
    let regex = match &pattern {
        TagPattern::Regex(r) => Some(r.clone()),
        TagPattern::Name(n) if is_wildcard(n) => match wildcard_to_regex(n) {
            Ok(r) => Some(r),
            Err(e) => {
                warn!(pattern = %n, error = %e, "Invalid tag pattern, nothing will match");
                return Arc::new(|_: &Binding| false);
            }
        },
        _ => None,
    };
    if let Some(regex) = regex {
        return Arc::new(move |b: &Binding| b.tag_names().iter().any(|t| regex.is_match(t)));
    }
    match pattern {
        TagPattern::Name(name) => Arc::new(move |b: &Binding| b.has_tag(&name)),
        TagPattern::Map(entries) => Arc::new(move |b: &Binding| {
            let tags = b.tag_map();
            entries.iter().all(|(name, expected)| match_tag_value(&tags, name, expected))
        }),
        TagPattern::Regex(_) => all_bindings(),
    }
}

fn match_tag_value(tags: &TagMap, name: &str, expected: &TagMatch) -> bool {
    match (tags.get(name), expected) {
        (Some(_), TagMatch::Any) => true,
        (Some(actual), TagMatch::Exact(value)) => actual == value,
        (None, _) => false,
    }
}

/// Creates a filter that matches bindings by key pattern.
pub fn filter_by_key(pattern: impl Into<BindingPattern>) -> BindingFilter {
    pattern.into().into_filter()
}
