//! Locator strategies: how to find one logical UI target on the page.

use serde::{Deserialize, Serialize};
use std::fmt;

/// How a selector is interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LocatorMethod {
    Id,
    Name,
    Css,
    Xpath,
    LinkText,
    Class,
}

impl fmt::Display for LocatorMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Id => "id",
            Self::Name => "name",
            Self::Css => "css",
            Self::Xpath => "xpath",
            Self::LinkText => "link_text",
            Self::Class => "class",
        };
        f.write_str(name)
    }
}

/// A DOM query a page driver can run directly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Query {
    Css(String),
    XPath(String),
}

/// One method + selector pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LocatorStrategy {
    pub method: LocatorMethod,
    pub selector: String,
}

impl LocatorStrategy {
    pub fn new(method: LocatorMethod, selector: impl Into<String>) -> Self {
        Self {
            method,
            selector: selector.into(),
        }
    }

    pub fn id(selector: impl Into<String>) -> Self {
        Self::new(LocatorMethod::Id, selector)
    }

    pub fn name(selector: impl Into<String>) -> Self {
        Self::new(LocatorMethod::Name, selector)
    }

    pub fn css(selector: impl Into<String>) -> Self {
        Self::new(LocatorMethod::Css, selector)
    }

    pub fn xpath(selector: impl Into<String>) -> Self {
        Self::new(LocatorMethod::Xpath, selector)
    }

    pub fn link_text(selector: impl Into<String>) -> Self {
        Self::new(LocatorMethod::LinkText, selector)
    }

    pub fn class(selector: impl Into<String>) -> Self {
        Self::new(LocatorMethod::Class, selector)
    }

    /// Translate into a CSS or XPath query.
    ///
    /// Attribute-based methods use attribute selectors so ids and names with
    /// characters that are special in CSS still match.
    pub fn to_query(&self) -> Query {
        match self.method {
            LocatorMethod::Css => Query::Css(self.selector.clone()),
            LocatorMethod::Xpath => Query::XPath(self.selector.clone()),
            LocatorMethod::Id => Query::Css(format!("[id={}]", css_string(&self.selector))),
            LocatorMethod::Name => Query::Css(format!("[name={}]", css_string(&self.selector))),
            LocatorMethod::Class => Query::Css(
                self.selector
                    .split_whitespace()
                    .map(|c| format!("[class~={}]", css_string(c)))
                    .collect(),
            ),
            LocatorMethod::LinkText => Query::XPath(format!(
                "//a[normalize-space(.)={}]",
                xpath_string(self.selector.trim())
            )),
        }
    }
}

impl fmt::Display for LocatorStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}='{}'", self.method, self.selector)
    }
}

/// Quote a value for use inside a CSS attribute selector.
fn css_string(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    out.push('"');
    for c in value.chars() {
        if c == '"' || c == '\\' {
            out.push('\\');
        }
        out.push(c);
    }
    out.push('"');
    out
}

/// Quote a value as an XPath string literal.
fn xpath_string(value: &str) -> String {
    if !value.contains('\'') {
        format!("'{}'", value)
    } else if !value.contains('"') {
        format!("\"{}\"", value)
    } else {
        let parts: Vec<String> = value.split('\'').map(|p| format!("'{}'", p)).collect();
        format!("concat({})", parts.join(", \"'\", "))
    }
}

/// Ordered fallback strategies for one UI target. Earlier strategies are the
/// most stable; the last ones are the most fragile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocatorStrategySet {
    pub description: String,
    pub strategies: Vec<LocatorStrategy>,
}

impl LocatorStrategySet {
    pub fn new(description: impl Into<String>, strategies: Vec<LocatorStrategy>) -> Self {
        Self {
            description: description.into(),
            strategies,
        }
    }

    pub fn len(&self) -> usize {
        self.strategies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.strategies.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, LocatorStrategy> {
        self.strategies.iter()
    }
}

impl<'a> IntoIterator for &'a LocatorStrategySet {
    type Item = &'a LocatorStrategy;
    type IntoIter = std::slice::Iter<'a, LocatorStrategy>;

    fn into_iter(self) -> Self::IntoIter {
        self.strategies.iter()
    }
}
