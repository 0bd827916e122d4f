#![forbid(unsafe_code)]

//! Expression text → tree.
//!
//! The runtime does not ship a grammar. Hosts either plug in an
//! [`ExpressionParser`] or register pre-built trees with
//! [`ExpressionCache::cache`], which serves them by their source text.

use std::cell::RefCell;
use std::rc::Rc;

use ahash::AHashMap;

use crate::ast::Expression;
use crate::error::ParseError;

/// Turns binding text into an expression tree.
pub trait ExpressionParser {
    fn parse(&self, text: &str) -> Result<Rc<Expression>, ParseError>;
}

/// Memoizing front for an optional inner parser.
#[derive(Default)]
pub struct ExpressionCache {
    parsed: RefCell<AHashMap<Rc<str>, Rc<Expression>>>,
    inner: Option<Rc<dyn ExpressionParser>>,
}

impl ExpressionCache {
    /// Cache with no inner parser: only registered trees resolve.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_parser(parser: Rc<dyn ExpressionParser>) -> Self {
        Self {
            parsed: RefCell::new(AHashMap::new()),
            inner: Some(parser),
        }
    }

    /// Register pre-built trees keyed by their source text.
    pub fn cache<K: Into<Rc<str>>>(&self, entries: impl IntoIterator<Item = (K, Expression)>) {
        let mut parsed = self.parsed.borrow_mut();
        for (text, expression) in entries {
            parsed.insert(text.into(), Rc::new(expression));
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.parsed.borrow().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.parsed.borrow().is_empty()
    }
}

impl ExpressionParser for ExpressionCache {
    fn parse(&self, text: &str) -> Result<Rc<Expression>, ParseError> {
        if let Some(hit) = self.parsed.borrow().get(text) {
            return Ok(Rc::clone(hit));
        }
        let Some(inner) = &self.inner else {
            return Err(ParseError::Unknown(text.to_owned()));
        };
        let expression = inner.parse(text)?;
        tracing::trace!(text, "expression parsed");
        self.parsed
            .borrow_mut()
            .insert(Rc::from(text), Rc::clone(&expression));
        Ok(expression)
    }
}

impl std::fmt::Debug for ExpressionCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExpressionCache")
            .field("cached", &self.len())
            .field("has_parser", &self.inner.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    /// Parses bare identifiers only.
    struct Identifiers {
        calls: Cell<usize>,
    }

    impl ExpressionParser for Identifiers {
        fn parse(&self, text: &str) -> Result<Rc<Expression>, ParseError> {
            self.calls.set(self.calls.get() + 1);
            if text.chars().all(|c| c.is_alphanumeric() || c == '_') && !text.is_empty() {
                Ok(Rc::new(Expression::scope(text)))
            } else {
                Err(ParseError::Unknown(text.to_owned()))
            }
        }
    }

    #[test]
    fn serves_registered_trees() {
        let cache = ExpressionCache::new();
        cache.cache([("foo.bar", Expression::scope("foo").member("bar"))]);
        let expr = cache.parse("foo.bar").unwrap();
        assert_eq!(expr.to_string(), "foo.bar");
        assert!(Rc::ptr_eq(&expr, &cache.parse("foo.bar").unwrap()));
        assert_eq!(
            cache.parse("missing").unwrap_err(),
            ParseError::Unknown("missing".to_owned())
        );
    }

    #[test]
    fn delegates_misses_once() {
        let parser = Rc::new(Identifiers { calls: Cell::new(0) });
        let cache = ExpressionCache::with_parser(parser.clone());
        cache.parse("name").unwrap();
        cache.parse("name").unwrap();
        assert_eq!(parser.calls.get(), 1);
        assert!(cache.parse("a + b").is_err());
        assert_eq!(cache.len(), 1);
    }
}
