//! Query expression evaluation for in-memory document filtering.
//!
//! Evaluation follows document-database semantics: dotted paths reach into nested
//! documents, an array field matches an operator when any element does, range operators
//! only compare values of the same kind, and `$ne`/`$nin` match documents that lack the
//! field entirely.

use bson::{Bson, Document};
use regex::{Regex, RegexBuilder};
use std::{cmp::Ordering, collections::HashMap};

use docpager_core::{
    error::{DocumentStoreError, DocumentStoreResult},
    query::{Expr, FieldOp, QueryVisitor, regex_parts},
    value::{compare_same_kind, lookup_path, values_equal},
};

/// Evaluates filter expressions against many documents, compiling each pattern once.
#[derive(Debug, Default)]
pub(crate) struct Matcher {
    regexes: HashMap<(String, String), Regex>,
}

impl Matcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn matches(&mut self, document: &Document, expr: &Expr) -> DocumentStoreResult<bool> {
        DocumentEvaluator {
            document,
            regexes: &mut self.regexes,
        }
        .visit_expr(expr)
    }

    /// Keeps the documents matching `filter`; `None` keeps everything.
    pub fn filter_documents<'d>(
        &mut self,
        documents: impl IntoIterator<Item = &'d Document>,
        filter: Option<&Expr>,
    ) -> DocumentStoreResult<Vec<&'d Document>> {
        let mut matched = Vec::new();

        for doc in documents {
            let keep = match filter {
                Some(expr) => self.matches(doc, expr)?,
                None => true,
            };
            if keep {
                matched.push(doc);
            }
        }

        Ok(matched)
    }
}

pub(crate) struct DocumentEvaluator<'a> {
    document: &'a Document,
    regexes: &'a mut HashMap<(String, String), Regex>,
}

impl DocumentEvaluator<'_> {
    fn regex(&mut self, pattern: &str, options: &str) -> DocumentStoreResult<&Regex> {
        let key = (pattern.to_string(), options.to_string());

        if !self.regexes.contains_key(&key) {
            let compiled = RegexBuilder::new(pattern)
                .case_insensitive(options.contains('i'))
                .multi_line(options.contains('m'))
                .dot_matches_new_line(options.contains('s'))
                .ignore_whitespace(options.contains('x'))
                .build()
                .map_err(|err| DocumentStoreError::InvalidFilter(format!("invalid pattern '{pattern}': {err}")))?;
            self.regexes.insert(key.clone(), compiled);
        }

        self.regexes
            .get(&key)
            .ok_or_else(|| DocumentStoreError::InvalidFilter(format!("invalid pattern '{pattern}'")))
    }
}

/// Applies `test` to the value and, for arrays, to each element.
fn any_candidate(value: &Bson, mut test: impl FnMut(&Bson) -> bool) -> bool {
    if test(value) {
        return true;
    }

    match value {
        Bson::Array(items) => items.iter().any(test),
        _ => false,
    }
}

fn equals(field_value: Option<&Bson>, target: &Bson) -> bool {
    match field_value {
        Some(value) => any_candidate(value, |candidate| values_equal(candidate, target)),
        None => matches!(target, Bson::Null),
    }
}

fn contains_text(value: &Bson, needle: &str) -> bool {
    match value {
        Bson::String(s) => s.to_lowercase().contains(needle),
        Bson::Array(items) => items.iter().any(|item| contains_text(item, needle)),
        Bson::Document(doc) => doc.values().any(|item| contains_text(item, needle)),
        _ => false,
    }
}

impl QueryVisitor for DocumentEvaluator<'_> {
    type Output = bool;
    type Error = DocumentStoreError;

    fn visit_and(&mut self, exprs: &[Expr]) -> Result<Self::Output, Self::Error> {
        for expr in exprs {
            if !self.visit_expr(expr)? {
                return Ok(false);
            }
        }

        Ok(true)
    }

    fn visit_or(&mut self, exprs: &[Expr]) -> Result<Self::Output, Self::Error> {
        for expr in exprs {
            if self.visit_expr(expr)? {
                return Ok(true);
            }
        }

        Ok(false)
    }

    fn visit_not(&mut self, expr: &Expr) -> Result<Self::Output, Self::Error> {
        Ok(!self.visit_expr(expr)?)
    }

    fn visit_exists(&mut self, field: &str, should_exist: bool) -> Result<Self::Output, Self::Error> {
        Ok(lookup_path(self.document, field).is_some() == should_exist)
    }

    fn visit_text(&mut self, search: &str) -> Result<Self::Output, Self::Error> {
        let needle = search.to_lowercase();
        Ok(self
            .document
            .values()
            .any(|value| contains_text(value, &needle)))
    }

    fn visit_field(&mut self, field: &str, op: &FieldOp, value: &Bson) -> Result<Self::Output, Self::Error> {
        let document = self.document;
        let field_value = lookup_path(document, field);

        Ok(match op {
            FieldOp::Eq => equals(field_value, value),
            FieldOp::Ne => !equals(field_value, value),
            FieldOp::Gt | FieldOp::Gte | FieldOp::Lt | FieldOp::Lte => {
                let Some(field_value) = field_value else {
                    return Ok(false);
                };

                any_candidate(field_value, |candidate| match compare_same_kind(candidate, value) {
                    Some(ordering) => match op {
                        FieldOp::Gt => ordering == Ordering::Greater,
                        FieldOp::Gte => ordering != Ordering::Less,
                        FieldOp::Lt => ordering == Ordering::Less,
                        _ => ordering != Ordering::Greater,
                    },
                    None => false,
                })
            }
            FieldOp::AnyOf | FieldOp::NoneOf => {
                let Bson::Array(targets) = value else {
                    return Err(DocumentStoreError::InvalidFilter(format!(
                        "'{}' on '{field}' expects an array",
                        op.as_operator()
                    )));
                };

                let found = targets.iter().any(|target| equals(field_value, target));
                if *op == FieldOp::AnyOf { found } else { !found }
            }
            FieldOp::Regex => {
                let (pattern, options) = regex_parts(value).ok_or_else(|| {
                    DocumentStoreError::InvalidFilter(format!("'$regex' on '{field}' expects a pattern"))
                })?;
                let Some(field_value) = field_value else {
                    return Ok(false);
                };

                let regex = self.regex(pattern, options)?;
                any_candidate(field_value, |candidate| match candidate {
                    Bson::String(s) => regex.is_match(s),
                    _ => false,
                })
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;
    use docpager_core::query::Filter;
    use rstest::{fixture, rstest};

    #[fixture]
    fn person() -> Document {
        doc! {
            "name": "Alice Smith",
            "age": 34,
            "tags": ["admin", "ops"],
            "address": { "city": "Lima", "zip": "15001" },
            "nickname": null,
        }
    }

    #[rstest]
    #[case(Filter::eq("name", "Alice Smith"), true)]
    #[case(Filter::eq("age", 34.0), true)]
    #[case(Filter::eq("tags", "ops"), true)]
    #[case(Filter::eq("address.city", "Lima"), true)]
    #[case(Filter::eq("missing", Bson::Null), true)]
    #[case(Filter::ne("missing", 1), true)]
    #[case(Filter::ne("age", 34), false)]
    #[case(Filter::gt("age", 30), true)]
    #[case(Filter::gt("age", "30"), false)]
    #[case(Filter::lte("age", 34), true)]
    #[case(Filter::lt("missing", 100), false)]
    #[case(Filter::any_of("tags", ["dev", "ops"]), true)]
    #[case(Filter::none_of("tags", ["dev"]), true)]
    #[case(Filter::none_of("missing", ["dev"]), true)]
    #[case(Filter::regex("name", "^alice", "i"), true)]
    #[case(Filter::regex("name", "^alice", ""), false)]
    #[case(Filter::regex("tags", "^ad", ""), true)]
    #[case(Filter::text("SMITH"), true)]
    #[case(Filter::text("15001"), true)]
    #[case(Filter::text("bob"), false)]
    #[case(Filter::exists("address.zip"), true)]
    #[case(Filter::not_exists("address.street"), true)]
    #[case(Filter::nor([Filter::eq("age", 1), Filter::eq("age", 2)]), true)]
    fn test_matches(person: Document, #[case] expr: Expr, #[case] expected: bool) {
        // Arrange
        let mut matcher = Matcher::new();

        // Act
        let matched = matcher.matches(&person, &expr).unwrap();

        // Assert
        assert_eq!(matched, expected);
    }

    #[rstest]
    fn test_invalid_pattern_is_a_filter_error(person: Document) {
        // Act
        let result = Matcher::new().matches(&person, &Filter::regex("name", "(", ""));

        // Assert
        assert!(matches!(result, Err(DocumentStoreError::InvalidFilter(_))));
    }

    #[rstest]
    fn test_filter_documents_keeps_order(person: Document) {
        // Arrange
        let other = doc! { "name": "Bob", "age": 41 };
        let docs = vec![person.clone(), other.clone()];

        // Act
        let matched = Matcher::new()
            .filter_documents(&docs, Some(&Filter::gte("age", 34)))
            .unwrap();

        // Assert
        assert_eq!(matched, vec![&person, &other]);
    }
}
