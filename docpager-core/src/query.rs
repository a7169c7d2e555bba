//! The backend-neutral query AST.
//!
//! Every store receives a [`Query`]: an optional [`Expr`] tree, an ordered list of sort
//! keys, and an offset and limit applied after sorting. Backends walk the tree with a
//! [`QueryVisitor`], either evaluating it against documents or translating it into their
//! own query language.
//!
//! ```ignore
//! use docpager::query::{Filter, Query, SortDirection};
//!
//! let query = Query::builder()
//!     .filter(Filter::and([Filter::eq("status", "active"), Filter::gte("age", 18)]))
//!     .sort("created_datetime", SortDirection::Desc)
//!     .sort("_id", SortDirection::Desc)
//!     .limit(10)
//!     .build();
//! ```
//!
//! Filters written as Mongo-style documents parse into the same tree through
//! [`Expr::from_document`](crate::query::Expr::from_document).

use bson::{Bson, doc};
use serde::{Deserialize, Serialize};

use crate::error::DocumentStoreError;

/// Order of a sort key. Pages default to newest (largest) first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    Asc,
    #[default]
    Desc,
}

impl SortDirection {
    pub fn reverse(self) -> Self {
        match self {
            SortDirection::Asc => SortDirection::Desc,
            SortDirection::Desc => SortDirection::Asc,
        }
    }

    /// `1` or `-1`, as Mongo sort documents spell it.
    pub fn as_i32(self) -> i32 {
        match self {
            SortDirection::Asc => 1,
            SortDirection::Desc => -1,
        }
    }

    /// Negative numbers are descending, everything else ascending.
    pub fn from_i32(value: i32) -> Self {
        if value < 0 {
            SortDirection::Desc
        } else {
            SortDirection::Asc
        }
    }
}

/// A dotted field path and the direction to order it in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sort {
    pub field: String,
    pub direction: SortDirection,
}

impl Sort {
    pub fn new(field: impl Into<String>, direction: SortDirection) -> Self {
        Sort { field: field.into(), direction }
    }
}

/// Comparison applied by an [`Expr::Field`] node.
///
/// Against an array field, every operator except `Ne` and `NoneOf` matches when any
/// element satisfies it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldOp {
    Eq,
    /// A missing field counts as null, so it differs from every non-null value.
    Ne,
    Gt,
    Gte,
    Lt,
    Lte,
    /// The operand is an array of candidate values.
    AnyOf,
    /// The operand is an array of rejected values.
    NoneOf,
    /// The operand is `{ "$regex": .., "$options": .. }` or a bare pattern string; see
    /// [`regex_parts`].
    Regex,
}

impl FieldOp {
    /// The Mongo operator spelling, e.g. `$gte` or `$in`.
    pub fn as_operator(&self) -> &'static str {
        match self {
            FieldOp::Eq => "$eq",
            FieldOp::Ne => "$ne",
            FieldOp::Gt => "$gt",
            FieldOp::Gte => "$gte",
            FieldOp::Lt => "$lt",
            FieldOp::Lte => "$lte",
            FieldOp::AnyOf => "$in",
            FieldOp::NoneOf => "$nin",
            FieldOp::Regex => "$regex",
        }
    }
}

/// A node of a filter tree.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// Every child matches. Empty matches everything.
    And(Vec<Expr>),
    /// Some child matches. Empty matches nothing.
    Or(Vec<Expr>),
    Not(Box<Expr>),
    /// The field is present (`true`) or absent (`false`).
    Exists(String, bool),
    /// Some string value anywhere in the document contains the text, ignoring case.
    Text(String),
    Field {
        field: String,
        op: FieldOp,
        value: Bson,
    },
}

impl Expr {
    pub fn field(field: String, op: FieldOp, value: Bson) -> Self {
        Expr::Field { field, op, value }
    }

    /// `self AND other`, extending `self` in place when it is already a conjunction.
    pub fn and(self, other: Expr) -> Self {
        match self {
            Expr::And(mut children) => {
                children.push(other);
                Expr::And(children)
            }
            lhs => Expr::And(vec![lhs, other]),
        }
    }

    /// `self OR other`, extending `self` in place when it is already a disjunction.
    pub fn or(self, other: Expr) -> Self {
        match self {
            Expr::Or(mut children) => {
                children.push(other);
                Expr::Or(children)
            }
            lhs => Expr::Or(vec![lhs, other]),
        }
    }

    pub fn not(self) -> Self {
        Expr::Not(Box::new(self))
    }

    /// Conjunction of the present expressions.
    ///
    /// `None` when none are present, the expression itself when exactly one is.
    pub fn all(exprs: impl IntoIterator<Item = Option<Expr>>) -> Option<Expr> {
        let mut present: Vec<Expr> = exprs.into_iter().flatten().collect();

        match present.len() {
            0 => None,
            1 => present.pop(),
            _ => Some(Expr::And(present)),
        }
    }
}

/// What a backend is asked to read.
///
/// Sort keys are most significant first. `offset` and `limit` apply to the sorted
/// sequence.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Query {
    pub filter: Option<Expr>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
    pub sort: Vec<Sort>,
}

impl Query {
    pub fn new() -> Self {
        Query::default()
    }

    pub fn builder() -> QueryBuilder {
        QueryBuilder::new()
    }
}

/// Splits a [`FieldOp::Regex`] operand into its pattern and option letters.
pub fn regex_parts(value: &Bson) -> Option<(&str, &str)> {
    match value {
        Bson::String(pattern) => Some((pattern.as_str(), "")),
        Bson::Document(doc) => {
            let pattern = doc.get_str("$regex").ok()?;
            let options = doc.get_str("$options").unwrap_or("");
            Some((pattern, options))
        }
        _ => None,
    }
}

/// Shorthand constructors for [`Expr`] trees.
pub struct Filter;

impl Filter {
    fn compare(field: impl Into<String>, op: FieldOp, value: impl Into<Bson>) -> Expr {
        Expr::field(field.into(), op, value.into())
    }

    fn list(field: impl Into<String>, op: FieldOp, values: impl IntoIterator<Item = impl Into<Bson>>) -> Expr {
        let values: Vec<Bson> = values.into_iter().map(Into::into).collect();
        Expr::field(field.into(), op, Bson::Array(values))
    }

    pub fn eq(field: impl Into<String>, value: impl Into<Bson>) -> Expr {
        Self::compare(field, FieldOp::Eq, value)
    }

    pub fn ne(field: impl Into<String>, value: impl Into<Bson>) -> Expr {
        Self::compare(field, FieldOp::Ne, value)
    }

    pub fn gt(field: impl Into<String>, value: impl Into<Bson>) -> Expr {
        Self::compare(field, FieldOp::Gt, value)
    }

    pub fn gte(field: impl Into<String>, value: impl Into<Bson>) -> Expr {
        Self::compare(field, FieldOp::Gte, value)
    }

    pub fn lt(field: impl Into<String>, value: impl Into<Bson>) -> Expr {
        Self::compare(field, FieldOp::Lt, value)
    }

    pub fn lte(field: impl Into<String>, value: impl Into<Bson>) -> Expr {
        Self::compare(field, FieldOp::Lte, value)
    }

    pub fn any_of(field: impl Into<String>, values: impl IntoIterator<Item = impl Into<Bson>>) -> Expr {
        Self::list(field, FieldOp::AnyOf, values)
    }

    pub fn none_of(field: impl Into<String>, values: impl IntoIterator<Item = impl Into<Bson>>) -> Expr {
        Self::list(field, FieldOp::NoneOf, values)
    }

    /// Pattern match on a string field. `options` takes the Mongo flag letters `i`, `m`,
    /// `s` and `x`.
    pub fn regex(field: impl Into<String>, pattern: impl AsRef<str>, options: impl AsRef<str>) -> Expr {
        let operand = doc! { "$regex": pattern.as_ref(), "$options": options.as_ref() };
        Self::compare(field, FieldOp::Regex, operand)
    }

    pub fn text(search: impl Into<String>) -> Expr {
        Expr::Text(search.into())
    }

    pub fn exists(field: impl Into<String>) -> Expr {
        Expr::Exists(field.into(), true)
    }

    pub fn not_exists(field: impl Into<String>) -> Expr {
        Expr::Exists(field.into(), false)
    }

    pub fn and(exprs: impl IntoIterator<Item = Expr>) -> Expr {
        Expr::And(exprs.into_iter().collect())
    }

    pub fn or(exprs: impl IntoIterator<Item = Expr>) -> Expr {
        Expr::Or(exprs.into_iter().collect())
    }

    /// Matches when no expression does.
    pub fn nor(exprs: impl IntoIterator<Item = Expr>) -> Expr {
        Self::or(exprs).not()
    }
}

/// Fluent construction of a [`Query`].
#[derive(Debug, Clone, Default)]
pub struct QueryBuilder {
    query: Query,
}

impl QueryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn filter(mut self, filter: Expr) -> Self {
        self.query.filter = Some(filter);
        self
    }

    /// Like [`filter`](Self::filter), but `None` clears it.
    pub fn maybe_filter(mut self, filter: Option<Expr>) -> Self {
        self.query.filter = filter;
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.query.limit = Some(limit);
        self
    }

    pub fn offset(mut self, offset: usize) -> Self {
        self.query.offset = Some(offset);
        self
    }

    /// Appends a sort key; keys added earlier win.
    pub fn sort(mut self, field: impl Into<String>, direction: SortDirection) -> Self {
        self.query.sort.push(Sort::new(field, direction));
        self
    }

    pub fn build(self) -> Query {
        self.query
    }
}

/// Walks an [`Expr`] tree. Backends implement this to evaluate or translate filters.
pub trait QueryVisitor {
    type Output;
    type Error: Into<DocumentStoreError>;

    fn visit_and(&mut self, children: &[Expr]) -> Result<Self::Output, Self::Error>;
    fn visit_or(&mut self, children: &[Expr]) -> Result<Self::Output, Self::Error>;
    fn visit_not(&mut self, inner: &Expr) -> Result<Self::Output, Self::Error>;
    fn visit_exists(&mut self, field: &str, should_exist: bool) -> Result<Self::Output, Self::Error>;
    fn visit_text(&mut self, search: &str) -> Result<Self::Output, Self::Error>;
    fn visit_field(&mut self, field: &str, op: &FieldOp, value: &Bson) -> Result<Self::Output, Self::Error>;

    fn visit_expr(&mut self, expr: &Expr) -> Result<Self::Output, Self::Error> {
        match expr {
            Expr::And(children) => self.visit_and(children),
            Expr::Or(children) => self.visit_or(children),
            Expr::Not(inner) => self.visit_not(inner),
            Expr::Exists(field, should_exist) => self.visit_exists(field, *should_exist),
            Expr::Text(search) => self.visit_text(search),
            Expr::Field { field, op, value } => self.visit_field(field, op, value),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    fn test_builder_accumulates_sort_keys_in_order() {
        // Act
        let query = Query::builder()
            .sort("created_datetime", SortDirection::Desc)
            .sort("_id", SortDirection::Desc)
            .limit(5)
            .build();

        // Assert
        assert_eq!(
            query.sort,
            vec![
                Sort::new("created_datetime", SortDirection::Desc),
                Sort::new("_id", SortDirection::Desc),
            ]
        );
        assert_eq!(query.limit, Some(5));
        assert_eq!(query.offset, None);
    }

    #[rstest]
    #[case(vec![], None)]
    #[case(vec![Some(Filter::exists("a"))], Some(Filter::exists("a")))]
    #[case(vec![None, Some(Filter::exists("a")), None], Some(Filter::exists("a")))]
    fn test_all_collapses_trivial_groups(
        #[case] input: Vec<Option<Expr>>,
        #[case] expected: Option<Expr>,
    ) {
        assert_eq!(Expr::all(input), expected);
    }

    #[rstest]
    fn test_all_wraps_multiple_in_and() {
        // Act
        let expr = Expr::all([Some(Filter::exists("a")), Some(Filter::exists("b"))]);

        // Assert
        assert_eq!(
            expr,
            Some(Expr::And(vec![Filter::exists("a"), Filter::exists("b")]))
        );
    }

    #[rstest]
    fn test_regex_parts_reads_constructor_output() {
        // Arrange
        let expr = Filter::regex("name", "^a", "i");

        // Act
        let parts = match &expr {
            Expr::Field { value, .. } => regex_parts(value),
            _ => None,
        };

        // Assert
        assert_eq!(parts, Some(("^a", "i")));
        assert_eq!(regex_parts(&Bson::from("^b")), Some(("^b", "")));
        assert_eq!(regex_parts(&Bson::Int32(1)), None);
    }

    #[rstest]
    #[case(SortDirection::Asc, SortDirection::Desc, 1)]
    #[case(SortDirection::Desc, SortDirection::Asc, -1)]
    fn test_sort_direction_helpers(
        #[case] direction: SortDirection,
        #[case] reversed: SortDirection,
        #[case] numeric: i32,
    ) {
        assert_eq!(direction.reverse(), reversed);
        assert_eq!(direction.as_i32(), numeric);
        assert_eq!(SortDirection::from_i32(numeric), direction);
    }
}
