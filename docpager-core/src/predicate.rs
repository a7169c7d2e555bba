//! Range predicates that resume a page from a boundary token.

use bson::Bson;

use crate::{
    error::{DocumentStoreError, DocumentStoreResult},
    query::{Expr, FieldOp, SortDirection},
    token::{Boundary, RangeCursorCodec},
};

/// Which side of a boundary a page continues on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Edge {
    /// Documents that come after the boundary in sort order.
    After,
    /// Documents that come before the boundary in sort order.
    Before,
}

impl Edge {
    /// The strict comparison selecting this side for a sort in `direction`.
    fn operator(self, direction: SortDirection) -> FieldOp {
        match (self, direction) {
            (Edge::After, SortDirection::Desc) | (Edge::Before, SortDirection::Asc) => FieldOp::Lt,
            (Edge::After, SortDirection::Asc) | (Edge::Before, SortDirection::Desc) => FieldOp::Gt,
        }
    }
}

/// Builds the filter for one page: the caller's filter AND the range beyond a boundary.
#[derive(Debug, Clone)]
pub struct PredicateComposer {
    codec: RangeCursorCodec,
}

impl PredicateComposer {
    pub fn new(codec: RangeCursorCodec) -> Self {
        Self { codec }
    }

    pub fn codec(&self) -> &RangeCursorCodec {
        &self.codec
    }

    /// Composes `base` with the range implied by `after` or `before`.
    ///
    /// With neither token the base filter is returned as is.
    ///
    /// # Errors
    ///
    /// Returns [`DocumentStoreError::InvalidPaginationArgs`] when both tokens are given and
    /// [`DocumentStoreError::InvalidCursor`] when the supplied token does not decode.
    pub fn compose(
        &self,
        base: Option<Expr>,
        sort_key: &str,
        direction: SortDirection,
        after: Option<&str>,
        before: Option<&str>,
    ) -> DocumentStoreResult<Option<Expr>> {
        let (edge, token) = match (after, before) {
            (Some(_), Some(_)) => {
                return Err(DocumentStoreError::InvalidPaginationArgs(
                    "'after' and 'before' cannot be combined".to_string(),
                ));
            }
            (Some(token), None) => (Edge::After, token),
            (None, Some(token)) => (Edge::Before, token),
            (None, None) => return Ok(base),
        };

        let boundary = self.codec.decode(token, sort_key)?;
        let range = self.range(sort_key, direction, edge, &boundary);

        Ok(Expr::all([base, Some(range)]))
    }

    /// The predicate selecting documents strictly beyond `boundary` on `edge`.
    ///
    /// Equal sort values are ordered by identifier in the same direction, so a duplicate
    /// sort value never makes a document appear on both sides.
    pub fn range(&self, sort_key: &str, direction: SortDirection, edge: Edge, boundary: &Boundary) -> Expr {
        let op = edge.operator(direction);
        let id_field = self.codec.id_field().to_string();
        let id_clause = Expr::field(id_field, op, boundary.id_value());

        match boundary.sort_value {
            Some(value) if !self.codec.is_id_mode(sort_key) => {
                let value = Bson::DateTime(value);
                Expr::Or(vec![
                    Expr::field(sort_key.to_string(), op, value.clone()),
                    Expr::And(vec![
                        Expr::field(sort_key.to_string(), FieldOp::Eq, value),
                        id_clause,
                    ]),
                ])
            }
            _ => id_clause,
        }
    }
}
