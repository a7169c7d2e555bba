//! Parsing of Mongo-style filter documents into [`Expr`] trees.
//!
//! Callers usually describe filters the way the database shell does:
//! `{ "age": { "$gt": 30 }, "$or": [ { "role": "admin" }, { "active": true } ] }`.
//! This module turns such documents into the backend-neutral query AST so the in-memory
//! store and the predicate composer can work with them, and writes the AST back out in the
//! same shape for database drivers and page envelopes.

use bson::{Bson, Document, doc};

use crate::{
    backend::PRIMARY_KEY,
    error::{DocumentStoreError, DocumentStoreResult},
    identifier::Identifier,
    query::{Expr, FieldOp, QueryVisitor, regex_parts},
};

impl Expr {
    /// Parses a Mongo-style filter document.
    ///
    /// Returns `None` for an empty document, which matches every document.
    ///
    /// # Errors
    ///
    /// Returns [`DocumentStoreError::InvalidFilter`] for unknown operators or operands of
    /// the wrong shape.
    pub fn from_document(doc: &Document) -> DocumentStoreResult<Option<Expr>> {
        let mut clauses = parse_clauses(doc)?;

        Ok(match clauses.len() {
            0 => None,
            1 => clauses.pop(),
            _ => Some(Expr::And(clauses)),
        })
    }

    /// Writes the expression as a Mongo-style filter document.
    ///
    /// # Errors
    ///
    /// Returns [`DocumentStoreError::InvalidFilter`] for a `$regex` clause without a pattern.
    pub fn to_document(&self) -> DocumentStoreResult<Document> {
        FilterDocumentWriter.visit_expr(self)
    }
}

struct FilterDocumentWriter;

impl FilterDocumentWriter {
    fn visit_all(&mut self, exprs: &[Expr]) -> DocumentStoreResult<Vec<Document>> {
        exprs
            .iter()
            .map(|expr| self.visit_expr(expr))
            .collect()
    }
}

impl QueryVisitor for FilterDocumentWriter {
    type Output = Document;
    type Error = DocumentStoreError;

    fn visit_and(&mut self, exprs: &[Expr]) -> DocumentStoreResult<Document> {
        // An empty `$and` is rejected by MongoDB.
        if exprs.is_empty() {
            return Ok(Document::new());
        }

        Ok(doc! { "$and": self.visit_all(exprs)? })
    }

    fn visit_or(&mut self, exprs: &[Expr]) -> DocumentStoreResult<Document> {
        if exprs.is_empty() {
            return Ok(doc! { PRIMARY_KEY: { "$in": [] } });
        }

        Ok(doc! { "$or": self.visit_all(exprs)? })
    }

    fn visit_not(&mut self, expr: &Expr) -> DocumentStoreResult<Document> {
        // `$not` is only valid on a field, `$nor` negates any expression.
        Ok(doc! { "$nor": [self.visit_expr(expr)?] })
    }

    fn visit_exists(&mut self, field: &str, should_exist: bool) -> DocumentStoreResult<Document> {
        Ok(doc! {
            field: { "$exists": should_exist },
        })
    }

    fn visit_text(&mut self, search: &str) -> DocumentStoreResult<Document> {
        Ok(doc! {
            "$text": { "$search": search },
        })
    }

    fn visit_field(&mut self, field: &str, op: &FieldOp, value: &Bson) -> DocumentStoreResult<Document> {
        let operand = match op {
            FieldOp::Regex => {
                let (pattern, options) = regex_parts(value)
                    .ok_or_else(|| invalid(format!("'$regex' on '{field}' expects a pattern")))?;
                doc! { "$regex": pattern, "$options": options }
            }
            op => {
                let operator = op.as_operator();
                doc! { operator: value.clone() }
            }
        };

        Ok(doc! { field: operand })
    }
}

fn invalid(message: impl Into<String>) -> DocumentStoreError {
    DocumentStoreError::InvalidFilter(message.into())
}

fn parse_clauses(doc: &Document) -> DocumentStoreResult<Vec<Expr>> {
    let mut clauses = Vec::with_capacity(doc.len());

    for (key, value) in doc {
        let clause = match key.as_str() {
            "$and" => Expr::And(parse_branches(key, value)?),
            "$or" => Expr::Or(parse_branches(key, value)?),
            "$nor" => Expr::Or(parse_branches(key, value)?).not(),
            "$text" => parse_text(value)?,
            operator if operator.starts_with('$') => {
                return Err(invalid(format!("unknown top-level operator '{operator}'")));
            }
            field => parse_field(field, value)?,
        };
        clauses.push(clause);
    }

    Ok(clauses)
}

fn parse_branches(operator: &str, value: &Bson) -> DocumentStoreResult<Vec<Expr>> {
    let Bson::Array(branches) = value else {
        return Err(invalid(format!("'{operator}' expects an array of documents")));
    };

    branches
        .iter()
        .map(|branch| match branch {
            Bson::Document(doc) => Ok(Expr::And(parse_clauses(doc)?)),
            _ => Err(invalid(format!("'{operator}' expects an array of documents"))),
        })
        .collect()
}

fn parse_text(value: &Bson) -> DocumentStoreResult<Expr> {
    match value {
        Bson::Document(operators) => operators
            .get_str("$search")
            .map(|search| Expr::Text(search.to_string()))
            .map_err(|_| invalid("'$text' requires a string '$search'")),
        _ => Err(invalid("'$text' expects a document")),
    }
}

fn is_operator_document(doc: &Document) -> bool {
    doc.keys().next().is_some_and(|key| key.starts_with('$'))
}

fn parse_field(field: &str, value: &Bson) -> DocumentStoreResult<Expr> {
    match value {
        Bson::Document(operators) if operators.len() == 1 && operators.contains_key("$oid") => {
            let oid = operators
                .get_str("$oid")
                .ok()
                .and_then(Identifier::parse)
                .ok_or_else(|| invalid(format!("malformed '$oid' literal for '{field}'")))?;
            Ok(Expr::field(field.to_string(), FieldOp::Eq, oid.to_bson()))
        }
        Bson::Document(operators) if is_operator_document(operators) => {
            let mut ops = parse_operators(field, operators)?;
            Ok(if ops.len() == 1 {
                ops.remove(0)
            } else {
                Expr::And(ops)
            })
        }
        _ => Ok(Expr::field(field.to_string(), FieldOp::Eq, value.clone())),
    }
}

fn parse_operators(field: &str, operators: &Document) -> DocumentStoreResult<Vec<Expr>> {
    let mut ops = Vec::with_capacity(operators.len());

    for (operator, operand) in operators {
        let op = match operator.as_str() {
            "$eq" => FieldOp::Eq,
            "$ne" => FieldOp::Ne,
            "$gt" => FieldOp::Gt,
            "$gte" => FieldOp::Gte,
            "$lt" => FieldOp::Lt,
            "$lte" => FieldOp::Lte,
            "$in" | "$nin" => {
                if !matches!(operand, Bson::Array(_)) {
                    return Err(invalid(format!("'{operator}' on '{field}' expects an array")));
                }
                if operator == "$in" { FieldOp::AnyOf } else { FieldOp::NoneOf }
            }
            "$exists" => {
                let should_exist = match operand {
                    Bson::Boolean(flag) => *flag,
                    Bson::Int32(n) => *n != 0,
                    Bson::Int64(n) => *n != 0,
                    _ => return Err(invalid(format!("'$exists' on '{field}' expects a boolean"))),
                };
                ops.push(Expr::Exists(field.to_string(), should_exist));
                continue;
            }
            "$regex" => {
                let Bson::String(pattern) = operand else {
                    return Err(invalid(format!("'$regex' on '{field}' expects a string")));
                };
                let options = operators.get_str("$options").unwrap_or("");
                let mut value = Document::new();
                value.insert("$regex", pattern.as_str());
                value.insert("$options", options);
                ops.push(Expr::field(field.to_string(), FieldOp::Regex, Bson::Document(value)));
                continue;
            }
            "$options" => {
                if !operators.contains_key("$regex") {
                    return Err(invalid(format!("'$options' on '{field}' without '$regex'")));
                }
                continue;
            }
            "$not" => {
                let negated = match operand {
                    Bson::Document(inner) if is_operator_document(inner) => {
                        Expr::And(parse_operators(field, inner)?)
                    }
                    Bson::String(pattern) => {
                        Expr::field(field.to_string(), FieldOp::Regex, Bson::String(pattern.clone()))
                    }
                    _ => return Err(invalid(format!("'$not' on '{field}' expects an operator document"))),
                };
                ops.push(negated.not());
                continue;
            }
            other => return Err(invalid(format!("unknown operator '{other}' on '{field}'"))),
        };

        ops.push(Expr::field(field.to_string(), op, operand.clone()));
    }

    Ok(ops)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::Filter;
    use bson::doc;
    use rstest::rstest;

    #[rstest]
    fn test_empty_document_matches_everything() {
        assert_eq!(Expr::from_document(&doc! {}).unwrap(), None);
    }

    #[rstest]
    fn test_plain_values_become_equality() {
        // Act
        let expr = Expr::from_document(&doc! { "status": "active", "a.b": 2 }).unwrap();

        // Assert
        assert_eq!(
            expr,
            Some(Filter::and([Filter::eq("status", "active"), Filter::eq("a.b", 2)]))
        );
    }

    #[rstest]
    fn test_operator_documents() {
        // Act
        let expr = Expr::from_document(&doc! { "age": { "$gt": 30, "$lte": 60 } }).unwrap();

        // Assert
        assert_eq!(
            expr,
            Some(Filter::and([Filter::gt("age", 30), Filter::lte("age", 60)]))
        );
    }

    #[rstest]
    fn test_regex_with_options() {
        // Act
        let expr = Expr::from_document(&doc! { "name": { "$regex": "^a", "$options": "i" } }).unwrap();

        // Assert
        assert_eq!(expr, Some(Filter::regex("name", "^a", "i")));
    }

    #[rstest]
    fn test_logical_and_text_operators() {
        // Act
        let expr = Expr::from_document(&doc! {
            "$or": [ { "role": "admin" }, { "active": true } ],
            "$text": { "$search": "rust" },
        })
        .unwrap();

        // Assert
        assert_eq!(
            expr,
            Some(Filter::and([
                Filter::or([
                    Expr::And(vec![Filter::eq("role", "admin")]),
                    Expr::And(vec![Filter::eq("active", true)]),
                ]),
                Filter::text("rust"),
            ]))
        );
    }

    #[rstest]
    fn test_oid_literal_is_decoded() {
        // Act
        let expr = Expr::from_document(&doc! { "_id": { "$oid": "507f1f77bcf86cd799439011" } }).unwrap();

        // Assert
        let expected = Identifier::parse("507f1f77bcf86cd799439011").unwrap();
        assert_eq!(expr, Some(Filter::eq("_id", expected.to_bson())));
    }

    #[rstest]
    #[case(doc! { "$where": "1 == 1" })]
    #[case(doc! { "age": { "$between": [1, 2] } })]
    #[case(doc! { "age": { "$in": 5 } })]
    #[case(doc! { "$or": { "a": 1 } })]
    #[case(doc! { "name": { "$options": "i" } })]
    fn test_invalid_filters_are_rejected(#[case] doc: Document) {
        assert!(matches!(
            Expr::from_document(&doc),
            Err(DocumentStoreError::InvalidFilter(_))
        ));
    }

    #[rstest]
    fn test_expression_is_written_as_filter_document() {
        // Arrange
        let expr = Filter::and([
            Filter::gte("age", 18),
            Filter::or([Filter::eq("role", "admin"), Filter::exists("badge")]),
            Filter::regex("name", "^al", "i"),
        ]);

        // Act
        let written = expr.to_document().unwrap();

        // Assert
        assert_eq!(
            written,
            doc! {
                "$and": [
                    { "age": { "$gte": 18 } },
                    { "$or": [{ "role": { "$eq": "admin" } }, { "badge": { "$exists": true } }] },
                    { "name": { "$regex": "^al", "$options": "i" } },
                ]
            }
        );
    }

    #[rstest]
    fn test_negation_is_written_as_nor() {
        // Act
        let written = Filter::eq("a", 1).not().to_document().unwrap();

        // Assert
        assert_eq!(written, doc! { "$nor": [{ "a": { "$eq": 1 } }] });
    }
}
