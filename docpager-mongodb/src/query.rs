//! Query translation from docpager expressions to MongoDB filter documents.

use bson::{Bson, Document};

use docpager_core::{
    error::DocumentStoreError,
    query::{Expr, Sort},
};

/// Translates docpager query expressions into MongoDB query documents.
pub(crate) struct MongoQueryTranslator;

impl MongoQueryTranslator {
    /// Translates an optional filter; `None` matches everything.
    pub fn translate(filter: Option<&Expr>) -> Result<Document, DocumentStoreError> {
        match filter {
            Some(expr) => expr.to_document(),
            None => Ok(Document::new()),
        }
    }

    /// Builds a MongoDB sort specification, preserving key order.
    pub fn sort(keys: &[Sort]) -> Option<Document> {
        if keys.is_empty() {
            return None;
        }

        Some(
            keys.iter()
                .map(|sort| (sort.field.clone(), Bson::Int32(sort.direction.as_i32())))
                .collect(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;
    use docpager_core::query::{Filter, SortDirection};
    use rstest::rstest;

    #[rstest]
    #[case(Filter::gte("age", 18), doc! { "age": { "$gte": 18 } })]
    #[case(Filter::any_of("tag", ["a", "b"]), doc! { "tag": { "$in": ["a", "b"] } })]
    #[case(Filter::regex("name", "^al", "i"), doc! { "name": { "$regex": "^al", "$options": "i" } })]
    #[case(Filter::text("rust"), doc! { "$text": { "$search": "rust" } })]
    #[case(Filter::exists("x"), doc! { "x": { "$exists": true } })]
    #[case(Filter::eq("a", 1).not(), doc! { "$nor": [{ "a": { "$eq": 1 } }] })]
    #[case(Filter::and([]), doc! {})]
    #[case(
        Filter::or([Filter::eq("a", 1), Filter::lt("b", 2)]),
        doc! { "$or": [{ "a": { "$eq": 1 } }, { "b": { "$lt": 2 } }] }
    )]
    fn test_translate(#[case] expr: Expr, #[case] expected: Document) {
        // Act
        let translated = MongoQueryTranslator::translate(Some(&expr)).unwrap();

        // Assert
        assert_eq!(translated, expected);
    }

    #[rstest]
    fn test_sort_keeps_key_order() {
        // Arrange
        let keys = vec![
            Sort::new("created_datetime", SortDirection::Desc),
            Sort::new("_id", SortDirection::Desc),
        ];

        // Act
        let sort = MongoQueryTranslator::sort(&keys).unwrap();

        // Assert
        let fields: Vec<&String> = sort.keys().collect();
        assert_eq!(fields, vec!["created_datetime", "_id"]);
        assert_eq!(sort.get_i32("_id").unwrap(), -1);
        assert!(MongoQueryTranslator::sort(&[]).is_none());
    }
}
