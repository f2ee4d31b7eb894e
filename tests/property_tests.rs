//! Property-based tests for statement construction
//!
//! These tests check the guarantees the SQL builder gives every client:
//! - Text literals cannot break out of their quotes, whatever they contain
//! - Names that are not plain identifiers never reach a statement
//! - Limiting clauses land where each dialect expects them

#[cfg(test)]
mod tests {
    use plantdb::sql::{validate_identifier, Dialect, SqlBuilder};
    use plantdb::{Filter, LimitPolicy, Query, Value};
    use proptest::prelude::*;
    use rusqlite::Connection;

    fn arb_identifier() -> impl Strategy<Value = String> {
        "[a-zA-Z_][a-zA-Z0-9_]{0,29}".prop_map(|s: String| s)
    }

    /// Strings that are not identifiers: empty, leading digit, or containing
    /// at least one character outside `[A-Za-z0-9_]`.
    fn arb_non_identifier() -> impl Strategy<Value = String> {
        prop_oneof![
            Just(String::new()),
            "[0-9][a-zA-Z0-9_]{0,10}",
            "[a-zA-Z_]{0,5}[ ;'\"().*=-][a-zA-Z0-9_ ]{0,5}",
        ]
    }

    fn arb_value() -> impl Strategy<Value = Value> {
        prop_oneof![
            Just(Value::Null),
            any::<bool>().prop_map(Value::Bool),
            any::<i64>().prop_map(Value::Int),
            any::<f64>().prop_map(Value::Float),
            ".*".prop_map(Value::Text),
        ]
    }

    fn arb_filter() -> impl Strategy<Value = Filter> {
        let leaf = prop_oneof![
            (arb_identifier(), arb_value()).prop_map(|(c, v)| Filter::eq(c, v)),
            (arb_identifier(), arb_value()).prop_map(|(c, v)| Filter::gt(c, v)),
            (arb_identifier(), arb_value()).prop_map(|(c, v)| Filter::ne(c, v)),
            arb_identifier().prop_map(Filter::is_null),
            ".*".prop_map(Filter::raw),
            ".*".prop_map(|c: String| Filter::eq(c, 1)),
        ];
        leaf.prop_recursive(3, 16, 4, |inner| {
            prop_oneof![
                prop::collection::vec(inner.clone(), 0..4).prop_map(Filter::And),
                prop::collection::vec(inner, 0..4).prop_map(Filter::Or),
            ]
        })
    }

    /// Reverses the backslash escaping of a time-series text literal.
    fn unescape_taos(literal: &str) -> Option<String> {
        let body = literal.strip_prefix('\'')?.strip_suffix('\'')?;
        let mut out = String::new();
        let mut chars = body.chars();
        while let Some(c) = chars.next() {
            match c {
                '\\' => out.push(chars.next()?),
                '\'' => return None,
                other => out.push(other),
            }
        }
        Some(out)
    }

    proptest! {
        /// A quoted text literal evaluates back to exactly the original text
        #[test]
        fn prop_tsql_text_literal_is_sealed(text in r"[^\x00]*") {
            let literal = SqlBuilder::new(Dialect::TSql).literal(&Value::Text(text.clone()));
            prop_assert_eq!(literal.matches('\'').count(), 2 + 2 * text.matches('\'').count());

            let conn = Connection::open_in_memory().unwrap();
            let back: String = conn
                .query_row(&format!("SELECT {}", literal), [], |row| row.get(0))
                .unwrap();
            prop_assert_eq!(back, text);
        }

        #[test]
        fn prop_taos_text_literal_is_sealed(text in ".*") {
            let literal = SqlBuilder::new(Dialect::Taos).literal(&Value::Text(text.clone()));
            prop_assert_eq!(unescape_taos(&literal), Some(text));
        }

        #[test]
        fn prop_identifiers_are_accepted(name in arb_identifier()) {
            prop_assert!(validate_identifier(&name).is_ok());
            let sql = SqlBuilder::new(Dialect::Access).drop_table(&name).unwrap();
            prop_assert_eq!(sql, format!("DROP TABLE {}", name));
        }

        /// Non-identifiers are rejected as precondition errors before any SQL is built
        #[test]
        fn prop_non_identifiers_are_rejected(name in arb_non_identifier()) {
            let err = validate_identifier(&name).unwrap_err();
            prop_assert!(err.is_precondition());

            let builder = SqlBuilder::qualified(Dialect::Taos, "plant");
            prop_assert!(builder.select(&Query::table(name.clone())).unwrap_err().is_precondition());
            prop_assert!(builder.delete(&name, None).unwrap_err().is_precondition());
            let update = builder.update("t", &[(name, Value::Int(1))], None);
            prop_assert!(update.unwrap_err().is_precondition());
        }

        /// Rendering a predicate never panics; failures are precondition errors
        #[test]
        fn prop_predicate_rendering_is_total(filter in arb_filter()) {
            for dialect in [Dialect::Access, Dialect::TSql, Dialect::Taos] {
                if let Err(e) = SqlBuilder::new(dialect).predicate(&filter) {
                    prop_assert!(e.is_precondition());
                }
            }
        }

        #[test]
        fn prop_limit_placement(table in arb_identifier(), n in 1u64..10_000) {
            let query = Query::table(table).limit(LimitPolicy::Top(n));

            let tsql = SqlBuilder::new(Dialect::TSql).select(&query).unwrap();
            let top = format!("SELECT TOP {} ", n);
            let limit = format!(" LIMIT {}", n);
            prop_assert!(tsql.starts_with(&top));
            prop_assert!(!tsql.ends_with(&limit));

            let taos = SqlBuilder::qualified(Dialect::Taos, "plant").select(&query).unwrap();
            prop_assert!(taos.starts_with("SELECT * FROM plant."));
            prop_assert!(taos.ends_with(&limit));
        }
    }
}
