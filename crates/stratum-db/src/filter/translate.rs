use super::{Condition, Filter, FilterError};
use crate::{
    expr::{Col, Operator},
    traits::Predicates,
};

/// Applies every condition of `filter` to `target`, in order, one predicate
/// call per condition.
///
/// All column names are validated before the first predicate is added, so a
/// bad name leaves `target` untouched.
pub fn translate<P: Predicates + ?Sized>(filter: &Filter, target: &mut P) -> Result<(), FilterError> {
    let columns = filter
        .iter()
        .map(|(column, _)| Col::new(column))
        .collect::<Result<Vec<_>, _>>()?;

    for (column, (_, condition)) in columns.into_iter().zip(filter.iter()) {
        match condition.clone() {
            Condition::Eq(value) => target.where_cmp(column, Operator::Eq, value),
            Condition::Compare(op, value) => target.where_cmp(column, op, value),
            Condition::Or(op, value) => target.or_where(column, op, value),
            Condition::Null => target.where_null(column),
            Condition::In(values) => target.where_in(column, values),
            Condition::NotIn(values) => target.where_not_in(column, values),
            Condition::Between(low, high) => target.where_between(column, low, high),
            Condition::NotBetween(low, high) => target.where_not_between(column, low, high),
            Condition::JsonContains(value) => target.where_json_contains(column, value),
            Condition::JsonLength(op, length) => target.where_json_length(column, op, length),
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use serde_json::{json, Value};

    use super::*;

    /// Records every predicate call as a readable line.
    #[derive(Default)]
    struct Recorder {
        calls: Vec<String>,
    }

    impl Predicates for Recorder {
        fn where_cmp(&mut self, column: Col, op: Operator, value: Value) {
            self.calls.push(format!("where {column} {op} {value}"));
        }

        fn or_where(&mut self, column: Col, op: Operator, value: Value) {
            self.calls.push(format!("or_where {column} {op} {value}"));
        }

        fn where_null(&mut self, column: Col) {
            self.calls.push(format!("where_null {column}"));
        }

        fn where_in(&mut self, column: Col, values: Vec<Value>) {
            self.calls.push(format!("where_in {column} {}", Value::Array(values)));
        }

        fn where_not_in(&mut self, column: Col, values: Vec<Value>) {
            self.calls
                .push(format!("where_not_in {column} {}", Value::Array(values)));
        }

        fn where_between(&mut self, column: Col, low: Value, high: Value) {
            self.calls.push(format!("where_between {column} {low} {high}"));
        }

        fn where_not_between(&mut self, column: Col, low: Value, high: Value) {
            self.calls
                .push(format!("where_not_between {column} {low} {high}"));
        }

        fn where_json_contains(&mut self, column: Col, value: Value) {
            self.calls.push(format!("where_json_contains {column} {value}"));
        }

        fn where_json_length(&mut self, column: Col, op: Operator, length: i64) {
            self.calls
                .push(format!("where_json_length {column} {op} {length}"));
        }
    }

    fn record(value: Value) -> Vec<String> {
        let filter = Filter::from_json(&value).unwrap();
        let mut recorder = Recorder::default();
        translate(&filter, &mut recorder).unwrap();
        recorder.calls
    }

    #[test]
    fn test_each_tag_calls_its_predicate_once() {
        let cases = [
            (json!({"c": 1}), "where c = 1"),
            (json!({"c": [">", 2]}), "where c > 2"),
            (json!({"c": ["or", "<>", 3]}), "or_where c != 3"),
            (json!({"c": ["null"]}), "where_null c"),
            (json!({"c": ["in", [1, 2]]}), "where_in c [1,2]"),
            (json!({"c": ["not_in", [4]]}), "where_not_in c [4]"),
            (json!({"c": ["between", [1, 9]]}), "where_between c 1 9"),
            (json!({"c": ["not_between", [1, 9]]}), "where_not_between c 1 9"),
            (json!({"c": ["json_contains", "x"]}), "where_json_contains c \"x\""),
            (json!({"c": ["json_length", ">=", 2]}), "where_json_length c >= 2"),
            (json!({"c": ["json_length", 5]}), "where_json_length c = 5"),
        ];

        for (filter, expected) in cases {
            assert_eq!(record(filter.clone()), vec![expected.to_string()], "{filter}");
        }
    }

    #[test]
    fn test_empty_condition_adds_nothing() {
        assert!(record(json!({"c": []})).is_empty());
        assert_eq!(record(json!({"a": [], "b": 2})), vec!["where b = 2"]);
    }

    #[test]
    fn test_predicates_follow_filter_order() {
        let calls = record(json!({
            "status": 1,
            "role": ["or", "=", "admin"],
            "deleted": ["null"],
        }));
        assert_eq!(
            calls,
            vec!["where status = 1", "or_where role = \"admin\"", "where_null deleted"]
        );
    }

    #[test]
    fn test_invalid_column_leaves_target_untouched() {
        let filter = Filter::new()
            .with("ok", Condition::eq(1))
            .with("bad column", Condition::eq(2));
        let mut recorder = Recorder::default();

        assert!(matches!(
            translate(&filter, &mut recorder),
            Err(FilterError::InvalidColumn(name)) if name == "bad column"
        ));
        assert!(recorder.calls.is_empty());
    }
}
