//! Parsing the loose JSON filter shape into typed conditions.

use serde_json::Value;

use super::{Condition, Filter, FilterError};
use crate::expr::Operator;

impl Filter {
    /// Parses a JSON object of `column -> condition`. `null` is an empty
    /// filter; any other non-object is an error.
    pub fn from_json(value: &Value) -> Result<Self, FilterError> {
        let map = match value {
            Value::Null => return Ok(Filter::new()),
            Value::Object(map) => map,
            other => return Err(FilterError::NotAnObject(kind_of(other).to_string())),
        };

        let mut filter = Filter::new();
        for (column, raw) in map {
            if let Some(condition) = Condition::from_json(column, raw)? {
                filter.insert(column.clone(), condition);
            }
        }
        Ok(filter)
    }
}

impl Condition {
    /// Resolves one condition from the shape of its value.
    ///
    /// Returns `None` for an empty array or empty object, which contribute
    /// no predicate.
    /// An array whose first element is not a known tag is read as
    /// `[op, operand]`; an operator that is not recognised turns into an
    /// equality test against the first element.
    pub fn from_json(column: &str, value: &Value) -> Result<Option<Self>, FilterError> {
        let items = match value {
            Value::Array(items) if items.is_empty() => return Ok(None),
            Value::Object(map) if map.is_empty() => return Ok(None),
            Value::Array(items) => items,
            Value::String(s) if s.eq_ignore_ascii_case("null") => return Ok(Some(Condition::Null)),
            other => return Ok(Some(Condition::Eq(other.clone()))),
        };

        let tag = match &items[0] {
            Value::String(s) => s.to_lowercase(),
            _ => String::new(),
        };

        let condition = match tag.as_str() {
            "eq" => Condition::Eq(items.get(1).cloned().unwrap_or(Value::Null)),
            "or" => {
                let (op, operand) = comparison(items.get(1), items.get(2));
                Condition::Or(op, operand)
            }
            "null" => Condition::Null,
            "in" => Condition::In(list_operand(column, items.get(1))?),
            "not_in" => Condition::NotIn(list_operand(column, items.get(1))?),
            "between" => {
                let (low, high) = bounds(column, items.get(1))?;
                Condition::Between(low, high)
            }
            "not_between" => {
                let (low, high) = bounds(column, items.get(1))?;
                Condition::NotBetween(low, high)
            }
            "json_contains" => match items.get(1) {
                Some(needle) => Condition::JsonContains(needle.clone()),
                None => return Err(FilterError::malformed(column, "json_contains needs a value")),
            },
            "json_length" => json_length(column, &items[1..])?,
            _ => {
                let (op, operand) = comparison(items.first(), items.get(1));
                if op == Operator::Eq {
                    Condition::Eq(operand)
                } else {
                    Condition::Compare(op, operand)
                }
            }
        };

        Ok(Some(condition))
    }
}

/// `[op, operand]` with a valid operator, or equality against `op` itself.
fn comparison(op: Option<&Value>, operand: Option<&Value>) -> (Operator, Value) {
    match op.and_then(Value::as_str).and_then(Operator::parse) {
        Some(op) => (op, operand.cloned().unwrap_or(Value::Null)),
        None => (Operator::Eq, op.cloned().unwrap_or(Value::Null)),
    }
}

fn list_operand(column: &str, operand: Option<&Value>) -> Result<Vec<Value>, FilterError> {
    match operand {
        Some(Value::Array(values)) => Ok(values.clone()),
        Some(scalar) => Ok(vec![scalar.clone()]),
        None => Err(FilterError::malformed(column, "in/not_in needs a list")),
    }
}

fn bounds(column: &str, operand: Option<&Value>) -> Result<(Value, Value), FilterError> {
    match operand {
        Some(Value::Array(values)) if values.len() >= 2 => Ok((values[0].clone(), values[1].clone())),
        _ => Err(FilterError::malformed(
            column,
            "between needs a [low, high] pair",
        )),
    }
}

fn json_length(column: &str, operands: &[Value]) -> Result<Condition, FilterError> {
    let (op, length) = match operands {
        [length] => (Operator::Eq, length),
        [op, length, ..] => {
            let op = op
                .as_str()
                .and_then(Operator::parse)
                .ok_or_else(|| FilterError::malformed(column, format!("invalid operator {op}")))?;
            (op, length)
        }
        [] => return Err(FilterError::malformed(column, "json_length needs a length")),
    };

    let length = match length {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
    .ok_or_else(|| FilterError::malformed(column, format!("length must be an integer, got {length}")))?;

    Ok(Condition::JsonLength(op, length))
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
