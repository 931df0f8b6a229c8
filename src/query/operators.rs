//! Selector evaluation: value ordering, equality and the field operators a
//! cursor filter may use.

use std::cmp::Ordering;

use serde_json::{Map, Value};

use crate::error::{QueryError, Result};

// ============================================================================
// Ordering and equality
// ============================================================================

/// Total order used by sorts and range operators.
///
/// Nulls sort last. Numbers compare numerically, strings by codepoint,
/// booleans `false < true`. Values of different kinds order as
/// number < string < boolean < anything else.
pub fn compare_values(a: &Value, b: &Value) -> Ordering {
    fn kind(v: &Value) -> u8 {
        match v {
            Value::Number(_) => 0,
            Value::String(_) => 1,
            Value::Bool(_) => 2,
            _ => 3,
        }
    }

    match (a, b) {
        (Value::Null, Value::Null) => Ordering::Equal,
        (Value::Null, _) => Ordering::Greater,
        (_, Value::Null) => Ordering::Less,
        (Value::Number(x), Value::Number(y)) => match (x.as_f64(), y.as_f64()) {
            (Some(x), Some(y)) => x.total_cmp(&y),
            _ => Ordering::Equal,
        },
        (Value::String(x), Value::String(y)) => x.cmp(y),
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        _ => kind(a).cmp(&kind(b)),
    }
}

/// Structural equality where `1` and `1.0` are the same number.
pub fn deep_equals(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64() == y.as_f64(),
        (Value::Array(xs), Value::Array(ys)) => {
            xs.len() == ys.len() && xs.iter().zip(ys).all(|(x, y)| deep_equals(x, y))
        }
        (Value::Object(xs), Value::Object(ys)) => {
            xs.len() == ys.len()
                && xs
                    .iter()
                    .all(|(key, x)| ys.get(key).is_some_and(|y| deep_equals(x, y)))
        }
        _ => a == b,
    }
}

/// An object whose keys are all operators, e.g. `{"$gte": 3}`.
pub fn is_operator(value: &Value) -> bool {
    value
        .as_object()
        .is_some_and(|obj| !obj.is_empty() && obj.keys().all(|k| k.starts_with('$')))
}

/// Resolve a dot path. Numeric segments index into arrays.
pub fn get_field_value<'a>(doc: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.').try_fold(doc, |current, segment| match current {
        Value::Object(fields) => fields.get(segment),
        Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    })
}

// ============================================================================
// Field operators
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FieldOp {
    Eq,
    Ne,
    Gt,
    Gte,
    Lt,
    Lte,
    In,
    Nin,
    Size,
}

impl FieldOp {
    fn parse(name: &str) -> Result<Self> {
        Ok(match name {
            "$eq" => Self::Eq,
            "$ne" => Self::Ne,
            "$gt" => Self::Gt,
            "$gte" => Self::Gte,
            "$lt" => Self::Lt,
            "$lte" => Self::Lte,
            "$in" => Self::In,
            "$nin" => Self::Nin,
            "$size" => Self::Size,
            other => return Err(QueryError::UnknownOperator(other.to_string()).into()),
        })
    }

    fn is_range(self) -> bool {
        matches!(self, Self::Gt | Self::Gte | Self::Lt | Self::Lte)
    }

    /// Test one value, without looking inside arrays.
    fn test(self, value: &Value, operand: &Value) -> bool {
        match self {
            Self::Eq => deep_equals(value, operand),
            Self::Ne => !deep_equals(value, operand),
            Self::Gt | Self::Gte | Self::Lt | Self::Lte => {
                if value.is_null() || operand.is_null() {
                    return false;
                }
                let ord = compare_values(value, operand);
                match self {
                    Self::Gt => ord.is_gt(),
                    Self::Gte => ord.is_ge(),
                    Self::Lt => ord.is_lt(),
                    _ => ord.is_le(),
                }
            }
            Self::In => operand.as_array().is_some_and(|candidates| {
                let hit = |v: &Value| candidates.iter().any(|c| deep_equals(v, c));
                match value.as_array() {
                    Some(items) => items.iter().any(hit),
                    None => hit(value),
                }
            }),
            Self::Nin => !Self::In.test(value, operand),
            Self::Size => match (value.as_array(), operand.as_u64()) {
                (Some(items), Some(n)) => items.len() as u64 == n,
                _ => false,
            },
        }
    }

    /// Test a field value. Against a scalar operand, an array field matches
    /// when any element does (`$ne`: when no element is equal).
    fn matches(self, value: &Value, operand: &Value) -> bool {
        match value.as_array() {
            Some(items) if !operand.is_array() && (self == Self::Eq || self.is_range()) => {
                items.iter().any(|item| self.test(item, operand))
            }
            Some(items) if !operand.is_array() && self == Self::Ne => {
                items.iter().all(|item| self.test(item, operand))
            }
            _ => self.test(value, operand),
        }
    }
}

/// Every operator in `ops` must hold for the (possibly missing) field value.
fn field_matches(value: Option<&Value>, ops: &Map<String, Value>) -> Result<bool> {
    for (name, operand) in ops {
        let holds = if name == "$exists" {
            operand.as_bool().unwrap_or(false) == value.is_some()
        } else {
            FieldOp::parse(name)?.matches(value.unwrap_or(&Value::Null), operand)
        };
        if !holds {
            return Ok(false);
        }
    }
    Ok(true)
}

// ============================================================================
// Filters
// ============================================================================

fn sub_filters<'a>(op: &str, condition: &'a Value) -> Result<&'a Vec<Value>> {
    condition
        .as_array()
        .ok_or_else(|| QueryError::InvalidSelector(format!("{op} expects an array")).into())
}

/// Evaluate a filter document against `doc`. Top-level keys are ANDed;
/// `$and`, `$or` and `$not` combine sub-filters. A non-object filter matches
/// everything.
pub fn matches_filter(doc: &Value, filter: &Value) -> Result<bool> {
    let Some(clauses) = filter.as_object() else {
        return Ok(true);
    };

    for (key, condition) in clauses {
        let holds = match key.as_str() {
            "$and" => {
                let mut all = true;
                for sub in sub_filters(key, condition)? {
                    if !matches_filter(doc, sub)? {
                        all = false;
                        break;
                    }
                }
                all
            }
            "$or" => {
                let mut any = false;
                for sub in sub_filters(key, condition)? {
                    if matches_filter(doc, sub)? {
                        any = true;
                        break;
                    }
                }
                any
            }
            "$not" => !matches_filter(doc, condition)?,
            op if op.starts_with('$') => {
                return Err(QueryError::UnknownOperator(op.to_string()).into());
            }
            path => {
                let value = get_field_value(doc, path);
                match condition.as_object() {
                    Some(ops) if is_operator(condition) => field_matches(value, ops)?,
                    _ => FieldOp::Eq.matches(value.unwrap_or(&Value::Null), condition),
                }
            }
        };
        if !holds {
            return Ok(false);
        }
    }
    Ok(true)
}
