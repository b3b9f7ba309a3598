use crate::value::{Float64, Value};
use serde_json::{Map as JsonMap, Number, Value as JsonValue};

impl From<JsonValue> for Value {
    fn from(value: JsonValue) -> Self {
        match value {
            JsonValue::Null => Self::Null,
            JsonValue::Bool(v) => Self::Bool(v),
            JsonValue::Number(n) => from_json_number(&n),
            JsonValue::String(s) => Self::Text(s),
            JsonValue::Array(items) => Self::List(items.into_iter().map(Self::from).collect()),
            JsonValue::Object(map) => {
                Self::Map(map.into_iter().map(|(k, v)| (k, Self::from(v))).collect())
            }
        }
    }
}

// Integers that fit i64 stay exact; everything else goes through f64.
fn from_json_number(n: &Number) -> Value {
    if let Some(v) = n.as_i64() {
        return Value::Int(v);
    }

    n.as_f64()
        .and_then(Float64::try_new)
        .map_or(Value::Null, Value::Float)
}

impl From<Value> for JsonValue {
    fn from(value: Value) -> Self {
        match value {
            Value::Null => Self::Null,
            Value::Bool(v) => Self::Bool(v),
            Value::Int(v) => Self::Number(v.into()),
            Value::Float(v) => Number::from_f64(v.get()).map_or(Self::Null, Self::Number),
            Value::Text(s) => Self::String(s),
            Value::List(items) => Self::Array(items.into_iter().map(Self::from).collect()),
            Value::Map(map) => Self::Object(
                map.into_iter()
                    .map(|(k, v)| (k, Self::from(v)))
                    .collect::<JsonMap<_, _>>(),
            ),
        }
    }
}
