pub fn prost_struct_to_json_value(prost_struct: prost_types::Struct) -> serde_json::Value {
    serde_json::Value::Object(
        prost_struct
            .fields
            .into_iter()
            .map(|(k, v)| (k, prost_to_json_value(v)))
            .collect(),
    )
}

pub fn json_map_to_prost_struct(
    json: serde_json::Map<String, serde_json::Value>,
) -> prost_types::Struct {
    prost_types::Struct {
        fields: json
            .into_iter()
            .map(|(k, v)| (k, json_value_to_prost(v)))
            .collect(),
    }
}

fn prost_to_json_value(prost_value: prost_types::Value) -> serde_json::Value {
    use prost_types::value::Kind::*;
    use serde_json::Value::*;
    match prost_value.kind {
        Some(x) => match x {
            NullValue(_) => Null,
            BoolValue(v) => Bool(v),
            NumberValue(n) => serde_json::Number::from_f64(n).map(Number).unwrap_or(Null),
            StringValue(s) => String(s),
            ListValue(lst) => Array(lst.values.into_iter().map(prost_to_json_value).collect()),
            StructValue(v) => prost_struct_to_json_value(v),
        },
        None => Null,
    }
}

fn json_value_to_prost(json_value: serde_json::Value) -> prost_types::Value {
    use prost_types::value::Kind::*;
    use serde_json::Value::*;
    prost_types::Value {
        kind: Some(match json_value {
            Null => NullValue(prost_types::NullValue::NullValue as i32),
            Bool(v) => BoolValue(v),
            Number(n) => match n.as_f64() {
                Some(f) => NumberValue(f),
                None => StringValue(n.to_string()),
            },
            String(s) => StringValue(s),
            Array(v) => ListValue(prost_types::ListValue {
                values: v.into_iter().map(json_value_to_prost).collect(),
            }),
            Object(v) => StructValue(json_map_to_prost_struct(v)),
        }),
    }
}
