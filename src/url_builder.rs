// URL construction: endpoint templates with {name} placeholders plus an encoded query string

use serde_json::Value;
use std::collections::HashMap;
use url::form_urlencoded;

pub type Params = HashMap<String, Value>;

// Ordered query parameters. A `None` value is an undefined entry and is dropped
// when the query is encoded; an explicit `Value::Null` is kept.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Query {
    entries: Vec<(String, Option<Value>)>,
}

impl Query {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.entries.push((key.to_string(), Some(value.into())));
        self
    }

    pub fn with_optional<V: Into<Value>>(mut self, key: &str, value: Option<V>) -> Self {
        self.entries.push((key.to_string(), value.map(Into::into)));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    // Encode surviving entries as application/x-www-form-urlencoded
    pub fn encode(&self) -> String {
        let mut serializer = form_urlencoded::Serializer::new(String::new());
        for (key, value) in &self.entries {
            if let Some(value) = value {
                serializer.append_pair(key, &query_value_to_string(value));
            }
        }
        serializer.finish()
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Query {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            entries: iter
                .into_iter()
                .map(|(k, v)| (k.into(), Some(v.into())))
                .collect(),
        }
    }
}

// Builds the final request URL.
//
// Placeholders are replaced only when `params` is supplied; a missing or null
// param renders as an empty string. Placeholders whose name is not a plain
// identifier are left in the URL untouched. The `?` separator (and the raw
// `query_prefix`) only appear when the encoded query is non-empty.
pub fn build_url(
    base_url: &str,
    endpoint: &str,
    params: Option<&Params>,
    query: Option<&Query>,
    query_prefix: Option<&str>,
) -> String {
    let rendered = match params {
        Some(params) => render_template(endpoint, params),
        None => endpoint.to_string(),
    };

    let encoded = query.map(Query::encode).unwrap_or_default();
    if encoded.is_empty() {
        format!("{}{}", base_url, rendered)
    } else {
        format!(
            "{}{}?{}{}",
            base_url,
            rendered,
            query_prefix.unwrap_or_default(),
            encoded
        )
    }
}

pub fn render_template(template: &str, params: &Params) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        match after.find('}') {
            Some(close) if is_placeholder_name(&after[..close]) => {
                let name = &after[..close];
                out.push_str(&param_to_string(params.get(name)));
                rest = &after[close + 1..];
            }
            _ => {
                out.push('{');
                rest = after;
            }
        }
    }
    out.push_str(rest);
    out
}

fn is_placeholder_name(name: &str) -> bool {
    !name.is_empty() && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn param_to_string(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(Value::Array(items)) => join_list(items),
        Some(other) => scalar_to_string(other),
    }
}

fn query_value_to_string(value: &Value) -> String {
    match value {
        Value::Null => "null".to_string(),
        Value::String(s) => s.clone(),
        Value::Array(items) => join_list(items),
        other => scalar_to_string(other),
    }
}

// Whole floats print without a fractional part, so 2.0 renders as "2"
fn scalar_to_string(value: &Value) -> String {
    match value {
        Value::Number(n) if n.is_f64() => match n.as_f64() {
            Some(f) if f == 0.0 => "0".to_string(),
            Some(f) if f.is_finite() && f.fract() == 0.0 && f.abs() < 1e21 => format!("{f:.0}"),
            _ => n.to_string(),
        },
        other => other.to_string(),
    }
}

// Lists render the way a JavaScript array joins: nulls become empty slots
fn join_list(items: &[Value]) -> String {
    items
        .iter()
        .map(|item| match item {
            Value::Null => String::new(),
            Value::String(s) => s.clone(),
            Value::Array(inner) => join_list(inner),
            other => scalar_to_string(other),
        })
        .collect::<Vec<_>>()
        .join(",")
}
