use anyhow::{bail, Context};
use matrx_types::ToolInput;
use serde_json::Value;

/// Builds tool input from an optional JSON object plus `key=value` pairs.
/// Pairs win over keys from the object.
pub fn parse_tool_input(json: Option<&str>, pairs: &[String]) -> anyhow::Result<ToolInput> {
    let mut input = match json {
        Some(raw) => match serde_json::from_str::<Value>(raw).context("--input is not valid JSON")? {
            Value::Object(map) => map,
            other => bail!("--input must be a JSON object, got {}", kind(&other)),
        },
        None => ToolInput::new(),
    };

    for pair in pairs {
        let Some((key, value)) = pair.split_once('=') else {
            bail!("--arg expects KEY=VALUE, got '{}'", pair);
        };
        let key = key.trim();
        if key.is_empty() {
            bail!("--arg has an empty key: '{}'", pair);
        }
        let value = serde_json::from_str(value).unwrap_or_else(|_| Value::String(value.to_string()));
        input.insert(key.to_string(), value);
    }

    Ok(input)
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn pairs_override_json_and_parse_scalars() {
        let input = parse_tool_input(
            Some(r#"{"command":"ls","timeout":5}"#),
            &["timeout=30".to_string(), "cwd=/tmp".to_string()],
        )
        .unwrap();
        assert_eq!(input["command"], json!("ls"));
        assert_eq!(input["timeout"], json!(30));
        assert_eq!(input["cwd"], json!("/tmp"));
    }

    #[test]
    fn non_object_json_is_rejected() {
        let err = parse_tool_input(Some("[1,2]"), &[]).unwrap_err();
        assert!(err.to_string().contains("an array"));
    }

    #[test]
    fn malformed_pair_is_rejected() {
        assert!(parse_tool_input(None, &["novalue".to_string()]).is_err());
        assert!(parse_tool_input(None, &["=x".to_string()]).is_err());
    }

    #[test]
    fn no_input_is_an_empty_object() {
        assert!(parse_tool_input(None, &[]).unwrap().is_empty());
    }
}
