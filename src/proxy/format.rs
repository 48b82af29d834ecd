//! Console formatting for function output.

/// Pretty-print `text` when it is JSON, otherwise return it unchanged.
pub fn pretty_json(text: &str) -> String {
    serde_json::from_str::<serde_json::Value>(text)
        .and_then(|value| serde_json::to_string_pretty(&value))
        .unwrap_or_else(|_| text.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_formats_json() {
        assert_eq!(
            pretty_json(r#"{"statusCode":200,"body":"ok"}"#),
            "{\n  \"body\": \"ok\",\n  \"statusCode\": 200\n}"
        );
    }

    #[test]
    fn test_passes_through_non_json() {
        assert_eq!(pretty_json("plain text"), "plain text");
        assert_eq!(pretty_json(""), "");
    }
}
