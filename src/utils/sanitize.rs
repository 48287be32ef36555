use serde_json::Value;

/// Masks credentials in JSON payloads before they reach the log.
pub fn sanitize_json(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut sanitized = serde_json::Map::new();
            for (key, val) in map {
                let sanitized_val = if is_sensitive_field(key) {
                    mask_value(val)
                } else {
                    sanitize_json(val)
                };
                sanitized.insert(key.clone(), sanitized_val);
            }
            Value::Object(sanitized)
        }
        Value::Array(arr) => Value::Array(arr.iter().map(sanitize_json).collect()),
        _ => value.clone(),
    }
}

/// Same masking for a raw query string; keeps parameter order.
pub fn sanitize_query(query: &str) -> String {
    url::form_urlencoded::parse(query.as_bytes())
        .map(|(key, value)| {
            if is_sensitive_field(&key) {
                format!("{}=****", key)
            } else {
                format!("{}={}", key, value)
            }
        })
        .collect::<Vec<_>>()
        .join("&")
}

fn is_sensitive_field(key: &str) -> bool {
    let key = key.to_lowercase();
    key.contains("password")
        || key.contains("token")
        || key.contains("secret")
        || matches!(
            key.as_str(),
            "api_key" | "authorization" | "vnp_securehash"
        )
}

fn mask_value(value: &Value) -> Value {
    match value {
        Value::String(s) => Value::String(mask_secret(s)),
        _ => Value::String("****".to_string()),
    }
}

/// Long secrets keep a four-character prefix for recognition; short ones are
/// hidden entirely.
pub fn mask_secret(secret: &str) -> String {
    if secret.chars().count() > 12 {
        let visible: String = secret.chars().take(4).collect();
        format!("{}****", visible)
    } else {
        "****".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn masks_passwords_and_keeps_other_fields() {
        let input = json!({
            "email": "khach@example.com",
            "password": "thitbo123",
            "new_password": "thitheo456"
        });

        let sanitized = sanitize_json(&input);
        assert_eq!(sanitized["password"], "****");
        assert_eq!(sanitized["new_password"], "****");
        assert_eq!(sanitized["email"], "khach@example.com");
    }

    #[test]
    fn masks_nested_tokens() {
        let input = json!({
            "reset": {
                "token": "0123456789abcdef0123456789abcdef",
                "note": "hello"
            }
        });

        let sanitized = sanitize_json(&input);
        assert_eq!(sanitized["reset"]["token"], "0123****");
        assert_eq!(sanitized["reset"]["note"], "hello");
    }

    #[test]
    fn masks_secure_hash_in_query() {
        let query = "vnp_Amount=10000000&vnp_TxnRef=42&vnp_SecureHash=abcdef";
        assert_eq!(
            sanitize_query(query),
            "vnp_Amount=10000000&vnp_TxnRef=42&vnp_SecureHash=****"
        );
    }
}
