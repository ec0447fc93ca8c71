#[cfg(test)]
mod tests {
    use super::super::*;
    use axum::http::{HeaderMap, HeaderValue};

    fn valid_registration() -> RegisterRequest {
        RegisterRequest {
            username: "ada".to_string(),
            email: "ada@example.com".to_string(),
            first_name: "Ada".to_string(),
            last_name: "Lovelace".to_string(),
            password1: "analytical-engine".to_string(),
            password2: "analytical-engine".to_string(),
        }
    }

    #[test]
    fn test_hash_token_is_sha256_hex() {
        let hash = hash_token("abc");
        assert_eq!(
            hash,
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
        assert_ne!(hash_token("abd"), hash);
    }

    #[test]
    fn test_generated_tokens_are_unique() {
        let a = generate_session_token();
        let b = generate_session_token();
        assert_eq!(a.len(), 64);
        assert_ne!(a, b);
    }

    #[test]
    fn test_extract_session_token_from_bearer() {
        let mut headers = HeaderMap::new();
        headers.insert("Authorization", HeaderValue::from_static("Bearer tok_123"));
        assert_eq!(extract_session_token(&headers).as_deref(), Some("tok_123"));
    }

    #[test]
    fn test_extract_session_token_from_cookie() {
        let mut headers = HeaderMap::new();
        headers.insert(
            "cookie",
            HeaderValue::from_static("theme=dark; session=tok_456"),
        );
        assert_eq!(extract_session_token(&headers).as_deref(), Some("tok_456"));
    }

    #[test]
    fn test_bearer_wins_over_cookie() {
        let mut headers = HeaderMap::new();
        headers.insert("Authorization", HeaderValue::from_static("Bearer header"));
        headers.insert("cookie", HeaderValue::from_static("session=cookie"));
        assert_eq!(extract_session_token(&headers).as_deref(), Some("header"));
    }

    #[test]
    fn test_extract_session_token_missing() {
        let mut headers = HeaderMap::new();
        assert!(extract_session_token(&headers).is_none());

        headers.insert("Authorization", HeaderValue::from_static("Basic abc"));
        assert!(extract_session_token(&headers).is_none());

        headers.insert("Authorization", HeaderValue::from_static("Bearer "));
        assert!(extract_session_token(&headers).is_none());
    }

    #[test]
    fn test_valid_registration_has_no_errors() {
        assert!(validate_registration(&valid_registration()).is_empty());
    }

    #[test]
    fn test_registration_requires_every_field() {
        let errors = validate_registration(&RegisterRequest::default());
        for field in ["username", "email", "first_name", "last_name", "password1", "password2"] {
            assert_eq!(
                errors.get(field),
                Some(&vec!["This field is required.".to_string()]),
                "field {}",
                field
            );
        }
    }

    #[test]
    fn test_registration_password_mismatch() {
        let mut req = valid_registration();
        req.password2 = "something-else".to_string();
        let errors = validate_registration(&req);
        assert_eq!(
            errors.get("password2"),
            Some(&vec!["Passwords don't match.".to_string()])
        );
    }

    #[test]
    fn test_registration_password_strength() {
        let mut req = valid_registration();
        req.password1 = "1234".to_string();
        req.password2 = "1234".to_string();
        let errors = validate_registration(&req);
        let messages = &errors["password2"];
        assert_eq!(messages.len(), 2);
        assert!(messages[0].contains("too short"));
        assert!(messages[1].contains("entirely numeric"));
    }

    #[test]
    fn test_registration_email_format() {
        let mut req = valid_registration();
        req.email = "not-an-email".to_string();
        assert!(validate_registration(&req).contains_key("email"));
    }
}
