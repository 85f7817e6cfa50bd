use async_trait::async_trait;
use reqwest::RequestBuilder;

/// Supplies the bearer token at request time, so refreshed tokens are picked
/// up without rebuilding the client.
#[async_trait]
pub trait TokenProvider: Send + Sync {
    async fn token(&self) -> Option<String>;
}

/// A token fixed at construction, e.g. from `MATRX_API_TOKEN`.
#[derive(Clone)]
pub struct StaticToken(String);

impl StaticToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }
}

impl std::fmt::Debug for StaticToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("StaticToken")
            .field(&matrx_observability::redact_text(&self.0))
            .finish()
    }
}

#[async_trait]
impl TokenProvider for StaticToken {
    async fn token(&self) -> Option<String> {
        Some(self.0.clone())
    }
}

pub(crate) fn apply_auth(
    builder: RequestBuilder,
    token: Option<&str>,
    user_id: Option<&str>,
) -> RequestBuilder {
    let builder = match token {
        Some(token) if !token.is_empty() => builder.bearer_auth(token),
        _ => builder,
    };
    match user_id {
        Some(user_id) => builder.header("X-User-Id", user_id),
        None => builder,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn static_token_is_returned_and_redacted_in_debug() {
        let provider = StaticToken::new("secret-value");
        assert_eq!(provider.token().await.as_deref(), Some("secret-value"));
        assert!(!format!("{:?}", provider).contains("secret-value"));
    }

    #[test]
    fn apply_auth_sets_bearer_and_user_headers() {
        let client = reqwest::Client::new();
        let request = apply_auth(
            client.get("http://127.0.0.1:1/"),
            Some("abc"),
            Some("user-7"),
        )
        .build()
        .unwrap();
        assert_eq!(
            request.headers().get("authorization").unwrap(),
            "Bearer abc"
        );
        assert_eq!(request.headers().get("x-user-id").unwrap(), "user-7");
    }

    #[test]
    fn apply_auth_skips_empty_token() {
        let client = reqwest::Client::new();
        let request = apply_auth(client.get("http://127.0.0.1:1/"), Some(""), None)
            .build()
            .unwrap();
        assert!(request.headers().get("authorization").is_none());
    }
}
