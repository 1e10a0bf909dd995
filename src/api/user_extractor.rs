use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{request::Parts, HeaderMap, StatusCode},
};
use crate::model::UserContext;

/// Axum extractor for UserContext from request headers
///
/// - X-User-Id: caller identifier
/// - X-Acl-Type: highest role level the caller may see
/// - X-Acl-Code-Prefixes: comma separated organization prefixes
/// - X-Session-Id: scope of the duplicate-submission guard
///
/// For development/testing, if no user header is present, returns a default
/// user without scope restrictions.
#[async_trait]
impl<S> FromRequestParts<S> for UserContext
where
    S: Send + Sync,
{
    type Rejection = StatusCode;

    async fn from_request_parts(
        parts: &mut Parts,
        _state: &S,
    ) -> Result<Self, Self::Rejection> {
        let headers = &parts.headers;

        let mut user = match extract_header_value(headers, "x-user-id") {
            Some(user_id) => UserContext::new(user_id),
            None => UserContext::default_user(),
        };

        if let Some(acl_type) = extract_header_value(headers, "x-acl-type") {
            let acl_type = acl_type
                .trim()
                .parse::<i32>()
                .map_err(|_| StatusCode::BAD_REQUEST)?;
            user = user.with_acl_type(acl_type);
        }
        if let Some(prefixes) = extract_header_value(headers, "x-acl-code-prefixes") {
            user = user.with_acl_code_prefixes(split_prefixes(&prefixes));
        }
        if let Some(session_id) = extract_header_value(headers, "x-session-id") {
            user = user.with_session(session_id);
        }

        Ok(user)
    }
}

/// Extract header value as string
fn extract_header_value(headers: &HeaderMap, header_name: &str) -> Option<String> {
    headers
        .get(header_name)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
}

fn split_prefixes(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;

    async fn extract(request: Request<()>) -> Result<UserContext, StatusCode> {
        let (mut parts, _) = request.into_parts();
        UserContext::from_request_parts(&mut parts, &()).await
    }

    #[tokio::test]
    async fn test_user_context_extraction() {
        let request = Request::builder()
            .header("x-user-id", "lead")
            .header("x-acl-type", "2")
            .header("x-acl-code-prefixes", "D10, D20,")
            .header("x-session-id", "tab-1")
            .body(())
            .unwrap();

        let user = extract(request).await.unwrap();
        assert_eq!(user.user_id, "lead");
        assert_eq!(user.acl_type, Some(2));
        assert_eq!(user.acl_code_prefixes, vec!["D10", "D20"]);
        assert_eq!(user.session_key(), "tab-1");
    }

    #[tokio::test]
    async fn missing_headers_yield_the_development_user() {
        let user = extract(Request::builder().body(()).unwrap()).await.unwrap();
        assert_eq!(user, UserContext::default_user());
        assert!(!user.is_scope_restricted());
    }

    #[tokio::test]
    async fn malformed_acl_type_is_rejected() {
        let request = Request::builder()
            .header("x-acl-type", "high")
            .body(())
            .unwrap();
        assert_eq!(extract(request).await.unwrap_err(), StatusCode::BAD_REQUEST);
    }
}
