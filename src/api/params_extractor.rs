use axum::{
    async_trait,
    extract::{FromRequest, Query, Request},
    http::{header::CONTENT_TYPE, Method},
    Form,
};

use crate::error::EngineError;
use crate::model::{RequestParams, Verb};

/// Axum extractor for the flat request parameters the engine binds from.
///
/// Pairs come from the query string and, for form-encoded bodies, from the
/// body, in that order. GET and HEAD requests are reads; every other method
/// is a mutation.
#[async_trait]
impl<S> FromRequest<S> for RequestParams
where
    S: Send + Sync,
{
    type Rejection = EngineError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let verb = if req.method() == Method::GET || req.method() == Method::HEAD {
            Verb::Read
        } else {
            Verb::Mutation
        };

        let Query(mut pairs) = Query::<Vec<(String, String)>>::try_from_uri(req.uri())
            .map_err(|e| EngineError::validation(format!("Invalid query string: {}", e)))?;

        if verb == Verb::Mutation && is_form_encoded(&req) {
            let Form(body) = Form::<Vec<(String, String)>>::from_request(req, state)
                .await
                .map_err(|e| EngineError::validation(format!("Invalid form body: {}", e)))?;
            pairs.extend(body);
        }

        Ok(RequestParams::new(verb, pairs))
    }
}

fn is_form_encoded(req: &Request) -> bool {
    req.headers()
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .map_or(false, |ct| ct.starts_with("application/x-www-form-urlencoded"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;

    #[tokio::test]
    async fn query_and_form_pairs_are_merged() {
        let request = Request::builder()
            .method(Method::POST)
            .uri("/do-delete?ids=a,b")
            .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(Body::from("ids=c&_token_name_=tk&tk=123"))
            .unwrap();

        let params = RequestParams::from_request(request, &()).await.unwrap();
        assert_eq!(params.verb(), Verb::Mutation);
        assert_eq!(params.get_all("ids"), vec!["a,b", "c"]);
        assert_eq!(params.get("tk"), Some("123"));
    }

    #[tokio::test]
    async fn get_requests_are_reads() {
        let request = Request::builder()
            .uri("/view?id=42&CN_name=ops")
            .body(Body::empty())
            .unwrap();

        let params = RequestParams::from_request(request, &()).await.unwrap();
        assert_eq!(params.verb(), Verb::Read);
        assert_eq!(params.get("id"), Some("42"));
        assert!(params.contains("CN_name"));
    }
}
