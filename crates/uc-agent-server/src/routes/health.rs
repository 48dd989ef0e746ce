use axum::{http::StatusCode, routing::get, Router};

async fn ping() -> StatusCode {
    StatusCode::OK
}

pub fn routes() -> Router {
    Router::new().route("/ping", get(ping))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{body::Body, http::Request};
    use tower::ServiceExt;

    #[tokio::test]
    async fn test_ping() {
        let response = routes()
            .oneshot(Request::builder().uri("/ping").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
