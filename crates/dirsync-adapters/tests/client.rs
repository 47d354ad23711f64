//! HTTP behaviour of the shared client: pagination, classification and
//! throttling, exercised against a mock server.

use std::time::{Duration, Instant};

use dirsync_adapters::{
    ApiClient, ApiError, Auth, ClientConfig, ErrorBody, Items, ListRequest, OktaAdapter,
    OktaConfig, Pagination,
};
use reqwest::StatusCode;
use serde_json::{Value, json};
use url::Url;
use wiremock::matchers::{header, method, path, query_param, query_param_is_missing};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn client() -> ApiClient {
    ApiClient::new(&ClientConfig::default().with_min_request_interval(Duration::ZERO)).unwrap()
}

fn okta_config(server: &MockServer) -> OktaConfig {
    OktaConfig {
        api_base_url: server.uri(),
        access_token: "test-token".to_string(),
    }
}

fn okta_user(id: &str) -> Value {
    json!({
        "id": id,
        "status": "ACTIVE",
        "profile": {"email": format!("{id}@example.com"), "firstName": id, "lastName": "Test"}
    })
}

fn list_request(server: &MockServer, endpoint: &str) -> ListRequest {
    let url = Url::parse(&format!("{}{endpoint}", server.uri())).unwrap();
    ListRequest::new(url, Items::Root, Pagination::None)
}

#[tokio::test]
async fn test_link_pagination_returns_all_pages_in_order() {
    let server = MockServer::start().await;
    let next = |after: &str| format!("<{}/api/v1/users?limit=200&after={after}>; rel=\"next\"", server.uri());

    Mock::given(method("GET"))
        .and(path("/api/v1/users"))
        .and(query_param_is_missing("after"))
        .and(header("authorization", "Bearer test-token"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!([okta_user("u1"), okta_user("u2")]))
                .insert_header("link", next("u2").as_str()),
        )
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/v1/users"))
        .and(query_param("after", "u2"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!([okta_user("u3"), okta_user("u4")]))
                .insert_header("link", next("u4").as_str()),
        )
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/v1/users"))
        .and(query_param("after", "u4"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([okta_user("u5")])))
        .expect(1)
        .mount(&server)
        .await;

    let users = OktaAdapter::new(client())
        .list_users(&okta_config(&server))
        .await
        .unwrap();

    let ids: Vec<&str> = users.iter().map(|user| user.id.as_str()).collect();
    assert_eq!(ids, vec!["u1", "u2", "u3", "u4", "u5"]);
}

#[tokio::test]
async fn test_server_error_is_retry_later() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v1/users"))
        .respond_with(ResponseTemplate::new(500).set_body_string("Internal Server Error"))
        .mount(&server)
        .await;

    let err = OktaAdapter::new(client())
        .list_users(&okta_config(&server))
        .await
        .unwrap_err();

    assert!(matches!(err, ApiError::RetryLater { .. }), "{err:?}");
    assert!(err.is_transient());
}

#[tokio::test]
async fn test_not_found_carries_parsed_json_body() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v1/users"))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({"message": "not found"})))
        .mount(&server)
        .await;

    let err = OktaAdapter::new(client())
        .list_users(&okta_config(&server))
        .await
        .unwrap_err();

    match err {
        ApiError::Client { status, body } => {
            assert_eq!(status, StatusCode::NOT_FOUND);
            assert_eq!(body, ErrorBody::Json(json!({"message": "not found"})));
        }
        other => panic!("expected client error, got {other:?}"),
    }
}

#[tokio::test]
async fn test_client_error_with_text_body() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/things"))
        .respond_with(ResponseTemplate::new(401).set_body_string("Unauthorized"))
        .mount(&server)
        .await;

    let err = client()
        .list::<Value>(&Auth::Bearer("bad".into()), &list_request(&server, "/things"))
        .await
        .unwrap_err();

    assert!(err.is_client_error());
    assert!(matches!(
        err,
        ApiError::Client { body: ErrorBody::Text(ref text), .. } if text == "Unauthorized"
    ));
}

#[tokio::test]
async fn test_connection_refused_is_transport_error() {
    let port = {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    };
    let config = OktaConfig {
        api_base_url: format!("http://127.0.0.1:{port}"),
        access_token: "test-token".to_string(),
    };

    let err = OktaAdapter::new(client()).list_users(&config).await.unwrap_err();

    match &err {
        ApiError::Transport(source) => assert!(source.is_connect(), "{source:?}"),
        other => panic!("expected transport error, got {other:?}"),
    }
    assert!(err.is_transient());
}

#[tokio::test]
async fn test_success_with_non_list_body_is_retry_later() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/things"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"unexpected": true})))
        .mount(&server)
        .await;

    let err = client()
        .list::<Value>(&Auth::Bearer("t".into()), &list_request(&server, "/things"))
        .await
        .unwrap_err();

    assert!(matches!(err, ApiError::RetryLater { .. }), "{err:?}");
}

#[tokio::test]
async fn test_success_with_malformed_body_is_retry_later() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/things"))
        .respond_with(ResponseTemplate::new(200).set_body_string("[{\"id\": "))
        .mount(&server)
        .await;

    let err = client()
        .list::<Value>(&Auth::Bearer("t".into()), &list_request(&server, "/things"))
        .await
        .unwrap_err();

    assert!(matches!(err, ApiError::RetryLater { .. }), "{err:?}");
}

#[tokio::test]
async fn test_api_key_header() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/things"))
        .and(header("x-api-key", "secret"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([1, 2, 3])))
        .expect(1)
        .mount(&server)
        .await;

    let auth = Auth::ApiKey {
        header: "x-api-key",
        value: "secret".into(),
    };
    let items: Vec<u32> = client()
        .list(&auth, &list_request(&server, "/things"))
        .await
        .unwrap();

    assert_eq!(items, vec![1, 2, 3]);
}

#[tokio::test]
async fn test_throttle_applies_before_every_request() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/things"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(3)
        .mount(&server)
        .await;

    let client = ApiClient::new(
        &ClientConfig::default().with_min_request_interval(Duration::from_millis(100)),
    )
    .unwrap();
    let request = list_request(&server, "/things");
    let auth = Auth::Bearer("t".into());

    let started = Instant::now();
    for _ in 0..3 {
        client.list::<Value>(&auth, &request).await.unwrap();
    }

    assert!(started.elapsed() >= Duration::from_millis(200));
}

#[tokio::test]
async fn test_self_referencing_link_is_retry_later() {
    let server = MockServer::start().await;
    let link = format!("<{}/things>; rel=\"next\"", server.uri());
    Mock::given(method("GET"))
        .and(path("/things"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!([1]))
                .insert_header("link", link.as_str()),
        )
        .expect(1)
        .mount(&server)
        .await;

    let request = ListRequest::new(
        Url::parse(&format!("{}/things", server.uri())).unwrap(),
        Items::Root,
        Pagination::LinkHeader,
    );
    let err = tokio::time::timeout(
        Duration::from_secs(5),
        client().list::<Value>(&Auth::Bearer("t".into()), &request),
    )
    .await
    .expect("pagination terminates")
    .unwrap_err();

    assert!(matches!(err, ApiError::RetryLater { .. }), "{err:?}");
}

#[tokio::test]
async fn test_repeating_page_token_is_retry_later() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/users"))
        .and(query_param_is_missing("pageToken"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"users": [1], "nextPageToken": "abc"})),
        )
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/users"))
        .and(query_param("pageToken", "abc"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"users": [2], "nextPageToken": "abc"})),
        )
        .expect(1)
        .mount(&server)
        .await;

    let request = ListRequest::new(
        Url::parse(&format!("{}/users", server.uri())).unwrap(),
        Items::OptionalField("users"),
        Pagination::BodyToken {
            field: "nextPageToken",
            param: "pageToken",
        },
    );
    let err = tokio::time::timeout(
        Duration::from_secs(5),
        client().list::<Value>(&Auth::Bearer("t".into()), &request),
    )
    .await
    .expect("pagination terminates")
    .unwrap_err();

    assert!(matches!(err, ApiError::RetryLater { .. }), "{err:?}");
    assert!(err.is_transient());
}
