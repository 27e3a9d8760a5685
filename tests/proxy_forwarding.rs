//! End-to-end forwarding through a running proxy session.

use axum::http::StatusCode;
use serde_json::Value;

mod common;

#[tokio::test]
async fn overlay_replaces_client_headers() {
    let target = common::start_echo_target("a").await;
    let proxy = common::start_proxy(
        &format!("http://{}", target),
        &[("Authorization", "Bearer abc"), ("X-Feature", "on")],
    )
    .await;

    let body: Value = common::client()
        .get(proxy.url("/whoami"))
        .header("authorization", "Bearer stale")
        .header("x-feature", "off")
        .header("x-untouched", "kept")
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    let headers = &body["headers"];
    assert_eq!(headers["authorization"], "Bearer abc");
    assert_eq!(headers["x-feature"], "on");
    assert_eq!(headers["x-untouched"], "kept");
    assert_eq!(headers["x-custom-header-proxy"], "true");
    assert_eq!(headers["host"], format!("{}", target));
}

#[tokio::test]
async fn path_query_and_method_are_preserved() {
    let target = common::start_echo_target("a").await;
    let proxy = common::start_proxy(&format!("http://{}", target), &[]).await;

    let body: Value = common::client()
        .post(proxy.url("/api/users?id=1&sort=desc"))
        .body("hello target")
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    assert_eq!(body["method"], "POST");
    assert_eq!(body["path"], "/api/users");
    assert_eq!(body["query"], "id=1&sort=desc");
    assert_eq!(body["body"], "hello target");
}

#[tokio::test]
async fn redirects_are_followed() {
    let target = common::start_echo_target("a").await;
    let proxy = common::start_proxy(&format!("http://{}", target), &[]).await;

    let response = common::client().get(proxy.url("/redirect")).send().await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["path"], "/landed");
}

#[tokio::test]
async fn test_headers_route_answers_locally() {
    // Nothing listens on the target; the diagnostic route must not care.
    let dead = common::free_port();
    let proxy = common::start_proxy(
        &format!("http://127.0.0.1:{}", dead),
        &[("Authorization", "Bearer abc"), ("X-Missing", "set")],
    )
    .await;

    let response = common::client()
        .get(proxy.url("/__test_headers"))
        .header("x-client", "1")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body: Value = response.json().await.unwrap();
    assert_eq!(body["received"], true);
    assert_eq!(body["forwardedHeaders"]["Authorization"], "Bearer abc");
    assert_eq!(body["forwardedHeaders"]["X-Missing"], "set");
    assert_eq!(body["headers"]["x-client"], "1");
    assert_eq!(body["headers"]["x-custom-header-proxy"], "true");
}

#[tokio::test]
async fn health_route_reports_session_config() {
    let dead = common::free_port();
    let target = format!("http://127.0.0.1:{}/", dead);
    let proxy = common::start_proxy(&target, &[("Authorization", "Bearer abc")]).await;

    let body: Value = common::client()
        .get(proxy.url("/__proxy_health"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    assert_eq!(body["status"], "ok");
    assert_eq!(body["target"], target);
    assert_eq!(body["headerCount"], 1);
    assert_eq!(body["configuredHeaders"]["Authorization"], "Bearer abc");
    assert!(body["timestamp"].as_str().unwrap().ends_with('Z'));
}

#[tokio::test]
async fn non_get_diagnostic_paths_are_forwarded() {
    let target = common::start_echo_target("a").await;
    let proxy = common::start_proxy(&format!("http://{}", target), &[]).await;

    let body: Value = common::client()
        .post(proxy.url("/__test_headers"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["target"], "a");
    assert_eq!(body["path"], "/__test_headers");
}

#[tokio::test]
async fn unreachable_target_yields_bad_gateway() {
    let dead = common::free_port();
    let proxy = common::start_proxy(&format!("http://127.0.0.1:{}", dead), &[]).await;

    let response = common::client().get(proxy.url("/anything")).send().await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    assert_eq!(
        response.headers().get("access-control-allow-origin").unwrap(),
        "*"
    );
    let text = response.text().await.unwrap();
    assert!(text.contains("Proxy Error"));
    assert!(text.contains(&format!("127.0.0.1:{}", dead)));

    // The session survives the failed request.
    let health = common::client().get(proxy.url("/__proxy_health")).send().await.unwrap();
    assert_eq!(health.status(), StatusCode::OK);
}

#[tokio::test]
async fn cors_headers_and_local_preflight() {
    let target = common::start_echo_target("a").await;
    let proxy = common::start_proxy(&format!("http://{}", target), &[("X-Api-Key", "k")]).await;
    let client = common::client();

    let response = client.get(proxy.url("/")).send().await.unwrap();
    let headers = response.headers();
    assert_eq!(headers.get("access-control-allow-origin").unwrap(), "*");
    assert_eq!(headers.get("access-control-allow-credentials").unwrap(), "true");

    let preflight = client
        .request(reqwest::Method::OPTIONS, proxy.url("/api"))
        .header("origin", "http://example.test")
        .header("access-control-request-method", "PUT")
        .send()
        .await
        .unwrap();
    assert_eq!(preflight.status(), StatusCode::NO_CONTENT);
    let allow = preflight
        .headers()
        .get("access-control-allow-headers")
        .unwrap()
        .to_str()
        .unwrap();
    assert!(allow.contains("X-Api-Key"));
    assert!(preflight
        .headers()
        .get("access-control-allow-methods")
        .unwrap()
        .to_str()
        .unwrap()
        .contains("PUT"));
}

#[tokio::test]
async fn responses_carry_request_id() {
    let target = common::start_echo_target("a").await;
    let proxy = common::start_proxy(&format!("http://{}", target), &[]).await;

    let response = common::client().get(proxy.url("/")).send().await.unwrap();
    assert!(response.headers().contains_key("x-request-id"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_requests_each_get_the_overlay() {
    let target = common::start_echo_target("a").await;
    let proxy = common::start_proxy(
        &format!("http://{}", target),
        &[("Authorization", "Bearer abc")],
    )
    .await;
    let client = common::client();

    let requests = (0..32).map(|i| {
        let client = client.clone();
        let url = proxy.url(&format!("/item/{}", i));
        tokio::spawn(async move {
            let body: Value = client
                .get(url)
                .header("authorization", format!("Bearer stale-{}", i))
                .header("x-request-index", i.to_string())
                .send()
                .await
                .unwrap()
                .json()
                .await
                .unwrap();
            (i, body)
        })
    });
    let handles: Vec<_> = requests.collect();

    for handle in handles {
        let (i, body) = handle.await.unwrap();
        assert_eq!(body["path"], format!("/item/{}", i));
        assert_eq!(body["headers"]["authorization"], "Bearer abc");
        assert_eq!(body["headers"]["x-request-index"], i.to_string());
        assert_eq!(body["headers"]["x-custom-header-proxy"], "true");
    }
}

#[tokio::test]
async fn self_signed_target_is_accepted() {
    let target = common::start_tls_echo_target("tls").await;
    let proxy = common::start_proxy(
        &format!("https://127.0.0.1:{}", target.port()),
        &[("Authorization", "Bearer abc")],
    )
    .await;

    let response = common::client().get(proxy.url("/secure?x=1")).send().await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["target"], "tls");
    assert_eq!(body["path"], "/secure");
    assert_eq!(body["query"], "x=1");
    assert_eq!(body["headers"]["authorization"], "Bearer abc");
}

#[tokio::test]
async fn chunked_body_over_limit_is_rejected() {
    let target = common::start_echo_target("a").await;
    let settings = header_proxy::ServerSettings {
        max_body_bytes: 16,
        ..common::test_settings()
    };
    let proxy = common::start_proxy_with(settings, &format!("http://{}", target), &[]).await;

    let chunks = futures_util::stream::iter(vec![
        Ok::<_, std::io::Error>(vec![b'x'; 10]),
        Ok(vec![b'y'; 10]),
        Ok(vec![b'z'; 10]),
    ]);
    let response = common::client()
        .post(proxy.url("/upload"))
        .body(reqwest::Body::wrap_stream(chunks))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);

    let small = common::client()
        .post(proxy.url("/upload"))
        .body("within limit")
        .send()
        .await
        .unwrap();
    assert_eq!(small.status(), StatusCode::OK);
}
