//! Boundary validation seen from outside the actors.

use bytes::Bytes;
use http::header::{HeaderName, SEC_WEBSOCKET_KEY, SEC_WEBSOCKET_VERSION, UPGRADE};
use http::{HeaderValue, Method, StatusCode, Uri};
use moonpool_mesh::protocol::{ControlRoute, headers};
use moonpool_mesh::{Request, WorkerId};

use crate::support::{Harness, body_text, run_local_test, upgrade_request};

fn with_headers(path: &'static str, pairs: &[(HeaderName, &'static str)]) -> Request {
    let mut request = Request::new(Bytes::new());
    *request.uri_mut() = Uri::from_static(path);
    for (name, value) in pairs {
        request
            .headers_mut()
            .insert(name.clone(), HeaderValue::from_static(*value));
    }
    request
}

#[test]
fn test_handshake_failures_release_capacity() {
    run_local_test(async {
        let h = Harness::new(2);

        let mut post = upgrade_request("alice");
        *post.method_mut() = Method::POST;
        let response = h.send(post).await;
        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(body_text(&response), "Method Not Allowed");

        let mut no_upgrade = upgrade_request("alice");
        no_upgrade.headers_mut().remove(UPGRADE);
        let response = h.send(no_upgrade).await;
        assert_eq!(response.status(), StatusCode::UPGRADE_REQUIRED);

        let mut bad_key = upgrade_request("alice");
        bad_key
            .headers_mut()
            .insert(SEC_WEBSOCKET_KEY, HeaderValue::from_static("short=="));
        let response = h.send(bad_key).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let mut old_version = upgrade_request("alice");
        old_version
            .headers_mut()
            .insert(SEC_WEBSOCKET_VERSION, HeaderValue::from_static("8"));
        let response = h.send(old_version).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let table = h.load_table().await;
        assert_eq!(table.len(), 1);
        assert_eq!(table[0].1, 0);
    });
}

#[test]
fn test_worker_rejects_misaddressed_request() {
    run_local_test(async {
        let h = Harness::new(2);
        let worker = h.cluster.workers().get(&WorkerId::from("w-a"));

        let response = worker
            .fetch(with_headers(
                "/hello",
                &[
                    (headers::WORKER_ID, "w-b"),
                    (headers::ROUTER_ID, "lobby"),
                    (headers::CLIENT_ID, "alice"),
                ],
            ))
            .await
            .expect("worker reachable");
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_text(&response), "Mismatch: Worker ID");

        let response = worker
            .fetch(with_headers(
                "/hello",
                &[(headers::WORKER_ID, "w-a"), (headers::CLIENT_ID, "alice")],
            ))
            .await
            .expect("worker reachable");
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_text(&response), "Missing: Router ID");
    });
}

#[test]
fn test_close_notify_for_unknown_worker() {
    run_local_test(async {
        let h = Harness::new(2);
        let router = h.cluster.routers().get(&h.router_id);

        let response = router
            .fetch(with_headers(
                ControlRoute::Close.path(),
                &[
                    (headers::ROUTER_ID, "lobby"),
                    (headers::WORKER_ID, "w-z"),
                    (headers::CLIENT_ID, "alice"),
                    (headers::IS_EMPTY, "1"),
                ],
            ))
            .await
            .expect("router reachable");
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_text(&response), "Unknown: Worker ID");
        assert_eq!(response.headers()[http::header::CONNECTION], "close");
    });
}
