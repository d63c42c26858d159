//! Reaching a client's worker without going through routing.

use http::StatusCode;
use moonpool_mesh::{ClientId, MeshError, RouterId};

use crate::support::{Harness, body_text, plain_request, run_local_test};

#[test]
fn test_identify_binds_assigned_worker() {
    run_local_test(async {
        let h = Harness::new(3);
        let _socket = h.connect("alice").await;
        let worker = h.worker_of("alice").await.expect("assigned");

        let stub = h
            .cluster
            .identify(&h.router_id, &ClientId::from("alice"))
            .await
            .expect("alice is assigned");
        assert_eq!(stub.worker_id(), &worker);
        assert_eq!(stub.client_id().as_str(), "alice");
        assert_eq!(stub.router_id(), &h.router_id);

        // No routing headers on the request: the stub adds them.
        let response = stub
            .fetch(plain_request("ignored", "/hello"))
            .await
            .expect("worker reachable");
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_text(&response), "hello");
    });
}

#[test]
fn test_identify_unknown_client() {
    run_local_test(async {
        let h = Harness::new(3);

        let result = h
            .cluster
            .identify(&h.router_id, &ClientId::from("ghost"))
            .await;
        match result {
            Err(MeshError::Remote { status, message }) => {
                assert_eq!(status, StatusCode::NOT_FOUND);
                assert_eq!(message, "Unknown: Client ID");
            }
            other => panic!("expected a 404, got {other:?}"),
        }
    });
}

#[test]
fn test_assignments_are_per_router() {
    run_local_test(async {
        let h = Harness::new(3);
        let _socket = h.connect("alice").await;

        let other = RouterId::from("annex");
        let result = h.cluster.identify(&other, &ClientId::from("alice")).await;
        assert!(matches!(
            result,
            Err(MeshError::Remote { status, .. }) if status == StatusCode::NOT_FOUND
        ));
    });
}
