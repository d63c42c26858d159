//! Sticky routing, capacity limits and worker creation.

use http::StatusCode;
use moonpool_mesh::websocket::NORMAL_CLOSURE;

use crate::support::{Harness, body_text, run_local_test, settle};

#[test]
fn test_sticky_routing_reuses_assigned_worker() {
    run_local_test(async {
        let h = Harness::new(3);

        let _first = h.connect("alice").await;
        let worker = h.worker_of("alice").await.expect("alice assigned");
        let _second = h.connect("alice").await;

        assert_eq!(h.worker_of("alice").await, Some(worker.clone()));
        assert_eq!(h.load_of(&worker).await, Some(2));
        assert_eq!(h.load_table().await.len(), 1);
    });
}

#[test]
fn test_limit_two_scenario() {
    run_local_test(async {
        let h = Harness::new(2);

        let mut alice = h.connect("alice").await;
        let w1 = h.worker_of("alice").await.expect("alice assigned");
        assert_eq!(h.load_of(&w1).await, Some(1));

        let _bob = h.connect("bob").await;
        assert_eq!(h.worker_of("bob").await, Some(w1.clone()));
        assert_eq!(h.load_of(&w1).await, Some(2));

        let _carol = h.connect("carol").await;
        let w2 = h.worker_of("carol").await.expect("carol assigned");
        assert_ne!(w1, w2);
        assert_eq!(h.load_of(&w2).await, Some(1));

        settle().await;
        assert_eq!(h.neighbors_of(&w1), vec![w2.clone()]);
        assert_eq!(h.neighbors_of(&w2), vec![w1.clone()]);

        alice.close(NORMAL_CLOSURE, "bye");
        settle().await;

        assert_eq!(h.load_of(&w1).await, Some(1));
        assert_eq!(h.worker_of("alice").await, None);
        assert_eq!(h.worker_of("bob").await, Some(w1));
    });
}

#[test]
fn test_no_worker_exceeds_limit() {
    run_local_test(async {
        let h = Harness::new(2);

        let mut sockets = Vec::new();
        for user in ["u1", "u2", "u3", "u4", "u5", "u6", "u7"] {
            sockets.push(h.connect(user).await);
            for (_, count) in h.load_table().await {
                assert!(count <= 2, "worker over limit after {user}");
            }
        }

        let table = h.load_table().await;
        assert_eq!(table.len(), 4);
        assert_eq!(table.iter().map(|(_, count)| count).sum::<u32>(), 7);

        settle().await;
        for (worker, _) in &table {
            let neighbors = h.neighbors_of(worker);
            assert_eq!(neighbors.len(), 3, "mesh incomplete at {worker}");
            assert!(!neighbors.contains(worker));
        }
    });
}

#[test]
fn test_freed_capacity_is_reused() {
    run_local_test(async {
        let h = Harness::new(1);

        let mut alice = h.connect("alice").await;
        let w1 = h.worker_of("alice").await.expect("alice assigned");

        alice.close(NORMAL_CLOSURE, "");
        settle().await;
        assert_eq!(h.load_of(&w1).await, Some(0));

        let _bob = h.connect("bob").await;
        assert_eq!(h.worker_of("bob").await, Some(w1.clone()));
        assert_eq!(h.load_table().await.len(), 1);
    });
}

#[test]
fn test_least_loaded_worker_is_preferred() {
    run_local_test(async {
        let h = Harness::new(2);

        let mut a = h.connect("a").await;
        let _b = h.connect("b").await;
        let w1 = h.worker_of("a").await.expect("assigned");
        let _c = h.connect("c").await;
        let _d = h.connect("d").await;
        let w2 = h.worker_of("c").await.expect("assigned");
        assert_ne!(w1, w2);

        // w1 drops to one session; w2 stays full.
        a.close(NORMAL_CLOSURE, "");
        settle().await;

        let _e = h.connect("e").await;
        assert_eq!(h.worker_of("e").await, Some(w1.clone()));
        assert_eq!(h.load_of(&w1).await, Some(2));
        assert_eq!(h.load_of(&w2).await, Some(2));
    });
}

#[test]
fn test_plain_request_releases_capacity() {
    run_local_test(async {
        let h = Harness::new(2);

        let response = h.get("alice", "/hello").await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_text(&response), "hello");

        let table = h.load_table().await;
        assert_eq!(table.len(), 1);
        assert_eq!(table[0].1, 0);
        assert_eq!(h.worker_of("alice").await, None);
    });
}

#[test]
fn test_plain_request_keeps_assignment_of_connected_client() {
    run_local_test(async {
        let h = Harness::new(2);

        let _socket = h.connect("alice").await;
        let worker = h.worker_of("alice").await.expect("assigned");

        let response = h.get("alice", "/hello").await;
        assert_eq!(response.status(), StatusCode::OK);

        assert_eq!(h.worker_of("alice").await, Some(worker.clone()));
        assert_eq!(h.load_of(&worker).await, Some(1));
    });
}

#[test]
fn test_identify_failure_is_bad_request() {
    run_local_test(async {
        let h = Harness::new(2);

        let response = h
            .send(moonpool_mesh::Request::new(bytes::Bytes::new()))
            .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_text(&response), "Missing: user");
        assert!(h.load_table().await.is_empty());
    });
}
