//! Socket lifecycle and capacity release.

use http::StatusCode;
use moonpool_mesh::websocket::NORMAL_CLOSURE;
use moonpool_mesh::{ClientId, Frame};

use crate::support::{Harness, body_text, run_local_test, settle, upgrade_request};

#[test]
fn test_multi_socket_client() {
    run_local_test(async {
        let h = Harness::new(5);

        let mut tab1 = h.connect("dana").await;
        let mut tab2 = h.connect("dana").await;
        let worker = h.worker_of("dana").await.expect("dana assigned");
        let dana = ClientId::from("dana");
        let actor = h.cluster.worker(&worker).expect("worker");

        assert_eq!(h.load_of(&worker).await, Some(2));
        assert_eq!(actor.session_count(&dana), 2);

        tab1.close(NORMAL_CLOSURE, "");
        settle().await;
        assert_eq!(h.load_of(&worker).await, Some(1));
        assert_eq!(h.worker_of("dana").await, Some(worker.clone()));
        assert_eq!(actor.session_count(&dana), 1);

        tab2.close(NORMAL_CLOSURE, "");
        settle().await;
        assert_eq!(h.load_of(&worker).await, Some(0));
        assert_eq!(h.worker_of("dana").await, None);
        assert_eq!(actor.session_count(&dana), 0);
    });
}

#[test]
fn test_dropped_client_releases_session() {
    run_local_test(async {
        let h = Harness::new(2);

        let socket = h.connect("alice").await;
        let worker = h.worker_of("alice").await.expect("assigned");
        drop(socket);
        settle().await;

        assert_eq!(h.load_of(&worker).await, Some(0));
        assert_eq!(h.worker_of("alice").await, None);
        assert_eq!(h.hooks.events(), vec!["open:alice", "close:alice"]);
    });
}

#[test]
fn test_failed_socket_runs_error_hook() {
    run_local_test(async {
        let h = Harness::new(2);

        let mut socket = h.connect("alice").await;
        let worker = h.worker_of("alice").await.expect("assigned");
        socket.fail("connection reset");
        settle().await;

        assert_eq!(h.load_of(&worker).await, Some(0));
        assert_eq!(h.hooks.events(), vec!["open:alice", "error:alice"]);
    });
}

#[test]
fn test_server_close_from_hook() {
    run_local_test(async {
        let h = Harness::new(2);

        let mut socket = h.connect("alice").await;
        let worker = h.worker_of("alice").await.expect("assigned");
        socket.send("close").expect("open");
        settle().await;

        assert_eq!(
            socket.try_recv(),
            Some(Frame::Close {
                code: 4000,
                reason: "bye".into()
            })
        );
        assert_eq!(h.load_of(&worker).await, Some(0));
        assert_eq!(h.hooks.events(), vec!["open:alice", "close:alice"]);
    });
}

#[test]
fn test_refused_open_releases_capacity() {
    run_local_test(async {
        let h = Harness::new(2);

        let response = h.send(upgrade_request("mallory")).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_text(&response), "Banned");

        let table = h.load_table().await;
        assert_eq!(table.len(), 1);
        assert_eq!(table[0].1, 0);
        assert_eq!(h.worker_of("mallory").await, None);
        assert!(h.hooks.events().is_empty());
    });
}

#[test]
fn test_receive_error_still_releases_capacity() {
    run_local_test(async {
        let h = Harness::new(2);

        let response = h.get("alice", "/fail").await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_text(&response), "receive exploded");
        assert_eq!(response.headers()[http::header::CONNECTION], "close");

        let table = h.load_table().await;
        assert_eq!(table[0].1, 0);
    });
}

#[test]
fn test_structured_message_is_sent_as_json_text() {
    run_local_test(async {
        let h = Harness::new(2);

        let mut socket = h.connect("alice").await;
        socket.send("json").expect("open");
        settle().await;

        assert_eq!(socket.drain_text(), vec![r#"{"from":"alice"}"#.to_string()]);
        socket.close(NORMAL_CLOSURE, "");
    });
}
