use super::*;
use crate::state::test_helpers;

fn setup() -> (AppState, Uuid, mpsc::Sender<DashboardEvent>, mpsc::Receiver<DashboardEvent>, HashSet<String>) {
    let state = test_helpers::test_app_state();
    let (tx, rx) = mpsc::channel(8);
    (state, Uuid::new_v4(), tx, rx, HashSet::new())
}

#[tokio::test]
async fn subscribe_registers_and_replies() {
    let (state, client_id, tx, _rx, mut subscribed) = setup();

    let replies = process_dashboard_text(
        &state,
        client_id,
        &tx,
        &mut subscribed,
        r#"{"type":"subscribe","robot_id":"robot_001"}"#,
    )
    .await;

    assert_eq!(replies, vec![DashboardEvent::Subscribed { robot_id: "robot_001".into() }]);
    assert!(subscribed.contains("robot_001"));
    assert_eq!(fanout::subscriber_count(&state, "robot_001").await, 1);
}

#[tokio::test]
async fn subscribe_without_robot_id_is_ignored() {
    let (state, client_id, tx, _rx, mut subscribed) = setup();

    let replies = process_dashboard_text(&state, client_id, &tx, &mut subscribed, r#"{"type":"subscribe"}"#).await;
    assert!(replies.is_empty());

    let replies =
        process_dashboard_text(&state, client_id, &tx, &mut subscribed, r#"{"type":"subscribe","robot_id":""}"#).await;
    assert!(replies.is_empty());
    assert!(state.subscribers.read().await.is_empty());
}

#[tokio::test]
async fn unsubscribe_removes_registration() {
    let (state, client_id, tx, _rx, mut subscribed) = setup();
    process_dashboard_text(
        &state,
        client_id,
        &tx,
        &mut subscribed,
        r#"{"type":"subscribe","robot_id":"robot_001"}"#,
    )
    .await;

    let replies = process_dashboard_text(
        &state,
        client_id,
        &tx,
        &mut subscribed,
        r#"{"type":"unsubscribe","robot_id":"robot_001"}"#,
    )
    .await;

    assert_eq!(replies, vec![DashboardEvent::Unsubscribed { robot_id: "robot_001".into() }]);
    assert!(subscribed.is_empty());
    assert_eq!(fanout::subscriber_count(&state, "robot_001").await, 0);
}

#[tokio::test]
async fn malformed_command_replies_error() {
    let (state, client_id, tx, _rx, mut subscribed) = setup();

    let replies = process_dashboard_text(&state, client_id, &tx, &mut subscribed, "not json").await;
    assert_eq!(replies.len(), 1);
    assert!(matches!(&replies[0], DashboardEvent::Error { message } if message.contains("invalid event json")));

    let replies = process_dashboard_text(&state, client_id, &tx, &mut subscribed, r#"{"type":"dance"}"#).await;
    assert!(matches!(&replies[0], DashboardEvent::Error { .. }));
}

#[tokio::test]
async fn subscribed_client_receives_broadcasts() {
    let (state, client_id, tx, mut rx, mut subscribed) = setup();
    process_dashboard_text(
        &state,
        client_id,
        &tx,
        &mut subscribed,
        r#"{"type":"subscribe","robot_id":"robot_001"}"#,
    )
    .await;

    let event = DashboardEvent::Error { message: "ping".into() };
    assert_eq!(fanout::broadcast(&state, "robot_001", &event).await, 1);
    let received = tokio::time::timeout(std::time::Duration::from_millis(200), rx.recv())
        .await
        .expect("broadcast receive timed out")
        .expect("channel closed");
    assert_eq!(received, event);
}

#[test]
fn event_frame_is_text_json() {
    let event = DashboardEvent::Subscribed { robot_id: "robot_001".into() };

    let Some(Message::Text(text)) = event_frame(&event) else {
        panic!("expected a text frame");
    };
    let decoded: DashboardEvent = events::decode(text.as_str()).unwrap();
    assert_eq!(decoded, event);
}
