use super::*;

#[tokio::test]
async fn new_state_starts_empty() {
    let state = test_helpers::test_app_state();
    assert!(state.subscribers.read().await.is_empty());
    assert!(state.robots.read().await.is_empty());
    assert_eq!(state.dashboard_channel_capacity, 16);
}

#[tokio::test]
async fn zero_channel_capacity_is_raised_to_one() {
    let base = test_helpers::test_app_state();
    let state = AppState::new(base.store.clone(), 0);
    assert_eq!(state.dashboard_channel_capacity, 1);
}

#[tokio::test]
async fn clones_share_registries() {
    let state = test_helpers::test_app_state();
    let clone = state.clone();
    let (client_id, _rx) = test_helpers::seed_subscriber(&state, "robot_001").await;

    let subscribers = clone.subscribers.read().await;
    assert!(subscribers.get("robot_001").is_some_and(|s| s.contains_key(&client_id)));
}
