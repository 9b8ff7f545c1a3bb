use super::*;
use crate::test_helpers::{advance_ms, settle};

fn item(id: &str, bid: i64, bidder: Option<&str>) -> AuctionItem {
    AuctionItem {
        id: id.to_owned(),
        title: format!("Lot {id}"),
        description: String::new(),
        image_url: String::new(),
        current_bid: bid,
        current_bidder: bidder.map(str::to_owned),
        auction_end_time: 1_700_000_060_000,
        status: AuctionStatus::Active,
        time_remaining: None,
    }
}

fn user(id: &str) -> User {
    User { id: id.to_owned(), name: format!("User {id}") }
}

fn state_with(items: Vec<AuctionItem>, current: Option<&str>) -> AuctionState {
    let mut state = AuctionState::default();
    state.load_snapshot(items);
    state.current_user = current.map(user);
    state
}

// =============================================================================
// SNAPSHOT + MERGE
// =============================================================================

#[test]
fn default_state_is_loading_and_offline() {
    let state = AuctionState::default();
    assert!(state.loading);
    assert!(!state.connected);
    assert!(state.items.is_empty());
}

#[test]
fn load_snapshot_replaces_items_and_ends_loading() {
    let mut state = state_with(vec![item("old", 1, None)], None);
    state.loading = true;

    let fresh = vec![item("a", 100, None), item("b", 200, Some("u2"))];
    state.load_snapshot(fresh.clone());

    assert_eq!(state.items, fresh);
    assert!(state.item("old").is_none());
    assert!(!state.loading);
}

#[test]
fn partial_update_merges_only_provided_fields() {
    let mut state = state_with(vec![item("a", 100, None)], None);
    let before = state.item("a").cloned().expect("item a");

    let patch = ItemPatch { current_bid: Some(150), ..ItemPatch::default() };
    assert!(state.apply_partial_update("a", &patch));

    let after = state.item("a").expect("item a");
    assert_eq!(after.current_bid, 150);
    assert_eq!(after.current_bidder, before.current_bidder);
    assert_eq!(after.title, before.title);
    assert_eq!(after.auction_end_time, before.auction_end_time);
}

#[test]
fn partial_update_for_unknown_item_is_a_no_op() {
    let mut state = state_with(vec![item("a", 100, None)], None);
    let before = state.clone();

    let patch = ItemPatch { current_bid: Some(999), ..ItemPatch::default() };
    assert!(!state.apply_partial_update("missing", &patch));
    assert_eq!(state, before);
}

#[test]
fn bid_update_patch_replaces_leader_and_remaining_time() {
    let mut state = state_with(vec![item("a", 100, Some("u1"))], None);
    state.items[0].time_remaining = Some(5_000);

    let update = BidUpdate {
        current_bid: 120,
        current_bidder: None,
        time_remaining: None,
        title: Some("Lot a".to_owned()),
    };
    state.apply_partial_update("a", &ItemPatch::from(&update));

    let merged = state.item("a").expect("item a");
    assert_eq!(merged.current_bid, 120);
    assert_eq!(merged.current_bidder, None);
    assert_eq!(merged.time_remaining, None);
    assert_eq!(merged.status, AuctionStatus::Active);
}

#[test]
fn record_local_bid_overwrites() {
    let mut state = AuctionState::default();
    state.record_local_bid("a", 110);
    state.record_local_bid("a", 130);
    assert_eq!(state.my_bids.get("a"), Some(&130));
}

// =============================================================================
// DERIVED STATUS
// =============================================================================

#[test]
fn status_is_active_without_a_recorded_bid() {
    let state = state_with(vec![item("a", 500, Some("u2"))], Some("u1"));
    assert_eq!(state.derive_status("a"), BidStatus::Active);
}

#[test]
fn status_is_active_for_unknown_item() {
    let mut state = state_with(vec![], Some("u1"));
    state.record_local_bid("ghost", 10);
    assert_eq!(state.derive_status("ghost"), BidStatus::Active);
}

#[test]
fn leading_wins_over_stale_record() {
    let mut state = state_with(vec![item("a", 300, Some("u1"))], Some("u1"));
    state.record_local_bid("a", 110);
    assert_eq!(state.derive_status("a"), BidStatus::Winning);
}

#[test]
fn higher_bid_by_someone_else_is_outbid() {
    let mut state = state_with(vec![item("a", 150, Some("u2"))], Some("u1"));
    state.record_local_bid("a", 110);
    assert_eq!(state.derive_status("a"), BidStatus::Outbid);
}

#[test]
fn equal_bid_by_someone_else_stays_active() {
    let mut state = state_with(vec![item("a", 110, Some("u2"))], Some("u1"));
    state.record_local_bid("a", 110);
    assert_eq!(state.derive_status("a"), BidStatus::Active);
}

#[test]
fn no_identity_never_counts_as_winning() {
    let mut state = state_with(vec![item("a", 110, None)], None);
    state.record_local_bid("a", 110);
    assert_eq!(state.derive_status("a"), BidStatus::Active);
}

#[test]
fn derive_status_does_not_mutate() {
    let mut state = state_with(vec![item("a", 150, Some("u2"))], Some("u1"));
    state.record_local_bid("a", 110);
    let before = state.clone();

    let first = state.derive_status("a");
    let second = state.derive_status("a");

    assert_eq!(first, second);
    assert_eq!(state, before);
}

#[test]
fn status_and_flash_names() {
    assert_eq!(BidStatus::Outbid.as_str(), "outbid");
    assert_eq!(FlashKind::WonLead.as_str(), "won-lead");
    assert_eq!(FlashKind::WonLead.color(), "green");
    assert_eq!(FlashKind::LostLead.as_str(), "lost-lead");
    assert_eq!(FlashKind::LostLead.color(), "red");
}

// =============================================================================
// STORE
// =============================================================================

#[test]
fn every_store_mutation_bumps_revision() {
    let store = StateStore::new();
    let mut rx = store.subscribe();
    assert_eq!(store.revision(), 0);

    store.load_snapshot(vec![item("a", 100, None)]);
    store.set_connected(true);
    store.record_local_bid("a", 110);

    assert_eq!(store.revision(), 3);
    assert!(rx.has_changed().expect("sender alive"));
    assert_eq!(*rx.borrow_and_update(), 3);
}

#[test]
fn store_clones_share_state() {
    let store = StateStore::new();
    let other = store.clone();

    store.set_current_user(Some(user("u1")));
    store.set_users(vec![user("u1"), user("u2")]);

    assert_eq!(other.current_user(), Some(user("u1")));
    assert_eq!(other.read(|state| state.users.len()), 2);
}

#[tokio::test(start_paused = true)]
async fn flash_clears_after_duration() {
    let store = StateStore::new();
    store.load_snapshot(vec![item("a", 100, None)]);

    store.mark_flash("a", FlashKind::WonLead);
    settle().await;
    assert_eq!(store.flash("a"), Some(FlashKind::WonLead));

    advance_ms(599).await;
    assert_eq!(store.flash("a"), Some(FlashKind::WonLead));

    advance_ms(2).await;
    assert_eq!(store.flash("a"), None);
}

#[tokio::test(start_paused = true)]
async fn reflash_extends_from_latest_call() {
    let store = StateStore::new();
    store.mark_flash("a", FlashKind::WonLead);
    settle().await;

    advance_ms(400).await;
    store.mark_flash("a", FlashKind::LostLead);
    settle().await;

    advance_ms(300).await;
    assert_eq!(store.flash("a"), Some(FlashKind::LostLead));

    advance_ms(301).await;
    assert_eq!(store.flash("a"), None);
}

#[tokio::test(start_paused = true)]
async fn superseded_expiry_leaves_newer_flash() {
    let store = StateStore::new();
    store.mark_flash("a", FlashKind::WonLead);
    let first = store.timers().get("a").map(|(seq, _)| *seq).expect("first expiry");
    store.mark_flash("a", FlashKind::LostLead);

    store.expire_flash("a", first);
    assert_eq!(store.flash("a"), Some(FlashKind::LostLead));

    let latest = store.timers().get("a").map(|(seq, _)| *seq).expect("latest expiry");
    store.expire_flash("a", latest);
    assert_eq!(store.flash("a"), None);
    assert!(store.timers().is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn flash_marker_waits_for_expiry_bookkeeping() {
    let store = StateStore::new();
    let held = store.timers();

    let writer = {
        let store = store.clone();
        let runtime = tokio::runtime::Handle::current();
        std::thread::spawn(move || {
            let _entered = runtime.enter();
            store.mark_flash("a", FlashKind::WonLead);
        })
    };
    std::thread::sleep(std::time::Duration::from_millis(50));
    assert_eq!(store.flash("a"), None);

    drop(held);
    writer.join().expect("writer thread");
    assert_eq!(store.flash("a"), Some(FlashKind::WonLead));
    assert_eq!(store.timers().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn flashes_on_different_items_expire_independently() {
    let store = StateStore::new();
    store.mark_flash("a", FlashKind::WonLead);
    settle().await;
    advance_ms(300).await;
    store.mark_flash("b", FlashKind::LostLead);
    settle().await;

    advance_ms(301).await;
    assert_eq!(store.flash("a"), None);
    assert_eq!(store.flash("b"), Some(FlashKind::LostLead));

    advance_ms(300).await;
    assert_eq!(store.flash("b"), None);
}

#[tokio::test(start_paused = true)]
async fn shutdown_cancels_pending_flash_expiry() {
    let store = StateStore::new();
    store.mark_flash("a", FlashKind::LostLead);
    settle().await;

    store.shutdown();
    advance_ms(1_000).await;

    assert_eq!(store.flash("a"), Some(FlashKind::LostLead));
}
