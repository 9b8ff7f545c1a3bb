use super::*;
use auction_client::{FlashKind, Severity};
use events::{AuctionItem, User};
use uuid::Uuid;

fn item(id: &str, bid: i64, bidder: Option<&str>, end: i64) -> AuctionItem {
    AuctionItem {
        id: id.to_owned(),
        title: format!("Lot {id}"),
        description: String::new(),
        image_url: String::new(),
        current_bid: bid,
        current_bidder: bidder.map(str::to_owned),
        auction_end_time: end,
        status: AuctionStatus::Active,
        time_remaining: None,
    }
}

fn loaded(items: Vec<AuctionItem>) -> AuctionState {
    let mut state = AuctionState::default();
    state.load_snapshot(items);
    state
}

// =============================================================================
// parse_command
// =============================================================================

#[test]
fn parses_simple_verbs() {
    assert_eq!(parse_command("users"), Ok(Command::Users));
    assert_eq!(parse_command("  ITEMS "), Ok(Command::Items));
    assert_eq!(parse_command("refresh"), Ok(Command::Refresh));
    assert_eq!(parse_command("q"), Ok(Command::Quit));
    assert_eq!(parse_command(""), Ok(Command::Help));
}

#[test]
fn parses_user_selection() {
    assert_eq!(parse_command("user u1"), Ok(Command::User("u1".to_owned())));
    assert!(parse_command("user").is_err());
}

#[test]
fn parses_bid_with_and_without_amount() {
    assert_eq!(
        parse_command("bid a $150"),
        Ok(Command::Bid { item_id: "a".to_owned(), amount: Some(150) })
    );
    assert_eq!(parse_command("bid a"), Ok(Command::Bid { item_id: "a".to_owned(), amount: None }));
    assert_eq!(parse_command("bid a lots"), Err("invalid amount: lots".to_owned()));
    assert!(parse_command("bid").is_err());
    assert!(parse_command("bid a 10 20").is_err());
}

#[test]
fn rejects_unknown_verbs() {
    let err = parse_command("dance").expect_err("unknown verb");
    assert!(err.starts_with("unknown command: dance"));
}

// =============================================================================
// render
// =============================================================================

#[test]
fn render_shows_loading_until_first_snapshot() {
    assert_eq!(render(&AuctionState::default(), &[], 0), "Loading auctions...");
}

#[test]
fn render_shows_header_and_empty_board() {
    let state = loaded(Vec::new());
    let text = render(&state, &[], 0);
    assert_eq!(text, "[offline] (no user selected) | 0 items\nNo active auctions");
}

#[test]
fn render_lists_items_with_countdown_status_and_flash() {
    let mut state = loaded(vec![item("a", 120, Some("u2"), 95_000), item("b", 40, None, 20_000)]);
    state.connected = true;
    state.current_user = Some(User { id: "u1".to_owned(), name: "Ada".to_owned() });
    state.record_local_bid("a", 110);
    state.flashing.insert("a".to_owned(), FlashKind::LostLead);

    let text = render(&state, &[], 0);
    let lines: Vec<&str> = text.lines().collect();

    assert_eq!(lines[0], "[live] Ada | 2 items");
    assert!(lines[1].starts_with("a "));
    assert!(lines[1].contains("$120"));
    assert!(lines[1].contains("1m 35s"));
    assert!(lines[1].contains("normal"));
    assert!(lines[1].contains("outbid"));
    assert!(lines[1].ends_with("red"));
    assert!(lines[2].contains("20s"));
    assert!(lines[2].contains("critical"));
    assert!(lines[2].contains("active"));
}

#[test]
fn render_marks_ended_items() {
    let mut state = loaded(vec![item("a", 300, Some("u1"), 1_000_000)]);
    state.items[0].status = AuctionStatus::Ended;

    let text = render(&state, &[], 0);
    assert!(text.contains("Ended"));
}

#[test]
fn render_appends_notifications() {
    let state = loaded(vec![item("a", 100, None, 60_000)]);
    let notes = vec![Notification {
        id: Uuid::nil(),
        message: "Bid placed successfully!".to_owned(),
        severity: Severity::Success,
    }];

    let text = render(&state, &notes, 0);
    assert!(text.ends_with("(success) Bid placed successfully!"));
}

#[test]
fn render_users_marks_current_identity() {
    let mut state = AuctionState::default();
    state.users = vec![
        User { id: "u1".to_owned(), name: "Ada".to_owned() },
        User { id: "u2".to_owned(), name: "Bo".to_owned() },
    ];
    state.current_user = Some(state.users[1].clone());

    assert_eq!(render_users(&state), "  u1 Ada\n* u2 Bo");
    assert_eq!(render_users(&AuctionState::default()), "no identities available");
}
