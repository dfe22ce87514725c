//! Message formatting.
//!
//! Pure functions from a typed [`Event`] to a platform-neutral [`Message`].
//! Nothing in here touches the network, the routing table or the clock.

use std::sync::Arc;

use marketbridge_protocol::{Message, colors};
use serde_json::Value;

use crate::catalog::CategoryCatalog;
use crate::event::{DisputePayload, DisputeResolvedPayload, Event, ListingPayload};

/// Longest description kept verbatim.
pub const DESCRIPTION_LIMIT: usize = 1000;
/// Characters kept from a description longer than [`DESCRIPTION_LIMIT`].
const TRUNCATED_KEEP: usize = 997;
const ELLIPSIS: &str = "...";

/// Discord rejects thread names over 100 characters.
const THREAD_NAME_LIMIT: usize = 100;

const NOT_AVAILABLE: &str = "N/A";
const NOT_CONNECTED: &str = "Not connected";
const DEFAULT_RESOLVER: &str = "Admin";
const DEFAULT_NOTES: &str = "No notes provided";
const DEFAULT_REASON: &str = "No reason provided";
const DEFAULT_DISPUTE_DESCRIPTION: &str = "No description provided";

/// Builds messages for events.
#[derive(Debug, Clone)]
pub struct MessageFormatter {
    frontend_base_url: String,
    catalog: Arc<CategoryCatalog>,
}

impl MessageFormatter {
    pub fn new(frontend_base_url: impl Into<String>, catalog: Arc<CategoryCatalog>) -> Self {
        let frontend_base_url = frontend_base_url.into().trim_end_matches('/').to_string();
        Self {
            frontend_base_url,
            catalog,
        }
    }

    pub fn format(&self, event: &Event) -> Message {
        match event {
            Event::ListingCreated(listing) => self.listing(listing, false),
            Event::ListingUpdated(listing) => self.listing(listing, true),
            Event::DisputeCreated(dispute) => self.dispute_created(dispute),
            Event::DisputeUpdated(dispute) => self.dispute_updated(dispute),
            Event::DisputeResolved(resolved) => self.dispute_resolved(resolved),
        }
    }

    /// Deep link to a listing on the marketplace frontend.
    pub fn listing_url(&self, listing_id: &str) -> String {
        format!("{}/product/{}", self.frontend_base_url, listing_id)
    }

    fn category_label(&self, category: Option<&str>) -> String {
        match category.map(str::trim).filter(|c| !c.is_empty()) {
            Some(code) => self.catalog.display_name(code).to_string(),
            None => NOT_AVAILABLE.to_string(),
        }
    }

    fn listing(&self, listing: &ListingPayload, updated: bool) -> Message {
        let (title, color) = if updated {
            ("Listing Updated", colors::LISTING_UPDATED)
        } else {
            ("New Listing", colors::LISTING)
        };
        let url = self.listing_url(&listing.listing_id);

        let mut message = Message::new(title, color);
        message.body_lines.push(format!("**{}**", listing.title.trim()));
        message.push_field("Price", format_price(listing.price.as_ref()), true);
        message.push_field(
            "Category",
            self.category_label(listing.category.as_deref()),
            true,
        );
        if let Some(seller) = non_blank(listing.seller_name.as_deref()) {
            message.push_field("Seller", seller, true);
        }
        if let Some(description) = present(listing.description.as_deref()) {
            message.push_field("Description", truncate_description(description), false);
        }
        message.push_field("View", format!("[View listing]({url})"), false);

        message.link = Some(url);
        message.image_url = listing
            .image_urls
            .as_ref()
            .and_then(|urls| urls.first())
            .cloned();
        message.footer = Some(format!("Listing ID: {}", listing.listing_id));
        message.timestamp = if updated {
            listing.updated_at.or(listing.created_at)
        } else {
            listing.created_at
        };
        message
    }

    fn dispute_created(&self, dispute: &DisputePayload) -> Message {
        let order = order_label(dispute.order_id.as_deref());

        let mut message = Message::new("Dispute Opened", colors::DISPUTE_WARNING);
        message
            .body_lines
            .push(format!("A dispute has been opened for order {order}."));
        message.push_field("Order ID", order, true);
        message.push_field(
            "Opened By",
            party_label(dispute.initiated_by.as_deref()),
            true,
        );
        message.push_field(
            "Category",
            self.category_label(dispute.category.as_deref()),
            true,
        );
        message.push_field(
            "Reason",
            truncate_description(present(dispute.reason.as_deref()).unwrap_or(DEFAULT_REASON)),
            false,
        );
        message.push_field(
            "Description",
            truncate_description(
                present(dispute.description.as_deref()).unwrap_or(DEFAULT_DISPUTE_DESCRIPTION),
            ),
            false,
        );
        message.push_field(
            "Buyer",
            identity(dispute.buyer_discord_id.as_deref()),
            true,
        );
        message.push_field(
            "Seller",
            identity(dispute.seller_discord_id.as_deref()),
            true,
        );
        if let Some(listing_id) = &dispute.listing_id {
            message.link = Some(self.listing_url(listing_id));
        }
        message.footer =
            dispute_footer(dispute.dispute_id.as_deref(), dispute.order_id.as_deref());
        message.timestamp = dispute.created_at;
        message
    }

    fn dispute_updated(&self, dispute: &DisputePayload) -> Message {
        let mut message = Message::new("Dispute Updated", colors::DISPUTE_INFO);
        message.push_field("Order ID", order_label(dispute.order_id.as_deref()), true);
        message.push_field(
            "Status",
            non_blank(dispute.status.as_deref()).unwrap_or("Updated"),
            true,
        );
        message.push_field(
            "Updated By",
            non_blank(dispute.updated_by.as_deref()).unwrap_or(DEFAULT_RESOLVER),
            true,
        );
        if let Some(note) = present(dispute.note.as_deref()) {
            message.push_field("Note", truncate_description(note), false);
        }
        message.footer =
            dispute_footer(dispute.dispute_id.as_deref(), dispute.order_id.as_deref());
        message.timestamp = dispute.updated_at.or(dispute.created_at);
        message
    }

    fn dispute_resolved(&self, resolved: &DisputeResolvedPayload) -> Message {
        let (resolution, color) = resolution_style(resolved.resolution.as_deref());

        let mut message = Message::new("Dispute Resolved", color);
        message.push_field("Order ID", order_label(resolved.order_id.as_deref()), true);
        message.push_field("Resolution", resolution, true);
        message.push_field(
            "Resolved By",
            non_blank(resolved.resolved_by.as_deref()).unwrap_or(DEFAULT_RESOLVER),
            true,
        );
        message.push_field(
            "Notes",
            truncate_description(
                present(resolved.resolution_notes.as_deref()).unwrap_or(DEFAULT_NOTES),
            ),
            false,
        );
        message.footer =
            dispute_footer(resolved.dispute_id.as_deref(), resolved.order_id.as_deref());
        message.timestamp = resolved.resolved_at;
        message
    }
}

/// Thread name for a newly opened dispute.
pub fn dispute_thread_name(dispute: &DisputePayload) -> String {
    let name = match (
        non_blank(dispute.order_id.as_deref()),
        non_blank(dispute.dispute_id.as_deref()),
    ) {
        (Some(order), _) => format!("dispute-order-{order}"),
        (None, Some(id)) => format!("dispute-{id}"),
        (None, None) => "dispute".to_string(),
    };
    name.chars().take(THREAD_NAME_LIMIT).collect()
}

/// Format a price as a two-decimal dollar amount, rounding half-cents away
/// from zero.
///
/// Accepts a JSON number or a numeric string; anything else formats as zero.
pub fn format_price(price: Option<&Value>) -> String {
    let amount = match price {
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => s.trim().trim_start_matches('$').parse::<f64>().ok(),
        _ => None,
    }
    .filter(|v| v.is_finite())
    .unwrap_or(0.0);
    // `{:.2}` alone rounds ties to even; adding 0.0 folds -0.0 into 0.0.
    let amount = (amount * 100.0).round() / 100.0 + 0.0;
    format!("${amount:.2}")
}

/// Cut text longer than [`DESCRIPTION_LIMIT`] characters down to 997
/// characters plus `...`.
pub fn truncate_description(text: &str) -> String {
    if text.chars().count() > DESCRIPTION_LIMIT {
        let mut cut: String = text.chars().take(TRUNCATED_KEEP).collect();
        cut.push_str(ELLIPSIS);
        cut
    } else {
        text.to_string()
    }
}

/// Resolution label and color for a resolution code.
pub fn resolution_style(code: Option<&str>) -> (&'static str, u32) {
    match code {
        Some("buyer") => ("Resolved in favor of buyer", colors::RESOLVED_BUYER),
        Some("seller") => ("Resolved in favor of seller", colors::RESOLVED_SELLER),
        Some("refund") => ("Refund issued", colors::RESOLVED_REFUND),
        _ => ("Resolved", colors::RESOLVED_DEFAULT),
    }
}

fn party_label(initiated_by: Option<&str>) -> String {
    match non_blank(initiated_by) {
        Some(party) if party.eq_ignore_ascii_case("buyer") => "Buyer".to_string(),
        Some(party) if party.eq_ignore_ascii_case("seller") => "Seller".to_string(),
        Some(party) => party.to_string(),
        None => "Unknown".to_string(),
    }
}

fn identity(user_id: Option<&str>) -> String {
    match non_blank(user_id) {
        Some(id) => format!("<@{id}>"),
        None => NOT_CONNECTED.to_string(),
    }
}

fn order_label(order_id: Option<&str>) -> String {
    match non_blank(order_id) {
        Some(id) => format!("#{id}"),
        None => NOT_AVAILABLE.to_string(),
    }
}

fn dispute_footer(dispute_id: Option<&str>, order_id: Option<&str>) -> Option<String> {
    match (non_blank(dispute_id), non_blank(order_id)) {
        (Some(id), _) => Some(format!("Dispute ID: {id}")),
        (None, Some(order)) => Some(format!("Order ID: #{order}")),
        (None, None) => None,
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

/// Like [`non_blank`] but keeps the text as sent, for fields that get truncated.
fn present(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::Envelope;
    use serde_json::json;

    fn formatter() -> MessageFormatter {
        MessageFormatter::new(
            "https://market.example/",
            Arc::new(CategoryCatalog::builtin()),
        )
    }

    fn event(event_type: &str, data: Value) -> Event {
        Event::from_envelope(&Envelope {
            event_type: event_type.to_string(),
            data: Some(data),
            scope: None,
        })
        .unwrap()
    }

    #[test]
    fn price_formatting() {
        assert_eq!(format_price(Some(&json!("99.9"))), "$99.90");
        assert_eq!(format_price(Some(&json!(10))), "$10.00");
        assert_eq!(format_price(Some(&json!(12.5))), "$12.50");
        assert_eq!(format_price(Some(&json!("$5"))), "$5.00");
        assert_eq!(format_price(Some(&json!("abc"))), "$0.00");
        assert_eq!(format_price(Some(&Value::Null)), "$0.00");
        assert_eq!(format_price(None), "$0.00");
    }

    #[test]
    fn description_truncation_boundary() {
        let exact = "a".repeat(1000);
        assert_eq!(truncate_description(&exact), exact);

        let long = "b".repeat(1001);
        let cut = truncate_description(&long);
        assert_eq!(cut.chars().count(), 1000);
        assert!(cut.ends_with("..."));
        assert_eq!(&cut[..997], "b".repeat(997));
    }

    #[test]
    fn price_ties_round_away_from_zero() {
        assert_eq!(format_price(Some(&json!("0.125"))), "$0.13");
        assert_eq!(format_price(Some(&json!(10.625))), "$10.63");
        assert_eq!(format_price(Some(&json!("-0.001"))), "$0.00");
    }

    #[test]
    fn description_is_truncated_as_sent() {
        let padded = format!(" {}", "c".repeat(1000));
        let message = formatter().format(&event(
            "listing.created",
            json!({"listing_id": 1, "title": "T", "description": padded}),
        ));
        let description = message.field("Description").unwrap();
        assert_eq!(description.chars().count(), 1000);
        assert!(description.ends_with("..."));

        let message = formatter().format(&event(
            "listing.created",
            json!({"listing_id": 1, "title": "T", "description": "   "}),
        ));
        assert_eq!(message.field("Description"), None);
    }

    #[test]
    fn truncation_counts_characters_not_bytes() {
        let long = "é".repeat(1200);
        let cut = truncate_description(&long);
        assert_eq!(cut.chars().count(), 1000);
    }

    #[test]
    fn listing_created_message() {
        let message = formatter().format(&event(
            "listing.created",
            json!({
                "listing_id": 5,
                "title": "X",
                "price": "10",
                "category": "wos_accounts",
                "description": "Lvl 30 furnace",
                "image_urls": ["https://img/1.png", "https://img/2.png"]
            }),
        ));

        assert_eq!(message.title, "New Listing");
        assert_eq!(message.color, colors::LISTING);
        assert_eq!(message.field("Price"), Some("$10.00"));
        assert_eq!(message.field("Category"), Some("Whiteout Survival"));
        assert_eq!(message.field("Description"), Some("Lvl 30 furnace"));
        assert_eq!(
            message.link.as_deref(),
            Some("https://market.example/product/5")
        );
        assert_eq!(
            message.field("View"),
            Some("[View listing](https://market.example/product/5)")
        );
        assert_eq!(message.image_url.as_deref(), Some("https://img/1.png"));
        assert_eq!(message.footer.as_deref(), Some("Listing ID: 5"));
    }

    #[test]
    fn listing_defaults() {
        let message = formatter().format(&event(
            "listing.updated",
            json!({"listing_id": "abc", "title": "Y"}),
        ));
        assert_eq!(message.title, "Listing Updated");
        assert_eq!(message.field("Price"), Some("$0.00"));
        assert_eq!(message.field("Category"), Some("N/A"));
        assert_eq!(message.field("Description"), None);
        assert_eq!(message.image_url, None);
    }

    #[test]
    fn format_is_idempotent() {
        let e = event(
            "dispute.created",
            json!({"dispute_id": 1, "order_id": 77, "initiated_by": "seller"}),
        );
        let f = formatter();
        assert_eq!(f.format(&e), f.format(&e));
    }

    #[test]
    fn dispute_created_message() {
        let message = formatter().format(&event(
            "dispute.created",
            json!({
                "dispute_id": 1,
                "order_id": 77,
                "initiated_by": "buyer",
                "category": "wos_accounts",
                "reason": "Account not delivered",
                "buyer_discord_id": "1234",
            }),
        ));

        assert_eq!(message.title, "Dispute Opened");
        assert_eq!(message.color, colors::DISPUTE_WARNING);
        assert_ne!(message.color, colors::LISTING);
        assert_eq!(message.field("Order ID"), Some("#77"));
        assert_eq!(message.field("Opened By"), Some("Buyer"));
        assert_eq!(message.field("Category"), Some("Whiteout Survival"));
        assert_eq!(message.field("Reason"), Some("Account not delivered"));
        assert_eq!(message.field("Description"), Some("No description provided"));
        assert_eq!(message.field("Buyer"), Some("<@1234>"));
        assert_eq!(message.field("Seller"), Some("Not connected"));
    }

    #[test]
    fn dispute_resolved_colors_and_labels() {
        let cases = [
            ("buyer", "Resolved in favor of buyer", colors::RESOLVED_BUYER),
            ("seller", "Resolved in favor of seller", colors::RESOLVED_SELLER),
            ("refund", "Refund issued", colors::RESOLVED_REFUND),
            ("split", "Resolved", colors::RESOLVED_DEFAULT),
        ];
        for (code, label, color) in cases {
            let message = formatter().format(&event(
                "dispute.resolved",
                json!({"dispute_id": 1, "resolution": code}),
            ));
            assert_eq!(message.field("Resolution"), Some(label), "code {code}");
            assert_eq!(message.color, color, "code {code}");
        }
    }

    #[test]
    fn resolution_codes_match_exactly() {
        assert_eq!(resolution_style(Some("buyer")).0, "Resolved in favor of buyer");
        assert_eq!(
            resolution_style(Some("Buyer")),
            ("Resolved", colors::RESOLVED_DEFAULT)
        );
        assert_eq!(
            resolution_style(Some(" refund")),
            ("Resolved", colors::RESOLVED_DEFAULT)
        );
        assert_eq!(resolution_style(None), ("Resolved", colors::RESOLVED_DEFAULT));
    }

    #[test]
    fn dispute_without_id_falls_back_to_order() {
        let message = formatter().format(&event(
            "dispute.resolved",
            json!({"order_id": 70, "resolution": "refund"}),
        ));
        assert_eq!(message.footer.as_deref(), Some("Order ID: #70"));
        assert_eq!(message.field("Resolution"), Some("Refund issued"));

        let message = formatter().format(&event("dispute.updated", json!({"status": "open"})));
        assert_eq!(message.footer, None);

        let Event::DisputeCreated(dispute) = event("dispute.created", json!({"dispute_id": 8}))
        else {
            unreachable!()
        };
        assert_eq!(dispute_thread_name(&dispute), "dispute-8");
        let Event::DisputeCreated(dispute) = event("dispute.created", json!({})) else {
            unreachable!()
        };
        assert_eq!(dispute_thread_name(&dispute), "dispute");
    }

    #[test]
    fn dispute_resolved_defaults() {
        let message = formatter().format(&event("dispute.resolved", json!({"dispute_id": 9})));
        assert_eq!(message.field("Resolved By"), Some("Admin"));
        assert_eq!(message.field("Notes"), Some("No notes provided"));
        assert_eq!(message.field("Resolution"), Some("Resolved"));
        assert_ne!(message.color, colors::DISPUTE_WARNING);
    }

    #[test]
    fn dispute_updated_message() {
        let message = formatter().format(&event(
            "dispute.updated",
            json!({"dispute_id": 4, "status": "under_review", "note": "Waiting on seller"}),
        ));
        assert_eq!(message.title, "Dispute Updated");
        assert_eq!(message.field("Status"), Some("under_review"));
        assert_eq!(message.field("Note"), Some("Waiting on seller"));
        assert_eq!(message.field("Updated By"), Some("Admin"));
    }

    #[test]
    fn thread_name_prefers_order_and_is_bounded() {
        let Event::DisputeCreated(dispute) = event(
            "dispute.created",
            json!({"dispute_id": 1, "order_id": "x".repeat(300)}),
        ) else {
            unreachable!()
        };
        let name = dispute_thread_name(&dispute);
        assert!(name.starts_with("dispute-order-"));
        assert_eq!(name.chars().count(), 100);
    }
}
