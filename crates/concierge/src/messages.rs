//! Message copy and interactive menu builders.

use chrono::{DateTime, Utc};
use database::{Booking, Event, EventCategory, Ticket, TicketTier};
use rust_decimal::Decimal;
use whatsapp::outbound::{Button, ListRow, ListSection};

/// Row id for the "back to categories" navigation entry.
pub const BACK_TO_CATEGORIES: &str = "BACK_TO_CATEGORIES";
/// Button ids for the payment method choice.
pub const METHOD_MPESA: &str = "MPESA";
pub const METHOD_CARD: &str = "CARD";
/// Button ids for the payment-phone confirmation.
pub const USE_CURRENT_NUMBER: &str = "USE_CURRENT_NUMBER";
pub const USE_OTHER_NUMBER: &str = "USE_OTHER_NUMBER";

pub const CATEGORY_MENU_BODY: &str =
    "Karibu! What kind of event are you looking for?";
pub const CATEGORY_MENU_BUTTON: &str = "Browse";

pub const GENERIC_ERROR: &str =
    "Something went wrong on our side. Type 'menu' to start over.";
pub const HIGH_DEMAND: &str =
    "Those tickets are in high demand right now. Please try again in a few minutes.";
pub const PAYMENT_PROCESSING: &str =
    "Your payment is being processed. You'll get your tickets here the moment it's confirmed.";
pub const INVALID_QUANTITY: &str = "Please type a number between 1 and 5.";
pub const UNKNOWN_EVENT: &str =
    "We couldn't find that event. Here are the categories again:";
pub const EVENT_UNAVAILABLE: &str =
    "Sorry, that event is no longer available. Here are the categories again:";
pub const TIER_UNAVAILABLE: &str =
    "Sorry, that ticket type has sold out. Here are the categories again:";
pub const ASK_OTHER_NUMBER: &str =
    "Type the M-Pesa number to charge (e.g. 0712 345 678).";
pub const INVALID_MPESA_NUMBER: &str =
    "That doesn't look like a valid M-Pesa number. Try again, e.g. 0712 345 678.";
pub const STK_SENT: &str =
    "Check your phone for the M-Pesa prompt and enter your PIN to pay. Your tickets will arrive here.";
pub const STK_FAILED: &str =
    "We couldn't reach M-Pesa just now. Pick a payment method to try again.";
pub const STK_NOT_ELIGIBLE: &str =
    "M-Pesa payments are unavailable for this event right now. Card payment still works.";
pub const CARD_LINK_FAILED: &str =
    "We couldn't generate your payment link just now. Pick a payment method to try again.";
pub const CHOOSE_METHOD_AGAIN: &str = "Please choose how you'd like to pay.";

fn category_title(category: EventCategory) -> &'static str {
    match category {
        EventCategory::University => "Campus events",
        EventCategory::Concert => "Concerts",
        EventCategory::Club => "Club nights",
        EventCategory::Social => "Social events",
        EventCategory::Holiday => "Holiday specials",
    }
}

/// KES price line for display.
pub fn kes(amount: &Decimal) -> String {
    format!("KES {amount}")
}

fn short_date(at: DateTime<Utc>) -> String {
    at.format("%a %d %b, %H:%M").to_string()
}

/// The category list menu.
pub fn category_sections() -> Vec<ListSection> {
    let rows = EventCategory::ALL
        .iter()
        .map(|c| ListRow::new(c.as_str(), category_title(*c), None))
        .collect();
    vec![ListSection::new("Categories", rows)]
}

fn back_section() -> ListSection {
    ListSection::new(
        "Navigate",
        vec![ListRow::new(BACK_TO_CATEGORIES, "Back to categories", None)],
    )
}

/// The events list for a category, capped to leave room for the back row.
pub fn event_sections(events: &[Event]) -> Vec<ListSection> {
    let rows = events
        .iter()
        .take(9)
        .map(|e| {
            ListRow::new(
                e.id.to_string(),
                &e.title,
                Some(&format!("{} · {}", e.venue, short_date(e.start_time))),
            )
        })
        .collect();
    vec![ListSection::new("Upcoming", rows), back_section()]
}

pub fn no_events(category: EventCategory) -> String {
    format!(
        "Nothing coming up under {} yet. Check the other categories:",
        category_title(category)
    )
}

/// Intro text above an event's tier list.
pub fn tier_list_body(event: &Event) -> String {
    format!(
        "{}\n{} · {}\n\nPick your ticket type:",
        event.title,
        event.venue,
        short_date(event.start_time)
    )
}

/// The tier list for an event, capped to leave room for the back row.
pub fn tier_sections(tiers: &[TicketTier]) -> Vec<ListSection> {
    let rows = tiers
        .iter()
        .take(9)
        .map(|t| {
            ListRow::new(
                t.id.to_string(),
                &t.name,
                Some(&format!("{} · {} left", kes(&t.price), t.available())),
            )
        })
        .collect();
    vec![ListSection::new("Tickets", rows), back_section()]
}

pub fn quantity_prompt(tier: &TicketTier, max: u32) -> String {
    format!(
        "{} at {} each.\nHow many tickets? Type a number from 1 to {}.",
        tier.name,
        kes(&tier.price),
        max
    )
}

/// The payment-method prompt with its two buttons.
pub fn method_prompt(
    event: &Event,
    tier: &TicketTier,
    quantity: u32,
    total: &Decimal,
) -> (String, Vec<Button>) {
    let body = format!(
        "{} x {} for {}.\nTotal: {}\n\nHow would you like to pay?",
        quantity,
        tier.name,
        event.title,
        kes(total)
    );
    let buttons = vec![
        Button::new(METHOD_MPESA, "M-Pesa"),
        Button::new(METHOD_CARD, "Card"),
    ];
    (body, buttons)
}

/// The "use this number?" prompt with its yes/no buttons.
pub fn payment_phone_prompt(phone: &str) -> (String, Vec<Button>) {
    let body = format!("Send the M-Pesa prompt to this number (+{phone})?");
    let buttons = vec![
        Button::new(USE_CURRENT_NUMBER, "Yes, this number"),
        Button::new(USE_OTHER_NUMBER, "No, another one"),
    ];
    (body, buttons)
}

/// The hosted-payment link message.
pub fn card_link(total: &Decimal, url: &str) -> String {
    format!(
        "Total: {}\n\nComplete your card payment here:\n{}\n\nYour tickets will arrive in this chat once the payment goes through.",
        kes(total),
        url
    )
}

/// The payment confirmation text: event details, quantity, total and every
/// ticket code.
pub fn confirmation(
    event: &Event,
    tier: &TicketTier,
    booking: &Booking,
    tickets: &[Ticket],
) -> String {
    let codes = tickets
        .iter()
        .map(|t| format!("• {}", t.unique_code))
        .collect::<Vec<_>>()
        .join("\n");
    format!(
        "Payment received!\n\n{}\n{}\n{}\n\n{} x {} — {}\n\nYour ticket codes:\n{}\n\nShow the QR images at the gate.",
        event.title,
        short_date(event.start_time),
        event.venue,
        booking.quantity,
        tier.name,
        kes(&booking.total_amount),
        codes
    )
}

/// Caption for a delivered ticket image.
pub fn ticket_caption(event: &Event, tier: &TicketTier) -> String {
    format!("{} — {}", event.title, tier.name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn test_category_sections_cover_all_categories() {
        let sections = category_sections();
        assert_eq!(sections.len(), 1);
        assert_eq!(sections[0].rows.len(), 5);
        assert_eq!(sections[0].rows[0].id, "UNIVERSITY");
    }

    #[test]
    fn test_event_sections_keep_back_row() {
        let events: Vec<Event> = (0..12)
            .map(|i| Event {
                id: Uuid::new_v4(),
                title: format!("Event {i}"),
                description: None,
                venue: "Venue".to_string(),
                start_time: Utc::now(),
                end_time: None,
                is_active: true,
                category: EventCategory::Concert,
            })
            .collect();

        let sections = event_sections(&events);
        let total_rows: usize = sections.iter().map(|s| s.rows.len()).sum();
        assert!(total_rows <= 10);
        assert_eq!(sections.last().unwrap().rows[0].id, BACK_TO_CATEGORIES);
    }

    #[test]
    fn test_confirmation_lists_all_codes() {
        let event = Event {
            id: Uuid::new_v4(),
            title: "Campus Fest".to_string(),
            description: None,
            venue: "Main Grounds".to_string(),
            start_time: Utc::now(),
            end_time: None,
            is_active: true,
            category: EventCategory::University,
        };
        let tier = TicketTier {
            id: Uuid::new_v4(),
            event_id: event.id,
            name: "Regular".to_string(),
            price: Decimal::new(500, 0),
            quantity: 10,
            quantity_sold: 2,
        };
        let booking = Booking {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            tier_id: tier.id,
            quantity: 2,
            total_amount: Decimal::new(1000, 0),
            status: database::BookingStatus::Paid,
            payment_method: database::PaymentMethod::Mpesa,
            payment_phone_number: None,
            payment_reference: Some("INV-77".to_string()),
            expiry_time: Utc::now(),
            created_at: Utc::now(),
        };
        let tickets = vec![
            Ticket {
                id: Uuid::new_v4(),
                booking_id: booking.id,
                unique_code: "AB01-FF3C".to_string(),
                is_redeemed: false,
                created_at: Utc::now(),
            },
            Ticket {
                id: Uuid::new_v4(),
                booking_id: booking.id,
                unique_code: "9C2D-0E11".to_string(),
                is_redeemed: false,
                created_at: Utc::now(),
            },
        ];

        let text = confirmation(&event, &tier, &booking, &tickets);
        assert!(text.contains("Campus Fest"));
        assert!(text.contains("KES 1000"));
        assert!(text.contains("AB01-FF3C"));
        assert!(text.contains("9C2D-0E11"));
    }
}
