//! Fake e-commerce webhook events.
use crate::traits::{Payload, PayloadGenerator};
use rand::seq::SliceRandom;
use rand::Rng;
use serde_json::{json, Value};
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

pub const ORDER_CREATED: &str = "order.created";
pub const ORDER_STATUS_UPDATED: &str = "order.status.updated";
pub const CUSTOMER_CREATED: &str = "customer.created";
pub const CUSTOMER_UPDATED: &str = "customer.updated";
pub const APP_STORE_AUTHORIZE: &str = "app.store.authorize";

/// Event types picked when the caller does not ask for one.
pub const RANDOM_EVENTS: [&str; 3] = [ORDER_CREATED, CUSTOMER_CREATED, CUSTOMER_UPDATED];

const FIRST_NAMES: [&str; 8] = [
    "James", "Mary", "John", "Patricia", "Robert", "Jennifer", "Michael", "Linda",
];
const LAST_NAMES: [&str; 8] = [
    "Smith", "Johnson", "Williams", "Brown", "Jones", "Garcia", "Miller", "Davis",
];
const CITIES: [&str; 6] = ["Riyadh", "Jeddah", "Dammam", "Makkah", "Madinah", "Khobar"];
const PRODUCTS: [&str; 8] = [
    "Luxury Perfume",
    "Smart Watch",
    "Leather Bag",
    "Men's Shirt",
    "Women's Dress",
    "Sports Shoes",
    "Smartphone",
    "Wireless Headphones",
];
const ORDER_STATUSES: [&str; 4] = ["under_review", "in_progress", "shipped", "completed"];

/// Generates plausible store webhook bodies with randomised customers, products and totals.
#[derive(Debug, Clone, Default)]
pub struct WebhookGenerator;

impl WebhookGenerator {
    pub fn new() -> Self {
        Self
    }
}

impl PayloadGenerator for WebhookGenerator {
    fn generate(&self, entity_id: &str, event_type: Option<&str>) -> Payload {
        let mut rng = rand::thread_rng();
        let event = match event_type {
            Some(event) => event,
            None => RANDOM_EVENTS.choose(&mut rng).copied().unwrap_or(ORDER_CREATED),
        };

        let data = match event {
            ORDER_CREATED => order(&mut rng),
            ORDER_STATUS_UPDATED => json!({
                "order_id": rng.gen_range(100_000..1_000_000),
                "status": pick(&mut rng, &ORDER_STATUSES),
            }),
            CUSTOMER_CREATED | CUSTOMER_UPDATED => customer(&mut rng),
            APP_STORE_AUTHORIZE => json!({
                "id": rng.gen_range(1_000_000_000u64..2_000_000_000),
                "app_name": "surge",
                "access_token": format!("at_{:016x}", rng.gen::<u64>()),
                "scope": "settings.read customers.read orders.read",
            }),
            _ => json!({}),
        };

        Payload::new(
            event,
            json!({
                "merchant": entity_id,
                "created_at": now(),
                "data": data,
            }),
        )
    }
}

fn customer<R: Rng>(rng: &mut R) -> Value {
    let first = pick(rng, &FIRST_NAMES);
    let last = pick(rng, &LAST_NAMES);
    json!({
        "id": rng.gen_range(1_000_000..10_000_000),
        "first_name": first,
        "last_name": last,
        "email": format!("{}.{}.{:08x}@test.com", first.to_lowercase(), last.to_lowercase(), rng.gen::<u32>()),
        "mobile": format!("5{:08}", rng.gen_range(0..100_000_000)),
        "mobile_code": "+966",
        "city": pick(rng, &CITIES),
        "country": "SA",
    })
}

fn order<R: Rng>(rng: &mut R) -> Value {
    let items: Vec<Value> = (0..rng.gen_range(1..=3))
        .map(|_| {
            let price = (rng.gen_range(50.0..1050.0_f64) * 100.).round() / 100.;
            json!({
                "id": rng.gen_range(1..1_000_000),
                "name": pick(rng, &PRODUCTS),
                "price": price,
                "quantity": rng.gen_range(1..=5),
                "currency": "SAR",
            })
        })
        .collect();
    let total: f64 = items
        .iter()
        .map(|item| item["price"].as_f64().unwrap_or(0.) * item["quantity"].as_f64().unwrap_or(0.))
        .sum();

    json!({
        "id": rng.gen_range(100_000..1_000_000),
        "reference_id": rng.gen_range(10_000..100_000),
        "status": "under_review",
        "customer": customer(rng),
        "items": items,
        "amounts": { "total": (total * 100.).round() / 100., "currency": "SAR" },
    })
}

fn pick<'a, R: Rng>(rng: &mut R, values: &[&'a str]) -> &'a str {
    values.choose(rng).copied().unwrap_or_default()
}

fn now() -> String {
    OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .unwrap_or_default()
}
