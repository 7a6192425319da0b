//! Shared primitive types used across the book view, registry, and gateway.

use rust_decimal::Decimal;

/// Which side of the book an order or book level belongs to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    /// The side that pairs with this one in a round trip.
    pub fn opposite(self) -> Side {
        match self {
            Side::Buy => Side::Sell,
            Side::Sell => Side::Buy,
        }
    }
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Side::Buy => write!(f, "BUY"),
            Side::Sell => write!(f, "SELL"),
        }
    }
}

/// A single resting level in a book snapshot.
#[derive(Clone, Debug)]
pub struct BookLevel {
    pub price: Decimal,
    pub size: Decimal,
    pub order_id: Option<String>,
}

/// The exchange's last-traded price, as published by the Book Feed.
#[derive(Clone, Copy, Debug)]
pub struct Ticker {
    pub price: Decimal,
}

/// An exchange-reported open order, as returned by `ExchangeClient::get_orders`.
/// Used by the registry to adopt pre-existing orders (`manage_existing_orders`).
#[derive(Clone, Debug)]
pub struct ExchangeOrderInfo {
    pub id: String,
    pub side: Side,
    pub price: Decimal,
    pub size: Decimal,
}

/// An exchange-reported fill, as returned by `ExchangeClient::get_fills`.
#[derive(Clone, Debug)]
pub struct ExchangeFill {
    pub order_id: String,
    pub side: Side,
    pub price: Decimal,
    pub size: Decimal,
    pub fee: Decimal,
}
