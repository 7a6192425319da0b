//! The Order entity and its price-adjustment methods.
//!
//! Adjustment methods are pure: they read the current `BookSnapshot`, ticker,
//! and peer price list passed in by the caller rather than reaching back into
//! a live engine. This is the context-injection shape — the Order itself
//! never holds a handle to the registry or book view.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use crate::book::BookSnapshot;
use crate::config::Config;
use crate::error::InvariantError;
use crate::types::{Side, Ticker};

pub const DEFAULT_FACTOR: Decimal = dec!(0.8);
pub const DEFAULT_MIN_PROFIT: Decimal = dec!(0.01);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OrderState {
    Draft,
    Open,
    Filled,
    Cancelled,
}

/// A single live (or historical) limit order.
#[derive(Clone, Debug)]
pub struct Order {
    pub id: Option<String>,
    pub side: Side,
    pub price: Decimal,
    pub size: Decimal,
    pub state: OrderState,
    pub opposite: Option<Box<Order>>,
    locked: bool,
}

impl Order {
    /// Constructs a fresh Draft order. Rounds the price to 2dp immediately
    /// (invariant 5) so every later equality comparison is exact.
    pub fn draft(side: Side, price: Decimal, size: Decimal) -> Self {
        Self {
            id: None,
            side,
            price: round2(price),
            size,
            state: OrderState::Draft,
            opposite: None,
            locked: false,
        }
    }

    pub fn mark_open(&mut self, id: String) {
        self.id = Some(id);
        self.state = OrderState::Open;
    }

    pub fn mark_filled(&mut self) {
        self.state = OrderState::Filled;
    }

    pub fn mark_cancelled(&mut self) {
        self.state = OrderState::Cancelled;
    }

    pub fn locked(&self) -> bool {
        self.locked
    }

    pub fn lock(&mut self) {
        self.locked = true;
    }

    pub fn unlock(&mut self) {
        self.locked = false;
    }

    /// Fresh cross-side pairing (invariant 2). Never valid for a same-side
    /// order — use `inherit_opposite` for same-side replacement (invariant 3).
    pub fn link_opposite(&mut self, opposite: Order) -> Result<(), InvariantError> {
        if opposite.side == self.side {
            return Err(InvariantError::SameSideOpposite { side: self.side });
        }
        self.opposite = Some(Box::new(opposite));
        Ok(())
    }

    /// Same-side replacement inherits the prior order's opposite unchanged
    /// (invariant 3): replacing buy B1 with buy B2 gives `B2.opposite = B1.opposite`.
    pub fn inherit_opposite(&mut self, prior: &Order) -> Result<(), InvariantError> {
        if prior.side != self.side {
            return Err(InvariantError::UnpairedSameSideOpposite {
                order_id: prior.id.clone().unwrap_or_default(),
            });
        }
        self.opposite = prior.opposite.clone();
        Ok(())
    }

    /// `opposite.price × (1 − stop_pct)`, sells only, when paired and stop_pct > 0.
    pub fn stop_amount(&self, stop_pct: Decimal) -> Option<Decimal> {
        if self.side != Side::Sell || stop_pct <= Decimal::ZERO {
            return None;
        }
        self.opposite.as_ref().map(|opp| round2(opp.price * (Decimal::ONE - stop_pct)))
    }

    /// Currency distance between this order and the opposite-side touch.
    /// Positive means the order sits further from the touch than `spread` calls for.
    pub fn amount_above_spread(&self, spread: Decimal, bid: Decimal, ask: Decimal) -> Decimal {
        match self.side {
            Side::Sell => round2(self.price - (bid + spread)),
            Side::Buy => round2(self.price - (ask - spread)),
        }
    }

    fn touch(&self, book: &BookSnapshot) -> (Decimal, Decimal) {
        let bid = book.highest_bid().map(|l| l.price).unwrap_or(Decimal::ZERO);
        let ask = book.lowest_ask().map(|l| l.price).unwrap_or(Decimal::ZERO);
        (bid, ask)
    }

    /// Moves the order closer to the market by `amount_above_spread × factor`,
    /// clamped so the profitable side never loses `min_profit` against `opposite`.
    pub fn price_adjusted_to_spread(
        &self,
        book: &BookSnapshot,
        config: &Config,
        aggressive: bool,
        factor: Decimal,
        min_profit: Decimal,
    ) -> Decimal {
        let spread = config.spread(aggressive);
        let (bid, ask) = self.touch(book);
        let amount = self.amount_above_spread(spread, bid, ask);
        let mut price = round2(self.price - amount * factor);

        if let Some(opp) = &self.opposite {
            match self.side {
                Side::Sell => {
                    let floor = round2(opp.price + min_profit);
                    if price < floor {
                        price = floor;
                    }
                }
                Side::Buy => {
                    let ceiling = round2(opp.price - min_profit);
                    if price > ceiling {
                        price = ceiling;
                    }
                }
            }
        }
        price
    }

    /// Nudges the candidate price away from every same-side peer until it
    /// sits more than `2·step` from all of them (invariant 7).
    ///
    /// `peer_prices` must already be filtered to same-side peers by the caller
    /// (the registry groups orders by side); this method only excludes `self.price`.
    pub fn price_adjusted_to_other_prices(
        &self,
        peer_prices: &[Decimal],
        book: &BookSnapshot,
        config: &Config,
        aggressive: bool,
        step: Decimal,
        min_profit: Decimal,
    ) -> Decimal {
        let my_min = self.price_adjusted_to_spread(book, config, aggressive, DEFAULT_FACTOR, min_profit);

        let peers: Vec<Decimal> = peer_prices.iter().copied().filter(|&p| p != self.price).collect();
        if peers.is_empty() {
            return my_min;
        }
        let min_peer = peers.iter().copied().fold(peers[0], Decimal::min);

        let incrementing = match self.side {
            Side::Buy => aggressive,
            Side::Sell => {
                if aggressive {
                    !(my_min >= min_peer - step)
                } else {
                    true
                }
            }
        };

        let mut candidate = my_min;
        let window = step * Decimal::TWO;
        while peers.iter().any(|&p| (p - candidate).abs() <= window) {
            candidate = round2(candidate + if incrementing { step } else { -step });
        }
        candidate
    }

    /// Prevents crossing the book: clamps to `ticker ∓ spread`, then nudges
    /// away from same-side peer collisions by `spread/2`.
    pub fn price_adjusted_to_ticker(
        &self,
        config: &Config,
        aggressive: bool,
        ticker: Option<Ticker>,
        peer_prices: &[Decimal],
    ) -> Decimal {
        let spread = config.spread(aggressive);
        let mut price = self.price;

        if let Some(t) = ticker {
            match self.side {
                Side::Buy => {
                    if price >= t.price - spread {
                        price = round2(t.price - spread);
                    }
                }
                Side::Sell => {
                    if price <= t.price + spread {
                        price = round2(t.price + spread);
                    }
                }
            }
        }

        let half = spread / Decimal::TWO;
        while peer_prices.iter().any(|&p| p == price) {
            price = round2(price + match self.side {
                Side::Buy => -half,
                Side::Sell => half,
            });
        }
        price
    }

    /// Anchors against the first same-side book level at index ≥ `min_idx`
    /// whose size ≥ `wall_size`. `None` if no such level exists.
    pub fn price_adjusted_to_wall(
        &self,
        book: &BookSnapshot,
        min_idx: usize,
        wall_size: Decimal,
        bump: Decimal,
    ) -> Option<Decimal> {
        let (_, level) = book.calculate_wall_size(self.side, min_idx, wall_size)?;
        Some(round2(match self.side {
            Side::Buy => level.price + bump,
            Side::Sell => level.price - bump,
        }))
    }

    /// Walks the price up a cent at a time until `get_pnl(price) >= min_profit`.
    /// Returns `self.price` unchanged when unpaired (PnL undefined).
    pub fn price_adjusted_to_profit_target(&self, min_profit: Decimal) -> Decimal {
        if self.opposite.is_none() {
            return self.price;
        }
        let mut price = self.price;
        loop {
            match self.get_pnl(price) {
                Some(pnl) if pnl >= min_profit => return price,
                Some(_) => price = round2(price + dec!(0.01)),
                None => return price,
            }
        }
    }

    /// PnL of closing this order's round trip at `price`. `None` when unpaired.
    pub fn get_pnl(&self, price: Decimal) -> Option<Decimal> {
        self.opposite.as_ref().map(|opp| {
            round2(match self.side {
                Side::Sell => self.size * price - opp.size * opp.price,
                Side::Buy => opp.size * opp.price - self.size * price,
            })
        })
    }
}

/// Rounds to 2 decimal places — applied immediately after every price
/// computation so equality comparisons against peer prices are exact.
pub fn round2(d: Decimal) -> Decimal {
    d.round_dp(2)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::BookLevel;

    fn config() -> Config {
        Config {
            product_id: "BTC-USD".into(),
            max_spread: dec!(0.10),
            min_spread: dec!(0.05),
            stop_pct: dec!(0.05),
            spend_pct: dec!(0.01),
            max_open_buys: 6,
            max_open_sells: 12,
            interval_secs: 2,
            wall_size: None,
            aggressive: true,
            manage_existing_orders: true,
            dry_run: true,
        }
    }

    fn book(bid: Decimal, ask: Decimal) -> BookSnapshot {
        BookSnapshot {
            bids: vec![BookLevel { price: bid, size: dec!(1), order_id: None }],
            asks: vec![BookLevel { price: ask, size: dec!(1), order_id: None }],
        }
    }

    /// Scenario: a sell's opposite buy is at 300.00, stop_pct=0.05.
    /// Expected: stop_amount == 285.00 (spec §8 invariant 5 / Scenario 3).
    #[test]
    fn stop_amount_derives_from_opposite_buy() {
        let buy = Order::draft(Side::Buy, dec!(300.00), dec!(0.1));
        let mut sell = Order::draft(Side::Sell, dec!(305.00), dec!(0.1));
        sell.link_opposite(buy).unwrap();

        assert_eq!(sell.stop_amount(dec!(0.05)), Some(dec!(285.00)));
    }

    /// Scenario: a buy has no opposite.
    /// Expected: stop_amount is undefined regardless of stop_pct.
    #[test]
    fn stop_amount_undefined_for_buys() {
        let order = Order::draft(Side::Buy, dec!(300.00), dec!(0.1));
        assert_eq!(order.stop_amount(dec!(0.05)), None);
    }

    /// Scenario: linking a same-side order as a fresh opposite.
    /// Expected: InvariantError::SameSideOpposite, never a silent no-op (invariant 2).
    #[test]
    fn link_opposite_rejects_same_side() {
        let mut buy = Order::draft(Side::Buy, dec!(300.00), dec!(0.1));
        let other_buy = Order::draft(Side::Buy, dec!(299.50), dec!(0.1));
        let err = buy.link_opposite(other_buy).unwrap_err();
        assert!(matches!(err, InvariantError::SameSideOpposite { .. }));
    }

    /// Scenario: replacing buy B1 (paired to a sell) with buy B2.
    /// Expected: B2 inherits B1's opposite unchanged (invariant 3).
    #[test]
    fn inherit_opposite_carries_prior_pairing_across_replacement() {
        let sell = Order::draft(Side::Sell, dec!(305.00), dec!(0.1));
        let mut b1 = Order::draft(Side::Buy, dec!(300.00), dec!(0.1));
        b1.link_opposite(sell).unwrap();

        let mut b2 = Order::draft(Side::Buy, dec!(300.50), dec!(0.1));
        b2.inherit_opposite(&b1).unwrap();

        assert_eq!(b2.opposite.unwrap().price, dec!(305.00));
    }

    /// Scenario: price_adjusted_to_ticker for a buy sitting at or above ticker − spread.
    /// Expected: clamped to ticker − spread, i.e. strictly below ticker (invariant 6).
    #[test]
    fn ticker_adjustment_never_crosses_for_buy() {
        let cfg = config();
        let order = Order::draft(Side::Buy, dec!(299.99), dec!(0.1));
        let price = order.price_adjusted_to_ticker(&cfg, true, Some(Ticker { price: dec!(300.00) }), &[]);
        assert!(price < dec!(300.00));
        assert_eq!(price, dec!(299.95));
    }

    /// Scenario 5 (ticker no-cross): sell candidate 299.50, ticker 300.00, aggressive.
    /// Expected: price raised to 300.05.
    #[test]
    fn ticker_adjustment_raises_sell_above_ticker_plus_spread() {
        let cfg = config();
        let order = Order::draft(Side::Sell, dec!(299.50), dec!(0.1));
        let price = order.price_adjusted_to_ticker(&cfg, true, Some(Ticker { price: dec!(300.00) }), &[]);
        assert_eq!(price, dec!(300.05));
    }

    /// Scenario 4 (peer deduplication): buys at [299.90, 299.85], candidate 299.88,
    /// step=0.05, aggressive. Expected: output outside ±0.10 of both peers.
    #[test]
    fn other_prices_adjustment_deduplicates_against_peers() {
        let cfg = config();
        let b = book(dec!(299.85), dec!(300.00));
        let order = Order::draft(Side::Buy, dec!(299.88), dec!(0.1));
        let peers = [dec!(299.90), dec!(299.85)];

        let price = order.price_adjusted_to_other_prices(&peers, &b, &cfg, true, dec!(0.05), dec!(0.05));

        for &peer in &peers {
            assert!((price - peer).abs() > dec!(0.10), "price {price} too close to peer {peer}");
        }
    }

    /// Scenario: no same-side peers exist.
    /// Expected: price_adjusted_to_other_prices returns my_min unchanged (invariant 7 vacuously holds).
    #[test]
    fn other_prices_adjustment_returns_my_min_with_no_peers() {
        let cfg = config();
        let b = book(dec!(299.85), dec!(300.00));
        let order = Order::draft(Side::Buy, dec!(299.88), dec!(0.1));

        let price = order.price_adjusted_to_other_prices(&[], &b, &cfg, true, dec!(0.05), dec!(0.05));
        let expected = order.price_adjusted_to_spread(&b, &cfg, true, DEFAULT_FACTOR, dec!(0.05));
        assert_eq!(price, expected);
    }

    /// Scenario: wall scan finds a qualifying level on the bid side.
    /// Expected: price_adjusted_to_wall anchors just above it for a buy.
    #[test]
    fn wall_adjustment_anchors_above_wall_for_buy() {
        let snap = BookSnapshot {
            bids: vec![
                BookLevel { price: dec!(299.95), size: dec!(0.5), order_id: None },
                BookLevel { price: dec!(299.90), size: dec!(2), order_id: None },
                BookLevel { price: dec!(299.85), size: dec!(60), order_id: None },
            ],
            asks: vec![],
        };
        let order = Order::draft(Side::Buy, dec!(299.50), dec!(0.1));
        let price = order.price_adjusted_to_wall(&snap, 2, dec!(50), dec!(0.01));
        assert_eq!(price, Some(dec!(299.86)));
    }

    /// Scenario: a sell with no opposite.
    /// Expected: get_pnl returns None and price_adjusted_to_profit_target is a no-op.
    #[test]
    fn profit_target_is_noop_when_unpaired() {
        let order = Order::draft(Side::Sell, dec!(305.00), dec!(0.1));
        assert_eq!(order.get_pnl(dec!(305.00)), None);
        assert_eq!(order.price_adjusted_to_profit_target(dec!(1.00)), dec!(305.00));
    }

    /// Scenario: a paired sell whose PnL at its current price already clears min_profit.
    /// Expected: price_adjusted_to_profit_target leaves the price untouched.
    #[test]
    fn profit_target_leaves_price_when_already_sufficient() {
        let buy = Order::draft(Side::Buy, dec!(300.00), dec!(0.1));
        let mut sell = Order::draft(Side::Sell, dec!(305.00), dec!(0.1));
        sell.link_opposite(buy).unwrap();

        assert_eq!(sell.price_adjusted_to_profit_target(dec!(0.10)), dec!(305.00));
    }
}
