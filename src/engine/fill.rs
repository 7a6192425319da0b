//! Fill Handler (§4.5) and Cancel (§4.6).

use rust_decimal::Decimal;

use crate::book::BookSnapshot;
use crate::config::Config;
use crate::engine::order::{round2, Order};
use crate::engine::placement::{place_order, OppositeLink, PlaceOrderParams};
use crate::engine::registry::OrderRegistry;
use crate::error::{EngineError, ExchangeError, InvariantError};
use crate::gateway::exchange::ExchangeClient;
use crate::types::{Side, Ticker};

/// On a detected fill: move the order to fills, log PnL if paired, and
/// (unless `replace` is false) place the opposite-side follow-up order.
pub async fn handle_fill<E: ExchangeClient>(
    order_id: &str,
    replace: bool,
    registry: &mut OrderRegistry,
    exchange: &E,
    book: &BookSnapshot,
    ticker: Option<Ticker>,
    config: &Config,
) -> Result<Option<Order>, EngineError> {
    let mut filled = registry
        .remove(order_id)
        .ok_or_else(|| InvariantError::NotActuallyFilled { order_id: order_id.to_string() })?;
    filled.mark_filled();

    let pnl = filled.get_pnl(filled.price);
    match pnl {
        Some(p) => eprintln!(
            "[FILL] {} {} @ {} x {} pnl={p}", filled.side, config.product_id, filled.price, filled.size
        ),
        None => eprintln!("[FILL] {} {} @ {} x {}", filled.side, config.product_id, filled.price, filled.size),
    }
    registry.record_fill(filled.clone());

    if !replace {
        return Ok(None);
    }

    let spread = config.spread(config.aggressive);
    let new_side = filled.side.opposite();

    if filled.side == Side::Sell && (registry.buy_count() > config.max_open_buys || registry.sell_count() > config.max_open_sells) {
        eprintln!("[FILL] skip replacement buy: open-count caps exceeded");
        return Ok(None);
    }

    let new_price = match filled.side {
        Side::Buy => round2(filled.price + spread),
        Side::Sell => round2(filled.price - spread),
    };

    place_order(
        registry,
        exchange,
        book,
        ticker,
        config,
        PlaceOrderParams {
            price: new_price,
            size: filled.size,
            side: new_side,
            opposite: OppositeLink::Fresh(filled),
            adjust_vs_open: true,
            adjust_vs_wall: false,
            check_size: true,
            check_ticker: true,
            aggressive: config.aggressive,
        },
    )
    .await
}

/// Outcome of a cancel attempt.
pub enum CancelOutcome {
    /// The exchange confirmed (or silently accepted) the cancel.
    Cancelled(Order),
    /// The order was already gone before this call; nothing to do (idempotent).
    AlreadyGone,
    /// The exchange reported the order as already `done`; it was re-classified
    /// as a fill, with `replace=true`'s placement result (if any) attached.
    RacedByFill(Option<Order>),
}

/// Cancels `order_id` per §4.6, re-classifying a `done` response as a fill
/// rather than losing the order.
pub async fn cancel_order<E: ExchangeClient>(
    order_id: &str,
    registry: &mut OrderRegistry,
    exchange: &E,
    book: &BookSnapshot,
    ticker: Option<Ticker>,
    config: &Config,
) -> Result<CancelOutcome, EngineError> {
    let tracked = registry.remove(order_id);

    match exchange.cancel(order_id).await {
        Ok(_) => match tracked {
            Some(mut order) => {
                order.mark_cancelled();
                Ok(CancelOutcome::Cancelled(order))
            }
            None => Ok(CancelOutcome::AlreadyGone),
        },
        Err(ExchangeError::NotFound(_)) => {
            eprintln!("[CANCEL] {order_id} already gone, treating as success");
            Ok(CancelOutcome::AlreadyGone)
        }
        Err(ExchangeError::Done(_)) => {
            eprintln!("[CANCEL] {order_id} raced a fill, re-classifying");
            if let Some(order) = tracked {
                registry.insert(order);
            }
            let replacement = handle_fill(order_id, true, registry, exchange, book, ticker, config).await?;
            Ok(CancelOutcome::RacedByFill(replacement))
        }
        Err(e) => {
            if let Some(order) = tracked {
                registry.insert(order);
            }
            Err(EngineError::Exchange(e))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::exchange::MockExchange;
    use rust_decimal_macros::dec;

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

    /// Scenario 2 (fill → replace): a buy at 300.00 size 0.1 is reported gone.
    /// Expected: fills contains it, and a new sell appears with `opposite` =
    /// that buy at price ≥ 300.05, size 0.1.
    #[tokio::test]
    async fn fill_of_buy_places_replacement_sell_above_min_profit() {
        let cfg = config();
        let ex = MockExchange::with_balance("USD", dec!(10_000));
        let mut registry = OrderRegistry::new();
        let book = BookSnapshot::default();

        let id = ex.post(&Order::draft(Side::Buy, dec!(300.00), dec!(0.1))).await.unwrap();
        let mut buy = Order::draft(Side::Buy, dec!(300.00), dec!(0.1));
        buy.mark_open(id.clone());
        registry.insert(buy);
        ex.simulate_fill(&id);

        let replacement = handle_fill(&id, true, &mut registry, &ex, &book, None, &cfg).await.unwrap().unwrap();

        assert_eq!(replacement.side, Side::Sell);
        assert_eq!(replacement.size, dec!(0.1));
        assert!(replacement.price >= dec!(300.05));
        assert_eq!(replacement.opposite.unwrap().price, dec!(300.00));
        assert_eq!(registry.fills_len(), 1);
    }

    /// Scenario 6 (cap enforcement): max_open_buys=3, three buys already open,
    /// a sell fills. Expected: no replacement buy placed; fills grows by one.
    #[tokio::test]
    async fn fill_of_sell_is_not_replaced_when_buy_cap_exceeded() {
        let mut cfg = config();
        cfg.max_open_buys = 3;
        let ex = MockExchange::with_balance("USD", dec!(10_000));
        let mut registry = OrderRegistry::new();
        let book = BookSnapshot::default();

        for i in 0..3 {
            let price = dec!(299.00) - Decimal::from(i);
            let id = ex.post(&Order::draft(Side::Buy, price, dec!(0.1))).await.unwrap();
            let mut b = Order::draft(Side::Buy, price, dec!(0.1));
            b.mark_open(id);
            registry.insert(b);
        }

        let sell_id = ex.post(&Order::draft(Side::Sell, dec!(305.00), dec!(0.1))).await.unwrap();
        let mut sell = Order::draft(Side::Sell, dec!(305.00), dec!(0.1));
        sell.mark_open(sell_id.clone());
        registry.insert(sell);
        ex.simulate_fill(&sell_id);

        let replacement = handle_fill(&sell_id, true, &mut registry, &ex, &book, None, &cfg).await.unwrap();

        assert!(replacement.is_none());
        assert_eq!(registry.fills_len(), 1);
    }

    /// Scenario: handle_fill is called for an id the registry never tracked.
    /// Expected: InvariantError::NotActuallyFilled, not a panic or silent no-op.
    #[tokio::test]
    async fn handle_fill_of_untracked_id_is_an_invariant_error() {
        let cfg = config();
        let ex = MockExchange::new();
        let mut registry = OrderRegistry::new();
        let book = BookSnapshot::default();

        let err = handle_fill("ghost", true, &mut registry, &ex, &book, None, &cfg).await.unwrap_err();
        assert!(matches!(err, EngineError::Invariant(InvariantError::NotActuallyFilled { .. })));
    }

    /// Scenario: cancelling an id that is already gone, twice in a row.
    /// Expected: both calls succeed as AlreadyGone and the registry is unchanged.
    #[tokio::test]
    async fn double_cancel_of_not_found_order_is_idempotent() {
        let cfg = config();
        let ex = MockExchange::new();
        let mut registry = OrderRegistry::new();
        let book = BookSnapshot::default();

        let first = cancel_order("never-existed", &mut registry, &ex, &book, None, &cfg).await.unwrap();
        assert!(matches!(first, CancelOutcome::AlreadyGone));
        let second = cancel_order("never-existed", &mut registry, &ex, &book, None, &cfg).await.unwrap();
        assert!(matches!(second, CancelOutcome::AlreadyGone));
        assert!(registry.is_empty());
    }

    /// Scenario: a cancel races a fill (exchange returns `done`).
    /// Expected: exactly one fills-table entry and exactly one replacement
    /// order when replace=true.
    #[tokio::test]
    async fn cancel_racing_a_fill_yields_exactly_one_fill_and_one_replacement() {
        let cfg = config();
        let ex = MockExchange::with_balance("USD", dec!(10_000));
        let mut registry = OrderRegistry::new();
        let book = BookSnapshot::default();

        let id = ex.post(&Order::draft(Side::Buy, dec!(300.00), dec!(0.1))).await.unwrap();
        let mut buy = Order::draft(Side::Buy, dec!(300.00), dec!(0.1));
        buy.mark_open(id.clone());
        registry.insert(buy);
        ex.simulate_fill(&id);

        let outcome = cancel_order(&id, &mut registry, &ex, &book, None, &cfg).await.unwrap();
        match outcome {
            CancelOutcome::RacedByFill(replacement) => assert!(replacement.is_some()),
            _ => panic!("expected RacedByFill"),
        }
        assert_eq!(registry.fills_len(), 1);
    }
}
