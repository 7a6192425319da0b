//! Shift Engine (§4.4): the periodic cancel/replace pass run once per tick
//! against every order the registry tracked at the start of that tick.

use std::collections::HashSet;

use rust_decimal::Decimal;

use crate::book::BookSnapshot;
use crate::config::Config;
use crate::engine::fill::cancel_order;
use crate::engine::order::{round2, Order, DEFAULT_FACTOR};
use crate::engine::placement::{place_order, OppositeLink, PlaceOrderParams};
use crate::engine::registry::OrderRegistry;
use crate::error::EngineError;
use crate::gateway::exchange::ExchangeClient;
use crate::types::{Side, Ticker};

/// Runs the shift pass over every id the registry held when this tick began.
/// Orders seeded earlier in the same tick (already in `exclude_ids`, usually
/// the ids `place_order` itself just returned) are left alone — they have
/// not had a chance to go stale yet.
///
/// A no-op whenever the registry is empty, the ticker is absent/zero, the
/// ticker is unchanged since the last call, or no baseline ticker has been
/// observed yet (§4.4 "skip entirely" clause). The first call with a live
/// ticker only establishes `last_ticker` as the baseline — it never shifts
/// on that same call, since there is nothing yet to compare the ticker
/// against.
/// Per-order errors are logged and skipped rather than aborting the tick —
/// one stuck order must never block the rest of the book.
pub async fn shift_orders<E: ExchangeClient>(
    registry: &mut OrderRegistry,
    exchange: &E,
    book: &BookSnapshot,
    ticker: Option<Ticker>,
    last_ticker: &mut Option<Ticker>,
    exclude_ids: &HashSet<String>,
    config: &Config,
) -> Result<Vec<Order>, EngineError> {
    if registry.is_empty() {
        return Ok(vec![]);
    }

    let zero_or_absent = ticker.map(|t| t.price.is_zero()).unwrap_or(true);
    if zero_or_absent {
        return Ok(vec![]);
    }
    let ticker = ticker.unwrap();

    let no_baseline_yet = last_ticker.is_none();
    let unchanged = last_ticker.map(|last| last.price == ticker.price).unwrap_or(false);
    *last_ticker = Some(ticker);

    if no_baseline_yet || unchanged {
        return Ok(vec![]);
    }
    let spread = config.spread(config.aggressive);

    let mut placed = Vec::new();
    for id in registry.ids() {
        if exclude_ids.contains(&id) {
            continue;
        }
        let Some(order) = registry.get(&id).cloned() else { continue };

        match shift_one(&id, &order, ticker, spread, registry, exchange, book, config).await {
            Ok(Some(new_order)) => placed.push(new_order),
            Ok(None) => {}
            Err(e) => eprintln!("[SHIFT] order {id} skipped: {e}"),
        }
    }
    Ok(placed)
}

async fn shift_one<E: ExchangeClient>(
    id: &str,
    order: &Order,
    ticker: Ticker,
    spread: Decimal,
    registry: &mut OrderRegistry,
    exchange: &E,
    book: &BookSnapshot,
    config: &Config,
) -> Result<Option<Order>, EngineError> {
    if let Some(stop_amount) = order.stop_amount(config.stop_pct) {
        if stop_amount >= ticker.price {
            eprintln!("[SHIFT] {id} tripped stop: stop_amount={stop_amount} ticker={}", ticker.price);
            let new_price = round2(ticker.price + spread / Decimal::TWO);
            return replace_same_side(id, order, new_price, Side::Sell, registry, exchange, book, Some(ticker), config).await;
        }
    }

    let peers = registry.same_side_prices(order.side, Some(id));
    let min_price = order.price_adjusted_to_spread(book, config, true, DEFAULT_FACTOR, spread);
    let max_price = order.price_adjusted_to_spread(book, config, false, DEFAULT_FACTOR, spread);
    let min_diff = order.price - min_price;
    let max_diff = max_price - order.price;
    let check_price =
        order.price_adjusted_to_other_prices(&peers, book, config, config.aggressive, spread / Decimal::TWO, spread);

    eprintln!(
        "[SHIFT] {id} {} price={} min_diff={min_diff} max_diff={max_diff} check_price={check_price}",
        order.side, order.price
    );

    match order.side {
        Side::Buy if max_diff > spread && check_price > order.price => {
            replace_same_side(id, order, check_price, Side::Buy, registry, exchange, book, Some(ticker), config).await
        }
        Side::Sell if order.price > min_price && order.price > check_price => {
            replace_same_side(id, order, check_price, Side::Sell, registry, exchange, book, Some(ticker), config).await
        }
        _ => Ok(None),
    }
}

/// Cancels `id` and reposts at `new_price` on the same side, inheriting the
/// cancelled order's opposite unchanged (invariant 3). `check_size` and
/// `check_ticker` stay off — the replacement price was already computed by
/// the caller's own adjustment chain, not by a fresh placement.
async fn replace_same_side<E: ExchangeClient>(
    id: &str,
    stale: &Order,
    new_price: Decimal,
    side: Side,
    registry: &mut OrderRegistry,
    exchange: &E,
    book: &BookSnapshot,
    ticker: Option<Ticker>,
    config: &Config,
) -> Result<Option<Order>, EngineError> {
    use crate::engine::fill::CancelOutcome;

    match cancel_order(id, registry, exchange, book, ticker, config).await? {
        CancelOutcome::Cancelled(cancelled) => {
            place_order(
                registry,
                exchange,
                book,
                ticker,
                config,
                PlaceOrderParams {
                    price: new_price,
                    size: stale.size,
                    side,
                    opposite: OppositeLink::InheritFrom(cancelled),
                    adjust_vs_open: false,
                    adjust_vs_wall: false,
                    check_size: false,
                    check_ticker: false,
                    aggressive: config.aggressive,
                },
            )
            .await
        }
        CancelOutcome::AlreadyGone => Ok(None),
        CancelOutcome::RacedByFill(replacement) => Ok(replacement),
    }
}
