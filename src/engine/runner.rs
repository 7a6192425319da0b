//! Main Loop (§4.7): drives the tick cycle — snapshot, optional seed buy,
//! registry refresh (which surfaces fills), shift, sleep — until told to stop.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use crate::book::{BookFeed, BookView, DEFAULT_WALL_SIZE};
use crate::config::Config;
use crate::engine::fill::handle_fill;
use crate::engine::placement::{place_order, position_size, OppositeLink, PlaceOrderParams};
use crate::engine::registry::OrderRegistry;
use crate::engine::shift::shift_orders;
use crate::error::EngineError;
use crate::gateway::exchange::ExchangeClient;
use crate::types::Ticker;

/// Cooperative stop flag, polled between ticks (§5 "Cancellation and timeouts").
/// Cloning shares the same underlying flag; a signal handler installed by the
/// caller (out of scope here) sets it to request shutdown.
#[derive(Clone, Default)]
pub struct StopFlag(Arc<AtomicBool>);

impl StopFlag {
    pub fn new() -> Self {
        Self(Arc::new(AtomicBool::new(false)))
    }

    pub fn request_stop(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    fn is_set(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Runs the tick loop until `stop` is set. On exit, cancels every open buy
/// best-effort (logged, never fatal) and leaves sells resting so profits can
/// still be realized (§4.7).
pub async fn run<E: ExchangeClient, F: BookFeed>(
    registry: &mut OrderRegistry,
    exchange: &E,
    book_view: &mut BookView<F>,
    config: &Config,
    stop: StopFlag,
) -> Result<(), EngineError> {
    book_view.start();
    let mut last_ticker: Option<Ticker> = None;

    while !stop.is_set() {
        if let Err(e) = tick(registry, exchange, book_view, config, &mut last_ticker).await {
            eprintln!("[MAIN] tick failed: {e}");
            return Err(e);
        }
        tokio::time::sleep(Duration::from_secs(config.interval_secs)).await;
    }

    shutdown(registry, exchange).await;
    book_view.close();
    Ok(())
}

async fn tick<E: ExchangeClient, F: BookFeed>(
    registry: &mut OrderRegistry,
    exchange: &E,
    book_view: &mut BookView<F>,
    config: &Config,
    last_ticker: &mut Option<Ticker>,
) -> Result<(), EngineError> {
    let snap = book_view.snapshot().cloned().unwrap_or_default();
    let wall_size = config.wall_size.unwrap_or(DEFAULT_WALL_SIZE);
    let ask = snap.lowest_ask().map(|l| l.price).unwrap_or(Decimal::ZERO);
    let ticker = book_view.ticker();

    let mut exclude: HashSet<String> = HashSet::new();
    if let Err(e) = seed_buy(registry, exchange, &snap, ticker, wall_size, ask, config, &mut exclude).await {
        eprintln!("[MAIN] seed buy step failed, shift still runs: {e}");
    }

    for id in registry.refresh(exchange, config.manage_existing_orders).await? {
        match handle_fill(&id, true, registry, exchange, &snap, ticker, config).await {
            Ok(_) => {}
            Err(e) => eprintln!("[MAIN] fill handling for {id} failed: {e}"),
        }
    }

    shift_orders(registry, exchange, &snap, ticker, last_ticker, &exclude, config).await?;
    Ok(())
}

/// Seeds one new buy near the wall each tick, per §4.7 steps 2-4. Walks the
/// bid side looking for the first level at index ≥ 3 with size ≥ `wall_size`;
/// anchors one level back from it. A no-op when size, bids, or ticker are
/// unavailable.
async fn seed_buy<E: ExchangeClient>(
    registry: &mut OrderRegistry,
    exchange: &E,
    snap: &crate::book::BookSnapshot,
    ticker: Option<Ticker>,
    wall_size: Decimal,
    ask: Decimal,
    config: &Config,
    exclude: &mut HashSet<String>,
) -> Result<(), EngineError> {
    let size_avail = position_size(registry, exchange, config, ask).await?;
    let Some(tick) = ticker else { return Ok(()) };
    if size_avail <= dec!(0.01) || snap.bids.is_empty() || tick.price.is_zero() {
        return Ok(());
    }

    // Re-normalize the spend through the ticker price, then back through the
    // lowest ask, exactly as the source computes it.
    let spend = size_avail * tick.price;
    let size_avail = if ask.is_zero() { Decimal::ZERO } else { spend / ask };

    let mut bid_idx = None;
    for (idx, level) in snap.bids.iter().enumerate() {
        if level.size >= wall_size && idx >= 3 {
            bid_idx = Some(idx.saturating_sub(1));
            break;
        }
    }
    let Some(mut idx) = bid_idx else {
        eprintln!("[MAIN] no wall found in bids, skipping seed buy");
        return Ok(());
    };
    while snap.bids.get(idx).is_none() && idx + 1 < snap.bids.len() {
        idx += 1;
    }
    let Some(level) = snap.bids.get(idx) else { return Ok(()) };

    eprintln!("[MAIN] seeding buy near wall: price={} size={size_avail}", level.price);
    let placed = place_order(
        registry,
        exchange,
        snap,
        ticker,
        config,
        PlaceOrderParams {
            price: level.price,
            size: size_avail,
            side: crate::types::Side::Buy,
            opposite: OppositeLink::None,
            adjust_vs_open: true,
            adjust_vs_wall: false,
            check_size: false,
            check_ticker: true,
            aggressive: false,
        },
    )
    .await?;

    if let Some(order) = placed {
        if let Some(id) = order.id {
            exclude.insert(id);
        }
    }
    Ok(())
}

/// Best-effort shutdown: cancel every open buy, logging (never propagating)
/// per-order failures. Sells are left resting.
async fn shutdown<E: ExchangeClient>(registry: &mut OrderRegistry, exchange: &E) {
    let buy_ids: Vec<String> = registry
        .ids()
        .into_iter()
        .filter(|id| registry.get(id).is_some_and(|o| o.side == crate::types::Side::Buy))
        .collect();

    for id in buy_ids {
        if let Err(e) = exchange.cancel(&id).await {
            eprintln!("[MAIN] shutdown: failed to cancel buy {id}: {e}");
            continue;
        }
        registry.remove(&id);
    }
}
