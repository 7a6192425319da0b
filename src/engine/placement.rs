//! Places new orders: size caps, the peer → ticker adjustment chain, and
//! registration of the posted result.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use crate::book::BookSnapshot;
use crate::config::Config;
use crate::engine::order::Order;
use crate::engine::registry::OrderRegistry;
use crate::error::{EngineError, ExchangeError};
use crate::gateway::exchange::ExchangeClient;
use crate::types::{Side, Ticker};

/// How a newly-placed order's `opposite` field should be populated.
pub enum OppositeLink {
    /// No pairing (a seed order with nothing to pair against yet).
    None,
    /// Fresh cross-side pairing via `link_opposite` (invariant 2) — the Fill
    /// Handler placing a replacement on the other side of the filled order.
    Fresh(Order),
    /// Same-side replacement via `inherit_opposite` (invariant 3) — the Shift
    /// Engine cancelling and reposting an order on the same side.
    InheritFrom(Order),
}

/// Inputs to `place_order`, grouped because the procedure threads all of them
/// through the same five-step sequence (§4.3).
pub struct PlaceOrderParams {
    pub price: Decimal,
    pub size: Decimal,
    pub side: Side,
    pub opposite: OppositeLink,
    pub adjust_vs_open: bool,
    /// Wall-aware anchoring hook. `price_adjusted_to_wall` is fully
    /// implemented and unit-tested on `Order`, but — matching the source
    /// this engine is modeled on — `place_order` never calls it; no
    /// unconditional repricing happens here regardless of this flag.
    pub adjust_vs_wall: bool,
    pub check_size: bool,
    pub check_ticker: bool,
    pub aggressive: bool,
}

/// Returns the quote-currency symbol from a "BASE-QUOTE" product id.
pub fn quote_currency(product_id: &str) -> &str {
    product_id.split('-').nth(1).unwrap_or(product_id)
}

/// `spend_avail = balance × spend_pct; size_avail = spend_avail / ask`.
/// Zero unless `size_avail > 0.01` and both open-count caps have headroom.
pub async fn position_size<E: ExchangeClient>(
    registry: &OrderRegistry,
    exchange: &E,
    config: &Config,
    ask: Decimal,
) -> Result<Decimal, ExchangeError> {
    if ask <= Decimal::ZERO {
        return Ok(Decimal::ZERO);
    }
    let balance = exchange.balance(quote_currency(&config.product_id)).await?;
    let spend_avail = balance * config.spend_pct;
    let size_avail = spend_avail / ask;

    if size_avail > dec!(0.01)
        && registry.buy_count() < config.max_open_buys
        && registry.sell_count() < config.max_open_sells
    {
        Ok(size_avail)
    } else {
        Ok(Decimal::ZERO)
    }
}

/// Places a new order per §4.3: wall anchor (documented no-op) → size cap
/// (buys only) → construct → peer adjustment → ticker adjustment → post.
/// Returns `Ok(None)` when placement is skipped (size cap below minimum),
/// never as a way of swallowing an exchange rejection.
pub async fn place_order<E: ExchangeClient>(
    registry: &mut OrderRegistry,
    exchange: &E,
    book: &BookSnapshot,
    ticker: Option<Ticker>,
    config: &Config,
    params: PlaceOrderParams,
) -> Result<Option<Order>, EngineError> {
    let _ = params.adjust_vs_wall; // see field doc: intentionally unwired, matches the source

    let mut size = params.size;
    if params.check_size && params.side == Side::Buy {
        let ask = book.lowest_ask().map(|l| l.price).unwrap_or(Decimal::ZERO);
        let pos = position_size(registry, exchange, config, ask).await?;
        if pos < dec!(0.01) {
            eprintln!("[PLACEMENT] skip buy: position_size={pos} below minimum");
            return Ok(None);
        }
        if size > pos {
            size = pos;
        }
    }

    let mut order = Order::draft(params.side, params.price, size);
    match params.opposite {
        OppositeLink::None => {}
        OppositeLink::Fresh(opposite) => order.link_opposite(opposite)?,
        OppositeLink::InheritFrom(prior) => order.inherit_opposite(&prior)?,
    }

    if params.adjust_vs_open {
        let peers = registry.same_side_prices(order.side, None);
        let step = config.max_spread / Decimal::TWO;
        order.price = order.price_adjusted_to_other_prices(
            &peers, book, config, params.aggressive, step, config.min_spread,
        );
    }

    if params.check_ticker {
        let peers = registry.same_side_prices(order.side, None);
        order.price = order.price_adjusted_to_ticker(config, params.aggressive, ticker, &peers);
    }

    eprintln!(
        "[PLACEMENT] posting {} {} @ {} x {}",
        order.side, config.product_id, order.price, order.size
    );
    match exchange.post(&order).await {
        Ok(id) => {
            order.mark_open(id);
            registry.insert(order.clone());
            Ok(Some(order))
        }
        Err(e) => {
            eprintln!("[PLACEMENT] post rejected: {e}");
            Err(EngineError::Exchange(e))
        }
    }
}
