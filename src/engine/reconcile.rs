//! Startup reconciliation (§4.8): restores opposite-pairing state for open
//! sells that survived a restart, by matching them against recent buy fills.

use rust_decimal::Decimal;

use crate::engine::order::Order;
use crate::engine::registry::OrderRegistry;
use crate::error::EngineError;
use crate::gateway::exchange::ExchangeClient;
use crate::types::Side;

/// Pulls current open orders and recent fills from the exchange (§4.8). Any
/// open sell the registry does not already track is adopted first, so this
/// works standalone at startup against an empty registry — it does not rely
/// on a prior `registry.refresh()` call. Then, for each open sell without an
/// `opposite`, finds the earliest buy fill with an exactly-matching size and
/// not already claimed by another sell, and links it as a synthesized
/// `opposite`.
///
/// Called once at startup, before the main loop. A no-op for sells that were
/// already paired (e.g. placed this process's lifetime by the Fill Handler).
pub async fn map_open_orders_to_fills<E: ExchangeClient>(
    registry: &mut OrderRegistry,
    exchange: &E,
    product_id: &str,
) -> Result<usize, EngineError> {
    let open_orders = exchange.get_orders().await?;
    let fills = exchange.get_fills(product_id).await?;
    let buy_fills: Vec<_> = fills.iter().filter(|f| f.side == Side::Buy).collect();

    for info in open_orders.iter().filter(|o| o.side == Side::Sell) {
        if registry.get(&info.id).is_none() {
            let mut order = Order::draft(Side::Sell, info.price, info.size);
            order.mark_open(info.id.clone());
            registry.insert(order);
        }
    }

    let unpaired_sell_ids: Vec<String> = registry
        .ids()
        .into_iter()
        .filter(|id| registry.get(id).is_some_and(|o| o.side == Side::Sell && o.opposite.is_none()))
        .collect();

    let mut claimed: Vec<&str> = Vec::new();
    let mut mapped = 0usize;

    for sell_id in &unpaired_sell_ids {
        let size: Decimal = match registry.get(sell_id) {
            Some(o) => o.size,
            None => continue,
        };

        let earliest_match = buy_fills
            .iter()
            .find(|f| f.size == size && !claimed.contains(&f.order_id.as_str()));

        if let Some(fill) = earliest_match {
            let synthesized = {
                let mut o = Order::draft(Side::Buy, fill.price, fill.size);
                o.mark_open(fill.order_id.clone());
                o.mark_filled();
                o
            };
            registry.link_opposite_for(sell_id, synthesized)?;
            claimed.push(fill.order_id.as_str());
            mapped += 1;
        }
    }

    if mapped > 0 {
        eprintln!("[RECONCILE] mapped {mapped} open sell(s) to buy fills: {claimed:?}");
    }
    Ok(mapped)
}
