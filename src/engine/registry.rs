//! Authoritative in-memory map of live orders, reconciled each tick against
//! the exchange's own open-orders listing.

use std::collections::{HashMap, HashSet};

use rust_decimal::Decimal;

use crate::engine::order::Order;
use crate::error::ExchangeError;
use crate::gateway::exchange::ExchangeClient;
use crate::types::Side;

#[derive(Default)]
pub struct OrderRegistry {
    orders: HashMap<String, Order>,
    fills: HashMap<String, Order>,
}

impl OrderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.orders.is_empty()
    }

    pub fn len(&self) -> usize {
        self.orders.len()
    }

    /// `order.id` must already be set (the order is `Open`).
    pub fn insert(&mut self, order: Order) {
        let id = order.id.clone().expect("registry insert requires a posted order");
        self.orders.insert(id, order);
    }

    pub fn remove(&mut self, id: &str) -> Option<Order> {
        self.orders.remove(id)
    }

    pub fn get(&self, id: &str) -> Option<&Order> {
        self.orders.get(id)
    }

    /// Links `opposite` onto the tracked order `id` via `Order::link_opposite`
    /// (invariant 2). Used by startup reconciliation to synthesize pairing
    /// state for orders that survived a restart with no in-memory `opposite`.
    pub fn link_opposite_for(
        &mut self,
        id: &str,
        opposite: Order,
    ) -> Result<(), crate::error::InvariantError> {
        match self.orders.get_mut(id) {
            Some(order) => order.link_opposite(opposite),
            None => Ok(()),
        }
    }

    /// A snapshot of currently-tracked ids, for the Shift Engine to iterate
    /// over without reprocessing orders seeded during the same tick.
    pub fn ids(&self) -> Vec<String> {
        self.orders.keys().cloned().collect()
    }

    pub fn buy_count(&self) -> usize {
        self.orders.values().filter(|o| o.side == Side::Buy).count()
    }

    pub fn sell_count(&self) -> usize {
        self.orders.values().filter(|o| o.side == Side::Sell).count()
    }

    /// Prices of same-side peers, excluding `exclude_id` (typically the order
    /// being adjusted). Consumed by `price_adjusted_to_other_prices`, which
    /// only knows how to exclude its own price, not pick its own peer group.
    pub fn same_side_prices(&self, side: Side, exclude_id: Option<&str>) -> Vec<Decimal> {
        self.orders
            .values()
            .filter(|o| o.side == side)
            .filter(|o| match exclude_id {
                Some(ex) => o.id.as_deref() != Some(ex),
                None => true,
            })
            .map(|o| o.price)
            .collect()
    }

    /// The order with minimum price among tracked orders; anchors wall-aware
    /// placement.
    pub fn lowest_open_order(&self) -> Option<&Order> {
        self.orders.values().min_by_key(|o| o.price)
    }

    pub fn record_fill(&mut self, order: Order) {
        let id = order.id.clone().unwrap_or_default();
        self.fills.insert(id, order);
    }

    pub fn fills_len(&self) -> usize {
        self.fills.len()
    }

    pub fn get_fill(&self, id: &str) -> Option<&Order> {
        self.fills.get(id)
    }

    /// Reconciles against the exchange's open-orders listing. Returns the ids
    /// that vanished from the exchange since the last refresh — the caller
    /// (Main Loop) hands each of these to the Fill Handler. When
    /// `manage_existing_orders` is set, exchange orders this registry never
    /// saw before are adopted directly.
    pub async fn refresh<E: ExchangeClient>(
        &mut self,
        exchange: &E,
        manage_existing_orders: bool,
    ) -> Result<Vec<String>, ExchangeError> {
        let exchange_orders = exchange.get_orders().await?;
        let e_ids: HashSet<&str> = exchange_orders.iter().map(|o| o.id.as_str()).collect();
        let l_ids: HashSet<String> = self.orders.keys().cloned().collect();

        let disappeared: Vec<String> = l_ids.iter().filter(|id| !e_ids.contains(id.as_str())).cloned().collect();

        if manage_existing_orders {
            for info in &exchange_orders {
                if !l_ids.contains(&info.id) {
                    let mut order = Order::draft(info.side, info.price, info.size);
                    order.mark_open(info.id.clone());
                    self.orders.insert(info.id.clone(), order);
                }
            }
        }

        Ok(disappeared)
    }
}
