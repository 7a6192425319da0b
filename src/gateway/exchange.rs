//! The exchange REST surface the engine consumes, as a trait boundary plus a
//! deterministic in-memory double.
//!
//! A production implementation (HTTP signing, retries, connection pooling) is
//! an external collaborator and out of scope here; `MockExchange` is what
//! `dry_run` mode and the engine's own test suite run against.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use rust_decimal::Decimal;

use crate::engine::order::Order;
use crate::error::ExchangeError;
use crate::types::{ExchangeFill, ExchangeOrderInfo};

/// Capabilities the engine consumes from the exchange. Implementations are
/// generic parameters throughout the engine rather than trait objects, since
/// `async fn` in traits is not object-safe without an adapter crate.
pub trait ExchangeClient: Send + Sync {
    async fn get_orders(&self) -> Result<Vec<ExchangeOrderInfo>, ExchangeError>;
    async fn get_fills(&self, product_id: &str) -> Result<Vec<ExchangeFill>, ExchangeError>;
    async fn balance(&self, quote_currency: &str) -> Result<Decimal, ExchangeError>;
    /// Submits `order`; returns the exchange-assigned id on success.
    async fn post(&self, order: &Order) -> Result<String, ExchangeError>;
    /// Cancels `order_id`; `Ok(Some(id))` confirms, `Ok(None)` means the
    /// exchange accepted the request with no id echoed back.
    /// `Err(Done)`/`Err(NotFound)` are the special cases callers must handle.
    async fn cancel(&self, order_id: &str) -> Result<Option<String>, ExchangeError>;
}

/// Deterministic in-memory exchange. No network, no wall clock dependence —
/// every transition is driven explicitly by the caller (`post`, `cancel`,
/// `simulate_fill`), so engine tests are reproducible.
#[derive(Default)]
pub struct MockExchange {
    open_orders: Mutex<HashMap<String, ExchangeOrderInfo>>,
    done_orders: Mutex<HashSet<String>>,
    fills: Mutex<Vec<ExchangeFill>>,
    balances: Mutex<HashMap<String, Decimal>>,
    next_id: AtomicU64,
}

impl MockExchange {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_balance(quote_currency: &str, balance: Decimal) -> Self {
        let ex = Self::new();
        ex.set_balance(quote_currency, balance);
        ex
    }

    pub fn set_balance(&self, currency: &str, balance: Decimal) {
        self.balances.lock().unwrap().insert(currency.to_string(), balance);
    }

    /// Marks an open order as filled: it disappears from `get_orders` and a
    /// matching record appears in `get_fills`; a later `cancel` on this id
    /// returns `ExchangeError::Done` rather than `NotFound`.
    pub fn simulate_fill(&self, order_id: &str) {
        let removed = self.open_orders.lock().unwrap().remove(order_id);
        if let Some(info) = removed {
            self.done_orders.lock().unwrap().insert(order_id.to_string());
            self.fills.lock().unwrap().push(ExchangeFill {
                order_id: order_id.to_string(),
                side: info.side,
                price: info.price,
                size: info.size,
                fee: Decimal::ZERO,
            });
        }
    }

    pub fn open_order_count(&self) -> usize {
        self.open_orders.lock().unwrap().len()
    }
}

impl ExchangeClient for MockExchange {
    async fn get_orders(&self) -> Result<Vec<ExchangeOrderInfo>, ExchangeError> {
        Ok(self.open_orders.lock().unwrap().values().cloned().collect())
    }

    async fn get_fills(&self, _product_id: &str) -> Result<Vec<ExchangeFill>, ExchangeError> {
        Ok(self.fills.lock().unwrap().clone())
    }

    async fn balance(&self, quote_currency: &str) -> Result<Decimal, ExchangeError> {
        Ok(*self.balances.lock().unwrap().get(quote_currency).unwrap_or(&Decimal::ZERO))
    }

    async fn post(&self, order: &Order) -> Result<String, ExchangeError> {
        let id = format!("mock-{}", self.next_id.fetch_add(1, Ordering::SeqCst));
        self.open_orders.lock().unwrap().insert(
            id.clone(),
            ExchangeOrderInfo { id: id.clone(), side: order.side, price: order.price, size: order.size },
        );
        Ok(id)
    }

    async fn cancel(&self, order_id: &str) -> Result<Option<String>, ExchangeError> {
        if self.done_orders.lock().unwrap().contains(order_id) {
            return Err(ExchangeError::Done(order_id.to_string()));
        }
        match self.open_orders.lock().unwrap().remove(order_id) {
            Some(_) => Ok(Some(order_id.to_string())),
            None => Err(ExchangeError::NotFound(order_id.to_string())),
        }
    }
}
