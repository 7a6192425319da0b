//! Read-only facade over the level-2 book feed.
//!
//! `BookView` caches the latest `BookSnapshot` and ticker published by a
//! `BookFeed` collaborator and re-pulls them once a 5-second staleness timer
//! elapses. Everything here is pure/non-blocking except `BookFeed::start`
//! and `BookFeed::close`, which own the collaborator's background task.

use std::time::{Duration, Instant};

use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use crate::types::{BookLevel, Side, Ticker};

/// Wall-clock threshold after which a cached snapshot/ticker must be re-pulled.
pub const STALENESS: Duration = Duration::from_secs(5);

/// Default wall-size threshold when `Config.wall_size` is unset.
pub const DEFAULT_WALL_SIZE: Decimal = dec!(50);

/// Ordered book levels, `bids[0]` the highest bid and `asks[0]` the lowest ask.
#[derive(Clone, Debug, Default)]
pub struct BookSnapshot {
    pub bids: Vec<BookLevel>,
    pub asks: Vec<BookLevel>,
}

impl BookSnapshot {
    pub fn highest_bid(&self) -> Option<&BookLevel> {
        self.bids.first()
    }

    pub fn lowest_ask(&self) -> Option<&BookLevel> {
        self.asks.first()
    }

    /// Total size resting at or better than `price` on the bid side.
    pub fn get_bid_depth(&self, price: Decimal) -> Decimal {
        self.bids.iter().filter(|l| l.price >= price).map(|l| l.size).sum()
    }

    /// Total size resting at or better than `price` on the ask side.
    pub fn get_ask_depth(&self, price: Decimal) -> Decimal {
        self.asks.iter().filter(|l| l.price <= price).map(|l| l.size).sum()
    }

    fn levels(&self, side: Side) -> &[BookLevel] {
        match side {
            Side::Buy => &self.bids,
            Side::Sell => &self.asks,
        }
    }

    /// First same-side level at index ≥ `min_idx` whose size ≥ `wall_size`.
    /// Returns `None` if no such level exists (§8 boundary behavior).
    pub fn calculate_wall_size(
        &self,
        side: Side,
        min_idx: usize,
        wall_size: Decimal,
    ) -> Option<(usize, &BookLevel)> {
        self.levels(side)
            .iter()
            .enumerate()
            .skip(min_idx)
            .find(|(_, l)| l.size >= wall_size)
    }
}

/// Background-owned source of book snapshots and the current ticker.
///
/// Implementations own a separate task that publishes into shared state; the
/// methods here must be non-blocking reads of the latest published value —
/// the control task polling a `BookView` may never `.await` on them.
pub trait BookFeed: Send + Sync {
    fn start(&self);
    fn close(&self);
    fn get_current_ticker(&self) -> Option<Ticker>;
    fn get_current_book(&self) -> Option<BookSnapshot>;
}

/// Read-only facade the engine actually talks to.
pub struct BookView<F: BookFeed> {
    feed: F,
    snapshot: Option<BookSnapshot>,
    snapshot_fetched_at: Option<Instant>,
    ticker: Option<Ticker>,
    ticker_fetched_at: Option<Instant>,
}

impl<F: BookFeed> BookView<F> {
    pub fn new(feed: F) -> Self {
        Self {
            feed,
            snapshot: None,
            snapshot_fetched_at: None,
            ticker: None,
            ticker_fetched_at: None,
        }
    }

    fn is_stale(fetched_at: Option<Instant>) -> bool {
        match fetched_at {
            Some(t) => t.elapsed() >= STALENESS,
            None => true,
        }
    }

    /// Returns the cached snapshot, refreshing from the feed first if the
    /// 5-second staleness timer has elapsed.
    pub fn snapshot(&mut self) -> Option<&BookSnapshot> {
        if Self::is_stale(self.snapshot_fetched_at) {
            self.refresh();
        }
        self.snapshot.as_ref()
    }

    /// Explicit refresh, bypassing the staleness check.
    pub fn refresh(&mut self) {
        self.snapshot = self.feed.get_current_book();
        self.snapshot_fetched_at = Some(Instant::now());
    }

    /// Returns the cached ticker, refreshing from the feed first if stale.
    pub fn ticker(&mut self) -> Option<Ticker> {
        if Self::is_stale(self.ticker_fetched_at) {
            self.ticker = self.feed.get_current_ticker();
            self.ticker_fetched_at = Some(Instant::now());
        }
        self.ticker
    }

    pub fn start(&self) {
        self.feed.start();
    }

    pub fn close(&self) {
        self.feed.close();
    }
}

pub mod test_support {
    //! Scripted `BookFeed` double. Deterministic and dependency-free, so it
    //! doubles as both the engine's own test fixture and the feed `main.rs`
    //! wires up under `dry_run` — analogous to `MockExchange` on the gateway
    //! side, which serves the same dual purpose.
    use super::*;
    use std::sync::Mutex;

    pub struct ScriptedBookFeed {
        ticker: Mutex<Option<Ticker>>,
        book: Mutex<Option<BookSnapshot>>,
    }

    impl ScriptedBookFeed {
        pub fn new() -> Self {
            Self { ticker: Mutex::new(None), book: Mutex::new(None) }
        }

        pub fn set_ticker(&self, price: Decimal) {
            *self.ticker.lock().unwrap() = Some(Ticker { price });
        }

        pub fn set_book(&self, bids: Vec<(Decimal, Decimal)>, asks: Vec<(Decimal, Decimal)>) {
            *self.book.lock().unwrap() = Some(BookSnapshot {
                bids: bids.into_iter().map(|(price, size)| BookLevel { price, size, order_id: None }).collect(),
                asks: asks.into_iter().map(|(price, size)| BookLevel { price, size, order_id: None }).collect(),
            });
        }
    }

    impl Default for ScriptedBookFeed {
        fn default() -> Self {
            Self::new()
        }
    }

    impl BookFeed for ScriptedBookFeed {
        fn start(&self) {}
        fn close(&self) {}

        fn get_current_ticker(&self) -> Option<Ticker> {
            *self.ticker.lock().unwrap()
        }

        fn get_current_book(&self) -> Option<BookSnapshot> {
            self.book.lock().unwrap().clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::ScriptedBookFeed;
    use super::*;
    use rust_decimal_macros::dec;

    /// Scenario: wall scan with no qualifying level.
    /// Expected: calculate_wall_size returns None (§8 boundary behavior).
    #[test]
    fn wall_scan_returns_none_when_no_level_qualifies() {
        let snap = BookSnapshot {
            bids: vec![
                BookLevel { price: dec!(299.95), size: dec!(0.5), order_id: None },
                BookLevel { price: dec!(299.90), size: dec!(2), order_id: None },
                BookLevel { price: dec!(299.85), size: dec!(5), order_id: None },
            ],
            asks: vec![],
        };
        assert!(snap.calculate_wall_size(Side::Buy, 2, dec!(50)).is_none());
    }

    /// Scenario: a qualifying wall exists at index 3.
    /// Expected: calculate_wall_size returns that index and level.
    #[test]
    fn wall_scan_finds_first_qualifying_level() {
        let snap = BookSnapshot {
            bids: vec![
                BookLevel { price: dec!(299.95), size: dec!(0.5), order_id: None },
                BookLevel { price: dec!(299.90), size: dec!(2), order_id: None },
                BookLevel { price: dec!(299.85), size: dec!(5), order_id: None },
                BookLevel { price: dec!(299.80), size: dec!(60), order_id: None },
            ],
            asks: vec![],
        };
        let (idx, level) = snap.calculate_wall_size(Side::Buy, 2, dec!(50)).unwrap();
        assert_eq!(idx, 3);
        assert_eq!(level.price, dec!(299.80));
    }

    /// Scenario: a BookView is constructed against an empty ScriptedBookFeed.
    /// Expected: the first snapshot() call refreshes (nothing cached yet) and
    /// returns None rather than panicking.
    #[test]
    fn empty_feed_yields_none_snapshot_without_panicking() {
        let feed = ScriptedBookFeed::new();
        let mut view = BookView::new(feed);
        assert!(view.snapshot().is_none());
        assert!(view.ticker().is_none());
    }

    /// Scenario: the feed publishes a book and ticker before the first read.
    /// Expected: BookView surfaces them on the first (non-stale) call.
    #[test]
    fn view_surfaces_published_snapshot_and_ticker() {
        let feed = ScriptedBookFeed::new();
        feed.set_ticker(dec!(299.97));
        feed.set_book(vec![(dec!(299.95), dec!(0.5))], vec![(dec!(300.00), dec!(1.0))]);
        let mut view = BookView::new(feed);

        assert_eq!(view.ticker().unwrap().price, dec!(299.97));
        let snap = view.snapshot().unwrap();
        assert_eq!(snap.highest_bid().unwrap().price, dec!(299.95));
        assert_eq!(snap.lowest_ask().unwrap().price, dec!(300.00));
    }
}
