use market_maker::book::test_support::ScriptedBookFeed;
use market_maker::book::BookView;
use market_maker::config::Config;
use market_maker::engine::placement::quote_currency;
use market_maker::engine::reconcile::map_open_orders_to_fills;
use market_maker::engine::registry::OrderRegistry;
use market_maker::engine::runner::{self, StopFlag};
use market_maker::gateway::exchange::MockExchange;
use rust_decimal_macros::dec;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    let config = match Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("[MAIN] configuration error: {e}");
            std::process::exit(1);
        }
    };

    eprintln!("╔══════════════════════════════════════════════════╗");
    eprintln!("║  Market Maker — {}", config.product_id);
    eprintln!("║  Dry run: {} | Aggressive: {}", config.dry_run, config.aggressive);
    eprintln!("║  Spread: {}–{} | Stop: {:.0}% | Spend: {:.0}%",
        config.min_spread, config.max_spread, config.stop_pct * dec!(100), config.spend_pct * dec!(100));
    eprintln!("║  Caps: {} buys / {} sells | Interval: {}s", config.max_open_buys, config.max_open_sells, config.interval_secs);
    eprintln!("╚══════════════════════════════════════════════════╝");

    if !config.dry_run {
        eprintln!(
            "[MAIN] live exchange/book-feed clients are external collaborators (out of scope); \
             running with the in-memory doubles regardless of DRY_RUN"
        );
    }

    let exchange = MockExchange::with_balance(quote_currency(&config.product_id), dec!(10_000));
    let feed = ScriptedBookFeed::new();
    let mut book_view = BookView::new(feed);
    let mut registry = OrderRegistry::new();

    if let Err(e) = map_open_orders_to_fills(&mut registry, &exchange, &config.product_id).await {
        eprintln!("[MAIN] startup reconciliation failed: {e}");
    }

    let stop = StopFlag::new();
    let shutdown_stop = stop.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("[MAIN] shutdown requested");
            shutdown_stop.request_stop();
        }
    });

    if let Err(e) = runner::run(&mut registry, &exchange, &mut book_view, &config, stop).await {
        eprintln!("[MAIN] fatal error: {e}");
        std::process::exit(1);
    }
}
