//! Configuration loaded from environment variables.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use crate::error::ConfigError;

/// Immutable engine configuration, constructed once at startup.
#[derive(Clone, Debug)]
pub struct Config {
    /// Exchange-assigned product symbol this engine instance trades, e.g. "BTC-USD".
    pub product_id: String,

    pub max_spread: Decimal,
    pub min_spread: Decimal,
    pub stop_pct: Decimal,
    pub spend_pct: Decimal,

    pub max_open_buys: usize,
    pub max_open_sells: usize,

    /// Seconds between Main Loop ticks.
    pub interval_secs: u64,

    /// Overrides the Book View's default wall-size threshold when set.
    pub wall_size: Option<Decimal>,

    /// Selects `min_spread` (true) or `max_spread` (false) for peer/ticker adjustments.
    pub aggressive: bool,

    /// If true, pre-existing account orders are adopted into the registry on refresh.
    pub manage_existing_orders: bool,

    /// If true, orders are posted against an in-memory `MockExchange` rather than
    /// a live exchange client.
    pub dry_run: bool,
}

impl Config {
    /// Loads configuration from environment variables, applying the defaults from
    /// the external-interfaces contract. `PRODUCT_ID` is the only required variable.
    pub fn from_env() -> Result<Self, ConfigError> {
        let product_id = std::env::var("PRODUCT_ID").map_err(|_| ConfigError::MissingProductId)?;

        Ok(Self {
            product_id,
            max_spread: parse_decimal_env("MAX_SPREAD", dec!(0.10))?,
            min_spread: parse_decimal_env("MIN_SPREAD", dec!(0.05))?,
            stop_pct: parse_decimal_env("STOP_PCT", dec!(0.05))?,
            spend_pct: parse_decimal_env("SPEND_PCT", dec!(0.01))?,
            max_open_buys: parse_env("MAX_OPEN_BUYS", 6)?,
            max_open_sells: parse_env("MAX_OPEN_SELLS", 12)?,
            interval_secs: parse_env("INTERVAL", 2)?,
            wall_size: match std::env::var("WALL_SIZE") {
                Ok(s) => Some(parse_decimal_str("WALL_SIZE", &s)?),
                Err(_) => None,
            },
            aggressive: parse_bool_env("AGGRESSIVE", true)?,
            manage_existing_orders: parse_bool_env("MANAGE_EXISTING_ORDERS", true)?,
            dry_run: parse_bool_env("DRY_RUN", true)?,
        })
    }

    /// `min_spread` if aggressive, else `max_spread` — used throughout the shift
    /// and placement paths wherever "spread per aggressive flag" is specified.
    pub fn spread(&self, aggressive: bool) -> Decimal {
        if aggressive {
            self.min_spread
        } else {
            self.max_spread
        }
    }
}

fn parse_decimal_env(var: &'static str, default: Decimal) -> Result<Decimal, ConfigError> {
    match std::env::var(var) {
        Ok(s) => parse_decimal_str(var, &s),
        Err(_) => Ok(default),
    }
}

fn parse_decimal_str(var: &'static str, s: &str) -> Result<Decimal, ConfigError> {
    s.parse::<Decimal>()
        .map_err(|_| ConfigError::InvalidValue { var, value: s.to_string() })
}

fn parse_env<T: std::str::FromStr>(var: &'static str, default: T) -> Result<T, ConfigError> {
    match std::env::var(var) {
        Ok(s) => s.parse::<T>().map_err(|_| ConfigError::InvalidValue { var, value: s }),
        Err(_) => Ok(default),
    }
}

fn parse_bool_env(var: &'static str, default: bool) -> Result<bool, ConfigError> {
    match std::env::var(var) {
        Ok(s) => match s.to_lowercase().as_str() {
            "1" | "true" | "yes" => Ok(true),
            "0" | "false" | "no" => Ok(false),
            _ => Err(ConfigError::InvalidValue { var, value: s }),
        },
        Err(_) => Ok(default),
    }
}
