//! Error taxonomy shared across the engine, gateway, and book view.

use rust_decimal::Decimal;

/// REST transport/semantic failures from the exchange.
#[derive(Debug, thiserror::Error)]
pub enum ExchangeError {
    #[error("order {0} already done")]
    Done(String),

    #[error("order {0} not found")]
    NotFound(String),

    #[error("exchange rejected order: {0}")]
    Rejected(String),

    #[error("transport error: {0}")]
    Transport(String),
}

/// Explicit cancel rejection.
#[derive(Debug, thiserror::Error)]
pub enum CancellationError {
    #[error("cancel rejected for order {order_id}: {reason}")]
    Rejected { order_id: String, reason: String },
}

/// Local state contradicts the exchange; fatal for the current tick.
#[derive(Debug, thiserror::Error)]
pub enum InvariantError {
    #[error("order {order_id} expected state Filled but exchange reports open")]
    NotActuallyFilled { order_id: String },

    #[error("opposite order has the same side as its owner ({side:?})")]
    SameSideOpposite { side: crate::types::Side },

    #[error("registering an opposite of the same side with no prior opposite for order {order_id}")]
    UnpairedSameSideOpposite { order_id: String },

    #[error("price {price} could not be rounded to a valid 2dp currency amount")]
    UnrepresentablePrice { price: Decimal },
}

/// Per-order lock guard failure; aborts the current mutation.
#[derive(Debug, thiserror::Error)]
pub enum LockError {
    #[error("order {0} is locked")]
    Locked(String),
}

/// Configuration load/validation failure.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required environment variable PRODUCT_ID")]
    MissingProductId,

    #[error("invalid value for {var}: {value}")]
    InvalidValue { var: &'static str, value: String },
}

/// The engine's umbrella error, used by components (placement, shift, fill
/// handling) that can fail for any of the above reasons.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error(transparent)]
    Exchange(#[from] ExchangeError),

    #[error(transparent)]
    Cancellation(#[from] CancellationError),

    #[error(transparent)]
    Invariant(#[from] InvariantError),

    #[error(transparent)]
    Lock(#[from] LockError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}
