pub mod commands;
pub mod error;
pub mod models;
pub mod repository;

pub use error::{DebtError, Result};
pub use models::debt::{Debt, DebtStatus, DebtType, NewDebt, PaymentMethod, DEFAULT_CURRENCY};
pub use repository::{DebtFilter, DebtRepository};

/// Installs `env_logger` for the host process. `RUST_LOG` overrides the
/// default `info` filter. Safe to call more than once.
pub fn init_logging() {
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .try_init();
}
