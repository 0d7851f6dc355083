pub mod currency;
pub mod request_id;

pub use currency::{
    apply_currency, currency_middleware, CurrencySettings, ExcludedPaths, RequestCurrency,
    CURRENCY_HEADER,
};
pub use request_id::request_id_middleware;
