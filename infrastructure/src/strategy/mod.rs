//! Strategy selection adapters.

mod success_rate;

pub use success_rate::SuccessRateSelector;
