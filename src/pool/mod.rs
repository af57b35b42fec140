//! Pool pricing
//!
//! Local curve math for reserve-based venues and the normalizer that puts
//! every venue behind one quote interface.
//!
//! Created: 2026-01-27
//! Modified: 2026-02-03 - Stable-swap curve, QuoteNormalizer

pub mod calculator;
pub mod normalizer;

pub use calculator::{PriceCalculator, SwapCurve};
pub use normalizer::{NormalizedQuote, QuoteNormalizer, RemoteQuoter};
