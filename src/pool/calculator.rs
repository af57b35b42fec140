//! Price Calculator
//!
//! Local swap math for reserve-based pools, in human units (f64):
//! constant product (x * y = k) for uniswapV2 pools and the Solidly
//! stable invariant (x³y + xy³ = k) for solidly pools.
//!
//! Created: 2026-01-27
//! Modified: 2026-02-03 - f64 human units, stable-swap curve, configurable fee

use crate::types::SwapQuote;

/// Fee assumed for V2-style pools when neither the feed nor the router config gives one
pub const DEFAULT_V2_FEE_BPS: u32 = 20;

const NEWTON_MAX_ITERATIONS: usize = 255;
const NEWTON_TOLERANCE: f64 = 1e-12;

/// Pricing curve of a reserve-based pool
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwapCurve {
    ConstantProduct,
    StableSwap,
}

/// Price calculator for reserve-based pools
pub struct PriceCalculator;

impl PriceCalculator {
    /// Amount of output received for `amount_in` (fee taken from the input)
    ///
    /// Formula: amount_out = (amount_in_after_fee * reserve_out) / (reserve_in + amount_in_after_fee)
    pub fn get_amount_out(amount_in: f64, reserve_in: f64, reserve_out: f64, fee_bps: u32) -> f64 {
        if !(amount_in > 0.0 && reserve_in > 0.0 && reserve_out > 0.0) {
            return 0.0;
        }
        let amount_in_with_fee = amount_in * fee_multiplier(fee_bps);
        (amount_in_with_fee * reserve_out) / (reserve_in + amount_in_with_fee)
    }

    /// Stable-swap output: solve x'³y' + x'y'³ = k for y' with Newton's method
    pub fn get_amount_out_stable(
        amount_in: f64,
        reserve_in: f64,
        reserve_out: f64,
        fee_bps: u32,
    ) -> f64 {
        if !(amount_in > 0.0 && reserve_in > 0.0 && reserve_out > 0.0) {
            return 0.0;
        }
        let amount_in_with_fee = amount_in * fee_multiplier(fee_bps);
        let k = stable_k(reserve_in, reserve_out);
        let x = reserve_in + amount_in_with_fee;

        // f(y) = x y³ + x³ y - k is increasing and convex in y, so Newton from
        // the old reserve (above the root) converges monotonically downward
        let mut y = reserve_out;
        for _ in 0..NEWTON_MAX_ITERATIONS {
            let f = x * y * y * y + x * x * x * y - k;
            let df = 3.0 * x * y * y + x * x * x;
            if df <= 0.0 {
                break;
            }
            let step = f / df;
            y -= step;
            if step.abs() <= NEWTON_TOLERANCE * y.abs().max(1.0) {
                break;
            }
        }

        (reserve_out - y).clamp(0.0, reserve_out)
    }

    /// Marginal output per unit of input, before fees
    pub fn spot_price(curve: SwapCurve, reserve_in: f64, reserve_out: f64) -> f64 {
        if !(reserve_in > 0.0 && reserve_out > 0.0) {
            return 0.0;
        }
        match curve {
            SwapCurve::ConstantProduct => reserve_out / reserve_in,
            SwapCurve::StableSwap => {
                let (x, y) = (reserve_in, reserve_out);
                (3.0 * x * x * y + y * y * y) / (x * x * x + 3.0 * x * y * y)
            }
        }
    }

    /// Quote a swap on `curve` and report its price impact against the pre-trade spot price
    pub fn quote(
        curve: SwapCurve,
        amount_in: f64,
        reserve_in: f64,
        reserve_out: f64,
        fee_bps: u32,
    ) -> SwapQuote {
        let amount_out = match curve {
            SwapCurve::ConstantProduct => {
                Self::get_amount_out(amount_in, reserve_in, reserve_out, fee_bps)
            }
            SwapCurve::StableSwap => {
                Self::get_amount_out_stable(amount_in, reserve_in, reserve_out, fee_bps)
            }
        };
        let spot = Self::spot_price(curve, reserve_in, reserve_out);
        let effective_in = amount_in * fee_multiplier(fee_bps);
        SwapQuote {
            amount_out,
            price_impact_bps: price_impact_bps(effective_in, amount_out, spot),
        }
    }
}

/// Shortfall of the execution price against `spot`, in basis points
pub fn price_impact_bps(amount_in: f64, amount_out: f64, spot: f64) -> f64 {
    if !(amount_in > 0.0 && spot > 0.0) || amount_out <= 0.0 {
        return 10_000.0;
    }
    let execution_price = amount_out / amount_in;
    ((1.0 - execution_price / spot) * 10_000.0).max(0.0)
}

fn fee_multiplier(fee_bps: u32) -> f64 {
    1.0 - (fee_bps.min(10_000) as f64) / 10_000.0
}

fn stable_k(x: f64, y: f64) -> f64 {
    x * x * x * y + x * y * y * y
}
