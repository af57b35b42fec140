//! Swap and approval calldata, one encoder per router kind

use crate::contracts::{ISolidlyRouter, IUniswapV2Router02, IV3SwapRouter, IERC20};
use crate::errors::ExecutionError;
use crate::rpc::client::fee_to_u24;
use crate::types::{RouterConfig, RouterVenue};
use alloy::primitives::aliases::U160;
use alloy::primitives::{Address, Bytes, U256};
use alloy::sol_types::SolCall;

/// Seconds added to the current time for swap deadlines
pub const DEADLINE_SECS: u64 = 300;

/// Raw-unit parameters of one swap
#[derive(Debug, Clone, Copy)]
pub struct SwapCall {
    pub token_in: Address,
    pub token_out: Address,
    pub amount_in: U256,
    pub min_amount_out: U256,
    pub recipient: Address,
    /// Unix seconds
    pub deadline: u64,
    pub fee_tier: Option<u32>,
    /// Solidly pool type
    pub stable: bool,
}

pub fn encode_swap(router: &RouterConfig, call: &SwapCall) -> Result<Bytes, ExecutionError> {
    let deadline = U256::from(call.deadline);
    let data = match router.venue {
        RouterVenue::UniswapV2 | RouterVenue::Aggregator => {
            IUniswapV2Router02::swapExactTokensForTokensCall {
                amountIn: call.amount_in,
                amountOutMin: call.min_amount_out,
                path: vec![call.token_in, call.token_out],
                to: call.recipient,
                deadline,
            }
            .abi_encode()
        }
        RouterVenue::Solidly => ISolidlyRouter::swapExactTokensForTokensCall {
            amountIn: call.amount_in,
            amountOutMin: call.min_amount_out,
            routes: vec![ISolidlyRouter::Route {
                from: call.token_in,
                to: call.token_out,
                stable: call.stable,
                // zero selects the router's default factory
                factory: Address::ZERO,
            }],
            to: call.recipient,
            deadline,
        }
        .abi_encode(),
        RouterVenue::UniswapV3 { .. } => {
            let fee = call.fee_tier.ok_or_else(|| {
                ExecutionError::InvalidLeg(format!("{}: v3 swap without fee tier", router.dex_id))
            })?;
            IV3SwapRouter::exactInputSingleCall {
                params: IV3SwapRouter::ExactInputSingleParams {
                    tokenIn: call.token_in,
                    tokenOut: call.token_out,
                    fee: fee_to_u24(fee),
                    recipient: call.recipient,
                    amountIn: call.amount_in,
                    amountOutMinimum: call.min_amount_out,
                    sqrtPriceLimitX96: U160::ZERO,
                },
            }
            .abi_encode()
        }
    };
    Ok(Bytes::from(data))
}

pub fn encode_approve(spender: Address, amount: U256) -> Bytes {
    Bytes::from(IERC20::approveCall { spender, amount }.abi_encode())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn call(fee_tier: Option<u32>) -> SwapCall {
        SwapCall {
            token_in: Address::repeat_byte(0x06),
            token_out: Address::repeat_byte(0x42),
            amount_in: U256::from(50_000_000_000_000_000u64),
            min_amount_out: U256::from(24_000u64),
            recipient: Address::repeat_byte(0x77),
            deadline: 1_800_000_000,
            fee_tier,
            stable: true,
        }
    }

    fn router(venue: RouterVenue) -> RouterConfig {
        RouterConfig {
            dex_id: "test".to_string(),
            address: Address::repeat_byte(0x10),
            venue,
            fee_bps: None,
        }
    }

    #[test]
    fn test_v2_path_and_deadline() {
        let data = encode_swap(&router(RouterVenue::UniswapV2), &call(None)).unwrap();
        let decoded = IUniswapV2Router02::swapExactTokensForTokensCall::abi_decode(&data).unwrap();
        assert_eq!(decoded.path, vec![Address::repeat_byte(0x06), Address::repeat_byte(0x42)]);
        assert_eq!(decoded.amountOutMin, U256::from(24_000u64));
        assert_eq!(decoded.deadline, U256::from(1_800_000_000u64));
    }

    #[test]
    fn test_aggregator_uses_v2_surface() {
        let data = encode_swap(&router(RouterVenue::Aggregator), &call(None)).unwrap();
        assert_eq!(
            data[..4],
            IUniswapV2Router02::swapExactTokensForTokensCall::SELECTOR[..]
        );
    }

    #[test]
    fn test_solidly_stable_route() {
        let data = encode_swap(&router(RouterVenue::Solidly), &call(None)).unwrap();
        let decoded = ISolidlyRouter::swapExactTokensForTokensCall::abi_decode(&data).unwrap();
        assert_eq!(decoded.routes.len(), 1);
        assert!(decoded.routes[0].stable);
        assert_eq!(decoded.routes[0].factory, Address::ZERO);
        assert_eq!(decoded.to, Address::repeat_byte(0x77));
    }

    #[test]
    fn test_solidly_volatile_route() {
        let volatile = SwapCall {
            stable: false,
            ..call(None)
        };
        let data = encode_swap(&router(RouterVenue::Solidly), &volatile).unwrap();
        let decoded = ISolidlyRouter::swapExactTokensForTokensCall::abi_decode(&data).unwrap();
        assert!(!decoded.routes[0].stable);
    }

    #[test]
    fn test_v3_requires_fee_tier() {
        let v3 = router(RouterVenue::UniswapV3 {
            factory: Address::repeat_byte(1),
            quoter: Address::repeat_byte(2),
        });
        assert!(matches!(encode_swap(&v3, &call(None)), Err(ExecutionError::InvalidLeg(_))));

        let data = encode_swap(&v3, &call(Some(500))).unwrap();
        let decoded = IV3SwapRouter::exactInputSingleCall::abi_decode(&data).unwrap();
        assert_eq!(decoded.params.fee.to::<u32>(), 500);
        assert_eq!(decoded.params.amountOutMinimum, U256::from(24_000u64));
    }

    #[test]
    fn test_approve_encoding() {
        let data = encode_approve(Address::repeat_byte(0x10), U256::MAX);
        let decoded = IERC20::approveCall::abi_decode(&data).unwrap();
        assert_eq!(decoded.spender, Address::repeat_byte(0x10));
        assert_eq!(decoded.amount, U256::MAX);
    }
}
