//! Chain access: RPC client, signer and the retry policy wrapped around both

pub mod client;
pub mod retry;
pub mod signer;

pub use client::{
    AlloyChainClient, CallError, ChainReceipt, ChainRpc, FeeEstimate, QuoteRequest, QuoteVenue,
    TokenTransfer,
};
pub use retry::RetryPolicy;
pub use signer::{LocalKeySigner, SignedTransaction, TransactionSigner};
