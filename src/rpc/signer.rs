//! Transaction signing capability
//!
//! Signs locally with the wallet key; the signed payload is then broadcast
//! through `ChainRpc::send_transaction` so the send itself sits under the
//! retry policy.

use crate::errors::{ConfigError, ExecutionError};
use alloy::eips::eip2718::Encodable2718;
use alloy::network::{EthereumWallet, TransactionBuilder};
use alloy::primitives::{Address, Bytes, TxHash};
use alloy::rpc::types::TransactionRequest;
use alloy::signers::local::PrivateKeySigner;
use async_trait::async_trait;

/// EIP-2718 encoded transaction plus its hash
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedTransaction {
    pub raw: Bytes,
    pub hash: TxHash,
}

#[async_trait]
pub trait TransactionSigner: Send + Sync {
    fn address(&self) -> Address;

    /// `tx` must be complete: nonce, gas, fees and chain id set
    async fn sign(&self, tx: TransactionRequest) -> Result<SignedTransaction, ExecutionError>;
}

pub struct LocalKeySigner {
    wallet: EthereumWallet,
    address: Address,
}

impl LocalKeySigner {
    pub fn from_private_key(key: &str) -> Result<Self, ConfigError> {
        let signer: PrivateKeySigner = key
            .trim()
            .parse()
            .map_err(|_| ConfigError::invalid("PRIVATE_KEY", "not a valid secp256k1 key"))?;
        let address = signer.address();
        Ok(Self {
            wallet: EthereumWallet::from(signer),
            address,
        })
    }
}

#[async_trait]
impl TransactionSigner for LocalKeySigner {
    fn address(&self) -> Address {
        self.address
    }

    async fn sign(&self, tx: TransactionRequest) -> Result<SignedTransaction, ExecutionError> {
        let envelope = tx
            .build(&self.wallet)
            .await
            .map_err(|e| ExecutionError::Signing(e.to_string()))?;
        Ok(SignedTransaction {
            hash: *envelope.tx_hash(),
            raw: Bytes::from(envelope.encoded_2718()),
        })
    }
}
