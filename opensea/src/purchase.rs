use crate::error::Error;
use crate::schema::PurchaseDescriptor;
use crate::Result;
use alloy::network::TransactionBuilder;
use alloy::primitives::{Address, TxHash};
use alloy::providers::{Provider, ProviderBuilder};
use alloy::rpc::types::TransactionRequest;
use alloy::signers::local::PrivateKeySigner;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use tokio::time::timeout;
use url::Url;

const GAS_LIMIT: u64 = 300_000;
const SEND_TIMEOUT: Duration = Duration::from_secs(30);
const CONFIRM_TIMEOUT: Duration = Duration::from_secs(300);

/// Outcome of a purchase attempt as reported to the operator.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PurchaseResult {
    pub success: bool,
    pub transaction_id: Option<String>,
    pub reason: Option<String>,
}

impl PurchaseResult {
    pub fn confirmed(transaction_id: impl Into<String>) -> Self {
        Self {
            success: true,
            transaction_id: Some(transaction_id.into()),
            reason: None,
        }
    }

    pub fn failed(reason: impl Into<String>) -> Self {
        Self {
            success: false,
            transaction_id: None,
            reason: Some(reason.into()),
        }
    }
}

/// Signs and submits purchase transactions from a single account.
pub struct Purchaser {
    signer: PrivateKeySigner,
    rpc_url: Url,
}

impl fmt::Debug for Purchaser {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Purchaser")
            .field("address", &self.signer.address())
            .field("rpc_url", &self.rpc_url.host_str())
            .finish()
    }
}

impl Purchaser {
    pub fn new(private_key: &str, rpc_url: &str) -> Result<Self> {
        let signer = PrivateKeySigner::from_str(private_key)
            .map_err(|_| Error::SigningKey("Couldn't turn private key str into a signer".into()))?;

        Ok(Self {
            signer,
            rpc_url: Url::parse(rpc_url)?,
        })
    }

    pub fn address(&self) -> Address {
        self.signer.address()
    }

    /// Submits the purchase and waits for its receipt. Never returns an error.
    pub async fn buy(&self, descriptor: &PurchaseDescriptor) -> PurchaseResult {
        match self.execute(descriptor).await {
            Ok(hash) => {
                log::info!("Successfully purchased NFT! TX: {hash}");
                PurchaseResult::confirmed(hash.to_string())
            }
            Err(e) => {
                log::error!("Error during purchase: {e}");
                PurchaseResult::failed(e.to_string())
            }
        }
    }

    async fn execute(&self, descriptor: &PurchaseDescriptor) -> Result<TxHash> {
        let provider = ProviderBuilder::new()
            .wallet(self.signer.clone())
            .connect(self.rpc_url.as_str())
            .await
            .map_err(|e| Error::Rpc(format!("Failed to connect to RPC: {e}")))?;

        let tx = TransactionRequest::default()
            .with_from(self.signer.address())
            .with_to(descriptor.to)
            .with_value(descriptor.value)
            .with_input(descriptor.calldata.clone())
            .with_gas_limit(GAS_LIMIT);

        let pending = timeout(SEND_TIMEOUT, provider.send_transaction(tx))
            .await
            .map_err(|_| Error::Timeout(SEND_TIMEOUT, "transaction submission"))?
            .map_err(|e| Error::Rpc(e.to_string()))?;

        let hash = *pending.tx_hash();
        log::info!("Submitted purchase transaction {hash}");

        let receipt = timeout(CONFIRM_TIMEOUT, pending.get_receipt())
            .await
            .map_err(|_| Error::Timeout(CONFIRM_TIMEOUT, "transaction receipt"))?
            .map_err(|e| Error::Rpc(e.to_string()))?;

        if receipt.status() {
            Ok(receipt.transaction_hash)
        } else {
            Err(Error::Reverted(hash.to_string()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Well-known development key; never funded on mainnet.
    const DEV_KEY: &str = "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";

    #[test]
    fn test_new_rejects_bad_key() {
        assert!(matches!(
            Purchaser::new("not-a-key", "http://localhost:8545"),
            Err(Error::SigningKey(_))
        ));
    }

    #[test]
    fn test_new_rejects_bad_url() {
        assert!(matches!(
            Purchaser::new(DEV_KEY, "localhost"),
            Err(Error::Parse(_))
        ));
    }

    #[test]
    fn test_debug_hides_key() {
        let purchaser = Purchaser::new(DEV_KEY, "http://localhost:8545").unwrap();
        let printed = format!("{purchaser:?}");

        assert!(!printed.contains(&DEV_KEY[2..]));
        assert!(printed.contains(&format!("{:?}", purchaser.address())));
    }

    #[test]
    fn test_purchase_result_constructors() {
        let ok = PurchaseResult::confirmed("0xabc");
        assert!(ok.success);
        assert_eq!(ok.transaction_id.as_deref(), Some("0xabc"));

        let failed = PurchaseResult::failed("reverted");
        assert!(!failed.success);
        assert_eq!(failed.transaction_id, None);
    }
}
