use async_trait::async_trait;
use log::error;
use opensea::{Listing, PurchaseResult, Purchaser, TokenId};
use rust_decimal::Decimal;

/// Marketplace operations the monitor and the command handler rely on.
///
/// Implementations never fail: fetch errors are logged and reported as "no data".
#[async_trait]
pub trait Marketplace: Send + Sync + 'static {
    async fn floor_price(&self) -> Option<Decimal>;

    /// Up to `limit` listings, cheapest first.
    async fn listings(&self, limit: usize) -> Vec<Listing>;

    async fn has_trait(&self, token_id: &TokenId, name: &str) -> bool;

    async fn buy(&self, listing: &Listing) -> PurchaseResult;

    fn asset_url(&self, token_id: &TokenId) -> String;
}

pub struct OpenSea {
    client: opensea::Client,
    purchaser: Purchaser,
}

impl OpenSea {
    pub fn new(client: opensea::Client, purchaser: Purchaser) -> Self {
        Self { client, purchaser }
    }
}

#[async_trait]
impl Marketplace for OpenSea {
    async fn floor_price(&self) -> Option<Decimal> {
        self.client
            .fetch_floor_price()
            .await
            .map_err(|e| error!("Error getting floor price: {e}"))
            .ok()
    }

    async fn listings(&self, limit: usize) -> Vec<Listing> {
        self.client
            .fetch_listings(limit)
            .await
            .unwrap_or_else(|e| {
                error!("Error getting listings: {e}");
                Vec::new()
            })
    }

    async fn has_trait(&self, token_id: &TokenId, name: &str) -> bool {
        self.client
            .has_trait(token_id, name)
            .await
            .unwrap_or_else(|e| {
                error!("Error checking {name} for token {token_id}: {e}");
                false
            })
    }

    async fn buy(&self, listing: &Listing) -> PurchaseResult {
        self.purchaser.buy(&listing.descriptor).await
    }

    fn asset_url(&self, token_id: &TokenId) -> String {
        self.client.asset_url(token_id)
    }
}
