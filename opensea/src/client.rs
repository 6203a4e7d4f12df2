use crate::error::Error;
use crate::rate_limiter::RateLimiter;
use crate::schema::{
    Collection, CollectionStats, Listing, ListingsResponse, NftResponse, RawListing, TokenId,
};
use crate::Result;
use alloy::primitives::Address;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT};
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, OnceCell};
use tokio::time::sleep;
use url::Url;

const BASE_URL: &str = "https://api.opensea.io/api/v2";
const WEB_URL: &str = "https://opensea.io";
const HEADER_API_KEY: &str = "X-API-KEY";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);
const REQUESTS_PER_WINDOW: usize = 4;
const RATE_WINDOW: Duration = Duration::from_secs(1);

pub struct Client {
    client: reqwest::Client,
    collection: String,
    chain: String,
    contract: OnceCell<Address>,
    rate_limiter: Mutex<RateLimiter>,
}

impl Client {
    pub fn new(api_key: &str, collection: &str, chain: &str) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        let mut key = HeaderValue::from_str(api_key)?;
        key.set_sensitive(true);
        headers.insert(HEADER_API_KEY, key);

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(REQUEST_TIMEOUT)
            .build()?;

        Ok(Self {
            client,
            collection: collection.to_string(),
            chain: chain.to_string(),
            contract: OnceCell::new(),
            rate_limiter: Mutex::new(RateLimiter::new(REQUESTS_PER_WINDOW, RATE_WINDOW)),
        })
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    pub async fn get<T: DeserializeOwned>(&self, path: &str, query: Value) -> Result<T> {
        let query = serde_qs::to_string(&query)?;
        let mut url = Url::parse(&format!("{BASE_URL}{path}"))?;
        if !query.is_empty() {
            url.set_query(Some(&query));
        }
        self.request(url).await
    }

    async fn request<T: DeserializeOwned>(&self, url: Url) -> Result<T> {
        self.wait_for_rate_limit().await;

        let response = self.client.get(url).send().await?;
        let status = response.status();
        let text = response.text().await?;

        if !status.is_success() {
            return Err(Error::Response(status, text));
        }

        serde_json::from_str(&text).map_err(|e| Error::Deserialize(format!("{e}: {text}")))
    }

    async fn wait_for_rate_limit(&self) {
        loop {
            let wait = self.rate_limiter.lock().await.check_and_update(Instant::now());
            match wait {
                Some(duration) => sleep(duration).await,
                None => break,
            }
        }
    }

    pub async fn fetch_floor_price(&self) -> Result<Decimal> {
        let path = format!("/collections/{}/stats", self.collection);
        self.get::<CollectionStats>(&path, json!({}))
            .await?
            .floor_price()
    }

    /// Cheapest listings of the collection, ascending by price.
    ///
    /// Entries that can't be turned into a purchasable [`Listing`] are skipped.
    pub async fn fetch_listings(&self, limit: usize) -> Result<Vec<Listing>> {
        let path = format!("/listings/collection/{}/best", self.collection);
        let response = self
            .get::<ListingsResponse>(&path, json!({ "limit": limit }))
            .await?;

        let mut listings: Vec<Listing> = response
            .listings
            .into_iter()
            .filter_map(|value| match parse_listing(value) {
                Ok(listing) => Some(listing),
                Err(e) => {
                    log::warn!("Skipping listing: {e}");
                    None
                }
            })
            .collect();

        listings.sort_by(|a, b| a.price.cmp(&b.price));
        Ok(listings)
    }

    /// Contract address of the collection, resolved once.
    pub async fn contract_address(&self) -> Result<Address> {
        self.contract
            .get_or_try_init(|| async {
                let path = format!("/collections/{}", self.collection);
                let collection = self.get::<Collection>(&path, json!({})).await?;
                collection
                    .contracts
                    .first()
                    .and_then(|contract| contract.address.parse().ok())
                    .ok_or(Error::NoContract(collection.collection))
            })
            .await
            .copied()
    }

    pub async fn has_trait(&self, token_id: &TokenId, name: &str) -> Result<bool> {
        let contract = self.contract_address().await?;
        let path = format!("/chain/{}/contract/{contract}/nfts/{token_id}", self.chain);
        let response = self.get::<NftResponse>(&path, json!({})).await?;
        Ok(response.nft.has_trait(name))
    }

    /// Marketplace page of a token, or of the collection while its contract is unknown.
    pub fn asset_url(&self, token_id: &TokenId) -> String {
        match self.contract.get() {
            Some(contract) => format!("{WEB_URL}/assets/{}/{contract}/{token_id}", self.chain),
            None => format!("{WEB_URL}/collection/{}", self.collection),
        }
    }
}

fn parse_listing(value: Value) -> Result<Listing> {
    let raw: RawListing =
        serde_json::from_value(value).map_err(|e| Error::Listing(e.to_string()))?;
    Listing::try_from(raw)
}
