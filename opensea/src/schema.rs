use alloy::primitives::{Address, Bytes, U256};
use derive_more::{Deref, Display, From};
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use serde::{de, Deserialize, Deserializer};
use serde_json::Value;

use crate::seaport::{self, Order};
use crate::{Error, Result};

const NATIVE_CURRENCY: &str = "ETH";

#[derive(Clone, Debug, PartialEq, Eq, Hash, Deref, Display, From)]
pub struct TokenId(String);

impl From<&str> for TokenId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

/// Everything needed to fill a listing on-chain: destination, value in wei and call data.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PurchaseDescriptor {
    pub(crate) to: Address,
    pub(crate) value: U256,
    pub(crate) calldata: Bytes,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Listing {
    pub token_id: TokenId,
    /// Price in the listing currency's whole units (ETH).
    pub price: Decimal,
    pub descriptor: PurchaseDescriptor,
}

impl Listing {
    pub fn new(token_id: TokenId, price: Decimal, descriptor: PurchaseDescriptor) -> Self {
        Self {
            token_id,
            price,
            descriptor,
        }
    }
}

#[derive(Deserialize, Debug)]
pub(crate) struct CollectionStats {
    pub total: StatsTotal,
}

#[derive(Deserialize, Debug)]
pub(crate) struct StatsTotal {
    pub floor_price: Option<f64>,
}

impl CollectionStats {
    pub(crate) fn floor_price(&self) -> Result<Decimal> {
        self.total
            .floor_price
            .and_then(Decimal::from_f64)
            .ok_or_else(|| Error::Deserialize("collection stats carry no floor price".into()))
    }
}

#[derive(Deserialize, Debug)]
pub(crate) struct Collection {
    pub collection: String,
    #[serde(default)]
    pub contracts: Vec<CollectionContract>,
}

#[derive(Deserialize, Debug)]
pub(crate) struct CollectionContract {
    pub address: String,
}

#[derive(Deserialize, Debug)]
pub(crate) struct NftResponse {
    pub nft: Nft,
}

#[derive(Deserialize, Debug)]
pub(crate) struct Nft {
    #[serde(default)]
    pub traits: Vec<NftTrait>,
}

#[derive(Deserialize, Debug)]
pub(crate) struct NftTrait {
    pub trait_type: String,
}

impl Nft {
    pub(crate) fn has_trait(&self, name: &str) -> bool {
        self.traits
            .iter()
            .any(|t| t.trait_type.eq_ignore_ascii_case(name))
    }
}

/// Listings are kept as raw values so one malformed entry doesn't discard the page.
#[derive(Deserialize, Debug)]
pub(crate) struct ListingsResponse {
    pub listings: Vec<Value>,
}

#[derive(Deserialize, Debug)]
pub(crate) struct RawListing {
    pub price: RawPrice,
    pub protocol_data: RawOrder,
    pub protocol_address: String,
}

#[derive(Deserialize, Debug)]
pub(crate) struct RawPrice {
    pub current: CurrentPrice,
}

#[derive(Deserialize, Debug)]
pub(crate) struct CurrentPrice {
    pub currency: String,
    pub decimals: u32,
    pub value: String,
}

#[derive(Deserialize, Debug)]
pub(crate) struct RawOrder {
    pub parameters: RawParameters,
    pub signature: Option<String>,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub(crate) struct RawParameters {
    pub offerer: String,
    pub zone: String,
    pub offer: Vec<RawOffer>,
    pub consideration: Vec<RawConsideration>,
    #[serde(deserialize_with = "string_or_number")]
    pub order_type: String,
    #[serde(deserialize_with = "string_or_number")]
    pub start_time: String,
    #[serde(deserialize_with = "string_or_number")]
    pub end_time: String,
    pub zone_hash: String,
    #[serde(deserialize_with = "string_or_number")]
    pub salt: String,
    pub conduit_key: String,
    #[serde(deserialize_with = "string_or_number")]
    pub total_original_consideration_items: String,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub(crate) struct RawOffer {
    #[serde(deserialize_with = "string_or_number")]
    pub item_type: String,
    pub token: String,
    #[serde(deserialize_with = "string_or_number")]
    pub identifier_or_criteria: String,
    #[serde(deserialize_with = "string_or_number")]
    pub start_amount: String,
    #[serde(deserialize_with = "string_or_number")]
    pub end_amount: String,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub(crate) struct RawConsideration {
    #[serde(deserialize_with = "string_or_number")]
    pub item_type: String,
    pub token: String,
    #[serde(deserialize_with = "string_or_number")]
    pub identifier_or_criteria: String,
    #[serde(deserialize_with = "string_or_number")]
    pub start_amount: String,
    #[serde(deserialize_with = "string_or_number")]
    pub end_amount: String,
    pub recipient: String,
}

/// The API is inconsistent about quoting numeric order fields.
fn string_or_number<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<String, D::Error> {
    match Value::deserialize(deserializer)? {
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        other => Err(de::Error::custom(format!(
            "expected string or number, got {other}"
        ))),
    }
}

impl TryFrom<RawListing> for Listing {
    type Error = Error;

    fn try_from(raw: RawListing) -> Result<Self> {
        let token_id = raw
            .protocol_data
            .parameters
            .offer
            .first()
            .map(|item| TokenId::from(item.identifier_or_criteria.as_str()))
            .ok_or_else(|| Error::Listing("order offers no item".into()))?;

        let current = &raw.price.current;
        if current.currency != NATIVE_CURRENCY {
            return Err(Error::Listing(format!("unsupported currency: {}", current.currency)));
        }
        let wei: i128 = current
            .value
            .parse()
            .map_err(|_| Error::Listing(format!("invalid price value: {}", current.value)))?;
        let price = Decimal::try_from_i128_with_scale(wei, current.decimals)
            .map_err(|e| Error::Listing(format!("price out of range: {e}")))?
            .normalize();
        let value = current
            .value
            .parse::<U256>()
            .map_err(|_| Error::Listing(format!("invalid price value: {}", current.value)))?;

        let to = raw
            .protocol_address
            .parse::<Address>()
            .map_err(|_| Error::Listing(format!("invalid protocol address: {}", raw.protocol_address)))?;
        let order = Order::try_from(&raw.protocol_data)?;

        Ok(Listing {
            token_id,
            price,
            descriptor: PurchaseDescriptor {
                to,
                value,
                calldata: seaport::fulfill_order_calldata(order),
            },
        })
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use alloy::sol_types::SolCall;
    use rust_decimal_macros::dec;
    use serde_json::json;

    pub(crate) fn listing_json(token_id: &str, wei: &str) -> Value {
        json!({
            "order_hash": "0x1d0b",
            "chain": "ethereum",
            "type": "basic",
            "price": {
                "current": { "currency": "ETH", "decimals": 18, "value": wei }
            },
            "protocol_data": {
                "parameters": {
                    "offerer": "0x1111111111111111111111111111111111111111",
                    "offer": [{
                        "itemType": 2,
                        "token": "0x2222222222222222222222222222222222222222",
                        "identifierOrCriteria": token_id,
                        "startAmount": "1",
                        "endAmount": "1"
                    }],
                    "consideration": [{
                        "itemType": 0,
                        "token": "0x0000000000000000000000000000000000000000",
                        "identifierOrCriteria": "0",
                        "startAmount": wei,
                        "endAmount": wei,
                        "recipient": "0x1111111111111111111111111111111111111111"
                    }],
                    "startTime": "1700000000",
                    "endTime": "1900000000",
                    "orderType": 0,
                    "zone": "0x0000000000000000000000000000000000000000",
                    "zoneHash": "0x0000000000000000000000000000000000000000000000000000000000000000",
                    "salt": "0x360c6ebe",
                    "conduitKey": "0x0000007b02230091a7ed01230072f7006a004d60a8d4e71d599b8104250f0000",
                    "totalOriginalConsiderationItems": 1,
                    "counter": 0
                },
                "signature": null
            },
            "protocol_address": "0x0000000000000068f116a894984e2db1123eb395"
        })
    }

    #[test]
    fn test_listing_from_raw() {
        let raw: RawListing =
            serde_json::from_value(listing_json("42", "1050000000000000000")).unwrap();
        let listing = Listing::try_from(raw).unwrap();

        assert_eq!(listing.token_id, TokenId::from("42"));
        assert_eq!(listing.price, dec!(1.05));
        assert_eq!(listing.price.to_string(), "1.05");
        assert_eq!(
            listing.descriptor.value,
            U256::from(1_050_000_000_000_000_000u64)
        );
        assert_eq!(
            &listing.descriptor.calldata[..4],
            seaport::fulfillOrderCall::SELECTOR.as_slice()
        );
    }

    #[test]
    fn test_listing_without_offer_is_rejected() {
        let mut value = listing_json("42", "1");
        value["protocol_data"]["parameters"]["offer"] = json!([]);
        let raw: RawListing = serde_json::from_value(value).unwrap();

        assert!(matches!(Listing::try_from(raw), Err(Error::Listing(_))));
    }

    #[test]
    fn test_listing_with_bad_address_is_rejected() {
        let mut value = listing_json("42", "1");
        value["protocol_address"] = json!("seaport");
        let raw: RawListing = serde_json::from_value(value).unwrap();

        assert!(Listing::try_from(raw).is_err());
    }

    #[test]
    fn test_listing_in_erc20_is_rejected() {
        let mut value = listing_json("42", "1");
        value["price"]["current"]["currency"] = json!("WETH");
        let raw: RawListing = serde_json::from_value(value).unwrap();

        assert!(matches!(Listing::try_from(raw), Err(Error::Listing(_))));
    }

    #[test]
    fn test_trait_match_ignores_case() {
        let nft: NftResponse = serde_json::from_value(json!({
            "nft": { "identifier": "7", "traits": [
                { "trait_type": "Background", "value": "Blue" },
                { "trait_type": "ACCESSORIES", "value": "Hat" }
            ]}
        }))
        .unwrap();

        assert!(nft.nft.has_trait("accessories"));
        assert!(!nft.nft.has_trait("eyes"));
    }

    #[test]
    fn test_floor_price_missing() {
        let stats: CollectionStats =
            serde_json::from_value(json!({ "total": { "floor_price": null } })).unwrap();
        assert!(stats.floor_price().is_err());

        let stats: CollectionStats =
            serde_json::from_value(json!({ "total": { "floor_price": 0.5 } })).unwrap();
        assert_eq!(stats.floor_price().unwrap(), dec!(0.5));
    }
}
