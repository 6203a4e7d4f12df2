//! Seaport order types and `fulfillOrder` call encoding.

use alloy::primitives::{Address, Bytes, B256, U256};
use alloy::sol;
use alloy::sol_types::SolCall;
use std::str::FromStr;

use crate::schema::{RawConsideration, RawOffer, RawOrder};
use crate::{Error, Result};

sol! {
    struct OfferItem {
        uint8 itemType;
        address token;
        uint256 identifierOrCriteria;
        uint256 startAmount;
        uint256 endAmount;
    }

    struct ConsiderationItem {
        uint8 itemType;
        address token;
        uint256 identifierOrCriteria;
        uint256 startAmount;
        uint256 endAmount;
        address recipient;
    }

    struct OrderParameters {
        address offerer;
        address zone;
        OfferItem[] offer;
        ConsiderationItem[] consideration;
        uint8 orderType;
        uint256 startTime;
        uint256 endTime;
        bytes32 zoneHash;
        uint256 salt;
        bytes32 conduitKey;
        uint256 totalOriginalConsiderationItems;
    }

    struct Order {
        OrderParameters parameters;
        bytes signature;
    }

    function fulfillOrder(Order order, bytes32 fulfillerConduitKey) external payable returns (bool fulfilled);
}

fn parse<T: FromStr>(field: &'static str, value: &str) -> Result<T> {
    value
        .parse()
        .map_err(|_| Error::Listing(format!("invalid {field}: {value}")))
}

impl TryFrom<&RawOffer> for OfferItem {
    type Error = Error;

    fn try_from(item: &RawOffer) -> Result<Self> {
        Ok(Self {
            itemType: parse("itemType", &item.item_type)?,
            token: parse::<Address>("token", &item.token)?,
            identifierOrCriteria: parse::<U256>("identifierOrCriteria", &item.identifier_or_criteria)?,
            startAmount: parse::<U256>("startAmount", &item.start_amount)?,
            endAmount: parse::<U256>("endAmount", &item.end_amount)?,
        })
    }
}

impl TryFrom<&RawConsideration> for ConsiderationItem {
    type Error = Error;

    fn try_from(item: &RawConsideration) -> Result<Self> {
        Ok(Self {
            itemType: parse("itemType", &item.item_type)?,
            token: parse::<Address>("token", &item.token)?,
            identifierOrCriteria: parse::<U256>("identifierOrCriteria", &item.identifier_or_criteria)?,
            startAmount: parse::<U256>("startAmount", &item.start_amount)?,
            endAmount: parse::<U256>("endAmount", &item.end_amount)?,
            recipient: parse::<Address>("recipient", &item.recipient)?,
        })
    }
}

impl TryFrom<&RawOrder> for Order {
    type Error = Error;

    fn try_from(order: &RawOrder) -> Result<Self> {
        let params = &order.parameters;
        Ok(Self {
            parameters: OrderParameters {
                offerer: parse::<Address>("offerer", &params.offerer)?,
                zone: parse::<Address>("zone", &params.zone)?,
                offer: params
                    .offer
                    .iter()
                    .map(OfferItem::try_from)
                    .collect::<Result<_>>()?,
                consideration: params
                    .consideration
                    .iter()
                    .map(ConsiderationItem::try_from)
                    .collect::<Result<_>>()?,
                orderType: parse("orderType", &params.order_type)?,
                startTime: parse::<U256>("startTime", &params.start_time)?,
                endTime: parse::<U256>("endTime", &params.end_time)?,
                zoneHash: parse::<B256>("zoneHash", &params.zone_hash)?,
                salt: parse::<U256>("salt", &params.salt)?,
                conduitKey: parse::<B256>("conduitKey", &params.conduit_key)?,
                totalOriginalConsiderationItems: parse::<U256>(
                    "totalOriginalConsiderationItems",
                    &params.total_original_consideration_items,
                )?,
            },
            signature: parse::<Bytes>("signature", order.signature.as_deref().unwrap_or("0x"))?,
        })
    }
}

/// Call data for filling `order` in full, without a fulfiller conduit.
pub(crate) fn fulfill_order_calldata(order: Order) -> Bytes {
    fulfillOrderCall {
        order,
        fulfillerConduitKey: B256::ZERO,
    }
    .abi_encode()
    .into()
}
