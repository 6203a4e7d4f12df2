//! Typed client for the OpenSea v2 API and the Seaport purchase path.
//!
//! [`Client`] covers the read side (floor price, listings, trait metadata) and
//! turns every listing into a [`Listing`] whose [`PurchaseDescriptor`] already
//! carries the encoded `fulfillOrder` call. [`Purchaser`] signs and submits it.
mod client;
mod error;
mod purchase;
mod rate_limiter;
mod schema;
mod seaport;

pub use client::Client;
pub use error::Error;
pub use purchase::{PurchaseResult, Purchaser};
pub use schema::{Listing, PurchaseDescriptor, TokenId};

pub type Result<T> = std::result::Result<T, Error>;
