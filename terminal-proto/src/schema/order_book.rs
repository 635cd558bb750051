//! `order_book` package (`ws_server/order_book.proto`)

use serde::{Deserialize, Serialize};

use super::Verify;

#[derive(Clone, PartialEq, ::prost::Message, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct OrderLevel {
    #[prost(double, tag = "1")]
    pub price: f64,
    #[prost(double, tag = "2")]
    pub shares: f64,
    #[prost(uint32, tag = "3")]
    pub users: u32,
}

#[derive(Clone, PartialEq, ::prost::Message, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct OrderBook {
    #[prost(message, repeated, tag = "1")]
    pub bids: ::prost::alloc::vec::Vec<OrderLevel>,
    #[prost(message, repeated, tag = "2")]
    pub asks: ::prost::alloc::vec::Vec<OrderLevel>,
}

/// Full book for both outcomes of one market
#[derive(Clone, PartialEq, ::prost::Message, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct MarketBook {
    #[prost(string, tag = "1")]
    pub market_id: ::prost::alloc::string::String,
    #[prost(message, optional, tag = "2")]
    pub yes_book: ::core::option::Option<OrderBook>,
    #[prost(message, optional, tag = "3")]
    pub no_book: ::core::option::Option<OrderBook>,
}

impl Verify for OrderLevel {
    fn verify(&self) -> Result<(), String> {
        if !self.price.is_finite() || self.price < 0.0 {
            return Err(format!("price: invalid value {}", self.price));
        }
        if !self.shares.is_finite() || self.shares < 0.0 {
            return Err(format!("shares: invalid value {}", self.shares));
        }
        Ok(())
    }
}

impl Verify for OrderBook {
    fn verify(&self) -> Result<(), String> {
        for (i, level) in self.bids.iter().enumerate() {
            level.verify().map_err(|e| format!("bids[{i}].{e}"))?;
        }
        for (i, level) in self.asks.iter().enumerate() {
            level.verify().map_err(|e| format!("asks[{i}].{e}"))?;
        }
        Ok(())
    }
}

impl Verify for MarketBook {
    fn verify(&self) -> Result<(), String> {
        if let Some(book) = &self.yes_book {
            book.verify().map_err(|e| format!("yesBook.{e}"))?;
        }
        if let Some(book) = &self.no_book {
            book.verify().map_err(|e| format!("noBook.{e}"))?;
        }
        Ok(())
    }
}
