//! `ws_market_price` package (`ws_server/market_price.proto`)

use serde::{Deserialize, Serialize};

use super::Verify;

/// Latest YES/NO prices posted for a market
#[derive(Clone, PartialEq, ::prost::Message, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct WsParamsPayload {
    #[prost(string, tag = "1")]
    pub market_id: ::prost::alloc::string::String,
    #[prost(double, tag = "2")]
    pub yes_price: f64,
    #[prost(double, tag = "3")]
    pub no_price: f64,
    /// Unix seconds
    #[prost(int64, tag = "4")]
    pub timestamp: i64,
}

impl Verify for WsParamsPayload {
    fn verify(&self) -> Result<(), String> {
        for (field, value) in [("yesPrice", self.yes_price), ("noPrice", self.no_price)] {
            if !value.is_finite() || value < 0.0 {
                return Err(format!("{field}: invalid value {value}"));
            }
        }
        if self.timestamp < 0 {
            return Err(format!("timestamp: invalid value {}", self.timestamp));
        }
        Ok(())
    }
}
