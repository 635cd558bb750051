//! `ws_common_types` package (`ws_server/common.proto`)
//!
//! Binary envelope used by poster services talking to the push-feed server.

use serde::{Deserialize, Serialize};

use super::Verify;

#[derive(Clone, PartialEq, ::prost::Message, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct WsData {
    #[prost(enumeration = "Channel", tag = "1")]
    pub channel: i32,
    #[prost(string, tag = "2")]
    pub params: ::prost::alloc::string::String,
}

#[derive(Clone, PartialEq, ::prost::Message, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Payload {
    #[prost(enumeration = "OperationType", tag = "1")]
    pub ops: i32,
    #[prost(message, optional, tag = "2")]
    pub data: ::core::option::Option<WsData>,
}

#[derive(Clone, PartialEq, ::prost::Message, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct WsMessage {
    #[prost(string, optional, tag = "1")]
    pub id: ::core::option::Option<::prost::alloc::string::String>,
    #[prost(message, optional, tag = "2")]
    pub payload: ::core::option::Option<Payload>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
#[repr(i32)]
pub enum OperationType {
    Subscribe = 0,
    Unsubscribe = 1,
    Post = 2,
    Handshake = 3,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
#[repr(i32)]
pub enum Channel {
    Priceupdate = 0,
    Priceposter = 1,
    Orderbookupdate = 2,
    Orderservice = 3,
}

impl Verify for WsData {
    fn verify(&self) -> Result<(), String> {
        Channel::try_from(self.channel)
            .map(|_| ())
            .map_err(|_| format!("channel: enum value expected, got {}", self.channel))
    }
}

impl Verify for Payload {
    fn verify(&self) -> Result<(), String> {
        OperationType::try_from(self.ops)
            .map_err(|_| format!("ops: enum value expected, got {}", self.ops))?;
        match &self.data {
            Some(data) => data.verify().map_err(|e| format!("data.{e}")),
            None => Ok(()),
        }
    }
}

impl Verify for WsMessage {
    fn verify(&self) -> Result<(), String> {
        match &self.payload {
            Some(payload) => payload.verify().map_err(|e| format!("payload.{e}")),
            None => Ok(()),
        }
    }
}
