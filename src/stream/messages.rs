use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::ingest::types::{IncomingTransaction, TransferEvent};

/// Body of a `subscribe` control message.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SubscribeRequest {
    /// Lower-case.
    pub address: String,
    pub chains: Vec<String>,
    pub events: Vec<String>,
}

/// Outbound control frames, serialized as `{"event": ..., "data": {...}}`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ControlMessage {
    Subscribe(SubscribeRequest),
    Unsubscribe { address: String },
}

impl ControlMessage {
    pub fn subscribe<I, S>(address: &str, chains: I, events: &[String]) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Subscribe(SubscribeRequest {
            address: address.to_ascii_lowercase(),
            chains: chains.into_iter().map(Into::into).collect(),
            events: events.to_vec(),
        })
    }

    pub fn unsubscribe(address: &str) -> Self {
        Self::Unsubscribe {
            address: address.to_ascii_lowercase(),
        }
    }

    pub fn address(&self) -> &str {
        match self {
            Self::Subscribe(req) => &req.address,
            Self::Unsubscribe { address } => address,
        }
    }

    pub fn to_json(&self) -> eyre::Result<String> {
        serde_json::to_string(self).map_err(|e| eyre::eyre!("Failed to encode control message: {}", e))
    }
}

#[derive(Debug, Deserialize)]
struct Envelope {
    event: String,
    #[serde(default)]
    data: JsonValue,
}

/// A decoded inbound feed event.
#[derive(Debug, Clone, PartialEq)]
pub enum FeedEvent {
    Transaction(IncomingTransaction),
    TokenTransfer(TransferEvent),
    NftTransfer(TransferEvent),
}

impl FeedEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Transaction(_) => "transaction",
            Self::TokenTransfer(_) => "token_transfer",
            Self::NftTransfer(_) => "nft_transfer",
        }
    }
}

/// Decode one text frame. Events this service does not handle yield `Ok(None)`;
/// malformed JSON or a malformed payload for a handled event is an error.
pub fn parse_feed_message(text: &str) -> eyre::Result<Option<FeedEvent>> {
    let envelope: Envelope = serde_json::from_str(text)
        .map_err(|e| eyre::eyre!("Invalid feed frame: {}", e))?;

    let event = match envelope.event.as_str() {
        "transaction" => FeedEvent::Transaction(decode(&envelope.event, envelope.data)?),
        "token_transfer" => FeedEvent::TokenTransfer(decode(&envelope.event, envelope.data)?),
        "nft_transfer" => FeedEvent::NftTransfer(decode(&envelope.event, envelope.data)?),
        _ => return Ok(None),
    };
    Ok(Some(event))
}

fn decode<T: serde::de::DeserializeOwned>(event: &str, data: JsonValue) -> eyre::Result<T> {
    serde_json::from_value(data).map_err(|e| eyre::eyre!("Invalid {} payload: {}", event, e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_subscribe_wire_format() {
        let events = vec!["transaction".to_string(), "nft_transfer".to_string()];
        let msg = ControlMessage::subscribe("0xABCD", ["ethereum", "base"], &events);
        let json: JsonValue = serde_json::from_str(&msg.to_json().unwrap()).unwrap();

        assert_eq!(json["event"], "subscribe");
        assert_eq!(json["data"]["address"], "0xabcd");
        assert_eq!(json["data"]["chains"][1], "base");
        assert_eq!(json["data"]["events"][0], "transaction");
    }

    #[test]
    fn test_unsubscribe_wire_format() {
        let json = serde_json::to_value(ControlMessage::unsubscribe("0xAB")).unwrap();
        assert_eq!(json, serde_json::json!({ "event": "unsubscribe", "data": { "address": "0xab" } }));
    }

    #[test]
    fn test_parse_transaction_event() {
        let text = r#"{"event":"transaction","data":{"chain":"ethereum","hash":"0x1","value":"10"}}"#;
        match parse_feed_message(text).unwrap() {
            Some(FeedEvent::Transaction(tx)) => {
                assert_eq!(tx.hash, "0x1");
                assert_eq!(tx.value.as_deref(), Some("10"));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_nft_event_normalizes() {
        let text = r#"{"event":"nft_transfer","data":{"chain":"ethereum","hash":"0x2","tokenId":7,"contractAddress":"0xcc"}}"#;
        let event = parse_feed_message(text).unwrap().unwrap();
        assert_eq!(event.kind(), "nft_transfer");
        match event {
            FeedEvent::NftTransfer(transfer) => {
                let tx = transfer.into_nft_transaction();
                assert_eq!(tx.nft_transfers.len(), 1);
                assert_eq!(tx.nft_transfers[0].token_id.as_deref(), Some("7"));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_unknown_and_malformed_frames() {
        assert!(parse_feed_message(r#"{"event":"subscribed","data":{}}"#).unwrap().is_none());
        assert!(parse_feed_message("not json").is_err());
        assert!(parse_feed_message(r#"{"event":"transaction","data":{"chain":"x"}}"#).is_err());
    }
}
