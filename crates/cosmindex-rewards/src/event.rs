//! Attribute parsing for the gas tracker's reward events.
//!
//! The upstream encoding is loose: string attributes arrive wrapped in JSON
//! quotes, numeric attributes are sometimes quoted, and coin amounts are
//! emitted either as a bare object or as a one-element array depending on
//! the module version. Every parser here normalizes before decoding and
//! fails the single event — never the block — when a required piece is
//! absent.

use serde::Deserialize;

use cosmindex_core::records::RewardCoin;
use cosmindex_core::types::u64_from_string;
use cosmindex_core::IngestError;

// ─── Event types ──────────────────────────────────────────────────────────────

pub const EVENT_REWARD_CALCULATION: &str = "archway.gastracker.v1.ContractRewardCalculationEvent";
pub const EVENT_REWARD_DISTRIBUTION: &str = "archway.gastracker.v1.RewardDistributionEvent";

// ─── Attribute keys ───────────────────────────────────────────────────────────

pub const ATTR_CONTRACT_ADDRESS: &str = "contract_address";
pub const ATTR_GAS_CONSUMED: &str = "gas_consumed";
pub const ATTR_CONTRACT_REWARDS: &str = "contract_rewards";
pub const ATTR_INFLATION_REWARDS: &str = "inflation_rewards";
pub const ATTR_METADATA: &str = "metadata";
pub const ATTR_REWARD_ADDRESS: &str = "reward_address";
pub const ATTR_LEFTOVER_REWARDS: &str = "leftover_rewards";

/// Strips the JSON quotes string-valued attributes arrive wrapped in.
pub fn strip_quotes(raw: &str) -> &str {
    raw.trim().trim_matches('"')
}

/// Parses a gas counter that may arrive quoted or otherwise decorated —
/// anything that is not a digit is dropped before parsing.
pub fn parse_gas_consumed(raw: &str) -> Result<u64, IngestError> {
    let digits: String = raw.chars().filter(|c| c.is_ascii_digit()).collect();
    if digits.is_empty() {
        return Err(IngestError::Decode(format!(
            "no numeric gas value in '{raw}'"
        )));
    }
    digits
        .parse()
        .map_err(|e| IngestError::Decode(format!("invalid gas value '{raw}': {e}")))
}

/// Decodes a reward coin attribute. The value is either a bare
/// `{denom, amount}` object or an array of them; both normalize to a list.
/// Amounts are kept as decimal strings whether the JSON carried a string or
/// a number.
pub fn parse_reward_coins(raw: &str) -> Result<Vec<RewardCoin>, IngestError> {
    #[derive(Deserialize)]
    struct RawCoin {
        denom: String,
        amount: serde_json::Value,
    }

    let trimmed = raw.trim();
    let normalized = if trimmed.starts_with('[') {
        trimmed.to_string()
    } else {
        format!("[{trimmed}]")
    };

    let coins: Vec<RawCoin> = serde_json::from_str(&normalized)
        .map_err(|e| IngestError::Decode(format!("invalid reward coins '{raw}': {e}")))?;
    if coins.is_empty() {
        return Err(IngestError::Decode(format!("empty reward coins '{raw}'")));
    }

    coins
        .into_iter()
        .map(|c| {
            let amount = match c.amount {
                serde_json::Value::String(s) => s,
                serde_json::Value::Number(n) => n.to_string(),
                other => {
                    return Err(IngestError::Decode(format!(
                        "unsupported reward amount encoding: {other}"
                    )))
                }
            };
            Ok(RewardCoin {
                denom: c.denom,
                amount,
            })
        })
        .collect()
}

/// The decoded metadata attribute of a calculation event.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RewardMetadata {
    pub reward_address: String,
    pub developer_address: String,
    #[serde(default)]
    pub gas_rebate_to_user: bool,
    #[serde(default)]
    pub collect_premium: bool,
    #[serde(default, deserialize_with = "u64_from_string")]
    pub premium_percentage_charged: u64,
}

/// Parses the nested metadata JSON. Returns the decoded fields plus the raw
/// attribute value, which is stored verbatim.
pub fn parse_metadata(raw: &str) -> Result<(RewardMetadata, String), IngestError> {
    let metadata: RewardMetadata = serde_json::from_str(raw)
        .map_err(|e| IngestError::Decode(format!("invalid reward metadata '{raw}': {e}")))?;
    Ok((metadata, raw.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strip_quotes_variants() {
        assert_eq!(strip_quotes("\"wasm1abc\""), "wasm1abc");
        assert_eq!(strip_quotes("wasm1abc"), "wasm1abc");
        assert_eq!(strip_quotes(" \"wasm1abc\" "), "wasm1abc");
    }

    #[test]
    fn gas_consumed_quoted_and_bare() {
        assert_eq!(parse_gas_consumed("\"123456\"").unwrap(), 123_456);
        assert_eq!(parse_gas_consumed("123456").unwrap(), 123_456);
        assert!(parse_gas_consumed("\"\"").is_err());
    }

    #[test]
    fn coins_object_and_array_forms_are_identical() {
        let object = r#"{"denom": "uarch", "amount": "12.345"}"#;
        let array = r#"[{"denom": "uarch", "amount": "12.345"}]"#;
        assert_eq!(
            parse_reward_coins(object).unwrap(),
            parse_reward_coins(array).unwrap()
        );
    }

    #[test]
    fn coin_amount_number_becomes_string() {
        let coins = parse_reward_coins(r#"{"denom": "uarch", "amount": 7.25}"#).unwrap();
        assert_eq!(coins[0].amount, "7.25");
    }

    #[test]
    fn empty_coins_are_rejected() {
        assert!(parse_reward_coins("[]").is_err());
        assert!(parse_reward_coins("not json").is_err());
    }

    #[test]
    fn metadata_requires_addresses() {
        let ok = r#"{
            "reward_address": "wasm1reward",
            "developer_address": "wasm1dev",
            "gas_rebate_to_user": true,
            "collect_premium": false,
            "premium_percentage_charged": "50"
        }"#;
        let (metadata, raw) = parse_metadata(ok).unwrap();
        assert_eq!(metadata.reward_address, "wasm1reward");
        assert_eq!(metadata.premium_percentage_charged, 50);
        assert!(metadata.gas_rebate_to_user);
        assert_eq!(raw, ok);

        // Missing reward_address must fail, never default to empty.
        assert!(parse_metadata(r#"{"developer_address": "wasm1dev"}"#).is_err());
    }
}
