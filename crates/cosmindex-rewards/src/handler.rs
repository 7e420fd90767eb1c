//! Event handlers for reward calculation and distribution.

use async_trait::async_trait;
use tracing::debug;

use cosmindex_core::records::{RewardCalculationRecord, RewardDistributionRecord};
use cosmindex_core::types::{BlockPhase, Event, Height};
use cosmindex_core::{DispatchContext, EventHandler, IngestError};

use crate::event::{
    parse_gas_consumed, parse_metadata, parse_reward_coins, strip_quotes, ATTR_CONTRACT_ADDRESS,
    ATTR_CONTRACT_REWARDS, ATTR_GAS_CONSUMED, ATTR_INFLATION_REWARDS, ATTR_LEFTOVER_REWARDS,
    ATTR_METADATA, ATTR_REWARD_ADDRESS, EVENT_REWARD_CALCULATION, EVENT_REWARD_DISTRIBUTION,
};

/// Turns the gas tracker's begin-block events into reward records.
///
/// The tracking module accounts for block N inside block N+1's begin-block,
/// so every record is stored at the observed height minus one. That
/// correction is an invariant of the upstream module, not a bug here.
#[derive(Default)]
pub struct RewardEventHandler;

impl RewardEventHandler {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl EventHandler for RewardEventHandler {
    fn name(&self) -> &'static str {
        "rewards"
    }

    async fn handle_event(
        &self,
        event: &Event,
        phase: BlockPhase,
        height: Height,
        ctx: &DispatchContext,
    ) -> Result<(), IngestError> {
        if phase != BlockPhase::BeginBlock {
            return Ok(());
        }
        match event.kind.as_str() {
            EVENT_REWARD_CALCULATION => self.handle_calculation(event, height, ctx).await,
            EVENT_REWARD_DISTRIBUTION => self.handle_distribution(event, height, ctx).await,
            _ => Ok(()),
        }
    }
}

impl RewardEventHandler {
    fn require<'a>(event: &'a Event, key: &str) -> Result<&'a str, IngestError> {
        event
            .attribute(key)
            .ok_or_else(|| IngestError::MissingAttribute {
                event_type: event.kind.clone(),
                key: key.to_string(),
            })
    }

    async fn handle_calculation(
        &self,
        event: &Event,
        height: Height,
        ctx: &DispatchContext,
    ) -> Result<(), IngestError> {
        let contract_address = strip_quotes(Self::require(event, ATTR_CONTRACT_ADDRESS)?);
        let (metadata, metadata_raw) = parse_metadata(Self::require(event, ATTR_METADATA)?)?;
        let gas_consumed = parse_gas_consumed(Self::require(event, ATTR_GAS_CONSUMED)?)?;
        let contract_rewards = parse_reward_coins(Self::require(event, ATTR_CONTRACT_REWARDS)?)?;
        let inflation_rewards = parse_reward_coins(Self::require(event, ATTR_INFLATION_REWARDS)?)?;

        let record = RewardCalculationRecord {
            contract_address: contract_address.to_string(),
            reward_address: metadata.reward_address,
            developer_address: metadata.developer_address,
            gas_consumed,
            contract_rewards,
            inflation_rewards,
            collect_premium: metadata.collect_premium,
            gas_rebate_to_user: metadata.gas_rebate_to_user,
            premium_percentage_charged: metadata.premium_percentage_charged,
            metadata: metadata_raw,
            // Emitted in block N for the rewards of block N-1.
            height: height - 1,
        };

        debug!(
            contract = %record.contract_address,
            height = record.height,
            gas = record.gas_consumed,
            "saving reward calculation"
        );
        ctx.store.save_contract_reward_calculation(&record).await
    }

    async fn handle_distribution(
        &self,
        event: &Event,
        height: Height,
        ctx: &DispatchContext,
    ) -> Result<(), IngestError> {
        // Which key identifies the row differs between event shapes; take
        // whichever is present, requiring at least one.
        let reward_address = event
            .attribute(ATTR_REWARD_ADDRESS)
            .map(strip_quotes)
            .unwrap_or_default();
        let contract_address = event
            .attribute(ATTR_CONTRACT_ADDRESS)
            .map(strip_quotes)
            .unwrap_or_default();
        if reward_address.is_empty() && contract_address.is_empty() {
            return Err(IngestError::MissingAttribute {
                event_type: event.kind.clone(),
                key: ATTR_REWARD_ADDRESS.to_string(),
            });
        }

        let distributed_rewards =
            parse_reward_coins(Self::require(event, ATTR_CONTRACT_REWARDS)?)?;
        let leftover_rewards = parse_reward_coins(Self::require(event, ATTR_LEFTOVER_REWARDS)?)?;

        let record = RewardDistributionRecord {
            contract_address: contract_address.to_string(),
            reward_address: reward_address.to_string(),
            distributed_rewards,
            leftover_rewards,
            height: height - 1,
        };

        debug!(
            reward_address = %record.reward_address,
            height = record.height,
            "saving reward distribution"
        );
        ctx.store.save_contract_reward_distribution(&record).await
    }
}
