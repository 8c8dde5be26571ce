//! Typed inbound events and the router that turns them into reactions.
//!
//! This is the boundary where per-guild feature toggles are consulted (through
//! [`FeatureGate`]); the ledger and moderation log below it never read guild config.
//! The router performs no transport I/O: it returns [`Reaction`] values and the
//! platform layer decides how to render and deliver them.

use crate::core::error::AetherError;
use crate::core::store::Store;
use crate::plugins::guild_config::{self, ChannelRoute, Feature, FeatureGate};
use crate::plugins::ledger;
use crate::plugins::moderation::{self, AutomodRules, Violation};
use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Seconds the automod removal notice stays visible.
pub const REMOVAL_NOTICE_TTL_SECS: u64 = 5;

/// An event delivered by the chat platform.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InboundEvent {
    /// A message was posted. `guild_id` is absent for direct messages.
    MessageCreated {
        guild_id: Option<String>,
        channel_id: String,
        author_id: String,
        #[serde(default)]
        author_is_bot: bool,
        content: String,
        #[serde(default)]
        mention_count: usize,
    },
    MemberJoined {
        guild_id: String,
        user_id: String,
        #[serde(default)]
        member_count: u64,
    },
    /// The bot was added to a guild.
    GuildJoined { guild_id: String },
}

/// Something the platform layer should do in response to an event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Reaction {
    /// Delete the message and post a short-lived notice in its channel.
    MessageRemoved {
        guild_id: String,
        channel_id: String,
        user_id: String,
        violation: Violation,
        notice_ttl_secs: u64,
        alert_channel: Option<String>,
    },
    LevelUp {
        guild_id: String,
        channel_id: String,
        user_id: String,
        level: i64,
        xp: i64,
        next_threshold: i64,
        coins_awarded: i64,
    },
    Welcome {
        guild_id: String,
        channel_id: String,
        user_id: String,
        member_count: u64,
    },
    /// Ask the guild owner to run setup.
    SetupPrompt { guild_id: String },
}

pub struct EventRouter<'a, G: FeatureGate> {
    store: &'a Store,
    gate: G,
    rules: AutomodRules,
}

impl<'a, G: FeatureGate> EventRouter<'a, G> {
    pub fn new(store: &'a Store, gate: G, rules: AutomodRules) -> Self {
        Self { store, gate, rules }
    }

    pub fn handle<R: Rng + ?Sized>(
        &self,
        event: &InboundEvent,
        rng: &mut R,
    ) -> Result<Vec<Reaction>, AetherError> {
        match event {
            InboundEvent::MessageCreated {
                guild_id,
                channel_id,
                author_id,
                author_is_bot,
                content,
                mention_count,
            } => {
                let Some(guild_id) = guild_id else {
                    return Ok(Vec::new());
                };
                if *author_is_bot {
                    return Ok(Vec::new());
                }
                let gain = rng.gen_range(ledger::XP_GAIN_MIN..=ledger::XP_GAIN_MAX);
                self.on_message(guild_id, channel_id, author_id, content, *mention_count, gain)
            }
            InboundEvent::MemberJoined {
                guild_id,
                user_id,
                member_count,
            } => self.on_member_join(guild_id, user_id, *member_count),
            InboundEvent::GuildJoined { guild_id } => {
                guild_config::get_guild_config(self.store, guild_id)?;
                info!(guild_id = %guild_id, "joined guild");
                Ok(vec![Reaction::SetupPrompt {
                    guild_id: guild_id.clone(),
                }])
            }
        }
    }

    /// Message handling with the XP gain already drawn.
    ///
    /// Automod runs first; a removed message still earns XP. Messages that
    /// start with the guild's command prefix are commands and earn no XP.
    pub fn on_message(
        &self,
        guild_id: &str,
        channel_id: &str,
        author_id: &str,
        content: &str,
        mention_count: usize,
        gain: i64,
    ) -> Result<Vec<Reaction>, AetherError> {
        let config = self.gate.guild_config(guild_id)?;
        let mut reactions = Vec::new();

        if config.is_enabled(Feature::Automod) {
            if let Some(violation) = self.rules.scan(content, mention_count) {
                moderation::log_automod_action(
                    self.store,
                    author_id,
                    guild_id,
                    moderation::AUTOMOD_ACTION_DELETE,
                    moderation::AUTOMOD_REASON_SPAM,
                )?;
                info!(guild_id, author_id, %violation, "automod removed message");
                reactions.push(Reaction::MessageRemoved {
                    guild_id: guild_id.to_string(),
                    channel_id: channel_id.to_string(),
                    user_id: author_id.to_string(),
                    violation,
                    notice_ttl_secs: REMOVAL_NOTICE_TTL_SECS,
                    alert_channel: config.channel(ChannelRoute::Automod).map(str::to_string),
                });
            }
        }

        if config.is_enabled(Feature::Xp) && !content.starts_with(config.prefix.as_str()) {
            let result = ledger::record_activity_with_gain(self.store, author_id, guild_id, gain)?;
            if result.leveled_up {
                reactions.push(Reaction::LevelUp {
                    guild_id: guild_id.to_string(),
                    channel_id: channel_id.to_string(),
                    user_id: author_id.to_string(),
                    level: result.level,
                    xp: result.xp,
                    next_threshold: ledger::level_threshold(result.level),
                    coins_awarded: result.coins_awarded,
                });
            }
        } else {
            debug!(guild_id, author_id, "message earns no xp");
        }
        Ok(reactions)
    }

    fn on_member_join(
        &self,
        guild_id: &str,
        user_id: &str,
        member_count: u64,
    ) -> Result<Vec<Reaction>, AetherError> {
        let config = self.gate.guild_config(guild_id)?;
        if !config.is_enabled(Feature::Welcome) {
            return Ok(Vec::new());
        }
        let Some(channel_id) = config.channel(ChannelRoute::Welcome) else {
            return Ok(Vec::new());
        };
        Ok(vec![Reaction::Welcome {
            guild_id: guild_id.to_string(),
            channel_id: channel_id.to_string(),
            user_id: user_id.to_string(),
            member_count,
        }])
    }
}
