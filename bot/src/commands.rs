use crate::marketplace::Marketplace;
use crate::monitor::{
    InvalidConfig, Match, MatchSink, Monitor, StartOutcome, StopOutcome, BATCH_SIZE,
};
use anyhow::Result;
use async_trait::async_trait;
use derive_more::{Display, From};
use log::{info, warn};
use opensea::TokenId;
use rust_decimal::Decimal;
use std::collections::HashSet;
use std::sync::Arc;

const NOT_AUTHORIZED: &str = "⚠️ You're not authorized to use this bot.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, From)]
pub struct UserId(pub i64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, From)]
pub struct ChatId(pub i64);

/// Outgoing side of the chat transport.
#[async_trait]
pub trait Outbox: Send + Sync {
    async fn send(&self, chat: ChatId, text: &str) -> Result<()>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Menu,
    StartMonitor,
    StopMonitor,
    FloorPrice,
    Settings,
    SetMultiplier(Option<String>),
    SetInterval(Option<String>),
    Buy(TokenId),
}

impl Command {
    /// Parses a chat message or button payload. Unknown input yields `None`.
    pub fn parse(text: &str) -> Option<Self> {
        let mut words = text.split_whitespace();
        let head = words.next()?;
        let head = head.strip_prefix('/').unwrap_or(head);
        let head = head.split('@').next().unwrap_or(head);
        let arg = words.next().map(str::to_string);

        let command = match head {
            "start" => Self::Menu,
            "start_monitor" => Self::StartMonitor,
            "stop_monitor" => Self::StopMonitor,
            "floor_price" => Self::FloorPrice,
            "settings" => Self::Settings,
            "set_multiplier" => Self::SetMultiplier(arg),
            "set_interval" => Self::SetInterval(arg),
            _ => {
                let token_id = head.strip_prefix("buy_").filter(|id| !id.is_empty())?;
                Self::Buy(token_id.into())
            }
        };

        Some(command)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub text: String,
    /// Attach the main menu keyboard.
    pub menu: bool,
}

impl Reply {
    fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            menu: false,
        }
    }

    fn menu(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            menu: true,
        }
    }
}

pub fn format_match(found: &Match) -> String {
    format!(
        "🎯 Found matching NFT!\n\n\
         🔹 Token ID: {}\n\
         💰 Price: {} ETH\n\
         📊 Floor Price: {} ETH\n\
         🔗 Link: {}\n\n\
         🛍️ Want to buy? Use /buy_{}",
        found.token_id, found.price, found.floor_price, found.link, found.token_id
    )
}

/// Forwards matches to the chat that started monitoring.
struct ChatSink {
    outbox: Arc<dyn Outbox>,
    chat: ChatId,
}

#[async_trait]
impl MatchSink for ChatSink {
    async fn notify(&self, found: Match) {
        if let Err(e) = self.outbox.send(self.chat, &format_match(&found)).await {
            warn!("Failed to deliver match for token {}: {e}", found.token_id);
        }
    }
}

pub struct CommandHandler<M> {
    monitor: Monitor<M>,
    market: Arc<M>,
    outbox: Arc<dyn Outbox>,
    allowed_users: HashSet<UserId>,
}

impl<M: Marketplace> CommandHandler<M> {
    pub fn new(
        monitor: Monitor<M>,
        market: Arc<M>,
        outbox: Arc<dyn Outbox>,
        allowed_users: HashSet<UserId>,
    ) -> Self {
        Self {
            monitor,
            market,
            outbox,
            allowed_users,
        }
    }

    pub async fn handle(&self, caller: UserId, chat: ChatId, command: Command) -> Reply {
        if !self.allowed_users.contains(&caller) {
            warn!("Rejected {command:?} from unauthorized user {caller}");
            return Reply::text(NOT_AUTHORIZED);
        }

        info!("Handling {command:?} from user {caller}");

        match command {
            Command::Menu => {
                Reply::menu("🎯 Welcome to My Little Sniper!\nWhat would you like to do?")
            }
            Command::StartMonitor => self.start_monitor(chat).await,
            Command::StopMonitor => self.stop_monitor().await,
            Command::FloorPrice => self.floor_price().await,
            Command::Settings => self.settings(),
            Command::SetMultiplier(arg) => self.set_multiplier(arg.as_deref()),
            Command::SetInterval(arg) => self.set_interval(arg.as_deref()),
            Command::Buy(token_id) => self.buy(chat, token_id).await,
        }
    }

    async fn start_monitor(&self, chat: ChatId) -> Reply {
        let sink = Arc::new(ChatSink {
            outbox: self.outbox.clone(),
            chat,
        });

        match self.monitor.start(sink).await {
            StartOutcome::Started => Reply::text(
                "🟢 Monitoring started! You'll receive notifications for potential snipes.",
            ),
            StartOutcome::AlreadyRunning => Reply::text("⚠️ Monitoring is already running!"),
        }
    }

    async fn stop_monitor(&self) -> Reply {
        match self.monitor.stop().await {
            StopOutcome::Stopped => Reply::text("🔴 Monitoring stopped."),
            StopOutcome::NotRunning => Reply::text("⚠️ Monitoring is not running!"),
        }
    }

    async fn floor_price(&self) -> Reply {
        let Some(floor_price) = self.market.floor_price().await else {
            return Reply::text("❌ Couldn't fetch floor price. Please try again later.");
        };

        match floor_price.checked_mul(self.monitor.config().multiplier()) {
            Some(ceiling) => Reply::text(format!(
                "💰 Current floor price: {floor_price} ETH\n🎯 Maximum purchase price: {ceiling} ETH"
            )),
            None => Reply::text(format!("💰 Current floor price: {floor_price} ETH")),
        }
    }

    fn settings(&self) -> Reply {
        let config = self.monitor.config();
        Reply::text(format!(
            "⚙️ Current Settings:\n\n\
             📈 Max price multiplier: {}x\n\
             ⏱️ Check interval: {} seconds\n\n\
             Commands:\n\
             📝 /set_multiplier <value> - Set max price multiplier\n\
             ⏰ /set_interval <seconds> - Set check interval",
            config.multiplier(),
            config.interval_secs()
        ))
    }

    fn set_multiplier(&self, arg: Option<&str>) -> Reply {
        let Some(value) = arg.and_then(|a| a.parse::<Decimal>().ok()) else {
            return Reply::text("❌ Please provide a valid number (e.g., /set_multiplier 1.1)");
        };

        match self.monitor.config().set_multiplier(value) {
            Ok(()) => Reply::text(format!("✅ Max price multiplier set to {value}x")),
            Err(e) => Reply::text(format!("⚠️ {e}")),
        }
    }

    fn set_interval(&self, arg: Option<&str>) -> Reply {
        let Some(value) = arg.and_then(|a| a.parse::<i64>().ok()) else {
            return Reply::text(
                "❌ Please provide a valid number in seconds (e.g., /set_interval 60)",
            );
        };

        let result = u64::try_from(value)
            .map_err(|_| InvalidConfig::Interval)
            .and_then(|secs| self.monitor.config().set_interval(secs));

        match result {
            Ok(()) => Reply::text(format!("✅ Check interval set to {value} seconds")),
            Err(e) => Reply::text(format!("⚠️ {e}")),
        }
    }

    async fn buy(&self, chat: ChatId, token_id: TokenId) -> Reply {
        let listing = self
            .market
            .listings(BATCH_SIZE)
            .await
            .into_iter()
            .find(|listing| listing.token_id == token_id);

        let Some(listing) = listing else {
            return Reply::text("❌ Listing not found or already sold.");
        };

        if let Err(e) = self.outbox.send(chat, "🔄 Attempting to purchase...").await {
            warn!("Failed to send purchase progress: {e}");
        }

        let result = self.market.buy(&listing).await;
        match result.transaction_id {
            Some(tx) if result.success => Reply::text(format!(
                "✅ Successfully purchased NFT {token_id}!\n🔗 Transaction hash: {tx}"
            )),
            _ => {
                let reason = result.reason.as_deref().unwrap_or("unknown reason");
                warn!("Purchase of {token_id} failed: {reason}");
                Reply::text(format!("❌ Purchase failed: {reason}. Please try again."))
            }
        }
    }

    /// Stops monitoring ahead of process exit.
    pub async fn shutdown(&self) {
        if self.monitor.stop().await == StopOutcome::Stopped {
            info!("Stopped monitoring for shutdown");
        }
    }
}
