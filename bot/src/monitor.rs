//! The listing monitor: a single cooperative polling task that can be started
//! and stopped from commands while its tunables are changed underneath it.

use crate::marketplace::Marketplace;
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use log::{debug, error, info, warn};
use opensea::TokenId;
use rust_decimal::Decimal;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{Mutex, Notify};
use tokio::task::JoinHandle;
use tokio::time::sleep;

pub const BATCH_SIZE: usize = 50;
pub const MIN_INTERVAL_SECS: u64 = 30;
pub const MAX_INTERVAL_SECS: u64 = 3600;
const MAX_MULTIPLIER: Decimal = Decimal::TWO;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvalidConfig {
    #[error("Multiplier must be between 0 and 2")]
    Multiplier,

    #[error("Interval must be between 30 and 3600 seconds")]
    Interval,
}

pub fn validate_multiplier(value: Decimal) -> Result<Decimal, InvalidConfig> {
    if value <= Decimal::ZERO || value > MAX_MULTIPLIER {
        return Err(InvalidConfig::Multiplier);
    }
    Ok(value)
}

pub fn validate_interval(secs: u64) -> Result<u64, InvalidConfig> {
    if !(MIN_INTERVAL_SECS..=MAX_INTERVAL_SECS).contains(&secs) {
        return Err(InvalidConfig::Interval);
    }
    Ok(secs)
}

/// Tunables read once at the top of every poll cycle. Each field is replaced
/// on its own; a running cycle keeps the values it started with.
#[derive(Debug)]
pub struct MonitorConfig {
    multiplier: RwLock<Decimal>,
    interval_secs: AtomicU64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct Snapshot {
    multiplier: Decimal,
    interval: Duration,
}

impl MonitorConfig {
    pub fn new(multiplier: Decimal, interval_secs: u64) -> Result<Self, InvalidConfig> {
        Ok(Self {
            multiplier: RwLock::new(validate_multiplier(multiplier)?),
            interval_secs: AtomicU64::new(validate_interval(interval_secs)?),
        })
    }

    pub fn multiplier(&self) -> Decimal {
        *self
            .multiplier
            .read()
            .unwrap_or_else(PoisonError::into_inner)
    }

    pub fn interval_secs(&self) -> u64 {
        self.interval_secs.load(Ordering::SeqCst)
    }

    pub fn set_multiplier(&self, value: Decimal) -> Result<(), InvalidConfig> {
        let value = validate_multiplier(value)?;
        *self
            .multiplier
            .write()
            .unwrap_or_else(PoisonError::into_inner) = value;
        Ok(())
    }

    pub fn set_interval(&self, secs: u64) -> Result<(), InvalidConfig> {
        self.interval_secs
            .store(validate_interval(secs)?, Ordering::SeqCst);
        Ok(())
    }

    fn snapshot(&self) -> Snapshot {
        Snapshot {
            multiplier: self.multiplier(),
            interval: Duration::from_secs(self.interval_secs()),
        }
    }
}

/// A listing under the price ceiling that carries the wanted trait.
#[derive(Debug, Clone, PartialEq)]
pub struct Match {
    pub token_id: TokenId,
    pub price: Decimal,
    pub floor_price: Decimal,
    pub link: String,
}

/// Receives matches from the poll cycle. Delivery is fire-and-forget.
#[async_trait]
pub trait MatchSink: Send + Sync {
    async fn notify(&self, found: Match);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartOutcome {
    Started,
    AlreadyRunning,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopOutcome {
    Stopped,
    NotRunning,
}

/// Cancellation flag shared between the monitor and one poll task.
struct StopSignal {
    running: AtomicBool,
    notify: Notify,
}

impl StopSignal {
    fn new() -> Self {
        Self {
            running: AtomicBool::new(true),
            notify: Notify::new(),
        }
    }

    fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
        self.notify.notify_one();
    }

    /// Sleeps for `duration` unless stopped first. Returns whether to keep going.
    async fn sleep(&self, duration: Duration) -> bool {
        tokio::select! {
            _ = sleep(duration) => self.is_running(),
            _ = self.notify.notified() => false,
        }
    }
}

struct PollTask {
    signal: Arc<StopSignal>,
    handle: JoinHandle<()>,
}

impl PollTask {
    fn is_live(&self) -> bool {
        !self.handle.is_finished()
    }
}

/// One pass over the market: floor price, ceiling, ascending listings.
pub struct Scanner<M> {
    market: Arc<M>,
    config: Arc<MonitorConfig>,
    trait_name: String,
}

impl<M: Marketplace> Scanner<M> {
    pub fn new(market: Arc<M>, config: Arc<MonitorConfig>, trait_name: impl Into<String>) -> Self {
        Self {
            market,
            config,
            trait_name: trait_name.into(),
        }
    }

    /// Runs one poll cycle with the given multiplier and returns the number of matches sent.
    ///
    /// `keep_going` is consulted before each listing so a stop request ends the scan early.
    pub async fn poll_once(
        &self,
        multiplier: Decimal,
        sink: &dyn MatchSink,
        keep_going: impl Fn() -> bool + Send + Sync,
    ) -> Result<usize> {
        let Some(floor_price) = self.market.floor_price().await else {
            debug!("Floor price unavailable, retrying next cycle");
            return Ok(0);
        };

        let ceiling = floor_price
            .checked_mul(multiplier)
            .ok_or_else(|| anyhow!("Price ceiling overflows for floor {floor_price} x {multiplier}"))?;

        let listings = self.market.listings(BATCH_SIZE).await;
        debug!(
            "Scanning {} listings, floor {floor_price}, ceiling {ceiling}",
            listings.len()
        );

        let mut matches = 0;
        for listing in listings {
            if !keep_going() {
                break;
            }
            if listing.price > ceiling {
                break;
            }
            if self
                .market
                .has_trait(&listing.token_id, &self.trait_name)
                .await
            {
                info!(
                    "Found token {} at {} (floor {floor_price})",
                    listing.token_id, listing.price
                );
                let link = self.market.asset_url(&listing.token_id);
                sink.notify(Match {
                    token_id: listing.token_id,
                    price: listing.price,
                    floor_price,
                    link,
                })
                .await;
                matches += 1;
            }
        }

        Ok(matches)
    }

    async fn run(self: Arc<Self>, sink: Arc<dyn MatchSink>, signal: Arc<StopSignal>) {
        info!("Monitoring task started");

        while signal.is_running() {
            let Snapshot {
                multiplier,
                interval,
            } = self.config.snapshot();

            if let Err(e) = self
                .poll_once(multiplier, sink.as_ref(), || signal.is_running())
                .await
            {
                error!("Error in monitor loop: {e}");
            }

            if !signal.sleep(interval).await {
                break;
            }
        }

        info!("Monitoring task stopped");
    }
}

/// Owns the scanner and at most one live poll task.
pub struct Monitor<M> {
    scanner: Arc<Scanner<M>>,
    task: Mutex<Option<PollTask>>,
}

impl<M: Marketplace> Monitor<M> {
    pub fn new(scanner: Scanner<M>) -> Self {
        Self {
            scanner: Arc::new(scanner),
            task: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &MonitorConfig {
        &self.scanner.config
    }

    pub async fn is_running(&self) -> bool {
        self.task.lock().await.as_ref().is_some_and(PollTask::is_live)
    }

    /// Launches the poll task unless one is already live. Returns without waiting for it.
    pub async fn start(&self, sink: Arc<dyn MatchSink>) -> StartOutcome {
        let mut task = self.task.lock().await;

        if task.as_ref().is_some_and(PollTask::is_live) {
            warn!("Monitoring is already running");
            return StartOutcome::AlreadyRunning;
        }

        let signal = Arc::new(StopSignal::new());
        let handle = tokio::spawn(self.scanner.clone().run(sink, signal.clone()));
        *task = Some(PollTask { signal, handle });

        info!("Monitoring started");
        StartOutcome::Started
    }

    /// Signals the poll task and waits for it to leave its current suspension point.
    pub async fn stop(&self) -> StopOutcome {
        let mut task = self.task.lock().await;

        match task.take() {
            Some(poll) if poll.is_live() => {
                poll.signal.stop();
                if let Err(e) = poll.handle.await {
                    error!("Monitoring task ended abnormally: {e}");
                }
                info!("Monitoring stopped");
                StopOutcome::Stopped
            }
            _ => {
                warn!("Monitoring is not running");
                StopOutcome::NotRunning
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use opensea::{Listing, PurchaseDescriptor, PurchaseResult};
    use rust_decimal_macros::dec;
    use std::collections::HashSet;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Mutex as StdMutex;

    /// In-process market with instrumentation on every call.
    #[derive(Default)]
    pub(crate) struct FakeMarket {
        pub floor: StdMutex<Option<Decimal>>,
        pub listings: StdMutex<Vec<Listing>>,
        pub with_trait: StdMutex<HashSet<String>>,
        pub trait_checks: StdMutex<Vec<String>>,
        pub purchases: StdMutex<Vec<String>>,
        pub purchase_result: StdMutex<Option<PurchaseResult>>,
        pub floor_calls: AtomicUsize,
        active: AtomicUsize,
        pub max_active: AtomicUsize,
    }

    impl FakeMarket {
        pub(crate) fn new(floor: Option<Decimal>, listings: &[(&str, Decimal)], with_trait: &[&str]) -> Self {
            let market = Self::default();
            *market.floor.lock().unwrap() = floor;
            *market.listings.lock().unwrap() = listings
                .iter()
                .map(|(id, price)| Listing::new((*id).into(), *price, PurchaseDescriptor::default()))
                .collect();
            *market.with_trait.lock().unwrap() = with_trait.iter().map(|id| id.to_string()).collect();
            market
        }
    }

    #[async_trait]
    impl Marketplace for FakeMarket {
        async fn floor_price(&self) -> Option<Decimal> {
            self.floor_calls.fetch_add(1, Ordering::SeqCst);
            let active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_active.fetch_max(active, Ordering::SeqCst);
            sleep(Duration::from_millis(10)).await;
            self.active.fetch_sub(1, Ordering::SeqCst);
            *self.floor.lock().unwrap()
        }

        async fn listings(&self, limit: usize) -> Vec<Listing> {
            let listings = self.listings.lock().unwrap();
            listings.iter().take(limit).cloned().collect()
        }

        async fn has_trait(&self, token_id: &TokenId, _name: &str) -> bool {
            self.trait_checks.lock().unwrap().push(token_id.to_string());
            self.with_trait.lock().unwrap().contains(token_id.as_str())
        }

        async fn buy(&self, listing: &Listing) -> PurchaseResult {
            self.purchases.lock().unwrap().push(listing.token_id.to_string());
            self.purchase_result
                .lock()
                .unwrap()
                .clone()
                .unwrap_or_else(|| PurchaseResult::failed("no result configured"))
        }

        fn asset_url(&self, token_id: &TokenId) -> String {
            format!("https://opensea.io/assets/ethereum/0xc0ffee/{token_id}")
        }
    }

    #[derive(Default)]
    pub(crate) struct CollectSink {
        pub found: StdMutex<Vec<Match>>,
    }

    impl CollectSink {
        pub(crate) fn tokens(&self) -> Vec<String> {
            self.found
                .lock()
                .unwrap()
                .iter()
                .map(|m| m.token_id.to_string())
                .collect()
        }
    }

    #[async_trait]
    impl MatchSink for CollectSink {
        async fn notify(&self, found: Match) {
            self.found.lock().unwrap().push(found);
        }
    }

    fn monitor(market: Arc<FakeMarket>, multiplier: Decimal, interval: u64) -> Monitor<FakeMarket> {
        let config = Arc::new(MonitorConfig::new(multiplier, interval).unwrap());
        Monitor::new(Scanner::new(market, config, "accessories"))
    }

    fn scenario_market() -> Arc<FakeMarket> {
        Arc::new(FakeMarket::new(
            Some(dec!(1.0)),
            &[("A", dec!(0.9)), ("B", dec!(1.05)), ("C", dec!(1.2))],
            &["B", "C"],
        ))
    }

    #[tokio::test]
    async fn test_scan_stops_at_ceiling() {
        let market = scenario_market();
        let config = Arc::new(MonitorConfig::new(dec!(1.1), 60).unwrap());
        let scanner = Scanner::new(market.clone(), config, "accessories");
        let sink = CollectSink::default();

        let matches = scanner.poll_once(dec!(1.1), &sink, || true).await.unwrap();

        assert_eq!(matches, 1);
        assert_eq!(sink.tokens(), vec!["B"]);
        assert_eq!(*market.trait_checks.lock().unwrap(), vec!["A", "B"]);

        let found = &sink.found.lock().unwrap()[0];
        assert_eq!(found.price, dec!(1.05));
        assert_eq!(found.floor_price, dec!(1.0));
        assert!(found.link.ends_with("/B"));
    }

    #[tokio::test]
    async fn test_scan_notifies_every_match_under_ceiling() {
        let market = Arc::new(FakeMarket::new(
            Some(dec!(2)),
            &[("1", dec!(1)), ("2", dec!(1.5)), ("3", dec!(2)), ("4", dec!(2.5))],
            &["1", "2", "3", "4"],
        ));
        let config = Arc::new(MonitorConfig::new(dec!(1), 60).unwrap());
        let scanner = Scanner::new(market, config, "accessories");
        let sink = CollectSink::default();

        scanner.poll_once(dec!(1), &sink, || true).await.unwrap();

        assert_eq!(sink.tokens(), vec!["1", "2", "3"]);
    }

    #[tokio::test]
    async fn test_scan_without_floor_price() {
        let market = Arc::new(FakeMarket::new(None, &[("A", dec!(0.1))], &["A"]));
        let config = Arc::new(MonitorConfig::new(dec!(1.1), 60).unwrap());
        let scanner = Scanner::new(market.clone(), config, "accessories");
        let sink = CollectSink::default();

        assert_eq!(scanner.poll_once(dec!(1.1), &sink, || true).await.unwrap(), 0);
        assert!(sink.tokens().is_empty());
        assert!(market.trait_checks.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_scan_honours_stop_between_listings() {
        let market = scenario_market();
        let config = Arc::new(MonitorConfig::new(dec!(1.1), 60).unwrap());
        let scanner = Scanner::new(market.clone(), config, "accessories");
        let sink = CollectSink::default();

        scanner.poll_once(dec!(1.1), &sink, || false).await.unwrap();

        assert!(market.trait_checks.lock().unwrap().is_empty());
    }

    #[test]
    fn test_set_multiplier_out_of_range() {
        let config = MonitorConfig::new(dec!(1.1), 60).unwrap();

        for bad in [dec!(0), dec!(-1), dec!(2.0001), dec!(3)] {
            assert_eq!(config.set_multiplier(bad), Err(InvalidConfig::Multiplier));
            assert_eq!(config.multiplier(), dec!(1.1));
        }

        config.set_multiplier(dec!(2)).unwrap();
        assert_eq!(config.multiplier(), dec!(2));
    }

    #[test]
    fn test_set_interval_out_of_range() {
        let config = MonitorConfig::new(dec!(1.1), 60).unwrap();

        for bad in [0, 29, 3601] {
            assert_eq!(config.set_interval(bad), Err(InvalidConfig::Interval));
            assert_eq!(config.interval_secs(), 60);
        }

        config.set_interval(30).unwrap();
        config.set_interval(3600).unwrap();
        assert_eq!(config.interval_secs(), 3600);
    }

    #[test]
    fn test_config_rejects_invalid_defaults() {
        assert!(MonitorConfig::new(dec!(0), 60).is_err());
        assert!(MonitorConfig::new(dec!(1), 10).is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_twice_keeps_one_cycle() {
        let market = scenario_market();
        let monitor = monitor(market.clone(), dec!(1.1), 30);
        let sink = Arc::new(CollectSink::default());

        assert_eq!(monitor.start(sink.clone()).await, StartOutcome::Started);
        assert_eq!(monitor.start(sink.clone()).await, StartOutcome::AlreadyRunning);
        assert!(monitor.is_running().await);

        sleep(Duration::from_secs(95)).await;

        assert_eq!(market.max_active.load(Ordering::SeqCst), 1);
        assert_eq!(market.floor_calls.load(Ordering::SeqCst), 4);
        assert_eq!(sink.tokens(), vec!["B"; 4]);

        assert_eq!(monitor.stop().await, StopOutcome::Stopped);
        assert!(!monitor.is_running().await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_when_not_running() {
        let monitor = monitor(scenario_market(), dec!(1.1), 30);

        assert_eq!(monitor.stop().await, StopOutcome::NotRunning);

        monitor.start(Arc::new(CollectSink::default())).await;
        assert_eq!(monitor.stop().await, StopOutcome::Stopped);
        assert_eq!(monitor.stop().await, StopOutcome::NotRunning);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_ends_sleep_and_allows_restart() {
        let market = scenario_market();
        let monitor = monitor(market.clone(), dec!(1.1), 3600);
        let sink = Arc::new(CollectSink::default());

        monitor.start(sink.clone()).await;
        sleep(Duration::from_secs(1)).await;
        assert_eq!(market.floor_calls.load(Ordering::SeqCst), 1);

        assert_eq!(monitor.stop().await, StopOutcome::Stopped);
        assert_eq!(monitor.start(sink.clone()).await, StartOutcome::Started);
        sleep(Duration::from_secs(1)).await;

        assert_eq!(market.floor_calls.load(Ordering::SeqCst), 2);
        assert_eq!(market.max_active.load(Ordering::SeqCst), 1);
        monitor.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_floor_fetch_keeps_polling() {
        let market = Arc::new(FakeMarket::new(None, &[("A", dec!(0.1))], &["A"]));
        let monitor = monitor(market.clone(), dec!(1.1), 30);
        let sink = Arc::new(CollectSink::default());

        monitor.start(sink.clone()).await;
        sleep(Duration::from_secs(65)).await;

        assert_eq!(market.floor_calls.load(Ordering::SeqCst), 3);
        assert!(sink.tokens().is_empty());
        assert!(monitor.is_running().await);

        *market.floor.lock().unwrap() = Some(dec!(1));
        sleep(Duration::from_secs(30)).await;
        assert_eq!(sink.tokens(), vec!["A"]);
        monitor.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_cycle_error_keeps_polling() {
        let market = scenario_market();
        *market.floor.lock().unwrap() = Some(Decimal::MAX);
        let monitor = monitor(market.clone(), dec!(2), 30);
        let sink = Arc::new(CollectSink::default());

        monitor.start(sink.clone()).await;
        sleep(Duration::from_secs(1)).await;

        assert_eq!(market.floor_calls.load(Ordering::SeqCst), 1);
        assert!(market.trait_checks.lock().unwrap().is_empty());
        assert!(monitor.is_running().await);

        *market.floor.lock().unwrap() = Some(dec!(1));
        sleep(Duration::from_secs(30)).await;

        assert_eq!(market.floor_calls.load(Ordering::SeqCst), 2);
        assert_eq!(sink.tokens(), vec!["B", "C"]);
        monitor.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_new_multiplier_applies_next_cycle() {
        let market = scenario_market();
        let monitor = monitor(market.clone(), dec!(1.1), 30);
        let sink = Arc::new(CollectSink::default());

        monitor.start(sink.clone()).await;
        sleep(Duration::from_secs(1)).await;
        assert_eq!(sink.tokens(), vec!["B"]);

        monitor.config().set_multiplier(dec!(1.5)).unwrap();
        sleep(Duration::from_secs(30)).await;

        assert_eq!(sink.tokens(), vec!["B", "B", "C"]);
        monitor.stop().await;
    }
}
