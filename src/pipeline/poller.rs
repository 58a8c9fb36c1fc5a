// src/pipeline/poller.rs

//! The check-diff-notify loop.

use std::time::SystemTime;

use chrono::Utc;

use crate::config::{ConfigSource, Settings};
use crate::error::{AppError, Result};
use crate::models::StockSnapshot;
use crate::pipeline::diff::{DiffResult, calculate_diff};
use crate::pipeline::schedule;
use crate::services::{HistoryRecorder, NotifyOutcome, Notifier, StockProber, compose_message};
use crate::storage::SnapshotStore;
use crate::utils::fs::touch;

/// What one round observed and did.
#[derive(Debug, Clone)]
pub struct RoundOutcome {
    pub current: StockSnapshot,
    pub diff: DiffResult,
    /// Rows appended to the history file
    pub history_rows: usize,
    /// `None` when the round had nothing to report
    pub notification: Option<NotifyOutcome>,
}

/// Owns everything that lives across rounds.
pub struct Poller {
    source: ConfigSource,
    settings: Settings,
    prober: Box<dyn StockProber>,
    store: Box<dyn SnapshotStore>,
    notifier: Notifier,
    previous: StockSnapshot,
}

impl Poller {
    /// Load settings and the stored snapshot.
    pub async fn start(
        source: ConfigSource,
        prober: Box<dyn StockProber>,
        store: Box<dyn SnapshotStore>,
        notifier: Notifier,
    ) -> Result<Self> {
        let settings = source.load()?;
        let previous = store.load().await?;
        log::info!(
            "Tracking {} items, {} known from the last run",
            settings.items.len(),
            previous.len()
        );

        Ok(Self {
            source,
            settings,
            prober,
            store,
            notifier,
            previous,
        })
    }

    /// Snapshot the next round is compared against.
    pub fn previous(&self) -> &StockSnapshot {
        &self.previous
    }

    /// Run one round: probe every item, record and notify on change, persist.
    pub async fn run_round(&mut self) -> Result<RoundOutcome> {
        self.settings = self.source.reload_or_keep(&self.settings);
        let Settings { config, items } = self.settings.clone();

        self.prober.login(&config.login).await?;

        let delay = config.check.item_delay();
        let mut current = StockSnapshot::new();
        for item in &items {
            log::info!("check {}", item.name);
            let in_stock = self.prober.probe(item).await?;

            // Unknown items count as out of stock for this message only.
            if in_stock != self.previous.get(&item.name).unwrap_or(false) {
                if in_stock {
                    log::info!("{} is in stock!", item.name);
                } else {
                    log::info!("{} is out of stock...", item.name);
                }
            }
            current.record(&item.name, in_stock);

            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
        }

        let diff = calculate_diff(&self.previous, &current);
        if !self.previous.is_empty() {
            for name in &diff.added {
                log::info!("Now tracking {name}");
            }
            for name in &diff.removed {
                log::info!("No longer tracking {name}");
            }
        }
        let mut history_rows = 0;
        let mut notification = None;

        if !self.previous.is_empty() && diff.has_changes() {
            let now = Utc::now();
            let recorder = HistoryRecorder::new(&config.storage.history_file, &config.history)?;
            history_rows = recorder.append(now, &items, &current, &self.previous)?;

            let body = compose_message(&items, &current);
            let outcome = self
                .notifier
                .notify(&config.mail, &config.notify, &body, SystemTime::from(now))
                .await?;
            notification = Some(outcome);
        }

        self.store.save(&current).await?;
        self.previous = current.clone();

        if let Some(path) = &config.liveness.file {
            touch(path, SystemTime::now())?;
        }

        log::info!(
            "Finish. {} of {} items in stock",
            current.in_stock_count(),
            current.len()
        );

        Ok(RoundOutcome {
            current,
            diff,
            history_rows,
            notification,
        })
    }

    /// Run rounds until one fails.
    pub async fn run(&mut self) -> Result<()> {
        loop {
            log::info!("Start.");
            self.run_round().await?;

            let delay = schedule::next_delay(&self.settings.config.check, Utc::now());
            log::info!("sleep {} sec...", delay.as_secs());
            tokio::time::sleep(delay).await;
        }
    }

    /// Log diagnostics for a fatal error, dump the last page and release the prober.
    pub async fn shutdown_after(&mut self, error: &AppError) {
        log::error!("URL: {}", self.prober.last_url().unwrap_or("-"));
        log::error!("{error}");
        let mut cause = std::error::Error::source(error);
        while let Some(inner) = cause {
            log::error!("  caused by: {inner}");
            cause = inner.source();
        }
        log::debug!("{error:?}");

        let debug_dir = &self.settings.config.storage.debug_dir;
        match self.prober.dump_page(debug_dir, failure_context(error)).await {
            Ok(Some(path)) => log::error!("Page dumped to {}", path.display()),
            Ok(None) => {}
            Err(e) => log::warn!("Page dump failed: {e}"),
        }

        self.prober.close().await;
    }

    /// Release the prober after a clean stop.
    pub async fn close(&mut self) {
        self.prober.close().await;
    }
}

/// Name for debug artifacts, after the step that failed.
fn failure_context(error: &AppError) -> &'static str {
    match error {
        AppError::Auth(_) | AppError::ManualIntervention(_) => "login",
        AppError::Http(_) | AppError::Probe { .. } | AppError::Selector { .. } => "probe",
        AppError::Smtp(_) | AppError::Mail(_) => "notify",
        _ => "run_round",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::path::{Path, PathBuf};
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    use async_trait::async_trait;
    use tempfile::TempDir;

    use crate::models::{Config, Item, LoginConfig};
    use crate::pipeline::run_checker;
    use crate::services::notifier::tests::RecordingTransport;
    use crate::storage::{LocalStorage, MemoryStorage};

    /// Prober whose answers the test sets between rounds.
    #[derive(Clone, Default)]
    struct FakeProber {
        stock: Arc<Mutex<HashMap<String, bool>>>,
        fail_on: Arc<Mutex<Option<String>>>,
        logins: Arc<AtomicUsize>,
        closed: Arc<AtomicBool>,
        dumped: Arc<Mutex<Vec<String>>>,
        last_url: Option<String>,
    }

    impl FakeProber {
        fn set(&self, name: &str, in_stock: bool) {
            self.stock.lock().unwrap().insert(name.to_string(), in_stock);
        }
    }

    #[async_trait]
    impl StockProber for FakeProber {
        async fn login(&mut self, _login: &LoginConfig) -> Result<()> {
            self.logins.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn probe(&mut self, item: &Item) -> Result<bool> {
            self.last_url = Some(item.url.clone());
            if self.fail_on.lock().unwrap().as_deref() == Some(item.name.as_str()) {
                return Err(AppError::probe(&item.url, "page load timed out"));
            }
            Ok(self.stock.lock().unwrap().get(&item.name).copied().unwrap_or(false))
        }

        fn last_url(&self) -> Option<&str> {
            self.last_url.as_deref()
        }

        async fn dump_page(&self, _dir: &Path, context: &str) -> Result<Option<PathBuf>> {
            self.dumped.lock().unwrap().push(context.to_string());
            Ok(None)
        }

        async fn close(&mut self) {
            self.closed.store(true, Ordering::SeqCst);
        }
    }

    struct Harness {
        _tmp: TempDir,
        prober: FakeProber,
        transport: RecordingTransport,
        config: Config,
    }

    impl Harness {
        fn new() -> Self {
            let tmp = TempDir::new().unwrap();
            let mut config = Config::default();
            config.check.item_delay_secs = 0;
            config.notify.marker_path = tmp.path().join("shm/notify");
            config.storage.snapshot_file = tmp.path().join("data/stock_cache.json");
            config.storage.history_file = tmp.path().join("data/log/history.csv");
            config.storage.debug_dir = tmp.path().join("data/debug");
            config.liveness.file = Some(tmp.path().join("data/healthz"));

            Self {
                _tmp: tmp,
                prober: FakeProber::default(),
                transport: RecordingTransport::default(),
                config,
            }
        }

        async fn poller(&self, items: &[(&str, &str)]) -> Poller {
            let settings = Settings {
                config: self.config.clone(),
                items: items.iter().map(|(n, u)| Item::new(*n, *u)).collect(),
            };
            Poller::start(
                ConfigSource::Static(settings),
                Box::new(self.prober.clone()),
                Box::new(LocalStorage::new(&self.config.storage.snapshot_file)),
                Notifier::new(Box::new(self.transport.clone())),
            )
            .await
            .unwrap()
        }

        fn sent(&self) -> usize {
            self.transport.sent.lock().unwrap().len()
        }

        fn history(&self) -> Vec<String> {
            std::fs::read_to_string(&self.config.storage.history_file)
                .map(|s| s.lines().map(str::to_string).collect())
                .unwrap_or_default()
        }

        async fn stored(&self) -> StockSnapshot {
            LocalStorage::new(&self.config.storage.snapshot_file)
                .load()
                .await
                .unwrap()
        }
    }

    const UDM: (&str, &str) = ("UDM", "https://store.example/products/udm");
    const U6: (&str, &str) = ("U6-Lite", "https://store.example/products/u6-lite");

    #[tokio::test]
    async fn test_end_to_end_transition() {
        let h = Harness::new();
        let mut poller = h.poller(&[UDM]).await;

        h.prober.set("UDM", false);
        let first = poller.run_round().await.unwrap();
        assert!(first.notification.is_none());
        assert_eq!(first.history_rows, 0);
        assert_eq!(h.stored().await, [("UDM", false)].into_iter().collect::<StockSnapshot>());

        h.prober.set("UDM", true);
        let second = poller.run_round().await.unwrap();
        assert_eq!(second.notification, Some(NotifyOutcome::Sent));
        assert_eq!(second.history_rows, 1);
        assert_eq!(h.sent(), 1);
        assert!(h.history()[0].ends_with(",UDM,OK"));
        assert_eq!(h.stored().await, [("UDM", true)].into_iter().collect::<StockSnapshot>());
        assert!(h.transport.sent.lock().unwrap()[0].contains("- UDM: <b>OK</b>"));
    }

    #[tokio::test]
    async fn test_first_round_never_notifies() {
        let h = Harness::new();
        let mut poller = h.poller(&[UDM, U6]).await;
        h.prober.set("UDM", true);
        h.prober.set("U6-Lite", true);

        let outcome = poller.run_round().await.unwrap();
        assert!(outcome.diff.has_changes());
        assert!(outcome.notification.is_none());
        assert_eq!(h.sent(), 0);
        assert!(h.history().is_empty());
    }

    #[tokio::test]
    async fn test_unchanged_round_is_quiet() {
        let h = Harness::new();
        let mut poller = h.poller(&[UDM, U6]).await;
        h.prober.set("UDM", true);

        poller.run_round().await.unwrap();
        let outcome = poller.run_round().await.unwrap();

        assert!(!outcome.diff.has_changes());
        assert!(outcome.notification.is_none());
        assert_eq!(h.sent(), 0);
        assert!(h.history().is_empty());
        assert_eq!(h.prober.logins.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_restart_resumes_from_stored_snapshot() {
        let h = Harness::new();
        {
            let mut poller = h.poller(&[UDM]).await;
            h.prober.set("UDM", false);
            poller.run_round().await.unwrap();
        }

        let mut restarted = h.poller(&[UDM]).await;
        assert_eq!(restarted.previous().get("UDM"), Some(false));

        h.prober.set("UDM", true);
        let outcome = restarted.run_round().await.unwrap();
        assert_eq!(outcome.notification, Some(NotifyOutcome::Sent));
    }

    #[tokio::test]
    async fn test_cooldown_suppresses_send_but_keeps_history() {
        let h = Harness::new();
        let mut poller = h.poller(&[UDM]).await;

        h.prober.set("UDM", false);
        poller.run_round().await.unwrap();
        h.prober.set("UDM", true);
        poller.run_round().await.unwrap();
        h.prober.set("UDM", false);
        let third = poller.run_round().await.unwrap();

        assert!(matches!(
            third.notification,
            Some(NotifyOutcome::Suppressed { .. })
        ));
        assert_eq!(h.sent(), 1);
        assert_eq!(h.history().len(), 2);
        assert!(h.history()[1].ends_with(",UDM,NG"));
    }

    #[tokio::test]
    async fn test_new_item_notifies_without_history() {
        let h = Harness::new();
        let mut poller = h.poller(&[UDM]).await;
        h.prober.set("UDM", false);
        poller.run_round().await.unwrap();

        let mut grown = Poller::start(
            ConfigSource::Static(Settings {
                config: h.config.clone(),
                items: vec![Item::new(UDM.0, UDM.1), Item::new(U6.0, U6.1)],
            }),
            Box::new(h.prober.clone()),
            Box::new(LocalStorage::new(&h.config.storage.snapshot_file)),
            Notifier::new(Box::new(h.transport.clone())),
        )
        .await
        .unwrap();

        let outcome = grown.run_round().await.unwrap();
        assert_eq!(outcome.history_rows, 0);
        assert_eq!(outcome.notification, Some(NotifyOutcome::Sent));
        assert!(h.transport.sent.lock().unwrap()[0].contains("- U6-Lite: NG"));
    }

    #[tokio::test]
    async fn test_liveness_touched_after_round() {
        let h = Harness::new();
        let mut poller = h.poller(&[UDM]).await;
        let liveness = h.config.liveness.file.clone().unwrap();
        assert!(!liveness.exists());

        poller.run_round().await.unwrap();
        assert!(liveness.exists());
    }

    #[tokio::test]
    async fn test_ephemeral_store_starts_empty() {
        let h = Harness::new();
        let settings = Settings {
            config: h.config.clone(),
            items: vec![Item::new(UDM.0, UDM.1)],
        };
        let mut poller = Poller::start(
            ConfigSource::Static(settings),
            Box::new(h.prober.clone()),
            Box::new(MemoryStorage::new()),
            Notifier::new(Box::new(h.transport.clone())),
        )
        .await
        .unwrap();

        poller.run_round().await.unwrap();
        assert_eq!(poller.previous().get("UDM"), Some(false));
        assert!(!h.config.storage.snapshot_file.exists());
    }

    #[tokio::test]
    async fn test_probe_failure_runs_shutdown_sequence() {
        let h = Harness::new();
        let mut poller = h.poller(&[UDM, U6]).await;
        h.prober.set("UDM", false);
        poller.run_round().await.unwrap();

        h.prober.set("UDM", true);
        *h.prober.fail_on.lock().unwrap() = Some("U6-Lite".to_string());

        let err = run_checker(&mut poller, true).await.unwrap_err();
        assert!(matches!(err, AppError::Probe { .. }));
        assert!(h.prober.closed.load(Ordering::SeqCst));
        assert_eq!(*h.prober.dumped.lock().unwrap(), vec!["probe"]);
        // The failed round neither notified nor replaced the stored snapshot.
        assert_eq!(h.sent(), 0);
        assert_eq!(
            h.stored().await,
            [("UDM", false), ("U6-Lite", false)].into_iter().collect::<StockSnapshot>()
        );
    }

    #[tokio::test]
    async fn test_transport_failure_is_fatal() {
        let h = Harness::new();
        let mut poller = Poller::start(
            ConfigSource::Static(Settings {
                config: h.config.clone(),
                items: vec![Item::new(UDM.0, UDM.1)],
            }),
            Box::new(h.prober.clone()),
            Box::new(LocalStorage::new(&h.config.storage.snapshot_file)),
            Notifier::new(Box::new(RecordingTransport {
                fail: true,
                ..Default::default()
            })),
        )
        .await
        .unwrap();

        h.prober.set("UDM", false);
        poller.run_round().await.unwrap();
        h.prober.set("UDM", true);

        let err = run_checker(&mut poller, true).await.unwrap_err();
        assert!(matches!(err, AppError::Mail(_)));
        assert_eq!(*h.prober.dumped.lock().unwrap(), vec!["notify"]);
    }

    #[tokio::test]
    async fn test_clean_single_round_releases_prober() {
        let h = Harness::new();
        let mut poller = h.poller(&[UDM]).await;

        run_checker(&mut poller, true).await.unwrap();
        assert!(h.prober.closed.load(Ordering::SeqCst));
        assert!(h.prober.dumped.lock().unwrap().is_empty());
    }
}
