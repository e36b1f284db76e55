//! Background statistics recalculation
//!
//! Tables are queued by name, either explicitly or because enough of their
//! rows changed. A ticker drains the queue; every analysis runs on the
//! blocking pool since it holds tree latches and does no I/O.

use crate::config::StatsConfig;
use crate::dict::Table;
use crate::stats::error::{StatsError, StatsResult};
use crate::stats::table::{TableAnalysis, TableStatsEstimator};
use parking_lot::{Mutex, RwLock};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::interval;

/// Owns the recalculation queue for a set of tables
pub struct StatsWorker {
    estimator: TableStatsEstimator,
    tables: RwLock<HashMap<String, Arc<Table>>>,
    queue: Mutex<VecDeque<String>>,
    recalc_interval: Duration,
    auto_recalc: bool,
    shutdown: AtomicBool,
}

impl StatsWorker {
    pub fn new(config: StatsConfig) -> Self {
        Self {
            recalc_interval: Duration::from_millis(config.recalc_interval_ms.max(1)),
            auto_recalc: config.auto_recalc,
            estimator: TableStatsEstimator::new(config),
            tables: RwLock::new(HashMap::new()),
            queue: Mutex::new(VecDeque::new()),
            shutdown: AtomicBool::new(false),
        }
    }

    /// Make a table known to the worker
    pub fn register(&self, table: Arc<Table>) {
        self.tables.write().insert(table.name().to_string(), table);
    }

    pub fn table(&self, name: &str) -> Option<Arc<Table>> {
        self.tables.read().get(name).cloned()
    }

    /// Queue a table for recalculation; returns false if it already waits
    pub fn enqueue(&self, name: &str) -> bool {
        let mut queue = self.queue.lock();
        if queue.iter().any(|queued| queued == name) {
            return false;
        }
        queue.push_back(name.to_string());
        true
    }

    pub fn queue_len(&self) -> usize {
        self.queue.lock().len()
    }

    /// Analyze one table on the blocking pool
    pub async fn analyze_table(&self, name: &str) -> StatsResult<TableAnalysis> {
        let table = self
            .table(name)
            .ok_or_else(|| StatsError::TableNotFound(name.to_string()))?;
        let estimator = self.estimator.clone();

        tokio::task::spawn_blocking(move || estimator.analyze(&table))
            .await
            .map_err(|e| StatsError::Task(e.to_string()))
    }

    /// Queue modified tables, then drain the queue; returns tables analyzed
    pub async fn run_once(&self) -> usize {
        if self.auto_recalc {
            let modified: Vec<String> = self
                .tables
                .read()
                .values()
                .filter(|table| table.needs_recalc())
                .map(|table| table.name().to_string())
                .collect();
            for name in modified {
                self.enqueue(&name);
            }
        }

        let mut analyzed = 0;
        loop {
            if self.is_shutdown() {
                break;
            }
            let Some(name) = self.queue.lock().pop_front() else {
                break;
            };

            match self.analyze_table(&name).await {
                Ok(report) => {
                    analyzed += 1;
                    tracing::debug!(
                        table = %report.table,
                        n_rows = report.stats.n_rows,
                        interrupted = report.interrupted.len(),
                        "Background recalculation done"
                    );
                }
                Err(e) => {
                    tracing::error!("Background stats recalculation failed: {}", e);
                }
            }
        }
        analyzed
    }

    /// Start the periodic recalculation loop
    pub fn start(self: &Arc<Self>) -> tokio::task::JoinHandle<()> {
        let worker = Arc::clone(self);

        tokio::spawn(async move {
            let mut ticker = interval(worker.recalc_interval);

            loop {
                ticker.tick().await;

                if worker.is_shutdown() {
                    break;
                }

                worker.run_once().await;
            }

            tracing::info!("Stats worker stopped");
        })
    }

    /// Stop the loop and ask running analyses to stop between indexes
    pub fn shutdown(&self) {
        self.shutdown.store(true, Ordering::Release);
        for table in self.tables.read().values() {
            table.request_quit();
        }
    }

    pub fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::Acquire)
    }
}
