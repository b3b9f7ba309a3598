use crate::datastore::DataStore;
use relstore_core::config::ReapAction;
use std::time::Duration;
use tokio::{sync::watch, task::JoinHandle};
use tracing::{debug, warn};

///
/// ReaperHandle
///
/// Background reap loops, one per expiring collection. Dropping the handle
/// signals every loop to stop.
///

pub struct ReaperHandle {
    shutdown: watch::Sender<bool>,
    tasks: Vec<JoinHandle<()>>,
}

impl ReaperHandle {
    pub(crate) fn spawn(store: DataStore) -> Self {
        let (shutdown, rx) = watch::channel(false);

        let plans: Vec<(String, Duration)> = {
            let guard = store.read();
            guard
                .collection_names()
                .filter_map(|name| {
                    let config = guard.collection(name).ok()?.config();
                    (config.effective_reap_action() != ReapAction::None)
                        .then(|| (name.to_string(), config.reap_interval_duration()))
                })
                .collect()
        };

        let mut tasks = Vec::with_capacity(plans.len());
        for (name, every) in plans {
            if every.is_zero() {
                warn!(collection = %name, "reap interval is zero; background reaping disabled");
                continue;
            }
            debug!(collection = %name, ?every, "reaper started");
            tasks.push(tokio::spawn(reap_loop(store.clone(), name, every, rx.clone())));
        }

        Self { shutdown, tasks }
    }

    /// Number of running reap loops.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Stop every loop and wait for them to finish.
    pub async fn shutdown(mut self) {
        let _ = self.shutdown.send(true);
        for task in std::mem::take(&mut self.tasks) {
            let _ = task.await;
        }
    }
}

impl Drop for ReaperHandle {
    fn drop(&mut self) {
        let _ = self.shutdown.send(true);
    }
}

async fn reap_loop(
    store: DataStore,
    name: String,
    every: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(every);
    // first tick is immediate
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                match store.reap(&name).await {
                    Ok(report) if !report.is_empty() => {
                        debug!(
                            collection = %name,
                            expired = report.expired.len(),
                            "background reap"
                        );
                    }
                    Ok(_) => {}
                    Err(err) => warn!(collection = %name, error = %err, "background reap failed"),
                }
            }
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
        }
    }

    debug!(collection = %name, "reaper stopped");
}
