//! Periodic defrag thread
//!
//! Wakes every `defrag_timeout` plus a random splay and runs one pass.
//! Dropping the handle (or calling `stop`) wakes the thread through its
//! shutdown channel and joins it.

use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam::channel::{self, Sender};
use rand::Rng;
use tracing::{debug, info, warn};

/// Handle on the background defrag thread
pub struct PeriodicDefrag {
    shutdown: Option<Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl PeriodicDefrag {
    /// Start the thread. `pass` runs once per interval.
    pub fn spawn<F>(timeout: Duration, splay: Duration, mut pass: F) -> std::io::Result<Self>
    where
        F: FnMut() + Send + 'static,
    {
        let (shutdown_tx, shutdown_rx) = channel::bounded::<()>(1);

        let handle = thread::Builder::new()
            .name("basalt-defrag".to_string())
            .spawn(move || {
                info!(?timeout, ?splay, "periodic defrag started");
                loop {
                    let delay = timeout + random_splay(splay);
                    debug!(?delay, "next periodic defrag scheduled");
                    channel::select! {
                        recv(shutdown_rx) -> _ => break,
                        recv(channel::after(delay)) -> _ => pass(),
                    }
                }
                info!("periodic defrag stopped");
            })?;

        Ok(Self {
            shutdown: Some(shutdown_tx),
            handle: Some(handle),
        })
    }

    /// Signal the thread and wait for it to finish its current pass
    pub fn stop(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.try_send(());
        }
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                warn!("periodic defrag thread panicked");
            }
        }
    }
}

impl Drop for PeriodicDefrag {
    fn drop(&mut self) {
        self.stop();
    }
}

fn random_splay(splay: Duration) -> Duration {
    if splay.is_zero() {
        return Duration::ZERO;
    }
    let millis = rand::thread_rng().gen_range(0..=splay.as_millis() as u64);
    Duration::from_millis(millis)
}
