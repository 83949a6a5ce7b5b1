//! # Proof-of-Work Race
//!
//! Parallel nonce search for difficulty-gated admission.
//!
//! The nonce space is split into `W` residue classes: worker `k` scans
//! `k, k+W, k+2W, ...` from zero. Workers share nothing mutable except a
//! cancellation token. The first success is sent over a channel, the
//! coordinator cancels the siblings and joins every worker before returning,
//! so no search thread outlives the call.
//!
//! ```rust,no_run
//! use speak_protocol::pow::{verify, PowCoordinator};
//!
//! let coordinator = PowCoordinator::new(4);
//! let solution = coordinator.search(b"test", 0x00ff_ffff).unwrap();
//! assert!(verify(solution.nonce, b"test", &solution.digest, 0x00ff_ffff));
//! ```

mod hashing;

pub use hashing::{meets_difficulty, pow_digest, verify};

use std::sync::mpsc::{self, Sender};
use std::thread;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::config::PowConfig;
use crate::error::{constants, ProtocolError, Result};
use crate::utils::metrics::global_metrics;

/// Upper bound on worker threads per search
pub const MAX_WORKERS: usize = 1024;

/// A nonce together with the digest that satisfied the difficulty.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PowSolution {
    pub nonce: u32,
    pub digest: [u8; 32],
}

/// Result of a completed search with accounting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PowOutcome {
    pub solution: PowSolution,
    /// Digests computed across all workers, losers included
    pub hashes: u64,
    /// Workers joined before returning; always equals the worker count
    pub workers_joined: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PowCoordinator {
    workers: usize,
}

impl Default for PowCoordinator {
    fn default() -> Self {
        Self::new(num_cpus::get())
    }
}

impl PowCoordinator {
    /// Coordinator racing `workers` threads, clamped to `1..=MAX_WORKERS`.
    pub fn new(workers: usize) -> Self {
        Self {
            workers: workers.clamp(1, MAX_WORKERS),
        }
    }

    pub fn from_config(config: &PowConfig) -> Self {
        Self::new(config.effective_workers())
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Block until some worker finds a nonce whose digest is below `difficulty`.
    ///
    /// # Errors
    /// - `InvalidDifficulty` for a difficulty of zero (no digest can satisfy it)
    /// - `PowExhausted` if every worker runs off the end of the `u32` range
    /// - `PowWorkerFailed` if a worker crashed before anyone reported success
    pub fn search(&self, message: &[u8], difficulty: u32) -> Result<PowSolution> {
        self.search_with_stats(message, difficulty)
            .map(|outcome| outcome.solution)
    }

    pub fn search_with_stats(&self, message: &[u8], difficulty: u32) -> Result<PowOutcome> {
        self.search_cancellable(message, difficulty, &CancellationToken::new())
    }

    /// Like [`search_with_stats`](Self::search_with_stats), but also stops
    /// with `PowCancelled` once `cancel` fires.
    #[instrument(skip(self, message, cancel), fields(workers = self.workers, message_len = message.len()))]
    pub fn search_cancellable(
        &self,
        message: &[u8],
        difficulty: u32,
        cancel: &CancellationToken,
    ) -> Result<PowOutcome> {
        if difficulty == 0 {
            return Err(ProtocolError::InvalidDifficulty);
        }

        self.race(message, difficulty, cancel, 0, &pow_digest)
    }

    /// Race the workers over nonces `first + k, first + k + W, ...`.
    fn race<H>(
        &self,
        message: &[u8],
        difficulty: u32,
        cancel: &CancellationToken,
        first: u32,
        hash: &H,
    ) -> Result<PowOutcome>
    where
        H: Fn(u32, &[u8]) -> Result<[u8; 32]> + Sync,
    {
        let stride = self.workers as u32;
        let stop = cancel.child_token();
        let (tx, rx) = mpsc::channel();

        let (winner, reports) = thread::scope(|scope| {
            let handles: Vec<_> = (0..stride)
                .map(|offset| {
                    let tx = tx.clone();
                    let stop = &stop;
                    scope.spawn(move || {
                        let _guard = CancelOnPanic(stop);
                        let Some(start) = first.checked_add(offset) else {
                            return Ok(0);
                        };
                        let report =
                            scan_residue(message, difficulty, start, stride, stop, tx, hash);
                        if report.is_err() {
                            stop.cancel();
                        }
                        report
                    })
                })
                .collect();
            drop(tx);

            // Only the first report counts; later ones die with the receiver.
            let winner = rx.recv().ok();
            stop.cancel();

            let reports: Vec<_> = handles.into_iter().map(|handle| handle.join()).collect();
            (winner, reports)
        });

        let workers_joined = reports.len();
        let mut hashes = 0u64;
        let mut failure = None;
        for report in reports {
            match report {
                Ok(Ok(count)) => hashes += count,
                Ok(Err(e)) => failure = Some(e.to_string()),
                Err(_) => failure = Some(constants::ERR_WORKER_PANICKED.to_string()),
            }
        }
        global_metrics().pow_search_completed(hashes);

        match (winner, failure) {
            (Some(solution), failure) => {
                if let Some(reason) = failure {
                    warn!(%reason, "Worker failed after a solution was found");
                }
                info!(nonce = solution.nonce, hashes, "Proof-of-work solution found");
                Ok(PowOutcome {
                    solution,
                    hashes,
                    workers_joined,
                })
            }
            (None, Some(reason)) => Err(ProtocolError::PowWorkerFailed(reason)),
            (None, None) if cancel.is_cancelled() => {
                debug!(hashes, "Proof-of-work search cancelled");
                Err(ProtocolError::PowCancelled)
            }
            (None, None) => {
                warn!(hashes, "Nonce space exhausted");
                Err(ProtocolError::PowExhausted)
            }
        }
    }

    /// Run the search on the blocking pool. Cancelling `cancel` stops the
    /// workers; dropping the future alone does not.
    pub async fn search_async(
        &self,
        message: Vec<u8>,
        difficulty: u32,
        cancel: CancellationToken,
    ) -> Result<PowSolution> {
        let coordinator = *self;
        tokio::task::spawn_blocking(move || {
            coordinator
                .search_cancellable(&message, difficulty, &cancel)
                .map(|outcome| outcome.solution)
        })
        .await
        .map_err(|_| ProtocolError::PowWorkerFailed(constants::ERR_BLOCKING_TASK.to_string()))?
    }
}

struct CancelOnPanic<'a>(&'a CancellationToken);

impl Drop for CancelOnPanic<'_> {
    fn drop(&mut self) {
        if thread::panicking() {
            self.0.cancel();
        }
    }
}

/// Scan `start, start+stride, ...` until a hit, cancellation or `u32` overflow.
/// `hash` is [`pow_digest`] outside of tests.
/// Returns the number of digests computed.
fn scan_residue<H>(
    message: &[u8],
    difficulty: u32,
    start: u32,
    stride: u32,
    stop: &CancellationToken,
    found: Sender<PowSolution>,
    hash: &H,
) -> Result<u64>
where
    H: Fn(u32, &[u8]) -> Result<[u8; 32]>,
{
    let mut nonce = start;
    let mut hashes = 0u64;

    while !stop.is_cancelled() {
        let digest = hash(nonce, message)?;
        hashes += 1;

        if meets_difficulty(&digest, difficulty) {
            // The coordinator may already have a winner and dropped the receiver
            let _ = found.send(PowSolution { nonce, digest });
            break;
        }

        match nonce.checked_add(stride) {
            Some(next) => nonce = next,
            None => break,
        }
    }

    Ok(hashes)
}
