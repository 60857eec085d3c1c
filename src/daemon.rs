//! Background loops that drive the policy engine on a live host.
//!
//! - pressure poll: asks the coordinator to scan at a fixed cadence
//! - idle probe: feeds CPU idleness, kswapd activity and free swap into the
//!   soft-reclaim gate
//! - fork probe: opens the boost window when process creation spikes
//! - the soft-reclaim worker itself
//!
//! Every loop exits when the shutdown channel flips to `true`.
//!
//! Cadences and probe thresholds (`scan.poll_interval_ms`, `scan.batch_pages`,
//! `reclaim.idle_*`, `boost.check_interval_ms`, `boost.fork_burst_threshold`)
//! are read once when a loop starts and only change on restart. The engine
//! tunables behind `PUT /config/*` apply to the next tick.

use herakles_lowmem_killer::host::IdleSample;
use herakles_lowmem_killer::{Caller, ScanOutcome, ScanRequest, WakeDecision};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, instrument, warn};

use crate::state::SharedAppState;
use crate::system::{
    read_kswapd_scanned, read_load_average, read_memory_sample, read_stat, IdleTracker,
};

/// Spawns every background loop and the reclaim worker.
pub fn spawn_all(state: &SharedAppState, shutdown: &watch::Receiver<bool>) -> Vec<JoinHandle<()>> {
    vec![
        tokio::spawn(pressure_loop(Arc::clone(state), shutdown.clone())),
        tokio::spawn(idle_loop(Arc::clone(state), shutdown.clone())),
        tokio::spawn(fork_loop(Arc::clone(state), shutdown.clone())),
        tokio::spawn(Arc::clone(&state.reclaimer).run(shutdown.clone())),
    ]
}

fn ticker(period_ms: u64) -> tokio::time::Interval {
    let mut tick = interval(Duration::from_millis(period_ms.max(1)));
    tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
    tick
}

/// Waits for the next tick. Returns `false` once shutdown is requested.
async fn next_tick(tick: &mut tokio::time::Interval, shutdown: &mut watch::Receiver<bool>) -> bool {
    if *shutdown.borrow() {
        return false;
    }
    tokio::select! {
        _ = tick.tick() => true,
        changed = shutdown.changed() => changed.is_ok() && !*shutdown.borrow(),
    }
}

fn log_outcome(outcome: &ScanOutcome) {
    match outcome {
        ScanOutcome::Killed {
            cutoff,
            victims,
            pages_reclaimed,
            ..
        } => {
            let pids: Vec<u32> = victims.iter().map(|v| v.pid).collect();
            info!(cutoff, ?pids, pages_reclaimed, "pressure scan killed");
        }
        ScanOutcome::SampleFailed => warn!("pressure scan could not sample memory"),
        other => debug!(?other, "pressure scan"),
    }
}

#[instrument(skip_all, name = "pressure_poll")]
async fn pressure_loop(state: SharedAppState, mut shutdown: watch::Receiver<bool>) {
    let cfg = state.config();
    let batch = cfg.scan.batch_pages.max(1);
    let mut tick = ticker(cfg.scan.poll_interval_ms);
    info!(interval_ms = cfg.scan.poll_interval_ms, batch, "pressure poll started");

    while next_tick(&mut tick, &mut shutdown).await {
        let coordinator = Arc::clone(&state.coordinator);
        let host = Arc::clone(&state.host);
        let request = ScanRequest::reclaim(batch, Caller::Reclaimer);
        match tokio::task::spawn_blocking(move || coordinator.scan(&request, host.as_ref())).await {
            Ok(outcome) => log_outcome(&outcome),
            Err(e) => warn!("pressure scan panicked: {}", e),
        }
    }
    info!("pressure poll stopped");
}

/// Decides whether the host is idle from one probe reading.
pub fn is_idle(idle_ratio: f64, load_per_cpu: f64, ratio_min: f64, load_max: f64) -> bool {
    idle_ratio >= ratio_min && load_per_cpu <= load_max
}

#[instrument(skip_all, name = "idle_probe")]
async fn idle_loop(state: SharedAppState, mut shutdown: watch::Receiver<bool>) {
    let cfg = state.config();
    let proc_root = cfg.proc_root();
    let tracker = IdleTracker::new();
    let mut tick = ticker(cfg.reclaim.idle_check_interval_ms);
    let mut last_decision = None;

    while next_tick(&mut tick, &mut shutdown).await {
        let stat = match read_stat(&proc_root) {
            Ok(s) => s,
            Err(e) => {
                debug!("idle probe skipped: {}", e);
                continue;
            }
        };
        let load = match read_load_average(&proc_root) {
            Ok(l) => l,
            Err(e) => {
                debug!("idle probe skipped: {}", e);
                continue;
            }
        };
        let kswapd = read_kswapd_scanned(&proc_root).unwrap_or(0);
        let free_swap_pages = read_memory_sample(&proc_root)
            .map(|m| m.free_swap_pages)
            .unwrap_or(0);

        let reading = tracker.observe(stat.cpu, kswapd, &load, stat.cpu_count);
        let sample = IdleSample {
            cpu_idle: is_idle(
                reading.idle_ratio,
                reading.load_per_cpu,
                cfg.reclaim.idle_ratio_min,
                cfg.reclaim.idle_load_max,
            ),
            kswapd_active: reading.kswapd_active,
            free_swap_pages,
        };

        let decision = state.reclaimer.could_reclaim(&sample);
        if decision == WakeDecision::Woken {
            info!(idle_ratio = reading.idle_ratio, "waking soft reclaim");
        } else if last_decision != Some(decision) {
            debug!(?decision, ?sample, "soft reclaim gate");
        }
        last_decision = Some(decision);
    }
    info!("idle probe stopped");
}

/// True when `forks` grew by at least `threshold` since `previous`.
pub fn is_fork_burst(previous: Option<u64>, forks: u64, threshold: u64) -> bool {
    match previous {
        Some(prev) => threshold > 0 && forks.saturating_sub(prev) >= threshold,
        None => false,
    }
}

#[instrument(skip_all, name = "fork_probe")]
async fn fork_loop(state: SharedAppState, mut shutdown: watch::Receiver<bool>) {
    let cfg = state.config();
    let proc_root = cfg.proc_root();
    let mut tick = ticker(cfg.boost.check_interval_ms);
    let mut previous = None;

    while next_tick(&mut tick, &mut shutdown).await {
        let boost = state.coordinator.boost();
        if !boost.is_enabled() {
            previous = None;
            continue;
        }
        let forks = match read_stat(&proc_root) {
            Ok(s) => s.forks,
            Err(e) => {
                debug!("fork probe skipped: {}", e);
                continue;
            }
        };
        if is_fork_burst(previous, forks, cfg.boost.fork_burst_threshold) {
            let delta = forks.saturating_sub(previous.unwrap_or(forks));
            info!(delta, "fork burst, opening boost window");
            state.coordinator.note_fork_burst();
        }
        previous = Some(forks);
    }
    info!("fork probe stopped");
}
