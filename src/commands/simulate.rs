//! Simulate command implementation.
//!
//! Runs the real coordinator against a randomly generated host: memory
//! drains a little every step, signaled processes die after a random delay
//! and give their pages back, and every scan outcome is printed.

use herakles_lowmem_killer::error::{HostError, TerminateError};
use herakles_lowmem_killer::host::{MemorySample, MemorySampler, ProcessSnapshot, ProcessTable, Terminator};
use herakles_lowmem_killer::{
    Caller, ManualClock, ScanCoordinator, ScanOutcome, ScanRequest, SharedState,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::config::Config;

const PRIORITIES: [i32; 9] = [-1000, 0, 100, 200, 300, 500, 700, 900, 1000];
const NAMES: [&str; 8] = [
    "browser", "renderer", "indexer", "backup", "editor", "mailer", "player", "compiler",
];

/// Synthetic host driven by a seeded generator.
pub struct SimHost {
    memory: Mutex<MemorySample>,
    procs: Mutex<Vec<ProcessSnapshot>>,
}

impl SimHost {
    pub fn new(free_pages: u64, file_pages: u64, procs: Vec<ProcessSnapshot>) -> Self {
        Self {
            memory: Mutex::new(MemorySample {
                free_pages,
                file_pages,
                ..Default::default()
            }),
            procs: Mutex::new(procs),
        }
    }

    /// Random process table with two kernel threads up front.
    pub fn random(rng: &mut StdRng, count: usize, free_pages: u64, file_pages: u64) -> Self {
        let mut procs: Vec<ProcessSnapshot> = (1..=2)
            .map(|pid| ProcessSnapshot {
                pid,
                name: format!("kthread{}", pid),
                priority_score: 0,
                resident_pages: 0,
                is_kernel_task: true,
                memdie: false,
            })
            .collect();
        for i in 0..count {
            procs.push(random_process(rng, 100 + i as u32));
        }
        Self::new(free_pages, file_pages, procs)
    }

    pub fn memory(&self) -> MemorySample {
        *self.memory.lock().unwrap_or_else(|p| p.into_inner())
    }

    pub fn live(&self) -> usize {
        self.procs.lock().unwrap_or_else(|p| p.into_inner()).len()
    }

    /// Reaps dying processes with probability `p_exit`, returning their
    /// pages to free memory. Returns how many exited.
    pub fn reap(&self, rng: &mut StdRng, p_exit: f64) -> usize {
        let mut procs = self.procs.lock().unwrap_or_else(|p| p.into_inner());
        let mut memory = self.memory.lock().unwrap_or_else(|p| p.into_inner());
        let before = procs.len();
        procs.retain(|p| {
            if p.memdie && rng.gen_bool(p_exit) {
                memory.free_pages += p.resident_pages;
                false
            } else {
                true
            }
        });
        before - procs.len()
    }

    /// Takes `free` pages of free memory and `file` pages of file cache.
    pub fn drain(&self, free: u64, file: u64) {
        let mut memory = self.memory.lock().unwrap_or_else(|p| p.into_inner());
        memory.free_pages = memory.free_pages.saturating_sub(free);
        memory.file_pages = memory.file_pages.saturating_sub(file);
    }

    pub fn spawn(&self, rng: &mut StdRng) {
        let mut procs = self.procs.lock().unwrap_or_else(|p| p.into_inner());
        let pid = procs.iter().map(|p| p.pid).max().unwrap_or(100) + 1;
        procs.push(random_process(rng, pid));
    }

    pub fn print_table(&self) {
        let procs = self.procs.lock().unwrap_or_else(|p| p.into_inner());
        println!("   {:>6} {:<12} {:>6} {:>8} flags", "pid", "name", "score", "pages");
        for p in procs.iter() {
            let flags = match (p.is_kernel_task, p.memdie) {
                (true, _) => "kernel",
                (_, true) => "dying",
                _ => "",
            };
            println!(
                "   {:>6} {:<12} {:>6} {:>8} {}",
                p.pid, p.name, p.priority_score, p.resident_pages, flags
            );
        }
    }
}

fn random_process(rng: &mut StdRng, pid: u32) -> ProcessSnapshot {
    ProcessSnapshot {
        pid,
        name: NAMES[rng.gen_range(0..NAMES.len())].to_string(),
        priority_score: PRIORITIES[rng.gen_range(0..PRIORITIES.len())],
        resident_pages: rng.gen_range(100..50_000),
        is_kernel_task: false,
        memdie: false,
    }
}

impl MemorySampler for SimHost {
    fn sample(&self) -> Result<MemorySample, HostError> {
        Ok(self.memory())
    }
}

impl ProcessTable for SimHost {
    fn processes(&self) -> Box<dyn Iterator<Item = ProcessSnapshot> + '_> {
        let procs = self.procs.lock().unwrap_or_else(|p| p.into_inner()).clone();
        Box::new(procs.into_iter())
    }
}

impl Terminator for SimHost {
    fn terminate(&self, pid: u32) -> Result<(), TerminateError> {
        let mut procs = self.procs.lock().unwrap_or_else(|p| p.into_inner());
        match procs.iter_mut().find(|p| p.pid == pid) {
            Some(p) => {
                p.memdie = true;
                Ok(())
            }
            None => Err(TerminateError::NoSuchProcess(pid)),
        }
    }
}

/// Parameters of one simulation run.
#[derive(Debug, Clone)]
pub struct SimulationParams {
    pub iterations: usize,
    pub processes: usize,
    pub seed: u64,
    pub step_ms: u64,
    pub verbose: bool,
}

#[derive(Debug, Default)]
pub struct SimulationReport {
    pub outcomes: Vec<ScanOutcome>,
    pub kills: u64,
    pub exited: usize,
}

fn describe(outcome: &ScanOutcome) -> String {
    match outcome {
        ScanOutcome::Killed {
            cutoff,
            victims,
            pages_reclaimed,
            ..
        } => {
            let list: Vec<String> = victims
                .iter()
                .map(|v| format!("{}({}, score {})", v.pid, v.name, v.priority_score))
                .collect();
            format!(
                "💀 cutoff {} killed {} reclaiming {} pages",
                cutoff,
                list.join(", "),
                pages_reclaimed
            )
        }
        ScanOutcome::NoPressure { .. } => "✅ no pressure".to_string(),
        ScanOutcome::NoCandidates { cutoff, .. } => format!("⚠️  cutoff {} but no candidates", cutoff),
        ScanOutcome::DeathPending { pid } => format!("⏳ waiting for pid {} to exit", pid),
        other => format!("{:?}", other),
    }
}

/// Drives the coordinator over the synthetic host.
pub fn run_simulation(config: &Config, params: &SimulationParams) -> anyhow::Result<SimulationReport> {
    let mut rng = StdRng::seed_from_u64(params.seed);
    let table = config.thresholds.build()?;
    let top = table.min_free().last().copied().unwrap_or(4096);

    let shared = Arc::new(SharedState::new(config.debug_level.unwrap_or(0)));
    let clock = Arc::new(ManualClock::new());
    let coordinator = ScanCoordinator::new(
        Arc::clone(&shared),
        clock.clone(),
        table,
        &config.boost.window,
        config.scan.tunables.clone(),
    )?;

    let host = SimHost::random(&mut rng, params.processes, top * 2, top * 2);
    let batch = config.scan.batch_pages.max(1);
    let mut report = SimulationReport::default();

    for step in 0..params.iterations {
        clock.advance(Duration::from_millis(params.step_ms));
        report.exited += host.reap(&mut rng, 0.5);
        host.drain(rng.gen_range(0..top / 2 + 1), rng.gen_range(0..top / 2 + 1));
        if rng.gen_bool(0.2) {
            host.spawn(&mut rng);
            coordinator.note_fork_burst();
        }

        let memory = host.memory();
        println!(
            "\n[{:>3}] t={}ms free={} file={} live={}",
            step,
            coordinator.now().as_millis(),
            memory.free_pages,
            memory.file_pages,
            host.live()
        );
        if params.verbose {
            host.print_table();
        }

        let outcome = coordinator.scan(&ScanRequest::reclaim(batch, Caller::Reclaimer), &host);
        println!("      {}", describe(&outcome));
        report.outcomes.push(outcome);
    }

    report.kills = shared.kill_count();
    Ok(report)
}

/// Runs the simulation and prints a summary.
pub fn command_simulate(
    config: &Config,
    iterations: usize,
    processes: usize,
    seed: Option<u64>,
    step_ms: u64,
    verbose: bool,
) -> anyhow::Result<()> {
    let params = SimulationParams {
        iterations,
        processes,
        seed: seed.unwrap_or_else(rand::random),
        step_ms,
        verbose,
    };

    println!("🧪 Herakles Low-Memory Killer - Simulation");
    println!("==========================================");
    println!(
        "seed={} iterations={} processes={} step={}ms",
        params.seed, params.iterations, params.processes, params.step_ms
    );

    let report = run_simulation(config, &params)?;

    let deathpending = report
        .outcomes
        .iter()
        .filter(|o| matches!(o, ScanOutcome::DeathPending { .. }))
        .count();
    println!("\n📋 Summary:");
    println!("   kills:           {}", report.kills);
    println!("   exited:          {}", report.exited);
    println!("   death-pending:   {}", deathpending);
    Ok(())
}
