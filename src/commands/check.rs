//! Check command implementation.
//!
//! Validates that the host exposes what the daemon reads, and the configuration.

use anyhow::bail;
use herakles_lowmem_killer::host::{MemorySampler, ProcessTable};

use crate::cgroup::check_cgroup;
use crate::config::{validate_effective_config, Config};
use crate::linux_host::LinuxHost;
use crate::system::PAGE_SIZE;

/// Validates host interfaces and configuration.
pub fn command_check(
    memory: bool,
    proc: bool,
    cgroups: bool,
    all: bool,
    config: &Config,
) -> anyhow::Result<()> {
    println!("🔍 Herakles Low-Memory Killer - System Check");
    println!("=============================================");

    let mut all_ok = true;
    let proc_root = config.proc_root();
    let host = LinuxHost::new(&proc_root, true);

    // Check memory counters
    if memory || all {
        println!("\n💾 Checking memory counters...");
        match host.sample() {
            Ok(sample) => {
                println!("   ✅ meminfo readable (page size {} bytes)", *PAGE_SIZE);
                println!(
                    "   ✅ free={} file={} other_file={} reserved={} pages",
                    sample.free_pages,
                    sample.file_pages,
                    sample.other_file(),
                    sample.reserved_free_pages
                );
                if sample.reserved_free_pages == 0 {
                    println!("   ⚠️  zoneinfo missing or no Normal zone - reserve treated as 0");
                }
            }
            Err(e) => {
                println!("   ❌ Cannot sample memory: {}", e);
                all_ok = false;
            }
        }
    }

    // Check process table
    if proc || all {
        println!("\n📁 Checking process table under {}...", proc_root.display());
        let procs: Vec<_> = host.processes().collect();
        if procs.is_empty() {
            println!("   ❌ Cannot read any process entries");
            all_ok = false;
        } else {
            let kernel = procs.iter().filter(|p| p.is_kernel_task).count();
            let killable = procs
                .iter()
                .filter(|p| !p.is_kernel_task && p.priority_score > 0)
                .count();
            println!(
                "   ✅ {} processes ({} kernel threads, {} with positive oom_score_adj)",
                procs.len(),
                kernel,
                killable
            );
        }
    }

    // Check soft-reclaim cgroups
    if cgroups || all {
        println!("\n🧹 Checking soft-reclaim cgroups...");
        if config.reclaim.cgroups.is_empty() {
            println!("   ⚠️  No cgroups configured - soft reclaim passes do nothing");
        }
        for cgroup in &config.reclaim.cgroups {
            match check_cgroup(cgroup) {
                Ok(()) => println!("   ✅ {}", cgroup.display()),
                Err(e) => {
                    println!("   ❌ {}: {:#}", cgroup.display(), e);
                    all_ok = false;
                }
            }
        }
    }

    // Check configuration
    println!("\n⚙️  Checking configuration...");
    match validate_effective_config(config) {
        Ok(_) => {
            println!("   ✅ Configuration is valid");
        }
        Err(e) => {
            println!("   ❌ Configuration invalid: {:#}", e);
            all_ok = false;
        }
    }

    println!("\n📋 Summary:");
    if all_ok {
        println!("   ✅ All checks passed - system is ready");
        Ok(())
    } else {
        println!("   ❌ Some checks failed - please review warnings");
        bail!("system check failed")
    }
}
