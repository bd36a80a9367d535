//! Host resource detection: memory, accelerator and chip name.
//!
//! Every probe is best-effort. Missing utilities, non-zero exits and
//! unparsable output degrade to conservative values instead of errors.

use std::fmt;
use std::process::Command;

use serde::Serialize;
use tracing::{debug, warn};

const GIB: f64 = 1024.0 * 1024.0 * 1024.0;

const METAL_PROBE: &str = "import mlx.core as mx; print(mx.metal.is_available())";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SystemInfo {
    pub total_memory_gb: f64,
    pub available_memory_gb: f64,
    pub accelerator_available: bool,
    pub chip_name: Option<String>,
}

impl fmt::Display for SystemInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Memory: {:.1}GB available / {:.1}GB total, accelerator: {}",
            self.available_memory_gb,
            self.total_memory_gb,
            if self.accelerator_available { "available" } else { "not available" },
        )?;
        if let Some(chip) = &self.chip_name {
            write!(f, " ({chip})")?;
        }
        Ok(())
    }
}

/// Source of fresh resource snapshots.
pub trait SystemProbe: Send + Sync {
    fn detect(&self) -> SystemInfo;
}

/// Probes the real host.
#[derive(Debug, Clone)]
pub struct SystemDetector {
    python: String,
}

impl Default for SystemDetector {
    fn default() -> Self {
        Self::new("python3")
    }
}

impl SystemDetector {
    /// `python` is the interpreter used to load the acceleration runtime.
    pub fn new(python: impl Into<String>) -> Self {
        Self { python: python.into() }
    }

    fn total_memory_gb(&self) -> f64 {
        match run("sysctl", &["-n", "hw.memsize"]).and_then(|s| s.trim().parse::<u64>().ok()) {
            Some(bytes) => bytes as f64 / GIB,
            None => {
                debug!("sysctl hw.memsize unavailable, using general memory source");
                general_memory().map(|m| m.total_gb).unwrap_or(0.0)
            }
        }
    }

    fn available_memory_gb(&self) -> f64 {
        general_memory().map(|m| m.available_gb).unwrap_or_else(|| {
            warn!("Could not determine available memory, assuming none");
            0.0
        })
    }

    fn accelerator_available(&self) -> bool {
        let output = match Command::new(&self.python).args(["-c", METAL_PROBE]).output() {
            Ok(o) => o,
            Err(e) => {
                warn!("Cannot run {} to check accelerator: {e}", self.python);
                return false;
            }
        };
        if !output.status.success() {
            warn!(
                "Accelerator runtime not usable: {}",
                String::from_utf8_lossy(&output.stderr).lines().last().unwrap_or("").trim()
            );
            return false;
        }
        String::from_utf8_lossy(&output.stdout).trim() == "True"
    }

    fn chip_name(&self) -> Option<String> {
        if let Some(brand) = run("sysctl", &["-n", "machdep.cpu.brand_string"]) {
            let brand = brand.trim();
            if !brand.is_empty() {
                return Some(brand.to_string());
            }
        }
        let profile = run("system_profiler", &["SPHardwareDataType"]);
        if let Some(chip) = profile.and_then(|s| parse_chip_line(&s)) {
            return Some(chip);
        }
        std::fs::read_to_string("/proc/cpuinfo")
            .ok()
            .and_then(|s| parse_cpuinfo_model(&s))
    }
}

impl SystemProbe for SystemDetector {
    fn detect(&self) -> SystemInfo {
        SystemInfo {
            total_memory_gb: self.total_memory_gb(),
            available_memory_gb: self.available_memory_gb(),
            accelerator_available: self.accelerator_available(),
            chip_name: self.chip_name(),
        }
    }
}

/// Run a host utility, returning stdout on a zero exit.
fn run(program: &str, args: &[&str]) -> Option<String> {
    match Command::new(program).args(args).output() {
        Ok(output) if output.status.success() => {
            Some(String::from_utf8_lossy(&output.stdout).into_owned())
        }
        Ok(output) => {
            debug!("{program} {args:?} exited with {}", output.status);
            None
        }
        Err(e) => {
            debug!("{program} not runnable: {e}");
            None
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct MemoryStats {
    total_gb: f64,
    available_gb: f64,
}

fn general_memory() -> Option<MemoryStats> {
    let meminfo = std::fs::read_to_string("/proc/meminfo").ok();
    if let Some(stats) = meminfo.and_then(|s| parse_meminfo(&s)) {
        return Some(stats);
    }
    let available_gb = run("vm_stat", &[]).and_then(|s| parse_vm_stat(&s))?;
    Some(MemoryStats {
        total_gb: 0.0,
        available_gb,
    })
}

/// Parse `MemTotal`/`MemAvailable` (kB) from /proc/meminfo.
fn parse_meminfo(contents: &str) -> Option<MemoryStats> {
    let field = |name: &str| -> Option<f64> {
        contents
            .lines()
            .find(|l| l.starts_with(name))
            .and_then(|l| l.split_whitespace().nth(1))
            .and_then(|v| v.parse::<u64>().ok())
            .map(|kb| kb as f64 * 1024.0 / GIB)
    };
    let total_gb = field("MemTotal:")?;
    let available_gb = field("MemAvailable:").or_else(|| field("MemFree:"))?;
    Some(MemoryStats { total_gb, available_gb })
}

/// Free + inactive + speculative pages from macOS `vm_stat`, in GB.
fn parse_vm_stat(contents: &str) -> Option<f64> {
    let page_size = contents
        .lines()
        .next()
        .and_then(|l| l.split("page size of ").nth(1))
        .and_then(|s| s.split_whitespace().next())
        .and_then(|s| s.parse::<u64>().ok())
        .unwrap_or(4096);

    let pages = |name: &str| -> u64 {
        contents
            .lines()
            .find(|l| l.starts_with(name))
            .and_then(|l| l.rsplit(':').next())
            .and_then(|v| v.trim().trim_end_matches('.').parse::<u64>().ok())
            .unwrap_or(0)
    };

    let free = pages("Pages free") + pages("Pages inactive") + pages("Pages speculative");
    if free == 0 {
        return None;
    }
    Some((free * page_size) as f64 / GIB)
}

fn parse_chip_line(profile: &str) -> Option<String> {
    profile
        .lines()
        .find(|l| l.contains("Chip"))
        .and_then(|l| l.rsplit(':').next())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

fn parse_cpuinfo_model(cpuinfo: &str) -> Option<String> {
    cpuinfo
        .lines()
        .find(|l| l.starts_with("model name"))
        .and_then(|l| l.split(':').nth(1))
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}
