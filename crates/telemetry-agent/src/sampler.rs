//! Runtime statistics sampling.

use rand::Rng;
use sysinfo::{Pid, ProcessesToUpdate, System};
use tracing::warn;

use telemetry_state::Metric;

/// Name of the random gauge emitted with every sample.
pub const RANDOM_VALUE: &str = "RandomValue";

/// Source of named gauges, read once per poll.
pub trait Sampler: Send {
    fn sample(&mut self) -> Vec<Metric>;
}

/// Samples the current process and the host it runs on.
pub struct ProcessSampler {
    system: System,
    pid: Option<Pid>,
}

impl ProcessSampler {
    pub fn new() -> Self {
        let pid = sysinfo::get_current_pid()
            .inspect_err(|e| warn!(error = %e, "process id unavailable, skipping process gauges"))
            .ok();
        Self {
            system: System::new(),
            pid,
        }
    }
}

impl Default for ProcessSampler {
    fn default() -> Self {
        Self::new()
    }
}

impl Sampler for ProcessSampler {
    fn sample(&mut self) -> Vec<Metric> {
        let sys = &mut self.system;
        sys.refresh_memory();
        sys.refresh_cpu_usage();

        let mut metrics = vec![
            Metric::gauge("TotalMemory", sys.total_memory() as f64),
            Metric::gauge("UsedMemory", sys.used_memory() as f64),
            Metric::gauge("FreeMemory", sys.free_memory() as f64),
            Metric::gauge("AvailableMemory", sys.available_memory() as f64),
            Metric::gauge("TotalSwap", sys.total_swap() as f64),
            Metric::gauge("UsedSwap", sys.used_swap() as f64),
            Metric::gauge("CPUutilization", f64::from(sys.global_cpu_usage())),
            Metric::gauge("CPUCount", sys.cpus().len() as f64),
        ];

        if let Some(pid) = self.pid {
            sys.refresh_processes(ProcessesToUpdate::Some(&[pid]), true);
            if let Some(process) = sys.process(pid) {
                metrics.extend([
                    Metric::gauge("ProcessMemory", process.memory() as f64),
                    Metric::gauge("ProcessVirtualMemory", process.virtual_memory() as f64),
                    Metric::gauge("ProcessCPUUsage", f64::from(process.cpu_usage())),
                    Metric::gauge("ProcessRunTime", process.run_time() as f64),
                ]);
            }
        }

        metrics.push(Metric::gauge(RANDOM_VALUE, rand::rng().random::<f64>()));
        metrics
    }
}
