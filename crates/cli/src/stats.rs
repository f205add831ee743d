//! Per-client execution counters and the results table.

use std::fmt;
use std::time::Duration;

/// Counters for one client (or the merged total)
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Results {
    /// Transactions committed
    pub executed: u64,
    /// Attempts the store rejected
    pub aborts: u64,
    /// Transactions given up after the retry budget or an error
    pub failed: u64,
    /// Summed latency of committed transactions, retries included
    pub latency: Duration,
}

impl Results {
    /// Record a committed transaction
    pub fn record_commit(&mut self, latency: Duration) {
        self.executed += 1;
        self.latency += latency;
    }

    /// Record rejected attempts
    pub fn record_aborts(&mut self, count: u64) {
        self.aborts += count;
    }

    /// Record a transaction that never committed
    pub fn record_failure(&mut self) {
        self.failed += 1;
    }

    /// Mean latency of committed transactions
    pub fn mean_latency(&self) -> Duration {
        match u32::try_from(self.executed) {
            Ok(0) => Duration::ZERO,
            Ok(n) => self.latency / n,
            Err(_) => Duration::from_secs_f64(self.latency.as_secs_f64() / self.executed as f64),
        }
    }

    /// Add another client's counters to these
    pub fn merge(&mut self, other: &Results) {
        self.executed += other.executed;
        self.aborts += other.aborts;
        self.failed += other.failed;
        self.latency += other.latency;
    }
}

/// Rendered table of per-client results plus the total
pub struct Report<'a> {
    /// One entry per client
    pub clients: &'a [Results],
    /// Wall time of the run
    pub elapsed: Duration,
}

impl fmt::Display for Report<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut total = Results::default();
        for r in self.clients {
            total.merge(r);
        }

        writeln!(
            f,
            "Execution Results after {:.3} seconds",
            self.elapsed.as_secs_f64()
        )?;
        writeln!(
            f,
            "{:<8}{:>12}{:>10}{:>10}{:>14}",
            "client", "executed", "aborts", "failed", "mean (us)"
        )?;
        for (i, r) in self.clients.iter().enumerate() {
            row(f, &(i + 1).to_string(), r)?;
        }
        row(f, "TOTAL", &total)?;

        let secs = self.elapsed.as_secs_f64();
        if secs > 0.0 {
            writeln!(f, "Throughput: {:.1} txn/s", total.executed as f64 / secs)?;
        }
        Ok(())
    }
}

fn row(f: &mut fmt::Formatter<'_>, label: &str, r: &Results) -> fmt::Result {
    writeln!(
        f,
        "{:<8}{:>12}{:>10}{:>10}{:>14}",
        label,
        r.executed,
        r.aborts,
        r.failed,
        r.mean_latency().as_micros()
    )
}
