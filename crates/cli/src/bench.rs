//! Payment-style workload over an in-process store.
//!
//! Each client thread owns one `TransactionClient` and runs a fixed number of
//! payment transactions against a shared `MemoryStore`:
//!
//! - reference reads of the warehouse and district rows (`get_notxn`)
//! - deferred `ADD_FLOAT` on the warehouse and district YTD
//! - concrete read-modify-write of the customer balance
//! - a history row insert

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{anyhow, Context};
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use uuid::Uuid;

use deferkv_concurrency::future::render_float;
use deferkv_concurrency::{run_with_retry, TransactionClient};
use deferkv_core::keys::{self, field};
use deferkv_core::{ClientConfig, ExprError, Result, Store, StoreResult};
use deferkv_storage::MemoryStore;

use crate::stats::Results;

/// Districts loaded per warehouse
pub const DISTRICTS_PER_WAREHOUSE: u64 = 10;
/// Customers loaded per district
pub const CUSTOMERS_PER_DISTRICT: u64 = 100;

const INITIAL_W_YTD: f64 = 300_000.0;
const INITIAL_D_YTD: f64 = 30_000.0;
const INITIAL_C_BALANCE: f64 = -10.0;

// Keeps the rejection stream apart from the payment stream of the same client
const REJECT_SEED_SALT: u64 = 0x9e37_79b9_7f4a_7c15;

/// Settings for one run
#[derive(Debug, Clone)]
pub struct BenchOptions {
    /// Concurrent clients
    pub clients: u32,
    /// Transactions per client
    pub transactions: u64,
    /// Warehouses to load
    pub warehouses: u64,
    /// Probability that `add` refuses a commit
    pub reject_rate: f64,
    /// Retries per transaction
    pub max_retries: u32,
    /// Workload seed; entropy when absent
    pub seed: Option<u64>,
    /// Client configuration
    pub config: ClientConfig,
}

/// Outcome of a run
#[derive(Debug)]
pub struct BenchOutcome {
    /// Counters per client, in client order
    pub clients: Vec<Results>,
    /// Wall time of the transaction phase
    pub elapsed: Duration,
    /// Commits refused by the contention wrapper
    pub rejected: u64,
}

/// Store wrapper that refuses commits at random
///
/// Stands in for a validating store under contention: `add` returns false with
/// probability `reject_rate`, everything else goes to the inner store. With a
/// seed the accept/reject sequence is the same on every run.
pub struct ContendedStore<S> {
    inner: S,
    reject_rate: f64,
    rng: Mutex<StdRng>,
    rejected: AtomicU64,
}

impl<S: Store> ContendedStore<S> {
    /// Wrap `inner`, drawing rejections from `seed` or from entropy
    pub fn new(inner: S, reject_rate: f64, seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            inner,
            reject_rate: reject_rate.clamp(0.0, 1.0),
            rng: Mutex::new(rng),
            rejected: AtomicU64::new(0),
        }
    }

    /// Commits refused so far
    pub fn rejected(&self) -> u64 {
        self.rejected.load(Ordering::Relaxed)
    }
}

impl<S: Store> Store for ContendedStore<S> {
    fn get(&self, key: &str) -> StoreResult<Option<Vec<u8>>> {
        self.inner.get(key)
    }

    fn multi_get(&self, keys: &[String]) -> StoreResult<HashMap<String, (Vec<u8>, u64)>> {
        self.inner.multi_get(keys)
    }

    fn add(&self, key: &str, value: &[u8]) -> StoreResult<bool> {
        if self.reject_rate > 0.0 && self.rng.lock().gen_bool(self.reject_rate) {
            self.rejected.fetch_add(1, Ordering::Relaxed);
            return Ok(false);
        }
        self.inner.add(key, value)
    }

    fn incr(&self, key: &str, delta: u64) -> StoreResult<Option<u64>> {
        self.inner.incr(key, delta)
    }

    fn decr(&self, key: &str, delta: u64) -> StoreResult<Option<u64>> {
        self.inner.decr(key, delta)
    }

    fn set(&self, key: &str, value: &[u8]) -> StoreResult<()> {
        self.inner.set(key, value)
    }
}

/// Bulk-load warehouses, districts and customers
pub fn load<S: Store>(store: &S, warehouses: u64) -> Result<()> {
    for w in 1..=warehouses {
        store.set(&keys::warehouse(w, field::RECORD), format!("W{}", w).as_bytes())?;
        store.set(&keys::warehouse(w, field::YTD), render_float(INITIAL_W_YTD).as_bytes())?;
        for d in 1..=DISTRICTS_PER_WAREHOUSE {
            store.set(&keys::district(d, w, field::RECORD), format!("D{}", d).as_bytes())?;
            store.set(
                &keys::district(d, w, field::YTD),
                render_float(INITIAL_D_YTD).as_bytes(),
            )?;
            for c in 1..=CUSTOMERS_PER_DISTRICT {
                store.set(
                    &keys::customer(c, d, w, field::BALANCE),
                    render_float(INITIAL_C_BALANCE).as_bytes(),
                )?;
            }
        }
    }
    tracing::info!(warehouses, "Load finished");
    Ok(())
}

/// Inputs of one payment
#[derive(Debug, Clone)]
pub struct Payment {
    w_id: u64,
    d_id: u64,
    c_id: u64,
    amount: f64,
}

impl Payment {
    /// Draw a payment for a random customer
    pub fn random(rng: &mut impl Rng, warehouses: u64) -> Self {
        let cents: u32 = rng.gen_range(100..=500_000);
        Self {
            w_id: rng.gen_range(1..=warehouses),
            d_id: rng.gen_range(1..=DISTRICTS_PER_WAREHOUSE),
            c_id: rng.gen_range(1..=CUSTOMERS_PER_DISTRICT),
            amount: f64::from(cents) / 100.0,
        }
    }

    /// Transaction body
    pub fn execute<S: Store>(&self, client: &mut TransactionClient<S>) -> Result<()> {
        let (w, d, c) = (self.w_id, self.d_id, self.c_id);

        let w_name = client.get_notxn(&keys::warehouse(w, field::RECORD))?;
        let d_name = client.get_notxn(&keys::district(d, w, field::RECORD))?;

        let w_ytd_key = keys::warehouse(w, field::YTD);
        let w_ytd = client.get_deferred(&w_ytd_key)?;
        let w_next = client.add(w_ytd, self.amount)?;
        client.put_deferred(&w_ytd_key, w_next)?;

        let d_ytd_key = keys::district(d, w, field::YTD);
        let d_ytd = client.get_deferred(&d_ytd_key)?;
        let d_next = client.add(d_ytd, self.amount)?;
        client.put_deferred(&d_ytd_key, d_next)?;

        let balance_key = keys::customer(c, d, w, field::BALANCE);
        let balance = client.get(&balance_key)?;
        let text = String::from_utf8_lossy(balance.value().unwrap_or_default()).into_owned();
        let current: f64 = text.trim().parse().map_err(|_| ExprError::NotANumber {
            value: text.clone(),
            expected: "float",
        })?;
        client.put(&balance_key, render_float(current - self.amount))?;

        let mut h_data = w_name;
        h_data.extend_from_slice(b"    ");
        h_data.extend_from_slice(&d_name);
        client.put(
            &keys::history(&Uuid::new_v4(), c, w, w, field::RECORD),
            h_data,
        )?;
        Ok(())
    }
}

/// Run one client to completion
pub fn run_client<S: Store>(store: S, opts: &BenchOptions, index: u32) -> Results {
    let mut rng = match opts.seed {
        Some(seed) => StdRng::seed_from_u64(seed.wrapping_add(u64::from(index))),
        None => StdRng::from_entropy(),
    };
    let mut client = TransactionClient::with_config(store, opts.config.clone());
    let mut results = Results::default();

    for _ in 0..opts.transactions {
        let payment = Payment::random(&mut rng, opts.warehouses);
        let start = Instant::now();
        let mut attempts = 0u64;
        let outcome = run_with_retry(&mut client, opts.max_retries, |c| {
            attempts += 1;
            payment.execute(c)
        });

        match outcome {
            Ok(()) => {
                results.record_aborts(attempts.saturating_sub(1));
                results.record_commit(start.elapsed());
            }
            Err(e) => {
                let rejected = if e.is_retryable() {
                    attempts
                } else {
                    attempts.saturating_sub(1)
                };
                results.record_aborts(rejected);
                results.record_failure();
                tracing::warn!(client = index, error = %e, "Payment failed");
            }
        }
    }
    results
}

/// Load the store, run every client on its own thread, collect the counters
///
/// Each client commits through its own `ContendedStore` over the shared data,
/// so with a seed its rejections do not depend on thread scheduling.
pub fn run(opts: &BenchOptions) -> anyhow::Result<BenchOutcome> {
    let shared = Arc::new(MemoryStore::new());
    load(&*shared, opts.warehouses).context("Failed to load initial data")?;

    let stores: Vec<_> = (0..opts.clients)
        .map(|index| {
            let seed = opts
                .seed
                .map(|seed| seed.wrapping_add(u64::from(index)) ^ REJECT_SEED_SALT);
            Arc::new(ContendedStore::new(Arc::clone(&shared), opts.reject_rate, seed))
        })
        .collect();

    let start = Instant::now();
    let mut handles = Vec::with_capacity(stores.len());
    for (index, store) in (0..opts.clients).zip(&stores) {
        let store = Arc::clone(store);
        let opts = opts.clone();
        let handle = thread::Builder::new()
            .name(format!("client-{}", index + 1))
            .spawn(move || run_client(store, &opts, index))
            .context("Failed to spawn client thread")?;
        handles.push(handle);
    }

    let mut clients = Vec::with_capacity(handles.len());
    for handle in handles {
        let results = handle
            .join()
            .map_err(|_| anyhow!("Client thread panicked"))?;
        clients.push(results);
    }
    let elapsed = start.elapsed();

    let committed: u64 = clients.iter().map(|r| r.executed).sum();
    tracing::info!(committed, elapsed_ms = elapsed.as_millis() as u64, "Run finished");

    Ok(BenchOutcome {
        clients,
        elapsed,
        rejected: stores.iter().map(|s| s.rejected()).sum(),
    })
}
