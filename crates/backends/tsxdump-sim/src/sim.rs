use std::cell::{Cell, RefCell};
use std::collections::{HashMap, HashSet};

use log::trace;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tsxdump_core::TargetAddress;
use tsxdump_core::primitives::CachePrimitives;
use tsxdump_core::util::CL_SIZE;

/// Latency and noise model of the simulated core.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SimConfig {
    /// Cycles for a load served from the cache
    pub hit_cycles: u64,
    /// Cycles for a load served from memory
    pub miss_cycles: u64,
    /// Uniform extra latency `0..=jitter` added to every load
    pub jitter: u64,
    /// Probability that a miss is measured with hit latency
    pub false_hit_rate: f64,
    /// Probability that a transaction is denied
    pub abort_rate: f64,
    /// RNG seed, for reproducible noise
    pub seed: u64,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            hit_cycles: 40,
            miss_cycles: 280,
            jitter: 0,
            false_hit_rate: 0.0,
            abort_rate: 0.0,
            seed: 0,
        }
    }
}

/// Software model of one core with a single cache level and RTM.
///
/// Target bytes are registered with [`map_bytes`](SimulatedCpu::map_bytes) and can only
/// be read transactionally, like kernel memory under a suppressed fault. Unmapped
/// targets read as zero.
pub struct SimulatedCpu {
    config: SimConfig,
    clock: Cell<u64>,
    cached: RefCell<HashSet<usize>>,
    memory: RefCell<HashMap<usize, u8>>,
    rng: RefCell<StdRng>,
    in_transaction: Cell<bool>,
    transactions: Cell<u64>,
    denied: Cell<u64>,
}

fn line(addr: *const u8) -> usize {
    addr as usize & !(CL_SIZE - 1)
}

impl SimulatedCpu {
    /// Creates a simulated core with an empty cache.
    pub fn new(config: SimConfig) -> Self {
        SimulatedCpu {
            rng: RefCell::new(StdRng::seed_from_u64(config.seed)),
            config,
            clock: Cell::new(0),
            cached: RefCell::new(HashSet::new()),
            memory: RefCell::new(HashMap::new()),
            in_transaction: Cell::new(false),
            transactions: Cell::new(0),
            denied: Cell::new(0),
        }
    }

    /// Places `bytes` at `base` in protected memory.
    pub fn map_bytes(&self, base: TargetAddress, bytes: &[u8]) {
        let mut memory = self.memory.borrow_mut();
        for (i, &byte) in bytes.iter().enumerate() {
            memory.insert(base.offset(i).as_usize(), byte);
        }
    }

    /// Whether the line containing `addr` is currently cached.
    pub fn is_cached(&self, addr: *const u8) -> bool {
        self.cached.borrow().contains(&line(addr))
    }

    /// Transactions started so far.
    pub fn transactions(&self) -> u64 {
        self.transactions.get()
    }

    /// Transactions denied so far.
    pub fn denied(&self) -> u64 {
        self.denied.get()
    }

    fn load_latency(&self, hit: bool) -> u64 {
        let mut rng = self.rng.borrow_mut();
        let base = if hit || rng.random_bool(self.config.false_hit_rate) {
            self.config.hit_cycles
        } else {
            self.config.miss_cycles
        };
        base + rng.random_range(0..=self.config.jitter)
    }
}

// SAFETY: the simulation never dereferences any address it is handed.
unsafe impl CachePrimitives for SimulatedCpu {
    unsafe fn flush(&self, addr: *const u8) {
        self.cached.borrow_mut().remove(&line(addr));
    }

    fn fence(&self) {}

    fn read_timestamp(&self) -> u64 {
        self.clock.set(self.clock.get() + 1);
        self.clock.get()
    }

    unsafe fn touch(&self, addr: *const u8) {
        let hit = !self.cached.borrow_mut().insert(line(addr));
        let latency = self.load_latency(hit);
        self.clock.set(self.clock.get() + latency);
    }

    unsafe fn load_byte(&self, addr: *const u8) -> u8 {
        assert!(
            self.in_transaction.get(),
            "load_byte outside of a transaction at {:p}",
            addr
        );
        self.memory
            .borrow()
            .get(&(addr as usize))
            .copied()
            .unwrap_or(0)
    }

    unsafe fn begin_transaction(&self) -> bool {
        assert!(!self.in_transaction.get(), "nested transaction");
        if self.rng.borrow_mut().random_bool(self.config.abort_rate) {
            self.denied.set(self.denied.get() + 1);
            trace!("transaction denied");
            return false;
        }
        self.transactions.set(self.transactions.get() + 1);
        self.in_transaction.set(true);
        true
    }

    unsafe fn end_transaction(&self) {
        assert!(self.in_transaction.get(), "end_transaction without transaction");
        self.in_transaction.set(false);
    }
}
