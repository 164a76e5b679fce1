//! Partition context: cross-partition norms and shared-equation exchange.
//!
//! Distributed runs split a domain across partitions; vector norms must then
//! count each equation exactly once (ownership mask) and accumulate partial
//! sums across partitions, and accumulated quantities at shared equations
//! must be completed by a synchronous pack → exchange → unpack round. The
//! serial context degenerates to plain norms and a no-op exchange.

use std::sync::mpsc::{Receiver, Sender, channel};
use std::sync::{Arc, Mutex};

use nalgebra::DVector;

/// Reserved tag for scalar accumulation rounds.
const REDUCE_TAG: u32 = 0;

/// Blocking exchange with the peer partition(s). Every participant must
/// complete its send/receive round before `exchange` returns; there is no
/// partial-progress mode.
pub trait PartitionComm: Send + Sync {
    fn rank(&self) -> usize;

    fn n_partitions(&self) -> usize;

    /// Send `payload` to the peer and return what the peer sent, matching
    /// `tag` on both sides.
    fn exchange(&self, tag: u32, payload: &[f64]) -> Vec<f64>;

    /// Sum a partition-local scalar across all partitions.
    fn accumulate(&self, local: f64) -> f64 {
        if self.n_partitions() == 1 {
            return local;
        }
        let received = self.exchange(REDUCE_TAG, &[local]);
        local + received.iter().sum::<f64>()
    }
}

/// Single-partition communicator.
#[derive(Debug, Clone, Copy, Default)]
pub struct SerialComm;

impl PartitionComm for SerialComm {
    fn rank(&self) -> usize {
        0
    }

    fn n_partitions(&self) -> usize {
        1
    }

    fn exchange(&self, _tag: u32, _payload: &[f64]) -> Vec<f64> {
        Vec::new()
    }
}

/// In-process two-partition communicator backed by a channel pair. Used by
/// tests; a cluster deployment would put a message-passing library behind
/// the same trait.
pub struct ChannelComm {
    rank: usize,
    tx: Mutex<Sender<(u32, Vec<f64>)>>,
    rx: Mutex<Receiver<(u32, Vec<f64>)>>,
}

impl ChannelComm {
    /// Build both endpoints of a two-partition run.
    pub fn pair() -> (ChannelComm, ChannelComm) {
        let (tx_a, rx_b) = channel();
        let (tx_b, rx_a) = channel();
        (
            ChannelComm {
                rank: 0,
                tx: Mutex::new(tx_a),
                rx: Mutex::new(rx_a),
            },
            ChannelComm {
                rank: 1,
                tx: Mutex::new(tx_b),
                rx: Mutex::new(rx_b),
            },
        )
    }
}

impl PartitionComm for ChannelComm {
    fn rank(&self) -> usize {
        self.rank
    }

    fn n_partitions(&self) -> usize {
        2
    }

    fn exchange(&self, tag: u32, payload: &[f64]) -> Vec<f64> {
        self.tx
            .lock()
            .unwrap()
            .send((tag, payload.to_vec()))
            .expect("peer partition hung up");
        let (peer_tag, data) = self.rx.lock().unwrap().recv().expect("peer partition hung up");
        assert_eq!(peer_tag, tag, "mismatched exchange round");
        data
    }
}

/// Per-domain partition context.
///
/// `owned` masks the equations this partition counts in norms (empty mask =
/// everything owned); `shared_eqs` lists the 0-based equations whose
/// accumulated values must be completed with peer contributions, in the
/// exchange order agreed by both sides.
pub struct ParallelContext {
    comm: Arc<dyn PartitionComm>,
    owned: Vec<bool>,
    shared_eqs: Vec<usize>,
}

impl ParallelContext {
    /// Context of a single-process run: every equation owned, nothing shared.
    pub fn serial() -> Self {
        Self {
            comm: Arc::new(SerialComm),
            owned: Vec::new(),
            shared_eqs: Vec::new(),
        }
    }

    pub fn new(comm: Arc<dyn PartitionComm>, owned: Vec<bool>, shared_eqs: Vec<usize>) -> Self {
        Self {
            comm,
            owned,
            shared_eqs,
        }
    }

    pub fn is_parallel(&self) -> bool {
        self.comm.n_partitions() > 1
    }

    /// Whether this partition owns (counts) the given 0-based equation.
    pub fn owns(&self, eq: usize) -> bool {
        self.owned.get(eq).copied().unwrap_or(true)
    }

    /// Sum a partition-local scalar across partitions.
    pub fn accumulate(&self, local: f64) -> f64 {
        self.comm.accumulate(local)
    }

    /// Norm of a distributed vector, counting owned equations once.
    pub fn local_norm(&self, v: &DVector<f64>) -> f64 {
        let partial: f64 = v
            .iter()
            .enumerate()
            .filter(|(eq, _)| self.owns(*eq))
            .map(|(_, x)| x * x)
            .sum();
        self.comm.accumulate(partial).sqrt()
    }

    /// Dot product of distributed vectors, counting owned equations once.
    pub fn local_dot_product(&self, a: &DVector<f64>, b: &DVector<f64>) -> f64 {
        assert_eq!(a.len(), b.len());
        let partial: f64 = (0..a.len())
            .filter(|&eq| self.owns(eq))
            .map(|eq| a[eq] * b[eq])
            .sum();
        self.comm.accumulate(partial)
    }

    /// Complete accumulated values at shared equations: pack this side's
    /// contributions, exchange with the peer, unpack by adding the received
    /// contributions in place.
    pub fn exchange_shared(&self, v: &mut DVector<f64>, tag: u32) {
        if !self.is_parallel() || self.shared_eqs.is_empty() {
            return;
        }
        let packed: Vec<f64> = self.shared_eqs.iter().map(|&eq| v[eq]).collect();
        let received = self.comm.exchange(tag, &packed);
        assert_eq!(received.len(), self.shared_eqs.len());
        for (k, &eq) in self.shared_eqs.iter().enumerate() {
            v[eq] += received[k];
        }
    }
}
