//! # Candidate Selector
//!
//! Picks pool transactions for a block template.
//!
//! Algorithm: dependency-aware greedy packing over a max-heap.
//!
//! 1. Resolve the inputs of every pool transaction. Transactions that spend
//!    another pool transaction's output become orphans in an arena and wait
//!    for all their parents to be accepted.
//! 2. Ready transactions sit in a [`BinaryHeap`] ordered by fee rate and
//!    priority (see [`SelectionOrder`]), with the lower txid winning ties.
//! 3. Each popped transaction is checked against the size and sigop budgets,
//!    the relay fee floor, the overlay and the shielded-serial guard. Accepted
//!    transactions are applied to the overlay and release their dependers.
//!
//! Complexity: O(n log n) in the number of pool transactions.

use super::entities::{AssemblyStats, PoolEntry, SelectionOrder};
use crate::error::{BlockProductionError, Result};
use crate::ports::outbound::{BlockValidator, ShieldedSpendOracle};
use chain_types::script::p2sh_sigop_count;
use chain_types::{short_hex, Amount, FeeRate, SerialNumber, Transaction, TxIn, COIN};
use coin_state::CoinViewCache;
use primitive_types::H256;
use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap, HashSet};

/// Bytes reserved for the header and coinbase before selection starts.
pub const BLOCK_SIZE_RESERVE: usize = 1000;

/// Sigops reserved for the coinbase before selection starts.
pub const BLOCK_SIGOPS_RESERVE: u32 = 100;

/// Priority above which a transaction counts as high priority.
pub const HIGH_PRIORITY_THRESHOLD: f64 = COIN as f64 * 144.0 / 250.0;

/// Budgets and switches for one selection pass.
#[derive(Clone, Debug)]
pub struct SelectionPolicy {
    /// Exclusive upper bound on the accounted block size
    pub max_block_size: usize,

    /// Bytes filled in priority order before switching to fee order (priority-first only)
    pub priority_size: usize,

    /// Exclusive upper bound on the accounted sigops
    pub max_block_sigops: u32,

    /// Transactions paying less are skipped unless they carry shielded spends
    pub min_relay_fee: FeeRate,

    /// Initial heap ordering
    pub order: SelectionOrder,

    /// Shielded spends are suspended
    pub maintenance_mode: bool,

    /// Fail on pool transactions with unresolvable inputs
    pub strict_pool_checks: bool,

    /// Log every accepted transaction
    pub print_priority: bool,
}

impl SelectionPolicy {
    /// Relay floor from a per-kilobyte fee, lowered by one unit to absorb rounding.
    pub fn relay_floor(min_relay_fee_per_kb: Amount) -> FeeRate {
        FeeRate::from_per_kb(min_relay_fee_per_kb - 1)
    }
}

/// Result of a selection pass.
#[derive(Clone, Debug, Default)]
pub struct Selection {
    /// Accepted transactions in block order
    pub transactions: Vec<Transaction>,

    /// Fee of each accepted transaction
    pub fees: Vec<Amount>,

    /// Legacy plus P2SH sigops of each accepted transaction
    pub sigops: Vec<u32>,

    /// Running totals including the reserves
    pub stats: AssemblyStats,
}

/// Heap entry. `slot` indexes the txid-sorted pool snapshot.
#[derive(Clone, Copy, Debug)]
struct Candidate {
    priority: f64,
    fee_rate: FeeRate,
    txid: H256,
    slot: usize,
    order: SelectionOrder,
}

impl Candidate {
    fn with_order(mut self, order: SelectionOrder) -> Self {
        self.order = order;
        self
    }
}

impl PartialEq for Candidate {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Candidate {}

impl PartialOrd for Candidate {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Candidate {
    fn cmp(&self, other: &Self) -> Ordering {
        let by_fee = self.fee_rate.cmp(&other.fee_rate);
        let by_priority = self.priority.total_cmp(&other.priority);
        let primary = match self.order {
            SelectionOrder::FeeRateFirst => by_fee.then(by_priority),
            SelectionOrder::PriorityFirst => by_priority.then(by_fee),
        };
        // Max-heap: the lower txid must compare greater.
        primary.then_with(|| other.txid.cmp(&self.txid))
    }
}

/// Transaction waiting for pool parents.
#[derive(Debug)]
struct Orphan {
    slot: usize,
    depends_on: HashSet<H256>,
    priority: f64,
    fee_rate: FeeRate,
}

/// Greedy transaction selector.
pub struct CandidateSelector<'a> {
    policy: SelectionPolicy,
    shielded: &'a dyn ShieldedSpendOracle,
    verifier: &'a dyn BlockValidator,
}

impl<'a> CandidateSelector<'a> {
    /// Selector with the given policy and consensus collaborators.
    pub fn new(
        policy: SelectionPolicy,
        shielded: &'a dyn ShieldedSpendOracle,
        verifier: &'a dyn BlockValidator,
    ) -> Self {
        Self {
            policy,
            shielded,
            verifier,
        }
    }

    /// Policy in use.
    pub fn policy(&self) -> &SelectionPolicy {
        &self.policy
    }

    /// Select from `pool` for a block at `height`, applying accepted transactions to `view`.
    ///
    /// `block_time` is used for lock-time finality.
    #[tracing::instrument(skip(self, pool, view), fields(pool_size = pool.len()))]
    pub fn select(
        &self,
        mut pool: Vec<PoolEntry>,
        view: &mut CoinViewCache<'_>,
        height: u32,
        block_time: i64,
    ) -> Result<Selection> {
        pool.sort_by(|a, b| a.txid.cmp(&b.txid));
        let pool_index: HashMap<H256, usize> = pool
            .iter()
            .enumerate()
            .map(|(slot, entry)| (entry.txid, slot))
            .collect();

        let mut order = self.policy.order;
        let mut heap: BinaryHeap<Candidate> = BinaryHeap::with_capacity(pool.len());
        let mut orphans: Vec<Orphan> = Vec::new();
        let mut dependers: HashMap<H256, Vec<usize>> = HashMap::new();

        for (slot, entry) in pool.iter().enumerate() {
            let tx = &entry.tx;
            if tx.is_coinbase() || tx.is_coinstake() || !tx.is_final(height, block_time) {
                continue;
            }
            if self.policy.maintenance_mode && tx.has_shielded_spends() {
                continue;
            }

            let mut priority_inputs = 0.0f64;
            let mut total_in = tx.shielded_value_in();
            let mut depends_on: HashSet<H256> = HashSet::new();
            let mut missing_input = false;

            for prevout in tx.inputs.iter().filter_map(TxIn::prevout) {
                if let Some(coin) = view.access_coin(prevout)? {
                    let age = height.saturating_sub(coin.height);
                    priority_inputs += coin.value() as f64 * f64::from(age);
                    total_in = total_in.saturating_add(coin.value());
                    continue;
                }

                let parent_value = pool_index
                    .get(&prevout.txid)
                    .and_then(|&parent| pool[parent].tx.outputs.get(prevout.index as usize))
                    .map(|output| output.value);
                match parent_value {
                    Some(value) => {
                        depends_on.insert(prevout.txid);
                        total_in = total_in.saturating_add(value);
                    }
                    None => {
                        missing_input = true;
                        break;
                    }
                }
            }

            if missing_input {
                tracing::error!(
                    "[selector] pool transaction {} spends an input missing from chain and pool",
                    short_hex(&entry.txid)
                );
                if self.policy.strict_pool_checks {
                    return Err(BlockProductionError::PoolInconsistency { txid: entry.txid });
                }
                continue;
            }

            let size = tx.serialized_size();
            let priority = tx.compute_priority(priority_inputs, size) + entry.priority_delta;
            total_in = total_in.saturating_add(entry.fee_delta);
            let fee_rate = FeeRate::new(total_in - tx.value_out(), size);

            if depends_on.is_empty() {
                heap.push(Candidate {
                    priority,
                    fee_rate,
                    txid: entry.txid,
                    slot,
                    order,
                });
            } else {
                let orphan = orphans.len();
                for parent in &depends_on {
                    dependers.entry(*parent).or_default().push(orphan);
                }
                orphans.push(Orphan {
                    slot,
                    depends_on,
                    priority,
                    fee_rate,
                });
            }
        }

        tracing::debug!(
            "[selector] {} ready, {} waiting on pool parents",
            heap.len(),
            orphans.len()
        );

        let mut selection = Selection {
            stats: AssemblyStats {
                block_size: BLOCK_SIZE_RESERVE,
                sigops: BLOCK_SIGOPS_RESERVE,
                ..AssemblyStats::default()
            },
            ..Selection::default()
        };
        let mut block_serials: HashSet<SerialNumber> = HashSet::new();

        while let Some(candidate) = heap.pop() {
            let entry = &pool[candidate.slot];
            let tx = &entry.tx;
            let tx_size = tx.serialized_size();

            if order == SelectionOrder::PriorityFirst
                && (selection.stats.block_size + tx_size >= self.policy.priority_size
                    || candidate.priority <= HIGH_PRIORITY_THRESHOLD)
            {
                order = SelectionOrder::FeeRateFirst;
                heap = heap
                    .into_iter()
                    .map(|c| c.with_order(order))
                    .collect();
                tracing::debug!(
                    "[selector] priority area filled at {} bytes, switching to fee order",
                    selection.stats.block_size
                );
            }

            if selection.stats.block_size + tx_size >= self.policy.max_block_size {
                continue;
            }

            let legacy_sigops = tx.legacy_sigop_count();
            if selection.stats.sigops + legacy_sigops >= self.policy.max_block_sigops {
                continue;
            }

            let shielded = tx.has_shielded_spends();
            if !shielded && candidate.fee_rate < self.policy.min_relay_fee {
                continue;
            }

            if !view.have_inputs(tx)? {
                continue;
            }

            let tx_serials = if shielded {
                match self.shielded_serials(tx, &candidate.txid, &block_serials) {
                    Some(serials) => serials,
                    None => continue,
                }
            } else {
                Vec::new()
            };

            let fee = view.value_in(tx)? - tx.value_out();

            let mut tx_sigops = legacy_sigops;
            for input in &tx.inputs {
                if let TxIn::Spend {
                    prevout,
                    script_sig,
                    ..
                } = input
                {
                    if let Some(coin) = view.access_coin(prevout)? {
                        tx_sigops += p2sh_sigop_count(coin.script_pubkey(), script_sig);
                    }
                }
            }
            if selection.stats.sigops + tx_sigops >= self.policy.max_block_sigops {
                continue;
            }

            if !self.verifier.check_inputs(tx, view, height) {
                tracing::debug!("[selector] {} failed input checks", short_hex(&candidate.txid));
                continue;
            }

            view.apply_transaction(tx, height)?;

            selection.transactions.push(tx.clone());
            selection.fees.push(fee);
            selection.sigops.push(tx_sigops);
            selection.stats.block_size += tx_size;
            selection.stats.sigops += tx_sigops;
            selection.stats.tx_count += 1;
            selection.stats.total_fees += fee;
            block_serials.extend(tx_serials);

            if self.policy.print_priority {
                tracing::info!(
                    "[selector] priority {:.1} fee {} txid {}",
                    candidate.priority,
                    candidate.fee_rate,
                    hex::encode(candidate.txid.as_bytes())
                );
            }

            if let Some(waiting) = dependers.remove(&candidate.txid) {
                for index in waiting {
                    let orphan = &mut orphans[index];
                    if orphan.depends_on.remove(&candidate.txid) && orphan.depends_on.is_empty() {
                        heap.push(Candidate {
                            priority: orphan.priority,
                            fee_rate: orphan.fee_rate,
                            txid: pool[orphan.slot].txid,
                            slot: orphan.slot,
                            order,
                        });
                    }
                }
            }
        }

        tracing::info!(
            "[selector] selected {} transactions, size={}, sigops={}, fees={}",
            selection.stats.tx_count,
            selection.stats.block_size,
            selection.stats.sigops,
            selection.stats.total_fees
        );

        Ok(selection)
    }

    /// Serials of `tx` if it may join the block, `None` if the shielded guard rejects it.
    fn shielded_serials(
        &self,
        tx: &Transaction,
        txid: &H256,
        block_serials: &HashSet<SerialNumber>,
    ) -> Option<Vec<SerialNumber>> {
        if self.shielded.is_transaction_in_chain(txid) {
            tracing::debug!("[selector] {} already in chain", short_hex(txid));
            return None;
        }

        let mut tx_serials: HashSet<&SerialNumber> = HashSet::new();
        for spend in tx.shielded_spends() {
            let serial = &spend.serial;
            let rejected = !self.shielded.has_valid_serial(spend)
                || self.shielded.is_serial_spent(serial)
                || block_serials.contains(serial)
                || !tx_serials.insert(serial);
            if rejected {
                tracing::warn!(
                    "[selector] {} rejected: serial {} is invalid or already used",
                    short_hex(txid),
                    serial
                );
                return None;
            }
        }
        Some(tx_serials.into_iter().cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{
        coinbase_tx, p2pkh, shielded_spend, spend_tx, MapCoinSource, StaticValidator,
        StaticShieldedOracle,
    };
    use chain_types::{Coin, OutPoint, TxOut, CENT};
    use proptest::prelude::*;

    const HEIGHT: u32 = 200;

    fn policy() -> SelectionPolicy {
        SelectionPolicy {
            max_block_size: 750_000,
            priority_size: 50_000,
            max_block_sigops: 40_000,
            min_relay_fee: SelectionPolicy::relay_floor(10_000),
            order: SelectionOrder::FeeRateFirst,
            maintenance_mode: false,
            strict_pool_checks: false,
            print_priority: false,
        }
    }

    fn funded(outpoints: &[(OutPoint, Amount)]) -> MapCoinSource {
        let source = MapCoinSource::default();
        for (outpoint, value) in outpoints {
            source.insert(*outpoint, Coin::new(TxOut::new(*value, p2pkh(1)), 100));
        }
        source
    }

    fn out(n: u8) -> OutPoint {
        OutPoint::new(H256::repeat_byte(n), 0)
    }

    fn run(
        policy: SelectionPolicy,
        source: &MapCoinSource,
        pool: Vec<PoolEntry>,
        oracle: &StaticShieldedOracle,
    ) -> Result<Selection> {
        let validator = StaticValidator::accepting();
        let selector = CandidateSelector::new(policy, oracle, &validator);
        let mut view = CoinViewCache::new(source);
        selector.select(pool, &mut view, HEIGHT, 1_600_000_000)
    }

    #[test]
    fn test_orders_by_fee_rate_then_releases_child() {
        let source = funded(&[(out(1), COIN), (out(2), COIN)]);
        // Parent pays a high fee; child spends the parent and pays a low fee.
        let parent = spend_tx(&[out(1)], COIN - 50 * CENT / 10);
        let child = spend_tx(&[OutPoint::new(parent.txid(), 0)], COIN - 60 * CENT / 10);
        let other = spend_tx(&[out(2)], COIN - CENT);

        let pool = vec![
            PoolEntry::new(child.clone()),
            PoolEntry::new(other.clone()),
            PoolEntry::new(parent.clone()),
        ];
        let selection = run(policy(), &source, pool, &StaticShieldedOracle::default()).unwrap();

        let ids: Vec<H256> = selection.transactions.iter().map(Transaction::txid).collect();
        assert_eq!(ids, vec![parent.txid(), other.txid(), child.txid()]);
        assert_eq!(selection.fees, vec![5 * CENT, CENT, CENT]);
        assert_eq!(selection.stats.tx_count, 3);
        assert_eq!(selection.stats.total_fees, 7 * CENT);
    }

    #[test]
    fn test_child_before_parent_in_pool_never_precedes_it() {
        let source = funded(&[(out(1), COIN)]);
        let parent = spend_tx(&[out(1)], COIN - CENT);
        // Child outbids the parent but must still wait for it.
        let child = spend_tx(&[OutPoint::new(parent.txid(), 0)], COIN - 50 * CENT);

        let pool = vec![PoolEntry::new(child.clone()), PoolEntry::new(parent.clone())];
        let selection = run(policy(), &source, pool, &StaticShieldedOracle::default()).unwrap();

        assert_eq!(selection.transactions, vec![parent, child]);
    }

    #[test]
    fn test_low_fee_skipped() {
        let source = funded(&[(out(1), COIN)]);
        let free = spend_tx(&[out(1)], COIN);
        let selection = run(
            policy(),
            &source,
            vec![PoolEntry::new(free)],
            &StaticShieldedOracle::default(),
        )
        .unwrap();
        assert!(selection.transactions.is_empty());
        assert_eq!(selection.stats.block_size, BLOCK_SIZE_RESERVE);
        assert_eq!(selection.stats.sigops, BLOCK_SIGOPS_RESERVE);
    }

    #[test]
    fn test_fee_delta_lifts_over_floor() {
        let source = funded(&[(out(1), COIN)]);
        let free = spend_tx(&[out(1)], COIN);
        let selection = run(
            policy(),
            &source,
            vec![PoolEntry::new(free).with_deltas(0.0, CENT)],
            &StaticShieldedOracle::default(),
        )
        .unwrap();
        assert_eq!(selection.transactions.len(), 1);
        // The recorded fee is the real one, the delta only affects ordering.
        assert_eq!(selection.fees, vec![0]);
    }

    #[test]
    fn test_size_budget_is_exclusive() {
        let source = funded(&[(out(1), COIN)]);
        let tx = spend_tx(&[out(1)], COIN - CENT);
        let mut tight = policy();
        tight.max_block_size = BLOCK_SIZE_RESERVE + tx.serialized_size();

        let selection = run(
            tight.clone(),
            &source,
            vec![PoolEntry::new(tx.clone())],
            &StaticShieldedOracle::default(),
        )
        .unwrap();
        assert!(selection.transactions.is_empty());

        tight.max_block_size += 1;
        let selection = run(
            tight,
            &source,
            vec![PoolEntry::new(tx)],
            &StaticShieldedOracle::default(),
        )
        .unwrap();
        assert_eq!(selection.transactions.len(), 1);
    }

    #[test]
    fn test_sigop_budget_is_exclusive() {
        let source = funded(&[(out(1), COIN)]);
        let tx = spend_tx(&[out(1)], COIN - CENT);
        let mut tight = policy();
        tight.max_block_sigops = BLOCK_SIGOPS_RESERVE + tx.legacy_sigop_count();

        let selection = run(
            tight,
            &source,
            vec![PoolEntry::new(tx)],
            &StaticShieldedOracle::default(),
        )
        .unwrap();
        assert!(selection.transactions.is_empty());
    }

    #[test]
    fn test_missing_input_skipped_or_fatal() {
        let source = funded(&[(out(1), COIN)]);
        let orphan = spend_tx(&[out(9)], COIN - CENT);
        let good = spend_tx(&[out(1)], COIN - CENT);
        let pool = vec![PoolEntry::new(orphan.clone()), PoolEntry::new(good.clone())];

        let selection = run(
            policy(),
            &source,
            pool.clone(),
            &StaticShieldedOracle::default(),
        )
        .unwrap();
        assert_eq!(selection.transactions, vec![good]);

        let mut strict = policy();
        strict.strict_pool_checks = true;
        let err = run(strict, &source, pool, &StaticShieldedOracle::default()).unwrap_err();
        assert!(matches!(
            err,
            BlockProductionError::PoolInconsistency { txid } if txid == orphan.txid()
        ));
    }

    #[test]
    fn test_coinbase_and_non_final_skipped() {
        let source = funded(&[(out(1), COIN)]);
        let mut locked = spend_tx(&[out(1)], COIN - CENT);
        locked.lock_time = HEIGHT + 10;
        if let TxIn::Spend { sequence, .. } = &mut locked.inputs[0] {
            *sequence = 0;
        }
        let pool = vec![
            PoolEntry::new(coinbase_tx(HEIGHT, COIN)),
            PoolEntry::new(locked),
        ];
        let selection = run(policy(), &source, pool, &StaticShieldedOracle::default()).unwrap();
        assert!(selection.transactions.is_empty());
    }

    #[test]
    fn test_duplicate_serial_across_block_rejected() {
        let source = MapCoinSource::default();
        let first = shielded_spend(&[&[7; 8]], 10 * COIN, 10 * COIN - CENT);
        let second = shielded_spend(&[&[7; 8]], 10 * COIN, 10 * COIN - 2 * CENT);
        let pool = vec![PoolEntry::new(first), PoolEntry::new(second.clone())];

        let selection = run(policy(), &source, pool, &StaticShieldedOracle::default()).unwrap();
        // The higher fee spend wins; the other reuses its serial.
        assert_eq!(selection.transactions, vec![second]);
    }

    #[test]
    fn test_shielded_guard_conditions() {
        let source = MapCoinSource::default();
        let repeated = shielded_spend(&[&[1; 8], &[1; 8]], 5 * COIN, 10 * COIN - CENT);
        let spent = shielded_spend(&[&[2; 8]], 10 * COIN, 10 * COIN - CENT);
        let invalid = shielded_spend(&[&[3; 8]], 10 * COIN, 10 * COIN - CENT);
        let confirmed = shielded_spend(&[&[4; 8]], 10 * COIN, 10 * COIN - CENT);
        let fine = shielded_spend(&[&[5; 8]], 10 * COIN, 10 * COIN);

        let oracle = StaticShieldedOracle::default();
        oracle.mark_spent(SerialNumber(vec![2; 8]));
        oracle.mark_invalid(SerialNumber(vec![3; 8]));
        oracle.mark_in_chain(confirmed.txid());

        let pool = vec![repeated, spent, invalid, confirmed, fine.clone()]
            .into_iter()
            .map(PoolEntry::new)
            .collect();
        let selection = run(policy(), &source, pool, &oracle).unwrap();

        // Zero-fee shielded spends bypass the relay floor.
        assert_eq!(selection.transactions, vec![fine]);
        assert_eq!(selection.fees, vec![0]);
    }

    #[test]
    fn test_maintenance_mode_drops_shielded() {
        let source = MapCoinSource::default();
        let spend = shielded_spend(&[&[5; 8]], 10 * COIN, 10 * COIN - CENT);
        let mut maintenance = policy();
        maintenance.maintenance_mode = true;
        let selection = run(
            maintenance,
            &source,
            vec![PoolEntry::new(spend)],
            &StaticShieldedOracle::default(),
        )
        .unwrap();
        assert!(selection.transactions.is_empty());
    }

    #[test]
    fn test_rejected_inputs_skip_transaction() {
        let source = funded(&[(out(1), COIN)]);
        let tx = spend_tx(&[out(1)], COIN - CENT);
        let oracle = StaticShieldedOracle::default();
        let validator = StaticValidator::rejecting_inputs();
        let selector = CandidateSelector::new(policy(), &oracle, &validator);
        let mut view = CoinViewCache::new(&source);

        let selection = selector
            .select(vec![PoolEntry::new(tx)], &mut view, HEIGHT, 0)
            .unwrap();
        assert!(selection.transactions.is_empty());
        assert_eq!(view.dirty_count(), 0);
    }

    #[test]
    fn test_priority_first_prefers_old_coins() {
        // Old coin: high priority, low fee. Young coin: high fee, low priority.
        let source = MapCoinSource::default();
        source.insert(out(1), Coin::new(TxOut::new(100 * COIN, p2pkh(1)), 1));
        source.insert(out(2), Coin::new(TxOut::new(COIN, p2pkh(1)), HEIGHT - 1));
        let old = spend_tx(&[out(1)], 100 * COIN - CENT);
        let young = spend_tx(&[out(2)], COIN - 10 * CENT);

        let pool = vec![PoolEntry::new(young.clone()), PoolEntry::new(old.clone())];
        let mut by_priority = policy();
        by_priority.order = SelectionOrder::PriorityFirst;
        let selection = run(by_priority, &source, pool.clone(), &StaticShieldedOracle::default())
            .unwrap();
        assert_eq!(selection.transactions, vec![old.clone(), young.clone()]);

        let selection = run(policy(), &source, pool, &StaticShieldedOracle::default()).unwrap();
        assert_eq!(selection.transactions, vec![young, old]);
    }

    #[test]
    fn test_selection_is_deterministic_for_a_snapshot() {
        let source = funded(&[(out(1), COIN), (out(2), COIN), (out(3), COIN)]);
        let parent = spend_tx(&[out(1)], COIN - 2 * CENT);
        let child = spend_tx(&[OutPoint::new(parent.txid(), 0)], COIN - 3 * CENT);
        // Equal fee rates: only the txid tiebreak orders these two.
        let tie_a = spend_tx(&[out(2)], COIN - CENT);
        let tie_b = spend_tx(&[out(3)], COIN - CENT);
        // Two spends of one serial: exactly one may survive the guard.
        let serial_a = shielded_spend(&[&[9; 8]], 10 * COIN, 10 * COIN - CENT);
        let serial_b = shielded_spend(&[&[9; 8]], 10 * COIN, 10 * COIN - 2 * CENT);

        let pool: Vec<PoolEntry> = vec![child, tie_b, serial_a, parent, tie_a, serial_b]
            .into_iter()
            .map(PoolEntry::new)
            .collect();
        let mut reversed = pool.clone();
        reversed.reverse();

        let oracle = StaticShieldedOracle::default();
        let first = run(policy(), &source, pool.clone(), &oracle).unwrap();
        let again = run(policy(), &source, pool, &oracle).unwrap();
        let shuffled = run(policy(), &source, reversed, &oracle).unwrap();

        for other in [&again, &shuffled] {
            assert_eq!(first.transactions, other.transactions);
            assert_eq!(first.fees, other.fees);
            assert_eq!(first.sigops, other.sigops);
            assert_eq!(first.stats, other.stats);
        }
        assert_eq!(first.stats.tx_count, 5);
        let shielded: Vec<&Transaction> = first
            .transactions
            .iter()
            .filter(|tx| tx.has_shielded_spends())
            .collect();
        assert_eq!(shielded.len(), 1);
    }

    fn candidate(priority: f64, fee: i64, id: u8, order: SelectionOrder) -> Candidate {
        Candidate {
            priority,
            fee_rate: FeeRate::from_per_kb(fee),
            txid: H256::repeat_byte(id),
            slot: id as usize,
            order,
        }
    }

    proptest! {
        #[test]
        fn prop_heap_pops_in_strict_order(
            items in proptest::collection::vec((0u32..5, 0i64..5, any::<u8>()), 1..40),
            priority_first in any::<bool>(),
        ) {
            let order = if priority_first {
                SelectionOrder::PriorityFirst
            } else {
                SelectionOrder::FeeRateFirst
            };
            let mut seen = HashSet::new();
            let heap: BinaryHeap<Candidate> = items
                .into_iter()
                .filter(|(_, _, id)| seen.insert(*id))
                .map(|(p, f, id)| candidate(f64::from(p), f, id, order))
                .collect();
            let popped = heap.into_sorted_vec();

            for pair in popped.windows(2) {
                // into_sorted_vec is ascending: later entries pop first.
                let (lo, hi) = (&pair[0], &pair[1]);
                let key = |c: &Candidate| match order {
                    SelectionOrder::FeeRateFirst => (c.fee_rate.per_kb(), c.priority as i64),
                    SelectionOrder::PriorityFirst => (c.priority as i64, c.fee_rate.per_kb()),
                };
                prop_assert!(key(lo) <= key(hi));
                if key(lo) == key(hi) {
                    prop_assert!(lo.txid > hi.txid);
                }
            }
        }
    }
}
