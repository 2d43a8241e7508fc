//! # Mining Driver
//!
//! Worker pool that turns templates into blocks.
//!
//! Each worker is a tokio task cycling through [`WorkerState`]s:
//!
//! ```text
//! PoS: Idle ─► WaitingForStakeEligibility ─► Assembling ─► Submitting ─┐
//! PoW: Idle ─► Assembling ─► Searching ─► Submitting ─────────────────┤
//!        ▲─────────────────────────────────────────────────────────────┘
//! ```
//!
//! Workers stop cooperatively: the shutdown flag is checked between nonce
//! batches and between polls. Template assembly (which takes the chain lock)
//! and each 256-nonce batch run on the blocking pool, so a worker never
//! stalls the async executor it shares with the rest of the node.

use crate::assembler::BlockAssembler;
use crate::config::MinerConfig;
use crate::domain::{increment_extra_nonce, update_time, BlockTemplate, ExtraNonce};
use crate::error::{BlockProductionError, Result};
use crate::metrics::{HashMeter, MinerMetrics};
use crate::ports::inbound::{MiningService, MiningStatus};
use crate::ports::outbound::{BlockSubmitter, PeerStatus};
use async_trait::async_trait;
use chain_types::{short_hex, Block, DifficultyOracle};
use parking_lot::{Mutex, RwLock};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;

/// Nonce at which a template is considered exhausted.
pub const NONCE_EXHAUSTED: u32 = 0xffff_0000;

/// What a worker is doing.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum WorkerState {
    /// Not started, or between templates
    #[default]
    Idle,
    /// Polling stake preconditions or the stake search window
    WaitingForStakeEligibility,
    /// Building a template
    Assembling,
    /// Hashing nonces
    Searching,
    /// Handing a block to the node
    Submitting,
}

/// Staking progress shared by all workers.
#[derive(Debug, Default)]
struct StakeState {
    mintable: bool,
    mintable_checked_height: Option<u32>,
    /// Tip height and latest kernel time covered by the last search
    last_search: Option<(u32, i64)>,
}

/// Everything a worker task needs.
struct WorkerContext {
    assembler: Arc<BlockAssembler>,
    config: MinerConfig,
    peers: Arc<dyn PeerStatus>,
    submitter: Arc<dyn BlockSubmitter>,
    payout_script: Vec<u8>,
    proof_of_stake: bool,
    metrics: Arc<MinerMetrics>,
    meter: HashMeter,
    shutdown: Arc<AtomicBool>,
    states: Arc<RwLock<Vec<WorkerState>>>,
    stake: Mutex<StakeState>,
}

impl WorkerContext {
    fn set_state(&self, worker: usize, state: WorkerState) {
        let mut states = self.states.write();
        if let Some(slot) = states.get_mut(worker) {
            if *slot != state {
                tracing::trace!("[miner] worker {} {:?} -> {:?}", worker, *slot, state);
                *slot = state;
            }
        }
    }

    fn stopping(&self) -> bool {
        self.shutdown.load(Ordering::Relaxed)
    }

    fn peers_ok(&self) -> bool {
        !self.assembler.params().mining_requires_peers || self.peers.peer_count() > 0
    }

    async fn pause(&self, millis: u64) {
        tokio::time::sleep(Duration::from_millis(millis)).await;
    }
}

/// Multi-worker PoW/PoS driver.
pub struct MiningDriver {
    assembler: Arc<BlockAssembler>,
    config: MinerConfig,
    peers: Arc<dyn PeerStatus>,
    submitter: Arc<dyn BlockSubmitter>,
    payout_script: Vec<u8>,
    metrics: Arc<MinerMetrics>,
    shutdown: Arc<AtomicBool>,
    states: Arc<RwLock<Vec<WorkerState>>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    proof_of_stake: AtomicBool,
}

impl MiningDriver {
    /// Driver paying proof-of-work rewards to `payout_script`.
    pub fn new(
        assembler: Arc<BlockAssembler>,
        config: MinerConfig,
        peers: Arc<dyn PeerStatus>,
        submitter: Arc<dyn BlockSubmitter>,
        payout_script: Vec<u8>,
    ) -> Self {
        Self {
            assembler,
            config,
            peers,
            submitter,
            payout_script,
            metrics: Arc::new(MinerMetrics::new()),
            shutdown: Arc::new(AtomicBool::new(false)),
            states: Arc::new(RwLock::new(Vec::new())),
            workers: Mutex::new(Vec::new()),
            proof_of_stake: AtomicBool::new(false),
        }
    }

    /// Shared metrics.
    pub fn metrics(&self) -> Arc<MinerMetrics> {
        Arc::clone(&self.metrics)
    }

    /// Current state of every worker.
    pub fn worker_states(&self) -> Vec<WorkerState> {
        self.states.read().clone()
    }

    /// Whether any worker is still running.
    pub fn is_running(&self) -> bool {
        self.workers.lock().iter().any(|handle| !handle.is_finished())
    }

    /// Spawn `threads` workers (0 picks the network default, then the configured count).
    pub fn start(&self, threads: usize, proof_of_stake: bool) -> Result<()> {
        let mut workers = self.workers.lock();
        if workers.iter().any(|handle| !handle.is_finished()) {
            return Err(BlockProductionError::AlreadyRunning);
        }
        workers.clear();

        let threads = match threads {
            0 if self.assembler.params().default_miner_threads > 0 => {
                self.assembler.params().default_miner_threads
            }
            0 => self.config.threads.max(1),
            n => n,
        };

        self.shutdown.store(false, Ordering::Relaxed);
        self.proof_of_stake.store(proof_of_stake, Ordering::Relaxed);
        *self.states.write() = vec![WorkerState::Idle; threads];

        let context = Arc::new(WorkerContext {
            assembler: Arc::clone(&self.assembler),
            config: self.config.clone(),
            peers: Arc::clone(&self.peers),
            submitter: Arc::clone(&self.submitter),
            payout_script: self.payout_script.clone(),
            proof_of_stake,
            metrics: Arc::clone(&self.metrics),
            meter: HashMeter::new(Duration::from_secs(self.config.hashrate_log_interval_secs)),
            shutdown: Arc::clone(&self.shutdown),
            states: Arc::clone(&self.states),
            stake: Mutex::new(StakeState::default()),
        });

        tracing::info!(
            "[miner] starting {} {} worker(s)",
            threads,
            if proof_of_stake { "staking" } else { "hashing" }
        );
        for worker in 0..threads {
            let ctx = Arc::clone(&context);
            workers.push(tokio::spawn(async move {
                run_worker(ctx, worker).await;
            }));
        }
        Ok(())
    }

    /// Signal shutdown and wait for every worker to exit.
    pub async fn stop(&self) -> Result<()> {
        let handles = std::mem::take(&mut *self.workers.lock());
        if handles.is_empty() {
            return Err(BlockProductionError::NotActive);
        }
        self.shutdown.store(true, Ordering::Relaxed);
        Self::await_all(handles).await;
        tracing::info!("[miner] stopped");
        Ok(())
    }

    /// Wait for workers that stop on their own (e.g. after an on-demand block).
    pub async fn join(&self) {
        let handles = std::mem::take(&mut *self.workers.lock());
        Self::await_all(handles).await;
    }

    async fn await_all(handles: Vec<JoinHandle<()>>) {
        for handle in handles {
            if let Err(e) = handle.await {
                tracing::error!("[miner] worker task failed: {}", e);
            }
        }
    }
}

#[async_trait]
impl MiningService for MiningDriver {
    async fn create_template(
        &self,
        payout_script: Vec<u8>,
        proof_of_stake: bool,
    ) -> Result<Option<BlockTemplate>> {
        assemble(&self.assembler, payout_script, proof_of_stake).await
    }

    async fn start_mining(&self, threads: usize, proof_of_stake: bool) -> Result<()> {
        self.start(threads, proof_of_stake)
    }

    async fn stop_mining(&self) -> Result<()> {
        self.stop().await
    }

    async fn status(&self) -> MiningStatus {
        MiningStatus {
            active: self.is_running(),
            threads: self.states.read().len(),
            proof_of_stake: self.proof_of_stake.load(Ordering::Relaxed),
            blocks_found: self.metrics.blocks_found.load(Ordering::Relaxed),
            blocks_submitted: self.metrics.get_blocks_submitted(),
            hash_rate: self.metrics.hash_rate(),
        }
    }
}

#[tracing::instrument(skip(ctx), fields(pos = ctx.proof_of_stake))]
async fn run_worker(ctx: Arc<WorkerContext>, worker: usize) {
    let params = ctx.assembler.params();
    let ports = ctx.assembler.ports();
    let mut extra_nonce = ExtraNonce::default();

    while !ctx.stopping() {
        ctx.set_state(worker, WorkerState::Idle);

        if ctx.proof_of_stake {
            if !wait_for_stake_eligibility(&ctx, worker).await
                || !wait_for_stake_window(&ctx, worker).await
            {
                break;
            }
        } else {
            match ports.chain.height() {
                Some(height) if height >= params.last_pow_block => {
                    tracing::info!(
                        "[miner] proof-of-work phase ended at height {}, worker {} exiting",
                        height,
                        worker
                    );
                    break;
                }
                None => {
                    ctx.pause(ctx.config.poll_interval_ms).await;
                    continue;
                }
                Some(_) => {}
            }
            if !ctx.peers_ok() {
                ctx.pause(ctx.config.poll_interval_ms).await;
                continue;
            }
        }

        ctx.set_state(worker, WorkerState::Assembling);
        let updates_at_start = ports.pool.transactions_updated();
        let result = assemble(
            &ctx.assembler,
            ctx.payout_script.clone(),
            ctx.proof_of_stake,
        )
        .await;

        if ctx.proof_of_stake {
            if let Some(tip) = ports.chain.tip() {
                let covered = ports.time.adjusted_time() + params.max_stake_future_drift;
                ctx.stake.lock().last_search = Some((tip.height, covered));
            }
        }

        let template = match result {
            Ok(Some(template)) => template,
            Ok(None) => {
                ctx.metrics.record_abandoned();
                if !ctx.proof_of_stake {
                    ctx.pause(ctx.config.stake_window_poll_ms).await;
                }
                continue;
            }
            Err(e) => {
                ctx.metrics.record_abandoned();
                if e.is_critical() {
                    tracing::error!("[miner] template assembly failed: {}", e);
                } else {
                    tracing::warn!("[miner] template assembly failed: {}", e);
                }
                ctx.pause(ctx.config.poll_interval_ms).await;
                continue;
            }
        };
        ctx.metrics
            .record_template(template.stats.tx_count, template.stats.block_size);

        let height = template.height;
        let mut block = template.block;
        increment_extra_nonce(&mut block, height, &mut extra_nonce);

        if ctx.proof_of_stake {
            let Some(wallet) = ports.wallet.as_ref() else {
                break;
            };
            if !wallet.sign_block(&mut block) {
                tracing::warn!("[miner] signing proof-of-stake block failed");
                continue;
            }
            tracing::info!("[miner] proof-of-stake block found {}", short_hex(&block.hash()));
            ctx.set_state(worker, WorkerState::Submitting);
            let accepted = process_block_found(&ctx, block).await;
            if accepted && params.mine_blocks_on_demand {
                break;
            }
            continue;
        }

        tracing::info!(
            "[miner] worker {} searching with {} transactions ({} bytes)",
            worker,
            block.transactions.len(),
            block.serialized_size()
        );
        match search(&ctx, worker, block, updates_at_start).await {
            SearchOutcome::Found(accepted) => {
                if accepted && params.mine_blocks_on_demand {
                    tracing::info!("[miner] on-demand block mined, worker {} exiting", worker);
                    break;
                }
            }
            SearchOutcome::Rebuild => {}
            SearchOutcome::Shutdown => break,
        }
    }

    ctx.set_state(worker, WorkerState::Idle);
    tracing::debug!("[miner] worker {} exited", worker);
}

/// Build a template on the blocking pool.
async fn assemble(
    assembler: &Arc<BlockAssembler>,
    payout_script: Vec<u8>,
    proof_of_stake: bool,
) -> Result<Option<BlockTemplate>> {
    let assembler = Arc::clone(assembler);
    tokio::task::spawn_blocking(move || assembler.create_new_block(&payout_script, proof_of_stake))
        .await
        .map_err(|e| BlockProductionError::TaskFailed(e.to_string()))?
}

/// Hash nonces until a solution or the next 256-nonce boundary.
///
/// Returns the block with its last tried nonce, the hash count and whether
/// the header meets its target.
fn hash_batch(oracle: &DifficultyOracle, mut block: Block) -> (Block, u64, bool) {
    let mut hashes = 0u64;
    loop {
        let hash = block.header.hash();
        hashes += 1;
        if oracle.check_proof_of_work(&hash, block.header.bits) {
            return (block, hashes, true);
        }
        block.header.nonce = block.header.nonce.wrapping_add(1);
        if block.header.nonce & 0xff == 0 {
            return (block, hashes, false);
        }
    }
}

enum SearchOutcome {
    Found(bool),
    Rebuild,
    Shutdown,
}

/// Hash nonce batches until a solution, a reason to rebuild, or shutdown.
async fn search(
    ctx: &WorkerContext,
    worker: usize,
    mut block: Block,
    updates_at_start: u64,
) -> SearchOutcome {
    let ports = ctx.assembler.ports();
    let oracle = Arc::new(ctx.assembler.oracle().clone());
    let started = ports.time.now();
    let Some(tip) = ports.chain.tip().filter(|tip| tip.hash == block.header.prev_block) else {
        return SearchOutcome::Rebuild;
    };

    ctx.set_state(worker, WorkerState::Searching);
    loop {
        let batch_oracle = Arc::clone(&oracle);
        let batch = tokio::task::spawn_blocking(move || hash_batch(&batch_oracle, block)).await;
        let (searched, hashes, found) = match batch {
            Ok(batch) => batch,
            Err(e) => {
                tracing::error!("[miner] nonce batch failed: {}", e);
                ctx.metrics.record_abandoned();
                return SearchOutcome::Rebuild;
            }
        };
        block = searched;
        ctx.meter.record(hashes, Instant::now(), &ctx.metrics);

        if found {
            tracing::info!(
                "[miner] proof-of-work found: {} ({})",
                short_hex(&block.hash()),
                DifficultyOracle::describe_target(block.header.bits)
            );
            ctx.set_state(worker, WorkerState::Submitting);
            return SearchOutcome::Found(process_block_found(ctx, block).await);
        }

        if ctx.stopping() {
            return SearchOutcome::Shutdown;
        }
        if !ctx.peers_ok() {
            return SearchOutcome::Rebuild;
        }
        if block.header.nonce >= NONCE_EXHAUSTED {
            return SearchOutcome::Rebuild;
        }
        if ports.pool.transactions_updated() != updates_at_start
            && ports.time.now() - started > ctx.config.stale_template_secs as i64
        {
            return SearchOutcome::Rebuild;
        }
        if ports.chain.tip().map(|current| current.hash) != Some(tip.hash) {
            return SearchOutcome::Rebuild;
        }

        update_time(&mut block, &tip, ports.time.adjusted_time());
    }
}

/// Poll until every staking precondition holds; `false` on shutdown.
async fn wait_for_stake_eligibility(ctx: &WorkerContext, worker: usize) -> bool {
    let params = ctx.assembler.params();
    let ports = ctx.assembler.ports();
    let Some(wallet) = ports.wallet.as_ref() else {
        tracing::error!("[miner] staking requested without a wallet");
        return false;
    };

    loop {
        if ctx.stopping() {
            return false;
        }

        let ready = match ports.chain.tip() {
            Some(tip) if tip.height >= params.last_pow_block => {
                let mintable = {
                    let mut stake = ctx.stake.lock();
                    if !stake.mintable && stake.mintable_checked_height < Some(tip.height) {
                        stake.mintable_checked_height = Some(tip.height);
                        stake.mintable = wallet.has_mintable_coins();
                    }
                    stake.mintable
                };
                let peers = !params.mining_requires_peers
                    || (ctx.peers.peer_count() > 0 && ctx.peers.is_synced());

                i64::from(tip.time) >= params.stake_min_tip_time
                    && peers
                    && !wallet.is_locked()
                    && mintable
                    && wallet.balance() > ctx.config.reserve_balance
            }
            _ => false,
        };
        if ready {
            return true;
        }

        ctx.set_state(worker, WorkerState::WaitingForStakeEligibility);
        ctx.pause(ctx.config.poll_interval_ms).await;
    }
}

/// Wait until the stake search window moves past the last search at this height; `false` on shutdown.
async fn wait_for_stake_window(ctx: &WorkerContext, worker: usize) -> bool {
    let params = ctx.assembler.params();
    let ports = ctx.assembler.ports();
    let interval = params.stake_search_interval.max(1);

    loop {
        if ctx.stopping() {
            return false;
        }
        let last = ctx.stake.lock().last_search;
        let waiting = match (ports.chain.height(), last) {
            (Some(height), Some((last_height, last_time))) if height == last_height => {
                let now = ports.time.now();
                (now + params.max_stake_future_drift) / interval <= last_time / interval
            }
            _ => false,
        };
        if !waiting {
            return true;
        }
        ctx.set_state(worker, WorkerState::WaitingForStakeEligibility);
        ctx.pause(ctx.config.stake_window_poll_ms).await;
    }
}

/// Submit a found block unless the chain moved on; returns whether it was accepted.
async fn process_block_found(ctx: &WorkerContext, block: Block) -> bool {
    let ports = ctx.assembler.ports();
    let hash = block.hash();

    if ports.chain.tip().map(|tip| tip.hash) != Some(block.header.prev_block) {
        tracing::warn!("[miner] generated block {} is stale", short_hex(&hash));
        ctx.metrics.record_block_found(false);
        return false;
    }

    let accepted = match ctx.submitter.submit_block(block).await {
        Ok(accepted) => accepted,
        Err(e) => {
            tracing::error!("[miner] submitting block {} failed: {}", short_hex(&hash), e);
            false
        }
    };
    ctx.metrics.record_block_found(accepted);
    if accepted {
        tracing::info!("[miner] block {} accepted", short_hex(&hash));
        ports.pool.clear_speculative_state();
    } else {
        tracing::warn!("[miner] block {} not accepted", short_hex(&hash));
    }
    accepted
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assembler::AssemblerPorts;
    use crate::ports::outbound::ChainView;
    use crate::config::AssemblerConfig;
    use crate::test_utils::*;
    use chain_types::{ChainParams, Coin, OutPoint, ProofOfWorkCheck, TxOut, COIN};
    use primitive_types::H256;

    const NOW: i64 = 1_600_000_000;

    struct Rig {
        chain: Arc<MockChain>,
        pool: Arc<MemoryPool>,
        coins: Arc<MapCoinSource>,
        clock: Arc<FixedClock>,
        peers: Arc<StaticPeers>,
        wallet: Arc<MockStakeWallet>,
        submitter: Arc<RecordingSubmitter>,
        chain_lock: Arc<Mutex<()>>,
    }

    impl Rig {
        fn new(tip_height: u32) -> Self {
            let chain = Arc::new(MockChain::new(tip_at(tip_height, (NOW - 60) as u32, EASY_BITS)));
            let pool = Arc::new(MemoryPool::default());
            let stake = OutPoint::new(H256::repeat_byte(0x5a), 1);
            let coins = Arc::new(MapCoinSource::default());
            coins.insert(stake, Coin::new(TxOut::new(100 * COIN, p2pkh(9)), 1));
            Self {
                submitter: Arc::new(RecordingSubmitter::connected(chain.clone(), pool.clone())),
                chain,
                pool,
                coins,
                clock: Arc::new(FixedClock::new(NOW)),
                peers: Arc::new(StaticPeers::new(0)),
                wallet: Arc::new(MockStakeWallet::new(stake, 100 * COIN)),
                chain_lock: Arc::new(Mutex::new(())),
            }
        }

        fn driver(&self, params: ChainParams) -> MiningDriver {
            let assembler = BlockAssembler::new(
                Arc::new(params),
                AssemblerConfig::default(),
                AssemblerPorts {
                    chain: self.chain.clone(),
                    pool: self.pool.clone(),
                    coins: self.coins.clone(),
                    time: self.clock.clone(),
                    validator: Arc::new(StaticValidator::accepting()),
                    shielded: Arc::new(StaticShieldedOracle::default()),
                    checkpoints: Arc::new(StaticCheckpoints::returning(H256::zero())),
                    wallet: Some(self.wallet.clone()),
                },
                Arc::clone(&self.chain_lock),
            );
            let config = MinerConfig {
                threads: 1,
                poll_interval_ms: 10,
                stake_window_poll_ms: 10,
                ..MinerConfig::default()
            };
            MiningDriver::new(
                Arc::new(assembler),
                config,
                self.peers.clone(),
                self.submitter.clone(),
                p2pkh(7),
            )
        }
    }

    fn regtest() -> ChainParams {
        let mut params = ChainParams::regtest()
            .with_proof_of_work_check(ProofOfWorkCheck::Skip)
            .unwrap();
        params.zerocoin_start_time = NOW + 1_000_000;
        params
    }

    #[tokio::test]
    async fn test_regtest_mines_one_block_then_exits() {
        let rig = Rig::new(5);
        let driver = rig.driver(regtest());

        driver.start(1, false).unwrap();
        driver.join().await;

        let blocks = rig.submitter.blocks();
        assert_eq!(blocks.len(), 1);
        assert_eq!(rig.chain.height(), Some(6));
        assert_eq!(blocks[0].transactions[0].outputs[0].script_pubkey, p2pkh(7));
        assert_eq!(driver.metrics().get_blocks_submitted(), 1);
        assert_eq!(rig.pool.clear_count(), 1);
        assert_eq!(driver.worker_states(), vec![WorkerState::Idle]);
        assert!(!driver.is_running());
    }

    #[tokio::test]
    async fn test_easy_target_found_without_skip() {
        let rig = Rig::new(5);
        let mut params = ChainParams::regtest();
        params.zerocoin_start_time = NOW + 1_000_000;
        let driver = rig.driver(params);

        driver.start(1, false).unwrap();
        driver.join().await;
        assert_eq!(rig.submitter.blocks().len(), 1);
        let block = &rig.submitter.blocks()[0];
        assert!(chain_types::DifficultyOracle::for_params(&ChainParams::regtest())
            .check_proof_of_work(&block.hash(), block.header.bits));
    }

    #[tokio::test]
    async fn test_assembly_waiting_on_chain_lock_keeps_runtime_responsive() {
        let rig = Rig::new(5);
        let driver = rig.driver(regtest());

        let guard = rig.chain_lock.lock();
        driver.start(1, false).unwrap();
        // Single-threaded runtime: timers only fire if the worker is parked
        // on the blocking pool rather than on this thread.
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(driver.worker_states(), vec![WorkerState::Assembling]);
        assert!(rig.submitter.blocks().is_empty());
        drop(guard);

        driver.join().await;
        assert_eq!(rig.submitter.blocks().len(), 1);
    }

    #[test]
    fn test_hash_batch_stops_at_nonce_boundary() {
        let oracle = DifficultyOracle::for_params(&ChainParams::main());
        let mut block = Block::new(Default::default());
        // Far below any reachable target.
        block.header.bits = 0x0300_0001;
        block.header.nonce = 0x1_0010;

        let (block, hashes, found) = hash_batch(&oracle, block);
        assert!(!found);
        assert_eq!(hashes, 0xf0);
        assert_eq!(block.header.nonce, 0x1_0100);
    }

    #[test]
    fn test_hash_batch_returns_solution_nonce() {
        let oracle = DifficultyOracle::for_params(&ChainParams::regtest());
        let mut block = Block::new(Default::default());
        block.header.bits = EASY_BITS;
        block.header.nonce = 7;

        let (block, hashes, found) = hash_batch(&oracle, block);
        assert!(found);
        assert!(hashes >= 1);
        assert_eq!(block.header.nonce, 7 + hashes as u32 - 1);
        assert!(oracle.check_proof_of_work(&block.header.hash(), block.header.bits));
    }

    #[tokio::test]
    async fn test_pow_worker_exits_after_last_pow_block() {
        let params = regtest();
        let rig = Rig::new(params.last_pow_block);
        let driver = rig.driver(params);

        driver.start(1, false).unwrap();
        driver.join().await;
        assert!(rig.submitter.blocks().is_empty());
    }

    #[tokio::test]
    async fn test_start_twice_and_stop_when_idle() {
        let rig = Rig::new(5);
        let mut params = regtest();
        params.mining_requires_peers = true;
        let driver = rig.driver(params);

        assert!(matches!(driver.stop().await, Err(BlockProductionError::NotActive)));
        driver.start(2, false).unwrap();
        assert!(matches!(
            driver.start(1, false),
            Err(BlockProductionError::AlreadyRunning)
        ));
        let status = driver.status().await;
        assert!(status.active);
        assert_eq!(status.threads, 2);

        // No peers: workers only poll, stop returns promptly.
        driver.stop().await.unwrap();
        assert!(rig.submitter.blocks().is_empty());
        assert!(!driver.status().await.active);
    }

    #[tokio::test]
    async fn test_pos_stakes_one_block_on_demand() {
        let mut params = regtest();
        params.last_pow_block = 5;
        let rig = Rig::new(5);
        let driver = rig.driver(params);

        driver.start(1, true).unwrap();
        driver.join().await;

        let blocks = rig.submitter.blocks();
        assert_eq!(blocks.len(), 1);
        assert!(blocks[0].is_proof_of_stake());
        assert!(!blocks[0].signature.is_empty());
        assert_eq!(rig.wallet.searches(), 1);
    }

    #[tokio::test]
    async fn test_pos_waits_while_wallet_locked() {
        let mut params = regtest();
        params.last_pow_block = 5;
        let rig = Rig::new(5);
        rig.wallet.set_locked(true);
        let driver = rig.driver(params);

        driver.start(1, true).unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(
            driver.worker_states(),
            vec![WorkerState::WaitingForStakeEligibility]
        );
        assert_eq!(rig.wallet.searches(), 0);
        // Mintable coins are checked once per height, not on every poll.
        assert_eq!(rig.wallet.mintable_checks(), 1);

        driver.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_pos_waits_before_pow_phase_ends() {
        let rig = Rig::new(5);
        let driver = rig.driver(regtest());

        driver.start(1, true).unwrap();
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(rig.wallet.mintable_checks(), 0);
        driver.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_stale_block_rejected() {
        let rig = Rig::new(5);
        let driver = rig.driver(regtest());
        driver.start(1, false).unwrap();
        driver.join().await;

        // Re-submitting the mined block is stale: its parent is no longer the tip.
        let block = rig.submitter.blocks()[0].clone();
        let ctx = WorkerContext {
            assembler: Arc::clone(&driver.assembler),
            config: driver.config.clone(),
            peers: rig.peers.clone(),
            submitter: rig.submitter.clone(),
            payout_script: vec![],
            proof_of_stake: false,
            metrics: driver.metrics(),
            meter: HashMeter::new(Duration::from_secs(1800)),
            shutdown: Arc::new(AtomicBool::new(false)),
            states: Arc::new(RwLock::new(vec![WorkerState::Idle])),
            stake: Mutex::new(StakeState::default()),
        };
        assert!(!process_block_found(&ctx, block).await);
        assert_eq!(rig.submitter.blocks().len(), 1);
        assert_eq!(
            driver.metrics().blocks_rejected.load(Ordering::Relaxed),
            1
        );
    }
}
