// Copyright 2021 The Umbra Developers
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Fixtures for the ingest pipeline tests: block builders, a scripted
//! peer set and a hand-driven consensus engine.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::mpsc::SyncSender;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use chrono::prelude::{TimeZone, Utc};

use umbra_chain::{Chain, MemStore};
use umbra_consensus::{Consensus, Status};
use umbra_core::core::hash::{Hash, Hashed};
use umbra_core::core::{
	tx_merkle_root, Block, BlockHeader, CoinbaseTransaction, Commitment, Nullifier, Output,
	StandardTransaction, Transaction,
};
use umbra_core::{genesis, global};
use umbra_p2p as p2p;
use umbra_pool::{PoolConfig, TransactionPool, TxSource};
use umbra_servers::common::adapters::{ChainToPoolAdapter, PoolToChainAdapter};
use umbra_servers::{NetToChainAdapter, PolicyConfig};
use umbra_util::{Mutex, RwLock, StopState};

/// Everything a pipeline test needs, wired like the real server minus the
/// sockets.
pub struct TestNode {
	pub chain: Arc<Chain>,
	pub tx_pool: Arc<RwLock<TransactionPool>>,
	pub adapter: Arc<NetToChainAdapter>,
	pub rpc: Arc<MockRpc>,
	pub engine: Arc<ManualEngine>,
	pub stop_state: Arc<StopState>,
}

pub fn setup(policy: PolicyConfig) -> TestNode {
	global::set_chain_type(global::ChainTypes::AutomatedTesting);

	let pool_adapter = Arc::new(PoolToChainAdapter::new());
	let tx_pool = Arc::new(RwLock::new(TransactionPool::new(
		PoolConfig::default(),
		pool_adapter.clone(),
	)));

	let chain_adapter = Arc::new(ChainToPoolAdapter::new(tx_pool.clone()));
	let chain = Arc::new(
		Chain::init(
			genesis::genesis_dev(),
			Arc::new(MemStore::new()),
			chain_adapter,
		)
		.unwrap(),
	);
	pool_adapter.set_chain(chain.clone());

	let stop_state = Arc::new(StopState::new());
	let adapter = Arc::new(NetToChainAdapter::new(
		chain.clone(),
		tx_pool.clone(),
		policy,
		stop_state.clone(),
	));

	let rpc = Arc::new(MockRpc::new());
	let engine = Arc::new(ManualEngine::new());
	adapter.init(rpc.clone(), engine.clone());

	TestNode {
		chain,
		tx_pool,
		adapter,
		rpc,
		engine,
		stop_state,
	}
}

pub fn test_source() -> TxSource {
	TxSource {
		debug_name: "test".to_string(),
		identifier: "?.?.?.?".to_string(),
	}
}

pub fn peer(n: u8) -> SocketAddr {
	format!("10.0.0.{}:9119", n).parse().unwrap()
}

pub fn coinbase_tx(height: u64) -> Transaction {
	Transaction::Coinbase(CoinbaseTransaction {
		validator_id: vec![0x11; 36],
		new_coins: 1_000_000 + height,
		outputs: vec![Output {
			commitment: Commitment([height as u8; 32]),
			ciphertext: vec![height as u8; 16],
		}],
		signature: vec![0x22; 64],
		proof: vec![0x33; 96],
	})
}

pub fn standard_tx(seed: u8) -> Transaction {
	Transaction::Standard(StandardTransaction {
		outputs: vec![Output {
			commitment: Commitment([seed.wrapping_add(100); 32]),
			ciphertext: vec![seed; 16],
		}],
		nullifiers: vec![Nullifier([seed; 32])],
		txo_root: Hash::from_vec(&[0x44; 32]),
		fee: seed as u64 + 1,
		locktime: 0,
		proof: vec![0x55; 96],
	})
}

pub fn build_block_on(prev: Hash, prev_height: u64, prev_ts: i64, txs: Vec<Transaction>) -> Block {
	let height = prev_height + 1;
	let mut all_txs = vec![coinbase_tx(height)];
	all_txs.extend(txs);

	let header = BlockHeader {
		version: 1,
		height,
		prev_block: prev,
		timestamp: Utc.timestamp(prev_ts + 60, 0),
		tx_root: tx_merkle_root(&all_txs),
		producer_id: vec![0x66; 36],
		signature: vec![0x77; 64],
	};
	Block {
		header,
		txs: all_txs,
	}
}

pub fn build_block(chain: &Chain, txs: Vec<Transaction>) -> Block {
	let head = chain.head().unwrap();
	build_block_on(head.last_block_h, head.height, head.timestamp, txs)
}

/// Add every non-coinbase transaction of the block to the pool.
pub fn fill_pool(node: &TestNode, block: &Block) {
	let mut pool = node.tx_pool.write();
	for tx in block.txs.iter().filter(|tx| !tx.is_coinbase()) {
		pool.add_to_pool(test_source(), tx.clone()).unwrap();
	}
}

/// Poll until the condition holds or the timeout strikes.
pub fn wait_until<F>(cond: F, timeout: Duration) -> bool
where
	F: Fn() -> bool,
{
	let start = Instant::now();
	while start.elapsed() < timeout {
		if cond() {
			return true;
		}
		thread::sleep(Duration::from_millis(10));
	}
	cond()
}

/// One recorded chain-service call against the scripted peer set.
#[derive(Debug, Clone, PartialEq)]
pub enum Call {
	GetBlock(SocketAddr, Hash),
	GetBlockTxids(SocketAddr, Hash),
	GetBlockTxs(SocketAddr, Hash, Vec<u32>),
}

/// A scripted peer set. Each peer serves the blocks it has been given,
/// every call and every ban score delta is recorded for the assertions.
pub struct MockRpc {
	serveable: RwLock<HashMap<SocketAddr, HashMap<Hash, Block>>>,
	peers: RwLock<Vec<SocketAddr>>,
	calls: Mutex<Vec<Call>>,
	scores: Mutex<HashMap<SocketAddr, (u32, u32)>>,
	block_delay: Mutex<Option<Duration>>,
}

impl MockRpc {
	pub fn new() -> MockRpc {
		MockRpc {
			serveable: RwLock::new(HashMap::new()),
			peers: RwLock::new(vec![]),
			calls: Mutex::new(vec![]),
			scores: Mutex::new(HashMap::new()),
			block_delay: Mutex::new(None),
		}
	}

	/// Register a peer without giving it anything to serve.
	pub fn add_peer(&self, addr: SocketAddr) {
		let mut peers = self.peers.write();
		if !peers.contains(&addr) {
			peers.push(addr);
		}
	}

	/// Register a peer and let it serve the given block.
	pub fn serve_block(&self, addr: SocketAddr, block: Block) {
		self.add_peer(addr);
		self.serveable
			.write()
			.entry(addr)
			.or_insert_with(HashMap::new)
			.insert(block.hash(), block);
	}

	/// Artificial latency applied to every get_block call.
	pub fn set_block_delay(&self, delay: Duration) {
		*self.block_delay.lock() = Some(delay);
	}

	pub fn calls(&self) -> Vec<Call> {
		self.calls.lock().clone()
	}

	pub fn count_get_block(&self, h: &Hash) -> usize {
		self.calls
			.lock()
			.iter()
			.filter(|c| matches!(c, Call::GetBlock(_, ch) if ch == h))
			.count()
	}

	pub fn count_get_block_txids(&self) -> usize {
		self.calls
			.lock()
			.iter()
			.filter(|c| matches!(c, Call::GetBlockTxids(_, _)))
			.count()
	}

	pub fn txs_calls(&self) -> Vec<(SocketAddr, Vec<u32>)> {
		self.calls
			.lock()
			.iter()
			.filter_map(|c| match c {
				Call::GetBlockTxs(addr, _, idx) => Some((*addr, idx.clone())),
				_ => None,
			})
			.collect()
	}

	/// Accumulated (behavioral, transient) score for the peer.
	pub fn score(&self, addr: SocketAddr) -> (u32, u32) {
		self.scores.lock().get(&addr).cloned().unwrap_or((0, 0))
	}

	/// Sum of every score delta handed out, across all peers.
	pub fn total_score(&self) -> (u32, u32) {
		let scores = self.scores.lock();
		scores
			.values()
			.fold((0, 0), |acc, s| (acc.0 + s.0, acc.1 + s.1))
	}

	fn lookup(&self, addr: &SocketAddr, h: &Hash) -> Option<Block> {
		self.serveable.read().get(addr)?.get(h).cloned()
	}
}

impl p2p::BlockRpc for MockRpc {
	fn get_block(&self, peer: SocketAddr, h: Hash) -> Result<Block, p2p::Error> {
		self.calls.lock().push(Call::GetBlock(peer, h));
		if let Some(delay) = *self.block_delay.lock() {
			thread::sleep(delay);
		}
		self.lookup(&peer, &h).ok_or(p2p::Error::NotFound)
	}

	fn get_block_txids(&self, peer: SocketAddr, h: Hash) -> Result<Vec<Hash>, p2p::Error> {
		self.calls.lock().push(Call::GetBlockTxids(peer, h));
		let block = self.lookup(&peer, &h).ok_or(p2p::Error::NotFound)?;
		Ok(block.tx_ids())
	}

	fn get_block_txs(
		&self,
		peer: SocketAddr,
		h: Hash,
		indices: &[u32],
	) -> Result<Vec<Transaction>, p2p::Error> {
		self.calls
			.lock()
			.push(Call::GetBlockTxs(peer, h, indices.to_vec()));
		let block = self.lookup(&peer, &h).ok_or(p2p::Error::NotFound)?;
		let mut txs = Vec::with_capacity(indices.len());
		for idx in indices {
			match block.txs.get(*idx as usize) {
				Some(tx) => txs.push(tx.clone()),
				None => return Err(p2p::Error::BadRequest),
			}
		}
		Ok(txs)
	}

	fn increase_ban_score(&self, peer: SocketAddr, behavioral: u32, transient: u32) {
		let mut scores = self.scores.lock();
		let entry = scores.entry(peer).or_insert((0, 0));
		entry.0 += behavioral;
		entry.1 += transient;
	}

	fn rpc_peers(&self) -> Vec<SocketAddr> {
		self.peers.read().clone()
	}
}

/// A consensus engine driven by the test: records proposals, the test
/// decides verdicts.
pub struct ManualEngine {
	pending: Mutex<HashMap<Hash, SyncSender<Status>>>,
	proposed: Mutex<Vec<Hash>>,
}

impl ManualEngine {
	pub fn new() -> ManualEngine {
		ManualEngine {
			pending: Mutex::new(HashMap::new()),
			proposed: Mutex::new(vec![]),
		}
	}

	/// How often the given block has been proposed so far.
	pub fn proposed_count(&self, h: &Hash) -> usize {
		self.proposed.lock().iter().filter(|p| *p == h).count()
	}

	/// Wait until the block is proposed, then deliver the verdict.
	pub fn resolve(&self, h: &Hash, status: Status) {
		assert!(
			wait_until(|| self.pending.lock().contains_key(h), Duration::from_secs(5)),
			"block {} was never proposed to consensus",
			h
		);
		let sender = self.pending.lock().remove(h).unwrap();
		sender.send(status).unwrap();
	}
}

impl Consensus for ManualEngine {
	fn new_block(&self, block_id: Hash, _initial_preference: bool, callback: SyncSender<Status>) {
		self.proposed.lock().push(block_id);
		self.pending.lock().insert(block_id, callback);
	}
}
