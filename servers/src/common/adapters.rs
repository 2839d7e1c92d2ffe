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

//! Adapters connecting new block events to consumers of those events,
//! chief among them the block-ingest coordinator: it decodes compact
//! announcements against the mempool, repairs them through the chain
//! service when the decode went wrong, proposes validated blocks to the
//! consensus engine and connects them once finalized.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::mpsc::{sync_channel, Receiver, RecvTimeoutError};
use std::sync::{Arc, Weak};
use std::thread;
use std::time::{Duration, Instant};

use crate::common::types::PolicyConfig;
use umbra_chain::{self as chain, ErrorKind};
use umbra_consensus::{Consensus, Status};
use umbra_core::core::hash::{Hash, Hashed};
use umbra_core::core::{merkle_root, Block, Transaction, XThinnerBlock};
use umbra_p2p as p2p;
use umbra_pool as pool;
use umbra_util::{OneTime, RwLock, StopState};

// Tick between checks of the stop state while waiting on a consensus
// verdict.
const VERDICT_POLL: Duration = Duration::from_millis(500);

struct Orphan {
	block: Block,
	relaying_peer: SocketAddr,
	first_seen: Instant,
}

/// Blocks we can't process yet for lack of their parent, indexed by id
/// with a secondary index by height so a freshly connected block can pull
/// its child in.
struct OrphanBlockPool {
	orphans: RwLock<HashMap<Hash, Orphan>>,
	height_idx: RwLock<HashMap<u64, Vec<Hash>>>,
}

impl OrphanBlockPool {
	fn new() -> OrphanBlockPool {
		OrphanBlockPool {
			orphans: RwLock::new(HashMap::new()),
			height_idx: RwLock::new(HashMap::new()),
		}
	}

	fn len(&self) -> usize {
		self.orphans.read().len()
	}

	// Keeps the existing entry (and its first_seen) when the same block
	// is relayed twice. The two locks are never held together, each scope
	// covers a single map mutation.
	fn add(&self, orphan: Orphan) {
		let hash = orphan.block.hash();
		let height = orphan.block.height();
		{
			let mut orphans = self.orphans.write();
			if orphans.contains_key(&hash) {
				return;
			}
			orphans.insert(hash, orphan);
		}
		self.height_idx.write().entry(height).or_default().push(hash);
	}

	fn remove(&self, hash: &Hash) -> Option<Orphan> {
		let orphan = self.orphans.write().remove(hash)?;
		let height = orphan.block.height();
		{
			let mut height_idx = self.height_idx.write();
			if let Some(hashes) = height_idx.get_mut(&height) {
				hashes.retain(|h| h != hash);
				if hashes.is_empty() {
					height_idx.remove(&height);
				}
			}
		}
		Some(orphan)
	}

	fn contains(&self, hash: &Hash) -> bool {
		self.orphans.read().contains_key(hash)
	}

	// One orphan at the given height, if any.
	fn get_by_height(&self, height: u64) -> Option<(Block, SocketAddr)> {
		let hash = {
			let height_idx = self.height_idx.read();
			*height_idx.get(&height)?.first()?
		};
		let orphans = self.orphans.read();
		let orphan = orphans.get(&hash)?;
		Some((orphan.block.clone(), orphan.relaying_peer))
	}

	// Drop every orphan first seen longer than ttl ago.
	fn evict_older_than(&self, ttl: Duration) -> usize {
		let stale = {
			let orphans = self.orphans.read();
			orphans
				.iter()
				.filter(|(_, o)| o.first_seen.elapsed() > ttl)
				.map(|(h, _)| *h)
				.collect::<Vec<_>>()
		};
		for hash in &stale {
			self.remove(hash);
		}
		stale.len()
	}
}

/// Implementation of the block-ingest pipeline. Gets notified when new
/// compact blocks are received from peers, reconstructs them against the
/// mempool, and walks them through validation, consensus and connect.
/// Also the callback the consensus engine pulls never-seen blocks
/// through, and the fetcher the chain service answers peers from.
pub struct NetToChainAdapter {
	chain: Weak<chain::Chain>,
	tx_pool: Arc<RwLock<pool::TransactionPool>>,
	peers: OneTime<Weak<dyn p2p::BlockRpc>>,
	consensus: OneTime<Weak<dyn Consensus>>,
	config: PolicyConfig,
	orphans: Arc<OrphanBlockPool>,
	active_inventory: Arc<RwLock<HashMap<Hash, Block>>>,
	inflight: Arc<RwLock<HashMap<Hash, Instant>>>,
	stop_state: Arc<StopState>,
}

impl Clone for NetToChainAdapter {
	fn clone(&self) -> Self {
		NetToChainAdapter {
			chain: self.chain.clone(),
			tx_pool: self.tx_pool.clone(),
			peers: self.peers.clone(),
			consensus: self.consensus.clone(),
			config: self.config.clone(),
			orphans: self.orphans.clone(),
			active_inventory: self.active_inventory.clone(),
			inflight: self.inflight.clone(),
			stop_state: self.stop_state.clone(),
		}
	}
}

impl NetToChainAdapter {
	/// Construct a new NetToChainAdapter instance
	pub fn new(
		chain: Arc<chain::Chain>,
		tx_pool: Arc<RwLock<pool::TransactionPool>>,
		config: PolicyConfig,
		stop_state: Arc<StopState>,
	) -> NetToChainAdapter {
		NetToChainAdapter {
			chain: Arc::downgrade(&chain),
			tx_pool,
			peers: OneTime::new(),
			consensus: OneTime::new(),
			config,
			orphans: Arc::new(OrphanBlockPool::new()),
			active_inventory: Arc::new(RwLock::new(HashMap::new())),
			inflight: Arc::new(RwLock::new(HashMap::new())),
			stop_state,
		}
	}

	/// Initialize the adapter with its peer set and consensus engine.
	/// Should only be called once.
	pub fn init(&self, peers: Arc<dyn p2p::BlockRpc>, consensus: Arc<dyn Consensus>) {
		self.peers.init(Arc::downgrade(&peers));
		self.consensus.init(Arc::downgrade(&consensus));
	}

	fn chain(&self) -> Arc<chain::Chain> {
		self.chain
			.upgrade()
			.expect("Failed to upgrade weak ref to our chain.")
	}

	fn peers(&self) -> Arc<dyn p2p::BlockRpc> {
		self.peers
			.borrow()
			.upgrade()
			.expect("Failed to upgrade weak ref to our peers.")
	}

	fn consensus(&self) -> Arc<dyn Consensus> {
		self.consensus
			.borrow()
			.upgrade()
			.expect("Failed to upgrade weak ref to our consensus engine.")
	}

	/// Number of orphans currently held.
	pub fn orphan_count(&self) -> usize {
		self.orphans.len()
	}

	/// Number of blocks currently awaiting a consensus verdict.
	pub fn active_inventory_count(&self) -> usize {
		self.active_inventory.read().len()
	}

	/// Whether a fetch for the given block is currently considered in
	/// flight.
	pub fn is_inflight(&self, h: &Hash) -> bool {
		let ttl = Duration::from_secs(self.config.inflight_ttl_secs);
		match self.inflight.read().get(h) {
			Some(at) => at.elapsed() <= ttl,
			None => false,
		}
	}

	/// A compact block has been received from the network. Reconstruct it
	/// against the mempool, fetching whatever the mempool doesn't hold
	/// from the announcing peer, then run it through the pipeline.
	pub fn compact_block_received(&self, cb: XThinnerBlock, addr: SocketAddr) {
		let bhash = cb.hash();
		debug!(
			"Received compact block {} at {} from {}, {} tx fingerprints, going to process.",
			bhash,
			cb.header.height,
			addr,
			cb.len(),
		);

		if self.active_inventory.read().contains_key(&bhash) {
			debug!("compact block {} already being decided on, ignoring", bhash);
			return;
		}
		if let Ok(true) = self.chain().block_exists(&bhash) {
			debug!("compact block {} already connected, ignoring", bhash);
			return;
		}

		let (mut slots, missing) = self.tx_pool.read().retrieve_transactions(&cb);

		if !missing.is_empty() {
			// the mempool doesn't hold everything, ask the announcer
			match self.peers().get_block_txs(addr, bhash, &missing) {
				Ok(txs) => {
					for (pos, tx) in missing.iter().zip(txs.into_iter()) {
						slots[*pos as usize] = Some(tx);
					}
				}
				Err(e) => {
					debug!(
						"peer {} failed to serve {} missing txs for its block {}: {:?}",
						addr,
						missing.len(),
						bhash,
						e
					);
					self.peers()
						.increase_ban_score(addr, self.config.rpc_failure_banscore, 0);
					return;
				}
			}
		}

		let block = Block::hydrate_from(cb, slots);
		let _ = self.process_block(block, addr, false);
	}

	/// A full block has been received from the network, push it through
	/// the pipeline as-is.
	pub fn block_received(&self, b: Block, addr: SocketAddr) {
		debug!(
			"Received block {} at {} from {}, {} txs, going to process.",
			b.hash(),
			b.header.height,
			addr,
			b.txs.len(),
		);
		let _ = self.process_block(b, addr, false);
	}

	/// The pipeline state machine. Classifies the outcome of the chain
	/// check and either holds the block back (orphan), repairs it (tx
	/// root mismatch), penalizes its relayer (rule violations) or hands
	/// it over to consensus.
	pub fn process_block(
		&self,
		b: Block,
		addr: SocketAddr,
		recheck: bool,
	) -> Result<(), chain::Error> {
		let bhash = b.hash();
		match self.chain().check_connect_block(&b) {
			Ok(()) => {
				self.propose_block(b);
				Ok(())
			}
			Err(e) => match e.kind() {
				ErrorKind::Orphan => {
					debug!(
						"process_block: block {} at {} is an orphan, holding back",
						bhash,
						b.header.height
					);
					self.orphans.add(Orphan {
						block: b,
						relaying_peer: addr,
						first_seen: Instant::now(),
					});
					Err(e)
				}
				ErrorKind::DoesNotConnect => {
					// losing side of a height race, mild and transient
					debug!("process_block: block {} does not connect", bhash);
					self.peers()
						.increase_ban_score(addr, 0, self.config.does_not_connect_banscore);
					Err(e)
				}
				_ if recheck && e.is_bad_data() => {
					// the relayer already got one repair, a block still
					// failing the rules now is on them
					debug!(
						"process_block: repaired block {} still refused by chain: {}",
						bhash,
						e.kind()
					);
					self.peers()
						.increase_ban_score(addr, self.config.failed_repair_banscore, 0);
					Err(e)
				}
				ErrorKind::InvalidTxRoot => {
					debug!(
						"process_block: tx root mismatch on {}, attempting repair",
						bhash
					);
					self.attempt_repair(b, addr, e)
				}
				_ if e.is_bad_data() => {
					debug!(
						"process_block: block {} refused by chain: {}",
						bhash,
						e.kind()
					);
					self.peers()
						.increase_ban_score(addr, self.config.rule_violation_banscore, 0);
					Err(e)
				}
				_ => Err(e),
			},
		}
	}

	// A tx root mismatch means either our mempool decode picked a
	// colliding transaction or the relayer sent a bad block. Refetch the
	// authoritative txid list and the differing transactions, first from
	// the relayer, then from anyone. Only the relayer is penalized when
	// it fails to repair its own block; helpers are not.
	fn attempt_repair(
		&self,
		b: Block,
		addr: SocketAddr,
		orig_err: chain::Error,
	) -> Result<(), chain::Error> {
		match self.fetch_patched_block(&b, addr) {
			Ok(patched) => return self.process_block(patched, addr, true),
			Err(e) => {
				debug!(
					"block {} relayer {} failed to repair it: {:?}",
					b.hash(),
					addr,
					e
				);
			}
		}

		// the originator failed to supply its own block's contents
		self.peers()
			.increase_ban_score(addr, self.config.failed_repair_banscore, 0);

		for peer in self.peers().rpc_peers() {
			if peer == addr {
				continue;
			}
			if self.stop_state.is_stopped() {
				return Err(orig_err);
			}
			match self.fetch_patched_block(&b, peer) {
				Ok(patched) => return self.process_block(patched, addr, true),
				Err(e) => trace!("peer {} could not repair {}: {:?}", peer, b.hash(), e),
			}
		}

		debug!("no peer could repair block {}, discarding", b.hash());
		Err(orig_err)
	}

	// Fetch the txid list for the block from the given peer and rebuild
	// the body around it: slots whose id already matches are kept, the
	// rest are fetched by position. The resulting transaction order
	// matches the txid order the peer returned.
	fn fetch_patched_block(&self, b: &Block, peer: SocketAddr) -> Result<Block, p2p::Error> {
		let bhash = b.hash();
		let txids = self.peers().get_block_txids(peer, bhash)?;

		// the list must actually produce the root the header commits to,
		// anything else can't repair the block no matter what we fetch
		if merkle_root(&txids) != b.header.tx_root {
			return Err(p2p::Error::BadResponse(
				"txid list does not match the header tx root".to_string(),
			));
		}

		let mut slots: Vec<Option<Transaction>> = Vec::with_capacity(txids.len());
		let mut wrong = vec![];
		for (pos, txid) in txids.iter().enumerate() {
			match b.txs.get(pos) {
				Some(tx) if tx.id() == *txid => slots.push(Some(tx.clone())),
				_ => {
					slots.push(None);
					wrong.push(pos as u32);
				}
			}
		}

		if !wrong.is_empty() {
			let txs = self.peers().get_block_txs(peer, bhash, &wrong)?;
			for (pos, tx) in wrong.iter().zip(txs.into_iter()) {
				if tx.id() != txids[*pos as usize] {
					return Err(p2p::Error::BadResponse(format!(
						"tx at position {} does not match the advertised txid",
						pos
					)));
				}
				slots[*pos as usize] = Some(tx);
			}
		}

		let txs = slots.into_iter().map(|s| s.unwrap_or_default()).collect();
		Ok(Block {
			header: b.header.clone(),
			txs,
		})
	}

	// The block passed all checks: move it into the active inventory and
	// hand it to the consensus engine, then wait for the verdict on a
	// dedicated thread. The insert doubles as the duplicate guard, a
	// second arrival of the same id is a no-op.
	fn propose_block(&self, b: Block) {
		let bhash = b.hash();
		{
			let mut inventory = self.active_inventory.write();
			if inventory.contains_key(&bhash) {
				debug!("block {} already in active inventory, ignoring", bhash);
				return;
			}
			inventory.insert(bhash, b.clone());
		}
		self.orphans.remove(&bhash);

		let (verdict_tx, verdict_rx) = sync_channel(1);
		self.consensus().new_block(bhash, true, verdict_tx);

		let adapter = self.clone();
		let _ = thread::Builder::new()
			.name("block_waiter".to_string())
			.spawn(move || adapter.await_verdict(b, verdict_rx));
	}

	// Waits for the consensus verdict on the given block and acts on it.
	// Global cancellation abandons the wait, leaving the inventory entry
	// to be cleaned up at shutdown.
	fn await_verdict(&self, b: Block, verdict_rx: Receiver<Status>) {
		let bhash = b.hash();
		loop {
			if self.stop_state.is_stopped() {
				return;
			}
			match verdict_rx.recv_timeout(VERDICT_POLL) {
				Ok(Status::Finalized) => {
					match self.chain().connect_block(&b, chain::Options::NONE) {
						Ok(()) => info!(
							"block {} at {} finalized and connected",
							bhash, b.header.height
						),
						Err(e) => error!(
							"failed to connect finalized block {}: {:?}",
							bhash, e
						),
					}
					self.active_inventory.write().remove(&bhash);

					// a waiting child may now be connectable; one per
					// finalize, it re-enters through the front door
					if let Some((orphan, orphan_peer)) =
						self.orphans.get_by_height(b.header.height + 1)
					{
						debug!(
							"processing orphan {} at {} after its parent connected",
							orphan.hash(),
							orphan.header.height
						);
						let _ = self.process_block(orphan, orphan_peer, false);
					}
					return;
				}
				Ok(Status::Rejected) => {
					debug!("block {} rejected by consensus, discarding", bhash);
					self.active_inventory.write().remove(&bhash);
					return;
				}
				Err(RecvTimeoutError::Timeout) => continue,
				Err(RecvTimeoutError::Disconnected) => {
					// the engine dropped the channel without a verdict,
					// which only happens when it is winding down
					debug!("consensus abandoned block {}", bhash);
					return;
				}
			}
		}
	}

	/// Invoked by the consensus engine when it hears a preference for a
	/// block we don't have: fetch it from the given peer and run it
	/// through the pipeline. The inflight set dedups concurrent fetches
	/// of the same block; entries expire after the configured TTL.
	pub fn request_block(&self, bhash: Hash, addr: SocketAddr) {
		let ttl = Duration::from_secs(self.config.inflight_ttl_secs);
		{
			let mut inflight = self.inflight.write();
			if let Some(at) = inflight.get(&bhash) {
				if at.elapsed() <= ttl {
					trace!("request_block: {} already in flight", bhash);
					return;
				}
			}
			inflight.insert(bhash, Instant::now());
		}

		match self.peers().get_block(addr, bhash) {
			Ok(b) => {
				let _ = self.process_block(b, addr, false);
				// the entry lingers until its TTL runs out, bounding
				// redundant fetches of the same block
			}
			Err(e) => {
				debug!("request_block: {} from {} failed: {:?}", bhash, addr, e);
				self.inflight.write().remove(&bhash);
			}
		}
	}

	/// Drop stale orphans and expired inflight entries. Run periodically
	/// by the server.
	pub fn sweep(&self) {
		let evicted = self
			.orphans
			.evict_older_than(Duration::from_secs(self.config.orphan_ttl_secs));
		if evicted > 0 {
			debug!("sweep: evicted {} stale orphans", evicted);
		}

		let ttl = Duration::from_secs(self.config.inflight_ttl_secs);
		let mut inflight = self.inflight.write();
		inflight.retain(|_, at| at.elapsed() <= ttl);
	}

	/// Whether the given block is currently held as an orphan.
	pub fn is_orphan(&self, h: &Hash) -> bool {
		self.orphans.contains(h)
	}
}

impl p2p::BlockFetcher for NetToChainAdapter {
	/// Serves our peers' chain-service requests. Blocks still being
	/// decided by consensus must be visible here, otherwise a peer
	/// decoding our own announcement could never retrieve its missing
	/// transactions.
	fn fetch_block(&self, h: &Hash) -> Option<Block> {
		if let Some(b) = self.active_inventory.read().get(h) {
			return Some(b.clone());
		}
		self.chain().get_block(h).ok()
	}
}

/// Implementation of the ChainAdapter for the network. Gets notified when
/// the chain accepted a new block, asking the pool to update its state.
pub struct ChainToPoolAdapter {
	tx_pool: Arc<RwLock<pool::TransactionPool>>,
}

impl ChainToPoolAdapter {
	/// Construct a ChainToPoolAdapter instance.
	pub fn new(tx_pool: Arc<RwLock<pool::TransactionPool>>) -> ChainToPoolAdapter {
		ChainToPoolAdapter { tx_pool }
	}
}

impl chain::ChainAdapter for ChainToPoolAdapter {
	fn block_accepted(&self, b: &Block, _opts: chain::Options) {
		self.tx_pool.write().reconcile_block(b);
	}
}

/// Implements the view of the chain required by the TransactionPool to
/// operate. Mostly needed to break any direct lifecycle or implementation
/// dependency between the pool and the chain.
#[derive(Clone)]
pub struct PoolToChainAdapter {
	chain: OneTime<Weak<chain::Chain>>,
}

impl PoolToChainAdapter {
	/// Create a new pool adapter
	pub fn new() -> PoolToChainAdapter {
		PoolToChainAdapter {
			chain: OneTime::new(),
		}
	}

	/// Set the pool adapter's chain. Should only be called once.
	pub fn set_chain(&self, chain_ref: Arc<chain::Chain>) {
		self.chain.init(Arc::downgrade(&chain_ref));
	}

	fn chain(&self) -> Arc<chain::Chain> {
		self.chain
			.borrow()
			.upgrade()
			.expect("Failed to upgrade the weak ref to our chain.")
	}
}

impl pool::BlockChain for PoolToChainAdapter {
	fn validate_tx(&self, tx: &Transaction) -> Result<(), pool::PoolError> {
		// the stateful validity of a transaction (proofs, spent
		// nullifiers) is the proof system's and chain's business; at the
		// pool boundary we only refuse kinds that never transit alone
		if tx.is_coinbase() {
			return Err(pool::PoolError::InvalidTx(
				"coinbase transactions are block-only".to_string(),
			));
		}
		let _ = self.chain().head().map_err(|e| {
			pool::PoolError::Other(format!("failed to get chain head: {:?}", e.kind()))
		})?;
		Ok(())
	}
}
