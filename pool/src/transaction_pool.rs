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

//! Transaction pool implementation. Entries are kept ordered by
//! transaction id so fingerprint lookups resolve collisions
//! deterministically.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use crate::types::{BlockChain, PoolConfig, PoolError, TxSource};
use umbra_core::core::hash::Hash;
use umbra_core::core::{Block, ShortId, ShortIdentifiable, Transaction, XThinnerBlock};

/// Transaction pool implementation.
pub struct TransactionPool {
	/// Pool configuration
	pub config: PoolConfig,
	/// All transactions in the pool, keyed and ordered by id
	txs: BTreeMap<Hash, Transaction>,
	/// The blockchain
	pub blockchain: Arc<dyn BlockChain>,
}

impl TransactionPool {
	/// Create a new transaction pool
	pub fn new(config: PoolConfig, blockchain: Arc<dyn BlockChain>) -> TransactionPool {
		TransactionPool {
			config,
			txs: BTreeMap::new(),
			blockchain,
		}
	}

	/// Number of transactions currently in the pool.
	pub fn total_size(&self) -> usize {
		self.txs.len()
	}

	/// Whether the pool currently holds the given transaction.
	pub fn contains_tx(&self, id: &Hash) -> bool {
		self.txs.contains_key(id)
	}

	/// Retrieve a transaction by id, if the pool holds it.
	pub fn get_tx(&self, id: &Hash) -> Option<Transaction> {
		self.txs.get(id).cloned()
	}

	/// Add the given transaction to the pool, validating it through the
	/// chain view first.
	pub fn add_to_pool(&mut self, src: TxSource, tx: Transaction) -> Result<(), PoolError> {
		let id = tx.id();
		if self.txs.contains_key(&id) {
			return Err(PoolError::DuplicateTx);
		}
		if self.txs.len() >= self.config.max_pool_size {
			return Err(PoolError::OverCapacity);
		}

		self.blockchain
			.validate_tx(&tx)
			.map_err(|e| PoolError::InvalidTx(format!("{}", e)))?;

		debug!(
			"add_to_pool [{}]: {} (pool size {})",
			src.debug_name,
			id,
			self.txs.len() + 1
		);
		self.txs.insert(id, tx);
		Ok(())
	}

	/// Look up the transactions announced by an xthinner compact block.
	/// Returns one entry per block position (prefilled transactions
	/// included), plus the ordered list of positions nothing in the pool
	/// matched.
	///
	/// Deterministic for a given pool content: when two pool transactions
	/// share a fingerprint the one with the smallest id wins, which may
	/// not be the announced one. The tx root check downstream catches
	/// that.
	pub fn retrieve_transactions(
		&self,
		cb: &XThinnerBlock,
	) -> (Vec<Option<Transaction>>, Vec<u32>) {
		use umbra_core::core::hash::Hashed;
		let block_hash = cb.hash();
		let prefilled = cb.txs_full.len();

		// fingerprint every pool tx for this announcement; iteration is in
		// ascending id order so first insert wins ties deterministically
		let mut index: HashMap<ShortId, &Transaction> = HashMap::new();
		for tx in self.txs.values() {
			let short_id = tx.short_id(&block_hash, cb.nonce);
			index.entry(short_id).or_insert(tx);
		}

		let mut slots = Vec::with_capacity(cb.len());
		for tx in &cb.txs_full {
			slots.push(Some(tx.clone()));
		}
		let mut missing = vec![];
		for (pos, short_id) in cb.tx_ids.iter().enumerate() {
			match index.get(short_id) {
				Some(tx) => slots.push(Some((*tx).clone())),
				None => {
					slots.push(None);
					missing.push((prefilled + pos) as u32);
				}
			}
		}

		debug!(
			"pool: retrieved {} of {} announced txs ({} missing)",
			slots.iter().filter(|s| s.is_some()).count(),
			cb.len(),
			missing.len()
		);

		(slots, missing)
	}

	/// Reconcile the pool against a newly connected block, removing every
	/// transaction the block confirmed.
	pub fn reconcile_block(&mut self, block: &Block) {
		let mut removed = 0;
		for tx in &block.txs {
			if self.txs.remove(&tx.id()).is_some() {
				removed += 1;
			}
		}
		if removed > 0 {
			debug!(
				"pool: removed {} txs confirmed by block at {}",
				removed, block.header.height
			);
		}
	}
}

#[cfg(test)]
mod test {
	use super::*;
	use umbra_core::core::{BlockHeader, StandardTransaction};

	struct PermissiveChain;
	impl BlockChain for PermissiveChain {
		fn validate_tx(&self, _tx: &Transaction) -> Result<(), PoolError> {
			Ok(())
		}
	}

	fn test_source() -> TxSource {
		TxSource {
			debug_name: "test".to_string(),
			identifier: "?.?.?.?".to_string(),
		}
	}

	fn pool() -> TransactionPool {
		TransactionPool::new(PoolConfig::default(), Arc::new(PermissiveChain))
	}

	fn tx_with_fee(fee: u64) -> Transaction {
		Transaction::Standard(StandardTransaction {
			fee,
			..Default::default()
		})
	}

	#[test]
	fn add_and_duplicate() {
		let mut pool = pool();
		let tx = tx_with_fee(1);
		pool.add_to_pool(test_source(), tx.clone()).unwrap();
		assert_eq!(pool.total_size(), 1);
		assert!(pool.contains_tx(&tx.id()));
		match pool.add_to_pool(test_source(), tx) {
			Err(PoolError::DuplicateTx) => {}
			other => panic!("expected DuplicateTx, got {:?}", other.map(|_| ())),
		}
	}

	#[test]
	fn retrieve_aligns_positions() {
		use umbra_core::core::CoinbaseTransaction;

		let mut pool = pool();
		let mut txs = vec![Transaction::Coinbase(CoinbaseTransaction::default())];
		txs.extend((1..=4u64).map(tx_with_fee));
		// everything except the last standard tx is known to the pool;
		// the coinbase never enters the pool, it rides along prefilled
		for tx in txs.iter().skip(1).take(3) {
			pool.add_to_pool(test_source(), tx.clone()).unwrap();
		}

		let mut header = BlockHeader::default();
		header.height = 1;
		let block = Block::with_txs(header, txs.clone());
		let cb: XThinnerBlock = block.into();

		let (slots, missing) = pool.retrieve_transactions(&cb);
		assert_eq!(slots.len(), 5);
		assert_eq!(missing, vec![4]);
		for i in 0..4 {
			assert_eq!(slots[i].as_ref().unwrap().id(), txs[i].id());
		}
		assert!(slots[4].is_none());
	}

	#[test]
	fn reconcile_removes_confirmed() {
		let mut pool = pool();
		let txs = (1..=3u64).map(tx_with_fee).collect::<Vec<_>>();
		for tx in &txs {
			pool.add_to_pool(test_source(), tx.clone()).unwrap();
		}
		let block = Block::with_txs(BlockHeader::default(), txs[..2].to_vec());
		pool.reconcile_block(&block);
		assert_eq!(pool.total_size(), 1);
		assert!(pool.contains_tx(&txs[2].id()));
	}
}
