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

//! Block building helpers shared by the chain tests.

use std::sync::Arc;

use chrono::prelude::{TimeZone, Utc};
use umbra_chain::{Chain, MemStore, NoopAdapter};
use umbra_core::core::hash::Hash;
use umbra_core::core::{
	tx_merkle_root, Block, BlockHeader, CoinbaseTransaction, Commitment, Nullifier, Output,
	StandardTransaction, Transaction,
};
use umbra_core::genesis;

/// A chain backed by a fresh in-memory store, seeded with the dev genesis.
pub fn init_chain() -> Chain {
	Chain::init(
		genesis::genesis_dev(),
		Arc::new(MemStore::new()),
		Arc::new(NoopAdapter {}),
	)
	.unwrap()
}

/// A coinbase claiming the reward for the given height. The height makes
/// the txid unique per block.
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

/// A standard shielded spend whose nullifier is derived from the seed.
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

/// Build a block on top of an arbitrary parent position.
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

/// Build the next block on the current chain head.
pub fn build_block(chain: &Chain, txs: Vec<Transaction>) -> Block {
	let head = chain.head().unwrap();
	build_block_on(head.last_block_h, head.height, head.timestamp, txs)
}
