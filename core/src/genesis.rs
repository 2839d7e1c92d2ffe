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

//! Definition of the genesis blocks. Note the stake transaction of a
//! genesis block references a txo root derived from the coinbase outputs
//! of the very same block, a self-reference permitted only at height 0.

use chrono::prelude::{TimeZone, Utc};

use crate::core::{
	fold_txo_root, tx_merkle_root, Block, BlockHeader, CoinbaseTransaction, Commitment, Nullifier,
	Output, StakeTransaction, Transaction,
};
use crate::core::hash::ZERO_HASH;
use crate::global::{self, ChainTypes};

fn genesis_block(seed: u8, timestamp: i64) -> Block {
	let coinbase = CoinbaseTransaction {
		validator_id: vec![seed; 36],
		new_coins: 230_584_300,
		outputs: vec![Output {
			commitment: Commitment([seed; 32]),
			ciphertext: vec![seed; 48],
		}],
		signature: vec![seed; 64],
		proof: vec![seed; 96],
	};

	// the stake commits to the txo root produced by the coinbase outputs of
	// this same block
	let stake = StakeTransaction {
		validator_id: vec![seed; 36],
		amount: 115_292_150,
		nullifier: Nullifier([seed ^ 0xff; 32]),
		txo_root: fold_txo_root(&ZERO_HASH, &coinbase.outputs),
		locked_until: 0,
		signature: vec![seed; 64],
		proof: vec![seed; 96],
	};

	let txs = vec![
		Transaction::Coinbase(coinbase),
		Transaction::Stake(stake),
	];

	let header = BlockHeader {
		version: 1,
		height: 0,
		prev_block: ZERO_HASH,
		timestamp: Utc.timestamp(timestamp, 0),
		tx_root: tx_merkle_root(&txs),
		producer_id: vec![seed; 36],
		signature: vec![seed; 64],
	};

	Block { header, txs }
}

/// Genesis block definition for development and testing purposes.
pub fn genesis_dev() -> Block {
	genesis_block(0x0a, 1_546_300_800)
}

/// Testnet genesis block.
pub fn genesis_test() -> Block {
	genesis_block(0x2b, 1_563_926_400)
}

/// Mainnet genesis block.
pub fn genesis_main() -> Block {
	genesis_block(0x4d, 1_571_443_200)
}

/// The genesis block matching the provided chain type.
pub fn genesis_for(chain_type: ChainTypes) -> Block {
	match chain_type {
		ChainTypes::Mainnet => genesis_main(),
		ChainTypes::Testnet => genesis_test(),
		ChainTypes::Regtest | ChainTypes::AutomatedTesting => genesis_dev(),
	}
}

/// The genesis block for the currently configured chain type.
pub fn genesis() -> Block {
	genesis_for(global::chain_type())
}

#[cfg(test)]
mod test {
	use super::*;
	use crate::core::hash::Hashed;

	#[test]
	fn genesis_is_deterministic() {
		assert_eq!(genesis_dev().hash(), genesis_dev().hash());
		assert_ne!(genesis_dev().hash(), genesis_main().hash());
	}

	#[test]
	fn genesis_stake_references_own_coinbase() {
		let gen = genesis_dev();
		let coinbase_outputs = gen.txs[0].outputs();
		let derived = fold_txo_root(&ZERO_HASH, coinbase_outputs);
		match &gen.txs[1] {
			Transaction::Stake(stake) => assert_eq!(stake.txo_root, derived),
			_ => panic!("expected stake transaction"),
		}
	}
}
