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

//! Base types that the block chain pipeline requires.

use umbra_core::core::hash::Hash;
use umbra_core::core::{Block, BlockHeader};

bitflags! {
	/// Options for block validation
	pub struct Options: u32 {
		/// No flags
		const NONE = 0b0000_0000;
		/// Runs without checking the tip, used for the genesis connect
		const GENESIS = 0b0000_0001;
		/// Block connected while catching up with the network
		const SYNC = 0b0000_0010;
	}
}

/// The tip of the chain, a handle on the latest connected block. References
/// the height plus the latest and previous block ids for convenience, and
/// the timestamp of the latest block for scheduling.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Tip {
	/// Height of the tip (max height of the chain)
	pub height: u64,
	/// Last block pushed to the chain
	pub last_block_h: Hash,
	/// Block previous to last
	pub prev_block_h: Hash,
	/// Timestamp (unix seconds) of the last block
	pub timestamp: i64,
}

impl Tip {
	/// Creates a new tip based on provided header.
	pub fn from_header(header: &BlockHeader) -> Tip {
		Tip {
			height: header.height,
			last_block_h: header.hash(),
			prev_block_h: header.prev_block,
			timestamp: header.timestamp.timestamp(),
		}
	}
}

/// Bridge between the chain pipeline and the rest of the system. Handles
/// downstream processing of valid blocks by the rest of the system, most
/// importantly the reconciliation of the transaction pool.
pub trait ChainAdapter {
	/// The blockchain pipeline has accepted this block as valid and added
	/// it to our chain.
	fn block_accepted(&self, block: &Block, opts: Options);
}

/// Dummy adapter used as a placeholder to build the chain without a real
/// implementation.
pub struct NoopAdapter {}

impl ChainAdapter for NoopAdapter {
	fn block_accepted(&self, _block: &Block, _opts: Options) {}
}
