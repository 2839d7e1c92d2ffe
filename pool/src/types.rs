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

//! The primary module containing the implementations of the transaction
//! pool and its top-level members.

use umbra_core::core::Transaction;

/// Transaction pool configuration
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct PoolConfig {
	/// Maximum capacity of the pool in number of transactions
	#[serde(default = "default_max_pool_size")]
	pub max_pool_size: usize,
}

impl Default for PoolConfig {
	fn default() -> PoolConfig {
		PoolConfig {
			max_pool_size: default_max_pool_size(),
		}
	}
}

fn default_max_pool_size() -> usize {
	50_000
}

/// Used to make decisions based on transaction acceptance priority from
/// various sources. For example, a node may want to bypass pool size
/// restrictions when accepting a transaction from a local wallet.
#[derive(Debug, Clone)]
pub struct TxSource {
	/// Human-readable name used for logging and errors.
	pub debug_name: String,
	/// Unique identifier used to distinguish this peer from others.
	pub identifier: String,
}

/// Possible errors when interacting with the transaction pool.
#[derive(Debug, Fail)]
pub enum PoolError {
	/// The transaction was rejected by the chain view's validation.
	#[fail(display = "Invalid Tx: {}", _0)]
	InvalidTx(String),
	/// An identical transaction is already in the pool.
	#[fail(display = "Duplicate Tx")]
	DuplicateTx,
	/// The pool is at capacity.
	#[fail(display = "Over Capacity")]
	OverCapacity,
	/// Anything else.
	#[fail(display = "Other Pool Error: {}", _0)]
	Other(String),
}

/// The read-only view of the chain the pool needs to validate incoming
/// transactions. The validation logic itself lives with the chain and the
/// proof system; the pool only delegates.
pub trait BlockChain: Send + Sync {
	/// Validate a transaction against the current chain state.
	fn validate_tx(&self, tx: &Transaction) -> Result<(), PoolError>;
}
