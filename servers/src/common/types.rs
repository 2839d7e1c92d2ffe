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

//! Server types, the server configuration and the errors it can surface.

use umbra_chain as chain;
use umbra_core::global::ChainTypes;
use umbra_p2p as p2p;
use umbra_pool as pool;

/// Error type wrapping underlying module errors.
#[derive(Debug)]
pub enum Error {
	/// Error originating from the blockchain implementation.
	Chain(chain::Error),
	/// Error originating from the peer-to-peer layer.
	P2P(p2p::Error),
	/// Error originating from the transaction pool.
	Pool(pool::PoolError),
	/// Error originating from some I/O operation (likely the listener).
	IOError(std::io::Error),
}

impl From<chain::Error> for Error {
	fn from(e: chain::Error) -> Error {
		Error::Chain(e)
	}
}

impl From<p2p::Error> for Error {
	fn from(e: p2p::Error) -> Error {
		Error::P2P(e)
	}
}

impl From<pool::PoolError> for Error {
	fn from(e: pool::PoolError) -> Error {
		Error::Pool(e)
	}
}

impl From<std::io::Error> for Error {
	fn from(e: std::io::Error) -> Error {
		Error::IOError(e)
	}
}

/// Ban-score deltas and bookkeeping windows of the ingest pipeline. The
/// numeric defaults are the reference policy; operators can tune them but
/// rarely should.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PolicyConfig {
	/// Behavioral score for a peer failing to serve data for a block it
	/// announced itself
	#[serde(default = "default_rpc_failure_banscore")]
	pub rpc_failure_banscore: u32,
	/// Behavioral score for relaying a block violating a consensus rule,
	/// enough to ban on its own
	#[serde(default = "default_rule_violation_banscore")]
	pub rule_violation_banscore: u32,
	/// Behavioral score when a tx-root repair fails, or when a repaired
	/// block still fails the rules on recheck
	#[serde(default = "default_failed_repair_banscore")]
	pub failed_repair_banscore: u32,
	/// Transient score for a block that no longer connects, usually a
	/// lost height race
	#[serde(default = "default_does_not_connect_banscore")]
	pub does_not_connect_banscore: u32,
	/// Seconds an entry stays in the inflight request set
	#[serde(default = "default_inflight_ttl_secs")]
	pub inflight_ttl_secs: u64,
	/// Seconds an orphan block is retained before eviction
	#[serde(default = "default_orphan_ttl_secs")]
	pub orphan_ttl_secs: u64,
	/// Seconds between sweeps of the orphan and inflight maps
	#[serde(default = "default_sweep_interval_secs")]
	pub sweep_interval_secs: u64,
}

impl Default for PolicyConfig {
	fn default() -> PolicyConfig {
		PolicyConfig {
			rpc_failure_banscore: default_rpc_failure_banscore(),
			rule_violation_banscore: default_rule_violation_banscore(),
			failed_repair_banscore: default_failed_repair_banscore(),
			does_not_connect_banscore: default_does_not_connect_banscore(),
			inflight_ttl_secs: default_inflight_ttl_secs(),
			orphan_ttl_secs: default_orphan_ttl_secs(),
			sweep_interval_secs: default_sweep_interval_secs(),
		}
	}
}

fn default_rpc_failure_banscore() -> u32 {
	50
}

fn default_rule_violation_banscore() -> u32 {
	101
}

fn default_failed_repair_banscore() -> u32 {
	34
}

fn default_does_not_connect_banscore() -> u32 {
	10
}

fn default_inflight_ttl_secs() -> u64 {
	300
}

fn default_orphan_ttl_secs() -> u64 {
	600
}

fn default_sweep_interval_secs() -> u64 {
	30
}

/// Full server configuration, aggregating the member configurations.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServerConfig {
	/// Chain the server is running on (mainnet, testnet, regtest)
	#[serde(default)]
	pub chain_type: ChainTypes,
	/// Configuration of the p2p layer
	#[serde(default)]
	pub p2p_config: p2p::P2PConfig,
	/// Transaction pool configuration
	#[serde(default)]
	pub pool_config: pool::PoolConfig,
	/// Ingest pipeline policy values
	#[serde(default)]
	pub policy_config: PolicyConfig,
}

impl Default for ServerConfig {
	fn default() -> ServerConfig {
		ServerConfig {
			chain_type: ChainTypes::default(),
			p2p_config: p2p::P2PConfig::default(),
			pool_config: pool::PoolConfig::default(),
			policy_config: PolicyConfig::default(),
		}
	}
}
