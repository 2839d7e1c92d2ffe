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

//! Values that should be shared across all modules, without necessarily
//! having to pass them all over the place, but aren't consensus values.
//! Should be used sparingly.

use umbra_util::RwLock;

/// Define these here, as they should be developer-set, not really tweakable
/// by users

/// Protocol version of the chain service, bumped on any wire break.
pub const PROTOCOL_VERSION: u32 = 1;

/// Types of chain a server can run with, dictates the genesis block and
/// the network prefix of every protocol identifier.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub enum ChainTypes {
	/// For CI testing
	AutomatedTesting,
	/// For local development and single node setups
	Regtest,
	/// Public testing network
	Testnet,
	/// Main production network
	Mainnet,
}

impl ChainTypes {
	/// Short name representing the chain type ("main", "test", "reg", "auto")
	pub fn shortname(&self) -> String {
		match *self {
			ChainTypes::AutomatedTesting => "auto".to_owned(),
			ChainTypes::Regtest => "reg".to_owned(),
			ChainTypes::Testnet => "test".to_owned(),
			ChainTypes::Mainnet => "main".to_owned(),
		}
	}

	/// Network prefix put in front of every protocol identifier, distinct
	/// per network so nodes on different networks never talk past each
	/// other.
	pub fn protocol_prefix(&self) -> &'static str {
		match *self {
			ChainTypes::AutomatedTesting => "/umbra/ci/",
			ChainTypes::Regtest => "/umbra/regtest/",
			ChainTypes::Testnet => "/umbra/testnet/",
			ChainTypes::Mainnet => "/umbra/",
		}
	}
}

impl Default for ChainTypes {
	fn default() -> ChainTypes {
		ChainTypes::Mainnet
	}
}

lazy_static! {
	/// The chain type on which the node is operating
	pub static ref CHAIN_TYPE: RwLock<ChainTypes> = RwLock::new(ChainTypes::Mainnet);
}

/// Set the chain type, should be called once on startup (or per test).
pub fn set_chain_type(new_type: ChainTypes) {
	let mut chain_type_ref = CHAIN_TYPE.write();
	*chain_type_ref = new_type;
}

/// The chain type the node is running on.
pub fn chain_type() -> ChainTypes {
	*CHAIN_TYPE.read()
}

/// Stream protocol identifier of the chain service for the current network.
pub fn chain_service_protocol() -> String {
	format!("{}chainservice", chain_type().protocol_prefix())
}

/// Are we in production mode (a public network)?
pub fn is_production_mode() -> bool {
	let chain_type = chain_type();
	ChainTypes::Testnet == chain_type || ChainTypes::Mainnet == chain_type
}
