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

//! Shared types for the p2p layer.

use std::io;
use std::net::{IpAddr, SocketAddr};

use umbra_core::core::hash::Hash;
use umbra_core::core::{Block, Transaction};
use umbra_core::ser;

/// Errors the p2p layer surfaces to its callers.
#[derive(Debug)]
pub enum Error {
	/// Message encoding or decoding failed
	Serialization(ser::Error),
	/// Underlying connection error
	Connection(io::Error),
	/// The remote side closed the connection
	ConnectionClose,
	/// The node is shutting down, the pending operation was abandoned
	Stopped,
	/// The peer is banned
	Banned,
	/// No connected peer under that address
	PeerNotFound,
	/// The remote does not have the requested block
	NotFound,
	/// The remote judged our request malformed (index out of range)
	BadRequest,
	/// The remote sent a response that does not answer the request
	BadResponse(String),
	/// The peer talks another protocol (or another network)
	ProtocolMismatch {
		/// Our protocol identifier
		us: String,
		/// The identifier the peer sent
		peer: String,
	},
	/// The peer runs on a chain with a different genesis
	GenesisMismatch {
		/// Our genesis block id
		us: Hash,
		/// The genesis block id the peer sent
		peer: Hash,
	},
}

impl From<ser::Error> for Error {
	fn from(e: ser::Error) -> Error {
		Error::Serialization(e)
	}
}

impl From<io::Error> for Error {
	fn from(e: io::Error) -> Error {
		Error::Connection(e)
	}
}

/// Configuration for the peer-to-peer server.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct P2PConfig {
	/// Address the chain service listens on
	pub host: IpAddr,
	/// Port the chain service listens on
	pub port: u16,
	/// Ban a peer when its combined score exceeds this
	#[serde(default = "default_ban_threshold")]
	pub ban_threshold: u32,
	/// Seconds after which the transient part of a peer score halves
	#[serde(default = "default_score_decay_secs")]
	pub score_decay_secs: u64,
}

impl Default for P2PConfig {
	fn default() -> P2PConfig {
		P2PConfig {
			host: "0.0.0.0".parse().unwrap(),
			port: 9119,
			ban_threshold: default_ban_threshold(),
			score_decay_secs: default_score_decay_secs(),
		}
	}
}

fn default_ban_threshold() -> u32 {
	100
}

fn default_score_decay_secs() -> u64 {
	600
}

/// Who opened the connection. Requests flow from the dialer to the
/// acceptor, so only outbound peers can be queried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
	/// The peer dialed us, we serve its requests
	Inbound,
	/// We dialed the peer, we may send it requests
	Outbound,
}

/// General information about a connected peer that's useful to other
/// modules.
#[derive(Clone, Debug)]
pub struct PeerInfo {
	/// Protocol version negotiated on handshake
	pub version: u32,
	/// Network address of the peer
	pub addr: SocketAddr,
	/// Who dialed whom
	pub direction: Direction,
}

/// Callback the chain-service server answers requests from. Supplied by
/// the ingest coordinator: it must see blocks that are still being decided
/// by consensus (active inventory) as well as connected blocks, otherwise
/// a peer decoding our own announcement could never retrieve the
/// transactions it is missing.
pub trait BlockFetcher: Send + Sync {
	/// The block under the given id, from the active inventory or the
	/// connected chain. None if we have never fully validated such a
	/// block.
	fn fetch_block(&self, h: &Hash) -> Option<Block>;
}

/// The view of the peer set the ingest coordinator works against: issue
/// chain-service calls to a specific peer and apply ban score deltas when
/// a peer misbehaves.
pub trait BlockRpc: Send + Sync {
	/// Fetch a full block from the given peer.
	fn get_block(&self, peer: SocketAddr, h: Hash) -> Result<Block, Error>;

	/// Fetch the ordered transaction ids of a block from the given peer.
	fn get_block_txids(&self, peer: SocketAddr, h: Hash) -> Result<Vec<Hash>, Error>;

	/// Fetch the transactions at the given positions of a block from the
	/// given peer. The result is position aligned with `indices`.
	fn get_block_txs(
		&self,
		peer: SocketAddr,
		h: Hash,
		indices: &[u32],
	) -> Result<Vec<Transaction>, Error>;

	/// Apply a ban score delta to the peer. The behavioral part is
	/// permanent and encodes provable misbehavior; the transient part
	/// decays over time and encodes racy conditions honest peers can hit.
	fn increase_ban_score(&self, peer: SocketAddr, behavioral: u32, transient: u32);

	/// Addresses of every peer we can currently query, most recently
	/// connected first.
	fn rpc_peers(&self) -> Vec<SocketAddr>;
}
