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

//! The set of connected peers and the ban scoring gateway. Every score
//! delta flows through here so crossing the ban threshold reliably
//! disconnects and blocklists the peer, whichever subsystem observed the
//! misbehavior.

use std::collections::{HashMap, HashSet};
use std::net::SocketAddr;
use std::sync::Arc;

use crate::peer::Peer;
use crate::types::{BlockRpc, Error, P2PConfig};
use umbra_core::core::hash::Hash;
use umbra_core::core::{Block, Transaction};
use umbra_util::RwLock;

/// All the peers we are connected to, plus the ban list.
pub struct Peers {
	config: P2PConfig,
	peers: RwLock<HashMap<SocketAddr, Arc<Peer>>>,
	banned: RwLock<HashSet<SocketAddr>>,
}

impl Peers {
	/// New, empty peer set.
	pub fn new(config: P2PConfig) -> Peers {
		Peers {
			config,
			peers: RwLock::new(HashMap::new()),
			banned: RwLock::new(HashSet::new()),
		}
	}

	/// Track a freshly connected peer.
	pub fn add_connected(&self, peer: Arc<Peer>) {
		let mut peers = self.peers.write();
		peers.insert(peer.addr(), peer);
	}

	/// The peer under the given address, if connected.
	pub fn get_connected_peer(&self, addr: &SocketAddr) -> Option<Arc<Peer>> {
		self.peers.read().get(addr).cloned()
	}

	/// All connected peers.
	pub fn connected_peers(&self) -> Vec<Arc<Peer>> {
		self.peers.read().values().cloned().collect()
	}

	/// Number of connected peers.
	pub fn peer_count(&self) -> usize {
		self.peers.read().len()
	}

	/// Whether the address sits on the ban list.
	pub fn is_banned(&self, addr: &SocketAddr) -> bool {
		self.banned.read().contains(addr)
	}

	/// Bans a peer, disconnecting it if we're currently connected.
	pub fn ban_peer(&self, addr: &SocketAddr) {
		warn!("banning peer {}", addr);
		self.banned.write().insert(*addr);
		let removed = self.peers.write().remove(addr);
		if let Some(peer) = removed {
			peer.stop();
		}
	}

	/// Forget a disconnected peer.
	pub fn remove_peer(&self, addr: &SocketAddr) {
		self.peers.write().remove(addr);
	}

	/// Close every connection and stop tracking.
	pub fn stop(&self) {
		let peers = {
			let mut map = self.peers.write();
			map.drain().map(|(_, p)| p).collect::<Vec<_>>()
		};
		for peer in peers {
			peer.stop();
		}
	}

	fn rpc_peer(&self, addr: &SocketAddr) -> Result<Arc<Peer>, Error> {
		match self.get_connected_peer(addr) {
			Some(peer) if peer.is_outbound() => Ok(peer),
			Some(_) => Err(Error::PeerNotFound),
			None => Err(Error::PeerNotFound),
		}
	}
}

impl BlockRpc for Peers {
	fn get_block(&self, peer: SocketAddr, h: Hash) -> Result<Block, Error> {
		self.rpc_peer(&peer)?.get_block(h)
	}

	fn get_block_txids(&self, peer: SocketAddr, h: Hash) -> Result<Vec<Hash>, Error> {
		self.rpc_peer(&peer)?.get_block_txids(h)
	}

	fn get_block_txs(
		&self,
		peer: SocketAddr,
		h: Hash,
		indices: &[u32],
	) -> Result<Vec<Transaction>, Error> {
		self.rpc_peer(&peer)?.get_block_txs(h, indices)
	}

	fn increase_ban_score(&self, peer: SocketAddr, behavioral: u32, transient: u32) {
		let total = match self.get_connected_peer(&peer) {
			Some(p) => p.increase_ban_score(behavioral, transient),
			None => {
				debug!(
					"ban score +{}/+{} for unknown peer {}, ignoring",
					behavioral, transient, peer
				);
				return;
			}
		};
		if total > self.config.ban_threshold {
			self.ban_peer(&peer);
		}
	}

	fn rpc_peers(&self) -> Vec<SocketAddr> {
		self.peers
			.read()
			.values()
			.filter(|p| p.is_outbound())
			.map(|p| p.addr())
			.collect()
	}
}
