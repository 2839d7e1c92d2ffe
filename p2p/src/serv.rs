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

//! The chain-service server. Accepts connections from peers, runs the
//! handshake, then serves their requests on a dedicated thread per
//! stream. Outbound connections are the streams we in turn query.

use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crate::conn;
use crate::handshake;
use crate::peer::Peer;
use crate::peers::Peers;
use crate::protocol::Protocol;
use crate::types::{BlockFetcher, Direction, Error, P2PConfig, PeerInfo};
use umbra_core::core::hash::Hash;
use umbra_util::StopState;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const ACCEPT_POLL: Duration = Duration::from_millis(250);

/// P2P server implementation, handling bootstrapping to find and connect
/// to peers, receiving connections from other peers and keep track of all
/// of them.
pub struct Server {
	config: P2PConfig,
	genesis: Hash,
	fetcher: Arc<dyn BlockFetcher>,
	/// The set of connected peers
	pub peers: Arc<Peers>,
	stop_state: Arc<StopState>,
}

impl Server {
	/// Creates a new idle p2p server with no peers
	pub fn new(
		config: P2PConfig,
		genesis: Hash,
		fetcher: Arc<dyn BlockFetcher>,
		stop_state: Arc<StopState>,
	) -> Server {
		Server {
			peers: Arc::new(Peers::new(config.clone())),
			config,
			genesis,
			fetcher,
			stop_state,
		}
	}

	/// Starts a new TCP server and listen to incoming connections. This is a
	/// blocking call until the TCP server stops.
	pub fn listen(&self) -> Result<(), Error> {
		let addr = SocketAddr::new(self.config.host, self.config.port);
		let listener = TcpListener::bind(addr)?;
		listener.set_nonblocking(true)?;
		info!("chainservice: listening on {}", addr);

		loop {
			if self.stop_state.is_stopped() {
				break;
			}
			match listener.accept() {
				Ok((stream, peer_addr)) => {
					if self.peers.is_banned(&peer_addr) {
						debug!("peer {} banned, refusing connection", peer_addr);
						continue;
					}
					let genesis = self.genesis;
					let fetcher = self.fetcher.clone();
					let peers = self.peers.clone();
					let stop_state = self.stop_state.clone();
					let decay = self.config.score_decay_secs;
					let _ = thread::Builder::new()
						.name("peer_serve".to_string())
						.spawn(move || {
							if let Err(e) = serve_peer(
								stream, peer_addr, genesis, fetcher, peers, decay, stop_state,
							) {
								debug!("serving {} ended: {:?}", peer_addr, e);
							}
						});
				}
				Err(ref e) if e.kind() == std::io::ErrorKind::WouldBlock => {
					thread::sleep(ACCEPT_POLL);
				}
				Err(e) => {
					warn!("couldn't establish new client connection: {:?}", e);
				}
			}
		}

		self.peers.stop();
		Ok(())
	}

	/// Asks the server to connect to a new peer. Directly returns the peer
	/// if we're already connected to the provided address. The resulting
	/// stream is ours to query.
	pub fn connect(&self, addr: &SocketAddr) -> Result<Arc<Peer>, Error> {
		if self.stop_state.is_stopped() {
			return Err(Error::Stopped);
		}
		if self.peers.is_banned(addr) {
			return Err(Error::Banned);
		}
		if let Some(p) = self.peers.get_connected_peer(addr) {
			trace!("connect: already connected {}", addr);
			return Ok(p);
		}

		debug!("connect: dialing {}", addr);
		let mut stream = TcpStream::connect_timeout(addr, CONNECT_TIMEOUT)?;
		conn::set_stream_timeouts(&stream)?;

		let version = handshake::initiate(&mut stream, self.genesis, &self.stop_state)?;
		let info = PeerInfo {
			version,
			addr: *addr,
			direction: Direction::Outbound,
		};
		let peer = Arc::new(Peer::new(
			info,
			stream,
			self.config.score_decay_secs,
			self.stop_state.clone(),
		));
		self.peers.add_connected(peer.clone());
		info!("connected to peer {}", addr);
		Ok(peer)
	}

	/// Stops the server. Disconnects all peers; the listen loop winds down
	/// on its next poll of the stop state.
	pub fn stop(&self) {
		self.peers.stop();
	}
}

// Inbound connection lifecycle: handshake, register, serve until the
// stream dies, deregister.
fn serve_peer(
	mut stream: TcpStream,
	peer_addr: SocketAddr,
	genesis: Hash,
	fetcher: Arc<dyn BlockFetcher>,
	peers: Arc<Peers>,
	score_decay_secs: u64,
	stop_state: Arc<StopState>,
) -> Result<(), Error> {
	conn::set_stream_timeouts(&stream)?;
	let version = handshake::respond(&mut stream, genesis, &stop_state)?;

	let info = PeerInfo {
		version,
		addr: peer_addr,
		direction: Direction::Inbound,
	};
	let peer = Arc::new(Peer::new(
		info,
		stream.try_clone()?,
		score_decay_secs,
		stop_state.clone(),
	));
	peers.add_connected(peer);

	let protocol = Protocol::new(fetcher, stop_state);
	let res = protocol.handle(&mut stream, peer_addr);
	peers.remove_peer(&peer_addr);
	res
}
