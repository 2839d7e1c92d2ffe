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

//! Ban scoring behavior of the peer set.

use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use umbra_p2p::types::{BlockRpc, Direction, P2PConfig, PeerInfo};
use umbra_p2p::{Peer, Peers};
use umbra_util::{self as util, StopState};

fn stream_pair() -> (TcpStream, TcpStream, SocketAddr) {
	let listener = TcpListener::bind("127.0.0.1:0").unwrap();
	let addr = listener.local_addr().unwrap();
	let handle = thread::spawn(move || listener.accept().unwrap().0);
	let client = TcpStream::connect(addr).unwrap();
	let server = handle.join().unwrap();
	(client, server, addr)
}

fn outbound_peer(decay_secs: u64) -> (Arc<Peer>, TcpStream) {
	let (client, server, addr) = stream_pair();
	let info = PeerInfo {
		version: 1,
		addr,
		direction: Direction::Outbound,
	};
	let peer = Arc::new(Peer::new(
		info,
		client,
		decay_secs,
		Arc::new(StopState::new()),
	));
	(peer, server)
}

#[test]
fn ban_threshold_disconnects() {
	util::init_test_logger();
	let config = P2PConfig::default();
	assert_eq!(config.ban_threshold, 100);

	let peers = Peers::new(config);
	let (peer, _server) = outbound_peer(600);
	let addr = peer.addr();
	peers.add_connected(peer);

	// provable-but-single misbehavior stays connected
	peers.increase_ban_score(addr, 50, 0);
	assert!(peers.get_connected_peer(&addr).is_some());
	assert!(!peers.is_banned(&addr));

	// crossing the threshold bans and disconnects
	peers.increase_ban_score(addr, 51, 0);
	assert!(peers.get_connected_peer(&addr).is_none());
	assert!(peers.is_banned(&addr));
	assert_eq!(peers.peer_count(), 0);
}

#[test]
fn transient_score_decays() {
	util::init_test_logger();
	let (peer, _server) = outbound_peer(1);
	assert_eq!(peer.increase_ban_score(0, 10), 10);
	thread::sleep(Duration::from_millis(1100));
	// one decay interval has passed, the transient part halved
	assert_eq!(peer.ban_score(), 5);
}

#[test]
fn behavioral_score_does_not_decay() {
	util::init_test_logger();
	let (peer, _server) = outbound_peer(1);
	assert_eq!(peer.increase_ban_score(40, 0), 40);
	thread::sleep(Duration::from_millis(1100));
	assert_eq!(peer.ban_score(), 40);
}

#[test]
fn scores_accumulate_across_reports() {
	util::init_test_logger();
	let config = P2PConfig::default();
	let peers = Peers::new(config);
	let (peer, _server) = outbound_peer(600);
	let addr = peer.addr();
	peers.add_connected(peer.clone());

	peers.increase_ban_score(addr, 34, 0);
	peers.increase_ban_score(addr, 0, 10);
	peers.increase_ban_score(addr, 34, 0);
	assert_eq!(peer.ban_score(), 78);
	assert!(!peers.is_banned(&addr));
}

#[test]
fn rpc_peers_lists_outbound_only() {
	util::init_test_logger();
	let peers = Peers::new(P2PConfig::default());
	let (outbound, _s1) = outbound_peer(600);
	let out_addr = outbound.addr();
	peers.add_connected(outbound);

	let (client, _server, addr) = stream_pair();
	let inbound = Arc::new(Peer::new(
		PeerInfo {
			version: 1,
			addr,
			direction: Direction::Inbound,
		},
		client,
		600,
		Arc::new(StopState::new()),
	));
	peers.add_connected(inbound);

	assert_eq!(peers.peer_count(), 2);
	assert_eq!(peers.rpc_peers(), vec![out_addr]);
}
