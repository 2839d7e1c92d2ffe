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

//! End-to-end exercises of the chain-service request/response protocol
//! over a real socket pair.

use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::Arc;
use std::thread;

use umbra_core::core::hash::{Hash, Hashed};
use umbra_core::core::{Block, BlockHeader, StandardTransaction, Transaction};
use umbra_core::global;
use umbra_p2p::conn::{read_message, set_stream_timeouts, write_message};
use umbra_p2p::handshake;
use umbra_p2p::msg::{Request, RespErr, TxsResponse};
use umbra_p2p::protocol::Protocol;
use umbra_p2p::types::{BlockFetcher, Direction, Error, PeerInfo};
use umbra_p2p::Peer;
use umbra_util::{self as util, StopState};

fn stream_pair() -> (TcpStream, TcpStream, SocketAddr) {
	let listener = TcpListener::bind("127.0.0.1:0").unwrap();
	let addr = listener.local_addr().unwrap();
	let handle = thread::spawn(move || listener.accept().unwrap().0);
	let client = TcpStream::connect(addr).unwrap();
	let server = handle.join().unwrap();
	set_stream_timeouts(&client).unwrap();
	set_stream_timeouts(&server).unwrap();
	(client, server, addr)
}

fn sample_block() -> Block {
	let txs = (1..=5u64)
		.map(|i| {
			Transaction::Standard(StandardTransaction {
				fee: i,
				..Default::default()
			})
		})
		.collect::<Vec<_>>();
	let mut header = BlockHeader::default();
	header.height = 3;
	Block::with_txs(header, txs)
}

struct SingleBlockFetcher {
	block: Block,
}

impl BlockFetcher for SingleBlockFetcher {
	fn fetch_block(&self, h: &Hash) -> Option<Block> {
		if *h == self.block.hash() {
			Some(self.block.clone())
		} else {
			None
		}
	}
}

// Serve one stream with the protocol handler on a background thread and
// hand back the querying peer.
fn serve_and_peer(block: Block) -> (Peer, Arc<StopState>, thread::JoinHandle<()>) {
	let stop = Arc::new(StopState::new());
	let (client, mut server, addr) = stream_pair();

	let stop_inner = stop.clone();
	let server_thread = thread::spawn(move || {
		let protocol = Protocol::new(
			Arc::new(SingleBlockFetcher { block }),
			stop_inner,
		);
		let peer_addr = server.peer_addr().unwrap();
		let _ = protocol.handle(&mut server, peer_addr);
	});

	let info = PeerInfo {
		version: 1,
		addr,
		direction: Direction::Outbound,
	};
	let peer = Peer::new(info, client, 600, stop.clone());
	(peer, stop, server_thread)
}

#[test]
fn handshake_agrees_on_network() {
	util::init_test_logger();
	global::set_chain_type(global::ChainTypes::AutomatedTesting);
	let stop = Arc::new(StopState::new());
	let (mut client, mut server, _) = stream_pair();

	let genesis = Hash::from_vec(&[3u8; 32]);
	let stop_inner = stop.clone();
	let acceptor =
		thread::spawn(move || handshake::respond(&mut server, genesis, &stop_inner));

	let version = handshake::initiate(&mut client, genesis, &stop).unwrap();
	assert_eq!(version, global::PROTOCOL_VERSION);
	acceptor.join().unwrap().unwrap();
}

#[test]
fn handshake_rejects_wrong_genesis() {
	util::init_test_logger();
	global::set_chain_type(global::ChainTypes::AutomatedTesting);
	let stop = Arc::new(StopState::new());
	let (mut client, mut server, _) = stream_pair();

	let stop_inner = stop.clone();
	let acceptor = thread::spawn(move || {
		handshake::respond(&mut server, Hash::from_vec(&[1u8; 32]), &stop_inner)
	});

	// dialing with another chain's genesis; the acceptor refuses
	let _ = handshake::initiate(&mut client, Hash::from_vec(&[2u8; 32]), &stop);
	match acceptor.join().unwrap() {
		Err(Error::GenesisMismatch { .. }) => {}
		other => panic!("expected GenesisMismatch, got {:?}", other),
	}
}

#[test]
fn get_block_roundtrip() {
	util::init_test_logger();
	let block = sample_block();
	let bhash = block.hash();
	let (peer, stop, server_thread) = serve_and_peer(block.clone());

	let fetched = peer.get_block(bhash).unwrap();
	assert_eq!(fetched.hash(), bhash);
	assert_eq!(fetched.txs.len(), block.txs.len());

	// unknown block id comes back NotFound, the stream stays usable
	let unknown = Hash::from_vec(&[0xfe; 32]);
	match peer.get_block(unknown) {
		Err(Error::NotFound) => {}
		other => panic!("expected NotFound, got {:?}", other),
	}
	let again = peer.get_block(bhash).unwrap();
	assert_eq!(again.hash(), bhash);

	stop.stop();
	server_thread.join().unwrap();
}

#[test]
fn get_block_txids_preserves_order() {
	util::init_test_logger();
	let block = sample_block();
	let bhash = block.hash();
	let expected = block.tx_ids();
	let (peer, stop, server_thread) = serve_and_peer(block);

	let txids = peer.get_block_txids(bhash).unwrap();
	assert_eq!(txids, expected);

	stop.stop();
	server_thread.join().unwrap();
}

#[test]
fn get_block_txs_preserves_positions() {
	util::init_test_logger();
	let block = sample_block();
	let bhash = block.hash();
	let (peer, stop, server_thread) = serve_and_peer(block.clone());

	// out of order on purpose, the response must align position by
	// position with the request
	let indices = vec![4u32, 0, 2];
	let txs = peer.get_block_txs(bhash, &indices).unwrap();
	assert_eq!(txs.len(), indices.len());
	for (i, idx) in indices.iter().enumerate() {
		assert_eq!(txs[i].id(), block.txs[*idx as usize].id());
	}

	// an out of range index poisons the whole request
	match peer.get_block_txs(bhash, &[0, 99]) {
		Err(Error::BadRequest) => {}
		other => panic!("expected BadRequest, got {:?}", other),
	}

	stop.stop();
	server_thread.join().unwrap();
}

#[test]
fn short_txs_response_is_a_bad_response() {
	util::init_test_logger();
	let stop = Arc::new(StopState::new());
	let (client, mut server, addr) = stream_pair();

	// a misbehaving server: reads the request and answers success with
	// fewer transactions than asked for
	let stop_inner = stop.clone();
	let server_thread = thread::spawn(move || {
		let _req: Request = read_message(&mut server, &stop_inner).unwrap();
		let resp = TxsResponse {
			err: RespErr::None,
			txs: vec![Transaction::default()],
		};
		write_message(&mut server, &resp).unwrap();
	});

	let info = PeerInfo {
		version: 1,
		addr,
		direction: Direction::Outbound,
	};
	let peer = Peer::new(info, client, 600, stop.clone());

	match peer.get_block_txs(Hash::from_vec(&[1u8; 32]), &[0, 1, 2]) {
		Err(Error::BadResponse(_)) => {}
		other => panic!("expected BadResponse, got {:?}", other),
	}
	server_thread.join().unwrap();
}

#[test]
fn wrong_block_in_response_is_a_bad_response() {
	util::init_test_logger();
	let stop = Arc::new(StopState::new());
	let (client, mut server, addr) = stream_pair();

	// a misbehaving server: answers the request with a success response
	// carrying a block under a different id than the one asked for
	let stop_inner = stop.clone();
	let bogus = sample_block();
	let server_thread = thread::spawn(move || {
		let _req: Request = read_message(&mut server, &stop_inner).unwrap();
		let resp = umbra_p2p::msg::BlockResponse {
			err: RespErr::None,
			block: Some(bogus),
		};
		write_message(&mut server, &resp).unwrap();
	});

	let info = PeerInfo {
		version: 1,
		addr,
		direction: Direction::Outbound,
	};
	let peer = Peer::new(info, client, 600, stop.clone());
	match peer.get_block(Hash::from_vec(&[0x0f; 32])) {
		Err(Error::BadResponse(_)) => {}
		other => panic!("expected BadResponse, got {:?}", other),
	}
	server_thread.join().unwrap();
}
