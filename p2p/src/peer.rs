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

//! A single connected peer: the stream we can query it over and the ban
//! score we maintain on it. All chain-service calls are synchronous from
//! the caller's perspective; the per-peer stream mutex serializes them so
//! a stream only ever carries one request/response exchange at a time.

use std::net::{Shutdown, SocketAddr, TcpStream};
use std::sync::Arc;
use std::time::Instant;

use crate::conn::{read_message, write_message};
use crate::msg::{BlockResponse, Request, RespErr, TxidsResponse, TxsResponse};
use crate::types::{Direction, Error, PeerInfo};
use umbra_core::core::hash::{Hash, Hashed};
use umbra_core::core::{Block, Transaction};
use umbra_util::{Mutex, RwLock, StopState};

// Per-peer ban score. The behavioral part is permanent, the transient
// part halves every decay interval.
struct Score {
	behavioral: u32,
	transient: u32,
	last_decay: Instant,
}

/// A connected peer and everything we track about it.
pub struct Peer {
	/// Static information about the peer
	pub info: PeerInfo,
	conn: Mutex<TcpStream>,
	// second handle on the socket so a ban can reset the connection even
	// while a call holds the conn mutex waiting on a response
	shutdown_handle: Option<TcpStream>,
	score: RwLock<Score>,
	score_decay_secs: u64,
	stop_state: Arc<StopState>,
}

impl Peer {
	/// Wraps an established, handshaken connection.
	pub fn new(
		info: PeerInfo,
		conn: TcpStream,
		score_decay_secs: u64,
		stop_state: Arc<StopState>,
	) -> Peer {
		let shutdown_handle = conn.try_clone().ok();
		Peer {
			info,
			conn: Mutex::new(conn),
			shutdown_handle,
			score: RwLock::new(Score {
				behavioral: 0,
				transient: 0,
				last_decay: Instant::now(),
			}),
			score_decay_secs,
			stop_state,
		}
	}

	/// Whether we opened this connection, and may therefore query it.
	pub fn is_outbound(&self) -> bool {
		self.info.direction == Direction::Outbound
	}

	/// Fetch a full block from this peer. Verifies the returned block
	/// actually carries the requested id.
	pub fn get_block(&self, h: Hash) -> Result<Block, Error> {
		let mut conn = self.conn.lock();
		write_message(&mut conn, &Request::GetBlock(h))?;
		let resp: BlockResponse = read_message(&mut conn, &self.stop_state)?;
		match (resp.err, resp.block) {
			(RespErr::None, Some(block)) => {
				if block.hash() != h {
					return Err(Error::BadResponse(format!(
						"asked for block {}, got {}",
						h,
						block.hash()
					)));
				}
				Ok(block)
			}
			(RespErr::None, None) => Err(Error::BadResponse("empty success response".into())),
			(RespErr::NotFound, _) => Err(Error::NotFound),
			(RespErr::BadRequest, _) => Err(Error::BadRequest),
		}
	}

	/// Fetch the ordered transaction ids of a block from this peer.
	pub fn get_block_txids(&self, h: Hash) -> Result<Vec<Hash>, Error> {
		let mut conn = self.conn.lock();
		write_message(&mut conn, &Request::GetBlockTxids(h))?;
		let resp: TxidsResponse = read_message(&mut conn, &self.stop_state)?;
		match resp.err {
			RespErr::None => Ok(resp.txids),
			RespErr::NotFound => Err(Error::NotFound),
			RespErr::BadRequest => Err(Error::BadRequest),
		}
	}

	/// Fetch the transactions at the given block positions from this
	/// peer. Reconciles the response length against the request, a
	/// mismatch is a protocol violation by the peer.
	pub fn get_block_txs(&self, h: Hash, indices: &[u32]) -> Result<Vec<Transaction>, Error> {
		let mut conn = self.conn.lock();
		write_message(&mut conn, &Request::GetBlockTxs(h, indices.to_vec()))?;
		let resp: TxsResponse = read_message(&mut conn, &self.stop_state)?;
		match resp.err {
			RespErr::None => {
				if resp.txs.len() != indices.len() {
					return Err(Error::BadResponse(format!(
						"asked for {} txs, got {}",
						indices.len(),
						resp.txs.len()
					)));
				}
				Ok(resp.txs)
			}
			RespErr::NotFound => Err(Error::NotFound),
			RespErr::BadRequest => Err(Error::BadRequest),
		}
	}

	/// Apply a ban score delta, returning the combined score after decay.
	pub fn increase_ban_score(&self, behavioral: u32, transient: u32) -> u32 {
		let mut score = self.score.write();
		decay(&mut score, self.score_decay_secs);
		score.behavioral = score.behavioral.saturating_add(behavioral);
		score.transient = score.transient.saturating_add(transient);
		let total = score.behavioral + score.transient;
		if behavioral > 0 || transient > 0 {
			debug!(
				"peer {}: ban score +{}/+{} -> {}",
				self.info.addr, behavioral, transient, total
			);
		}
		total
	}

	/// The combined ban score after decay.
	pub fn ban_score(&self) -> u32 {
		let mut score = self.score.write();
		decay(&mut score, self.score_decay_secs);
		score.behavioral + score.transient
	}

	/// Address of the remote end.
	pub fn addr(&self) -> SocketAddr {
		self.info.addr
	}

	/// Shut the connection down, aborting any pending exchange.
	pub fn stop(&self) {
		if let Some(ref handle) = self.shutdown_handle {
			if let Err(e) = handle.shutdown(Shutdown::Both) {
				debug!(
					"error shutting down connection to {}: {:?}",
					self.info.addr, e
				);
			}
		}
	}
}

// Halve the transient score once per elapsed decay interval.
fn decay(score: &mut Score, decay_secs: u64) {
	if decay_secs == 0 {
		return;
	}
	let elapsed = score.last_decay.elapsed().as_secs();
	let periods = elapsed / decay_secs;
	if periods > 0 {
		score.transient >>= periods.min(32) as u32;
		score.last_decay = Instant::now();
	}
}
