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

//! The narrow contract between the node and its avalanche-style consensus
//! engine. The engine itself, with its repeated sampling of the validator
//! set, is an external collaborator; the node only proposes blocks and
//! waits for a verdict, while the engine can ask the node to fetch a block
//! it has heard a preference for but never received.

#![deny(non_upper_case_globals)]
#![deny(non_camel_case_types)]
#![deny(non_snake_case)]
#![deny(unused_mut)]
#![warn(missing_docs)]

#[macro_use]
extern crate log;

use std::net::SocketAddr;
use std::sync::mpsc::SyncSender;
use std::sync::Arc;

use umbra_core::core::hash::Hash;

/// Verdict the engine eventually reaches for every proposed block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
	/// The network converged on the block, connect it.
	Finalized,
	/// The network converged against the block, discard it.
	Rejected,
}

/// Callback the engine invokes when it hears a preference for a block the
/// node never received. The node fetches the block from the given peer and
/// runs it through the regular ingest pipeline.
pub type RequestBlock = Arc<dyn Fn(Hash, SocketAddr) + Send + Sync>;

/// The operations the node invokes on the consensus engine.
pub trait Consensus: Send + Sync {
	/// Propose a new block to the engine. Non-blocking: the engine will
	/// eventually emit exactly one `Status` on the callback channel, or
	/// nothing at all if the node shuts down first. The callback channel
	/// is allocated with a capacity of one so delivering the verdict never
	/// blocks the engine.
	fn new_block(&self, block_id: Hash, initial_preference: bool, callback: SyncSender<Status>);
}

/// A trivial engine that finalizes every proposed block on the spot. Used
/// for regtest and single-node setups where no validator set exists, and
/// as the default engine in tests exercising the happy path.
pub struct SoloEngine;

impl Consensus for SoloEngine {
	fn new_block(&self, block_id: Hash, _initial_preference: bool, callback: SyncSender<Status>) {
		debug!("solo consensus: finalizing {}", block_id);
		// the channel has capacity for the single verdict, and the waiter
		// may already be gone on shutdown
		let _ = callback.try_send(Status::Finalized);
	}
}

#[cfg(test)]
mod test {
	use super::*;
	use std::sync::mpsc::sync_channel;

	#[test]
	fn solo_finalizes_immediately() {
		let engine = SoloEngine;
		let (tx, rx) = sync_channel(1);
		engine.new_block(Hash::from_vec(&[1u8; 32]), true, tx);
		assert_eq!(rx.recv().unwrap(), Status::Finalized);
	}
}
