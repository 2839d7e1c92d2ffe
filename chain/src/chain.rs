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

//! Facade and handler for the rest of the blockchain implementation and
//! mostly the chain pipeline.

use std::sync::Arc;

use crate::error::{Error, ErrorKind};
use crate::pipe::{self, BlockContext};
use crate::store::ChainStore;
use crate::types::{ChainAdapter, Options, Tip};
use umbra_core::core::hash::{Hash, Hashed};
use umbra_core::core::Block;
use umbra_util::Mutex;

/// Facade to the blockchain block processing pipeline and storage. Lookups
/// are lock free against the store; mutations (connecting a block) are
/// serialized by a single mutex so the head moves one block at a time.
pub struct Chain {
	store: Arc<dyn ChainStore>,
	adapter: Arc<dyn ChainAdapter + Send + Sync>,
	connect_lock: Mutex<()>,
	genesis: Hash,
}

impl Chain {
	/// Initializes the blockchain and returns a new Chain instance. Does a
	/// check on the current chain head to make sure it exists and creates
	/// one based on the genesis block if necessary.
	pub fn init(
		genesis: Block,
		store: Arc<dyn ChainStore>,
		adapter: Arc<dyn ChainAdapter + Send + Sync>,
	) -> Result<Chain, Error> {
		let genesis_hash = genesis.hash();
		let chain = Chain {
			store,
			adapter,
			connect_lock: Mutex::new(()),
			genesis: genesis_hash,
		};

		match chain.store.head() {
			Ok(head) => {
				info!(
					"chain init: head {} at {}",
					head.last_block_h, head.height
				);
			}
			Err(ref e) if e.kind() == ErrorKind::NotFound => {
				chain.connect_block(&genesis, Options::GENESIS)?;
				info!("chain init: saved genesis block {}", genesis_hash);
			}
			Err(e) => return Err(e),
		}

		Ok(chain)
	}

	/// The tip of the chain: latest block id, height and timestamp.
	pub fn head(&self) -> Result<Tip, Error> {
		self.store.head()
	}

	/// Hash of the genesis block this chain was initialized with.
	pub fn genesis(&self) -> Hash {
		self.genesis
	}

	/// Runs the acceptance pipeline on the provided block against the
	/// current tip. Purely functional, nothing is mutated no matter the
	/// outcome.
	pub fn check_connect_block(&self, b: &Block) -> Result<(), Error> {
		let head = match self.store.head() {
			Ok(head) => Some(head),
			Err(ref e) if e.kind() == ErrorKind::NotFound => None,
			Err(e) => return Err(e),
		};
		let ctx = BlockContext {
			opts: Options::NONE,
			head,
			store: self.store.as_ref(),
		};
		pipe::check_connect(b, &ctx)
	}

	/// Applies the block to the chain and commits it to the datastore, the
	/// only durable effect of the ingest pipeline. Idempotent for already
	/// connected blocks.
	pub fn connect_block(&self, b: &Block, opts: Options) -> Result<(), Error> {
		let _lock = self.connect_lock.lock();

		let bhash = b.hash();
		if self.store.block_exists(&bhash)? {
			debug!("connect_block: {} already connected, skipping", bhash);
			return Ok(());
		}

		let head = match self.store.head() {
			Ok(head) => Some(head),
			Err(ref e) if e.kind() == ErrorKind::NotFound => None,
			Err(e) => return Err(e),
		};
		let ctx = BlockContext {
			opts,
			head,
			store: self.store.as_ref(),
		};

		// the tip may have moved since the block was checked, re-run the
		// pipeline under the connect lock before committing anything
		pipe::check_connect(b, &ctx)?;
		pipe::connect(b, &ctx)?;

		self.adapter.block_accepted(b, opts);

		debug!(
			"connect_block: connected {} at {} ({} txs)",
			bhash,
			b.header.height,
			b.txs.len()
		);
		Ok(())
	}

	/// Gets a block by its id from the connected chain only.
	pub fn get_block(&self, h: &Hash) -> Result<Block, Error> {
		self.store.get_block(h)
	}

	/// Whether the block is part of the connected chain.
	pub fn block_exists(&self, h: &Hash) -> Result<bool, Error> {
		self.store.block_exists(h)
	}

	/// Id of the connected block at the given height, if any.
	pub fn get_hash_by_height(&self, height: u64) -> Result<Hash, Error> {
		self.store.get_hash_by_height(height)
	}
}
