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

//! Storage the chain pipeline requires. The persistent key-value datastore
//! is an external collaborator, everything it must provide is captured by
//! the `ChainStore` trait; `MemStore` is the bundled in-memory
//! implementation used for tests and ephemeral nodes.

use std::collections::{HashMap, HashSet};

use crate::error::{Error, ErrorKind};
use crate::types::Tip;
use umbra_core::core::hash::{Hash, Hashed, ZERO_HASH};
use umbra_core::core::{Block, Nullifier};
use umbra_util::RwLock;

/// Trait the chain pipeline requires an implementor for in order to process
/// and persist blocks.
pub trait ChainStore: Send + Sync {
	/// Get the tip that's also the head of the chain. NotFound until a
	/// genesis block has been saved.
	fn head(&self) -> Result<Tip, Error>;

	/// Save the provided tip as the current head of our chain
	fn save_head(&self, t: &Tip) -> Result<(), Error>;

	/// Gets a block by its hash, from the connected chain only
	fn get_block(&self, h: &Hash) -> Result<Block, Error>;

	/// Whether a block has been connected and saved
	fn block_exists(&self, h: &Hash) -> Result<bool, Error>;

	/// Hash of the connected block at the provided height
	fn get_hash_by_height(&self, height: u64) -> Result<Hash, Error>;

	/// Save the provided block in store, indexing it by height
	fn save_block(&self, b: &Block) -> Result<(), Error>;

	/// Whether the provided nullifier has already been spent on-chain
	fn nullifier_spent(&self, n: &Nullifier) -> Result<bool, Error>;

	/// Record the provided nullifiers as spent
	fn save_nullifiers(&self, ns: &[Nullifier]) -> Result<(), Error>;

	/// The current txo accumulator root
	fn txo_root(&self) -> Result<Hash, Error>;

	/// Save the txo accumulator root after appending a block's outputs
	fn save_txo_root(&self, root: &Hash) -> Result<(), Error>;
}

#[derive(Default)]
struct MemStoreInner {
	head: Option<Tip>,
	blocks: HashMap<Hash, Block>,
	height_idx: HashMap<u64, Hash>,
	nullifiers: HashSet<Nullifier>,
	txo_root: Option<Hash>,
}

/// In-memory chain store. Everything is gone on restart, which is exactly
/// what tests and throwaway regtest nodes want.
pub struct MemStore {
	inner: RwLock<MemStoreInner>,
}

impl MemStore {
	/// Creates a new, empty in-memory store.
	pub fn new() -> MemStore {
		MemStore {
			inner: RwLock::new(MemStoreInner::default()),
		}
	}
}

impl ChainStore for MemStore {
	fn head(&self) -> Result<Tip, Error> {
		self.inner
			.read()
			.head
			.clone()
			.ok_or_else(|| ErrorKind::NotFound.into())
	}

	fn save_head(&self, t: &Tip) -> Result<(), Error> {
		self.inner.write().head = Some(t.clone());
		Ok(())
	}

	fn get_block(&self, h: &Hash) -> Result<Block, Error> {
		self.inner
			.read()
			.blocks
			.get(h)
			.cloned()
			.ok_or_else(|| ErrorKind::NotFound.into())
	}

	fn block_exists(&self, h: &Hash) -> Result<bool, Error> {
		Ok(self.inner.read().blocks.contains_key(h))
	}

	fn get_hash_by_height(&self, height: u64) -> Result<Hash, Error> {
		self.inner
			.read()
			.height_idx
			.get(&height)
			.cloned()
			.ok_or_else(|| ErrorKind::NotFound.into())
	}

	fn save_block(&self, b: &Block) -> Result<(), Error> {
		let mut inner = self.inner.write();
		let hash = b.hash();
		inner.height_idx.insert(b.header.height, hash);
		inner.blocks.insert(hash, b.clone());
		Ok(())
	}

	fn nullifier_spent(&self, n: &Nullifier) -> Result<bool, Error> {
		Ok(self.inner.read().nullifiers.contains(n))
	}

	fn save_nullifiers(&self, ns: &[Nullifier]) -> Result<(), Error> {
		let mut inner = self.inner.write();
		for n in ns {
			inner.nullifiers.insert(*n);
		}
		Ok(())
	}

	fn txo_root(&self) -> Result<Hash, Error> {
		Ok(self.inner.read().txo_root.unwrap_or(ZERO_HASH))
	}

	fn save_txo_root(&self, root: &Hash) -> Result<(), Error> {
		self.inner.write().txo_root = Some(*root);
		Ok(())
	}
}
