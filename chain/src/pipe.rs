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

//! Implementation of the chain block acceptance (or refusal) pipeline.

use std::collections::HashSet;

use crate::error::{Error, ErrorKind};
use crate::store::ChainStore;
use crate::types::{Options, Tip};
use umbra_core::core::hash::ZERO_HASH;
use umbra_core::core::{fold_txo_root, tx_merkle_root, Block};

/// The supported block version, anything else is either a mistake or
/// produced by newer, incompatible software.
const BLOCK_VERSION: u16 = 1;

/// Contextual information required to process a new block and either
/// reject or accept it.
pub struct BlockContext<'a> {
	/// The options
	pub opts: Options,
	/// The current chain head, none before the genesis block connects
	pub head: Option<Tip>,
	/// The active store
	pub store: &'a dyn ChainStore,
}

/// Runs the full acceptance pipeline on the provided block, without
/// mutating anything. Returns Ok if the block would extend the current
/// head, the error classification otherwise.
///
/// The checks are ordered so the cheap structural ones run first, and so
/// a block mis-hydrated from the mempool surfaces as `InvalidTxRoot`
/// before any rule that the colliding transaction could trip.
pub fn check_connect(b: &Block, ctx: &BlockContext<'_>) -> Result<(), Error> {
	validate_header(b)?;

	match ctx.head {
		None => {
			// empty chain, only a genesis block fits
			if b.header.height != 0 {
				return Err(ErrorKind::Orphan.into());
			}
			validate_genesis(b)
		}
		Some(ref head) => {
			if b.header.height == 0 {
				return Err(ErrorKind::InvalidBlockHeight.into());
			}
			classify_position(b, head, ctx)?;
			validate_body(b, head, ctx)
		}
	}
}

/// Applies the block: saves it and its side effects to the store and
/// advances the head. Callers are expected to have run `check_connect`
/// first.
pub fn connect(b: &Block, ctx: &BlockContext<'_>) -> Result<(), Error> {
	let prev_root = if b.header.height == 0 {
		ZERO_HASH
	} else {
		ctx.store.txo_root()?
	};

	let mut outputs = vec![];
	let mut nullifiers = vec![];
	for tx in &b.txs {
		outputs.extend_from_slice(tx.outputs());
		nullifiers.extend(tx.nullifiers());
	}

	ctx.store.save_block(b)?;
	ctx.store.save_nullifiers(&nullifiers)?;
	ctx.store.save_txo_root(&fold_txo_root(&prev_root, &outputs))?;
	ctx.store.save_head(&Tip::from_header(&b.header))?;

	Ok(())
}

// Cheap structural checks on the header alone, run before anything that
// needs chain context. A block failing these is not "plausible" and never
// classifies as an orphan.
fn validate_header(b: &Block) -> Result<(), Error> {
	if b.header.version != BLOCK_VERSION {
		return Err(ErrorKind::InvalidBlockVersion(b.header.version).into());
	}
	if b.header.producer_id.is_empty() || b.header.signature.is_empty() {
		return Err(ErrorKind::InvalidBlockSignature.into());
	}
	Ok(())
}

// Establish where the block falls relative to our current head: next in
// line (Ok), further out or parentless (Orphan) or on a losing fork
// (DoesNotConnect).
fn classify_position(b: &Block, head: &Tip, ctx: &BlockContext<'_>) -> Result<(), Error> {
	if b.header.prev_block == head.last_block_h && b.header.height == head.height + 1 {
		return Ok(());
	}
	if b.header.height > head.height + 1 {
		return Err(ErrorKind::Orphan.into());
	}
	if !ctx.store.block_exists(&b.header.prev_block)? {
		return Err(ErrorKind::Orphan.into());
	}
	// parent known but we've moved on, most likely a height race lost
	Err(ErrorKind::DoesNotConnect.into())
}

fn validate_body(b: &Block, head: &Tip, ctx: &BlockContext<'_>) -> Result<(), Error> {
	// tx root first: a mis-hydrated block must surface as InvalidTxRoot,
	// not as whatever rule the colliding transaction would trip
	if tx_merkle_root(&b.txs) != b.header.tx_root {
		return Err(ErrorKind::InvalidTxRoot.into());
	}

	if b.header.timestamp.timestamp() < head.timestamp {
		return Err(ErrorKind::InvalidBlockTime.into());
	}

	validate_coinbase(b)?;
	validate_nullifiers(b, ctx)?;

	Ok(())
}

fn validate_coinbase(b: &Block) -> Result<(), Error> {
	if b.txs.is_empty() || !b.txs[0].is_coinbase() {
		return Err(ErrorKind::InvalidCoinbase.into());
	}
	if b.txs.iter().skip(1).any(|tx| tx.is_coinbase()) {
		return Err(ErrorKind::InvalidCoinbase.into());
	}
	Ok(())
}

fn validate_nullifiers(b: &Block, ctx: &BlockContext<'_>) -> Result<(), Error> {
	let mut seen = HashSet::new();
	for tx in &b.txs {
		for n in tx.nullifiers() {
			if !seen.insert(n) {
				return Err(ErrorKind::DoubleSpend(n).into());
			}
			if ctx.store.nullifier_spent(&n)? {
				return Err(ErrorKind::DoubleSpend(n).into());
			}
		}
	}
	Ok(())
}

// The genesis block is special cased: no parent, and its stake
// transactions are allowed (required, even) to reference the txo root
// derived from the coinbase outputs of this very block.
fn validate_genesis(b: &Block) -> Result<(), Error> {
	if b.header.prev_block != ZERO_HASH {
		return Err(ErrorKind::InvalidGenesis.into());
	}
	if tx_merkle_root(&b.txs) != b.header.tx_root {
		return Err(ErrorKind::InvalidTxRoot.into());
	}
	validate_coinbase(b)?;

	let self_root = fold_txo_root(&ZERO_HASH, b.txs[0].outputs());
	for tx in &b.txs {
		if let umbra_core::core::Transaction::Stake(stake) = tx {
			if stake.txo_root != self_root {
				return Err(ErrorKind::InvalidGenesis.into());
			}
		}
	}

	// nullifiers must at least be distinct within the block
	let mut seen = HashSet::new();
	for tx in &b.txs {
		for n in tx.nullifiers() {
			if !seen.insert(n) {
				return Err(ErrorKind::DoubleSpend(n).into());
			}
		}
	}

	Ok(())
}
