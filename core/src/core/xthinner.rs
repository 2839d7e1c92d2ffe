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

//! XThinner compact blocks.
//!
//! A compact announcement carries the full header, the transactions no
//! mempool can be expected to hold (the coinbase), and one lossy
//! fingerprint per remaining transaction, in block order. A node is
//! reasonably likely to have already seen the transactions (txs broadcast
//! before the block) and can recover them from its mempool, requesting
//! the leftovers from peers when necessary.

use rand::{thread_rng, Rng};

use crate::core::block::{Block, BlockHeader};
use crate::core::hash::{Hash, Hashed};
use crate::core::id::{ShortId, ShortIdentifiable};
use crate::core::transaction::Transaction;
use crate::ser::{self, read_multi, Readable, Reader, Writeable, Writer};

/// Compact representation of a full block. Coinbase transactions ride
/// along in full, every other transaction is represented by a short
/// fingerprint keyed to the (block id, nonce) pair.
#[derive(Debug, Clone)]
pub struct XThinnerBlock {
	/// The header with metadata and commitments to the rest of the data
	pub header: BlockHeader,
	/// Nonce the fingerprints are keyed with, specific to this announcement
	pub nonce: u64,
	/// Transactions included in full, specifically the coinbase(s); they
	/// occupy the leading positions of the block
	pub txs_full: Vec<Transaction>,
	/// Fingerprints of the remaining transactions, in block order
	pub tx_ids: Vec<ShortId>,
}

impl Hashed for XThinnerBlock {
	/// The id of a compact block equals the id of the full block it
	/// encodes.
	fn hash(&self) -> Hash {
		self.header.hash()
	}
}

impl XThinnerBlock {
	/// Number of transactions in the encoded block, prefilled included.
	pub fn len(&self) -> usize {
		self.txs_full.len() + self.tx_ids.len()
	}

	/// Whether the encoded block carries no transactions at all.
	pub fn is_empty(&self) -> bool {
		self.txs_full.is_empty() && self.tx_ids.is_empty()
	}
}

impl From<Block> for XThinnerBlock {
	fn from(block: Block) -> Self {
		let header = block.header.clone();
		let nonce = thread_rng().gen();
		let block_hash = header.hash();

		// coinbase leads the block and is never in anyone's mempool, so
		// it is carried in full
		let txs_full = block
			.txs
			.iter()
			.filter(|tx| tx.is_coinbase())
			.cloned()
			.collect();
		let tx_ids = block
			.txs
			.iter()
			.filter(|tx| !tx.is_coinbase())
			.map(|tx| tx.short_id(&block_hash, nonce))
			.collect();

		XThinnerBlock {
			header,
			nonce,
			txs_full,
			tx_ids,
		}
	}
}

impl Writeable for XThinnerBlock {
	fn write<W: Writer>(&self, writer: &mut W) -> Result<(), ser::Error> {
		self.header.write(writer)?;
		ser_multiwrite!(
			writer,
			[write_u64, self.nonce],
			[write_u64, self.txs_full.len() as u64],
			[write_u64, self.tx_ids.len() as u64]
		);
		for tx in &self.txs_full {
			tx.write(writer)?;
		}
		for id in &self.tx_ids {
			id.write(writer)?;
		}
		Ok(())
	}
}

impl Readable for XThinnerBlock {
	fn read<R: Reader>(reader: &mut R) -> Result<XThinnerBlock, ser::Error> {
		let header = BlockHeader::read(reader)?;
		let (nonce, full_len, id_len) = ser_multiread!(reader, read_u64, read_u64, read_u64);
		let txs_full = read_multi(reader, full_len)?;
		let tx_ids = read_multi(reader, id_len)?;
		Ok(XThinnerBlock {
			header,
			nonce,
			txs_full,
			tx_ids,
		})
	}
}
