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

//! Blocks and block headers

use chrono::naive::{MAX_DATE, MIN_DATE};
use chrono::prelude::{DateTime, NaiveDateTime, Utc};

use crate::core::hash::{hash_together, DefaultHashable, Hash, Hashed, ZERO_HASH};
use crate::core::transaction::Transaction;
use crate::core::xthinner::XThinnerBlock;
use crate::ser::{self, read_multi, Readable, Reader, Writeable, Writer};

/// Block header, carries the commitments to the block contents. Its hash
/// over the canonical serialization is the block id.
#[derive(Clone, Debug, PartialEq)]
pub struct BlockHeader {
	/// Version of the block
	pub version: u16,
	/// Height of this block since the genesis block (height 0)
	pub height: u64,
	/// Hash of the block previous to this in the chain
	pub prev_block: Hash,
	/// Timestamp at which the block was built
	pub timestamp: DateTime<Utc>,
	/// Merkle root of the ids of all transactions in the block
	pub tx_root: Hash,
	/// Serialized public identity of the producing validator
	pub producer_id: Vec<u8>,
	/// Signature by the producer over the rest of the header
	pub signature: Vec<u8>,
}

impl Default for BlockHeader {
	fn default() -> BlockHeader {
		BlockHeader {
			version: 1,
			height: 0,
			prev_block: ZERO_HASH,
			timestamp: DateTime::<Utc>::from_utc(NaiveDateTime::from_timestamp(0, 0), Utc),
			tx_root: ZERO_HASH,
			producer_id: vec![],
			signature: vec![],
		}
	}
}

impl DefaultHashable for BlockHeader {}

impl Writeable for BlockHeader {
	fn write<W: Writer>(&self, writer: &mut W) -> Result<(), ser::Error> {
		ser_multiwrite!(
			writer,
			[write_u16, self.version],
			[write_u64, self.height]
		);
		self.prev_block.write(writer)?;
		writer.write_i64(self.timestamp.timestamp())?;
		self.tx_root.write(writer)?;
		writer.write_bytes(&self.producer_id)?;
		writer.write_bytes(&self.signature)?;
		Ok(())
	}
}

impl Readable for BlockHeader {
	fn read<R: Reader>(reader: &mut R) -> Result<BlockHeader, ser::Error> {
		let (version, height) = ser_multiread!(reader, read_u16, read_u64);
		let prev_block = Hash::read(reader)?;
		let timestamp = reader.read_i64()?;
		let tx_root = Hash::read(reader)?;
		let producer_id = reader.read_bytes_len_prefix()?;
		let signature = reader.read_bytes_len_prefix()?;

		if timestamp > MAX_DATE.and_hms(0, 0, 0).timestamp()
			|| timestamp < MIN_DATE.and_hms(0, 0, 0).timestamp()
		{
			return Err(ser::Error::CorruptedData);
		}

		Ok(BlockHeader {
			version,
			height,
			prev_block,
			timestamp: DateTime::<Utc>::from_utc(NaiveDateTime::from_timestamp(timestamp, 0), Utc),
			tx_root,
			producer_id,
			signature,
		})
	}
}

impl BlockHeader {
	/// The block id, a hash over the canonical header serialization.
	pub fn hash(&self) -> Hash {
		Hashed::hash(self)
	}
}

/// A full block: a header plus the ordered sequence of transactions it
/// commits to.
#[derive(Clone, Debug, PartialEq)]
pub struct Block {
	/// The header with metadata and commitments to the rest of the data
	pub header: BlockHeader,
	/// Transactions, in the order the tx_root commits to
	pub txs: Vec<Transaction>,
}

impl Default for Block {
	fn default() -> Block {
		Block {
			header: BlockHeader::default(),
			txs: vec![],
		}
	}
}

impl Hashed for Block {
	/// The hash of a block is the hash of its header, the body is committed
	/// to via the tx_root.
	fn hash(&self) -> Hash {
		self.header.hash()
	}
}

impl Writeable for Block {
	fn write<W: Writer>(&self, writer: &mut W) -> Result<(), ser::Error> {
		self.header.write(writer)?;
		writer.write_u64(self.txs.len() as u64)?;
		for tx in &self.txs {
			tx.write(writer)?;
		}
		Ok(())
	}
}

impl Readable for Block {
	fn read<R: Reader>(reader: &mut R) -> Result<Block, ser::Error> {
		let header = BlockHeader::read(reader)?;
		let tx_len = reader.read_u64()?;
		let txs = read_multi(reader, tx_len)?;
		Ok(Block { header, txs })
	}
}

impl Block {
	/// Builds a block from a header and a set of transactions, recomputing
	/// the header tx_root to commit to them.
	pub fn with_txs(mut header: BlockHeader, txs: Vec<Transaction>) -> Block {
		header.tx_root = tx_merkle_root(&txs);
		Block { header, txs }
	}

	/// Rebuild a full block from a compact announcement plus the
	/// transactions recovered from the local pool, position aligned with
	/// the announcement fingerprints. Missing slots are filled with
	/// placeholder transactions; the caller is expected to repair every
	/// missing slot before the block can pass validation.
	pub fn hydrate_from(cb: XThinnerBlock, slots: Vec<Option<Transaction>>) -> Block {
		let txs = slots
			.into_iter()
			.map(|slot| slot.unwrap_or_default())
			.collect();
		Block {
			header: cb.header,
			txs,
		}
	}

	/// Ordered transaction ids for every transaction in the block.
	pub fn tx_ids(&self) -> Vec<Hash> {
		self.txs.iter().map(|tx| tx.id()).collect()
	}

	/// Height of this block.
	pub fn height(&self) -> u64 {
		self.header.height
	}
}

/// Merkle root over the ids of the provided transactions.
pub fn tx_merkle_root(txs: &[Transaction]) -> Hash {
	let ids = txs.iter().map(|tx| tx.id()).collect::<Vec<_>>();
	merkle_root(&ids)
}

/// Merkle root over a list of transaction ids. An odd node at any level
/// is paired with itself. An empty list yields the zero hash.
pub fn merkle_root(ids: &[Hash]) -> Hash {
	let mut layer = ids.to_vec();
	if layer.is_empty() {
		return ZERO_HASH;
	}
	while layer.len() > 1 {
		let mut next = Vec::with_capacity((layer.len() + 1) / 2);
		for pair in layer.chunks(2) {
			let right = if pair.len() == 2 { &pair[1] } else { &pair[0] };
			next.push(hash_together(&pair[0], right));
		}
		layer = next;
	}
	layer[0]
}

#[cfg(test)]
mod test {
	use super::*;
	use crate::core::transaction::{CoinbaseTransaction, StandardTransaction};
	use crate::ser;

	fn block_with(n: u64) -> Block {
		let txs = (0..n)
			.map(|i| {
				Transaction::Standard(StandardTransaction {
					fee: i,
					..Default::default()
				})
			})
			.collect::<Vec<_>>();
		Block::with_txs(BlockHeader::default(), txs)
	}

	#[test]
	fn block_ser_roundtrip() {
		let mut b = block_with(3);
		b.txs
			.insert(0, Transaction::Coinbase(CoinbaseTransaction::default()));
		b.header.tx_root = tx_merkle_root(&b.txs);
		let bytes = ser::ser_vec(&b).unwrap();
		let b2: Block = ser::deserialize(&mut &bytes[..]).unwrap();
		assert_eq!(b, b2);
		assert_eq!(b.hash(), b2.hash());
	}

	#[test]
	fn block_id_ignores_body() {
		// the id is the header hash, swapping the body alone leaves it alone
		let b = block_with(2);
		let mut b2 = b.clone();
		b2.txs.clear();
		assert_eq!(b.hash(), b2.hash());
		// but the root no longer matches the body
		assert_ne!(tx_merkle_root(&b2.txs), b2.header.tx_root);
	}

	#[test]
	fn merkle_root_changes_with_order() {
		let b = block_with(4);
		let mut txs = b.txs.clone();
		txs.swap(0, 1);
		assert_ne!(tx_merkle_root(&b.txs), tx_merkle_root(&txs));
	}

	#[test]
	fn merkle_root_odd_count() {
		let b = block_with(5);
		assert_ne!(b.header.tx_root, ZERO_HASH);
	}
}
