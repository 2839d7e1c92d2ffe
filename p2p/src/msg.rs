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

//! Chain-service messages and their serialization. Every frame on the
//! stream is a varint length prefix followed by one serialized message.
//! The request union tags and the response error enum are the stable wire
//! contract, changing any of them is a protocol break.

use umbra_core::core::hash::Hash;
use umbra_core::core::{Block, Transaction};
use umbra_core::ser::{self, read_multi, Readable, Reader, Writeable, Writer};

/// Maximum size of any single frame on the wire.
pub const MAX_MSG_LEN: u64 = 1 << 23;

/// A chain-service request, sent by the dialing side of a stream.
#[derive(Debug, Clone, PartialEq)]
pub enum Request {
	/// The full block under this id
	GetBlock(Hash),
	/// The ordered transaction ids of the block under this id
	GetBlockTxids(Hash),
	/// The transactions at these positions of the block under this id
	GetBlockTxs(Hash, Vec<u32>),
}

impl Writeable for Request {
	fn write<W: Writer>(&self, writer: &mut W) -> Result<(), ser::Error> {
		match self {
			Request::GetBlock(h) => {
				writer.write_u8(0)?;
				h.write(writer)?;
			}
			Request::GetBlockTxids(h) => {
				writer.write_u8(1)?;
				h.write(writer)?;
			}
			Request::GetBlockTxs(h, indices) => {
				writer.write_u8(2)?;
				h.write(writer)?;
				writer.write_u64(indices.len() as u64)?;
				for idx in indices {
					writer.write_u32(*idx)?;
				}
			}
		}
		Ok(())
	}
}

impl Readable for Request {
	fn read<R: Reader>(reader: &mut R) -> Result<Request, ser::Error> {
		let req = match reader.read_u8()? {
			0 => Request::GetBlock(Hash::read(reader)?),
			1 => Request::GetBlockTxids(Hash::read(reader)?),
			2 => {
				let h = Hash::read(reader)?;
				let idx_len = reader.read_u64()?;
				let indices = read_multi(reader, idx_len)?;
				Request::GetBlockTxs(h, indices)
			}
			_ => return Err(ser::Error::CorruptedData),
		};
		Ok(req)
	}
}

/// Error enum carried by every chain-service response. The numeric values
/// are part of the wire contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RespErr {
	/// Success
	None = 0,
	/// The server does not have this block, neither in its active
	/// inventory nor in its connected chain
	NotFound = 1,
	/// An index in a GetBlockTxs request was out of range
	BadRequest = 2,
}

impl Writeable for RespErr {
	fn write<W: Writer>(&self, writer: &mut W) -> Result<(), ser::Error> {
		writer.write_u8(*self as u8)
	}
}

impl Readable for RespErr {
	fn read<R: Reader>(reader: &mut R) -> Result<RespErr, ser::Error> {
		match reader.read_u8()? {
			0 => Ok(RespErr::None),
			1 => Ok(RespErr::NotFound),
			2 => Ok(RespErr::BadRequest),
			_ => Err(ser::Error::CorruptedData),
		}
	}
}

/// Response to a GetBlock request.
#[derive(Debug, Clone)]
pub struct BlockResponse {
	/// Outcome of the request
	pub err: RespErr,
	/// The block, present on success only
	pub block: Option<Block>,
}

impl Writeable for BlockResponse {
	fn write<W: Writer>(&self, writer: &mut W) -> Result<(), ser::Error> {
		self.err.write(writer)?;
		match (self.err, &self.block) {
			(RespErr::None, Some(b)) => b.write(writer),
			(RespErr::None, None) => Err(ser::Error::CorruptedData),
			(_, _) => Ok(()),
		}
	}
}

impl Readable for BlockResponse {
	fn read<R: Reader>(reader: &mut R) -> Result<BlockResponse, ser::Error> {
		let err = RespErr::read(reader)?;
		let block = match err {
			RespErr::None => Some(Block::read(reader)?),
			_ => None,
		};
		Ok(BlockResponse { err, block })
	}
}

/// Response to a GetBlockTxids request. The ids come in the same order as
/// the transactions of the block.
#[derive(Debug, Clone)]
pub struct TxidsResponse {
	/// Outcome of the request
	pub err: RespErr,
	/// Ordered transaction ids, empty unless successful
	pub txids: Vec<Hash>,
}

impl Writeable for TxidsResponse {
	fn write<W: Writer>(&self, writer: &mut W) -> Result<(), ser::Error> {
		self.err.write(writer)?;
		writer.write_u64(self.txids.len() as u64)?;
		for txid in &self.txids {
			txid.write(writer)?;
		}
		Ok(())
	}
}

impl Readable for TxidsResponse {
	fn read<R: Reader>(reader: &mut R) -> Result<TxidsResponse, ser::Error> {
		let err = RespErr::read(reader)?;
		let id_len = reader.read_u64()?;
		let txids = read_multi(reader, id_len)?;
		Ok(TxidsResponse { err, txids })
	}
}

/// Response to a GetBlockTxs request. Positions are preserved: on success
/// the transactions vector has exactly the length of the requested index
/// vector, absent entries are never silently dropped.
#[derive(Debug, Clone)]
pub struct TxsResponse {
	/// Outcome of the request
	pub err: RespErr,
	/// Transactions at the requested positions, empty unless successful
	pub txs: Vec<Transaction>,
}

impl Writeable for TxsResponse {
	fn write<W: Writer>(&self, writer: &mut W) -> Result<(), ser::Error> {
		self.err.write(writer)?;
		writer.write_u64(self.txs.len() as u64)?;
		for tx in &self.txs {
			tx.write(writer)?;
		}
		Ok(())
	}
}

impl Readable for TxsResponse {
	fn read<R: Reader>(reader: &mut R) -> Result<TxsResponse, ser::Error> {
		let err = RespErr::read(reader)?;
		let tx_len = reader.read_u64()?;
		let txs = read_multi(reader, tx_len)?;
		Ok(TxsResponse { err, txs })
	}
}

#[cfg(test)]
mod test {
	use super::*;
	use umbra_core::ser::{deserialize, ser_vec};

	#[test]
	fn request_roundtrip() {
		let h = Hash::from_vec(&[7u8; 32]);
		for req in vec![
			Request::GetBlock(h),
			Request::GetBlockTxids(h),
			Request::GetBlockTxs(h, vec![0, 2, 9]),
		] {
			let bytes = ser_vec(&req).unwrap();
			let req2: Request = deserialize(&mut &bytes[..]).unwrap();
			assert_eq!(req, req2);
		}
	}

	#[test]
	fn resp_err_values_are_stable() {
		assert_eq!(ser_vec(&RespErr::None).unwrap(), vec![0]);
		assert_eq!(ser_vec(&RespErr::NotFound).unwrap(), vec![1]);
		assert_eq!(ser_vec(&RespErr::BadRequest).unwrap(), vec![2]);
	}

	#[test]
	fn unknown_request_tag_is_rejected() {
		let res: Result<Request, ser::Error> = deserialize(&mut &[9u8][..]);
		assert!(res.is_err());
	}

	#[test]
	fn error_block_response_has_no_body() {
		let resp = BlockResponse {
			err: RespErr::NotFound,
			block: None,
		};
		let bytes = ser_vec(&resp).unwrap();
		assert_eq!(bytes, vec![1]);
		let resp2: BlockResponse = deserialize(&mut &bytes[..]).unwrap();
		assert_eq!(resp2.err, RespErr::NotFound);
		assert!(resp2.block.is_none());
	}
}
