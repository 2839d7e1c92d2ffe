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

//! Lossy transaction fingerprints for xthinner compact blocks.

use byteorder::{ByteOrder, LittleEndian};
use siphasher::sip::SipHasher24;
use std::cmp::min;

use crate::core::hash::{Hash, HashWriter, Hashed};
use crate::ser::{self, Readable, Reader, Writeable, Writer};
use umbra_util as util;

/// The size of a short id used to fingerprint a transaction id (6 bytes)
pub const SHORT_ID_SIZE: usize = 6;

/// A trait for types that can be fingerprinted relative to an announcing
/// block.
pub trait ShortIdentifiable {
	/// The short_id is computed from a hash keyed to the announcing block
	/// *and* an announcement specific nonce, to minimize the effect of
	/// fingerprint collisions across announcements.
	fn short_id(&self, hash: &Hash, nonce: u64) -> ShortId;
}

impl<H: Hashed> ShortIdentifiable for H {
	/// Generate a short_id via the following -
	///
	///   * extract k0/k1 from blake2b(block_hash || nonce)
	///   * initialize a siphasher24 with k0/k1
	///   * feed self.hash() through the siphasher24 instance
	///   * drop the 2 most significant bytes (to return a 6 byte short_id)
	///
	fn short_id(&self, hash: &Hash, nonce: u64) -> ShortId {
		use std::hash::Hasher;

		// derive a key from the block hash and the announcement nonce
		let mut key_hasher = HashWriter::default();
		key_hasher.write_fixed_bytes(hash).unwrap();
		key_hasher.write_u64(nonce).unwrap();
		let key = key_hasher.into_hash();

		let k0 = LittleEndian::read_u64(&key.0[0..8]);
		let k1 = LittleEndian::read_u64(&key.0[8..16]);

		let mut sip_hasher = SipHasher24::new_with_keys(k0, k1);
		sip_hasher.write(&self.hash().to_vec()[..]);
		let res = sip_hasher.finish();

		let mut buf = [0; 8];
		LittleEndian::write_u64(&mut buf, res);
		ShortId::from_bytes(&buf[0..SHORT_ID_SIZE])
	}
}

/// Short id for identifying a transaction inside an xthinner announcement
#[derive(PartialEq, Clone, Copy, PartialOrd, Ord, Eq, Hash, Serialize, Deserialize)]
pub struct ShortId([u8; 6]);

impl ::std::fmt::Debug for ShortId {
	fn fmt(&self, f: &mut ::std::fmt::Formatter<'_>) -> ::std::fmt::Result {
		write!(f, "{}({})", stringify!(ShortId), self.to_hex())
	}
}

impl Readable for ShortId {
	fn read<R: Reader>(reader: &mut R) -> Result<ShortId, ser::Error> {
		let v = reader.read_fixed_bytes(SHORT_ID_SIZE)?;
		let mut a = [0; SHORT_ID_SIZE];
		a.copy_from_slice(&v[..]);
		Ok(ShortId(a))
	}
}

impl Writeable for ShortId {
	fn write<W: Writer>(&self, writer: &mut W) -> Result<(), ser::Error> {
		writer.write_fixed_bytes(&self.0)
	}
}

impl ShortId {
	/// Build a new short_id from a byte slice
	pub fn from_bytes(bytes: &[u8]) -> ShortId {
		let mut id = [0; SHORT_ID_SIZE];
		let copy_size = min(SHORT_ID_SIZE, bytes.len());
		id[..copy_size].copy_from_slice(&bytes[..copy_size]);
		ShortId(id)
	}

	/// Hex string representation of a short_id
	pub fn to_hex(&self) -> String {
		util::to_hex(self.0.to_vec())
	}

	/// Reconstructs a short id from a hex string.
	pub fn from_hex(hex: &str) -> Result<ShortId, ser::Error> {
		let bytes = util::from_hex(hex.to_string())
			.map_err(|_| ser::Error::HexError("short_id from_hex error".to_string()))?;
		Ok(ShortId::from_bytes(&bytes))
	}

	/// The zero short_id, convenient for generating a short_id for testing.
	pub fn zero() -> ShortId {
		ShortId::from_bytes(&[0])
	}
}
