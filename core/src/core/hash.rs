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

//! Hash Function
//!
//! Primary hash function used in the protocol: blake2b with a 32 byte
//! digest. Identifiers for every chain construct (blocks, transactions,
//! assets) are hashes of their canonical serialization.

use blake2_rfc::blake2b::Blake2b;
use std::cmp::min;
use std::convert::AsRef;
use std::{fmt, ops};

use crate::ser::{Error, Readable, Reader, Writeable, Writer};
use umbra_util as util;

/// A hash consisting of all zeroes, often used as a sentinel. Not the hash
/// of anything.
pub const ZERO_HASH: Hash = Hash([0; 32]);

/// A hash to uniquely (or close enough) identify one of the main blockchain
/// constructs. Used pervasively for blocks, transactions and outputs.
#[derive(Copy, Clone, PartialEq, PartialOrd, Eq, Ord, Hash, Serialize, Deserialize)]
pub struct Hash(pub [u8; 32]);

impl fmt::Debug for Hash {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let hash_hex = self.to_hex();
		const NUM_SHOW: usize = 12;

		write!(f, "{}", &hash_hex[..NUM_SHOW])
	}
}

impl fmt::Display for Hash {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		fmt::Debug::fmt(self, f)
	}
}

impl Hash {
	/// Size of a hash in bytes.
	pub const SIZE: usize = 32;

	/// Builds a Hash from a byte vector. If the vector is too short, it will
	/// be completed by zeroes. If it's too long, it will be truncated.
	pub fn from_vec(v: &[u8]) -> Hash {
		let mut h = [0; Hash::SIZE];
		let copy_size = min(v.len(), Hash::SIZE);
		h[..copy_size].copy_from_slice(&v[..copy_size]);
		Hash(h)
	}

	/// Converts the hash to a byte vector
	pub fn to_vec(&self) -> Vec<u8> {
		self.0.to_vec()
	}

	/// Returns a byte slice of the hash contents.
	pub fn as_bytes(&self) -> &[u8] {
		&self.0
	}

	/// Convert a hash to hex string format.
	pub fn to_hex(&self) -> String {
		util::to_hex(self.to_vec())
	}

	/// Convert hex string back to hash.
	pub fn from_hex(hex: &str) -> Result<Hash, Error> {
		let bytes = util::from_hex(hex.to_string())
			.map_err(|_| Error::HexError(format!("failed to decode {}", hex)))?;
		Ok(Hash::from_vec(&bytes))
	}

	/// Most significant 64 bits
	pub fn to_u64(&self) -> u64 {
		let mut res: u64 = 0;
		for i in 0..8 {
			res |= (self.0[i] as u64) << (8 * (7 - i));
		}
		res
	}
}

impl Default for Hash {
	fn default() -> Hash {
		ZERO_HASH
	}
}

impl ops::Index<usize> for Hash {
	type Output = u8;

	fn index(&self, idx: usize) -> &u8 {
		&self.0[idx]
	}
}

impl AsRef<[u8]> for Hash {
	fn as_ref(&self) -> &[u8] {
		&self.0
	}
}

impl Readable for Hash {
	fn read<R: Reader>(reader: &mut R) -> Result<Hash, Error> {
		let v = reader.read_fixed_bytes(Hash::SIZE)?;
		let mut a = [0; Hash::SIZE];
		a.copy_from_slice(&v[..]);
		Ok(Hash(a))
	}
}

impl Writeable for Hash {
	fn write<W: Writer>(&self, writer: &mut W) -> Result<(), Error> {
		writer.write_fixed_bytes(&self.0)
	}
}

/// Serializer that outputs a hash of the serialized object
pub struct HashWriter {
	state: Blake2b,
}

impl HashWriter {
	/// Consume the `HashWriter`, outputting its current hash into a 32-byte
	/// array
	pub fn finalize(self, output: &mut [u8]) {
		output.copy_from_slice(self.state.finalize().as_bytes());
	}

	/// Consume the `HashWriter`, outputting a `Hash` corresponding to its
	/// current state
	pub fn into_hash(self) -> Hash {
		let mut res = [0; 32];
		res.copy_from_slice(self.state.finalize().as_bytes());
		Hash(res)
	}
}

impl Default for HashWriter {
	fn default() -> HashWriter {
		HashWriter {
			state: Blake2b::new(32),
		}
	}
}

impl Writer for HashWriter {
	fn write_fixed_bytes<T: AsRef<[u8]>>(&mut self, bytes: T) -> Result<(), Error> {
		self.state.update(bytes.as_ref());
		Ok(())
	}
}

/// A trait for types that have a canonical hash
pub trait Hashed {
	/// Obtain the hash of the object
	fn hash(&self) -> Hash;
}

/// Implementing this trait means hash() can be derived from the canonical
/// serialization of the type.
pub trait DefaultHashable: Writeable {}

impl<D: DefaultHashable> Hashed for D {
	fn hash(&self) -> Hash {
		let mut hasher = HashWriter::default();
		Writeable::write(self, &mut hasher).unwrap();
		hasher.into_hash()
	}
}

impl DefaultHashable for Vec<u8> {}

/// Convenience for hashing a pair of hashes together, used when building
/// merkle trees over transaction ids.
pub fn hash_together(left: &Hash, right: &Hash) -> Hash {
	let mut hasher = HashWriter::default();
	hasher.write_fixed_bytes(left).unwrap();
	hasher.write_fixed_bytes(right).unwrap();
	hasher.into_hash()
}

#[cfg(test)]
mod test {
	use super::*;

	#[test]
	fn hash_is_stable() {
		let h = vec![0u8, 1, 2, 3].hash();
		let h2 = vec![0u8, 1, 2, 3].hash();
		assert_eq!(h, h2);
		assert_ne!(h, vec![0u8, 1, 2, 4].hash());
		assert_ne!(h, ZERO_HASH);
	}

	#[test]
	fn hex_roundtrip() {
		let h = vec![5u8; 17].hash();
		let hex = h.to_hex();
		assert_eq!(Hash::from_hex(&hex).unwrap(), h);
	}
}
