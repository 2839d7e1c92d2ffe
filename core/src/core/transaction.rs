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

//! Transactions. Five kinds transit on the chain, tagged on the wire; the
//! privacy fields (commitments, nullifiers, proofs) are opaque blobs to
//! everything but the proof system. The canonical serialization defined
//! here is what transaction ids are derived from.

use std::fmt;

use crate::core::hash::{hash_together, DefaultHashable, Hash, Hashed};
use crate::ser::{self, read_multi, Readable, Reader, Writeable, Writer};
use umbra_util as util;

/// A commitment binding an output's amount, asset, script, salt and state.
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Commitment(pub [u8; 32]);

impl fmt::Debug for Commitment {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "Commitment({})", util::to_hex(self.0[..6].to_vec()))
	}
}

impl AsRef<[u8]> for Commitment {
	fn as_ref(&self) -> &[u8] {
		&self.0
	}
}

impl Writeable for Commitment {
	fn write<W: Writer>(&self, writer: &mut W) -> Result<(), ser::Error> {
		writer.write_fixed_bytes(&self.0)
	}
}

impl Readable for Commitment {
	fn read<R: Reader>(reader: &mut R) -> Result<Commitment, ser::Error> {
		let v = reader.read_fixed_bytes(32)?;
		let mut c = [0; 32];
		c.copy_from_slice(&v[..]);
		Ok(Commitment(c))
	}
}

/// A unique per-input token preventing double spends without revealing
/// which output is being spent.
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
pub struct Nullifier(pub [u8; 32]);

impl fmt::Debug for Nullifier {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "Nullifier({})", util::to_hex(self.0[..6].to_vec()))
	}
}

impl AsRef<[u8]> for Nullifier {
	fn as_ref(&self) -> &[u8] {
		&self.0
	}
}

impl Writeable for Nullifier {
	fn write<W: Writer>(&self, writer: &mut W) -> Result<(), ser::Error> {
		writer.write_fixed_bytes(&self.0)
	}
}

impl Readable for Nullifier {
	fn read<R: Reader>(reader: &mut R) -> Result<Nullifier, ser::Error> {
		let v = reader.read_fixed_bytes(32)?;
		let mut n = [0; 32];
		n.copy_from_slice(&v[..]);
		Ok(Nullifier(n))
	}
}

/// A shielded transaction output: a commitment plus the ciphertext that
/// lets the recipient recover the spendable note.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct Output {
	/// Commitment over amount, asset, script, salt and state
	pub commitment: Commitment,
	/// Encrypted note, only the recipient can open it
	pub ciphertext: Vec<u8>,
}

impl Writeable for Output {
	fn write<W: Writer>(&self, writer: &mut W) -> Result<(), ser::Error> {
		self.commitment.write(writer)?;
		writer.write_bytes(&self.ciphertext)
	}
}

impl Readable for Output {
	fn read<R: Reader>(reader: &mut R) -> Result<Output, ser::Error> {
		Ok(Output {
			commitment: Commitment::read(reader)?,
			ciphertext: reader.read_bytes_len_prefix()?,
		})
	}
}

/// Fold a sequence of output commitments into a txo accumulator root,
/// starting from the provided root. Appending the commitments of every
/// connected block in order yields the chain's current txo root.
pub fn fold_txo_root(prev: &Hash, outputs: &[Output]) -> Hash {
	let mut root = *prev;
	for out in outputs {
		root = hash_together(&root, &Hash(out.commitment.0));
	}
	root
}

/// A regular shielded spend.
#[derive(Clone, PartialEq, Eq, Debug, Default)]
pub struct StandardTransaction {
	/// New outputs created by this transaction
	pub outputs: Vec<Output>,
	/// Nullifiers for the inputs being spent
	pub nullifiers: Vec<Nullifier>,
	/// Txo accumulator root the zk proof was built against
	pub txo_root: Hash,
	/// Fee in base units
	pub fee: u64,
	/// Unix timestamp before which the transaction is not valid, zero for
	/// none
	pub locktime: i64,
	/// zk-SNARK proof, opaque
	pub proof: Vec<u8>,
}

/// Block reward claimed by the producing validator.
#[derive(Clone, PartialEq, Eq, Debug, Default)]
pub struct CoinbaseTransaction {
	/// Serialized public identity of the claiming validator
	pub validator_id: Vec<u8>,
	/// Newly created coins
	pub new_coins: u64,
	/// Outputs distributing the new coins
	pub outputs: Vec<Output>,
	/// Signature by the validator over the transaction
	pub signature: Vec<u8>,
	/// zk-SNARK proof, opaque
	pub proof: Vec<u8>,
}

/// Locks coins to give a validator consensus weight.
#[derive(Clone, PartialEq, Eq, Debug, Default)]
pub struct StakeTransaction {
	/// Serialized public identity of the staking validator
	pub validator_id: Vec<u8>,
	/// Amount being staked
	pub amount: u64,
	/// Nullifier of the staked output
	pub nullifier: Nullifier,
	/// Txo accumulator root the zk proof was built against
	pub txo_root: Hash,
	/// Unix timestamp the stake stays locked until, zero for none
	pub locked_until: i64,
	/// Signature by the validator over the transaction
	pub signature: Vec<u8>,
	/// zk-SNARK proof, opaque
	pub proof: Vec<u8>,
}

/// Withdrawal from the treasury following an approved proposal.
#[derive(Clone, PartialEq, Eq, Debug, Default)]
pub struct TreasuryTransaction {
	/// Amount withdrawn
	pub amount: u64,
	/// Outputs distributing the withdrawal
	pub outputs: Vec<Output>,
	/// Hash of the approved proposal document
	pub proposal_hash: Hash,
	/// zk-SNARK proof, opaque
	pub proof: Vec<u8>,
}

/// Creation of new tokens of a user-defined asset.
#[derive(Clone, PartialEq, Eq, Debug, Default)]
pub struct MintTransaction {
	/// Asset being minted
	pub asset_id: Hash,
	/// Hash of the document describing the asset
	pub document_hash: Hash,
	/// Number of new tokens
	pub new_tokens: u64,
	/// Outputs carrying the new tokens
	pub outputs: Vec<Output>,
	/// Nullifiers for the fee inputs
	pub nullifiers: Vec<Nullifier>,
	/// Txo accumulator root the zk proof was built against
	pub txo_root: Hash,
	/// Fee in base units
	pub fee: u64,
	/// Serialized mint authority key
	pub mint_key: Vec<u8>,
	/// Signature by the mint authority
	pub signature: Vec<u8>,
	/// zk-SNARK proof, opaque
	pub proof: Vec<u8>,
}

/// A transaction as it transits on the chain, one of five kinds. The tag
/// is part of the canonical serialization, changing any tag is a protocol
/// break.
#[derive(Clone, PartialEq, Eq, Debug)]
pub enum Transaction {
	/// Regular shielded spend
	Standard(StandardTransaction),
	/// Validator block reward
	Coinbase(CoinbaseTransaction),
	/// Stake lock
	Stake(StakeTransaction),
	/// Treasury withdrawal
	Treasury(TreasuryTransaction),
	/// Token mint
	Mint(MintTransaction),
}

impl Default for Transaction {
	fn default() -> Transaction {
		Transaction::Standard(StandardTransaction::default())
	}
}

impl DefaultHashable for Transaction {}

impl Transaction {
	/// The transaction id, a hash over the canonical serialization.
	pub fn id(&self) -> Hash {
		self.hash()
	}

	/// Outputs created by this transaction, empty for stake.
	pub fn outputs(&self) -> &[Output] {
		match self {
			Transaction::Standard(tx) => &tx.outputs,
			Transaction::Coinbase(tx) => &tx.outputs,
			Transaction::Stake(_) => &[],
			Transaction::Treasury(tx) => &tx.outputs,
			Transaction::Mint(tx) => &tx.outputs,
		}
	}

	/// Nullifiers consumed by this transaction.
	pub fn nullifiers(&self) -> Vec<Nullifier> {
		match self {
			Transaction::Standard(tx) => tx.nullifiers.clone(),
			Transaction::Coinbase(_) => vec![],
			Transaction::Stake(tx) => vec![tx.nullifier],
			Transaction::Treasury(_) => vec![],
			Transaction::Mint(tx) => tx.nullifiers.clone(),
		}
	}

	/// Fee paid by this transaction, zero for the fee-less kinds.
	pub fn fee(&self) -> u64 {
		match self {
			Transaction::Standard(tx) => tx.fee,
			Transaction::Mint(tx) => tx.fee,
			_ => 0,
		}
	}

	/// Whether this is a coinbase transaction.
	pub fn is_coinbase(&self) -> bool {
		match self {
			Transaction::Coinbase(_) => true,
			_ => false,
		}
	}

	/// Whether this is a stake transaction.
	pub fn is_stake(&self) -> bool {
		match self {
			Transaction::Stake(_) => true,
			_ => false,
		}
	}
}

fn write_outputs<W: Writer>(outputs: &[Output], writer: &mut W) -> Result<(), ser::Error> {
	writer.write_u64(outputs.len() as u64)?;
	for out in outputs {
		out.write(writer)?;
	}
	Ok(())
}

fn write_nullifiers<W: Writer>(nullifiers: &[Nullifier], writer: &mut W) -> Result<(), ser::Error> {
	writer.write_u64(nullifiers.len() as u64)?;
	for n in nullifiers {
		n.write(writer)?;
	}
	Ok(())
}

impl Writeable for Transaction {
	fn write<W: Writer>(&self, writer: &mut W) -> Result<(), ser::Error> {
		match self {
			Transaction::Standard(tx) => {
				writer.write_u8(0)?;
				write_outputs(&tx.outputs, writer)?;
				write_nullifiers(&tx.nullifiers, writer)?;
				tx.txo_root.write(writer)?;
				ser_multiwrite!(writer, [write_u64, tx.fee], [write_i64, tx.locktime]);
				writer.write_bytes(&tx.proof)?;
			}
			Transaction::Coinbase(tx) => {
				writer.write_u8(1)?;
				writer.write_bytes(&tx.validator_id)?;
				writer.write_u64(tx.new_coins)?;
				write_outputs(&tx.outputs, writer)?;
				writer.write_bytes(&tx.signature)?;
				writer.write_bytes(&tx.proof)?;
			}
			Transaction::Stake(tx) => {
				writer.write_u8(2)?;
				writer.write_bytes(&tx.validator_id)?;
				writer.write_u64(tx.amount)?;
				tx.nullifier.write(writer)?;
				tx.txo_root.write(writer)?;
				writer.write_i64(tx.locked_until)?;
				writer.write_bytes(&tx.signature)?;
				writer.write_bytes(&tx.proof)?;
			}
			Transaction::Treasury(tx) => {
				writer.write_u8(3)?;
				writer.write_u64(tx.amount)?;
				write_outputs(&tx.outputs, writer)?;
				tx.proposal_hash.write(writer)?;
				writer.write_bytes(&tx.proof)?;
			}
			Transaction::Mint(tx) => {
				writer.write_u8(4)?;
				tx.asset_id.write(writer)?;
				tx.document_hash.write(writer)?;
				writer.write_u64(tx.new_tokens)?;
				write_outputs(&tx.outputs, writer)?;
				write_nullifiers(&tx.nullifiers, writer)?;
				tx.txo_root.write(writer)?;
				writer.write_u64(tx.fee)?;
				writer.write_bytes(&tx.mint_key)?;
				writer.write_bytes(&tx.signature)?;
				writer.write_bytes(&tx.proof)?;
			}
		}
		Ok(())
	}
}

impl Readable for Transaction {
	fn read<R: Reader>(reader: &mut R) -> Result<Transaction, ser::Error> {
		let tx = match reader.read_u8()? {
			0 => {
				let out_len = reader.read_u64()?;
				let outputs = read_multi(reader, out_len)?;
				let nlf_len = reader.read_u64()?;
				let nullifiers = read_multi(reader, nlf_len)?;
				let txo_root = Hash::read(reader)?;
				let (fee, locktime) = ser_multiread!(reader, read_u64, read_i64);
				let proof = reader.read_bytes_len_prefix()?;
				Transaction::Standard(StandardTransaction {
					outputs,
					nullifiers,
					txo_root,
					fee,
					locktime,
					proof,
				})
			}
			1 => {
				let validator_id = reader.read_bytes_len_prefix()?;
				let new_coins = reader.read_u64()?;
				let out_len = reader.read_u64()?;
				let outputs = read_multi(reader, out_len)?;
				let signature = reader.read_bytes_len_prefix()?;
				let proof = reader.read_bytes_len_prefix()?;
				Transaction::Coinbase(CoinbaseTransaction {
					validator_id,
					new_coins,
					outputs,
					signature,
					proof,
				})
			}
			2 => {
				let validator_id = reader.read_bytes_len_prefix()?;
				let amount = reader.read_u64()?;
				let nullifier = Nullifier::read(reader)?;
				let txo_root = Hash::read(reader)?;
				let locked_until = reader.read_i64()?;
				let signature = reader.read_bytes_len_prefix()?;
				let proof = reader.read_bytes_len_prefix()?;
				Transaction::Stake(StakeTransaction {
					validator_id,
					amount,
					nullifier,
					txo_root,
					locked_until,
					signature,
					proof,
				})
			}
			3 => {
				let amount = reader.read_u64()?;
				let out_len = reader.read_u64()?;
				let outputs = read_multi(reader, out_len)?;
				let proposal_hash = Hash::read(reader)?;
				let proof = reader.read_bytes_len_prefix()?;
				Transaction::Treasury(TreasuryTransaction {
					amount,
					outputs,
					proposal_hash,
					proof,
				})
			}
			4 => {
				let asset_id = Hash::read(reader)?;
				let document_hash = Hash::read(reader)?;
				let new_tokens = reader.read_u64()?;
				let out_len = reader.read_u64()?;
				let outputs = read_multi(reader, out_len)?;
				let nlf_len = reader.read_u64()?;
				let nullifiers = read_multi(reader, nlf_len)?;
				let txo_root = Hash::read(reader)?;
				let fee = reader.read_u64()?;
				let mint_key = reader.read_bytes_len_prefix()?;
				let signature = reader.read_bytes_len_prefix()?;
				let proof = reader.read_bytes_len_prefix()?;
				Transaction::Mint(MintTransaction {
					asset_id,
					document_hash,
					new_tokens,
					outputs,
					nullifiers,
					txo_root,
					fee,
					mint_key,
					signature,
					proof,
				})
			}
			_ => return Err(ser::Error::CorruptedData),
		};
		Ok(tx)
	}
}

#[cfg(test)]
mod test {
	use super::*;
	use crate::ser;

	fn sample_standard() -> Transaction {
		Transaction::Standard(StandardTransaction {
			outputs: vec![Output {
				commitment: Commitment([3u8; 32]),
				ciphertext: vec![9, 9, 9],
			}],
			nullifiers: vec![Nullifier([7u8; 32])],
			txo_root: Hash::from_vec(&[1u8; 32]),
			fee: 10,
			locktime: 0,
			proof: vec![0xab; 48],
		})
	}

	#[test]
	fn tx_ser_roundtrip() {
		let tx = sample_standard();
		let bytes = ser::ser_vec(&tx).unwrap();
		let tx2: Transaction = ser::deserialize(&mut &bytes[..]).unwrap();
		assert_eq!(tx, tx2);
		assert_eq!(tx.id(), tx2.id());
	}

	#[test]
	fn tx_ids_differ_per_kind() {
		let standard = sample_standard();
		let coinbase = Transaction::Coinbase(CoinbaseTransaction::default());
		let stake = Transaction::Stake(StakeTransaction::default());
		assert_ne!(standard.id(), coinbase.id());
		assert_ne!(coinbase.id(), stake.id());
	}

	#[test]
	fn bad_tag_is_rejected() {
		let res: Result<Transaction, ser::Error> = ser::deserialize(&mut &[9u8][..]);
		assert_eq!(res, Err(ser::Error::CorruptedData));
	}

	#[test]
	fn txo_root_folding() {
		let out = Output {
			commitment: Commitment([5u8; 32]),
			ciphertext: vec![],
		};
		let root0 = crate::core::hash::ZERO_HASH;
		let root1 = fold_txo_root(&root0, &[out.clone()]);
		assert_ne!(root0, root1);
		// appending in two steps equals appending in one
		let out2 = Output {
			commitment: Commitment([6u8; 32]),
			ciphertext: vec![],
		};
		let both = fold_txo_root(&root0, &[out.clone(), out2.clone()]);
		assert_eq!(fold_txo_root(&root1, &[out2]), both);
	}
}
