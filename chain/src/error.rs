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

//! Error types for chain
use failure::{Backtrace, Context, Fail};
use std::fmt::{self, Display};
use std::io;

use umbra_core::core::Nullifier;
use umbra_core::ser;

/// Error definition
#[derive(Debug)]
pub struct Error {
	inner: Context<ErrorKind>,
}

/// Chain error definitions
#[derive(Clone, Eq, PartialEq, Debug, Fail)]
pub enum ErrorKind {
	/// Special case of orphan blocks: parent unknown to us, or height
	/// further out than the next expected one
	#[fail(display = "Orphan")]
	Orphan,
	/// The tx root in the header doesn't commit to the block body. Either
	/// the mempool decode picked a colliding transaction or the block is
	/// malicious; recoverable by refetching the tx ids from the relayer.
	#[fail(display = "Invalid Tx Root")]
	InvalidTxRoot,
	/// Block parent is known but isn't our current tip, usually the losing
	/// side of a height race
	#[fail(display = "Block Does Not Connect")]
	DoesNotConnect,
	/// Block height is invalid (not previous + 1)
	#[fail(display = "Invalid Block Height")]
	InvalidBlockHeight,
	/// Block time is not after its parent
	#[fail(display = "Invalid Block Time")]
	InvalidBlockTime,
	/// Invalid block version, either a mistake or outdated software
	#[fail(display = "Invalid Block Version: {}", _0)]
	InvalidBlockVersion(u16),
	/// Coinbase is missing, duplicated or not the first transaction
	#[fail(display = "Invalid Coinbase")]
	InvalidCoinbase,
	/// A producer id or signature is structurally absent
	#[fail(display = "Invalid Block Signature")]
	InvalidBlockSignature,
	/// One of the nullifiers in the block was already spent
	#[fail(display = "Double Spend: {:?}", _0)]
	DoubleSpend(Nullifier),
	/// The genesis self-reference rule was violated
	#[fail(display = "Invalid Genesis")]
	InvalidGenesis,
	/// Block (or other item) not found in the connected chain
	#[fail(display = "Not Found")]
	NotFound,
	/// Internal issue when trying to save or load data from store
	#[fail(display = "Store Error: {}", _0)]
	StoreErr(String),
	/// Error serializing or deserializing a type
	#[fail(display = "Serialization Error")]
	SerErr(ser::Error),
	/// Anything else
	#[fail(display = "Other Error: {}", _0)]
	Other(String),
}

impl Display for Error {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let cause = match self.cause() {
			Some(c) => format!("{}", c),
			None => String::from("Unknown"),
		};
		let backtrace = match self.backtrace() {
			Some(b) => format!("{}", b),
			None => String::from("Unknown"),
		};
		let output = format!(
			"{} \n Cause: {} \n Backtrace: {}",
			self.inner, cause, backtrace
		);
		Display::fmt(&output, f)
	}
}

impl Error {
	/// get kind
	pub fn kind(&self) -> ErrorKind {
		self.inner.get_context().clone()
	}
	/// get cause
	pub fn cause(&self) -> Option<&dyn Fail> {
		self.inner.cause()
	}
	/// get backtrace
	pub fn backtrace(&self) -> Option<&Backtrace> {
		self.inner.backtrace()
	}

	/// Whether the error is due to a block that was intrinsically wrong,
	/// which its relayer either produced or should have validated
	pub fn is_bad_data(&self) -> bool {
		// shorter to match on all the "not the block's fault" errors
		match self.kind() {
			ErrorKind::Orphan
			| ErrorKind::DoesNotConnect
			| ErrorKind::NotFound
			| ErrorKind::StoreErr(_)
			| ErrorKind::SerErr(_)
			| ErrorKind::Other(_) => false,
			_ => true,
		}
	}

	/// Whether the block should be held back as an orphan.
	pub fn is_orphan(&self) -> bool {
		self.kind() == ErrorKind::Orphan
	}
}

impl From<ErrorKind> for Error {
	fn from(kind: ErrorKind) -> Error {
		Error {
			inner: Context::new(kind),
		}
	}
}

impl From<Context<ErrorKind>> for Error {
	fn from(inner: Context<ErrorKind>) -> Error {
		Error { inner }
	}
}

impl From<ser::Error> for Error {
	fn from(error: ser::Error) -> Error {
		Error {
			inner: Context::new(ErrorKind::SerErr(error)),
		}
	}
}

impl From<io::Error> for Error {
	fn from(e: io::Error) -> Error {
		Error {
			inner: Context::new(ErrorKind::StoreErr(e.to_string())),
		}
	}
}
