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

//! Handshake on a fresh chain-service stream. The dialer advertises its
//! protocol identifier (which embeds the network prefix) and its genesis
//! block id; the acceptor verifies both before serving any request, so
//! nodes on different networks disconnect immediately.

use std::net::TcpStream;
use std::sync::Arc;

use crate::conn::{read_message, write_message};
use crate::types::Error;
use umbra_core::core::hash::Hash;
use umbra_core::global;
use umbra_core::ser::{self, Readable, Reader, Writeable, Writer};
use umbra_util::StopState;

/// First message on a fresh stream, sent by the dialer.
pub struct Hand {
	/// Protocol version of the dialer
	pub version: u32,
	/// Full protocol identifier, network prefix included
	pub protocol: String,
	/// Genesis block id of the dialer's chain
	pub genesis: Hash,
}

impl Writeable for Hand {
	fn write<W: Writer>(&self, writer: &mut W) -> Result<(), ser::Error> {
		writer.write_u32(self.version)?;
		writer.write_bytes(self.protocol.as_bytes())?;
		self.genesis.write(writer)
	}
}

impl Readable for Hand {
	fn read<R: Reader>(reader: &mut R) -> Result<Hand, ser::Error> {
		let version = reader.read_u32()?;
		let protocol_bytes = reader.read_bytes_len_prefix()?;
		let protocol =
			String::from_utf8(protocol_bytes).map_err(|_| ser::Error::CorruptedData)?;
		let genesis = Hash::read(reader)?;
		Ok(Hand {
			version,
			protocol,
			genesis,
		})
	}
}

/// Reply to a Hand, sent by the acceptor.
pub struct Shake {
	/// Protocol version of the acceptor
	pub version: u32,
	/// Genesis block id of the acceptor's chain
	pub genesis: Hash,
}

impl Writeable for Shake {
	fn write<W: Writer>(&self, writer: &mut W) -> Result<(), ser::Error> {
		writer.write_u32(self.version)?;
		self.genesis.write(writer)
	}
}

impl Readable for Shake {
	fn read<R: Reader>(reader: &mut R) -> Result<Shake, ser::Error> {
		Ok(Shake {
			version: reader.read_u32()?,
			genesis: Hash::read(reader)?,
		})
	}
}

/// Dialer side of the handshake.
pub fn initiate(
	stream: &mut TcpStream,
	genesis: Hash,
	stop_state: &Arc<StopState>,
) -> Result<u32, Error> {
	let hand = Hand {
		version: global::PROTOCOL_VERSION,
		protocol: global::chain_service_protocol(),
		genesis,
	};
	write_message(stream, &hand)?;

	let shake: Shake = read_message(stream, stop_state)?;
	if shake.genesis != genesis {
		return Err(Error::GenesisMismatch {
			us: genesis,
			peer: shake.genesis,
		});
	}
	Ok(shake.version)
}

/// Acceptor side of the handshake.
pub fn respond(
	stream: &mut TcpStream,
	genesis: Hash,
	stop_state: &Arc<StopState>,
) -> Result<u32, Error> {
	let hand: Hand = read_message(stream, stop_state)?;

	let ours = global::chain_service_protocol();
	if hand.protocol != ours {
		return Err(Error::ProtocolMismatch {
			us: ours,
			peer: hand.protocol,
		});
	}
	if hand.genesis != genesis {
		return Err(Error::GenesisMismatch {
			us: genesis,
			peer: hand.genesis,
		});
	}

	let shake = Shake {
		version: global::PROTOCOL_VERSION,
		genesis,
	};
	write_message(stream, &shake)?;
	Ok(hand.version)
}
