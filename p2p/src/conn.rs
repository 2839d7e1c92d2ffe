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

//! Provides connection wrappers that handle the lower level tasks of
//! sending and receiving framed messages on a TCP socket. Reads run
//! against a short socket timeout in a loop so a pending read aborts
//! promptly once the node is asked to stop; there is deliberately no
//! per-call deadline beyond that.

use std::io::{Read, Write};
use std::net::TcpStream;
use std::sync::Arc;
use std::time::Duration;

use crate::msg::MAX_MSG_LEN;
use crate::types::Error;
use umbra_core::ser::{self, vlq, Readable, Writeable};
use umbra_util::StopState;

/// Tick between checks of the stop state while a read is pending.
pub const IO_TIMEOUT: Duration = Duration::from_millis(1000);

const VLQ_MASK: u8 = 0b0111_1111;
const VLQ_HIGH_BIT: u8 = 0b1000_0000;

/// Configure the socket timeouts used by the framed read/write helpers.
pub fn set_stream_timeouts(stream: &TcpStream) -> Result<(), Error> {
	stream.set_read_timeout(Some(IO_TIMEOUT))?;
	stream.set_write_timeout(Some(IO_TIMEOUT))?;
	Ok(())
}

// Fill the whole buffer, retrying on the socket timeout tick and bailing
// out as soon as the node stops. Progress made before a tick is kept.
fn read_exact_stop(
	stream: &mut TcpStream,
	buf: &mut [u8],
	stop_state: &Arc<StopState>,
) -> Result<(), Error> {
	let mut filled = 0;
	while filled < buf.len() {
		if stop_state.is_stopped() {
			return Err(Error::Stopped);
		}
		match stream.read(&mut buf[filled..]) {
			Ok(0) => return Err(Error::ConnectionClose),
			Ok(n) => filled += n,
			Err(ref e)
				if e.kind() == std::io::ErrorKind::WouldBlock
					|| e.kind() == std::io::ErrorKind::TimedOut =>
			{
				continue;
			}
			Err(e) => return Err(Error::Connection(e)),
		}
	}
	Ok(())
}

// Read the varint frame length byte by byte so a timeout tick never loses
// partial progress of a multi byte quantity.
fn read_frame_len(stream: &mut TcpStream, stop_state: &Arc<StopState>) -> Result<u64, Error> {
	let mut qty: u64 = 0;
	for n in 0..10 {
		let mut byte = [0u8; 1];
		read_exact_stop(stream, &mut byte, stop_state)?;
		qty |= ((byte[0] & VLQ_MASK) as u64) << (n * 7);
		if (byte[0] & VLQ_HIGH_BIT) == 0 {
			return Ok(qty);
		}
	}
	Err(Error::Serialization(ser::Error::CorruptedData))
}

/// Read a single framed message off the stream. Blocks until a whole
/// message arrived, the peer closed the stream, or the node stopped.
pub fn read_message<T: Readable>(
	stream: &mut TcpStream,
	stop_state: &Arc<StopState>,
) -> Result<T, Error> {
	let len = read_frame_len(stream, stop_state)?;
	if len > MAX_MSG_LEN {
		return Err(Error::Serialization(ser::Error::TooLargeReadErr));
	}
	let mut body = vec![0u8; len as usize];
	read_exact_stop(stream, &mut body, stop_state)?;
	let msg = ser::deserialize(&mut &body[..])?;
	Ok(msg)
}

/// Frame and write a single message to the stream.
pub fn write_message<T: Writeable>(stream: &mut TcpStream, msg: &T) -> Result<(), Error> {
	let body = ser::ser_vec(msg)?;
	if body.len() as u64 > MAX_MSG_LEN {
		return Err(Error::Serialization(ser::Error::TooLargeReadErr));
	}
	let mut frame = vec![];
	vlq::write(body.len() as u64, &mut frame)?;
	frame.extend_from_slice(&body);
	write_all_stop(stream, &frame)
}

// write_all, retrying on the socket timeout tick
fn write_all_stop(stream: &mut TcpStream, mut buf: &[u8]) -> Result<(), Error> {
	while !buf.is_empty() {
		match stream.write(buf) {
			Ok(0) => return Err(Error::ConnectionClose),
			Ok(n) => buf = &buf[n..],
			Err(ref e)
				if e.kind() == std::io::ErrorKind::WouldBlock
					|| e.kind() == std::io::ErrorKind::TimedOut =>
			{
				continue;
			}
			Err(e) => return Err(Error::Connection(e)),
		}
	}
	Ok(())
}

#[cfg(test)]
mod test {
	use super::*;
	use crate::msg::{Request, RespErr, TxidsResponse};
	use std::net::{TcpListener, TcpStream};
	use std::thread;
	use umbra_core::core::hash::Hash;

	fn stream_pair() -> (TcpStream, TcpStream) {
		let listener = TcpListener::bind("127.0.0.1:0").unwrap();
		let addr = listener.local_addr().unwrap();
		let handle = thread::spawn(move || listener.accept().unwrap().0);
		let client = TcpStream::connect(addr).unwrap();
		let server = handle.join().unwrap();
		(client, server)
	}

	#[test]
	fn frame_roundtrip() {
		let stop = Arc::new(StopState::new());
		let (mut client, mut server) = stream_pair();
		set_stream_timeouts(&client).unwrap();
		set_stream_timeouts(&server).unwrap();

		let req = Request::GetBlockTxs(Hash::from_vec(&[9u8; 32]), vec![1, 3]);
		write_message(&mut client, &req).unwrap();
		let received: Request = read_message(&mut server, &stop).unwrap();
		assert_eq!(received, req);

		let resp = TxidsResponse {
			err: RespErr::None,
			txids: vec![Hash::from_vec(&[1u8; 32]), Hash::from_vec(&[2u8; 32])],
		};
		write_message(&mut server, &resp).unwrap();
		let received: TxidsResponse = read_message(&mut client, &stop).unwrap();
		assert_eq!(received.err, RespErr::None);
		assert_eq!(received.txids, resp.txids);
	}

	#[test]
	fn oversize_frame_is_rejected() {
		let stop = Arc::new(StopState::new());
		let (mut client, mut server) = stream_pair();
		set_stream_timeouts(&client).unwrap();
		set_stream_timeouts(&server).unwrap();

		// hand-craft a frame claiming more than the maximum length
		let mut frame = vec![];
		vlq::write(MAX_MSG_LEN + 1, &mut frame).unwrap();
		client.write_all(&frame).unwrap();

		let res: Result<Request, Error> = read_message(&mut server, &stop);
		match res {
			Err(Error::Serialization(ser::Error::TooLargeReadErr)) => {}
			other => panic!("expected TooLargeReadErr, got {:?}", other),
		}
	}

	#[test]
	fn stop_aborts_pending_read() {
		let stop = Arc::new(StopState::new());
		let (_client, mut server) = stream_pair();
		set_stream_timeouts(&server).unwrap();

		let stop2 = stop.clone();
		let waiter = thread::spawn(move || {
			let res: Result<Request, Error> = read_message(&mut server, &stop2);
			res
		});
		thread::sleep(Duration::from_millis(100));
		stop.stop();
		match waiter.join().unwrap() {
			Err(Error::Stopped) => {}
			other => panic!("expected Stopped, got {:?}", other),
		}
	}
}
