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

//! Server side of the chain service. A single long-lived stream per peer
//! services a sequence of requests until either side closes or an I/O
//! error occurs: the server reads, handles, writes and loops. Requests on
//! one stream are strictly sequential, a slow peer only ever has one
//! request in flight with us.

use std::net::{SocketAddr, TcpStream};
use std::sync::Arc;

use crate::conn::{read_message, write_message};
use crate::msg::{BlockResponse, Request, RespErr, TxidsResponse, TxsResponse};
use crate::types::{BlockFetcher, Error};
use umbra_util::StopState;

/// Chain-service request handler for one stream.
pub struct Protocol {
	fetcher: Arc<dyn BlockFetcher>,
	stop_state: Arc<StopState>,
}

impl Protocol {
	/// Builds a handler serving blocks through the given fetcher.
	pub fn new(fetcher: Arc<dyn BlockFetcher>, stop_state: Arc<StopState>) -> Protocol {
		Protocol {
			fetcher,
			stop_state,
		}
	}

	/// Serve requests on the stream until the peer goes away, the node
	/// stops, or the peer sends something unreadable (in which case the
	/// stream is dropped, resetting it).
	pub fn handle(&self, stream: &mut TcpStream, peer_addr: SocketAddr) -> Result<(), Error> {
		loop {
			let request: Request = match read_message(stream, &self.stop_state) {
				Ok(r) => r,
				Err(Error::Stopped) => return Ok(()),
				Err(Error::ConnectionClose) => return Ok(()),
				Err(e) => {
					debug!("chainservice: resetting stream to {}: {:?}", peer_addr, e);
					return Err(e);
				}
			};
			trace!("chainservice: {} -> {:?}", peer_addr, request);

			match request {
				Request::GetBlock(h) => {
					let block = self.fetcher.fetch_block(&h);
					let resp = match block {
						Some(b) => BlockResponse {
							err: RespErr::None,
							block: Some(b),
						},
						None => BlockResponse {
							err: RespErr::NotFound,
							block: None,
						},
					};
					write_message(stream, &resp)?;
				}
				Request::GetBlockTxids(h) => {
					let resp = match self.fetcher.fetch_block(&h) {
						Some(b) => TxidsResponse {
							err: RespErr::None,
							txids: b.tx_ids(),
						},
						None => TxidsResponse {
							err: RespErr::NotFound,
							txids: vec![],
						},
					};
					write_message(stream, &resp)?;
				}
				Request::GetBlockTxs(h, indices) => {
					let resp = match self.fetcher.fetch_block(&h) {
						Some(b) => {
							// positions preserved: either every index
							// resolves or the request as a whole is bad
							let mut txs = Vec::with_capacity(indices.len());
							let mut bad = false;
							for idx in &indices {
								match b.txs.get(*idx as usize) {
									Some(tx) => txs.push(tx.clone()),
									None => {
										bad = true;
										break;
									}
								}
							}
							if bad {
								TxsResponse {
									err: RespErr::BadRequest,
									txs: vec![],
								}
							} else {
								TxsResponse {
									err: RespErr::None,
									txs,
								}
							}
						}
						None => TxsResponse {
							err: RespErr::NotFound,
							txs: vec![],
						},
					};
					write_message(stream, &resp)?;
				}
			}
		}
	}
}
