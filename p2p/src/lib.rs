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

//! Networking code to connect to other peers and exchange blocks and
//! transactions: the chain-service request/response protocol, the peer
//! registry and the ban scoring applied to misbehaving peers. Peer
//! identity, discovery and gossip belong to the transport layer and stay
//! outside this crate.

#![deny(non_upper_case_globals)]
#![deny(non_camel_case_types)]
#![deny(non_snake_case)]
#![deny(unused_mut)]
#![warn(missing_docs)]

#[macro_use]
extern crate log;
#[macro_use]
extern crate serde_derive;

pub mod conn;
pub mod handshake;
pub mod msg;
pub mod peer;
pub mod peers;
pub mod protocol;
pub mod serv;
pub mod types;

pub use crate::peer::Peer;
pub use crate::peers::Peers;
pub use crate::serv::Server;
pub use crate::types::{BlockFetcher, BlockRpc, Direction, Error, P2PConfig, PeerInfo};
