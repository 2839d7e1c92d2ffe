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

//! The umbra server glues the different parts of the system together: the
//! chain, the transaction pool, the peer-to-peer layer and the consensus
//! engine. Its heart is the block-ingest coordinator that turns compact
//! announcements into connected blocks.

#![deny(non_upper_case_globals)]
#![deny(non_camel_case_types)]
#![deny(non_snake_case)]
#![deny(unused_mut)]
#![warn(missing_docs)]

#[macro_use]
extern crate log;
#[macro_use]
extern crate serde_derive;

pub mod common;
pub mod node;

pub use crate::common::adapters::NetToChainAdapter;
pub use crate::common::types::{Error, PolicyConfig, ServerConfig};
pub use crate::node::server::Server;
