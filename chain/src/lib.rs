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

//! The chain view of the node: the block validation pipeline, the
//! connected-chain store and the connect logic. The persistent datastore
//! itself hides behind the `ChainStore` trait, connecting a block is the
//! only durable effect of the ingest pipeline.

#![deny(non_upper_case_globals)]
#![deny(non_camel_case_types)]
#![deny(non_snake_case)]
#![deny(unused_mut)]
#![warn(missing_docs)]

#[macro_use]
extern crate bitflags;
#[macro_use]
extern crate serde_derive;
#[macro_use]
extern crate log;
#[macro_use]
extern crate failure_derive;

mod chain;
mod error;
pub mod pipe;
pub mod store;
pub mod types;

pub use crate::chain::Chain;
pub use crate::error::{Error, ErrorKind};
pub use crate::store::{ChainStore, MemStore};
pub use crate::types::{ChainAdapter, NoopAdapter, Options, Tip};
