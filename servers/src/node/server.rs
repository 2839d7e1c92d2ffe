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

//! Umbra server implementation, glues the different parts of the system
//! (mostly the peer-to-peer layer, the blockchain, the transaction pool
//! and the consensus engine) and acts as a facade.

use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::common::adapters::{ChainToPoolAdapter, NetToChainAdapter, PoolToChainAdapter};
use crate::common::types::{Error, ServerConfig};
use umbra_chain as chain;
use umbra_consensus::{Consensus, RequestBlock};
use umbra_core::core::hash::Hashed;
use umbra_core::{genesis, global};
use umbra_p2p as p2p;
use umbra_pool as pool;
use umbra_util::{RwLock, StopState};

/// Umbra server holding internal structures.
pub struct Server {
	/// server config
	pub config: ServerConfig,
	/// handle to our network server
	pub p2p: Arc<p2p::Server>,
	/// data store access
	pub chain: Arc<chain::Chain>,
	/// in-memory transaction pool
	pub tx_pool: Arc<RwLock<pool::TransactionPool>>,
	/// the block-ingest coordinator
	pub net_adapter: Arc<NetToChainAdapter>,
	/// the consensus engine deciding block finality; the coordinator only
	/// keeps a weak handle, the server owns it
	pub engine: Arc<dyn Consensus>,
	/// Stop flag
	pub stop_state: Arc<StopState>,
	p2p_thread: Option<JoinHandle<()>>,
	sweep_thread: Option<JoinHandle<()>>,
}

impl Server {
	/// Instantiates and starts a new server. The consensus engine is
	/// built by the provided factory, which receives the request-block
	/// hook the engine must use to pull blocks it has only heard of.
	pub fn new<F>(config: ServerConfig, engine_factory: F) -> Result<Server, Error>
	where
		F: FnOnce(RequestBlock) -> Arc<dyn Consensus>,
	{
		global::set_chain_type(config.chain_type);
		let stop_state = Arc::new(StopState::new());

		let genesis = genesis::genesis();
		info!(
			"starting server on {:?}, genesis {}",
			config.chain_type,
			genesis.hash()
		);

		let pool_adapter = Arc::new(PoolToChainAdapter::new());
		let tx_pool = Arc::new(RwLock::new(pool::TransactionPool::new(
			config.pool_config.clone(),
			pool_adapter.clone(),
		)));

		let chain_adapter = Arc::new(ChainToPoolAdapter::new(tx_pool.clone()));
		let shared_chain = Arc::new(chain::Chain::init(
			genesis.clone(),
			Arc::new(chain::MemStore::new()),
			chain_adapter,
		)?);
		pool_adapter.set_chain(shared_chain.clone());

		let net_adapter = Arc::new(NetToChainAdapter::new(
			shared_chain.clone(),
			tx_pool.clone(),
			config.policy_config.clone(),
			stop_state.clone(),
		));

		let p2p_server = Arc::new(p2p::Server::new(
			config.p2p_config.clone(),
			genesis.hash(),
			net_adapter.clone(),
			stop_state.clone(),
		));

		// give the engine its narrow hook back into the coordinator; the
		// coordinator in turn gets the engine, closing the controlled
		// cycle without either holding a full reference to the other
		let hook_adapter = net_adapter.clone();
		let request_block: RequestBlock =
			Arc::new(move |h, peer| hook_adapter.request_block(h, peer));
		let engine = engine_factory(request_block);
		net_adapter.init(p2p_server.peers.clone(), engine.clone());

		let p2p_inner = p2p_server.clone();
		let p2p_thread = thread::Builder::new()
			.name("p2p-server".to_string())
			.spawn(move || {
				if let Err(e) = p2p_inner.listen() {
					error!("p2p server failed: {:?}", e);
				}
			})?;

		let sweep_adapter = net_adapter.clone();
		let sweep_stop = stop_state.clone();
		let sweep_interval = Duration::from_secs(config.policy_config.sweep_interval_secs);
		let sweep_thread = thread::Builder::new()
			.name("sweeper".to_string())
			.spawn(move || {
				// sleep in short ticks so a stop request isn't held up by
				// a full sweep interval
				let tick = Duration::from_millis(500);
				let mut slept = Duration::from_secs(0);
				while !sweep_stop.is_stopped() {
					thread::sleep(tick);
					slept += tick;
					if slept >= sweep_interval {
						sweep_adapter.sweep();
						slept = Duration::from_secs(0);
					}
				}
			})?;

		Ok(Server {
			config,
			p2p: p2p_server,
			chain: shared_chain,
			tx_pool,
			net_adapter,
			engine,
			stop_state,
			p2p_thread: Some(p2p_thread),
			sweep_thread: Some(sweep_thread),
		})
	}

	/// Stops the server, every subsystem winds down on its next poll of
	/// the stop state.
	pub fn stop(mut self) {
		self.stop_state.stop();
		self.p2p.stop();
		if let Some(h) = self.p2p_thread.take() {
			let _ = h.join();
		}
		if let Some(h) = self.sweep_thread.take() {
			let _ = h.join();
		}
		info!("server stopped");
	}
}
