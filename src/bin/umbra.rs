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

//! Main entry point for the umbra node.

#[macro_use]
extern crate log;

use clap::{App, Arg};
use std::sync::mpsc::channel;
use std::sync::Arc;

use umbra_config as config;
use umbra_consensus::SoloEngine;
use umbra_servers::Server;
use umbra_util::init_logger;

fn main() {
	let args = App::new("Umbra")
		.version("0.1.0")
		.author("The Umbra Team")
		.about("Lightweight implementation of the umbra protocol.")
		.arg(
			Arg::with_name("config")
				.short("c")
				.long("config")
				.help("Path to the configuration file")
				.takes_value(true),
		)
		.get_matches();

	let global_config = match config::initial_setup_server(args.value_of("config")) {
		Ok(c) => c,
		Err(e) => {
			eprintln!("error loading configuration: {}", e);
			std::process::exit(1);
		}
	};

	init_logger(global_config.logging.clone());
	info!(
		"using configuration file: {:?}",
		global_config.config_file_path
	);

	// run with the solo engine until an external avalanche engine is
	// wired in; it finalizes every valid block immediately
	let server = match Server::new(global_config.server.clone(), |_request_block| {
		Arc::new(SoloEngine)
	}) {
		Ok(s) => s,
		Err(e) => {
			error!("failed to start server: {:?}", e);
			std::process::exit(1);
		}
	};

	// block the main thread until a termination signal comes in
	let (signal_tx, signal_rx) = channel();
	ctrlc::set_handler(move || {
		let _ = signal_tx.send(());
	})
	.expect("failed to register signal handler");

	info!("umbra node started, ctrl-c to stop");
	let _ = signal_rx.recv();

	warn!("shutdown signal received, stopping");
	server.stop();
}
