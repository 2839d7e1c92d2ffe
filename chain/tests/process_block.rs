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

mod chain_test_helper;

use self::chain_test_helper::{build_block, build_block_on, init_chain, standard_tx};
use umbra_chain::{ErrorKind, Options};
use umbra_core::core::hash::{Hash, Hashed};
use umbra_core::core::tx_merkle_root;
use umbra_core::genesis;
use umbra_util as util;

#[test]
fn init_connects_genesis() {
	util::init_test_logger();
	let chain = init_chain();
	let head = chain.head().unwrap();
	assert_eq!(head.height, 0);
	assert_eq!(head.last_block_h, genesis::genesis_dev().hash());
	assert!(chain.block_exists(&head.last_block_h).unwrap());
}

#[test]
fn genesis_self_reference_is_enforced() {
	util::init_test_logger();
	let mut gen = genesis::genesis_dev();
	// tamper with the stake's self-referential txo root
	if let umbra_core::core::Transaction::Stake(ref mut stake) = gen.txs[1] {
		stake.txo_root = Hash::from_vec(&[0xde; 32]);
	}
	gen.header.tx_root = tx_merkle_root(&gen.txs);

	let res = umbra_chain::Chain::init(
		gen,
		std::sync::Arc::new(umbra_chain::MemStore::new()),
		std::sync::Arc::new(umbra_chain::NoopAdapter {}),
	);
	match res {
		Err(e) => assert_eq!(e.kind(), ErrorKind::InvalidGenesis),
		Ok(_) => panic!("tampered genesis must not connect"),
	}
}

#[test]
fn next_block_connects() {
	util::init_test_logger();
	let chain = init_chain();
	let b1 = build_block(&chain, vec![standard_tx(1)]);

	chain.check_connect_block(&b1).unwrap();
	chain.connect_block(&b1, Options::NONE).unwrap();

	let head = chain.head().unwrap();
	assert_eq!(head.height, 1);
	assert_eq!(head.last_block_h, b1.hash());
}

#[test]
fn connect_is_idempotent() {
	util::init_test_logger();
	let chain = init_chain();
	let b1 = build_block(&chain, vec![]);
	chain.connect_block(&b1, Options::NONE).unwrap();
	// connecting the exact same block again is a no-op
	chain.connect_block(&b1, Options::NONE).unwrap();
	assert_eq!(chain.head().unwrap().height, 1);
}

#[test]
fn far_ahead_block_is_an_orphan() {
	util::init_test_logger();
	let chain = init_chain();
	let head = chain.head().unwrap();
	// height 2 on an empty chain, parent nowhere to be found
	let b1 = build_block(&chain, vec![]);
	let b2 = build_block_on(b1.hash(), 1, head.timestamp + 60, vec![]);

	let res = chain.check_connect_block(&b2);
	assert_eq!(res.unwrap_err().kind(), ErrorKind::Orphan);
}

#[test]
fn unknown_parent_is_an_orphan() {
	util::init_test_logger();
	let chain = init_chain();
	let head = chain.head().unwrap();
	let b = build_block_on(Hash::from_vec(&[0xaa; 32]), head.height, head.timestamp, vec![]);
	assert_eq!(
		chain.check_connect_block(&b).unwrap_err().kind(),
		ErrorKind::Orphan
	);
}

#[test]
fn stale_parent_does_not_connect() {
	util::init_test_logger();
	let chain = init_chain();
	let genesis_head = chain.head().unwrap();

	let b1 = build_block(&chain, vec![standard_tx(1)]);
	chain.connect_block(&b1, Options::NONE).unwrap();

	// a competing block at height 1: parent (genesis) is known but the
	// chain has moved on
	let b1_rival = build_block_on(
		genesis_head.last_block_h,
		genesis_head.height,
		genesis_head.timestamp + 5,
		vec![standard_tx(2)],
	);
	assert_eq!(
		chain.check_connect_block(&b1_rival).unwrap_err().kind(),
		ErrorKind::DoesNotConnect
	);
}

#[test]
fn tampered_tx_root_is_flagged() {
	util::init_test_logger();
	let chain = init_chain();
	let mut b1 = build_block(&chain, vec![standard_tx(1)]);
	b1.header.tx_root = Hash::from_vec(&[0xbb; 32]);
	assert_eq!(
		chain.check_connect_block(&b1).unwrap_err().kind(),
		ErrorKind::InvalidTxRoot
	);
}

#[test]
fn missing_coinbase_is_a_rule_error() {
	util::init_test_logger();
	let chain = init_chain();
	let mut b1 = build_block(&chain, vec![standard_tx(1)]);
	// strip the coinbase and recommit the root so only the coinbase rule
	// trips
	b1.txs.remove(0);
	b1.header.tx_root = tx_merkle_root(&b1.txs);
	let e = chain.check_connect_block(&b1).unwrap_err();
	assert_eq!(e.kind(), ErrorKind::InvalidCoinbase);
	assert!(e.is_bad_data());
}

#[test]
fn duplicate_nullifier_in_block_is_rejected() {
	util::init_test_logger();
	let chain = init_chain();
	let b1 = build_block(&chain, vec![standard_tx(9), standard_tx(9)]);
	// two identical standard txs share a nullifier and a txid, the merkle
	// root still commits to both positions
	match chain.check_connect_block(&b1).unwrap_err().kind() {
		ErrorKind::DoubleSpend(_) => {}
		k => panic!("expected DoubleSpend, got {:?}", k),
	}
}

#[test]
fn spent_nullifier_is_rejected_across_blocks() {
	util::init_test_logger();
	let chain = init_chain();
	let b1 = build_block(&chain, vec![standard_tx(5)]);
	chain.connect_block(&b1, Options::NONE).unwrap();

	// same nullifier again in the next block
	let b2 = build_block(&chain, vec![standard_tx(5)]);
	match chain.check_connect_block(&b2).unwrap_err().kind() {
		ErrorKind::DoubleSpend(_) => {}
		k => panic!("expected DoubleSpend, got {:?}", k),
	}
}

#[test]
fn timestamp_regression_is_rejected() {
	util::init_test_logger();
	let chain = init_chain();
	let head = chain.head().unwrap();
	let mut b1 = build_block(&chain, vec![]);
	b1.header.timestamp = chrono::TimeZone::timestamp(&chrono::Utc, head.timestamp - 61, 0);
	b1.header.tx_root = tx_merkle_root(&b1.txs);
	assert_eq!(
		chain.check_connect_block(&b1).unwrap_err().kind(),
		ErrorKind::InvalidBlockTime
	);
}

#[test]
fn wrong_version_is_rejected() {
	util::init_test_logger();
	let chain = init_chain();
	let mut b1 = build_block(&chain, vec![]);
	b1.header.version = 9;
	assert_eq!(
		chain.check_connect_block(&b1).unwrap_err().kind(),
		ErrorKind::InvalidBlockVersion(9)
	);
}

#[test]
fn missing_signature_is_rejected() {
	util::init_test_logger();
	let chain = init_chain();
	let mut b1 = build_block(&chain, vec![]);
	b1.header.signature = vec![];
	assert_eq!(
		chain.check_connect_block(&b1).unwrap_err().kind(),
		ErrorKind::InvalidBlockSignature
	);
}

#[test]
fn get_block_reads_connected_chain_only() {
	util::init_test_logger();
	let chain = init_chain();
	let b1 = build_block(&chain, vec![]);
	assert_eq!(
		chain.get_block(&b1.hash()).unwrap_err().kind(),
		ErrorKind::NotFound
	);
	chain.connect_block(&b1, Options::NONE).unwrap();
	assert_eq!(chain.get_block(&b1.hash()).unwrap().hash(), b1.hash());
	assert_eq!(chain.get_hash_by_height(1).unwrap(), b1.hash());
}
