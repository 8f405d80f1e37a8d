//! End-to-end scenario tests over an in-memory node.
//!
//! These exercise the full client/relayer pipeline against mock chain
//! state: deposits growing the ring, sweeps advancing the head, withdrawals
//! spending nullifiers, and every build-time rejection the state machine
//! promises.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use serde_json::Value;

use crate::client::{PoolClient, PrivacyScore, RiskFlag};
use crate::crypto::curve::{nums_h, random_scalar, Point};
use crate::crypto::pedersen;
use crate::crypto::ring::{nullifier, verify_ring_witness};
use crate::error::{Error, Result, ValidationError};
use crate::node::{ChainBox, ChainToken, NodeApi, RegisterBytes};
use crate::relayer::{DepositBatcher, PoolHead, WithdrawalProcessor};
use crate::state::pool::{DepositIntent, NullifierState, PoolBox, MIN_BOX_VALUE};
use crate::state::registers::RegisterValue;
use crate::tx::{TxDraft, INTENT_VALUE};

const POOL_SCRIPT: &str = "1005aabbcc";
const TOKEN_ID: &str = "00cafe00";
const DENOM: u64 = 100;

// ---------------------------------------------------------------------------
// Mock node
// ---------------------------------------------------------------------------

struct MockNode {
    boxes: Mutex<HashMap<String, ChainBox>>,
    height: u32,
    submitted: Mutex<Vec<Value>>,
}

impl MockNode {
    fn new(height: u32) -> Self {
        Self { boxes: Mutex::new(HashMap::new()), height, submitted: Mutex::new(Vec::new()) }
    }

    fn put(&self, chain_box: ChainBox) {
        self.boxes.lock().unwrap().insert(chain_box.box_id.clone(), chain_box);
    }
}

impl NodeApi for MockNode {
    fn get_height(&self) -> Result<u32> {
        Ok(self.height)
    }

    fn get_box_by_id(&self, box_id: &str) -> Result<Option<ChainBox>> {
        Ok(self.boxes.lock().unwrap().get(box_id).cloned())
    }

    fn get_unspent_boxes(&self, _address: &str, _limit: usize) -> Result<Vec<ChainBox>> {
        Ok(vec![])
    }

    fn get_boxes_by_script(&self, script_hex: &str, limit: usize) -> Result<Vec<ChainBox>> {
        let mut matched: Vec<ChainBox> = self
            .boxes
            .lock()
            .unwrap()
            .values()
            .filter(|chain_box| chain_box.ergo_tree == script_hex)
            .cloned()
            .collect();
        matched.sort_by(|a, b| a.box_id.cmp(&b.box_id));
        matched.truncate(limit);
        Ok(matched)
    }

    fn submit(&self, signed_tx: &Value) -> Result<String> {
        self.submitted.lock().unwrap().push(signed_tx.clone());
        Ok(format!("tx-{}", self.submitted.lock().unwrap().len()))
    }
}

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

fn register(value: RegisterValue) -> RegisterBytes {
    RegisterBytes::Raw(value.encode_hex())
}

fn pool_chain_box(
    box_id: &str,
    keys: &[Point],
    nullifiers: &NullifierState,
    token_amount: u64,
    max_ring: u32,
) -> ChainBox {
    let mut registers = HashMap::new();
    registers.insert("R4".into(), register(RegisterValue::PointColl(keys.to_vec())));
    registers.insert("R5".into(), register(nullifiers.to_register()));
    registers.insert("R6".into(), register(RegisterValue::Long(DENOM as i64)));
    registers.insert("R7".into(), register(RegisterValue::Int(max_ring as i32)));
    ChainBox {
        box_id: box_id.into(),
        value: MIN_BOX_VALUE,
        ergo_tree: POOL_SCRIPT.into(),
        creation_height: 100,
        assets: vec![ChainToken { token_id: TOKEN_ID.into(), amount: token_amount }],
        additional_registers: registers,
        bytes: Some(format!("raw-{box_id}")),
    }
}

/// Replay a draft's successor pool output into a fresh chain box, as a
/// confirmed sweep would.
fn advance_pool(draft: &TxDraft, new_box_id: &str) -> ChainBox {
    let pool_out = &draft.outputs()[0];
    let mut registers = HashMap::new();
    for (name, value) in &pool_out.registers {
        registers.insert(name.clone(), register(value.clone()));
    }
    ChainBox {
        box_id: new_box_id.into(),
        value: pool_out.value,
        ergo_tree: pool_out.script.clone(),
        creation_height: 101,
        assets: pool_out.tokens.clone(),
        additional_registers: registers,
        bytes: Some(format!("raw-{new_box_id}")),
    }
}

fn deposit_secret(client: &PoolClient) -> crate::client::DepositSecret {
    client.create_deposit(DENOM, TOKEN_ID).unwrap()
}

fn intent_for(secret: &crate::client::DepositSecret, box_id: &str) -> DepositIntent {
    DepositIntent {
        box_id: box_id.into(),
        value: INTENT_VALUE,
        commitment: secret.commitment,
        token: Some(ChainToken { token_id: TOKEN_ID.into(), amount: DENOM }),
        script: "10ab".into(),
        raw_bytes: Some(format!("raw-{box_id}")),
    }
}

fn setup(keys: &[Point], nullifiers: NullifierState, token_amount: u64, max_ring: u32)
    -> (Arc<MockNode>, PoolClient)
{
    let node = Arc::new(MockNode::new(200));
    node.put(pool_chain_box("pool-1", keys, &nullifiers, token_amount, max_ring));
    let client = PoolClient::new(node.clone(), POOL_SCRIPT);
    (node, client)
}

// ---------------------------------------------------------------------------
// Scenario S1: batch deposit sweep of three fresh keys
// ---------------------------------------------------------------------------

#[test]
fn s1_empty_pool_three_deposit_sweep() {
    let (_node, client) = setup(&[], NullifierState::List(vec![]), 0, 16);

    let secrets = [deposit_secret(&client), deposit_secret(&client), deposit_secret(&client)];
    let intents = [
        intent_for(&secrets[0], "intent-1"),
        intent_for(&secrets[1], "intent-2"),
        intent_for(&secrets[2], "intent-3"),
    ];

    let pool = PoolBox::parse(&pool_chain_box("pool-1", &[], &NullifierState::List(vec![]), 0, 16))
        .unwrap();
    let head = PoolHead::of(&pool);
    let sweep = DepositBatcher::new(pool).build_batch(&intents).unwrap();

    assert_eq!(sweep.batch_size, 3);
    let successor = advance_pool(&sweep.draft, "pool-2");
    let parsed = PoolBox::parse(&successor).unwrap();
    assert_eq!(
        parsed.depositor_keys,
        vec![secrets[0].commitment, secrets[1].commitment, secrets[2].commitment]
    );
    assert_eq!(parsed.token.amount, 300);
    assert_eq!(parsed.nullifiers, NullifierState::List(vec![]));
    assert_eq!(parsed.denomination, DENOM);
    assert_eq!(parsed.max_ring, 16);
    assert_eq!(PoolHead::of(&parsed), head.after_deposit_batch(3, DENOM));
}

// ---------------------------------------------------------------------------
// Scenario S2: duplicate key rejected at build time
// ---------------------------------------------------------------------------

#[test]
fn s2_duplicate_key_rejected() {
    let k2 = *pedersen::commit(&random_scalar(&mut rand::rngs::OsRng), DENOM)
        .unwrap()
        .as_point();
    let keys = [
        *pedersen::commit(&random_scalar(&mut rand::rngs::OsRng), DENOM).unwrap().as_point(),
        k2,
        *pedersen::commit(&random_scalar(&mut rand::rngs::OsRng), DENOM).unwrap().as_point(),
    ];
    let (_node, client) = setup(&keys, NullifierState::List(vec![]), 300, 16);

    let result = client.build_deposit("pool-1", &k2);
    assert!(matches!(
        result,
        Err(Error::Validation(ValidationError::DuplicateKey { position: 1 }))
    ));
}

// ---------------------------------------------------------------------------
// Scenarios S3 + S4: withdrawal, then double-spend of the same secret
// ---------------------------------------------------------------------------

#[test]
fn s3_s4_withdraw_then_double_spend() {
    let node = Arc::new(MockNode::new(200));
    let client = PoolClient::new(node.clone(), POOL_SCRIPT);

    let secrets =
        [deposit_secret(&client), deposit_secret(&client), deposit_secret(&client)];
    let keys: Vec<Point> = secrets.iter().map(|s| s.commitment).collect();
    node.put(pool_chain_box("pool-1", &keys, &NullifierState::List(vec![]), 300, 16));

    let recipient = vec![0x00, 0x08, 0xcd, 0x02, 0x11];
    let withdrawal = client.build_withdrawal("pool-1", &secrets[2], &recipient).unwrap();

    // The nullifier is the deterministic image of r3.
    let expected_image = nullifier(&secrets[2].blinding_factor()).unwrap();
    assert_eq!(withdrawal.nullifier, expected_image);

    // The witness satisfies the validator's equation over the live ring.
    // Its binding message is the draft before the bundle was attached.
    let message = withdrawal.draft.clone().strip_extension_var(0, 0).binding_message(200);
    assert!(verify_ring_witness(&withdrawal.witness, DENOM, &message));

    // Successor pool: R4 unchanged, R5 grew by exactly the image, balance
    // down one denomination.
    let successor = advance_pool(&withdrawal.draft, "pool-2");
    let parsed = PoolBox::parse(&successor).unwrap();
    assert_eq!(parsed.depositor_keys, keys);
    assert_eq!(parsed.nullifiers, NullifierState::List(vec![expected_image]));
    assert_eq!(parsed.token.amount, 200);

    // Payout pays exactly one denomination to the recipient script.
    let payout = &withdrawal.draft.outputs()[1];
    assert_eq!(payout.script, hex::encode(&recipient));
    assert_eq!(payout.tokens[0].amount, DENOM);

    // Signer hints expose the DH-tuple (G, H, r·G, I).
    assert_eq!(withdrawal.hints.dht.len(), 1);
    assert_eq!(withdrawal.hints.dht[0].v, expected_image.encode_hex());

    // S4: the same secret against the advanced head is a spent nullifier.
    node.put(successor);
    let result = client.build_withdrawal("pool-2", &secrets[2], &recipient);
    assert!(matches!(result, Err(Error::Validation(ValidationError::NullifierSpent))));
}

// ---------------------------------------------------------------------------
// Scenario S5: protocol constants are banned keys
// ---------------------------------------------------------------------------

#[test]
fn s5_banned_point_rejected() {
    let (_node, client) = setup(&[], NullifierState::List(vec![]), 0, 16);
    for banned in [nums_h(), Point::generator()] {
        let result = client.build_deposit("pool-1", &banned);
        assert!(matches!(
            result,
            Err(Error::Validation(ValidationError::BannedPoint { .. }))
        ));
    }
}

// ---------------------------------------------------------------------------
// Scenario S6: capacity
// ---------------------------------------------------------------------------

#[test]
fn s6_full_pool_rejects_deposit() {
    let keys = [
        *pedersen::commit(&random_scalar(&mut rand::rngs::OsRng), DENOM).unwrap().as_point(),
        *pedersen::commit(&random_scalar(&mut rand::rngs::OsRng), DENOM).unwrap().as_point(),
    ];
    let (_node, client) = setup(&keys, NullifierState::List(vec![]), 200, 2);
    let fresh = deposit_secret(&client);
    let result = client.build_deposit("pool-1", &fresh.commitment);
    assert!(matches!(result, Err(Error::Capacity { used: 2, max: 2 })));
}

// ---------------------------------------------------------------------------
// Pool scanning and selection
// ---------------------------------------------------------------------------

#[test]
fn select_best_pool_prefers_largest_ring() {
    let node = Arc::new(MockNode::new(200));
    let client = PoolClient::new(node.clone(), POOL_SCRIPT);

    let mut keys = Vec::new();
    for _ in 0..8 {
        keys.push(*pedersen::commit(&random_scalar(&mut rand::rngs::OsRng), DENOM)
            .unwrap()
            .as_point());
    }
    node.put(pool_chain_box("pool-big", &keys[..8], &NullifierState::List(vec![]), 800, 16));
    node.put(pool_chain_box("pool-small", &keys[..2], &NullifierState::List(vec![]), 200, 16));
    node.put(pool_chain_box("pool-full", &keys[..2], &NullifierState::List(vec![]), 200, 2));

    let best = client.select_best_pool(DENOM).unwrap().unwrap();
    assert_eq!(best.pool_id, "pool-big");

    let pools = client.list_pools(DENOM).unwrap();
    assert_eq!(pools.len(), 3);
    assert!(pools.iter().any(|p| p.pool_id == "pool-full" && p.is_full));
}

#[test]
fn select_best_pool_none_when_all_full() {
    let keys = [
        *pedersen::commit(&random_scalar(&mut rand::rngs::OsRng), DENOM).unwrap().as_point(),
        *pedersen::commit(&random_scalar(&mut rand::rngs::OsRng), DENOM).unwrap().as_point(),
    ];
    let (_node, client) = setup(&keys, NullifierState::List(vec![]), 200, 2);
    assert!(client.select_best_pool(DENOM).unwrap().is_none());
}

// ---------------------------------------------------------------------------
// Health evaluation
// ---------------------------------------------------------------------------

#[test]
fn health_report_flags_ring_poisoning() {
    let key = *pedersen::commit(&random_scalar(&mut rand::rngs::OsRng), DENOM)
        .unwrap()
        .as_point();
    let keys = [key, key, key];
    let (_node, client) = setup(&keys, NullifierState::List(vec![]), 100, 16);

    let report = client.evaluate_pool_health("pool-1").unwrap();
    assert_eq!(report.ring_size, 3);
    assert_eq!(report.effective_anonymity, 1);
    assert_eq!(report.duplicate_keys, 2);
    assert!(report.risk_flags.iter().any(|f| matches!(f, RiskFlag::DuplicateKeys { count: 2 })));
    assert!(report
        .risk_flags
        .iter()
        .any(|f| matches!(f, RiskFlag::InflatedRing { reported: 3, unique: 1 })));
    assert_eq!(report.score, PrivacyScore::Critical);
}

#[test]
fn health_report_clean_pool_scores_well() {
    let mut keys = Vec::new();
    for _ in 0..12 {
        keys.push(*pedersen::commit(&random_scalar(&mut rand::rngs::OsRng), DENOM)
            .unwrap()
            .as_point());
    }
    let (_node, client) = setup(&keys, NullifierState::List(vec![]), 1200, 16);
    let report = client.evaluate_pool_health("pool-1").unwrap();
    assert!(report.risk_flags.is_empty());
    assert!(report.score >= PrivacyScore::Excellent);
}

// ---------------------------------------------------------------------------
// Resolution and determinism properties
// ---------------------------------------------------------------------------

#[test]
fn missing_pool_is_a_resolution_error() {
    let (_node, client) = setup(&[], NullifierState::List(vec![]), 0, 16);
    let fresh = deposit_secret(&client);
    assert!(matches!(
        client.build_deposit("no-such-pool", &fresh.commitment),
        Err(Error::Resolution(_))
    ));
}

#[test]
fn deposit_draft_is_deterministic_against_one_head() {
    let (_node, client) = setup(&[], NullifierState::List(vec![]), 0, 16);
    let secret = deposit_secret(&client);
    let a = client.build_deposit("pool-1", &secret.commitment).unwrap();
    let b = client.build_deposit("pool-1", &secret.commitment).unwrap();
    assert_eq!(a.to_unsigned_json(200), b.to_unsigned_json(200));
}

#[test]
fn fresh_deposits_use_fresh_randomness() {
    let (_node, client) = setup(&[], NullifierState::List(vec![]), 0, 16);
    let a = deposit_secret(&client);
    let b = deposit_secret(&client);
    assert_ne!(a.commitment, b.commitment);
}

// ---------------------------------------------------------------------------
// View keys and intent outputs
// ---------------------------------------------------------------------------

#[test]
fn view_key_discloses_exactly_one_deposit() {
    let (_node, client) = setup(&[], NullifierState::List(vec![]), 0, 16);
    let secret = deposit_secret(&client);
    let view_key = PoolClient::export_view_key(&secret);

    assert!(PoolClient::verify_view_key(
        &view_key.commitment_hex,
        &view_key.blinding_factor_hex,
        DENOM
    ));
    assert!(!PoolClient::verify_view_key(
        &view_key.commitment_hex,
        &view_key.blinding_factor_hex,
        DENOM + 1
    ));
}

#[test]
fn intent_outputs_carry_canonical_registers() {
    let (_node, client) = setup(&[], NullifierState::List(vec![]), 0, 16);
    let secret = deposit_secret(&client);

    let deposit = client.deposit_intent_output(&secret, "10ab");
    assert_eq!(deposit.tokens[0].amount, DENOM);
    match &deposit.registers[0] {
        (name, RegisterValue::GroupElement(point)) => {
            assert_eq!(name, "R4");
            assert_eq!(*point, secret.commitment);
        }
        other => panic!("unexpected register {other:?}"),
    }

    let image = nullifier(&secret.blinding_factor()).unwrap();
    let withdraw = client.withdrawal_intent_output(&image, &[0x00, 0x01], "10cd").unwrap();
    assert_eq!(withdraw.registers.len(), 2);
    assert!(matches!(&withdraw.registers[1], (name, RegisterValue::ByteColl(_)) if name == "R6"));

    // The banned bases never become intent nullifiers.
    assert!(client.withdrawal_intent_output(&nums_h(), &[0x00], "10cd").is_err());
}

// ---------------------------------------------------------------------------
// Withdrawal sweep through the relayer
// ---------------------------------------------------------------------------

#[test]
fn withdrawal_sweep_advances_head_by_one() {
    let node = Arc::new(MockNode::new(200));
    let client = PoolClient::new(node.clone(), POOL_SCRIPT);
    let secret = deposit_secret(&client);
    let keys = vec![secret.commitment];
    node.put(pool_chain_box("pool-1", &keys, &NullifierState::List(vec![]), 100, 16));

    let withdrawal = client.build_withdrawal("pool-1", &secret, &[0x00, 0x01]).unwrap();

    let pool = PoolBox::parse(
        &pool_chain_box("pool-1", &keys, &NullifierState::List(vec![]), 100, 16),
    )
    .unwrap();
    let head = PoolHead::of(&pool);
    let processor = WithdrawalProcessor::new(pool);
    let intent = crate::state::pool::WithdrawIntent {
        box_id: "w-intent".into(),
        value: INTENT_VALUE,
        nullifier: withdrawal.nullifier,
        payout_script: vec![0x00, 0x01],
        script: "10ab".into(),
        raw_bytes: None,
    };
    let bundle = crate::crypto::ring::encode_ring_bundle(&withdrawal.witness);
    let sweep = processor.build_sweep(&intent, bundle).unwrap();

    let successor = advance_pool(&sweep.draft, "pool-2");
    let parsed = PoolBox::parse(&successor).unwrap();
    let next = PoolHead::of(&parsed);
    assert_eq!(next, head.after_withdrawal(DENOM));
    assert!(next.is_terminal());
}
