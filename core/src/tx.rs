//! Unsigned transaction drafts.
//!
//! A [`TxDraft`] is the fluent assembly of explicit inputs (with context
//! extensions), raw outputs (with canonical registers), and the miner-fee
//! output, rendered into the node's unsigned-transaction JSON. Drafts are
//! inert: building twice against the same head is side-effect free, and
//! nothing leaves the process until the signed result is submitted.

use serde_json::{json, Map, Value};
use std::collections::BTreeMap;

use crate::crypto::curve::blake2b256;
use crate::node::ChainToken;
use crate::state::registers::{byte_coll, RegisterValue};

/// Minimum miner fee.
pub const MIN_FEE: u64 = 1_100_000;

/// Native value an intent box must carry: its own dust minimum plus the
/// sweep fee it funds.
pub const INTENT_VALUE: u64 = crate::state::pool::MIN_BOX_VALUE + MIN_FEE;

/// The standard miner-fee contract.
pub const FEE_SCRIPT: &str = "1005040004000e36100204a00b08cd0279be667ef9dcbbac55a06295ce870b\
07029bfcdb2dce28d959f2815b16f81798ea02d192a39a8cc7a70173007301\
1001020402d19683030193a38cc7b2a57300000193c2b2a5730100747302\
7303830108cdeeac93b1a57304";

#[derive(Clone, Debug, Default)]
pub struct TxInput {
    pub box_id: String,
    /// Context-extension variables: id → opaque payload, wrapped as a
    /// `Coll[Byte]` constant on the wire.
    pub extension: BTreeMap<u8, Vec<u8>>,
    /// Raw serialized box bytes for the signer's `inputsRaw`.
    pub raw_bytes: Option<String>,
}

#[derive(Clone, Debug)]
pub struct TxOutput {
    pub script: String,
    pub value: u64,
    pub tokens: Vec<ChainToken>,
    pub registers: Vec<(String, RegisterValue)>,
}

#[derive(Clone, Debug, Default)]
pub struct TxDraft {
    inputs: Vec<TxInput>,
    data_inputs: Vec<String>,
    outputs: Vec<TxOutput>,
    fee: u64,
}

impl TxDraft {
    pub fn new() -> Self {
        Self { fee: MIN_FEE, ..Self::default() }
    }

    /// Add an explicit input with optional context-extension variables.
    pub fn with_input(
        mut self,
        box_id: &str,
        raw_bytes: Option<String>,
        extension: BTreeMap<u8, Vec<u8>>,
    ) -> Self {
        self.inputs.push(TxInput { box_id: box_id.to_string(), extension, raw_bytes });
        self
    }

    /// Add a read-only data input.
    pub fn with_data_input(mut self, box_id: &str) -> Self {
        self.data_inputs.push(box_id.to_string());
        self
    }

    pub fn add_output(
        mut self,
        script: &str,
        value: u64,
        tokens: Vec<ChainToken>,
        registers: Vec<(String, RegisterValue)>,
    ) -> Self {
        self.outputs.push(TxOutput { script: script.to_string(), value, tokens, registers });
        self
    }

    pub fn with_fee(mut self, fee: u64) -> Self {
        self.fee = fee;
        self
    }

    /// Attach a context-extension variable to an existing input. Used when
    /// a payload (the ring bundle) must bind the otherwise-complete draft.
    pub fn set_extension_var(mut self, input_index: usize, id: u8, payload: Vec<u8>) -> Self {
        if let Some(input) = self.inputs.get_mut(input_index) {
            input.extension.insert(id, payload);
        }
        self
    }

    /// The draft without one extension variable: what the binding message
    /// was computed over before that payload was attached.
    pub fn strip_extension_var(mut self, input_index: usize, id: u8) -> Self {
        if let Some(input) = self.inputs.get_mut(input_index) {
            input.extension.remove(&id);
        }
        self
    }

    pub fn inputs(&self) -> &[TxInput] {
        &self.inputs
    }

    pub fn outputs(&self) -> &[TxOutput] {
        &self.outputs
    }

    pub fn fee(&self) -> u64 {
        self.fee
    }

    /// Raw bytes of every input that carries them, in input order.
    pub fn inputs_raw(&self) -> Vec<String> {
        self.inputs.iter().filter_map(|input| input.raw_bytes.clone()).collect()
    }

    /// Render the unsigned transaction in the node API format. The fee
    /// output is appended last.
    pub fn to_unsigned_json(&self, creation_height: u32) -> Value {
        let inputs: Vec<Value> = self
            .inputs
            .iter()
            .map(|input| {
                let extension: Map<String, Value> = input
                    .extension
                    .iter()
                    .map(|(id, payload)| {
                        (id.to_string(), Value::String(hex::encode(byte_coll(payload))))
                    })
                    .collect();
                json!({
                    "boxId": input.box_id,
                    "spendingProof": { "proofBytes": "", "extension": extension },
                })
            })
            .collect();

        let data_inputs: Vec<Value> =
            self.data_inputs.iter().map(|id| json!({ "boxId": id })).collect();

        let mut outputs: Vec<Value> = self
            .outputs
            .iter()
            .map(|output| {
                let registers: Map<String, Value> = output
                    .registers
                    .iter()
                    .map(|(name, value)| (name.clone(), Value::String(value.encode_hex())))
                    .collect();
                let assets: Vec<Value> = output
                    .tokens
                    .iter()
                    .map(|token| json!({ "tokenId": token.token_id, "amount": token.amount }))
                    .collect();
                json!({
                    "value": output.value,
                    "ergoTree": output.script,
                    "creationHeight": creation_height,
                    "assets": assets,
                    "additionalRegisters": registers,
                })
            })
            .collect();

        outputs.push(json!({
            "value": self.fee,
            "ergoTree": FEE_SCRIPT,
            "creationHeight": creation_height,
            "assets": [],
            "additionalRegisters": {},
        }));

        json!({
            "inputs": inputs,
            "dataInputs": data_inputs,
            "outputs": outputs,
        })
    }

    /// The transaction-binding message folded into ring challenges: the
    /// protocol hash of the canonical unsigned form. Deterministic for a
    /// given draft and height.
    pub fn binding_message(&self, creation_height: u32) -> [u8; 32] {
        let rendered = self.to_unsigned_json(creation_height).to_string();
        blake2b256(&[rendered.as_bytes()])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn draft() -> TxDraft {
        let mut extension = BTreeMap::new();
        extension.insert(0u8, vec![0xaa, 0xbb]);
        TxDraft::new()
            .with_input("pool", None, extension)
            .add_output("1005", 1_000_000, vec![], vec![("R6".into(), RegisterValue::Long(100))])
    }

    #[test]
    fn unsigned_json_shape() {
        let rendered = draft().to_unsigned_json(500);
        assert_eq!(rendered["inputs"][0]["boxId"], "pool");
        // Extension payloads are Coll[Byte]-wrapped: tag 0x0e, VLQ length.
        assert_eq!(rendered["inputs"][0]["spendingProof"]["extension"]["0"], "0e02aabb");
        assert_eq!(rendered["outputs"][0]["additionalRegisters"]["R6"], "05c801");
        // Fee output is always last.
        let outputs = rendered["outputs"].as_array().unwrap();
        assert_eq!(outputs.last().unwrap()["value"], MIN_FEE);
        assert_eq!(outputs.last().unwrap()["ergoTree"], FEE_SCRIPT);
    }

    #[test]
    fn binding_message_is_deterministic() {
        assert_eq!(draft().binding_message(500), draft().binding_message(500));
        assert_ne!(draft().binding_message(500), draft().binding_message(501));
    }
}
