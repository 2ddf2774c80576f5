// This file is part of btc-indexer.
// Copyright (C) 2026 darkknightbk52
// SPDX-License-Identifier: Apache-2.0
// Licensed under the Apache License, Version 2.0 (the "License");
// You may not use this file except in compliance with the License.
// You may obtain a copy of the License at
// http://www.apache.org/licenses/LICENSE-2.0
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Pure, stateless mapping from a spent or created script to an address
//! string, or the [`NON_STANDARD_ADDRESS`] sentinel when extraction fails.
//! Never consults the database or network.

use bitcoin::{
    Address, Network, ScriptBuf,
    hashes::{Hash, hash160},
};
use indexer_common::domain::NON_STANDARD_ADDRESS;
use log::debug;
use thiserror::Error;

/// Derives the address implied by an input's signature script and witness,
/// i.e. the address of the output it spends. Returns
/// [`NON_STANDARD_ADDRESS`] if the script shape isn't recognized.
pub fn extract_from_tx_in(signature_script: &[u8], witness: &[Vec<u8>], network: Network) -> String {
    match compute_input_address(signature_script, witness, network) {
        Ok(address) => address.to_string(),
        Err(err) => {
            debug!(err:err = err; "non-standard tx_in");
            NON_STANDARD_ADDRESS.to_owned()
        }
    }
}

/// Extracts the address an output's `pk_script` pays to, under `network`.
/// Returns [`NON_STANDARD_ADDRESS`] if the script isn't a recognized
/// standard output type.
pub fn extract_from_tx_out(pk_script: &[u8], network: Network) -> String {
    let script = ScriptBuf::from(pk_script.to_vec());
    match Address::from_script(&script, network) {
        Ok(address) => address.to_string(),
        Err(err) => {
            debug!(err:err = err; "non-standard tx_out");
            NON_STANDARD_ADDRESS.to_owned()
        }
    }
}

#[derive(Debug, Error)]
enum ExtractError {
    #[error("empty signature script and witness")]
    Empty,

    #[error("unrecognized script shape")]
    Unrecognized,

    #[error("invalid redeem script")]
    InvalidRedeemScript(#[from] bitcoin::address::P2shError),
}

fn compute_input_address(
    signature_script: &[u8],
    witness: &[Vec<u8>],
    network: Network,
) -> Result<Address, ExtractError> {
    if signature_script.is_empty() && witness.is_empty() {
        return Err(ExtractError::Empty);
    }

    // A two-item witness [signature, compressed_pubkey] implies P2WPKH.
    if let [_signature, pubkey] = witness {
        if pubkey.len() == 33 {
            let pubkey = bitcoin::CompressedPublicKey::from_slice(pubkey)
                .map_err(|_| ExtractError::Unrecognized)?;
            return Ok(Address::p2wpkh(&pubkey, network));
        }
    }

    // Any other non-empty witness: the last item is conventionally the witness script (P2WSH).
    if let Some(witness_script) = witness.last() {
        let script = ScriptBuf::from(witness_script.clone());
        return Ok(Address::p2wsh(&script, network));
    }

    let pushes = script_pushes(signature_script)?;

    // A two-push scriptSig [signature, pubkey] implies P2PKH.
    if let [_signature, pubkey_bytes] = pushes.as_slice() {
        if pubkey_bytes.len() == 33 || pubkey_bytes.len() == 65 {
            let pubkey_hash = bitcoin::PubkeyHash::from_raw_hash(hash160::Hash::hash(pubkey_bytes));
            return Ok(Address::p2pkh(pubkey_hash, network));
        }
    }

    // Otherwise, the last push is conventionally the redeem script (P2SH).
    if let Some(redeem_script) = pushes.last() {
        let script = ScriptBuf::from(redeem_script.clone());
        return Ok(Address::p2sh(&script, network)?);
    }

    Err(ExtractError::Unrecognized)
}

/// Decomposes a script into its pushed byte sequences, ignoring
/// non-push opcodes. Not a general-purpose script interpreter.
fn script_pushes(script: &[u8]) -> Result<Vec<Vec<u8>>, ExtractError> {
    let script = bitcoin::Script::from_bytes(script);
    let mut pushes = Vec::new();

    for instruction in script.instructions() {
        if let bitcoin::script::Instruction::PushBytes(bytes) = instruction.map_err(|_| ExtractError::Unrecognized)? {
            pushes.push(bytes.as_bytes().to_vec());
        }
    }

    if pushes.is_empty() {
        Err(ExtractError::Unrecognized)
    } else {
        Ok(pushes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_input_is_non_standard() {
        assert_eq!(extract_from_tx_in(&[], &[], Network::Bitcoin), NON_STANDARD_ADDRESS);
    }

    #[test]
    fn p2wpkh_witness_resolves_to_an_address() {
        let pubkey = hex::decode(
            "0279be667ef9dcbbac55a06295ce870b07029bfcdb2dce28d959f2815b16f81798",
        )
        .unwrap();
        let witness = vec![vec![0u8; 71], pubkey];
        let address = extract_from_tx_in(&[], &witness, Network::Bitcoin);
        assert_ne!(address, NON_STANDARD_ADDRESS);
        assert!(address.starts_with("bc1q"));
    }

    #[test]
    fn p2pkh_output_script_resolves_to_an_address() {
        let pubkey_hash = hash160::Hash::hash(&[2u8; 33]);
        let script = ScriptBuf::new_p2pkh(&pubkey_hash.into());
        let address = extract_from_tx_out(script.as_bytes(), Network::Bitcoin);
        assert_ne!(address, NON_STANDARD_ADDRESS);
        assert!(address.starts_with('1'));
    }

    #[test]
    fn op_return_output_is_non_standard() {
        let script = vec![0x6a]; // OP_RETURN, no payload
        let address = extract_from_tx_out(&script, Network::Bitcoin);
        assert_eq!(address, NON_STANDARD_ADDRESS);
    }
}
