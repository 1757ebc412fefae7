//! Integration tests for the permit signing path.
//!
//! A wallet-side signer and a ledger-side verifier only share the typed
//! data definitions. These tests sign through `LevyKeypair`, move the
//! signature through its wire encodings, and recover the signer from the
//! rebuilt digest.

use levy_protocol::crypto::{
    recover_address, Eip712Domain, LevyKeypair, PermitMessage, RecoverableSignature,
    SignatureError,
};
use levy_protocol::Address;
use proptest::prelude::*;

fn domain(chain_id: u64) -> Eip712Domain {
    Eip712Domain {
        name: "Levy".into(),
        version: "1".into(),
        chain_id,
        verifying_contract: Address::from_tag(0xc0),
    }
}

fn message(owner: Address) -> PermitMessage {
    PermitMessage {
        owner,
        spender: Address::from_tag(0x5e),
        value: 1_000_000_000_000_000_000,
        nonce: 0,
        deadline: 1_700_003_600,
    }
}

#[test]
fn signature_survives_the_wire() {
    let key = LevyKeypair::from_bytes(&[0x11; 32]).unwrap();
    let digest = message(key.address()).signing_digest(&domain(1).separator());
    let signature = key.sign_prehash(&digest).unwrap();

    let from_bytes = RecoverableSignature::from_bytes(&signature.to_bytes()).unwrap();
    let from_hex = RecoverableSignature::from_hex(&signature.to_hex()).unwrap();
    let json = serde_json::to_string(&signature).unwrap();
    let from_json: RecoverableSignature = serde_json::from_str(&json).unwrap();

    for decoded in [from_bytes, from_hex, from_json] {
        assert_eq!(recover_address(&digest, &decoded).unwrap(), key.address());
    }
}

#[test]
fn signature_for_another_chain_recovers_a_stranger() {
    let key = LevyKeypair::from_bytes(&[0x11; 32]).unwrap();
    let msg = message(key.address());
    let signed = key
        .sign_prehash(&msg.signing_digest(&domain(1).separator()))
        .unwrap();

    let verified_on = msg.signing_digest(&domain(2).separator());
    match recover_address(&verified_on, &signed) {
        Ok(recovered) => assert_ne!(recovered, key.address()),
        Err(e) => assert_eq!(e, SignatureError::RecoveryFailed),
    }
}

#[test]
fn truncated_encoding_is_rejected() {
    let key = LevyKeypair::from_bytes(&[0x11; 32]).unwrap();
    let signature = key.sign_prehash(&[9u8; 32]).unwrap();
    assert_eq!(
        RecoverableSignature::from_bytes(&signature.to_bytes()[..64]),
        Err(SignatureError::InvalidLength)
    );
}

proptest! {
    #[test]
    fn any_key_recovers_itself(
        secret in prop::array::uniform32(1u8..),
        value in any::<u128>(),
        nonce in any::<u64>(),
    ) {
        let key = LevyKeypair::from_bytes(&secret).unwrap();
        let msg = PermitMessage { value, nonce, ..message(key.address()) };
        let digest = msg.signing_digest(&domain(31_337).separator());
        let signature = key.sign_prehash(&digest).unwrap();
        prop_assert!(signature.v == 27 || signature.v == 28);
        prop_assert_eq!(recover_address(&digest, &signature).unwrap(), key.address());
    }
}
