//! Auth chain signing and verification (EIP-191 personal sign over secp256k1).

use chrono::{DateTime, SecondsFormat, Utc};
use k256::ecdsa::{RecoveryId, Signature as EcdsaSignature, SigningKey, VerifyingKey};
use secrecy::{ExposeSecret, SecretString};
use sha3::{Digest, Keccak256};

use super::{AuthChain, AuthIdentity, AuthLink, AuthLinkType, EphemeralIdentity};
use crate::error::IdentityError;

const EPHEMERAL_MESSAGE_HEADER: &str = "Decentraland Login";
const EPHEMERAL_ADDRESS_PREFIX: &str = "Ephemeral address: ";

/// Owner of an auth chain: the payload of its leading `SIGNER` link, lowercased.
pub fn owner_address(auth_chain: &[AuthLink]) -> Option<String> {
    match auth_chain.first() {
        Some(link) if link.kind == AuthLinkType::Signer => normalize_wallet_address(&link.payload),
        _ => None,
    }
}

/// Message the wallet signs to delegate to an ephemeral key.
pub fn ephemeral_message(ephemeral_address: &str, expiration: DateTime<Utc>) -> String {
    format!(
        "{EPHEMERAL_MESSAGE_HEADER}\n{EPHEMERAL_ADDRESS_PREFIX}{ephemeral_address}\nExpiration: {}",
        expiration.to_rfc3339_opts(SecondsFormat::Millis, true)
    )
}

impl EphemeralIdentity {
    /// Fresh random key pair.
    pub fn generate() -> Self {
        let signing_key = SigningKey::random(&mut rand::rngs::OsRng);
        let verifying_key = signing_key.verifying_key();
        let public_key = verifying_key.to_encoded_point(false);
        Self {
            address: ethereum_address_from_verifying_key(verifying_key),
            public_key: format!("0x{}", encode_hex_lower(public_key.as_bytes())),
            private_key: SecretString::from(format!(
                "0x{}",
                encode_hex_lower(&signing_key.to_bytes())
            )),
        }
    }
}

/// Build an identity whose chain is rooted at the wallet holding `signer_key`.
pub fn initialize_identity(
    signer_key: &SecretString,
    expiration: DateTime<Utc>,
) -> Result<AuthIdentity, IdentityError> {
    let signer = signing_key_from_hex(signer_key)?;
    let signer_address = ethereum_address_from_verifying_key(signer.verifying_key());
    let ephemeral = EphemeralIdentity::generate();
    let message = ephemeral_message(&ephemeral.address, expiration);
    let signature = sign_with_key(&signer, &message)?;

    Ok(AuthIdentity {
        ephemeral_identity: ephemeral,
        expiration,
        auth_chain: vec![
            AuthLink::signer(signer_address),
            AuthLink {
                kind: AuthLinkType::EcdsaPersonalEphemeral,
                payload: message,
                signature,
            },
        ],
    })
}

/// Extend the identity's chain with `payload` signed by the ephemeral key.
pub fn sign_payload(identity: &AuthIdentity, payload: &str) -> Result<AuthChain, IdentityError> {
    let signature = personal_sign(&identity.ephemeral_identity.private_key, payload)?;
    let mut chain = identity.auth_chain.clone();
    chain.push(AuthLink {
        kind: AuthLinkType::EcdsaPersonalSignedEntity,
        payload: payload.to_string(),
        signature,
    });
    Ok(chain)
}

/// EIP-191 personal signature as 0x-prefixed hex (`r || s || v`, v in 27/28).
pub fn personal_sign(private_key: &SecretString, message: &str) -> Result<String, IdentityError> {
    let key = signing_key_from_hex(private_key)?;
    sign_with_key(&key, message)
}

/// Address that produced `signature` over `message`.
pub fn recover_address(message: &str, signature_hex: &str) -> Result<String, IdentityError> {
    let signature_bytes = decode_hex_prefixed(signature_hex).map_err(IdentityError::InvalidChain)?;
    if signature_bytes.len() != 65 {
        return Err(IdentityError::InvalidChain(
            "signature must decode to 65 bytes".to_string(),
        ));
    }

    let sig = EcdsaSignature::try_from(&signature_bytes[..64])
        .map_err(|e| IdentityError::InvalidChain(format!("invalid ECDSA signature bytes: {e}")))?;
    let recovery_id = normalize_recovery_id(signature_bytes[64])?;
    let prehash = eip191_personal_sign_hash(message);
    let verifying_key = VerifyingKey::recover_from_prehash(&prehash, &sig, recovery_id)
        .map_err(|e| {
            IdentityError::InvalidChain(format!("failed recovering signer from signature: {e}"))
        })?;
    Ok(ethereum_address_from_verifying_key(&verifying_key))
}

/// Walk the chain from the wallet down, checking every personal-sign link,
/// and return the owner address.
///
/// EIP-1654 links are contract signatures and cannot be checked offline.
pub fn verify_auth_chain(auth_chain: &[AuthLink]) -> Result<String, IdentityError> {
    let owner = owner_address(auth_chain).ok_or_else(|| {
        IdentityError::InvalidChain("chain must start with a SIGNER link".to_string())
    })?;

    let mut authority = owner.clone();
    for link in &auth_chain[1..] {
        match link.kind {
            AuthLinkType::EcdsaPersonalEphemeral => {
                expect_signed_by(link, &authority)?;
                authority = parse_ephemeral_address(&link.payload)?;
            }
            AuthLinkType::EcdsaPersonalSignedEntity => {
                expect_signed_by(link, &authority)?;
            }
            AuthLinkType::EcdsaEip1654Ephemeral | AuthLinkType::EcdsaEip1654SignedEntity => {
                return Err(IdentityError::InvalidChain(
                    "EIP-1654 links require on-chain verification".to_string(),
                ));
            }
            AuthLinkType::Signer => {
                return Err(IdentityError::InvalidChain(
                    "SIGNER link is only allowed at the start of the chain".to_string(),
                ));
            }
        }
    }

    Ok(owner)
}

fn expect_signed_by(link: &AuthLink, authority: &str) -> Result<(), IdentityError> {
    let recovered = recover_address(&link.payload, &link.signature)?;
    if recovered != authority {
        return Err(IdentityError::InvalidChain(format!(
            "link signed by {recovered}, expected {authority}"
        )));
    }
    Ok(())
}

fn parse_ephemeral_address(payload: &str) -> Result<String, IdentityError> {
    payload
        .lines()
        .find_map(|line| line.trim().strip_prefix(EPHEMERAL_ADDRESS_PREFIX))
        .and_then(normalize_wallet_address)
        .ok_or_else(|| {
            IdentityError::InvalidChain("ephemeral link payload has no address".to_string())
        })
}

fn signing_key_from_hex(private_key: &SecretString) -> Result<SigningKey, IdentityError> {
    let bytes = decode_hex_prefixed(private_key.expose_secret())
        .map_err(|e| IdentityError::Signing(format!("private key: {e}")))?;
    SigningKey::from_slice(&bytes)
        .map_err(|e| IdentityError::Signing(format!("invalid private key: {e}")))
}

fn sign_with_key(key: &SigningKey, message: &str) -> Result<String, IdentityError> {
    let prehash = eip191_personal_sign_hash(message);
    let (sig, recid) = key
        .sign_prehash_recoverable(&prehash)
        .map_err(|e| IdentityError::Signing(e.to_string()))?;
    let mut sig_bytes = sig.to_bytes().to_vec();
    sig_bytes.push(recid.to_byte() + 27);
    Ok(format!("0x{}", encode_hex_lower(&sig_bytes)))
}

fn normalize_recovery_id(raw: u8) -> Result<RecoveryId, IdentityError> {
    let id = match raw {
        27 | 28 => raw - 27,
        0 | 1 => raw,
        _ => {
            return Err(IdentityError::InvalidChain(
                "signature recovery id must be 0/1 or 27/28".to_string(),
            ));
        }
    };
    RecoveryId::try_from(id)
        .map_err(|_| IdentityError::InvalidChain("signature recovery id is invalid".to_string()))
}

fn eip191_personal_sign_hash(message: &str) -> [u8; 32] {
    let bytes = message.as_bytes();
    let prefix = format!("\x19Ethereum Signed Message:\n{}", bytes.len());
    let mut hasher = Keccak256::new();
    hasher.update(prefix.as_bytes());
    hasher.update(bytes);
    let digest = hasher.finalize();
    let mut out = [0u8; 32];
    out.copy_from_slice(&digest);
    out
}

fn ethereum_address_from_verifying_key(key: &VerifyingKey) -> String {
    let encoded = key.to_encoded_point(false);
    let mut hasher = Keccak256::new();
    hasher.update(&encoded.as_bytes()[1..]);
    let digest = hasher.finalize();
    format!("0x{}", encode_hex_lower(&digest[12..]))
}

/// Lowercased `0x`-prefixed 20-byte address, or `None` if malformed.
pub(crate) fn normalize_wallet_address(value: &str) -> Option<String> {
    let trimmed = value.trim();
    if !trimmed.starts_with("0x") || trimmed.len() != 42 {
        return None;
    }
    if !trimmed[2..].chars().all(|c| c.is_ascii_hexdigit()) {
        return None;
    }
    Some(trimmed.to_ascii_lowercase())
}

fn decode_hex_prefixed(value: &str) -> Result<Vec<u8>, String> {
    let hex = value
        .trim()
        .strip_prefix("0x")
        .ok_or_else(|| "hex string must be 0x-prefixed".to_string())?;
    if hex.is_empty() {
        return Err("hex string is empty".to_string());
    }
    if !hex.len().is_multiple_of(2) {
        return Err("hex string must have an even number of characters".to_string());
    }

    hex.as_bytes()
        .chunks_exact(2)
        .map(|pair| {
            let hi = decode_hex_nibble(pair[0]);
            let lo = decode_hex_nibble(pair[1]);
            match (hi, lo) {
                (Some(hi), Some(lo)) => Ok((hi << 4) | lo),
                _ => Err("invalid hex character".to_string()),
            }
        })
        .collect()
}

fn decode_hex_nibble(byte: u8) -> Option<u8> {
    match byte {
        b'0'..=b'9' => Some(byte - b'0'),
        b'a'..=b'f' => Some(byte - b'a' + 10),
        b'A'..=b'F' => Some(byte - b'A' + 10),
        _ => None,
    }
}

fn encode_hex_lower(bytes: &[u8]) -> String {
    const DIGITS: &[u8; 16] = b"0123456789abcdef";
    let mut out = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        out.push(DIGITS[(b >> 4) as usize] as char);
        out.push(DIGITS[(b & 0x0f) as usize] as char);
    }
    out
}
