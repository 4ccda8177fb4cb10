//! # Signature Service
//!
//! ## Security Model
//!
//! A channel uses two independent signature schemes:
//!
//! - **Off-chain** (Ed25519): authenticates every state written to the
//!   replicated store. Signs the SHA-256 digest of a canonical, domain
//!   separated postcard encoding of the state.
//! - **On-chain** (secp256k1, EIP-191 personal sign): authorizes the ledger
//!   contract to release funds. Signs
//!   `keccak256(abi.encodePacked(contract, clientBalance, relayBalance, nonce))`.
//!
//! Verification only ever checks the signature that was received. Nothing in
//! this module signs on behalf of a peer to compare results.

use ed25519_dalek::{Signature as DalekSig, Signer as _, SigningKey, Verifier, VerifyingKey};
use ethers::abi::{encode_packed, Token};
use ethers::signers::{LocalWallet, Signer};
use ethers::types::{Address, Signature, U256};
use ethers::utils::keccak256;
use rand::RngCore;
use relaypay_lib::{ChannelError, ChannelState, Result, StatePackage, TokenAmount};
use serde::Serialize;
use sha2::{Digest, Sha256};

/// Domain separation constant for off-chain state signatures
const CHANNEL_STATE_DOMAIN: &str = "RELAYPAY_CHANNEL_STATE_V1";

/// Ed25519 key pair used for off-chain state signatures.
///
/// The secret is zeroized on drop.
pub struct OffChainKeyPair {
    signing_key: SigningKey,
}

impl OffChainKeyPair {
    /// Generate a fresh random key pair.
    pub fn generate() -> Self {
        let mut secret = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut secret);
        Self::from_secret_bytes(&secret)
    }

    /// Restore a key pair from its 32-byte secret.
    pub fn from_secret_bytes(secret: &[u8; 32]) -> Self {
        Self {
            signing_key: SigningKey::from_bytes(secret),
        }
    }

    /// Restore a key pair from a hex-encoded 32-byte secret.
    ///
    /// # Errors
    ///
    /// Returns [`ChannelError::Config`] if the hex is invalid or not 32 bytes.
    pub fn from_secret_hex(secret_hex: &str) -> Result<Self> {
        let bytes = hex::decode(secret_hex)
            .map_err(|e| ChannelError::Config(format!("invalid off-chain secret: {}", e)))?;
        let secret: [u8; 32] = bytes.as_slice().try_into().map_err(|_| {
            ChannelError::Config(format!(
                "off-chain secret must be 32 bytes, got {}",
                bytes.len()
            ))
        })?;
        Ok(Self::from_secret_bytes(&secret))
    }

    /// Hex-encoded public key, as carried in `ChannelState::participant_pub_key`.
    pub fn public_key_hex(&self) -> String {
        hex::encode(self.signing_key.verifying_key().as_bytes())
    }

    fn sign_digest(&self, digest: &[u8; 32]) -> DalekSig {
        self.signing_key.sign(digest)
    }
}

impl std::fmt::Debug for OffChainKeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OffChainKeyPair")
            .field("public_key", &self.public_key_hex())
            .finish_non_exhaustive()
    }
}

/// Canonical form of a state for signing.
///
/// Balances are encoded as their decimal strings so the bytes do not depend
/// on the in-memory integer representation.
#[derive(Serialize)]
struct CanonicalState<'a> {
    domain: &'static str,
    nonce: u64,
    client_balance: String,
    relay_balance: String,
    pub_key: Option<&'a str>,
}

/// Canonical bytes of a state, the message off-chain signatures cover.
///
/// # Errors
///
/// Returns [`ChannelError::Serialization`] if encoding fails.
pub fn canonical_state_bytes(state: &ChannelState) -> Result<Vec<u8>> {
    let payload = CanonicalState {
        domain: CHANNEL_STATE_DOMAIN,
        nonce: state.nonce,
        client_balance: state.client_balance.to_string(),
        relay_balance: state.relay_balance.to_string(),
        pub_key: state.participant_pub_key.as_deref(),
    };

    // postcard is deterministic (fixed field order, no maps)
    postcard::to_allocvec(&payload)
        .map_err(|e| ChannelError::Serialization(format!("canonical state encoding: {}", e)))
}

fn digest(message: &[u8]) -> [u8; 32] {
    Sha256::digest(message).into()
}

/// Produces and checks off-chain and settlement signatures.
///
/// Holds at most one key of each kind. Operations that need a missing key
/// fail with [`ChannelError::Config`]; verification needs no key at all.
#[derive(Debug, Default)]
pub struct SignatureService {
    off_chain: Option<OffChainKeyPair>,
    on_chain: Option<LocalWallet>,
}

impl SignatureService {
    /// Create a service with no keys configured.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the off-chain key pair.
    pub fn with_off_chain_key(mut self, key_pair: OffChainKeyPair) -> Self {
        self.off_chain = Some(key_pair);
        self
    }

    /// Set the ledger-native signer.
    pub fn with_on_chain_signer(mut self, signer: LocalWallet) -> Self {
        self.on_chain = Some(signer);
        self
    }

    /// Hex public key of the off-chain key pair, if configured.
    pub fn off_chain_public_key(&self) -> Option<String> {
        self.off_chain.as_ref().map(OffChainKeyPair::public_key_hex)
    }

    /// Ledger address of the on-chain signer, if configured.
    pub fn on_chain_address(&self) -> Option<Address> {
        self.on_chain.as_ref().map(|wallet| wallet.address())
    }

    /// Sign canonical state bytes with the off-chain key pair.
    ///
    /// Ed25519 is deterministic: the same bytes always yield the same
    /// signature.
    ///
    /// # Errors
    ///
    /// Returns [`ChannelError::Config`] if no off-chain key pair is configured.
    pub fn sign_off_chain(&self, state_bytes: &[u8]) -> Result<String> {
        let key_pair = self
            .off_chain
            .as_ref()
            .ok_or_else(|| ChannelError::missing("off-chain key pair"))?;
        let signature = key_pair.sign_digest(&digest(state_bytes));
        Ok(hex::encode(signature.to_bytes()))
    }

    /// Check a received off-chain signature against a claimed public key.
    ///
    /// `message` is the canonical encoding of the received data. Malformed
    /// hex, a wrong-length signature or an invalid public key all yield
    /// `false`.
    pub fn verify_off_chain(message: &[u8], signature: &str, pub_key: &str) -> bool {
        let Ok(sig_bytes) = hex::decode(signature) else {
            return false;
        };
        let Ok(sig_bytes) = <[u8; 64]>::try_from(sig_bytes.as_slice()) else {
            return false;
        };
        let Ok(key_bytes) = hex::decode(pub_key) else {
            return false;
        };
        let Ok(key_bytes) = <[u8; 32]>::try_from(key_bytes.as_slice()) else {
            return false;
        };
        let Ok(verifying_key) = VerifyingKey::from_bytes(&key_bytes) else {
            return false;
        };

        let signature = DalekSig::from_bytes(&sig_bytes);
        verifying_key.verify(&digest(message), &signature).is_ok()
    }

    /// Sign a state and wrap it for the store.
    ///
    /// # Errors
    ///
    /// Returns [`ChannelError::Config`] if no off-chain key pair is configured.
    pub fn sign_state(&self, state: &ChannelState) -> Result<StatePackage> {
        let bytes = canonical_state_bytes(state)?;
        let signature = self.sign_off_chain(&bytes)?;
        Ok(StatePackage::new(state.clone(), signature))
    }

    /// Check a received package against the key named in its own data.
    ///
    /// Returns `false` when the package names no key.
    pub fn verify_package(package: &StatePackage) -> bool {
        let Some(pub_key) = package.data.participant_pub_key.as_deref() else {
            return false;
        };
        match canonical_state_bytes(&package.data) {
            Ok(bytes) => Self::verify_off_chain(&bytes, &package.signature, pub_key),
            Err(_) => false,
        }
    }

    /// Hash the settlement tuple the contract verifies.
    ///
    /// `keccak256(abi.encodePacked(address, uint256, uint256, uint256))`
    ///
    /// # Errors
    ///
    /// Returns [`ChannelError::Serialization`] if packing fails.
    pub fn settlement_message(
        contract_address: Address,
        client_balance: &TokenAmount,
        relay_balance: &TokenAmount,
        nonce: u64,
    ) -> Result<[u8; 32]> {
        let packed = encode_packed(&[
            Token::Address(contract_address),
            Token::Uint(client_balance.as_u256()),
            Token::Uint(relay_balance.as_u256()),
            Token::Uint(U256::from(nonce)),
        ])
        .map_err(|e| ChannelError::Serialization(format!("settlement encoding: {}", e)))?;
        Ok(keccak256(packed))
    }

    /// Produce a settlement signature with the ledger-native signer.
    ///
    /// The signer applies the EIP-191 personal-message prefix to the 32-byte
    /// settlement hash.
    ///
    /// # Errors
    ///
    /// Returns [`ChannelError::Config`] if no on-chain signer is configured.
    pub async fn sign_on_chain(
        &self,
        contract_address: Address,
        client_balance: &TokenAmount,
        relay_balance: &TokenAmount,
        nonce: u64,
    ) -> Result<Signature> {
        let wallet = self
            .on_chain
            .as_ref()
            .ok_or_else(|| ChannelError::missing("on-chain signer"))?;
        let message =
            Self::settlement_message(contract_address, client_balance, relay_balance, nonce)?;

        wallet
            .sign_message(message)
            .await
            .map_err(|e| ChannelError::Config(format!("on-chain signer failed: {}", e)))
    }

    /// Recover the address that produced `signature` over `message`.
    ///
    /// `message` is the settlement hash; the personal-message prefix is
    /// applied the same way the signer applied it. The caller compares the
    /// result against the address it expects.
    ///
    /// # Errors
    ///
    /// Returns [`ChannelError::Verification`] on a malformed signature.
    pub fn verify_on_chain(message: &[u8], signature: &Signature) -> Result<Address> {
        signature
            .recover(message.to_vec())
            .map_err(|e| ChannelError::Verification(format!("signature recovery failed: {}", e)))
    }

    /// Check that `signature` over `message` was produced by `expected`.
    ///
    /// # Errors
    ///
    /// Returns [`ChannelError::Verification`] on a malformed signature or
    /// when another address signed.
    pub fn verify_on_chain_signer(
        message: &[u8],
        signature: &Signature,
        expected: Address,
    ) -> Result<()> {
        let recovered = Self::verify_on_chain(message, signature)?;
        if recovered != expected {
            return Err(ChannelError::Verification(format!(
                "settlement signed by {:?}, expected {:?}",
                recovered, expected
            )));
        }
        Ok(())
    }
}

/// Parse a hex settlement signature (with or without `0x`).
///
/// # Errors
///
/// Returns [`ChannelError::Verification`] if the string is not a 65-byte
/// hex signature.
pub fn parse_settlement_signature(signature: &str) -> Result<Signature> {
    signature
        .parse::<Signature>()
        .map_err(|e| ChannelError::Verification(format!("malformed settlement signature: {}", e)))
}
