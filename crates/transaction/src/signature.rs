use devnet_primitives::{Address, B256, U256};
pub use k256::SecretKey;
use k256::{
    FieldBytes,
    ecdsa::{RecoveryId, SigningKey, VerifyingKey},
    elliptic_curve::sec1::ToEncodedPoint as _,
};
use sha3::{Digest as _, Keccak256};

/// Errors that can occur when signing or recovering.
#[derive(Debug, thiserror::Error)]
pub enum SignatureError {
    /// ECDSA failure
    #[error(transparent)]
    Ecdsa(#[from] k256::ecdsa::Error),
    /// Elliptic curve failure
    #[error(transparent)]
    EllipticCurve(#[from] k256::elliptic_curve::Error),
    /// The secret key is not valid hex.
    #[error("Invalid secret key hex")]
    InvalidSecretKeyHex,
    /// The secret key does not have 32 bytes.
    #[error("Invalid secret key length")]
    InvalidSecretKeyLength,
}

/// An ECDSA signature over secp256k1, with the parity of the `y` coordinate
/// of the signing point.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Signature {
    /// The `r` value
    pub r: U256,
    /// The `s` value
    pub s: U256,
    /// Whether the `y` coordinate is odd
    pub y_parity: bool,
}

impl Signature {
    /// Signs the provided hash.
    pub fn sign_hash(hash: &B256, secret_key: &SecretKey) -> Result<Self, SignatureError> {
        let signing_key = SigningKey::from(secret_key);
        let (signature, recovery_id) = signing_key.sign_prehash_recoverable(hash.as_slice())?;

        let bytes = signature.to_bytes();
        let (r, s) = bytes.split_at(32);

        Ok(Self {
            r: U256::from_be_slice(r),
            s: U256::from_be_slice(s),
            y_parity: recovery_id.is_y_odd(),
        })
    }

    /// Recovers the address that signed the provided hash.
    pub fn recover_address(&self, hash: &B256) -> Result<Address, SignatureError> {
        let signature = k256::ecdsa::Signature::from_scalars(
            FieldBytes::from(self.r.to_be_bytes::<32>()),
            FieldBytes::from(self.s.to_be_bytes::<32>()),
        )?;
        let recovery_id = RecoveryId::new(self.y_parity, false);

        let verifying_key =
            VerifyingKey::recover_from_prehash(hash.as_slice(), &signature, recovery_id)?;

        Ok(verifying_key_to_address(&verifying_key))
    }

    /// The `v` value of a legacy transaction signed with this signature.
    pub fn legacy_v(&self, chain_id: Option<u64>) -> u64 {
        let parity = u64::from(self.y_parity);
        match chain_id {
            Some(chain_id) => chain_id * 2 + 35 + parity,
            None => 27 + parity,
        }
    }
}

/// The signature of a transaction, which is either a real ECDSA signature or a
/// fake one used to impersonate an account.
///
/// A fake signature encodes the sender's address as its `r` and `s` values,
/// which keeps transaction hashes unique per sender.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Fakeable {
    signature: Option<Signature>,
    caller: Address,
}

impl Fakeable {
    /// Recovers the caller of a real signature over the provided hash.
    pub fn recover(signature: Signature, hash: &B256) -> Result<Self, SignatureError> {
        let caller = signature.recover_address(hash)?;

        Ok(Self {
            signature: Some(signature),
            caller,
        })
    }

    /// Constructs a fake signature for the provided caller.
    pub fn fake(caller: Address) -> Self {
        Self {
            signature: None,
            caller,
        }
    }

    /// The address of the caller.
    pub fn caller(&self) -> &Address {
        &self.caller
    }

    /// Whether the signature is fake.
    pub fn is_fake(&self) -> bool {
        self.signature.is_none()
    }

    /// The signature values that end up in the transaction's encoding.
    pub fn as_signature(&self) -> Signature {
        self.signature.unwrap_or_else(|| {
            let value = U256::from_be_slice(self.caller.as_slice());
            Signature {
                r: value,
                s: value,
                y_parity: false,
            }
        })
    }
}

/// Computes the address corresponding to the provided secret key.
pub fn secret_key_to_address(secret_key: &SecretKey) -> Address {
    verifying_key_to_address(SigningKey::from(secret_key).verifying_key())
}

/// Parses a hex-encoded secret key.
pub fn secret_key_from_str(secret_key: &str) -> Result<SecretKey, SignatureError> {
    let stripped = secret_key.strip_prefix("0x").unwrap_or(secret_key);
    // Hex errors can leak characters of the key, so use an opaque one.
    let bytes = hex::decode(stripped).map_err(|_err| SignatureError::InvalidSecretKeyHex)?;
    let bytes = FieldBytes::from_exact_iter(bytes).ok_or(SignatureError::InvalidSecretKeyLength)?;

    Ok(SecretKey::from_bytes(&bytes)?)
}

fn verifying_key_to_address(verifying_key: &VerifyingKey) -> Address {
    let point = verifying_key.to_encoded_point(/* compress = */ false);
    // The first byte is the SEC1 tag.
    let hash = Keccak256::digest(point.as_bytes().get(1..).unwrap_or_default());

    Address::from_slice(hash.get(12..).unwrap_or_default())
}
