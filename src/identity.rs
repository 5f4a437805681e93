/* This file is part of DarkFi (https://dark.fi)
 *
 * Copyright (C) 2020-2025 Dyne.org foundation
 *
 * This program is free software: you can redistribute it and/or modify
 * it under the terms of the GNU Affero General Public License as
 * published by the Free Software Foundation, either version 3 of the
 * License, or (at your option) any later version.
 *
 * This program is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 * GNU Affero General Public License for more details.
 *
 * You should have received a copy of the GNU Affero General Public License
 * along with this program.  If not, see <https://www.gnu.org/licenses/>.
 */

#[cfg(unix)]
use std::os::unix::prelude::OpenOptionsExt;
use std::{
    fmt,
    fs::{read_to_string, OpenOptions},
    io::Write,
    path::Path,
    str::FromStr,
};

use ed25519_compact::{KeyPair, PublicKey, Seed, Signature};
use rand::{CryptoRng, RngCore};
use tracing::debug;

use crate::{Error, Result};

/// Length of the public key digest an address is derived from
const ADDRESS_DIGEST_LEN: usize = 20;

/// A signing keypair together with the account address derived from
/// its public half. Immutable once loaded.
#[derive(Clone)]
pub struct Identity {
    seed: [u8; 32],
    keypair: KeyPair,
    address: String,
}

impl Identity {
    /// Derive an identity from a 32-byte secret seed.
    pub fn from_seed(seed: [u8; 32]) -> Self {
        let keypair = KeyPair::from_seed(Seed::new(seed));
        let address = derive_address(&keypair.pk);
        Self { seed, keypair, address }
    }

    /// Generate a fresh random identity.
    pub fn generate(mut rng: impl RngCore + CryptoRng) -> Self {
        let mut seed = [0u8; 32];
        rng.fill_bytes(&mut seed);
        Self::from_seed(seed)
    }

    /// Load an identity from a key file holding the base58-encoded seed.
    pub fn load(path: &Path) -> Result<Self> {
        debug!(target: "wasmdeploy::identity", "Reading key from {}", path.display());
        let contents = read_to_string(path)?;
        Self::from_str(&contents)
    }

    /// Write the base58-encoded seed into a new key file. Fails if the
    /// file already exists.
    pub fn save(&self, path: &Path) -> Result<()> {
        let mut options = OpenOptions::new();
        options.write(true).create_new(true);
        // Owner-only, the file holds the signing seed
        #[cfg(unix)]
        options.mode(0o600);

        let mut file = options.open(path)?;
        file.write_all(self.to_bs58().as_bytes())?;
        Ok(())
    }

    /// Base58 encoding of the secret seed
    pub fn to_bs58(&self) -> String {
        bs58::encode(self.seed).into_string()
    }

    /// Account address of this identity
    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn public_key(&self) -> PublicKey {
        self.keypair.pk
    }

    /// Hex encoding of the public key, as carried in transaction envelopes
    pub fn public_key_hex(&self) -> String {
        hex::encode(*self.keypair.pk)
    }

    /// Sign a message. The signature is checked against our own public
    /// key before it is handed out.
    pub fn sign(&self, message: &[u8]) -> Result<Signature> {
        let signature = self.keypair.sk.sign(message, None);
        if let Err(e) = self.keypair.pk.verify(message, &signature) {
            return Err(Error::SigningFailed(e.to_string()))
        }
        Ok(signature)
    }
}

impl FromStr for Identity {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let bytes = bs58::decode(s.trim()).into_vec()?;
        let Ok(seed) = <[u8; 32]>::try_from(bytes.as_slice()) else {
            return Err(Error::InvalidSecretKey)
        };
        Ok(Self::from_seed(seed))
    }
}

impl fmt::Debug for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Identity").field("address", &self.address).finish_non_exhaustive()
    }
}

/// Derive an account address from a public key: the base58 encoding of
/// the first 20 bytes of its BLAKE3 digest.
pub fn derive_address(pk: &PublicKey) -> String {
    let digest = blake3::hash(&pk[..]);
    bs58::encode(&digest.as_bytes()[..ADDRESS_DIGEST_LEN]).into_string()
}

/// Check a hex-encoded signature over `message` against a hex-encoded
/// public key.
pub fn verify_signature(public_key_hex: &str, message: &[u8], signature_hex: &str) -> Result<()> {
    let pk = PublicKey::from_slice(&hex::decode(public_key_hex)?)?;
    let signature = Signature::from_slice(&hex::decode(signature_hex)?)?;
    if pk.verify(message, &signature).is_err() {
        return Err(Error::InvalidSignature)
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use rand::rngs::OsRng;
    use tempdir::TempDir;

    use super::*;

    #[test]
    fn address_is_deterministic() {
        let a = Identity::from_seed([7u8; 32]);
        let b = Identity::from_seed([7u8; 32]);
        let c = Identity::from_seed([8u8; 32]);
        assert_eq!(a.address(), b.address());
        assert_ne!(a.address(), c.address());
        assert_eq!(bs58::decode(a.address()).into_vec().unwrap().len(), ADDRESS_DIGEST_LEN);
    }

    #[test]
    fn sign_and_verify() {
        let id = Identity::generate(OsRng);
        let sig = id.sign(b"store vault").unwrap();
        let sig_hex = hex::encode(*sig);
        assert!(verify_signature(&id.public_key_hex(), b"store vault", &sig_hex).is_ok());
        assert!(matches!(
            verify_signature(&id.public_key_hex(), b"store other", &sig_hex),
            Err(Error::InvalidSignature)
        ));
    }

    #[test]
    fn key_file_roundtrip() {
        let dir = TempDir::new("wasmdeploy-identity").unwrap();
        let path = dir.path().join("deploy.key");

        let id = Identity::generate(OsRng);
        id.save(&path).unwrap();
        // Refuse to clobber an existing key
        assert!(id.save(&path).is_err());

        let loaded = Identity::load(&path).unwrap();
        assert_eq!(loaded.address(), id.address());
        assert_eq!(loaded.public_key_hex(), id.public_key_hex());
    }

    #[cfg(unix)]
    #[test]
    fn key_file_is_owner_only() {
        use std::os::unix::fs::PermissionsExt;

        let dir = TempDir::new("wasmdeploy-identity").unwrap();
        let path = dir.path().join("deploy.key");
        Identity::generate(OsRng).save(&path).unwrap();

        let mode = std::fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[test]
    fn reject_short_seed() {
        let short = bs58::encode([1u8; 16]).into_string();
        assert!(matches!(Identity::from_str(&short), Err(Error::InvalidSecretKey)));
    }
}
