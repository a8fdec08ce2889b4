//! Services the merge engine consumes but does not implement: strong-name cryptography,
//! PDB writing, XML documentation merging and lookup of referenced framework assemblies.
//!
//! [`Collaborators::default`] wires a working [`Crypto`] implementation over `sha1`/`md-5`,
//! the file system resolver and inert PDB and XML documentation collaborators.

use std::{collections::HashMap, fmt, str::FromStr};

use md5::Md5;
use sha1::{Digest, Sha1};
use strum::{Display, EnumString};

use crate::{
    file::io::read_le,
    loader::{FileSystemResolver, ResourceResolver},
    merge::TokenRemapper,
    metadata::tables::TableIndex,
    Error, Result,
};

/// Hash algorithms of `Assembly.HashAlgId`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Display, EnumString)]
#[strum(ascii_case_insensitive)]
pub enum HashAlgorithm {
    /// No hashing
    None,
    /// MD5
    #[strum(serialize = "md5")]
    Md5,
    /// SHA-1
    #[default]
    #[strum(serialize = "sha1")]
    Sha1,
}

impl HashAlgorithm {
    /// The `HashAlgId` value
    #[must_use]
    pub fn id(self) -> u32 {
        match self {
            HashAlgorithm::None => 0,
            HashAlgorithm::Md5 => 0x8003,
            HashAlgorithm::Sha1 => 0x8004,
        }
    }

    /// The algorithm of a `HashAlgId` value
    #[must_use]
    pub fn from_id(id: u32) -> Option<HashAlgorithm> {
        match id {
            0 => Some(HashAlgorithm::None),
            0x8003 => Some(HashAlgorithm::Md5),
            0x8004 => Some(HashAlgorithm::Sha1),
            _ => None,
        }
    }
}

/// Where the strong-name key comes from
#[derive(Clone, PartialEq, Eq)]
pub enum SigningKey {
    /// The content of a key file: a key pair or a public key blob
    File(Vec<u8>),
    /// A named key container of the platform key store
    Container(String),
}

impl fmt::Debug for SigningKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SigningKey::File(data) => write!(f, "SigningKey::File({} bytes)", data.len()),
            SigningKey::Container(name) => write!(f, "SigningKey::Container({name})"),
        }
    }
}

/// Strong-name cryptography
pub trait Crypto: Send + Sync {
    /// The 8-byte token of a full public key
    ///
    /// # Errors
    /// Returns an error if the key cannot be hashed
    fn compute_public_key_token(&self, public_key: &[u8]) -> Result<Vec<u8>>;

    /// The full public key of a signing key
    ///
    /// # Errors
    /// Returns an error if the key is malformed or its source is unsupported
    fn create_public_key_from_signing_key(&self, key: &SigningKey) -> Result<Vec<u8>>;

    /// Hash `data` with `algorithm`
    ///
    /// # Errors
    /// Returns an error if the algorithm is not supported
    fn hash(&self, algorithm: HashAlgorithm, data: &[u8]) -> Result<Vec<u8>>;
}

/// [`Crypto`] over SHA-1 and MD5
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultCrypto;

const PUBLIC_KEY_BLOB: u8 = 0x06;
const PRIVATE_KEY_BLOB: u8 = 0x07;
const CALG_RSA_SIGN: u32 = 0x0000_2400;
const CALG_SHA1: u32 = 0x0000_8004;
const RSA1: u32 = 0x3141_5352;
const RSA2: u32 = 0x3241_5352;

impl Crypto for DefaultCrypto {
    fn compute_public_key_token(&self, public_key: &[u8]) -> Result<Vec<u8>> {
        let digest = Sha1::digest(public_key);
        Ok(digest.iter().rev().take(8).copied().collect())
    }

    fn create_public_key_from_signing_key(&self, key: &SigningKey) -> Result<Vec<u8>> {
        let data = match key {
            SigningKey::File(data) => data,
            SigningKey::Container(name) => return Err(Error::KeyContainerUnsupported(name.clone())),
        };

        // A file holding the full public key already starts with the signature algorithm
        if data.len() > 12 && read_le::<u32>(data)? == CALG_RSA_SIGN {
            return Ok(data.clone());
        }

        if data.len() < 20 {
            return Err(Error::KeyError("key blob is too short".to_string()));
        }
        let magic = read_le::<u32>(&data[8..])?;
        let bit_length = read_le::<u32>(&data[12..])? as usize;
        let modulus_end = 20 + bit_length / 8;
        let valid = match data[0] {
            PRIVATE_KEY_BLOB => magic == RSA2,
            PUBLIC_KEY_BLOB => magic == RSA1,
            _ => false,
        };
        if !valid || bit_length % 8 != 0 || data.len() < modulus_end {
            return Err(Error::KeyError("not an RSA key blob".to_string()));
        }

        let mut blob = Vec::with_capacity(modulus_end);
        blob.extend_from_slice(&[PUBLIC_KEY_BLOB, 0x02, 0x00, 0x00]);
        blob.extend_from_slice(&CALG_RSA_SIGN.to_le_bytes());
        blob.extend_from_slice(&RSA1.to_le_bytes());
        blob.extend_from_slice(&data[12..modulus_end]);

        let mut public_key = Vec::with_capacity(12 + blob.len());
        public_key.extend_from_slice(&CALG_RSA_SIGN.to_le_bytes());
        public_key.extend_from_slice(&CALG_SHA1.to_le_bytes());
        public_key.extend_from_slice(&(blob.len() as u32).to_le_bytes());
        public_key.extend_from_slice(&blob);
        Ok(public_key)
    }

    fn hash(&self, algorithm: HashAlgorithm, data: &[u8]) -> Result<Vec<u8>> {
        match algorithm {
            HashAlgorithm::None => Ok(Vec::new()),
            HashAlgorithm::Md5 => Ok(Md5::digest(data).to_vec()),
            HashAlgorithm::Sha1 => Ok(Sha1::digest(data).to_vec()),
        }
    }
}

/// A method of the merged module together with where it came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MergedFunction {
    /// Position of the input it came from
    pub input: usize,
    /// Its `MethodDef` row in the input
    pub original: TableIndex,
    /// Its `MethodDef` row in the target, after the final reordering
    pub merged: TableIndex,
}

/// Debug information of one input
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DebugInput {
    /// The input's resource
    pub resource: String,
    /// The input's raw debug directory
    pub debug_directory: Vec<u8>,
}

/// Writes the debug information of the merged module
pub trait PdbWriter: Send + Sync {
    /// Produce the debug directory of the merged module.
    ///
    /// `remapper` translates any input token into the final target token space.
    ///
    /// # Errors
    /// Returns [`Error::Pdb`] if an input's debug information cannot be read or written
    fn write(
        &self,
        remapper: &TokenRemapper,
        inputs: &[DebugInput],
        functions: &[MergedFunction],
    ) -> Result<Vec<u8>>;
}

/// A [`PdbWriter`] that emits no debug information
#[derive(Debug, Clone, Copy, Default)]
pub struct NoPdb;

impl PdbWriter for NoPdb {
    fn write(
        &self,
        _remapper: &TokenRemapper,
        inputs: &[DebugInput],
        _functions: &[MergedFunction],
    ) -> Result<Vec<u8>> {
        log::debug!("Debug information of {} inputs is not merged", inputs.len());
        Ok(Vec::new())
    }
}

/// Merges the XML documentation files of the inputs
pub trait XmlDocMerger: Send + Sync {
    /// Produce the merged documentation, or `None` if there is nothing to merge.
    ///
    /// `renames` holds, per input, the old to new full names of renamed types.
    ///
    /// # Errors
    /// Returns [`Error::XmlDoc`] if a documentation file cannot be read
    fn merge(
        &self,
        resources: &[String],
        renames: &[HashMap<String, String>],
    ) -> Result<Option<String>>;
}

/// An [`XmlDocMerger`] that produces no documentation
#[derive(Debug, Clone, Copy, Default)]
pub struct NoXmlDoc;

impl XmlDocMerger for NoXmlDoc {
    fn merge(
        &self,
        _resources: &[String],
        _renames: &[HashMap<String, String>],
    ) -> Result<Option<String>> {
        Ok(None)
    }
}

/// The collaborators of one merge
pub struct Collaborators {
    /// Strong-name cryptography
    pub crypto: Box<dyn Crypto>,
    /// Debug information writer
    pub pdb: Box<dyn PdbWriter>,
    /// Documentation merger
    pub xml_doc: Box<dyn XmlDocMerger>,
    /// Locates the assemblies retargetable references are fixed up against
    pub resolver: Box<dyn ResourceResolver>,
}

impl Default for Collaborators {
    fn default() -> Self {
        Collaborators {
            crypto: Box::new(DefaultCrypto),
            pdb: Box::new(NoPdb),
            xml_doc: Box::new(NoXmlDoc),
            resolver: Box::new(FileSystemResolver),
        }
    }
}

impl fmt::Debug for Collaborators {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Collaborators").finish_non_exhaustive()
    }
}

/// Parse a hash algorithm name as accepted on the command line
///
/// # Errors
/// Returns [`Error::Configuration`] for an unknown name
pub fn parse_hash_algorithm(name: &str) -> Result<HashAlgorithm> {
    HashAlgorithm::from_str(name)
        .map_err(|_| Error::Configuration(format!("unknown hash algorithm '{name}'")))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn private_key_blob() -> Vec<u8> {
        let mut blob = vec![PRIVATE_KEY_BLOB, 0x02, 0x00, 0x00];
        blob.extend_from_slice(&CALG_RSA_SIGN.to_le_bytes());
        blob.extend_from_slice(&RSA2.to_le_bytes());
        blob.extend_from_slice(&64_u32.to_le_bytes());
        blob.extend_from_slice(&65537_u32.to_le_bytes());
        blob.extend_from_slice(&[0xAB; 8]);
        // Private exponent and primes follow the modulus
        blob.extend_from_slice(&[0xCD; 20]);
        blob
    }

    #[test]
    fn public_key_from_key_pair() {
        let crypto = DefaultCrypto;
        let public_key = crypto
            .create_public_key_from_signing_key(&SigningKey::File(private_key_blob()))
            .unwrap();

        assert_eq!(read_le::<u32>(&public_key).unwrap(), CALG_RSA_SIGN);
        assert_eq!(read_le::<u32>(&public_key[4..]).unwrap(), CALG_SHA1);
        assert_eq!(read_le::<u32>(&public_key[8..]).unwrap(), 28);
        assert_eq!(public_key[12], PUBLIC_KEY_BLOB);
        assert_eq!(&public_key[32..], &[0xAB; 8]);

        // A public key file is used as is
        assert_eq!(
            crypto
                .create_public_key_from_signing_key(&SigningKey::File(public_key.clone()))
                .unwrap(),
            public_key
        );
    }

    #[test]
    fn key_errors() {
        let crypto = DefaultCrypto;
        assert!(matches!(
            crypto.create_public_key_from_signing_key(&SigningKey::Container("keys".into())),
            Err(Error::KeyContainerUnsupported(_))
        ));
        assert!(matches!(
            crypto.create_public_key_from_signing_key(&SigningKey::File(vec![0; 24])),
            Err(Error::KeyError(_))
        ));
    }

    #[test]
    fn tokens_and_hashes() {
        let crypto = DefaultCrypto;
        let token = crypto.compute_public_key_token(b"key").unwrap();
        let digest = Sha1::digest(b"key");
        assert_eq!(token.len(), 8);
        assert_eq!(token[0], digest[19]);
        assert_eq!(token[7], digest[12]);

        assert_eq!(crypto.hash(HashAlgorithm::Md5, b"").unwrap().len(), 16);
        assert_eq!(crypto.hash(HashAlgorithm::Sha1, b"").unwrap().len(), 20);
        assert!(crypto.hash(HashAlgorithm::None, b"x").unwrap().is_empty());
    }

    #[test]
    fn hash_algorithm_names() {
        assert_eq!(parse_hash_algorithm("SHA1").unwrap(), HashAlgorithm::Sha1);
        assert_eq!(parse_hash_algorithm("md5").unwrap(), HashAlgorithm::Md5);
        assert!(parse_hash_algorithm("sha256").is_err());
        assert_eq!(HashAlgorithm::from_id(0x8004), Some(HashAlgorithm::Sha1));
        assert_eq!(HashAlgorithm::Md5.id(), 0x8003);
    }
}
