//! TOTP second factor and single-use backup codes.
//!
//! Flow Overview:
//! 1) Setup generates a fresh 160-bit secret and a batch of backup codes;
//!    plaintext codes are returned exactly once, only hashes are stored.
//! 2) The secret stays pending (it does not gate login) until one valid
//!    TOTP code confirms the enrollment.
//! 3) At login, either a 6-digit TOTP code (±1 step of 30 s) or a backup
//!    code is accepted; a matched backup code is consumed permanently.
//!
//! Security boundaries:
//! - Backup codes are Argon2id-hashed at rest and single-use.
//! - The backup-code match loop always scans every stored hash; it never
//!   stops at the first hit.

use anyhow::{anyhow, Result};
use argon2::{password_hash::SaltString, Argon2, PasswordHash, PasswordHasher, PasswordVerifier};
use rand::{rngs::OsRng, RngCore};
use totp_rs::{Algorithm, Secret, TOTP};

const TOTP_DIGITS: usize = 6;
const TOTP_SKEW: u8 = 1;
const TOTP_STEP: u64 = 30;
const BACKUP_CODE_BYTES: usize = 4;

/// Everything the caller gets back from starting a setup. The secret and
/// codes in here are the only plaintext copies that will ever exist.
#[derive(Debug, Clone)]
pub struct TwoFactorSetup {
    /// Base32 secret for manual entry.
    pub secret: String,
    /// `otpauth://` URI for QR rendering (rendering itself is external).
    pub provisioning_uri: String,
    pub backup_codes: Vec<String>,
}

/// A freshly generated backup-code batch (plaintext + hashes).
#[derive(Debug)]
pub struct BackupCodeBatch {
    pub codes: Vec<String>,
    pub hashes: Vec<String>,
}

#[derive(Clone, Debug)]
pub struct TwoFactorEngine {
    issuer: String,
    backup_code_count: usize,
}

impl TwoFactorEngine {
    #[must_use]
    pub fn new(issuer: String, backup_code_count: usize) -> Self {
        Self {
            issuer,
            backup_code_count,
        }
    }

    /// Generate a new random secret, base32-encoded.
    ///
    /// # Errors
    /// Returns an error if secret material cannot be produced.
    pub fn generate_secret(&self) -> Result<String> {
        let secret = Secret::generate_secret();
        let secret_bytes = secret
            .to_bytes()
            .map_err(|err| anyhow!("secret generation error: {err:?}"))?;
        let totp = self.build_totp(secret_bytes, "account")?;
        Ok(totp.get_secret_base32())
    }

    /// Provisioning URI embedding issuer, account label, and secret.
    ///
    /// # Errors
    /// Returns an error when the secret is not valid base32.
    pub fn provisioning_uri(&self, secret_base32: &str, account_label: &str) -> Result<String> {
        let totp = self.parse_totp(secret_base32, account_label)?;
        Ok(totp.get_url())
    }

    /// Check a 6-digit code against the secret at the current time,
    /// tolerating ±1 step of clock drift.
    #[must_use]
    pub fn verify_totp(&self, secret_base32: &str, code: &str) -> bool {
        if !well_formed_code(code) {
            return false;
        }
        let Ok(totp) = self.parse_totp(secret_base32, "account") else {
            return false;
        };
        totp.check_current(code).unwrap_or(false)
    }

    /// Clock-explicit variant for deterministic verification.
    #[must_use]
    pub fn verify_totp_at(&self, secret_base32: &str, code: &str, unix_time: u64) -> bool {
        if !well_formed_code(code) {
            return false;
        }
        let Ok(totp) = self.parse_totp(secret_base32, "account") else {
            return false;
        };
        totp.check(code, unix_time)
    }

    /// Generate the backup-code batch for a setup.
    ///
    /// # Errors
    /// Returns an error if random material or hashing fails.
    pub fn generate_backup_codes(&self) -> Result<BackupCodeBatch> {
        let mut codes = Vec::with_capacity(self.backup_code_count);
        let mut hashes = Vec::with_capacity(self.backup_code_count);
        for _ in 0..self.backup_code_count {
            let code = generate_backup_code()?;
            let hash = hash_backup_code(&code)?;
            codes.push(code);
            hashes.push(hash);
        }
        Ok(BackupCodeBatch { codes, hashes })
    }

    /// Find the stored hash matching a presented backup code.
    ///
    /// Scans every hash even after a hit so duplicate-looking inputs can
    /// never leave the stored set in an ambiguous state. Consumption of
    /// the returned hash is the store's atomic operation, not ours.
    #[must_use]
    pub fn find_backup_code_match(&self, code: &str, hashes: &[String]) -> Option<String> {
        let mut matched = None;
        for hash in hashes {
            if verify_backup_code(code, hash) && matched.is_none() {
                matched = Some(hash.clone());
            }
        }
        matched
    }

    fn parse_totp(&self, secret_base32: &str, account_label: &str) -> Result<TOTP> {
        let secret_bytes = Secret::Encoded(secret_base32.to_string())
            .to_bytes()
            .map_err(|err| anyhow!("invalid TOTP secret: {err:?}"))?;
        self.build_totp(secret_bytes, account_label)
    }

    fn build_totp(&self, secret_bytes: Vec<u8>, account_label: &str) -> Result<TOTP> {
        TOTP::new(
            Algorithm::SHA1,
            TOTP_DIGITS,
            TOTP_SKEW,
            TOTP_STEP,
            secret_bytes,
            Some(self.issuer.clone()),
            account_label.to_string(),
        )
        .map_err(|err| anyhow!("TOTP init error: {err}"))
    }
}

fn well_formed_code(code: &str) -> bool {
    code.len() == TOTP_DIGITS && code.chars().all(|ch| ch.is_ascii_digit())
}

/// Normalize a backup code for hashing and comparison.
fn normalize_backup_code(input: &str) -> String {
    input
        .chars()
        .filter(char::is_ascii_alphanumeric)
        .map(|ch| ch.to_ascii_uppercase())
        .collect()
}

/// Generate one human-typable backup code in `XXXX-XXXX` form.
fn generate_backup_code() -> Result<String> {
    let mut raw = [0u8; BACKUP_CODE_BYTES];
    OsRng
        .try_fill_bytes(&mut raw)
        .map_err(|err| anyhow!("failed to generate backup code: {err}"))?;
    let hex: String = raw.iter().map(|byte| format!("{byte:02X}")).collect();
    Ok(format!("{}-{}", &hex[..4], &hex[4..]))
}

fn hash_backup_code(code: &str) -> Result<String> {
    let normalized = normalize_backup_code(code);
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(normalized.as_bytes(), &salt)
        .map_err(|_| anyhow!("failed to hash backup code"))?
        .to_string();
    Ok(hash)
}

fn verify_backup_code(code: &str, stored_hash: &str) -> bool {
    let normalized = normalize_backup_code(code);
    let Ok(parsed) = PasswordHash::new(stored_hash) else {
        return false;
    };
    Argon2::default()
        .verify_password(normalized.as_bytes(), &parsed)
        .is_ok()
}
