use base64::engine::general_purpose::STANDARD_NO_PAD;
use base64::Engine;
use pbkdf2::pbkdf2_hmac;
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::Sha256;
use subtle::ConstantTimeEq;

const SCHEME: &str = "pbkdf2_sha256";
#[cfg(not(test))]
const ITERATIONS: u32 = 200_000;
#[cfg(test)]
const ITERATIONS: u32 = 1_000;
const SALT_BYTES: usize = 16;
const DERIVED_BYTES: usize = 32;

pub const MIN_PASSWORD_LEN: usize = 6;

/// Checks a password chosen at registration or reset.
pub fn check_new_password(password: &str) -> Result<(), String> {
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(format!(
            "Password must be at least {MIN_PASSWORD_LEN} characters long."
        ));
    }
    Ok(())
}

/// `pbkdf2_sha256$<iterations>$<salt>$<digest>`, both base64 without padding.
pub fn hash_password(password: &str) -> anyhow::Result<String> {
    if password.is_empty() {
        anyhow::bail!("Password cannot be empty");
    }

    let mut salt = [0u8; SALT_BYTES];
    OsRng.fill_bytes(&mut salt);
    let digest = derive(password.as_bytes(), &salt, ITERATIONS);

    Ok(format!(
        "{SCHEME}${ITERATIONS}${}${}",
        STANDARD_NO_PAD.encode(salt),
        STANDARD_NO_PAD.encode(digest)
    ))
}

struct StoredHash {
    iterations: u32,
    salt: Vec<u8>,
    digest: Vec<u8>,
}

impl StoredHash {
    fn parse(encoded: &str) -> Option<Self> {
        let mut parts = encoded.splitn(4, '$');
        if parts.next()? != SCHEME {
            return None;
        }
        let iterations = parts.next()?.parse().ok()?;
        let salt = STANDARD_NO_PAD.decode(parts.next()?).ok()?;
        let digest = STANDARD_NO_PAD.decode(parts.next()?).ok()?;
        Some(Self {
            iterations,
            salt,
            digest,
        })
    }
}

pub fn verify_password(password: &str, password_hash: &str) -> bool {
    if password.is_empty() {
        return false;
    }
    let Some(stored) = StoredHash::parse(password_hash) else {
        return false;
    };
    let digest = derive(password.as_bytes(), &stored.salt, stored.iterations);
    digest.ct_eq(stored.digest.as_slice()).into()
}

fn derive(password: &[u8], salt: &[u8], iterations: u32) -> [u8; DERIVED_BYTES] {
    let mut out = [0u8; DERIVED_BYTES];
    pbkdf2_hmac::<Sha256>(password, salt, iterations, &mut out);
    out
}
