//! Stored password decryption
//!
//! The account password is kept in the environment as a Fernet token and
//! unlocked once at startup with a separately supplied key.

use fernet::Fernet;
use secrecy::SecretString;

use crate::errors::{AppError, AppResult};

/// Decrypt a Fernet token into the account password
///
/// # Errors
///
/// Returns `InvalidInput` if the key is not a valid Fernet key, the token
/// fails authentication, or the plaintext is not UTF-8.
pub fn decrypt_password(token: &str, key: &str) -> AppResult<SecretString> {
    let fernet = Fernet::new(key.trim())
        .ok_or_else(|| AppError::invalid("EMAIL_SECRET_KEY is not a valid Fernet key"))?;
    let plaintext = fernet.decrypt(token.trim()).map_err(|_| {
        AppError::invalid("EMAIL_PASSWORD_ENC could not be decrypted with EMAIL_SECRET_KEY")
    })?;
    let password = String::from_utf8(plaintext)
        .map_err(|_| AppError::invalid("decrypted password is not valid UTF-8"))?;
    Ok(SecretString::new(password.into()))
}
