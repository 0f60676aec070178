use anyhow::{Result, anyhow};
use keyring::{Entry, Error as KeyringError};

const SERVICE: &str = "mail_intake";

/// Save the API password for the system account into the OS keyring
pub fn save_password(email: &str, password: &str) -> Result<()> {
    let entry = Entry::new(SERVICE, email);
    entry?
        .set_password(password)
        .map_err(|e| anyhow!(e.to_string()))?;
    Ok(())
}

/// Load the API password for the system account from the keyring
pub fn load_password(email: &str) -> Result<Option<String>> {
    let entry = Entry::new(SERVICE, email);
    match entry?.get_password() {
        Ok(v) => Ok(Some(v)),
        Err(KeyringError::NoEntry) => Ok(None),
        Err(e) => Err(anyhow!(e.to_string())),
    }
}
