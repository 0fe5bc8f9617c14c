use sha2::{Digest, Sha256};

/// A single path segment supplied by a client, e.g. a new file name.
pub fn validate_entry_name(name: &str) -> Result<&str, String> {
    if name.is_empty() {
        return Err("name must not be empty".to_string());
    }
    if name == "." || name == ".." {
        return Err(format!("'{}' is not a valid name", name));
    }
    if name.contains(&['/', '\\', '\0'][..]) {
        return Err("name must not contain path separators".to_string());
    }
    if name.len() > 255 {
        return Err("name is too long".to_string());
    }
    Ok(name)
}

/// Lowercases and checks a username. Usernames become directory names, so
/// only `[a-z0-9_.-]` is accepted.
pub fn normalize_username(raw: &str) -> Result<String, String> {
    let username = raw.trim().to_lowercase();
    if username.is_empty() || username.len() > 64 {
        return Err("username must be between 1 and 64 characters".to_string());
    }
    if username == "." || username == ".." {
        return Err("invalid username".to_string());
    }
    if !username
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'))
    {
        return Err("username may only contain letters, digits, '.', '_' and '-'".to_string());
    }
    Ok(username)
}

pub fn hash_token(token: &str) -> String {
    hex::encode(Sha256::digest(token.as_bytes()))
}
