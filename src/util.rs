use std::collections::HashMap;
use crate::error::{Error, Result};

/// Checks that `name` can be used as a single file name inside a store directory.
pub fn validate_file_name(name: &str) -> Result<()> {
    let path_like = name.is_empty()
        || name == "."
        || name == ".."
        || name.contains(['/', '\\', '\0']);
    if path_like {
        return Err(Error::InvalidName { name: name.to_string() });
    }
    Ok(())
}

/// Splits `key=value` pairs into a map. Later keys win.
pub fn parse_key_values<S: AsRef<str>>(pairs: &[S]) -> Result<HashMap<String, String>, String> {
    let mut values = HashMap::new();
    for pair in pairs {
        let pair = pair.as_ref();
        let (key, value) = pair
            .split_once('=')
            .ok_or_else(|| format!("expected key=value, got '{pair}'"))?;
        if key.is_empty() {
            return Err(format!("empty parameter name in '{pair}'"));
        }
        values.insert(key.to_string(), value.to_string());
    }
    Ok(values)
}
