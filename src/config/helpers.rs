use crate::error::ConfigError;

/// Read an env var, treating empty/whitespace values as unset.
pub(crate) fn optional_env(key: &str) -> Result<Option<String>, ConfigError> {
    match std::env::var(key) {
        Ok(value) if value.trim().is_empty() => Ok(None),
        Ok(value) => Ok(Some(value.trim().to_string())),
        Err(std::env::VarError::NotPresent) => Ok(None),
        Err(e) => Err(ConfigError::InvalidValue {
            key: key.to_string(),
            message: format!("not valid unicode: {e}"),
        }),
    }
}

/// Parse an optional env var into `T`, reporting the key on failure.
pub(crate) fn parse_optional_env<T>(key: &str, expected: &str) -> Result<Option<T>, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    optional_env(key)?
        .map(|s| s.parse::<T>())
        .transpose()
        .map_err(|e| ConfigError::InvalidValue {
            key: key.to_string(),
            message: format!("must be {expected}: {e}"),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_values_are_unset() {
        let _guard = crate::config::tests::ENV_MUTEX
            .lock()
            .expect("env mutex poisoned");
        // SAFETY: Guarded by ENV_MUTEX in tests.
        unsafe {
            std::env::set_var("CONSOLE_AUTH_TEST_BLANK", "   ");
        }
        assert_eq!(optional_env("CONSOLE_AUTH_TEST_BLANK").unwrap(), None);
        // SAFETY: Guarded by ENV_MUTEX in tests.
        unsafe {
            std::env::remove_var("CONSOLE_AUTH_TEST_BLANK");
        }
    }

    #[test]
    fn parse_failure_names_the_key() {
        let _guard = crate::config::tests::ENV_MUTEX
            .lock()
            .expect("env mutex poisoned");
        // SAFETY: Guarded by ENV_MUTEX in tests.
        unsafe {
            std::env::set_var("CONSOLE_AUTH_TEST_NUMBER", "twelve");
        }
        let err = parse_optional_env::<u64>("CONSOLE_AUTH_TEST_NUMBER", "an integer").unwrap_err();
        match err {
            ConfigError::InvalidValue { key, .. } => assert_eq!(key, "CONSOLE_AUTH_TEST_NUMBER"),
            other => panic!("unexpected error: {other}"),
        }
        // SAFETY: Guarded by ENV_MUTEX in tests.
        unsafe {
            std::env::remove_var("CONSOLE_AUTH_TEST_NUMBER");
        }
    }
}
