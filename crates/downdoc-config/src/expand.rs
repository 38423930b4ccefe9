//! Environment variable expansion for configuration strings.

use crate::ConfigError;

/// Expand `~`, `${VAR}` and `${VAR:-default}` in `value`.
///
/// `field` names the configuration key in error messages.
pub(crate) fn expand_env(value: &str, field: &str) -> Result<String, ConfigError> {
    shellexpand::full(value)
        .map(std::borrow::Cow::into_owned)
        .map_err(|err| ConfigError::EnvVar {
            field: field.to_owned(),
            message: format!("${{{}}} not set", err.var_name),
        })
}
