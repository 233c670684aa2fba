//! Configuration validation
//!
//! Rules:
//! - input ids are unique and not blank
//! - input type is set
//! - clean_inactive_secs > 0 when given
//! - registry.reap_interval_secs > 0

use std::collections::HashSet;

use contracts::{AgentConfig, ContractError};

/// Validate an AgentConfig
///
/// Returns the first error encountered.
pub fn validate(config: &AgentConfig) -> Result<(), ContractError> {
    validate_registry(config)?;
    validate_input_types(config)?;
    validate_input_ids(config)?;
    validate_clean_inactive(config)?;
    Ok(())
}

fn validate_registry(config: &AgentConfig) -> Result<(), ContractError> {
    if config.registry.reap_interval_secs == 0 {
        return Err(ContractError::config_validation(
            "registry.reap_interval_secs",
            "reap_interval_secs must be > 0",
        ));
    }
    Ok(())
}

fn validate_input_types(config: &AgentConfig) -> Result<(), ContractError> {
    for (idx, input) in config.inputs.iter().enumerate() {
        if input.input_type.trim().is_empty() {
            return Err(ContractError::config_validation(
                format!("inputs[{idx}].type"),
                "input type cannot be empty",
            ));
        }
    }
    Ok(())
}

/// Ids are unique across all inputs, not only within one type
fn validate_input_ids(config: &AgentConfig) -> Result<(), ContractError> {
    let mut seen = HashSet::new();
    for (idx, input) in config.inputs.iter().enumerate() {
        let Some(id) = &input.id else { continue };
        if id.trim().is_empty() {
            return Err(ContractError::config_validation(
                format!("inputs[{idx}].id"),
                "input id cannot be blank",
            ));
        }
        if !seen.insert(id) {
            return Err(ContractError::config_validation(
                format!("inputs[id={id}]"),
                "duplicate input id",
            ));
        }
    }
    Ok(())
}

fn validate_clean_inactive(config: &AgentConfig) -> Result<(), ContractError> {
    for (idx, input) in config.inputs.iter().enumerate() {
        if input.clean_inactive_secs == Some(0) {
            return Err(ContractError::config_validation(
                format!("inputs[{idx}].clean_inactive_secs"),
                "clean_inactive_secs must be > 0",
            ));
        }
    }
    Ok(())
}
