//! Validation helpers for DTOs.

use validator::ValidationError;

use crate::dao::query::Patch;

/// Validates that a patch leaves identity, ownership and procedure-owned
/// fields alone.
///
/// # Examples
///
/// ```ignore
/// validate_patch(&Patch::new().set("name", "Ally"))  // Ok
/// validate_patch(&Patch::new().set("is_host", true)) // Err - immutable
/// validate_patch(&Patch::new().set("score", 2))      // Err - procedure-owned
/// validate_patch(&Patch::new())                      // Err - empty
/// ```
pub fn validate_patch(patch: &Patch) -> Result<(), ValidationError> {
    if patch.fields.is_empty() {
        let mut err = ValidationError::new("patch_empty");
        err.message = Some("Patch must set at least one field".into());
        return Err(err);
    }

    if let Some(field) = patch.immutable_violation() {
        let mut err = ValidationError::new("patch_immutable_field");
        err.message = Some(format!("Field `{field}` cannot be updated").into());
        return Err(err);
    }

    if let Some(field) = patch.procedure_violation() {
        let mut err = ValidationError::new("patch_procedure_field");
        err.message = Some(format!("Field `{field}` only changes through its procedure").into());
        return Err(err);
    }

    Ok(())
}

/// Validates a display name once surrounding whitespace is trimmed.
pub fn validate_player_name(name: &str) -> Result<(), ValidationError> {
    let length = name.trim().chars().count();
    if !(1..=10).contains(&length) {
        let mut err = ValidationError::new("player_name_length");
        err.message = Some(format!("Name must be 1 to 10 characters (got {length})").into());
        return Err(err);
    }

    Ok(())
}
