//! Helpers shared by request validation.

use std::collections::BTreeMap;

/// Validation messages keyed by the offending field's wire name.
pub type FieldErrors = BTreeMap<String, Vec<String>>;

pub const MSG_REQUIRED: &str = "Este campo é obrigatório.";
pub const MSG_BLANK: &str = "Este campo não pode ser em branco.";
pub const MSG_NULL: &str = "Este campo não pode ser nulo.";

/// Append `message` to the list kept for `field`.
pub fn push_field_error(errors: &mut FieldErrors, field: &str, message: impl Into<String>) {
    errors
        .entry(field.to_string())
        .or_default()
        .push(message.into());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn field_errors_accumulate_per_field() {
        let mut errors = FieldErrors::new();
        push_field_error(&mut errors, "titulo", MSG_BLANK);
        push_field_error(&mut errors, "titulo", "outra");
        push_field_error(&mut errors, "autor", MSG_REQUIRED);

        assert_eq!(errors["titulo"], vec![MSG_BLANK.to_string(), "outra".into()]);
        assert_eq!(errors["autor"].len(), 1);
        assert_eq!(
            serde_json::to_value(&errors).unwrap(),
            serde_json::json!({
                "autor": [MSG_REQUIRED],
                "titulo": [MSG_BLANK, "outra"],
            })
        );
    }
}
