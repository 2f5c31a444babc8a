//! Schemas for pluggable component configuration.
//!
//! Each storage backend owns a TOML section under `storage.implementations`. Its
//! factory checks that section against a [`Schema`] before reading any value, so
//! a typo in a deployment file is reported by field name at startup.

use thiserror::Error;

/// Errors that can occur during configuration validation.
#[derive(Debug, Error)]
pub enum ValidationError {
	#[error("Missing required field: {0}")]
	MissingField(String),
	#[error("Invalid value for field '{field}': {message}")]
	InvalidValue { field: String, message: String },
	#[error("Type mismatch for field '{field}': expected {expected}, got {actual}")]
	TypeMismatch {
		field: String,
		expected: &'static str,
		actual: String,
	},
}

/// Expected type of a configuration field.
#[derive(Debug, Clone, Copy)]
pub enum FieldType {
	String,
}

impl FieldType {
	fn name(self) -> &'static str {
		match self {
			FieldType::String => "string",
		}
	}

	fn check(self, field: &str, value: &toml::Value) -> Result<(), ValidationError> {
		let matches = match self {
			FieldType::String => value.is_str(),
		};
		if !matches {
			return Err(ValidationError::TypeMismatch {
				field: field.to_string(),
				expected: self.name(),
				actual: value.type_str().to_string(),
			});
		}
		Ok(())
	}
}

/// Custom check run after the type check passes.
pub type FieldValidator = Box<dyn Fn(&toml::Value) -> Result<(), String> + Send + Sync>;

/// A named field in a schema.
pub struct Field {
	pub name: String,
	pub field_type: FieldType,
	pub validator: Option<FieldValidator>,
}

impl std::fmt::Debug for Field {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Field")
			.field("name", &self.name)
			.field("field_type", &self.field_type)
			.finish_non_exhaustive()
	}
}

impl Field {
	pub fn new(name: impl Into<String>, field_type: FieldType) -> Self {
		Self {
			name: name.into(),
			field_type,
			validator: None,
		}
	}

	pub fn with_validator<F>(mut self, validator: F) -> Self
	where
		F: Fn(&toml::Value) -> Result<(), String> + Send + Sync + 'static,
	{
		self.validator = Some(Box::new(validator));
		self
	}

	fn check(&self, value: &toml::Value) -> Result<(), ValidationError> {
		self.field_type.check(&self.name, value)?;
		match &self.validator {
			Some(validator) => validator(value).map_err(|message| ValidationError::InvalidValue {
				field: self.name.clone(),
				message,
			}),
			None => Ok(()),
		}
	}
}

/// Required and optional fields of a TOML table. Unknown keys are ignored.
#[derive(Debug)]
pub struct Schema {
	pub required: Vec<Field>,
	pub optional: Vec<Field>,
}

impl Schema {
	pub fn new(required: Vec<Field>, optional: Vec<Field>) -> Self {
		Self { required, optional }
	}

	pub fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		let Some(table) = config.as_table() else {
			return Err(ValidationError::TypeMismatch {
				field: "<section>".to_string(),
				expected: "table",
				actual: config.type_str().to_string(),
			});
		};

		for field in &self.required {
			match table.get(&field.name) {
				Some(value) => field.check(value)?,
				None => return Err(ValidationError::MissingField(field.name.clone())),
			}
		}
		for field in &self.optional {
			if let Some(value) = table.get(&field.name) {
				field.check(value)?;
			}
		}
		Ok(())
	}
}

/// Implemented by components that validate their own configuration section.
pub trait ConfigSchema: Send + Sync {
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError>;
}

#[cfg(test)]
mod tests {
	use super::*;

	fn parse(input: &str) -> toml::Value {
		toml::from_str(input).unwrap()
	}

	#[test]
	fn test_required_and_types() {
		let schema = Schema::new(
			vec![Field::new("path", FieldType::String)],
			vec![Field::new("label", FieldType::String)],
		);

		assert!(schema.validate(&parse("path = \"/tmp\"")).is_ok());
		assert!(matches!(
			schema.validate(&parse("label = \"a\"")),
			Err(ValidationError::MissingField(f)) if f == "path"
		));
		assert!(matches!(
			schema.validate(&parse("path = \"/tmp\"\nlabel = 9")),
			Err(ValidationError::TypeMismatch { field, .. }) if field == "label"
		));
		assert!(matches!(
			schema.validate(&parse("path = 3")),
			Err(ValidationError::TypeMismatch { expected: "string", .. })
		));
	}

	#[test]
	fn test_custom_validator() {
		let schema = Schema::new(
			vec![],
			vec![Field::new("name", FieldType::String).with_validator(|v| {
				if v.as_str().is_some_and(str::is_empty) {
					Err("must not be empty".into())
				} else {
					Ok(())
				}
			})],
		);

		assert!(schema.validate(&parse("name = \"x\"")).is_ok());
		assert!(schema.validate(&parse("other = 1")).is_ok());
		assert!(matches!(
			schema.validate(&parse("name = \"\"")),
			Err(ValidationError::InvalidValue { field, .. }) if field == "name"
		));
		assert!(schema.validate(&toml::Value::Integer(1)).is_err());
	}
}
