//! Validation of backend-specific configuration tables.
//!
//! Storage backends receive their `[storage.implementations.<name>]` table as a
//! raw `toml::Value`. Each backend describes the fields it accepts with a
//! [`Schema`] and checks the table before constructing itself, so a typo in a
//! config file fails at startup instead of silently falling back to defaults.

use thiserror::Error;

/// Errors that can occur during configuration validation.
#[derive(Debug, Error)]
pub enum ValidationError {
	/// A required field is missing.
	#[error("Missing required field: {0}")]
	MissingField(String),
	/// A field has a value outside its allowed range or format.
	#[error("Invalid value for field '{field}': {message}")]
	InvalidValue { field: String, message: String },
	/// A field has the wrong TOML type.
	#[error("Type mismatch for field '{field}': expected {expected}, got {actual}")]
	TypeMismatch {
		field: String,
		expected: &'static str,
		actual: String,
	},
	/// The table contains a field the schema does not know about.
	#[error("Unknown field: {0}")]
	UnknownField(String),
}

impl ValidationError {
	/// Prefixes the field path of this error with `parent.`.
	fn nested_in(self, parent: &str) -> Self {
		let join = |field: String| format!("{}.{}", parent, field);
		match self {
			ValidationError::MissingField(f) => ValidationError::MissingField(join(f)),
			ValidationError::UnknownField(f) => ValidationError::UnknownField(join(f)),
			ValidationError::InvalidValue { field, message } => ValidationError::InvalidValue {
				field: join(field),
				message,
			},
			ValidationError::TypeMismatch {
				field,
				expected,
				actual,
			} => ValidationError::TypeMismatch {
				field: join(field),
				expected,
				actual,
			},
		}
	}
}

/// Expected TOML type of a field.
#[derive(Debug)]
pub enum FieldType {
	String,
	/// Integer with optional inclusive bounds.
	Integer {
		min: Option<i64>,
		max: Option<i64>,
	},
	Boolean,
	/// Nested table with its own schema.
	Table(Schema),
}

/// Custom check run after the type check succeeds.
pub type FieldValidator = Box<dyn Fn(&toml::Value) -> Result<(), String> + Send + Sync>;

/// A named field in a [`Schema`].
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
			.field("validator", &self.validator.is_some())
			.finish()
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

	/// Attaches a custom validator that runs after the type check.
	pub fn with_validator<F>(mut self, validator: F) -> Self
	where
		F: Fn(&toml::Value) -> Result<(), String> + Send + Sync + 'static,
	{
		self.validator = Some(Box::new(validator));
		self
	}

	fn check(&self, value: &toml::Value) -> Result<(), ValidationError> {
		let mismatch = |expected: &'static str| ValidationError::TypeMismatch {
			field: self.name.clone(),
			expected,
			actual: value.type_str().to_string(),
		};

		match &self.field_type {
			FieldType::String => {
				value.as_str().ok_or_else(|| mismatch("string"))?;
			},
			FieldType::Boolean => {
				value.as_bool().ok_or_else(|| mismatch("boolean"))?;
			},
			FieldType::Integer { min, max } => {
				let int_val = value.as_integer().ok_or_else(|| mismatch("integer"))?;
				if let Some(min) = min.filter(|min| int_val < *min) {
					return Err(ValidationError::InvalidValue {
						field: self.name.clone(),
						message: format!("Value {} is less than minimum {}", int_val, min),
					});
				}
				if let Some(max) = max.filter(|max| int_val > *max) {
					return Err(ValidationError::InvalidValue {
						field: self.name.clone(),
						message: format!("Value {} is greater than maximum {}", int_val, max),
					});
				}
			},
			FieldType::Table(schema) => {
				schema
					.validate(value)
					.map_err(|e| e.nested_in(&self.name))?;
			},
		}

		if let Some(validator) = &self.validator {
			validator(value).map_err(|message| ValidationError::InvalidValue {
				field: self.name.clone(),
				message,
			})?;
		}

		Ok(())
	}
}

/// Required and optional fields accepted by a configuration table.
///
/// Fields not listed in either set are rejected.
#[derive(Debug)]
pub struct Schema {
	pub required: Vec<Field>,
	pub optional: Vec<Field>,
}

impl Schema {
	pub fn new(required: Vec<Field>, optional: Vec<Field>) -> Self {
		Self { required, optional }
	}

	/// Validates a TOML value against this schema.
	///
	/// # Errors
	///
	/// Returns an error if the value is not a table, a required field is
	/// missing, a field has the wrong type or fails its validator, or the
	/// table contains a field the schema does not declare.
	pub fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		let table = config
			.as_table()
			.ok_or_else(|| ValidationError::TypeMismatch {
				field: "root".to_string(),
				expected: "table",
				actual: config.type_str().to_string(),
			})?;

		for field in &self.required {
			let value = table
				.get(&field.name)
				.ok_or_else(|| ValidationError::MissingField(field.name.clone()))?;
			field.check(value)?;
		}

		for field in &self.optional {
			if let Some(value) = table.get(&field.name) {
				field.check(value)?;
			}
		}

		let known = |key: &str| {
			self.required
				.iter()
				.chain(self.optional.iter())
				.any(|field| field.name == key)
		};
		if let Some(unknown) = table.keys().find(|key| !known(key.as_str())) {
			return Err(ValidationError::UnknownField(unknown.clone()));
		}

		Ok(())
	}
}

/// A configuration schema that can validate a backend's TOML table.
pub trait ConfigSchema: Send + Sync {
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError>;
}

#[cfg(test)]
mod tests {
	use super::*;

	fn schema() -> Schema {
		Schema::new(
			vec![Field::new("path", FieldType::String)],
			vec![
				Field::new(
					"retries",
					FieldType::Integer {
						min: Some(0),
						max: Some(5),
					},
				),
				Field::new(
					"limits",
					FieldType::Table(Schema::new(vec![Field::new("fsync", FieldType::Boolean)], vec![])),
				),
			],
		)
	}

	#[test]
	fn test_valid_table() {
		let value: toml::Value = toml::from_str(
			r#"
path = "./data"
retries = 3
[limits]
fsync = true
"#,
		)
		.unwrap();
		assert!(schema().validate(&value).is_ok());
	}

	#[test]
	fn test_missing_required_field() {
		let value: toml::Value = toml::from_str("retries = 1").unwrap();
		let err = schema().validate(&value).unwrap_err();
		assert!(matches!(err, ValidationError::MissingField(ref f) if f == "path"));
	}

	#[test]
	fn test_integer_bounds() {
		let value: toml::Value = toml::from_str("path = \"x\"\nretries = 9").unwrap();
		let err = schema().validate(&value).unwrap_err();
		assert!(err.to_string().contains("greater than maximum 5"));
	}

	#[test]
	fn test_nested_error_carries_path() {
		let value: toml::Value = toml::from_str("path = \"x\"\n[limits]\nfsync = 1").unwrap();
		let err = schema().validate(&value).unwrap_err();
		assert_eq!(
			err.to_string(),
			"Type mismatch for field 'limits.fsync': expected boolean, got integer"
		);
	}

	#[test]
	fn test_unknown_field_rejected() {
		let value: toml::Value = toml::from_str("path = \"x\"\nstorage_pth = \"y\"").unwrap();
		let err = schema().validate(&value).unwrap_err();
		assert!(matches!(err, ValidationError::UnknownField(ref f) if f == "storage_pth"));
	}

	#[test]
	fn test_custom_validator() {
		let schema = Schema::new(
			vec![Field::new("path", FieldType::String).with_validator(|v| {
				match v.as_str() {
					Some(s) if !s.is_empty() => Ok(()),
					_ => Err("must not be empty".to_string()),
				}
			})],
			vec![],
		);
		let value: toml::Value = toml::from_str("path = \"\"").unwrap();
		let err = schema.validate(&value).unwrap_err();
		assert!(err.to_string().contains("must not be empty"));
	}
}
