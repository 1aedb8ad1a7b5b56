//! Migration steps: item selection, field transforms and validation.

use std::fmt;
use std::sync::Arc;

use tiermem_core::{Error, MemoryItem, MemoryTier, Result, Value};

/// Predicate over stored items
pub type ItemPredicate = Arc<dyn Fn(&MemoryItem) -> bool + Send + Sync>;

/// Pure function from a field's old value to its new value
pub type FieldModifier = Arc<dyn Fn(&Value) -> Value + Send + Sync>;

/// Predicate over transformed payloads
pub type PayloadCheck = Arc<dyn Fn(&Value) -> bool + Send + Sync>;

/// Which items a step applies to
#[derive(Clone)]
pub enum Selector {
    All,
    Tier(MemoryTier),
    /// Mapping payloads carrying this field
    HasField(String),
    Custom(ItemPredicate),
}

impl Selector {
    pub fn custom(predicate: impl Fn(&MemoryItem) -> bool + Send + Sync + 'static) -> Self {
        Self::Custom(Arc::new(predicate))
    }

    pub fn matches(&self, item: &MemoryItem) -> bool {
        match self {
            Self::All => true,
            Self::Tier(tier) => item.tier() == *tier,
            Self::HasField(field) => item.payload.get(field).is_some(),
            Self::Custom(predicate) => predicate(item),
        }
    }
}

impl fmt::Debug for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::All => write!(f, "All"),
            Self::Tier(tier) => write!(f, "Tier({})", tier),
            Self::HasField(field) => write!(f, "HasField({:?})", field),
            Self::Custom(_) => write!(f, "Custom(..)"),
        }
    }
}

/// One field-level rewrite of a mapping payload
#[derive(Clone)]
pub enum Transform {
    /// Move a field to a new name; the field must exist
    Rename { from: String, to: String },
    /// Set a field to a literal value, replacing any existing value
    Add { field: String, value: Value },
    /// Drop a field if present
    Remove { field: String },
    /// Replace a field with a function of its old value; the field must exist
    Modify { field: String, modifier: FieldModifier },
}

impl Transform {
    pub fn rename(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self::Rename {
            from: from.into(),
            to: to.into(),
        }
    }

    pub fn add(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::Add {
            field: field.into(),
            value: value.into(),
        }
    }

    pub fn remove(field: impl Into<String>) -> Self {
        Self::Remove { field: field.into() }
    }

    pub fn modify(field: impl Into<String>, modifier: impl Fn(&Value) -> Value + Send + Sync + 'static) -> Self {
        Self::Modify {
            field: field.into(),
            modifier: Arc::new(modifier),
        }
    }

    /// Apply to `payload` in place.
    pub fn apply(&self, payload: &mut Value) -> Result<()> {
        let kind = payload.kind_name();
        let fields = payload
            .as_map_mut()
            .ok_or_else(|| Error::transform(format!("expected a mapping payload, found {}", kind)))?;

        match self {
            Self::Rename { from, to } => {
                let value = fields
                    .remove(from)
                    .ok_or_else(|| Error::transform(format!("cannot rename missing field '{}'", from)))?;
                fields.insert(to.clone(), value);
            }
            Self::Add { field, value } => {
                fields.insert(field.clone(), value.clone());
            }
            Self::Remove { field } => {
                fields.remove(field);
            }
            Self::Modify { field, modifier } => {
                let current = fields
                    .get_mut(field)
                    .ok_or_else(|| Error::transform(format!("cannot modify missing field '{}'", field)))?;
                *current = modifier(current);
            }
        }
        Ok(())
    }
}

impl fmt::Debug for Transform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Rename { from, to } => write!(f, "Rename({:?} -> {:?})", from, to),
            Self::Add { field, value } => write!(f, "Add({:?} = {:?})", field, value),
            Self::Remove { field } => write!(f, "Remove({:?})", field),
            Self::Modify { field, .. } => write!(f, "Modify({:?})", field),
        }
    }
}

/// Check a transformed payload must pass before it is written back
#[derive(Clone, Default)]
pub enum ValidationRule {
    #[default]
    Always,
    RequireFields(Vec<String>),
    Custom(PayloadCheck),
}

impl ValidationRule {
    pub fn custom(check: impl Fn(&Value) -> bool + Send + Sync + 'static) -> Self {
        Self::Custom(Arc::new(check))
    }

    pub fn is_valid(&self, payload: &Value) -> bool {
        match self {
            Self::Always => true,
            Self::RequireFields(fields) => fields.iter().all(|field| payload.get(field).is_some()),
            Self::Custom(check) => check(payload),
        }
    }
}

impl fmt::Debug for ValidationRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Always => write!(f, "Always"),
            Self::RequireFields(fields) => write!(f, "RequireFields({:?})", fields),
            Self::Custom(_) => write!(f, "Custom(..)"),
        }
    }
}

/// A named, selectable batch of transforms
#[derive(Debug, Clone)]
pub struct MigrationStep {
    pub name: String,
    pub selector: Selector,
    pub transforms: Vec<Transform>,
    pub validation: ValidationRule,
}

impl MigrationStep {
    pub fn new(name: impl Into<String>, selector: Selector) -> Self {
        Self {
            name: name.into(),
            selector,
            transforms: Vec::new(),
            validation: ValidationRule::Always,
        }
    }

    /// Append a transform
    pub fn transform(mut self, transform: Transform) -> Self {
        self.transforms.push(transform);
        self
    }

    /// Set the validation rule
    pub fn validate(mut self, rule: ValidationRule) -> Self {
        self.validation = rule;
        self
    }

    /// Run every transform on a copy of `payload`.
    ///
    /// The original is untouched on failure.
    pub fn apply(&self, payload: &Value) -> Result<Value> {
        let mut migrated = payload.clone();
        for transform in &self.transforms {
            transform.apply(&mut migrated)?;
        }
        Ok(migrated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use serde_json::json;
    use tiermem_core::TierMetadata;

    fn payload(json: serde_json::Value) -> Value {
        Value::from(json)
    }

    #[test]
    fn test_transforms() {
        let step = MigrationStep::new("v2 layout", Selector::All)
            .transform(Transform::rename("name", "title"))
            .transform(Transform::add("status", "active"))
            .transform(Transform::remove("legacy"))
            .transform(Transform::modify("count", |v| match v {
                Value::Int(n) => Value::Int(n * 10),
                other => other.clone(),
            }));

        let before = payload(json!({"name": "Persona A", "legacy": true, "count": 2}));
        let after = step.apply(&before).unwrap();
        assert_eq!(after, payload(json!({"title": "Persona A", "status": "active", "count": 20})));
    }

    #[test]
    fn test_transform_failures() {
        let data = payload(json!({"a": 1}));
        assert!(matches!(
            MigrationStep::new("r", Selector::All)
                .transform(Transform::rename("missing", "b"))
                .apply(&data),
            Err(Error::Transform(_))
        ));
        assert!(
            MigrationStep::new("m", Selector::All)
                .transform(Transform::modify("missing", |v| v.clone()))
                .apply(&data)
                .is_err()
        );
        assert!(Transform::add("x", 1i64).apply(&mut payload(json!([1]))).is_err());

        // Removing a missing field is fine
        assert!(Transform::remove("missing").apply(&mut data.clone()).is_ok());
    }

    #[test]
    fn test_selectors() {
        let item = MemoryItem {
            key: "k".into(),
            payload: payload(json!({"role": "admin"})),
            timestamp: Utc::now(),
            metadata: TierMetadata::ShortTerm,
        };
        assert!(Selector::All.matches(&item));
        assert!(Selector::Tier(MemoryTier::ShortTerm).matches(&item));
        assert!(!Selector::Tier(MemoryTier::LongTerm).matches(&item));
        assert!(Selector::HasField("role".into()).matches(&item));
        assert!(!Selector::HasField("team".into()).matches(&item));
        assert!(Selector::custom(|item| item.key == "k").matches(&item));
    }

    #[test]
    fn test_validation_rules() {
        let data = payload(json!({"title": "x"}));
        assert!(ValidationRule::Always.is_valid(&data));
        assert!(ValidationRule::RequireFields(vec!["title".into()]).is_valid(&data));
        assert!(!ValidationRule::RequireFields(vec!["title".into(), "status".into()]).is_valid(&data));
        assert!(!ValidationRule::custom(|v| v.get("title") == Some(&Value::from("y"))).is_valid(&data));
    }
}
