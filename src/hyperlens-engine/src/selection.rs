//! Serializable selection descriptors.

use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};

use common_error::{LensResult, ensure};
use hyperlens_core::{AttributeKey, EntityKey};
use hyperlens_store::{AttributeScope, Operand, Predicate, Selection};

/// A pending selection: which attribute, seen from which entity, and the
/// predicate its values must satisfy.
///
/// Descriptors round-trip through JSON so a filter session can be saved and
/// replayed later.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectionDescriptor {
    pub scope: AttributeScope,
    /// Alias of the attribute, for display.
    pub alias: String,
    pub predicate: Option<Predicate>,
}

impl SelectionDescriptor {
    pub fn new(scope: AttributeScope, alias: impl Into<String>, predicate: Option<Predicate>) -> Self {
        Self {
            scope,
            alias: alias.into(),
            predicate,
        }
    }

    /// Selected attribute.
    pub fn attribute(&self) -> AttributeKey {
        self.scope.key()
    }

    /// Entity whose rows the selection picks.
    pub fn owner(&self) -> EntityKey {
        self.scope.owner_key()
    }

    /// Check that the predicate can run against the attribute's values.
    ///
    /// Only value ids and numeric or boolean values can be read as flags.
    pub fn validate(&self) -> LensResult<()> {
        let Some(predicate) = &self.predicate else {
            return Ok(());
        };
        let flags_ok = self.scope.value_type.is_numeric()
            || predicate.flags().iter().all(|o| *o == Operand::ValueId);
        ensure!(
            flags_ok,
            Operation: "selection on `{}` reads {} values as a flag",
            self.alias,
            self.scope.value_type
        );
        Ok(())
    }

    /// Store selection.
    pub fn to_selection(&self) -> Selection {
        Selection {
            scope: self.scope.clone(),
            predicate: self.predicate.clone(),
        }
    }
}

impl fmt::Display for SelectionDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.alias, self.owner())?;
        match &self.predicate {
            Some(p) => write!(f, " WHERE {p}"),
            None => Ok(()),
        }
    }
}

/// Write selections as pretty JSON.
pub fn save_selections(path: impl AsRef<Path>, selections: &[SelectionDescriptor]) -> LensResult<()> {
    let text = serde_json::to_string_pretty(selections)?;
    std::fs::write(path, text)?;
    Ok(())
}

/// Read selections written by [`save_selections`].
pub fn load_selections(path: impl AsRef<Path>) -> LensResult<Vec<SelectionDescriptor>> {
    let text = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&text)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use hyperlens_core::{Value, ValueType};

    fn brazil() -> SelectionDescriptor {
        SelectionDescriptor::new(
            AttributeScope {
                model: 1,
                attribute: 5,
                value_type: ValueType::String,
                owner: 1,
                junction: false,
            },
            "country",
            Some(Predicate::In {
                operand: Operand::Value,
                values: vec![Value::from("Brazil")],
                negated: false,
            }),
        )
    }

    #[test]
    fn test_display() {
        assert_eq!(brazil().to_string(), "country(1, 1) WHERE $v IN (Brazil)");
    }

    #[test]
    fn test_validate_flags() {
        assert!(brazil().validate().is_ok());

        let mut flag = brazil();
        flag.predicate = Some(Predicate::IsTrue {
            operand: Operand::Value,
        });
        assert!(matches!(
            flag.validate(),
            Err(common_error::LensError::Operation(_))
        ));

        flag.predicate = Some(Predicate::IsTrue {
            operand: Operand::ValueId,
        });
        assert!(flag.validate().is_ok());
    }

    #[test]
    fn test_save_and_load_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");
        let saved = vec![brazil()];
        save_selections(&path, &saved).unwrap();
        assert_eq!(load_selections(&path).unwrap(), saved);
    }

    #[test]
    fn test_load_missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_selections(dir.path().join("none.json")).unwrap_err();
        assert!(matches!(err, common_error::LensError::Io(_)));
    }
}
