//! Named parameters of compiled statements.
//!
//! A predicate compiled with parameters references captured variables by
//! name. Each variable yields one or more parameters (one per member chain
//! read from it), and rebinding a variable re-evaluates every parameter
//! derived from it.

use std::collections::HashMap;

use tablemap_core::{BuildError, SqlType, Value};

use crate::expr::{BindType, Bindable};

/// Bound parameter values by name.
pub type ParamValues = HashMap<String, Value>;

/// One named parameter.
#[derive(Debug, Clone, PartialEq)]
pub struct ParamsInfo {
    pub name: String,
    /// Variable the parameter is read from
    pub variable: String,
    pub chain: Vec<String>,
    /// Key member used to collapse an entity to its identifier
    pub key_member: Option<String>,
    /// Storage type of the compared column, when known
    pub db_type: Option<SqlType>,
    pub value: Option<Value>,
}

impl ParamsInfo {
    fn bind(&mut self, value: &Bindable) -> Result<(), BuildError> {
        self.value = Some(extract(
            value,
            &self.chain,
            self.key_member.as_deref(),
            &self.variable,
        )?);
        Ok(())
    }
}

/// A variable parameters are derived from.
#[derive(Debug, Clone, PartialEq)]
pub struct VariableSlot {
    pub name: String,
    pub root: BindType,
    /// Concrete entity types accepted by an entity variable
    pub accepts: Vec<String>,
}

impl VariableSlot {
    pub fn accepts(&self, value: &Bindable) -> bool {
        match (&self.root, value) {
            (BindType::Entity(_), Bindable::Record(record)) => {
                self.accepts.iter().any(|t| *t == record.type_name)
            }
            (BindType::Any, Bindable::Record(_)) => true,
            (_, Bindable::Record(_)) => false,
            (root, Bindable::Value(v)) => root.accepts_value(v),
        }
    }
}

/// Parameters and variables of one compiled statement.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParamTable {
    params: Vec<ParamsInfo>,
    variables: Vec<VariableSlot>,
}

impl ParamTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }

    pub fn len(&self) -> usize {
        self.params.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ParamsInfo> {
        self.params.iter()
    }

    pub fn get(&self, name: &str) -> Option<&ParamsInfo> {
        self.params.iter().find(|p| p.name == name)
    }

    pub fn variables(&self) -> &[VariableSlot] {
        &self.variables
    }

    /// Register a parameter and its variable. Both are deduplicated by name;
    /// the first declaration wins.
    pub fn declare(&mut self, slot: VariableSlot, info: ParamsInfo) -> String {
        if !self.variables.iter().any(|v| v.name == slot.name) {
            self.variables.push(slot);
        }
        let name = info.name.clone();
        if self.get(&name).is_none() {
            self.params.push(info);
        }
        name
    }

    /// Record the column type a parameter is compared with.
    pub fn set_db_type(&mut self, name: &str, db_type: SqlType) {
        if let Some(param) = self.params.iter_mut().find(|p| p.name == name) {
            param.db_type.get_or_insert(db_type);
        }
    }

    /// Bind a variable by name.
    pub fn set_variable(
        &mut self,
        name: &str,
        value: impl Into<Bindable>,
    ) -> Result<(), BuildError> {
        let value = value.into();
        let slot = self
            .variables
            .iter()
            .find(|v| v.name == name)
            .ok_or_else(|| BuildError::UnknownVariable {
                name: name.to_string(),
            })?;
        if !slot.accepts(&value) {
            return Err(BuildError::VariableTypeMismatch {
                name: name.to_string(),
                expected: slot.root.describe(),
                actual: value.describe(),
            });
        }
        self.bind_variable(name, &value)
    }

    /// Bind values positionally: each value goes to the first variable of a
    /// matching type not yet bound by this call.
    pub fn prepare<I>(&mut self, values: I) -> Result<(), BuildError>
    where
        I: IntoIterator,
        I::Item: Into<Bindable>,
    {
        let mut assigned = vec![false; self.variables.len()];
        for (position, value) in values.into_iter().enumerate() {
            let value = value.into();
            let slot = self
                .variables
                .iter()
                .enumerate()
                .position(|(i, v)| !assigned[i] && v.accepts(&value))
                .ok_or_else(|| BuildError::NoMatchingParameter {
                    position,
                    actual: value.describe(),
                })?;
            assigned[slot] = true;
            let name = self.variables[slot].name.clone();
            self.bind_variable(&name, &value)?;
        }
        tracing::trace!(variables = self.variables.len(), "prepared parameters");
        Ok(())
    }

    fn bind_variable(&mut self, name: &str, value: &Bindable) -> Result<(), BuildError> {
        for param in self.params.iter_mut().filter(|p| p.variable == name) {
            param.bind(value)?;
        }
        Ok(())
    }

    /// First parameter without a value.
    pub fn unbound(&self) -> Option<&ParamsInfo> {
        self.params.iter().find(|p| p.value.is_none())
    }

    /// Values of every bound parameter.
    pub fn values(&self) -> ParamValues {
        self.params
            .iter()
            .filter_map(|p| p.value.clone().map(|v| (p.name.clone(), v)))
            .collect()
    }

    /// Values of every parameter, failing on the first unbound one.
    pub fn require_values(&self) -> Result<ParamValues, BuildError> {
        if let Some(param) = self.unbound() {
            return Err(BuildError::UnboundParameter {
                name: param.name.clone(),
            });
        }
        Ok(self.values())
    }
}

/// Read a variable's member chain from a bound value.
///
/// An entity reached at the end of the chain collapses to its key, so that
/// it compares against the foreign-key column of a link member.
pub fn extract(
    value: &Bindable,
    chain: &[String],
    key_member: Option<&str>,
    variable: &str,
) -> Result<Value, BuildError> {
    let record = match value {
        Bindable::Value(v) if chain.is_empty() => return Ok(v.clone()),
        Bindable::Value(v) => {
            return Err(BuildError::VariableTypeMismatch {
                name: variable.to_string(),
                expected: "entity record".to_string(),
                actual: v.type_name().to_string(),
            });
        }
        Bindable::Record(record) => record,
    };

    let Some((last, links)) = chain.split_last() else {
        let key = key_member.unwrap_or("id");
        return Ok(record.get(key).cloned().unwrap_or(Value::Null));
    };

    let mut current = record;
    for link in links {
        current = current
            .link(link)
            .ok_or_else(|| BuildError::InvalidRecord {
                type_name: current.type_name.clone(),
                message: format!("link '{link}' of variable '{variable}' is not loaded"),
            })?;
    }
    Ok(match key_member {
        Some(key) => current.link_id(last, key).unwrap_or(Value::Null),
        None => current.get(last).cloned().unwrap_or(Value::Null),
    })
}
