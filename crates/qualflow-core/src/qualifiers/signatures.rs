//! Declared method signatures and field qualifiers
//!
//! The transfer function never infers call results; it looks them up here.

use super::hierarchy::Qualifier;
use crate::error::{ConfigError, ConfigResult};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PostconditionTarget {
    Receiver,
    Argument(usize),
}

/// After the call returns, `target` has `qualifier`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Postcondition {
    pub target: PostconditionTarget,
    pub qualifier: Qualifier,
}

/// When the call returns `result`, `target` has `qualifier`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConditionalPostcondition {
    pub result: bool,
    pub target: PostconditionTarget,
    pub qualifier: Qualifier,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodSignature {
    pub name: String,
    /// Required qualifier per argument; `None` accepts anything.
    pub params: Vec<Option<Qualifier>>,
    pub receiver: Option<Qualifier>,
    pub returns: Option<Qualifier>,
    /// Side-effect free and deterministic: the call may be tracked as a store
    /// key and does not invalidate heap facts.
    pub pure: bool,
    pub ensures: Vec<Postcondition>,
    pub ensures_if: Vec<ConditionalPostcondition>,
}

impl MethodSignature {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            params: Vec::new(),
            receiver: None,
            returns: None,
            pure: false,
            ensures: Vec::new(),
            ensures_if: Vec::new(),
        }
    }

    pub fn returns(mut self, qualifier: Qualifier) -> Self {
        self.returns = Some(qualifier);
        self
    }

    pub fn param(mut self, qualifier: Option<Qualifier>) -> Self {
        self.params.push(qualifier);
        self
    }

    pub fn receiver(mut self, qualifier: Qualifier) -> Self {
        self.receiver = Some(qualifier);
        self
    }

    pub fn pure(mut self) -> Self {
        self.pure = true;
        self
    }

    pub fn ensures(mut self, target: PostconditionTarget, qualifier: Qualifier) -> Self {
        self.ensures.push(Postcondition { target, qualifier });
        self
    }

    pub fn ensures_if(mut self, result: bool, target: PostconditionTarget, qualifier: Qualifier) -> Self {
        self.ensures_if.push(ConditionalPostcondition {
            result,
            target,
            qualifier,
        });
        self
    }

    fn validate(&self) -> ConfigResult<()> {
        let targets = self
            .ensures
            .iter()
            .map(|p| p.target)
            .chain(self.ensures_if.iter().map(|p| p.target));
        for target in targets {
            if let PostconditionTarget::Argument(index) = target {
                if index >= self.params.len() {
                    return Err(ConfigError::PostconditionTarget {
                        method: self.name.clone(),
                        index,
                        arity: self.params.len(),
                    });
                }
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default)]
pub struct SignatureTable {
    methods: HashMap<String, MethodSignature>,
    fields: HashMap<String, Qualifier>,
}

impl SignatureTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, signature: MethodSignature) -> ConfigResult<()> {
        signature.validate()?;
        if self.methods.contains_key(&signature.name) {
            return Err(ConfigError::DuplicateSignature(signature.name));
        }
        self.methods.insert(signature.name.clone(), signature);
        Ok(())
    }

    pub fn with_method(mut self, signature: MethodSignature) -> ConfigResult<Self> {
        self.insert(signature)?;
        Ok(self)
    }

    pub fn declare_field(&mut self, name: impl Into<String>, qualifier: Qualifier) -> ConfigResult<()> {
        let name = name.into();
        if self.fields.contains_key(&name) {
            return Err(ConfigError::DuplicateField(name));
        }
        self.fields.insert(name, qualifier);
        Ok(())
    }

    pub fn method(&self, name: &str) -> Option<&MethodSignature> {
        self.methods.get(name)
    }

    pub fn field(&self, name: &str) -> Option<Qualifier> {
        self.fields.get(name).copied()
    }

    pub fn is_pure(&self, method: &str) -> bool {
        self.methods.get(method).is_some_and(|sig| sig.pure)
    }

    pub fn len(&self) -> usize {
        self.methods.len()
    }

    pub fn is_empty(&self) -> bool {
        self.methods.is_empty()
    }
}
