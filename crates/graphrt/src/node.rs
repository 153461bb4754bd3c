//! Portable-node surface consumed from the graph/IR collaborator.
//!
//! A [`PortableNode`] is one hardware-independent operator instance: operator
//! type and version, an attribute bag with caller-supplied defaults, and
//! ordered input/output tensor descriptors. Nodes are immutable once the
//! graph is frozen; this module only reads them.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::spec::TensorSpec;

/// Typed attribute value carried by a portable node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AttrValue {
    Int(i64),
    Float(f32),
    Str(String),
    Ints(Vec<i64>),
    Floats(Vec<f32>),
}

/// Named tensor slot on a portable node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TensorBinding {
    pub name: String,
    pub spec: TensorSpec,
}

impl TensorBinding {
    pub fn new(name: impl Into<String>, spec: TensorSpec) -> Self {
        Self {
            name: name.into(),
            spec,
        }
    }
}

/// One operator instance in the frozen portable graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortableNode {
    name: String,
    op_type: String,
    version: u32,
    attributes: BTreeMap<String, AttrValue>,
    inputs: Vec<TensorBinding>,
    outputs: Vec<TensorBinding>,
}

impl PortableNode {
    pub fn new(name: impl Into<String>, op_type: impl Into<String>, version: u32) -> Self {
        Self {
            name: name.into(),
            op_type: op_type.into(),
            version,
            attributes: BTreeMap::new(),
            inputs: Vec::new(),
            outputs: Vec::new(),
        }
    }

    pub fn with_attr(mut self, name: impl Into<String>, value: AttrValue) -> Self {
        self.attributes.insert(name.into(), value);
        self
    }

    pub fn with_input(mut self, binding: TensorBinding) -> Self {
        self.inputs.push(binding);
        self
    }

    pub fn with_output(mut self, binding: TensorBinding) -> Self {
        self.outputs.push(binding);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn op_type(&self) -> &str {
        &self.op_type
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    pub fn inputs(&self) -> &[TensorBinding] {
        &self.inputs
    }

    pub fn outputs(&self) -> &[TensorBinding] {
        &self.outputs
    }

    pub fn input(&self, index: usize) -> Option<&TensorBinding> {
        self.inputs.get(index)
    }

    pub fn output(&self, index: usize) -> Option<&TensorBinding> {
        self.outputs.get(index)
    }

    /// Integer attribute with a caller-supplied default.
    pub fn attr_i64(&self, name: &str, default: i64) -> i64 {
        match self.attributes.get(name) {
            Some(AttrValue::Int(value)) => *value,
            _ => default,
        }
    }

    /// Float attribute with a caller-supplied default.
    pub fn attr_f32(&self, name: &str, default: f32) -> f32 {
        match self.attributes.get(name) {
            Some(AttrValue::Float(value)) => *value,
            _ => default,
        }
    }

    /// String attribute with a caller-supplied default.
    pub fn attr_str(&self, name: &str, default: &str) -> String {
        match self.attributes.get(name) {
            Some(AttrValue::Str(value)) => value.clone(),
            _ => default.to_string(),
        }
    }

    /// Integer-list attribute with a caller-supplied default.
    pub fn attr_i64s(&self, name: &str, default: &[i64]) -> Vec<i64> {
        match self.attributes.get(name) {
            Some(AttrValue::Ints(values)) => values.clone(),
            _ => default.to_vec(),
        }
    }
}
