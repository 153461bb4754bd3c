//! Backend program under construction.
//!
//! Lowering rewrites portable nodes into [`OperationRecord`]s owned by a
//! [`GraphProgram`]. Records reference each other by name only, and an input
//! may only name an already-produced output or a synthesized constant, so a
//! finished program is topologically ordered by construction.

use std::collections::{BTreeMap, BTreeSet};

use half::f16;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::node::PortableNode;
use crate::spec::{DType, Shape};

/// Payload of a synthesized constant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ConstantValue {
    F32s(Vec<f32>),
    I64s(Vec<i64>),
    Bool(bool),
    Str(String),
}

impl ConstantValue {
    fn kind(&self) -> &'static str {
        match self {
            ConstantValue::F32s(_) => "float",
            ConstantValue::I64s(_) => "int",
            ConstantValue::Bool(_) => "bool",
            ConstantValue::Str(_) => "string",
        }
    }
}

/// Synthesized constant owned by the program.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Constant {
    pub name: String,
    pub dtype: DType,
    pub value: ConstantValue,
}

impl Constant {
    /// Encodes the payload in the wire layout of `dtype` for the vendor
    /// runtime handoff.
    pub fn to_bytes(&self) -> Result<Vec<u8>, ProgramError> {
        let mismatch = || ProgramError::ConstantEncoding {
            name: self.name.clone(),
            kind: self.value.kind(),
            dtype: self.dtype,
        };
        match (&self.value, self.dtype) {
            (ConstantValue::F32s(values), DType::F32) => {
                Ok(values.iter().flat_map(|v| v.to_le_bytes()).collect())
            }
            (ConstantValue::F32s(values), DType::F16) => Ok(values
                .iter()
                .flat_map(|v| f16::from_f32(*v).to_le_bytes())
                .collect()),
            (ConstantValue::I64s(values), DType::Si64) => {
                Ok(values.iter().flat_map(|v| v.to_le_bytes()).collect())
            }
            (ConstantValue::I64s(values), DType::Si32) => {
                let mut bytes = Vec::with_capacity(values.len() * 4);
                for value in values {
                    let narrowed = i32::try_from(*value).map_err(|_| mismatch())?;
                    bytes.extend_from_slice(&narrowed.to_le_bytes());
                }
                Ok(bytes)
            }
            (ConstantValue::I64s(values), DType::Ui32) => {
                let mut bytes = Vec::with_capacity(values.len() * 4);
                for value in values {
                    let narrowed = u32::try_from(*value).map_err(|_| mismatch())?;
                    bytes.extend_from_slice(&narrowed.to_le_bytes());
                }
                Ok(bytes)
            }
            (ConstantValue::Bool(value), DType::I1) => Ok(vec![u8::from(*value)]),
            (ConstantValue::Str(value), DType::Str) => Ok(value.as_bytes().to_vec()),
            _ => Err(mismatch()),
        }
    }
}

/// Source feeding one named input slot of an operation record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum OperandSource {
    /// Tensor owned by the portable graph, referenced by its graph name.
    GraphTensor(String),
    /// Constant synthesized into this program.
    Constant(String),
    /// Output produced by an earlier record of this program.
    Intermediate(String),
}

/// Named output binding with concrete element type and shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputBinding {
    pub name: String,
    pub dtype: DType,
    pub shape: Shape,
}

/// One backend-native operation record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperationRecord {
    /// Native op identifier (e.g. `"resample"`).
    pub native_op: String,
    /// Portable node this record was lowered from, for diagnostics.
    pub origin: String,
    pub inputs: BTreeMap<String, OperandSource>,
    pub output: Option<OutputBinding>,
}

/// Handle to a record inside the program under construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OperationId(pub usize);

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ProgramError {
    #[error("operation {0:?} does not exist in this program")]
    UnknownOperation(OperationId),
    #[error("operation {op:?} already has a bound output")]
    OutputAlreadyBound { op: OperationId },
    #[error("name '{0}' is already used in this program")]
    DuplicateName(String),
    #[error("input '{slot}' references '{name}', which is not an already-produced output")]
    DanglingIntermediate { slot: String, name: String },
    #[error("input '{slot}' references unknown constant '{name}'")]
    UnknownConstant { slot: String, name: String },
    #[error("constant '{name}' cannot encode {kind} values as {dtype:?}")]
    ConstantEncoding {
        name: String,
        kind: &'static str,
        dtype: DType,
    },
}

/// Backend program builder handed to lowering rules.
///
/// Not safe for concurrent mutation; independent programs may be built
/// concurrently.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct GraphProgram {
    operations: Vec<OperationRecord>,
    constants: Vec<Constant>,
    reserved: BTreeSet<String>,
}

impl GraphProgram {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a new record lowered from `node` and returns its handle.
    pub fn create_operation(&mut self, node: &PortableNode, native_op: &str) -> OperationId {
        let id = OperationId(self.operations.len());
        self.operations.push(OperationRecord {
            native_op: native_op.to_string(),
            origin: node.name().to_string(),
            inputs: BTreeMap::new(),
            output: None,
        });
        id
    }

    /// Binds `source` to the named input slot of `op`.
    ///
    /// An intermediate source must name an output bound by an earlier call;
    /// a constant source must name a constant already added. Anything else
    /// would break the program's topological order.
    pub fn bind_input(
        &mut self,
        op: OperationId,
        slot: &str,
        source: OperandSource,
    ) -> Result<(), ProgramError> {
        match &source {
            OperandSource::GraphTensor(_) => {}
            OperandSource::Constant(name) => {
                if !self.constants.iter().any(|c| c.name == *name) {
                    return Err(ProgramError::UnknownConstant {
                        slot: slot.to_string(),
                        name: name.clone(),
                    });
                }
            }
            OperandSource::Intermediate(name) => {
                let produced = self
                    .operations
                    .iter()
                    .filter_map(|record| record.output.as_ref())
                    .any(|output| output.name == *name);
                if !produced {
                    return Err(ProgramError::DanglingIntermediate {
                        slot: slot.to_string(),
                        name: name.clone(),
                    });
                }
            }
        }
        let record = self
            .operations
            .get_mut(op.0)
            .ok_or(ProgramError::UnknownOperation(op))?;
        record.inputs.insert(slot.to_string(), source);
        Ok(())
    }

    /// Binds the named output of `op` with its concrete dtype and shape.
    pub fn bind_output(
        &mut self,
        op: OperationId,
        name: &str,
        dtype: DType,
        shape: Shape,
    ) -> Result<(), ProgramError> {
        let record = self
            .operations
            .get_mut(op.0)
            .ok_or(ProgramError::UnknownOperation(op))?;
        if record.output.is_some() {
            return Err(ProgramError::OutputAlreadyBound { op });
        }
        if !self.reserved.insert(name.to_string()) {
            return Err(ProgramError::DuplicateName(name.to_string()));
        }
        record.output = Some(OutputBinding {
            name: name.to_string(),
            dtype,
            shape,
        });
        Ok(())
    }

    /// Adds a synthesized constant and returns a source referencing it.
    ///
    /// The requested name is disambiguated against everything already in the
    /// program, so lowering rules can reuse slot-style names freely.
    pub fn add_constant(
        &mut self,
        dtype: DType,
        name: &str,
        value: ConstantValue,
    ) -> Result<OperandSource, ProgramError> {
        let constant = Constant {
            name: String::new(),
            dtype,
            value,
        };
        // Reject kind/dtype mismatches at creation instead of at handoff.
        if let Err(ProgramError::ConstantEncoding { kind, dtype, .. }) = constant.to_bytes() {
            return Err(ProgramError::ConstantEncoding {
                name: name.to_string(),
                kind,
                dtype,
            });
        }
        let unique = self.reserve_name(name);
        self.constants.push(Constant {
            name: unique.clone(),
            ..constant
        });
        Ok(OperandSource::Constant(unique))
    }

    /// Returns a name unique within this program for a synthesized
    /// intermediate of `node`.
    pub fn unique_name(&mut self, node: &PortableNode, suffix: &str) -> String {
        let base = format!("{}_{}", node.name(), suffix);
        self.reserve_name(&base)
    }

    fn reserve_name(&mut self, base: &str) -> String {
        if self.reserved.insert(base.to_string()) {
            return base.to_string();
        }
        let mut index = 1usize;
        loop {
            let candidate = format!("{base}_{index}");
            if self.reserved.insert(candidate.clone()) {
                return candidate;
            }
            index += 1;
        }
    }

    pub fn operations(&self) -> &[OperationRecord] {
        &self.operations
    }

    pub fn operation(&self, op: OperationId) -> Option<&OperationRecord> {
        self.operations.get(op.0)
    }

    pub fn constants(&self) -> &[Constant] {
        &self.constants
    }

    pub fn constant(&self, name: &str) -> Option<&Constant> {
        self.constants.iter().find(|c| c.name == name)
    }

    pub fn to_json_string(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node() -> PortableNode {
        PortableNode::new("sample_0", "GridSample", 16)
    }

    fn record_program() -> (GraphProgram, OperationId) {
        let mut program = GraphProgram::new();
        let node = node();
        let op = program.create_operation(&node, "mul");
        (program, op)
    }

    #[test]
    fn intermediate_inputs_must_reference_produced_outputs() {
        let (mut program, op) = record_program();
        let err = program
            .bind_input(op, "x", OperandSource::Intermediate("missing".into()))
            .unwrap_err();
        assert!(matches!(err, ProgramError::DanglingIntermediate { .. }));

        program
            .bind_output(op, "mul_out", DType::F32, Shape::of_static(&[2]))
            .unwrap();
        let node = node();
        let next = program.create_operation(&node, "cast");
        program
            .bind_input(next, "x", OperandSource::Intermediate("mul_out".into()))
            .unwrap();
    }

    #[test]
    fn constant_inputs_must_exist() {
        let (mut program, op) = record_program();
        let err = program
            .bind_input(op, "y", OperandSource::Constant("scale".into()))
            .unwrap_err();
        assert!(matches!(err, ProgramError::UnknownConstant { .. }));

        let source = program
            .add_constant(DType::F32, "scale", ConstantValue::F32s(vec![2.0, 3.0]))
            .unwrap();
        program.bind_input(op, "y", source).unwrap();
    }

    #[test]
    fn output_names_are_never_shared() {
        let (mut program, op) = record_program();
        program
            .bind_output(op, "out", DType::F32, Shape::of_static(&[2]))
            .unwrap();
        let node = node();
        let second = program.create_operation(&node, "cast");
        let err = program
            .bind_output(second, "out", DType::Si32, Shape::of_static(&[2]))
            .unwrap_err();
        assert_eq!(err, ProgramError::DuplicateName("out".into()));
    }

    #[test]
    fn rebinding_an_output_is_rejected() {
        let (mut program, op) = record_program();
        program
            .bind_output(op, "out", DType::F32, Shape::of_static(&[2]))
            .unwrap();
        let err = program
            .bind_output(op, "other", DType::F32, Shape::of_static(&[2]))
            .unwrap_err();
        assert!(matches!(err, ProgramError::OutputAlreadyBound { .. }));
    }

    #[test]
    fn synthesized_names_are_unique_within_a_program() {
        let mut program = GraphProgram::new();
        let node = node();
        let first = program.unique_name(&node, "coords_px");
        let second = program.unique_name(&node, "coords_px");
        assert_ne!(first, second);
        assert!(first.starts_with("sample_0_coords_px"));

        let a = program
            .add_constant(DType::Str, "sampling_mode", ConstantValue::Str("linear".into()))
            .unwrap();
        let b = program
            .add_constant(DType::Str, "sampling_mode", ConstantValue::Str("nearest".into()))
            .unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn constants_encode_in_dtype_layout() {
        let constant = Constant {
            name: "scale".into(),
            dtype: DType::F16,
            value: ConstantValue::F32s(vec![1.0, -2.0]),
        };
        let bytes = constant.to_bytes().unwrap();
        assert_eq!(bytes.len(), 4);
        assert_eq!(
            f16::from_le_bytes([bytes[0], bytes[1]]),
            f16::from_f32(1.0)
        );

        let narrowing = Constant {
            name: "big".into(),
            dtype: DType::Si32,
            value: ConstantValue::I64s(vec![i64::MAX]),
        };
        assert!(narrowing.to_bytes().is_err());
    }

    #[test]
    fn mismatched_constant_payload_is_rejected_at_creation() {
        let mut program = GraphProgram::new();
        let err = program
            .add_constant(DType::F32, "flag", ConstantValue::Bool(true))
            .unwrap_err();
        assert!(matches!(err, ProgramError::ConstantEncoding { .. }));
    }

    #[test]
    fn programs_serialize_for_the_vendor_handoff() {
        let (mut program, op) = record_program();
        program
            .bind_input(op, "x", OperandSource::GraphTensor("coords".into()))
            .unwrap();
        program
            .bind_output(op, "out", DType::F32, Shape::of_static(&[1, 2]))
            .unwrap();
        let json = program.to_json_string().unwrap();
        assert!(json.contains("\"native_op\": \"mul\""));
    }
}
