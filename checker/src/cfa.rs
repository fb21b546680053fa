// Copyright (c) Facebook, Inc. and its affiliates.
//
// This source code is licensed under the MIT license found in the
// LICENSE file in the root directory of this source tree.

// The control flow automaton: program locations of JVM methods connected by instruction, call
// and exception edges. Building it from class files is the job of the embedding tool.

use crate::errors::AnalysisError;
use crate::instruction::{Instruction, InvocationKind};

use itertools::Itertools;
use mirai_annotations::*;
use petgraph::graph::{EdgeIndex, EdgeReference, NodeIndex};
use petgraph::visit::EdgeRef;
use petgraph::{Direction, Graph};
use std::collections::HashMap;
use std::fmt::{Debug, Formatter, Result};
use std::rc::Rc;

pub type NodeId = NodeIndex;
pub type EdgeId = EdgeIndex;

/// The offset of the node at which a method is entered.
pub const ENTRY_OFFSET: i32 = 0;
/// The offset of the node that every return instruction of a method leads to.
pub const RETURN_EXIT_OFFSET: i32 = -1;
/// The offset of the node that uncaught exceptions of a method lead to.
pub const EXCEPTION_EXIT_OFFSET: i32 = -2;

/// The number of slots a value of the given internal type occupies in a frame.
pub fn type_size(internal_type: &str) -> usize {
    match internal_type {
        "V" => 0,
        "J" | "D" => 2,
        _ => 1,
    }
}

pub fn is_category2(internal_type: &str) -> bool {
    type_size(internal_type) == 2
}

/// A parsed JVM method descriptor such as `(IJLjava/lang/String;)V`.
#[derive(Clone, Eq, Hash, PartialEq)]
pub struct MethodDescriptor {
    text: Rc<str>,
    parameter_types: Vec<Rc<str>>,
    return_type: Rc<str>,
}

impl Debug for MethodDescriptor {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result {
        self.text.fmt(f)
    }
}

impl MethodDescriptor {
    pub fn parse(text: &str) -> std::result::Result<MethodDescriptor, AnalysisError> {
        let malformed = |reason: &str| AnalysisError::MalformedDescriptor {
            descriptor: text.to_string(),
            reason: reason.to_string(),
        };
        let bytes = text.as_bytes();
        if bytes.first() != Some(&b'(') {
            return Err(malformed("expected `(`"));
        }
        let mut parameter_types = Vec::new();
        let mut position = 1;
        loop {
            match bytes.get(position) {
                None => return Err(malformed("unterminated parameter list")),
                Some(b')') => break,
                Some(_) => {
                    let end = field_type_end(bytes, position).map_err(malformed)?;
                    parameter_types.push(Rc::from(&text[position..end]));
                    position = end;
                }
            }
        }
        position += 1;
        let return_type = if bytes.get(position) == Some(&b'V') && position + 1 == bytes.len() {
            Rc::from("V")
        } else {
            let end = field_type_end(bytes, position).map_err(malformed)?;
            if end != bytes.len() {
                return Err(malformed("trailing characters after the return type"));
            }
            Rc::from(&text[position..end])
        };
        Ok(MethodDescriptor {
            text: Rc::from(text),
            parameter_types,
            return_type,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }

    pub fn parameter_types(&self) -> &[Rc<str>] {
        &self.parameter_types
    }

    pub fn return_type(&self) -> &str {
        &self.return_type
    }

    /// The number of slots the declared parameters occupy.
    pub fn arguments_size(&self) -> usize {
        self.parameter_types.iter().map(|t| type_size(t)).sum()
    }

    /// The number of slots the return value occupies.
    pub fn return_size(&self) -> usize {
        type_size(&self.return_type)
    }
}

/// Returns the index just past the field type that starts at `start`.
fn field_type_end(bytes: &[u8], start: usize) -> std::result::Result<usize, &'static str> {
    let mut position = start;
    while bytes.get(position) == Some(&b'[') {
        position += 1;
    }
    match bytes.get(position) {
        Some(b'B' | b'C' | b'D' | b'F' | b'I' | b'J' | b'S' | b'Z') => Ok(position + 1),
        Some(b'L') => match bytes[position..].iter().position(|b| *b == b';') {
            Some(length) if length > 1 => Ok(position + length + 1),
            _ => Err("unterminated class type"),
        },
        Some(_) => Err("unexpected character"),
        None => Err("missing type"),
    }
}

/// Identifies a method.
#[derive(Clone, Eq, Hash, PartialEq)]
pub struct MethodSignature {
    pub class_name: Rc<str>,
    pub method_name: Rc<str>,
    pub descriptor: MethodDescriptor,
    pub is_static: bool,
}

impl Debug for MethodSignature {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result {
        f.write_str(&self.fqn())
    }
}

impl MethodSignature {
    pub fn new(
        class_name: &str,
        method_name: &str,
        descriptor: &str,
        is_static: bool,
    ) -> std::result::Result<MethodSignature, AnalysisError> {
        Ok(MethodSignature {
            class_name: Rc::from(class_name),
            method_name: Rc::from(method_name),
            descriptor: MethodDescriptor::parse(descriptor)?,
            is_static,
        })
    }

    /// The fully qualified name, for example `LFoo;bar(I)V`.
    pub fn fqn(&self) -> String {
        format!(
            "L{};{}{}",
            self.class_name,
            self.method_name,
            self.descriptor.as_str()
        )
    }

    /// The number of local variable slots taken up by the receiver and the parameters on entry.
    pub fn parameter_size(&self) -> usize {
        self.descriptor.arguments_size() + usize::from(!self.is_static)
    }

    /// The first local variable slot and the slot count of each parameter, starting with the
    /// receiver of instance methods.
    pub fn parameter_layout(&self) -> Vec<(usize, usize)> {
        let mut layout = Vec::with_capacity(self.descriptor.parameter_types.len() + 1);
        let mut next = 0;
        if !self.is_static {
            layout.push((0, 1));
            next = 1;
        }
        for parameter_type in self.descriptor.parameter_types.iter() {
            let size = type_size(parameter_type);
            layout.push((next, size));
            next += size;
        }
        layout
    }

    /// Maps a parameter's local variable slot in the callee to the operand stack slot (counted
    /// from the top) that held it in the caller just before the invocation.
    /// Returns None for local variables that are not parameters.
    pub fn caller_stack_index(&self, local_index: usize) -> Option<usize> {
        let parameter_size = self.parameter_size();
        self.parameter_layout()
            .into_iter()
            .find(|(start, size)| *start <= local_index && local_index < start + size)
            .map(|(start, size)| {
                checked_assume!(start + size <= parameter_size);
                parameter_size - start - size + (local_index - start)
            })
    }
}

/// A call site together with the method it may dispatch to.
#[derive(Clone, Eq, Hash, PartialEq)]
pub struct Call {
    pub caller: Rc<MethodSignature>,
    pub offset: i32,
    pub target: Rc<MethodSignature>,
    pub kind: InvocationKind,
}

impl Debug for Call {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result {
        write!(
            f,
            "{:?}@{} -> {:?} {:?}",
            self.caller, self.offset, self.kind, self.target
        )
    }
}

impl Call {
    pub fn new(
        caller: Rc<MethodSignature>,
        offset: i32,
        target: Rc<MethodSignature>,
        kind: InvocationKind,
    ) -> Call {
        Call {
            caller,
            offset,
            target,
            kind,
        }
    }
}

#[derive(Clone, Eq, Hash, PartialEq)]
pub enum CfaNode {
    Method {
        signature: Rc<MethodSignature>,
        offset: i32,
    },
    /// The target of call edges to methods whose code is not available.
    Unknown,
}

impl Debug for CfaNode {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result {
        match self {
            CfaNode::Method { signature, offset } => write!(f, "{:?}@{}", signature, offset),
            CfaNode::Unknown => f.write_str("unknown"),
        }
    }
}

impl CfaNode {
    pub fn signature(&self) -> Option<&Rc<MethodSignature>> {
        match self {
            CfaNode::Method { signature, .. } => Some(signature),
            CfaNode::Unknown => None,
        }
    }

    pub fn offset(&self) -> Option<i32> {
        match self {
            CfaNode::Method { offset, .. } => Some(*offset),
            CfaNode::Unknown => None,
        }
    }

    pub fn is_entry(&self) -> bool {
        self.offset() == Some(ENTRY_OFFSET)
    }

    pub fn is_return_exit(&self) -> bool {
        self.offset() == Some(RETURN_EXIT_OFFSET)
    }

    pub fn is_exception_exit(&self) -> bool {
        self.offset() == Some(EXCEPTION_EXIT_OFFSET)
    }

    pub fn is_unknown(&self) -> bool {
        matches!(self, CfaNode::Unknown)
    }
}

#[derive(Clone, Eq, Hash, PartialEq)]
pub enum CfaEdge {
    /// The effect of executing one instruction.
    Instruction(Instruction),
    /// Links a call site to the entry node of a possible target.
    Call(Call),
    /// Control reaching an exception handler.
    AssumeException,
}

impl Debug for CfaEdge {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result {
        match self {
            CfaEdge::Instruction(instruction) => instruction.fmt(f),
            CfaEdge::Call(call) => write!(f, "call {:?}", call),
            CfaEdge::AssumeException => f.write_str("catch"),
        }
    }
}

impl CfaEdge {
    pub fn is_intraprocedural(&self) -> bool {
        !matches!(self, CfaEdge::Call(..))
    }

    pub fn instruction(&self) -> Option<&Instruction> {
        match self {
            CfaEdge::Instruction(instruction) => Some(instruction),
            _ => None,
        }
    }

    pub fn call(&self) -> Option<&Call> {
        match self {
            CfaEdge::Call(call) => Some(call),
            _ => None,
        }
    }
}

/// A control flow automaton over a set of methods.
/// Edge queries return edges in the order in which they were added, so that analyses that
/// iterate over them are deterministic.
pub struct Cfa {
    graph: Graph<CfaNode, CfaEdge>,
    nodes: HashMap<(Rc<MethodSignature>, i32), NodeId>,
    unknown_node: NodeId,
}

impl Debug for Cfa {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result {
        "Cfa".fmt(f)
    }
}

impl Default for Cfa {
    fn default() -> Self {
        let mut graph = Graph::new();
        let unknown_node = graph.add_node(CfaNode::Unknown);
        Cfa {
            graph,
            nodes: HashMap::new(),
            unknown_node,
        }
    }
}

/// Construction
impl Cfa {
    pub fn new() -> Cfa {
        Self::default()
    }

    /// Returns the node of the method at the given offset, adding it if it does not exist yet.
    pub fn add_node(&mut self, signature: &Rc<MethodSignature>, offset: i32) -> NodeId {
        if let Some(node) = self.nodes.get(&(signature.clone(), offset)) {
            return *node;
        }
        let node = self.graph.add_node(CfaNode::Method {
            signature: signature.clone(),
            offset,
        });
        self.nodes.insert((signature.clone(), offset), node);
        node
    }

    /// Adds the entry and the two exit nodes of a method and returns the entry node.
    pub fn add_method(&mut self, signature: &Rc<MethodSignature>) -> NodeId {
        self.add_node(signature, RETURN_EXIT_OFFSET);
        self.add_node(signature, EXCEPTION_EXIT_OFFSET);
        self.add_node(signature, ENTRY_OFFSET)
    }

    pub fn add_instruction_edge(
        &mut self,
        source: NodeId,
        target: NodeId,
        instruction: Instruction,
    ) -> EdgeId {
        self.graph
            .add_edge(source, target, CfaEdge::Instruction(instruction))
    }

    pub fn add_assume_exception_edge(&mut self, source: NodeId, target: NodeId) -> EdgeId {
        self.graph.add_edge(source, target, CfaEdge::AssumeException)
    }

    /// Adds an edge from the call site to the entry node of the call target. Targets that have
    /// not been added to the automaton are represented by the unknown node.
    ///
    /// The target is resolved when the edge is added and never again. Add every method with
    /// code before adding the call edges that refer to it, otherwise the calls stay unknown.
    pub fn add_call_edge(&mut self, source: NodeId, call: Call) -> EdgeId {
        let target = self
            .function_entry_node(&call.target)
            .unwrap_or(self.unknown_node);
        if target == self.unknown_node {
            debug!("call to {:?} has no code, linking it to the unknown node", call.target);
        }
        self.graph.add_edge(source, target, CfaEdge::Call(call))
    }
}

/// Queries
impl Cfa {
    pub fn node(&self, node: NodeId) -> &CfaNode {
        &self.graph[node]
    }

    pub fn edge(&self, edge: EdgeId) -> &CfaEdge {
        &self.graph[edge]
    }

    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn unknown_node(&self) -> NodeId {
        self.unknown_node
    }

    pub fn find_node(&self, signature: &Rc<MethodSignature>, offset: i32) -> Option<NodeId> {
        self.nodes.get(&(signature.clone(), offset)).copied()
    }

    pub fn function_entry_node(&self, signature: &Rc<MethodSignature>) -> Option<NodeId> {
        self.find_node(signature, ENTRY_OFFSET)
    }

    pub fn function_return_exit_node(&self, signature: &Rc<MethodSignature>) -> Option<NodeId> {
        self.find_node(signature, RETURN_EXIT_OFFSET)
    }

    pub fn function_exception_exit_node(
        &self,
        signature: &Rc<MethodSignature>,
    ) -> Option<NodeId> {
        self.find_node(signature, EXCEPTION_EXIT_OFFSET)
    }

    pub fn is_entry_node(&self, node: NodeId) -> bool {
        self.graph[node].is_entry()
    }

    pub fn is_unknown_node(&self, node: NodeId) -> bool {
        node == self.unknown_node
    }

    fn edges(&self, node: NodeId, direction: Direction) -> Vec<EdgeReference<'_, CfaEdge>> {
        self.graph
            .edges_directed(node, direction)
            .sorted_by_key(|e| e.id())
            .collect()
    }

    pub fn entering_edges(&self, node: NodeId) -> Vec<EdgeReference<'_, CfaEdge>> {
        self.edges(node, Direction::Incoming)
    }

    pub fn leaving_edges(&self, node: NodeId) -> Vec<EdgeReference<'_, CfaEdge>> {
        self.edges(node, Direction::Outgoing)
    }

    pub fn entering_intraprocedural_edges(
        &self,
        node: NodeId,
    ) -> Vec<EdgeReference<'_, CfaEdge>> {
        self.edges(node, Direction::Incoming)
            .into_iter()
            .filter(|e| e.weight().is_intraprocedural())
            .collect()
    }

    pub fn leaving_intraprocedural_edges(&self, node: NodeId) -> Vec<EdgeReference<'_, CfaEdge>> {
        self.edges(node, Direction::Outgoing)
            .into_iter()
            .filter(|e| e.weight().is_intraprocedural())
            .collect()
    }

    /// The call edges that enter a method entry node.
    pub fn entering_call_edges(&self, node: NodeId) -> Vec<EdgeReference<'_, CfaEdge>> {
        self.edges(node, Direction::Incoming)
            .into_iter()
            .filter(|e| e.weight().call().is_some())
            .collect()
    }

    /// The call edges leaving the node whose targets have code in this automaton.
    pub fn known_method_call_edges(&self, node: NodeId) -> Vec<EdgeReference<'_, CfaEdge>> {
        self.edges(node, Direction::Outgoing)
            .into_iter()
            .filter(|e| e.weight().call().is_some() && e.target() != self.unknown_node)
            .collect()
    }

    /// True if some call leaving the node targets a method without code.
    pub fn calls_unknown_method(&self, node: NodeId) -> bool {
        self.graph
            .edges_directed(node, Direction::Outgoing)
            .any(|e| e.weight().call().is_some() && e.target() == self.unknown_node)
    }
}
