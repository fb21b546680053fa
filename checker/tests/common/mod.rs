// Copyright (c) Facebook, Inc. and its affiliates.
//
// This source code is licensed under the MIT license found in the
// LICENSE file in the root directory of this source tree.

// Shared fixtures: a counter domain, a taint domain and small JVM programs.

#![allow(dead_code)]

use cpa_checker::abstract_state::{AbstractState, LatticeAbstractState, SimplePrecision};
use cpa_checker::bam::BamCpa;
use cpa_checker::bam_operators::{JvmDefaultExpandOperator, JvmDefaultReduceOperator};
use cpa_checker::cfa::{Call, Cfa, MethodSignature, NodeId, RETURN_EXIT_OFFSET};
use cpa_checker::cpa_algorithm::TransferRelation;
use cpa_checker::errors::AnalysisError;
use cpa_checker::instruction::{Instruction, InvocationKind};
use cpa_checker::jvm_state::{JvmAbstractState, JvmFrame};
use cpa_checker::jvm_transfer_relation::{JvmTransferRelation, JvmValueInterpreter};
use cpa_checker::operators::CpaOperators;
use cpa_checker::options::Options;
use cpa_checker::set_domain::SetAbstractState;

use std::rc::Rc;

/// Logging is configured through CPA_LOG, for example `CPA_LOG=debug`.
pub fn init_logging() {
    let e = env_logger::Env::new()
        .filter("CPA_LOG")
        .write_style("CPA_LOG_STYLE");
    let _ = env_logger::Builder::from_env(e).is_test(true).try_init();
}

/// An element of the chain of integers.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct Counter(pub i64);

impl AbstractState for Counter {
    fn is_less_or_equal(&self, other: &Self) -> bool {
        self.0 <= other.0
    }
}

impl LatticeAbstractState for Counter {
    fn join(&self, other: &Self) -> Self {
        Counter(self.0.max(other.0))
    }
}

/// Adds step to the counter until it reaches the ceiling.
#[derive(Debug)]
pub struct BoundedIncrement {
    pub step: i64,
    pub ceiling: i64,
}

impl Default for BoundedIncrement {
    fn default() -> Self {
        BoundedIncrement {
            step: 2,
            ceiling: 10,
        }
    }
}

impl TransferRelation<Counter, SimplePrecision> for BoundedIncrement {
    fn generate_abstract_successors(
        &mut self,
        state: &Counter,
        _precision: &SimplePrecision,
    ) -> Result<Vec<Counter>, AnalysisError> {
        if state.0 < self.ceiling {
            Ok(vec![Counter((state.0 + self.step).min(self.ceiling))])
        } else {
            Ok(vec![])
        }
    }
}

pub type Taint = SetAbstractState<&'static str>;
pub type TaintState = JvmAbstractState<Taint>;

pub const SOURCE: &str = "source";

/// Values are tainted by calls to methods named `source` and taint flows through every
/// operation and every call without code.
#[derive(Debug, Default)]
pub struct TaintInterpreter;

impl JvmValueInterpreter<Taint> for TaintInterpreter {
    fn compute_result(&self, _instruction: &Instruction, operands: &[Taint]) -> Taint {
        operands
            .iter()
            .fold(Taint::bottom(), |acc, operand| acc.join(operand))
    }

    fn invoke(&self, target: &MethodSignature, arguments: &[Taint]) -> Taint {
        if &*target.method_name == SOURCE {
            Taint::singleton(SOURCE)
        } else {
            self.compute_result(&Instruction::simple(arguments.len(), 1), arguments)
        }
    }

    fn exception_value(&self) -> Taint {
        Taint::bottom()
    }
}

pub type TaintBam = BamCpa<TaintState, SimplePrecision, JvmTransferRelation<TaintInterpreter>>;

pub fn taint_bam(cfa: &Rc<Cfa>, options: &Options) -> TaintBam {
    BamCpa::new(
        cfa.clone(),
        JvmTransferRelation::new(TaintInterpreter),
        CpaOperators::join(),
        Rc::new(JvmDefaultReduceOperator),
        Rc::new(JvmDefaultExpandOperator),
        options,
    )
}

pub fn signature(class: &str, method: &str, descriptor: &str, is_static: bool) -> Rc<MethodSignature> {
    Rc::new(MethodSignature::new(class, method, descriptor, is_static).unwrap())
}

/// The entry state of a method without arguments.
pub fn entry_state(cfa: &Cfa, method: &Rc<MethodSignature>) -> TaintState {
    let entry = cfa.function_entry_node(method).unwrap();
    JvmAbstractState::new(entry, JvmFrame::new(vec![]))
}

/// Adds the code of one method to a control flow automaton, one instruction at a time.
pub struct MethodBuilder<'a> {
    cfa: &'a mut Cfa,
    method: Rc<MethodSignature>,
}

impl<'a> MethodBuilder<'a> {
    pub fn new(cfa: &'a mut Cfa, method: &Rc<MethodSignature>) -> MethodBuilder<'a> {
        cfa.add_method(method);
        MethodBuilder {
            cfa,
            method: method.clone(),
        }
    }

    pub fn instruction(&mut self, from: i32, to: i32, instruction: Instruction) -> &mut Self {
        let source = self.cfa.add_node(&self.method, from);
        let target = self.cfa.add_node(&self.method, to);
        self.cfa.add_instruction_edge(source, target, instruction);
        self
    }

    pub fn invoke(
        &mut self,
        from: i32,
        to: i32,
        kind: InvocationKind,
        target: &Rc<MethodSignature>,
    ) -> &mut Self {
        self.instruction(from, to, Instruction::invoke(kind, target.clone()));
        let source = self.cfa.add_node(&self.method, from);
        let call = Call::new(self.method.clone(), from, target.clone(), kind);
        self.cfa.add_call_edge(source, call);
        self
    }

    pub fn ret(&mut self, from: i32, size: usize) -> &mut Self {
        self.instruction(from, RETURN_EXIT_OFFSET, Instruction::return_value(size))
    }
}

/// A program that passes a tainted value through `id` twice and then to `sink`:
///
/// ```text
/// static int id(int x) { return x; }
///
/// static void main() {
///     int x = source();       //  0: invokestatic source, 3: istore_0
///     id(x);                  //  4: iload_0, 5: invokestatic id, 8: pop
///     sink(id(x));            //  9: iload_0, 10: invokestatic id, 13: invokestatic sink
/// }                           // 16: return
/// ```
///
/// `source` and `sink` have no code.
pub struct TaintProgram {
    pub cfa: Rc<Cfa>,
    pub main: Rc<MethodSignature>,
    pub id: Rc<MethodSignature>,
    pub source: Rc<MethodSignature>,
    pub sink: Rc<MethodSignature>,
}

impl TaintProgram {
    pub fn new() -> TaintProgram {
        let main = signature("Main", "main", "()V", true);
        let id = signature("Main", "id", "(I)I", true);
        let source = signature("Main", SOURCE, "()I", true);
        let sink = signature("Main", "sink", "(I)V", true);

        let mut cfa = Cfa::new();
        MethodBuilder::new(&mut cfa, &id)
            .instruction(0, 1, Instruction::load(0, false))
            .ret(1, 1);
        MethodBuilder::new(&mut cfa, &main)
            .invoke(0, 3, InvocationKind::Static, &source)
            .instruction(3, 4, Instruction::store(0, false))
            .instruction(4, 5, Instruction::load(0, false))
            .invoke(5, 8, InvocationKind::Static, &id)
            .instruction(8, 9, Instruction::simple(1, 0))
            .instruction(9, 10, Instruction::load(0, false))
            .invoke(10, 13, InvocationKind::Static, &id)
            .invoke(13, 16, InvocationKind::Static, &sink)
            .ret(16, 0);
        TaintProgram {
            cfa: Rc::new(cfa),
            main,
            id,
            source,
            sink,
        }
    }

    pub fn node(&self, method: &Rc<MethodSignature>, offset: i32) -> NodeId {
        self.cfa.find_node(method, offset).unwrap()
    }

    /// Runs the BAM analysis of main.
    pub fn analyze(&self, options: &Options) -> TaintBam {
        let mut bam = taint_bam(&self.cfa, options);
        bam.analyze(&self.main, entry_state(&self.cfa, &self.main), &SimplePrecision)
            .unwrap();
        bam
    }
}
