// Copyright (c) Facebook, Inc. and its affiliates.
//
// This source code is licensed under the MIT license found in the
// LICENSE file in the root directory of this source tree.

use crate::cfa::MethodSignature;

use std::fmt::{Debug, Formatter, Result};
use std::rc::Rc;

/// The way an invoke instruction dispatches to its target.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub enum InvocationKind {
    Static,
    Virtual,
    Special,
    Interface,
    Dynamic,
}

impl InvocationKind {
    /// True if the invocation passes a receiver in addition to the declared arguments.
    pub fn has_receiver(self) -> bool {
        !matches!(self, InvocationKind::Static | InvocationKind::Dynamic)
    }
}

/// The categories of bytecode instructions that the transfer relations tell apart.
/// Arithmetic, conversions, comparisons and literals all fall into `Simple`, since only their
/// stack effect matters to the analyses here.
#[derive(Clone, Eq, Hash, PartialEq)]
pub enum InstructionKind {
    Dup,
    DupX1,
    DupX2,
    Dup2,
    Dup2X1,
    Dup2X2,
    Swap,
    ArrayLoad,
    ArrayStore,
    Return,
    Simple,
    Load { variable: usize },
    Store { variable: usize },
    Increment { variable: usize },
    GetStatic { field: Rc<str> },
    PutStatic { field: Rc<str> },
    GetField { field: Rc<str> },
    PutField { field: Rc<str> },
    Invoke { kind: InvocationKind, target: Rc<MethodSignature> },
    New,
    Branch,
    Switch,
}

/// A decoded instruction: its category and the number of stack slots it pops and pushes.
/// Category 2 values (longs and doubles) occupy two slots.
#[derive(Clone, Eq, Hash, PartialEq)]
pub struct Instruction {
    pub kind: InstructionKind,
    pub pop_count: usize,
    pub push_count: usize,
}

impl Debug for Instruction {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result {
        match &self.kind {
            InstructionKind::Load { variable } => write!(f, "load {}", variable),
            InstructionKind::Store { variable } => write!(f, "store {}", variable),
            InstructionKind::Increment { variable } => write!(f, "iinc {}", variable),
            InstructionKind::GetStatic { field } => write!(f, "getstatic {}", field),
            InstructionKind::PutStatic { field } => write!(f, "putstatic {}", field),
            InstructionKind::GetField { field } => write!(f, "getfield {}", field),
            InstructionKind::PutField { field } => write!(f, "putfield {}", field),
            InstructionKind::Invoke { kind, target } => write!(f, "invoke {:?} {:?}", kind, target),
            kind => write!(
                f,
                "{} (-{} +{})",
                kind.mnemonic(),
                self.pop_count,
                self.push_count
            ),
        }
    }
}

impl InstructionKind {
    fn mnemonic(&self) -> &'static str {
        match self {
            InstructionKind::Dup => "dup",
            InstructionKind::DupX1 => "dup_x1",
            InstructionKind::DupX2 => "dup_x2",
            InstructionKind::Dup2 => "dup2",
            InstructionKind::Dup2X1 => "dup2_x1",
            InstructionKind::Dup2X2 => "dup2_x2",
            InstructionKind::Swap => "swap",
            InstructionKind::ArrayLoad => "xaload",
            InstructionKind::ArrayStore => "xastore",
            InstructionKind::Return => "return",
            InstructionKind::Simple => "simple",
            InstructionKind::Load { .. } => "load",
            InstructionKind::Store { .. } => "store",
            InstructionKind::Increment { .. } => "iinc",
            InstructionKind::GetStatic { .. } => "getstatic",
            InstructionKind::PutStatic { .. } => "putstatic",
            InstructionKind::GetField { .. } => "getfield",
            InstructionKind::PutField { .. } => "putfield",
            InstructionKind::Invoke { .. } => "invoke",
            InstructionKind::New => "new",
            InstructionKind::Branch => "branch",
            InstructionKind::Switch => "switch",
        }
    }
}

fn slots(category2: bool) -> usize {
    if category2 {
        2
    } else {
        1
    }
}

/// Constructors
impl Instruction {
    fn new(kind: InstructionKind, pop_count: usize, push_count: usize) -> Instruction {
        Instruction {
            kind,
            pop_count,
            push_count,
        }
    }

    pub fn dup() -> Instruction {
        Self::new(InstructionKind::Dup, 1, 2)
    }

    pub fn dup_x1() -> Instruction {
        Self::new(InstructionKind::DupX1, 2, 3)
    }

    pub fn dup_x2() -> Instruction {
        Self::new(InstructionKind::DupX2, 3, 4)
    }

    pub fn dup2() -> Instruction {
        Self::new(InstructionKind::Dup2, 2, 4)
    }

    pub fn dup2_x1() -> Instruction {
        Self::new(InstructionKind::Dup2X1, 3, 5)
    }

    pub fn dup2_x2() -> Instruction {
        Self::new(InstructionKind::Dup2X2, 4, 6)
    }

    pub fn swap() -> Instruction {
        Self::new(InstructionKind::Swap, 2, 2)
    }

    /// An array element load, which pops the array reference and the index.
    pub fn array_load(category2: bool) -> Instruction {
        Self::new(InstructionKind::ArrayLoad, 2, slots(category2))
    }

    pub fn array_store(category2: bool) -> Instruction {
        Self::new(InstructionKind::ArrayStore, 2 + slots(category2), 0)
    }

    /// A return instruction that pops a value of `size` slots (0 for void returns).
    pub fn return_value(size: usize) -> Instruction {
        Self::new(InstructionKind::Return, size, 0)
    }

    /// Arithmetic, conversion, comparison, literal and stack manipulation instructions not
    /// covered by the other constructors.
    pub fn simple(pop_count: usize, push_count: usize) -> Instruction {
        Self::new(InstructionKind::Simple, pop_count, push_count)
    }

    pub fn load(variable: usize, category2: bool) -> Instruction {
        Self::new(InstructionKind::Load { variable }, 0, slots(category2))
    }

    pub fn store(variable: usize, category2: bool) -> Instruction {
        Self::new(InstructionKind::Store { variable }, slots(category2), 0)
    }

    pub fn increment(variable: usize) -> Instruction {
        Self::new(InstructionKind::Increment { variable }, 0, 0)
    }

    pub fn get_static(field: &str, category2: bool) -> Instruction {
        let field = Rc::from(field);
        Self::new(InstructionKind::GetStatic { field }, 0, slots(category2))
    }

    pub fn put_static(field: &str, category2: bool) -> Instruction {
        let field = Rc::from(field);
        Self::new(InstructionKind::PutStatic { field }, slots(category2), 0)
    }

    pub fn get_field(field: &str, category2: bool) -> Instruction {
        let field = Rc::from(field);
        Self::new(InstructionKind::GetField { field }, 1, slots(category2))
    }

    pub fn put_field(field: &str, category2: bool) -> Instruction {
        let field = Rc::from(field);
        Self::new(InstructionKind::PutField { field }, 1 + slots(category2), 0)
    }

    /// An invocation of target. The stack effect follows from the target's descriptor and from
    /// whether the invocation passes a receiver.
    pub fn invoke(kind: InvocationKind, target: Rc<MethodSignature>) -> Instruction {
        let receiver = usize::from(kind.has_receiver());
        let pop_count = target.descriptor.arguments_size() + receiver;
        let push_count = target.descriptor.return_size();
        Self::new(InstructionKind::Invoke { kind, target }, pop_count, push_count)
    }

    pub fn new_object() -> Instruction {
        Self::new(InstructionKind::New, 0, 1)
    }

    /// A conditional or unconditional jump that pops `pop_count` operands.
    pub fn branch(pop_count: usize) -> Instruction {
        Self::new(InstructionKind::Branch, pop_count, 0)
    }

    pub fn switch() -> Instruction {
        Self::new(InstructionKind::Switch, 1, 0)
    }
}

/// Queries
impl Instruction {
    pub fn is_invoke(&self) -> bool {
        matches!(self.kind, InstructionKind::Invoke { .. })
    }

    pub fn is_return(&self) -> bool {
        matches!(self.kind, InstructionKind::Return)
    }

    /// True if the single value this instruction loads or stores occupies two slots.
    pub fn is_category2(&self) -> bool {
        match self.kind {
            InstructionKind::Load { .. } | InstructionKind::GetStatic { .. } => {
                self.push_count == 2
            }
            InstructionKind::Store { .. } | InstructionKind::PutStatic { .. } => {
                self.pop_count == 2
            }
            InstructionKind::GetField { .. } => self.push_count == 2,
            InstructionKind::PutField { .. } => self.pop_count == 3,
            _ => false,
        }
    }
}
